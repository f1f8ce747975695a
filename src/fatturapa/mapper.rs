//! Mapping of bound or tolerantly extracted documents into [`ParsedInvoice`]s.

use std::collections::BTreeMap;
use std::str::FromStr;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::core::*;

use super::legacy::{LegacyBody, LegacyDocument, join_words};
use super::schema::*;

/// Map a strictly bound document, one record per body.
pub fn from_schema(doc: &SchemaDocument) -> Vec<ParsedInvoice> {
    let mut invoices: Vec<ParsedInvoice> = match doc {
        SchemaDocument::Ordinary(variant, doc) => {
            let counterparty = ordinary_party(
                &doc.header.cedente_prestatore.dati_anagrafici,
                &doc.header.cedente_prestatore.sede,
                doc.header.cedente_prestatore.contatti.as_ref(),
            );
            let mut owner = ordinary_party(
                &doc.header.cessionario_committente.dati_anagrafici,
                &doc.header.cessionario_committente.sede,
                None,
            );
            recipient_channel(&mut owner, &doc.header.dati_trasmissione);
            doc.bodies
                .iter()
                .map(|body| ordinary_body(*variant, &counterparty, &owner, body))
                .collect()
        }
        SchemaDocument::Simplified(doc) => {
            let cedente = &doc.header.cedente_prestatore;
            let counterparty = PartyRecord {
                name: person_or_company(
                    cedente.denominazione.as_deref(),
                    cedente.nome.as_deref(),
                    cedente.cognome.as_deref(),
                ),
                vat_number: Some(cedente.id_fiscale_iva.id_codice.clone()),
                vat_country: Some(cedente.id_fiscale_iva.id_paese.clone()),
                fiscal_code: cedente.codice_fiscale.clone(),
                ..sede_party(&cedente.sede)
            };
            let cessionario = &doc.header.cessionario_committente;
            let altri = cessionario.altri_dati_identificativi.as_ref();
            let ids = &cessionario.identificativi_fiscali;
            let mut owner = PartyRecord {
                name: altri.and_then(|a| {
                    person_or_company(
                        a.denominazione.as_deref(),
                        a.nome.as_deref(),
                        a.cognome.as_deref(),
                    )
                }),
                vat_number: ids.id_fiscale_iva.as_ref().map(|i| i.id_codice.clone()),
                vat_country: ids.id_fiscale_iva.as_ref().map(|i| i.id_paese.clone()),
                fiscal_code: ids.codice_fiscale.clone(),
                ..altri
                    .and_then(|a| a.sede.as_ref())
                    .map(sede_party)
                    .unwrap_or_default()
            };
            recipient_channel(&mut owner, &doc.header.dati_trasmissione);
            doc.bodies
                .iter()
                .map(|body| simplified_body(&counterparty, &owner, body))
                .collect()
        }
    };
    finish(&mut invoices);
    invoices
}

/// Map a tolerantly extracted document, one record per body.
pub fn from_legacy(doc: &LegacyDocument) -> Vec<ParsedInvoice> {
    let mut invoices: Vec<ParsedInvoice> = doc
        .bodies
        .iter()
        .map(|body| legacy_body(doc, body))
        .collect();
    finish(&mut invoices);
    invoices
}

/// Body numbering, multi-body warnings, gross totals, attachment checks.
fn finish(invoices: &mut [ParsedInvoice]) {
    let count = invoices.len();
    for (i, invoice) in invoices.iter_mut().enumerate() {
        invoice.body_index = i + 1;
        invoice.body_count = count;
        if count > 1 {
            invoice.warn(format!("multiple bodies in file: body_index={}/{count}", i + 1));
        }
        check_attachments(invoice);
        fill_gross_total(invoice);
    }
}

fn check_attachments(invoice: &mut ParsedInvoice) {
    let mut problems = Vec::new();
    for att in &invoice.attachments {
        match att.payload_base64.as_deref() {
            None => problems.push(format!("attachment {:?} has no payload", att.name)),
            Some(payload) => {
                let compact: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
                if STANDARD.decode(compact.as_bytes()).is_err() {
                    problems.push(format!("attachment {:?} payload is not valid base64", att.name));
                }
            }
        }
    }
    invoice.warnings.extend(problems);
}

// ---------------------------------------------------------------------------
// Strict path
// ---------------------------------------------------------------------------

fn person_or_company(
    denominazione: Option<&str>,
    nome: Option<&str>,
    cognome: Option<&str>,
) -> Option<String> {
    denominazione
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(str::to_string)
        .or_else(|| join_words([nome, cognome]))
}

fn sede_party(sede: &Sede) -> PartyRecord {
    PartyRecord {
        address: join_words([Some(sede.indirizzo.as_str()), sede.numero_civico.as_deref()]),
        postal_code: Some(sede.cap.clone()),
        city: Some(sede.comune.clone()),
        province: sede.provincia.clone(),
        country: Some(sede.nazione.clone()),
        ..Default::default()
    }
}

fn ordinary_party(anag: &DatiAnagrafici, sede: &Sede, contatti: Option<&Contatti>) -> PartyRecord {
    PartyRecord {
        name: person_or_company(
            anag.anagrafica.denominazione.as_deref(),
            anag.anagrafica.nome.as_deref(),
            anag.anagrafica.cognome.as_deref(),
        ),
        vat_number: anag.id_fiscale_iva.as_ref().map(|i| i.id_codice.clone()),
        vat_country: anag.id_fiscale_iva.as_ref().map(|i| i.id_paese.clone()),
        fiscal_code: anag.codice_fiscale.clone(),
        email: contatti.and_then(|c| c.email.clone()),
        ..sede_party(sede)
    }
}

/// `CodiceDestinatario` / `PECDestinatario` address the buyer.
fn recipient_channel(owner: &mut PartyRecord, dt: &DatiTrasmissione) {
    owner.sdi_code = Some(dt.codice_destinatario.clone());
    owner.pec_email = dt.pec_destinatario.clone();
}

fn attachment(a: &Allegati) -> AttachmentRecord {
    AttachmentRecord {
        name: a.nome_attachment.clone(),
        description: a.descrizione_attachment.clone(),
        format: a.formato_attachment.clone(),
        compression: a.algoritmo_compressione.clone(),
        encryption: a.algoritmo_crittografia.clone(),
        payload_base64: a.attachment.clone(),
    }
}

fn ordinary_body(
    variant: SchemaVariant,
    counterparty: &PartyRecord,
    owner: &PartyRecord,
    body: &Body,
) -> ParsedInvoice {
    let dg = &body.dati_generali.dati_generali_documento;
    let beni = &body.dati_beni_servizi;

    let lines = beni
        .dettaglio_linee
        .iter()
        .map(|l| LineRecord {
            line_number: Some(i64::from(l.numero_linea)),
            description: l.descrizione.clone(),
            quantity: l.quantita,
            unit_of_measure: l.unita_misura.clone(),
            unit_price: Some(l.prezzo_unitario),
            discount_percent: l.sconto_maggiorazione.first().and_then(|s| s.percentuale),
            discount_amount: l.sconto_maggiorazione.first().and_then(|s| s.importo),
            taxable_amount: Some(l.prezzo_totale),
            vat_rate: Some(l.aliquota_iva),
            vat_amount: None,
            total_line_amount: Some(l.prezzo_totale),
            sku_code: l.codice_articolo.first().map(|c| c.codice_valore.clone()),
        })
        .collect();

    let vat_summaries: Vec<VatSummaryRecord> = beni
        .dati_riepilogo
        .iter()
        .map(|r| VatSummaryRecord {
            vat_rate: r.aliquota_iva,
            taxable_amount: r.imponibile_importo,
            vat_amount: r.imposta,
            nature: r.natura.clone(),
        })
        .collect();

    let mut payments = Vec::new();
    for dp in &body.dati_pagamento {
        if dp.dettaglio_pagamento.is_empty() {
            payments.push(PaymentRecord {
                payment_terms: Some(dp.condizioni_pagamento.clone()),
                ..Default::default()
            });
        }
        for d in &dp.dettaglio_pagamento {
            payments.push(PaymentRecord {
                payment_terms: Some(dp.condizioni_pagamento.clone()),
                payment_method: Some(d.modalita_pagamento.clone()),
                due_date: d.data_scadenza_pagamento,
                expected_amount: Some(d.importo_pagamento),
            });
        }
    }

    let (total_taxable, total_vat) = summary_totals(&vat_summaries);
    ParsedInvoice {
        counterparty: counterparty.clone(),
        owner: owner.clone(),
        transmission_format: Some(variant.code().to_string()),
        type_code: Some(dg.tipo_documento.clone()),
        number: Some(dg.numero.clone()),
        document_date: Some(dg.data),
        due_date: earliest_due(&payments),
        registration_date: None,
        currency: dg.divisa.clone(),
        total_taxable,
        total_vat,
        rounding: dg.arrotondamento,
        total_gross: dg.importo_totale_documento,
        body_index: 0,
        body_count: 0,
        parser: ParserPath::Schema,
        lines,
        vat_summaries,
        payments,
        attachments: body.allegati.iter().map(attachment).collect(),
        warnings: Vec::new(),
    }
}

fn simplified_body(
    counterparty: &PartyRecord,
    owner: &PartyRecord,
    body: &BodySemplificato,
) -> ParsedInvoice {
    let dg = &body.dati_generali.dati_generali_documento;
    let items: Vec<SimplifiedItem> = body
        .dati_beni_servizi
        .iter()
        .map(|b| SimplifiedItem {
            description: b.descrizione.clone(),
            gross: b.importo,
            vat_amount: b.dati_iva.imposta,
            vat_rate: b.dati_iva.aliquota,
            nature: b.natura.clone(),
        })
        .collect();
    let (lines, vat_summaries, gross) = simplified_lines(&items);
    let (total_taxable, total_vat) = summary_totals(&vat_summaries);

    ParsedInvoice {
        counterparty: counterparty.clone(),
        owner: owner.clone(),
        transmission_format: Some(SchemaVariant::Fsm10.code().to_string()),
        type_code: Some(dg.tipo_documento.clone()),
        number: Some(dg.numero.clone()),
        document_date: Some(dg.data),
        due_date: None,
        registration_date: None,
        currency: dg.divisa.clone(),
        total_taxable,
        total_vat,
        rounding: None,
        total_gross: Some(gross),
        body_index: 0,
        body_count: 0,
        parser: ParserPath::Schema,
        lines,
        vat_summaries,
        payments: Vec::new(),
        attachments: body.allegati.iter().map(attachment).collect(),
        warnings: Vec::new(),
    }
}

// ---------------------------------------------------------------------------
// Simplified-format lines
// ---------------------------------------------------------------------------

struct SimplifiedItem {
    description: String,
    gross: Decimal,
    vat_amount: Option<Decimal>,
    vat_rate: Option<Decimal>,
    nature: Option<String>,
}

/// Split VAT-inclusive simplified amounts into taxable and tax, and group
/// them into one summary row per rate and nature. Returns the lines, the
/// summaries and the gross total.
fn simplified_lines(items: &[SimplifiedItem]) -> (Vec<LineRecord>, Vec<VatSummaryRecord>, Decimal) {
    let mut lines = Vec::with_capacity(items.len());
    let mut groups: BTreeMap<(Decimal, Option<String>), (Decimal, Decimal)> = BTreeMap::new();
    let mut gross_total = Decimal::ZERO;

    for (i, item) in items.iter().enumerate() {
        let rate = item.vat_rate.unwrap_or_default();
        let vat = item.vat_amount.unwrap_or_else(|| {
            let divisor = Decimal::ONE_HUNDRED + rate;
            if divisor.is_zero() {
                Decimal::ZERO
            } else {
                (item.gross * rate / divisor).round_dp(2)
            }
        });
        let taxable = item.gross - vat;
        gross_total += item.gross;

        let entry = groups
            .entry((rate, item.nature.clone()))
            .or_insert((Decimal::ZERO, Decimal::ZERO));
        entry.0 += taxable;
        entry.1 += vat;

        lines.push(LineRecord {
            line_number: i64::try_from(i + 1).ok(),
            description: item.description.clone(),
            taxable_amount: Some(taxable),
            vat_rate: item.vat_rate,
            vat_amount: Some(vat),
            total_line_amount: Some(item.gross),
            ..Default::default()
        });
    }

    let summaries = groups
        .into_iter()
        .map(|((rate, nature), (taxable, vat))| VatSummaryRecord {
            vat_rate: rate,
            taxable_amount: taxable,
            vat_amount: vat,
            nature,
        })
        .collect();
    (lines, summaries, gross_total)
}

fn summary_totals(rows: &[VatSummaryRecord]) -> (Option<Decimal>, Option<Decimal>) {
    if rows.is_empty() {
        return (None, None);
    }
    (
        Some(rows.iter().map(|r| r.taxable_amount).sum()),
        Some(rows.iter().map(|r| r.vat_amount).sum()),
    )
}

fn earliest_due(payments: &[PaymentRecord]) -> Option<NaiveDate> {
    payments.iter().filter_map(|p| p.due_date).min()
}

// ---------------------------------------------------------------------------
// Tolerant path
// ---------------------------------------------------------------------------

/// Parse a decimal leniently: trims, accepts a comma separator, and treats
/// anything unparsable as absent.
pub fn lenient_decimal(raw: Option<&str>) -> Option<Decimal> {
    let s = raw?.trim();
    if s.is_empty() {
        return None;
    }
    Decimal::from_str(&s.replace(',', ".")).ok()
}

/// Parse an ISO date leniently, ignoring any time part.
pub fn lenient_date(raw: Option<&str>) -> Option<NaiveDate> {
    let s = raw?.trim();
    let day = s.get(..10).unwrap_or(s);
    NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()
}

fn legacy_body(doc: &LegacyDocument, body: &LegacyBody) -> ParsedInvoice {
    let mut warnings = Vec::new();

    let (lines, mut vat_summaries, simplified_gross) = if body.simplified {
        let items: Vec<SimplifiedItem> = body
            .lines
            .iter()
            .map(|l| SimplifiedItem {
                description: l.description.clone().unwrap_or_default(),
                gross: lenient_decimal(l.total.as_deref()).unwrap_or_default(),
                vat_amount: lenient_decimal(l.vat_amount.as_deref()),
                vat_rate: lenient_decimal(l.vat_rate.as_deref()),
                nature: l.nature.clone(),
            })
            .collect();
        let (lines, summaries, gross) = simplified_lines(&items);
        (lines, summaries, Some(gross))
    } else {
        let lines = body
            .lines
            .iter()
            .map(|l| {
                let total = lenient_decimal(l.total.as_deref());
                LineRecord {
                    line_number: l.number.as_deref().and_then(|n| n.trim().parse().ok()),
                    description: l.description.clone().unwrap_or_default(),
                    quantity: lenient_decimal(l.quantity.as_deref()),
                    unit_of_measure: l.unit.clone(),
                    unit_price: lenient_decimal(l.unit_price.as_deref()),
                    discount_percent: lenient_decimal(l.discount_percent.as_deref()),
                    discount_amount: lenient_decimal(l.discount_amount.as_deref()),
                    taxable_amount: total,
                    vat_rate: lenient_decimal(l.vat_rate.as_deref()),
                    vat_amount: None,
                    total_line_amount: total,
                    sku_code: l.sku.clone(),
                }
            })
            .collect();
        (lines, Vec::new(), None)
    };

    if !body.simplified {
        for (i, s) in body.summaries.iter().enumerate() {
            let rate = lenient_decimal(s.rate.as_deref());
            let taxable = lenient_decimal(s.taxable.as_deref());
            let tax = lenient_decimal(s.tax.as_deref());
            match (rate, taxable, tax) {
                (Some(vat_rate), Some(taxable_amount), Some(vat_amount)) => {
                    vat_summaries.push(VatSummaryRecord {
                        vat_rate,
                        taxable_amount,
                        vat_amount,
                        nature: s.nature.clone(),
                    })
                }
                _ => warnings.push(format!(
                    "VAT summary row {} dropped: missing rate, taxable or tax",
                    i + 1
                )),
            }
        }
    }

    let payments: Vec<PaymentRecord> = body
        .payments
        .iter()
        .map(|p| PaymentRecord {
            payment_terms: p.terms.clone(),
            payment_method: p.method.clone(),
            due_date: lenient_date(p.due_date.as_deref()),
            expected_amount: lenient_decimal(p.amount.as_deref()),
        })
        .collect();

    let (total_taxable, total_vat) = summary_totals(&vat_summaries);
    ParsedInvoice {
        counterparty: doc.counterparty.clone(),
        owner: doc.owner.clone(),
        transmission_format: doc.transmission_format.clone(),
        type_code: body.type_code.clone(),
        number: body.number.clone(),
        document_date: lenient_date(body.date.as_deref()),
        due_date: earliest_due(&payments),
        registration_date: None,
        currency: body.currency.clone().unwrap_or_else(|| "EUR".to_string()),
        total_taxable,
        total_vat,
        rounding: lenient_decimal(body.rounding.as_deref()),
        total_gross: lenient_decimal(body.total.as_deref()).or(simplified_gross),
        body_index: 0,
        body_count: 0,
        parser: ParserPath::Legacy,
        lines,
        vat_summaries,
        payments,
        attachments: body.attachments.clone(),
        warnings,
    }
}
