//! Tolerant path-based extraction for documents the typed binding rejects.
//!
//! Values are collected as raw strings; the mapper parses them leniently.
//! Missing optional elements simply stay `None`.

use crate::core::{AttachmentRecord, ImportError, PartyRecord};

use super::tree::XmlElement;

/// Everything the tolerant path could read from one file.
#[derive(Debug, Clone, Default)]
pub struct LegacyDocument {
    pub transmission_format: Option<String>,
    pub counterparty: PartyRecord,
    pub owner: PartyRecord,
    pub bodies: Vec<LegacyBody>,
}

#[derive(Debug, Clone, Default)]
pub struct LegacyBody {
    pub type_code: Option<String>,
    pub currency: Option<String>,
    pub date: Option<String>,
    pub number: Option<String>,
    pub total: Option<String>,
    pub rounding: Option<String>,
    /// Lines came from simplified-format `DatiBeniServizi` items.
    pub simplified: bool,
    pub lines: Vec<LegacyLine>,
    pub summaries: Vec<LegacySummary>,
    pub payments: Vec<LegacyPayment>,
    pub attachments: Vec<AttachmentRecord>,
}

#[derive(Debug, Clone, Default)]
pub struct LegacyLine {
    pub number: Option<String>,
    pub description: Option<String>,
    pub quantity: Option<String>,
    pub unit: Option<String>,
    pub unit_price: Option<String>,
    pub total: Option<String>,
    pub vat_rate: Option<String>,
    pub vat_amount: Option<String>,
    pub nature: Option<String>,
    pub discount_percent: Option<String>,
    pub discount_amount: Option<String>,
    pub sku: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct LegacySummary {
    pub rate: Option<String>,
    pub taxable: Option<String>,
    pub tax: Option<String>,
    pub nature: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct LegacyPayment {
    pub terms: Option<String>,
    pub method: Option<String>,
    pub due_date: Option<String>,
    pub amount: Option<String>,
}

/// Read a document tree without assuming schema conformance.
///
/// Fails only when no body with `DatiGeneraliDocumento` can be found.
pub fn extract(root: &XmlElement) -> Result<LegacyDocument, ImportError> {
    let body_nodes: Vec<&XmlElement> = if root.name == "FatturaElettronicaBody" {
        vec![root]
    } else {
        let found = root.select("//FatturaElettronicaBody");
        if found.is_empty() && root.first("//DatiGeneraliDocumento").is_some() {
            vec![root]
        } else {
            found
        }
    };
    if body_nodes.is_empty() {
        return Err(ImportError::Parse("no FatturaElettronicaBody found".into()));
    }

    let mut owner = root
        .first("//CessionarioCommittente")
        .map(party)
        .unwrap_or_default();
    owner.sdi_code = root.string_at("//DatiTrasmissione/CodiceDestinatario");
    owner.pec_email = root.string_at("//DatiTrasmissione/PECDestinatario");

    let mut bodies = Vec::with_capacity(body_nodes.len());
    for (i, node) in body_nodes.iter().enumerate() {
        bodies.push(body(node).ok_or_else(|| {
            ImportError::Parse(format!("body {}: DatiGeneraliDocumento missing", i + 1))
        })?);
    }

    Ok(LegacyDocument {
        transmission_format: root.string_at("//DatiTrasmissione/FormatoTrasmissione"),
        counterparty: root
            .first("//CedentePrestatore")
            .map(party)
            .unwrap_or_default(),
        owner,
        bodies,
    })
}

fn party(node: &XmlElement) -> PartyRecord {
    let name = node.string_at("//Denominazione").or_else(|| {
        join_words([node.text_at("//Nome"), node.text_at("//Cognome")])
    });
    PartyRecord {
        name,
        vat_number: node.string_at("//IdFiscaleIVA/IdCodice"),
        vat_country: node.string_at("//IdFiscaleIVA/IdPaese"),
        fiscal_code: node.string_at("//CodiceFiscale"),
        sdi_code: None,
        pec_email: None,
        email: node.string_at("//Contatti/Email"),
        address: join_words([
            node.text_at("//Sede/Indirizzo"),
            node.text_at("//Sede/NumeroCivico"),
        ]),
        postal_code: node.string_at("//Sede/CAP"),
        city: node.string_at("//Sede/Comune"),
        province: node.string_at("//Sede/Provincia"),
        country: node.string_at("//Sede/Nazione"),
    }
}

/// Space-join the present parts, `None` if there are none.
pub(crate) fn join_words<'a>(parts: impl IntoIterator<Item = Option<&'a str>>) -> Option<String> {
    let words: Vec<&str> = parts
        .into_iter()
        .flatten()
        .map(str::trim)
        .filter(|w| !w.is_empty())
        .collect();
    if words.is_empty() {
        None
    } else {
        Some(words.join(" "))
    }
}

fn body(node: &XmlElement) -> Option<LegacyBody> {
    let dg = node.first("//DatiGeneraliDocumento")?;

    let mut lines: Vec<LegacyLine> = node
        .select("//DettaglioLinee")
        .into_iter()
        .map(|l| LegacyLine {
            number: l.string_at("NumeroLinea"),
            description: l.string_at("Descrizione"),
            quantity: l.string_at("Quantita"),
            unit: l.string_at("UnitaMisura"),
            unit_price: l.string_at("PrezzoUnitario"),
            total: l.string_at("PrezzoTotale"),
            vat_rate: l.string_at("AliquotaIVA"),
            vat_amount: None,
            nature: l.string_at("Natura"),
            discount_percent: l.string_at("ScontoMaggiorazione/Percentuale"),
            discount_amount: l.string_at("ScontoMaggiorazione/Importo"),
            sku: l.string_at("CodiceArticolo/CodiceValore"),
        })
        .collect();

    let mut simplified = false;
    if lines.is_empty() {
        lines = node
            .select("//DatiBeniServizi")
            .into_iter()
            .filter(|n| n.child("Importo").is_some())
            .map(|n| LegacyLine {
                description: n.string_at("Descrizione"),
                total: n.string_at("Importo"),
                vat_rate: n.string_at("DatiIVA/Aliquota"),
                vat_amount: n.string_at("DatiIVA/Imposta"),
                nature: n.string_at("Natura"),
                ..Default::default()
            })
            .collect();
        simplified = !lines.is_empty();
    }

    let summaries = node
        .select("//DatiRiepilogo")
        .into_iter()
        .map(|s| LegacySummary {
            rate: s.string_at("AliquotaIVA"),
            taxable: s.string_at("ImponibileImporto"),
            tax: s.string_at("Imposta"),
            nature: s.string_at("Natura"),
        })
        .collect();

    let mut payments = Vec::new();
    for dp in node.select("//DatiPagamento") {
        let terms = dp.string_at("CondizioniPagamento");
        let details = dp.select("DettaglioPagamento");
        if details.is_empty() {
            payments.push(LegacyPayment {
                terms,
                ..Default::default()
            });
            continue;
        }
        for d in details {
            payments.push(LegacyPayment {
                terms: terms.clone(),
                method: d.string_at("ModalitaPagamento"),
                due_date: d.string_at("DataScadenzaPagamento"),
                amount: d.string_at("ImportoPagamento"),
            });
        }
    }

    let attachments = node
        .select("//Allegati")
        .into_iter()
        .map(|a| AttachmentRecord {
            name: a.string_at("NomeAttachment").unwrap_or_default(),
            description: a.string_at("DescrizioneAttachment"),
            format: a.string_at("FormatoAttachment"),
            compression: a.string_at("AlgoritmoCompressione"),
            encryption: a.string_at("AlgoritmoCrittografia"),
            payload_base64: a.string_at("Attachment"),
        })
        .collect();

    Some(LegacyBody {
        type_code: dg.string_at("TipoDocumento"),
        currency: dg.string_at("Divisa"),
        date: dg.string_at("Data"),
        number: dg.string_at("Numero"),
        total: dg.string_at("ImportoTotaleDocumento"),
        rounding: dg.string_at("Arrotondamento"),
        simplified,
        lines,
        summaries,
        payments,
        attachments,
    })
}
