use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One document body as read from a source file, before persistence.
///
/// Both the strict and the tolerant parser produce this shape. Amounts are
/// as found in the source; sign inversion for credit notes happens in
/// [`normalize`](crate::normalize).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsedInvoice {
    /// Issuer (`CedentePrestatore`).
    pub counterparty: PartyRecord,
    /// Buyer (`CessionarioCommittente`), i.e. the owning entity.
    pub owner: PartyRecord,
    /// `FormatoTrasmissione` (FPA12, FPR12, FSM10).
    pub transmission_format: Option<String>,
    /// `TipoDocumento`.
    pub type_code: Option<String>,
    pub number: Option<String>,
    pub document_date: Option<NaiveDate>,
    /// Earliest `DataScadenzaPagamento` across payment rows.
    pub due_date: Option<NaiveDate>,
    pub registration_date: Option<NaiveDate>,
    /// `Divisa`; "EUR" when absent.
    pub currency: String,
    /// Sum of VAT summary taxable amounts, `None` without summaries.
    pub total_taxable: Option<Decimal>,
    /// Sum of VAT summary tax amounts, `None` without summaries.
    pub total_vat: Option<Decimal>,
    /// `Arrotondamento` at document level.
    pub rounding: Option<Decimal>,
    /// `ImportoTotaleDocumento`, or derived by the mapper.
    pub total_gross: Option<Decimal>,
    /// 1-based index of this body within its file.
    pub body_index: usize,
    /// Number of bodies in the file.
    pub body_count: usize,
    pub parser: ParserPath,
    pub lines: Vec<LineRecord>,
    pub vat_summaries: Vec<VatSummaryRecord>,
    pub payments: Vec<PaymentRecord>,
    pub attachments: Vec<AttachmentRecord>,
    /// Non-fatal anomalies met while reading this body.
    pub warnings: Vec<String>,
}

impl ParsedInvoice {
    /// Record a non-fatal anomaly.
    pub fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    /// Sum of line totals (`PrezzoTotale`), ignoring lines without one.
    pub fn line_total_sum(&self) -> Decimal {
        self.lines.iter().filter_map(|l| l.total_line_amount).sum()
    }
}

/// Which parser produced a [`ParsedInvoice`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParserPath {
    /// Typed deserialization against the FatturaPA structure.
    #[default]
    Schema,
    /// Tolerant path-based extraction.
    Legacy,
}

/// Identity block of a party as found in the source.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PartyRecord {
    /// `Denominazione`, else `Nome Cognome`.
    pub name: Option<String>,
    /// `IdFiscaleIVA/IdCodice`.
    pub vat_number: Option<String>,
    /// `IdFiscaleIVA/IdPaese`.
    pub vat_country: Option<String>,
    pub fiscal_code: Option<String>,
    /// `CodiceDestinatario`.
    pub sdi_code: Option<String>,
    /// `PECDestinatario`.
    pub pec_email: Option<String>,
    pub email: Option<String>,
    /// `Indirizzo` plus `NumeroCivico`.
    pub address: Option<String>,
    pub postal_code: Option<String>,
    pub city: Option<String>,
    pub province: Option<String>,
    /// `Nazione`.
    pub country: Option<String>,
}

impl PartyRecord {
    /// Name used when persisting: the source name, else a name synthesized
    /// from the tax identifiers.
    pub fn display_name(&self) -> String {
        if let Some(name) = self.name.as_deref().filter(|n| !n.trim().is_empty()) {
            return name.trim().to_string();
        }
        if let Some(vat) = &self.vat_number {
            return format!("P.IVA {vat}");
        }
        if let Some(cf) = &self.fiscal_code {
            return format!("CF {cf}");
        }
        "Fornitore sconosciuto".to_string()
    }

    /// True when the block carries a name or a tax identifier.
    pub fn has_identity(&self) -> bool {
        self.name.is_some() || self.vat_number.is_some() || self.fiscal_code.is_some()
    }
}

/// One line item (`DettaglioLinee`, or `DatiBeniServizi` in the simplified format).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LineRecord {
    pub line_number: Option<i64>,
    pub description: String,
    pub quantity: Option<Decimal>,
    pub unit_of_measure: Option<String>,
    pub unit_price: Option<Decimal>,
    /// First `ScontoMaggiorazione/Percentuale`.
    pub discount_percent: Option<Decimal>,
    /// First `ScontoMaggiorazione/Importo`.
    pub discount_amount: Option<Decimal>,
    pub taxable_amount: Option<Decimal>,
    pub vat_rate: Option<Decimal>,
    pub vat_amount: Option<Decimal>,
    pub total_line_amount: Option<Decimal>,
    pub sku_code: Option<String>,
}

/// One `DatiRiepilogo` row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VatSummaryRecord {
    pub vat_rate: Decimal,
    pub taxable_amount: Decimal,
    pub vat_amount: Decimal,
    pub nature: Option<String>,
}

/// One `DettaglioPagamento` installment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub payment_terms: Option<String>,
    pub payment_method: Option<String>,
    pub due_date: Option<NaiveDate>,
    pub expected_amount: Option<Decimal>,
}

/// One `Allegati` entry. The payload stays base64 encoded.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AttachmentRecord {
    pub name: String,
    pub description: Option<String>,
    pub format: Option<String>,
    pub compression: Option<String>,
    pub encryption: Option<String>,
    pub payload_base64: Option<String>,
}
