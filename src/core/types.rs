use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Canonical financial document, as persisted.
///
/// Amounts already carry the sign dictated by [`DocumentKind`]: a credit
/// note stores negative totals, line amounts and VAT rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Invoice or credit note.
    pub kind: DocumentKind,
    /// `TipoDocumento` as found in the source (TD01, TD04, ...).
    pub type_code: Option<String>,
    /// `DatiGeneraliDocumento/Numero`.
    pub number: Option<String>,
    /// `DatiGeneraliDocumento/Data`.
    pub document_date: Option<NaiveDate>,
    /// Resolved due date (source or counterparty rule).
    pub due_date: Option<NaiveDate>,
    /// Date the document entered the books, if known.
    pub registration_date: Option<NaiveDate>,
    /// ISO 4217 currency (`Divisa`), "EUR" when absent.
    pub currency: String,
    pub total_taxable: Option<Decimal>,
    pub total_vat: Option<Decimal>,
    pub total_gross: Decimal,
    /// Year of the registration date, else of the document date.
    pub accounting_year: Option<i32>,
    pub doc_status: DocStatus,
    pub payment_status: PaymentStatus,
    /// File name, or `file_name#i` for body `i` of a multi-body file.
    pub source_key: String,
    pub file_name: String,
    pub content_hash: Option<String>,
    /// Free-form label of the batch origin ("inbox", "upload", ...).
    pub import_source: Option<String>,
    pub lines: Vec<DocumentLine>,
    pub vat_summaries: Vec<VatSummary>,
    pub payments: Vec<PaymentRow>,
}

/// A [`Document`] together with its database identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredDocument {
    pub id: i64,
    pub counterparty_id: i64,
    pub owning_entity_id: i64,
    pub imported_at: DateTime<Utc>,
    pub document: Document,
}

/// One line item (`DettaglioLinee`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentLine {
    pub line_number: Option<i64>,
    pub description: String,
    pub quantity: Option<Decimal>,
    pub unit_of_measure: Option<String>,
    pub unit_price: Option<Decimal>,
    pub discount_percent: Option<Decimal>,
    pub discount_amount: Option<Decimal>,
    pub taxable_amount: Option<Decimal>,
    pub vat_rate: Option<Decimal>,
    pub vat_amount: Option<Decimal>,
    pub total_line_amount: Option<Decimal>,
    /// First `CodiceArticolo/CodiceValore`.
    pub sku_code: Option<String>,
}

/// One VAT summary row (`DatiRiepilogo`), one per distinct rate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VatSummary {
    pub vat_rate: Decimal,
    pub taxable_amount: Decimal,
    pub vat_amount: Decimal,
    /// `Natura` code for exempt / out-of-scope rows (N1..N7).
    pub nature: Option<String>,
}

/// One expected payment installment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentRow {
    pub due_date: Option<NaiveDate>,
    pub expected_amount: Option<Decimal>,
    /// `CondizioniPagamento` (TP01 installments, TP02 full, TP03 advance).
    pub payment_terms: Option<String>,
    /// `ModalitaPagamento` (MP01 cash, MP05 bank transfer, ...).
    pub payment_method: Option<String>,
    pub status: PaymentStatus,
}

/// Issuer of a document (`CedentePrestatore`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Counterparty {
    pub id: i64,
    pub name: String,
    pub vat_number: Option<String>,
    pub fiscal_code: Option<String>,
    pub sdi_code: Option<String>,
    pub pec_email: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
    pub postal_code: Option<String>,
    pub city: Option<String>,
    pub province: Option<String>,
    pub country: String,
    /// Policy for computing due dates when the source gives none.
    pub due_date_rule: Option<DueDateRule>,
}

/// Internal legal entity receiving documents (`CessionarioCommittente`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OwningEntity {
    pub id: i64,
    pub name: String,
    pub vat_number: Option<String>,
    pub fiscal_code: Option<String>,
}

/// Append-only audit entry, one per produced document or per file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportAttempt {
    pub id: i64,
    pub file_name: String,
    pub content_hash: Option<String>,
    pub import_source: Option<String>,
    pub status: AttemptStatus,
    pub message: Option<String>,
    pub document_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

/// Identity of one import unit (one document body of one file).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UnitKey {
    pub source_key: String,
    pub file_name: String,
    pub content_hash: Option<String>,
}

impl UnitKey {
    /// Key for body `body_index` (1-based) of `body_count` bodies.
    ///
    /// Single-body files keep the plain file name and hash; multi-body files
    /// suffix both with `#i` so every body deduplicates on its own.
    pub fn for_body(
        file_name: &str,
        content_hash: Option<&str>,
        body_index: usize,
        body_count: usize,
    ) -> Self {
        if body_count > 1 {
            Self {
                source_key: format!("{file_name}#{body_index}"),
                file_name: file_name.to_string(),
                content_hash: content_hash.map(|h| format!("{h}#{body_index}")),
            }
        } else {
            Self {
                source_key: file_name.to_string(),
                file_name: file_name.to_string(),
                content_hash: content_hash.map(str::to_string),
            }
        }
    }
}

/// Invoice vs. credit note, derived from `TipoDocumento`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Invoice,
    CreditNote,
}

impl DocumentKind {
    /// `TD04` (credit note) and `TD08` (simplified credit note).
    pub const CREDIT_NOTE_CODES: [&'static str; 2] = ["TD04", "TD08"];

    /// Classify a `TipoDocumento` code. Unknown or missing codes are invoices.
    pub fn from_type_code(code: Option<&str>) -> Self {
        match code {
            Some(c)
                if Self::CREDIT_NOTE_CODES
                    .iter()
                    .any(|cn| cn.eq_ignore_ascii_case(c.trim())) =>
            {
                Self::CreditNote
            }
            _ => Self::Invoice,
        }
    }

    /// Column value.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Invoice => "invoice",
            Self::CreditNote => "credit_note",
        }
    }

    /// Parse a column value.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "invoice" => Some(Self::Invoice),
            "credit_note" => Some(Self::CreditNote),
            _ => None,
        }
    }
}

/// Lifecycle status of a persisted document. This pipeline only creates
/// `Imported`; the others are set downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocStatus {
    Imported,
    Verified,
    Rejected,
}

impl DocStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Imported => "imported",
            Self::Verified => "verified",
            Self::Rejected => "rejected",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "imported" => Some(Self::Imported),
            "verified" => Some(Self::Verified),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }
}

/// Settlement status of a document or installment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Unpaid,
    Partial,
    Paid,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unpaid => "unpaid",
            Self::Partial => "partial",
            Self::Paid => "paid",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "unpaid" => Some(Self::Unpaid),
            "partial" => Some(Self::Partial),
            "paid" => Some(Self::Paid),
            _ => None,
        }
    }
}

/// Outcome recorded in an [`ImportAttempt`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    Success,
    Skipped,
    Error,
}

impl AttemptStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Skipped => "skipped",
            Self::Error => "error",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "success" => Some(Self::Success),
            "skipped" => Some(Self::Skipped),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

/// Per-counterparty policy for computing a due date from the document date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DueDateRule {
    /// Due on the document date.
    Immediate,
    /// Document date + 30 days.
    Days30,
    /// Document date + 60 days.
    Days60,
    /// First day of the month after the document date.
    NextMonthFirst,
    /// Last day of the document date's month. Default when none is configured.
    EndOfMonth,
    /// Document date + n days.
    CustomDays(u32),
}

impl DueDateRule {
    /// Column value; `CustomDays` stores its day count separately.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Immediate => "immediate",
            Self::Days30 => "30d",
            Self::Days60 => "60d",
            Self::NextMonthFirst => "next_month_first",
            Self::EndOfMonth => "end_of_month",
            Self::CustomDays(_) => "custom",
        }
    }

    /// Day count for `CustomDays`.
    pub fn days(&self) -> Option<u32> {
        match self {
            Self::CustomDays(n) => Some(*n),
            _ => None,
        }
    }

    /// Rebuild from the stored code and optional day count.
    pub fn from_code(code: &str, days: Option<u32>) -> Option<Self> {
        match code {
            "immediate" => Some(Self::Immediate),
            "30d" => Some(Self::Days30),
            "60d" => Some(Self::Days60),
            "next_month_first" => Some(Self::NextMonthFirst),
            "end_of_month" => Some(Self::EndOfMonth),
            "custom" => days.map(Self::CustomDays),
            _ => None,
        }
    }
}

/// Key used to recognise an already-imported unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DedupRule {
    /// Source key against persisted documents.
    SourceKey,
    /// Content hash against successful import attempts.
    ContentHash,
}

impl DedupRule {
    /// Lookup order used unless configured otherwise.
    pub const DEFAULT_ORDER: [DedupRule; 2] = [DedupRule::SourceKey, DedupRule::ContentHash];
}

/// Why a file or unit produced no document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "reason")]
pub enum SkipReason {
    /// Sidecar metadata or SDI notification, not an invoice.
    NotAnInvoice { root: String },
    /// Already imported as `document_id`.
    Duplicate { document_id: i64, rule: DedupRule },
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotAnInvoice { root } => write!(f, "not an invoice (root <{root}>)"),
            Self::Duplicate { document_id, rule } => {
                let by = match rule {
                    DedupRule::SourceKey => "source key",
                    DedupRule::ContentHash => "content hash",
                };
                write!(f, "duplicate of document {document_id} (matched by {by})")
            }
        }
    }
}
