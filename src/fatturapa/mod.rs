//! FatturaPA reading: envelope extraction, encoding repair, classification,
//! and the strict/tolerant parser chain.
//!
//! # Example
//!
//! ```no_run
//! use fattura::fatturapa::{self, ParseOutcome, ScanOpener};
//!
//! let bytes = std::fs::read("IT01234567890_00001.xml.p7m").unwrap();
//! match fatturapa::parse_source(&bytes, "IT01234567890_00001.xml.p7m", &ScanOpener).unwrap() {
//!     ParseOutcome::Invoices(bodies) => println!("{} bodies", bodies.len()),
//!     ParseOutcome::Skipped(reason) => println!("skipped: {reason}"),
//! }
//! ```

mod classify;
mod encoding;
mod envelope;
mod legacy;
mod mapper;
mod schema;
mod tree;

pub use classify::{Classification, classify};
pub use encoding::{
    DecodeMode, DecodedDocument, SourceEncoding, clean_bytes, decode_cp1252, decode_document,
    decode_latin1,
};
pub use envelope::{
    ChainOpener, EnvelopeOpener, OpensslOpener, ScanOpener, decode_armour, extract_document,
    is_enveloped,
};
pub use legacy::{LegacyDocument, extract as extract_legacy};
pub use mapper::{from_legacy, from_schema, lenient_date, lenient_decimal};
pub use schema::{SchemaDocument, SchemaVariant, parse_schema};
pub use tree::{ParseMode, XmlElement, parse_tree};

use tracing::{info, warn};

use crate::core::{ImportError, ParsedInvoice, SkipReason};

/// Result of reading one source file.
#[derive(Debug, Clone)]
pub enum ParseOutcome {
    /// One record per document body, in declaration order.
    Invoices(Vec<ParsedInvoice>),
    /// Not an invoice (sidecar metadata, SDI notification, unknown root).
    Skipped(SkipReason),
}

/// Read a source file as stored on disk or uploaded: unwrap `.p7m`
/// envelopes with `opener`, then [`parse_document`].
pub fn parse_source(
    bytes: &[u8],
    file_name: &str,
    opener: &dyn EnvelopeOpener,
) -> Result<ParseOutcome, ImportError> {
    let inner = extract_document(bytes, file_name, opener)?;
    parse_document(&inner, file_name)
}

/// Read raw XML bytes.
///
/// The strict binding runs first, selected by `FormatoTrasmissione`. If it
/// fails the tolerant parser gets the same tree; if that fails too, the
/// strict error is returned.
pub fn parse_document(bytes: &[u8], file_name: &str) -> Result<ParseOutcome, ImportError> {
    let decoded = decode_document(bytes)?;
    let root = &decoded.root;

    let class = classify(file_name, root);
    if !class.is_invoice() {
        info!(file = %file_name, root = %root.name, kind = ?class, "skipping non-invoice document");
        return Ok(ParseOutcome::Skipped(SkipReason::NotAnInvoice {
            root: root.name.clone(),
        }));
    }

    let variant = if root.name.eq_ignore_ascii_case("FatturaElettronicaSemplificata") {
        SchemaVariant::Fsm10
    } else {
        SchemaVariant::from_format(
            root.text_at("//DatiTrasmissione/FormatoTrasmissione")
                .or_else(|| root.attribute("versione")),
        )
    };

    let mut invoices = match parse_schema(&decoded.xml, variant) {
        Ok(doc) => from_schema(&doc),
        Err(primary) => {
            warn!(file = %file_name, reason = %primary, "strict binding failed, using tolerant parser");
            match extract_legacy(root) {
                Ok(doc) => {
                    let mut invoices = from_legacy(&doc);
                    for invoice in &mut invoices {
                        invoice.warn(format!("read with tolerant parser: {primary}"));
                    }
                    invoices
                }
                Err(fallback) => {
                    warn!(file = %file_name, reason = %fallback, "tolerant parser failed");
                    return Err(primary);
                }
            }
        }
    };

    if decoded.encoding != SourceEncoding::Utf8 {
        for invoice in &mut invoices {
            invoice.warn(format!(
                "decoded as {:?} ({:?})",
                decoded.encoding, decoded.mode
            ));
        }
    }
    Ok(ParseOutcome::Invoices(invoices))
}
