//! Decide whether a parsed document is an invoice worth importing.
//!
//! SDI downloads come with sidecar files (`*_MT_*.xml` metadata, delivery
//! receipts, rejection notices) that share the inbox with the invoices.

use super::tree::XmlElement;

const INVOICE_ROOTS: &[&str] = &[
    "fatturaelettronica",
    "fatturaelettronicasemplificata",
    "fatturaelettronicabody",
];

const METADATA_ROOTS: &[&str] = &[
    "filemetadati",
    "metadatifattura",
    "metadatinotifica",
    "metadato",
    "metadati",
];

const NOTIFICATION_ROOTS: &[&str] = &[
    "ricevutaconsegna",
    "notificadecorrenzatermini",
    "notificaesitocommittente",
    "notificamancataconsegna",
    "notificascarto",
    "notificascarico",
    "notificafileacv",
    "notificafiledecorrenza",
    "attestazionetrasmissionefattura",
    "notificafile",
    "ricevutascarto",
    "ricevutaimpossibilitarecapito",
];

const METADATA_NAME_MARKERS: &[&str] = &["metadato", "metadata"];

/// What kind of document a root element denotes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Invoice,
    Metadata,
    Notification,
    Unknown,
}

impl Classification {
    pub fn is_invoice(&self) -> bool {
        matches!(self, Self::Invoice)
    }
}

/// Classify by root local name (case insensitive), then by file name.
///
/// An invoice root always wins; a file name containing `metadato` or
/// `metadata` is only consulted for non-invoice roots.
pub fn classify(file_name: &str, root: &XmlElement) -> Classification {
    let root_name = root.name.to_ascii_lowercase();
    if INVOICE_ROOTS.contains(&root_name.as_str()) {
        return Classification::Invoice;
    }
    if METADATA_ROOTS.contains(&root_name.as_str()) {
        return Classification::Metadata;
    }
    if NOTIFICATION_ROOTS.contains(&root_name.as_str()) {
        return Classification::Notification;
    }
    let lower_name = file_name.to_ascii_lowercase();
    if METADATA_NAME_MARKERS.iter().any(|m| lower_name.contains(m)) {
        return Classification::Metadata;
    }
    Classification::Unknown
}
