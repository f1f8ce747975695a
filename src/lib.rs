//! # fattura
//!
//! Batch ingestion of Italian FatturaPA e-invoices: `.p7m` envelope
//! extraction, encoding repair, strict schema binding with a tolerant
//! fallback parser, normalization into a canonical document model, and
//! exactly-once persistence with a per-file audit trail.
//!
//! All monetary values use [`rust_decimal::Decimal`], never floating point.
//! Credit notes (`TD04`, `TD08`) are stored with sign-inverted amounts.
//!
//! ## Quick Start
//!
//! ```rust
//! use chrono::NaiveDate;
//! use fattura::*;
//! use rust_decimal_macros::dec;
//!
//! let dto = ParsedInvoiceBuilder::new("NC 3/24", NaiveDate::from_ymd_opt(2024, 3, 10).unwrap())
//!     .type_code("TD04")
//!     .counterparty(PartyBuilder::new().name("Rossi SRL").vat("IT", "01234567890").build())
//!     .add_line(LineBuilder::new("Reso merce", dec!(100.00)).vat_rate(dec!(22)).build())
//!     .vat_summary(dec!(22), dec!(100.00), dec!(22.00))
//!     .build();
//!
//! let key = UnitKey::for_body("IT01234567890_00003.xml", None, 1, 1);
//! let doc = normalize(&dto, &key, Some("inbox"), None);
//!
//! assert_eq!(doc.kind, DocumentKind::CreditNote);
//! assert_eq!(doc.total_gross, dec!(-122.00));
//! assert_eq!(doc.due_date, NaiveDate::from_ymd_opt(2024, 3, 31));
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `core` | Document model, transfer records, financial rules |
//! | `parse` | Envelope extraction, encoding repair, strict and tolerant parsers |
//! | `store` | SQLite persistence, deduplication, entity resolution |
//! | `import` (default) | Batch coordinator, archival, run summary |
//! | `all` | Everything |

#[cfg(feature = "core")]
pub mod core;

#[cfg(feature = "parse")]
pub mod fatturapa;

#[cfg(feature = "store")]
pub mod store;

#[cfg(feature = "import")]
pub mod import;

// Re-export core types at crate root for convenience
#[cfg(feature = "core")]
pub use crate::core::*;
