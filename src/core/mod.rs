//! Core document model, transfer records, and financial rules.
//!
//! Everything here is independent of the XML format and of the database:
//! the parsers produce [`ParsedInvoice`] records, [`normalize`] turns them
//! into canonical [`Document`]s, and the store persists those.

mod builder;
mod dto;
mod error;
mod finance;
mod types;

pub use builder::*;
pub use dto::*;
pub use error::*;
pub use finance::*;
pub use types::*;
