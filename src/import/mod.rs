//! Batch import: per-file coordination, archival and the run summary.
//!
//! # Example
//!
//! ```no_run
//! use fattura::import::{ImportConfig, Importer};
//! use fattura::store::SqliteStore;
//!
//! let store = SqliteStore::open("fatture.db").unwrap();
//! let mut importer = Importer::new(ImportConfig::from_env(), store);
//! let summary = importer.run_inbox();
//! println!("{} imported, {} skipped, {} errors", summary.imported, summary.skipped, summary.errors);
//! ```

mod archive;
mod config;
mod coordinator;
mod events;
mod source;
mod summary;

pub use archive::{archive_file, store_upload, unique_file_name};
pub use config::{ImportConfig, StoragePaths};
pub use coordinator::{CancelFlag, FileState, Importer, UnitOutcome};
pub use events::{EventLevel, EventLog, TracingEventLog};
pub use source::SourceFile;
pub use summary::{BatchSummary, FileDetail, FileStatus};
