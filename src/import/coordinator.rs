use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{Datelike, Utc};
use tracing::{debug, warn};

use super::archive::{archive_file, store_upload};
use super::config::{ImportConfig, StoragePaths};
use super::events::{EventLevel, EventLog, TracingEventLog};
use super::source::SourceFile;
use super::summary::{BatchSummary, FileDetail, FileStatus};
use crate::core::{AttemptStatus, ImportError, ParsedInvoice, SkipReason, UnitKey};
use crate::fatturapa::{ChainOpener, EnvelopeOpener, ParseOutcome, parse_source};
use crate::store::{NewAttempt, PersistContext, PersistOutcome, SqliteStore};

/// Cooperative cancellation, checked between files.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Where a file is in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileState {
    Pending,
    Parsed,
    Mapped,
    Persisted,
    Archived,
    Skipped,
    Failed,
}

/// Result of one document body.
#[derive(Debug)]
pub enum UnitOutcome {
    Imported { document_id: i64 },
    Skipped(SkipReason),
    Failed(ImportError),
}

/// Where the batch came from; decides what happens after import.
#[derive(Clone, Copy)]
enum Origin<'a> {
    Inbox(&'a Path),
    Upload,
}

/// Runs batches of source files through parse, dedup and persistence.
///
/// No error escapes a run: every failure ends up in the returned
/// [`BatchSummary`] and in the audit trail.
pub struct Importer {
    config: ImportConfig,
    store: SqliteStore,
    opener: Box<dyn EnvelopeOpener>,
    events: Box<dyn EventLog>,
    cancel: CancelFlag,
}

impl Importer {
    pub fn new(config: ImportConfig, store: SqliteStore) -> Self {
        Self {
            config,
            store,
            opener: Box::new(ChainOpener::default()),
            events: Box::new(TracingEventLog),
            cancel: CancelFlag::new(),
        }
    }

    pub fn with_opener(mut self, opener: impl EnvelopeOpener + 'static) -> Self {
        self.opener = Box::new(opener);
        self
    }

    pub fn with_event_log(mut self, events: impl EventLog + 'static) -> Self {
        self.events = Box::new(events);
        self
    }

    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Handle for cancelling a run from elsewhere.
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    pub fn config(&self) -> &ImportConfig {
        &self.config
    }

    pub fn store(&self) -> &SqliteStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut SqliteStore {
        &mut self.store
    }

    pub fn into_store(self) -> SqliteStore {
        self.store
    }

    /// Import the configured inbox directory.
    pub fn run_inbox(&mut self) -> BatchSummary {
        let inbox = self.config.inbox_path().to_path_buf();
        self.run_directory(&inbox)
    }

    /// Import every `.xml` / `.p7m` file in `dir`, in name order. Imported
    /// files are moved to the archive.
    pub fn run_directory(&mut self, dir: &Path) -> BatchSummary {
        let mut summary = BatchSummary::new(self.config.source_label.clone());

        let candidates = match list_candidates(dir) {
            Ok(c) => c,
            Err(e) => {
                self.events.log(
                    "listing_failed",
                    EventLevel::Error,
                    &[("dir", dir.display().to_string()), ("error", e.to_string())],
                );
                summary.push(FileDetail {
                    file_name: dir.display().to_string(),
                    status: FileStatus::Error,
                    message: format!("cannot list directory: {e}"),
                    document_id: None,
                });
                return summary;
            }
        };
        summary.total_files = candidates.len();

        for path in candidates {
            if self.cancel.is_cancelled() {
                self.events.log(
                    "batch_cancelled",
                    EventLevel::Warn,
                    &[("remaining", (summary.total_files - summary.processed).to_string())],
                );
                break;
            }
            summary.processed += 1;
            match SourceFile::from_path(&path) {
                Ok(file) => self.process_file(&file, Origin::Inbox(&path), &mut summary),
                Err(e) => {
                    let file_name = path
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_else(|| path.display().to_string());
                    self.fail_file(&file_name, None, e, &mut summary);
                }
            }
        }
        summary
    }

    /// Import in-memory uploads. Nothing is archived; when a storage base is
    /// configured, imported payloads are copied under it by year.
    pub fn run_uploads(&mut self, files: Vec<SourceFile>) -> BatchSummary {
        let mut summary = BatchSummary::new(self.config.source_label.clone());
        summary.total_files = files.len();
        for file in &files {
            if self.cancel.is_cancelled() {
                self.events.log(
                    "batch_cancelled",
                    EventLevel::Warn,
                    &[("remaining", (summary.total_files - summary.processed).to_string())],
                );
                break;
            }
            summary.processed += 1;
            self.process_file(file, Origin::Upload, &mut summary);
        }
        summary
    }

    fn process_file(&mut self, file: &SourceFile, origin: Origin<'_>, summary: &mut BatchSummary) {
        let hash = file.content_hash();
        let mut state = FileState::Pending;

        let bodies = match parse_source(&file.bytes, &file.file_name, self.opener.as_ref()) {
            Ok(ParseOutcome::Invoices(bodies)) if !bodies.is_empty() => bodies,
            Ok(ParseOutcome::Invoices(_)) => {
                let err = ImportError::Parse("document carries no bodies".into());
                self.fail_file(&file.file_name, Some(&hash), err, summary);
                return;
            }
            Ok(ParseOutcome::Skipped(reason)) => {
                self.skip_file(&file.file_name, &hash, &reason, summary);
                return;
            }
            Err(e) => {
                self.fail_file(&file.file_name, Some(&hash), e, summary);
                return;
            }
        };
        advance(&file.file_name, &mut state, FileState::Parsed);

        let units: Vec<(UnitKey, &ParsedInvoice)> = bodies
            .iter()
            .map(|b| {
                let key = UnitKey::for_body(&file.file_name, Some(&hash), b.body_index, b.body_count);
                (key, b)
            })
            .collect();
        advance(&file.file_name, &mut state, FileState::Mapped);

        let first_detail = summary.details.len();
        let mut imported = 0usize;
        let mut failed = 0usize;
        for (key, body) in &units {
            let outcome = self.process_unit(body, key);
            let detail = self.record_unit(key, body, outcome);
            match detail.status {
                FileStatus::Success => imported += 1,
                FileStatus::Error => failed += 1,
                FileStatus::Skipped => {}
            }
            summary.push(detail);
        }

        if failed > 0 {
            advance(&file.file_name, &mut state, FileState::Failed);
            return;
        }
        if imported == 0 {
            advance(&file.file_name, &mut state, FileState::Skipped);
            return;
        }
        advance(&file.file_name, &mut state, FileState::Persisted);

        let year = bodies
            .iter()
            .find_map(|b| b.document_date)
            .map(|d| d.year())
            .unwrap_or_else(|| Utc::now().year());
        let stored = match origin {
            Origin::Inbox(path) => archive_file(&self.config, path, year).map(Some),
            Origin::Upload => store_upload(&self.config, &file.file_name, &file.bytes, year),
        };
        match stored {
            Ok(Some(target)) => {
                if matches!(origin, Origin::Inbox(_)) {
                    advance(&file.file_name, &mut state, FileState::Archived);
                }
                self.events.log(
                    "file_stored",
                    EventLevel::Debug,
                    &[
                        ("file", file.file_name.clone()),
                        ("target", target.display().to_string()),
                    ],
                );
            }
            Ok(None) => {}
            Err(e) => {
                self.events.log(
                    "archive_failed",
                    EventLevel::Error,
                    &[("file", file.file_name.clone()), ("error", e.to_string())],
                );
                if let Some(detail) = summary.details[first_detail..].last_mut() {
                    detail.message = format!("{}; {}", detail.message, e);
                }
            }
        }
    }

    /// Dedup check, then the persistence transaction.
    fn process_unit(&mut self, body: &ParsedInvoice, key: &UnitKey) -> UnitOutcome {
        match self.store.find_duplicate(key, &self.config.dedup_order) {
            Ok(Some((document_id, rule))) => {
                return UnitOutcome::Skipped(SkipReason::Duplicate { document_id, rule });
            }
            Ok(None) => {}
            Err(e) => return UnitOutcome::Failed(e),
        }

        let ctx = PersistContext {
            import_source: Some(self.config.source_label.as_str()),
            dedup_order: &self.config.dedup_order,
            default_owner_name: &self.config.default_owner_name,
        };
        match self.store.persist(body, key, &ctx) {
            Ok(PersistOutcome::Created { document_id, .. }) => UnitOutcome::Imported { document_id },
            Ok(PersistOutcome::Duplicate { document_id, rule }) => {
                UnitOutcome::Skipped(SkipReason::Duplicate { document_id, rule })
            }
            Err(e) => UnitOutcome::Failed(e),
        }
    }

    /// Log the unit outcome, write its audit entry (success entries are
    /// written inside the document transaction) and build its detail.
    fn record_unit(&self, key: &UnitKey, body: &ParsedInvoice, outcome: UnitOutcome) -> FileDetail {
        let number = body.number.as_deref().unwrap_or("(no number)");
        match outcome {
            UnitOutcome::Imported { document_id } => {
                for w in &body.warnings {
                    warn!(file = %key.file_name, document_id, warning = %w, "import warning");
                }
                self.events.log(
                    "file_imported",
                    EventLevel::Info,
                    &[
                        ("file", key.source_key.clone()),
                        ("document_id", document_id.to_string()),
                        ("number", number.to_string()),
                        ("warnings", body.warnings.len().to_string()),
                    ],
                );
                let mut message = format!("imported {number}");
                if !body.warnings.is_empty() {
                    message = format!("{message} ({})", body.warnings.join("; "));
                }
                FileDetail {
                    file_name: key.file_name.clone(),
                    status: FileStatus::Success,
                    message,
                    document_id: Some(document_id),
                }
            }
            UnitOutcome::Skipped(reason) => {
                let document_id = match &reason {
                    SkipReason::Duplicate { document_id, .. } => Some(*document_id),
                    SkipReason::NotAnInvoice { .. } => None,
                };
                let message = reason.to_string();
                self.events.log(
                    "file_skipped",
                    EventLevel::Info,
                    &[("file", key.source_key.clone()), ("reason", message.clone())],
                );
                self.audit(&NewAttempt {
                    file_name: &key.file_name,
                    content_hash: key.content_hash.as_deref(),
                    import_source: Some(self.config.source_label.as_str()),
                    status: AttemptStatus::Skipped,
                    message: Some(&message),
                    document_id,
                });
                FileDetail {
                    file_name: key.file_name.clone(),
                    status: FileStatus::Skipped,
                    message,
                    document_id,
                }
            }
            UnitOutcome::Failed(e) => {
                let message = format!("{}: {e}", e.category());
                self.events.log(
                    "file_failed",
                    EventLevel::Error,
                    &[
                        ("file", key.source_key.clone()),
                        ("reason", e.category().to_string()),
                        ("error", e.to_string()),
                    ],
                );
                self.audit(&NewAttempt {
                    file_name: &key.file_name,
                    content_hash: key.content_hash.as_deref(),
                    import_source: Some(self.config.source_label.as_str()),
                    status: AttemptStatus::Error,
                    message: Some(&message),
                    document_id: None,
                });
                FileDetail {
                    file_name: key.file_name.clone(),
                    status: FileStatus::Error,
                    message,
                    document_id: None,
                }
            }
        }
    }

    fn skip_file(&self, file_name: &str, hash: &str, reason: &SkipReason, summary: &mut BatchSummary) {
        let message = reason.to_string();
        self.events.log(
            "file_skipped",
            EventLevel::Info,
            &[("file", file_name.to_string()), ("reason", message.clone())],
        );
        self.audit(&NewAttempt {
            file_name,
            content_hash: Some(hash),
            import_source: Some(self.config.source_label.as_str()),
            status: AttemptStatus::Skipped,
            message: Some(&message),
            document_id: None,
        });
        summary.push(FileDetail {
            file_name: file_name.to_string(),
            status: FileStatus::Skipped,
            message,
            document_id: None,
        });
    }

    fn fail_file(
        &self,
        file_name: &str,
        hash: Option<&str>,
        error: ImportError,
        summary: &mut BatchSummary,
    ) {
        let message = format!("{}: {error}", error.category());
        self.events.log(
            "file_failed",
            EventLevel::Error,
            &[
                ("file", file_name.to_string()),
                ("reason", error.category().to_string()),
                ("error", error.to_string()),
            ],
        );
        self.audit(&NewAttempt {
            file_name,
            content_hash: hash,
            import_source: Some(self.config.source_label.as_str()),
            status: AttemptStatus::Error,
            message: Some(&message),
            document_id: None,
        });
        summary.push(FileDetail {
            file_name: file_name.to_string(),
            status: FileStatus::Error,
            message,
            document_id: None,
        });
    }

    /// Audit writes must not abort the batch.
    fn audit(&self, attempt: &NewAttempt<'_>) {
        if let Err(e) = self.store.record_attempt(attempt) {
            warn!(file = %attempt.file_name, error = %e, "could not record import attempt");
        }
    }
}

fn advance(file_name: &str, state: &mut FileState, next: FileState) {
    debug!(file = %file_name, from = ?state, to = ?next, "file state");
    *state = next;
}

/// `.xml` and `.p7m` files in `dir`, hidden files excluded, sorted by name.
fn list_candidates(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_ascii_lowercase();
        if name.starts_with('.') {
            continue;
        }
        if name.ends_with(".xml") || name.ends_with(".p7m") {
            out.push(entry.path());
        }
    }
    out.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn candidates_filtered_and_sorted() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.xml", "a.XML.p7m", ".hidden.xml", "notes.txt", "c.P7M"] {
            fs::write(dir.path().join(name), b"").unwrap();
        }
        fs::create_dir(dir.path().join("sub.xml")).unwrap();
        let names: Vec<String> = list_candidates(dir.path())
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, ["a.XML.p7m", "b.xml", "c.P7M"]);
    }

    #[test]
    fn cancel_flag_is_shared() {
        let flag = CancelFlag::new();
        let other = flag.clone();
        other.cancel();
        assert!(flag.is_cancelled());
    }
}
