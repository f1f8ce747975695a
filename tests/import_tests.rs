#![cfg(feature = "import")]

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use fattura::core::*;
use fattura::fatturapa::ScanOpener;
use fattura::import::*;
use fattura::store::SqliteStore;
use rust_decimal_macros::dec;
use tempfile::TempDir;

fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures/fatturapa")
        .join(name)
}

fn fixture(name: &str) -> Vec<u8> {
    std::fs::read(fixture_path(name)).unwrap()
}

/// Temp workspace with an inbox and an archive directory.
struct Workspace {
    dir: TempDir,
}

impl Workspace {
    fn new() -> Self {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("inbox")).unwrap();
        Self { dir }
    }

    fn inbox(&self) -> PathBuf {
        self.dir.path().join("inbox")
    }

    fn archive(&self) -> PathBuf {
        self.dir.path().join("archive")
    }

    fn config(&self) -> ImportConfig {
        ImportConfig::new(self.inbox(), self.archive())
    }

    fn drop_in(&self, names: &[&str]) {
        for name in names {
            std::fs::copy(fixture_path(name), self.inbox().join(name)).unwrap();
        }
    }

    fn importer(&self) -> Importer {
        Importer::new(self.config(), SqliteStore::open_in_memory().unwrap()).with_opener(ScanOpener)
    }
}

fn exists(path: impl AsRef<Path>) -> bool {
    path.as_ref().exists()
}

/// Collects events for assertions.
#[derive(Clone, Default)]
struct RecordingLog(Arc<Mutex<Vec<(String, EventLevel)>>>);

impl RecordingLog {
    fn actions(&self) -> Vec<String> {
        self.0.lock().unwrap().iter().map(|(a, _)| a.clone()).collect()
    }
}

impl EventLog for RecordingLog {
    fn log(&self, action: &str, level: EventLevel, _fields: &[(&str, String)]) {
        self.0.lock().unwrap().push((action.to_string(), level));
    }
}

// ---------------------------------------------------------------------------
// Directory batches
// ---------------------------------------------------------------------------

#[test]
fn imports_and_archives_by_year() {
    let ws = Workspace::new();
    ws.drop_in(&["IT01234567890_FPR01.xml", "IT01234567890_FPA01.xml"]);
    let mut importer = ws.importer();

    let summary = importer.run_inbox();
    assert_eq!(summary.source, "inbox");
    assert_eq!(summary.total_files, 2);
    assert_eq!(summary.processed, 2);
    assert_eq!(summary.imported, 2);
    assert_eq!((summary.skipped, summary.errors), (0, 0));

    assert!(exists(ws.archive().join("2024/IT01234567890_FPR01.xml")));
    assert!(exists(ws.archive().join("2024/IT01234567890_FPA01.xml")));
    assert!(!exists(ws.inbox().join("IT01234567890_FPR01.xml")));

    let docs = importer.store().documents().unwrap();
    assert_eq!(docs.len(), 2);
    // FPA01 sorts before FPR01
    assert_eq!(docs[0].document.number.as_deref(), Some("PA 5/24"));
    assert_eq!(docs[1].document.total_gross, dec!(97.60));
    assert_eq!(docs[1].document.import_source.as_deref(), Some("inbox"));
}

#[test]
fn second_run_skips_already_imported_files() {
    let ws = Workspace::new();
    ws.drop_in(&["IT01234567890_FPR01.xml"]);
    let mut importer = ws.importer();
    assert_eq!(importer.run_inbox().imported, 1);

    ws.drop_in(&["IT01234567890_FPR01.xml"]);
    let summary = importer.run_inbox();
    assert_eq!(summary.imported, 0);
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.errors, 0);
    assert!(summary.details[0].message.contains("matched by source key"));
    assert_eq!(importer.store().documents().unwrap().len(), 1);

    // the duplicate stays in the inbox; the archive keeps one copy
    assert!(exists(ws.inbox().join("IT01234567890_FPR01.xml")));
    assert!(!exists(ws.archive().join("2024/IT01234567890_FPR01_1.xml")));
}

#[test]
fn renamed_copy_is_caught_by_hash() {
    let ws = Workspace::new();
    ws.drop_in(&["IT01234567890_FPR01.xml"]);
    let mut importer = ws.importer();
    importer.run_inbox();

    std::fs::copy(
        fixture_path("IT01234567890_FPR01.xml"),
        ws.inbox().join("copia fattura.xml"),
    )
    .unwrap();
    let summary = importer.run_inbox();
    assert_eq!(summary.skipped, 1);
    assert!(summary.details[0].message.contains("matched by content hash"));
}

#[test]
fn broken_file_does_not_stop_the_batch() {
    const BROKEN: &str = "IT01234567890_FPR02.xml";
    let ws = Workspace::new();
    ws.drop_in(&["IT01234567890_FPR01.xml", "IT02222222222_NC01.xml"]);
    std::fs::copy(fixture_path("IT05555555555_BROKEN.xml"), ws.inbox().join(BROKEN)).unwrap();
    let mut importer = ws.importer();
    let summary = importer.run_inbox();

    assert_eq!(summary.processed, 3);
    assert_eq!(summary.imported, 2);
    assert_eq!(summary.errors, 1);

    // second in name order
    assert_eq!(summary.details[1].file_name, BROKEN);
    assert_eq!(summary.details[1].status, FileStatus::Error);
    assert!(summary.details[1].message.starts_with("parse: "), "{}", summary.details[1].message);
    assert_eq!(summary.details_for(BROKEN).count(), 1);

    assert!(exists(ws.inbox().join(BROKEN)));
    assert!(exists(ws.archive().join("2024/IT01234567890_FPR01.xml")));
    assert!(exists(ws.archive().join("2024/IT02222222222_NC01.xml")));

    let audit = importer.store().attempts_for_file(BROKEN).unwrap();
    assert_eq!(audit.len(), 1);
    assert_eq!(audit[0].status, AttemptStatus::Error);
    assert!(audit[0].content_hash.is_some());
}

#[test]
fn archive_failure_keeps_the_committed_document() {
    const NAME: &str = "IT01234567890_FPR01.xml";
    let ws = Workspace::new();
    ws.drop_in(&[NAME]);
    // a regular file where the archive directory should be
    std::fs::write(ws.archive(), "not a directory").unwrap();
    let log = RecordingLog::default();
    let mut importer = ws.importer().with_event_log(log.clone());

    let summary = importer.run_inbox();
    assert_eq!((summary.imported, summary.errors), (1, 0));
    assert_eq!(summary.details[0].status, FileStatus::Success);
    assert!(summary.details[0].message.contains("storage error: "), "{}", summary.details[0].message);
    assert_eq!(log.actions(), ["file_imported", "archive_failed"]);

    assert_eq!(importer.store().documents().unwrap().len(), 1);
    assert!(exists(ws.inbox().join(NAME)));
    let audit = importer.store().attempts_for_file(NAME).unwrap();
    assert_eq!(audit.len(), 1);
    assert_eq!(audit[0].status, AttemptStatus::Success);

    // the leftover is a duplicate on the next run and stays where it is
    let summary = importer.run_inbox();
    assert_eq!((summary.imported, summary.skipped), (0, 1));
    assert!(summary.details[0].message.contains("matched by source key"));
    assert!(exists(ws.inbox().join(NAME)));
    assert_eq!(importer.store().documents().unwrap().len(), 1);
}

#[test]
fn credit_note_lands_negative() {
    let ws = Workspace::new();
    ws.drop_in(&["IT02222222222_NC01.xml"]);
    let mut importer = ws.importer();
    importer.run_inbox();

    let doc = &importer.store().documents().unwrap()[0].document;
    assert_eq!(doc.kind, DocumentKind::CreditNote);
    assert_eq!(doc.total_gross, dec!(-122.00));
    assert!(doc.payments.is_empty());
}

#[test]
fn multi_body_file_yields_one_document_per_body() {
    let ws = Workspace::new();
    ws.drop_in(&["IT02222222222_MULTI.xml"]);
    let mut importer = ws.importer();
    let summary = importer.run_inbox();

    assert_eq!(summary.processed, 1);
    assert_eq!(summary.imported, 2);
    assert_eq!(summary.details.len(), 2);
    assert!(summary.details[0].message.contains("multiple bodies"));

    let docs = importer.store().documents().unwrap();
    let keys: Vec<&str> = docs.iter().map(|d| d.document.source_key.as_str()).collect();
    assert_eq!(keys, ["IT02222222222_MULTI.xml#1", "IT02222222222_MULTI.xml#2"]);
    assert_eq!(docs[1].document.total_gross, dec!(61.00));
    assert_eq!(docs[0].counterparty_id, docs[1].counterparty_id);
    assert!(exists(ws.archive().join("2024/IT02222222222_MULTI.xml")));
}

#[test]
fn non_invoices_are_skipped_not_failed() {
    let ws = Workspace::new();
    ws.drop_in(&[
        "IT01234567890_FPR01_MT_001.xml",
        "IT01234567890_FPR01_RC_001.xml",
    ]);
    let mut importer = ws.importer();
    let summary = importer.run_inbox();

    assert_eq!(summary.skipped, 2);
    assert_eq!(summary.errors, 0);
    assert!(summary.details.iter().all(|d| d.message.starts_with("not an invoice")));
    assert!(importer.store().documents().unwrap().is_empty());
    assert!(exists(ws.inbox().join("IT01234567890_FPR01_MT_001.xml")));
    assert_eq!(importer.store().attempts().unwrap().len(), 2);
}

#[test]
fn missing_total_and_tolerant_parse_are_warnings() {
    let ws = Workspace::new();
    ws.drop_in(&["IT03333333333_NOTOT.xml", "IT04444444444_LEGACY.xml"]);
    let mut importer = ws.importer();
    let summary = importer.run_inbox();
    assert_eq!(summary.imported, 2);

    let legacy: Vec<_> = summary.details_for("IT04444444444_LEGACY.xml").collect();
    assert!(legacy[0].message.contains("read with tolerant parser"));

    let store = importer.store();
    let notot = store.document_by_source_key("IT03333333333_NOTOT.xml").unwrap().unwrap();
    assert_eq!(notot.document.total_gross, dec!(97.60));
    let nr = store.document_by_source_key("IT04444444444_LEGACY.xml").unwrap().unwrap();
    assert_eq!(nr.document.total_gross, dec!(48.80));
}

#[test]
fn enveloped_file_is_imported() {
    let ws = Workspace::new();
    let mut der = vec![0x30, 0x82, 0x1F, 0x4A, 0x06, 0x09];
    der.extend(fixture("IT01234567890_FPA01.xml"));
    der.extend([0xA0, 0x82, 0x05, 0x00]);
    std::fs::write(ws.inbox().join("IT01234567890_FPA01.xml.p7m"), der).unwrap();

    let mut importer = ws.importer();
    let summary = importer.run_inbox();
    assert_eq!(summary.imported, 1, "{:?}", summary.details);
    assert!(exists(ws.archive().join("2024/IT01234567890_FPA01.xml.p7m")));
}

#[test]
fn only_xml_and_p7m_are_candidates() {
    let ws = Workspace::new();
    ws.drop_in(&["IT01234567890_FPR01.xml"]);
    std::fs::write(ws.inbox().join("note.txt"), "ciao").unwrap();
    std::fs::write(ws.inbox().join(".hidden.xml"), "<x/>").unwrap();

    let summary = ws.importer().run_inbox();
    assert_eq!(summary.total_files, 1);
    assert!(exists(ws.inbox().join("note.txt")));
}

#[test]
fn missing_inbox_is_a_single_error() {
    let ws = Workspace::new();
    let mut importer = ws.importer();
    let summary = importer.run_directory(&ws.dir.path().join("nope"));
    assert_eq!(summary.processed, 0);
    assert_eq!(summary.errors, 1);
    assert!(summary.details[0].message.starts_with("cannot list directory"));
}

// ---------------------------------------------------------------------------
// Cancellation and events
// ---------------------------------------------------------------------------

#[test]
fn cancelled_run_processes_nothing() {
    let ws = Workspace::new();
    ws.drop_in(&["IT01234567890_FPR01.xml", "IT01234567890_FPA01.xml"]);
    let log = RecordingLog::default();
    let mut importer = ws.importer().with_event_log(log.clone());
    importer.cancel_flag().cancel();

    let summary = importer.run_inbox();
    assert_eq!(summary.total_files, 2);
    assert_eq!(summary.processed, 0);
    assert!(summary.details.is_empty());
    assert_eq!(log.actions(), ["batch_cancelled"]);
    assert!(exists(ws.inbox().join("IT01234567890_FPR01.xml")));
}

#[test]
fn events_follow_the_outcome() {
    let ws = Workspace::new();
    ws.drop_in(&[
        "IT01234567890_FPR01.xml",
        "IT01234567890_FPR01_MT_001.xml",
        "IT05555555555_BROKEN.xml",
    ]);
    let log = RecordingLog::default();
    let mut importer = ws.importer().with_event_log(log.clone());
    importer.run_inbox();

    let actions = log.actions();
    assert_eq!(
        actions,
        ["file_imported", "file_stored", "file_skipped", "file_failed"]
    );
    let levels: Vec<EventLevel> = log.0.lock().unwrap().iter().map(|(_, l)| *l).collect();
    assert_eq!(levels[3], EventLevel::Error);
}

// ---------------------------------------------------------------------------
// Uploads
// ---------------------------------------------------------------------------

#[test]
fn uploads_are_stored_when_configured() {
    let ws = Workspace::new();
    let storage = ws.dir.path().join("storage");
    let config = ws.config().storage_base(&storage).source_label("upload");
    let mut importer = Importer::new(config, SqliteStore::open_in_memory().unwrap());

    let files = vec![
        SourceFile::from_upload("IT01234567890_FPR01.xml", fixture("IT01234567890_FPR01.xml")),
        SourceFile::from_upload("IT05555555555_BROKEN.xml", fixture("IT05555555555_BROKEN.xml")),
    ];
    let summary = importer.run_uploads(files);
    assert_eq!(summary.source, "upload");
    assert_eq!((summary.imported, summary.errors), (1, 1));
    assert!(exists(storage.join("2024/IT01234567890_FPR01.xml")));
    assert!(!exists(storage.join("2024/IT05555555555_BROKEN.xml")));

    let doc = &importer.store().documents().unwrap()[0].document;
    assert_eq!(doc.import_source.as_deref(), Some("upload"));
}

#[test]
fn uploads_without_storage_base_are_not_written() {
    let ws = Workspace::new();
    let mut importer = ws.importer();
    let summary = importer.run_uploads(vec![SourceFile::from_upload(
        "IT01234567890_FPA01.xml",
        fixture("IT01234567890_FPA01.xml"),
    )]);
    assert_eq!(summary.imported, 1);
    assert!(!exists(ws.archive()));
}

#[test]
fn summary_serializes_for_callers() {
    let ws = Workspace::new();
    ws.drop_in(&["IT05555555555_BROKEN.xml"]);
    let summary = ws.importer().run_inbox();
    let json = serde_json::to_value(&summary).unwrap();
    assert_eq!(json["errors"], 1);
    assert_eq!(json["details"][0]["status"], "error");
    assert!(json["details"][0].get("document_id").is_none());
}
