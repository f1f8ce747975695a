#![cfg(feature = "store")]

use chrono::NaiveDate;
use fattura::core::*;
use fattura::store::{NewAttempt, PersistContext, PersistOutcome, SqliteStore};
use rust_decimal_macros::dec;

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn rossi() -> PartyRecord {
    PartyBuilder::new()
        .name("Rossi Forniture SRL")
        .vat("IT", "01234567890")
        .address("Via Roma 10", "20121", "Milano", "IT")
        .build()
}

fn acme() -> PartyRecord {
    PartyBuilder::new().name("Acme SPA").vat("IT", "11111111111").build()
}

fn invoice(number: &str, type_code: &str) -> ParsedInvoice {
    ParsedInvoiceBuilder::new(number, date(2024, 3, 10))
        .type_code(type_code)
        .counterparty(rossi())
        .owner(acme())
        .add_line(
            LineBuilder::new("Carta A4", dec!(50.00))
                .line_number(1)
                .quantity(dec!(2), dec!(25.00))
                .vat_rate(dec!(22))
                .sku("CARTA-A4")
                .build(),
        )
        .add_line(
            LineBuilder::new("Toner", dec!(30.00))
                .line_number(2)
                .vat_rate(dec!(22))
                .discount_amount(dec!(5.00))
                .build(),
        )
        .vat_summary(dec!(22), dec!(80.00), dec!(17.60))
        .payment(PaymentRecord {
            payment_terms: Some("TP02".into()),
            payment_method: Some("MP05".into()),
            due_date: Some(date(2024, 4, 9)),
            expected_amount: Some(dec!(97.60)),
        })
        .total_gross(dec!(97.60))
        .build()
}

fn created(outcome: PersistOutcome) -> i64 {
    match outcome {
        PersistOutcome::Created { document_id, .. } => document_id,
        other => panic!("expected a new document, got {other:?}"),
    }
}

// ---------------------------------------------------------------------------
// Persistence
// ---------------------------------------------------------------------------

#[test]
fn persisted_document_reads_back() {
    let mut store = SqliteStore::open_in_memory().unwrap();
    let key = UnitKey::for_body("IT01234567890_FPR01.xml", Some("h1"), 1, 1);
    let ctx = PersistContext {
        import_source: Some("inbox"),
        ..Default::default()
    };
    let id = created(store.persist(&invoice("FPR 1/24", "TD01"), &key, &ctx).unwrap());

    let stored = store.document(id).unwrap().unwrap();
    let doc = &stored.document;
    assert_eq!(doc.kind, DocumentKind::Invoice);
    assert_eq!(doc.number.as_deref(), Some("FPR 1/24"));
    assert_eq!(doc.total_gross, dec!(97.60));
    assert_eq!(doc.total_taxable, Some(dec!(80.00)));
    assert_eq!(doc.due_date, Some(date(2024, 4, 9)));
    assert_eq!(doc.accounting_year, Some(2024));
    assert_eq!(doc.import_source.as_deref(), Some("inbox"));
    assert_eq!(doc.source_key, "IT01234567890_FPR01.xml");
    assert_eq!(doc.doc_status, DocStatus::Imported);
    assert_eq!(doc.payment_status, PaymentStatus::Unpaid);

    assert_eq!(doc.lines.len(), 2);
    assert_eq!(doc.lines[0].sku_code.as_deref(), Some("CARTA-A4"));
    assert_eq!(doc.lines[0].quantity, Some(dec!(2)));
    assert_eq!(doc.lines[1].description, "Toner");
    assert_eq!(doc.lines[1].discount_amount, Some(dec!(5.00)));
    assert_eq!(doc.vat_summaries.len(), 1);
    assert_eq!(doc.vat_summaries[0].vat_amount, dec!(17.60));
    assert_eq!(doc.payments.len(), 1);
    assert_eq!(doc.payments[0].payment_method.as_deref(), Some("MP05"));

    let cp = store.counterparty(stored.counterparty_id).unwrap().unwrap();
    assert_eq!(cp.name, "Rossi Forniture SRL");
    assert_eq!(cp.city.as_deref(), Some("Milano"));

    let by_key = store.document_by_source_key("IT01234567890_FPR01.xml").unwrap().unwrap();
    assert_eq!(by_key.id, id);
    assert!(store.document_by_source_key("missing.xml").unwrap().is_none());

    let attempts = store.attempts_for_file("IT01234567890_FPR01.xml").unwrap();
    assert_eq!(attempts.len(), 1);
    assert_eq!(attempts[0].status, AttemptStatus::Success);
    assert_eq!(attempts[0].document_id, Some(id));
    assert_eq!(attempts[0].content_hash.as_deref(), Some("h1"));
    assert_eq!(attempts[0].import_source.as_deref(), Some("inbox"));
}

#[test]
fn credit_note_is_stored_negative() {
    let mut store = SqliteStore::open_in_memory().unwrap();
    let key = UnitKey::for_body("nc.xml", None, 1, 1);
    let id = created(
        store
            .persist(&invoice("NC 1", "TD04"), &key, &PersistContext::default())
            .unwrap(),
    );
    let doc = store.document(id).unwrap().unwrap().document;
    assert_eq!(doc.kind, DocumentKind::CreditNote);
    assert_eq!(doc.total_gross, dec!(-97.60));
    assert_eq!(doc.lines[0].total_line_amount, Some(dec!(-50.00)));
    assert_eq!(doc.vat_summaries[0].taxable_amount, dec!(-80.00));
    assert!(doc.payments.is_empty());
}

#[test]
fn entities_are_shared_between_documents() {
    let mut store = SqliteStore::open_in_memory().unwrap();
    let ctx = PersistContext::default();
    let a = store
        .persist(&invoice("1", "TD01"), &UnitKey::for_body("a.xml", None, 1, 1), &ctx)
        .unwrap();
    let b = store
        .persist(&invoice("2", "TD01"), &UnitKey::for_body("b.xml", None, 1, 1), &ctx)
        .unwrap();
    let (
        PersistOutcome::Created {
            counterparty_id: cp_a,
            owning_entity_id: own_a,
            ..
        },
        PersistOutcome::Created {
            counterparty_id: cp_b,
            owning_entity_id: own_b,
            ..
        },
    ) = (a, b)
    else {
        panic!("expected two new documents");
    };
    assert_eq!(cp_a, cp_b);
    assert_eq!(own_a, own_b);
    assert_eq!(store.counterparties().unwrap().len(), 1);
    assert_eq!(store.owning_entities().unwrap()[0].name, "Acme SPA");
    assert_eq!(store.documents().unwrap().len(), 2);
}

// ---------------------------------------------------------------------------
// Deduplication
// ---------------------------------------------------------------------------

#[test]
fn same_source_key_is_a_duplicate() {
    let mut store = SqliteStore::open_in_memory().unwrap();
    let ctx = PersistContext::default();
    let key = UnitKey::for_body("a.xml", Some("h1"), 1, 1);
    let id = created(store.persist(&invoice("1", "TD01"), &key, &ctx).unwrap());

    let again = store.persist(&invoice("1", "TD01"), &key, &ctx).unwrap();
    assert_eq!(
        again,
        PersistOutcome::Duplicate {
            document_id: id,
            rule: DedupRule::SourceKey
        }
    );
    assert_eq!(store.documents().unwrap().len(), 1);
    // a duplicate writes no success attempt
    assert_eq!(store.attempts().unwrap().len(), 1);
}

#[test]
fn renamed_file_is_caught_by_content_hash() {
    let mut store = SqliteStore::open_in_memory().unwrap();
    let ctx = PersistContext::default();
    let id = created(
        store
            .persist(&invoice("1", "TD01"), &UnitKey::for_body("a.xml", Some("h1"), 1, 1), &ctx)
            .unwrap(),
    );
    let renamed = UnitKey::for_body("a (copy).xml", Some("h1"), 1, 1);
    assert_eq!(
        store.find_duplicate(&renamed, &DedupRule::DEFAULT_ORDER).unwrap(),
        Some((id, DedupRule::ContentHash))
    );
    // without the hash rule the renamed file is new
    assert_eq!(store.find_duplicate(&renamed, &[DedupRule::SourceKey]).unwrap(), None);
}

#[test]
fn dedup_order_decides_reported_rule() {
    let mut store = SqliteStore::open_in_memory().unwrap();
    let ctx = PersistContext::default();
    let key = UnitKey::for_body("a.xml", Some("h1"), 1, 1);
    let id = created(store.persist(&invoice("1", "TD01"), &key, &ctx).unwrap());

    let hash_first = [DedupRule::ContentHash, DedupRule::SourceKey];
    assert_eq!(
        store.find_duplicate(&key, &hash_first).unwrap(),
        Some((id, DedupRule::ContentHash))
    );
    assert_eq!(
        store.find_duplicate(&key, &DedupRule::DEFAULT_ORDER).unwrap(),
        Some((id, DedupRule::SourceKey))
    );
}

#[test]
fn bodies_of_one_file_are_distinct_units() {
    let mut store = SqliteStore::open_in_memory().unwrap();
    let ctx = PersistContext::default();
    for i in 1..=2 {
        let key = UnitKey::for_body("multi.xml", Some("h"), i, 2);
        created(store.persist(&invoice(&format!("M {i}"), "TD01"), &key, &ctx).unwrap());
    }
    let keys: Vec<String> = store
        .documents()
        .unwrap()
        .into_iter()
        .map(|d| d.document.source_key)
        .collect();
    assert_eq!(keys, ["multi.xml#1", "multi.xml#2"]);
}

#[test]
fn failed_attempts_do_not_count_for_hash_dedup() {
    let store = SqliteStore::open_in_memory().unwrap();
    store
        .record_attempt(&NewAttempt {
            file_name: "bad.xml",
            content_hash: Some("h9"),
            import_source: None,
            status: AttemptStatus::Error,
            message: Some("parse: truncated"),
            document_id: None,
        })
        .unwrap();
    let key = UnitKey::for_body("bad.xml", Some("h9"), 1, 1);
    assert_eq!(store.find_duplicate(&key, &DedupRule::DEFAULT_ORDER).unwrap(), None);

    let audit = store.attempts_for_file("bad.xml").unwrap();
    assert_eq!(audit.len(), 1);
    assert_eq!(audit[0].status, AttemptStatus::Error);
    assert_eq!(audit[0].message.as_deref(), Some("parse: truncated"));
}

// ---------------------------------------------------------------------------
// Due-date rules
// ---------------------------------------------------------------------------

#[test]
fn counterparty_rule_applies_to_later_imports() {
    let mut store = SqliteStore::open_in_memory().unwrap();
    let ctx = PersistContext::default();
    let no_due = || {
        ParsedInvoiceBuilder::new("X", date(2024, 3, 10))
            .counterparty(rossi())
            .totals(dec!(100.00), dec!(22.00))
            .build()
    };

    let first = store
        .persist(&no_due(), &UnitKey::for_body("1.xml", None, 1, 1), &ctx)
        .unwrap();
    let PersistOutcome::Created {
        document_id,
        counterparty_id,
        ..
    } = first
    else {
        panic!("expected a new document");
    };
    assert_eq!(
        store.document(document_id).unwrap().unwrap().document.due_date,
        Some(date(2024, 3, 31))
    );

    store
        .set_due_date_rule(counterparty_id, Some(DueDateRule::CustomDays(45)))
        .unwrap();
    let cp = store.counterparty(counterparty_id).unwrap().unwrap();
    assert_eq!(cp.due_date_rule, Some(DueDateRule::CustomDays(45)));

    let second = created(
        store
            .persist(&no_due(), &UnitKey::for_body("2.xml", None, 1, 1), &ctx)
            .unwrap(),
    );
    assert_eq!(
        store.document(second).unwrap().unwrap().document.due_date,
        Some(date(2024, 4, 24))
    );
}

#[test]
fn rule_for_unknown_counterparty_fails() {
    let store = SqliteStore::open_in_memory().unwrap();
    let err = store.set_due_date_rule(42, Some(DueDateRule::Days30)).unwrap_err();
    assert!(matches!(err, ImportError::Persistence(_)));
}

// ---------------------------------------------------------------------------
// Atomicity
// ---------------------------------------------------------------------------

#[test]
fn failure_mid_transaction_leaves_nothing_behind() {
    let mut store = SqliteStore::open_in_memory().unwrap();
    store
        .connection()
        .execute_batch(
            "CREATE TRIGGER reject_lines BEFORE INSERT ON document_lines
             BEGIN SELECT RAISE(ABORT, 'boom'); END;",
        )
        .unwrap();

    let key = UnitKey::for_body("a.xml", Some("h1"), 1, 1);
    let err = store
        .persist(&invoice("1", "TD01"), &key, &PersistContext::default())
        .unwrap_err();
    assert!(matches!(err, ImportError::Persistence(ref m) if m.contains("boom")), "{err}");
    assert_eq!(err.category(), "persistence");

    assert!(store.documents().unwrap().is_empty());
    assert!(store.attempts().unwrap().is_empty());
    assert!(store.counterparties().unwrap().is_empty());
    assert_eq!(store.find_duplicate(&key, &DedupRule::DEFAULT_ORDER).unwrap(), None);
}

#[test]
fn file_database_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("fattura.db");
    {
        let mut store = SqliteStore::open(&path).unwrap();
        created(
            store
                .persist(
                    &invoice("1", "TD01"),
                    &UnitKey::for_body("a.xml", None, 1, 1),
                    &PersistContext::default(),
                )
                .unwrap(),
        );
    }
    let store = SqliteStore::open(&path).unwrap();
    assert_eq!(store.documents().unwrap().len(), 1);
}
