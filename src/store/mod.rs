//! SQLite persistence: deduplication, entity resolution, the per-document
//! transaction, the audit trail, and a small read model.
//!
//! # Example
//!
//! ```
//! use fattura::store::{PersistContext, PersistOutcome, SqliteStore};
//! use fattura::*;
//! use rust_decimal_macros::dec;
//! use chrono::NaiveDate;
//!
//! let mut store = SqliteStore::open_in_memory().unwrap();
//! let dto = ParsedInvoiceBuilder::new("1/24", NaiveDate::from_ymd_opt(2024, 3, 10).unwrap())
//!     .counterparty(PartyBuilder::new().name("Rossi SRL").vat("IT", "01234567890").build())
//!     .totals(dec!(80.00), dec!(17.60))
//!     .build();
//! let key = UnitKey::for_body("a.xml", Some("hash"), 1, 1);
//!
//! let outcome = store.persist(&dto, &key, &PersistContext::default()).unwrap();
//! let PersistOutcome::Created { document_id, .. } = outcome else { panic!() };
//! let doc = store.document(document_id).unwrap().unwrap();
//! assert_eq!(doc.document.total_gross, dec!(97.60));
//! ```

mod attempts;
mod documents;
mod entities;
mod schema;

use std::path::Path;
use std::str::FromStr;

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, Row, TransactionBehavior, params};
use rust_decimal::Decimal;
use tracing::debug;

use crate::core::*;

pub use attempts::NewAttempt;

/// Converts database errors into the crate taxonomy.
pub(crate) fn map_db_error(e: rusqlite::Error) -> ImportError {
    ImportError::Persistence(e.to_string())
}

/// Options for [`SqliteStore::persist`].
#[derive(Debug, Clone, Copy)]
pub struct PersistContext<'a> {
    /// Label recorded on documents and attempts.
    pub import_source: Option<&'a str>,
    /// Duplicate checks, in order.
    pub dedup_order: &'a [DedupRule],
    /// Owning-entity name used when the buyer block carries no identity.
    pub default_owner_name: &'a str,
}

impl Default for PersistContext<'_> {
    fn default() -> Self {
        Self {
            import_source: None,
            dedup_order: &DedupRule::DEFAULT_ORDER,
            default_owner_name: DEFAULT_OWNER_NAME,
        }
    }
}

/// Owning-entity name when neither the document nor the configuration
/// names one.
pub const DEFAULT_OWNER_NAME: &str = "Azienda";

/// What [`SqliteStore::persist`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistOutcome {
    Created {
        document_id: i64,
        counterparty_id: i64,
        owning_entity_id: i64,
    },
    /// Another transaction committed the same unit first.
    Duplicate { document_id: i64, rule: DedupRule },
}

/// SQLite-backed document store.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open (or create) a database file and apply migrations.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ImportError> {
        let conn = Connection::open(path).map_err(map_db_error)?;
        Self::from_connection(conn)
    }

    /// In-memory database, for tests and one-off runs.
    pub fn open_in_memory() -> Result<Self, ImportError> {
        let conn = Connection::open_in_memory().map_err(map_db_error)?;
        Self::from_connection(conn)
    }

    /// Wrap an existing connection and apply migrations.
    pub fn from_connection(conn: Connection) -> Result<Self, ImportError> {
        schema::migrate(&conn).map_err(map_db_error)?;
        Ok(Self { conn })
    }

    /// The underlying connection, for ad-hoc queries.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Look for an already imported unit, trying `order` in sequence.
    pub fn find_duplicate(
        &self,
        key: &UnitKey,
        order: &[DedupRule],
    ) -> Result<Option<(i64, DedupRule)>, ImportError> {
        find_duplicate_in(&self.conn, key, order).map_err(map_db_error)
    }

    /// Persist one body in a single transaction.
    ///
    /// Re-checks for duplicates, resolves or creates the counterparty and
    /// the owning entity, normalizes the body with the counterparty's due
    /// rule, inserts the document with its lines, VAT rows and payment rows,
    /// and appends the success attempt. Nothing is written if any step fails.
    pub fn persist(
        &mut self,
        dto: &ParsedInvoice,
        key: &UnitKey,
        ctx: &PersistContext<'_>,
    ) -> Result<PersistOutcome, ImportError> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(map_db_error)?;

        if let Some((document_id, rule)) =
            find_duplicate_in(&tx, key, ctx.dedup_order).map_err(map_db_error)?
        {
            return Ok(PersistOutcome::Duplicate { document_id, rule });
        }

        let counterparty =
            entities::resolve_counterparty(&tx, &dto.counterparty).map_err(map_db_error)?;
        let owning_entity_id =
            entities::resolve_owning_entity(&tx, &dto.owner, ctx.default_owner_name)
                .map_err(map_db_error)?;

        let document = normalize(dto, key, ctx.import_source, counterparty.due_date_rule);
        let document_id = documents::insert(
            &tx,
            &document,
            counterparty.id,
            owning_entity_id,
            Utc::now(),
        )
        .map_err(map_db_error)?;

        let message = format!(
            "imported {} {}",
            document.kind.as_str(),
            document.number.as_deref().unwrap_or("(no number)")
        );
        attempts::insert(
            &tx,
            &NewAttempt {
                file_name: &key.file_name,
                content_hash: key.content_hash.as_deref(),
                import_source: ctx.import_source,
                status: AttemptStatus::Success,
                message: Some(&message),
                document_id: Some(document_id),
            },
        )
        .map_err(map_db_error)?;

        tx.commit().map_err(map_db_error)?;
        debug!(document_id, source_key = %key.source_key, "document committed");
        Ok(PersistOutcome::Created {
            document_id,
            counterparty_id: counterparty.id,
            owning_entity_id,
        })
    }

    /// Append an audit entry outside any document transaction.
    pub fn record_attempt(&self, attempt: &NewAttempt<'_>) -> Result<i64, ImportError> {
        attempts::insert(&self.conn, attempt).map_err(map_db_error)
    }

    // -- read model ---------------------------------------------------------

    pub fn document(&self, id: i64) -> Result<Option<StoredDocument>, ImportError> {
        documents::load(&self.conn, id).map_err(map_db_error)
    }

    pub fn document_by_source_key(
        &self,
        source_key: &str,
    ) -> Result<Option<StoredDocument>, ImportError> {
        let id: Option<i64> = self
            .conn
            .query_row(
                "SELECT id FROM documents WHERE source_key = ?1",
                [source_key],
                |row| row.get(0),
            )
            .optional()
            .map_err(map_db_error)?;
        match id {
            Some(id) => self.document(id),
            None => Ok(None),
        }
    }

    /// All documents in insertion order.
    pub fn documents(&self) -> Result<Vec<StoredDocument>, ImportError> {
        documents::load_all(&self.conn).map_err(map_db_error)
    }

    /// Full audit trail in insertion order.
    pub fn attempts(&self) -> Result<Vec<ImportAttempt>, ImportError> {
        attempts::list(&self.conn, None).map_err(map_db_error)
    }

    pub fn attempts_for_file(&self, file_name: &str) -> Result<Vec<ImportAttempt>, ImportError> {
        attempts::list(&self.conn, Some(file_name)).map_err(map_db_error)
    }

    pub fn counterparty(&self, id: i64) -> Result<Option<Counterparty>, ImportError> {
        entities::counterparty_by_id(&self.conn, id).map_err(map_db_error)
    }

    pub fn counterparties(&self) -> Result<Vec<Counterparty>, ImportError> {
        entities::all_counterparties(&self.conn).map_err(map_db_error)
    }

    pub fn owning_entities(&self) -> Result<Vec<OwningEntity>, ImportError> {
        entities::all_owning_entities(&self.conn).map_err(map_db_error)
    }

    /// Configure (or clear) a counterparty's due-date rule. Applies to
    /// documents imported afterwards.
    pub fn set_due_date_rule(
        &self,
        counterparty_id: i64,
        rule: Option<DueDateRule>,
    ) -> Result<(), ImportError> {
        let changed = self
            .conn
            .execute(
                "UPDATE counterparties SET due_rule = ?1, due_days = ?2 WHERE id = ?3",
                params![
                    rule.map(|r| r.code()),
                    rule.and_then(|r| r.days()),
                    counterparty_id
                ],
            )
            .map_err(map_db_error)?;
        if changed == 0 {
            return Err(ImportError::Persistence(format!(
                "counterparty {counterparty_id} not found"
            )));
        }
        Ok(())
    }
}

fn find_duplicate_in(
    conn: &Connection,
    key: &UnitKey,
    order: &[DedupRule],
) -> rusqlite::Result<Option<(i64, DedupRule)>> {
    for rule in order {
        let found: Option<i64> = match rule {
            DedupRule::SourceKey => conn
                .query_row(
                    "SELECT id FROM documents WHERE source_key = ?1",
                    [&key.source_key],
                    |row| row.get(0),
                )
                .optional()?,
            DedupRule::ContentHash => match &key.content_hash {
                Some(hash) => conn
                    .query_row(
                        "SELECT document_id FROM import_attempts
                         WHERE content_hash = ?1 AND status = 'success' AND document_id IS NOT NULL
                         ORDER BY id LIMIT 1",
                        [hash],
                        |row| row.get(0),
                    )
                    .optional()?,
                None => None,
            },
        };
        if let Some(id) = found {
            return Ok(Some((id, *rule)));
        }
    }
    Ok(None)
}

// -- column helpers ---------------------------------------------------------

fn conversion_error(row: &Row<'_>, col: &str, message: String) -> rusqlite::Error {
    let index = row.as_ref().column_index(col).unwrap_or_default();
    rusqlite::Error::FromSqlConversionFailure(
        index,
        rusqlite::types::Type::Text,
        Box::<dyn std::error::Error + Send + Sync>::from(message),
    )
}

pub(crate) fn decimal_to_sql(d: Option<Decimal>) -> Option<String> {
    d.map(|d| d.to_string())
}

pub(crate) fn opt_decimal(row: &Row<'_>, col: &str) -> rusqlite::Result<Option<Decimal>> {
    match row.get::<_, Option<String>>(col)? {
        Some(raw) => Decimal::from_str(&raw)
            .map(Some)
            .map_err(|e| conversion_error(row, col, format!("{col}: {e}"))),
        None => Ok(None),
    }
}

pub(crate) fn decimal(row: &Row<'_>, col: &str) -> rusqlite::Result<Decimal> {
    opt_decimal(row, col)?
        .ok_or_else(|| conversion_error(row, col, format!("{col} is NULL")))
}

/// Read a TEXT column through a `from_name`-style parser.
pub(crate) fn named<T>(
    row: &Row<'_>,
    col: &str,
    parse: fn(&str) -> Option<T>,
) -> rusqlite::Result<T> {
    let raw: String = row.get(col)?;
    parse(&raw).ok_or_else(|| conversion_error(row, col, format!("unknown {col} {raw:?}")))
}
