//! Table definitions. Money is stored as decimal TEXT, dates as ISO TEXT.

use rusqlite::Connection;

/// Applied on every open; every statement is idempotent.
pub(crate) const MIGRATIONS: &str = r#"
CREATE TABLE IF NOT EXISTS counterparties (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    name            TEXT NOT NULL,
    vat_number      TEXT UNIQUE,
    fiscal_code     TEXT,
    sdi_code        TEXT,
    pec_email       TEXT,
    email           TEXT,
    address         TEXT,
    postal_code     TEXT,
    city            TEXT,
    province        TEXT,
    country         TEXT NOT NULL DEFAULT 'IT',
    due_rule        TEXT,
    due_days        INTEGER
);
CREATE INDEX IF NOT EXISTS idx_counterparties_fiscal_code ON counterparties(fiscal_code);

CREATE TABLE IF NOT EXISTS owning_entities (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    name            TEXT NOT NULL,
    vat_number      TEXT UNIQUE,
    fiscal_code     TEXT
);
CREATE INDEX IF NOT EXISTS idx_owning_entities_fiscal_code ON owning_entities(fiscal_code);

CREATE TABLE IF NOT EXISTS documents (
    id                  INTEGER PRIMARY KEY AUTOINCREMENT,
    counterparty_id     INTEGER NOT NULL REFERENCES counterparties(id),
    owning_entity_id    INTEGER NOT NULL REFERENCES owning_entities(id),
    kind                TEXT NOT NULL,
    type_code           TEXT,
    number              TEXT,
    document_date       TEXT,
    due_date            TEXT,
    registration_date   TEXT,
    currency            TEXT NOT NULL,
    total_taxable       TEXT,
    total_vat           TEXT,
    total_gross         TEXT NOT NULL,
    accounting_year     INTEGER,
    doc_status          TEXT NOT NULL,
    payment_status      TEXT NOT NULL,
    source_key          TEXT NOT NULL UNIQUE,
    file_name           TEXT NOT NULL,
    content_hash        TEXT,
    import_source       TEXT,
    imported_at         TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_documents_content_hash ON documents(content_hash);

CREATE TABLE IF NOT EXISTS document_lines (
    id                  INTEGER PRIMARY KEY AUTOINCREMENT,
    document_id         INTEGER NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
    position            INTEGER NOT NULL,
    line_number         INTEGER,
    description         TEXT NOT NULL,
    quantity            TEXT,
    unit_of_measure     TEXT,
    unit_price          TEXT,
    discount_percent    TEXT,
    discount_amount     TEXT,
    taxable_amount      TEXT,
    vat_rate            TEXT,
    vat_amount          TEXT,
    total_line_amount   TEXT,
    sku_code            TEXT
);
CREATE INDEX IF NOT EXISTS idx_document_lines_document ON document_lines(document_id);

CREATE TABLE IF NOT EXISTS vat_summaries (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    document_id     INTEGER NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
    vat_rate        TEXT NOT NULL,
    taxable_amount  TEXT NOT NULL,
    vat_amount      TEXT NOT NULL,
    nature          TEXT
);
CREATE INDEX IF NOT EXISTS idx_vat_summaries_document ON vat_summaries(document_id);

CREATE TABLE IF NOT EXISTS payment_rows (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    document_id     INTEGER NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
    due_date        TEXT,
    expected_amount TEXT,
    payment_terms   TEXT,
    payment_method  TEXT,
    status          TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_payment_rows_document ON payment_rows(document_id);

CREATE TABLE IF NOT EXISTS import_attempts (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    file_name       TEXT NOT NULL,
    content_hash    TEXT,
    import_source   TEXT,
    status          TEXT NOT NULL,
    message         TEXT,
    document_id     INTEGER REFERENCES documents(id),
    created_at      TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_import_attempts_hash ON import_attempts(content_hash, status);
CREATE INDEX IF NOT EXISTS idx_import_attempts_file ON import_attempts(file_name);
"#;

pub(crate) fn migrate(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.execute_batch(MIGRATIONS)
}
