//! Document rows and their children.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};

use super::{decimal, decimal_to_sql, named, opt_decimal};
use crate::core::{
    DocStatus, Document, DocumentKind, DocumentLine, PaymentRow, PaymentStatus, StoredDocument,
    VatSummary,
};

const DOCUMENT_COLUMNS: &str = "id, counterparty_id, owning_entity_id, kind, type_code, number, \
     document_date, due_date, registration_date, currency, total_taxable, total_vat, total_gross, \
     accounting_year, doc_status, payment_status, source_key, file_name, content_hash, \
     import_source, imported_at";

/// Insert a document and all its children; returns the new id.
pub(crate) fn insert(
    conn: &Connection,
    doc: &Document,
    counterparty_id: i64,
    owning_entity_id: i64,
    imported_at: DateTime<Utc>,
) -> rusqlite::Result<i64> {
    conn.execute(
        "INSERT INTO documents
             (counterparty_id, owning_entity_id, kind, type_code, number,
              document_date, due_date, registration_date, currency,
              total_taxable, total_vat, total_gross, accounting_year,
              doc_status, payment_status, source_key, file_name,
              content_hash, import_source, imported_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20)",
        params![
            counterparty_id,
            owning_entity_id,
            doc.kind.as_str(),
            doc.type_code,
            doc.number,
            doc.document_date,
            doc.due_date,
            doc.registration_date,
            doc.currency,
            decimal_to_sql(doc.total_taxable),
            decimal_to_sql(doc.total_vat),
            doc.total_gross.to_string(),
            doc.accounting_year,
            doc.doc_status.as_str(),
            doc.payment_status.as_str(),
            doc.source_key,
            doc.file_name,
            doc.content_hash,
            doc.import_source,
            imported_at,
        ],
    )?;
    let document_id = conn.last_insert_rowid();

    for (position, line) in doc.lines.iter().enumerate() {
        conn.execute(
            "INSERT INTO document_lines
                 (document_id, position, line_number, description, quantity,
                  unit_of_measure, unit_price, discount_percent, discount_amount,
                  taxable_amount, vat_rate, vat_amount, total_line_amount, sku_code)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            params![
                document_id,
                position as i64,
                line.line_number,
                line.description,
                decimal_to_sql(line.quantity),
                line.unit_of_measure,
                decimal_to_sql(line.unit_price),
                decimal_to_sql(line.discount_percent),
                decimal_to_sql(line.discount_amount),
                decimal_to_sql(line.taxable_amount),
                decimal_to_sql(line.vat_rate),
                decimal_to_sql(line.vat_amount),
                decimal_to_sql(line.total_line_amount),
                line.sku_code,
            ],
        )?;
    }

    for summary in &doc.vat_summaries {
        conn.execute(
            "INSERT INTO vat_summaries (document_id, vat_rate, taxable_amount, vat_amount, nature)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                document_id,
                summary.vat_rate.to_string(),
                summary.taxable_amount.to_string(),
                summary.vat_amount.to_string(),
                summary.nature,
            ],
        )?;
    }

    for payment in &doc.payments {
        conn.execute(
            "INSERT INTO payment_rows
                 (document_id, due_date, expected_amount, payment_terms, payment_method, status)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                document_id,
                payment.due_date,
                decimal_to_sql(payment.expected_amount),
                payment.payment_terms,
                payment.payment_method,
                payment.status.as_str(),
            ],
        )?;
    }

    Ok(document_id)
}

fn row_to_stored(row: &Row<'_>) -> rusqlite::Result<StoredDocument> {
    Ok(StoredDocument {
        id: row.get("id")?,
        counterparty_id: row.get("counterparty_id")?,
        owning_entity_id: row.get("owning_entity_id")?,
        imported_at: row.get("imported_at")?,
        document: Document {
            kind: named(row, "kind", DocumentKind::from_name)?,
            type_code: row.get("type_code")?,
            number: row.get("number")?,
            document_date: row.get("document_date")?,
            due_date: row.get("due_date")?,
            registration_date: row.get("registration_date")?,
            currency: row.get("currency")?,
            total_taxable: opt_decimal(row, "total_taxable")?,
            total_vat: opt_decimal(row, "total_vat")?,
            total_gross: decimal(row, "total_gross")?,
            accounting_year: row.get("accounting_year")?,
            doc_status: named(row, "doc_status", DocStatus::from_name)?,
            payment_status: named(row, "payment_status", PaymentStatus::from_name)?,
            source_key: row.get("source_key")?,
            file_name: row.get("file_name")?,
            content_hash: row.get("content_hash")?,
            import_source: row.get("import_source")?,
            lines: Vec::new(),
            vat_summaries: Vec::new(),
            payments: Vec::new(),
        },
    })
}

fn row_to_line(row: &Row<'_>) -> rusqlite::Result<DocumentLine> {
    Ok(DocumentLine {
        line_number: row.get("line_number")?,
        description: row.get("description")?,
        quantity: opt_decimal(row, "quantity")?,
        unit_of_measure: row.get("unit_of_measure")?,
        unit_price: opt_decimal(row, "unit_price")?,
        discount_percent: opt_decimal(row, "discount_percent")?,
        discount_amount: opt_decimal(row, "discount_amount")?,
        taxable_amount: opt_decimal(row, "taxable_amount")?,
        vat_rate: opt_decimal(row, "vat_rate")?,
        vat_amount: opt_decimal(row, "vat_amount")?,
        total_line_amount: opt_decimal(row, "total_line_amount")?,
        sku_code: row.get("sku_code")?,
    })
}

fn row_to_summary(row: &Row<'_>) -> rusqlite::Result<VatSummary> {
    Ok(VatSummary {
        vat_rate: decimal(row, "vat_rate")?,
        taxable_amount: decimal(row, "taxable_amount")?,
        vat_amount: decimal(row, "vat_amount")?,
        nature: row.get("nature")?,
    })
}

fn row_to_payment(row: &Row<'_>) -> rusqlite::Result<PaymentRow> {
    Ok(PaymentRow {
        due_date: row.get("due_date")?,
        expected_amount: opt_decimal(row, "expected_amount")?,
        payment_terms: row.get("payment_terms")?,
        payment_method: row.get("payment_method")?,
        status: named(row, "status", PaymentStatus::from_name)?,
    })
}

fn children<T>(
    conn: &Connection,
    sql: &str,
    document_id: i64,
    map: fn(&Row<'_>) -> rusqlite::Result<T>,
) -> rusqlite::Result<Vec<T>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map([document_id], map)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

fn attach_children(conn: &Connection, stored: &mut StoredDocument) -> rusqlite::Result<()> {
    let doc = &mut stored.document;
    doc.lines = children(
        conn,
        "SELECT * FROM document_lines WHERE document_id = ?1 ORDER BY position",
        stored.id,
        row_to_line,
    )?;
    doc.vat_summaries = children(
        conn,
        "SELECT * FROM vat_summaries WHERE document_id = ?1 ORDER BY id",
        stored.id,
        row_to_summary,
    )?;
    doc.payments = children(
        conn,
        "SELECT * FROM payment_rows WHERE document_id = ?1 ORDER BY id",
        stored.id,
        row_to_payment,
    )?;
    Ok(())
}

pub(crate) fn load(conn: &Connection, id: i64) -> rusqlite::Result<Option<StoredDocument>> {
    let stored = conn
        .query_row(
            &format!("SELECT {DOCUMENT_COLUMNS} FROM documents WHERE id = ?1"),
            [id],
            row_to_stored,
        )
        .optional()?;
    match stored {
        Some(mut stored) => {
            attach_children(conn, &mut stored)?;
            Ok(Some(stored))
        }
        None => Ok(None),
    }
}

pub(crate) fn load_all(conn: &Connection) -> rusqlite::Result<Vec<StoredDocument>> {
    let mut stmt = conn.prepare(&format!("SELECT {DOCUMENT_COLUMNS} FROM documents ORDER BY id"))?;
    let rows = stmt.query_map([], row_to_stored)?;
    let mut out = Vec::new();
    for row in rows {
        let mut stored = row?;
        attach_children(conn, &mut stored)?;
        out.push(stored);
    }
    Ok(out)
}
