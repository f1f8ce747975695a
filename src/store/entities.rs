//! Counterparty and owning-entity resolution.
//!
//! Lookup is by VAT number, then fiscal code. Existing rows are never
//! overwritten by later documents.

use rusqlite::{Connection, OptionalExtension, Row, params};

use crate::core::{Counterparty, DueDateRule, OwningEntity, PartyRecord};

const COUNTERPARTY_COLUMNS: &str = "id, name, vat_number, fiscal_code, sdi_code, pec_email, \
     email, address, postal_code, city, province, country, due_rule, due_days";

fn row_to_counterparty(row: &Row<'_>) -> rusqlite::Result<Counterparty> {
    let rule: Option<String> = row.get("due_rule")?;
    let days: Option<i64> = row.get("due_days")?;
    let days = days.and_then(|d| u32::try_from(d).ok());
    Ok(Counterparty {
        id: row.get("id")?,
        name: row.get("name")?,
        vat_number: row.get("vat_number")?,
        fiscal_code: row.get("fiscal_code")?,
        sdi_code: row.get("sdi_code")?,
        pec_email: row.get("pec_email")?,
        email: row.get("email")?,
        address: row.get("address")?,
        postal_code: row.get("postal_code")?,
        city: row.get("city")?,
        province: row.get("province")?,
        country: row.get("country")?,
        due_date_rule: rule.and_then(|r| DueDateRule::from_code(&r, days)),
    })
}

fn row_to_owning_entity(row: &Row<'_>) -> rusqlite::Result<OwningEntity> {
    Ok(OwningEntity {
        id: row.get("id")?,
        name: row.get("name")?,
        vat_number: row.get("vat_number")?,
        fiscal_code: row.get("fiscal_code")?,
    })
}

fn clean(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

// ---------------------------------------------------------------------------
// Counterparties
// ---------------------------------------------------------------------------

pub(crate) fn counterparty_by_id(conn: &Connection, id: i64) -> rusqlite::Result<Option<Counterparty>> {
    conn.query_row(
        &format!("SELECT {COUNTERPARTY_COLUMNS} FROM counterparties WHERE id = ?1"),
        [id],
        row_to_counterparty,
    )
    .optional()
}

pub(crate) fn all_counterparties(conn: &Connection) -> rusqlite::Result<Vec<Counterparty>> {
    let mut stmt =
        conn.prepare(&format!("SELECT {COUNTERPARTY_COLUMNS} FROM counterparties ORDER BY id"))?;
    let rows = stmt.query_map([], row_to_counterparty)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

fn counterparty_by_vat(conn: &Connection, vat: &str) -> rusqlite::Result<Option<Counterparty>> {
    conn.query_row(
        &format!("SELECT {COUNTERPARTY_COLUMNS} FROM counterparties WHERE vat_number = ?1"),
        [vat],
        row_to_counterparty,
    )
    .optional()
}

fn counterparty_by_fiscal_code(
    conn: &Connection,
    code: &str,
) -> rusqlite::Result<Option<Counterparty>> {
    conn.query_row(
        &format!(
            "SELECT {COUNTERPARTY_COLUMNS} FROM counterparties WHERE fiscal_code = ?1 ORDER BY id LIMIT 1"
        ),
        [code],
        row_to_counterparty,
    )
    .optional()
}

/// Find the issuer by VAT number, then fiscal code; create it otherwise.
pub(crate) fn resolve_counterparty(
    conn: &Connection,
    party: &PartyRecord,
) -> rusqlite::Result<Counterparty> {
    let vat = clean(party.vat_number.as_deref());
    let fiscal_code = clean(party.fiscal_code.as_deref());

    if let Some(vat) = vat {
        if let Some(found) = counterparty_by_vat(conn, vat)? {
            return Ok(found);
        }
    }
    if let Some(code) = fiscal_code {
        if let Some(found) = counterparty_by_fiscal_code(conn, code)? {
            return Ok(found);
        }
    }

    let country = clean(party.country.as_deref())
        .or(clean(party.vat_country.as_deref()))
        .unwrap_or("IT");
    conn.execute(
        "INSERT INTO counterparties
             (name, vat_number, fiscal_code, sdi_code, pec_email, email,
              address, postal_code, city, province, country)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            party.display_name(),
            vat,
            fiscal_code,
            clean(party.sdi_code.as_deref()),
            clean(party.pec_email.as_deref()),
            clean(party.email.as_deref()),
            clean(party.address.as_deref()),
            clean(party.postal_code.as_deref()),
            clean(party.city.as_deref()),
            clean(party.province.as_deref()),
            country,
        ],
    )?;
    let id = conn.last_insert_rowid();
    counterparty_by_id(conn, id)?.ok_or(rusqlite::Error::QueryReturnedNoRows)
}

// ---------------------------------------------------------------------------
// Owning entities
// ---------------------------------------------------------------------------

pub(crate) fn all_owning_entities(conn: &Connection) -> rusqlite::Result<Vec<OwningEntity>> {
    let mut stmt =
        conn.prepare("SELECT id, name, vat_number, fiscal_code FROM owning_entities ORDER BY id")?;
    let rows = stmt.query_map([], row_to_owning_entity)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

fn owning_entity_where(
    conn: &Connection,
    clause: &str,
    value: &str,
) -> rusqlite::Result<Option<i64>> {
    conn.query_row(
        &format!("SELECT id FROM owning_entities WHERE {clause} ORDER BY id LIMIT 1"),
        [value],
        |row| row.get(0),
    )
    .optional()
}

/// Find the recipient by VAT number, then fiscal code; create it otherwise.
///
/// A buyer block without tax identifiers is matched by name; with no name
/// either, it resolves to the entity named `default_name`.
pub(crate) fn resolve_owning_entity(
    conn: &Connection,
    party: &PartyRecord,
    default_name: &str,
) -> rusqlite::Result<i64> {
    let vat = clean(party.vat_number.as_deref());
    let fiscal_code = clean(party.fiscal_code.as_deref());

    if vat.is_none() && fiscal_code.is_none() {
        let name = clean(party.name.as_deref()).unwrap_or(default_name);
        if let Some(id) = owning_entity_where(
            conn,
            "name = ?1 AND vat_number IS NULL AND fiscal_code IS NULL",
            name,
        )? {
            return Ok(id);
        }
        conn.execute("INSERT INTO owning_entities (name) VALUES (?1)", [name])?;
        return Ok(conn.last_insert_rowid());
    }

    if let Some(vat) = vat {
        if let Some(id) = owning_entity_where(conn, "vat_number = ?1", vat)? {
            return Ok(id);
        }
    }
    if let Some(code) = fiscal_code {
        if let Some(id) = owning_entity_where(conn, "fiscal_code = ?1", code)? {
            return Ok(id);
        }
    }

    let name = clean(party.name.as_deref())
        .map(str::to_string)
        .unwrap_or_else(|| party.display_name());
    conn.execute(
        "INSERT INTO owning_entities (name, vat_number, fiscal_code) VALUES (?1, ?2, ?3)",
        params![name, vat, fiscal_code],
    )?;
    Ok(conn.last_insert_rowid())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::schema::migrate;

    fn conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        conn
    }

    fn party(name: &str, vat: Option<&str>, cf: Option<&str>) -> PartyRecord {
        PartyRecord {
            name: Some(name.into()),
            vat_number: vat.map(Into::into),
            fiscal_code: cf.map(Into::into),
            ..Default::default()
        }
    }

    #[test]
    fn counterparty_reused_by_vat() {
        let conn = conn();
        let a = resolve_counterparty(&conn, &party("Rossi SRL", Some("01234567890"), None)).unwrap();
        let b = resolve_counterparty(&conn, &party("Rossi S.r.l.", Some("01234567890"), None)).unwrap();
        assert_eq!(a.id, b.id);
        // first name wins
        assert_eq!(b.name, "Rossi SRL");
        assert_eq!(b.country, "IT");
    }

    #[test]
    fn counterparty_falls_back_to_fiscal_code() {
        let conn = conn();
        let a = resolve_counterparty(&conn, &party("Mario Rossi", None, Some("RSSMRA80A01H501U"))).unwrap();
        let b = resolve_counterparty(&conn, &party("M. Rossi", Some("99999999999"), Some("RSSMRA80A01H501U"))).unwrap();
        assert_eq!(a.id, b.id);
    }

    #[test]
    fn anonymous_counterparty_gets_placeholder_name() {
        let conn = conn();
        let c = resolve_counterparty(&conn, &PartyRecord::default()).unwrap();
        assert_eq!(c.name, "Fornitore sconosciuto");
    }

    #[test]
    fn owner_without_identity_uses_default() {
        let conn = conn();
        let a = resolve_owning_entity(&conn, &PartyRecord::default(), "Azienda").unwrap();
        let b = resolve_owning_entity(&conn, &PartyRecord::default(), "Azienda").unwrap();
        assert_eq!(a, b);
        let all = all_owning_entities(&conn).unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].name, "Azienda");
    }

    #[test]
    fn owner_resolved_by_vat() {
        let conn = conn();
        let p = party("Acme SPA", Some("11111111111"), None);
        let a = resolve_owning_entity(&conn, &p, "Azienda").unwrap();
        let b = resolve_owning_entity(&conn, &p, "Azienda").unwrap();
        assert_eq!(a, b);
    }
}
