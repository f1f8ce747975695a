//! Financial rules applied between parsing and persistence.

use chrono::{Datelike, Days, Months, NaiveDate};
use rust_decimal::Decimal;

use super::dto::ParsedInvoice;
use super::types::*;

/// Where a document's gross total came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrossSource {
    /// `ImportoTotaleDocumento` in the source.
    Explicit,
    /// Taxable + VAT + rounding from the VAT summaries.
    Summaries,
    /// Sum of line totals; the least trustworthy path.
    LineSum,
}

/// Gross total of a body: the explicit total, else
/// `total_taxable + total_vat + rounding`, else the sum of line totals.
pub fn gross_total(dto: &ParsedInvoice) -> (Decimal, GrossSource) {
    if let Some(gross) = dto.total_gross {
        return (gross, GrossSource::Explicit);
    }
    if let (Some(taxable), Some(vat)) = (dto.total_taxable, dto.total_vat) {
        let rounding = dto.rounding.unwrap_or_default();
        return (taxable + vat + rounding, GrossSource::Summaries);
    }
    (dto.line_total_sum(), GrossSource::LineSum)
}

/// Fill a missing gross total in place, warning when it had to come from
/// the line totals.
pub fn fill_gross_total(dto: &mut ParsedInvoice) {
    let (gross, source) = gross_total(dto);
    if source == GrossSource::LineSum {
        dto.warn(format!(
            "total amount missing: derived from line totals ({gross})"
        ));
    }
    dto.total_gross = Some(gross);
}

/// Due date implied by `rule` for a document dated `date`.
pub fn due_date_from_rule(date: NaiveDate, rule: DueDateRule) -> NaiveDate {
    match rule {
        DueDateRule::Immediate => date,
        DueDateRule::Days30 => add_days(date, 30),
        DueDateRule::Days60 => add_days(date, 60),
        DueDateRule::CustomDays(n) => add_days(date, n),
        DueDateRule::NextMonthFirst => first_of_next_month(date),
        DueDateRule::EndOfMonth => first_of_next_month(date).pred_opt().unwrap_or(date),
    }
}

/// Resolve the due date to persist.
///
/// A source due date is trusted when it differs from the document date;
/// otherwise the counterparty rule applies, [`DueDateRule::EndOfMonth`] when
/// none is configured.
pub fn resolve_due_date(
    source_due: Option<NaiveDate>,
    document_date: Option<NaiveDate>,
    rule: Option<DueDateRule>,
) -> Option<NaiveDate> {
    match (source_due, document_date) {
        (Some(due), Some(date)) if due != date => Some(due),
        (Some(due), None) => Some(due),
        (_, Some(date)) => Some(due_date_from_rule(
            date,
            rule.unwrap_or(DueDateRule::EndOfMonth),
        )),
        (None, None) => None,
    }
}

/// Year of the registration date, else of the document date.
pub fn accounting_year(
    registration_date: Option<NaiveDate>,
    document_date: Option<NaiveDate>,
) -> Option<i32> {
    registration_date.or(document_date).map(|d| d.year())
}

/// Apply the sign convention of `kind`: credit notes carry negative amounts
/// of unchanged magnitude.
pub fn signed(kind: DocumentKind, amount: Decimal) -> Decimal {
    match kind {
        DocumentKind::Invoice => amount,
        DocumentKind::CreditNote => -amount.abs(),
    }
}

/// Turn a parsed body into the canonical [`Document`].
///
/// `due_rule` is the resolved counterparty's configured rule. Credit notes
/// get every amount sign-inverted and their payment rows dropped.
pub fn normalize(
    dto: &ParsedInvoice,
    key: &UnitKey,
    import_source: Option<&str>,
    due_rule: Option<DueDateRule>,
) -> Document {
    let kind = DocumentKind::from_type_code(dto.type_code.as_deref());
    let sign = |v: Decimal| signed(kind, v);
    let (gross, _) = gross_total(dto);

    let lines = dto
        .lines
        .iter()
        .map(|l| DocumentLine {
            line_number: l.line_number,
            description: l.description.clone(),
            quantity: l.quantity,
            unit_of_measure: l.unit_of_measure.clone(),
            unit_price: l.unit_price.map(sign),
            discount_percent: l.discount_percent,
            discount_amount: l.discount_amount.map(sign),
            taxable_amount: l.taxable_amount.map(sign),
            vat_rate: l.vat_rate,
            vat_amount: l.vat_amount.map(sign),
            total_line_amount: l.total_line_amount.map(sign),
            sku_code: l.sku_code.clone(),
        })
        .collect();

    let vat_summaries = dto
        .vat_summaries
        .iter()
        .map(|s| VatSummary {
            vat_rate: s.vat_rate,
            taxable_amount: sign(s.taxable_amount),
            vat_amount: sign(s.vat_amount),
            nature: s.nature.clone(),
        })
        .collect();

    let payments = match kind {
        DocumentKind::CreditNote => Vec::new(),
        DocumentKind::Invoice => dto
            .payments
            .iter()
            .map(|p| PaymentRow {
                due_date: p.due_date,
                expected_amount: p.expected_amount,
                payment_terms: p.payment_terms.clone(),
                payment_method: p.payment_method.clone(),
                status: PaymentStatus::Unpaid,
            })
            .collect(),
    };

    Document {
        kind,
        type_code: dto.type_code.clone(),
        number: dto.number.clone(),
        document_date: dto.document_date,
        due_date: resolve_due_date(dto.due_date, dto.document_date, due_rule),
        registration_date: dto.registration_date,
        currency: if dto.currency.is_empty() {
            "EUR".to_string()
        } else {
            dto.currency.clone()
        },
        total_taxable: dto.total_taxable.map(sign),
        total_vat: dto.total_vat.map(sign),
        total_gross: sign(gross),
        accounting_year: accounting_year(dto.registration_date, dto.document_date),
        doc_status: DocStatus::Imported,
        payment_status: PaymentStatus::Unpaid,
        source_key: key.source_key.clone(),
        file_name: key.file_name.clone(),
        content_hash: key.content_hash.clone(),
        import_source: import_source.map(str::to_string),
        lines,
        vat_summaries,
        payments,
    }
}

fn add_days(date: NaiveDate, n: u32) -> NaiveDate {
    date.checked_add_days(Days::new(u64::from(n))).unwrap_or(date)
}

fn first_of_next_month(date: NaiveDate) -> NaiveDate {
    let first = date.with_day(1).unwrap_or(date);
    first.checked_add_months(Months::new(1)).unwrap_or(first)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn end_of_month_handles_leap_february() {
        assert_eq!(
            due_date_from_rule(date(2024, 2, 10), DueDateRule::EndOfMonth),
            date(2024, 2, 29)
        );
        assert_eq!(
            due_date_from_rule(date(2024, 12, 31), DueDateRule::EndOfMonth),
            date(2024, 12, 31)
        );
    }

    #[test]
    fn next_month_first_rolls_year() {
        assert_eq!(
            due_date_from_rule(date(2024, 12, 15), DueDateRule::NextMonthFirst),
            date(2025, 1, 1)
        );
    }

    #[test]
    fn summaries_include_rounding() {
        let dto = ParsedInvoice {
            total_taxable: Some(dec!(10.00)),
            total_vat: Some(dec!(2.20)),
            rounding: Some(dec!(-0.20)),
            ..Default::default()
        };
        assert_eq!(gross_total(&dto), (dec!(12.00), GrossSource::Summaries));
    }

    #[test]
    fn signed_keeps_magnitude() {
        assert_eq!(signed(DocumentKind::CreditNote, dec!(5)), dec!(-5));
        assert_eq!(signed(DocumentKind::CreditNote, dec!(-5)), dec!(-5));
        assert_eq!(signed(DocumentKind::Invoice, dec!(-5)), dec!(-5));
    }
}
