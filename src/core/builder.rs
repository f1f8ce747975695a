use chrono::NaiveDate;
use rust_decimal::Decimal;

use super::dto::*;

/// Builder for a [`ParsedInvoice`] body, for callers that assemble records
/// outside the XML parsers (uploads from other channels, tests).
///
/// ```
/// use fattura::*;
/// use rust_decimal_macros::dec;
/// use chrono::NaiveDate;
///
/// let dto = ParsedInvoiceBuilder::new("FPR 12/24", NaiveDate::from_ymd_opt(2024, 3, 10).unwrap())
///     .counterparty(PartyBuilder::new().name("Rossi SRL").vat("IT", "01234567890").build())
///     .add_line(LineBuilder::new("Consulenza", dec!(100.00)).vat_rate(dec!(22)).build())
///     .vat_summary(dec!(22), dec!(100.00), dec!(22.00))
///     .build();
///
/// assert_eq!(dto.total_taxable, Some(dec!(100.00)));
/// assert_eq!(dto.total_vat, Some(dec!(22.00)));
/// assert_eq!(dto.total_gross, None);
/// ```
pub struct ParsedInvoiceBuilder {
    number: String,
    document_date: NaiveDate,
    type_code: String,
    transmission_format: String,
    currency: String,
    due_date: Option<NaiveDate>,
    registration_date: Option<NaiveDate>,
    counterparty: PartyRecord,
    owner: PartyRecord,
    lines: Vec<LineRecord>,
    vat_summaries: Vec<VatSummaryRecord>,
    payments: Vec<PaymentRecord>,
    totals: Option<(Decimal, Decimal)>,
    rounding: Option<Decimal>,
    total_gross: Option<Decimal>,
}

impl ParsedInvoiceBuilder {
    pub fn new(number: impl Into<String>, document_date: NaiveDate) -> Self {
        Self {
            number: number.into(),
            document_date,
            type_code: "TD01".into(),
            transmission_format: "FPR12".into(),
            currency: "EUR".into(),
            due_date: None,
            registration_date: None,
            counterparty: PartyRecord::default(),
            owner: PartyRecord::default(),
            lines: Vec::new(),
            vat_summaries: Vec::new(),
            payments: Vec::new(),
            totals: None,
            rounding: None,
            total_gross: None,
        }
    }

    /// `TipoDocumento`, default TD01.
    pub fn type_code(mut self, code: impl Into<String>) -> Self {
        self.type_code = code.into();
        self
    }

    pub fn transmission_format(mut self, format: impl Into<String>) -> Self {
        self.transmission_format = format.into();
        self
    }

    pub fn currency(mut self, code: impl Into<String>) -> Self {
        self.currency = code.into();
        self
    }

    pub fn due_date(mut self, date: NaiveDate) -> Self {
        self.due_date = Some(date);
        self
    }

    pub fn registration_date(mut self, date: NaiveDate) -> Self {
        self.registration_date = Some(date);
        self
    }

    pub fn counterparty(mut self, party: PartyRecord) -> Self {
        self.counterparty = party;
        self
    }

    pub fn owner(mut self, party: PartyRecord) -> Self {
        self.owner = party;
        self
    }

    pub fn add_line(mut self, line: LineRecord) -> Self {
        self.lines.push(line);
        self
    }

    pub fn vat_summary(mut self, rate: Decimal, taxable: Decimal, vat: Decimal) -> Self {
        self.vat_summaries.push(VatSummaryRecord {
            vat_rate: rate,
            taxable_amount: taxable,
            vat_amount: vat,
            nature: None,
        });
        self
    }

    pub fn payment(mut self, payment: PaymentRecord) -> Self {
        self.payments.push(payment);
        self
    }

    /// Document totals without summary rows. Overrides the summary sums.
    pub fn totals(mut self, taxable: Decimal, vat: Decimal) -> Self {
        self.totals = Some((taxable, vat));
        self
    }

    pub fn rounding(mut self, amount: Decimal) -> Self {
        self.rounding = Some(amount);
        self
    }

    /// Explicit `ImportoTotaleDocumento`.
    pub fn total_gross(mut self, amount: Decimal) -> Self {
        self.total_gross = Some(amount);
        self
    }

    /// Assemble the body. Taxable and VAT totals are the summary sums unless
    /// set explicitly; the gross total is left as given.
    pub fn build(self) -> ParsedInvoice {
        let (total_taxable, total_vat) = match self.totals {
            Some((taxable, vat)) => (Some(taxable), Some(vat)),
            None if self.vat_summaries.is_empty() => (None, None),
            None => (
                Some(self.vat_summaries.iter().map(|s| s.taxable_amount).sum()),
                Some(self.vat_summaries.iter().map(|s| s.vat_amount).sum()),
            ),
        };
        let due_date = self
            .due_date
            .or_else(|| self.payments.iter().filter_map(|p| p.due_date).min());

        ParsedInvoice {
            counterparty: self.counterparty,
            owner: self.owner,
            transmission_format: Some(self.transmission_format),
            type_code: Some(self.type_code),
            number: Some(self.number),
            document_date: Some(self.document_date),
            due_date,
            registration_date: self.registration_date,
            currency: self.currency,
            total_taxable,
            total_vat,
            rounding: self.rounding,
            total_gross: self.total_gross,
            body_index: 1,
            body_count: 1,
            parser: ParserPath::Schema,
            lines: self.lines,
            vat_summaries: self.vat_summaries,
            payments: self.payments,
            attachments: Vec::new(),
            warnings: Vec::new(),
        }
    }
}

/// Builder for a [`PartyRecord`].
#[derive(Default)]
pub struct PartyBuilder {
    party: PartyRecord,
}

impl PartyBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.party.name = Some(name.into());
        self
    }

    /// `IdFiscaleIVA`: country prefix and code.
    pub fn vat(mut self, country: impl Into<String>, code: impl Into<String>) -> Self {
        self.party.vat_country = Some(country.into());
        self.party.vat_number = Some(code.into());
        self
    }

    pub fn fiscal_code(mut self, code: impl Into<String>) -> Self {
        self.party.fiscal_code = Some(code.into());
        self
    }

    pub fn address(
        mut self,
        street: impl Into<String>,
        postal_code: impl Into<String>,
        city: impl Into<String>,
        country: impl Into<String>,
    ) -> Self {
        self.party.address = Some(street.into());
        self.party.postal_code = Some(postal_code.into());
        self.party.city = Some(city.into());
        self.party.country = Some(country.into());
        self
    }

    pub fn build(self) -> PartyRecord {
        self.party
    }
}

/// Builder for a [`LineRecord`].
pub struct LineBuilder {
    line: LineRecord,
}

impl LineBuilder {
    /// A line with quantity 1 and the given total as unit price.
    pub fn new(description: impl Into<String>, total: Decimal) -> Self {
        Self {
            line: LineRecord {
                description: description.into(),
                quantity: Some(Decimal::ONE),
                unit_price: Some(total),
                taxable_amount: Some(total),
                total_line_amount: Some(total),
                ..Default::default()
            },
        }
    }

    pub fn line_number(mut self, n: i64) -> Self {
        self.line.line_number = Some(n);
        self
    }

    pub fn quantity(mut self, quantity: Decimal, unit_price: Decimal) -> Self {
        self.line.quantity = Some(quantity);
        self.line.unit_price = Some(unit_price);
        self
    }

    pub fn vat_rate(mut self, rate: Decimal) -> Self {
        self.line.vat_rate = Some(rate);
        self
    }

    pub fn discount_amount(mut self, amount: Decimal) -> Self {
        self.line.discount_amount = Some(amount);
        self
    }

    pub fn sku(mut self, code: impl Into<String>) -> Self {
        self.line.sku_code = Some(code.into());
        self
    }

    pub fn build(self) -> LineRecord {
        self.line
    }
}
