//! Summary figures over a snapshot of invoices.
//!
//! Everything here is a pure function of its inputs. The reference date is
//! passed in (or read once from a [`Clock`]) so repeated calls agree.

use chrono::{Datelike, Months, NaiveDate};
use tracing::warn;

use crate::error::AggregateError;
use crate::models::{Invoice, InvoiceStats, InvoiceStatus, MalformedPolicy, MonthlyTotal};
use crate::services::clock::Clock;
use crate::utils::{format_year_month, parse_amount, parse_payment_date};

pub fn summarize(
    invoices: &[Invoice],
    clock: &dyn Clock,
    policy: MalformedPolicy,
) -> Result<InvoiceStats, AggregateError> {
    summarize_at(invoices, clock.today(), policy)
}

pub fn summarize_at(
    invoices: &[Invoice],
    today: NaiveDate,
    policy: MalformedPolicy,
) -> Result<InvoiceStats, AggregateError> {
    let mut total_outstanding = 0.0;
    let mut pending_count = 0;

    for (index, invoice) in invoices.iter().enumerate() {
        if invoice.status != InvoiceStatus::Paid {
            total_outstanding += amount(index, "balanceAmount", &invoice.balance_amount, policy)?;
        }
        if invoice.status == InvoiceStatus::Pending {
            pending_count += 1;
        }
    }

    let paid_this_month = paid_in_month(invoices, today.year(), today.month(), policy)?;

    Ok(InvoiceStats {
        total_outstanding,
        paid_this_month,
        pending_count,
    })
}

pub fn paid_in_month(
    invoices: &[Invoice],
    year: i32,
    month: u32,
    policy: MalformedPolicy,
) -> Result<f64, AggregateError> {
    paid_where(invoices, policy, |date| date.year() == year && date.month() == month)
}

pub fn paid_in_year(invoices: &[Invoice], year: i32, policy: MalformedPolicy) -> Result<f64, AggregateError> {
    paid_where(invoices, policy, |date| date.year() == year)
}

/// Paid totals for the `months` calendar months ending at `reference`, oldest first.
pub fn monthly_collections(
    invoices: &[Invoice],
    reference: NaiveDate,
    months: u32,
    policy: MalformedPolicy,
) -> Result<Vec<MonthlyTotal>, AggregateError> {
    let Some(base) = reference.with_day(1) else {
        return Ok(Vec::new());
    };

    let mut series = Vec::with_capacity(months as usize);
    for offset in (0..months).rev() {
        let Some(date) = base.checked_sub_months(Months::new(offset)) else {
            continue;
        };
        series.push(MonthlyTotal {
            year_month: format_year_month(date),
            total: paid_in_month(invoices, date.year(), date.month(), policy)?,
        });
    }
    Ok(series)
}

/// Payment date of an invoice, `None` when absent or blank.
pub fn payment_date(
    index: usize,
    invoice: &Invoice,
    policy: MalformedPolicy,
) -> Result<Option<NaiveDate>, AggregateError> {
    let Some(raw) = invoice.payment_date.as_deref().map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(None);
    };
    match parse_payment_date(raw) {
        Ok(date) => Ok(Some(date)),
        Err(source) => match policy {
            MalformedPolicy::Strict => Err(AggregateError::MalformedDate { index, source }),
            MalformedPolicy::Lenient => {
                warn!(index, raw, "malformed paymentDate treated as absent");
                Ok(None)
            }
        },
    }
}

fn paid_where(
    invoices: &[Invoice],
    policy: MalformedPolicy,
    in_period: impl Fn(NaiveDate) -> bool,
) -> Result<f64, AggregateError> {
    let mut total = 0.0;
    for (index, invoice) in invoices.iter().enumerate() {
        let Some(date) = payment_date(index, invoice, policy)? else {
            continue;
        };
        if !in_period(date) {
            continue;
        }
        if let Some(raw) = invoice.paid_amount.as_deref() {
            total += amount(index, "paidAmount", raw, policy)?;
        }
    }
    Ok(total)
}

fn amount(index: usize, field: &'static str, raw: &str, policy: MalformedPolicy) -> Result<f64, AggregateError> {
    match parse_amount(raw) {
        Ok(value) => Ok(value),
        Err(source) => match policy {
            MalformedPolicy::Strict => Err(AggregateError::MalformedAmount { index, field, source }),
            MalformedPolicy::Lenient => {
                warn!(index, field, raw, "malformed amount treated as zero");
                Ok(0.0)
            }
        },
    }
}
