use anyhow::Result;
use chrono::NaiveDate;
use std::cmp::Reverse;

use crate::models::{Invoice, InvoiceStatus, InvoiceSummary};
use crate::services::state::AppState;
use crate::utils::{format_date, parse_amount, parse_payment_date};

/// Listing rows, newest payment first; invoices without a readable payment
/// date keep their input order at the end.
pub fn get_invoices(state: &AppState, status: Option<&InvoiceStatus>) -> Result<Vec<InvoiceSummary>> {
    let invoices = state.invoices()?;

    let mut rows: Vec<(Option<NaiveDate>, InvoiceSummary)> = invoices
        .iter()
        .filter(|invoice| status.map_or(true, |s| &invoice.status == s))
        .map(|invoice| {
            let date = invoice
                .payment_date
                .as_deref()
                .and_then(|raw| parse_payment_date(raw).ok());
            (date, summarize_row(invoice, date))
        })
        .collect();

    rows.sort_by_key(|(date, _)| (date.is_none(), date.map(Reverse)));
    Ok(rows.into_iter().map(|(_, row)| row).collect())
}

pub(crate) fn summarize_row(invoice: &Invoice, payment_date: Option<NaiveDate>) -> InvoiceSummary {
    InvoiceSummary {
        id: invoice.id.clone(),
        invoice_number: invoice.invoice_number.clone(),
        client_name: invoice.client_name.clone(),
        status: invoice.status.clone(),
        balance: parse_amount(&invoice.balance_amount).ok(),
        paid: invoice.paid_amount.as_deref().and_then(|raw| parse_amount(raw).ok()),
        payment_date: payment_date.map(format_date),
    }
}
