use anyhow::{anyhow, Result};
use chrono::{Datelike, NaiveDate};

use crate::commands::invoices::summarize_row;
use crate::models::{DashboardStats, InvoiceSummary};
use crate::services::aggregator::{monthly_collections, paid_in_year, payment_date};
use crate::services::state::AppState;
use crate::utils::{format_currency, format_year_month, parse_year_month};

pub fn get_dashboard_stats(state: &AppState, year_month: Option<&str>) -> Result<DashboardStats> {
    let reference = match year_month {
        Some(value) => parse_year_month(value).ok_or_else(|| anyhow!("Invalid month '{}', expected YYYY-MM", value))?,
        None => state.today(),
    };
    let settings = state.settings()?;
    let policy = settings.malformed_policy;

    let stats = state.stats_for(reference)?;
    let invoices = state.invoices()?;
    let paid_this_year = paid_in_year(&invoices, reference.year(), policy)?;

    let recent_payments = recent_payments(state, settings.recent_limit, reference)?;

    let series = monthly_collections(&invoices, reference, settings.chart_months, policy)?;
    let (chart_months, chart_paid): (Vec<String>, Vec<f64>) = series.into_iter().map(|m| (m.year_month, m.total)).unzip();

    let display = |value: f64| format_currency(value, &settings.currency_symbol, settings.grouping);

    Ok(DashboardStats {
        year_month: format_year_month(reference),
        total_outstanding: stats.total_outstanding,
        paid_this_month: stats.paid_this_month,
        paid_this_year,
        pending_count: stats.pending_count,
        total_outstanding_display: display(stats.total_outstanding),
        paid_this_month_display: display(stats.paid_this_month),
        paid_this_year_display: display(paid_this_year),
        recent_payments,
        chart_months,
        chart_paid,
    })
}

/// Latest payments up to the end of the reference month, newest first.
fn recent_payments(state: &AppState, limit: usize, reference: NaiveDate) -> Result<Vec<InvoiceSummary>> {
    let invoices = state.invoices()?;
    let policy = state.settings()?.malformed_policy;

    let mut dated = Vec::new();
    for (index, invoice) in invoices.iter().enumerate() {
        if let Some(date) = payment_date(index, invoice, policy)? {
            let same_or_earlier_month = (date.year(), date.month()) <= (reference.year(), reference.month());
            if same_or_earlier_month {
                dated.push((date, index));
            }
        }
    }
    dated.sort_by(|a, b| b.cmp(a));

    Ok(dated
        .into_iter()
        .take(limit)
        .map(|(date, index)| summarize_row(&invoices[index], Some(date)))
        .collect())
}
