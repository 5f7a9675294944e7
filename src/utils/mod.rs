use chrono::{DateTime, Local, NaiveDate, NaiveDateTime};

use crate::error::{AmountParseError, DateParseError};
use crate::models::Grouping;

const DATETIME_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"];
const DATE_FORMATS: [&str; 5] = ["%Y-%m-%d", "%d.%m.%Y", "%d/%m/%Y", "%Y/%m/%d", "%Y.%m.%d"];

/// Parses currency text such as `"₹1,00,000.50"`.
///
/// Everything except ASCII digits and `.` is dropped before the numeric
/// parse, so symbols, separators and signs never reach the number.
pub fn parse_amount(raw: &str) -> Result<f64, AmountParseError> {
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    if cleaned.is_empty() {
        return Err(AmountParseError::Empty { raw: raw.to_string() });
    }
    match cleaned.parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(value),
        _ => Err(AmountParseError::Invalid {
            raw: raw.to_string(),
            cleaned,
        }),
    }
}

pub fn parse_payment_date(raw: &str) -> Result<NaiveDate, DateParseError> {
    let value = raw.trim();

    if let Ok(timestamp) = DateTime::parse_from_rfc3339(value) {
        return Ok(timestamp.with_timezone(&Local).date_naive());
    }
    for fmt in DATETIME_FORMATS.iter() {
        if let Ok(datetime) = NaiveDateTime::parse_from_str(value, fmt) {
            return Ok(datetime.date());
        }
    }
    for fmt in DATE_FORMATS.iter() {
        if let Ok(date) = NaiveDate::parse_from_str(value, fmt) {
            return Ok(date);
        }
    }
    Err(DateParseError { raw: raw.to_string() })
}

pub fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

pub fn format_year_month(date: NaiveDate) -> String {
    date.format("%Y-%m").to_string()
}

/// Parses `YYYY-MM` into the first day of that month.
pub fn parse_year_month(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(&format!("{}-01", value.trim()), "%Y-%m-%d").ok()
}

pub fn format_currency(value: f64, symbol: &str, grouping: Grouping) -> String {
    let fixed = format!("{:.2}", value.abs());
    let (whole, fraction) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));
    let sign = if value < 0.0 && fixed != "0.00" { "-" } else { "" };
    format!("{}{}{}.{}", sign, symbol, group_digits(whole, grouping), fraction)
}

fn group_digits(digits: &str, grouping: Grouping) -> String {
    if digits.len() <= 3 {
        return digits.to_string();
    }
    let (head, tail) = digits.split_at(digits.len() - 3);
    let width = match grouping {
        Grouping::Western => 3,
        Grouping::Indian => 2,
    };

    let mut groups = Vec::new();
    let mut end = head.len();
    while end > 0 {
        let start = end.saturating_sub(width);
        groups.push(&head[start..end]);
        end = start;
    }
    groups.reverse();
    format!("{},{}", groups.join(","), tail)
}
