use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum InvoiceStatus {
    Paid,
    Pending,
    Other(String),
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &str {
        match self {
            InvoiceStatus::Paid => "paid",
            InvoiceStatus::Pending => "pending",
            InvoiceStatus::Other(value) => value,
        }
    }
}

impl From<String> for InvoiceStatus {
    fn from(value: String) -> Self {
        match value.as_str() {
            "paid" => InvoiceStatus::Paid,
            "pending" => InvoiceStatus::Pending,
            _ => InvoiceStatus::Other(value),
        }
    }
}

impl From<&str> for InvoiceStatus {
    fn from(value: &str) -> Self {
        InvoiceStatus::from(value.to_string())
    }
}

impl From<InvoiceStatus> for String {
    fn from(status: InvoiceStatus) -> Self {
        match status {
            InvoiceStatus::Other(value) => value,
            other => other.as_str().to_string(),
        }
    }
}

impl fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Invoice record as exported by the upstream data layer.
///
/// Monetary fields stay as the formatted text the studio sees (`"₹1,000"`);
/// they are parsed only when aggregated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Invoice {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invoice_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_name: Option<String>,
    pub status: InvoiceStatus,
    #[serde(default)]
    pub balance_amount: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paid_amount: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_date: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct InvoiceStats {
    pub total_outstanding: f64,
    pub paid_this_month: f64,
    pub pending_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceSummary {
    pub id: Option<String>,
    pub invoice_number: Option<String>,
    pub client_name: Option<String>,
    pub status: InvoiceStatus,
    pub balance: Option<f64>,
    pub paid: Option<f64>,
    pub payment_date: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyTotal {
    pub year_month: String,
    pub total: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardStats {
    pub year_month: String,
    pub total_outstanding: f64,
    pub paid_this_month: f64,
    pub paid_this_year: f64,
    pub pending_count: usize,
    pub total_outstanding_display: String,
    pub paid_this_month_display: String,
    pub paid_this_year_display: String,
    pub recent_payments: Vec<InvoiceSummary>,
    pub chart_months: Vec<String>,
    pub chart_paid: Vec<f64>,
}

/// What to do with an amount or date that cannot be parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MalformedPolicy {
    /// Count malformed amounts as zero and malformed dates as absent, with a warning.
    #[default]
    Lenient,
    /// Abort the derivation on the first malformed field.
    Strict,
}

impl MalformedPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            MalformedPolicy::Lenient => "lenient",
            MalformedPolicy::Strict => "strict",
        }
    }
}

impl std::str::FromStr for MalformedPolicy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "lenient" => Ok(MalformedPolicy::Lenient),
            "strict" => Ok(MalformedPolicy::Strict),
            other => Err(format!("unknown malformed policy '{}'", other)),
        }
    }
}

/// Digit grouping used when formatting amounts for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Grouping {
    /// 1,000,000.00
    Western,
    /// 10,00,000.00
    #[default]
    Indian,
}

impl Grouping {
    pub fn as_str(&self) -> &'static str {
        match self {
            Grouping::Western => "western",
            Grouping::Indian => "indian",
        }
    }
}

impl std::str::FromStr for Grouping {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "western" => Ok(Grouping::Western),
            "indian" => Ok(Grouping::Indian),
            other => Err(format!("unknown grouping '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub source: Option<PathBuf>,
    pub currency_symbol: String,
    pub grouping: Grouping,
    pub malformed_policy: MalformedPolicy,
    pub recent_limit: usize,
    pub chart_months: u32,
    pub debounce_ms: u64,
    pub log_level: String,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            source: None,
            currency_symbol: "₹".to_string(),
            grouping: Grouping::Indian,
            malformed_policy: MalformedPolicy::Lenient,
            recent_limit: 5,
            chart_months: 12,
            debounce_ms: 300,
            log_level: "info".to_string(),
        }
    }
}
