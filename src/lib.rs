//! Finance side of a photography studio operations suite: invoice summary
//! figures over snapshots exported by the studio's data layer.

pub mod commands;
pub mod config;
pub mod error;
pub mod models;
pub mod services;
pub mod utils;

pub use error::{AggregateError, AmountParseError, ConfigError, DateParseError, LoadError};
pub use models::{Invoice, InvoiceStats, InvoiceStatus, MalformedPolicy, Settings};
pub use services::aggregator::{summarize, summarize_at};
pub use services::clock::{Clock, FixedClock, SystemClock};
