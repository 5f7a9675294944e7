use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum AmountParseError {
    #[error("amount '{raw}' contains no digits")]
    Empty { raw: String },
    #[error("amount '{raw}' is not a number after stripping to '{cleaned}'")]
    Invalid { raw: String, cleaned: String },
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error("unrecognized date '{raw}'")]
pub struct DateParseError {
    pub raw: String,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum AggregateError {
    #[error("invoice #{index}: malformed {field}: {source}")]
    MalformedAmount {
        index: usize,
        field: &'static str,
        #[source]
        source: AmountParseError,
    },
    #[error("invoice #{index}: malformed paymentDate: {source}")]
    MalformedDate {
        index: usize,
        #[source]
        source: DateParseError,
    },
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("invoice source {0} does not exist")]
    Missing(PathBuf),
    #[error("read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parse {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not determine config directory")]
    NoConfigDir,
    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: &'static str, message: String },
    #[error("write config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}
