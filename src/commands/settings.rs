use anyhow::Result;
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::config;
use crate::models::{Grouping, MalformedPolicy, Settings};
use crate::services::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct SettingsPayload {
    pub source: Option<PathBuf>,
    pub currency_symbol: Option<String>,
    pub grouping: Option<Grouping>,
    pub malformed_policy: Option<MalformedPolicy>,
    pub recent_limit: Option<usize>,
    pub chart_months: Option<u32>,
    pub debounce_ms: Option<u64>,
    pub log_level: Option<String>,
}

pub fn get_settings(state: &AppState) -> Result<Settings> {
    state.settings()
}

/// Applies the given fields, persists the result and hands it to the running state.
pub fn save_settings(state: &AppState, payload: SettingsPayload, path: Option<&Path>) -> Result<Settings> {
    let mut settings = state.settings()?;

    if let Some(value) = payload.source {
        settings.source = Some(value);
    }
    if let Some(value) = payload.currency_symbol {
        if !value.trim().is_empty() {
            settings.currency_symbol = value;
        }
    }
    if let Some(value) = payload.grouping {
        settings.grouping = value;
    }
    if let Some(value) = payload.malformed_policy {
        settings.malformed_policy = value;
    }
    if let Some(value) = payload.recent_limit {
        settings.recent_limit = value;
    }
    if let Some(value) = payload.chart_months {
        settings.chart_months = value.max(1);
    }
    if let Some(value) = payload.debounce_ms {
        settings.debounce_ms = value;
    }
    if let Some(value) = payload.log_level {
        settings.log_level = value;
    }

    config::save_settings(&settings, path)?;
    state.update_settings(settings.clone())?;
    Ok(settings)
}
