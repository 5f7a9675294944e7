// Settings loading for the studiodesk host
//
// Precedence:
// 1. Environment variables (STUDIODESK_SOURCE, STUDIODESK_POLICY, STUDIODESK_LOG)
// 2. Config file (<config dir>/studiodesk/config.toml, or --config)
// 3. Built-in defaults

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::models::{Grouping, MalformedPolicy, Settings};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub const ENV_SOURCE: &str = "STUDIODESK_SOURCE";
pub const ENV_POLICY: &str = "STUDIODESK_POLICY";
pub const ENV_LOG: &str = "STUDIODESK_LOG";

#[derive(Debug, Default, Serialize, Deserialize)]
struct FileLogging {
    #[serde(skip_serializing_if = "Option::is_none")]
    level: Option<String>,
}

/// Config file structure; every key is optional.
#[derive(Debug, Default, Serialize, Deserialize)]
struct FileConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    currency_symbol: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    grouping: Option<Grouping>,
    #[serde(skip_serializing_if = "Option::is_none")]
    malformed_policy: Option<MalformedPolicy>,
    #[serde(skip_serializing_if = "Option::is_none")]
    recent_limit: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    chart_months: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    debounce_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    logging: Option<FileLogging>,
}

impl From<&Settings> for FileConfig {
    fn from(settings: &Settings) -> Self {
        FileConfig {
            source: settings.source.as_ref().map(|p| p.display().to_string()),
            currency_symbol: Some(settings.currency_symbol.clone()),
            grouping: Some(settings.grouping),
            malformed_policy: Some(settings.malformed_policy),
            recent_limit: Some(settings.recent_limit),
            chart_months: Some(settings.chart_months),
            debounce_ms: Some(settings.debounce_ms),
            logging: Some(FileLogging {
                level: Some(settings.log_level.clone()),
            }),
        }
    }
}

/// Default config file location: `<config dir>/studiodesk/config.toml`.
pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("studiodesk").join("config.toml"))
}

fn resolve_path(path: Option<&Path>) -> Result<PathBuf, ConfigError> {
    match path {
        Some(path) => Ok(path.to_path_buf()),
        None => config_path().ok_or(ConfigError::NoConfigDir),
    }
}

/// Loads settings: env > file > defaults.
pub fn load_settings(path: Option<&Path>) -> Result<Settings, ConfigError> {
    apply_env(load_file_settings(path), |key| std::env::var(key).ok())
}

/// File and defaults only. Base for `config set`, so environment overrides
/// never end up persisted.
pub fn load_file_settings(path: Option<&Path>) -> Settings {
    let file = match resolve_path(path) {
        Ok(path) => read_file_config(&path),
        Err(_) => FileConfig::default(),
    };
    apply_file(file)
}

fn read_file_config(path: &Path) -> FileConfig {
    match std::fs::read_to_string(path) {
        Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
            // logging is configured from these settings, so it is not up yet
            eprintln!("Warning: Failed to parse {}: {}", path.display(), e);
            FileConfig::default()
        }),
        Err(_) => FileConfig::default(),
    }
}

fn apply_file(file: FileConfig) -> Settings {
    let defaults = Settings::default();
    Settings {
        source: file.source.map(PathBuf::from),
        currency_symbol: file.currency_symbol.unwrap_or(defaults.currency_symbol),
        grouping: file.grouping.unwrap_or(defaults.grouping),
        malformed_policy: file.malformed_policy.unwrap_or(defaults.malformed_policy),
        recent_limit: file.recent_limit.unwrap_or(defaults.recent_limit),
        chart_months: file.chart_months.unwrap_or(defaults.chart_months),
        debounce_ms: file.debounce_ms.unwrap_or(defaults.debounce_ms),
        log_level: file
            .logging
            .and_then(|l| l.level)
            .unwrap_or(defaults.log_level),
    }
}

fn apply_env<F>(mut settings: Settings, lookup: F) -> Result<Settings, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(source) = lookup(ENV_SOURCE).filter(|v| !v.trim().is_empty()) {
        settings.source = Some(PathBuf::from(source));
    }
    if let Some(policy) = lookup(ENV_POLICY) {
        settings.malformed_policy = policy.parse().map_err(|message| ConfigError::InvalidValue {
            key: ENV_POLICY,
            message,
        })?;
    }
    if let Some(level) = lookup(ENV_LOG).filter(|v| !v.trim().is_empty()) {
        settings.log_level = level;
    }
    Ok(settings)
}

pub fn to_toml(settings: &Settings) -> Result<String, ConfigError> {
    let body = toml::to_string_pretty(&FileConfig::from(settings))?;
    Ok(format!("# studiodesk configuration\n\n{}", body))
}

pub fn save_settings(settings: &Settings, path: Option<&Path>) -> Result<PathBuf, ConfigError> {
    let path = resolve_path(path)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|source| ConfigError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    std::fs::write(&path, to_toml(settings)?).map_err(|source| ConfigError::Io {
        path: path.clone(),
        source,
    })?;
    Ok(path)
}

/// Writes a defaults file unless one exists. Returns the path and whether it was created.
pub fn ensure_config_exists(path: Option<&Path>) -> Result<(PathBuf, bool), ConfigError> {
    let path = resolve_path(path)?;
    if path.exists() {
        return Ok((path, false));
    }
    let path = save_settings(&Settings::default(), Some(&path))?;
    Ok((path, true))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = apply_env(apply_file(read_file_config(&dir.path().join("none.toml"))), |_| None).unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn file_values_override_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
source = "/srv/studio/invoices.json"
currency_symbol = "$"
grouping = "western"
malformed_policy = "strict"

[logging]
level = "debug"
"#,
        )
        .unwrap();

        let settings = apply_file(read_file_config(&path));
        assert_eq!(settings.source, Some(PathBuf::from("/srv/studio/invoices.json")));
        assert_eq!(settings.currency_symbol, "$");
        assert_eq!(settings.grouping, Grouping::Western);
        assert_eq!(settings.malformed_policy, MalformedPolicy::Strict);
        assert_eq!(settings.log_level, "debug");
        assert_eq!(settings.recent_limit, 5);
    }

    #[test]
    fn unparsable_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "grouping = [").unwrap();
        assert_eq!(apply_file(read_file_config(&path)), Settings::default());
    }

    #[test]
    fn env_wins_over_file() {
        let settings = Settings {
            source: Some(PathBuf::from("from-file.json")),
            ..Settings::default()
        };
        let settings = apply_env(settings, |key| match key {
            ENV_SOURCE => Some("from-env.json".to_string()),
            ENV_POLICY => Some("strict".to_string()),
            _ => None,
        })
        .unwrap();
        assert_eq!(settings.source, Some(PathBuf::from("from-env.json")));
        assert_eq!(settings.malformed_policy, MalformedPolicy::Strict);
    }

    #[test]
    fn bad_env_policy_is_rejected() {
        let result = apply_env(Settings::default(), |key| {
            (key == ENV_POLICY).then(|| "sloppy".to_string())
        });
        assert!(matches!(result, Err(ConfigError::InvalidValue { key: ENV_POLICY, .. })));
    }

    #[test]
    fn saved_file_loads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let settings = Settings {
            source: Some(PathBuf::from("/data/export")),
            grouping: Grouping::Western,
            recent_limit: 8,
            ..Settings::default()
        };
        save_settings(&settings, Some(&path)).unwrap();
        assert_eq!(apply_file(read_file_config(&path)), settings);

        let (_, created) = ensure_config_exists(Some(&path)).unwrap();
        assert!(!created);
    }

    #[test]
    fn file_layer_ignores_environment() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[logging]\nlevel = \"warn\"\n").unwrap();

        std::env::set_var(ENV_LOG, "trace");
        let layered = load_settings(Some(&path));
        let file_only = load_file_settings(Some(&path));
        std::env::remove_var(ENV_LOG);

        assert_eq!(layered.unwrap().log_level, "trace");
        assert_eq!(file_only.log_level, "warn");
    }
}
