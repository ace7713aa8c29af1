//! TOML-based configuration for metricsql.
//!
//! Supports a config file (metricsql.toml) with environment variable expansion.
//!
//! Example configuration:
//! ```toml
//! [compiler]
//! dialect = "${METRICSQL_DIALECT}"
//! row_cap = 100000               # 0 disables the cap; omit for the dialect default
//! approximate_comparisons = false
//! time_zone = "Europe/Berlin"
//! subquery_timeout = "30s"
//! ```

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::sql::Dialect;

/// Error type for settings.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid duration format: {0}")]
    InvalidDuration(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    /// Compiler defaults.
    pub compiler: CompilerSettings,
}

/// Compiler configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CompilerSettings {
    /// Dialect registry key (supports ${ENV_VAR} expansion).
    pub dialect: String,

    /// Row cap; 0 disables it, absent falls back to the dialect default.
    pub row_cap: Option<u64>,

    /// Allow one-sided joins for sorted comparison queries.
    pub approximate_comparisons: bool,

    /// Time zone used when a query names none.
    pub time_zone: Option<String>,

    /// Grand-total sub-query timeout (e.g., "500ms", "30s", "5m").
    pub subquery_timeout: String,
}

impl Default for CompilerSettings {
    fn default() -> Self {
        Self {
            dialect: Dialect::default().to_string(),
            row_cap: None,
            approximate_comparisons: false,
            time_zone: None,
            subquery_timeout: "30s".to_string(),
        }
    }
}

impl CompilerSettings {
    /// Get the dialect with environment variables expanded.
    pub fn dialect(&self) -> Result<Dialect, SettingsError> {
        let name = expand_env_vars(&self.dialect)?;
        name.parse::<Dialect>()
            .map_err(|e| SettingsError::InvalidConfig(e.to_string()))
    }

    /// Get the default time zone, checked against the IANA database.
    pub fn time_zone(&self) -> Result<Option<String>, SettingsError> {
        let Some(tz) = &self.time_zone else {
            return Ok(None);
        };
        let tz = expand_env_vars(tz)?;
        tz.parse::<chrono_tz::Tz>()
            .map_err(|_| SettingsError::InvalidConfig(format!("unknown time zone '{tz}'")))?;
        Ok(Some(tz))
    }

    /// Get the sub-query timeout.
    pub fn subquery_timeout(&self) -> Result<Duration, SettingsError> {
        parse_duration(&self.subquery_timeout)
    }
}

impl Settings {
    /// Load settings from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(SettingsError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        let settings: Settings = toml::from_str(&content)?;
        tracing::debug!(target: "metricsql::config", path = %path.display(), "loaded settings");
        Ok(settings)
    }

    /// Load settings from the default config file locations.
    ///
    /// Searches in order:
    /// 1. Environment variable `METRICSQL_CONFIG`
    /// 2. `./metricsql.toml`
    /// 3. `~/.config/metricsql/config.toml`
    pub fn load() -> Result<Self, SettingsError> {
        if let Ok(path) = env::var("METRICSQL_CONFIG") {
            return Self::from_file(&path);
        }

        let local_config = PathBuf::from("metricsql.toml");
        if local_config.exists() {
            return Self::from_file(&local_config);
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("metricsql").join("config.toml");
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        Ok(Settings::default())
    }

    /// Check every field that only parses lazily.
    pub fn validate(&self) -> Result<(), SettingsError> {
        self.compiler.dialect()?;
        self.compiler.time_zone()?;
        self.compiler.subquery_timeout()?;
        Ok(())
    }
}

/// Expand environment variables in a string.
///
/// Supports `${VAR}` and `$VAR` syntax.
pub fn expand_env_vars(s: &str) -> Result<String, SettingsError> {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '$' {
            result.push(c);
            continue;
        }

        let mut var_name = String::new();
        if chars.next_if_eq(&'{').is_some() {
            for ch in chars.by_ref() {
                if ch == '}' {
                    break;
                }
                var_name.push(ch);
            }
        } else {
            // $VAR ends at the first non-alphanumeric, non-underscore character
            while let Some(ch) = chars.next_if(|ch| ch.is_alphanumeric() || *ch == '_') {
                var_name.push(ch);
            }
            if var_name.is_empty() {
                result.push('$');
                continue;
            }
        }

        let value = env::var(&var_name).map_err(|_| SettingsError::MissingEnvVar(var_name.clone()))?;
        result.push_str(&value);
    }

    Ok(result)
}

/// Parse a duration such as `500ms`, `30s`, `5m` or `1h`.
pub fn parse_duration(s: &str) -> Result<Duration, SettingsError> {
    let s = s.trim();
    let split = s
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(|| SettingsError::InvalidDuration(s.to_string()))?;
    let (amount, unit) = s.split_at(split);
    let amount: u64 = amount
        .parse()
        .map_err(|_| SettingsError::InvalidDuration(s.to_string()))?;

    match unit {
        "ms" => Ok(Duration::from_millis(amount)),
        "s" => Ok(Duration::from_secs(amount)),
        "m" => Ok(Duration::from_secs(amount.saturating_mul(60))),
        "h" => Ok(Duration::from_secs(amount.saturating_mul(3600))),
        _ => Err(SettingsError::InvalidDuration(s.to_string())),
    }
}
