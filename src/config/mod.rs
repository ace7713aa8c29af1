//! Configuration module for metricsql.
//!
//! Handles the compiler settings file and environment variable expansion.

mod settings;

pub use settings::{expand_env_vars, parse_duration, CompilerSettings, Settings, SettingsError};
