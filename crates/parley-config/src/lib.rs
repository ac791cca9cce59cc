//! Parley configuration system.
//!
//! Provides TOML-based configuration with environment overrides and full
//! validation. All config sections use sensible defaults so partial
//! configs work out of the box.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use parley_config::{load_config, config_to_json};
//!
//! let config = load_config(None).expect("failed to load config");
//! let json = config_to_json(&config);
//! println!("{json}");
//! ```

pub mod schema;
pub mod toml_loader;
pub mod validation;

pub use schema::{
    LoggingConfig, ParleyConfig, PresenceSettings, RealtimeSettings, SupabaseConfig,
    CONFIG_SCHEMA_VERSION,
};

use std::path::Path;

use parley_common::ConfigError;

/// Load config from `path`, or from the platform default path when `None`.
///
/// Applies `PARLEY_*` environment overrides and validates the result.
pub fn load_config(path: Option<&Path>) -> Result<ParleyConfig, ConfigError> {
    let mut config = match path {
        Some(p) => toml_loader::load_from_path(p)?,
        None => toml_loader::load_default()?,
    };

    toml_loader::apply_env_overrides(&mut config);

    validation::validate(&config)?;
    Ok(config)
}

/// Serialize a config to a pretty-printed JSON string.
pub fn config_to_json(config: &ParleyConfig) -> String {
    serde_json::to_string_pretty(config)
        .unwrap_or_else(|e| format!("{{\"error\": \"failed to serialize config: {e}\"}}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_to_json_contains_all_sections() {
        let config = ParleyConfig::default();
        let json = config_to_json(&config);
        assert!(json.contains("\"supabase\""));
        assert!(json.contains("\"realtime\""));
        assert!(json.contains("\"presence\""));
        assert!(json.contains("\"logging\""));
    }

    #[test]
    fn config_schema_version_is_1() {
        assert_eq!(CONFIG_SCHEMA_VERSION, 1);
    }

    #[test]
    fn load_config_rejects_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[realtime]\nbase_delay_ms = 1\n").unwrap();

        let err = load_config(Some(&path)).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn default_config_round_trips_through_json() {
        let config = ParleyConfig::default();
        let json = config_to_json(&config);
        let parsed: ParleyConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.realtime.max_retries, 3);
        assert_eq!(parsed.presence.table, "user_presence");
    }
}
