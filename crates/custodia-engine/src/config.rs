//! Engine configuration.
//!
//! Loaded from TOML at startup or built in code. Every field has a default,
//! so an empty document is a valid configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};

use custodia_contracts::error::{AuditError, AuditResult};

/// Tunables for the audit service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Buffer length that triggers an early flush.
    #[serde(default = "default_max_buffer_size")]
    pub max_buffer_size: usize,

    /// Period of the flush timer.
    #[serde(default = "default_flush_interval_secs")]
    pub flush_interval_secs: u64,

    /// Period of the automated-check sweep.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    /// Trail used when `log_event` is called without an explicit trail.
    #[serde(default = "default_trail")]
    pub default_trail: String,

    /// Hex seed for the event signer. Signing requests fail when absent.
    pub signing_key_hex: Option<String>,
}

fn default_max_buffer_size() -> usize {
    100
}

fn default_flush_interval_secs() -> u64 {
    5
}

fn default_sweep_interval_secs() -> u64 {
    3600
}

fn default_trail() -> String {
    "default".to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_buffer_size: default_max_buffer_size(),
            flush_interval_secs: default_flush_interval_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
            default_trail: default_trail(),
            signing_key_hex: None,
        }
    }
}

impl EngineConfig {
    /// Parse `s` as a TOML configuration document.
    pub fn from_toml_str(s: &str) -> AuditResult<Self> {
        toml::from_str(s).map_err(|e| AuditError::ConfigError {
            reason: format!("failed to parse engine config TOML: {e}"),
        })
    }

    /// Read the file at `path` and parse it as TOML configuration.
    pub fn from_file(path: &Path) -> AuditResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| AuditError::ConfigError {
            reason: format!("failed to read config file '{}': {e}", path.display()),
        })?;
        Self::from_toml_str(&contents)
    }
}

#[cfg(test)]
mod tests {
    use super::EngineConfig;

    /// An empty document yields the documented defaults.
    #[test]
    fn test_defaults() {
        let config = EngineConfig::from_toml_str("").unwrap();
        assert_eq!(config.max_buffer_size, 100);
        assert_eq!(config.flush_interval_secs, 5);
        assert_eq!(config.sweep_interval_secs, 3600);
        assert_eq!(config.default_trail, "default");
        assert!(config.signing_key_hex.is_none());
    }

    /// Overrides take effect; malformed TOML is a ConfigError.
    #[test]
    fn test_overrides_and_errors() {
        let config = EngineConfig::from_toml_str(
            r#"
            max_buffer_size = 10
            flush_interval_secs = 1
            default_trail = "primary"
            "#,
        )
        .unwrap();
        assert_eq!(config.max_buffer_size, 10);
        assert_eq!(config.flush_interval_secs, 1);
        assert_eq!(config.default_trail, "primary");

        assert!(EngineConfig::from_toml_str("max_buffer_size = ][").is_err());
    }
}
