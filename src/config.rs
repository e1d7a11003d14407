use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        source: serde_yaml::Error,
    },

    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    pub log_level: String,
    pub log_dir: String,
    pub log_file: String,
    pub use_json: bool,
    pub rotation: String,
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
}

/// Which store backs the ledger
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LedgerBackend {
    #[default]
    Postgres,
    Memory,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct LedgerConfig {
    pub backend: LedgerBackend,
    /// PostgreSQL connection URL, overridden by `DATABASE_URL` when set
    pub postgres_url: Option<String>,
    pub max_connections: u32,
    pub acquire_timeout_ms: u64,
    /// Upper bound on waiting for an account row lock inside a transfer
    pub lock_timeout_ms: u64,
    /// Allow transfers to drive the source balance below zero
    pub allow_overdraft: bool,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            backend: LedgerBackend::Postgres,
            postgres_url: None,
            max_connections: 20,
            acquire_timeout_ms: 5000,
            lock_timeout_ms: 3000,
            allow_overdraft: false,
        }
    }
}

impl LedgerConfig {
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    /// Resolve the connection URL, preferring the `DATABASE_URL` environment
    /// variable over the config file.
    pub fn database_url(&self) -> Result<String, ConfigError> {
        std::env::var("DATABASE_URL")
            .ok()
            .or_else(|| self.postgres_url.clone())
            .ok_or_else(|| {
                ConfigError::Invalid(
                    "ledger.postgres_url or DATABASE_URL is required for the postgres backend"
                        .to_string(),
                )
            })
    }
}

impl AppConfig {
    pub fn load(env: &str) -> Result<Self, ConfigError> {
        let config_path = format!("config/{}.yaml", env);
        let content = fs::read_to_string(&config_path).map_err(|source| ConfigError::Read {
            path: config_path.clone(),
            source,
        })?;
        Self::from_yaml(&content).map_err(|source| ConfigError::Parse {
            path: config_path,
            source,
        })
    }

    pub fn from_yaml(content: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEV_YAML: &str = r#"
log_level: "info"
log_dir: "./logs"
log_file: "simple_bank.log"
use_json: false
rotation: "daily"
gateway:
  host: "0.0.0.0"
  port: 8080
ledger:
  backend: memory
  lock_timeout_ms: 1500
"#;

    #[test]
    fn test_parse_config_with_partial_ledger_section() {
        let config = AppConfig::from_yaml(DEV_YAML).unwrap();
        assert_eq!(config.gateway.port, 8080);
        assert_eq!(config.ledger.backend, LedgerBackend::Memory);
        assert_eq!(config.ledger.lock_timeout(), Duration::from_millis(1500));
        // Unspecified fields fall back to defaults
        assert_eq!(config.ledger.max_connections, 20);
        assert!(!config.ledger.allow_overdraft);
    }

    #[test]
    fn test_ledger_section_is_optional() {
        let yaml = DEV_YAML.split("ledger:").next().unwrap();
        let config = AppConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.ledger.backend, LedgerBackend::Postgres);
    }

    #[test]
    fn test_missing_config_file() {
        let err = AppConfig::load("does-not-exist").unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_shipped_configs_load() {
        let dev = AppConfig::load("dev").unwrap();
        assert_eq!(dev.ledger.backend, LedgerBackend::Postgres);
        assert!(dev.ledger.postgres_url.is_some());

        let memory = AppConfig::load("memory").unwrap();
        assert_eq!(memory.ledger.backend, LedgerBackend::Memory);

        let prod = AppConfig::load("prod").unwrap();
        assert!(prod.use_json);
    }

    #[test]
    fn test_unknown_backend_rejected() {
        let yaml = DEV_YAML.replace("backend: memory", "backend: sqlite");
        assert!(AppConfig::from_yaml(&yaml).is_err());
    }
}
