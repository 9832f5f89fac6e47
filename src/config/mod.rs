//! Process configuration: TOML file + environment overrides (§6
//! "Configuration").
//!
//! Grounded on the teacher's `ServerConfig::from_file`/`load` pattern
//! (a thin `toml::from_str` wrapper with a `CONFIG_PATH` environment
//! override and a short list of default search locations); generalized
//! to the flat `sse.*`/`routes.*`/`tenant.*`/`database.*`/`server.*`
//! key groups this system recognizes.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read { path: PathBuf, #[source] source: std::io::Error },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// `sse.*` — event bus tuning (§4.4, §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SseConfig {
    pub heartbeat_interval_ms: u64,
    pub activity_max_history: usize,
    pub activity_max_emitters_per_process: usize,
    pub activity_retention_ms: i64,
    /// Accepted for config compatibility; this runtime serves a single
    /// activity stream and has no separate notification bus to size.
    pub notification_max_emitters: usize,
    pub notification_max_history: usize,
}

impl Default for SseConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_ms: 25_000,
            activity_max_history: 200,
            activity_max_emitters_per_process: 16,
            activity_retention_ms: 600_000,
            notification_max_emitters: 16,
            notification_max_history: 200,
        }
    }
}

/// `routes.*` — compiler allowlists and the current persisted schema
/// version (§3, §4.6, §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RoutesConfig {
    pub allowed_uri_schemes: Vec<String>,
    pub allowed_http_hosts: Vec<String>,
    pub schema_version: u32,
}

impl Default for RoutesConfig {
    fn default() -> Self {
        Self { allowed_uri_schemes: Vec::new(), allowed_http_hosts: Vec::new(), schema_version: 1 }
    }
}

/// `tenant.*` — multi-tenancy defaults (§2, §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TenantConfig {
    pub default_id: String,
}

impl Default for TenantConfig {
    fn default() -> Self {
        Self { default_id: "default".to_string() }
    }
}

/// `database.*` — sqlx connection string.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DatabaseConfig {
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { url: "sqlite://routeforge.db".to_string() }
    }
}

/// `server.*` — HTTP transport bind address.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HttpServerConfig {
    pub bind_addr: String,
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self { bind_addr: "0.0.0.0:8080".to_string() }
    }
}

/// Top-level process configuration, one section per recognized key
/// group (§6 "Configuration").
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct AppConfig {
    pub sse: SseConfig,
    pub routes: RoutesConfig,
    pub tenant: TenantConfig,
    pub database: DatabaseConfig,
    pub server: HttpServerConfig,
}

impl AppConfig {
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn from_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Read { path: path.to_path_buf(), source: e })?;
        Self::from_str(&content)
    }

    /// `CONFIG_PATH` env var, else `./routeforge.toml`, else built-in
    /// defaults if neither exists.
    pub fn load() -> Result<Self, ConfigError> {
        if let Ok(path) = std::env::var("CONFIG_PATH") {
            return Self::from_file(path);
        }
        let default_path = PathBuf::from("routeforge.toml");
        if default_path.exists() {
            return Self::from_file(default_path);
        }
        Ok(Self::default())
    }
}

impl From<&SseConfig> for crate::events::EventBusConfig {
    fn from(cfg: &SseConfig) -> Self {
        crate::events::EventBusConfig {
            heartbeat_interval_ms: cfg.heartbeat_interval_ms,
            history_max: cfg.activity_max_history,
            max_emitters_per_process: cfg.activity_max_emitters_per_process,
            retention_ms: cfg.activity_retention_ms,
            ..Default::default()
        }
    }
}

impl From<&RoutesConfig> for crate::compiler::CompilerConfig {
    fn from(cfg: &RoutesConfig) -> Self {
        crate::compiler::CompilerConfig {
            allowed_uri_schemes: cfg.allowed_uri_schemes.clone(),
            allowed_http_hosts: cfg.allowed_http_hosts.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.sse.heartbeat_interval_ms, 25_000);
        assert_eq!(cfg.sse.activity_max_history, 200);
        assert_eq!(cfg.tenant.default_id, "default");
        assert_eq!(cfg.routes.schema_version, 1);
    }

    #[test]
    fn parses_partial_toml_with_defaults_filled_in() {
        let toml = r#"
[server]
bindAddr = "127.0.0.1:9000"

[routes]
allowedUriSchemes = ["direct", "log", "http"]
"#;
        let cfg = AppConfig::from_str(toml).unwrap();
        assert_eq!(cfg.server.bind_addr, "127.0.0.1:9000");
        assert_eq!(cfg.routes.allowed_uri_schemes, vec!["direct", "log", "http"]);
        assert_eq!(cfg.sse.heartbeat_interval_ms, 25_000);
    }

    #[test]
    fn rejects_malformed_toml() {
        assert!(AppConfig::from_str("not = [valid").is_err());
    }
}
