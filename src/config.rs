//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides.

use crate::query::TimeRangePolicy;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub api: ApiConfig,

    #[serde(default)]
    pub query: QueryConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Event store configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_ms: u64,
}

fn default_database_path() -> PathBuf {
    dirs::data_local_dir()
        .map(|p| p.join("feedbackjar").join("feedbackjar.db"))
        .unwrap_or_else(|| PathBuf::from("./feedbackjar_data/feedbackjar.db"))
}

fn default_busy_timeout() -> u64 {
    5000 // 5 seconds
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            busy_timeout_ms: default_busy_timeout(),
        }
    }
}

/// API server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,

    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8090
}

fn default_cors_origins() -> Vec<String> {
    vec![
        "http://localhost:3000".to_string(),
        "http://127.0.0.1:3000".to_string(),
    ]
}

fn default_max_batch_size() -> usize {
    1000
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: default_cors_origins(),
            max_batch_size: default_max_batch_size(),
        }
    }
}

impl ApiConfig {
    /// Get the socket address string
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Chart query configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct QueryConfig {
    /// What to do with a `timeRange` outside the supported set
    #[serde(default)]
    pub time_range_policy: TimeRangePolicy,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        let mut config = Self::parse(&content).map_err(|error| ConfigError::Parse {
            path: path.to_path_buf(),
            error,
        })?;
        config.storage.database_path = expand_home(&config.storage.database_path);

        Ok(config)
    }

    fn parse(content: &str) -> Result<Self, String> {
        toml::from_str(content).map_err(|e| e.to_string())
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_overrides(|key| std::env::var(key).ok());
        config
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Load from default locations or environment
    pub fn load_default() -> Self {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("feedbackjar").join("config.toml")),
            Some(PathBuf::from("/etc/feedbackjar/config.toml")),
            Some(PathBuf::from("./config.toml")),
        ];

        for path in config_paths.iter().flatten() {
            if path.exists() {
                match Self::load_with_env(path) {
                    Ok(config) => {
                        tracing::info!("Loaded config from {:?}", path);
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load config from {:?}: {}", path, e);
                    }
                }
            }
        }

        tracing::info!("Using default config with environment overrides");
        Self::from_env()
    }

    /// Apply `FEEDBACKJAR_*` overrides read through `lookup`
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(path) = lookup("FEEDBACKJAR_DATABASE_PATH") {
            self.storage.database_path = expand_home(Path::new(&path));
        }

        if let Some(host) = lookup("FEEDBACKJAR_API_HOST") {
            self.api.host = host;
        }
        if let Some(port) = lookup("FEEDBACKJAR_API_PORT") {
            match port.parse() {
                Ok(p) => self.api.port = p,
                Err(_) => tracing::warn!("Ignoring invalid FEEDBACKJAR_API_PORT: {}", port),
            }
        }

        if let Some(policy) = lookup("FEEDBACKJAR_TIME_RANGE_POLICY") {
            match policy.parse() {
                Ok(p) => self.query.time_range_policy = p,
                Err(e) => tracing::warn!("Ignoring FEEDBACKJAR_TIME_RANGE_POLICY: {}", e),
            }
        }

        if let Some(level) = lookup("FEEDBACKJAR_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = lookup("FEEDBACKJAR_LOG_FORMAT") {
            self.logging.format = format;
        }
    }
}

/// Expand a leading `~/` to the user's home directory
fn expand_home(path: &Path) -> PathBuf {
    match (path.strip_prefix("~"), dirs::home_dir()) {
        (Ok(rest), Some(home)) => home.join(rest),
        _ => path.to_path_buf(),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# FeedbackJar Analytics Configuration
#
# Environment variables override these settings:
# - FEEDBACKJAR_DATABASE_PATH
# - FEEDBACKJAR_API_HOST
# - FEEDBACKJAR_API_PORT
# - FEEDBACKJAR_TIME_RANGE_POLICY
# - FEEDBACKJAR_LOG_LEVEL
# - FEEDBACKJAR_LOG_FORMAT

[storage]
# SQLite database file (created on first start)
database_path = "~/.local/share/feedbackjar/feedbackjar.db"

# How long a writer waits on a locked database (ms)
busy_timeout_ms = 5000

[api]
# API server host
host = "0.0.0.0"

# API server port
port = 8090

# Allowed CORS origins
cors_origins = ["http://localhost:3000", "http://127.0.0.1:3000"]

# Maximum number of events accepted by one batch request
max_batch_size = 1000

[query]
# Unknown timeRange values: "strict" rejects the chart,
# "legacy_fallback" substitutes the last 7 days and logs a warning
time_range_policy = "strict"

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.api.port, 8090);
        assert_eq!(config.api.max_batch_size, 1000);
        assert_eq!(config.query.time_range_policy, TimeRangePolicy::Strict);
        assert_eq!(config.logging.format, "pretty");
    }

    #[test]
    fn test_generated_config_parses() {
        let config = Config::parse(&generate_default_config()).unwrap();
        assert_eq!(config.api.port, 8090);
        assert_eq!(config.storage.busy_timeout_ms, 5000);
        assert_eq!(config.query.time_range_policy, TimeRangePolicy::Strict);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = Config::parse(
            r#"
            [query]
            time_range_policy = "legacy_fallback"
            "#,
        )
        .unwrap();

        assert_eq!(config.query.time_range_policy, TimeRangePolicy::LegacyFallback);
        assert_eq!(config.api.host, "0.0.0.0");
    }

    #[test]
    fn test_api_section_without_cors_keeps_default_origins() {
        let config = Config::parse(
            r#"
            [api]
            port = 9000
            "#,
        )
        .unwrap();

        assert_eq!(config.api.port, 9000);
        assert_eq!(config.api.cors_origins, ApiConfig::default().cors_origins);
        assert!(!config.api.cors_origins.is_empty());
    }

    #[test]
    fn test_load_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[api]\nport = \"not a number\"\n").unwrap();

        match Config::load(&path) {
            Err(ConfigError::Parse { path: p, .. }) => assert_eq!(p, path),
            other => panic!("expected parse error, got {:?}", other),
        }

        assert!(matches!(
            Config::load(&dir.path().join("missing.toml")),
            Err(ConfigError::Io { .. })
        ));
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = [
            ("FEEDBACKJAR_DATABASE_PATH", "/tmp/fj.db"),
            ("FEEDBACKJAR_API_PORT", "9999"),
            ("FEEDBACKJAR_TIME_RANGE_POLICY", "legacy"),
            ("FEEDBACKJAR_LOG_FORMAT", "json"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.storage.database_path, PathBuf::from("/tmp/fj.db"));
        assert_eq!(config.api.port, 9999);
        assert_eq!(config.query.time_range_policy, TimeRangePolicy::LegacyFallback);
        assert_eq!(config.logging.format, "json");
    }

    #[test]
    fn test_expand_home() {
        let absolute = PathBuf::from("/var/lib/feedbackjar.db");
        assert_eq!(expand_home(&absolute), absolute);

        if let Some(home) = dirs::home_dir() {
            assert_eq!(
                expand_home(Path::new("~/.local/share/feedbackjar/feedbackjar.db")),
                home.join(".local/share/feedbackjar/feedbackjar.db")
            );
        }
    }

    #[test]
    fn test_invalid_overrides_are_ignored() {
        let mut config = Config::default();
        config.apply_overrides(|key| match key {
            "FEEDBACKJAR_API_PORT" => Some("http".to_string()),
            "FEEDBACKJAR_TIME_RANGE_POLICY" => Some("lenient".to_string()),
            _ => None,
        });

        assert_eq!(config.api.port, 8090);
        assert_eq!(config.query.time_range_policy, TimeRangePolicy::Strict);
    }
}
