//! Application configuration.
//!
//! Loaded from YAML files and environment variables with the `config` crate.

use std::time::Duration;

use serde::Deserialize;

use crate::bridge::{DEFAULT_CHANNEL, DEFAULT_RECONNECT_DELAY};

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "lwjeb.yaml";
/// Environment variable for configuration file path.
pub const CONFIG_ENV_VAR: &str = "LWJEB_CONFIG";
/// Prefix for configuration environment variables.
pub const CONFIG_ENV_PREFIX: &str = "LWJEB";
/// Environment variable for logging configuration.
pub const LOG_ENV_VAR: &str = "LWJEB_LOG";

/// Default Redis URL.
pub const DEFAULT_REDIS_URL: &str = "redis://localhost:6379";
/// Default bound on concurrently checked-out Redis connections.
pub const DEFAULT_MAX_CONNECTIONS: usize = 16;

/// Errors that can occur loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] ::config::ConfigError),
}

/// Main application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Redis connection configuration.
    pub redis: RedisConfig,
    /// Bridge behaviour.
    pub bridge: BridgeConfig,
}

/// Redis connection configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    /// Redis connection URL.
    pub url: String,
    /// Upper bound on connections checked out at once.
    pub max_connections: usize,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_REDIS_URL.to_string(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
        }
    }
}

/// Bridge configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Name used in logs for this bridge's bus.
    pub identifier: String,
    /// Channels to subscribe to.
    pub channels: Vec<String>,
    /// Pause after a failed connect or subscribe, in milliseconds.
    pub reconnect_delay_ms: u64,
}

impl BridgeConfig {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            identifier: "lwjeb".to_string(),
            channels: vec![DEFAULT_CHANNEL.to_string()],
            reconnect_delay_ms: DEFAULT_RECONNECT_DELAY.as_millis() as u64,
        }
    }
}

impl Config {
    /// Load configuration from file and environment.
    ///
    /// Configuration sources (in order of priority, later overrides earlier):
    /// 1. `lwjeb.yaml` in current directory (if exists)
    /// 2. File specified by `path` argument (if provided)
    /// 3. File specified by `CONFIG_ENV_VAR` environment variable (if set)
    /// 4. Environment variables with `CONFIG_ENV_PREFIX` prefix, e.g.
    ///    `LWJEB__REDIS__URL` or `LWJEB__BRIDGE__CHANNELS=a,b`
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        use ::config::{Config as ConfigLib, Environment, File, FileFormat};

        let mut builder = ConfigLib::builder()
            .add_source(File::new(DEFAULT_CONFIG_FILE, FileFormat::Yaml).required(false));

        if let Some(config_path) = path {
            builder = builder.add_source(File::new(config_path, FileFormat::Yaml).required(true));
        }

        if let Ok(config_path) = std::env::var(CONFIG_ENV_VAR) {
            builder = builder.add_source(File::new(&config_path, FileFormat::Yaml).required(true));
        }

        let config = builder
            .add_source(
                Environment::with_prefix(CONFIG_ENV_PREFIX)
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("bridge.channels")
                    .try_parsing(true),
            )
            .build()?;

        Ok(config.try_deserialize()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.redis.url, "redis://localhost:6379");
        assert_eq!(config.redis.max_connections, 16);
        assert_eq!(config.bridge.channels, vec!["LWJEB".to_string()]);
        assert_eq!(config.bridge.reconnect_delay(), Duration::from_millis(250));
    }

    #[test]
    #[serial]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(
            file,
            "redis:\n  url: redis://cache:6380\nbridge:\n  identifier: lobby\n  channels: [chat, scores]\n  reconnect_delay_ms: 0"
        )
        .unwrap();

        let config = Config::load(file.path().to_str()).unwrap();

        assert_eq!(config.redis.url, "redis://cache:6380");
        assert_eq!(config.redis.max_connections, 16);
        assert_eq!(config.bridge.identifier, "lobby");
        assert_eq!(config.bridge.channels, vec!["chat", "scores"]);
        assert!(config.bridge.reconnect_delay().is_zero());
    }

    #[test]
    #[serial]
    fn test_env_overrides() {
        std::env::set_var("LWJEB__REDIS__URL", "redis://env-host:6379");
        std::env::set_var("LWJEB__REDIS__MAX_CONNECTIONS", "4");
        std::env::set_var("LWJEB__BRIDGE__CHANNELS", "a,b");

        let config = Config::load(None);

        std::env::remove_var("LWJEB__REDIS__URL");
        std::env::remove_var("LWJEB__REDIS__MAX_CONNECTIONS");
        std::env::remove_var("LWJEB__BRIDGE__CHANNELS");

        let config = config.unwrap();
        assert_eq!(config.redis.url, "redis://env-host:6379");
        assert_eq!(config.redis.max_connections, 4);
        assert_eq!(config.bridge.channels, vec!["a", "b"]);
    }

    #[test]
    #[serial]
    fn test_missing_explicit_file_fails() {
        let result = Config::load(Some("/nonexistent/lwjeb.yaml"));
        assert!(result.is_err());
    }
}
