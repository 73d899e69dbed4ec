//! Layered configuration.
//!
//! Supports default values, a TOML configuration file, and environment
//! variable overrides. Environment variables are prefixed with `WATCHTREE_`
//! and use double underscores to separate nested levels:
//! `WATCHTREE_WATCHER__CHANNEL_CAPACITY=256` sets `watcher.channel_capacity`.

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::watcher::WatchError;

/// Default capacity of a session's output channel.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 100;

/// Name of the optional configuration file, looked up in the working
/// directory.
pub const CONFIG_FILE: &str = "watchtree.toml";

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Settings {
    /// Watch session defaults
    #[serde(default)]
    pub watcher: WatcherConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct WatcherConfig {
    /// Output channel capacity; a full channel suspends the pump
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    /// Default log level filter
    #[serde(default = "default_log_level")]
    pub default: String,

    /// Per-module level overrides
    #[serde(default)]
    pub modules: HashMap<String, String>,
}

fn default_channel_capacity() -> usize {
    DEFAULT_CHANNEL_CAPACITY
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default: default_log_level(),
            modules: HashMap::new(),
        }
    }
}

impl Settings {
    /// Load settings layered as defaults, then `watchtree.toml`, then
    /// `WATCHTREE_`-prefixed environment variables.
    pub fn load() -> Result<Self, WatchError> {
        Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file(CONFIG_FILE))
            .merge(Env::prefixed("WATCHTREE_").split("__"))
            .extract()
            .map_err(|e| WatchError::ConfigError {
                reason: e.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.watcher.channel_capacity, DEFAULT_CHANNEL_CAPACITY);
        assert_eq!(settings.logging.default, "warn");
        assert!(settings.logging.modules.is_empty());
    }

    #[test]
    fn test_toml_layer_overrides_defaults() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                CONFIG_FILE,
                r#"
                [watcher]
                channel_capacity = 7

                [logging]
                default = "info"
                "#,
            )?;
            let settings = Settings::load().expect("load should succeed");
            assert_eq!(settings.watcher.channel_capacity, 7);
            assert_eq!(settings.logging.default, "info");
            Ok(())
        });
    }

    #[test]
    fn test_env_layer_overrides_toml() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                CONFIG_FILE,
                r#"
                [watcher]
                channel_capacity = 7
                "#,
            )?;
            jail.set_env("WATCHTREE_WATCHER__CHANNEL_CAPACITY", "256");
            let settings = Settings::load().expect("load should succeed");
            assert_eq!(settings.watcher.channel_capacity, 256);
            Ok(())
        });
    }
}
