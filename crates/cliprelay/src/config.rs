//! Configuration management for cliprelay.
//!
//! This module provides configuration loading and validation using figment,
//! supporting TOML config files, environment variables, and defaults.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::backoff::Backoff;
use crate::error::{Error, Result};
use crate::logging::EmojiMode;
use crate::store::Endpoint;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Default config directory name.
const CONFIG_DIR_NAME: &str = "cliprelay";

/// Prefix for environment overrides, e.g. `CLIPRELAY_STORE__PASSWORD`.
const ENV_PREFIX: &str = "CLIPRELAY_";

/// Environment names understood for compatibility with older deployments,
/// and the configuration keys they set.
const LEGACY_ENV_KEYS: &[(&str, &str)] = &[
    ("DB_NAME", "store.database"),
    ("DB_USER", "store.user"),
    ("DB_PASSWORD", "store.password"),
    ("DB_PORT", "store.port"),
    ("LAN_IP", "store.primary_host"),
    ("DB_DOMAIN", "store.fallback_host"),
];

/// `store` fields that stay strings even when the value looks like a number.
const STORE_STRING_FIELDS: &[&str] = &[
    "database",
    "user",
    "password",
    "primary_host",
    "fallback_host",
];

/// A provider layer of `store` string settings keyed by field.
type StoreStrings = Serialized<BTreeMap<&'static str, BTreeMap<&'static str, String>>>;

/// Application configuration.
///
/// Configuration is loaded from (in order of precedence, highest first):
/// 1. Environment variables prefixed with `CLIPRELAY_` (`__` separates sections)
/// 2. Legacy environment variables (`DB_NAME`, `DB_PASSWORD`, `LAN_IP`, ...)
/// 3. TOML config file at `~/.config/cliprelay/config.toml`
/// 4. Default values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Store connection configuration.
    pub store: StoreConfig,
    /// Store reconnect configuration.
    pub retry: RetryConfig,
    /// Supervisor and liveness configuration.
    pub supervisor: SupervisorConfig,
    /// Hotkey configuration.
    pub hotkeys: HotkeyConfig,
    /// Logging configuration.
    pub logging: LoggingConfig,
}

/// Store connection settings shared by both endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Database name.
    pub database: String,
    /// User name.
    pub user: String,
    /// Password. Required to start the service.
    pub password: Option<String>,
    /// Port, shared by both hosts.
    pub port: u16,
    /// Host tried first.
    pub primary_host: String,
    /// Host tried when the primary cannot be reached.
    pub fallback_host: String,
    /// Timeout for one connection attempt, in seconds.
    pub connect_timeout_secs: u64,
}

/// Exponential backoff for store reconnects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Reconnect attempts before giving up.
    pub max_retries: u32,
    /// Delay before the first attempt, in milliseconds.
    pub base_delay_ms: u64,
    /// Upper bound on any delay, in milliseconds.
    pub max_delay_ms: u64,
}

/// Supervisor restart backoff and service liveness.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    /// Delay before the first restart, in milliseconds.
    pub restart_delay_ms: u64,
    /// Upper bound on the restart delay, in milliseconds.
    pub max_restart_delay_ms: u64,
    /// Growth factor applied to the restart delay after each restart.
    pub restart_multiplier: f64,
    /// Interval between liveness checks, in milliseconds.
    pub liveness_interval_ms: u64,
    /// Re-registration attempts when the hotkeys are found missing.
    pub reregister_attempts: u32,
}

/// Hotkey combos.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HotkeyConfig {
    /// Combo that captures the clipboard.
    pub capture: String,
    /// Combo that stops the service for good.
    pub stop: String,
}

/// Logging settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Append logs to this file in addition to stderr.
    pub file: Option<PathBuf>,
    /// Whether log lines may contain emoji.
    pub emoji: EmojiMode,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database: "clipboard_tts".to_string(),
            user: "postgres".to_string(),
            password: None,
            port: 5432,
            primary_host: "127.0.0.1".to_string(),
            fallback_host: "localhost".to_string(),
            connect_timeout_secs: 10,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
        }
    }
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            restart_delay_ms: 5_000,
            max_restart_delay_ms: 60_000,
            restart_multiplier: 1.5,
            liveness_interval_ms: 1_000,
            reregister_attempts: 1,
        }
    }
}

impl Default for HotkeyConfig {
    fn default() -> Self {
        Self {
            capture: "ctrl+alt+c".to_string(),
            stop: "ctrl+shift+q".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration with an optional custom config path.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load_from(config_path: Option<PathBuf>) -> Result<Self> {
        let config_file = config_path.unwrap_or_else(Self::default_config_path);
        let config: Config = Self::figment(config_file).extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Build the layered provider stack for the given config file.
    ///
    /// The `Env` provider parses `DB_PASSWORD=0042` as the integer 42, so each
    /// environment layer is followed by the same `store` strings read verbatim.
    #[must_use]
    pub fn figment(config_file: PathBuf) -> Figment {
        let legacy_names: Vec<&str> = LEGACY_ENV_KEYS.iter().map(|(name, _)| *name).collect();

        let legacy_strings = LEGACY_ENV_KEYS.iter().filter_map(|(name, key)| {
            key.strip_prefix("store.")
                .filter(|field| STORE_STRING_FIELDS.contains(field))
                .map(|field| ((*name).to_string(), field))
        });
        let prefixed_strings = STORE_STRING_FIELDS.iter().map(|field| {
            (
                format!("{ENV_PREFIX}STORE__{}", field.to_ascii_uppercase()),
                *field,
            )
        });

        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(config_file))
            .merge(Env::raw().only(&legacy_names).map(|name| {
                LEGACY_ENV_KEYS
                    .iter()
                    .find(|(legacy, _)| name == *legacy)
                    .map_or_else(|| name.as_str().into(), |(_, key)| (*key).into())
            }))
            .merge(verbatim_store_env(legacy_strings))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .merge(verbatim_store_env(prefixed_strings))
    }

    /// Get the default configuration file path.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join(CONFIG_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<()> {
        let store = &self.store;
        for (name, value) in [
            ("store.database", &store.database),
            ("store.user", &store.user),
            ("store.primary_host", &store.primary_host),
            ("store.fallback_host", &store.fallback_host),
        ] {
            if value.trim().is_empty() {
                return Err(Error::invalid_config(format!("{name} must not be empty")));
            }
        }
        if store.port == 0 {
            return Err(Error::invalid_config("store.port must be greater than 0"));
        }
        if store.connect_timeout_secs == 0 {
            return Err(Error::invalid_config(
                "store.connect_timeout_secs must be greater than 0",
            ));
        }

        if self.retry.max_retries == 0 {
            return Err(Error::invalid_config(
                "retry.max_retries must be greater than 0",
            ));
        }
        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            return Err(Error::invalid_config(format!(
                "retry.base_delay_ms ({}) cannot be greater than retry.max_delay_ms ({})",
                self.retry.base_delay_ms, self.retry.max_delay_ms
            )));
        }

        let supervisor = &self.supervisor;
        if supervisor.restart_delay_ms == 0 {
            return Err(Error::invalid_config(
                "supervisor.restart_delay_ms must be greater than 0",
            ));
        }
        if supervisor.restart_delay_ms > supervisor.max_restart_delay_ms {
            return Err(Error::invalid_config(format!(
                "supervisor.restart_delay_ms ({}) cannot be greater than supervisor.max_restart_delay_ms ({})",
                supervisor.restart_delay_ms, supervisor.max_restart_delay_ms
            )));
        }
        if !supervisor.restart_multiplier.is_finite() || supervisor.restart_multiplier < 1.0 {
            return Err(Error::invalid_config(
                "supervisor.restart_multiplier must be at least 1.0",
            ));
        }
        if supervisor.liveness_interval_ms == 0 {
            return Err(Error::invalid_config(
                "supervisor.liveness_interval_ms must be greater than 0",
            ));
        }

        let capture = self.hotkeys.capture.trim();
        let stop = self.hotkeys.stop.trim();
        if capture.is_empty() || stop.is_empty() {
            return Err(Error::invalid_config("hotkey combos must not be empty"));
        }
        if capture.eq_ignore_ascii_case(stop) {
            return Err(Error::invalid_config(format!(
                "capture and stop hotkeys are both '{capture}'"
            )));
        }

        Ok(())
    }

    /// Build the ordered endpoint list: primary host first, then fallback.
    ///
    /// # Errors
    ///
    /// Returns an error if no password is configured.
    pub fn endpoints(&self) -> Result<Vec<Endpoint>> {
        let store = &self.store;
        let Some(password) = store.password.clone().filter(|p| !p.is_empty()) else {
            return Err(Error::missing_credential(
                "store.password",
                "Set DB_PASSWORD, CLIPRELAY_STORE__PASSWORD, or store.password in the config file",
            ));
        };

        let endpoint = |label: &str, host: &str| Endpoint {
            label: label.to_string(),
            host: host.to_string(),
            port: store.port,
            database: store.database.clone(),
            user: store.user.clone(),
            password: password.clone(),
            connect_timeout: self.connect_timeout(),
        };

        Ok(vec![
            endpoint("primary", &store.primary_host),
            endpoint("fallback", &store.fallback_host),
        ])
    }

    /// A copy of this configuration with the password masked.
    #[must_use]
    pub fn redacted(&self) -> Self {
        let mut config = self.clone();
        config.store.password = config
            .store
            .password
            .as_ref()
            .map(|p| "*".repeat(p.chars().count()));
        config
    }

    /// Get the connect timeout as a Duration.
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.store.connect_timeout_secs)
    }

    /// Backoff for store reconnects.
    #[must_use]
    pub fn reconnect_backoff(&self) -> Backoff {
        Backoff::new(
            Duration::from_millis(self.retry.base_delay_ms),
            Duration::from_millis(self.retry.max_delay_ms),
            2.0,
        )
    }

    /// Backoff for service restarts.
    #[must_use]
    pub fn restart_backoff(&self) -> Backoff {
        Backoff::new(
            Duration::from_millis(self.supervisor.restart_delay_ms),
            Duration::from_millis(self.supervisor.max_restart_delay_ms),
            self.supervisor.restart_multiplier,
        )
    }

    /// Get the liveness interval as a Duration.
    #[must_use]
    pub fn liveness_interval(&self) -> Duration {
        Duration::from_millis(self.supervisor.liveness_interval_ms)
    }
}

/// `store` string fields from the named environment variables, untouched.
fn verbatim_store_env(vars: impl Iterator<Item = (String, &'static str)>) -> StoreStrings {
    let store: BTreeMap<&'static str, String> = vars
        .filter_map(|(name, field)| std::env::var(name).ok().map(|value| (field, value)))
        .collect();

    let mut root = BTreeMap::new();
    if !store.is_empty() {
        root.insert("store", store);
    }
    Serialized::defaults(root)
}
