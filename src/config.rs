//! Configuration file parser for `feedbell.toml`.
//!
//! The config file is optional: a missing file yields `Config::default()`.
//! Unknown keys are ignored by serde, though we log a warning when the file
//! contains potential typos.
use secrecy::SecretString;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::feed::TransferLimits;
use crate::notify::DEFAULT_DISCORD_API_BASE;
use crate::sync::SyncSettings;

/// Environment variable that overrides `discord_token`
pub const TOKEN_ENV_VAR: &str = "FEEDBELL_DISCORD_TOKEN";

/// Config file used when `--config` is not given
pub const DEFAULT_CONFIG_PATH: &str = "feedbell.toml";

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Config file too large: {0}")]
    TooLarge(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

// ============================================================================
// Configuration Struct
// ============================================================================

/// Runtime configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
/// The `Debug` impl masks `discord_token`.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// SQLite file holding subscriptions, or `:memory:`
    pub database_path: String,

    /// Seconds between scheduled cycles
    pub sync_interval_secs: u64,

    /// How long one multiplexer poll waits for a completion
    pub poll_interval_ms: u64,

    /// Transfers allowed to run at once
    pub max_in_flight: usize,

    /// Budget for one feed download
    pub request_timeout_secs: u64,

    /// Largest feed document accepted, in bytes
    pub max_feed_size: usize,

    /// Allow subscribing to localhost and private network addresses
    pub allow_private_hosts: bool,

    /// Bot token. The `FEEDBELL_DISCORD_TOKEN` env var takes precedence.
    pub discord_token: Option<String>,

    pub discord_api_base: String,

    /// Log filter used when `RUST_LOG` is unset
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: "feedbell.db".to_string(),
            sync_interval_secs: 600,
            poll_interval_ms: 300,
            max_in_flight: 16,
            request_timeout_secs: 30,
            max_feed_size: 10 * 1024 * 1024,
            allow_private_hosts: false,
            discord_token: None,
            discord_api_base: DEFAULT_DISCORD_API_BASE.to_string(),
            log_level: "info".to_string(),
        }
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("database_path", &self.database_path)
            .field("sync_interval_secs", &self.sync_interval_secs)
            .field("poll_interval_ms", &self.poll_interval_ms)
            .field("max_in_flight", &self.max_in_flight)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("max_feed_size", &self.max_feed_size)
            .field("allow_private_hosts", &self.allow_private_hosts)
            .field(
                "discord_token",
                &self.discord_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("discord_api_base", &self.discord_api_base)
            .field("log_level", &self.log_level)
            .finish()
    }
}

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    const KNOWN_KEYS: [&'static str; 10] = [
        "database_path",
        "sync_interval_secs",
        "poll_interval_ms",
        "max_in_flight",
        "request_timeout_secs",
        "max_feed_size",
        "allow_private_hosts",
        "discord_token",
        "discord_api_base",
        "log_level",
    ];

    /// Load and validate configuration from a TOML file.
    ///
    /// - Missing or empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Zero intervals or limits → `Err(ConfigError::Invalid)`
    /// - Unknown keys → accepted, logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        // Check the size first so a huge file is never read into memory
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        let config = Self::parse(&content)?;
        tracing::info!(path = %path.display(), database = %config.database_path, "Loaded configuration");
        Ok(config)
    }

    /// Parse and validate configuration text.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !Self::KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would stall or disable the engine.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let checks = [
            ("sync_interval_secs", self.sync_interval_secs == 0),
            ("poll_interval_ms", self.poll_interval_ms == 0),
            ("max_in_flight", self.max_in_flight == 0),
            ("request_timeout_secs", self.request_timeout_secs == 0),
            ("max_feed_size", self.max_feed_size == 0),
        ];
        for (key, is_zero) in checks {
            if is_zero {
                return Err(ConfigError::Invalid(format!("{} must be greater than 0", key)));
            }
        }
        Ok(())
    }

    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_secs)
    }

    pub fn transfer_limits(&self) -> TransferLimits {
        TransferLimits {
            timeout: Duration::from_secs(self.request_timeout_secs),
            max_size: self.max_feed_size,
        }
    }

    pub fn sync_settings(&self) -> SyncSettings {
        SyncSettings {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            max_in_flight: self.max_in_flight,
            limits: self.transfer_limits(),
        }
    }

    /// The bot token to use, env var first, then the config file.
    pub fn discord_token(&self) -> Option<SecretString> {
        resolve_token(
            std::env::var(TOKEN_ENV_VAR).ok(),
            self.discord_token.as_deref(),
        )
    }
}

fn resolve_token(from_env: Option<String>, from_file: Option<&str>) -> Option<SecretString> {
    from_env
        .filter(|t| !t.trim().is_empty())
        .or_else(|| {
            from_file
                .filter(|t| !t.trim().is_empty())
                .map(str::to_string)
        })
        .map(|t| SecretString::from(t.trim().to_string()))
}

// ============================================================================
// Tests
// ============================================================================
