//! TOML-based application configuration.
//!
//! Stores engine settings including:
//! - Suggestion tuning (pool cap, quiet hours, dayparts, fetch limits)
//! - Poll sweeping and vote token lifetime
//! - Token signing seed and legacy identity acceptance
//!
//! Configuration is stored at `~/.config/meetpoll/config.toml`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::data_dir;
use crate::availability::{default_dayparts, Daypart, SlotPrioritizer, DEFAULT_POOL_CAP};
use crate::error::ConfigError;

/// Environment variable that overrides `auth.signing_seed`.
pub const SIGNING_SEED_ENV: &str = "MEETPOLL_SIGNING_SEED";

/// Upper bound on `polls.token_ttl_hours`.
pub const MAX_TOKEN_TTL_HOURS: i64 = 24 * 365 * 10;

/// Suggestion pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuggestionSettings {
    #[serde(default = "default_pool_cap")]
    pub pool_cap: usize,
    #[serde(default = "default_increment")]
    pub default_increment_minutes: i64,
    #[serde(default = "default_max_suggestions")]
    pub default_max_suggestions: i64,
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,
    #[serde(default = "default_max_concurrent_fetches")]
    pub max_concurrent_fetches: usize,
    #[serde(default = "default_quiet_start")]
    pub quiet_hours_start: u32,
    #[serde(default = "default_quiet_end")]
    pub quiet_hours_end: u32,
    #[serde(default = "default_dayparts")]
    pub dayparts: Vec<Daypart>,
}

/// Poll lifecycle configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollSettings {
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
    #[serde(default = "default_token_ttl")]
    pub token_ttl_hours: i64,
}

/// Vote token configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthSettings {
    /// Seed the token signing key is derived from.
    #[serde(default)]
    pub signing_seed: Option<String>,
    /// Accept a bare `voter_email` when no signed token is presented.
    #[serde(default = "default_true")]
    pub allow_legacy_email: bool,
}

/// Application configuration.
///
/// Serialized to/from TOML at `~/.config/meetpoll/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub suggestions: SuggestionSettings,
    #[serde(default)]
    pub polls: PollSettings,
    #[serde(default)]
    pub auth: AuthSettings,
}

// Default functions
fn default_pool_cap() -> usize {
    DEFAULT_POOL_CAP
}
fn default_increment() -> i64 {
    30
}
fn default_max_suggestions() -> i64 {
    5
}
fn default_fetch_timeout() -> u64 {
    10
}
fn default_max_concurrent_fetches() -> usize {
    8
}
fn default_quiet_start() -> u32 {
    6
}
fn default_quiet_end() -> u32 {
    22
}
fn default_sweep_interval() -> u64 {
    60
}
fn default_token_ttl() -> i64 {
    24 * 7
}
fn default_true() -> bool {
    true
}

impl Default for SuggestionSettings {
    fn default() -> Self {
        Self {
            pool_cap: default_pool_cap(),
            default_increment_minutes: default_increment(),
            default_max_suggestions: default_max_suggestions(),
            fetch_timeout_secs: default_fetch_timeout(),
            max_concurrent_fetches: default_max_concurrent_fetches(),
            quiet_hours_start: default_quiet_start(),
            quiet_hours_end: default_quiet_end(),
            dayparts: default_dayparts(),
        }
    }
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            sweep_interval_secs: default_sweep_interval(),
            token_ttl_hours: default_token_ttl(),
        }
    }
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            signing_seed: None,
            allow_legacy_email: default_true(),
        }
    }
}

impl SuggestionSettings {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    /// Build the prioritizer, validating quiet hours and daypart layout.
    pub fn prioritizer(&self) -> Result<SlotPrioritizer, ConfigError> {
        SlotPrioritizer::new(
            self.quiet_hours_start,
            self.quiet_hours_end,
            self.dayparts.clone(),
        )
    }
}

impl PollSettings {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    /// Vote token lifetime, clamped to `1..=MAX_TOKEN_TTL_HOURS`.
    pub fn token_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(self.token_ttl_hours.clamp(1, MAX_TOKEN_TTL_HOURS))
    }
}

impl AuthSettings {
    /// Signing seed from the environment, falling back to the config file.
    ///
    /// # Errors
    /// Returns [`ConfigError::MissingKey`] if neither is set.
    pub fn resolve_signing_seed(&self) -> Result<String, ConfigError> {
        if let Ok(seed) = std::env::var(SIGNING_SEED_ENV) {
            if !seed.is_empty() {
                return Ok(seed);
            }
        }
        self.signing_seed
            .clone()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ConfigError::MissingKey("auth.signing_seed".to_string()))
    }
}

impl Config {
    fn get_json_value_by_path<'a>(
        root: &'a serde_json::Value,
        key: &str,
    ) -> Option<&'a serde_json::Value> {
        if key.is_empty() {
            return None;
        }

        let mut current = root;
        for part in key.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }

    fn set_json_value_by_path(
        root: &mut serde_json::Value,
        key: &str,
        value: &str,
    ) -> Result<(), ConfigError> {
        let unknown = || ConfigError::InvalidValue {
            key: key.to_string(),
            message: "unknown config key".to_string(),
        };
        let unparsable = |kind: &str| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("cannot parse '{value}' as {kind}"),
        };

        let mut parts = key.split('.').peekable();
        if key.is_empty() {
            return Err(ConfigError::MissingKey("(empty)".to_string()));
        }

        let mut current = root;
        while let Some(part) = parts.next() {
            let is_leaf = parts.peek().is_none();
            if is_leaf {
                let obj = current.as_object_mut().ok_or_else(unknown)?;
                let existing = obj.get(part).ok_or_else(unknown)?;

                let new_value = match existing {
                    serde_json::Value::Bool(_) => serde_json::Value::Bool(
                        value.parse::<bool>().map_err(|_| unparsable("bool"))?,
                    ),
                    serde_json::Value::Number(_) => {
                        if let Ok(n) = value.parse::<i64>() {
                            serde_json::Value::Number(n.into())
                        } else {
                            return Err(unparsable("integer"));
                        }
                    }
                    serde_json::Value::Object(_) | serde_json::Value::Array(_) => {
                        serde_json::from_str(value).map_err(|_| unparsable("JSON"))?
                    }
                    // Null covers unset optional strings such as auth.signing_seed.
                    _ => serde_json::Value::String(value.into()),
                };

                obj.insert(part.to_string(), new_value);
                return Ok(());
            }

            current = current.get_mut(part).ok_or_else(unknown)?;
        }

        Err(unknown())
    }

    /// Default location of the config file.
    pub fn path() -> Result<PathBuf, ConfigError> {
        data_dir()
            .map(|dir| dir.join("config.toml"))
            .map_err(|e| ConfigError::LoadFailed {
                path: PathBuf::from("config.toml"),
                message: e.to_string(),
            })
    }

    /// Load from the default location, writing defaults if missing.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed,
    /// or if the default config cannot be written to disk.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::path()?)
    }

    /// Load from an explicit path, writing defaults if the file is missing.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => {
                let cfg: Config = toml::from_str(&content).map_err(|e| ConfigError::LoadFailed {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                })?;
                cfg.validate()?;
                Ok(cfg)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let cfg = Self::default();
                cfg.save_to(path)?;
                Ok(cfg)
            }
            Err(e) => Err(ConfigError::LoadFailed {
                path: path.to_path_buf(),
                message: e.to_string(),
            }),
        }
    }

    /// Persist to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::path()?)
    }

    /// Persist to an explicit path.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let save_failed = |message: String| ConfigError::SaveFailed {
            path: path.to_path_buf(),
            message,
        };
        let content = toml::to_string_pretty(self).map_err(|e| save_failed(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| save_failed(e.to_string()))
    }

    /// Check cross-field constraints serde defaults cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = |key: &str, ok: bool| {
            if ok {
                Ok(())
            } else {
                Err(ConfigError::InvalidValue {
                    key: key.to_string(),
                    message: "must be greater than zero".to_string(),
                })
            }
        };
        positive("suggestions.pool_cap", self.suggestions.pool_cap > 0)?;
        positive(
            "suggestions.default_increment_minutes",
            self.suggestions.default_increment_minutes > 0,
        )?;
        positive(
            "suggestions.default_max_suggestions",
            self.suggestions.default_max_suggestions > 0,
        )?;
        positive(
            "suggestions.max_concurrent_fetches",
            self.suggestions.max_concurrent_fetches > 0,
        )?;
        positive("polls.sweep_interval_secs", self.polls.sweep_interval_secs > 0)?;
        positive("polls.token_ttl_hours", self.polls.token_ttl_hours > 0)?;
        if self.polls.token_ttl_hours > MAX_TOKEN_TTL_HOURS {
            return Err(ConfigError::InvalidValue {
                key: "polls.token_ttl_hours".to_string(),
                message: format!("must be at most {MAX_TOKEN_TTL_HOURS} (ten years)"),
            });
        }
        self.suggestions.prioritizer().map(|_| ())
    }

    /// Get a config value as string by dot-separated key.
    pub fn get(&self, key: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        let val = Self::get_json_value_by_path(&json, key)?;
        match val {
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Set a config value by key without saving.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is unknown, the value cannot be parsed,
    /// or the resulting config is invalid.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };
        let mut json = serde_json::to_value(&*self).map_err(|e| invalid(e.to_string()))?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        let updated: Config = serde_json::from_value(json).map_err(|e| invalid(e.to_string()))?;
        updated.validate()?;
        *self = updated;
        Ok(())
    }

    /// Load from disk, returning default on error.
    /// This is a convenience method that never fails.
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_default()
    }
}
