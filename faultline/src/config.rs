//! Configuration for breakers, retries, the state store and alerting.
//!
//! Loaded from JSON (string or file), then overlaid with `FAULTLINE_*`
//! environment variables, then validated.

use crate::errors::ConfigError;
use crate::resilience::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Prefix of environment overrides.
pub const ENV_PREFIX: &str = "FAULTLINE_";

/// Circuit breaker settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakerConfig {
    /// Consecutive failures before opening.
    #[serde(default = "default_threshold")]
    pub threshold: u32,
    /// Time the breaker stays open before a trial call, in milliseconds.
    #[serde(default = "default_recovery_timeout_ms")]
    pub recovery_timeout_ms: u64,
}

fn default_threshold() -> u32 {
    5
}

fn default_recovery_timeout_ms() -> u64 {
    60_000
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            recovery_timeout_ms: default_recovery_timeout_ms(),
        }
    }
}

impl BreakerConfig {
    /// Creates a breaker config.
    #[must_use]
    pub fn new(threshold: u32, recovery_timeout: Duration) -> Self {
        Self {
            threshold,
            recovery_timeout_ms: u64::try_from(recovery_timeout.as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// Returns the recovery timeout.
    #[must_use]
    pub fn recovery_timeout(&self) -> Duration {
        Duration::from_millis(self.recovery_timeout_ms)
    }

    fn validate(&self, field: &str) -> Result<(), ConfigError> {
        if self.threshold == 0 {
            return Err(ConfigError::invalid(
                format!("{field}.threshold"),
                "must be > 0",
            ));
        }
        Ok(())
    }
}

/// Overrides for one named dependency.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DependencyConfig {
    /// Breaker override.
    #[serde(default)]
    pub breaker: Option<BreakerConfig>,
    /// Retry override.
    #[serde(default)]
    pub retry: Option<RetryPolicy>,
}

/// State store settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Lifetime of pending entries in seconds.
    #[serde(default = "default_ttl_seconds")]
    pub ttl_seconds: u64,
    /// JSON file backing the store; in memory when absent.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

fn default_ttl_seconds() -> u64 {
    24 * 60 * 60
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: default_ttl_seconds(),
            path: None,
        }
    }
}

impl StoreConfig {
    /// Returns the entry TTL.
    #[must_use]
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }
}

/// Where human alerts go.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertConfig {
    /// Destination for operator alerts (e.g. an admin chat id).
    #[serde(default = "default_admin_destination")]
    pub admin_destination: String,
    /// Destination for user-facing messages such as expiry notices.
    #[serde(default)]
    pub user_destination: Option<String>,
    /// Workflow name shown in alerts.
    #[serde(default = "default_workflow")]
    pub workflow: String,
}

fn default_admin_destination() -> String {
    "admin".to_string()
}

fn default_workflow() -> String {
    "faultline".to_string()
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            admin_destination: default_admin_destination(),
            user_destination: None,
            workflow: default_workflow(),
        }
    }
}

impl AlertConfig {
    /// Creates an alert config for a workflow.
    #[must_use]
    pub fn new(workflow: impl Into<String>, admin_destination: impl Into<String>) -> Self {
        Self {
            admin_destination: admin_destination.into(),
            user_destination: None,
            workflow: workflow.into(),
        }
    }

    /// Sets the user destination.
    #[must_use]
    pub fn with_user_destination(mut self, destination: impl Into<String>) -> Self {
        self.user_destination = Some(destination.into());
        self
    }

    /// Returns the user destination, falling back to the admin one.
    #[must_use]
    pub fn user_destination(&self) -> &str {
        self.user_destination
            .as_deref()
            .unwrap_or(&self.admin_destination)
    }
}

/// Notification delivery settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationConfig {
    /// Extra delivery attempts after the first; at most 1.
    #[serde(default = "default_notification_retries")]
    pub max_retries: u32,
    /// Delay before the retry in milliseconds.
    #[serde(default = "default_notification_delay_ms")]
    pub retry_delay_ms: u64,
}

fn default_notification_retries() -> u32 {
    1
}

fn default_notification_delay_ms() -> u64 {
    1000
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            max_retries: default_notification_retries(),
            retry_delay_ms: default_notification_delay_ms(),
        }
    }
}

/// Failure digest settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DigestConfig {
    /// Look-back window in hours.
    #[serde(default = "default_window_hours")]
    pub window_hours: u64,
    /// Number of signatures reported.
    #[serde(default = "default_top_n")]
    pub top_n: usize,
}

fn default_window_hours() -> u64 {
    168
}

fn default_top_n() -> usize {
    10
}

impl Default for DigestConfig {
    fn default() -> Self {
        Self {
            window_hours: default_window_hours(),
            top_n: default_top_n(),
        }
    }
}

impl DigestConfig {
    /// Returns the look-back window.
    #[must_use]
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_hours.saturating_mul(3600))
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FaultlineConfig {
    /// Default retry policy.
    #[serde(default)]
    pub retry: RetryPolicy,
    /// Default breaker settings.
    #[serde(default)]
    pub breaker: BreakerConfig,
    /// Per-dependency overrides keyed by dependency name.
    #[serde(default)]
    pub dependencies: HashMap<String, DependencyConfig>,
    /// State store settings.
    #[serde(default)]
    pub store: StoreConfig,
    /// Alert destinations.
    #[serde(default)]
    pub alerts: AlertConfig,
    /// Notification delivery.
    #[serde(default)]
    pub notifications: NotificationConfig,
    /// Failure digest.
    #[serde(default)]
    pub digest: DigestConfig,
}

impl FaultlineConfig {
    /// Parses and validates a JSON document, without environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is malformed or invalid.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads a JSON file, applies environment overrides and validates.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or the result is invalid.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let mut config: Self = serde_json::from_str(&raw)?;
        config.apply_env(std::env::vars())?;
        config.validate()?;
        Ok(config)
    }

    /// Loads from `FAULTLINE_CONFIG` when set, otherwise defaults, then
    /// applies environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if loading or validation fails.
    pub fn from_env() -> Result<Self, ConfigError> {
        if let Ok(path) = std::env::var("FAULTLINE_CONFIG") {
            return Self::from_file(path);
        }
        let mut config = Self::default();
        config.apply_env(std::env::vars())?;
        config.validate()?;
        Ok(config)
    }

    /// Applies `FAULTLINE_*` overrides from the given variables.
    ///
    /// Unknown variables are ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if a recognised variable has an unparsable value.
    pub fn apply_env<I>(&mut self, vars: I) -> Result<(), ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (var, value) in vars {
            let Some(key) = var.strip_prefix(ENV_PREFIX) else {
                continue;
            };
            match key {
                "RETRY_MAX_ATTEMPTS" => self.retry.max_attempts = parse_env(&var, &value)?,
                "RETRY_BASE_DELAY_MS" => self.retry.base_delay_ms = parse_env(&var, &value)?,
                "RETRY_BACKOFF_MULTIPLIER" => {
                    self.retry.backoff_multiplier = parse_env(&var, &value)?;
                }
                "BREAKER_THRESHOLD" => self.breaker.threshold = parse_env(&var, &value)?,
                "BREAKER_RECOVERY_TIMEOUT_MS" => {
                    self.breaker.recovery_timeout_ms = parse_env(&var, &value)?;
                }
                "STORE_TTL_SECONDS" => self.store.ttl_seconds = parse_env(&var, &value)?,
                "STORE_PATH" => self.store.path = Some(PathBuf::from(value)),
                "ADMIN_DESTINATION" => self.alerts.admin_destination = value,
                "USER_DESTINATION" => self.alerts.user_destination = Some(value),
                "WORKFLOW" => self.alerts.workflow = value,
                "NOTIFY_MAX_RETRIES" => self.notifications.max_retries = parse_env(&var, &value)?,
                "DIGEST_WINDOW_HOURS" => self.digest.window_hours = parse_env(&var, &value)?,
                "DIGEST_TOP_N" => self.digest.top_n = parse_env(&var, &value)?,
                _ => {}
            }
        }
        Ok(())
    }

    /// Validates every section.
    ///
    /// # Errors
    ///
    /// Returns the first invalid field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.retry.validate().map_err(|e| prefix(e, "retry"))?;
        self.breaker.validate("breaker")?;
        for (name, dependency) in &self.dependencies {
            if let Some(breaker) = &dependency.breaker {
                breaker.validate(&format!("dependencies.{name}.breaker"))?;
            }
            if let Some(retry) = &dependency.retry {
                retry
                    .validate()
                    .map_err(|e| prefix(e, &format!("dependencies.{name}.retry")))?;
            }
        }
        if self.store.ttl_seconds == 0 {
            return Err(ConfigError::invalid("store.ttl_seconds", "must be > 0"));
        }
        if self.alerts.admin_destination.trim().is_empty() {
            return Err(ConfigError::invalid(
                "alerts.admin_destination",
                "must not be empty",
            ));
        }
        if self.notifications.max_retries > 1 {
            return Err(ConfigError::invalid(
                "notifications.max_retries",
                "must be 0 or 1",
            ));
        }
        if self.digest.top_n == 0 {
            return Err(ConfigError::invalid("digest.top_n", "must be > 0"));
        }
        Ok(())
    }

    /// Breaker settings for a dependency, falling back to the default.
    #[must_use]
    pub fn breaker_for(&self, dependency: &str) -> &BreakerConfig {
        self.dependencies
            .get(dependency)
            .and_then(|d| d.breaker.as_ref())
            .unwrap_or(&self.breaker)
    }

    /// Retry policy for a dependency, falling back to the default.
    #[must_use]
    pub fn retry_for(&self, dependency: &str) -> &RetryPolicy {
        self.dependencies
            .get(dependency)
            .and_then(|d| d.retry.as_ref())
            .unwrap_or(&self.retry)
    }
}

fn parse_env<T: std::str::FromStr>(var: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Env {
        var: var.to_string(),
        value: value.to_string(),
    })
}

fn prefix(error: ConfigError, section: &str) -> ConfigError {
    match error {
        ConfigError::Invalid { field, reason } => ConfigError::Invalid {
            field: format!("{section}.{field}"),
            reason,
        },
        other => other,
    }
}
