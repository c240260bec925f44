//! Monitor settings and how they are loaded.
//!
//! Settings are static for the lifetime of the process. They are assembled
//! from built-in defaults, an optional settings file and environment
//! overrides, in that order of precedence.

mod builder;
mod validation;

pub use builder::SettingsBuilder;
pub use validation::Validate;

use crate::error::ValidationError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Namespace holding packaged applications' camera consent records.
pub const DEFAULT_WEBCAM_ROOT: &str =
    r"SOFTWARE\Microsoft\Windows\CurrentVersion\CapabilityAccessManager\ConsentStore\webcam";

/// Longest settling delay accepted by validation.
const MAX_SETTLE_DELAY: Duration = Duration::from_secs(60);

/// Everything the monitoring core needs to run.
///
/// # Examples
///
/// ```rust
/// use camhook::settings::MonitorSettings;
/// use std::time::Duration;
///
/// let settings = MonitorSettings::default();
/// assert_eq!(settings.settle_delay(), Duration::from_millis(1500));
/// assert_eq!(settings.value_name, "LastUsedTimeStop");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorSettings {
    /// Store paths whose direct children are watched.
    #[serde(default = "default_namespace_roots")]
    pub namespace_roots: Vec<String>,

    /// Name of the "time since stop" value read from each entry.
    #[serde(default = "default_value_name")]
    pub value_name: String,

    /// Delay between a change notification and the state read (unit: milliseconds).
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,

    /// Longest single OS wait before a watcher checks for shutdown (unit: milliseconds).
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Outbound notification endpoints.
    #[serde(default)]
    pub webhook: WebhookSettings,

    /// Backoff for registration and transient read failures.
    #[serde(default)]
    pub retry: BackoffPolicy,

    /// Default log filter when `RUST_LOG` is not set.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl MonitorSettings {
    /// Create a new builder for loading settings.
    pub fn builder() -> SettingsBuilder {
        SettingsBuilder::new()
    }

    /// Settling delay as a [`Duration`].
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    /// Poll interval as a [`Duration`].
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            namespace_roots: default_namespace_roots(),
            value_name: default_value_name(),
            settle_delay_ms: default_settle_delay_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            webhook: WebhookSettings::default(),
            retry: BackoffPolicy::default(),
            log_level: default_log_level(),
        }
    }
}

impl Validate for MonitorSettings {
    fn validate(&self) -> Result<(), ValidationError> {
        let mut errors = Vec::new();

        if self.namespace_roots.is_empty() {
            errors.push(ValidationError::invalid_field(
                "namespace_roots",
                "at least one root is required",
            ));
        }
        if self.namespace_roots.iter().any(|r| r.trim().is_empty()) {
            errors.push(ValidationError::invalid_field(
                "namespace_roots",
                "roots must not be blank",
            ));
        }
        if self.value_name.is_empty() {
            errors.push(ValidationError::invalid_field(
                "value_name",
                "must not be empty",
            ));
        }
        if self.settle_delay() > MAX_SETTLE_DELAY {
            errors.push(ValidationError::invalid_field(
                "settle_delay_ms",
                format!("must be at most {}", MAX_SETTLE_DELAY.as_millis()),
            ));
        }
        if self.poll_interval_ms == 0 {
            errors.push(ValidationError::invalid_field(
                "poll_interval_ms",
                "must be greater than 0",
            ));
        }
        if let Err(e) = self.webhook.validate() {
            errors.push(e);
        }
        if let Err(e) = self.retry.validate() {
            errors.push(e);
        }

        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(ValidationError::Multiple(errors)),
        }
    }
}

/// Outbound notification endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookSettings {
    /// URL posted to when an entry becomes active.
    #[serde(default)]
    pub on_url: Option<String>,

    /// URL posted to when an entry becomes inactive.
    #[serde(default)]
    pub off_url: Option<String>,

    /// Timeout for one outbound call (unit: milliseconds).
    #[serde(default = "default_webhook_timeout_ms")]
    pub timeout_ms: u64,
}

impl WebhookSettings {
    /// Request timeout as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for WebhookSettings {
    fn default() -> Self {
        Self {
            on_url: None,
            off_url: None,
            timeout_ms: default_webhook_timeout_ms(),
        }
    }
}

impl Validate for WebhookSettings {
    fn validate(&self) -> Result<(), ValidationError> {
        for (field, url) in [("webhook.on_url", &self.on_url), ("webhook.off_url", &self.off_url)] {
            if let Some(url) = url {
                if !(url.starts_with("http://") || url.starts_with("https://")) {
                    return Err(ValidationError::invalid_field(
                        field,
                        "must be an http:// or https:// URL",
                    ));
                }
            }
        }
        if self.timeout_ms == 0 {
            return Err(ValidationError::invalid_field(
                "webhook.timeout_ms",
                "must be greater than 0",
            ));
        }
        Ok(())
    }
}

/// Exponential backoff used when a watcher has to retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackoffPolicy {
    /// Backoff base (unit: milliseconds)
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Maximum backoff time (unit: milliseconds)
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl BackoffPolicy {
    /// Delay before retry number `attempt` (0-based), doubling up to the cap.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt.min(32)).unwrap_or(u64::MAX);
        let millis = self
            .base_delay_ms
            .saturating_mul(factor)
            .min(self.max_delay_ms);
        Duration::from_millis(millis)
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl Validate for BackoffPolicy {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.base_delay_ms == 0 {
            return Err(ValidationError::invalid_field(
                "retry.base_delay_ms",
                "must be greater than 0",
            ));
        }
        if self.base_delay_ms > self.max_delay_ms {
            return Err(ValidationError::invalid_field(
                "retry.base_delay_ms",
                "must not exceed retry.max_delay_ms",
            ));
        }
        Ok(())
    }
}

fn default_namespace_roots() -> Vec<String> {
    vec![
        DEFAULT_WEBCAM_ROOT.to_string(),
        format!(r"{DEFAULT_WEBCAM_ROOT}\NonPackaged"),
    ]
}
fn default_value_name() -> String {
    "LastUsedTimeStop".to_string()
}
fn default_settle_delay_ms() -> u64 {
    1500
}
fn default_poll_interval_ms() -> u64 {
    500
}
fn default_webhook_timeout_ms() -> u64 {
    10_000
}
fn default_base_delay_ms() -> u64 {
    500
}
fn default_max_delay_ms() -> u64 {
    30_000
}
fn default_log_level() -> String {
    "info".to_string()
}
