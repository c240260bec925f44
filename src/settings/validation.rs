//! Settings validation support.

use crate::error::ValidationError;

/// Trait for settings validation.
///
/// Implemented by every settings section; [`SettingsBuilder::build`](super::SettingsBuilder::build)
/// runs it on the assembled settings before handing them out.
///
/// # Examples
///
/// ```rust
/// use camhook::settings::{MonitorSettings, Validate};
///
/// let mut settings = MonitorSettings::default();
/// settings.poll_interval_ms = 0;
/// assert!(settings.validate().is_err());
/// ```
pub trait Validate {
    /// Validate the settings.
    ///
    /// # Errors
    ///
    /// Should return a `ValidationError` describing what validation failed.
    fn validate(&self) -> Result<(), ValidationError>;
}
