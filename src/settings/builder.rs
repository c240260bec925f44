//! Builder for loading [`MonitorSettings`].

use super::{MonitorSettings, Validate};
use crate::error::{MonitorError, Result, ValidationError};
use config::{Environment, File};
use std::path::PathBuf;
use std::sync::Arc;

/// Type alias for extra validator functions.
type Validator = Arc<dyn Fn(&MonitorSettings) -> std::result::Result<(), ValidationError> + Send + Sync>;

/// Builder for loading [`MonitorSettings`].
///
/// Sources are layered: built-in defaults, then files in the order given,
/// then environment overrides.
///
/// # Examples
///
/// ```rust,no_run
/// use camhook::settings::MonitorSettings;
///
/// # fn example() -> camhook::error::Result<()> {
/// // CAMHOOK_SETTLE_DELAY_MS=2000 -> settle_delay_ms = 2000
/// // CAMHOOK_WEBHOOK__ON_URL=... -> webhook.on_url = ...
/// let settings = MonitorSettings::builder()
///     .with_file("camhook.yaml")
///     .with_env_overrides("CAMHOOK", "__")
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct SettingsBuilder {
    file_paths: Vec<PathBuf>,
    optional_files: bool,
    env_prefix: Option<String>,
    env_separator: Option<String>,
    validator: Option<Validator>,
}

impl SettingsBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self {
            file_paths: Vec::new(),
            optional_files: false,
            env_prefix: None,
            env_separator: None,
            validator: None,
        }
    }

    /// Add a settings file with automatic format detection.
    ///
    /// Supported formats: YAML (.yaml, .yml), TOML (.toml), JSON (.json).
    /// Later files override earlier ones.
    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.file_paths.push(path.into());
        self
    }

    /// Tolerate missing settings files instead of failing the build.
    pub fn files_optional(mut self, optional: bool) -> Self {
        self.optional_files = optional;
        self
    }

    /// Add environment variable overrides.
    ///
    /// # Arguments
    ///
    /// * `prefix` - Prefix for environment variables (e.g., "CAMHOOK")
    /// * `separator` - Separator for nested keys (e.g., "__" for CAMHOOK_WEBHOOK__ON_URL)
    pub fn with_env_overrides(mut self, prefix: &str, separator: &str) -> Self {
        self.env_prefix = Some(prefix.to_string());
        self.env_separator = Some(separator.to_string());
        self
    }

    /// Add a validation function that must pass in addition to the built-in checks.
    pub fn with_validation<F>(mut self, validator: F) -> Self
    where
        F: Fn(&MonitorSettings) -> std::result::Result<(), ValidationError> + Send + Sync + 'static,
    {
        self.validator = Some(Arc::new(validator));
        self
    }

    /// Load, merge and validate the settings.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - A required settings file is missing or unreadable
    /// - Deserialization fails
    /// - Validation fails
    pub fn build(self) -> Result<MonitorSettings> {
        let mut builder = config::Config::builder();

        for path in &self.file_paths {
            if !self.optional_files && !path.exists() {
                return Err(MonitorError::LoadError(format!(
                    "Settings file not found: {}",
                    path.display()
                )));
            }
            builder = builder.add_source(File::from(path.clone()).required(!self.optional_files));
        }

        if let (Some(prefix), Some(separator)) = (&self.env_prefix, &self.env_separator) {
            builder = builder.add_source(
                Environment::with_prefix(prefix)
                    .prefix_separator("_")
                    .separator(separator)
                    .try_parsing(true),
            );
        }

        let merged = builder
            .build()
            .map_err(|e| MonitorError::LoadError(format!("Failed to build settings: {}", e)))?;

        let settings: MonitorSettings = merged.try_deserialize().map_err(|e| {
            MonitorError::DeserializationError(format!("Failed to deserialize settings: {}", e))
        })?;

        settings.validate()?;
        if let Some(validator) = &self.validator {
            validator(&settings)?;
        }

        tracing::debug!(?settings, "Settings loaded");
        Ok(settings)
    }
}

impl Default for SettingsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_build_without_sources_uses_defaults() {
        let settings = SettingsBuilder::new().build().unwrap();
        assert_eq!(settings, MonitorSettings::default());
    }

    #[test]
    fn test_yaml_file_overrides_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("camhook.yaml");
        fs::write(
            &path,
            r#"
namespace_roots:
  - 'Software\Test\Cam'
settle_delay_ms: 250
webhook:
  on_url: "http://localhost:8123/api/webhook/cam_on"
  off_url: "http://localhost:8123/api/webhook/cam_off"
retry:
  base_delay_ms: 10
  max_delay_ms: 100
"#,
        )
        .unwrap();

        let settings = SettingsBuilder::new().with_file(&path).build().unwrap();
        assert_eq!(settings.namespace_roots, vec![r"Software\Test\Cam".to_string()]);
        assert_eq!(settings.settle_delay_ms, 250);
        assert_eq!(settings.value_name, "LastUsedTimeStop");
        assert_eq!(
            settings.webhook.on_url.as_deref(),
            Some("http://localhost:8123/api/webhook/cam_on")
        );
        assert_eq!(settings.retry.max_delay_ms, 100);
    }

    #[test]
    fn test_toml_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("camhook.toml");
        fs::write(&path, "poll_interval_ms = 50\nlog_level = \"debug\"\n").unwrap();

        let settings = SettingsBuilder::new().with_file(&path).build().unwrap();
        assert_eq!(settings.poll_interval_ms, 50);
        assert_eq!(settings.log_level, "debug");
    }

    #[test]
    fn test_missing_file() {
        let result = SettingsBuilder::new()
            .with_file("/nonexistent/camhook.yaml")
            .build();
        assert!(matches!(result, Err(MonitorError::LoadError(_))));

        let result = SettingsBuilder::new()
            .with_file("/nonexistent/camhook.yaml")
            .files_optional(true)
            .build();
        assert!(result.is_ok());
    }

    #[test]
    fn test_invalid_values_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("camhook.json");
        fs::write(&path, r#"{"webhook": {"on_url": "not-a-url"}}"#).unwrap();

        let result = SettingsBuilder::new().with_file(&path).build();
        assert!(matches!(result, Err(MonitorError::ValidationError(_))));
    }

    #[test]
    fn test_custom_validator() {
        let result = SettingsBuilder::new()
            .with_validation(|settings| {
                if settings.webhook.on_url.is_none() {
                    return Err(ValidationError::invalid_field(
                        "webhook.on_url",
                        "required",
                    ));
                }
                Ok(())
            })
            .build();
        assert!(matches!(result, Err(MonitorError::ValidationError(_))));
    }

    #[test]
    fn test_builder_env_overrides() {
        let builder = SettingsBuilder::new().with_env_overrides("CAMHOOK", "__");
        assert_eq!(builder.env_prefix, Some("CAMHOOK".to_string()));
        assert_eq!(builder.env_separator, Some("__".to_string()));
    }
}
