//! Error types for camhook.

use std::fmt;

/// Result type alias for camhook operations.
pub type Result<T> = std::result::Result<T, MonitorError>;

/// Errors that can occur while watching the store or dispatching events.
#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    /// A namespace root could not be enumerated.
    #[error("Failed to enumerate '{root}': {reason}")]
    Enumeration {
        /// The namespace root being enumerated
        root: String,
        /// Why it failed
        reason: String,
    },

    /// A change notification could not be registered for an entry.
    #[error("Failed to register change notification for '{entry}': {reason}")]
    Registration {
        /// The entry path
        entry: String,
        /// Why it failed
        reason: String,
    },

    /// Waiting on a registered notification failed.
    #[error("Change notification wait failed for '{entry}': {reason}")]
    Wait {
        /// The entry path
        entry: String,
        /// Why it failed
        reason: String,
    },

    /// Reading an entry's state value failed for a transient reason.
    #[error("Failed to read '{entry}': {reason}")]
    Read {
        /// The entry path
        entry: String,
        /// Why it failed
        reason: String,
    },

    /// The entry no longer exists in the store.
    #[error("Entry not found: {0}")]
    EntryNotFound(String),

    /// The entry exists but does not hold the requested value.
    #[error("Value '{value}' not set on '{entry}'")]
    ValueMissing {
        /// The entry path
        entry: String,
        /// The value name
        value: String,
    },

    /// The store refused access to an entry.
    #[error("Access denied: {0}")]
    AccessDenied(String),

    /// The outbound notification call could not be completed.
    #[error("Dispatch failed: {0}")]
    Dispatch(String),

    /// The outbound notification endpoint answered with a non-success status.
    #[error("Webhook returned HTTP {status}")]
    HttpStatus {
        /// The HTTP status code received
        status: u16,
    },

    /// The event bus consumer has gone away.
    #[error("Event bus closed")]
    BusClosed,

    /// Failed to load settings from a source.
    #[error("Failed to load settings: {0}")]
    LoadError(String),

    /// Failed to deserialize settings.
    #[error("Failed to deserialize settings: {0}")]
    DeserializationError(String),

    /// Settings validation failed.
    #[error("Settings validation failed: {0}")]
    ValidationError(String),

    /// IO error occurred.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Generic error for other cases.
    #[error("Monitor error: {0}")]
    Other(String),
}

impl MonitorError {
    /// Whether this error means the watched entry is gone for good.
    ///
    /// Watchers stop on these and retry on everything else.
    pub fn is_entry_missing(&self) -> bool {
        matches!(self, Self::EntryNotFound(_))
    }

    /// Whether the entry exists but has no state value yet.
    pub fn is_value_missing(&self) -> bool {
        matches!(self, Self::ValueMissing { .. })
    }
}

/// Validation error for settings validation.
#[derive(Debug)]
pub enum ValidationError {
    /// Custom validation error with a message.
    Custom(String),

    /// A specific field has an invalid value.
    InvalidField {
        /// The field name/path
        field: String,
        /// The reason why it's invalid
        reason: String,
    },

    /// Multiple validation errors occurred.
    Multiple(Vec<ValidationError>),
}

impl ValidationError {
    /// Create a custom validation error.
    pub fn custom(msg: impl Into<String>) -> Self {
        Self::Custom(msg.into())
    }

    /// Create an invalid field error.
    pub fn invalid_field(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Custom(msg) => write!(f, "{}", msg),
            Self::InvalidField { field, reason } => {
                write!(f, "Field '{}' is invalid: {}", field, reason)
            }
            Self::Multiple(errors) => {
                writeln!(f, "Multiple validation errors:")?;
                for (i, err) in errors.iter().enumerate() {
                    writeln!(f, "  {}. {}", i + 1, err)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ValidationError {}

impl From<ValidationError> for MonitorError {
    fn from(err: ValidationError) -> Self {
        MonitorError::ValidationError(err.to_string())
    }
}
