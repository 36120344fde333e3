//! Error types and result handling for the correlation engine.

use thiserror::Error;

/// Result type alias using our custom Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for engine operations.
///
/// Only [`Error::ConfigurationInvalid`] aborts a pipeline run. Everything else
/// is either handled inside the stage that produced it (and reflected in the
/// case summary) or comes from the outer surfaces (config files, the CLI).
#[derive(Error, Debug)]
pub enum Error {
    // ===== Evidence Errors =====
    #[error("Evidence for source '{source_id}' was never supplied")]
    InputUnavailable { source_id: String },

    #[error("Evidence source already registered: {0}")]
    DuplicateSource(String),

    #[error("Unknown evidence source: {0}")]
    UnknownSource(String),

    // ===== Reputation Errors =====
    #[error("Reputation provider '{provider}' unavailable: {reason}")]
    ProviderUnavailable { provider: String, reason: String },

    #[error("{operation} failed: {reason}")]
    LookupFailed { operation: String, reason: String },

    #[error("Lookup failed after {attempts} attempts: {operation}")]
    RetryExhausted {
        operation: String,
        attempts: u32,
        last_error: String,
    },

    #[error("Reputation store error: {0}")]
    Store(String),

    #[error("Reputation store query failed")]
    StoreSql(#[from] rusqlite::Error),

    // ===== Configuration Errors =====
    #[error("Invalid configuration value: {field} - {message}")]
    ConfigurationInvalid { field: String, message: String },

    #[error("Failed to load configuration: {0}")]
    ConfigLoad(String),

    #[error("Failed to save configuration: {0}")]
    ConfigSave(String),

    // ===== Concurrency Errors =====
    #[error("Background task failed: {context}")]
    TaskJoin { context: String },

    #[error("Lock poisoned: {context}")]
    LockPoisoned { context: String },

    // ===== Serialization Errors =====
    #[error("JSON serialization error")]
    JsonSerialize(#[from] serde_json::Error),

    // ===== Generic Errors =====
    #[error("I/O error: {0}")]
    Io(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

impl Error {
    /// Create a configuration error for a named field.
    pub fn config_invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigurationInvalid {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create an input unavailable error.
    pub fn input_unavailable(source_id: impl Into<String>) -> Self {
        Self::InputUnavailable {
            source_id: source_id.into(),
        }
    }

    /// Create a provider unavailable error.
    pub fn provider_unavailable(provider: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ProviderUnavailable {
            provider: provider.into(),
            reason: reason.into(),
        }
    }

    /// Create a lookup failed error for a non-retryable failure.
    pub fn lookup_failed(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::LookupFailed {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Create a retry exhausted error.
    pub fn retry_exhausted(
        operation: impl Into<String>,
        attempts: u32,
        last_error: impl Into<String>,
    ) -> Self {
        Self::RetryExhausted {
            operation: operation.into(),
            attempts,
            last_error: last_error.into(),
        }
    }

    /// Create a lock poisoned error.
    pub fn lock_poisoned(context: impl Into<String>) -> Self {
        Self::LockPoisoned {
            context: context.into(),
        }
    }

    /// Whether this error must stop the pipeline.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::ConfigurationInvalid { .. })
    }

    /// Whether the pipeline degrades gracefully around this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::InputUnavailable { .. }
                | Error::ProviderUnavailable { .. }
                | Error::LookupFailed { .. }
                | Error::RetryExhausted { .. }
        )
    }

    /// Get a user-friendly suggestion for how to resolve this error.
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            Error::InputUnavailable { .. } => {
                Some("Supply extracted bytes or text for the source, or unregister it")
            }
            Error::DuplicateSource(_) => Some("Each evidence source needs a unique identifier"),
            Error::UnknownSource(_) => Some("Register the evidence source before supplying data"),
            Error::ProviderUnavailable { .. }
            | Error::LookupFailed { .. }
            | Error::RetryExhausted { .. } => {
                Some("Check the reputation provider, or raise its timeout and retry limits")
            }
            Error::ConfigurationInvalid { .. } | Error::ConfigLoad(_) => {
                Some("Check your configuration file for invalid thresholds or patterns")
            }
            Error::Store(_) | Error::StoreSql(_) => {
                Some("Try deleting the reputation store file and letting it be recreated")
            }
            Error::LockPoisoned { .. } => Some("Internal error: restart the application"),
            _ => None,
        }
    }

    /// Get the error category for logging.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::InputUnavailable { .. }
            | Error::DuplicateSource(_)
            | Error::UnknownSource(_) => ErrorCategory::Evidence,

            Error::ProviderUnavailable { .. }
            | Error::LookupFailed { .. }
            | Error::RetryExhausted { .. }
            | Error::Store(_)
            | Error::StoreSql(_) => ErrorCategory::Reputation,

            Error::ConfigurationInvalid { .. } | Error::ConfigLoad(_) | Error::ConfigSave(_) => {
                ErrorCategory::Configuration
            }

            Error::TaskJoin { .. } | Error::LockPoisoned { .. } => ErrorCategory::Concurrency,

            Error::JsonSerialize(_) => ErrorCategory::Serialization,

            Error::Io(_) => ErrorCategory::Io,

            Error::Internal(_) => ErrorCategory::Other,
        }
    }
}

/// Error category for classification and exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    Evidence,
    Reputation,
    Configuration,
    Concurrency,
    Serialization,
    Io,
    Other,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Evidence => write!(f, "Evidence"),
            Self::Reputation => write!(f, "Reputation"),
            Self::Configuration => write!(f, "Configuration"),
            Self::Concurrency => write!(f, "Concurrency"),
            Self::Serialization => write!(f, "Serialization"),
            Self::Io => write!(f, "I/O"),
            Self::Other => write!(f, "Other"),
        }
    }
}
