use anyhow::Error;
use thiserror::Error;

/// Application-level error types for cloudrm-rs.
///
/// Configuration problems are detected while the filter file is loaded,
/// before any provider API is called. Enumeration failures abort the run.
/// Destroy failures are recovered per resource and only surface as
/// `PartialFailure` when warnings are promoted to errors.
///
/// ## Exit Codes
///
/// Each variant maps to an exit code (via `exit_code()`):
/// - 0: Non-error conditions (Cancelled)
/// - 1: General errors (Enumeration, Destroy, Io, Pipeline)
/// - 2: Configuration errors (InvalidConfig, InvalidRegex, InvalidCreatedTime,
///   UnsupportedResourceType)
/// - 3: Partial failure (some resources deleted, some failed)
#[derive(Error, Debug, PartialEq)]
pub enum CloudrmError {
    /// Configuration error (unreadable or malformed filter file, bad flag values).
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A pattern in the filter file is not a valid regular expression.
    #[error("Invalid regex pattern: {0}")]
    InvalidRegex(String),

    /// A `created.before` / `created.after` value could not be parsed.
    #[error("Invalid created time: {0}")]
    InvalidCreatedTime(String),

    /// The filter file names a resource type the tool cannot handle.
    #[error("Unsupported resource type: {0}")]
    UnsupportedResourceType(String),

    /// Listing the resources of a type failed.
    #[error("Failed to enumerate {resource_type}: {message}")]
    Enumeration {
        resource_type: String,
        message: String,
    },

    /// Destroying a single resource failed.
    #[error("Failed to destroy {resource_type} {id}: {message}")]
    Destroy {
        resource_type: String,
        id: String,
        message: String,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(String),

    /// Operation cancelled by user.
    #[error("Operation cancelled by user")]
    Cancelled,

    /// Partial failure during deletion.
    #[error("Partial failure: {deleted} deleted, {failed} failed")]
    PartialFailure { deleted: u64, failed: u64 },

    /// General pipeline error.
    #[error("Pipeline error: {0}")]
    Pipeline(String),
}

impl CloudrmError {
    /// Get the appropriate process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            CloudrmError::Cancelled => 0,
            CloudrmError::InvalidConfig(_)
            | CloudrmError::InvalidRegex(_)
            | CloudrmError::InvalidCreatedTime(_)
            | CloudrmError::UnsupportedResourceType(_) => 2,
            CloudrmError::PartialFailure { .. } => 3,
            _ => 1,
        }
    }

    /// Check if this error was detected while loading configuration.
    pub fn is_config_error(&self) -> bool {
        self.exit_code() == 2
    }
}

/// Check if an anyhow::Error wraps a cancellation error.
pub fn is_cancelled_error(e: &Error) -> bool {
    if let Some(err) = e.downcast_ref::<CloudrmError>() {
        return *err == CloudrmError::Cancelled;
    }
    false
}

/// Extract the exit code from an anyhow::Error, defaulting to 1.
pub fn exit_code_from_error(e: &Error) -> i32 {
    if let Some(err) = e.downcast_ref::<CloudrmError>() {
        return err.exit_code();
    }
    1
}
