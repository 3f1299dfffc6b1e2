use crate::core::domain::model::power_state::{DesiredState, PowerState};
use std::time::Duration;
use thiserror::Error;

/// The main error type for instance convergence.
///
/// Every variant is fatal to the current apply cycle. Nothing is retried and
/// nothing already applied is rolled back; partial convergence is corrected on
/// the next apply.
#[derive(Error, Debug)]
pub enum ConvergeError {
    /// The transport could not reach the remote API
    ///
    /// # Fields
    /// * `0` - A description of what went wrong while connecting
    #[error("Connection error: {0}")]
    Connection(String),

    /// The remote API rejected the supplied credentials
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// The remote API answered a call with an error
    ///
    /// # Fields
    /// * `method` - The remote method that failed
    /// * `message` - The error reported by the remote side
    #[error("RPC call '{method}' failed: {message}")]
    Rpc { method: String, message: String },

    /// An asynchronous job finished in a failed state
    #[error("Job {id} ended in state {state}: {message}")]
    Job {
        id: u64,
        state: String,
        message: String,
    },

    /// A device create/update/delete failed
    ///
    /// # Fields
    /// * `operation` - Which device operation was issued
    /// * `identity` - The device identity, or `<unnamed>` for a fresh device
    /// * `source` - The underlying failure
    #[error("Device {operation} for '{identity}' failed: {source}")]
    Device {
        operation: DeviceOperation,
        identity: String,
        source: Box<ConvergeError>,
    },

    /// A query returned no record where one was expected
    #[error("Not found: {0}")]
    NotFound(String),

    /// A response could not be decoded into the expected shape
    #[error("Malformed response: {0}")]
    Parse(String),

    /// Power-state convergence did not settle before the deadline
    #[error("Timed out after {elapsed:?} waiting for a stable state, still {state}")]
    Timeout { state: PowerState, elapsed: Duration },

    /// A stable state was reached but it is not the requested one
    #[error("Instance reached state {reached} but {desired} was desired")]
    WrongTerminalState {
        reached: PowerState,
        desired: DesiredState,
    },

    /// The caller cancelled the operation while it was waiting
    #[error("Operation cancelled")]
    Cancelled,

    /// Represents validation failures with detailed context
    #[error("Validation error: {source}")]
    Validation { source: ValidationError },
}

impl From<ValidationError> for ConvergeError {
    fn from(error: ValidationError) -> Self {
        ConvergeError::Validation { source: error }
    }
}

impl From<serde_json::Error> for ConvergeError {
    fn from(error: serde_json::Error) -> Self {
        ConvergeError::Parse(error.to_string())
    }
}

impl ConvergeError {
    /// Wraps an error with the device operation and identity that caused it.
    pub(crate) fn for_device(
        self,
        operation: DeviceOperation,
        identity: impl Into<String>,
    ) -> Self {
        ConvergeError::Device {
            operation,
            identity: identity.into(),
            source: Box::new(self),
        }
    }
}

/// The kind of remote device operation that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceOperation {
    Create,
    Update,
    Delete,
}

impl std::fmt::Display for DeviceOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceOperation::Create => write!(f, "create"),
            DeviceOperation::Update => write!(f, "update"),
            DeviceOperation::Delete => write!(f, "delete"),
        }
    }
}

/// Specialized error type for validation failures.
///
/// This enum provides detailed context about why a validation
/// failed, including field-specific errors and format violations.
#[derive(Error, Debug)]
pub enum ValidationError {
    /// Represents a validation failure for a specific field
    ///
    /// # Fields
    /// * `field` - The name of the field that failed validation
    /// * `message` - A detailed message about why validation failed
    #[error("Field '{field}' validation failed: {message}")]
    Field { field: String, message: String },

    /// Represents format/syntax validation failures
    #[error("Format error: {0}")]
    Format(String),

    /// Represents violations of domain constraints
    #[error("Domain constraint violation: {0}")]
    ConstraintViolation(String),
}

/// Type alias for Results that may fail with a ConvergeError
pub type ConvergeResult<T> = Result<T, ConvergeError>;
