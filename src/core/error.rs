//! Error types for the parameter store.

use thiserror::Error;

/// Result type alias for store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in store operations.
///
/// Every variant carries owned data so a failure observed by the background
/// fetch worker can be handed to whichever caller is waiting on it.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    // Mode errors
    #[error("Illegal operation: {0}")]
    IllegalOperation(String),

    #[error("No remote client available in {0} mode")]
    NoRemoteClient(String),

    // Initialization errors
    #[error("Initializer for {key} failed: {reason}")]
    InitializerFailed { key: String, reason: String },

    // Remote service errors
    #[error("Remote service unavailable: {0}")]
    RemoteUnavailable(String),

    #[error("Remote service rejected request: {0}")]
    RemoteRejected(String),

    #[error("Unknown update rule: {0}")]
    UnknownUpdateRule(String),

    // Value errors
    #[error("Shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        expected: (usize, usize),
        got: (usize, usize),
    },

    #[error("Parameter not found: {0}")]
    ParameterNotFound(String),

    // Gradient errors
    #[error("No gradient accumulated for {0}")]
    GradientNotFound(String),

    #[error("Gradient entry for {0} has zero contributions")]
    EmptyGradient(String),

    // Lifecycle errors
    #[error("Fetch worker stopped")]
    WorkerStopped,

    #[error("Runtime error: {0}")]
    Runtime(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    // Serialization errors
    #[error("Serialization error: {0}")]
    SerializationError(String),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Wrap a failed initializer for `key`.
    ///
    /// An error that already names an initializer failure is kept as-is.
    pub fn initializer(key: &str, err: Error) -> Self {
        match err {
            Error::InitializerFailed { .. } => err,
            other => Error::InitializerFailed {
                key: key.to_string(),
                reason: other.to_string(),
            },
        }
    }

    /// Whether the error came from the remote parameter service.
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            Error::RemoteUnavailable(_) | Error::RemoteRejected(_) | Error::UnknownUpdateRule(_)
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::SerializationError(err.to_string())
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        Error::Runtime(err.to_string())
    }
}
