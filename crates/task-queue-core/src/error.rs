use crate::CorrelationId;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TaskError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Broker error: {0}")]
    Broker(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Unknown operation: {0}")]
    UnknownOperation(String),

    #[error("Operation already registered: {0}")]
    DuplicateOperation(String),

    #[error("Invalid operation name: {0:?}")]
    InvalidOperationName(String),

    #[error("Operation {operation} failed: {message}")]
    OperationFailed { operation: String, message: String },

    #[error("Correlation id collision: {0}")]
    CorrelationCollision(CorrelationId),

    #[error("No result entry for correlation id {0}")]
    NotFound(CorrelationId),

    #[error("Timeout exceeded")]
    Timeout,

    #[error("Other error: {0}")]
    Other(String),
}

impl TaskError {
    /// Connection-level failures pause a loop; everything else is per task.
    pub fn is_connection(&self) -> bool {
        matches!(self, TaskError::Connection(_))
    }
}

impl From<serde_json::Error> for TaskError {
    fn from(err: serde_json::Error) -> Self {
        TaskError::Serialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, TaskError>;
