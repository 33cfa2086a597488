mod codec;

pub use codec::{EnvelopeCodec, WireFormat};

use task_queue_core::TaskError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Envelope too large: {0} bytes")]
    MessageTooLarge(usize),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Bincode error: {0}")]
    Bincode(#[from] bincode::Error),

    #[error("Unknown wire format: {0}")]
    UnknownFormat(String),
}

impl From<ProtocolError> for TaskError {
    fn from(err: ProtocolError) -> Self {
        TaskError::Serialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Largest envelope accepted on either side of the queue: 10MB.
pub const MAX_ENVELOPE_SIZE: usize = 10 * 1024 * 1024;
