mod backoff;
mod envelope;
mod error;
mod value;

pub use backoff::Backoff;
pub use envelope::{Correlation, CorrelationId, ResultEnvelope, TaskEnvelope};
pub use error::{Result, TaskError};
pub use value::{Value, MAX_NESTING_DEPTH};

/// Default name of the list tasks are pushed onto.
pub const DEFAULT_TASK_QUEUE: &str = "tasks";

/// Default name of the list results are pushed onto.
pub const DEFAULT_RESULT_QUEUE: &str = "results";
