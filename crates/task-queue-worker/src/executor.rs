use crate::handler::Operation;
use std::any::Any;
use std::sync::Arc;
use std::time::Duration;
use task_queue_core::Value;
use thiserror::Error;
use tokio::time::timeout;
use tracing::{debug, error};

/// Why an operation produced no value.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExecutionError {
    #[error("operation failed: {0}")]
    Failed(String),

    #[error("operation timed out after {0:?}")]
    TimedOut(Duration),

    #[error("operation panicked: {0}")]
    Panicked(String),
}

impl ExecutionError {
    /// Short outcome label used in logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            ExecutionError::Failed(_) => "failed",
            ExecutionError::TimedOut(_) => "timeout",
            ExecutionError::Panicked(_) => "panic",
        }
    }
}

/// Runs operations on their own task, bounded by a timeout.
#[derive(Debug, Clone, Copy)]
pub struct OperationExecutor {
    timeout: Duration,
}

impl OperationExecutor {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

    pub fn new(timeout: Duration) -> Self {
        OperationExecutor { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Invoke `operation`. A panic inside it is caught and reported, and an
    /// operation still running at the timeout is aborted.
    pub async fn execute(
        &self,
        name: &str,
        operation: Arc<dyn Operation>,
        args: Vec<Value>,
    ) -> Result<Value, ExecutionError> {
        debug!("Executing {} with timeout {:?}", name, self.timeout);

        let handle = tokio::spawn(async move { operation.call(args).await });
        let abort = handle.abort_handle();

        match timeout(self.timeout, handle).await {
            Ok(Ok(Ok(value))) => Ok(value),
            Ok(Ok(Err(message))) => Err(ExecutionError::Failed(message)),
            Ok(Err(e)) if e.is_panic() => {
                let message = panic_message(e.into_panic());
                error!("Operation {} panicked: {}", name, message);
                Err(ExecutionError::Panicked(message))
            }
            Ok(Err(_)) => Err(ExecutionError::Failed("operation was cancelled".to_string())),
            Err(_) => {
                abort.abort();
                Err(ExecutionError::TimedOut(self.timeout))
            }
        }
    }
}

impl Default for OperationExecutor {
    fn default() -> Self {
        Self::new(Self::DEFAULT_TIMEOUT)
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
