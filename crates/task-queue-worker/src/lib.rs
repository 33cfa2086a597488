pub mod worker;
pub mod handler;
pub mod executor;
pub mod config;
pub mod metrics;

pub use worker::{Worker, WorkerReport};
pub use handler::{Operation, OperationRegistry, OperationResult};
pub use executor::{ExecutionError, OperationExecutor};
pub use config::WorkerConfig;
pub use metrics::WorkerMetrics;
