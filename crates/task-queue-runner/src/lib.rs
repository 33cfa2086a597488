//! Runs a producer and a collector against the queue, with optional in-process workers.

pub mod config;
pub mod pool;
pub mod runner;
pub mod stats;

pub use config::RunnerConfig;
pub use pool::WorkerPool;
pub use runner::{Job, RunReport, Runner, Workload};
pub use stats::ThroughputSummary;
