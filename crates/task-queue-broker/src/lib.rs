//! Connection to the external list broker that carries tasks and results.

pub mod config;
pub mod queue;
pub mod redis;

pub use config::BrokerConfig;
pub use queue::{MemoryQueue, QueueClient};
pub use redis::RedisQueue;
