//! Producer side of the task queue: submitting tasks and collecting results.

mod collector;
mod producer;
mod result_table;
mod sync_client;

pub use collector::{Collector, CollectorReport};
pub use producer::{IdGenerator, Producer};
pub use result_table::{ResultState, ResultTable};
pub use sync_client::{BackgroundCollector, BlockingProducer};
