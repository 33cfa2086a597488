use crate::{Collector, CollectorReport, Producer, ResultTable};
use std::time::Duration;
use task_queue_core::{CorrelationId, Result, TaskError, Value};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Synchronous producer for callers on plain threads (wraps [`Producer`]).
pub struct BlockingProducer {
    runtime: tokio::runtime::Runtime,
    producer: Producer,
}

impl BlockingProducer {
    pub fn new(producer: Producer) -> Result<Self> {
        let runtime = tokio::runtime::Runtime::new()
            .map_err(|e| TaskError::Other(format!("failed to start runtime: {e}")))?;

        Ok(BlockingProducer { runtime, producer })
    }

    pub fn table(&self) -> &ResultTable {
        self.producer.table()
    }

    pub fn submit(&self, operation: impl Into<String>, arguments: Vec<Value>) -> Result<CorrelationId> {
        self.runtime
            .block_on(self.producer.submit(operation, arguments))
    }

    pub fn send(&self, operation: impl Into<String>, arguments: Vec<Value>) -> Result<()> {
        self.runtime.block_on(self.producer.send(operation, arguments))
    }

    /// Block until `id` resolves or `timeout` elapses.
    pub fn wait(&self, id: &CorrelationId, timeout: Duration) -> Result<Value> {
        self.runtime.block_on(self.producer.table().wait(id, timeout))
    }

    /// Run `collector` in the background on this producer's runtime.
    pub fn spawn_collector(
        &self,
        collector: Collector,
        expected: Option<usize>,
    ) -> BackgroundCollector {
        let stop = CancellationToken::new();
        let token = stop.clone();
        let handle = self
            .runtime
            .spawn(async move { collector.run(expected, token).await });

        BackgroundCollector { stop, handle }
    }

    /// Stop a background collector and wait for its report.
    pub fn join_collector(&self, collector: BackgroundCollector) -> Result<CollectorReport> {
        collector.stop.cancel();
        self.runtime
            .block_on(collector.handle)
            .map_err(|e| TaskError::Other(format!("collector task failed: {e}")))
    }
}

/// Collector loop running on a [`BlockingProducer`]'s runtime.
pub struct BackgroundCollector {
    stop: CancellationToken,
    handle: JoinHandle<CollectorReport>,
}

impl BackgroundCollector {
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}
