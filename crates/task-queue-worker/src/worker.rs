use crate::{
    config::WorkerConfig,
    executor::OperationExecutor,
    handler::OperationRegistry,
    metrics::WorkerMetrics,
};
use task_queue_broker::QueueClient;
use task_queue_core::{Backoff, Result, ResultEnvelope, TaskEnvelope, Value};
use task_queue_protocol::EnvelopeCodec;

use tokio_util::sync::CancellationToken;

use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Counts from one worker run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerReport {
    /// Tasks popped from the queue.
    pub processed: usize,
    /// Result envelopes pushed back.
    pub replied: usize,
    /// Tasks that produced no result: malformed, unknown, failed or lost on reply.
    pub dropped: usize,
}

impl WorkerReport {
    pub fn merge(&mut self, other: &WorkerReport) {
        self.processed += other.processed;
        self.replied += other.replied;
        self.dropped += other.dropped;
    }
}

/// Pops tasks, runs the named operation and pushes results for correlated tasks.
///
/// Delivery is at-most-once: a task taken off the queue is never put back.
#[derive(Clone)]
pub struct Worker {
    worker_id: String,
    queue: Arc<dyn QueueClient>,
    registry: OperationRegistry,
    executor: OperationExecutor,
    codec: EnvelopeCodec,
    task_queue: String,
    result_queue: String,
    pop_timeout: Duration,
    backoff: Backoff,
    metrics: Option<Arc<WorkerMetrics>>,
}

impl Worker {
    pub fn new(
        config: &WorkerConfig,
        queue: Arc<dyn QueueClient>,
        registry: OperationRegistry,
    ) -> Self {
        Worker {
            worker_id: config.generate_worker_id(),
            queue,
            registry,
            executor: OperationExecutor::new(config.operation_timeout()),
            codec: EnvelopeCodec::new(config.format),
            task_queue: config.broker.task_queue.clone(),
            result_queue: config.broker.result_queue.clone(),
            pop_timeout: config.pop_timeout(),
            backoff: Backoff::default(),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<WorkerMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    /// Another loop sharing this worker's registry and settings, on its own
    /// broker connection.
    pub fn replica(&self, index: usize) -> Worker {
        Worker {
            worker_id: format!("{}-{}", self.worker_id, index),
            queue: self.queue.detach(),
            ..self.clone()
        }
    }

    /// Run until `stop` fires. The token is checked between pops, so the loop
    /// exits within one pop timeout of the stop.
    pub async fn run(&self, stop: CancellationToken) -> WorkerReport {
        let mut report = WorkerReport::default();
        let mut backoff = self.backoff.clone();

        info!(
            "Starting worker {} on queue {} ({} operations)",
            self.worker_id,
            self.task_queue,
            self.registry.names().len()
        );

        while !stop.is_cancelled() {
            let popped = self
                .queue
                .blocking_pop(&self.task_queue, self.pop_timeout)
                .await;

            let failure = match popped {
                Ok(Some(bytes)) => match self.process(&bytes, &mut report).await {
                    Ok(()) => {
                        backoff.reset();
                        continue;
                    }
                    Err(e) => e,
                },
                Ok(None) => continue,
                Err(e) => e,
            };

            let delay = backoff.next_delay();
            error!(
                "Worker {} lost the broker, retrying in {:?}: {}",
                self.worker_id, delay, failure
            );
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = stop.cancelled() => {}
            }
        }

        info!(
            "Worker {} stopped: {} processed, {} replied, {} dropped",
            self.worker_id, report.processed, report.replied, report.dropped
        );
        report
    }

    /// Handle one popped item. Only a failed reply push is returned as an error;
    /// everything else is logged and dropped.
    async fn process(&self, bytes: &[u8], report: &mut WorkerReport) -> Result<()> {
        report.processed += 1;

        let task = match self.codec.decode_task(bytes) {
            Ok(task) => task,
            Err(e) => {
                warn!("Worker {} dropping malformed task: {}", self.worker_id, e);
                self.record("malformed", "-", None);
                report.dropped += 1;
                return Ok(());
            }
        };

        let Some(value) = self.execute(&task).await else {
            report.dropped += 1;
            return Ok(());
        };

        let Some(id) = task.correlation_id() else {
            debug!("Task {} was fire-and-forget", task.operation());
            return Ok(());
        };

        let reply = ResultEnvelope::new(id.clone(), value);
        let bytes = match self.codec.encode_result(&reply) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Worker {} cannot encode result for {}: {}", self.worker_id, id, e);
                report.dropped += 1;
                return Ok(());
            }
        };

        if let Err(e) = self.queue.push(&self.result_queue, bytes).await {
            warn!("Result for {} lost: {}", id, e);
            report.dropped += 1;
            return Err(e);
        }

        report.replied += 1;
        Ok(())
    }

    async fn execute(&self, task: &TaskEnvelope) -> Option<Value> {
        let name = task.operation();

        let Some(operation) = self.registry.get(name) else {
            warn!(
                "Worker {} dropping task for unknown operation {:?}",
                self.worker_id, name
            );
            self.record("unknown", "-", None);
            return None;
        };

        debug!("Worker {} running {}", self.worker_id, name);
        let started = Instant::now();
        let result = self
            .executor
            .execute(name, operation, task.arguments().to_vec())
            .await;
        let elapsed = started.elapsed();

        match result {
            Ok(value) => {
                self.record("ok", name, Some(elapsed));
                Some(value)
            }
            Err(e) => {
                warn!("Worker {} dropping task {}: {}", self.worker_id, name, e);
                self.record(e.label(), name, Some(elapsed));
                None
            }
        }
    }

    fn record(&self, outcome: &str, operation: &str, elapsed: Option<Duration>) {
        if let Some(metrics) = &self.metrics {
            metrics.inc_tasks_total(outcome, operation);
            if let Some(elapsed) = elapsed {
                metrics.observe_duration(operation, elapsed);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use task_queue_broker::MemoryQueue;
    use task_queue_core::CorrelationId;

    fn config() -> WorkerConfig {
        WorkerConfig {
            worker_id: Some("test-worker".to_string()),
            pop_timeout_ms: 50,
            ..Default::default()
        }
    }

    async fn push_task(queue: &MemoryQueue, envelope: &TaskEnvelope) {
        let bytes = EnvelopeCodec::default().encode_task(envelope).unwrap();
        queue.push("tasks", bytes).await.unwrap();
    }

    #[tokio::test]
    async fn test_process_replies_for_correlated_task() {
        let queue = MemoryQueue::new();
        let worker = Worker::new(
            &config(),
            Arc::new(queue.clone()),
            OperationRegistry::with_builtins(),
        );

        let task = TaskEnvelope::correlated(
            "add",
            vec![Value::Int(2), Value::Int(3)],
            CorrelationId::new("c1"),
        );
        let bytes = EnvelopeCodec::default().encode_task(&task).unwrap();

        let mut report = WorkerReport::default();
        worker.process(&bytes, &mut report).await.unwrap();

        assert_eq!(report.replied, 1);
        let reply = queue
            .blocking_pop("results", Duration::ZERO)
            .await
            .unwrap()
            .unwrap();
        let reply = EnvelopeCodec::default().decode_result(&reply).unwrap();
        assert_eq!(reply, ResultEnvelope::new(CorrelationId::new("c1"), Value::Int(5)));
    }

    #[tokio::test]
    async fn test_fire_and_forget_never_replies() {
        let queue = MemoryQueue::new();
        let worker = Worker::new(
            &config(),
            Arc::new(queue.clone()),
            OperationRegistry::with_builtins(),
        );

        let task = TaskEnvelope::fire_and_forget("echo", vec![Value::Int(1)]);
        let bytes = EnvelopeCodec::default().encode_task(&task).unwrap();

        let mut report = WorkerReport::default();
        worker.process(&bytes, &mut report).await.unwrap();

        assert_eq!(report.processed, 1);
        assert_eq!(report.replied, 0);
        assert_eq!(report.dropped, 0);
        assert!(queue.is_empty("results"));
    }

    #[tokio::test]
    async fn test_drops_malformed_and_unknown() {
        let queue = MemoryQueue::new();
        let metrics = Arc::new(WorkerMetrics::new().unwrap());
        let worker = Worker::new(
            &config(),
            Arc::new(queue.clone()),
            OperationRegistry::with_builtins(),
        )
        .with_metrics(metrics.clone());

        let mut report = WorkerReport::default();
        worker.process(b"garbage", &mut report).await.unwrap();

        let task = TaskEnvelope::correlated("mystery", vec![], CorrelationId::new("m"));
        let bytes = EnvelopeCodec::default().encode_task(&task).unwrap();
        worker.process(&bytes, &mut report).await.unwrap();

        assert_eq!(report.processed, 2);
        assert_eq!(report.dropped, 2);
        assert!(queue.is_empty("results"));
        assert_eq!(metrics.count("malformed", "-"), 1);
        assert_eq!(metrics.count("unknown", "-"), 1);
    }

    #[tokio::test]
    async fn test_run_drains_then_stops() {
        let queue = MemoryQueue::new();
        let worker = Worker::new(
            &config(),
            Arc::new(queue.clone()),
            OperationRegistry::with_builtins(),
        );

        for i in 0..10 {
            let task = TaskEnvelope::correlated(
                "add",
                vec![Value::Int(i), Value::Int(i)],
                CorrelationId::new(format!("c{i}")),
            );
            push_task(&queue, &task).await;
        }

        let stop = CancellationToken::new();
        let token = stop.clone();
        let handle = tokio::spawn(async move { worker.run(token).await });

        tokio::time::sleep(Duration::from_millis(200)).await;
        stop.cancel();
        let report = handle.await.unwrap();

        assert_eq!(report.processed, 10);
        assert_eq!(report.replied, 10);
        assert_eq!(queue.len("results"), 10);
        assert!(queue.is_empty("tasks"));
    }

    #[test]
    fn test_replica_ids() {
        let worker = Worker::new(
            &config(),
            Arc::new(MemoryQueue::new()),
            OperationRegistry::new(),
        );
        assert_eq!(worker.replica(2).worker_id(), "test-worker-2");
    }
}
