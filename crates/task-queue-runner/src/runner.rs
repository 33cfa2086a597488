use crate::{config::RunnerConfig, pool::WorkerPool};
use std::sync::Arc;
use std::time::{Duration, Instant};
use task_queue_broker::QueueClient;
use task_queue_client::{Collector, CollectorReport, Producer, ResultState, ResultTable};
use task_queue_core::{Correlation, CorrelationId, Result, TaskEnvelope, TaskError, Value};
use task_queue_protocol::EnvelopeCodec;
use task_queue_worker::{OperationRegistry, Worker};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// One task to submit.
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    pub operation: String,
    pub arguments: Vec<Value>,
    pub fire_and_forget: bool,
}

impl Job {
    pub fn new(operation: impl Into<String>, arguments: Vec<Value>) -> Self {
        Job {
            operation: operation.into(),
            arguments,
            fire_and_forget: false,
        }
    }

    pub fn fire_and_forget(operation: impl Into<String>, arguments: Vec<Value>) -> Self {
        Job {
            fire_and_forget: true,
            ..Self::new(operation, arguments)
        }
    }
}

/// Tasks submitted by one run, in order.
#[derive(Debug, Clone, Default)]
pub struct Workload {
    jobs: Vec<Job>,
}

impl Workload {
    pub fn new() -> Self {
        Self::default()
    }

    /// `add(i, i)` for i in 0..n.
    pub fn additions(n: usize) -> Self {
        let jobs = (0..n as i64)
            .map(|i| Job::new("add", vec![Value::Int(i), Value::Int(i)]))
            .collect();
        Workload { jobs }
    }

    pub fn push(&mut self, job: Job) {
        self.jobs.push(job);
    }

    /// Mark every job as fire-and-forget.
    pub fn without_results(mut self) -> Self {
        for job in &mut self.jobs {
            job.fire_and_forget = true;
        }
        self
    }

    pub fn jobs(&self) -> &[Job] {
        &self.jobs
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn correlated_count(&self) -> usize {
        self.jobs.iter().filter(|job| !job.fire_and_forget).count()
    }
}

impl FromIterator<Job> for Workload {
    fn from_iter<I: IntoIterator<Item = Job>>(iter: I) -> Self {
        Workload {
            jobs: iter.into_iter().collect(),
        }
    }
}

/// Outcome of [`Runner::run`].
pub struct RunReport {
    pub submitted: usize,
    pub fire_and_forget: usize,
    pub resolved: usize,
    pub elapsed: Duration,
    /// Submitted correlation ids in submission order.
    pub ids: Vec<CorrelationId>,
    pub table: ResultTable,
    pub collector: CollectorReport,
    /// Whether the run was cut short by its deadline.
    pub timed_out: bool,
}

impl RunReport {
    /// Every correlated task has a result.
    pub fn is_complete(&self) -> bool {
        self.ids
            .iter()
            .all(|id| matches!(self.table.get(id), ResultState::Resolved(_)))
    }

    /// Submitted tasks per second of wall time.
    pub fn throughput(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.submitted as f64 / secs
        } else {
            0.0
        }
    }
}

/// Drives a producer and a collector against one broker.
pub struct Runner {
    queue: Arc<dyn QueueClient>,
    config: RunnerConfig,
    registry: OperationRegistry,
}

impl Runner {
    pub fn new(queue: Arc<dyn QueueClient>, config: RunnerConfig) -> Self {
        Runner {
            queue,
            config,
            registry: OperationRegistry::with_builtins(),
        }
    }

    /// Operations available to workers started by [`Runner::spawn_workers`].
    pub fn with_registry(mut self, registry: OperationRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Start `count` worker loops on this runner's broker. They keep running
    /// until the pool is shut down.
    pub fn spawn_workers(&self, count: usize) -> WorkerPool {
        let worker = Worker::new(
            &self.config.worker_config(),
            self.queue.clone(),
            self.registry.clone(),
        );
        WorkerPool::spawn(&worker, count)
    }

    /// Submit `workload` while collecting results concurrently. Returns once every
    /// task is submitted and one result per correlated task has arrived, or
    /// when the configured deadline elapses.
    pub async fn run(&self, workload: &Workload) -> Result<RunReport> {
        let codec = EnvelopeCodec::new(self.config.worker.format);
        let table = ResultTable::new();
        let producer = Producer::new(self.queue.clone(), table.clone())
            .with_task_queue(self.config.broker.task_queue.clone())
            .with_codec(codec);
        let collector = Collector::new(self.queue.detach(), table.clone())
            .with_result_queue(self.config.broker.result_queue.clone())
            .with_codec(codec)
            .with_pop_timeout(self.config.collector_pop_timeout());

        let expected = workload.correlated_count();
        let started = Instant::now();
        let deadline = self
            .config
            .deadline()
            .map(|d| tokio::time::Instant::from_std(started) + d);

        info!(
            "Running {} tasks ({} expecting results)",
            workload.len(),
            expected
        );

        let stop = CancellationToken::new();
        let mut collecting = tokio::spawn({
            let stop = stop.clone();
            async move { collector.run(Some(expected), stop).await }
        });

        let mut ids = Vec::with_capacity(expected);
        for job in workload.jobs() {
            let correlation = if job.fire_and_forget {
                Correlation::FireAndForget
            } else {
                Correlation::Correlated(CorrelationId::generate())
            };
            let envelope =
                TaskEnvelope::new(job.operation.clone(), job.arguments.clone(), correlation);

            if let Err(e) = producer.submit_envelope(&envelope).await {
                stop.cancel();
                let _ = collecting.await;
                return Err(e);
            }
            if let Some(id) = envelope.correlation_id() {
                ids.push(id.clone());
            }
        }

        let mut timed_out = false;
        let joined = match deadline {
            Some(deadline) => match tokio::time::timeout_at(deadline, &mut collecting).await {
                Ok(joined) => joined,
                Err(_) => {
                    warn!("Run deadline reached, stopping collector");
                    timed_out = true;
                    stop.cancel();
                    collecting.await
                }
            },
            None => collecting.await,
        };
        let collector = joined.map_err(|e| TaskError::Other(format!("collector failed: {e}")))?;
        let elapsed = started.elapsed();

        let resolved = ids
            .iter()
            .filter(|id| matches!(table.get(id), ResultState::Resolved(_)))
            .count();

        info!(
            "Run finished in {:?}: {} submitted, {} resolved",
            elapsed,
            workload.len(),
            resolved
        );

        Ok(RunReport {
            submitted: workload.len(),
            fire_and_forget: workload.len() - expected,
            resolved,
            elapsed,
            ids,
            table,
            collector,
            timed_out,
        })
    }
}
