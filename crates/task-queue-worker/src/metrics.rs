use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder};
use std::time::Duration;

/// Prometheus metrics for worker loops
pub struct WorkerMetrics {
    pub registry: Registry,

    // Tasks by outcome and operation
    pub tasks_total: IntCounterVec,

    // Time spent inside operations
    pub task_duration: HistogramVec,
}

impl WorkerMetrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let tasks_total = IntCounterVec::new(
            Opts::new("tq_worker_tasks_total", "Tasks handled by outcome and operation"),
            &["outcome", "operation"],
        )?;
        registry.register(Box::new(tasks_total.clone()))?;

        let task_duration = HistogramVec::new(
            HistogramOpts::new(
                "tq_worker_task_duration_seconds",
                "Operation execution time in seconds",
            ),
            &["operation"],
        )?;
        registry.register(Box::new(task_duration.clone()))?;

        Ok(WorkerMetrics {
            registry,
            tasks_total,
            task_duration,
        })
    }

    pub fn inc_tasks_total(&self, outcome: &str, operation: &str) {
        self.tasks_total
            .with_label_values(&[outcome, operation])
            .inc();
    }

    pub fn observe_duration(&self, operation: &str, elapsed: Duration) {
        self.task_duration
            .with_label_values(&[operation])
            .observe(elapsed.as_secs_f64());
    }

    pub fn count(&self, outcome: &str, operation: &str) -> u64 {
        self.tasks_total
            .with_label_values(&[outcome, operation])
            .get()
    }

    /// Text exposition format.
    pub fn render(&self) -> anyhow::Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_and_render() {
        let metrics = WorkerMetrics::new().unwrap();
        metrics.inc_tasks_total("ok", "add");
        metrics.inc_tasks_total("ok", "add");
        metrics.inc_tasks_total("unknown", "-");
        metrics.observe_duration("add", Duration::from_millis(3));

        assert_eq!(metrics.count("ok", "add"), 2);
        assert_eq!(metrics.count("failed", "add"), 0);

        let text = metrics.render().unwrap();
        assert!(text.contains("tq_worker_tasks_total"));
        assert!(text.contains("tq_worker_task_duration_seconds"));
    }
}
