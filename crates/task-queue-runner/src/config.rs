use serde::{Deserialize, Serialize};
use std::time::Duration;
use task_queue_broker::BrokerConfig;
use task_queue_worker::WorkerConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    pub broker: BrokerConfig,
    /// Settings for in-process workers; its broker section is replaced by `broker`.
    pub worker: WorkerConfig,
    /// Tasks submitted per run.
    pub tasks: usize,
    pub repeats: usize,
    /// Worker loops started inside the runner process.
    pub local_workers: usize,
    pub collector_pop_timeout_ms: u64,
    /// Overall bound on one run.
    pub deadline_secs: Option<u64>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        RunnerConfig {
            broker: BrokerConfig::default(),
            worker: WorkerConfig::default(),
            tasks: 20_000,
            repeats: 5,
            local_workers: 0,
            collector_pop_timeout_ms: 1000,
            deadline_secs: None,
        }
    }
}

impl RunnerConfig {
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: RunnerConfig = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    /// Worker settings pointed at this runner's broker.
    pub fn worker_config(&self) -> WorkerConfig {
        WorkerConfig {
            broker: self.broker.clone(),
            ..self.worker.clone()
        }
    }

    pub fn collector_pop_timeout(&self) -> Duration {
        Duration::from_millis(self.collector_pop_timeout_ms)
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.deadline_secs.map(Duration::from_secs)
    }
}
