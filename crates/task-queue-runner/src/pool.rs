use task_queue_core::{Result, TaskError};
use task_queue_worker::{Worker, WorkerReport};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Long-lived worker loops started by a runner. They run until [`shutdown`].
///
/// [`shutdown`]: WorkerPool::shutdown
pub struct WorkerPool {
    stop: CancellationToken,
    handles: Vec<JoinHandle<WorkerReport>>,
}

impl WorkerPool {
    /// Start `count` replicas of `worker`, each on its own connection.
    pub fn spawn(worker: &Worker, count: usize) -> Self {
        let stop = CancellationToken::new();
        let handles = (0..count)
            .map(|index| {
                let replica = worker.replica(index);
                let token = stop.clone();
                tokio::spawn(async move { replica.run(token).await })
            })
            .collect();

        info!("Started {} worker loops", count);
        WorkerPool { stop, handles }
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Signal every loop to stop and wait for them; returns the combined counts.
    pub async fn shutdown(self) -> Result<WorkerReport> {
        self.stop.cancel();

        let mut total = WorkerReport::default();
        for handle in self.handles {
            let report = handle
                .await
                .map_err(|e| TaskError::Other(format!("worker loop failed: {e}")))?;
            total.merge(&report);
        }

        info!(
            "Worker pool stopped: {} processed, {} replied, {} dropped",
            total.processed, total.replied, total.dropped
        );
        Ok(total)
    }
}
