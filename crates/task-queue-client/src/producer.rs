use crate::ResultTable;
use std::sync::Arc;
use task_queue_broker::QueueClient;
use task_queue_core::{CorrelationId, Result, TaskEnvelope, Value, DEFAULT_TASK_QUEUE};
use task_queue_protocol::EnvelopeCodec;
use tracing::{debug, warn};

pub type IdGenerator = Arc<dyn Fn() -> CorrelationId + Send + Sync>;

/// Pushes task envelopes onto the task queue.
///
/// Correlated submissions register a pending entry in the shared
/// [`ResultTable`] before the push.
#[derive(Clone)]
pub struct Producer {
    queue: Arc<dyn QueueClient>,
    table: ResultTable,
    task_queue: String,
    codec: EnvelopeCodec,
    id_generator: IdGenerator,
}

impl Producer {
    pub fn new(queue: Arc<dyn QueueClient>, table: ResultTable) -> Self {
        Producer {
            queue,
            table,
            task_queue: DEFAULT_TASK_QUEUE.to_string(),
            codec: EnvelopeCodec::default(),
            id_generator: Arc::new(CorrelationId::generate),
        }
    }

    pub fn with_task_queue(mut self, name: impl Into<String>) -> Self {
        self.task_queue = name.into();
        self
    }

    pub fn with_codec(mut self, codec: EnvelopeCodec) -> Self {
        self.codec = codec;
        self
    }

    pub fn with_id_generator(
        mut self,
        generator: impl Fn() -> CorrelationId + Send + Sync + 'static,
    ) -> Self {
        self.id_generator = Arc::new(generator);
        self
    }

    pub fn table(&self) -> &ResultTable {
        &self.table
    }

    pub fn task_queue(&self) -> &str {
        &self.task_queue
    }

    /// Submit a task whose result will be collected. Returns its correlation id
    /// without waiting for the result.
    pub async fn submit(
        &self,
        operation: impl Into<String>,
        arguments: Vec<Value>,
    ) -> Result<CorrelationId> {
        let id = (self.id_generator)();
        let envelope = TaskEnvelope::correlated(operation, arguments, id.clone());
        self.submit_envelope(&envelope).await?;
        Ok(id)
    }

    /// Submit a task nobody waits on.
    pub async fn send(&self, operation: impl Into<String>, arguments: Vec<Value>) -> Result<()> {
        let envelope = TaskEnvelope::fire_and_forget(operation, arguments);
        self.submit_envelope(&envelope).await
    }

    pub async fn submit_envelope(&self, envelope: &TaskEnvelope) -> Result<()> {
        let bytes = self.codec.encode_task(envelope)?;

        if let Some(id) = envelope.correlation_id() {
            self.table.insert_pending(id.clone())?;
        }

        if let Err(e) = self.queue.push(&self.task_queue, bytes).await {
            warn!("Failed to push task {}: {}", envelope.operation(), e);
            if let Some(id) = envelope.correlation_id() {
                self.table.forget(id);
            }
            return Err(e);
        }

        debug!(
            "Submitted task {} ({:?})",
            envelope.operation(),
            envelope.correlation_id().map(CorrelationId::as_str)
        );
        Ok(())
    }
}
