use crate::ResultTable;
use std::sync::Arc;
use std::time::Duration;
use task_queue_broker::QueueClient;
use task_queue_core::{Backoff, DEFAULT_RESULT_QUEUE};
use task_queue_protocol::EnvelopeCodec;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Counts from one collector run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectorReport {
    /// Results that resolved an entry registered in the table.
    pub received: usize,
    /// Results whose correlation id had no entry. They are still stored but
    /// do not count toward the expected total.
    pub unsolicited: usize,
    /// Items that failed to decode.
    pub dropped: usize,
}

/// Drains the result queue into a [`ResultTable`].
pub struct Collector {
    queue: Arc<dyn QueueClient>,
    table: ResultTable,
    result_queue: String,
    codec: EnvelopeCodec,
    pop_timeout: Duration,
    backoff: Backoff,
}

impl Collector {
    pub const DEFAULT_POP_TIMEOUT: Duration = Duration::from_secs(1);

    pub fn new(queue: Arc<dyn QueueClient>, table: ResultTable) -> Self {
        Collector {
            queue,
            table,
            result_queue: DEFAULT_RESULT_QUEUE.to_string(),
            codec: EnvelopeCodec::default(),
            pop_timeout: Self::DEFAULT_POP_TIMEOUT,
            backoff: Backoff::default(),
        }
    }

    pub fn with_result_queue(mut self, name: impl Into<String>) -> Self {
        self.result_queue = name.into();
        self
    }

    pub fn with_codec(mut self, codec: EnvelopeCodec) -> Self {
        self.codec = codec;
        self
    }

    pub fn with_pop_timeout(mut self, timeout: Duration) -> Self {
        self.pop_timeout = timeout;
        self
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn table(&self) -> &ResultTable {
        &self.table
    }

    /// Collect until `expected` registered results arrived (when given) or
    /// `stop` fires.
    ///
    /// The stop token is checked between pops, so a stop takes effect within
    /// one pop timeout.
    pub async fn run(&self, expected: Option<usize>, stop: CancellationToken) -> CollectorReport {
        let mut report = CollectorReport::default();
        let mut backoff = self.backoff.clone();

        info!(
            "Collector started on queue {} (expecting {:?})",
            self.result_queue, expected
        );

        loop {
            if expected.is_some_and(|n| report.received >= n) {
                break;
            }
            if stop.is_cancelled() {
                info!("Collector stopping");
                break;
            }

            match self
                .queue
                .blocking_pop(&self.result_queue, self.pop_timeout)
                .await
            {
                Ok(Some(bytes)) => {
                    backoff.reset();
                    self.handle(&bytes, &mut report);
                }
                Ok(None) => continue,
                Err(e) => {
                    let delay = backoff.next_delay();
                    error!(
                        "Result queue unavailable, retrying in {:?}: {}",
                        delay, e
                    );
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = stop.cancelled() => {}
                    }
                }
            }
        }

        info!(
            "Collector finished: {} received, {} unsolicited, {} dropped",
            report.received, report.unsolicited, report.dropped
        );
        report
    }

    fn handle(&self, bytes: &[u8], report: &mut CollectorReport) {
        let envelope = match self.codec.decode_result(bytes) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!("Dropping malformed result: {}", e);
                report.dropped += 1;
                return;
            }
        };

        debug!("Result for {}", envelope.correlation_id);
        if self.table.resolve(envelope.correlation_id, envelope.value) {
            report.received += 1;
        } else {
            report.unsolicited += 1;
        }
    }
}
