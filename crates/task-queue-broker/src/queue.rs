use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use task_queue_core::{Result, TaskError};
use tokio::sync::Notify;

/// Blocking push/pop against named FIFO lists held by a broker.
///
/// Every pushed item is delivered to exactly one consumer. Items pushed by a
/// single producer are popped in push order.
#[async_trait]
pub trait QueueClient: Send + Sync {
    /// Append an item to the tail of `queue`.
    async fn push(&self, queue: &str, item: Vec<u8>) -> Result<()>;

    /// Take the head of `queue`, waiting up to `timeout` for one to arrive.
    ///
    /// `Ok(None)` means the timeout elapsed. A zero timeout does not wait.
    async fn blocking_pop(&self, queue: &str, timeout: Duration) -> Result<Option<Vec<u8>>>;

    /// Handle for another concurrent consumer.
    ///
    /// A blocking pop occupies its connection, so backends that hold one
    /// return a handle with its own connection here.
    fn detach(&self) -> Arc<dyn QueueClient>;
}

#[derive(Default)]
struct List {
    items: VecDeque<Vec<u8>>,
    notify: Arc<Notify>,
}

#[derive(Default)]
struct Inner {
    lists: Mutex<HashMap<String, List>>,
    offline: AtomicBool,
}

/// In-process broker. Clones share the same lists.
#[derive(Clone, Default)]
pub struct MemoryQueue {
    inner: Arc<Inner>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of items waiting in `queue`.
    pub fn len(&self, queue: &str) -> usize {
        let lists = self.inner.lists.lock();
        lists.get(queue).map_or(0, |list| list.items.len())
    }

    pub fn is_empty(&self, queue: &str) -> bool {
        self.len(queue) == 0
    }

    /// While offline every call fails with a connection error.
    pub fn set_offline(&self, offline: bool) {
        self.inner.offline.store(offline, Ordering::SeqCst);
    }

    fn check_online(&self) -> Result<()> {
        if self.inner.offline.load(Ordering::SeqCst) {
            return Err(TaskError::Connection("memory broker offline".to_string()));
        }
        Ok(())
    }

    fn notifier(&self, queue: &str) -> Arc<Notify> {
        let mut lists = self.inner.lists.lock();
        lists.entry(queue.to_string()).or_default().notify.clone()
    }

    fn pop_front(&self, queue: &str) -> Option<Vec<u8>> {
        let mut lists = self.inner.lists.lock();
        lists.get_mut(queue).and_then(|list| list.items.pop_front())
    }
}

#[async_trait]
impl QueueClient for MemoryQueue {
    async fn push(&self, queue: &str, item: Vec<u8>) -> Result<()> {
        self.check_online()?;

        let notify = {
            let mut lists = self.inner.lists.lock();
            let list = lists.entry(queue.to_string()).or_default();
            list.items.push_back(item);
            list.notify.clone()
        };
        notify.notify_one();

        Ok(())
    }

    async fn blocking_pop(&self, queue: &str, timeout: Duration) -> Result<Option<Vec<u8>>> {
        self.check_online()?;

        let deadline = tokio::time::Instant::now() + timeout;
        let notify = self.notifier(queue);

        loop {
            // Register interest before looking so a push in between is not missed.
            let notified = notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(item) = self.pop_front(queue) {
                return Ok(Some(item));
            }

            if timeout.is_zero() {
                return Ok(None);
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(None);
            }

            self.check_online()?;
        }
    }

    fn detach(&self) -> Arc<dyn QueueClient> {
        Arc::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[tokio::test]
    async fn test_fifo_order() {
        let queue = MemoryQueue::new();
        for i in 0..3u8 {
            queue.push("tasks", vec![i]).await.unwrap();
        }

        assert_eq!(queue.len("tasks"), 3);
        for i in 0..3u8 {
            let item = queue
                .blocking_pop("tasks", Duration::from_millis(10))
                .await
                .unwrap();
            assert_eq!(item, Some(vec![i]));
        }
        assert!(queue.is_empty("tasks"));
    }

    #[tokio::test]
    async fn test_pop_times_out() {
        let queue = MemoryQueue::new();
        let started = Instant::now();

        let item = queue
            .blocking_pop("tasks", Duration::from_millis(100))
            .await
            .unwrap();

        assert!(item.is_none());
        assert!(started.elapsed() >= Duration::from_millis(90));
    }

    #[tokio::test]
    async fn test_zero_timeout_does_not_wait() {
        let queue = MemoryQueue::new();
        let item = queue.blocking_pop("tasks", Duration::ZERO).await.unwrap();
        assert!(item.is_none());
    }

    #[tokio::test]
    async fn test_pop_wakes_on_push() {
        let queue = MemoryQueue::new();
        let consumer = queue.clone();

        let waiter = tokio::spawn(async move {
            consumer
                .blocking_pop("tasks", Duration::from_secs(5))
                .await
                .unwrap()
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        queue.push("tasks", b"work".to_vec()).await.unwrap();

        let item = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(item, Some(b"work".to_vec()));
    }

    #[tokio::test]
    async fn test_each_item_delivered_once() {
        let queue = MemoryQueue::new();
        let mut consumers = Vec::new();

        for _ in 0..4 {
            let consumer = queue.detach();
            consumers.push(tokio::spawn(async move {
                let mut seen = Vec::new();
                while let Some(item) = consumer
                    .blocking_pop("tasks", Duration::from_millis(200))
                    .await
                    .unwrap()
                {
                    seen.push(item);
                }
                seen
            }));
        }

        for i in 0..200u32 {
            queue.push("tasks", i.to_be_bytes().to_vec()).await.unwrap();
        }

        let mut all = Vec::new();
        for consumer in consumers {
            all.extend(consumer.await.unwrap());
        }
        assert_eq!(all.len(), 200);
        all.sort();
        all.dedup();
        assert_eq!(all.len(), 200);
    }

    #[tokio::test]
    async fn test_offline_fails_with_connection_error() {
        let queue = MemoryQueue::new();
        queue.set_offline(true);

        let err = queue.push("tasks", vec![1]).await.unwrap_err();
        assert!(err.is_connection());

        queue.set_offline(false);
        queue.push("tasks", vec![1]).await.unwrap();
    }

    #[tokio::test]
    async fn test_queues_are_independent() {
        let queue = MemoryQueue::new();
        queue.push("tasks", vec![1]).await.unwrap();

        let item = queue.blocking_pop("results", Duration::ZERO).await.unwrap();
        assert!(item.is_none());
        assert_eq!(queue.len("tasks"), 1);
    }
}
