use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use task_queue_core::{CorrelationId, Result, TaskError, Value};
use tokio::sync::watch;

/// What the table knows about a correlation id.
#[derive(Debug, Clone, PartialEq)]
pub enum ResultState {
    Absent,
    Pending,
    Resolved(Value),
}

/// Shared correlation id → result mapping.
///
/// Clones share the same entries. Each entry owns a watch channel so callers
/// can wait on one id without polling.
#[derive(Clone, Default)]
pub struct ResultTable {
    entries: Arc<DashMap<CorrelationId, watch::Sender<Option<Value>>>>,
}

impl ResultTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that a result is expected for `id`.
    pub fn insert_pending(&self, id: CorrelationId) -> Result<()> {
        match self.entries.entry(id) {
            Entry::Occupied(entry) => Err(TaskError::CorrelationCollision(entry.key().clone())),
            Entry::Vacant(entry) => {
                let (tx, _rx) = watch::channel(None);
                entry.insert(tx);
                Ok(())
            }
        }
    }

    /// Store the result for `id`, waking anyone waiting on it. Last write wins.
    ///
    /// Returns false when `id` was never registered here; the value is still
    /// recorded.
    pub fn resolve(&self, id: CorrelationId, value: Value) -> bool {
        match self.entries.entry(id) {
            Entry::Occupied(entry) => {
                entry.get().send_replace(Some(value));
                true
            }
            Entry::Vacant(entry) => {
                let (tx, _rx) = watch::channel(Some(value));
                entry.insert(tx);
                false
            }
        }
    }

    pub fn get(&self, id: &CorrelationId) -> ResultState {
        let Some(tx) = self.entries.get(id) else {
            return ResultState::Absent;
        };
        let current = tx.borrow().clone();
        match current {
            Some(value) => ResultState::Resolved(value),
            None => ResultState::Pending,
        }
    }

    pub fn contains(&self, id: &CorrelationId) -> bool {
        self.entries.contains_key(id)
    }

    /// Remove and return a resolved entry. Pending entries are left alone.
    pub fn take(&self, id: &CorrelationId) -> Option<Value> {
        let (_, tx) = self
            .entries
            .remove_if(id, |_, tx| tx.borrow().is_some())?;
        tx.send_replace(None)
    }

    /// Drop an entry whatever its state. Returns whether it existed.
    pub fn forget(&self, id: &CorrelationId) -> bool {
        self.entries.remove(id).is_some()
    }

    /// Wait until `id` resolves and return a copy of its value.
    pub async fn wait(&self, id: &CorrelationId, timeout: Duration) -> Result<Value> {
        let mut rx = match self.entries.get(id) {
            Some(tx) => tx.subscribe(),
            None => return Err(TaskError::NotFound(id.clone())),
        };

        let outcome = match tokio::time::timeout(timeout, rx.wait_for(Option::is_some)).await {
            Err(_) => Err(TaskError::Timeout),
            // The entry was forgotten while we waited.
            Ok(Err(_)) => Err(TaskError::NotFound(id.clone())),
            Ok(Ok(current)) => current.clone().ok_or(TaskError::Timeout),
        };
        outcome
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn pending_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.value().borrow().is_none())
            .count()
    }

    pub fn resolved_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.value().borrow().is_some())
            .count()
    }

    /// Copy of every entry; `None` marks a pending one.
    pub fn snapshot(&self) -> HashMap<CorrelationId, Option<Value>> {
        self.entries
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().borrow().clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> CorrelationId {
        CorrelationId::new(s)
    }

    #[test]
    fn test_lifecycle() {
        let table = ResultTable::new();
        assert_eq!(table.get(&id("c1")), ResultState::Absent);

        table.insert_pending(id("c1")).unwrap();
        assert_eq!(table.get(&id("c1")), ResultState::Pending);
        assert_eq!(table.take(&id("c1")), None);

        assert!(table.resolve(id("c1"), Value::Int(5)));
        assert_eq!(table.get(&id("c1")), ResultState::Resolved(Value::Int(5)));

        assert_eq!(table.take(&id("c1")), Some(Value::Int(5)));
        assert_eq!(table.get(&id("c1")), ResultState::Absent);
        assert!(table.is_empty());
    }

    #[test]
    fn test_collision_rejected() {
        let table = ResultTable::new();
        table.insert_pending(id("dup")).unwrap();

        let err = table.insert_pending(id("dup")).unwrap_err();
        assert!(matches!(err, TaskError::CorrelationCollision(c) if c.as_str() == "dup"));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_resolve_twice_is_idempotent() {
        let table = ResultTable::new();
        table.insert_pending(id("c1")).unwrap();

        table.resolve(id("c1"), Value::Int(5));
        let before = table.snapshot();
        table.resolve(id("c1"), Value::Int(5));

        assert_eq!(table.snapshot(), before);
        assert_eq!(table.resolved_count(), 1);
    }

    #[test]
    fn test_unsolicited_result_recorded() {
        let table = ResultTable::new();
        assert!(!table.resolve(id("stranger"), Value::Null));
        assert_eq!(table.get(&id("stranger")), ResultState::Resolved(Value::Null));
    }

    #[test]
    fn test_counts() {
        let table = ResultTable::new();
        for i in 0..5 {
            table.insert_pending(id(&format!("c{i}"))).unwrap();
        }
        table.resolve(id("c0"), Value::Int(0));
        table.resolve(id("c3"), Value::Int(3));

        assert_eq!(table.len(), 5);
        assert_eq!(table.pending_count(), 3);
        assert_eq!(table.resolved_count(), 2);
    }

    #[test]
    fn test_counts_under_concurrent_inserts() {
        let table = ResultTable::new();
        table.resolve(id("seed"), Value::Int(0));

        let writer = table.clone();
        let inserting = std::thread::spawn(move || {
            for i in 0..20_000 {
                writer.insert_pending(id(&format!("p{i}"))).unwrap();
            }
        });

        for _ in 0..20_000 {
            assert_eq!(table.resolved_count(), 1);
            assert!(table.pending_count() <= 20_000);
        }
        inserting.join().unwrap();

        assert_eq!(table.pending_count(), 20_000);
        assert_eq!(table.resolved_count(), 1);
    }

    #[tokio::test]
    async fn test_wait_wakes_on_resolve() {
        let table = ResultTable::new();
        table.insert_pending(id("c1")).unwrap();

        let writer = table.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            writer.resolve(id("c1"), Value::from("done"));
        });

        let value = table.wait(&id("c1"), Duration::from_secs(2)).await.unwrap();
        assert_eq!(value, Value::from("done"));
    }

    #[tokio::test]
    async fn test_wait_already_resolved() {
        let table = ResultTable::new();
        table.resolve(id("c1"), Value::Int(1));
        let value = table.wait(&id("c1"), Duration::ZERO).await.unwrap();
        assert_eq!(value, Value::Int(1));
    }

    #[tokio::test]
    async fn test_wait_times_out_and_not_found() {
        let table = ResultTable::new();
        table.insert_pending(id("slow")).unwrap();

        let err = table
            .wait(&id("slow"), Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, TaskError::Timeout));

        let err = table
            .wait(&id("missing"), Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, TaskError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_forget_while_waiting() {
        let table = ResultTable::new();
        table.insert_pending(id("c1")).unwrap();

        let other = table.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            other.forget(&id("c1"));
        });

        let err = table.wait(&id("c1"), Duration::from_secs(2)).await.unwrap_err();
        assert!(matches!(err, TaskError::NotFound(_)));
    }
}
