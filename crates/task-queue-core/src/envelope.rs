use crate::Value;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Opaque identifier linking a submitted task to its result.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(String);

impl CorrelationId {
    pub fn new(id: impl Into<String>) -> Self {
        CorrelationId(id.into())
    }

    /// Fresh random (UUID v4) identifier.
    pub fn generate() -> Self {
        CorrelationId(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CorrelationId {
    fn from(id: &str) -> Self {
        CorrelationId::new(id)
    }
}

impl From<String> for CorrelationId {
    fn from(id: String) -> Self {
        CorrelationId(id)
    }
}

/// Whether a result is expected for a task.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Correlation {
    /// A result envelope carrying this id is pushed back.
    Correlated(CorrelationId),
    /// No result is ever produced or awaited.
    FireAndForget,
}

impl Correlation {
    pub fn id(&self) -> Option<&CorrelationId> {
        match self {
            Correlation::Correlated(id) => Some(id),
            Correlation::FireAndForget => None,
        }
    }

    pub fn is_fire_and_forget(&self) -> bool {
        matches!(self, Correlation::FireAndForget)
    }
}

impl From<Option<CorrelationId>> for Correlation {
    fn from(id: Option<CorrelationId>) -> Self {
        match id {
            Some(id) => Correlation::Correlated(id),
            None => Correlation::FireAndForget,
        }
    }
}

impl From<Correlation> for Option<CorrelationId> {
    fn from(correlation: Correlation) -> Self {
        match correlation {
            Correlation::Correlated(id) => Some(id),
            Correlation::FireAndForget => None,
        }
    }
}

/// Wire shape: `(operation_name, arguments, correlation_id | null)`.
#[derive(Serialize, Deserialize)]
struct WireTask(String, Vec<Value>, Option<CorrelationId>);

/// Unit of work pushed onto the task queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "WireTask", into = "WireTask")]
pub struct TaskEnvelope {
    operation: String,
    arguments: Vec<Value>,
    correlation: Correlation,
}

impl TaskEnvelope {
    pub fn new(
        operation: impl Into<String>,
        arguments: Vec<Value>,
        correlation: Correlation,
    ) -> Self {
        TaskEnvelope {
            operation: operation.into(),
            arguments,
            correlation,
        }
    }

    pub fn correlated(
        operation: impl Into<String>,
        arguments: Vec<Value>,
        id: CorrelationId,
    ) -> Self {
        Self::new(operation, arguments, Correlation::Correlated(id))
    }

    pub fn fire_and_forget(operation: impl Into<String>, arguments: Vec<Value>) -> Self {
        Self::new(operation, arguments, Correlation::FireAndForget)
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    pub fn arguments(&self) -> &[Value] {
        &self.arguments
    }

    pub fn correlation(&self) -> &Correlation {
        &self.correlation
    }

    pub fn correlation_id(&self) -> Option<&CorrelationId> {
        self.correlation.id()
    }

    pub fn into_parts(self) -> (String, Vec<Value>, Correlation) {
        (self.operation, self.arguments, self.correlation)
    }
}

impl From<WireTask> for TaskEnvelope {
    fn from(WireTask(operation, arguments, id): WireTask) -> Self {
        TaskEnvelope::new(operation, arguments, Correlation::from(id))
    }
}

impl From<TaskEnvelope> for WireTask {
    fn from(envelope: TaskEnvelope) -> Self {
        WireTask(envelope.operation, envelope.arguments, envelope.correlation.into())
    }
}

/// Wire shape: `(correlation_id, value)`.
#[derive(Serialize, Deserialize)]
struct WireResult(CorrelationId, Value);

/// Outcome of a correlated task, pushed onto the result queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "WireResult", into = "WireResult")]
pub struct ResultEnvelope {
    pub correlation_id: CorrelationId,
    pub value: Value,
}

impl ResultEnvelope {
    pub fn new(correlation_id: CorrelationId, value: Value) -> Self {
        ResultEnvelope {
            correlation_id,
            value,
        }
    }
}

impl From<WireResult> for ResultEnvelope {
    fn from(WireResult(correlation_id, value): WireResult) -> Self {
        ResultEnvelope::new(correlation_id, value)
    }
}

impl From<ResultEnvelope> for WireResult {
    fn from(envelope: ResultEnvelope) -> Self {
        WireResult(envelope.correlation_id, envelope.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_wire_shape() {
        let envelope = TaskEnvelope::correlated(
            "add",
            vec![Value::Int(2), Value::Int(3)],
            CorrelationId::new("c1"),
        );

        let json = serde_json::to_string(&envelope).unwrap();
        assert_eq!(json, r#"["add",[2,3],"c1"]"#);
    }

    #[test]
    fn test_null_id_is_fire_and_forget() {
        let envelope: TaskEnvelope = serde_json::from_str(r#"["add",[1,1],null]"#).unwrap();

        assert_eq!(envelope.operation(), "add");
        assert!(envelope.correlation().is_fire_and_forget());
        assert_eq!(envelope.correlation_id(), None);
    }

    #[test]
    fn test_result_wire_shape() {
        let result = ResultEnvelope::new(CorrelationId::new("c1"), Value::Int(5));
        assert_eq!(serde_json::to_string(&result).unwrap(), r#"["c1",5]"#);

        let decoded: ResultEnvelope = serde_json::from_str(r#"["c9","done"]"#).unwrap();
        assert_eq!(decoded.correlation_id.as_str(), "c9");
        assert_eq!(decoded.value, Value::from("done"));
    }

    #[test]
    fn test_generated_ids_differ() {
        let a = CorrelationId::generate();
        let b = CorrelationId::generate();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 36);
    }

    #[test]
    fn test_malformed_task_rejected() {
        assert!(serde_json::from_str::<TaskEnvelope>(r#"["add",[1]]"#).is_err());
        assert!(serde_json::from_str::<TaskEnvelope>(r#"{"op":"add"}"#).is_err());
    }
}
