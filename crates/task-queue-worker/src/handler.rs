use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use task_queue_core::{Result, TaskError, Value};

/// Result type for operations; the error is a human-readable message.
pub type OperationResult = std::result::Result<Value, String>;

/// A named unit of work a worker can run.
#[async_trait]
pub trait Operation: Send + Sync {
    async fn call(&self, args: Vec<Value>) -> OperationResult;
}

/// Adapter turning a synchronous closure into an [`Operation`].
pub struct FnOperation<F> {
    f: F,
}

impl<F> FnOperation<F>
where
    F: Fn(Vec<Value>) -> OperationResult + Send + Sync,
{
    pub fn new(f: F) -> Self {
        FnOperation { f }
    }
}

#[async_trait]
impl<F> Operation for FnOperation<F>
where
    F: Fn(Vec<Value>) -> OperationResult + Send + Sync,
{
    async fn call(&self, args: Vec<Value>) -> OperationResult {
        (self.f)(args)
    }
}

/// Operations by name. Clones share the same table.
#[derive(Clone, Default)]
pub struct OperationRegistry {
    operations: Arc<RwLock<HashMap<String, Arc<dyn Operation>>>>,
}

impl OperationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with `add`, `echo` and `sleep`.
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        let builtins: [(&str, Arc<dyn Operation>); 3] = [
            ("add", Arc::new(AddOperation)),
            ("echo", Arc::new(EchoOperation)),
            ("sleep", Arc::new(SleepOperation)),
        ];

        let mut operations = registry.operations.write();
        for (name, operation) in builtins {
            operations.insert(name.to_string(), operation);
        }
        drop(operations);

        registry
    }

    /// Register `operation` under `name`. Empty and already-taken names are rejected.
    pub fn register<O: Operation + 'static>(&self, name: impl Into<String>, operation: O) -> Result<()> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(TaskError::InvalidOperationName(name));
        }

        let mut operations = self.operations.write();
        if operations.contains_key(&name) {
            return Err(TaskError::DuplicateOperation(name));
        }
        operations.insert(name, Arc::new(operation));
        Ok(())
    }

    pub fn register_fn<F>(&self, name: impl Into<String>, f: F) -> Result<()>
    where
        F: Fn(Vec<Value>) -> OperationResult + Send + Sync + 'static,
    {
        self.register(name, FnOperation::new(f))
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Operation>> {
        self.operations.read().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.operations.read().contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.operations.read().keys().cloned().collect();
        names.sort();
        names
    }
}

/// Numeric sum of all arguments. Integers stay integers unless a float is present.
pub struct AddOperation;

#[async_trait]
impl Operation for AddOperation {
    async fn call(&self, args: Vec<Value>) -> OperationResult {
        if args.iter().any(|arg| matches!(arg, Value::Float(_))) {
            let mut sum: f64 = 0.0;
            for arg in &args {
                sum += arg
                    .as_f64()
                    .ok_or_else(|| format!("add expects numbers, got {}", arg.type_name()))?;
            }
            if !sum.is_finite() {
                return Err(format!("sum is not finite: {sum}"));
            }
            return Ok(Value::Float(sum));
        }

        let mut sum: i64 = 0;
        for arg in &args {
            let n = arg
                .as_i64()
                .ok_or_else(|| format!("add expects numbers, got {}", arg.type_name()))?;
            sum = sum
                .checked_add(n)
                .ok_or_else(|| "integer overflow".to_string())?;
        }
        Ok(Value::Int(sum))
    }
}

/// Returns its arguments as a list.
pub struct EchoOperation;

#[async_trait]
impl Operation for EchoOperation {
    async fn call(&self, args: Vec<Value>) -> OperationResult {
        Ok(Value::List(args))
    }
}

/// Waits for the number of milliseconds given as the first argument.
pub struct SleepOperation;

#[async_trait]
impl Operation for SleepOperation {
    async fn call(&self, args: Vec<Value>) -> OperationResult {
        let millis = match args.first() {
            Some(arg) => arg
                .as_i64()
                .filter(|ms| *ms >= 0)
                .ok_or_else(|| format!("sleep expects milliseconds, got {arg}"))?,
            None => 0,
        };

        tokio::time::sleep(Duration::from_millis(millis as u64)).await;
        Ok(Value::Null)
    }
}
