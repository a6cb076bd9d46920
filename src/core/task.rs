//! Units of department work and their results.
//!
//! A [`Task`] wraps a re-invocable asynchronous closure so the executor can
//! retry it; the orchestration core never looks inside the output it
//! produces. Every task yields exactly one [`TaskResult`].

use std::collections::HashMap;
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::Department;
use crate::error::{Error, Result};
use crate::util::millis;

/// Future returned by one invocation of a task.
pub type TaskFuture = BoxFuture<'static, std::result::Result<TaskOutput, String>>;

type TaskFn = Arc<dyn Fn() -> TaskFuture + Send + Sync>;

/// Opaque output of a department, plus its self-reported quality.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskOutput {
    pub value: Value,
    pub quality_score: Option<f64>,
}

impl TaskOutput {
    pub fn new(value: Value) -> Self {
        Self {
            value,
            quality_score: None,
        }
    }

    pub fn with_quality(mut self, score: f64) -> Self {
        self.quality_score = Some(score.clamp(0.0, 1.0));
        self
    }
}

impl From<Value> for TaskOutput {
    fn from(value: Value) -> Self {
        Self::new(value)
    }
}

/// A caller-supplied unit of work for one department.
#[derive(Clone)]
pub struct Task {
    pub department: Department,
    /// Higher runs first when the worker pool is saturated.
    pub priority: i32,
    execute: TaskFn,
}

impl Task {
    /// Create a task from a closure producing a fresh future per attempt.
    pub fn new<F, Fut, E>(department: Department, f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<TaskOutput, E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        Self {
            department,
            priority: 0,
            execute: Arc::new(move || -> TaskFuture {
                let fut = f();
                Box::pin(async move { fut.await.map_err(|e| e.to_string()) })
            }),
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Start one attempt.
    pub fn execute(&self) -> TaskFuture {
        (self.execute)()
    }
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("department", &self.department)
            .field("priority", &self.priority)
            .finish()
    }
}

/// Outcome of one task, produced exactly once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub department: Department,
    pub success: bool,
    pub output: Option<Value>,
    pub quality_score: Option<f64>,
    pub execution_time_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

impl TaskResult {
    /// A successful result carrying the task's output.
    pub fn completed(department: Department, output: TaskOutput, elapsed: Duration) -> Self {
        Self {
            department,
            success: true,
            output: Some(output.value),
            quality_score: output.quality_score,
            execution_time_ms: Some(millis(elapsed)),
            errors: Vec::new(),
        }
    }

    /// A failed result with the given error messages.
    pub fn failed(department: Department, errors: Vec<String>, elapsed: Duration) -> Self {
        Self {
            department,
            success: false,
            output: None,
            quality_score: None,
            execution_time_ms: Some(millis(elapsed)),
            errors,
        }
    }

    /// A bare successful result with no output, mainly for assembling fixtures.
    pub fn succeeded(department: Department) -> Self {
        Self {
            department,
            success: true,
            output: None,
            quality_score: None,
            execution_time_ms: None,
            errors: Vec::new(),
        }
    }

    pub fn with_output(mut self, output: Value) -> Self {
        self.output = Some(output);
        self
    }

    pub fn with_quality(mut self, score: f64) -> Self {
        self.quality_score = Some(score);
        self
    }

    pub fn with_execution_time_ms(mut self, ms: u64) -> Self {
        self.execution_time_ms = Some(ms);
        self
    }

    pub fn with_error(mut self, error: &str) -> Self {
        self.success = false;
        self.errors.push(error.to_string());
        self
    }

    pub fn is_timeout(&self) -> bool {
        self.errors.iter().any(|e| e.contains("timed out"))
    }
}

type FactoryFn = Arc<dyn Fn(Arc<str>) -> Task + Send + Sync>;

/// Department → task factory, supplied by the agent execution layer.
#[derive(Clone, Default)]
pub struct TaskFactories {
    factories: HashMap<Department, FactoryFn>,
}

impl TaskFactories {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the work a department performs for a request.
    ///
    /// The factory is invoked once per attempt with the request text.
    pub fn register<F, Fut, E>(mut self, department: Department, factory: F) -> Self
    where
        F: Fn(Arc<str>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<TaskOutput, E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        let factory = Arc::new(factory);
        self.factories.insert(
            department,
            Arc::new(move |request: Arc<str>| {
                let factory = Arc::clone(&factory);
                Task::new(department, move || factory(Arc::clone(&request)))
            }),
        );
        self
    }

    pub fn contains(&self, department: Department) -> bool {
        self.factories.contains_key(&department)
    }

    /// Build the task for a department.
    ///
    /// # Errors
    /// Returns `MissingFactory` if nothing was registered for `department`.
    pub fn build(&self, department: Department, request: &Arc<str>) -> Result<Task> {
        let factory = self
            .factories
            .get(&department)
            .ok_or(Error::MissingFactory(department))?;
        Ok(factory(Arc::clone(request)))
    }
}

impl std::fmt::Debug for TaskFactories {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut departments: Vec<_> = self.factories.keys().collect();
        departments.sort();
        f.debug_struct("TaskFactories")
            .field("departments", &departments)
            .finish()
    }
}
