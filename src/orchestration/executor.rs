//! Concurrent task execution with timeout and retry policies.
//!
//! Every task in a batch runs as its own tokio task, so independent work
//! never serializes. Results always come back in input order.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::{join_all, try_join_all};
use serde::{Deserialize, Serialize};
use tokio_util::task::AbortOnDropHandle;

use crate::core::{Task, TaskOutput, TaskResult};
use crate::error::{Error, Result};
use crate::orchestration::pool::WorkerPool;
use crate::util::{millis, with_timeout};
use crate::{alog_debug, alog_error, alog_warn};

/// Per-call execution policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteOptions {
    /// Limit for a single attempt. `None` waits indefinitely.
    pub timeout: Option<Duration>,
    /// Collect every outcome instead of rejecting on the first failure.
    pub continue_on_error: bool,
    /// Additional attempts after the first failure.
    pub max_retries: u32,
    /// Delay between a failed attempt and its retry.
    pub retry_backoff: Duration,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            timeout: None,
            continue_on_error: false,
            max_retries: 0,
            retry_backoff: Duration::ZERO,
        }
    }
}

impl ExecuteOptions {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn continue_on_error(mut self, enabled: bool) -> Self {
        self.continue_on_error = enabled;
        self
    }

    pub fn with_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }
}

/// Runs batches of independent tasks concurrently.
///
/// With a [`WorkerPool`] attached, each task holds a pooled agent for the
/// duration of all its attempts, so the pool bounds concurrency across
/// every executor sharing it.
#[derive(Debug, Clone, Default)]
pub struct ParallelExecutor {
    pool: Option<Arc<WorkerPool>>,
}

impl ParallelExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pool(pool: Arc<WorkerPool>) -> Self {
        Self { pool: Some(pool) }
    }

    pub fn pool(&self) -> Option<&Arc<WorkerPool>> {
        self.pool.as_ref()
    }

    /// Run `tasks` concurrently and return their results in input order.
    ///
    /// # Errors
    /// Unless `continue_on_error` is set, the first task to fail (after its
    /// retries) rejects the whole call with `TaskFailed`. Remaining tasks are
    /// aborted and their pool slots released.
    pub async fn execute_parallel(
        &self,
        tasks: Vec<Task>,
        options: &ExecuteOptions,
    ) -> Result<Vec<TaskResult>> {
        if tasks.is_empty() {
            return Ok(Vec::new());
        }
        alog_debug!(
            "Executing {} tasks (timeout={:?}, retries={}, continue_on_error={})",
            tasks.len(),
            options.timeout,
            options.max_retries,
            options.continue_on_error
        );

        if options.continue_on_error {
            let runs = tasks.into_iter().map(|task| self.run_task(task, options));
            return Ok(join_all(runs).await);
        }

        let runs = tasks.into_iter().map(|task| async move {
            let result = self.run_task(task, options).await;
            if result.success {
                Ok(result)
            } else {
                Err(Error::TaskFailed {
                    department: result.department,
                    errors: result.errors,
                })
            }
        });
        try_join_all(runs).await
    }

    /// Run each batch to completion before starting the next.
    ///
    /// Results are flattened in batch order. In strict mode a failing batch
    /// stops the call and later batches never start.
    pub async fn execute_batched(
        &self,
        batches: Vec<Vec<Task>>,
        options: &ExecuteOptions,
    ) -> Result<Vec<TaskResult>> {
        let mut results = Vec::new();
        for (index, batch) in batches.into_iter().enumerate() {
            alog_debug!("Starting batch {} ({} tasks)", index, batch.len());
            results.extend(self.execute_parallel(batch, options).await?);
        }
        Ok(results)
    }

    async fn run_task(&self, task: Task, options: &ExecuteOptions) -> TaskResult {
        let department = task.department;
        let started = Instant::now();

        // Held until this function returns, including when the future is dropped.
        let _lease = match &self.pool {
            Some(pool) => match pool.acquire(department.as_str(), task.priority).await {
                Ok(lease) => Some(lease),
                Err(e) => return TaskResult::failed(department, vec![e.to_string()], started.elapsed()),
            },
            None => None,
        };

        let attempts = options.max_retries.saturating_add(1);
        let mut last_error = String::new();
        for attempt in 1..=attempts {
            match run_attempt(&task, options.timeout).await {
                Ok(output) => {
                    alog_debug!(
                        @department;
                        "Succeeded on attempt {} in {}ms",
                        attempt,
                        millis(started.elapsed())
                    );
                    return TaskResult::completed(department, output, started.elapsed());
                }
                Err(message) => {
                    if attempt < attempts {
                        alog_warn!(
                            @department;
                            "Attempt {}/{} failed: {}",
                            attempt,
                            attempts,
                            message
                        );
                        if !options.retry_backoff.is_zero() {
                            tokio::time::sleep(options.retry_backoff).await;
                        }
                    }
                    last_error = message;
                }
            }
        }

        alog_error!(@department; "Failed after {} attempts: {}", attempts, last_error);
        TaskResult::failed(department, vec![last_error], started.elapsed())
    }
}

async fn run_attempt(
    task: &Task,
    limit: Option<Duration>,
) -> std::result::Result<TaskOutput, String> {
    match join_attempt(task, limit).await {
        Ok(outcome) => outcome,
        Err(Error::Timeout(duration)) => {
            alog_warn!(@task.department; "Timed out after {}ms", millis(duration));
            Err(format!("{} timed out after {}ms", task.department, millis(duration)))
        }
        Err(e) => Err(format!("{}: {}", task.department, e)),
    }
}

/// Spawn one attempt and wait for it.
///
/// The spawned work is aborted whenever this future stops waiting for it:
/// on timeout, or when a strict batch abandons its remaining tasks.
async fn join_attempt(
    task: &Task,
    limit: Option<Duration>,
) -> Result<std::result::Result<TaskOutput, String>> {
    let handle = AbortOnDropHandle::new(tokio::spawn(task.execute()));
    with_timeout(limit, handle)
        .await?
        .map_err(|e| Error::TaskJoin(e.to_string()))
}
