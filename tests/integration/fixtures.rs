//! Test fixtures for integration tests.
//!
//! Provides helpers for:
//! - Stand-in department tasks (sleeping, failing, flaky)
//! - Task factories for full orchestration runs
//! - Enumerating department subsets

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::sync::mpsc;

use atelier::core::{Department, Task, TaskFactories, TaskOutput, TaskResult};
use atelier::orchestration::{Orchestrator, OrchestratorEvent};

/// A task that sleeps for `ms` then succeeds with quality 0.8.
pub fn sleeping_task(department: Department, ms: u64) -> Task {
    Task::new(department, move || async move {
        tokio::time::sleep(Duration::from_millis(ms)).await;
        Ok::<_, String>(TaskOutput::new(json!({ "department": department })).with_quality(0.8))
    })
}

/// A task that always fails with `message`.
pub fn failing_task(department: Department, message: &'static str) -> Task {
    Task::new(department, move || async move { Err::<TaskOutput, _>(message) })
}

/// A task failing its first `failures` invocations, plus its call counter.
pub fn flaky_task(department: Department, failures: usize) -> (Task, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let task = Task::new(department, move || {
        let counter = Arc::clone(&counter);
        async move {
            let attempt = counter.fetch_add(1, Ordering::SeqCst) + 1;
            if attempt <= failures {
                Err(format!("transient failure {}", attempt))
            } else {
                Ok(TaskOutput::new(json!({ "attempt": attempt })))
            }
        }
    });
    (task, calls)
}

pub fn scored_result(department: Department, quality: f64, ms: u64) -> TaskResult {
    TaskResult::succeeded(department)
        .with_quality(quality)
        .with_execution_time_ms(ms)
}

/// Factories for every department, each echoing `identity` after `latency_ms`.
pub fn echo_factories(identity: &'static str, latency_ms: u64) -> TaskFactories {
    Department::ALL
        .into_iter()
        .fold(TaskFactories::new(), |factories, department| {
            factories.register(department, move |request| async move {
                tokio::time::sleep(Duration::from_millis(latency_ms)).await;
                Ok::<_, String>(
                    TaskOutput::new(json!({
                        "id": identity,
                        "department": department,
                        "request": &*request,
                    }))
                    .with_quality(0.9),
                )
            })
        })
}

/// Every subset of the six departments, in bitmask order.
pub fn department_subsets() -> Vec<Vec<Department>> {
    let all = Department::ALL;
    (0u32..(1 << all.len()))
        .map(|mask| {
            all.iter()
                .enumerate()
                .filter(|(bit, _)| mask & (1 << bit) != 0)
                .map(|(_, d)| *d)
                .collect()
        })
        .collect()
}

/// An orchestrator wired to an event channel.
pub struct OrchestrationHarness {
    pub orchestrator: Orchestrator,
    pub event_rx: mpsc::Receiver<OrchestratorEvent>,
}

impl OrchestrationHarness {
    pub fn new(orchestrator: Orchestrator) -> Self {
        let (tx, event_rx) = mpsc::channel(64);
        Self {
            orchestrator: orchestrator.with_events(tx),
            event_rx,
        }
    }

    /// Events emitted so far.
    pub fn drain_events(&mut self) -> Vec<OrchestratorEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.event_rx.try_recv() {
            events.push(event);
        }
        events
    }
}
