//! Multi-department task orchestration.
//!
//! A request is routed to a primary department and its supporting
//! departments, the departments are ordered into execution phases by their
//! declared dependencies, each phase runs concurrently under a bounded
//! worker budget, and the results are merged into one quality-scored,
//! consistency-checked outcome.

pub mod config;
pub mod core;
pub mod error;
pub mod log;
pub mod orchestration;
pub mod util;
pub mod workflow;

pub use config::Config;
pub use core::{
    Department, DependencyGraph, DependencyResolver, DependencyRules, ExecutionPhase,
    RelevanceTable, Task, TaskFactories, TaskOutput, TaskResult,
};
pub use error::{Error, Result};
pub use orchestration::{
    AggregatedResult, AggregationMode, ExecuteOptions, ExecutionMode, OrchestrationOutcome,
    Orchestrator, ParallelExecutor, ResultAggregator, RoutePlan, Router, WorkerPool,
};
