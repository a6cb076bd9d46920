//! Core domain models for department orchestration.
//!
//! This module contains the fundamental data structures shared by the
//! router, resolver, executor and aggregator: departments, rule tables,
//! tasks, and the dependency graph.

pub mod dag;
pub mod department;
pub mod rules;
pub mod task;

pub use dag::{DependencyGraph, DependencyResolver, ExecutionPhase};
pub use department::Department;
pub use rules::{DependencyRules, KeywordCue, RelevanceTable};
pub use task::{Task, TaskFactories, TaskFuture, TaskOutput, TaskResult};
