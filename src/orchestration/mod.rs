//! Orchestration layer for department work.
//!
//! This module provides the components that turn one request into an
//! aggregated outcome: the keyword router, the bounded worker pool, the
//! parallel executor with its timeout and retry policies, the result
//! aggregator, and the orchestrator that drives them phase by phase.

pub mod aggregator;
pub mod executor;
pub mod orchestrator;
pub mod pool;
pub mod router;

pub use aggregator::{AggregatedResult, AggregationMode, ConsistencyReport, ResultAggregator};
pub use executor::{ExecuteOptions, ParallelExecutor};
pub use orchestrator::{OrchestrationOutcome, Orchestrator, OrchestratorEvent};
pub use pool::{AgentId, AgentLease, AgentStatus, PoolEvent, PoolMetrics, PooledAgent, WorkerPool};
pub use router::{ExecutionMode, RoutePlan, Router, RouterConfig};
