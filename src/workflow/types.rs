//! Orchestration lifecycle type definitions.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for one orchestrated request.
///
/// Uses UUID v4 for generation and provides a short form display
/// for human-readable output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub Uuid);

impl RequestId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Return first 8 characters of the UUID for display.
    pub fn short(&self) -> String {
        self.0.to_string()[..8].to_string()
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for RequestId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Lifecycle of one orchestrated request.
///
/// routed -> graph_built -> phase_executing(0..n) -> aggregating -> done,
/// with failed reachable from every non-terminal phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrchestrationPhase {
    /// Departments chosen for the request.
    Routed,
    /// Dependency graph built without cycles.
    GraphBuilt,
    /// Running the departments of one execution phase.
    PhaseExecuting { phase: usize },
    /// Merging department results.
    Aggregating,
    Done,
    Failed,
}

impl OrchestrationPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrchestrationPhase::Done | OrchestrationPhase::Failed)
    }
}

impl std::fmt::Display for OrchestrationPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrchestrationPhase::Routed => write!(f, "routed"),
            OrchestrationPhase::GraphBuilt => write!(f, "graph_built"),
            OrchestrationPhase::PhaseExecuting { phase } => write!(f, "phase_executing({})", phase),
            OrchestrationPhase::Aggregating => write!(f, "aggregating"),
            OrchestrationPhase::Done => write!(f, "done"),
            OrchestrationPhase::Failed => write!(f, "failed"),
        }
    }
}
