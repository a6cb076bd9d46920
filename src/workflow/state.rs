//! Per-request state with phase transition validation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

use super::{OrchestrationPhase, RequestId};

/// A record of a phase transition with timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseHistoryEntry {
    pub phase: OrchestrationPhase,
    pub entered_at: DateTime<Utc>,
}

/// Tracks where one request is in its lifecycle.
///
/// Execution phases must be entered in ascending order starting at zero,
/// and nothing leaves `Done` or `Failed`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestrationState {
    request_id: RequestId,
    phase: OrchestrationPhase,
    history: Vec<PhaseHistoryEntry>,
    failure: Option<String>,
}

impl OrchestrationState {
    /// Start a request in the `Routed` phase.
    pub fn new(request_id: RequestId) -> Self {
        Self {
            request_id,
            phase: OrchestrationPhase::Routed,
            history: vec![PhaseHistoryEntry {
                phase: OrchestrationPhase::Routed,
                entered_at: Utc::now(),
            }],
            failure: None,
        }
    }

    pub fn can_transition(&self, target: OrchestrationPhase) -> bool {
        use OrchestrationPhase::*;
        match (self.phase, target) {
            (from, Failed) => !from.is_terminal(),
            (Routed, GraphBuilt) => true,
            (GraphBuilt, PhaseExecuting { phase: 0 }) => true,
            (PhaseExecuting { phase: current }, PhaseExecuting { phase: next }) => next == current + 1,
            (PhaseExecuting { .. }, Aggregating) => true,
            (Aggregating, Done) => true,
            _ => false,
        }
    }

    /// Move to `target`, recording it in the history.
    pub fn transition(&mut self, target: OrchestrationPhase) -> Result<()> {
        if !self.can_transition(target) {
            return Err(Error::InvalidPhaseTransition {
                from: self.phase.to_string(),
                to: target.to_string(),
            });
        }

        self.phase = target;
        self.history.push(PhaseHistoryEntry {
            phase: target,
            entered_at: Utc::now(),
        });
        Ok(())
    }

    /// Move to `Failed` and remember why.
    pub fn fail(&mut self, reason: impl Into<String>) -> Result<()> {
        self.transition(OrchestrationPhase::Failed)?;
        self.failure = Some(reason.into());
        Ok(())
    }

    pub fn request_id(&self) -> RequestId {
        self.request_id
    }

    pub fn current_phase(&self) -> OrchestrationPhase {
        self.phase
    }

    pub fn history(&self) -> &[PhaseHistoryEntry] {
        &self.history
    }

    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    pub fn is_terminal(&self) -> bool {
        self.phase.is_terminal()
    }
}
