//! Per-request orchestration lifecycle.
//!
//! This module provides the identifiers and the validated state machine
//! that every orchestrated request walks through.

mod state;
mod types;

pub use state::{OrchestrationState, PhaseHistoryEntry};
pub use types::{OrchestrationPhase, RequestId};
