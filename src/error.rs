use thiserror::Error;

use crate::core::Department;
use crate::orchestration::AgentId;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("No home directory")]
    NoHomeDir,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unknown department: {0}")]
    UnknownDepartment(String),

    #[error("No task factory registered for department: {0}")]
    MissingFactory(Department),

    #[error("Circular dependency detected: {}", format_cycle(.cycle))]
    CircularDependency { cycle: Vec<Department> },

    #[error("Task for {department} failed: {}", .errors.join("; "))]
    TaskFailed {
        department: Department,
        errors: Vec<String>,
    },

    #[error("Operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Task join error: {0}")]
    TaskJoin(String),

    #[error("worker pool is shut down")]
    PoolClosed,

    #[error("Agent not found: {id}")]
    AgentNotFound { id: AgentId },

    #[error("Invalid phase transition from {from} to {to}")]
    InvalidPhaseTransition { from: String, to: String },
}

fn format_cycle(cycle: &[Department]) -> String {
    cycle
        .iter()
        .map(|d| d.to_string())
        .collect::<Vec<_>>()
        .join(" -> ")
}

pub type Result<T> = std::result::Result<T, Error>;
