//! Request routing.
//!
//! The router scores every department against the request text using the
//! keyword cues of a [`RelevanceTable`], picks a primary department and its
//! supporting departments, and decides how they should run relative to each
//! other using the [`DependencyRules`] table.

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::core::{Department, DependencyRules, RelevanceTable};
use crate::error::{Error, Result};
use crate::{alog_debug, alog_trace};

/// How the departments of a plan run relative to each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Only the primary department runs.
    Single,
    /// No declared dependency links the primary to any supporting department.
    Parallel,
    /// At least one supporting department is linked to the primary.
    Sequential,
}

impl std::fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionMode::Single => write!(f, "single"),
            ExecutionMode::Parallel => write!(f, "parallel"),
            ExecutionMode::Sequential => write!(f, "sequential"),
        }
    }
}

/// Routing decision for one request. Read-only once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutePlan {
    pub primary_department: Department,
    /// Ordered by descending score, without duplicates or the primary.
    pub supporting_departments: Vec<Department>,
    /// Every department with its relevance, best first.
    pub scores: Vec<(Department, f64)>,
    pub execution_mode: ExecutionMode,
}

impl RoutePlan {
    /// Primary first, then supporting departments in plan order.
    pub fn departments(&self) -> Vec<Department> {
        std::iter::once(self.primary_department)
            .chain(self.supporting_departments.iter().copied())
            .collect()
    }

    pub fn score(&self, department: Department) -> f64 {
        self.scores
            .iter()
            .find(|(d, _)| *d == department)
            .map(|(_, s)| *s)
            .unwrap_or(0.0)
    }
}

/// Score thresholds used when choosing departments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Minimum score for a department to be chosen as primary.
    pub primary_floor: f64,
    /// Minimum score (exclusive) for a supporting department.
    pub secondary_floor: f64,
    /// Primary department when nothing clears the primary floor.
    pub fallback: Department,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            primary_floor: 0.3,
            secondary_floor: 0.15,
            fallback: Department::Character,
        }
    }
}

struct CompiledCue {
    pattern: Regex,
    weight: f64,
}

/// Maps free-text requests to a [`RoutePlan`].
///
/// Pure: the same text always yields the same plan.
pub struct Router {
    cues: Vec<(Department, Vec<CompiledCue>)>,
    rules: DependencyRules,
    config: RouterConfig,
}

impl Router {
    /// Compile the relevance table into matchers.
    ///
    /// # Errors
    /// Returns a validation error if a cue cannot be compiled or the floors
    /// are not ordered within `[0, 1]`.
    pub fn new(relevance: &RelevanceTable, rules: DependencyRules, config: RouterConfig) -> Result<Self> {
        if !(0.0..=1.0).contains(&config.secondary_floor)
            || !(0.0..=1.0).contains(&config.primary_floor)
            || config.secondary_floor > config.primary_floor
        {
            return Err(Error::Validation(format!(
                "router floors must satisfy 0 <= secondary ({}) <= primary ({}) <= 1",
                config.secondary_floor, config.primary_floor
            )));
        }

        let mut cues = Vec::new();
        for department in Department::ALL {
            let compiled = relevance
                .cues(department)
                .iter()
                .map(|cue| {
                    let pattern = format!(r"(?i)\b{}(?:s|es)?\b", regex::escape(cue.keyword.trim()));
                    Regex::new(&pattern)
                        .map(|pattern| CompiledCue {
                            pattern,
                            weight: cue.weight,
                        })
                        .map_err(|e| Error::Validation(format!("bad cue {:?}: {}", cue.keyword, e)))
                })
                .collect::<Result<Vec<_>>>()?;
            cues.push((department, compiled));
        }

        Ok(Self { cues, rules, config })
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    /// Relevance of every department, best first; ties keep priority order.
    pub fn score(&self, request: &str) -> Vec<(Department, f64)> {
        let mut scores: Vec<(Department, f64)> = self
            .cues
            .iter()
            .map(|(department, cues)| {
                let raw: f64 = cues
                    .iter()
                    .filter(|cue| cue.pattern.is_match(request))
                    .map(|cue| cue.weight)
                    .sum();
                (*department, raw.clamp(0.0, 1.0))
            })
            .collect();
        // stable sort keeps Department::ALL order among equal scores
        scores.sort_by(|a, b| b.1.total_cmp(&a.1));
        scores
    }

    /// Route a request to its departments.
    pub fn route(&self, request: &str) -> RoutePlan {
        let scores = self.score(request);
        alog_trace!("Router scores for {:?}: {:?}", request, scores);

        let primary_department = scores
            .first()
            .filter(|(_, score)| *score >= self.config.primary_floor)
            .map(|(department, _)| *department)
            .unwrap_or(self.config.fallback);

        let supporting_departments: Vec<Department> = scores
            .iter()
            .filter(|(department, score)| {
                *department != primary_department && *score > self.config.secondary_floor
            })
            .map(|(department, _)| *department)
            .collect();

        let execution_mode = if supporting_departments.is_empty() {
            ExecutionMode::Single
        } else if supporting_departments
            .iter()
            .any(|d| self.rules.linked(primary_department, *d))
        {
            ExecutionMode::Sequential
        } else {
            ExecutionMode::Parallel
        };

        alog_debug!(
            "Routed to {} (+{:?}) mode={}",
            primary_department,
            supporting_departments,
            execution_mode
        );

        RoutePlan {
            primary_department,
            supporting_departments,
            scores,
            execution_mode,
        }
    }
}

impl Default for Router {
    fn default() -> Self {
        // The built-in table only holds literal keywords.
        Self::new(
            &RelevanceTable::default(),
            DependencyRules::default(),
            RouterConfig::default(),
        )
        .unwrap_or_else(|_| Self {
            cues: Vec::new(),
            rules: DependencyRules::default(),
            config: RouterConfig::default(),
        })
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("departments", &self.cues.len())
            .field("config", &self.config)
            .finish()
    }
}
