//! Merging department results into one outcome.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::alog_debug;
use crate::core::{Department, TaskResult};

/// Weight of the primary result in the overall quality score.
pub const PRIMARY_WEIGHT: f64 = 0.5;

/// How the contributing results were produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationMode {
    /// Results ran concurrently; total time is the longest one.
    Parallel,
    /// Results ran one after another; total time is the sum.
    Sequential,
}

/// Combined outcome of a primary result and its supporting results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedResult {
    pub success: bool,
    pub overall_quality_score: f64,
    pub total_execution_time_ms: u64,
    /// Every contributing error, tagged `[department]`, primary first.
    pub errors: Vec<String>,
    pub primary_department: Department,
    pub supporting_departments: Vec<Department>,
    pub mode: AggregationMode,
}

/// Outcome of an identity-field comparison across results.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsistencyReport {
    pub consistent: bool,
    pub issues: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ResultAggregator;

impl ResultAggregator {
    pub fn new() -> Self {
        Self
    }

    /// Merge `primary` with `supporting` into one [`AggregatedResult`].
    ///
    /// The primary result carries half of the quality weight and the other
    /// half is split evenly across the supporting results. Results without a
    /// score drop out of the weighting rather than counting as zero.
    pub fn aggregate(
        &self,
        primary: &TaskResult,
        supporting: &[TaskResult],
        mode: AggregationMode,
    ) -> AggregatedResult {
        let supporting_weight = if supporting.is_empty() {
            0.0
        } else {
            (1.0 - PRIMARY_WEIGHT) / supporting.len() as f64
        };

        let weighted = std::iter::once((PRIMARY_WEIGHT, primary.quality_score))
            .chain(supporting.iter().map(|r| (supporting_weight, r.quality_score)))
            .filter_map(|(weight, score)| score.map(|s| (weight, s)));
        let (weight_sum, score_sum) = weighted.fold((0.0, 0.0), |(w, s), (weight, score)| {
            (w + weight, s + weight * score)
        });
        let overall_quality_score = if weight_sum > 0.0 {
            (score_sum / weight_sum).clamp(0.0, 1.0)
        } else {
            0.0
        };

        let all = || std::iter::once(primary).chain(supporting.iter());
        let times = all().map(|r| r.execution_time_ms.unwrap_or(0));
        let total_execution_time_ms = match mode {
            AggregationMode::Parallel => times.max().unwrap_or(0),
            AggregationMode::Sequential => times.fold(0u64, u64::saturating_add),
        };

        let errors: Vec<String> = all()
            .flat_map(|r| r.errors.iter().map(move |e| format!("[{}] {}", r.department, e)))
            .collect();

        let result = AggregatedResult {
            success: all().all(|r| r.success),
            overall_quality_score,
            total_execution_time_ms,
            errors,
            primary_department: primary.department,
            supporting_departments: supporting.iter().map(|r| r.department).collect(),
            mode,
        };
        alog_debug!(
            "Aggregated {} results: success={} quality={:.3} time={}ms",
            supporting.len() + 1,
            result.success,
            result.overall_quality_score,
            result.total_execution_time_ms
        );
        result
    }

    /// Compare `field` across every result output.
    ///
    /// `field` is either a top-level key (`"id"`) or a JSON pointer
    /// (`"/character/id"`). Results whose output lacks the field are skipped.
    pub fn validate_consistency(&self, results: &[TaskResult], field: &str) -> ConsistencyReport {
        let mut reference: Option<(Department, &Value)> = None;
        let mut issues = Vec::new();

        for result in results {
            let Some(value) = result.output.as_ref().and_then(|o| lookup(o, field)) else {
                continue;
            };
            match reference {
                None => reference = Some((result.department, value)),
                Some((first, expected)) if expected != value => issues.push(format!(
                    "{} has {} = {} but {} has {}",
                    result.department, field, value, first, expected
                )),
                Some(_) => {}
            }
        }

        ConsistencyReport {
            consistent: issues.is_empty(),
            issues,
        }
    }
}

fn lookup<'a>(output: &'a Value, field: &str) -> Option<&'a Value> {
    if field.starts_with('/') {
        output.pointer(field)
    } else {
        output.get(field)
    }
}
