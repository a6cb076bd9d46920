//! Quality, timing and consistency merging.

use std::time::Duration;

use serde_json::json;

use atelier::core::{Department, TaskResult};
use atelier::orchestration::{AggregationMode, ExecuteOptions, ParallelExecutor, ResultAggregator};

use crate::fixtures::{failing_task, scored_result, sleeping_task};

/// Test: Half weight for the primary
/// Given a primary scored 0.90 and one supporting result scored 0.80
/// When aggregated in parallel mode
/// Then the overall score is 0.85
#[test]
fn test_primary_and_one_supporting_average() {
    let result = ResultAggregator::new().aggregate(
        &scored_result(Department::Character, 0.90, 100),
        &[scored_result(Department::Visual, 0.80, 100)],
        AggregationMode::Parallel,
    );
    assert!((result.overall_quality_score - 0.85).abs() < 1e-9);
    assert!(result.success);
    assert!(result.errors.is_empty());
}

/// Test: Execution time follows the mode
/// Given supporting times [2000, 1800] and a primary time of 1500
/// When aggregated in each mode
/// Then parallel reports the max and sequential the sum
#[test]
fn test_total_time_by_mode() {
    let primary = scored_result(Department::Character, 0.9, 1500);
    let supporting = [
        scored_result(Department::Visual, 0.8, 2000),
        scored_result(Department::Audio, 0.8, 1800),
    ];
    let aggregator = ResultAggregator::new();

    let parallel = aggregator.aggregate(&primary, &supporting, AggregationMode::Parallel);
    let sequential = aggregator.aggregate(&primary, &supporting, AggregationMode::Sequential);

    assert_eq!(parallel.total_execution_time_ms, 2000);
    assert_eq!(sequential.total_execution_time_ms, 5300);
    assert_eq!(parallel.overall_quality_score, sequential.overall_quality_score);
}

/// Test: Identity disagreement is reported as data
/// Given a character result for "aladdin" and a visual result for "jasmine"
/// When consistency is validated on "id"
/// Then the report is inconsistent with a populated issue
#[test]
fn test_identity_disagreement_reported() {
    let results = [
        TaskResult::succeeded(Department::Character).with_output(json!({ "id": "aladdin" })),
        TaskResult::succeeded(Department::Visual).with_output(json!({ "id": "jasmine" })),
    ];
    let report = ResultAggregator::new().validate_consistency(&results, "id");

    assert!(!report.consistent);
    assert!(!report.issues.is_empty());
    assert!(!report.issues[0].is_empty());
}

/// Test: Aggregating executor output
/// Given a phase where one supporting department fails
/// When its results are aggregated
/// Then success is false and the error is tagged with its department
#[tokio::test]
async fn test_aggregate_executor_results() {
    let options = ExecuteOptions::default()
        .continue_on_error(true)
        .with_timeout(Duration::from_secs(1));
    let results = ParallelExecutor::new()
        .execute_parallel(
            vec![
                sleeping_task(Department::Story, 10),
                failing_task(Department::Audio, "voice model unavailable"),
                sleeping_task(Department::Production, 30),
            ],
            &options,
        )
        .await
        .unwrap();

    let aggregated =
        ResultAggregator::new().aggregate(&results[0], &results[1..], AggregationMode::Parallel);

    assert!(!aggregated.success);
    assert_eq!(
        aggregated.errors,
        vec!["[audio] voice model unavailable".to_string()]
    );
    // story and production report 0.8; the failed audio result has no score
    assert!((aggregated.overall_quality_score - 0.8).abs() < 1e-9);
    assert!(aggregated.total_execution_time_ms >= 30);
    assert_eq!(
        aggregated.supporting_departments,
        vec![Department::Audio, Department::Production]
    );
}
