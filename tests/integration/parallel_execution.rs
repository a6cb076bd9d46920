//! Concurrency, timeout and retry behavior of the parallel executor.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use atelier::core::Department;
use atelier::orchestration::{ExecuteOptions, ParallelExecutor, WorkerPool};
use atelier::Error;

use crate::fixtures::{failing_task, flaky_task, sleeping_task};

/// Test: Independent tasks overlap
/// Given six tasks of ~100ms each
/// When executed in parallel
/// Then the batch completes in well under the serial time
#[tokio::test]
async fn test_six_independent_tasks_complete_in_one_task_time() {
    let tasks = Department::ALL
        .into_iter()
        .map(|department| sleeping_task(department, 100))
        .collect();

    let started = Instant::now();
    let results = ParallelExecutor::new()
        .execute_parallel(tasks, &ExecuteOptions::default())
        .await
        .unwrap();

    assert!(started.elapsed() < Duration::from_millis(150), "took {:?}", started.elapsed());
    assert_eq!(results.len(), 6);
    for (result, department) in results.iter().zip(Department::ALL) {
        assert_eq!(result.department, department);
        assert!(result.success);
        assert!(result.execution_time_ms.unwrap() >= 100);
    }
}

/// Test: Per-task timeout
/// Given a 1000ms timeout and a task sleeping 5000ms
/// When executed with continue_on_error
/// Then the task fails with a "timed out" error after about a second
#[tokio::test]
async fn test_timeout_reports_timed_out() {
    let options = ExecuteOptions::default()
        .with_timeout(Duration::from_millis(1000))
        .continue_on_error(true);
    let tasks = vec![
        sleeping_task(Department::Production, 5000),
        sleeping_task(Department::Story, 10),
    ];

    let started = Instant::now();
    let results = ParallelExecutor::new()
        .execute_parallel(tasks, &options)
        .await
        .unwrap();

    assert!(started.elapsed() < Duration::from_millis(1500));
    assert!(!results[0].success);
    assert!(results[0].errors.iter().any(|e| e.contains("timed out")));
    assert!(results[1].success);
}

/// Test: Retry until success
/// Given a task that fails twice then succeeds, and three retries allowed
/// When executed
/// Then it succeeds after exactly three invocations with no trace of failures
#[tokio::test]
async fn test_retry_invokes_exactly_until_success() {
    let (task, calls) = flaky_task(Department::Character, 2);
    let options = ExecuteOptions::default().with_retries(3);

    let results = ParallelExecutor::new()
        .execute_parallel(vec![task], &options)
        .await
        .unwrap();

    assert!(results[0].success);
    assert!(results[0].errors.is_empty());
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

/// Test: Timed-out attempts are retried
/// Given a 30ms timeout and one retry
/// When a slow task keeps timing out
/// Then both attempts fail and the final error names the timeout
#[tokio::test]
async fn test_timed_out_attempts_are_retried() {
    let options = ExecuteOptions::default()
        .with_timeout(Duration::from_millis(30))
        .with_retries(1)
        .continue_on_error(true);

    let started = Instant::now();
    let results = ParallelExecutor::new()
        .execute_parallel(vec![sleeping_task(Department::Audio, 1000)], &options)
        .await
        .unwrap();

    assert!(started.elapsed() >= Duration::from_millis(60));
    assert!(results[0].is_timeout());
    assert!(results[0].execution_time_ms.unwrap() >= 60);
}

/// Test: Strict mode rejects the call
/// Given one failing task among successful ones
/// When executed without continue_on_error
/// Then the whole call fails with that task's error
#[tokio::test]
async fn test_strict_mode_rejects_whole_call() {
    let tasks = vec![
        sleeping_task(Department::Character, 20),
        failing_task(Department::Visual, "palette missing"),
        sleeping_task(Department::Audio, 20),
    ];

    let err = ParallelExecutor::new()
        .execute_parallel(tasks, &ExecuteOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::TaskFailed { department: Department::Visual, .. }));
    assert!(err.to_string().contains("palette missing"));
}

/// Test: Continue mode keeps order and every outcome
/// Given mixed failing and succeeding tasks of different durations
/// When executed with continue_on_error
/// Then results match input order and failures carry errors
#[tokio::test]
async fn test_continue_mode_returns_full_ordered_list() {
    let tasks = vec![
        sleeping_task(Department::Story, 50),
        failing_task(Department::Visual, "palette missing"),
        sleeping_task(Department::Audio, 5),
    ];
    let options = ExecuteOptions::default().continue_on_error(true);

    let results = ParallelExecutor::new()
        .execute_parallel(tasks, &options)
        .await
        .unwrap();

    let departments: Vec<_> = results.iter().map(|r| r.department).collect();
    assert_eq!(
        departments,
        vec![Department::Story, Department::Visual, Department::Audio]
    );
    assert_eq!(results[1].errors, vec!["palette missing".to_string()]);
    assert!(results[0].success && results[2].success);
}

/// Test: Batches run one after another
/// Given two batches of 50ms tasks
/// When executed batched
/// Then total time is roughly the sum of batch times
#[tokio::test]
async fn test_batches_are_sequential() {
    let batches = vec![
        vec![
            sleeping_task(Department::Character, 50),
            sleeping_task(Department::Story, 50),
        ],
        vec![
            sleeping_task(Department::Visual, 50),
            sleeping_task(Department::Audio, 50),
        ],
    ];

    let started = Instant::now();
    let results = ParallelExecutor::new()
        .execute_batched(batches, &ExecuteOptions::default())
        .await
        .unwrap();

    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(100));
    assert!(elapsed < Duration::from_millis(190));
    assert_eq!(results.len(), 4);
}

/// Test: A shared pool bounds concurrency across executors
/// Given a pool of two slots shared by two executors
/// When both run two 50ms tasks at once
/// Then the four tasks take two rounds
#[tokio::test]
async fn test_shared_pool_bounds_two_executors() {
    let pool = Arc::new(WorkerPool::new(2));
    let first = ParallelExecutor::with_pool(Arc::clone(&pool));
    let second = ParallelExecutor::with_pool(Arc::clone(&pool));
    let options = ExecuteOptions::default();

    let started = Instant::now();
    let (a, b) = tokio::join!(
        first.execute_parallel(
            vec![
                sleeping_task(Department::Character, 50),
                sleeping_task(Department::Story, 50),
            ],
            &options,
        ),
        second.execute_parallel(
            vec![
                sleeping_task(Department::Visual, 50),
                sleeping_task(Department::Audio, 50),
            ],
            &options,
        ),
    );

    assert!(started.elapsed() >= Duration::from_millis(100));
    assert_eq!(a.unwrap().len() + b.unwrap().len(), 4);
    assert_eq!(pool.metrics().active, 0);
    assert_eq!(pool.metrics().queued, 0);
}
