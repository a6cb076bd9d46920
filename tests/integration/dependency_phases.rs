//! Phase and cycle properties over every department subset.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde_json::json;

use atelier::core::{Department, DependencyResolver, DependencyRules, Task, TaskOutput};
use atelier::orchestration::{ExecuteOptions, ParallelExecutor};
use atelier::Error;

use crate::fixtures::department_subsets;

/// Test: Optimized phases cover each requested department exactly once
/// Given every subset of departments and the standard rules
/// When the optimized execution order is computed
/// Then each department appears once, after all of its prerequisites
#[test]
fn test_optimized_phases_cover_every_subset() {
    let resolver = DependencyResolver::default();

    for subset in department_subsets() {
        let graph = resolver.build_graph(subset.iter().copied());
        assert!(!graph.has_circular_dependency());

        let phases = resolver.optimize_execution_order(&graph).unwrap();
        assert!(phases.len() <= graph.phases().unwrap().len().max(1));

        let mut phase_of = HashMap::new();
        for phase in &phases {
            for department in &phase.departments {
                assert!(
                    phase_of.insert(*department, phase.phase).is_none(),
                    "{} scheduled twice for {:?}",
                    department,
                    subset
                );
            }
            assert_eq!(phase.can_run_in_parallel, phase.departments.len() > 1);
        }
        assert_eq!(phase_of.len(), subset.len());

        for department in &subset {
            for prerequisite in resolver.rules().prerequisites(*department) {
                if let Some(before) = phase_of.get(&prerequisite) {
                    assert!(before < &phase_of[department]);
                }
            }
        }
    }
}

/// Test: Cyclic rules never yield phases
/// Given rules where story and audio require each other
/// When any subset containing both is resolved
/// Then the graph is flagged and phase computation fails
#[test]
fn test_cyclic_subsets_never_yield_phases() {
    let rules = DependencyRules::default()
        .with_rule(Department::Story, [Department::Audio])
        .with_rule(Department::Audio, [Department::Story]);
    let resolver = DependencyResolver::new(rules);

    for subset in department_subsets() {
        let cyclic = subset.contains(&Department::Story) && subset.contains(&Department::Audio);
        let graph = resolver.build_graph(subset.iter().copied());

        assert_eq!(graph.has_circular_dependency(), cyclic, "subset {:?}", subset);
        if cyclic {
            assert!(matches!(graph.phases(), Err(Error::CircularDependency { .. })));
            assert!(resolver.optimize_execution_order(&graph).is_err());
            assert!(resolver.get_critical_path(&graph).is_err());
            assert!(resolver.resolve(subset.iter().copied()).is_err());
        } else {
            assert!(graph.phases().is_ok());
        }
    }
}

/// Test: Critical path of the full set
/// Given all six departments
/// When the critical path is computed
/// Then it follows the longest chain from character
#[test]
fn test_full_set_critical_path() {
    let resolver = DependencyResolver::default();
    let graph = resolver.resolve(Department::ALL).unwrap();
    let path = resolver.get_critical_path(&graph).unwrap();

    assert_eq!(path.len(), 3);
    assert_eq!(path[0], Department::Character);
    for pair in path.windows(2) {
        assert!(resolver.rules().depends_on(pair[1], pair[0]));
    }
}

/// Test: Phases executed as batches finish in dependency order
/// Given the full department set resolved into phases
/// When each phase runs as one executor batch
/// Then every department starts after all of its prerequisites finished
#[tokio::test]
async fn test_batched_phases_respect_dependencies() {
    let resolver = DependencyResolver::default();
    let graph = resolver.resolve(Department::ALL).unwrap();
    let phases = resolver.optimize_execution_order(&graph).unwrap();

    let timeline: Arc<Mutex<HashMap<Department, (Instant, Instant)>>> = Arc::default();
    let batches: Vec<Vec<Task>> = phases
        .iter()
        .map(|phase| {
            phase
                .departments
                .iter()
                .map(|department| {
                    let department = *department;
                    let timeline = Arc::clone(&timeline);
                    Task::new(department, move || {
                        let timeline = Arc::clone(&timeline);
                        async move {
                            let started = Instant::now();
                            tokio::time::sleep(Duration::from_millis(20)).await;
                            timeline
                                .lock()
                                .unwrap()
                                .insert(department, (started, Instant::now()));
                            Ok::<_, String>(TaskOutput::new(json!(null)))
                        }
                    })
                })
                .collect()
        })
        .collect();

    let results = ParallelExecutor::new()
        .execute_batched(batches, &ExecuteOptions::default())
        .await
        .unwrap();
    assert_eq!(results.len(), 6);

    let timeline = timeline.lock().unwrap();
    for department in Department::ALL {
        let (started, _) = timeline[&department];
        for prerequisite in resolver.rules().prerequisites(department) {
            let (_, finished) = timeline[&prerequisite];
            assert!(finished <= started, "{} started before {}", department, prerequisite);
        }
    }
}
