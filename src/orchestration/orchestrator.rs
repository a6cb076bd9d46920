//! End-to-end request orchestration.
//!
//! The [`Orchestrator`] routes a request, builds the dependency graph for the
//! chosen departments, runs each execution phase through the
//! [`ParallelExecutor`] and aggregates the results, walking an
//! [`OrchestrationState`] through its lifecycle as it goes.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;

use crate::config::Config;
use crate::core::{Department, DependencyResolver, ExecutionPhase, TaskFactories, TaskResult};
use crate::error::{Error, Result};
use crate::orchestration::aggregator::{
    AggregatedResult, AggregationMode, ConsistencyReport, ResultAggregator,
};
use crate::orchestration::executor::{ExecuteOptions, ParallelExecutor};
use crate::orchestration::pool::WorkerPool;
use crate::orchestration::router::{ExecutionMode, RoutePlan, Router};
use crate::workflow::{OrchestrationPhase, OrchestrationState, PhaseHistoryEntry, RequestId};
use crate::{alog, alog_error};

/// Progress notifications for one orchestrated request.
#[derive(Debug, Clone, PartialEq)]
pub enum OrchestratorEvent {
    Routed {
        request_id: RequestId,
        plan: RoutePlan,
    },
    GraphBuilt {
        request_id: RequestId,
        phases: Vec<ExecutionPhase>,
    },
    PhaseStarted {
        request_id: RequestId,
        phase: usize,
        departments: Vec<Department>,
    },
    TaskCompleted {
        request_id: RequestId,
        department: Department,
        quality_score: Option<f64>,
    },
    TaskFailed {
        request_id: RequestId,
        department: Department,
        errors: Vec<String>,
    },
    Done {
        request_id: RequestId,
        result: AggregatedResult,
    },
    Failed {
        request_id: RequestId,
        reason: String,
    },
}

/// Everything known about a request once it reaches a terminal phase.
#[derive(Debug, Clone, Serialize)]
pub struct OrchestrationOutcome {
    pub request_id: RequestId,
    pub plan: RoutePlan,
    /// Empty when the graph could not be built.
    pub phases: Vec<ExecutionPhase>,
    pub critical_path: Vec<Department>,
    /// Per-task results in execution order.
    pub results: Vec<TaskResult>,
    /// Present once aggregation ran.
    pub aggregated: Option<AggregatedResult>,
    pub consistency: Option<ConsistencyReport>,
    pub final_phase: OrchestrationPhase,
    pub failure: Option<String>,
    pub history: Vec<PhaseHistoryEntry>,
}

impl OrchestrationOutcome {
    fn new(request_id: RequestId, plan: RoutePlan) -> Self {
        Self {
            request_id,
            plan,
            phases: Vec::new(),
            critical_path: Vec::new(),
            results: Vec::new(),
            aggregated: None,
            consistency: None,
            final_phase: OrchestrationPhase::Routed,
            failure: None,
            history: Vec::new(),
        }
    }

    fn seal(mut self, state: OrchestrationState) -> Self {
        self.final_phase = state.current_phase();
        self.failure = state.failure().map(str::to_string);
        self.history = state.history().to_vec();
        self
    }

    pub fn is_done(&self) -> bool {
        self.final_phase == OrchestrationPhase::Done
    }

    pub fn result(&self, department: Department) -> Option<&TaskResult> {
        self.results.iter().find(|r| r.department == department)
    }
}

/// Drives requests from routing to an aggregated outcome.
#[derive(Debug)]
pub struct Orchestrator {
    router: Router,
    resolver: DependencyResolver,
    executor: ParallelExecutor,
    aggregator: ResultAggregator,
    options: ExecuteOptions,
    identity_field: Option<String>,
    event_tx: Option<mpsc::Sender<OrchestratorEvent>>,
}

impl Orchestrator {
    pub fn new(
        router: Router,
        resolver: DependencyResolver,
        executor: ParallelExecutor,
        options: ExecuteOptions,
    ) -> Self {
        Self {
            router,
            resolver,
            executor,
            aggregator: ResultAggregator::new(),
            options,
            identity_field: None,
            event_tx: None,
        }
    }

    /// Build an orchestrator backed by a shared worker pool sized from `config`.
    pub fn from_config(config: &Config) -> Result<Self> {
        let rules = config.dependency_rules()?;
        let router = Router::new(&config.relevance_table()?, rules.clone(), config.router.clone())?;
        let pool = Arc::new(WorkerPool::new(config.pool.max_concurrent));
        let mut orchestrator = Self::new(
            router,
            DependencyResolver::new(rules),
            ParallelExecutor::with_pool(pool),
            config.execute_options(),
        );
        orchestrator.identity_field = config.identity_field.clone();
        Ok(orchestrator)
    }

    /// Compare this output field across results after aggregation.
    pub fn with_identity_field(mut self, field: impl Into<String>) -> Self {
        self.identity_field = Some(field.into());
        self
    }

    /// Emit [`OrchestratorEvent`]s on `event_tx`. Events are dropped if the channel is full.
    pub fn with_events(mut self, event_tx: mpsc::Sender<OrchestratorEvent>) -> Self {
        self.event_tx = Some(event_tx);
        self
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn resolver(&self) -> &DependencyResolver {
        &self.resolver
    }

    pub fn options(&self) -> &ExecuteOptions {
        &self.options
    }

    /// Run `request` through every department it needs.
    ///
    /// A circular dependency or a strict-mode task failure ends the request
    /// in the `Failed` phase and is reported in the returned outcome.
    ///
    /// # Errors
    /// Returns `MissingFactory` before any work starts if a routed
    /// department has no registered factory.
    pub async fn orchestrate(
        &self,
        request: &str,
        factories: &TaskFactories,
    ) -> Result<OrchestrationOutcome> {
        let request_id = RequestId::new();
        let plan = self.router.route(request);
        let mut state = OrchestrationState::new(request_id);
        alog!(
            @request_id.short();
            "Routed to {} with {:?} ({})",
            plan.primary_department,
            plan.supporting_departments,
            plan.execution_mode
        );
        self.emit(OrchestratorEvent::Routed {
            request_id,
            plan: plan.clone(),
        });

        let departments = plan.departments();
        if let Some(missing) = departments.iter().find(|d| !factories.contains(**d)) {
            return Err(Error::MissingFactory(*missing));
        }

        let mut outcome = OrchestrationOutcome::new(request_id, plan);
        let graph = self.resolver.build_graph(departments);
        if let Some(cycle) = graph.cycle() {
            let reason = Error::CircularDependency {
                cycle: cycle.to_vec(),
            }
            .to_string();
            return self.fail(outcome, state, reason);
        }
        outcome.phases = self.resolver.optimize_execution_order(&graph)?;
        outcome.critical_path = self.resolver.get_critical_path(&graph)?;
        state.transition(OrchestrationPhase::GraphBuilt)?;
        self.emit(OrchestratorEvent::GraphBuilt {
            request_id,
            phases: outcome.phases.clone(),
        });

        let request: Arc<str> = Arc::from(request);
        let phases = outcome.phases.clone();
        for (index, phase) in phases.iter().enumerate() {
            state.transition(OrchestrationPhase::PhaseExecuting { phase: index })?;
            alog!(@request_id.short(); "Phase {}: {:?}", index, phase.departments);
            self.emit(OrchestratorEvent::PhaseStarted {
                request_id,
                phase: index,
                departments: phase.departments.clone(),
            });

            let tasks = phase
                .departments
                .iter()
                .map(|department| factories.build(*department, &request))
                .collect::<Result<Vec<_>>>()?;

            match self.executor.execute_parallel(tasks, &self.options).await {
                Ok(results) => {
                    for result in &results {
                        self.emit_task(request_id, result);
                    }
                    outcome.results.extend(results);
                }
                Err(e) => {
                    if let Error::TaskFailed { department, errors } = &e {
                        self.emit(OrchestratorEvent::TaskFailed {
                            request_id,
                            department: *department,
                            errors: errors.clone(),
                        });
                    }
                    return self.fail(outcome, state, e.to_string());
                }
            }
        }

        state.transition(OrchestrationPhase::Aggregating)?;
        let primary_department = outcome.plan.primary_department;
        let Some(primary) = outcome.result(primary_department).cloned() else {
            let reason = format!("no result for primary department {}", primary_department);
            return self.fail(outcome, state, reason);
        };
        let supporting: Vec<TaskResult> = outcome
            .plan
            .supporting_departments
            .iter()
            .filter_map(|d| outcome.result(*d).cloned())
            .collect();
        let mode = match outcome.plan.execution_mode {
            ExecutionMode::Sequential => AggregationMode::Sequential,
            ExecutionMode::Single | ExecutionMode::Parallel => AggregationMode::Parallel,
        };
        let mut aggregated = self.aggregator.aggregate(&primary, &supporting, mode);
        if mode == AggregationMode::Sequential {
            // Departments sharing a phase overlapped; only the phases add up.
            aggregated.total_execution_time_ms = phased_execution_time(&outcome);
        }
        outcome.consistency = self
            .identity_field
            .as_deref()
            .map(|field| self.aggregator.validate_consistency(&outcome.results, field));

        state.transition(OrchestrationPhase::Done)?;
        alog!(
            @request_id.short();
            "Done: success={} quality={:.2} time={}ms",
            aggregated.success,
            aggregated.overall_quality_score,
            aggregated.total_execution_time_ms
        );
        self.emit(OrchestratorEvent::Done {
            request_id,
            result: aggregated.clone(),
        });
        outcome.aggregated = Some(aggregated);
        Ok(outcome.seal(state))
    }

    /// Wait for pooled work to finish and refuse new work.
    pub async fn shutdown(&self) -> Result<()> {
        match self.executor.pool() {
            Some(pool) => pool.shutdown().await,
            None => Ok(()),
        }
    }

    fn fail(
        &self,
        outcome: OrchestrationOutcome,
        mut state: OrchestrationState,
        reason: String,
    ) -> Result<OrchestrationOutcome> {
        alog_error!(@outcome.request_id.short(); "Failed: {}", reason);
        state.fail(reason.clone())?;
        self.emit(OrchestratorEvent::Failed {
            request_id: outcome.request_id,
            reason,
        });
        Ok(outcome.seal(state))
    }

    fn emit_task(&self, request_id: RequestId, result: &TaskResult) {
        let event = if result.success {
            OrchestratorEvent::TaskCompleted {
                request_id,
                department: result.department,
                quality_score: result.quality_score,
            }
        } else {
            OrchestratorEvent::TaskFailed {
                request_id,
                department: result.department,
                errors: result.errors.clone(),
            }
        };
        self.emit(event);
    }

    fn emit(&self, event: OrchestratorEvent) {
        if let Some(tx) = &self.event_tx {
            let _ = tx.try_send(event);
        }
    }
}

/// Wall time of the executed phases, each as long as its slowest department.
fn phased_execution_time(outcome: &OrchestrationOutcome) -> u64 {
    outcome
        .phases
        .iter()
        .map(|phase| {
            phase
                .departments
                .iter()
                .filter_map(|d| outcome.result(*d).and_then(|r| r.execution_time_ms))
                .max()
                .unwrap_or(0)
        })
        .fold(0u64, u64::saturating_add)
}

impl Default for Orchestrator {
    fn default() -> Self {
        Self::new(
            Router::default(),
            DependencyResolver::default(),
            ParallelExecutor::new(),
            ExecuteOptions::default(),
        )
    }
}
