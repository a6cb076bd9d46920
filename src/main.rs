use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use serde_json::json;

use atelier::config::Config;
use atelier::core::{Department, TaskFactories, TaskOutput};
use atelier::orchestration::Orchestrator;
use atelier::{alog, Result};

/// Atelier - multi-department task orchestration
#[derive(Parser, Debug)]
#[command(name = "atelier")]
#[command(version, about, long_about = None)]
#[command(after_help = "ENVIRONMENT:\n    ATELIER_DEBUG=1     Enable debug logging (alternative to --debug)")]
pub struct Cli {
    /// Enable debug logging (writes to ~/.atelier/atelier.log)
    #[arg(short = 'd', long, global = true)]
    pub debug: bool,

    /// Config file (defaults to ~/.atelier/atelier.toml)
    #[arg(short = 'c', long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Show which departments a request is routed to
    Route {
        /// The request in natural language
        request: String,
    },

    /// Show execution phases and the critical path for a request
    Plan {
        /// The request in natural language
        request: String,
    },

    /// Run a request end to end with stand-in departments
    Simulate {
        /// The request in natural language
        request: String,

        /// Time each stand-in department takes
        #[arg(long, default_value_t = 100)]
        latency_ms: u64,

        /// Departments whose stand-in fails (repeatable)
        #[arg(long = "fail", value_name = "DEPARTMENT")]
        fail: Vec<Department>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    atelier::log::init_with_debug(cli.debug);

    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    match cli.command {
        Command::Route { request } => run_route(&config, &request),
        Command::Plan { request } => run_plan(&config, &request),
        Command::Simulate {
            request,
            latency_ms,
            fail,
        } => run_simulate(&config, &request, latency_ms, &fail),
    }
}

fn run_route(config: &Config, request: &str) -> Result<()> {
    alog!("Route command: request={:?}", request);
    let orchestrator = Orchestrator::from_config(config)?;
    let plan = orchestrator.router().route(request);
    println!("{}", serde_json::to_string_pretty(&plan)?);
    Ok(())
}

fn run_plan(config: &Config, request: &str) -> Result<()> {
    alog!("Plan command: request={:?}", request);
    let orchestrator = Orchestrator::from_config(config)?;
    let plan = orchestrator.router().route(request);
    let resolver = orchestrator.resolver();
    let graph = resolver.resolve(plan.departments())?;

    let output = json!({
        "primary_department": plan.primary_department,
        "supporting_departments": plan.supporting_departments,
        "execution_mode": plan.execution_mode,
        "phases": resolver.optimize_execution_order(&graph)?,
        "critical_path": resolver.get_critical_path(&graph)?,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn run_simulate(config: &Config, request: &str, latency_ms: u64, fail: &[Department]) -> Result<()> {
    alog!(
        "Simulate command: request={:?}, latency_ms={}, fail={:?}",
        request,
        latency_ms,
        fail
    );
    let factories = stand_in_factories(latency_ms, fail);

    let rt = tokio::runtime::Runtime::new()?;
    let outcome = rt.block_on(async {
        let orchestrator = Orchestrator::from_config(config)?;
        let outcome = orchestrator.orchestrate(request, &factories).await?;
        orchestrator.shutdown().await?;
        Ok::<_, atelier::Error>(outcome)
    })?;

    println!("{}", serde_json::to_string_pretty(&outcome)?);
    if let Some(aggregated) = &outcome.aggregated {
        let verdict = if config.quality.passes(aggregated.overall_quality_score) {
            "passes"
        } else {
            "below"
        };
        eprintln!(
            "quality {:.2} {} threshold {:.2}",
            aggregated.overall_quality_score, verdict, config.quality.min_overall
        );
    }
    Ok(())
}

/// Departments that sleep for `latency_ms` and echo a shared identity.
fn stand_in_factories(latency_ms: u64, fail: &[Department]) -> TaskFactories {
    Department::ALL
        .into_iter()
        .fold(TaskFactories::new(), |factories, department| {
            let fails = fail.contains(&department);
            factories.register(department, move |request| async move {
                tokio::time::sleep(Duration::from_millis(latency_ms)).await;
                if fails {
                    return Err(format!("{} stand-in failed", department));
                }
                Ok(TaskOutput::new(json!({
                    "id": "subject-1",
                    "department": department,
                    "request": &*request,
                }))
                .with_quality(0.8))
            })
        })
}
