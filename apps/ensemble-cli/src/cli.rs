use std::fs;
use std::io::{self, Write as _};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

use ensemble::agents::{AgentCatalog, AgentKind, AgentProfile, SimulatedInvoker};
use ensemble::config::{load_config, EnsembleConfig, ObservabilityConfig};
use ensemble::core::executor::{LatencyPolicy, PlanExecutor};
use ensemble::core::types::{Plan, StateMutation};
use ensemble::runtime::{
    BroadcastStateSink, ScriptedPlanner, SessionConfig, SessionOutcome, SessionRunner,
};

#[derive(Debug, Parser)]
#[command(name = "ensemble", about = "Ensemble CLI")]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Execute plan files; extra files serve continuation re-plans in order
    Run(RunArgs),
    /// Inspect or export the agent catalog
    Agents(AgentsArgs),
}

#[derive(Debug, Args, Clone)]
struct RunArgs {
    #[arg(long)]
    config: Option<PathBuf>,
    /// Goal label for the session; the first plan's name by default
    #[arg(long)]
    goal: Option<String>,
    #[arg(value_name = "PLAN_FILE", required = true)]
    plans: Vec<PathBuf>,
}

#[derive(Debug, Args, Clone)]
struct AgentsArgs {
    #[arg(long)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: AgentsCommand,
}

#[derive(Debug, Subcommand, Clone)]
enum AgentsCommand {
    /// Print the active agent catalog
    List,
    /// Write the active profile to a JSON file
    Export {
        #[arg(value_name = "PATH")]
        path: PathBuf,
    },
}

impl Cli {
    pub async fn run(self) -> anyhow::Result<()> {
        match self.command {
            Command::Run(args) => run_plans(args).await,
            Command::Agents(args) => match args.command {
                AgentsCommand::List => list_agents(args.config.as_deref()),
                AgentsCommand::Export { path } => export_profile(args.config.as_deref(), &path),
            },
        }
    }
}

async fn run_plans(args: RunArgs) -> anyhow::Result<()> {
    let config = load_settings(args.config.as_deref())?;
    init_tracing(&config.observability);

    let catalog = load_catalog(&config)?;
    let plans = args
        .plans
        .iter()
        .map(|path| load_plan(path))
        .collect::<anyhow::Result<Vec<Plan>>>()?;
    let lead = plans.first().context("at least one plan file is required")?;
    let goal = args.goal.unwrap_or_else(|| lead.name.clone());

    tracing::info!(
        plans = plans.len(),
        agents = catalog.len(),
        goal = %goal,
        "starting session"
    );

    let sink = Arc::new(BroadcastStateSink::default());
    let trace_printer = spawn_trace_printer(sink.subscribe());

    let invoker = Arc::new(SimulatedInvoker::new(catalog.clone()));
    let latency = LatencyPolicy::new(
        Duration::from_millis(config.executor.latency_floor_ms),
        Duration::from_millis(config.executor.latency_jitter_ms),
    );
    let executor = PlanExecutor::new(invoker)
        .with_latency(latency)
        .with_state_sink(sink);
    let session = SessionConfig {
        max_cycles: config.session.max_cycles,
        required_agents: config.session.required_agents.clone(),
    };
    let planner = Arc::new(ScriptedPlanner::new(plans));
    let runner = SessionRunner::with_config(planner, executor, catalog, session);

    let mut outcome = runner.run_goal(&goal).await?;
    loop {
        match outcome {
            SessionOutcome::AwaitingInput {
                turn,
                step_id,
                prompt,
            } => {
                println!();
                println!("Step \"{step_id}\" needs input: {prompt}");
                match tokio::task::spawn_blocking(read_answer).await?? {
                    Some(answer) => {
                        outcome = runner.resume_with_input(turn, &answer).await?;
                    }
                    None => {
                        drain_trace(runner, trace_printer).await;
                        println!("Stdin closed; the run stays paused at step \"{step_id}\".");
                        return Ok(());
                    }
                }
            }
            SessionOutcome::Completed {
                turn,
                output,
                cycles,
            } => {
                drain_trace(runner, trace_printer).await;
                println!();
                println!("Run \"{}\" completed in {cycles} cycle(s).", turn.plan.name);
                println!("{}", serde_json::to_string_pretty(&output)?);
                return Ok(());
            }
            SessionOutcome::Failed {
                turn: _,
                step_id,
                error,
            } => {
                drain_trace(runner, trace_printer).await;
                anyhow::bail!("step \"{step_id}\" failed: {error}");
            }
        }
    }
}

/// Stream trace events from the run as JSON lines.
fn spawn_trace_printer(
    mut updates: tokio::sync::broadcast::Receiver<StateMutation>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match updates.recv().await {
                Ok(StateMutation::TraceAppended { event }) => {
                    match serde_json::to_string(&event) {
                        Ok(line) => println!("{line}"),
                        Err(error) => tracing::warn!(%error, "unprintable trace event"),
                    }
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "trace stream lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}

/// Drop the last sink holder and wait for the printer to flush.
async fn drain_trace(runner: SessionRunner, trace_printer: JoinHandle<()>) {
    drop(runner);
    let _ = trace_printer.await;
}

fn list_agents(config: Option<&Path>) -> anyhow::Result<()> {
    let config = load_settings(config)?;
    let catalog = load_catalog(&config)?;

    println!("{} agent(s) in the active profile:", catalog.len());
    for agent in catalog.agents() {
        let kind = match agent.kind {
            AgentKind::Mock => "mock",
            AgentKind::Real => "real",
        };
        let mut flags = Vec::new();
        if agent.system {
            flags.push("system");
        }
        if !agent.enabled {
            flags.push("disabled");
        }
        let flags = if flags.is_empty() {
            String::new()
        } else {
            format!(" [{}]", flags.join(", "))
        };
        println!("  {:<40} {:<4} {}{}", agent.id, kind, agent.name, flags);
        println!("      {}", agent.description);
    }
    Ok(())
}

fn export_profile(config: Option<&Path>, path: &Path) -> anyhow::Result<()> {
    let config = load_settings(config)?;
    let profile = match &config.agents.profile_path {
        Some(source) => AgentProfile::load(source)
            .with_context(|| format!("loading agent profile {source}"))?,
        None => AgentProfile::default_profile(),
    };
    profile
        .save(path)
        .with_context(|| format!("writing agent profile {}", path.display()))?;
    println!(
        "Wrote profile \"{}\" ({} agents) to {}",
        profile.name,
        profile.agents.len(),
        path.display()
    );
    Ok(())
}

fn load_settings(path: Option<&Path>) -> anyhow::Result<EnsembleConfig> {
    match path {
        Some(path) => {
            load_config(path).with_context(|| format!("loading config {}", path.display()))
        }
        None => Ok(EnsembleConfig::default()),
    }
}

fn load_catalog(config: &EnsembleConfig) -> anyhow::Result<AgentCatalog> {
    match &config.agents.profile_path {
        Some(path) => {
            let profile = AgentProfile::load(path)
                .with_context(|| format!("loading agent profile {path}"))?;
            Ok(AgentCatalog::from_profile(&profile))
        }
        None => Ok(AgentCatalog::with_default_agents()),
    }
}

fn load_plan(path: &Path) -> anyhow::Result<Plan> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading plan file {}", path.display()))?;
    let plan: Plan = serde_json::from_str(&content)
        .with_context(|| format!("parsing plan file {}", path.display()))?;
    plan.validate()?;
    Ok(plan)
}

fn read_answer() -> anyhow::Result<Option<String>> {
    print!("> ");
    io::stdout().flush()?;
    let mut line = String::new();
    if io::stdin().read_line(&mut line)? == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim().to_string()))
}

fn init_tracing(observability: &ObservabilityConfig) {
    let fallback_level = match observability.log_level.trim().to_ascii_lowercase().as_str() {
        "trace" => "trace",
        "debug" => "debug",
        "info" => "info",
        "warn" => "warn",
        "error" => "error",
        _ => "info",
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(fallback_level))
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    match open_log_file(observability.log_file.as_deref()) {
        Some(file) => {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(true)
                .with_ansi(false)
                .with_writer(std::sync::Mutex::new(file))
                .try_init();
        }
        None => {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(true)
                .try_init();
        }
    }
}

fn open_log_file(path: Option<&str>) -> Option<fs::File> {
    let path = Path::new(path?);
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            if let Err(err) = fs::create_dir_all(parent) {
                eprintln!("failed to create log directory '{}': {}", parent.display(), err);
                return None;
            }
        }
    }
    match fs::OpenOptions::new().create(true).append(true).open(path) {
        Ok(file) => Some(file),
        Err(err) => {
            eprintln!("failed to open log file '{}': {}", path.display(), err);
            None
        }
    }
}
