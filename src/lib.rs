//! # Ensemble
//!
//! A plan-execution runtime for agentic assistants: turns a hierarchical
//! plan of delegated tasks into driven agent invocations, with cooperative
//! suspension for human input and conditional re-planning.
//!
//! ## Core Concepts
//!
//! - **Plan**: An immutable tree of steps produced once per goal
//! - **Step**: Leaf agent call, or sequential / parallel composite
//! - **ExecutionState**: The single owned record of one plan's progress
//! - **Executor**: Recursive tree interpreter with a per-step status machine
//! - **Suspension**: A designed, non-error pause (human input, continuation)
//!
//! ## Architecture
//!
//! ```text
//! Goal
//!    ↓
//! Planner (external, behind a trait)
//!    ↓
//! Plan (step tree)
//!    ↓
//! Seeded ExecutionState
//!    ↓
//! PlanExecutor ──→ AgentInvoker
//!    ↓                StateSink / notifiers
//! RunOutcome (completed | paused | failed)
//!    ↓
//! Session layer (resume, continuation cycles)
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use ensemble::prelude::*;
//!
//! let plan = Plan::new("Review the MSA", "redline and share", root_step);
//! let state = ExecutionState::seed(&plan, Map::new())?;
//!
//! let executor = PlanExecutor::new(invoker);
//! let outcome = executor.execute(&plan, state).await;
//!
//! match outcome.verdict {
//!     RunVerdict::Completed { .. } => println!("done"),
//!     RunVerdict::Paused { prompt, .. } => ask_the_user(prompt),
//!     RunVerdict::Failed { error, .. } => eprintln!("{error}"),
//! }
//! ```

pub use ensemble_agents as agents;
pub use ensemble_config as config;
pub use ensemble_core as core;
pub use ensemble_runtime as runtime;

/// Prelude for convenient imports
pub mod prelude {
    pub use ensemble_agents::{
        AgentCatalog, AgentDefinition, AgentKind, AgentProfile, CatalogError, SimulatedInvoker,
    };
    pub use ensemble_config::{load_config, ConfigError, EnsembleConfig};
    pub use ensemble_core::agent::{AgentInvoker, InvokeError};
    pub use ensemble_core::executor::{
        HumanInputNotifier, LatencyPolicy, NotifyError, NullStateSink, PlanExecutor, RunOutcome,
        RunVerdict, StateSink, StepOutcome, StepSuccessNotifier,
    };
    pub use ensemble_core::types::{
        AgentCallStep, EventPreview, ExecutionState, ParallelStep, Plan, PlanError,
        SequentialStep, SimulationMode, SimulationSettings, StateMutation, Step, StepId,
        StepResult, StepStatus, TelemetryEvent, TelemetryKind,
    };
    pub use ensemble_runtime::{
        BroadcastStateSink, ContinuationRequest, PlanRequest, Planner, ScriptedPlanner,
        SessionConfig, SessionError, SessionOutcome, SessionRunner, SessionTurn,
    };
}
