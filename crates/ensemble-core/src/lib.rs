//! # Ensemble Core
//!
//! Core abstractions and deterministic logic for the Ensemble runtime.
//!
//! This crate contains:
//! - Plan / Step / ExecutionState / telemetry definitions
//! - The recursive plan executor and its suspension protocols
//! - Parameter template resolution against prior step results
//! - The agent invoker abstraction and agent-id canonicalization
//!
//! This crate does NOT care about:
//! - Where plans come from
//! - Which concrete agents exist
//! - How a paused plan gets its human answer
//! - How output is displayed

pub mod agent;
pub mod executor;
pub mod resolver;
pub mod types;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::agent::{
        canonicalize_agent_id, AgentInvoker, InvokeError, BRANCH_ORCHESTRATOR, HUMAN_ASSISTANT,
    };
    pub use crate::executor::{
        HumanInputNotifier, LatencyPolicy, NotifyError, NullStateSink, PlanExecutor, RunOutcome,
        RunVerdict, StateSink, StepFailure, StepOutcome, StepSuccessNotifier, Suspension,
    };
    pub use crate::resolver::resolve_parameters;
    pub use crate::types::{
        AgentCallStep, DocumentMetadata, EventPreview, ExecutionState, MediatorNotes, ParallelStep,
        Plan, PlanError, SequentialStep, SimulationMode, SimulationSettings, StateMutation, Step,
        StepId, StepResult, StepStatus, TelemetryEvent, TelemetryKind,
    };
}

// Re-export key types at crate root
pub use agent::{AgentInvoker, InvokeError};
pub use executor::{LatencyPolicy, PlanExecutor, RunOutcome, RunVerdict, StateSink, StepOutcome};
pub use resolver::resolve_parameters;
pub use types::{
    ExecutionState, Plan, StateMutation, Step, StepId, StepResult, StepStatus, TelemetryEvent,
    TelemetryKind,
};
