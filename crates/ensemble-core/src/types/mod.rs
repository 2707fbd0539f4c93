//! Core type definitions for Ensemble
//!
//! This module contains the fundamental types used throughout the system:
//! - Plan: An immutable tree of steps produced once per goal
//! - Step: Leaf agent call, or sequential / parallel composite
//! - ExecutionState: The single owned record of one plan's progress
//! - StateMutation: The closed set of deltas a run may apply
//! - TelemetryEvent: Append-only trace entries

mod plan;
mod state;
mod telemetry;

pub use plan::{
    AgentCallStep, ParallelStep, Plan, PlanError, SequentialStep, SimulationMode,
    SimulationSettings, Step, StepId,
};
pub use state::{
    DocumentMetadata, ExecutionState, MediatorNotes, StateMutation, StepResult, StepStatus,
};
pub use telemetry::{
    preview_json, EventPreview, TelemetryEvent, TelemetryKind, MAX_PREVIEW_CHARS,
};
