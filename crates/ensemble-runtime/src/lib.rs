//! # Ensemble Runtime
//!
//! The session layer on top of `ensemble-core`: planner boundary,
//! goal-driven execution cycles, and state-mutation broadcasting.
//!
//! This crate contains:
//! - The [`Planner`] trait and the plan request/continuation types
//! - [`SessionRunner`], which drives goal → plan → execute cycles and
//!   reacts to pauses and continuation suspensions
//! - Broadcast and collecting [`StateSink`](ensemble_core::executor::StateSink)
//!   implementations for mirroring state mutations
//!
//! This crate does NOT care about:
//! - Which agents exist or how they behave (see `ensemble-agents`)
//! - Step semantics and status bookkeeping (see `ensemble-core`)

mod planner;
mod session;
mod sink;

pub use planner::{
    original_goal, ContinuationRequest, PlanRequest, Planner, ScriptedPlanner, CONTINUATION_MARKER,
};
pub use session::{
    apply_human_response, SessionConfig, SessionError, SessionOutcome, SessionRunner, SessionTurn,
};
pub use sink::{BroadcastStateSink, CollectStateSink};

pub use ensemble_core::prelude::*;
