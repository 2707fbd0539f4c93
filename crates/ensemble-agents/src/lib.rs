//! # Ensemble Agents
//!
//! Official agent collection for Ensemble (optional).
//!
//! This crate provides:
//! - The contract-assistant agent roster
//! - JSON profile loading and saving
//! - A deterministic simulated invoker for demos and tests

mod catalog;
mod definition;
mod invoker;
mod profile;

// Re-export core invoker traits
pub use ensemble_core::agent::{AgentInvoker, InvokeError};

pub use catalog::{default_agents, AgentCatalog, CatalogError};
pub use definition::{AgentDefinition, AgentKind};
pub use invoker::SimulatedInvoker;
pub use profile::AgentProfile;
