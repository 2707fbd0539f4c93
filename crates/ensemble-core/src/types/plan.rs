//! Plan and step type definitions
//!
//! A Plan is an immutable tree of Steps produced once per goal. Steps are a
//! closed tagged union: leaf agent calls plus sequential / parallel
//! composites.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Identifier of one step in a plan tree.
///
/// Ids are planner-chosen strings, unique across the whole tree
/// ([`Plan::validate`] rejects duplicates). The same id keys the
/// step's record in `ExecutionState.steps` and tags the telemetry
/// events the step emits.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct StepId(pub String);

impl StepId {
    /// Wrap a raw identifier
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The identifier text
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for StepId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for StepId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<&StepId> for StepId {
    fn from(value: &StepId) -> Self {
        value.clone()
    }
}

impl From<StepId> for String {
    fn from(value: StepId) -> Self {
        value.0
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl AsRef<str> for StepId {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl PartialEq<&str> for StepId {
    fn eq(&self, other: &&str) -> bool {
        self.as_str() == *other
    }
}

/// Leaf step delegating to a named external worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentCallStep {
    /// Unique identifier for this step
    pub id: StepId,
    /// Declared worker id; canonicalized before dispatch
    pub agent_id: String,
    /// Raw parameters; template tokens are resolved at execution time
    #[serde(default)]
    pub parameters: Map<String, Value>,
    /// Planner annotation: phase label (opaque to the executor)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
    /// Planner annotation: branch grouping key (opaque to the executor)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch_key: Option<String>,
    /// Planner annotation: loop grouping key (opaque to the executor)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loop_key: Option<String>,
}

impl AgentCallStep {
    /// Create a new agent-call step with empty parameters
    pub fn new(id: impl Into<StepId>, agent_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            agent_id: agent_id.into(),
            parameters: Map::new(),
            phase: None,
            branch_key: None,
            loop_key: None,
        }
    }

    /// Replace the full parameter map
    pub fn with_parameters(mut self, parameters: Map<String, Value>) -> Self {
        self.parameters = parameters;
        self
    }

    /// Add a single parameter
    pub fn with_parameter(mut self, key: impl Into<String>, value: Value) -> Self {
        self.parameters.insert(key.into(), value);
        self
    }
}

/// Composite step whose children run strictly in order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SequentialStep {
    /// Unique identifier for this step
    pub id: StepId,
    /// Children, executed left to right
    pub tasks: Vec<Step>,
    /// Planner annotation: phase label (opaque to the executor)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
    /// Planner annotation: branch grouping key (opaque to the executor)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch_key: Option<String>,
    /// Planner annotation: loop grouping key (opaque to the executor)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loop_key: Option<String>,
}

impl SequentialStep {
    pub fn new(id: impl Into<StepId>, tasks: Vec<Step>) -> Self {
        Self {
            id: id.into(),
            tasks,
            phase: None,
            branch_key: None,
            loop_key: None,
        }
    }
}

/// Composite step whose children run concurrently.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParallelStep {
    /// Unique identifier for this step
    pub id: StepId,
    /// Children, launched together and joined after all settle
    pub tasks: Vec<Step>,
    /// Planner annotation: phase label (opaque to the executor)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
    /// Planner annotation: branch grouping key (opaque to the executor)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch_key: Option<String>,
    /// Planner annotation: loop grouping key (opaque to the executor)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loop_key: Option<String>,
}

impl ParallelStep {
    pub fn new(id: impl Into<StepId>, tasks: Vec<Step>) -> Self {
        Self {
            id: id.into(),
            tasks,
            phase: None,
            branch_key: None,
            loop_key: None,
        }
    }
}

/// A single node in the plan tree.
///
/// Closed tagged union; the `type` tag matches the planner wire format
/// (`agent_call` / `sequential` / `parallel`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Step {
    AgentCall(AgentCallStep),
    Sequential(SequentialStep),
    Parallel(ParallelStep),
}

impl Step {
    /// Create an agent-call leaf
    pub fn agent_call(id: impl Into<StepId>, agent_id: impl Into<String>) -> Self {
        Self::AgentCall(AgentCallStep::new(id, agent_id))
    }

    /// Create a sequential composite
    pub fn sequential(id: impl Into<StepId>, tasks: Vec<Step>) -> Self {
        Self::Sequential(SequentialStep::new(id, tasks))
    }

    /// Create a parallel composite
    pub fn parallel(id: impl Into<StepId>, tasks: Vec<Step>) -> Self {
        Self::Parallel(ParallelStep::new(id, tasks))
    }

    /// The step's unique id
    pub fn id(&self) -> &StepId {
        match self {
            Step::AgentCall(step) => &step.id,
            Step::Sequential(step) => &step.id,
            Step::Parallel(step) => &step.id,
        }
    }

    /// Children of a composite; empty for a leaf
    pub fn tasks(&self) -> &[Step] {
        match self {
            Step::AgentCall(_) => &[],
            Step::Sequential(step) => &step.tasks,
            Step::Parallel(step) => &step.tasks,
        }
    }

    /// Ids of this step and every descendant, preorder
    pub fn subtree_ids(&self) -> Vec<&StepId> {
        let mut ids = Vec::new();
        self.collect_subtree_ids(&mut ids);
        ids
    }

    fn collect_subtree_ids<'a>(&'a self, ids: &mut Vec<&'a StepId>) {
        ids.push(self.id());
        for task in self.tasks() {
            task.collect_subtree_ids(ids);
        }
    }
}

impl From<AgentCallStep> for Step {
    fn from(step: AgentCallStep) -> Self {
        Self::AgentCall(step)
    }
}

impl From<SequentialStep> for Step {
    fn from(step: SequentialStep) -> Self {
        Self::Sequential(step)
    }
}

impl From<ParallelStep> for Step {
    fn from(step: ParallelStep) -> Self {
        Self::Parallel(step)
    }
}

/// Latency shaping for simulated agent runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SimulationMode {
    /// Fixed floor latency, no jitter; replays are stable
    Deterministic,
    /// Floor latency plus uniform jitter
    #[default]
    Stochastic,
}

/// Optional per-plan simulation hints.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SimulationSettings {
    pub mode: SimulationMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

/// An executable plan: a named, immutable tree of steps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    /// Unique identifier for this plan; generated when a plan file omits it
    #[serde(default = "fresh_plan_id")]
    pub plan_id: String,
    /// Human-readable plan name
    pub name: String,
    /// What this plan sets out to do
    pub description: String,
    /// Root of the step tree
    pub root: Step,
    /// Optional simulation hints
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub simulation: Option<SimulationSettings>,
}

fn fresh_plan_id() -> String {
    Uuid::new_v4().to_string()
}

impl Plan {
    /// Create a plan with a fresh id
    pub fn new(name: impl Into<String>, description: impl Into<String>, root: Step) -> Self {
        Self {
            plan_id: fresh_plan_id(),
            name: name.into(),
            description: description.into(),
            root,
            simulation: None,
        }
    }

    /// Set simulation hints
    pub fn with_simulation(mut self, simulation: SimulationSettings) -> Self {
        self.simulation = Some(simulation);
        self
    }

    /// Check the global step-id uniqueness invariant
    pub fn validate(&self) -> Result<(), PlanError> {
        let mut seen: HashSet<&StepId> = HashSet::new();
        for id in self.root.subtree_ids() {
            if !seen.insert(id) {
                return Err(PlanError::DuplicateStepId { id: id.clone() });
            }
        }
        Ok(())
    }
}

/// Errors constructing or generating a plan.
#[derive(Debug, Error)]
pub enum PlanError {
    /// Two steps in one tree share an id
    #[error("duplicate step id in plan: {id}")]
    DuplicateStepId { id: StepId },
    /// Plan generation (external planner) failed
    #[error("plan generation failed: {reason}")]
    Generation { reason: String },
}
