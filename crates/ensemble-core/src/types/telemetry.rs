//! Telemetry trace events
//!
//! The trace is an append-only, causally ordered record of execution
//! events embedded in `ExecutionState`. It exists for observability and
//! audit, not for replay.

use super::plan::StepId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Upper bound on preview payload text.
pub const MAX_PREVIEW_CHARS: usize = 100;

/// Event vocabulary for the execution trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TelemetryKind {
    /// State seeded for a freshly created plan
    PlanCreated,
    PlanExecutionStarted,
    PlanExecutionFinished,
    StepStarted,
    StepSucceeded,
    StepFailed,
    /// All children of a parallel composite settled successfully
    ParallelJoined,
    /// Declared agent id was canonicalized before dispatch
    DependencyAnalysis,
    /// Execution paused for a human answer
    HitlRequested,
    /// Caller recorded the human answer onto the paused step
    HitlResponseReceived,
    /// Execution paused for conditional re-planning
    ContinuationRequired,
}

/// Small human-readable payload attached to an event.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct EventPreview {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl EventPreview {
    /// Preview carrying a plain message
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::default()
        }
    }

    /// Preview carrying a bounded rendition of a step output
    pub fn output_of(output: &Value) -> Self {
        Self {
            output: Some(preview_json(output)),
            ..Self::default()
        }
    }

    /// Preview carrying raw output text (caller-side events)
    pub fn output(output: impl Into<String>) -> Self {
        Self {
            output: Some(output.into()),
            ..Self::default()
        }
    }

    /// Preview carrying an error message
    pub fn error(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::default()
        }
    }
}

/// One entry in the execution trace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryEvent {
    pub event: TelemetryKind,
    pub ts: DateTime<Utc>,
    pub plan_id: String,
    /// Null for plan-level events
    pub step_id: Option<StepId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview: Option<EventPreview>,
}

impl TelemetryEvent {
    /// Create a plan-level event stamped now
    pub fn new(event: TelemetryKind, plan_id: impl Into<String>) -> Self {
        Self {
            event,
            ts: Utc::now(),
            plan_id: plan_id.into(),
            step_id: None,
            agent_id: None,
            preview: None,
        }
    }

    /// Attach the step this event concerns
    pub fn with_step(mut self, step_id: impl Into<StepId>) -> Self {
        self.step_id = Some(step_id.into());
        self
    }

    /// Attach the agent this event concerns
    pub fn with_agent(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = Some(agent_id.into());
        self
    }

    /// Attach a preview payload
    pub fn with_preview(mut self, preview: EventPreview) -> Self {
        self.preview = Some(preview);
        self
    }
}

/// Bounded JSON rendition for previews: the first [`MAX_PREVIEW_CHARS`]
/// characters of the serialized value, with a trailing ellipsis.
pub fn preview_json(value: &Value) -> String {
    let serialized = value.to_string();
    let mut preview: String = serialized.chars().take(MAX_PREVIEW_CHARS).collect();
    preview.push_str("...");
    preview
}
