//! Execution state: the single owned record of one plan's progress
//!
//! State is seeded once per plan (every step `pending`), then mutated only
//! through [`ExecutionState::apply`] while a run owns it. Between runs the
//! caller owns the value and may edit it directly (human responses,
//! continuation bookkeeping) before handing it back in.

use super::plan::{Plan, PlanError, StepId};
use super::telemetry::{EventPreview, TelemetryEvent, TelemetryKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Per-step lifecycle status.
///
/// `pending → running → {succeeded | failed | awaiting_input |
/// awaiting_continuation}`; `skipped` only directly from `pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    #[default]
    Pending,
    Running,
    Succeeded,
    Failed,
    Skipped,
    /// Paused for a human answer (HITL)
    AwaitingInput,
    /// Paused for conditional re-planning
    AwaitingContinuation,
}

/// Execution record of a single step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub status: StepStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    /// Resolved parameters, filled once computed
    pub parameters: Option<Map<String, Value>>,
    pub output: Value,
    pub error: Option<String>,
    /// Caller-owned side channel; never written by the interpreter
    #[serde(default)]
    pub emissions: Vec<Value>,
}

impl StepResult {
    /// Fresh record for a not-yet-touched step
    pub fn pending() -> Self {
        Self {
            status: StepStatus::Pending,
            started_at: None,
            ended_at: None,
            parameters: None,
            output: Value::Null,
            error: None,
            emissions: Vec::new(),
        }
    }
}

impl Default for StepResult {
    fn default() -> Self {
        Self::pending()
    }
}

/// Mediator notes attached to the document work-sheet.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MediatorNotes {
    pub summary: Option<String>,
}

/// Document work-sheet carried alongside execution.
///
/// Opaque to the interpreter; populated by callers across planning turns.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DocumentMetadata {
    pub doc_type: Option<String>,
    pub review_status: Option<String>,
    #[serde(default)]
    pub assumptions: Vec<String>,
    #[serde(default)]
    pub mediator: MediatorNotes,
    #[serde(default)]
    pub obligations: Vec<Value>,
}

/// The full mutable record of one plan's execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionState {
    #[serde(default)]
    pub metadata: DocumentMetadata,
    /// Free-form carryover bag populated by the caller across turns
    #[serde(default)]
    pub context: Map<String, Value>,
    pub steps: HashMap<StepId, StepResult>,
    pub trace: Vec<TelemetryEvent>,
}

impl ExecutionState {
    /// Seed fresh state for a plan: every step `pending`, a `plan_created`
    /// trace entry, and the given carryover context.
    ///
    /// Fails if the plan violates the step-id uniqueness invariant.
    pub fn seed(plan: &Plan, context: Map<String, Value>) -> Result<Self, PlanError> {
        plan.validate()?;
        let mut steps = HashMap::new();
        for id in plan.root.subtree_ids() {
            steps.insert(id.clone(), StepResult::pending());
        }
        let created = TelemetryEvent::new(TelemetryKind::PlanCreated, &plan.plan_id)
            .with_preview(EventPreview::message(format!(
                "Plan \"{}\" created.",
                plan.name
            )));
        Ok(Self {
            metadata: DocumentMetadata::default(),
            context,
            steps,
            trace: vec![created],
        })
    }

    /// Look up one step's record
    pub fn step(&self, id: &StepId) -> Option<&StepResult> {
        self.steps.get(id)
    }

    /// Status of one step, if present
    pub fn status_of(&self, id: &StepId) -> Option<StepStatus> {
        self.steps.get(id).map(|result| result.status)
    }

    /// First step awaiting a human answer, in plan declaration order
    pub fn awaiting_input_step<'p>(&self, plan: &'p Plan) -> Option<&'p StepId> {
        self.first_with_status(plan, StepStatus::AwaitingInput)
    }

    /// First step awaiting conditional re-planning, in plan declaration order
    pub fn awaiting_continuation_step<'p>(&self, plan: &'p Plan) -> Option<&'p StepId> {
        self.first_with_status(plan, StepStatus::AwaitingContinuation)
    }

    fn first_with_status<'p>(&self, plan: &'p Plan, status: StepStatus) -> Option<&'p StepId> {
        plan.root
            .subtree_ids()
            .into_iter()
            .find(|id| self.status_of(id) == Some(status))
    }

    /// Append a caller-side trace event
    pub fn push_trace(&mut self, event: TelemetryEvent) {
        self.trace.push(event);
    }

    /// Apply one interpreter mutation, enforcing the status guards.
    ///
    /// `StepSucceeded` only lands on a `running` step (a nested suspension
    /// must not be overwritten back to success); `StepSkipped` only lands on
    /// a `pending` step. Mutations naming an unknown step id are ignored.
    pub fn apply(&mut self, mutation: &StateMutation) {
        match mutation {
            StateMutation::StepStarted {
                step_id,
                started_at,
            } => {
                if let Some(result) = self.steps.get_mut(step_id) {
                    result.status = StepStatus::Running;
                    result.started_at = Some(*started_at);
                }
            }
            StateMutation::ParametersResolved {
                step_id,
                parameters,
            } => {
                if let Some(result) = self.steps.get_mut(step_id) {
                    result.parameters = Some(parameters.clone());
                }
            }
            StateMutation::StepSucceeded {
                step_id,
                output,
                ended_at,
            } => {
                if let Some(result) = self.steps.get_mut(step_id) {
                    if result.status == StepStatus::Running {
                        result.status = StepStatus::Succeeded;
                        result.output = output.clone();
                        result.ended_at = Some(*ended_at);
                    }
                }
            }
            StateMutation::StepFailed {
                step_id,
                error,
                ended_at,
            } => {
                if let Some(result) = self.steps.get_mut(step_id) {
                    result.status = StepStatus::Failed;
                    result.error = Some(error.clone());
                    result.ended_at = Some(*ended_at);
                }
            }
            StateMutation::StepSkipped { step_id } => {
                if let Some(result) = self.steps.get_mut(step_id) {
                    if result.status == StepStatus::Pending {
                        result.status = StepStatus::Skipped;
                    }
                }
            }
            StateMutation::StepSuspended { step_id, status } => {
                if let Some(result) = self.steps.get_mut(step_id) {
                    result.status = *status;
                }
            }
            StateMutation::TraceAppended { event } => {
                self.trace.push(event.clone());
            }
        }
    }
}

/// One interpreter-applied delta to [`ExecutionState`].
///
/// The closed set of writes a run may perform; every applied mutation is
/// also forwarded to the run's state sink so callers can mirror state by
/// replay.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StateMutation {
    StepStarted {
        step_id: StepId,
        started_at: DateTime<Utc>,
    },
    ParametersResolved {
        step_id: StepId,
        parameters: Map<String, Value>,
    },
    StepSucceeded {
        step_id: StepId,
        output: Value,
        ended_at: DateTime<Utc>,
    },
    StepFailed {
        step_id: StepId,
        error: String,
        ended_at: DateTime<Utc>,
    },
    StepSkipped {
        step_id: StepId,
    },
    StepSuspended {
        step_id: StepId,
        status: StepStatus,
    },
    TraceAppended {
        event: TelemetryEvent,
    },
}

impl StateMutation {
    /// The step this mutation touches, if any
    pub fn step_id(&self) -> Option<&StepId> {
        match self {
            StateMutation::StepStarted { step_id, .. }
            | StateMutation::ParametersResolved { step_id, .. }
            | StateMutation::StepSucceeded { step_id, .. }
            | StateMutation::StepFailed { step_id, .. }
            | StateMutation::StepSkipped { step_id }
            | StateMutation::StepSuspended { step_id, .. } => Some(step_id),
            StateMutation::TraceAppended { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::plan::Step;
    use serde_json::json;

    fn seeded() -> (Plan, ExecutionState) {
        let plan = Plan::new(
            "review",
            "two-step review",
            Step::sequential(
                "root",
                vec![
                    Step::agent_call("s1", "talk_to_document"),
                    Step::agent_call("s2", "numbering_check"),
                ],
            ),
        );
        let state = ExecutionState::seed(&plan, Map::new()).unwrap();
        (plan, state)
    }

    #[test]
    fn test_seed_marks_every_step_pending() {
        let (_, state) = seeded();
        assert_eq!(state.steps.len(), 3);
        assert!(state
            .steps
            .values()
            .all(|result| result.status == StepStatus::Pending));
    }

    #[test]
    fn test_seed_records_plan_created() {
        let (plan, state) = seeded();
        assert_eq!(state.trace.len(), 1);
        let event = &state.trace[0];
        assert_eq!(event.event, TelemetryKind::PlanCreated);
        assert_eq!(event.plan_id, plan.plan_id);
        let preview = event.preview.as_ref().unwrap();
        assert_eq!(
            preview.message.as_deref(),
            Some("Plan \"review\" created.")
        );
    }

    #[test]
    fn test_seed_rejects_duplicate_ids() {
        let plan = Plan::new(
            "broken",
            "dup",
            Step::sequential(
                "root",
                vec![
                    Step::agent_call("s1", "a"),
                    Step::agent_call("s1", "b"),
                ],
            ),
        );
        assert!(ExecutionState::seed(&plan, Map::new()).is_err());
    }

    #[test]
    fn test_succeeded_requires_running() {
        let (_, mut state) = seeded();
        let id = StepId::new("s1");
        state.apply(&StateMutation::StepSucceeded {
            step_id: id.clone(),
            output: json!({"ok": true}),
            ended_at: Utc::now(),
        });
        // Still pending: the guard refused the write.
        assert_eq!(state.status_of(&id), Some(StepStatus::Pending));

        state.apply(&StateMutation::StepStarted {
            step_id: id.clone(),
            started_at: Utc::now(),
        });
        state.apply(&StateMutation::StepSucceeded {
            step_id: id.clone(),
            output: json!({"ok": true}),
            ended_at: Utc::now(),
        });
        assert_eq!(state.status_of(&id), Some(StepStatus::Succeeded));
        assert_eq!(state.step(&id).unwrap().output, json!({"ok": true}));
    }

    #[test]
    fn test_suspension_survives_success_attempt() {
        let (_, mut state) = seeded();
        let id = StepId::new("s1");
        state.apply(&StateMutation::StepStarted {
            step_id: id.clone(),
            started_at: Utc::now(),
        });
        state.apply(&StateMutation::StepSuspended {
            step_id: id.clone(),
            status: StepStatus::AwaitingContinuation,
        });
        state.apply(&StateMutation::StepSucceeded {
            step_id: id.clone(),
            output: json!("late"),
            ended_at: Utc::now(),
        });
        assert_eq!(
            state.status_of(&id),
            Some(StepStatus::AwaitingContinuation)
        );
        assert_eq!(state.step(&id).unwrap().output, Value::Null);
    }

    #[test]
    fn test_skipped_only_from_pending() {
        let (_, mut state) = seeded();
        let s1 = StepId::new("s1");
        let s2 = StepId::new("s2");
        state.apply(&StateMutation::StepStarted {
            step_id: s1.clone(),
            started_at: Utc::now(),
        });
        state.apply(&StateMutation::StepSucceeded {
            step_id: s1.clone(),
            output: json!(1),
            ended_at: Utc::now(),
        });
        state.apply(&StateMutation::StepSkipped { step_id: s1.clone() });
        state.apply(&StateMutation::StepSkipped { step_id: s2.clone() });
        assert_eq!(state.status_of(&s1), Some(StepStatus::Succeeded));
        assert_eq!(state.status_of(&s2), Some(StepStatus::Skipped));
    }

    #[test]
    fn test_failed_overwrites_unconditionally() {
        let (_, mut state) = seeded();
        let id = StepId::new("s2");
        state.apply(&StateMutation::StepStarted {
            step_id: id.clone(),
            started_at: Utc::now(),
        });
        state.apply(&StateMutation::StepFailed {
            step_id: id.clone(),
            error: "notifier refused".to_string(),
            ended_at: Utc::now(),
        });
        let result = state.step(&id).unwrap();
        assert_eq!(result.status, StepStatus::Failed);
        assert_eq!(result.error.as_deref(), Some("notifier refused"));
    }

    #[test]
    fn test_awaiting_scans_follow_declaration_order() {
        let (plan, mut state) = seeded();
        for id in [StepId::new("s1"), StepId::new("s2")] {
            state.apply(&StateMutation::StepStarted {
                step_id: id.clone(),
                started_at: Utc::now(),
            });
            state.apply(&StateMutation::StepSuspended {
                step_id: id,
                status: StepStatus::AwaitingContinuation,
            });
        }
        assert_eq!(
            state.awaiting_continuation_step(&plan).map(StepId::as_str),
            Some("s1")
        );
        assert!(state.awaiting_input_step(&plan).is_none());
    }

    #[test]
    fn test_state_round_trips_through_json() {
        let (_, mut state) = seeded();
        state.metadata.doc_type = Some("MSA".to_string());
        state
            .context
            .insert("carry".to_string(), json!({"prior": "turn"}));
        let encoded = serde_json::to_string(&state).unwrap();
        let decoded: ExecutionState = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded.metadata.doc_type.as_deref(), Some("MSA"));
        assert_eq!(decoded.steps.len(), 3);
        assert_eq!(decoded.trace.len(), 1);
    }
}
