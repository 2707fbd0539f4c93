//! Session driver - goal → plan → execute → react cycles
//!
//! Bridges the planner boundary with the core executor: seeds state per
//! plan, reacts to pauses and continuation suspensions, and enforces the
//! per-goal cycle budget.

use chrono::Utc;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use thiserror::Error;

use ensemble_agents::{AgentCatalog, CatalogError};
use ensemble_core::executor::{PlanExecutor, RunVerdict};
use ensemble_core::types::{
    EventPreview, ExecutionState, Plan, PlanError, StepId, StepStatus, TelemetryEvent,
    TelemetryKind,
};

use crate::planner::{
    original_goal, ContinuationRequest, PlanRequest, Planner, CONTINUATION_MARKER,
};

/// Session errors; step failures are reported in the outcome instead.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),
    #[error("plan error: {0}")]
    Plan(#[from] PlanError),
    #[error("no step is awaiting input")]
    NoPendingInput,
    #[error("continuation cycle budget exhausted after {max_cycles} cycles")]
    CycleBudget { max_cycles: usize },
}

/// Session configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Max plans per goal, continuation re-plans included
    pub max_cycles: usize,
    /// Agent ids that must be enabled before planning starts
    pub required_agents: Vec<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_cycles: 8,
            required_agents: Vec::new(),
        }
    }
}

/// One goal's current plan and state, carried across pauses.
#[derive(Debug)]
pub struct SessionTurn {
    /// Turn label; continuation cycles carry a marker prefix
    pub goal: String,
    pub plan: Plan,
    pub state: ExecutionState,
}

/// Terminal result of driving one goal.
#[derive(Debug)]
pub enum SessionOutcome {
    /// The goal ran to completion
    Completed {
        turn: SessionTurn,
        output: Value,
        /// Plans consumed, continuation re-plans included
        cycles: usize,
    },
    /// Paused for a human answer; hand the turn back to
    /// [`SessionRunner::resume_with_input`]
    AwaitingInput {
        turn: SessionTurn,
        step_id: StepId,
        prompt: String,
    },
    /// A step failed; the turn keeps the partial state
    Failed {
        turn: SessionTurn,
        step_id: StepId,
        error: String,
    },
}

/// Session runner - wires planner + catalog + executor per goal.
pub struct SessionRunner {
    pub planner: Arc<dyn Planner>,
    pub catalog: AgentCatalog,
    pub executor: PlanExecutor,
    pub config: SessionConfig,
}

impl SessionRunner {
    pub fn new(planner: Arc<dyn Planner>, executor: PlanExecutor, catalog: AgentCatalog) -> Self {
        Self::with_config(planner, executor, catalog, SessionConfig::default())
    }

    pub fn with_config(
        planner: Arc<dyn Planner>,
        executor: PlanExecutor,
        catalog: AgentCatalog,
        config: SessionConfig,
    ) -> Self {
        Self {
            planner,
            catalog,
            executor,
            config,
        }
    }

    /// Drive a goal to a terminal outcome.
    pub async fn run_goal(&self, goal: &str) -> Result<SessionOutcome, SessionError> {
        self.run_goal_with_context(goal, Map::new()).await
    }

    /// Drive a goal, seeding the state's context bag.
    pub async fn run_goal_with_context(
        &self,
        goal: &str,
        seed_context: Map<String, Value>,
    ) -> Result<SessionOutcome, SessionError> {
        self.catalog.ensure_required(&self.config.required_agents)?;

        let request = PlanRequest {
            goal: goal.to_string(),
            available_agents: self.catalog.enabled_ids(),
            context: seed_context.clone(),
            continuation: None,
        };
        let plan = self.plan_cycle(&request, 1).await?;
        let state = ExecutionState::seed(&plan, seed_context)?;
        self.drive(goal.to_string(), plan, state).await
    }

    /// Apply the human's answer to a paused turn and run it onward.
    ///
    /// Finished steps short-circuit on re-entry, and the skip marks the
    /// pause left on the unreached remainder go back to `pending`, so
    /// the run picks up right after the answered step.
    pub async fn resume_with_input(
        &self,
        turn: SessionTurn,
        answer: &str,
    ) -> Result<SessionOutcome, SessionError> {
        let SessionTurn {
            goal,
            plan,
            mut state,
        } = turn;
        let step_id = apply_human_response(&mut state, &plan, answer)?;
        tracing::info!(
            plan_id = %plan.plan_id,
            step_id = %step_id,
            "human response applied, resuming"
        );
        self.drive(goal, plan, state).await
    }

    async fn plan_cycle(&self, request: &PlanRequest, cycle: usize) -> Result<Plan, SessionError> {
        tracing::debug!(
            cycle,
            goal = %request.goal,
            prompt = %request.planner_prompt(),
            "requesting plan"
        );
        let plan = self.planner.plan(request).await?;
        plan.validate()?;
        tracing::info!(
            cycle,
            plan_id = %plan.plan_id,
            plan_name = %plan.name,
            "plan ready"
        );
        Ok(plan)
    }

    async fn drive(
        &self,
        mut goal: String,
        mut plan: Plan,
        mut state: ExecutionState,
    ) -> Result<SessionOutcome, SessionError> {
        let mut cycles = 1;

        loop {
            let run = self.executor.execute(&plan, state).await;
            match run.verdict {
                RunVerdict::Paused { step_id, prompt } => {
                    return Ok(SessionOutcome::AwaitingInput {
                        turn: SessionTurn {
                            goal,
                            plan,
                            state: run.final_state,
                        },
                        step_id,
                        prompt,
                    });
                }
                RunVerdict::Failed { step_id, error } => {
                    return Ok(SessionOutcome::Failed {
                        turn: SessionTurn {
                            goal,
                            plan,
                            state: run.final_state,
                        },
                        step_id,
                        error,
                    });
                }
                RunVerdict::Completed { output } => {
                    let mut final_state = run.final_state;
                    let Some(step_id) = final_state.awaiting_continuation_step(&plan).cloned()
                    else {
                        return Ok(SessionOutcome::Completed {
                            turn: SessionTurn {
                                goal,
                                plan,
                                state: final_state,
                            },
                            output,
                            cycles,
                        });
                    };

                    if cycles >= self.config.max_cycles {
                        return Err(SessionError::CycleBudget {
                            max_cycles: self.config.max_cycles,
                        });
                    }

                    let continuation = mark_continuation_triggered(&mut final_state, &step_id);
                    tracing::info!(
                        plan_id = %plan.plan_id,
                        step_id = %step_id,
                        condition = %continuation.conditions_prompt,
                        "continuation suspension, re-planning"
                    );

                    let stripped = original_goal(&goal);
                    goal = format!("{CONTINUATION_MARKER}{stripped}");
                    let context = final_state.context.clone();
                    let request = PlanRequest {
                        goal: stripped,
                        available_agents: self.catalog.enabled_ids(),
                        context: context.clone(),
                        continuation: Some(continuation),
                    };
                    cycles += 1;
                    plan = self.plan_cycle(&request, cycles).await?;
                    state = ExecutionState::seed(&plan, context)?;
                }
            }
        }
    }
}

/// Mark an awaiting-input step answered, between runs.
///
/// The step becomes `succeeded` with `{"human_response": answer}` as
/// output, the trace records the answer, and every `skipped` step goes
/// back to `pending` so the re-run reaches it. A skip caused by a
/// failed parallel sibling stays dead anyway: the failed branch
/// re-raises its recorded error before reaching its children.
pub fn apply_human_response(
    state: &mut ExecutionState,
    plan: &Plan,
    answer: &str,
) -> Result<StepId, SessionError> {
    let step_id = state
        .awaiting_input_step(plan)
        .cloned()
        .ok_or(SessionError::NoPendingInput)?;

    if let Some(record) = state.steps.get_mut(&step_id) {
        record.status = StepStatus::Succeeded;
        record.output = json!({ "human_response": answer });
        record.ended_at = Some(Utc::now());
    }
    // The pause's unwind skip-marked everything after the question;
    // skip-marked records were never started, so status is all there
    // is to undo.
    for record in state.steps.values_mut() {
        if record.status == StepStatus::Skipped {
            record.status = StepStatus::Pending;
        }
    }
    state.push_trace(
        TelemetryEvent::new(TelemetryKind::HitlResponseReceived, &plan.plan_id)
            .with_step(&step_id)
            .with_preview(EventPreview::output(answer)),
    );
    Ok(step_id)
}

/// Mark a continuation suspension consumed and collect its condition
/// data for the re-planning request.
fn mark_continuation_triggered(
    state: &mut ExecutionState,
    step_id: &StepId,
) -> ContinuationRequest {
    let mut input_value = Value::Null;
    let mut conditions_prompt = String::new();

    if let Some(record) = state.steps.get_mut(step_id) {
        if let Some(parameters) = &record.parameters {
            input_value = parameters.get("inputValue").cloned().unwrap_or(Value::Null);
            conditions_prompt = match parameters.get("conditionsPrompt") {
                Some(Value::String(text)) => text.clone(),
                Some(other) => other.to_string(),
                None => String::new(),
            };
        }
        record.status = StepStatus::Succeeded;
        record.output = json!({ "action": "continuation_triggered" });
    }

    ContinuationRequest {
        step_id: step_id.clone(),
        input_value,
        conditions_prompt,
    }
}
