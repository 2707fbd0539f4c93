//! Planner boundary - where plans come from
//!
//! Plan generation is an external concern (an LLM service in practice);
//! the session only needs a narrow async seam plus the prompt shapes
//! continuation re-planning expects.

use std::collections::VecDeque;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::Mutex;

use ensemble_core::types::{Plan, PlanError, StepId};

/// Goal prefix marking a continuation re-plan of an earlier goal.
pub const CONTINUATION_MARKER: &str = "[CONTINUATION]";

/// Strip cycle markers from a turn label, recovering the user's goal.
pub fn original_goal(prompt: &str) -> String {
    prompt.replace(CONTINUATION_MARKER, "")
}

/// Everything a continuation re-plan needs from the suspended run.
#[derive(Debug, Clone)]
pub struct ContinuationRequest {
    /// The branch step that suspended
    pub step_id: StepId,
    /// Data gathered for the condition (the step's resolved `inputValue`)
    pub input_value: Value,
    /// Condition text (the step's resolved `conditionsPrompt`)
    pub conditions_prompt: String,
}

/// One planning request: the goal plus what the planner may target.
#[derive(Debug, Clone)]
pub struct PlanRequest {
    /// The user's goal, markers stripped
    pub goal: String,
    /// Enabled agent ids the plan may delegate to
    pub available_agents: Vec<String>,
    /// Carryover context bag from the previous cycle
    pub context: Map<String, Value>,
    /// Present when re-planning after a continuation suspension
    pub continuation: Option<ContinuationRequest>,
}

impl PlanRequest {
    /// Render the request as planner prompt text.
    ///
    /// A plain goal passes through verbatim; a continuation request
    /// becomes the re-planning prompt with the gathered condition data.
    pub fn planner_prompt(&self) -> String {
        match &self.continuation {
            Some(continuation) => format!(
                "[CTX]\n{}\n\n[CONTINUATION CONTEXT]\nThe user's original goal was: \"{}\"\nA previous step gathered data for a condition. The result is: {}\nThe condition to evaluate is: \"{}\"\n\nBased on this result and condition, generate the plan for the *next* set of actions. Do not repeat the steps that were already executed.\n",
                Value::Object(self.context.clone()),
                self.goal,
                continuation.input_value,
                continuation.conditions_prompt,
            ),
            None => self.goal.clone(),
        }
    }
}

/// Turns a planning request into an executable plan.
#[async_trait]
pub trait Planner: Send + Sync {
    async fn plan(&self, request: &PlanRequest) -> Result<Plan, PlanError>;
}

/// Planner that serves prepared plans in order; for tests and demos.
///
/// Records every request it sees so callers can assert on the
/// continuation data the session produced.
#[derive(Default)]
pub struct ScriptedPlanner {
    queue: Mutex<VecDeque<Plan>>,
    requests: Mutex<Vec<PlanRequest>>,
}

impl ScriptedPlanner {
    pub fn new(plans: impl IntoIterator<Item = Plan>) -> Self {
        Self {
            queue: Mutex::new(plans.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Queue one more plan
    pub async fn push(&self, plan: Plan) {
        self.queue.lock().await.push_back(plan);
    }

    /// The requests received so far
    pub async fn requests(&self) -> Vec<PlanRequest> {
        self.requests.lock().await.clone()
    }
}

#[async_trait]
impl Planner for ScriptedPlanner {
    async fn plan(&self, request: &PlanRequest) -> Result<Plan, PlanError> {
        self.requests.lock().await.push(request.clone());
        self.queue
            .lock()
            .await
            .pop_front()
            .ok_or_else(|| PlanError::Generation {
                reason: "scripted planner has no more plans".to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ensemble_core::types::Step;
    use serde_json::json;

    fn request(goal: &str) -> PlanRequest {
        PlanRequest {
            goal: goal.to_string(),
            available_agents: vec!["talk_to_document".to_string()],
            context: Map::new(),
            continuation: None,
        }
    }

    #[test]
    fn test_scripted_planner_serves_in_order() {
        tokio_test::block_on(async {
            let planner = ScriptedPlanner::new(vec![
                Plan::new("first", "plan one", Step::agent_call("a", "talk_to_corpus")),
                Plan::new("second", "plan two", Step::agent_call("b", "ask_tim")),
            ]);

            let one = planner.plan(&request("go")).await.unwrap();
            let two = planner.plan(&request("go")).await.unwrap();
            assert_eq!(one.name, "first");
            assert_eq!(two.name, "second");
            assert_eq!(planner.requests().await.len(), 2);
        });
    }

    #[test]
    fn test_scripted_planner_exhaustion_is_generation_error() {
        tokio_test::block_on(async {
            let planner = ScriptedPlanner::new(Vec::new());
            match planner.plan(&request("go")).await {
                Err(PlanError::Generation { reason }) => {
                    assert!(reason.contains("no more plans"));
                }
                other => panic!("expected Generation error, got {other:?}"),
            }
        });
    }

    #[test]
    fn test_plain_goal_prompt_passes_through() {
        let request = request("Review the MSA for assignment clauses");
        assert_eq!(
            request.planner_prompt(),
            "Review the MSA for assignment clauses"
        );
    }

    #[test]
    fn test_continuation_prompt_shape() {
        let mut context = Map::new();
        context.insert("documentId".to_string(), json!("doc-3"));
        let request = PlanRequest {
            goal: "Review the MSA".to_string(),
            available_agents: Vec::new(),
            context,
            continuation: Some(ContinuationRequest {
                step_id: StepId::new("branch"),
                input_value: json!({ "findings": 4 }),
                conditions_prompt: "more than three findings?".to_string(),
            }),
        };

        let prompt = request.planner_prompt();
        assert_eq!(
            prompt,
            "[CTX]\n{\"documentId\":\"doc-3\"}\n\n[CONTINUATION CONTEXT]\n\
             The user's original goal was: \"Review the MSA\"\n\
             A previous step gathered data for a condition. The result is: {\"findings\":4}\n\
             The condition to evaluate is: \"more than three findings?\"\n\n\
             Based on this result and condition, generate the plan for the *next* set of actions. \
             Do not repeat the steps that were already executed.\n"
        );
    }

    #[test]
    fn test_original_goal_strips_marker() {
        assert_eq!(
            original_goal("[CONTINUATION]Review the MSA"),
            "Review the MSA"
        );
        assert_eq!(original_goal("Review the MSA"), "Review the MSA");
    }
}
