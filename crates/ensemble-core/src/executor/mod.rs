//! Plan executor
//!
//! The executor is a recursive tree interpreter. It is responsible for:
//! - Driving each leaf step to the agent invoker
//! - The per-step status machine and its idempotent re-entry
//! - Skip bookkeeping when a sequence fails or pauses
//! - Settling every parallel sibling before reacting
//! - The two reserved-id suspension protocols
//!
//! A run owns its `ExecutionState` and returns the final snapshot in the
//! [`RunOutcome`]; every mutation it applies is also forwarded to the
//! run's [`StateSink`] so callers can mirror state by replay.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use futures_util::future::{BoxFuture, FutureExt};
use futures_util::stream::{FuturesUnordered, StreamExt};
use rand::Rng;
use serde_json::{json, Map, Value};
use thiserror::Error;
use tokio::sync::RwLock;
use tokio::time::sleep;

use crate::agent::{
    canonicalize_agent_id, error_marker, AgentInvoker, BRANCH_ORCHESTRATOR, HUMAN_ASSISTANT,
};
use crate::resolver::resolve_parameters;
use crate::types::{
    AgentCallStep, EventPreview, ExecutionState, ParallelStep, Plan, SequentialStep,
    SimulationMode, SimulationSettings, StateMutation, Step, StepId, StepStatus, TelemetryEvent,
    TelemetryKind,
};

const MAX_LOG_TEXT_CHARS: usize = 2_000;
const MAX_LOG_JSON_CHARS: usize = 8_000;
const DEFAULT_LATENCY_FLOOR: Duration = Duration::from_millis(500);
const DEFAULT_LATENCY_JITTER: Duration = Duration::from_millis(1_000);

fn truncate_for_log(input: &str, max_chars: usize) -> String {
    let char_count = input.chars().count();
    if char_count <= max_chars {
        return input.to_string();
    }
    let mut preview: String = input.chars().take(max_chars).collect();
    preview.push_str(&format!("... [truncated, total_chars={}]", char_count));
    preview
}

fn truncate_json_for_log(value: &Value, max_chars: usize) -> String {
    truncate_for_log(&value.to_string(), max_chars)
}

/// Receives every applied [`StateMutation`], synchronously and in apply
/// order. Implementations must not block.
pub trait StateSink: Send + Sync {
    fn publish(&self, mutation: &StateMutation);
}

/// Sink that drops every mutation.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullStateSink;

impl StateSink for NullStateSink {
    fn publish(&self, _mutation: &StateMutation) {}
}

/// Failure reported by the step-success notifier.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("step-success notification failed: {reason}")]
    Failed { reason: String },
}

impl NotifyError {
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed {
            reason: reason.into(),
        }
    }
}

/// Notified exactly once per human-input suspension.
#[async_trait]
pub trait HumanInputNotifier: Send + Sync {
    async fn on_human_input_required(&self, step_id: &StepId);
}

/// Notified after every step that completes its success path.
///
/// An error fails the enclosing step, overwriting its success.
#[async_trait]
pub trait StepSuccessNotifier: Send + Sync {
    async fn on_step_succeeded(
        &self,
        step: &Step,
        state: &ExecutionState,
    ) -> Result<(), NotifyError>;
}

/// Simulated latency applied before each real agent invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LatencyPolicy {
    /// Fixed delay before every invocation
    pub floor: Duration,
    /// Upper bound of the uniform random extra delay
    pub jitter: Duration,
}

impl LatencyPolicy {
    pub fn new(floor: Duration, jitter: Duration) -> Self {
        Self { floor, jitter }
    }

    /// No artificial delay at all
    pub fn zero() -> Self {
        Self {
            floor: Duration::ZERO,
            jitter: Duration::ZERO,
        }
    }

    /// Draw the delay for one invocation. Deterministic simulation
    /// suppresses the jitter so replays are stable.
    pub fn sample(&self, simulation: Option<&SimulationSettings>) -> Duration {
        let deterministic = matches!(
            simulation,
            Some(settings) if settings.mode == SimulationMode::Deterministic
        );
        let jitter_ms = self.jitter.as_millis() as u64;
        if deterministic || jitter_ms == 0 {
            return self.floor;
        }
        let extra = rand::thread_rng().gen_range(0..jitter_ms);
        self.floor + Duration::from_millis(extra)
    }
}

impl Default for LatencyPolicy {
    fn default() -> Self {
        Self {
            floor: DEFAULT_LATENCY_FLOOR,
            jitter: DEFAULT_LATENCY_JITTER,
        }
    }
}

/// A designed, non-error pause raised by the `human_assistant` protocol.
#[derive(Debug, Clone)]
pub struct Suspension {
    /// The step now awaiting input
    pub step_id: StepId,
    /// The resolved prompt to put to the human
    pub prompt: String,
}

/// A step failure being propagated up the tree.
#[derive(Debug, Clone)]
pub struct StepFailure {
    /// The step where the failure originated
    pub step_id: StepId,
    pub error: String,
}

/// Result of executing one step, returned (never thrown) up the tree.
#[derive(Debug, Clone)]
pub enum StepOutcome {
    /// The step produced an output
    Completed(Value),
    /// A descendant paused the run for human input
    Paused(Suspension),
    /// The step (or a descendant) failed
    Failed(StepFailure),
}

/// Terminal verdict of one run.
#[derive(Debug, Clone)]
pub enum RunVerdict {
    /// The root step completed; continuation suspensions may still be
    /// present in the final state
    Completed { output: Value },
    /// Paused for human input
    Paused { step_id: StepId, prompt: String },
    /// Failed; the error originated at `step_id`
    Failed { step_id: StepId, error: String },
}

/// What one call to [`PlanExecutor::execute`] hands back.
#[derive(Debug)]
pub struct RunOutcome {
    /// The final state snapshot, returned to the caller by ownership
    pub final_state: ExecutionState,
    pub verdict: RunVerdict,
}

impl RunOutcome {
    /// True only for a human-input pause. A `branch_orchestrator`
    /// suspension completes normally instead; discover it by scanning
    /// `final_state` (see `ExecutionState::awaiting_continuation_step`).
    pub fn was_paused(&self) -> bool {
        matches!(self.verdict, RunVerdict::Paused { .. })
    }
}

/// Owns the state for the duration of one run and funnels every write
/// through the mutation primitive plus the sink.
struct StateCell {
    state: RwLock<ExecutionState>,
    sink: Arc<dyn StateSink>,
}

impl StateCell {
    fn new(state: ExecutionState, sink: Arc<dyn StateSink>) -> Self {
        Self {
            state: RwLock::new(state),
            sink,
        }
    }

    async fn commit(&self, mutation: StateMutation) {
        let mut guard = self.state.write().await;
        guard.apply(&mutation);
        // Published under the lock so replay order equals apply order.
        self.sink.publish(&mutation);
    }

    async fn trace(&self, event: TelemetryEvent) {
        self.commit(StateMutation::TraceAppended { event }).await;
    }

    async fn resolve(&self, raw: &Map<String, Value>) -> Map<String, Value> {
        let guard = self.state.read().await;
        resolve_parameters(raw, &guard)
    }

    /// Short-circuit outcome for a step already in a settled status.
    async fn settled_outcome(&self, step_id: &StepId) -> Option<StepOutcome> {
        let guard = self.state.read().await;
        let record = guard.step(step_id)?;
        match record.status {
            StepStatus::Succeeded => Some(StepOutcome::Completed(record.output.clone())),
            StepStatus::Failed => {
                let error = record
                    .error
                    .clone()
                    .unwrap_or_else(|| format!("Step {} previously failed.", step_id));
                Some(StepOutcome::Failed(StepFailure {
                    step_id: step_id.clone(),
                    error,
                }))
            }
            StepStatus::Skipped => Some(StepOutcome::Completed(Value::Null)),
            _ => None,
        }
    }

    async fn snapshot(&self) -> ExecutionState {
        self.state.read().await.clone()
    }

    fn into_state(self) -> ExecutionState {
        self.state.into_inner()
    }
}

/// Recursive tree interpreter for one plan.
///
/// Construct with an [`AgentInvoker`], wire optional collaborators with
/// the `with_*` builders, then call [`execute`](Self::execute) with the
/// plan and the owned state. The same executor can run many plans.
pub struct PlanExecutor {
    invoker: Arc<dyn AgentInvoker>,
    state_sink: Arc<dyn StateSink>,
    human_input_notifier: Option<Arc<dyn HumanInputNotifier>>,
    step_success_notifier: Option<Arc<dyn StepSuccessNotifier>>,
    latency: LatencyPolicy,
}

impl PlanExecutor {
    pub fn new(invoker: Arc<dyn AgentInvoker>) -> Self {
        Self {
            invoker,
            state_sink: Arc::new(NullStateSink),
            human_input_notifier: None,
            step_success_notifier: None,
            latency: LatencyPolicy::default(),
        }
    }

    /// Mirror every applied mutation to the given sink
    pub fn with_state_sink(mut self, sink: Arc<dyn StateSink>) -> Self {
        self.state_sink = sink;
        self
    }

    /// Notify on human-input suspensions
    pub fn with_human_input_notifier(mut self, notifier: Arc<dyn HumanInputNotifier>) -> Self {
        self.human_input_notifier = Some(notifier);
        self
    }

    /// Notify after each step success
    pub fn with_step_success_notifier(mut self, notifier: Arc<dyn StepSuccessNotifier>) -> Self {
        self.step_success_notifier = Some(notifier);
        self
    }

    /// Override the simulated invocation latency
    pub fn with_latency(mut self, latency: LatencyPolicy) -> Self {
        self.latency = latency;
        self
    }

    /// Execute the plan's tree against the given state.
    ///
    /// The state is consumed; the final snapshot comes back in the
    /// outcome. Steps already settled in the state are not re-run, so
    /// handing a paused snapshot back in resumes where it left off.
    pub async fn execute(&self, plan: &Plan, state: ExecutionState) -> RunOutcome {
        tracing::info!(
            plan_id = %plan.plan_id,
            plan_name = %plan.name,
            "plan execution started"
        );
        let cell = StateCell::new(state, Arc::clone(&self.state_sink));
        let scope = RunScope {
            executor: self,
            plan,
            cell: &cell,
        };

        scope
            .plan_event(TelemetryKind::PlanExecutionStarted)
            .with_preview(EventPreview::message("Starting execution."))
            .commit(&cell)
            .await;

        let outcome = scope.execute_step(&plan.root).await;

        let verdict = match outcome {
            StepOutcome::Completed(output) => {
                scope
                    .plan_event(TelemetryKind::PlanExecutionFinished)
                    .with_preview(EventPreview::message("Execution completed."))
                    .commit(&cell)
                    .await;
                tracing::info!(plan_id = %plan.plan_id, "plan execution completed");
                RunVerdict::Completed { output }
            }
            StepOutcome::Paused(suspension) => {
                scope
                    .plan_event(TelemetryKind::PlanExecutionFinished)
                    .with_preview(EventPreview::message("Execution paused for user input."))
                    .commit(&cell)
                    .await;
                tracing::info!(
                    plan_id = %plan.plan_id,
                    step_id = %suspension.step_id,
                    "plan execution paused for user input"
                );
                RunVerdict::Paused {
                    step_id: suspension.step_id,
                    prompt: suspension.prompt,
                }
            }
            StepOutcome::Failed(failure) => {
                scope
                    .plan_event(TelemetryKind::PlanExecutionFinished)
                    .with_preview(EventPreview::message(format!(
                        "Execution failed: {}",
                        failure.error
                    )))
                    .commit(&cell)
                    .await;
                tracing::warn!(
                    plan_id = %plan.plan_id,
                    step_id = %failure.step_id,
                    error = %truncate_for_log(&failure.error, MAX_LOG_TEXT_CHARS),
                    "plan execution failed"
                );
                RunVerdict::Failed {
                    step_id: failure.step_id,
                    error: failure.error,
                }
            }
        };

        RunOutcome {
            final_state: cell.into_state(),
            verdict,
        }
    }
}

/// Borrowed context for one run.
struct RunScope<'r> {
    executor: &'r PlanExecutor,
    plan: &'r Plan,
    cell: &'r StateCell,
}

/// Event builder pending commitment to the run's trace.
struct PendingEvent {
    event: TelemetryEvent,
}

impl PendingEvent {
    fn with_step(mut self, step_id: impl Into<StepId>) -> Self {
        self.event = self.event.with_step(step_id);
        self
    }

    fn with_agent(mut self, agent_id: impl Into<String>) -> Self {
        self.event = self.event.with_agent(agent_id);
        self
    }

    fn with_preview(mut self, preview: EventPreview) -> Self {
        self.event = self.event.with_preview(preview);
        self
    }

    async fn commit(self, cell: &StateCell) {
        cell.trace(self.event).await;
    }
}

impl<'r> RunScope<'r> {
    fn plan_event(&self, kind: TelemetryKind) -> PendingEvent {
        PendingEvent {
            event: TelemetryEvent::new(kind, &self.plan.plan_id),
        }
    }

    fn step_event(&self, kind: TelemetryKind, step: &Step) -> PendingEvent {
        let mut pending = self.plan_event(kind).with_step(step.id());
        if let Step::AgentCall(leaf) = step {
            pending = pending.with_agent(&leaf.agent_id);
        }
        pending
    }

    /// Execute one step, honoring the settled-status short-circuits.
    fn execute_step<'s>(&'s self, step: &'s Step) -> BoxFuture<'s, StepOutcome> {
        async move {
            if let Some(settled) = self.cell.settled_outcome(step.id()).await {
                return settled;
            }

            self.cell
                .commit(StateMutation::StepStarted {
                    step_id: step.id().clone(),
                    started_at: Utc::now(),
                })
                .await;
            self.step_event(TelemetryKind::StepStarted, step)
                .commit(self.cell)
                .await;
            tracing::debug!(step_id = %step.id(), "step started");

            let dispatch = match step {
                Step::AgentCall(leaf) => self.execute_agent_call(leaf).await,
                Step::Sequential(sequence) => self.execute_sequential(sequence).await,
                Step::Parallel(parallel) => self.execute_parallel(parallel).await,
            };

            match dispatch {
                StepOutcome::Completed(output) => {
                    // The success write is guarded: a step moved to an
                    // awaiting status by its own protocol keeps it.
                    self.cell
                        .commit(StateMutation::StepSucceeded {
                            step_id: step.id().clone(),
                            output: output.clone(),
                            ended_at: Utc::now(),
                        })
                        .await;
                    self.step_event(TelemetryKind::StepSucceeded, step)
                        .with_preview(EventPreview::output_of(&output))
                        .commit(self.cell)
                        .await;
                    tracing::debug!(
                        step_id = %step.id(),
                        output = %truncate_json_for_log(&output, MAX_LOG_JSON_CHARS),
                        "step succeeded"
                    );

                    if let Some(notifier) = &self.executor.step_success_notifier {
                        let snapshot = self.cell.snapshot().await;
                        if let Err(refusal) = notifier.on_step_succeeded(step, &snapshot).await {
                            return self.fail_step(step, refusal.to_string()).await;
                        }
                    }

                    StepOutcome::Completed(output)
                }
                StepOutcome::Paused(suspension) => StepOutcome::Paused(suspension),
                StepOutcome::Failed(failure) => {
                    self.cell
                        .commit(StateMutation::StepFailed {
                            step_id: step.id().clone(),
                            error: failure.error.clone(),
                            ended_at: Utc::now(),
                        })
                        .await;
                    self.step_event(TelemetryKind::StepFailed, step)
                        .with_preview(EventPreview::error(failure.error.clone()))
                        .commit(self.cell)
                        .await;
                    tracing::warn!(
                        step_id = %step.id(),
                        error = %truncate_for_log(&failure.error, MAX_LOG_TEXT_CHARS),
                        "step failed"
                    );
                    StepOutcome::Failed(failure)
                }
            }
        }
        .boxed()
    }

    /// Mark this step failed and propagate; used when the success path
    /// itself fails (notifier refusal).
    async fn fail_step(&self, step: &Step, error: String) -> StepOutcome {
        self.cell
            .commit(StateMutation::StepFailed {
                step_id: step.id().clone(),
                error: error.clone(),
                ended_at: Utc::now(),
            })
            .await;
        self.step_event(TelemetryKind::StepFailed, step)
            .with_preview(EventPreview::error(error.clone()))
            .commit(self.cell)
            .await;
        tracing::warn!(
            step_id = %step.id(),
            error = %truncate_for_log(&error, MAX_LOG_TEXT_CHARS),
            "step failed"
        );
        StepOutcome::Failed(StepFailure {
            step_id: step.id().clone(),
            error,
        })
    }

    async fn execute_agent_call(&self, leaf: &AgentCallStep) -> StepOutcome {
        let parameters = self.cell.resolve(&leaf.parameters).await;
        self.cell
            .commit(StateMutation::ParametersResolved {
                step_id: leaf.id.clone(),
                parameters: parameters.clone(),
            })
            .await;

        let canonical = canonicalize_agent_id(&leaf.agent_id);
        if canonical != leaf.agent_id {
            self.plan_event(TelemetryKind::DependencyAnalysis)
                .with_step(&leaf.id)
                .with_agent(canonical.clone())
                .with_preview(EventPreview::message(format!(
                    "Sanitized agent_id from \"{}\" to \"{}\"",
                    leaf.agent_id, canonical
                )))
                .commit(self.cell)
                .await;
        }

        if canonical == HUMAN_ASSISTANT {
            self.cell
                .commit(StateMutation::StepSuspended {
                    step_id: leaf.id.clone(),
                    status: StepStatus::AwaitingInput,
                })
                .await;
            let prompt = parameter_text(&parameters, "prompt");
            self.plan_event(TelemetryKind::HitlRequested)
                .with_step(&leaf.id)
                .with_agent(canonical)
                .with_preview(EventPreview::message(format!(
                    "Awaiting user input for: \"{prompt}\""
                )))
                .commit(self.cell)
                .await;
            if let Some(notifier) = &self.executor.human_input_notifier {
                notifier.on_human_input_required(&leaf.id).await;
            }
            return StepOutcome::Paused(Suspension {
                step_id: leaf.id.clone(),
                prompt,
            });
        }

        if canonical == BRANCH_ORCHESTRATOR {
            self.cell
                .commit(StateMutation::StepSuspended {
                    step_id: leaf.id.clone(),
                    status: StepStatus::AwaitingContinuation,
                })
                .await;
            let condition = parameter_text(&parameters, "conditionsPrompt");
            self.plan_event(TelemetryKind::ContinuationRequired)
                .with_step(&leaf.id)
                .with_agent(canonical)
                .with_preview(EventPreview::message(format!(
                    "Plan paused for conditional execution. Condition: \"{condition}\""
                )))
                .commit(self.cell)
                .await;
            // Success-shaped so an enclosing sequence keeps going; the
            // suspended status survives the guarded success write.
            return StepOutcome::Completed(json!({
                "result": "Paused for continuation. The App will re-plan."
            }));
        }

        let delay = self.executor.latency.sample(self.plan.simulation.as_ref());
        if !delay.is_zero() {
            sleep(delay).await;
        }

        tracing::debug!(step_id = %leaf.id, agent_id = %canonical, "invoking agent");
        match self.executor.invoker.invoke(&canonical, &parameters).await {
            Ok(output) => match error_marker(&output) {
                Some(error) => StepOutcome::Failed(StepFailure {
                    step_id: leaf.id.clone(),
                    error,
                }),
                None => StepOutcome::Completed(output),
            },
            Err(refusal) => StepOutcome::Failed(StepFailure {
                step_id: leaf.id.clone(),
                error: refusal.to_string(),
            }),
        }
    }

    async fn execute_sequential(&self, sequence: &SequentialStep) -> StepOutcome {
        let mut last_output = Value::Null;
        for (index, task) in sequence.tasks.iter().enumerate() {
            match self.execute_step(task).await {
                StepOutcome::Completed(output) => last_output = output,
                abnormal => {
                    for sibling in &sequence.tasks[index + 1..] {
                        self.skip_subtree(sibling).await;
                    }
                    return abnormal;
                }
            }
        }
        StepOutcome::Completed(last_output)
    }

    async fn execute_parallel(&self, parallel: &ParallelStep) -> StepOutcome {
        let mut in_flight = FuturesUnordered::new();
        for (index, task) in parallel.tasks.iter().enumerate() {
            in_flight.push(async move { (index, self.execute_step(task).await) });
        }

        // Every sibling settles before we react; a failing sibling must
        // never abandon the others.
        let mut settled: Vec<StepOutcome> = parallel
            .tasks
            .iter()
            .map(|_| StepOutcome::Completed(Value::Null))
            .collect();
        while let Some((index, outcome)) = in_flight.next().await {
            settled[index] = outcome;
        }

        if let Some(position) = settled
            .iter()
            .position(|outcome| matches!(outcome, StepOutcome::Paused(_)))
        {
            return settled.swap_remove(position);
        }
        if let Some(position) = settled
            .iter()
            .position(|outcome| matches!(outcome, StepOutcome::Failed(_)))
        {
            return settled.swap_remove(position);
        }

        self.plan_event(TelemetryKind::ParallelJoined)
            .with_step(&parallel.id)
            .commit(self.cell)
            .await;

        let mut joined = Map::new();
        for (task, outcome) in parallel.tasks.iter().zip(settled) {
            let value = match outcome {
                StepOutcome::Completed(value) => value,
                // Unreachable: abnormal outcomes returned above.
                _ => Value::Null,
            };
            joined.insert(task.id().to_string(), value);
        }
        StepOutcome::Completed(Value::Object(joined))
    }

    /// Skip-mark a sibling subtree that will not run this pass. The
    /// pending-only guard leaves already-touched steps alone.
    async fn skip_subtree(&self, step: &Step) {
        for step_id in step.subtree_ids() {
            self.cell
                .commit(StateMutation::StepSkipped {
                    step_id: step_id.clone(),
                })
                .await;
        }
    }
}

/// Text rendition of one resolved parameter for prompt-bearing events.
fn parameter_text(parameters: &Map<String, Value>, key: &str) -> String {
    match parameters.get(key) {
        Some(Value::String(text)) => text.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    }
}
