//! External collaborator traits the runner is generic over: mode runners,
//! completion checking, display, and user input collection, plus the small
//! secondary-helper interfaces (usage tracking, model catalog, output
//! filtering) that are documented but not part of the hard core.

use crate::condition::ResponsePayload;
use crate::model::{Mode, Progress, Question, Tier};
use async_trait::async_trait;
use std::collections::HashMap;

/// Drives one mode's (analyze/execute) workflow. The runner never knows
/// what a step actually does — only that it can be asked for, run, and
/// reported on.
#[async_trait]
pub trait ModeRunner: Send + Sync {
    /// Name of the next step to run, or `None` if the workflow is drained.
    fn next_step(&self) -> Option<String>;

    /// Runs a step, given any previously collected user input.
    async fn run_step(
        &mut self,
        name: &str,
        user_input: &HashMap<String, String>,
    ) -> anyhow::Result<ResponsePayload>;

    fn all_steps(&self) -> Vec<String>;

    fn progress(&self) -> Progress;

    fn all_steps_completed(&self) -> bool;

    fn mark_step_in_progress(&mut self, name: &str);

    fn mark_step_completed(&mut self, name: &str);
}

/// Final-verdict collaborator, distinct from "all configured steps ran":
/// lets a mode runner assert real-world completion criteria.
#[async_trait]
pub trait CompletionChecker: Send + Sync {
    async fn completion_status(&self) -> anyhow::Result<CompletionStatus>;
}

pub struct CompletionStatus {
    pub all_complete: bool,
    pub summary: String,
}

/// Status event sink. Implementations MUST be internally synchronized since
/// the update loop may read while the supervisor task writes.
pub trait Display: Send + Sync {
    fn show_message(&self, text: &str, level: MessageLevel);
    fn add_job(&self, id: &str, job: JobStatus);
    fn update_job(&self, id: &str, patch: JobStatus);
    fn remove_job(&self, id: &str);
    fn show_step_execution(&self, name: &str, phase: StepPhase, details: &str);
    fn show_workflow_status(&self, status: WorkflowStatus);
    fn start_display_loop(&self);
    fn stop_display_loop(&self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageLevel {
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone)]
pub struct JobStatus {
    pub name: String,
    pub status: String,
    pub progress: f64,
    pub provider: Option<String>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepPhase {
    Starting,
    Completed,
    Failed,
}

#[derive(Debug, Clone)]
pub struct WorkflowStatus {
    pub workflow_type: String,
    pub steps: usize,
    pub completed_steps: usize,
    pub current_step: Option<String>,
    pub progress_percentage: f64,
}

/// What the run was doing when it surfaced questions, so a collector can
/// show the operator where the answers will be used.
#[derive(Debug, Clone)]
pub struct FeedbackContext {
    pub step_name: String,
    pub mode: Mode,
}

/// Blocks on collecting answers to a batch of questions.
#[async_trait]
pub trait InputCollector: Send + Sync {
    async fn collect_feedback(
        &self,
        questions: &[Question],
        context: &FeedbackContext,
    ) -> anyhow::Result<HashMap<String, String>>;
}

// ---------------------------------------------------------------------------
// Secondary helpers (bounded, not part of the hard core)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct UsageSnapshot {
    pub tokens_in: u64,
    pub tokens_out: u64,
    pub cost_usd: f64,
}

/// Records per-provider usage. No pricing table — callers supply cost.
pub trait UsageTracker: Send + Sync {
    fn record(&mut self, provider: &str, tokens_in: u64, tokens_out: u64, cost_usd: f64);
    fn usage_for(&self, provider: &str) -> UsageSnapshot;
}

/// Looks up a model's capability tier from static configuration. No network
/// discovery.
pub trait ModelCatalog: Send + Sync {
    fn tier_of(&self, provider: &str, model: &str) -> Option<Tier>;
}

/// Transforms agent output before it reaches the condition detector.
pub trait OutputFilter: Send + Sync {
    fn filter(&self, output: &str) -> String;
}

/// Default filter: passes output through unchanged.
pub struct IdentityFilter;

impl OutputFilter for IdentityFilter {
    fn filter(&self, output: &str) -> String {
        output.to_string()
    }
}
