#![allow(dead_code)]

use async_trait::async_trait;
use harness_runner::condition::ResponsePayload;
use harness_runner::interfaces::{
    CompletionChecker, CompletionStatus, Display, FeedbackContext, InputCollector, JobStatus,
    MessageLevel, ModeRunner, StepPhase, WorkflowStatus,
};
use harness_runner::model::{Progress, Question};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

/// A mode runner whose steps each pull from a scripted queue of responses,
/// one per `run_step` call — lets a single step be run more than once
/// (retried, or re-run after feedback is collected) with a different result
/// each time. Falls back to an "all steps completed" success once a step's
/// queue runs dry. Every field is interior-mutable so the same instance can
/// be wrapped in an `Arc` (see [`SharedModeRunner`]) and inspected by a test
/// after the harness is done driving it through a `Box<dyn ModeRunner>`.
pub struct ScriptedModeRunner {
    steps: Vec<String>,
    queues: Mutex<HashMap<String, VecDeque<anyhow::Result<ResponsePayload>>>>,
    completed: Mutex<Vec<String>>,
    cursor: Mutex<usize>,
    visited: Mutex<Vec<String>>,
    progress_override: Option<Progress>,
}

impl ScriptedModeRunner {
    pub fn new(steps: &[&str]) -> Self {
        Self {
            steps: steps.iter().map(|s| s.to_string()).collect(),
            queues: Mutex::new(HashMap::new()),
            completed: Mutex::new(Vec::new()),
            cursor: Mutex::new(0),
            visited: Mutex::new(Vec::new()),
            progress_override: None,
        }
    }

    /// Builds a runner whose cursor already sits past the first `cursor`
    /// steps, simulating a mode runner that resumed its own progress
    /// independently of the harness's checkpoint.
    pub fn starting_at(steps: &[&str], cursor: usize) -> Self {
        Self {
            cursor: Mutex::new(cursor),
            ..Self::new(steps)
        }
    }

    pub fn with_progress(mut self, progress: Progress) -> Self {
        self.progress_override = Some(progress);
        self
    }

    pub fn push_response(&self, step: &str, response: anyhow::Result<ResponsePayload>) {
        self.queues
            .lock()
            .unwrap()
            .entry(step.to_string())
            .or_default()
            .push_back(response);
    }

    pub fn visited_steps(&self) -> Vec<String> {
        self.visited.lock().unwrap().clone()
    }

    pub fn completed_steps(&self) -> Vec<String> {
        self.completed.lock().unwrap().clone()
    }

    fn next_step_impl(&self) -> Option<String> {
        let idx = *self.cursor.lock().unwrap();
        self.steps.get(idx).cloned()
    }

    fn run_step_impl(&self, name: &str) -> anyhow::Result<ResponsePayload> {
        self.visited.lock().unwrap().push(name.to_string());
        let mut queues = self.queues.lock().unwrap();
        let queue = queues.entry(name.to_string()).or_default();
        match queue.pop_front() {
            Some(result) => result,
            None => Ok(ResponsePayload {
                output: Some("all steps completed".into()),
                ..Default::default()
            }),
        }
    }

    fn progress_impl(&self) -> Progress {
        if let Some(p) = &self.progress_override {
            return p.clone();
        }
        Progress {
            completed_steps: self.completed.lock().unwrap().clone(),
            current_step: self.next_step_impl(),
            total_steps: self.steps.len(),
        }
    }

    fn all_steps_completed_impl(&self) -> bool {
        self.completed.lock().unwrap().len() == self.steps.len()
    }

    fn mark_step_completed_impl(&self, name: &str) {
        self.completed.lock().unwrap().push(name.to_string());
        *self.cursor.lock().unwrap() += 1;
    }
}

#[async_trait]
impl ModeRunner for ScriptedModeRunner {
    fn next_step(&self) -> Option<String> {
        self.next_step_impl()
    }

    async fn run_step(
        &mut self,
        name: &str,
        _user_input: &HashMap<String, String>,
    ) -> anyhow::Result<ResponsePayload> {
        self.run_step_impl(name)
    }

    fn all_steps(&self) -> Vec<String> {
        self.steps.clone()
    }

    fn progress(&self) -> Progress {
        self.progress_impl()
    }

    fn all_steps_completed(&self) -> bool {
        self.all_steps_completed_impl()
    }

    fn mark_step_in_progress(&mut self, _name: &str) {}

    fn mark_step_completed(&mut self, name: &str) {
        self.mark_step_completed_impl(name);
    }
}

/// Wraps a shared `Arc<ScriptedModeRunner>` so the harness can own a
/// `Box<dyn ModeRunner>` while the test keeps its own handle for
/// post-run assertions. All mutation goes through the inner Mutex-guarded
/// state, so `&mut self` here is a formality the trait requires, not an
/// actual exclusivity need.
pub struct SharedModeRunner(pub Arc<ScriptedModeRunner>);

impl SharedModeRunner {
    /// Returns a handle for assertions plus the boxed trait object to hand
    /// to `Runner::new`.
    pub fn wrap(inner: ScriptedModeRunner) -> (Arc<ScriptedModeRunner>, Box<dyn ModeRunner>) {
        let arc = Arc::new(inner);
        let boxed: Box<dyn ModeRunner> = Box::new(SharedModeRunner(arc.clone()));
        (arc, boxed)
    }
}

#[async_trait]
impl ModeRunner for SharedModeRunner {
    fn next_step(&self) -> Option<String> {
        self.0.next_step_impl()
    }

    async fn run_step(
        &mut self,
        name: &str,
        _user_input: &HashMap<String, String>,
    ) -> anyhow::Result<ResponsePayload> {
        self.0.run_step_impl(name)
    }

    fn all_steps(&self) -> Vec<String> {
        self.0.steps.clone()
    }

    fn progress(&self) -> Progress {
        self.0.progress_impl()
    }

    fn all_steps_completed(&self) -> bool {
        self.0.all_steps_completed_impl()
    }

    fn mark_step_in_progress(&mut self, _name: &str) {}

    fn mark_step_completed(&mut self, name: &str) {
        self.0.mark_step_completed_impl(name);
    }
}

/// A completion checker that always reports the same fixed verdict.
pub struct FixedCompletionChecker {
    all_complete: bool,
    summary: String,
}

impl FixedCompletionChecker {
    pub fn complete(summary: &str) -> Self {
        Self {
            all_complete: true,
            summary: summary.to_string(),
        }
    }

    pub fn incomplete(summary: &str) -> Self {
        Self {
            all_complete: false,
            summary: summary.to_string(),
        }
    }
}

#[async_trait]
impl CompletionChecker for FixedCompletionChecker {
    async fn completion_status(&self) -> anyhow::Result<CompletionStatus> {
        Ok(CompletionStatus {
            all_complete: self.all_complete,
            summary: self.summary.clone(),
        })
    }
}

/// A display that records everything it's told, so a test can assert on
/// exactly which messages and job lifecycle events the runner emitted.
#[derive(Default)]
pub struct RecordingDisplay {
    messages: Mutex<Vec<(String, MessageLevel)>>,
    jobs_added: Mutex<Vec<String>>,
    jobs_removed: Mutex<Vec<String>>,
    stopped: Mutex<bool>,
}

impl RecordingDisplay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages_at(&self, level: MessageLevel) -> Vec<String> {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, l)| *l == level)
            .map(|(m, _)| m.clone())
            .collect()
    }

    pub fn jobs_added(&self) -> Vec<String> {
        self.jobs_added.lock().unwrap().clone()
    }

    pub fn jobs_removed(&self) -> Vec<String> {
        self.jobs_removed.lock().unwrap().clone()
    }

    pub fn was_stopped(&self) -> bool {
        *self.stopped.lock().unwrap()
    }
}

impl Display for RecordingDisplay {
    fn show_message(&self, text: &str, level: MessageLevel) {
        self.messages.lock().unwrap().push((text.to_string(), level));
    }

    fn add_job(&self, id: &str, _job: JobStatus) {
        self.jobs_added.lock().unwrap().push(id.to_string());
    }

    fn update_job(&self, _id: &str, _patch: JobStatus) {}

    fn remove_job(&self, id: &str) {
        self.jobs_removed.lock().unwrap().push(id.to_string());
    }

    fn show_step_execution(&self, _name: &str, _phase: StepPhase, _details: &str) {}

    fn show_workflow_status(&self, _status: WorkflowStatus) {}

    fn start_display_loop(&self) {}

    fn stop_display_loop(&self) {
        *self.stopped.lock().unwrap() = true;
    }
}

/// Shares a `RecordingDisplay` between the harness (which needs an owned
/// `Box<dyn Display>`) and the test (which wants to inspect it afterward).
pub struct SharedDisplay(pub Arc<RecordingDisplay>);

impl SharedDisplay {
    pub fn wrap() -> (Arc<RecordingDisplay>, Box<dyn Display>) {
        let inner = Arc::new(RecordingDisplay::new());
        let boxed: Box<dyn Display> = Box::new(SharedDisplay(inner.clone()));
        (inner, boxed)
    }
}

impl Display for SharedDisplay {
    fn show_message(&self, text: &str, level: MessageLevel) {
        self.0.show_message(text, level)
    }

    fn add_job(&self, id: &str, job: JobStatus) {
        self.0.add_job(id, job)
    }

    fn update_job(&self, id: &str, patch: JobStatus) {
        self.0.update_job(id, patch)
    }

    fn remove_job(&self, id: &str) {
        self.0.remove_job(id)
    }

    fn show_step_execution(&self, name: &str, phase: StepPhase, details: &str) {
        self.0.show_step_execution(name, phase, details)
    }

    fn show_workflow_status(&self, status: WorkflowStatus) {
        self.0.show_workflow_status(status)
    }

    fn start_display_loop(&self) {
        self.0.start_display_loop()
    }

    fn stop_display_loop(&self) {
        self.0.stop_display_loop()
    }
}

/// An input collector that returns a fixed set of answers and records the
/// context it was called with, so a test can assert the runner passed the
/// right step name through.
pub struct ScriptedInputCollector {
    answers: HashMap<String, String>,
    seen_contexts: Mutex<Vec<FeedbackContext>>,
}

impl ScriptedInputCollector {
    pub fn new(answers: &[(&str, &str)]) -> Self {
        Self {
            answers: answers
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            seen_contexts: Mutex::new(Vec::new()),
        }
    }

    pub fn contexts_seen(&self) -> Vec<FeedbackContext> {
        self.seen_contexts.lock().unwrap().clone()
    }
}

#[async_trait]
impl InputCollector for ScriptedInputCollector {
    async fn collect_feedback(
        &self,
        _questions: &[Question],
        context: &FeedbackContext,
    ) -> anyhow::Result<HashMap<String, String>> {
        self.seen_contexts.lock().unwrap().push(context.clone());
        Ok(self.answers.clone())
    }
}

/// Shares a `ScriptedInputCollector` the same way [`SharedDisplay`] does.
pub struct SharedInputCollector(pub Arc<ScriptedInputCollector>);

impl SharedInputCollector {
    pub fn wrap(inner: ScriptedInputCollector) -> (Arc<ScriptedInputCollector>, Box<dyn InputCollector>) {
        let arc = Arc::new(inner);
        let boxed: Box<dyn InputCollector> = Box::new(SharedInputCollector(arc.clone()));
        (arc, boxed)
    }
}

#[async_trait]
impl InputCollector for SharedInputCollector {
    async fn collect_feedback(
        &self,
        questions: &[Question],
        context: &FeedbackContext,
    ) -> anyhow::Result<HashMap<String, String>> {
        self.0.collect_feedback(questions, context).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scripted_mode_runner_reports_its_first_step() {
        let runner = ScriptedModeRunner::new(&["a", "b"]);
        assert_eq!(runner.next_step(), Some("a".to_string()));
    }

    #[test]
    fn scripted_mode_runner_can_start_mid_workflow() {
        let runner = ScriptedModeRunner::starting_at(&["a", "b", "c"], 1);
        assert_eq!(runner.next_step(), Some("b".to_string()));
    }

    #[test]
    fn recording_display_tracks_messages_by_level() {
        let display = RecordingDisplay::new();
        display.show_message("hi", MessageLevel::Warning);
        assert_eq!(
            display.messages_at(MessageLevel::Warning),
            vec!["hi".to_string()]
        );
        assert!(display.messages_at(MessageLevel::Error).is_empty());
    }
}
