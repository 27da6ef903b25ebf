//! The supervisor loop: the runner's state machine, dispatching steps to a
//! mode runner and reacting to what the condition detector reports.

use crate::condition;
use crate::config::{HarnessConfig, StepFailurePolicy};
use crate::errors::{RunnerError, RunnerResult};
use crate::interfaces::{
    CompletionChecker, Display, FeedbackContext, IdentityFilter, InputCollector, JobStatus,
    MessageLevel, ModeRunner, OutputFilter, StepPhase, WorkflowStatus,
};
use crate::model::{LogLevel, Mode, RunnerPhase, RunnerState};
use crate::provider::ProviderManager;
use crate::retry::{Outcome, RetryEngine};
use crate::state::StateManager;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{error, info, instrument, warn};

/// How long a completed job entry lingers on the Display before the
/// background task that was spawned for it removes it.
const JOB_REMOVAL_DELAY: Duration = Duration::from_secs(5);

pub struct Runner {
    state: RunnerState,
    providers: ProviderManager,
    retry: RetryEngine,
    state_mgr: StateManager,
    mode_runner: Box<dyn ModeRunner>,
    completion_checker: Box<dyn CompletionChecker>,
    display: Arc<dyn Display>,
    input_collector: Box<dyn InputCollector>,
    output_filter: Box<dyn OutputFilter>,
    on_exhausted_retries: StepFailurePolicy,
    background: JoinSet<()>,
}

/// Terminal result of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    pub state: RunnerPhase,
    pub summary: String,
}

impl Runner {
    pub fn new(
        mode: Mode,
        config: &HarnessConfig,
        state_mgr: StateManager,
        mode_runner: Box<dyn ModeRunner>,
        completion_checker: Box<dyn CompletionChecker>,
        display: Box<dyn Display>,
        input_collector: Box<dyn InputCollector>,
    ) -> Self {
        let providers = ProviderManager::new(&config.providers, config.circuit_breaker);
        let retry = RetryEngine::new(config.retry.clone());
        Self {
            state: RunnerState::new(mode),
            providers,
            retry,
            state_mgr,
            mode_runner,
            completion_checker,
            display: Arc::from(display),
            input_collector,
            output_filter: Box::new(IdentityFilter),
            on_exhausted_retries: config.on_exhausted_retries,
            background: JoinSet::new(),
        }
    }

    /// Resumes from a previously persisted checkpoint, if one exists.
    pub fn resume(&mut self) -> RunnerResult<bool> {
        if !self.state_mgr.has_state() {
            return Ok(false);
        }
        self.state = self.state_mgr.load_state()?;
        info!(current_step = ?self.state.current_step, "resumed from checkpoint");
        Ok(true)
    }

    pub fn pause(&mut self) {
        self.state.state = RunnerPhase::Paused;
    }

    pub fn resume_from_pause(&mut self) {
        self.state.state = RunnerPhase::Running;
    }

    pub fn stop(&mut self) {
        self.state.state = RunnerPhase::Stopped;
    }

    /// Runs the supervisor loop to completion (or a terminal failure).
    #[instrument(skip(self))]
    pub async fn run(&mut self) -> RunnerResult<RunOutcome> {
        self.display.start_display_loop();
        self.state.state = RunnerPhase::Running;

        let outcome = self.run_loop().await;

        self.cleanup().await;

        outcome
    }

    async fn run_loop(&mut self) -> RunnerResult<RunOutcome> {
        loop {
            self.state_mgr.save_state(&self.state)?;

            if self.state.state.should_stop() {
                return self.finalize().await;
            }

            if self.state.state.should_pause() {
                let nap = if self.state.state == RunnerPhase::Paused {
                    Duration::from_secs(1)
                } else {
                    Duration::from_millis(0)
                };
                tokio::time::sleep(nap).await;
                continue;
            }

            let Some(step_name) = self.mode_runner.next_step() else {
                return self.finalize().await;
            };

            self.mode_runner.mark_step_in_progress(&step_name);
            self.state.current_step = Some(step_name.clone());
            self.display
                .show_step_execution(&step_name, StepPhase::Starting, "");
            self.display.add_job(
                &step_name,
                JobStatus {
                    name: step_name.clone(),
                    status: "running".into(),
                    progress: 0.0,
                    provider: Some(self.providers.current_provider().to_string()),
                    message: None,
                },
            );

            let resp = {
                let step_name_for_closure = step_name.clone();
                let user_input_snapshot = self.state.user_input.clone();
                let providers = &mut self.providers;
                let retry = &self.retry;
                let mode_runner = &mut self.mode_runner;
                let state_phase = &mut self.state.state;
                let display = &self.display;

                retry
                    .execute_with_retry(
                        &step_name,
                        providers,
                        async |_provider| {
                            mode_runner
                                .run_step(&step_name_for_closure, &user_input_snapshot)
                                .await
                        },
                        |waiting| {
                            *state_phase = if waiting {
                                display.show_message(
                                    "all providers rate-limited, waiting for reset",
                                    MessageLevel::Warning,
                                );
                                RunnerPhase::WaitingForRateLimit
                            } else {
                                RunnerPhase::Running
                            };
                        },
                    )
                    .await
            };

            match resp {
                Ok(Outcome::Success(mut payload)) => {
                    if let Some(output) = &payload.output {
                        payload.output = Some(self.output_filter.filter(output));
                    }
                    self.handle_response(&step_name, payload).await?;
                }
                Ok(Outcome::NonRetryable(reason)) => {
                    self.display
                        .show_message(&reason, MessageLevel::Error);
                    self.state_mgr
                        .add_execution_log(&mut self.state, LogLevel::Error, reason, vec![])?;
                    self.state.state = RunnerPhase::Error;
                }
                Err(RunnerError::MaxRetriesExceeded { step, attempts }) => {
                    warn!(step, attempts, "step exhausted retries");
                    let reason = format!("step '{step}' exhausted its retry budget after {attempts} attempts");
                    self.display.show_message(&reason, MessageLevel::Error);
                    self.state_mgr
                        .add_execution_log(&mut self.state, LogLevel::Error, reason, vec![])?;
                    match self.on_exhausted_retries {
                        StepFailurePolicy::Advance => {
                            self.mode_runner.mark_step_completed(&step);
                        }
                        StepFailurePolicy::Terminate => {
                            self.state.state = RunnerPhase::Error;
                        }
                    }
                }
                Err(other) => {
                    error!(error = %other, "unrecoverable runner error");
                    self.display
                        .show_message(&other.to_string(), MessageLevel::Error);
                    self.state_mgr.add_execution_log(
                        &mut self.state,
                        LogLevel::Error,
                        other.to_string(),
                        vec![],
                    )?;
                    self.state.state = RunnerPhase::Error;
                    return Err(other);
                }
            }

            self.spawn_job_removal(step_name.clone());
            self.display.show_workflow_status(self.workflow_status());
        }
    }

    /// Schedules removal of `step_name`'s Display job entry after a short
    /// delay, tracked in `self.background` so `cleanup` can join it.
    fn spawn_job_removal(&mut self, step_name: String) {
        let display = Arc::clone(&self.display);
        self.background.spawn(async move {
            tokio::time::sleep(JOB_REMOVAL_DELAY).await;
            display.remove_job(&step_name);
        });
    }

    async fn handle_response(
        &mut self,
        step_name: &str,
        payload: condition::ResponsePayload,
    ) -> RunnerResult<()> {
        if condition::needs_user_feedback(&payload) {
            let questions = condition::extract_questions(&payload);
            if !questions.is_empty() {
                self.state.state = RunnerPhase::WaitingForUser;
                self.state_mgr.save_state(&self.state)?;
                let context = FeedbackContext {
                    step_name: step_name.to_string(),
                    mode: self.state.mode,
                };
                let answers = self
                    .input_collector
                    .collect_feedback(&questions, &context)
                    .await
                    .map_err(RunnerError::Other)?;
                for (key, value) in answers {
                    self.state_mgr.add_user_input(&mut self.state, key, value)?;
                }
                self.state.state = RunnerPhase::Running;
                return Ok(());
            }
        }

        let progress = self.mode_runner.progress();
        let completion = condition::is_work_complete(&payload, &progress);
        if completion.is_complete {
            self.mode_runner.mark_step_completed(step_name);
            self.display
                .show_step_execution(step_name, StepPhase::Completed, "");
        } else {
            self.display
                .show_step_execution(step_name, StepPhase::Completed, "in progress");
        }
        Ok(())
    }

    fn workflow_status(&self) -> WorkflowStatus {
        let progress = self.mode_runner.progress();
        let progress_percentage = progress.percentage();
        WorkflowStatus {
            workflow_type: format!("{:?}", self.state.mode),
            steps: progress.total_steps,
            completed_steps: progress.completed_steps.len(),
            current_step: progress.current_step,
            progress_percentage,
        }
    }

    async fn finalize(&mut self) -> RunnerResult<RunOutcome> {
        if self.state.state.should_stop() {
            return Ok(RunOutcome {
                state: self.state.state,
                summary: "stopped before completion".into(),
            });
        }

        let status = self
            .completion_checker
            .completion_status()
            .await
            .map_err(RunnerError::Other)?;

        self.state.state = if status.all_complete {
            RunnerPhase::Completed
        } else {
            RunnerPhase::Error
        };
        self.state_mgr.save_state(&self.state)?;

        Ok(RunOutcome {
            state: self.state.state,
            summary: status.summary,
        })
    }

    async fn cleanup(&mut self) {
        let _ = self.state_mgr.save_state(&self.state);
        if let Some(step) = &self.state.current_step {
            self.display.remove_job(step);
        }
        // Job entries are already removed above; the delayed removal tasks
        // would be redundant, so cancel rather than wait them out.
        self.background.abort_all();
        while self.background.join_next().await.is_some() {}
        self.display.stop_display_loop();
    }

    pub fn state(&self) -> &RunnerState {
        &self.state
    }
}
