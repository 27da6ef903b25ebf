//! Runner CLI — thin entry point that wires the harness's core subsystems
//! together for a single invocation.
//!
//! The core crate (`harness_runner`) never touches a file, an environment
//! variable, or stdin; this binary is where that happens: it loads a YAML
//! configuration, builds a console [`Display`] and a stdin
//! [`InputCollector`], drives a demo [`ModeRunner`] over a fixed step list,
//! and reports the outcome.

use clap::{Parser, Subcommand};
use harness_runner::condition::ResponsePayload;
use harness_runner::config::loader;
use harness_runner::interfaces::{
    CompletionChecker, CompletionStatus, Display, FeedbackContext, InputCollector, JobStatus,
    MessageLevel, ModeRunner, StepPhase, WorkflowStatus,
};
use harness_runner::model::{Mode, Progress, Question};
use harness_runner::runner::Runner;
use harness_runner::state::StateManager;
use harness_runner::telemetry::{init_telemetry, shutdown_telemetry, TelemetryConfig};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::{error, info};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "harness-runner")]
#[command(about = "Supervisor loop for a multi-step AI agent workflow", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Runs the harness against a configuration file and a fixed list of
    /// step names (a stand-in for a real mode runner's workflow source).
    Run {
        /// Path to the YAML harness configuration.
        #[arg(short, long)]
        config: PathBuf,

        /// Comma-separated step names to execute in order.
        #[arg(long, value_delimiter = ',')]
        steps: Vec<String>,

        /// Directory used for durable checkpoints.
        #[arg(long, default_value = "./harness-state")]
        state_dir: PathBuf,

        /// Resume a prior run instead of starting fresh.
        #[arg(long)]
        run_id: Option<String>,

        #[arg(long, default_value = "false")]
        otel: bool,

        #[arg(long)]
        otel_endpoint: Option<String>,

        #[arg(long, default_value = "false")]
        verbose: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            steps,
            state_dir,
            run_id,
            otel,
            otel_endpoint,
            verbose,
        } => {
            let telemetry_config = TelemetryConfig {
                otlp_endpoint: if otel {
                    Some(otel_endpoint.unwrap_or_else(|| "http://localhost:4317".to_string()))
                } else {
                    None
                },
                log_level: if verbose {
                    tracing::Level::DEBUG
                } else {
                    tracing::Level::INFO
                },
                ..TelemetryConfig::from_env()
            };
            let tracer = init_telemetry(telemetry_config).ok().flatten();

            let exit_code = run(config, steps, state_dir, run_id).await;

            if tracer.is_some() {
                shutdown_telemetry();
            }
            std::process::exit(exit_code);
        }
    }
}

async fn run(
    config_path: PathBuf,
    steps: Vec<String>,
    state_dir: PathBuf,
    run_id: Option<String>,
) -> i32 {
    let config = match loader::load_with_env_overrides(&config_path) {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, "failed to load configuration");
            return 1;
        }
    };

    let run_id = run_id.unwrap_or_else(|| Uuid::new_v4().to_string());
    let state_mgr = StateManager::new(&state_dir, &run_id);

    let steps = if steps.is_empty() {
        vec!["plan".to_string(), "apply".to_string(), "verify".to_string()]
    } else {
        steps
    };

    let mode_runner = Box::new(DemoModeRunner::new(steps));

    let mut runner = Runner::new(
        Mode::Execute,
        &config,
        state_mgr,
        mode_runner,
        Box::new(DemoCompletionChecker),
        Box::new(ConsoleDisplay),
        Box::new(StdinInputCollector),
    );

    info!(run_id = %run_id, "starting harness run");
    match runner.run().await {
        Ok(outcome) => {
            info!(state = ?outcome.state, summary = %outcome.summary, "run finished");
            0
        }
        Err(e) => {
            error!(error = %e, "run failed");
            1
        }
    }
}

/// Demo mode runner: walks a fixed step list, always reporting the final
/// step as complete. Stands in for a real analyze/execute workflow source.
struct DemoModeRunner {
    steps: Vec<String>,
    completed: Mutex<Vec<String>>,
}

impl DemoModeRunner {
    fn new(steps: Vec<String>) -> Self {
        Self {
            steps,
            completed: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait::async_trait]
impl ModeRunner for DemoModeRunner {
    fn next_step(&self) -> Option<String> {
        let completed = self.completed.lock().unwrap();
        self.steps.get(completed.len()).cloned()
    }

    async fn run_step(
        &mut self,
        name: &str,
        _user_input: &HashMap<String, String>,
    ) -> anyhow::Result<ResponsePayload> {
        let is_last = self.steps.last().map(|s| s == name).unwrap_or(false);
        Ok(ResponsePayload {
            output: Some(if is_last {
                format!("step '{name}' finished. All steps completed.")
            } else {
                format!("step '{name}' finished.")
            }),
            ..Default::default()
        })
    }

    fn all_steps(&self) -> Vec<String> {
        self.steps.clone()
    }

    fn progress(&self) -> Progress {
        let completed = self.completed.lock().unwrap();
        Progress {
            completed_steps: completed.clone(),
            current_step: self.steps.get(completed.len()).cloned(),
            total_steps: self.steps.len(),
        }
    }

    fn all_steps_completed(&self) -> bool {
        self.completed.lock().unwrap().len() == self.steps.len()
    }

    fn mark_step_in_progress(&mut self, _name: &str) {}

    fn mark_step_completed(&mut self, name: &str) {
        self.completed.lock().unwrap().push(name.to_string());
    }
}

struct DemoCompletionChecker;

#[async_trait::async_trait]
impl CompletionChecker for DemoCompletionChecker {
    async fn completion_status(&self) -> anyhow::Result<CompletionStatus> {
        Ok(CompletionStatus {
            all_complete: true,
            summary: "demo workflow finished".to_string(),
        })
    }
}

struct ConsoleDisplay;

impl Display for ConsoleDisplay {
    fn show_message(&self, text: &str, level: MessageLevel) {
        match level {
            MessageLevel::Error => error!("{text}"),
            MessageLevel::Warning => tracing::warn!("{text}"),
            _ => info!("{text}"),
        }
    }

    fn add_job(&self, id: &str, job: JobStatus) {
        info!(id, name = %job.name, status = %job.status, "job started");
    }

    fn update_job(&self, id: &str, patch: JobStatus) {
        info!(id, status = %patch.status, "job updated");
    }

    fn remove_job(&self, id: &str) {
        info!(id, "job removed");
    }

    fn show_step_execution(&self, name: &str, phase: StepPhase, details: &str) {
        info!(step = name, ?phase, details, "step execution");
    }

    fn show_workflow_status(&self, status: WorkflowStatus) {
        info!(
            workflow = %status.workflow_type,
            completed = status.completed_steps,
            total = status.steps,
            progress = status.progress_percentage,
            "workflow status"
        );
    }

    fn start_display_loop(&self) {}
    fn stop_display_loop(&self) {}
}

struct StdinInputCollector;

#[async_trait::async_trait]
impl InputCollector for StdinInputCollector {
    async fn collect_feedback(
        &self,
        questions: &[Question],
        context: &FeedbackContext,
    ) -> anyhow::Result<HashMap<String, String>> {
        println!("-- feedback requested during step '{}' ({:?}) --", context.step_name, context.mode);
        let mut answers = HashMap::new();
        for q in questions {
            println!("{}", q.text);
            let mut line = String::new();
            std::io::stdin().read_line(&mut line)?;
            answers.insert(format!("question_{}", q.number), line.trim().to_string());
        }
        Ok(answers)
    }
}
