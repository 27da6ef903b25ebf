//! Core data model shared by every subsystem: runner state, steps, providers,
//! and the structured payloads the condition detector produces.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Top-level state of the supervisor loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunnerPhase {
    Idle,
    Running,
    Paused,
    WaitingForUser,
    WaitingForRateLimit,
    Stopped,
    Completed,
    Error,
}

impl RunnerPhase {
    /// `true` once the loop must not advance any further.
    pub fn should_stop(&self) -> bool {
        matches!(self, Self::Stopped | Self::Completed | Self::Error)
    }

    /// `true` while the loop is suspended waiting on something external.
    pub fn should_pause(&self) -> bool {
        matches!(
            self,
            Self::Paused | Self::WaitingForUser | Self::WaitingForRateLimit
        )
    }
}

/// Which kind of workflow the mode runner is driving.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Analyze,
    Execute,
}

/// The runner's full durable state, persisted by the state manager after
/// every transition. `execution_log` is excluded from the snapshot itself —
/// it lives in the sibling NDJSON log and is reattached by
/// [`crate::state::StateManager::load_state`] so appending a log line never
/// requires rewriting the snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerState {
    pub state: RunnerPhase,
    pub mode: Mode,
    pub current_step: Option<String>,
    pub current_provider: Option<String>,
    pub start_time: DateTime<Utc>,
    pub user_input: HashMap<String, String>,
    #[serde(skip, default)]
    pub execution_log: Vec<LogEntry>,
}

impl RunnerState {
    pub fn new(mode: Mode) -> Self {
        Self {
            state: RunnerPhase::Idle,
            mode,
            current_step: None,
            current_provider: None,
            start_time: Utc::now(),
            user_input: HashMap::new(),
            execution_log: Vec::new(),
        }
    }
}

/// A single structured execution log entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
    /// Up to 5 backtrace frames, captured only for error-level entries.
    pub backtrace: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Info,
    Warning,
    Error,
}

/// One unit of work in a mode's workflow, as tracked by the mode runner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub name: String,
    pub in_progress: bool,
    pub completed: bool,
    pub result: Option<String>,
}

impl Step {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            in_progress: false,
            completed: false,
            result: None,
        }
    }
}

/// How a provider's usage is billed/accounted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    UsageBased,
    Subscription,
    Passthrough,
}

/// Provider health as observed by the circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Health {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Circuit breaker state for a single provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

/// Model capability tier, ordered from least to most capable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Mini,
    Standard,
    Thinking,
    Pro,
    Max,
}

/// Runtime record for a configured provider, owned exclusively by the
/// provider manager.
#[derive(Debug, Clone)]
pub struct Provider {
    pub name: String,
    pub kind: ProviderKind,
    pub priority: u8,
    pub weight: f64,
    pub models: Vec<String>,
    pub model_tier: HashMap<String, Tier>,
    pub underlying_service: Option<String>,
    /// Position in the configured provider list; used as a deterministic
    /// tie-breaker for selection.
    pub order: usize,

    pub health: Health,
    pub circuit_state: CircuitState,
    pub failure_count: u32,
    pub last_failure_time: Option<DateTime<Utc>>,
    pub rate_limit: Option<RateLimitInfo>,
    pub current_model_index: usize,
}

impl Provider {
    /// Selection score: higher wins. See the provider manager's weight
    /// formula note for why this is `priority * weight`.
    pub fn score(&self) -> f64 {
        self.priority as f64 * self.weight
    }

    pub fn best_tier(&self) -> Option<Tier> {
        self.model_tier.values().copied().max()
    }

    pub fn is_rate_limited(&self, now: DateTime<Utc>) -> bool {
        self.rate_limit
            .as_ref()
            .map(|info| info.reset_time > now)
            .unwrap_or(false)
    }
}

/// The kind of rate limit an agent response reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateLimitType {
    RequestsPerMinute,
    TokensPerMinute,
    QuotaExceeded,
    PackageLimit,
    GeneralRateLimit,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitInfo {
    pub provider: String,
    pub detected_at: DateTime<Utc>,
    pub reset_time: DateTime<Utc>,
    pub retry_after_seconds: u64,
    pub limit_type: RateLimitType,
    pub message: String,
}

impl RateLimitInfo {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.reset_time
    }
}

/// Input shape expected of a collected answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputType {
    Text,
    Number,
    Boolean,
    Email,
    Url,
    File,
    Path,
    Choice,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackType {
    Clarification,
    Choices,
    Confirmation,
    FileRequests,
    General,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    Information,
    Choice,
    Permission,
    Confirmation,
    Request,
    Quantity,
    Time,
    Location,
    Explanation,
    General,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    pub number: u32,
    pub text: String,
    pub input_type: InputType,
    pub urgency: Urgency,
    pub required: bool,
    pub default: Option<String>,
    pub choices: Vec<String>,
    pub feedback_type: FeedbackType,
    pub question_type: QuestionType,
}

/// Recovery action recommended for a classified error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendedAction {
    Retry,
    SwitchProvider,
    Wait,
    Fail,
    Escalate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorClassification {
    pub kind: crate::errors::ErrorKind,
    pub retryable: bool,
    pub recommended_action: RecommendedAction,
    pub confidence: f64,
    pub reasoning: String,
}

/// How an agent response described its own progress, as inferred by the
/// condition detector (distinct from the mode runner's own step tracking).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionType {
    AllStepsCompleted,
    ExplicitHighConfidence,
    ExplicitMediumConfidence,
    ExplicitLowConfidence,
    ImplicitSummary,
    ImplicitDeliverable,
    ImplicitStatus,
    ImplicitHighProgress,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStatus {
    AllStepsCompleted,
    NearCompletion,
    HalfComplete,
    EarlyStage,
    JustStarted,
    HasNextActions,
    WaitingForInput,
    HasErrors,
    InProgress,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NextAction {
    CollectUserInput,
    HandleErrors,
    ContinueExecution,
    ContinueToCompletion,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionInfo {
    pub is_complete: bool,
    pub completion_type: Option<CompletionType>,
    pub confidence: f64,
    pub indicators: Vec<String>,
    pub progress_status: ProgressStatus,
    pub next_actions: Vec<NextAction>,
}

/// A snapshot of a mode runner's progress, as reported through the external
/// interface.
#[derive(Debug, Clone)]
pub struct Progress {
    pub completed_steps: Vec<String>,
    pub current_step: Option<String>,
    pub total_steps: usize,
}

impl Progress {
    pub fn fraction(&self) -> f64 {
        if self.total_steps == 0 {
            0.0
        } else {
            self.completed_steps.len() as f64 / self.total_steps as f64
        }
    }

    /// Progress percentage, rounded to 2 decimals; 0 when there are no steps.
    pub fn percentage(&self) -> f64 {
        (self.fraction() * 100.0 * 100.0).round() / 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_stop_and_pause_sets() {
        assert!(RunnerPhase::Stopped.should_stop());
        assert!(RunnerPhase::Completed.should_stop());
        assert!(RunnerPhase::Error.should_stop());
        assert!(!RunnerPhase::Running.should_stop());

        assert!(RunnerPhase::Paused.should_pause());
        assert!(RunnerPhase::WaitingForUser.should_pause());
        assert!(RunnerPhase::WaitingForRateLimit.should_pause());
        assert!(!RunnerPhase::Running.should_pause());
    }

    #[test]
    fn progress_percentage_empty_is_zero() {
        let p = Progress {
            completed_steps: vec![],
            current_step: None,
            total_steps: 0,
        };
        assert_eq!(p.percentage(), 0.0);
    }

    #[test]
    fn progress_percentage_rounds() {
        let p = Progress {
            completed_steps: vec!["a".into(), "b".into()],
            current_step: None,
            total_steps: 3,
        };
        assert_eq!(p.percentage(), 66.67);
    }
}
