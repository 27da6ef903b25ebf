//! Condition detector: a pure, stateless classifier over agent responses.
//!
//! Every function here takes a [`ResponsePayload`] (and sometimes a provider
//! name or a progress snapshot) and returns a structured verdict. Nothing in
//! this module owns state or performs I/O — the runner is the only caller
//! that acts on what these functions report.

use crate::errors::ErrorKind;
use crate::model::{
    CompletionInfo, CompletionType, FeedbackType, InputType, NextAction, Progress, ProgressStatus,
    Question, QuestionType, RateLimitInfo, RateLimitType, RecommendedAction, Urgency,
};
use chrono::{DateTime, Duration, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

/// Loosely-shaped agent response. Any field may be absent, matching the
/// external interface's duck-typed result payload.
#[derive(Debug, Clone, Default)]
pub struct ResponsePayload {
    pub output: Option<String>,
    pub error: Option<String>,
    pub status_code: Option<u16>,
    pub message: Option<String>,
}

impl ResponsePayload {
    /// All text fields concatenated, lowercased, for pattern matching.
    fn haystack(&self) -> String {
        let mut s = String::new();
        if let Some(o) = &self.output {
            s.push_str(o);
            s.push(' ');
        }
        if let Some(e) = &self.error {
            s.push_str(e);
            s.push(' ');
        }
        if let Some(m) = &self.message {
            s.push_str(m);
        }
        s.to_lowercase()
    }
}

// ---------------------------------------------------------------------------
// Pattern tables
// ---------------------------------------------------------------------------
// Compiled once, grouped common + per-provider. Provider-specific lookups
// concatenate the provider's table onto `COMMON_RATE_LIMIT` at call time.

static COMMON_RATE_LIMIT: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"rate.?limit",
        r"too many requests",
        r"429",
        r"slow down",
        r"quota exceeded",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("static rate-limit pattern"))
    .collect()
});

static ANTHROPIC_RATE_LIMIT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"requests per minute").expect("static pattern"));
static OPENAI_RATE_LIMIT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"tokens per minute").expect("static pattern"));
static GOOGLE_RATE_LIMIT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"quota").expect("static pattern"));
static CURSOR_RATE_LIMIT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"package limit").expect("static pattern"));

static RESET_IN_SECONDS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:reset in|retry after|wait)\s+(\d+)\s*second").expect("static pattern")
});
static RESET_AT_TIMESTAMP: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"reset at\s+(\d{4}-\d{2}-\d{2}[ T]\d{2}:\d{2}:\d{2})").expect("static pattern")
});

static FEEDBACK_REQUEST: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"please provide",
        r"what would you like",
        r"can you clarify",
        r"waiting for",
        r"need (?:more )?input",
        r"\?",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("static feedback pattern"))
    .collect()
});

static NUMBERED_QUESTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\s*\d+[.)]\s*(.+\?)\s*$").expect("static pattern"));
static FREEFORM_QUESTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([^.!?\n]+\?)").expect("static pattern"));

static HIGH_CONFIDENCE_COMPLETE: Lazy<Vec<&'static str>> = Lazy::new(|| {
    vec![
        "all steps completed",
        "successfully completed",
        "finished successfully",
    ]
});
static MEDIUM_CONFIDENCE_COMPLETE: Lazy<Vec<&'static str>> =
    Lazy::new(|| vec!["complete", "done"]);
static LOW_CONFIDENCE_COMPLETE: Lazy<Vec<&'static str>> = Lazy::new(|| vec!["end", "finish"]);

/// Checks whether a response indicates the provider rate-limited the
/// request. See `extract_rate_limit_info` for structured extraction.
pub fn is_rate_limited(resp: &ResponsePayload, provider: Option<&str>) -> bool {
    if matches!(resp.status_code, Some(429) | Some(503)) {
        return true;
    }
    let haystack = resp.haystack();
    if COMMON_RATE_LIMIT.iter().any(|re| re.is_match(&haystack)) {
        return true;
    }
    match provider {
        Some("anthropic") => ANTHROPIC_RATE_LIMIT.is_match(&haystack),
        Some("openai") => OPENAI_RATE_LIMIT.is_match(&haystack),
        Some("google") => GOOGLE_RATE_LIMIT.is_match(&haystack),
        Some("cursor") => CURSOR_RATE_LIMIT.is_match(&haystack),
        _ => false,
    }
}

/// Extracts structured rate-limit metadata. Returns `None` iff
/// [`is_rate_limited`] would return `false` for the same input.
pub fn extract_rate_limit_info(
    resp: &ResponsePayload,
    provider: Option<&str>,
) -> Option<RateLimitInfo> {
    if !is_rate_limited(resp, provider) {
        return None;
    }
    let now = Utc::now();
    let haystack = resp.haystack();

    let retry_after_seconds = RESET_IN_SECONDS
        .captures(&haystack)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<u64>().ok())
        .unwrap_or(60);

    let reset_time = RESET_AT_TIMESTAMP
        .captures(&haystack)
        .and_then(|c| c.get(1))
        .and_then(|m| {
            chrono::NaiveDateTime::parse_from_str(m.as_str(), "%Y-%m-%d %H:%M:%S")
                .or_else(|_| chrono::NaiveDateTime::parse_from_str(m.as_str(), "%Y-%m-%dT%H:%M:%S"))
                .ok()
        })
        .map(|naive| DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc))
        .unwrap_or_else(|| now + Duration::seconds(retry_after_seconds as i64));

    let limit_type = match provider {
        Some("anthropic") if ANTHROPIC_RATE_LIMIT.is_match(&haystack) => {
            RateLimitType::RequestsPerMinute
        }
        Some("openai") if OPENAI_RATE_LIMIT.is_match(&haystack) => RateLimitType::TokensPerMinute,
        Some("google") if GOOGLE_RATE_LIMIT.is_match(&haystack) => RateLimitType::QuotaExceeded,
        Some("cursor") if CURSOR_RATE_LIMIT.is_match(&haystack) => RateLimitType::PackageLimit,
        _ => RateLimitType::GeneralRateLimit,
    };

    Some(RateLimitInfo {
        provider: provider.unwrap_or("unknown").to_string(),
        detected_at: now,
        reset_time,
        retry_after_seconds,
        limit_type,
        message: resp.error.clone().or_else(|| resp.message.clone()).unwrap_or_default(),
    })
}

/// Whether the response is asking the user for input before it can continue.
pub fn needs_user_feedback(resp: &ResponsePayload) -> bool {
    let haystack = resp.haystack();
    FEEDBACK_REQUEST.iter().any(|re| re.is_match(&haystack))
}

fn classify_input_type(question: &str) -> InputType {
    let q = question.to_lowercase();
    if q.contains("file") || q.contains("attach") {
        InputType::File
    } else if q.contains("email") {
        InputType::Email
    } else if q.contains("url") || q.contains("link") {
        InputType::Url
    } else if (q.contains("directory") || q.contains("path")) && !q.contains("file") {
        InputType::Path
    } else if q.contains("count") || q.contains("many") || q.contains("amount") || q.contains("number") {
        InputType::Number
    } else if q.contains("confirm") || q.contains("yes or no") || q.contains("should") {
        InputType::Boolean
    } else {
        InputType::Text
    }
}

fn classify_urgency(question: &str) -> Urgency {
    let q = question.to_lowercase();
    if q.contains("urgent") || q.contains("critical") || q.contains("important") {
        Urgency::High
    } else if q.contains("please") || q.contains("can you") || q.contains("soon") {
        Urgency::Medium
    } else {
        Urgency::Low
    }
}

fn classify_feedback_type(question: &str) -> FeedbackType {
    let q = question.to_lowercase();
    if q.contains("clarify") {
        FeedbackType::Clarification
    } else if q.contains("which") || q.contains("option") {
        FeedbackType::Choices
    } else if q.contains("is this correct") {
        FeedbackType::Confirmation
    } else if q.contains("upload") || q.contains("file") {
        FeedbackType::FileRequests
    } else {
        FeedbackType::General
    }
}

fn classify_question_type(question: &str) -> QuestionType {
    let q = question.to_lowercase();
    if q.starts_with("what is") || q.contains("what is") {
        QuestionType::Information
    } else if q.contains("which") {
        QuestionType::Choice
    } else if q.contains("should") || q.contains("can i") {
        QuestionType::Permission
    } else if q.contains("is this") || q.contains("does this") {
        QuestionType::Confirmation
    } else if q.contains("can you") || q.contains("could you") {
        QuestionType::Request
    } else if q.contains("how many") || q.contains("how much") {
        QuestionType::Quantity
    } else if q.starts_with("when") {
        QuestionType::Time
    } else if q.starts_with("where") {
        QuestionType::Location
    } else if q.starts_with("why") {
        QuestionType::Explanation
    } else {
        QuestionType::General
    }
}

/// Parses numbered and free-form question sentences out of a response.
pub fn extract_questions(resp: &ResponsePayload) -> Vec<Question> {
    let Some(output) = &resp.output else {
        return Vec::new();
    };

    let mut questions = Vec::new();
    let mut seen = std::collections::HashSet::new();

    for (i, caps) in NUMBERED_QUESTION.captures_iter(output).enumerate() {
        let text = caps[1].trim().to_string();
        seen.insert(text.clone());
        questions.push(build_question(i as u32 + 1, text));
    }

    if questions.is_empty() {
        for (i, caps) in FREEFORM_QUESTION.captures_iter(output).enumerate() {
            let text = caps[1].trim().to_string();
            if seen.insert(text.clone()) {
                questions.push(build_question(i as u32 + 1, text));
            }
        }
    }

    questions
}

fn build_question(number: u32, text: String) -> Question {
    Question {
        input_type: classify_input_type(&text),
        urgency: classify_urgency(&text),
        feedback_type: classify_feedback_type(&text),
        question_type: classify_question_type(&text),
        required: true,
        default: None,
        choices: Vec::new(),
        number,
        text,
    }
}

/// Checks whether all reported work is finished, combining the mode
/// runner's own step count with textual completion indicators.
pub fn is_work_complete(resp: &ResponsePayload, progress: &Progress) -> CompletionInfo {
    if progress.total_steps > 0 && progress.completed_steps.len() == progress.total_steps {
        return CompletionInfo {
            is_complete: true,
            completion_type: Some(CompletionType::AllStepsCompleted),
            confidence: 1.0,
            indicators: vec!["all configured steps reported completed".into()],
            progress_status: ProgressStatus::AllStepsCompleted,
            next_actions: vec![],
        };
    }

    let haystack = resp.haystack();

    if let Some((phrase, conf, ctype)) = HIGH_CONFIDENCE_COMPLETE
        .iter()
        .find(|p| haystack.contains(**p))
        .map(|p| (*p, 0.9, CompletionType::ExplicitHighConfidence))
        .or_else(|| {
            MEDIUM_CONFIDENCE_COMPLETE
                .iter()
                .find(|p| haystack.contains(**p))
                .map(|p| (*p, 0.7, CompletionType::ExplicitMediumConfidence))
        })
        .or_else(|| {
            LOW_CONFIDENCE_COMPLETE
                .iter()
                .find(|p| haystack.contains(**p))
                .map(|p| (*p, 0.5, CompletionType::ExplicitLowConfidence))
        })
    {
        return CompletionInfo {
            is_complete: true,
            completion_type: Some(ctype),
            confidence: conf,
            indicators: vec![phrase.to_string()],
            progress_status: progress_status_for(progress, &haystack),
            next_actions: next_actions_for(progress, &haystack),
        };
    }

    if haystack.contains("summary") {
        return CompletionInfo {
            is_complete: true,
            completion_type: Some(CompletionType::ImplicitSummary),
            confidence: 0.8,
            indicators: vec!["summary".into()],
            progress_status: progress_status_for(progress, &haystack),
            next_actions: next_actions_for(progress, &haystack),
        };
    }

    if ["generated", "saved to", "report"].iter().any(|p| haystack.contains(p)) {
        return CompletionInfo {
            is_complete: true,
            completion_type: Some(CompletionType::ImplicitDeliverable),
            confidence: 0.8,
            indicators: vec!["deliverable language".into()],
            progress_status: progress_status_for(progress, &haystack),
            next_actions: next_actions_for(progress, &haystack),
        };
    }

    if haystack.contains("status: complete") {
        return CompletionInfo {
            is_complete: true,
            completion_type: Some(CompletionType::ImplicitStatus),
            confidence: 0.7,
            indicators: vec!["status: complete".into()],
            progress_status: progress_status_for(progress, &haystack),
            next_actions: next_actions_for(progress, &haystack),
        };
    }

    if progress.fraction() >= 0.8
        && ["almost done", "nearly finished", "wrapping up"]
            .iter()
            .any(|p| haystack.contains(p))
    {
        return CompletionInfo {
            is_complete: true,
            completion_type: Some(CompletionType::ImplicitHighProgress),
            confidence: 0.6,
            indicators: vec!["high progress phrasing".into()],
            progress_status: progress_status_for(progress, &haystack),
            next_actions: next_actions_for(progress, &haystack),
        };
    }

    CompletionInfo {
        is_complete: false,
        completion_type: None,
        confidence: 0.0,
        indicators: vec![],
        progress_status: progress_status_for(progress, &haystack),
        next_actions: next_actions_for(progress, &haystack),
    }
}

fn progress_status_for(progress: &Progress, haystack: &str) -> ProgressStatus {
    if haystack.contains("waiting for user input") {
        ProgressStatus::WaitingForInput
    } else if haystack.contains("error occurred") || haystack.contains("error") {
        ProgressStatus::HasErrors
    } else if haystack.contains("next step") {
        ProgressStatus::HasNextActions
    } else {
        let f = progress.fraction();
        if f >= 0.8 {
            ProgressStatus::NearCompletion
        } else if f >= 0.5 {
            ProgressStatus::HalfComplete
        } else if f >= 0.2 {
            ProgressStatus::EarlyStage
        } else {
            ProgressStatus::JustStarted
        }
    }
}

fn next_actions_for(progress: &Progress, haystack: &str) -> Vec<NextAction> {
    let mut actions = Vec::new();
    if haystack.contains("waiting for user input") {
        actions.push(NextAction::CollectUserInput);
    }
    if haystack.contains("error occurred") || haystack.contains("error") {
        actions.push(NextAction::HandleErrors);
    }
    if haystack.contains("next step") {
        actions.push(NextAction::ContinueExecution);
    }
    if progress.fraction() >= 0.8 {
        actions.push(NextAction::ContinueToCompletion);
    }
    actions
}

/// Reports which partial-completion bucket a response falls into, used by
/// the runner to decide what to do next without finishing the step.
pub fn detect_partial_completion(resp: &ResponsePayload, progress: &Progress) -> ProgressStatus {
    progress_status_for(progress, &resp.haystack())
}

/// Maps a raw error message to a structured classification.
pub fn classify_error(message: &str) -> (ErrorKind, bool, RecommendedAction) {
    let m = message.to_lowercase();
    let kind = if m.contains("rate limit") || m.contains("429") {
        ErrorKind::RateLimit
    } else if m.contains("timeout") || m.contains("timed out") {
        ErrorKind::Timeout
    } else if m.contains("connection") || m.contains("network") || m.contains("dns") {
        ErrorKind::Network
    } else if m.contains("unauthorized") || m.contains("invalid api key") || m.contains("auth") {
        ErrorKind::Auth
    } else if m.contains("forbidden") || m.contains("permission") {
        ErrorKind::Permission
    } else if m.contains("quota") {
        ErrorKind::Quota
    } else if m.contains("invalid input") || m.contains("bad request") {
        ErrorKind::InvalidInput
    } else if m.contains("panic") || m.contains("corrupt") || m.contains("fatal") {
        ErrorKind::Fatal
    } else {
        ErrorKind::Transient
    };

    let action = match kind {
        ErrorKind::RateLimit => RecommendedAction::SwitchProvider,
        ErrorKind::Quota => RecommendedAction::Wait,
        ErrorKind::Auth | ErrorKind::Permission | ErrorKind::Fatal | ErrorKind::InvalidInput => {
            RecommendedAction::Fail
        }
        ErrorKind::Timeout | ErrorKind::Network | ErrorKind::Transient => RecommendedAction::Retry,
    };

    (kind, kind.is_retryable(), action)
}

/// Backoff delay before the next attempt, given the error kind and the
/// attempt number (0-indexed). Rate limit and quota errors use fixed waits
/// since those are provider-communicated, not exploratory backoff; transient
/// kinds use `min(2^attempt, 300)` seconds.
pub fn retry_delay_for_error(kind: ErrorKind, attempt: u32) -> std::time::Duration {
    match kind {
        ErrorKind::RateLimit => std::time::Duration::from_secs(60),
        ErrorKind::Quota => std::time::Duration::from_secs(120),
        ErrorKind::Timeout | ErrorKind::Network | ErrorKind::Transient => {
            let secs = 2u64.saturating_pow(attempt).min(300);
            std::time::Duration::from_secs(secs)
        }
        ErrorKind::Auth | ErrorKind::Permission | ErrorKind::Fatal | ErrorKind::InvalidInput => {
            std::time::Duration::from_secs(0)
        }
    }
}
