//! Error handler & retry engine.
//!
//! Wraps a single step execution with bounded retry, classification-driven
//! recovery, and provider rotation. The attempt counter persists across
//! provider switches triggered by a rate limit — only timeout/network/
//! transient failures consume the retry budget.

use crate::condition::{self, ResponsePayload};
use crate::config::RetrySettings;
use crate::errors::{RunnerError, RunnerResult};
use crate::model::RecommendedAction;
use crate::provider::ProviderManager;
use tokio::time::sleep;
use tracing::{info, warn};

/// Outcome of a single retry-wrapped step execution.
pub enum Outcome<T> {
    Success(T),
    /// The step's classified error was non-retryable (auth/permission/
    /// fatal/invalid_input); surfaced immediately.
    NonRetryable(String),
}

pub struct RetryEngine {
    settings: RetrySettings,
}

impl RetryEngine {
    pub fn new(settings: RetrySettings) -> Self {
        Self { settings }
    }

    /// Runs `action` to produce a [`ResponsePayload`], applying the
    /// recovery table: rate limits switch providers or wait, auth/
    /// permission/fatal/invalid_input fail without retry, and transient
    /// kinds retry with backoff up to `max_attempts`.
    /// `on_rate_limit_wait(true)` fires right before the engine sleeps until
    /// the earliest known rate-limit reset (no healthy provider to switch
    /// to); `on_rate_limit_wait(false)` fires once it resumes. The runner
    /// uses this to reflect `waiting_for_rate_limit` in its own state.
    pub async fn execute_with_retry(
        &self,
        step_id: &str,
        providers: &mut ProviderManager,
        mut action: impl AsyncFnMut(&str) -> anyhow::Result<ResponsePayload>,
        mut on_rate_limit_wait: impl FnMut(bool),
    ) -> RunnerResult<Outcome<ResponsePayload>> {
        let mut attempt = 0u32;

        loop {
            let provider = providers.current_provider().to_string();
            let run = action(&provider).await;

            let resp = match run {
                Ok(resp) => resp,
                Err(err) => {
                    let (kind, retryable, recommended) = condition::classify_error(&err.to_string());
                    providers.mark_failure(&provider, kind);
                    if !retryable {
                        warn!(step_id, provider = %provider, %kind, "non-retryable step failure");
                        return Ok(Outcome::NonRetryable(err.to_string()));
                    }
                    if attempt >= self.settings.max_attempts {
                        return Err(RunnerError::MaxRetriesExceeded {
                            step: step_id.to_string(),
                            attempts: attempt,
                        });
                    }
                    let delay = match recommended {
                        RecommendedAction::SwitchProvider => {
                            if providers.switch_provider().is_none() {
                                condition::retry_delay_for_error(kind, attempt)
                            } else {
                                std::time::Duration::from_millis(0)
                            }
                        }
                        _ => condition::retry_delay_for_error(kind, attempt),
                    };
                    warn!(step_id, provider = %provider, attempt, ?delay, "step failed, retrying");
                    sleep(delay).await;
                    attempt += 1;
                    continue;
                }
            };

            if condition::is_rate_limited(&resp, Some(&provider)) {
                if let Some(info) = condition::extract_rate_limit_info(&resp, Some(&provider)) {
                    providers.mark_rate_limited(&provider, info);
                }
                // Rate-limit recovery does not consume the retry budget.
                if providers.switch_provider().is_some() {
                    continue;
                }
                let wait_until = providers.next_reset_time();
                let Some(reset) = wait_until else {
                    return Err(RunnerError::AllProvidersRateLimitedWithNoResetTime);
                };
                let now = chrono::Utc::now();
                let wait = (reset - now).to_std().unwrap_or_default();
                info!(provider = %provider, ?wait, "waiting for rate limit to clear");
                on_rate_limit_wait(true);
                sleep(wait).await;
                on_rate_limit_wait(false);
                continue;
            }

            providers.mark_success(&provider);
            if attempt > 0 {
                info!(step_id, provider = %provider, attempt, "step succeeded after retry");
            }
            return Ok(Outcome::Success(resp));
        }
    }
}
