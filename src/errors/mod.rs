//! Crate-wide error type.
//!
//! Every fallible boundary in the harness eventually resolves into a
//! [`RunnerError`] variant. Internal glue code is free to return
//! `anyhow::Result` the way individual modules do; `Runner::run` is where
//! everything gets converted to this type before reaching a caller.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Errors the harness can surface to a caller.
#[derive(Debug, Error)]
pub enum RunnerError {
    /// Every configured provider (and fallback) is rate-limited and none of
    /// them reported a reset time we can wait on.
    #[error("all providers are rate-limited and no reset time is known")]
    AllProvidersRateLimitedWithNoResetTime,

    /// A step exhausted its retry budget.
    #[error("step '{step}' failed after {attempts} attempt(s)")]
    MaxRetriesExceeded { step: String, attempts: u32 },

    /// A step's error classification marked it non-retryable (auth,
    /// permission, fatal, invalid_input).
    #[error("step '{step}' failed with a non-retryable error: {reason}")]
    NonRetryable { step: String, reason: String },

    /// The state file does not round-trip, or is missing when expected.
    #[error("state file at {path} is not readable: {source}")]
    StateCorrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Configuration failed cross-reference validation (see `config::HarnessConfig::validate`).
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("configuration file error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Catch-all for collaborator errors (Mode Runner, Display, Input
    /// Collector) that don't map onto a more specific variant.
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// Convenience alias used throughout the crate's public API.
pub type RunnerResult<T> = Result<T, RunnerError>;

/// The taxonomy an error is classified into before the retry engine decides
/// what to do with it. See `condition::classify_error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    RateLimit,
    Timeout,
    Network,
    Auth,
    Permission,
    Quota,
    InvalidInput,
    Transient,
    Fatal,
}

impl ErrorKind {
    /// Whether this kind is retryable in principle. The retry engine still
    /// applies its own recovery-table logic on top of this.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            ErrorKind::Auth | ErrorKind::Permission | ErrorKind::Fatal | ErrorKind::InvalidInput
        )
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorKind::RateLimit => "rate_limit",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Network => "network",
            ErrorKind::Auth => "auth",
            ErrorKind::Permission => "permission",
            ErrorKind::Quota => "quota",
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::Transient => "transient",
            ErrorKind::Fatal => "fatal",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_and_fatal_are_not_retryable() {
        assert!(!ErrorKind::Auth.is_retryable());
        assert!(!ErrorKind::Permission.is_retryable());
        assert!(!ErrorKind::Fatal.is_retryable());
        assert!(!ErrorKind::InvalidInput.is_retryable());
    }

    #[test]
    fn transient_kinds_are_retryable() {
        assert!(ErrorKind::RateLimit.is_retryable());
        assert!(ErrorKind::Timeout.is_retryable());
        assert!(ErrorKind::Network.is_retryable());
        assert!(ErrorKind::Quota.is_retryable());
        assert!(ErrorKind::Transient.is_retryable());
    }

    #[test]
    fn max_retries_exceeded_message() {
        let err = RunnerError::MaxRetriesExceeded {
            step: "fetch_data".into(),
            attempts: 3,
        };
        assert!(err.to_string().contains("fetch_data"));
        assert!(err.to_string().contains('3'));
    }
}
