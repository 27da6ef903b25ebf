//! Configuration surface consumed by the core subsystems.
//!
//! Nothing in this module reads a file or an environment variable directly
//! — that's [`loader`]'s job, kept at the edge of the crate. Everything here
//! is a plain validated struct the runner, provider manager, and error
//! handler are constructed from.

pub mod loader;

use crate::model::{ProviderKind, Tier};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarnessConfig {
    pub default_provider: String,
    #[serde(default)]
    pub fallback_providers: Vec<String>,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    #[serde(default = "default_true")]
    pub auto_switch_on_error: bool,
    #[serde(default = "default_true")]
    pub auto_switch_on_rate_limit: bool,
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerSettings,
    #[serde(default)]
    pub retry: RetrySettings,
    #[serde(default)]
    pub on_exhausted_retries: StepFailurePolicy,
    pub providers: Vec<ProviderConfig>,
}

fn default_max_retries() -> u32 {
    3
}
fn default_timeout_seconds() -> u64 {
    300
}
fn default_true() -> bool {
    true
}

/// What the runner does when a step exhausts its retry budget. Default is
/// conservative: terminate rather than silently advance past a broken step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StepFailurePolicy {
    Advance,
    #[default]
    Terminate,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CircuitBreakerSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    #[serde(default = "default_circuit_timeout")]
    pub timeout_seconds: u64,
}

fn default_failure_threshold() -> u32 {
    5
}
fn default_circuit_timeout() -> u64 {
    300
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            failure_threshold: default_failure_threshold(),
            timeout_seconds: default_circuit_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_max_retries")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
}

fn default_base_delay_ms() -> u64 {
    500
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ProviderKind,
    #[serde(default = "default_priority")]
    pub priority: u8,
    #[serde(default = "default_weight")]
    pub weight: f64,
    pub models: Vec<String>,
    #[serde(default, rename = "model_weights")]
    pub model_tiers: HashMap<String, Tier>,
    pub underlying_service: Option<String>,
    pub max_tokens: Option<u64>,
    #[serde(rename = "auth")]
    pub auth_env: Option<AuthConfig>,
}

fn default_priority() -> u8 {
    1
}
fn default_weight() -> f64 {
    1.0
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub api_key_env: String,
}

/// A configuration problem found by [`HarnessConfig::validate`]. Errors are
/// fatal; warnings are surfaced to the caller but don't block construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigIssue {
    Error(String),
    Warning(String),
}

impl HarnessConfig {
    /// Cross-reference validation: `default_provider`/`fallback_providers`
    /// must name configured providers; `model_weights` keys should be a
    /// subset of `models`.
    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();
        let known: std::collections::HashSet<&str> =
            self.providers.iter().map(|p| p.name.as_str()).collect();

        if !known.contains(self.default_provider.as_str()) {
            issues.push(ConfigIssue::Error(format!(
                "default_provider '{}' is not a configured provider",
                self.default_provider
            )));
        }
        for name in &self.fallback_providers {
            if !known.contains(name.as_str()) {
                issues.push(ConfigIssue::Error(format!(
                    "fallback_provider '{name}' is not a configured provider"
                )));
            }
        }
        for p in &self.providers {
            if p.kind == ProviderKind::Passthrough && p.underlying_service.is_none() {
                issues.push(ConfigIssue::Error(format!(
                    "provider '{}' is type=passthrough but has no underlying_service",
                    p.name
                )));
            }
            let model_set: std::collections::HashSet<&str> =
                p.models.iter().map(|m| m.as_str()).collect();
            for weighted in p.model_tiers.keys() {
                if !model_set.contains(weighted.as_str()) {
                    issues.push(ConfigIssue::Warning(format!(
                        "provider '{}' has a model_weights entry '{weighted}' not in its models list",
                        p.name
                    )));
                }
            }
        }
        issues
    }

    pub fn has_errors(issues: &[ConfigIssue]) -> bool {
        issues.iter().any(|i| matches!(i, ConfigIssue::Error(_)))
    }
}
