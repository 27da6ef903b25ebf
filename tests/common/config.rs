#![allow(dead_code)]

use harness_runner::config::{
    CircuitBreakerSettings, HarnessConfig, ProviderConfig, RetrySettings, StepFailurePolicy,
};
use harness_runner::model::ProviderKind;
use std::collections::HashMap;

/// A minimal, valid [`HarnessConfig`] over the given provider names, in
/// priority order (earlier names score higher). `default_provider` is
/// always the first name, matching how [`harness_runner::provider::ProviderManager`]
/// seeds its current provider.
pub fn harness_config(provider_names: &[&str]) -> HarnessConfig {
    let providers = provider_names
        .iter()
        .enumerate()
        .map(|(i, name)| ProviderConfig {
            name: name.to_string(),
            kind: ProviderKind::UsageBased,
            priority: (provider_names.len() - i) as u8,
            weight: 1.0,
            models: vec!["default".into()],
            model_tiers: HashMap::new(),
            underlying_service: None,
            max_tokens: None,
            auth_env: None,
        })
        .collect();

    HarnessConfig {
        default_provider: provider_names[0].to_string(),
        fallback_providers: vec![],
        max_retries: 3,
        timeout_seconds: 60,
        auto_switch_on_error: true,
        auto_switch_on_rate_limit: true,
        circuit_breaker: CircuitBreakerSettings {
            enabled: true,
            failure_threshold: 5,
            timeout_seconds: 300,
        },
        retry: RetrySettings {
            enabled: true,
            max_attempts: 3,
            base_delay_ms: 1,
        },
        on_exhausted_retries: StepFailurePolicy::Terminate,
        providers,
    }
}
