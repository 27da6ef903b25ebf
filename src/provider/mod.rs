//! Provider manager: selection, health tracking, circuit breaking, and
//! rate-limit coordination across configured providers.
//!
//! Owns the only mutable copy of the provider table. The runner and error
//! handler observe outcomes and report them back through
//! [`ProviderManager::mark_success`] / [`mark_failure`](ProviderManager::mark_failure)
//! / [`mark_rate_limited`](ProviderManager::mark_rate_limited); nobody else
//! touches a [`Provider`] directly.

use crate::config::{CircuitBreakerSettings, ProviderConfig};
use crate::errors::ErrorKind;
use crate::model::{CircuitState, Health, Provider, ProviderKind, RateLimitInfo, Tier};
use chrono::Utc;
use std::collections::HashMap;
use tracing::{info, warn};

pub struct ProviderManager {
    providers: HashMap<String, Provider>,
    circuit: CircuitBreakerSettings,
    current: Option<String>,
}

impl ProviderManager {
    pub fn new(configs: &[ProviderConfig], circuit: CircuitBreakerSettings) -> Self {
        let mut providers = HashMap::new();
        for (order, cfg) in configs.iter().enumerate() {
            let model_tier: HashMap<String, Tier> = cfg
                .model_tiers
                .iter()
                .map(|(model, tier)| (model.clone(), *tier))
                .collect();
            providers.insert(
                cfg.name.clone(),
                Provider {
                    name: cfg.name.clone(),
                    kind: cfg.kind,
                    priority: cfg.priority,
                    weight: cfg.weight,
                    models: cfg.models.clone(),
                    model_tier,
                    underlying_service: cfg.underlying_service.clone(),
                    order,
                    health: Health::Healthy,
                    circuit_state: CircuitState::Closed,
                    failure_count: 0,
                    last_failure_time: None,
                    rate_limit: None,
                    current_model_index: 0,
                },
            );
        }
        let current = configs.first().map(|c| c.name.clone());
        Self {
            providers,
            circuit,
            current,
        }
    }

    pub fn current_provider(&self) -> &str {
        self.current.as_deref().unwrap_or("unknown")
    }

    fn is_eligible(&self, p: &Provider, now: chrono::DateTime<Utc>) -> bool {
        let circuit_ok = match p.circuit_state {
            CircuitState::Closed => true,
            CircuitState::HalfOpen => true,
            CircuitState::Open => p
                .last_failure_time
                .map(|t| (now - t).num_seconds() as u64 >= self.circuit.timeout_seconds)
                .unwrap_or(false),
        };
        circuit_ok && !p.is_rate_limited(now)
    }

    /// Selects the best eligible provider and switches to it, returning its
    /// name. `None` when no provider qualifies.
    pub fn switch_provider(&mut self) -> Option<String> {
        let now = Utc::now();
        let mut half_opened = Vec::new();
        for p in self.providers.values_mut() {
            if p.circuit_state == CircuitState::Open {
                if let Some(t) = p.last_failure_time {
                    if (now - t).num_seconds() as u64 >= self.circuit.timeout_seconds {
                        p.circuit_state = CircuitState::HalfOpen;
                        half_opened.push(p.name.clone());
                    }
                }
            }
        }
        for name in half_opened {
            info!(provider = %name, "circuit breaker entering half-open");
        }

        let best = self
            .providers
            .values()
            .filter(|p| self.is_eligible(p, now))
            .max_by(|a, b| {
                a.score()
                    .partial_cmp(&b.score())
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| b.failure_count.cmp(&a.failure_count))
                    .then_with(|| b.order.cmp(&a.order))
            })
            .map(|p| p.name.clone());

        if let Some(name) = &best {
            self.current = Some(name.clone());
            info!(provider = %name, "switched provider");
        } else {
            warn!("no eligible provider to switch to");
        }
        best
    }

    /// Filters to providers whose best model is at or above `min_tier`, then
    /// applies the normal selection policy over that subset.
    pub fn select_by_tier(&self, min_tier: Tier) -> Option<String> {
        let now = Utc::now();
        self.providers
            .values()
            .filter(|p| self.is_eligible(p, now))
            .filter(|p| p.best_tier().map(|t| t >= min_tier).unwrap_or(false))
            .max_by(|a, b| {
                a.score()
                    .partial_cmp(&b.score())
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| b.failure_count.cmp(&a.failure_count))
                    .then_with(|| b.order.cmp(&a.order))
            })
            .map(|p| p.name.clone())
    }

    /// Round-robins to the next model within the current provider.
    pub fn switch_model(&mut self) -> Option<String> {
        let current = self.current.clone()?;
        let provider = self.providers.get_mut(&current)?;
        if provider.models.is_empty() {
            return None;
        }
        provider.current_model_index = (provider.current_model_index + 1) % provider.models.len();
        Some(provider.models[provider.current_model_index].clone())
    }

    pub fn mark_rate_limited(&mut self, name: &str, info: RateLimitInfo) {
        if let Some(p) = self.providers.get_mut(name) {
            warn!(provider = %name, reset_time = %info.reset_time, "provider rate-limited");
            p.rate_limit = Some(info);
        }
    }

    /// Earliest unexpired reset time across all rate-limited providers.
    pub fn next_reset_time(&self) -> Option<chrono::DateTime<Utc>> {
        let now = Utc::now();
        self.providers
            .values()
            .filter_map(|p| p.rate_limit.as_ref())
            .filter(|r| !r.is_expired(now))
            .map(|r| r.reset_time)
            .min()
    }

    pub fn mark_failure(&mut self, name: &str, kind: ErrorKind) {
        let Some(p) = self.providers.get_mut(name) else {
            return;
        };
        p.failure_count += 1;
        p.last_failure_time = Some(Utc::now());
        if p.failure_count >= self.circuit.failure_threshold {
            p.circuit_state = CircuitState::Open;
            p.health = Health::Unhealthy;
            warn!(provider = %name, failures = p.failure_count, kind = %kind, "circuit breaker opened");
        } else {
            p.health = Health::Degraded;
        }
    }

    pub fn mark_success(&mut self, name: &str) {
        if let Some(p) = self.providers.get_mut(name) {
            p.failure_count = 0;
            p.circuit_state = CircuitState::Closed;
            p.health = Health::Healthy;
            p.rate_limit = None;
        }
    }

    pub fn is_passthrough(&self, name: &str) -> bool {
        self.providers
            .get(name)
            .map(|p| p.kind == ProviderKind::Passthrough)
            .unwrap_or(false)
    }

    pub fn get(&self, name: &str) -> Option<&Provider> {
        self.providers.get(name)
    }
}
