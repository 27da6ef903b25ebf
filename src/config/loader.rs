//! Edge-of-crate configuration loading: YAML from disk, with environment
//! variable overrides layered on top. The core subsystems never call this
//! directly — it exists for a binary embedding the harness.

use super::HarnessConfig;
use crate::errors::{RunnerError, RunnerResult};
use std::path::Path;
use tracing::{info, warn};

/// Loads and parses a YAML configuration file. Does not validate; callers
/// should run [`HarnessConfig::validate`] and decide how to handle warnings.
pub fn load_from_path(path: impl AsRef<Path>) -> RunnerResult<HarnessConfig> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path)?;
    let config: HarnessConfig = serde_yaml::from_str(&raw)?;
    info!(path = %path.display(), providers = config.providers.len(), "loaded harness configuration");
    Ok(config)
}

/// Same as [`load_from_path`], then applies a small set of environment
/// overrides, mirroring the layering the rest of this codebase uses for
/// env-driven tuning.
pub fn load_with_env_overrides(path: impl AsRef<Path>) -> RunnerResult<HarnessConfig> {
    let mut config = load_from_path(path)?;

    if let Ok(val) = std::env::var("HARNESS_MAX_RETRIES") {
        match val.parse() {
            Ok(n) => config.max_retries = n,
            Err(_) => warn!(value = %val, "ignoring invalid HARNESS_MAX_RETRIES"),
        }
    }
    if let Ok(val) = std::env::var("HARNESS_TIMEOUT_SECONDS") {
        match val.parse() {
            Ok(n) => config.timeout_seconds = n,
            Err(_) => warn!(value = %val, "ignoring invalid HARNESS_TIMEOUT_SECONDS"),
        }
    }
    if let Ok(val) = std::env::var("HARNESS_DEFAULT_PROVIDER") {
        config.default_provider = val;
    }

    let issues = config.validate();
    if HarnessConfig::has_errors(&issues) {
        let message = issues
            .iter()
            .map(|i| match i {
                super::ConfigIssue::Error(m) | super::ConfigIssue::Warning(m) => m.clone(),
            })
            .collect::<Vec<_>>()
            .join("; ");
        return Err(RunnerError::Config(message));
    }
    for issue in &issues {
        if let super::ConfigIssue::Warning(m) = issue {
            warn!(%m, "configuration warning");
        }
    }

    Ok(config)
}
