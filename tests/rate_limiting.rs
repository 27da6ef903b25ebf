mod common;

use common::*;
use harness_runner::condition::ResponsePayload;
use harness_runner::interfaces::MessageLevel;
use harness_runner::model::{Mode, RunnerPhase};
use harness_runner::runner::Runner;
use harness_runner::state::StateManager;

/// First provider reports a rate limit, a healthy fallback is available, the
/// engine switches to it without ever waiting out a reset.
#[tokio::test]
async fn rate_limit_switches_to_healthy_fallback() {
    let dir = tempfile::tempdir().unwrap();
    let config = harness_config(&["a", "b"]);

    let mode_runner = ScriptedModeRunner::new(&["only_step"]);
    mode_runner.push_response(
        "only_step",
        Ok(ResponsePayload {
            error: Some("Rate limit exceeded. Retry after 60 seconds".into()),
            status_code: Some(429),
            ..Default::default()
        }),
    );
    mode_runner.push_response(
        "only_step",
        Ok(ResponsePayload {
            output: Some("all steps completed".into()),
            ..Default::default()
        }),
    );
    let (mode_runner_handle, mode_runner) = SharedModeRunner::wrap(mode_runner);
    let (display, display_boxed) = SharedDisplay::wrap();
    let (_, input_boxed) = SharedInputCollector::wrap(ScriptedInputCollector::new(&[]));

    let mut runner = Runner::new(
        Mode::Execute,
        &config,
        StateManager::new(dir.path(), "rate-limit-switch"),
        mode_runner,
        Box::new(FixedCompletionChecker::complete("done")),
        display_boxed,
        input_boxed,
    );

    let outcome = runner.run().await.unwrap();

    assert_eq!(outcome.state, RunnerPhase::Completed);
    assert_eq!(mode_runner_handle.visited_steps().len(), 2);
    assert!(display.messages_at(MessageLevel::Warning).is_empty());
}

/// The only configured provider is rate-limited; with nothing to switch to,
/// the engine waits out the reset and the display surfaces a warning while
/// it does.
#[tokio::test]
async fn all_providers_rate_limited_waits_for_reset() {
    let dir = tempfile::tempdir().unwrap();
    let config = harness_config(&["a"]);

    let mode_runner = ScriptedModeRunner::new(&["only_step"]);
    mode_runner.push_response(
        "only_step",
        Ok(ResponsePayload {
            error: Some("Rate limit exceeded. Retry after 1 seconds".into()),
            status_code: Some(429),
            ..Default::default()
        }),
    );
    mode_runner.push_response(
        "only_step",
        Ok(ResponsePayload {
            output: Some("all steps completed".into()),
            ..Default::default()
        }),
    );
    let (mode_runner_handle, mode_runner) = SharedModeRunner::wrap(mode_runner);
    let (display, display_boxed) = SharedDisplay::wrap();
    let (_, input_boxed) = SharedInputCollector::wrap(ScriptedInputCollector::new(&[]));

    let mut runner = Runner::new(
        Mode::Execute,
        &config,
        StateManager::new(dir.path(), "rate-limit-wait"),
        mode_runner,
        Box::new(FixedCompletionChecker::complete("done")),
        display_boxed,
        input_boxed,
    );

    let outcome = runner.run().await.unwrap();

    assert_eq!(outcome.state, RunnerPhase::Completed);
    assert_eq!(mode_runner_handle.visited_steps().len(), 2);
    assert!(!display.messages_at(MessageLevel::Warning).is_empty());
}
