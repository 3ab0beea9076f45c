//! Behavior-driven tests for per-source retry and backoff
//!
//! These tests run on paused tokio time, so backoff delays are observed
//! exactly without real waiting.

use std::sync::Arc;
use std::time::Duration;

use lodestone_tests::*;
use tokio::time::Instant;

fn assert_elapsed_close(elapsed: Duration, expected: Duration) {
    assert!(
        elapsed >= expected && elapsed < expected + Duration::from_millis(5),
        "elapsed {elapsed:?}, expected {expected:?}"
    );
}

// =============================================================================
// Retry: Backoff Schedule
// =============================================================================

#[tokio::test(start_paused = true)]
async fn when_scheduled_retries_keep_failing_delays_double_from_one_second() {
    // Given: A metrics source that always fails
    let metrics_fetcher = ScriptedFetcher::always(SourceName::Metrics, Err(network_error()));
    let orchestrator = Arc::new(FetchOrchestrator::new(fetchers(&[&metrics_fetcher])));
    let controller = RetryController::new(Arc::clone(&orchestrator), Backoff::default());
    let mut changes = orchestrator.subscribe();

    orchestrator.select(entity("ABC", "Abc Mining"));
    wait_for(&mut changes, SourceName::Metrics, Transition::Failed).await;

    // When: Four retries are scheduled one after another
    let mut delays = Vec::new();
    for _ in 0..4 {
        let started = Instant::now();
        let delay = controller
            .schedule_retry(SourceName::Metrics)
            .expect("retry scheduled");
        wait_for(&mut changes, SourceName::Metrics, Transition::RetryStarted).await;
        assert_elapsed_close(started.elapsed(), delay);
        wait_for(&mut changes, SourceName::Metrics, Transition::Failed).await;
        delays.push(delay);
    }

    // Then: The delays are 1s, 2s, 4s, 8s and every attempt is counted
    assert_eq!(
        delays,
        [1_000, 2_000, 4_000, 8_000].map(Duration::from_millis).to_vec()
    );
    let state = controller
        .state(SourceName::Metrics)
        .expect("retry state exists");
    assert_eq!(state.attempt_count, 4);
    assert_eq!(state.next_delay_ms, 8_000);
    assert!(!state.is_retrying);
    assert_eq!(metrics_fetcher.calls().len(), 5);
}

#[tokio::test(start_paused = true)]
async fn when_a_retry_is_already_scheduled_a_second_request_is_ignored() {
    // Given: A failed source with a retry waiting on its timer
    let metrics_fetcher = ScriptedFetcher::always(SourceName::Metrics, Err(server_error(503)));
    let orchestrator = Arc::new(FetchOrchestrator::new(fetchers(&[&metrics_fetcher])));
    let controller = RetryController::new(Arc::clone(&orchestrator), Backoff::default());
    orchestrator.select(entity("ABC", "Abc Mining"));
    orchestrator.settled().await;
    assert!(controller.schedule_retry(SourceName::Metrics).is_some());

    // When: Another retry is requested before the timer fires
    let second = controller.schedule_retry(SourceName::Metrics);

    // Then: It is a no-op and the attempt count is unchanged
    assert_eq!(second, None);
    let state = controller.state(SourceName::Metrics).expect("state");
    assert_eq!(state.attempt_count, 1);
    assert!(state.is_retrying);
}

#[tokio::test(start_paused = true)]
async fn when_retry_now_is_used_the_pending_timer_is_cancelled() {
    // Given: A scheduled retry for a failed source
    let metrics_fetcher = ScriptedFetcher::new(SourceName::Metrics);
    metrics_fetcher.push(Err(network_error()));
    metrics_fetcher.push(Ok(metrics_for("ABC")));
    let orchestrator = Arc::new(FetchOrchestrator::new(fetchers(&[&metrics_fetcher])));
    let controller = RetryController::new(Arc::clone(&orchestrator), Backoff::default());
    orchestrator.select(entity("ABC", "Abc Mining"));
    orchestrator.settled().await;
    controller.schedule_retry(SourceName::Metrics);

    // When: The user retries immediately
    let started = Instant::now();
    assert!(controller.retry_now(SourceName::Metrics));
    let state = orchestrator.settled().await;

    // Then: The source recovers without waiting and the timer never refires
    assert!(started.elapsed() < Duration::from_millis(1_000));
    assert_eq!(state.success_count(), 1);
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(metrics_fetcher.calls().len(), 2);
    let retry = controller.state(SourceName::Metrics).expect("state");
    assert_eq!(retry.attempt_count, 2);
    assert!(!retry.is_retrying);
}

#[tokio::test(start_paused = true)]
async fn when_a_scheduled_retry_is_cancelled_it_never_fires() {
    // Given: A scheduled retry for a failed source
    let metrics_fetcher = ScriptedFetcher::always(SourceName::Metrics, Err(network_error()));
    let orchestrator = Arc::new(FetchOrchestrator::new(fetchers(&[&metrics_fetcher])));
    let controller = RetryController::new(Arc::clone(&orchestrator), Backoff::default());
    orchestrator.select(entity("ABC", "Abc Mining"));
    orchestrator.settled().await;
    assert!(controller.schedule_retry(SourceName::Metrics).is_some());

    // When: The retry is cancelled and a minute passes
    controller.cancel_pending(SourceName::Metrics);
    tokio::time::sleep(Duration::from_secs(60)).await;

    // Then: No refetch happened and the attempt is still counted
    assert_eq!(metrics_fetcher.calls().len(), 1);
    let state = controller.state(SourceName::Metrics).expect("state");
    assert_eq!(state.attempt_count, 1);
    assert!(!state.is_retrying);
    assert_eq!(orchestrator.snapshot().failed_sources(), vec![SourceName::Metrics]);

    // And: The source can be scheduled again with the next backoff step
    assert_eq!(
        controller.schedule_retry(SourceName::Metrics),
        Some(Duration::from_millis(2_000))
    );
}

#[tokio::test(start_paused = true)]
async fn when_the_retry_controller_is_dropped_pending_retries_never_fire() {
    // Given: A scheduled retry for a failed source
    let metrics_fetcher = ScriptedFetcher::always(SourceName::Metrics, Err(network_error()));
    let orchestrator = Arc::new(FetchOrchestrator::new(fetchers(&[&metrics_fetcher])));
    let controller = RetryController::new(Arc::clone(&orchestrator), Backoff::default());
    orchestrator.select(entity("ABC", "Abc Mining"));
    orchestrator.settled().await;
    assert!(controller.schedule_retry(SourceName::Metrics).is_some());

    // When: The controller is dropped and a minute passes
    drop(controller);
    tokio::time::sleep(Duration::from_secs(60)).await;

    // Then: The source was never refetched
    assert_eq!(metrics_fetcher.calls().len(), 1);
    assert_eq!(orchestrator.snapshot().failed_sources(), vec![SourceName::Metrics]);
}

#[tokio::test(start_paused = true)]
async fn when_the_session_is_dropped_pending_retries_never_fire() {
    // Given: A session with a scheduled retry
    let metrics_fetcher = ScriptedFetcher::always(SourceName::Metrics, Err(server_error(503)));
    let session = scripted_session(fetchers(&[&metrics_fetcher]), RetryPolicy::default());
    session.select(entity("ABC", "Abc Mining"));
    session.settled().await;
    assert!(session.retry(SourceName::Metrics).is_some());

    // When: The session is dropped and a minute passes
    drop(session);
    tokio::time::sleep(Duration::from_secs(60)).await;

    // Then: The source was never refetched
    assert_eq!(metrics_fetcher.calls().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn when_a_source_is_not_failed_no_retry_is_scheduled() {
    // Given: An orchestrator with nothing selected
    let metrics_fetcher = ScriptedFetcher::always(SourceName::Metrics, Ok(metrics_for("ABC")));
    let orchestrator = Arc::new(FetchOrchestrator::new(fetchers(&[&metrics_fetcher])));
    let controller = RetryController::new(Arc::clone(&orchestrator), Backoff::default());

    // When: A retry is requested before any selection
    let idle = controller.schedule_retry(SourceName::Metrics);

    // Then: Nothing is scheduled or counted
    assert_eq!(idle, None);
    assert_eq!(controller.state(SourceName::Metrics), None);

    // When: The source resolves successfully and a retry is requested
    orchestrator.select(entity("ABC", "Abc Mining"));
    orchestrator.settled().await;
    let resolved = controller.schedule_retry(SourceName::Metrics);

    // Then: It is refused as well and no fetch follows
    assert_eq!(resolved, None);
    assert_eq!(controller.state(SourceName::Metrics), None);
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(metrics_fetcher.calls().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn when_a_new_entity_is_selected_scheduled_retries_are_dropped() {
    // Given: A retry scheduled for ABC
    let metrics_fetcher = ScriptedFetcher::always(SourceName::Metrics, Err(network_error()));
    let session = scripted_session(fetchers(&[&metrics_fetcher]), RetryPolicy::default());
    session.select(entity("ABC", "Abc Mining"));
    session.settled().await;
    assert!(session.retry(SourceName::Metrics).is_some());

    // When: XYZ is selected before the timer fires
    session.select(entity("XYZ", "Xyz Energy"));
    session.settled().await;
    tokio::time::sleep(Duration::from_secs(60)).await;

    // Then: ABC is never refetched and XYZ starts without retry state
    assert_eq!(metrics_fetcher.calls_for(&symbol("ABC")), 1);
    assert_eq!(metrics_fetcher.calls_for(&symbol("XYZ")), 1);
    assert_eq!(session.retry_state(SourceName::Metrics), None);
}

// =============================================================================
// Retry: Automatic Retries
// =============================================================================

#[tokio::test(start_paused = true)]
async fn when_auto_retry_is_enabled_transient_failures_recover_on_their_own() {
    // Given: Auto-retry on and a source that fails twice with network errors
    let metrics_fetcher = ScriptedFetcher::new(SourceName::Metrics);
    metrics_fetcher.push(Err(network_error()));
    metrics_fetcher.push(Err(network_error()));
    metrics_fetcher.push(Ok(metrics_for("ABC")));
    let policy = RetryPolicy {
        auto_retry: true,
        ..RetryPolicy::default()
    };
    let session = scripted_session(fetchers(&[&metrics_fetcher]), policy);
    let mut changes = session.subscribe();

    // When: The entity is selected and left alone
    let started = Instant::now();
    session.select(entity("ABC", "Abc Mining"));
    wait_for(&mut changes, SourceName::Metrics, Transition::Resolved).await;

    // Then: Two backoff-delayed retries happened (1s + 2s)
    assert_elapsed_close(started.elapsed(), Duration::from_millis(3_000));
    assert_eq!(session.snapshot().success_count(), 1);
    assert_eq!(
        session
            .retry_state(SourceName::Metrics)
            .map(|state| state.attempt_count),
        Some(2)
    );
}

#[tokio::test(start_paused = true)]
async fn when_auto_retry_hits_its_limit_the_source_stays_failed() {
    // Given: Auto-retry on and a source that never recovers
    let metrics_fetcher = ScriptedFetcher::always(SourceName::Metrics, Err(server_error(503)));
    let policy = RetryPolicy {
        auto_retry: true,
        ..RetryPolicy::default()
    };
    let session = scripted_session(fetchers(&[&metrics_fetcher]), policy);
    let mut changes = session.subscribe();

    // When: The session is left running for an hour
    session.select(entity("ABC", "Abc Mining"));
    for _ in 0..5 {
        wait_for(&mut changes, SourceName::Metrics, Transition::Failed).await;
    }
    tokio::time::sleep(Duration::from_secs(3_600)).await;

    // Then: The initial fetch plus four automatic retries were made
    assert_eq!(metrics_fetcher.calls().len(), 5);
    assert_eq!(session.snapshot().failed_sources(), vec![SourceName::Metrics]);
    assert_eq!(
        session
            .retry_state(SourceName::Metrics)
            .map(|state| state.attempt_count),
        Some(4)
    );
}

#[tokio::test(start_paused = true)]
async fn when_auto_retry_sees_a_client_error_it_leaves_the_source_failed() {
    // Given: Auto-retry on and a 404 from the server
    let metrics_fetcher = ScriptedFetcher::always(SourceName::Metrics, Err(server_error(404)));
    let policy = RetryPolicy {
        auto_retry: true,
        ..RetryPolicy::default()
    };
    let session = scripted_session(fetchers(&[&metrics_fetcher]), policy);

    // When: The failure settles and time passes
    session.select(entity("ABC", "Abc Mining"));
    session.settled().await;
    tokio::time::sleep(Duration::from_secs(60)).await;

    // Then: No automatic retry was attempted
    assert_eq!(metrics_fetcher.calls().len(), 1);
    assert_eq!(session.retry_state(SourceName::Metrics), None);
}
