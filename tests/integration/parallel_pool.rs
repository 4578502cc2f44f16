//! Parallel controller: ordering, bounded concurrency, rate budget, abort and cancellation.

use super::test_utils::{config, generator, plan, MemoryStore, Recorder, ScriptedProvider};
use pagesmith::error::Phase;
use pagesmith::generation::{ExecutionMode, ItemStatus};
use pagesmith::progress::EventType;
use pagesmith::ProviderError;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

#[tokio::test(start_paused = true)]
async fn results_follow_plan_order_regardless_of_completion_order() {
    let provider = ScriptedProvider::new();
    for i in 0..12u64 {
        // Later items finish first.
        provider.delay(&format!("page-{i}"), Duration::from_millis(1200 - i * 100));
    }
    let recorder = Recorder::default();
    let generator = generator(
        config(ExecutionMode::Parallel),
        provider.clone(),
        MemoryStore::new(),
        &recorder,
    );
    let mut plan = plan(12);

    let report = generator.run(&mut plan, CancellationToken::new()).await;

    assert!(report.is_success());
    assert_eq!(report.outputs.len(), plan.items.len());
    for (output, item) in report.outputs.iter().zip(&plan.items) {
        assert_eq!(output.id, item.id);
        assert!(output.success);
    }
    let finished: Vec<String> = recorder
        .events()
        .iter()
        .filter(|event| event.event_type == EventType::PageDone)
        .filter_map(|event| event.item_id.clone())
        .collect();
    assert_ne!(finished, plan.items.iter().map(|i| i.id.clone()).collect::<Vec<_>>());
}

#[tokio::test(start_paused = true)]
async fn pool_never_exceeds_max_concurrency() {
    let provider = ScriptedProvider::new();
    for i in 0..20 {
        provider.delay(&format!("page-{i}"), Duration::from_millis(500));
    }
    let recorder = Recorder::default();
    let generator = generator(
        config(ExecutionMode::Parallel),
        provider.clone(),
        MemoryStore::new(),
        &recorder,
    );
    let mut plan = plan(20);

    generator.run(&mut plan, CancellationToken::new()).await;

    assert_eq!(provider.calls().len(), 20);
    assert!(provider.max_in_flight() <= 4);
    assert!(provider.max_in_flight() > 1);
    assert_eq!(plan.stats.completed, 20);
}

#[tokio::test(start_paused = true)]
async fn aggregate_call_rate_stays_within_budget() {
    let provider = ScriptedProvider::new();
    let mut config = config(ExecutionMode::Parallel);
    config.rate.requests_per_minute = 60;
    config.rate.max_concurrency = 4;
    let recorder = Recorder::default();
    let generator = generator(config, provider.clone(), MemoryStore::new(), &recorder);
    let mut plan = plan(20);

    let started = Instant::now();
    let report = generator.run(&mut plan, CancellationToken::new()).await;
    assert!(report.is_success());

    let calls = provider.calls();
    assert_eq!(calls.len(), 20);
    let burst = 4.0;
    for (issued, call) in calls.iter().enumerate() {
        let elapsed = call.at.duration_since(started).as_secs_f64();
        let allowed = (60.0 * elapsed / 60.0).ceil() + burst;
        assert!(
            (issued + 1) as f64 <= allowed,
            "call {} at {:.2}s exceeds budget {}",
            issued + 1,
            elapsed,
            allowed
        );
    }
    // 20 calls at one per second after a burst of four.
    assert!(started.elapsed() >= Duration::from_secs(15));
}

#[tokio::test(start_paused = true)]
async fn first_failure_aborts_the_run_exactly_once() {
    let provider = ScriptedProvider::new();
    for i in 0..8 {
        provider.delay(&format!("page-{i}"), Duration::from_secs(10));
    }
    for id in ["page-2", "page-5"] {
        provider.delay(id, Duration::from_millis(100));
        provider.script(
            id,
            vec![Err(ProviderError::AuthFailed(format!("rejected {id}")))],
        );
    }
    let mut config = config(ExecutionMode::Parallel);
    config.continue_on_error = false;
    config.rate.max_concurrency = 8;
    let recorder = Recorder::default();
    let generator = generator(config, provider.clone(), MemoryStore::new(), &recorder);
    let mut plan = plan(8);
    let cancel = CancellationToken::new();

    let started = Instant::now();
    let report = generator.run(&mut plan, cancel.clone()).await;

    let err = report.error.as_ref().expect("abort surfaces a pipeline error");
    let cause = err.source.to_string();
    assert!(
        cause.contains("rejected page-2") ^ cause.contains("rejected page-5"),
        "unexpected cause: {cause}"
    );
    assert!(!err.is_cancelled());
    assert!(!err.partial);
    assert!(!cancel.is_cancelled(), "caller token is left alone");
    assert!(started.elapsed() < Duration::from_secs(10));

    let run_errors = recorder
        .events()
        .iter()
        .filter(|event| event.event_type == EventType::Error && event.item_id.is_none())
        .count();
    assert_eq!(run_errors, 1);

    assert_eq!(report.outputs.len(), 8);
    for (output, item) in report.outputs.iter().zip(&plan.items) {
        assert_eq!(output.id, item.id);
    }
    // Slow items were interrupted and stay pending for the next run.
    for index in [0, 1, 3, 4, 6, 7] {
        assert_eq!(plan.items[index].status, ItemStatus::Pending);
        assert!(report.outputs[index].is_cancelled());
    }
    assert!(plan.stats.failed >= 1);
}

#[tokio::test(start_paused = true)]
async fn caller_cancellation_stops_workers_promptly() {
    let provider = ScriptedProvider::new();
    for i in 0..6 {
        provider.delay(&format!("page-{i}"), Duration::from_secs(60));
    }
    let recorder = Recorder::default();
    let generator = generator(
        config(ExecutionMode::Parallel),
        provider.clone(),
        MemoryStore::new(),
        &recorder,
    );
    let mut plan = plan(6);
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(1)).await;
        trigger.cancel();
    });

    let started = Instant::now();
    let report = generator.run(&mut plan, cancel).await;

    assert!(started.elapsed() < Duration::from_secs(2));
    let err = report.error.expect("cancellation is reported");
    assert!(err.is_cancelled());
    assert_eq!(err.phase, Phase::Generating);
    assert!(report.outputs.iter().all(|output| output.is_cancelled()));
    // Only the first pool-full of items ever reached the provider.
    assert_eq!(provider.calls().len(), 4);
    assert_eq!(plan.pending_count(), 6);
    assert_eq!(plan.stats.failed, 0);
    assert!(plan.items.iter().all(|item| item.last_error.is_none()));
}

#[tokio::test(start_paused = true)]
async fn abandoned_run_returns_the_plan_and_stops_its_workers() {
    let provider = ScriptedProvider::new();
    for i in 0..6 {
        provider.delay(&format!("page-{i}"), Duration::from_secs(5));
    }
    let store = MemoryStore::new();
    let recorder = Recorder::default();
    let generator = generator(
        config(ExecutionMode::Parallel),
        provider.clone(),
        store.clone(),
        &recorder,
    );
    let mut plan = plan(6);

    let result = tokio::time::timeout(
        Duration::from_secs(1),
        generator.run(&mut plan, CancellationToken::new()),
    )
    .await;
    assert!(result.is_err());

    // The caller still holds its plan, with nothing stuck in flight.
    assert_eq!(plan.id, "test-plan");
    assert_eq!(plan.items.len(), 6);
    assert_eq!(plan.pending_count(), 6);
    assert!(plan
        .items
        .iter()
        .all(|item| item.status == ItemStatus::Pending));

    let calls_at_drop = provider.calls().len();
    assert_eq!(calls_at_drop, 4);
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(provider.calls().len(), calls_at_drop);
    assert_eq!(store.len(), 0);

    // The same plan runs to completion afterwards.
    let report = generator.run(&mut plan, CancellationToken::new()).await;
    assert!(report.is_success());
    assert_eq!(store.len(), 6);
}
