//! Event ordering and the aggregated view of a run.

use super::test_utils::{config, generator, plan, MemoryStore, Recorder, ScriptedProvider};
use pagesmith::error::Phase;
use pagesmith::generation::ExecutionMode;
use pagesmith::progress::{combine, EventType, ProgressAggregator};
use pagesmith::ProviderError;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

fn position(events: &[pagesmith::progress::ProgressEvent], id: &str, kind: EventType) -> usize {
    events
        .iter()
        .position(|event| event.event_type == kind && event.item_id.as_deref() == Some(id))
        .unwrap_or_else(|| panic!("no {kind:?} event for {id}"))
}

#[tokio::test(start_paused = true)]
async fn run_is_bracketed_by_start_and_complete() {
    let recorder = Recorder::default();
    let generator = generator(
        config(ExecutionMode::Sequential),
        ScriptedProvider::new(),
        MemoryStore::new(),
        &recorder,
    );
    let mut plan = plan(3);

    generator.run(&mut plan, CancellationToken::new()).await;

    let events = recorder.events();
    let first = events.first().unwrap();
    assert_eq!(first.event_type, EventType::Start);
    assert_eq!(first.phase, Phase::Generating);
    assert_eq!((first.current, first.total), (0, 3));

    let last = events.last().unwrap();
    assert_eq!(last.event_type, EventType::Complete);
    assert_eq!(last.phase, Phase::Completed);
    assert_eq!(last.progress, 1.0);

    for i in 0..3 {
        let id = format!("page-{i}");
        assert!(
            position(&events, &id, EventType::PageStart)
                < position(&events, &id, EventType::PageDone)
        );
    }
}

#[tokio::test(start_paused = true)]
async fn progress_never_decreases() {
    let recorder = Recorder::default();
    let generator = generator(
        config(ExecutionMode::Parallel),
        ScriptedProvider::new(),
        MemoryStore::new(),
        &recorder,
    );
    let mut plan = plan(8);

    generator.run(&mut plan, CancellationToken::new()).await;

    let terminal: Vec<_> = recorder
        .events()
        .into_iter()
        .filter(|event| event.event_type.is_terminal() && event.item_id.is_some())
        .collect();
    assert_eq!(terminal.len(), 8);
    for pair in terminal.windows(2) {
        assert!(pair[0].current < pair[1].current);
        assert!(pair[0].progress <= pair[1].progress);
    }
    let last = terminal.last().unwrap();
    assert_eq!((last.current, last.total), (8, 8));
}

#[tokio::test(start_paused = true)]
async fn aggregator_tracks_final_status_per_item() {
    let provider = ScriptedProvider::new();
    provider.script(
        "page-1",
        vec![Err(ProviderError::RequestFailed(
            "connection reset by peer".to_string(),
        ))],
    );
    provider.script(
        "page-2",
        vec![Err(ProviderError::ModelNotFound("gone".to_string()))],
    );
    let store = MemoryStore::new();
    store.seed("content/page-3.md");

    let recorder = Recorder::default();
    let aggregator = Arc::new(ProgressAggregator::new());
    let generator = generator(
        config(ExecutionMode::Sequential),
        provider,
        store,
        &recorder,
    )
    .with_progress(combine([
        Some(recorder.handler()),
        Some(aggregator.handler()),
    ]));
    let mut plan = plan(4);

    generator.run(&mut plan, CancellationToken::new()).await;

    let statuses = aggregator.final_statuses();
    assert_eq!(statuses.len(), 4);
    assert_eq!(statuses["page-0"], EventType::PageDone);
    assert_eq!(statuses["page-1"], EventType::PageDone);
    assert_eq!(statuses["page-2"], EventType::Error);
    assert_eq!(statuses["page-3"], EventType::Skip);

    let summary = aggregator.summary();
    assert!(summary.finished);
    assert_eq!(summary.started, 3);
    assert_eq!(summary.completed, 2);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.skipped, 1);
    assert_eq!(aggregator.retries(), 1);
    // Both observers saw the same stream.
    assert_eq!(recorder.events().len(), aggregator.events().len());
}

#[tokio::test(start_paused = true)]
async fn events_serialize_with_snake_case_type() {
    let recorder = Recorder::default();
    let generator = generator(
        config(ExecutionMode::Sequential),
        ScriptedProvider::new(),
        MemoryStore::new(),
        &recorder,
    );
    let mut plan = plan(1);

    generator.run(&mut plan, CancellationToken::new()).await;

    let done = recorder
        .events()
        .into_iter()
        .find(|event| event.event_type == EventType::PageDone)
        .unwrap();
    let json = serde_json::to_value(&done).unwrap();
    assert_eq!(json["type"], "page_done");
    assert_eq!(json["phase"], "generating");
    assert_eq!(json["item_id"], "page-0");
    assert_eq!(json["path"], "content/page-0.md");
}
