//! Reference progress observer that keeps running counts for a run.

use crate::error::Phase;
use crate::progress::bus::ProgressHandler;
use crate::progress::event::{EventType, ProgressEvent};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

struct AggregatorState {
    events: Vec<ProgressEvent>,
    started_at: Instant,
    finished_at: Option<Instant>,
}

pub struct ProgressAggregator {
    state: RwLock<AggregatorState>,
}

/// Point-in-time view of the aggregated counts.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressSummary {
    pub started: usize,
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub duration: Duration,
    pub finished: bool,
}

impl ProgressAggregator {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(AggregatorState {
                events: Vec::new(),
                started_at: Instant::now(),
                finished_at: None,
            }),
        }
    }

    pub fn record(&self, event: &ProgressEvent) {
        let mut state = self.state.write();
        match (event.phase, event.event_type) {
            (Phase::Generating, EventType::Start) if state.events.is_empty() => {
                state.started_at = Instant::now();
            }
            (Phase::Completed, EventType::Complete) => {
                state.finished_at = Some(Instant::now());
            }
            _ => {}
        }
        state.events.push(event.clone());
    }

    /// Handler to register on a progress bus.
    pub fn handler(self: &Arc<Self>) -> ProgressHandler {
        let aggregator = Arc::clone(self);
        Arc::new(move |event: &ProgressEvent| aggregator.record(event))
    }

    pub fn events(&self) -> Vec<ProgressEvent> {
        self.state.read().events.clone()
    }

    /// Item-level events only; a run-level `error` has no item id and is not a failed item.
    fn count(&self, event_type: EventType) -> usize {
        self.state
            .read()
            .events
            .iter()
            .filter(|event| event.event_type == event_type && event.item_id.is_some())
            .count()
    }

    pub fn started(&self) -> usize {
        self.count(EventType::PageStart)
    }

    pub fn completed(&self) -> usize {
        self.count(EventType::PageDone)
    }

    pub fn failed(&self) -> usize {
        self.count(EventType::Error)
    }

    pub fn skipped(&self) -> usize {
        self.count(EventType::Skip)
    }

    pub fn retries(&self) -> usize {
        self.count(EventType::Retry)
    }

    pub fn is_finished(&self) -> bool {
        self.state.read().finished_at.is_some()
    }

    pub fn duration(&self) -> Duration {
        let state = self.state.read();
        match state.finished_at {
            Some(finished) => finished.duration_since(state.started_at),
            None => state.started_at.elapsed(),
        }
    }

    /// Latest terminal event per item id.
    pub fn final_statuses(&self) -> HashMap<String, EventType> {
        let state = self.state.read();
        let mut statuses = HashMap::new();
        for event in &state.events {
            if !event.event_type.is_terminal() {
                continue;
            }
            if let Some(id) = &event.item_id {
                statuses.insert(id.clone(), event.event_type);
            }
        }
        statuses
    }

    pub fn summary(&self) -> ProgressSummary {
        ProgressSummary {
            started: self.started(),
            completed: self.completed(),
            failed: self.failed(),
            skipped: self.skipped(),
            duration: self.duration(),
            finished: self.is_finished(),
        }
    }
}

impl Default for ProgressAggregator {
    fn default() -> Self {
        Self::new()
    }
}
