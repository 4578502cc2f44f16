//! Event schema for pipeline progress.

use crate::error::Phase;
use crate::generation::plan::Stats;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Start,
    Update,
    PageStart,
    PageDone,
    Retry,
    Skip,
    Complete,
    Error,
}

impl EventType {
    /// Events that settle an item's outcome for the current run.
    pub fn is_terminal(self) -> bool {
        matches!(self, EventType::PageDone | EventType::Error | EventType::Skip)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub timestamp: DateTime<Utc>,
    pub phase: Phase,
    #[serde(rename = "type")]
    pub event_type: EventType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    pub message: String,
    pub progress: f64,
    pub current: usize,
    pub total: usize,
}

impl ProgressEvent {
    pub fn new(phase: Phase, event_type: EventType, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            phase,
            event_type,
            item_id: None,
            path: None,
            message: message.into(),
            progress: 0.0,
            current: 0,
            total: 0,
        }
    }

    pub fn with_item(mut self, id: impl Into<String>, path: impl Into<String>) -> Self {
        self.item_id = Some(id.into());
        self.path = Some(path.into());
        self
    }

    pub fn with_stats(mut self, stats: &Stats) -> Self {
        self.progress = stats.progress();
        self.current = stats.processed();
        self.total = stats.total;
        self
    }
}
