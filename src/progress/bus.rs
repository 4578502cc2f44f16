//! Synchronous progress bus: one handler call per emitted event.

use crate::progress::event::{EventType, ProgressEvent};
use std::sync::Arc;
use tracing::{info, warn};

pub type ProgressHandler = Arc<dyn Fn(&ProgressEvent) + Send + Sync>;

#[derive(Clone, Default)]
pub struct ProgressBus {
    handler: Option<ProgressHandler>,
}

impl ProgressBus {
    pub fn new(handler: Option<ProgressHandler>) -> Self {
        Self { handler }
    }

    pub fn emit(&self, event: ProgressEvent) {
        if let Some(handler) = &self.handler {
            handler(&event);
        }
    }

    pub fn is_observed(&self) -> bool {
        self.handler.is_some()
    }
}

/// Fan out to every present handler in order; absent ones are skipped.
pub fn combine<I>(handlers: I) -> ProgressHandler
where
    I: IntoIterator<Item = Option<ProgressHandler>>,
{
    let handlers: Vec<ProgressHandler> = handlers.into_iter().flatten().collect();
    Arc::new(move |event: &ProgressEvent| {
        for handler in &handlers {
            handler(event);
        }
    })
}

/// Mirrors events into the log.
pub fn tracing_handler() -> ProgressHandler {
    Arc::new(|event: &ProgressEvent| {
        let item = event.item_id.as_deref().unwrap_or("-");
        let percent = event.progress * 100.0;
        match event.event_type {
            EventType::Error | EventType::Retry => warn!(
                phase = %event.phase,
                event = ?event.event_type,
                item_id = %item,
                current = event.current,
                total = event.total,
                "{} ({percent:.0}%)",
                event.message
            ),
            _ => info!(
                phase = %event.phase,
                event = ?event.event_type,
                item_id = %item,
                current = event.current,
                total = event.total,
                "{} ({percent:.0}%)",
                event.message
            ),
        }
    })
}
