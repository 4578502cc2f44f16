//! Progress observability: the event schema, the synchronous bus and the
//! reference aggregator.

pub mod aggregator;
pub mod bus;
pub mod event;

pub use aggregator::{ProgressAggregator, ProgressSummary};
pub use bus::{combine, tracing_handler, ProgressBus, ProgressHandler};
pub use event::{EventType, ProgressEvent};
