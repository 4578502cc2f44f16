//! Pagesmith: rate-limited content generation
//!
//! Drives a plan of independent pages through a completion provider under a
//! shared request budget, with per-item retry and backoff, bounded parallelism,
//! cooperative cancellation and progress events.

pub mod cli;
pub mod config;
pub mod error;
pub mod generation;
pub mod logging;
pub mod progress;
pub mod provider;

pub use error::{CommandError, ConfigError, GenerationError, Phase, PipelineError, ProviderError};
pub use generation::{Generator, GenerationOutput, Plan, RunReport, WorkItem};
