//! Integration tests for the pagesmith generation pipeline

mod fs_pipeline;
mod parallel_pool;
mod progress_events;
