//! Generation pipeline: plan state, retry and rate policy, item execution,
//! the concurrency controller and the driver that ties them together.

pub mod driver;
pub mod hooks;
pub mod plan;
pub mod pool;
pub mod rate;
pub mod retry;
pub mod worker;

pub use driver::{Generator, RunReport};
pub use hooks::{
    ArtifactStore, FrontMatterCleanup, FsArtifactStore, PagePromptBuilder, PostProcessor,
    PromptBuilder,
};
pub use plan::{GenerationOutput, ItemStatus, Plan, PlanStatus, Stats, WorkItem};
pub use pool::{parallelism, ExecutionMode};
pub use rate::RateBudget;
pub use retry::RetryPolicy;
