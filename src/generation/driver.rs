//! Pipeline driver: owns the plan for the duration of a run, dispatches to the
//! concurrency controller and turns the outcome into a report.

use crate::config::PipelineConfig;
use crate::error::{GenerationError, Phase, PipelineError};
use crate::generation::hooks::{
    ArtifactStore, FrontMatterCleanup, PagePromptBuilder, PostProcessor, PromptBuilder,
};
use crate::generation::plan::{GenerationOutput, Plan, PlanStatus};
use crate::generation::pool::{self, parallelism, PoolOutcome};
use crate::generation::rate::RateBudget;
use crate::generation::retry::RetryPolicy;
use crate::generation::worker::{ItemExecutor, RunState};
use crate::progress::bus::{ProgressBus, ProgressHandler};
use crate::progress::event::EventType;
use crate::provider::{CompletionOptions, ModelProviderClient};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Outcome of one run. `outputs` is in plan order even when `error` is set.
#[derive(Debug)]
pub struct RunReport {
    pub outputs: Vec<GenerationOutput>,
    pub error: Option<PipelineError>,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    pub fn produced(&self) -> usize {
        self.outputs.iter().filter(|o| o.produced_artifact()).count()
    }

    pub fn failed(&self) -> usize {
        self.outputs
            .iter()
            .filter(|o| !o.success && !o.is_cancelled())
            .count()
    }

    pub fn into_result(self) -> Result<Vec<GenerationOutput>, PipelineError> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.outputs),
        }
    }
}

/// Hands the shared plan back to the caller when a run ends, including when
/// the run future is dropped part-way. Also stops any worker still running.
struct RestorePlan<'a> {
    target: &'a mut Plan,
    shared: Arc<Mutex<Plan>>,
    run_token: CancellationToken,
}

impl Drop for RestorePlan<'_> {
    fn drop(&mut self) {
        self.run_token.cancel();
        let mut restored = std::mem::take(&mut *self.shared.lock());
        let reset = restored.reset_interrupted();
        if reset > 0 {
            warn!(plan_id = %restored.id, reset, "Run abandoned with items in flight");
        }
        restored.refresh();
        *self.target = restored;
    }
}

/// Generates every pending item of a plan. One rate budget per generator,
/// shared by all of its workers and all of its runs.
pub struct Generator {
    config: PipelineConfig,
    provider: Arc<dyn ModelProviderClient>,
    store: Arc<dyn ArtifactStore>,
    prompts: Arc<dyn PromptBuilder>,
    post_processor: Arc<dyn PostProcessor>,
    options: CompletionOptions,
    rate: Arc<RateBudget>,
    progress: Option<ProgressHandler>,
}

impl Generator {
    pub fn new(
        config: PipelineConfig,
        provider: Arc<dyn ModelProviderClient>,
        store: Arc<dyn ArtifactStore>,
    ) -> Self {
        let rate = Arc::new(RateBudget::from_config(&config.rate));
        Self {
            config,
            provider,
            store,
            prompts: Arc::new(PagePromptBuilder::default()),
            post_processor: Arc::new(FrontMatterCleanup),
            options: CompletionOptions::default(),
            rate,
            progress: None,
        }
    }

    pub fn with_prompt_builder(mut self, prompts: Arc<dyn PromptBuilder>) -> Self {
        self.prompts = prompts;
        self
    }

    pub fn with_post_processor(mut self, post_processor: Arc<dyn PostProcessor>) -> Self {
        self.post_processor = post_processor;
        self
    }

    pub fn with_completion_options(mut self, options: CompletionOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_progress(mut self, handler: ProgressHandler) -> Self {
        self.progress = Some(handler);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    fn executor(&self) -> ItemExecutor {
        ItemExecutor {
            provider: Arc::clone(&self.provider),
            prompts: Arc::clone(&self.prompts),
            post_processor: Arc::clone(&self.post_processor),
            store: Arc::clone(&self.store),
            rate: Arc::clone(&self.rate),
            retry: RetryPolicy::from_config(&self.config),
            options: self.options.clone(),
            attempt_timeout: self.config.attempt_timeout(),
            overwrite: self.config.overwrite,
            dry_run: self.config.dry_run,
        }
    }

    /// Run every item that is neither completed nor skipped.
    ///
    /// The plan is updated in place. Cancelling `cancel` stops the run at the
    /// next suspension point; a failure without continue-on-error stops it too,
    /// but never cancels the caller's token.
    pub async fn run(&self, plan: &mut Plan, cancel: CancellationToken) -> RunReport {
        let reset = plan.reset_interrupted();
        plan.refresh();
        let pending = plan.pending_count();
        let degree = parallelism(self.config.mode, pending, &self.config.rate);
        plan.status = PlanStatus::InProgress;

        info!(
            plan_id = %plan.id,
            total = plan.items.len(),
            pending,
            workers = degree,
            mode = %self.config.mode,
            reset,
            "Starting generation run"
        );

        let (outputs, error) = {
            let state = Arc::new(RunState::new(
                std::mem::take(plan),
                ProgressBus::new(self.progress.clone()),
                cancel.child_token(),
            ));
            let _restore = RestorePlan {
                target: &mut *plan,
                shared: Arc::clone(&state.plan),
                run_token: state.cancel.clone(),
            };
            self.drive(&state, pending, degree, &cancel).await
        };

        info!(
            plan_id = %plan.id,
            status = ?plan.status,
            completed = plan.stats.completed,
            failed = plan.stats.failed,
            skipped = plan.stats.skipped,
            "Generation run finished"
        );

        RunReport { outputs, error }
    }

    async fn drive(
        &self,
        state: &Arc<RunState>,
        pending: usize,
        degree: usize,
        caller: &CancellationToken,
    ) -> (Vec<GenerationOutput>, Option<PipelineError>) {
        state.emit_run(
            Phase::Generating,
            EventType::Start,
            format!("generating {} of {} items", pending, state.item_count()),
        );

        let outcome = if pending == 0 {
            PoolOutcome {
                outputs: Self::already_done(state),
                failure: None,
            }
        } else {
            state.emit_run(
                Phase::Generating,
                EventType::Update,
                format!("{} pending, {} workers", pending, degree),
            );
            let executor = self.executor();
            if degree <= 1 {
                pool::run_sequential(&executor, state, self.config.continue_on_error).await
            } else {
                pool::run_parallel(
                    Arc::new(executor),
                    Arc::clone(state),
                    degree,
                    self.config.continue_on_error,
                )
                .await
            }
        };

        let error = self.pipeline_error(state, &outcome, caller.is_cancelled());
        if let Some(err) = &error {
            error!(error = %err, partial = err.partial, "Generation run stopped");
            state.emit_run(Phase::Generating, EventType::Error, err.to_string());
        }

        state.plan.lock().refresh();
        state.emit_run(Phase::Completed, EventType::Complete, "generation finished");

        (outcome.outputs, error)
    }

    fn already_done(state: &RunState) -> Vec<GenerationOutput> {
        let plan = state.plan.lock();
        plan.items.iter().map(GenerationOutput::skipped).collect()
    }

    fn pipeline_error(
        &self,
        state: &RunState,
        outcome: &PoolOutcome,
        caller_cancelled: bool,
    ) -> Option<PipelineError> {
        let partial = outcome.outputs.iter().any(GenerationOutput::produced_artifact);
        if let Some((index, cause)) = &outcome.failure {
            let item_id = state
                .plan
                .lock()
                .items
                .get(*index)
                .map(|item| item.id.clone())
                .unwrap_or_default();
            return Some(PipelineError::new(
                Phase::Generating,
                format!("stopped after item {} failed", item_id),
                partial,
                cause.clone(),
            ));
        }
        if caller_cancelled {
            return Some(PipelineError::new(
                Phase::Generating,
                "run cancelled",
                partial,
                GenerationError::Cancelled,
            ));
        }
        None
    }
}
