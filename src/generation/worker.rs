//! Single-item execution: skip check, attempt loop, post-processing and write.

use crate::error::{GenerationError, Phase};
use crate::generation::hooks::{ArtifactStore, PostProcessor, PromptBuilder};
use crate::generation::plan::{GenerationOutput, Plan, WorkItem};
use crate::generation::rate::RateBudget;
use crate::generation::retry::RetryPolicy;
use crate::progress::bus::ProgressBus;
use crate::progress::event::{EventType, ProgressEvent};
use crate::provider::{ChatMessage, CompletionOptions, ModelProviderClient};
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// State shared by every worker of one run. The plan lock guards item fields
/// and stats; progress fractions are read while holding it.
pub struct RunState {
    pub plan: Arc<Mutex<Plan>>,
    pub bus: ProgressBus,
    pub cancel: CancellationToken,
}

/// What a worker finds when it looks up a plan slot.
pub enum Claim {
    /// Completed or skipped in an earlier run.
    Done(GenerationOutput),
    Ready(WorkItem),
}

impl RunState {
    pub fn new(plan: Plan, bus: ProgressBus, cancel: CancellationToken) -> Self {
        Self {
            plan: Arc::new(Mutex::new(plan)),
            bus,
            cancel,
        }
    }

    pub fn item_count(&self) -> usize {
        self.plan.lock().items.len()
    }

    /// The item at `index`, or its synthetic output if an earlier run finished it.
    /// Nothing is marked here; the executor does that once the item holds budget.
    pub fn claim(&self, index: usize) -> Option<Claim> {
        let plan = self.plan.lock();
        let item = plan.items.get(index)?;
        if item.status.is_done() {
            return Some(Claim::Done(GenerationOutput::skipped(item)));
        }
        Some(Claim::Ready(item.clone()))
    }

    fn mark_started(&self, index: usize) {
        self.plan.lock().mark_in_progress(index);
    }

    pub fn emit_run(&self, phase: Phase, event_type: EventType, message: impl Into<String>) {
        let plan = self.plan.lock();
        self.bus
            .emit(ProgressEvent::new(phase, event_type, message).with_stats(&plan.stats));
    }

    fn emit_item(&self, event_type: EventType, item: &WorkItem, message: String) {
        let plan = self.plan.lock();
        self.bus.emit(
            ProgressEvent::new(Phase::Generating, event_type, message)
                .with_item(&item.id, &item.path)
                .with_stats(&plan.stats),
        );
    }

    /// Fold the output into the plan, then report it from the updated stats.
    pub fn finish_item(&self, index: usize, output: &GenerationOutput) {
        let mut plan = self.plan.lock();
        plan.apply_output(index, output);

        let event_type = if output.skipped {
            info!(item_id = %output.id, path = %output.path, "Artifact exists, skipping");
            EventType::Skip
        } else if output.success {
            info!(
                item_id = %output.id,
                attempts = output.attempts,
                duration_ms = output.duration.as_millis() as u64,
                "Item generated"
            );
            EventType::PageDone
        } else if output.is_cancelled() {
            debug!(item_id = %output.id, "Item cancelled, returned to pending");
            return;
        } else {
            warn!(
                item_id = %output.id,
                attempts = output.attempts,
                error = output.error_message.as_deref().unwrap_or_default(),
                "Item failed"
            );
            EventType::Error
        };

        let message = match event_type {
            EventType::Skip => format!("{} already exists", output.path),
            EventType::PageDone => format!("generated {}", output.path),
            _ => output
                .error_message
                .clone()
                .unwrap_or_else(|| "generation failed".to_string()),
        };
        self.bus.emit(
            ProgressEvent::new(Phase::Generating, event_type, message)
                .with_item(&output.id, &output.path)
                .with_stats(&plan.stats),
        );
    }
}

/// Runs one work item to a terminal output.
pub struct ItemExecutor {
    pub(crate) provider: Arc<dyn ModelProviderClient>,
    pub(crate) prompts: Arc<dyn PromptBuilder>,
    pub(crate) post_processor: Arc<dyn PostProcessor>,
    pub(crate) store: Arc<dyn ArtifactStore>,
    pub(crate) rate: Arc<RateBudget>,
    pub(crate) retry: RetryPolicy,
    pub(crate) options: CompletionOptions,
    pub(crate) attempt_timeout: Option<Duration>,
    pub(crate) overwrite: bool,
    pub(crate) dry_run: bool,
}

impl ItemExecutor {
    /// `index` is the item's position in the plan; it is marked `in_progress`
    /// after the first budget unit is granted.
    pub async fn execute(
        &self,
        state: &RunState,
        index: usize,
        item: &WorkItem,
    ) -> GenerationOutput {
        if !self.overwrite && self.store.exists(&item.path) {
            return GenerationOutput::skipped(item);
        }

        let started = Instant::now();
        let messages = {
            let plan = state.plan.lock();
            let (system, user) = self.prompts.build_prompts(&plan, item);
            vec![ChatMessage::system(system), ChatMessage::user(user)]
        };
        let cancel = &state.cancel;
        let mut attempt: u32 = 0;

        loop {
            if let Err(err) = self.rate.acquire(cancel).await {
                return GenerationOutput::failed(item, err, attempt, started.elapsed());
            }
            if cancel.is_cancelled() {
                return GenerationOutput::failed(
                    item,
                    GenerationError::Cancelled,
                    attempt,
                    started.elapsed(),
                );
            }
            if attempt == 0 {
                state.mark_started(index);
            }
            attempt += 1;

            let (event_type, message) = if attempt == 1 {
                (EventType::PageStart, format!("generating {}", item.path))
            } else {
                (
                    EventType::Retry,
                    format!("retrying {} (attempt {})", item.path, attempt),
                )
            };
            state.emit_item(event_type, item, message);
            debug!(item_id = %item.id, attempt, "Requesting completion");

            let call = self
                .provider
                .complete(messages.clone(), self.options.clone());
            let outcome = tokio::select! {
                _ = cancel.cancelled() => Err(GenerationError::Cancelled),
                result = with_timeout(call, self.attempt_timeout) => result,
            };

            let err = match outcome {
                Ok(text) => return self.persist(item, &text, attempt, started),
                Err(err) => err,
            };
            if err.is_cancelled() || cancel.is_cancelled() {
                return GenerationOutput::failed(
                    item,
                    GenerationError::Cancelled,
                    attempt,
                    started.elapsed(),
                );
            }

            let Some(delay) = self.retry.next_delay(attempt, &err) else {
                let err = if self.retry.is_retryable(&err) {
                    GenerationError::RetriesExhausted {
                        attempts: attempt,
                        source: Box::new(err),
                    }
                } else {
                    err
                };
                return GenerationOutput::failed(item, err, attempt, started.elapsed());
            };

            warn!(
                item_id = %item.id,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Attempt failed, backing off"
            );
            tokio::select! {
                _ = cancel.cancelled() => {
                    return GenerationOutput::failed(
                        item,
                        GenerationError::Cancelled,
                        attempt,
                        started.elapsed(),
                    );
                }
                _ = sleep(delay) => {}
            }
        }
    }

    /// A write failure is terminal for the item; the generated text is not requested again.
    fn persist(
        &self,
        item: &WorkItem,
        raw: &str,
        attempt: u32,
        started: Instant,
    ) -> GenerationOutput {
        let content = self.post_processor.process(raw);
        if self.dry_run {
            debug!(item_id = %item.id, path = %item.path, "Dry run, not writing");
        } else if let Err(e) = self.store.write(&item.path, &content) {
            warn!(item_id = %item.id, path = %item.path, error = %e, "Write failed");
            let err = GenerationError::WriteFailed {
                path: item.path.clone(),
                message: e.to_string(),
            };
            return GenerationOutput::failed(item, err, attempt, started.elapsed());
        }
        GenerationOutput::succeeded(item, content, attempt, started.elapsed())
    }
}

async fn with_timeout<F, E>(call: F, limit: Option<Duration>) -> Result<String, GenerationError>
where
    F: Future<Output = Result<crate::provider::CompletionResponse, E>>,
    E: Into<GenerationError>,
{
    let result = match limit {
        Some(limit) => tokio::time::timeout(limit, call)
            .await
            .map_err(|_| GenerationError::Timeout(limit))?,
        None => call.await,
    };
    result.map(|response| response.content).map_err(Into::into)
}
