//! Concurrency controller: picks the degree of parallelism and runs items
//! either in plan order or through a bounded worker pool.

use crate::config::RateConfig;
use crate::error::{GenerationError, ProviderError};
use crate::generation::plan::GenerationOutput;
use crate::generation::rate::effective_requests_per_minute;
use crate::generation::worker::{Claim, ItemExecutor, RunState};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Once, OnceLock};
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    #[default]
    Auto,
    Sequential,
    Parallel,
}

impl std::fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ExecutionMode::Auto => "auto",
            ExecutionMode::Sequential => "sequential",
            ExecutionMode::Parallel => "parallel",
        };
        f.write_str(name)
    }
}

/// Number of workers for `pending` items. Never more than `max_concurrency` or `pending`.
pub fn parallelism(mode: ExecutionMode, pending: usize, rate: &RateConfig) -> usize {
    let max = rate.max_concurrency.max(1);
    let degree = match mode {
        ExecutionMode::Sequential => 1,
        ExecutionMode::Parallel => max,
        ExecutionMode::Auto => {
            let tier = match pending {
                0..=3 => 1,
                4..=10 => 3,
                11..=20 => 5,
                _ => max,
            };
            // Keep workers from queuing on the shared budget for long stretches.
            let rate_cap = (effective_requests_per_minute(rate.requests_per_minute) / 10).max(2);
            tier.min(rate_cap as usize)
        }
    };
    degree.min(max).min(pending).max(1)
}

/// Result of a controller pass: per-item outputs plus the failure that stopped the run, if any.
pub struct PoolOutcome {
    pub outputs: Vec<GenerationOutput>,
    pub failure: Option<(usize, GenerationError)>,
}

/// First failure wins; cancellation fires once no matter how many workers fail.
struct AbortSignal {
    first: OnceLock<(usize, GenerationError)>,
    fire: Once,
    token: CancellationToken,
}

impl AbortSignal {
    fn new(token: CancellationToken) -> Self {
        Self {
            first: OnceLock::new(),
            fire: Once::new(),
            token,
        }
    }

    fn trigger(&self, index: usize, error: GenerationError) {
        if self.first.set((index, error)).is_err() {
            debug!(index, "Failure after abort already recorded");
        }
        self.fire.call_once(|| self.token.cancel());
    }

    fn into_failure(self) -> Option<(usize, GenerationError)> {
        self.first.into_inner()
    }
}

fn stops_run(output: &GenerationOutput, continue_on_error: bool) -> bool {
    !continue_on_error && !output.success && !output.is_cancelled()
}

/// Plan order, one item at a time. Stops at cancellation or, without
/// continue-on-error, at the first failure; outputs cover the items visited.
pub async fn run_sequential(
    executor: &ItemExecutor,
    state: &RunState,
    continue_on_error: bool,
) -> PoolOutcome {
    let total = state.item_count();
    let mut outputs = Vec::with_capacity(total);
    let mut failure = None;

    for index in 0..total {
        if state.cancel.is_cancelled() {
            break;
        }
        let item = match state.claim(index) {
            Some(Claim::Ready(item)) => item,
            Some(Claim::Done(output)) => {
                outputs.push(output);
                continue;
            }
            None => break,
        };

        let output = executor.execute(state, index, &item).await;
        state.finish_item(index, &output);
        let cancelled = output.is_cancelled();
        if stops_run(&output, continue_on_error) {
            failure = output.error.clone().map(|err| (index, err));
        }
        outputs.push(output);
        if cancelled || failure.is_some() {
            break;
        }
    }

    PoolOutcome { outputs, failure }
}

/// Bounded pool over the pending items. Outputs are reassembled into plan order;
/// items that never started report `Cancelled`.
pub async fn run_parallel(
    executor: Arc<ItemExecutor>,
    state: Arc<RunState>,
    degree: usize,
    continue_on_error: bool,
) -> PoolOutcome {
    let total = state.item_count();
    let mut slots: Vec<Option<GenerationOutput>> = vec![None; total];
    let mut pending = Vec::new();
    {
        let plan = state.plan.lock();
        for (index, item) in plan.items.iter().enumerate() {
            if item.status.is_done() {
                slots[index] = Some(GenerationOutput::skipped(item));
            } else {
                pending.push(index);
            }
        }
    }

    let semaphore = Arc::new(Semaphore::new(degree.max(1)));
    let abort = Arc::new(AbortSignal::new(state.cancel.clone()));
    let (tx, mut rx) = mpsc::unbounded_channel::<(usize, GenerationOutput)>();
    // Dropping the set aborts every worker, so none outlives an abandoned run.
    let mut workers = JoinSet::new();

    for index in pending {
        let executor = Arc::clone(&executor);
        let state = Arc::clone(&state);
        let semaphore = Arc::clone(&semaphore);
        let abort = Arc::clone(&abort);
        let tx = tx.clone();

        workers.spawn(async move {
            let _permit = tokio::select! {
                _ = state.cancel.cancelled() => return,
                permit = semaphore.acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => return,
                },
            };
            if state.cancel.is_cancelled() {
                return;
            }
            let item = match state.claim(index) {
                Some(Claim::Ready(item)) => item,
                Some(Claim::Done(output)) => {
                    let _ = tx.send((index, output));
                    return;
                }
                None => return,
            };

            let output = executor.execute(&state, index, &item).await;
            state.finish_item(index, &output);
            if stops_run(&output, continue_on_error) {
                if let Some(err) = output.error.clone() {
                    abort.trigger(index, err);
                }
            }
            let _ = tx.send((index, output));
        });
    }
    drop(tx);

    while let Some(result) = workers.join_next().await {
        if let Err(e) = result {
            error!(error = %e, "Generation worker task failed");
        }
    }
    while let Some((index, output)) = rx.recv().await {
        slots[index] = Some(output);
    }

    let outputs = {
        let plan = state.plan.lock();
        slots
            .into_iter()
            .zip(plan.items.iter())
            .map(|(slot, item)| {
                slot.unwrap_or_else(|| {
                    let err = if state.cancel.is_cancelled() {
                        GenerationError::Cancelled
                    } else {
                        ProviderError::Other("worker stopped before reporting".to_string()).into()
                    };
                    GenerationOutput::failed(item, err, 0, Duration::ZERO)
                })
            })
            .collect()
    };

    let failure = match Arc::try_unwrap(abort) {
        Ok(abort) => abort.into_failure(),
        Err(abort) => abort.first.get().cloned(),
    };
    PoolOutcome { outputs, failure }
}
