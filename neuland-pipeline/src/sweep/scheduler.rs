// Sweep Scheduler
// Dispatches one task per tuple onto a bounded pool of isolated workers

use crate::isolation::CancelToken;
use crate::stages::{FailureReason, Stage, StageResult, StageRunner, StageStatus};
use crate::sweep::events::{EventSender, ProgressSender, SweepEvent};
use crate::sweep::report::SweepReport;
use crate::sweep::tuple::ParameterTuple;

use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Configuration for sweep scheduling
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Maximum number of engine processes alive at once
    pub workers: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
        }
    }
}

/// Available hardware parallelism, at least one
pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Sweep scheduler
///
/// Bookkeeping (enumerate, preflight, dispatch, collect) happens on the
/// calling task; the engines run in separate processes, at most `workers`
/// at a time. A failed task never stops the others.
pub struct SweepScheduler {
    runner: Arc<StageRunner>,
    config: SchedulerConfig,
    event_tx: Option<ProgressSender>,
    cancel: CancelToken,
}

impl SweepScheduler {
    pub fn new(runner: StageRunner) -> Self {
        Self {
            runner: Arc::new(runner),
            config: SchedulerConfig::default(),
            event_tx: None,
            cancel: CancelToken::new(),
        }
    }

    /// Set scheduler configuration
    pub fn with_config(mut self, config: SchedulerConfig) -> Self {
        self.config = SchedulerConfig {
            workers: config.workers.max(1),
        };
        self
    }

    /// Set progress event sender
    pub fn with_progress(mut self, tx: ProgressSender) -> Self {
        self.event_tx = Some(tx);
        self
    }

    /// Share a cancellation token, e.g. one triggered on Ctrl-C
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    pub fn runner(&self) -> &StageRunner {
        &self.runner
    }

    /// Run `stage` for every tuple; results come back in submission order
    pub async fn run(&self, stage: Stage, tuples: Vec<ParameterTuple>) -> SweepReport {
        let start = Instant::now();
        let total = tuples.len();

        tracing::info!(%stage, total, workers = self.config.workers, "sweep started");
        self.event_tx
            .send_event(SweepEvent::SweepStarted { stage, total });

        let semaphore = Arc::new(Semaphore::new(self.config.workers));
        let mut slots: Vec<Option<StageResult>> = vec![None; total];
        let mut tasks = JoinSet::new();

        for (index, tuple) in tuples.iter().enumerate() {
            if self.cancel.is_cancelled() {
                slots[index] = Some(StageResult::without_run(
                    stage,
                    tuple.clone(),
                    StageStatus::Failed(FailureReason::Cancelled),
                ));
                continue;
            }

            // Skips resolve here, without a worker slot or a process
            if let Some(result) = self.runner.preflight(stage, tuple) {
                self.event_tx.send_event(SweepEvent::TaskSkipped {
                    index,
                    result: result.clone(),
                });
                slots[index] = Some(result);
                continue;
            }

            self.event_tx
                .send_event(SweepEvent::task_queued(stage, index, tuple));

            let runner = self.runner.clone();
            let semaphore = semaphore.clone();
            let cancel = self.cancel.clone();
            let event_tx = self.event_tx.clone();
            let tuple = tuple.clone();

            tasks.spawn(async move {
                let permit = tokio::select! {
                    permit = semaphore.acquire_owned() => permit.ok(),
                    _ = cancel.cancelled() => None,
                };
                let Some(_permit) = permit else {
                    let result = StageResult::without_run(
                        stage,
                        tuple,
                        StageStatus::Failed(FailureReason::Cancelled),
                    );
                    return (index, result);
                };

                event_tx.send_event(SweepEvent::task_started(stage, index, &tuple));
                let result = runner.execute(stage, &tuple, &cancel).await;
                (index, result)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, result)) => {
                    self.event_tx.send_event(SweepEvent::TaskFinished {
                        index,
                        result: result.clone(),
                    });
                    slots[index] = Some(result);
                }
                Err(e) => {
                    tracing::error!(%stage, "worker task aborted: {}", e);
                }
            }
        }

        // Slots left empty belong to worker tasks that panicked
        let results: Vec<StageResult> = slots
            .into_iter()
            .zip(tuples)
            .map(|(slot, tuple)| {
                slot.unwrap_or_else(|| {
                    StageResult::without_run(
                        stage,
                        tuple,
                        StageStatus::Failed(FailureReason::Io {
                            message: "worker task aborted".to_string(),
                        }),
                    )
                })
            })
            .collect();

        let report = SweepReport::new(stage, results, start.elapsed());
        tracing::info!(
            %stage,
            completed = report.summary.completed,
            skipped = report.summary.skipped_existing + report.summary.skipped_missing_input,
            failed = report.summary.failed,
            "sweep finished"
        );
        self.event_tx.send_event(SweepEvent::SweepCompleted {
            summary: report.summary.clone(),
        });

        report
    }

    /// Run several stages one after another over the same tuples
    ///
    /// Each stage is a full sweep; a later stage sees the artifacts the
    /// earlier ones produced. Stages are run in pipeline order.
    pub async fn run_pipeline(&self, stages: &[Stage], tuples: &[ParameterTuple]) -> SweepReport {
        let mut ordered = stages.to_vec();
        ordered.sort();
        ordered.dedup();

        let mut report = SweepReport::default();
        for stage in ordered {
            if self.cancel.is_cancelled() {
                tracing::warn!(%stage, "sweep cancelled, not starting stage");
                break;
            }
            report.extend(self.run(stage, tuples.to_vec()).await);
        }
        report
    }
}
