//! The batch prompt-set generator.
//!
//! A run alternates between planning a wave on the [`BatchJob`], calling
//! the model for every chunk in the wave concurrently, and applying the
//! returned items back to the job. Fresh slots are filled first; once none
//! are open, failed slots get up to `max_retries` retry passes and any
//! still failing become gaps.
//!
//! The job is only ever mutated by the task calling [`BatchGenerator::run`].
//! When the cancellation token fires, in-flight calls are dropped and their
//! results never reach the job.

use std::sync::Arc;

use futures::future::join_all;
use loraforge_core::batch::{validate_batch_config, BatchConfig, BatchJob, ChunkPlan};
use loraforge_core::error::CoreError;
use loraforge_core::extract::split_items;
use loraforge_core::instructions::{build_instructions, GenerationBrief};
use loraforge_llm::{ChunkRequest, ModelError, PromptModel};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::events::BatchEvent;

/// Broadcast channel capacity for progress events.
const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, thiserror::Error)]
pub enum GeneratorError {
    #[error("Batch job rejected: {0}")]
    Config(#[from] CoreError),

    #[error("Model call for chunk {chunk} failed: {source}")]
    Model {
        chunk: usize,
        #[source]
        source: ModelError,
    },

    #[error("Batch job abandoned")]
    Abandoned,
}

/// Generates prompt sets for one brief against one model.
pub struct BatchGenerator {
    model: Arc<dyn PromptModel>,
    config: BatchConfig,
    brief: GenerationBrief,
    event_tx: broadcast::Sender<BatchEvent>,
}

impl BatchGenerator {
    /// Validate the configuration and brief and build a generator.
    pub fn new(
        model: Arc<dyn PromptModel>,
        config: BatchConfig,
        brief: GenerationBrief,
    ) -> Result<Self, GeneratorError> {
        validate_batch_config(&config)?;
        brief.validate()?;
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Ok(Self {
            model,
            config,
            brief,
            event_tx,
        })
    }

    /// Subscribe to progress events.
    pub fn subscribe(&self) -> broadcast::Receiver<BatchEvent> {
        self.event_tx.subscribe()
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    pub fn brief(&self) -> &GenerationBrief {
        &self.brief
    }

    /// A fresh job sized to the configured target.
    pub fn new_job(&self, label: impl Into<String>) -> BatchJob {
        BatchJob::new(self.config.target_total, label)
    }

    /// Drive `job` until it completes, a model call fails, or `cancel` fires.
    ///
    /// On failure the job is left in its error state with every record
    /// accepted so far. On cancellation the job is left idle with the
    /// in-flight wave discarded.
    pub async fn run(
        &self,
        job: &mut BatchJob,
        cancel: &CancellationToken,
    ) -> Result<(), GeneratorError> {
        tracing::info!(
            model = self.model.name(),
            target_total = job.target_total(),
            schema = self.brief.schema.as_str(),
            "Batch job starting",
        );

        let mut wave = 0usize;
        loop {
            if cancel.is_cancelled() {
                return Err(self.abandon(job));
            }

            let plans = if job.open_slots() > 0 {
                wave += 1;
                let plans = job.plan_wave(self.config.chunk_size, self.config.max_concurrency)?;
                self.emit(BatchEvent::WaveStarted {
                    wave,
                    chunks: plans.len(),
                    requested: plans.iter().map(ChunkPlan::len).sum(),
                });
                plans
            } else if !job.failed_indices().is_empty()
                && job.retry_passes() < self.config.max_retries
            {
                let pending = job.failed_indices().len();
                let plans = job.plan_retry(self.config.chunk_size)?;
                tracing::info!(pass = job.retry_passes(), pending, "Retrying failed slots");
                self.emit(BatchEvent::RetryPass {
                    pass: job.retry_passes(),
                    pending,
                });
                plans
            } else {
                break;
            };

            self.run_wave(job, plans, cancel).await?;
        }

        let gaps = job.surrender_failed();
        if gaps > 0 {
            tracing::warn!(gaps, "Slots still failing after retries; reporting as gaps");
        }

        tracing::info!(
            accepted = job.current_count(),
            gaps = job.gaps(),
            state = ?job.state(),
            "Batch job finished",
        );
        self.emit(BatchEvent::Completed {
            accepted: job.current_count(),
            gaps: job.gaps(),
        });
        Ok(())
    }

    /// Call the model for every planned chunk, at most `max_concurrency`
    /// at a time, and apply the results.
    async fn run_wave(
        &self,
        job: &mut BatchJob,
        plans: Vec<ChunkPlan>,
        cancel: &CancellationToken,
    ) -> Result<(), GeneratorError> {
        let hints = job.avoid_hints(self.config.hint_limit);

        for group in plans.chunks(self.config.max_concurrency) {
            let calls = join_all(group.iter().map(|plan| {
                let instructions = build_instructions(&self.brief, plan.len(), &hints);
                self.call_chunk(plan, instructions)
            }));

            let results = tokio::select! {
                _ = cancel.cancelled() => return Err(self.abandon(job)),
                results = calls => results,
            };

            // Apply every successful sibling before reporting a failure.
            let mut fatal = None;
            for (plan, result) in group.iter().zip(results) {
                match result {
                    Ok(text) => self.apply(job, plan, &text),
                    Err(e) => {
                        tracing::error!(chunk = plan.chunk, error = %e, "Model call failed");
                        fatal.get_or_insert((plan.chunk, e));
                    }
                }
            }

            if let Some((chunk, source)) = fatal {
                let message = source.to_string();
                job.fail(message.clone());
                self.emit(BatchEvent::Failed {
                    message,
                    accepted: job.current_count(),
                });
                return Err(GeneratorError::Model { chunk, source });
            }
        }

        let state = job.finish_wave().clone();
        tracing::debug!(
            state = ?state,
            accepted = job.current_count(),
            failed = job.failed_indices().len(),
            "Wave finished",
        );
        Ok(())
    }

    async fn call_chunk(&self, plan: &ChunkPlan, instructions: String) -> Result<String, ModelError> {
        let request = ChunkRequest {
            chunk: plan.chunk,
            count: plan.len(),
            instructions,
        };
        tracing::debug!(chunk = plan.chunk, count = plan.len(), "Requesting chunk");

        match tokio::time::timeout(self.config.call_timeout, self.model.generate(&request)).await {
            Ok(result) => result,
            Err(_) => Err(ModelError::Timeout(self.config.call_timeout)),
        }
    }

    fn apply(&self, job: &mut BatchJob, plan: &ChunkPlan, text: &str) {
        let items = split_items(text);
        let returned = items.len();
        let outcome = job.apply_chunk(plan, items);

        tracing::info!(
            chunk = plan.chunk,
            requested = plan.len(),
            returned,
            accepted = outcome.accepted,
            failed = outcome.failed,
            "Chunk processed",
        );
        self.emit(BatchEvent::ChunkProcessed {
            chunk: plan.chunk,
            accepted: outcome.accepted,
            failed: outcome.failed,
        });

        for (index, warning) in outcome.warnings {
            tracing::warn!(index, warning = %warning, "Prompt quality warning");
            self.emit(BatchEvent::QualityWarning { index, warning });
        }
    }

    fn abandon(&self, job: &mut BatchJob) -> GeneratorError {
        job.cancel_wave();
        tracing::info!(accepted = job.current_count(), "Batch job abandoned");
        self.emit(BatchEvent::Abandoned {
            accepted: job.current_count(),
        });
        GeneratorError::Abandoned
    }

    fn emit(&self, event: BatchEvent) {
        // No subscribers is fine.
        let _ = self.event_tx.send(event);
    }
}
