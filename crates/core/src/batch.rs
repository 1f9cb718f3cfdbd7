//! Batch job bookkeeping for incremental prompt-set generation.
//!
//! [`BatchJob`] is the synchronous half of the batch generator: it owns the
//! counters, the duplicate-avoidance set, the accepted records and the
//! state machine. The async driver reserves slots, calls the model, and
//! hands raw items back here for validation and acceptance.
//!
//! ```text
//! Idle -> GeneratingBatch -> BatchSucceeded | BatchPartialFailure -> Idle ... -> Complete
//!                         \-> Error (terminal; accepted records are kept)
//! ```
//!
//! Every requested item occupies a numbered slot. A slot whose item fails
//! validation moves to `failed_indices`, is re-requested during a retry
//! pass, and becomes a gap once the retry budget is spent.

use std::collections::{BTreeSet, HashSet};
use std::time::Duration;

use serde::Serialize;

use crate::classify::classify;
use crate::compiler::{self, QualityWarning};
use crate::error::CoreError;
use crate::extract;
use crate::record::{PromptRecord, RecordMeta};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Maximum items requested from the model in one call.
pub const MAX_CHUNK_SIZE: usize = 50;

/// Maximum concurrent model calls per wave.
pub const MAX_CONCURRENCY: usize = 16;

/// Maximum number of prompts a single job may target.
pub const MAX_TARGET_TOTAL: usize = 1_000;

/// Maximum retry passes over failed slots.
pub const MAX_RETRIES: u32 = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchConfig {
    pub target_total: usize,
    pub chunk_size: usize,
    pub max_concurrency: usize,
    pub call_timeout: Duration,
    /// Retry passes over failed slots before they become gaps.
    pub max_retries: u32,
    /// How many recent prompts are sent as duplicate-avoidance hints.
    pub hint_limit: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            target_total: 10,
            chunk_size: 5,
            max_concurrency: 5,
            call_timeout: Duration::from_secs(120),
            max_retries: 1,
            hint_limit: 50,
        }
    }
}

pub fn validate_batch_config(config: &BatchConfig) -> Result<(), CoreError> {
    if config.target_total == 0 || config.target_total > MAX_TARGET_TOTAL {
        return Err(CoreError::Validation(format!(
            "Target total must be between 1 and {MAX_TARGET_TOTAL} (got {})",
            config.target_total
        )));
    }
    if config.chunk_size == 0 || config.chunk_size > MAX_CHUNK_SIZE {
        return Err(CoreError::Validation(format!(
            "Chunk size must be between 1 and {MAX_CHUNK_SIZE} (got {})",
            config.chunk_size
        )));
    }
    if config.max_concurrency == 0 || config.max_concurrency > MAX_CONCURRENCY {
        return Err(CoreError::Validation(format!(
            "Max concurrency must be between 1 and {MAX_CONCURRENCY} (got {})",
            config.max_concurrency
        )));
    }
    if config.call_timeout.is_zero() {
        return Err(CoreError::Validation(
            "Call timeout must be greater than zero".to_string(),
        ));
    }
    if config.max_retries > MAX_RETRIES {
        return Err(CoreError::Validation(format!(
            "Max retries exceeds maximum of {MAX_RETRIES} (got {})",
            config.max_retries
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "message", rename_all = "snake_case")]
pub enum BatchState {
    Idle,
    GeneratingBatch,
    BatchSucceeded,
    BatchPartialFailure,
    Complete,
    Error(String),
}

impl BatchState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Error(_))
    }
}

/// One chunk of slots to request from the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkPlan {
    /// Sequence number of the chunk within the job, 1-based.
    pub chunk: usize,
    pub slots: Vec<usize>,
}

impl ChunkPlan {
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// A raw item that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedItem {
    pub raw_text: String,
    pub prompt: String,
    pub warnings: Vec<QualityWarning>,
}

/// Result of applying one chunk's items to the job.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChunkOutcome {
    pub accepted: usize,
    pub failed: usize,
    /// Quality warnings keyed by the accepted record's 1-based index.
    pub warnings: Vec<(usize, QualityWarning)>,
}

// ---------------------------------------------------------------------------
// Job
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct BatchJob {
    target_total: usize,
    current_count: usize,
    previous_prompt_texts: HashSet<String>,
    prompt_order: Vec<String>,
    failed_indices: Vec<usize>,
    pending: BTreeSet<usize>,
    gaps: usize,
    records: Vec<PromptRecord>,
    state: BatchState,
    label: String,
    slots_issued: usize,
    chunks_issued: usize,
    retry_passes: u32,
}

impl BatchJob {
    pub fn new(target_total: usize, label: impl Into<String>) -> Self {
        Self {
            target_total,
            current_count: 0,
            previous_prompt_texts: HashSet::new(),
            prompt_order: Vec::new(),
            failed_indices: Vec::new(),
            pending: BTreeSet::new(),
            gaps: 0,
            records: Vec::new(),
            state: BatchState::Idle,
            label: label.into(),
            slots_issued: 0,
            chunks_issued: 0,
            retry_passes: 0,
        }
    }

    pub fn target_total(&self) -> usize {
        self.target_total
    }

    pub fn current_count(&self) -> usize {
        self.current_count
    }

    pub fn failed_indices(&self) -> &[usize] {
        &self.failed_indices
    }

    pub fn gaps(&self) -> usize {
        self.gaps
    }

    pub fn records(&self) -> &[PromptRecord] {
        &self.records
    }

    pub fn state(&self) -> &BatchState {
        &self.state
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn retry_passes(&self) -> u32 {
        self.retry_passes
    }

    /// Hand the accepted records to the caller.
    pub fn take_records(&mut self) -> Vec<PromptRecord> {
        std::mem::take(&mut self.records)
    }

    pub fn contains_prompt(&self, prompt: &str) -> bool {
        self.previous_prompt_texts.contains(prompt)
    }

    /// The `limit` most recently accepted prompt texts, oldest first.
    pub fn avoid_hints(&self, limit: usize) -> Vec<String> {
        let start = self.prompt_order.len().saturating_sub(limit);
        self.prompt_order[start..].to_vec()
    }

    /// Slots neither filled, failed, reserved nor given up on.
    pub fn open_slots(&self) -> usize {
        self.target_total
            .saturating_sub(self.current_count)
            .saturating_sub(self.gaps)
            .saturating_sub(self.failed_indices.len())
            .saturating_sub(self.pending.len())
    }

    pub fn is_complete(&self) -> bool {
        self.failed_indices.is_empty()
            && self.pending.is_empty()
            && self.current_count + self.gaps == self.target_total
    }

    // ---- transitions ----

    /// Enter `GeneratingBatch` and reserve up to `max_chunks` chunks of at
    /// most `chunk_size` fresh slots each.
    pub fn plan_wave(
        &mut self,
        chunk_size: usize,
        max_chunks: usize,
    ) -> Result<Vec<ChunkPlan>, CoreError> {
        self.begin()?;
        let mut plans = Vec::new();
        while plans.len() < max_chunks {
            let size = chunk_size.min(self.open_slots());
            if size == 0 {
                break;
            }
            let slots: Vec<usize> = (self.slots_issued + 1..=self.slots_issued + size).collect();
            self.slots_issued += size;
            plans.push(self.reserve(slots));
        }
        Ok(plans)
    }

    /// Enter `GeneratingBatch` for a retry pass over every failed slot.
    pub fn plan_retry(&mut self, chunk_size: usize) -> Result<Vec<ChunkPlan>, CoreError> {
        self.begin()?;
        self.retry_passes += 1;
        let failed = std::mem::take(&mut self.failed_indices);
        let plans = failed
            .chunks(chunk_size.max(1))
            .map(|slots| self.reserve(slots.to_vec()))
            .collect();
        Ok(plans)
    }

    fn begin(&mut self) -> Result<(), CoreError> {
        match &self.state {
            BatchState::Idle | BatchState::BatchSucceeded | BatchState::BatchPartialFailure => {
                self.state = BatchState::GeneratingBatch;
                Ok(())
            }
            other => Err(CoreError::Conflict(format!(
                "Cannot start a wave while the job is {other:?}"
            ))),
        }
    }

    fn reserve(&mut self, slots: Vec<usize>) -> ChunkPlan {
        self.chunks_issued += 1;
        self.pending.extend(slots.iter().copied());
        ChunkPlan {
            chunk: self.chunks_issued,
            slots,
        }
    }

    /// Run one raw item through extract -> classify -> compile and check
    /// it is usable and new.
    pub fn validate_item(&self, raw_text: &str) -> Result<ValidatedItem, CoreError> {
        let parsed = extract::extract(raw_text);
        let classified = classify(parsed.as_ref());
        if !classified.mode().is_structured() {
            return Err(CoreError::Validation(
                "Item is not a recognised structured record".to_string(),
            ));
        }
        let final_prompt = compiler::finalize(&classified).ok_or_else(|| {
            CoreError::Validation("Item produced no prompt components".to_string())
        })?;
        compiler::validate_prompt(&final_prompt.text)?;
        compiler::validate_negative_prompt(&final_prompt.negative_prompt)?;
        if self.contains_prompt(&final_prompt.text) {
            return Err(CoreError::Validation(
                "Item duplicates an existing prompt".to_string(),
            ));
        }
        Ok(ValidatedItem {
            raw_text: raw_text.to_string(),
            prompt: final_prompt.text,
            warnings: final_prompt.warnings,
        })
    }

    /// Apply the items returned for `plan`.
    ///
    /// Items are matched to slots in order; extra items are ignored and
    /// missing or invalid ones leave their slot in `failed_indices`.
    pub fn apply_chunk(&mut self, plan: &ChunkPlan, items: Vec<String>) -> ChunkOutcome {
        let mut outcome = ChunkOutcome::default();
        let mut items = items.into_iter();

        for &slot in &plan.slots {
            if !self.pending.remove(&slot) {
                continue;
            }
            let validated = items
                .next()
                .ok_or_else(|| CoreError::Validation("Model returned too few items".to_string()))
                .and_then(|raw| self.validate_item(&raw));

            match validated {
                Ok(item) if self.current_count < self.target_total => {
                    let index = self.accept(item.raw_text, item.prompt);
                    outcome.accepted += 1;
                    outcome
                        .warnings
                        .extend(item.warnings.into_iter().map(|w| (index, w)));
                }
                _ => {
                    self.failed_indices.push(slot);
                    outcome.failed += 1;
                }
            }
        }
        outcome
    }

    fn accept(&mut self, raw_text: String, prompt: String) -> usize {
        self.current_count += 1;
        let index = self.current_count;
        self.previous_prompt_texts.insert(prompt.clone());
        self.prompt_order.push(prompt);
        self.records.push(PromptRecord::new(
            raw_text,
            RecordMeta::batch(index, self.target_total, self.label.clone()),
        ));
        index
    }

    /// Close the current wave and return to `Idle`, or to `Complete` once
    /// every slot is accounted for.
    pub fn finish_wave(&mut self) -> &BatchState {
        self.pending.clear();
        self.state = if self.failed_indices.is_empty() {
            BatchState::BatchSucceeded
        } else {
            BatchState::BatchPartialFailure
        };
        self.settle()
    }

    fn settle(&mut self) -> &BatchState {
        self.state = if self.is_complete() {
            BatchState::Complete
        } else {
            BatchState::Idle
        };
        &self.state
    }

    /// Give up on failed slots once the retry budget is spent.
    pub fn surrender_failed(&mut self) -> usize {
        let surrendered = self.failed_indices.len();
        self.gaps += surrendered;
        self.failed_indices.clear();
        if !self.state.is_terminal() && !matches!(self.state, BatchState::GeneratingBatch) {
            self.settle();
        }
        surrendered
    }

    /// Discard the in-flight wave without touching accepted records.
    pub fn cancel_wave(&mut self) {
        let released = std::mem::take(&mut self.pending);
        if self.retry_passes > 0 {
            // Retried slots go back to the failed list.
            self.failed_indices.extend(released);
        }
        if matches!(self.state, BatchState::GeneratingBatch) {
            self.state = BatchState::Idle;
        }
    }

    /// Move to the terminal error state, keeping everything accepted so far.
    pub fn fail(&mut self, message: impl Into<String>) {
        self.pending.clear();
        self.state = BatchState::Error(message.into());
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
