//! Progress events emitted by the batch generator.

use loraforge_core::compiler::QualityWarning;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum BatchEvent {
    /// A wave of concurrent chunk calls was issued.
    WaveStarted {
        wave: usize,
        chunks: usize,
        requested: usize,
    },

    /// One chunk's items were validated and applied.
    ChunkProcessed {
        chunk: usize,
        accepted: usize,
        failed: usize,
    },

    /// Failed slots are being re-requested.
    RetryPass { pass: u32, pending: usize },

    /// An accepted prompt is usable but degraded.
    QualityWarning {
        /// 1-based index of the accepted record.
        index: usize,
        warning: QualityWarning,
    },

    /// Every slot is filled or given up on.
    Completed { accepted: usize, gaps: usize },

    /// A model call failed; the job stopped with `accepted` records kept.
    Failed { message: String, accepted: usize },

    /// The caller abandoned the job; in-flight results were discarded.
    Abandoned { accepted: usize },
}
