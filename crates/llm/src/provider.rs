//! The model trait the batch generator depends on.

use async_trait::async_trait;

use crate::error::ModelError;

/// One chunk request: generate `count` prompt records following
/// `instructions`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkRequest {
    /// Sequence number of the chunk within its job, for logging.
    pub chunk: usize,
    pub count: usize,
    pub instructions: String,
}

/// A text model that turns chunk instructions into raw output text.
///
/// Implementations return the model's text untouched; extraction and
/// validation happen in the caller.
#[async_trait]
pub trait PromptModel: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    async fn generate(&self, request: &ChunkRequest) -> Result<String, ModelError>;
}
