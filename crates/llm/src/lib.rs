//! External text-model seam for batch prompt generation.
//!
//! Provides the [`PromptModel`] trait the batch generator calls, an explicit
//! [`ApiCredential`] passed to whichever client issues requests, and a
//! REST client for Gemini-style `generateContent` endpoints.

pub mod credential;
pub mod error;
pub mod gemini;
pub mod provider;

pub use credential::ApiCredential;
pub use error::ModelError;
pub use gemini::GeminiClient;
pub use provider::{ChunkRequest, PromptModel};
