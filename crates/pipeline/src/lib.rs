//! Async batch prompt-set generation.
//!
//! [`BatchGenerator`] drives a [`loraforge_core::batch::BatchJob`] to
//! completion against a [`loraforge_llm::PromptModel`]: waves of bounded
//! concurrency, a per-call timeout, a configurable retry pass over failed
//! slots, and cancellation. Progress is broadcast as [`BatchEvent`]s.

pub mod events;
pub mod generator;

pub use events::BatchEvent;
pub use generator::{BatchGenerator, GeneratorError};
