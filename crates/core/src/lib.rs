//! Prompt compilation and normalisation core.
//!
//! Turns raw, possibly malformed model output into classified records, a
//! canonical display shape and identity-free final prompts. Everything in
//! this crate is synchronous and free of I/O; the batch generator and the
//! model client live in sibling crates.

pub mod batch;
pub mod classify;
pub mod compiler;
pub mod error;
pub mod extract;
pub mod instructions;
pub mod normalize;
pub mod record;
pub mod schema;
pub mod scrub;
pub mod session;
pub mod types;
