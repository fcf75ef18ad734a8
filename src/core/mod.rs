//! Language-agnostic execution core.
//!
//! Core owns the unit lifecycle: admission, deadlines, cancellation and
//! supervision. Language-specific launch and exit classification live in
//! judge adapters.

pub mod admission;
pub mod cancel;
pub mod supervisor;
pub mod types;
