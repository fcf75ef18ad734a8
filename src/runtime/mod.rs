//! Execution runtime
//!
//! Ties validation, admission, supervision, result assembly and
//! observability together behind [`engine::ExecutionEngine`].

pub mod engine;
