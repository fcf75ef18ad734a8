//! Result classification
//!
//! Derives the caller-facing result as a pure function over the supervisor
//! outcome.

pub mod assembler;
