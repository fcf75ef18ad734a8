//! Kernel primitives
//!
//! Thin wrappers over process-group signalling used to forcibly end units.

pub mod signal;
