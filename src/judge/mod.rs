//! Language adapters.
//!
//! The execution core stays language-agnostic. Adapters define how an
//! interpreter is launched for one snippet and how its exit status maps to
//! a fault classification.

pub mod adapter;
pub mod languages;
pub mod registry;
