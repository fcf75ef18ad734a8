//! Utilities
//!
//! Cross-cutting helpers for environment hygiene and output collection.

pub mod env_hygiene;
pub mod output;
