//! Configuration and policy
//!
//! Request/result types, engine configuration, the namespace allow-list,
//! and startup validation.

pub mod engine;
pub mod namespace;
pub mod types;
pub mod validator;
