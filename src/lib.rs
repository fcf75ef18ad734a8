//! snipbox: bounded, isolated execution of untrusted Python snippets
//!
//! Accepts a snippet over a request/response boundary, runs it in a fresh
//! interpreter process under a wall-clock deadline, captures its output and
//! reports whether it completed, faulted or ran out of time.
//!
//! # Architecture
//!
//! ## Configuration ([`config`])
//! - [`config::types`]: Requests, results, statuses and the crate error type
//! - [`config::engine`]: Engine configuration (JSON file, defaults)
//! - [`config::namespace`]: Builtins allow-list exposed to executed code
//! - [`config::validator`]: Config validation with errors and warnings
//!
//! ## Judge Adapters ([`judge`])
//! - [`judge::adapter`]: Language adapter contract
//! - [`judge::registry`]: Supported language lookup
//! - [`judge::languages::python`]: Python bootstrap and exit classification
//!
//! ## Execution ([`exec`])
//! - [`exec::executor`]: One interpreter process per execution, fed on stdin
//!
//! ## Lifecycle Core ([`core`])
//! - [`core::supervisor`]: Deadline race, cancellation and reaping
//! - [`core::admission`]: Non-blocking cap on concurrent units
//! - [`core::cancel`]: Per-request cancellation token
//! - [`core::types`]: Deadline, unit state machine and outcomes
//!
//! ## Kernel Primitives ([`kernel`])
//! - [`kernel::signal`]: Process-group SIGTERM/SIGKILL escalation
//!
//! ## Verdict ([`verdict`])
//! - [`verdict::assembler`]: Outcome to success/timeout/failure mapping
//!
//! ## Runtime ([`runtime`])
//! - [`runtime::engine`]: Validate, admit, supervise, assemble, record
//!
//! ## Server ([`server`])
//! - [`server::http`]: warp routes, error mapping, graceful shutdown
//! - [`server::types`]: Wire types
//!
//! ## Observability ([`observability`])
//! - [`observability::audit`]: Structured audit events keyed by run id
//! - [`observability::metrics`]: Prometheus metrics export
//!
//! ## Utilities ([`utils`])
//! - [`utils::output`]: Bounded per-unit output collection
//! - [`utils::env_hygiene`]: Deterministic interpreter environment
//!
//! # Design Principles
//!
//! 1. **Kill, don't abandon** - a timed-out unit's whole process group is
//!    killed and reaped before the request completes
//! 2. **Nothing shared** - every execution gets its own process, pipes and
//!    namespace; the server's own streams are never redirected
//! 3. **Faults are results** - user-code errors never surface as `Err`
//! 4. **Bounded everything** - deadlines, output sizes, collector waits and
//!    concurrency all have limits

// Configuration & Policy
pub mod config;

// Judge adapters (language-specific launch and exit classification)
pub mod judge;

// Execution units
pub mod exec;

// Lifecycle core
pub mod core;

// Kernel Primitives
pub mod kernel;

// Result classification
pub mod verdict;

// Engine
pub mod runtime;

// HTTP boundary
pub mod server;

// Observability
pub mod observability;

// Utilities
pub mod utils;

// CLI entrypoint wiring for the snipbox binary.
pub mod cli;

// Re-export commonly used types for convenience
pub use crate::config::engine::{EngineConfig, TimeoutOutputPolicy};
pub use crate::config::types::*;
pub use crate::core::cancel::CancellationToken;
pub use crate::runtime::engine::ExecutionEngine;
