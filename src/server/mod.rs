//! HTTP server
//!
//! `POST /execute`, `GET /health`, `GET /` and `GET /metrics` over warp.

pub mod http;
pub mod types;

pub use http::{routes, serve, ServerState};
