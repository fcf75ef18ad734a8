/// Core types shared by the executor, supervisor and boundary layers
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Default wall-clock budget for one execution unit.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// A validated request for one clean-room execution.
///
/// Construction is the validation step: a value of this type always carries
/// non-empty code and a supported language. Fields are private so the request
/// stays immutable once built.
#[derive(Clone, Debug)]
pub struct ExecutionRequest {
    code: String,
    language: String,
    timeout: Duration,
}

impl ExecutionRequest {
    /// Validate raw boundary input into a request.
    ///
    /// Empty code is rejected before the language is looked at, matching the
    /// order in which the boundary reports problems.
    pub fn new(code: impl Into<String>, language: &str, timeout: Duration) -> Result<Self> {
        let code = code.into();
        if code.is_empty() {
            return Err(SnipboxError::Validation("No code provided".to_string()));
        }

        let language = crate::judge::registry::canonical_language(language)?;

        Ok(Self {
            code,
            language: language.to_string(),
            timeout,
        })
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    /// Canonical (lower-case) language identifier.
    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

/// Terminal classification of one execution.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum ExecutionStatus {
    /// Code ran to completion
    #[serde(rename = "OK")]
    Ok,
    /// Code was not well-formed
    #[serde(rename = "CE")]
    CompileError,
    /// Unhandled error while the code was running
    #[serde(rename = "RE")]
    RuntimeError,
    /// Wall-clock budget elapsed before the code finished
    #[serde(rename = "TLE")]
    TimeLimit,
}

impl ExecutionStatus {
    pub fn is_success(self) -> bool {
        self == ExecutionStatus::Ok
    }

    pub fn is_timeout(self) -> bool {
        self == ExecutionStatus::TimeLimit
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionStatus::Ok => write!(f, "OK"),
            ExecutionStatus::CompileError => write!(f, "CE"),
            ExecutionStatus::RuntimeError => write!(f, "RE"),
            ExecutionStatus::TimeLimit => write!(f, "TLE"),
        }
    }
}

/// Kind of user-code fault reported by the executor.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum FaultKind {
    #[serde(rename = "compile")]
    Compile,
    #[serde(rename = "runtime")]
    Runtime,
}

impl From<FaultKind> for ExecutionStatus {
    fn from(kind: FaultKind) -> Self {
        match kind {
            FaultKind::Compile => ExecutionStatus::CompileError,
            FaultKind::Runtime => ExecutionStatus::RuntimeError,
        }
    }
}

/// Output integrity classification
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum OutputIntegrity {
    #[default]
    #[serde(rename = "complete")]
    Complete,
    /// A stream exceeded its byte limit; the excess was drained and dropped
    #[serde(rename = "truncated_by_limit")]
    TruncatedByLimit,
    /// A collector did not reach end-of-stream within the collection window
    #[serde(rename = "collection_timeout")]
    CollectionTimeout,
    #[serde(rename = "read_error")]
    ReadError,
}

impl OutputIntegrity {
    /// Combine the integrity of two streams, keeping the most severe state.
    pub fn worst(self, other: OutputIntegrity) -> OutputIntegrity {
        fn rank(integrity: OutputIntegrity) -> u8 {
            match integrity {
                OutputIntegrity::Complete => 0,
                OutputIntegrity::TruncatedByLimit => 1,
                OutputIntegrity::CollectionTimeout => 2,
                OutputIntegrity::ReadError => 3,
            }
        }
        if rank(other) > rank(self) {
            other
        } else {
            self
        }
    }
}

impl std::fmt::Display for OutputIntegrity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputIntegrity::Complete => write!(f, "complete"),
            OutputIntegrity::TruncatedByLimit => write!(f, "truncated_by_limit"),
            OutputIntegrity::CollectionTimeout => write!(f, "collection_timeout"),
            OutputIntegrity::ReadError => write!(f, "read_error"),
        }
    }
}

/// Final result of one execution.
///
/// `success` and `timed_out` are derived from `status`, so exactly one of
/// success, timeout or failure holds.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Identifier of the execution unit (correlates with audit events)
    pub run_id: String,
    /// Terminal classification
    pub status: ExecutionStatus,
    /// Captured standard output
    pub stdout: String,
    /// Captured standard error or fault trace; never an empty string
    pub error: Option<String>,
    pub success: bool,
    pub timed_out: bool,
    /// Exit code of the interpreter process (if it exited normally)
    pub exit_code: Option<i32>,
    /// Signal that terminated the interpreter (if any)
    pub signal: Option<i32>,
    /// Wall clock time from spawn to reap (milliseconds)
    pub wall_time_ms: u64,
    pub output_integrity: OutputIntegrity,
}

/// Errors that stop a request from producing an [`ExecutionResult`].
///
/// User-code faults are never represented here; they are results.
#[derive(Error, Debug)]
pub enum SnipboxError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Request rejected before any execution unit was created
    #[error("{0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Process error: {0}")]
    Process(String),

    #[error("Output capture error: {0}")]
    Capture(String),

    #[error("Execution capacity exhausted ({limit} units in flight)")]
    Busy { limit: usize },

    #[error("Execution cancelled before completion")]
    Cancelled,

    #[error("Invalid lifecycle transition: {from} -> {to}")]
    Lifecycle { from: String, to: String },
}

impl SnipboxError {
    /// Errors caused by the caller's input.
    pub fn is_client_error(&self) -> bool {
        matches!(self, SnipboxError::Validation(_))
    }

    /// Errors the caller may retry later.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, SnipboxError::Busy { .. } | SnipboxError::Cancelled)
    }
}

impl From<nix::errno::Errno> for SnipboxError {
    fn from(err: nix::errno::Errno) -> Self {
        SnipboxError::Process(err.to_string())
    }
}

/// Result type alias for snipbox operations
pub type Result<T> = std::result::Result<T, SnipboxError>;
