use crate::config::namespace::NamespacePolicy;
use crate::config::types::{FaultKind, Result};
use std::path::Path;

/// Language adapter contract: how to launch an interpreter for one snippet
/// and how to read its exit status back.
pub trait LanguageAdapter: Send + Sync {
    /// Canonical lower-case identifier accepted at the boundary.
    fn language(&self) -> &'static str;

    /// Human-readable name used in messages.
    fn display_name(&self) -> &'static str;

    /// Full argv for one execution unit. The snippet itself is fed on stdin.
    fn run_command(&self, interpreter: &Path, namespace: &NamespacePolicy) -> Result<Vec<String>>;

    /// argv that prints the interpreter version (dependency checks).
    fn version_command(&self, interpreter: &Path) -> Vec<String>;

    /// Map the interpreter's termination to a fault, or `None` on completion.
    fn classify_exit(&self, exit_code: Option<i32>, signal: Option<i32>) -> Option<FaultKind>;
}
