//! Namespace allow-list for executed code.
//!
//! The names listed here are the only builtins a snippet can see. The list is
//! handed to the interpreter bootstrap as data, never spliced into code.

use crate::config::types::{Result, SnipboxError};
use serde::{Deserialize, Serialize};

/// Builtins exposed by default: a print primitive, plain data types, pure
/// helper functions and the common exception hierarchy.
pub const DEFAULT_BUILTINS: &[&str] = &[
    // output
    "print",
    // constants
    "True",
    "False",
    "None",
    "NotImplemented",
    "Ellipsis",
    // types
    "bool",
    "int",
    "float",
    "complex",
    "str",
    "bytes",
    "list",
    "tuple",
    "dict",
    "set",
    "frozenset",
    "range",
    "slice",
    "object",
    "type",
    "property",
    "staticmethod",
    "classmethod",
    "super",
    "__build_class__",
    // functions
    "abs",
    "all",
    "any",
    "bin",
    "callable",
    "chr",
    "divmod",
    "enumerate",
    "filter",
    "format",
    "getattr",
    "hasattr",
    "hash",
    "hex",
    "id",
    "isinstance",
    "issubclass",
    "iter",
    "len",
    "map",
    "max",
    "min",
    "next",
    "oct",
    "ord",
    "pow",
    "repr",
    "reversed",
    "round",
    "sorted",
    "sum",
    "zip",
    // exceptions
    "BaseException",
    "Exception",
    "ArithmeticError",
    "AssertionError",
    "AttributeError",
    "IndexError",
    "KeyError",
    "LookupError",
    "NameError",
    "NotImplementedError",
    "OverflowError",
    "RecursionError",
    "RuntimeError",
    "StopIteration",
    "TypeError",
    "ValueError",
    "ZeroDivisionError",
];

/// Builtins that reach outside the snippet (files, imports, dynamic code,
/// host introspection). Never part of the default list.
pub const SENSITIVE_BUILTINS: &[&str] = &[
    "open",
    "__import__",
    "eval",
    "exec",
    "compile",
    "input",
    "globals",
    "locals",
    "vars",
    "breakpoint",
    "memoryview",
    "setattr",
    "delattr",
];

/// Explicit allow-list configuration accepted by the executor.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct NamespacePolicy {
    /// Builtin names visible to executed code
    pub builtins: Vec<String>,
    /// Also expose `__import__`, enabling `import` statements
    pub allow_imports: bool,
}

impl Default for NamespacePolicy {
    fn default() -> Self {
        Self {
            builtins: DEFAULT_BUILTINS.iter().map(|s| s.to_string()).collect(),
            allow_imports: false,
        }
    }
}

impl NamespacePolicy {
    /// Smallest useful namespace: only the print primitive.
    pub fn print_only() -> Self {
        Self {
            builtins: vec!["print".to_string()],
            allow_imports: false,
        }
    }

    /// Names handed to the interpreter, deduplicated in first-seen order.
    pub fn resolved_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::with_capacity(self.builtins.len() + 1);
        for name in &self.builtins {
            if !names.contains(name) {
                names.push(name.clone());
            }
        }
        if self.allow_imports && !names.iter().any(|n| n == "__import__") {
            names.push("__import__".to_string());
        }
        names
    }

    /// Sensitive names this policy exposes.
    pub fn sensitive_names(&self) -> Vec<String> {
        self.resolved_names()
            .into_iter()
            .filter(|name| SENSITIVE_BUILTINS.contains(&name.as_str()))
            .collect()
    }

    pub fn validate(&self) -> Result<()> {
        for name in &self.builtins {
            if !is_identifier(name) {
                return Err(SnipboxError::Config(format!(
                    "namespace builtin '{}' is not a valid identifier",
                    name
                )));
            }
        }
        Ok(())
    }

    /// JSON form passed to the interpreter bootstrap.
    pub fn to_json(&self) -> Result<String> {
        self.validate()?;
        serde_json::to_string(&self.resolved_names())
            .map_err(|e| SnipboxError::Config(format!("namespace serialization failed: {}", e)))
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c == '_' || c.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c == '_' || c.is_ascii_alphanumeric())
}
