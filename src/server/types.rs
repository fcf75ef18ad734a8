use crate::config::types::ExecutionResult;
use crate::judge::registry::SUPPORTED_LANGUAGE;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Body of `POST /execute`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteBody {
    /// Absent and `null` are treated like an empty snippet
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default = "default_language")]
    pub language: String,
}

fn default_language() -> String {
    SUPPORTED_LANGUAGE.to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteResponse {
    pub output: String,
    pub error: Option<String>,
    pub success: bool,
}

impl From<&ExecutionResult> for ExecuteResponse {
    fn from(result: &ExecutionResult) -> Self {
        Self {
            output: result.stdout.clone(),
            error: result.error.clone(),
            success: result.success,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub success: bool,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            success: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub message: String,
}

impl HealthResponse {
    pub fn healthy() -> Self {
        Self {
            status: "healthy".to_string(),
            message: "Code execution server is running".to_string(),
        }
    }
}

/// Body of `GET /`: endpoint ("METHOD /path") to description.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceIndex {
    pub message: String,
    pub endpoints: BTreeMap<String, String>,
}

impl ServiceIndex {
    pub fn new() -> Self {
        let endpoints = [
            (
                "POST /execute",
                "Run a Python snippet: {\"code\": str, \"language\": \"python\"}",
            ),
            ("GET /health", "Liveness check"),
            ("GET /metrics", "Prometheus metrics"),
        ]
        .into_iter()
        .map(|(endpoint, description)| (endpoint.to_string(), description.to_string()))
        .collect();

        Self {
            message: "Snipbox code execution server".to_string(),
            endpoints,
        }
    }
}

impl Default for ServiceIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::{ExecutionStatus, OutputIntegrity};

    #[test]
    fn test_body_defaults() {
        let body: ExecuteBody = serde_json::from_str(r#"{"code": "print(1)"}"#).unwrap();
        assert_eq!(body.language, "python");
        assert_eq!(body.code.as_deref(), Some("print(1)"));

        let body: ExecuteBody = serde_json::from_str(r#"{"code": null}"#).unwrap();
        assert!(body.code.is_none());

        let body: ExecuteBody = serde_json::from_str("{}").unwrap();
        assert!(body.code.is_none());
    }

    #[test]
    fn test_response_wire_shape() {
        let result = ExecutionResult {
            run_id: "r".to_string(),
            status: ExecutionStatus::Ok,
            stdout: "hi\n".to_string(),
            error: None,
            success: true,
            timed_out: false,
            exit_code: Some(0),
            signal: None,
            wall_time_ms: 3,
            output_integrity: OutputIntegrity::Complete,
        };
        let json = serde_json::to_value(ExecuteResponse::from(&result)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"output": "hi\n", "error": null, "success": true})
        );
    }
}
