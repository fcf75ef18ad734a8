/// Audit event logging for snipbox
///
/// Every execution emits structured events correlated by `run_id`:
/// start, limit violations, signal escalation, cancellation and final status.
/// Events always go to the `log` facade under the `snipbox::audit` target;
/// when an audit file is configured they are also appended to it as JSON lines.
use crate::config::types::{ExecutionResult, OutputIntegrity, Result, SnipboxError};
use crate::core::types::KillReport;
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};
use std::time::{Duration, SystemTime};

pub const AUDIT_TARGET: &str = "snipbox::audit";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum AuditSeverity {
    Critical,
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum AuditEventType {
    // Lifecycle
    ExecutionStart,
    ExecutionEnd,
    ExecutionCancelled,

    // Rejections before any unit exists
    ValidationRejected,
    AdmissionRejected,

    // Limits
    WallTimeLimitViolation,
    OutputLimitViolation,

    // Termination
    SignalEscalation,
    ForcedKill,

    InfrastructureFailure,
}

impl AuditEventType {
    pub fn default_severity(&self) -> AuditSeverity {
        match self {
            AuditEventType::ExecutionStart => AuditSeverity::Low,
            AuditEventType::ExecutionEnd => AuditSeverity::Low,
            AuditEventType::ExecutionCancelled => AuditSeverity::Medium,

            AuditEventType::ValidationRejected => AuditSeverity::Low,
            AuditEventType::AdmissionRejected => AuditSeverity::Medium,

            AuditEventType::WallTimeLimitViolation => AuditSeverity::High,
            AuditEventType::OutputLimitViolation => AuditSeverity::Medium,

            AuditEventType::SignalEscalation => AuditSeverity::Medium,
            AuditEventType::ForcedKill => AuditSeverity::High,

            AuditEventType::InfrastructureFailure => AuditSeverity::Critical,
        }
    }
}

/// Correlation identifiers for one execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrelationIds {
    /// Identifier of the execution unit; also reported in the result
    pub run_id: String,
}

impl CorrelationIds {
    pub fn for_run(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
        }
    }
}


#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub event_type: AuditEventType,
    pub severity: AuditSeverity,
    pub timestamp: SystemTime,
    pub details: String,
    pub correlation: Option<CorrelationIds>,
    pub language: Option<String>,
    /// Terminal status code (`OK`, `CE`, `RE`, `TLE`) for end events
    pub status: Option<String>,
    pub wall_time_ms: Option<u64>,
}

impl AuditEvent {
    pub fn new(event_type: AuditEventType, details: String) -> Self {
        Self {
            event_type,
            severity: event_type.default_severity(),
            timestamp: SystemTime::now(),
            details,
            correlation: None,
            language: None,
            status: None,
            wall_time_ms: None,
        }
    }

    pub fn with_correlation(mut self, correlation: CorrelationIds) -> Self {
        self.correlation = Some(correlation);
        self
    }

    pub fn with_language(mut self, language: &str) -> Self {
        self.language = Some(language.to_string());
        self
    }

    pub fn with_status(mut self, status: String) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_wall_time_ms(mut self, wall_time_ms: u64) -> Self {
        self.wall_time_ms = Some(wall_time_ms);
        self
    }

    /// JSON line written to the audit file.
    pub fn to_json(&self) -> serde_json::Value {
        let mut entry = serde_json::json!({
            "timestamp": self.timestamp
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_millis() as u64,
            "event_type": self.event_type,
            "severity": self.severity,
            "details": self.details,
            "process_id": std::process::id(),
        });

        if let Some(correlation) = &self.correlation {
            entry["correlation"] = serde_json::json!({
                "run_id": correlation.run_id,
            });
        }
        if let Some(language) = &self.language {
            entry["language"] = serde_json::json!(language);
        }
        if let Some(status) = &self.status {
            entry["status"] = serde_json::json!(status);
        }
        if let Some(wall_time_ms) = self.wall_time_ms {
            entry["wall_time_ms"] = serde_json::json!(wall_time_ms);
        }
        entry
    }
}

/// Append-only JSON-lines audit trail.
pub struct AuditLogger {
    audit_file: Mutex<File>,
    audit_path: PathBuf,
}

impl AuditLogger {
    pub fn new(audit_path: &Path) -> Result<Self> {
        if let Some(parent) = audit_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                SnipboxError::Config(format!("Failed to create audit log directory: {}", e))
            })?;
        }

        let audit_file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(audit_path)
            .map_err(|e| SnipboxError::Config(format!("Failed to open audit log: {}", e)))?;

        Ok(Self {
            audit_file: Mutex::new(audit_file),
            audit_path: audit_path.to_path_buf(),
        })
    }

    pub fn write_event(&self, event: &AuditEvent) {
        let line = event.to_json();
        match self.audit_file.lock() {
            Ok(mut file) => {
                if let Err(e) = writeln!(file, "{}", line) {
                    error!("Failed to write to audit log: {}", e);
                }
                if let Err(e) = file.flush() {
                    error!("Failed to flush audit log: {}", e);
                }
            }
            Err(_) => error!("Failed to acquire lock on audit file"),
        }
    }

    pub fn audit_path(&self) -> &Path {
        &self.audit_path
    }
}

static AUDIT_LOGGER: OnceLock<AuditLogger> = OnceLock::new();

/// Install the process-wide audit file. Without it events only reach `log`.
pub fn init_audit_logger(audit_path: &Path) -> Result<()> {
    let logger = AuditLogger::new(audit_path)?;
    if AUDIT_LOGGER.set(logger).is_err() {
        warn!("Audit logger already initialized");
    } else {
        info!("Audit log: {}", audit_path.display());
    }
    Ok(())
}

pub fn log_audit_event(event: AuditEvent) {
    let run_id = event
        .correlation
        .as_ref()
        .map(|c| c.run_id.as_str())
        .unwrap_or("-");
    match event.severity {
        AuditSeverity::Critical | AuditSeverity::High => {
            warn!(target: AUDIT_TARGET, "[{}] {:?}: {}", run_id, event.event_type, event.details)
        }
        AuditSeverity::Medium | AuditSeverity::Low => {
            info!(target: AUDIT_TARGET, "[{}] {:?}: {}", run_id, event.event_type, event.details)
        }
    }

    if let Some(logger) = AUDIT_LOGGER.get() {
        logger.write_event(&event);
    }
}

/// Convenience functions for common audit events
pub mod events {
    use super::*;

    pub fn execution_start(run_id: &str, language: &str, code_bytes: usize, budget: Duration) {
        log_audit_event(
            AuditEvent::new(
                AuditEventType::ExecutionStart,
                format!("{} bytes of code, budget {:?}", code_bytes, budget),
            )
            .with_correlation(CorrelationIds::for_run(run_id))
            .with_language(language),
        );
    }

    pub fn execution_end(result: &ExecutionResult) {
        log_audit_event(
            AuditEvent::new(
                AuditEventType::ExecutionEnd,
                format!(
                    "status={} exit_code={:?} signal={:?}",
                    result.status, result.exit_code, result.signal
                ),
            )
            .with_correlation(CorrelationIds::for_run(result.run_id.clone()))
            .with_status(result.status.to_string())
            .with_wall_time_ms(result.wall_time_ms),
        );

        if result.output_integrity == OutputIntegrity::TruncatedByLimit {
            log_audit_event(
                AuditEvent::new(
                    AuditEventType::OutputLimitViolation,
                    "output exceeded capture limit; excess dropped".to_string(),
                )
                .with_correlation(CorrelationIds::for_run(result.run_id.clone())),
            );
        }
    }

    pub fn wall_time_exceeded(run_id: &str, budget: Duration, kill_report: Option<&KillReport>) {
        log_audit_event(
            AuditEvent::new(
                AuditEventType::WallTimeLimitViolation,
                format!("wall-clock budget {:?} elapsed", budget),
            )
            .with_correlation(CorrelationIds::for_run(run_id)),
        );

        if let Some(report) = kill_report {
            let event_type = if report.kill_sent && !report.exited_during_grace {
                AuditEventType::ForcedKill
            } else {
                AuditEventType::SignalEscalation
            };
            let mut details = format!(
                "term_sent={} kill_sent={} waited_ms={}",
                report.term_sent, report.kill_sent, report.waited_ms
            );
            if !report.notes.is_empty() {
                details.push_str(&format!(" notes={}", report.notes.join("; ")));
            }
            log_audit_event(
                AuditEvent::new(event_type, details)
                    .with_correlation(CorrelationIds::for_run(run_id)),
            );
        }
    }

    pub fn execution_cancelled(run_id: &str) {
        log_audit_event(
            AuditEvent::new(
                AuditEventType::ExecutionCancelled,
                "unit cancelled before completion".to_string(),
            )
            .with_correlation(CorrelationIds::for_run(run_id)),
        );
    }

    pub fn validation_rejected(reason: &str) {
        log_audit_event(AuditEvent::new(
            AuditEventType::ValidationRejected,
            reason.to_string(),
        ));
    }

    pub fn admission_rejected(limit: usize) {
        log_audit_event(AuditEvent::new(
            AuditEventType::AdmissionRejected,
            format!("{} units already in flight", limit),
        ));
    }

    pub fn infrastructure_failure(run_id: &str, error: &SnipboxError) {
        log_audit_event(
            AuditEvent::new(AuditEventType::InfrastructureFailure, error.to_string())
                .with_correlation(CorrelationIds::for_run(run_id)),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_default_severities() {
        assert_eq!(
            AuditEventType::InfrastructureFailure.default_severity(),
            AuditSeverity::Critical
        );
        assert_eq!(
            AuditEventType::ExecutionStart.default_severity(),
            AuditSeverity::Low
        );
        assert_eq!(
            AuditEventType::WallTimeLimitViolation.default_severity(),
            AuditSeverity::High
        );
    }

    #[test]
    fn test_event_json_carries_correlation() {
        let event = AuditEvent::new(AuditEventType::ExecutionEnd, "done".to_string())
            .with_correlation(CorrelationIds::for_run("run-7"))
            .with_status("OK".to_string())
            .with_wall_time_ms(12);
        let json = event.to_json();
        assert_eq!(json["event_type"], "ExecutionEnd");
        assert_eq!(json["correlation"]["run_id"], "run-7");
        assert_eq!(json["status"], "OK");
        assert_eq!(json["wall_time_ms"], 12);
        assert!(json.get("language").is_none());
    }

    #[test]
    fn test_audit_file_receives_json_lines() {
        let path = std::env::temp_dir().join(format!("snipbox-audit-{}.log", Uuid::new_v4()));
        let logger = AuditLogger::new(&path).unwrap();
        logger.write_event(&AuditEvent::new(
            AuditEventType::ValidationRejected,
            "No code provided".to_string(),
        ));
        logger.write_event(&AuditEvent::new(
            AuditEventType::AdmissionRejected,
            "16 units already in flight".to_string(),
        ));

        let contents = std::fs::read_to_string(logger.audit_path()).unwrap();
        let lines: Vec<_> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["details"], "No code provided");
        std::fs::remove_file(path).unwrap();
    }
}
