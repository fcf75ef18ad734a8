/// Result assembly
///
/// Maps a supervisor outcome onto exactly one of success, timeout or failure.
/// Pure over the outcome, so the same outcome always yields the same result.
use crate::config::engine::TimeoutOutputPolicy;
use crate::config::types::{ExecutionResult, ExecutionStatus, FaultKind};
use crate::core::types::{SupervisorOutcome, SupervisorVerdict};
use crate::kernel::signal::signal_name;
use std::time::Duration;

pub struct ResultAssembler {
    timeout_output: TimeoutOutputPolicy,
}

impl ResultAssembler {
    pub fn new(timeout_output: TimeoutOutputPolicy) -> Self {
        Self { timeout_output }
    }

    pub fn assemble(&self, outcome: SupervisorOutcome) -> ExecutionResult {
        match outcome.verdict {
            SupervisorVerdict::TimedOut => self.assemble_timeout(outcome),
            SupervisorVerdict::Completed => match outcome.report.fault {
                None => Self::assemble_ok(outcome),
                Some(kind) => Self::assemble_fault(outcome, kind),
            },
        }
    }

    fn assemble_ok(outcome: SupervisorOutcome) -> ExecutionResult {
        Self::build(
            &outcome,
            ExecutionStatus::Ok,
            outcome.report.output.stdout_text(),
            normalize_error(outcome.report.output.stderr_text()),
        )
    }

    fn assemble_fault(outcome: SupervisorOutcome, kind: FaultKind) -> ExecutionResult {
        // A fault always carries a description, even if the interpreter died
        // without writing one.
        let error = normalize_error(outcome.report.output.stderr_text())
            .unwrap_or_else(|| describe_termination(outcome.report.exit_code, outcome.report.signal));
        Self::build(
            &outcome,
            ExecutionStatus::from(kind),
            outcome.report.output.stdout_text(),
            Some(error),
        )
    }

    fn assemble_timeout(&self, outcome: SupervisorOutcome) -> ExecutionResult {
        let stdout = match self.timeout_output {
            TimeoutOutputPolicy::Discard => String::new(),
            TimeoutOutputPolicy::Partial => outcome.report.output.stdout_text(),
        };
        Self::build(
            &outcome,
            ExecutionStatus::TimeLimit,
            stdout,
            Some(timeout_message(outcome.budget)),
        )
    }

    fn build(
        outcome: &SupervisorOutcome,
        status: ExecutionStatus,
        stdout: String,
        error: Option<String>,
    ) -> ExecutionResult {
        ExecutionResult {
            run_id: outcome.report.run_id.clone(),
            status,
            stdout,
            error,
            success: status.is_success(),
            timed_out: status.is_timeout(),
            exit_code: outcome.report.exit_code,
            signal: outcome.report.signal,
            wall_time_ms: outcome.wall_time.as_millis() as u64,
            output_integrity: outcome.report.output.integrity(),
        }
    }
}

/// Fixed timeout message naming the configured budget in seconds.
pub fn timeout_message(budget: Duration) -> String {
    format!(
        "Code execution timed out (max {} seconds)",
        format_seconds(budget)
    )
}

fn format_seconds(budget: Duration) -> String {
    if budget.subsec_millis() == 0 {
        return budget.as_secs().to_string();
    }
    let text = format!("{:.3}", budget.as_secs_f64());
    text.trim_end_matches('0').to_string()
}

/// Empty error text means "no error".
pub fn normalize_error(text: String) -> Option<String> {
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

fn describe_termination(exit_code: Option<i32>, signal: Option<i32>) -> String {
    match (signal, exit_code) {
        (Some(sig), _) => format!("Interpreter terminated by signal {}", signal_name(sig)),
        (None, Some(code)) => format!("Interpreter exited with status {}", code),
        (None, None) => "Interpreter terminated abnormally".to_string(),
    }
}
