//! Execution engine: the one entry point the boundary layers call

use crate::config::engine::EngineConfig;
use crate::config::types::{ExecutionRequest, ExecutionResult, Result, SnipboxError};
use crate::config::validator::validate_config;
use crate::core::admission::AdmissionGate;
use crate::core::cancel::CancellationToken;
use crate::core::supervisor::DeadlineSupervisor;
use crate::core::types::{Deadline, SupervisorVerdict};
use crate::exec::executor::Executor;
use crate::judge::registry::{adapter_for, SUPPORTED_LANGUAGE};
use crate::observability::audit::events;
use crate::observability::metrics::EngineMetrics;
use crate::verdict::assembler::ResultAssembler;
use serde::Serialize;
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Interpreter availability as reported by [`ExecutionEngine::check_dependencies`].
#[derive(Debug, Clone, Serialize)]
pub struct DependencyReport {
    pub language: String,
    pub interpreter: String,
    pub available: bool,
    pub version: Option<String>,
}

/// Validates, admits, runs and classifies executions.
///
/// Shareable across threads; each call gets its own unit, deadline and
/// output capture.
pub struct ExecutionEngine {
    config: EngineConfig,
    executor: Executor,
    supervisor: DeadlineSupervisor,
    assembler: ResultAssembler,
    admission: AdmissionGate,
    metrics: Arc<EngineMetrics>,
}

impl ExecutionEngine {
    pub fn new(config: EngineConfig) -> Result<Self> {
        let validation = validate_config(&config)?;
        for warning in validation.warnings {
            log::warn!("Configuration warning: {}", warning);
        }

        let executor = Executor::new(adapter_for(SUPPORTED_LANGUAGE)?, &config)?;

        Ok(Self {
            supervisor: DeadlineSupervisor::from_config(&config),
            assembler: ResultAssembler::new(config.timeout_output),
            admission: AdmissionGate::new(config.max_concurrent_units),
            metrics: Arc::new(EngineMetrics::new()),
            executor,
            config,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn metrics(&self) -> Arc<EngineMetrics> {
        Arc::clone(&self.metrics)
    }

    pub fn in_flight(&self) -> usize {
        self.admission.in_flight()
    }

    /// Validate raw input into a request using the configured budget.
    pub fn request(&self, code: &str, language: &str) -> Result<ExecutionRequest> {
        self.request_with_timeout(code, language, self.config.timeout())
    }

    pub fn request_with_timeout(
        &self,
        code: &str,
        language: &str,
        timeout: Duration,
    ) -> Result<ExecutionRequest> {
        ExecutionRequest::new(code, language, timeout).map_err(|e| {
            self.metrics.validation_rejections.inc();
            events::validation_rejected(&e.to_string());
            e
        })
    }

    /// Validate and run one snippet with the configured budget.
    pub fn execute(&self, code: &str, language: &str) -> Result<ExecutionResult> {
        let request = self.request(code, language)?;
        self.execute_request(&request, &CancellationToken::new())
    }

    /// Run a validated request.
    ///
    /// Faults and timeouts are `Ok` results; errors mean the request never
    /// produced one (capacity, cancellation, infrastructure).
    pub fn execute_request(
        &self,
        request: &ExecutionRequest,
        cancel: &CancellationToken,
    ) -> Result<ExecutionResult> {
        let _permit = self.admission.try_acquire().map_err(|e| {
            self.metrics.admission_rejections.inc();
            events::admission_rejected(self.admission.limit());
            e
        })?;

        self.metrics.units_in_flight.inc();
        let outcome = self.run_admitted(request, cancel);
        self.metrics.units_in_flight.dec();
        outcome
    }

    fn run_admitted(
        &self,
        request: &ExecutionRequest,
        cancel: &CancellationToken,
    ) -> Result<ExecutionResult> {
        let run_id = Uuid::new_v4().to_string();
        events::execution_start(
            &run_id,
            request.language(),
            request.code().len(),
            request.timeout(),
        );

        let deadline = Deadline::start(request.timeout());
        let outcome = match self
            .supervisor
            .run(&self.executor, request.code(), &run_id, deadline, cancel)
        {
            Ok(outcome) => outcome,
            Err(SnipboxError::Cancelled) => {
                events::execution_cancelled(&run_id);
                return Err(SnipboxError::Cancelled);
            }
            Err(e) => {
                log::error!("[{}] execution failed: {}", run_id, e);
                self.metrics.infrastructure_errors.inc();
                events::infrastructure_failure(&run_id, &e);
                return Err(e);
            }
        };

        if outcome.verdict == SupervisorVerdict::TimedOut {
            events::wall_time_exceeded(&run_id, outcome.budget, outcome.kill_report.as_ref());
        }

        let wall_time = outcome.wall_time;
        let result = self.assembler.assemble(outcome);
        self.metrics.record_execution(result.status, wall_time);
        events::execution_end(&result);
        Ok(result)
    }

    /// Probe the interpreter by running its version command.
    pub fn check_dependencies(&self) -> DependencyReport {
        let adapter = self.executor.adapter();
        let mut report = DependencyReport {
            language: adapter.language().to_string(),
            interpreter: self.config.interpreter.display().to_string(),
            available: false,
            version: None,
        };

        let Some(path) = self.config.resolve_interpreter() else {
            return report;
        };
        report.interpreter = path.display().to_string();

        let argv = adapter.version_command(&path);
        let Some((program, args)) = argv.split_first() else {
            return report;
        };
        match Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .output()
        {
            Ok(output) if output.status.success() => {
                // Older interpreters print the version on stderr.
                let text = if output.stdout.is_empty() {
                    output.stderr
                } else {
                    output.stdout
                };
                report.available = true;
                report.version = Some(String::from_utf8_lossy(&text).trim().to_string());
            }
            Ok(output) => log::warn!(
                "{} version probe exited with {}",
                adapter.display_name(),
                output.status
            ),
            Err(e) => log::warn!("{} version probe failed: {}", adapter.display_name(), e),
        }
        report
    }
}
