//! Execution unit launch and reaping
use crate::config::engine::EngineConfig;
use crate::config::types::{Result, SnipboxError};
use crate::core::types::UnitReport;
use crate::judge::adapter::LanguageAdapter;
use crate::utils::env_hygiene::{validate_environment_safety, EnvHygiene, EnvPolicy};
use crate::utils::output::{OutputCapture, OutputLimits};
use nix::unistd::Pid;
use std::collections::BTreeMap;
use std::io::{ErrorKind, Write};
use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Launches one interpreter process per execution.
///
/// Every unit starts from the same cleared environment, its own process group
/// and fresh pipes, so nothing one snippet defines can be seen by another.
pub struct Executor {
    adapter: Arc<dyn LanguageAdapter>,
    /// Resolved argv, or `None` when the interpreter could not be found
    argv: Option<Vec<String>>,
    interpreter: PathBuf,
    environment: BTreeMap<String, String>,
    workdir: PathBuf,
    limits: OutputLimits,
}

impl Executor {
    pub fn new(adapter: Arc<dyn LanguageAdapter>, config: &EngineConfig) -> Result<Self> {
        let hygiene = EnvHygiene::new(EnvPolicy {
            scratch_dir: config.workdir.clone(),
        });
        let environment = hygiene.build_environment(&config.environment)?;
        for warning in validate_environment_safety(&environment) {
            log::warn!("Interpreter environment: {}", warning);
        }

        let argv = match config.resolve_interpreter() {
            Some(path) => Some(adapter.run_command(&path, &config.namespace)?),
            None => {
                log::warn!(
                    "Interpreter {} not found; executions will fail until it is installed",
                    config.interpreter.display()
                );
                None
            }
        };

        Ok(Self {
            adapter,
            argv,
            interpreter: config.interpreter.clone(),
            environment,
            workdir: config.workdir.clone(),
            limits: OutputLimits {
                stdout_limit: config.stdout_limit,
                stderr_limit: config.stderr_limit,
            },
        })
    }

    pub fn adapter(&self) -> &Arc<dyn LanguageAdapter> {
        &self.adapter
    }

    /// Spawn a unit for `code`. The code is fed on stdin from a helper thread
    /// so a unit that never reads cannot block the caller.
    pub fn spawn(&self, code: &str, run_id: &str) -> Result<RunningUnit> {
        let argv = self.argv.as_ref().ok_or_else(|| {
            SnipboxError::Process(format!(
                "interpreter not available: {}",
                self.interpreter.display()
            ))
        })?;
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| SnipboxError::Config("empty interpreter command".to_string()))?;

        let mut cmd = Command::new(program);
        cmd.args(args)
            .env_clear()
            .envs(&self.environment)
            .current_dir(&self.workdir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(0);

        #[cfg(target_os = "linux")]
        unsafe {
            // Units must not outlive the service.
            cmd.pre_exec(|| {
                nix::sys::prctl::set_pdeathsig(nix::sys::signal::Signal::SIGKILL)
                    .map_err(std::io::Error::from)
            });
        }

        let mut child = cmd
            .spawn()
            .map_err(|e| SnipboxError::Process(format!("spawn({}): {}", program, e)))?;

        log::debug!("[{}] spawned unit pid={}", run_id, child.id());

        let pipes = (child.stdin.take(), child.stdout.take(), child.stderr.take());
        let (stdin, stdout, stderr) = match pipes {
            (Some(stdin), Some(stdout), Some(stderr)) => (stdin, stdout, stderr),
            _ => {
                abandon(&mut child);
                return Err(SnipboxError::Process("unit pipes unavailable".to_string()));
            }
        };

        let capture = match OutputCapture::start(stdout, stderr, &self.limits) {
            Ok(capture) => capture,
            Err(e) => {
                abandon(&mut child);
                return Err(e);
            }
        };

        let payload = code.as_bytes().to_vec();
        let feeder_run_id = run_id.to_string();
        let feeder = thread::Builder::new()
            .name(format!("snipbox-stdin-{}", run_id))
            .spawn(move || {
                let mut stdin = stdin;
                match stdin.write_all(&payload) {
                    Ok(()) => {}
                    // The unit exited or was killed before reading everything.
                    Err(e) if e.kind() == ErrorKind::BrokenPipe => {}
                    Err(e) => log::debug!("[{}] stdin feed failed: {}", feeder_run_id, e),
                }
            });
        let feeder = match feeder {
            Ok(handle) => handle,
            Err(e) => {
                abandon(&mut child);
                return Err(SnipboxError::Process(format!("stdin feeder: {}", e)));
            }
        };

        Ok(RunningUnit {
            run_id: run_id.to_string(),
            child,
            capture,
            feeder,
            adapter: Arc::clone(&self.adapter),
        })
    }
}

/// Kill and reap a child that could not be fully set up.
fn abandon(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

/// A spawned, not yet reaped, execution unit.
pub struct RunningUnit {
    run_id: String,
    child: Child,
    capture: OutputCapture,
    feeder: thread::JoinHandle<()>,
    adapter: Arc<dyn LanguageAdapter>,
}

impl RunningUnit {
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Process group id (the unit leads its own group).
    pub fn pgid(&self) -> Pid {
        Pid::from_raw(self.child.id() as i32)
    }

    pub fn try_wait(&mut self) -> Result<Option<ExitStatus>> {
        Ok(self.child.try_wait()?)
    }

    pub fn wait(&mut self) -> Result<ExitStatus> {
        Ok(self.child.wait()?)
    }

    /// Collect output and classify the exit. Collection waits at most
    /// `collection_timeout` once the process is gone.
    pub fn into_report(self, status: ExitStatus, collection_timeout: Duration) -> UnitReport {
        let exit_code = status.code();
        let signal = status.signal();
        let output = self.capture.finish(collection_timeout);

        if self.feeder.is_finished() {
            let _ = self.feeder.join();
        }

        UnitReport {
            fault: self.adapter.classify_exit(exit_code, signal),
            run_id: self.run_id,
            exit_code,
            signal,
            output,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::FaultKind;
    use crate::exec::test_support::shell_executor;

    #[test]
    fn test_stdout_and_exit_are_reported() {
        let executor = shell_executor(EngineConfig::default());
        let mut unit = executor.spawn("echo hello", "unit-1").unwrap();
        let status = unit.wait().unwrap();
        let report = unit.into_report(status, Duration::from_secs(1));

        assert_eq!(report.run_id, "unit-1");
        assert_eq!(report.exit_code, Some(0));
        assert_eq!(report.fault, None);
        assert_eq!(report.output.stdout_text(), "hello\n");
    }

    #[test]
    fn test_nonzero_exit_is_a_fault() {
        let executor = shell_executor(EngineConfig::default());
        let mut unit = executor.spawn("echo oops >&2; exit 3", "unit-2").unwrap();
        let status = unit.wait().unwrap();
        let report = unit.into_report(status, Duration::from_secs(1));

        assert_eq!(report.exit_code, Some(3));
        assert_eq!(report.fault, Some(FaultKind::Runtime));
        assert_eq!(report.output.stderr_text(), "oops\n");
    }

    #[test]
    fn test_environment_is_cleared() {
        std::env::set_var("SNIPBOX_HOST_ONLY", "leak");
        let executor = shell_executor(EngineConfig::default());
        let mut unit = executor
            .spawn("echo \"${SNIPBOX_HOST_ONLY:-clean}\"", "unit-3")
            .unwrap();
        let status = unit.wait().unwrap();
        let report = unit.into_report(status, Duration::from_secs(1));
        assert_eq!(report.output.stdout_text(), "clean\n");
    }

    #[test]
    fn test_units_do_not_share_state() {
        let executor = shell_executor(EngineConfig::default());
        let mut first = executor.spawn("x=42; echo \"$x\"", "unit-a").unwrap();
        let status = first.wait().unwrap();
        assert_eq!(
            first.into_report(status, Duration::from_secs(1)).output.stdout_text(),
            "42\n"
        );

        let mut second = executor.spawn("echo \"${x:-unset}\"", "unit-b").unwrap();
        let status = second.wait().unwrap();
        assert_eq!(
            second.into_report(status, Duration::from_secs(1)).output.stdout_text(),
            "unset\n"
        );
    }

    #[test]
    fn test_missing_interpreter_fails_at_spawn() {
        let config = EngineConfig {
            interpreter: PathBuf::from("/nonexistent/interpreter"),
            ..EngineConfig::default()
        };
        let executor = Executor::new(
            Arc::new(crate::judge::languages::python::PythonAdapter),
            &config,
        )
        .unwrap();
        let err = executor.spawn("print(1)", "unit-x").err().unwrap();
        assert!(matches!(err, SnipboxError::Process(_)));
    }
}
