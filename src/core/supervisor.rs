use crate::config::engine::EngineConfig;
use crate::config::types::{Result, SnipboxError};
use crate::core::cancel::CancellationToken;
use crate::core::types::{
    Deadline, KillReport, SupervisorOutcome, SupervisorVerdict, UnitState,
};
use crate::exec::executor::{Executor, RunningUnit};
use crate::kernel::signal::{kill_remaining_group, terminate_process_group};
use std::process::ExitStatus;
use std::time::Duration;

/// Enforces the wall-clock deadline of one unit.
///
/// The unit is polled until it exits, its deadline elapses, or its
/// cancellation token fires. Every ending clears the whole process group,
/// so nothing the unit started outlives the request; the unit is always
/// reaped before this returns.
#[derive(Clone, Debug)]
pub struct DeadlineSupervisor {
    poll_interval: Duration,
    kill_grace: Duration,
    collection_timeout: Duration,
}

enum Ending {
    Exited(ExitStatus),
    Expired(KillReport),
    Cancelled(KillReport),
}

impl DeadlineSupervisor {
    pub fn new(poll_interval: Duration, kill_grace: Duration, collection_timeout: Duration) -> Self {
        Self {
            poll_interval: poll_interval.max(Duration::from_millis(1)),
            kill_grace,
            collection_timeout,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(
            config.poll_interval(),
            config.kill_grace(),
            config.collection_timeout(),
        )
    }

    /// Run `code` under `deadline`.
    ///
    /// Returns `Cancelled` when the token fires first; timeouts and faults are
    /// outcomes, not errors.
    pub fn run(
        &self,
        executor: &Executor,
        code: &str,
        run_id: &str,
        deadline: Deadline,
        cancel: &CancellationToken,
    ) -> Result<SupervisorOutcome> {
        let mut state = UnitState::Pending;
        if cancel.is_cancelled() {
            log::debug!("[{}] cancelled before spawn", run_id);
            return Err(SnipboxError::Cancelled);
        }

        let mut unit = executor.spawn(code, run_id)?;
        state = state.advance(UnitState::Running)?;
        log::debug!("[{}] {} (budget {:?})", run_id, state, deadline.budget());

        let ending = match self.watch(&mut unit, &deadline, cancel) {
            Ok(ending) => ending,
            Err(e) => {
                let _ = self.kill(&mut unit);
                let _ = unit.wait();
                return Err(e);
            }
        };

        match ending {
            Ending::Exited(status) => {
                // Nothing from the group may outlive the unit's permit.
                if kill_remaining_group(unit.pgid()) {
                    log::info!("[{}] killed descendants left behind by the unit", run_id);
                }
                state = state.advance(UnitState::Completed)?;
                let wall_time = deadline.elapsed();
                log::debug!("[{}] {} after {:?}", run_id, state, wall_time);
                Ok(SupervisorOutcome {
                    verdict: SupervisorVerdict::Completed,
                    report: unit.into_report(status, self.collection_timeout),
                    kill_report: None,
                    wall_time,
                    budget: deadline.budget(),
                })
            }
            Ending::Expired(kill_report) => {
                let status = unit.wait()?;
                state = state.advance(UnitState::TimedOut)?;
                let wall_time = deadline.elapsed();
                log::info!(
                    "[{}] {} after {:?}; term_sent={} kill_sent={}",
                    run_id,
                    state,
                    wall_time,
                    kill_report.term_sent,
                    kill_report.kill_sent
                );
                Ok(SupervisorOutcome {
                    verdict: SupervisorVerdict::TimedOut,
                    report: unit.into_report(status, self.collection_timeout),
                    kill_report: Some(kill_report),
                    wall_time,
                    budget: deadline.budget(),
                })
            }
            Ending::Cancelled(_) => {
                unit.wait()?;
                state = state.advance(UnitState::Cancelled)?;
                log::info!("[{}] {} after {:?}", run_id, state, deadline.elapsed());
                Err(SnipboxError::Cancelled)
            }
        }
    }

    fn watch(
        &self,
        unit: &mut RunningUnit,
        deadline: &Deadline,
        cancel: &CancellationToken,
    ) -> Result<Ending> {
        loop {
            if let Some(status) = unit.try_wait()? {
                return Ok(Ending::Exited(status));
            }
            if cancel.is_cancelled() {
                return Ok(Ending::Cancelled(self.kill(unit)));
            }
            if deadline.expired() {
                return Ok(Ending::Expired(self.kill(unit)));
            }
            let remaining = deadline.remaining();
            std::thread::sleep(self.poll_interval.min(remaining).max(Duration::from_millis(1)));
        }
    }

    fn kill(&self, unit: &mut RunningUnit) -> KillReport {
        let pgid = unit.pgid();
        terminate_process_group(pgid, self.kill_grace, || {
            matches!(unit.try_wait(), Ok(Some(_)))
        })
    }
}
