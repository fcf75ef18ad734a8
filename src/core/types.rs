use crate::config::types::{FaultKind, Result, SnipboxError};
use crate::utils::output::CapturedOutput;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Per-request wall-clock deadline, passed explicitly to the supervisor.
#[derive(Clone, Copy, Debug)]
pub struct Deadline {
    started: Instant,
    budget: Duration,
}

impl Deadline {
    /// Start the clock now.
    pub fn start(budget: Duration) -> Self {
        Self {
            started: Instant::now(),
            budget,
        }
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn remaining(&self) -> Duration {
        self.budget.saturating_sub(self.elapsed())
    }

    pub fn expired(&self) -> bool {
        self.elapsed() >= self.budget
    }
}

/// Lifecycle of one execution unit.
///
/// `Pending -> Running -> {Completed, TimedOut, Cancelled}`; terminal states
/// are final.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum UnitState {
    #[serde(rename = "pending")]
    Pending,
    #[serde(rename = "running")]
    Running,
    #[serde(rename = "completed")]
    Completed,
    #[serde(rename = "timed_out")]
    TimedOut,
    #[serde(rename = "cancelled")]
    Cancelled,
}

impl UnitState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            UnitState::Completed | UnitState::TimedOut | UnitState::Cancelled
        )
    }

    pub fn can_transition_to(self, next: UnitState) -> bool {
        matches!(
            (self, next),
            (UnitState::Pending, UnitState::Running)
                | (UnitState::Running, UnitState::Completed)
                | (UnitState::Running, UnitState::TimedOut)
                | (UnitState::Running, UnitState::Cancelled)
        )
    }

    /// Validated transition.
    pub fn advance(self, next: UnitState) -> Result<UnitState> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(SnipboxError::Lifecycle {
                from: self.to_string(),
                to: next.to_string(),
            })
        }
    }
}

impl std::fmt::Display for UnitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UnitState::Pending => write!(f, "PENDING"),
            UnitState::Running => write!(f, "RUNNING"),
            UnitState::Completed => write!(f, "COMPLETED"),
            UnitState::TimedOut => write!(f, "TIMED_OUT"),
            UnitState::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

/// Signal escalation report for timeout/forced termination paths.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct KillReport {
    pub term_sent: bool,
    pub kill_sent: bool,
    /// The unit's leader exited before the grace period ran out
    pub exited_during_grace: bool,
    pub waited_ms: u64,
    pub notes: Vec<String>,
}

/// What the executor reports once a unit has been reaped.
#[derive(Debug, Clone)]
pub struct UnitReport {
    pub run_id: String,
    pub exit_code: Option<i32>,
    pub signal: Option<i32>,
    /// Fault classification of the exit; `None` when the code completed
    pub fault: Option<FaultKind>,
    pub output: CapturedOutput,
}

/// Supervisor verdict for a unit that reached a reportable terminal state.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum SupervisorVerdict {
    /// The unit finished (successfully or with a fault) within the budget
    Completed,
    /// The budget elapsed first; the unit was killed
    TimedOut,
}

/// Supervisor output handed to the result assembler.
#[derive(Debug, Clone)]
pub struct SupervisorOutcome {
    pub verdict: SupervisorVerdict,
    pub report: UnitReport,
    pub kill_report: Option<KillReport>,
    pub wall_time: Duration,
    pub budget: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_lifecycle_paths() {
        for terminal in [UnitState::Completed, UnitState::TimedOut, UnitState::Cancelled] {
            let state = UnitState::Pending.advance(UnitState::Running).unwrap();
            let state = state.advance(terminal).unwrap();
            assert!(state.is_terminal());
        }
    }

    #[test]
    fn test_terminal_states_are_final() {
        for terminal in [UnitState::Completed, UnitState::TimedOut, UnitState::Cancelled] {
            for next in [
                UnitState::Pending,
                UnitState::Running,
                UnitState::Completed,
                UnitState::TimedOut,
                UnitState::Cancelled,
            ] {
                assert!(terminal.advance(next).is_err(), "{} -> {}", terminal, next);
            }
        }
    }

    #[test]
    fn test_no_return_to_pending_and_no_skipping_running() {
        assert!(UnitState::Running.advance(UnitState::Pending).is_err());
        assert!(UnitState::Pending.advance(UnitState::Completed).is_err());
        assert!(UnitState::Pending.advance(UnitState::TimedOut).is_err());

        let err = UnitState::Running.advance(UnitState::Pending).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid lifecycle transition: RUNNING -> PENDING"
        );
    }

    #[test]
    fn test_deadline_accounting() {
        let deadline = Deadline::start(Duration::from_millis(50));
        assert!(!deadline.expired());
        assert!(deadline.remaining() <= Duration::from_millis(50));
        std::thread::sleep(Duration::from_millis(60));
        assert!(deadline.expired());
        assert_eq!(deadline.remaining(), Duration::ZERO);

        let zero = Deadline::start(Duration::ZERO);
        assert!(zero.expired());
    }
}
