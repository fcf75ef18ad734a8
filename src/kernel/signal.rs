/// Process-group termination for timed-out or cancelled units.
///
/// Every execution unit leads its own process group, so one signal reaches
/// the interpreter and anything it forked. Escalation is SIGTERM, a short
/// grace period, then SIGKILL unconditionally.
use crate::core::types::KillReport;
use nix::errno::Errno;
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use std::thread;
use std::time::{Duration, Instant};

const GRACE_POLL: Duration = Duration::from_millis(5);

/// Terminate the process group led by `pgid`.
///
/// `has_exited` is polled during the grace period so a unit that honors
/// SIGTERM is not waited on needlessly. SIGKILL is still sent to the group
/// afterwards to catch descendants.
pub fn terminate_process_group<F>(pgid: Pid, grace: Duration, mut has_exited: F) -> KillReport
where
    F: FnMut() -> bool,
{
    let mut report = KillReport::default();
    let start = Instant::now();

    match killpg(pgid, Signal::SIGTERM) {
        Ok(()) => report.term_sent = true,
        Err(Errno::ESRCH) => {
            report.notes.push("process group already gone before SIGTERM".to_string());
            report.waited_ms = start.elapsed().as_millis() as u64;
            return report;
        }
        Err(e) => report.notes.push(format!("group SIGTERM failed: {}", e)),
    }

    let grace_deadline = start + grace;
    while Instant::now() < grace_deadline {
        if has_exited() {
            report.exited_during_grace = true;
            break;
        }
        thread::sleep(GRACE_POLL);
    }

    match killpg(pgid, Signal::SIGKILL) {
        Ok(()) => report.kill_sent = true,
        Err(Errno::ESRCH) => {
            report.notes.push("process group gone before SIGKILL".to_string());
        }
        Err(e) => report.notes.push(format!("group SIGKILL failed: {}", e)),
    }

    report.waited_ms = start.elapsed().as_millis() as u64;
    report
}

/// SIGKILL whatever is left of the group led by `pgid` once its leader has
/// exited. Returns true when some descendant was still there.
pub fn kill_remaining_group(pgid: Pid) -> bool {
    match killpg(pgid, Signal::SIGKILL) {
        Ok(()) => true,
        Err(Errno::ESRCH) => false,
        Err(e) => {
            log::warn!("group SIGKILL for {} failed: {}", pgid, e);
            false
        }
    }
}

/// Signal name for messages (`SIGKILL`), or the raw number when unknown.
pub fn signal_name(signal: i32) -> String {
    Signal::try_from(signal)
        .map(|s| s.as_str().to_string())
        .unwrap_or_else(|_| format!("signal {}", signal))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::test_support::wait_until_gone;
    use std::os::unix::process::CommandExt;
    use std::process::Command;

    #[test]
    fn test_signal_name() {
        assert_eq!(signal_name(9), "SIGKILL");
        assert_eq!(signal_name(15), "SIGTERM");
        assert_eq!(signal_name(999), "signal 999");
    }

    #[test]
    fn test_terminates_sleeping_group() {
        let mut child = Command::new("sleep")
            .arg("30")
            .process_group(0)
            .spawn()
            .expect("spawn sleep");
        let pgid = Pid::from_raw(child.id() as i32);

        let report = terminate_process_group(pgid, Duration::from_millis(200), || {
            matches!(child.try_wait(), Ok(Some(_)))
        });

        assert!(report.term_sent);
        let status = child.wait().expect("reap");
        assert!(!status.success());
        assert!(report.waited_ms < 5_000);
    }

    #[test]
    fn test_kill_remaining_group_reaches_orphans() {
        let mut child = Command::new("sh")
            .args(["-c", "sleep 30 >/dev/null 2>&1 </dev/null & echo $!"])
            .stdout(std::process::Stdio::piped())
            .process_group(0)
            .spawn()
            .expect("spawn sh");
        let pgid = Pid::from_raw(child.id() as i32);
        let output = child.wait_with_output().expect("reap sh");
        let orphan: i32 = String::from_utf8_lossy(&output.stdout).trim().parse().unwrap();

        assert!(kill_remaining_group(pgid));
        assert!(wait_until_gone(orphan, Duration::from_secs(3)));
    }

    #[test]
    fn test_kill_remaining_group_on_empty_group() {
        let mut child = Command::new("true").process_group(0).spawn().expect("spawn true");
        let pgid = Pid::from_raw(child.id() as i32);
        child.wait().expect("reap");
        assert!(!kill_remaining_group(pgid));
    }

    #[test]
    fn test_missing_group_is_reported_not_fatal() {
        let mut child = Command::new("true").process_group(0).spawn().expect("spawn true");
        let pgid = Pid::from_raw(child.id() as i32);
        child.wait().expect("reap");

        let report = terminate_process_group(pgid, Duration::from_millis(10), || true);
        assert!(!report.kill_sent);
        assert!(!report.notes.is_empty());
    }
}
