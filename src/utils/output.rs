/// Per-unit output capture.
///
/// Each execution unit gets its own stdout/stderr pipes; one collector thread
/// per pipe appends into a bounded buffer owned by that unit alone. Nothing
/// touches the server's own standard streams, so captures of concurrent units
/// never overlap.
use crate::config::types::{OutputIntegrity, Result, SnipboxError};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use std::io::Read;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

/// Output limits configuration
#[derive(Debug, Clone)]
pub struct OutputLimits {
    /// Per-stream stdout limit (bytes)
    pub stdout_limit: usize,
    /// Per-stream stderr limit (bytes)
    pub stderr_limit: usize,
}

impl Default for OutputLimits {
    fn default() -> Self {
        OutputLimits {
            stdout_limit: 1024 * 1024, // 1 MB stdout
            stderr_limit: 256 * 1024,  // 256 KB stderr
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamId {
    Stdout,
    Stderr,
}

impl StreamId {
    fn name(self) -> &'static str {
        match self {
            StreamId::Stdout => "stdout",
            StreamId::Stderr => "stderr",
        }
    }
}

#[derive(Debug, Default)]
struct StreamBuffer {
    data: Vec<u8>,
    dropped_bytes: u64,
    integrity: OutputIntegrity,
}

type SharedBuffer = Arc<Mutex<StreamBuffer>>;

fn lock(buffer: &SharedBuffer) -> MutexGuard<'_, StreamBuffer> {
    buffer.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Captured output of one unit.
#[derive(Debug, Clone, Default)]
pub struct CapturedOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub stdout_integrity: OutputIntegrity,
    pub stderr_integrity: OutputIntegrity,
    /// Bytes read past the limits and discarded
    pub dropped_bytes: u64,
}

impl CapturedOutput {
    pub fn stdout_text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).to_string()
    }

    pub fn stderr_text(&self) -> String {
        String::from_utf8_lossy(&self.stderr).to_string()
    }

    pub fn integrity(&self) -> OutputIntegrity {
        self.stdout_integrity.worst(self.stderr_integrity)
    }
}

/// Active capture for one execution unit.
///
/// The capture is released by [`OutputCapture::finish`] or by dropping it;
/// either way the collectors end once the unit's pipes close.
pub struct OutputCapture {
    stdout: SharedBuffer,
    stderr: SharedBuffer,
    done_rx: Receiver<StreamId>,
    collectors: Vec<thread::JoinHandle<()>>,
}

impl OutputCapture {
    /// Start collectors for the unit's stdout and stderr pipes.
    pub fn start<O, E>(stdout: O, stderr: E, limits: &OutputLimits) -> Result<Self>
    where
        O: Read + Send + 'static,
        E: Read + Send + 'static,
    {
        let (done_tx, done_rx) = bounded(2);
        let stdout_buffer: SharedBuffer = Arc::default();
        let stderr_buffer: SharedBuffer = Arc::default();

        let collectors = vec![
            spawn_collector(
                StreamId::Stdout,
                stdout,
                limits.stdout_limit,
                Arc::clone(&stdout_buffer),
                done_tx.clone(),
            )?,
            spawn_collector(
                StreamId::Stderr,
                stderr,
                limits.stderr_limit,
                Arc::clone(&stderr_buffer),
                done_tx,
            )?,
        ];

        Ok(Self {
            stdout: stdout_buffer,
            stderr: stderr_buffer,
            done_rx,
            collectors,
        })
    }

    /// Wait (bounded) for both streams to reach end-of-stream and take what
    /// was captured.
    ///
    /// A stream still open when `wait` elapses (e.g. a detached grandchild
    /// holds the pipe) is reported as [`OutputIntegrity::CollectionTimeout`]
    /// with the bytes read so far; its collector is left to finish on its own.
    pub fn finish(self, wait: Duration) -> CapturedOutput {
        let deadline = Instant::now() + wait;
        let mut stdout_done = false;
        let mut stderr_done = false;

        while !(stdout_done && stderr_done) {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.done_rx.recv_timeout(remaining) {
                Ok(StreamId::Stdout) => stdout_done = true,
                Ok(StreamId::Stderr) => stderr_done = true,
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        if stdout_done && stderr_done {
            for handle in self.collectors {
                let _ = handle.join();
            }
        } else {
            log::warn!(
                "Output collection incomplete after {:?} (stdout_done={}, stderr_done={})",
                wait,
                stdout_done,
                stderr_done
            );
        }

        let (stdout, stdout_integrity, stdout_dropped) = snapshot(&self.stdout, stdout_done);
        let (stderr, stderr_integrity, stderr_dropped) = snapshot(&self.stderr, stderr_done);

        CapturedOutput {
            stdout,
            stderr,
            stdout_integrity,
            stderr_integrity,
            dropped_bytes: stdout_dropped + stderr_dropped,
        }
    }
}

fn snapshot(buffer: &SharedBuffer, done: bool) -> (Vec<u8>, OutputIntegrity, u64) {
    let mut guard = lock(buffer);
    let integrity = if done {
        guard.integrity
    } else {
        guard.integrity.worst(OutputIntegrity::CollectionTimeout)
    };
    (std::mem::take(&mut guard.data), integrity, guard.dropped_bytes)
}

fn spawn_collector<R: Read + Send + 'static>(
    id: StreamId,
    stream: R,
    limit: usize,
    buffer: SharedBuffer,
    done_tx: Sender<StreamId>,
) -> Result<thread::JoinHandle<()>> {
    thread::Builder::new()
        .name(format!("snipbox-{}", id.name()))
        .spawn(move || {
            collect_stream(stream, limit, &buffer);
            let _ = done_tx.send(id);
        })
        .map_err(|e| SnipboxError::Capture(format!("spawn {} collector: {}", id.name(), e)))
}

/// Collect from a single stream with limit.
///
/// Bytes beyond `limit` are read and dropped rather than left in the pipe,
/// so a chatty unit never blocks on a full pipe.
fn collect_stream<R: Read>(mut stream: R, limit: usize, buffer: &SharedBuffer) {
    let mut chunk = [0u8; 4096];

    loop {
        match stream.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => {
                let mut guard = lock(buffer);
                let room = limit.saturating_sub(guard.data.len());
                let kept = room.min(n);
                guard.data.extend_from_slice(&chunk[..kept]);
                if kept < n {
                    guard.dropped_bytes += (n - kept) as u64;
                    guard.integrity = guard.integrity.worst(OutputIntegrity::TruncatedByLimit);
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => {
                log::warn!("Output collector read error: {}", e);
                let mut guard = lock(buffer);
                guard.integrity = guard.integrity.worst(OutputIntegrity::ReadError);
                break;
            }
        }
    }
}
