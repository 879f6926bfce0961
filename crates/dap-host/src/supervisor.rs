//! Spawning and supervision of the debug adapter process.
//!
//! The supervisor owns three helper threads per adapter:
//!
//! - the stdout pump, which exclusively owns the [`Framer`] and feeds every
//!   completed frame to the [`Router`];
//! - the stderr drain, which forwards diagnostics to `tracing`;
//! - the exit monitor, which notices termination, fails outstanding
//!   requests and publishes [`Notification::Disposed`] exactly once.

use std::io::{self, BufRead, BufReader, BufWriter, Read, Write};
use std::process::{Child, ChildStdin, ChildStderr, ChildStdout, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::config::LaunchSpec;
use crate::error::{RequestFailure, TransportError};
use crate::framing::{Framer, encode};
use crate::notify::{ExitReport, Notification, Notifier};
use crate::pending::PendingRequests;
use crate::router::Router;
use crate::settings::HostSettings;

/// Log target for process supervision.
pub(crate) const SUPERVISOR_TARGET: &str = "dap_host::supervisor";

/// How long the exit monitor waits for stdout to drain after the process
/// has exited, so late responses still reach their callbacks.
const STDOUT_DRAIN_GRACE: Duration = Duration::from_millis(200);

/// How long an interrupted adapter has to exit before it is killed.
const INTERRUPT_GRACE: Duration = Duration::from_millis(250);

/// Poll interval while waiting out [`INTERRUPT_GRACE`].
const INTERRUPT_POLL: Duration = Duration::from_millis(10);

/// A running (or recently exited) adapter process.
pub struct AdapterProcess {
    pid: u32,
    child: Arc<Mutex<Child>>,
    stdin: Mutex<Option<BufWriter<ChildStdin>>>,
    active: Arc<AtomicBool>,
}

/// Shared collaborators wired into the supervisor threads.
pub(crate) struct Wiring {
    pub(crate) router: Router,
    pub(crate) pending: Arc<PendingRequests>,
    pub(crate) notifier: Arc<Notifier>,
}

impl AdapterProcess {
    /// Spawns the adapter described by `spec` and starts its helper threads.
    ///
    /// The working directory is handed to the spawn call itself; the host's
    /// own current directory is never changed.
    pub(crate) fn spawn(
        spec: &LaunchSpec,
        settings: &HostSettings,
        wiring: Wiring,
    ) -> Result<Self, TransportError> {
        let command_line = spec.launch.command_line();
        let executable = command_line.executable.to_string_lossy().into_owned();

        debug!(
            target: SUPERVISOR_TARGET,
            executable = %executable,
            args = ?command_line.args,
            working_dir = %spec.working_dir(),
            "spawning debug adapter"
        );

        let mut command = Command::new(&command_line.executable);
        command
            .args(&command_line.args)
            .current_dir(spec.working_dir())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = command.spawn().map_err(|error| {
            if error.kind() == io::ErrorKind::NotFound {
                TransportError::BinaryNotFound {
                    command: executable.clone(),
                    source: Arc::new(error),
                }
            } else {
                TransportError::SpawnFailed {
                    message: format!("failed to start {executable}"),
                    source: Arc::new(error),
                }
            }
        })?;
        let pid = child.id();

        let pipes = take_pipes(&mut child);
        let (stdin, stdout, stderr) = match pipes {
            Ok(handles) => handles,
            Err(error) => {
                reap(&mut child);
                return Err(error);
            }
        };

        let process = Self {
            pid,
            child: Arc::new(Mutex::new(child)),
            stdin: Mutex::new(Some(BufWriter::new(stdin))),
            active: Arc::new(AtomicBool::new(true)),
        };

        if let Err(error) = process.start_threads(stdout, stderr, settings, wiring) {
            process.kill_quietly();
            return Err(error);
        }

        info!(target: SUPERVISOR_TARGET, pid, executable = %executable, "debug adapter spawned");
        Ok(process)
    }

    fn start_threads(
        &self,
        stdout: ChildStdout,
        stderr: ChildStderr,
        settings: &HostSettings,
        wiring: Wiring,
    ) -> Result<(), TransportError> {
        let Wiring {
            router,
            pending,
            notifier,
        } = wiring;
        let pid = self.pid;
        let (drained_tx, drained_rx) = mpsc::channel();

        let framer = Framer::with_limits(settings.max_header_bytes, settings.max_body_bytes);
        let read_size = settings.read_buffer_bytes();
        spawn_named("dap-stdout", move || {
            pump_stdout(pid, stdout, framer, &router, read_size, &drained_tx);
        })?;

        spawn_named("dap-stderr", move || drain_stderr(pid, stderr))?;

        let monitor = ExitMonitor {
            pid,
            child: Arc::clone(&self.child),
            active: Arc::clone(&self.active),
            pending,
            notifier,
            poll_interval: settings.exit_poll_interval(),
            stdout_drained: drained_rx,
        };
        spawn_named("dap-exit", move || monitor.run())?;
        Ok(())
    }

    /// OS process identifier.
    #[must_use]
    pub const fn pid(&self) -> u32 {
        self.pid
    }

    /// Whether the process is believed to be running.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Writes one framed message to the adapter's stdin.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Inactive`] once the process has exited or
    /// been killed, and [`TransportError::Io`] if the pipe write fails.
    pub fn send(&self, body: &[u8]) -> Result<(), TransportError> {
        if !self.is_active() {
            return Err(TransportError::Inactive);
        }
        let mut stdin = lock(&self.stdin);
        let writer = stdin.as_mut().ok_or(TransportError::Inactive)?;
        writer.write_all(&encode(body))?;
        writer.flush()?;
        Ok(())
    }

    /// Terminates the process and closes its stdin.
    ///
    /// On unix the adapter is first interrupted with `SIGINT` and given a
    /// short grace period; it is killed outright if it is still running
    /// afterwards. Terminating a process that has already exited is not an
    /// error.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Io`] if the kill signal cannot be delivered.
    pub fn kill(&self) -> Result<(), TransportError> {
        drop(lock(&self.stdin).take());
        if self.interrupt() && self.exits_within(INTERRUPT_GRACE) {
            return Ok(());
        }

        let mut child = lock(&self.child);
        if let Ok(Some(status)) = child.try_wait() {
            debug!(target: SUPERVISOR_TARGET, pid = self.pid, ?status, "debug adapter already exited");
            return Ok(());
        }
        warn!(target: SUPERVISOR_TARGET, pid = self.pid, "killing debug adapter");
        child.kill()?;
        Ok(())
    }

    /// Sends `SIGINT`, returning whether the adapter is now shutting down.
    ///
    /// The child lock is held across the signal so the pid cannot be reaped
    /// and reused in between.
    #[cfg(unix)]
    fn interrupt(&self) -> bool {
        use nix::sys::signal::{Signal, kill};
        use nix::unistd::Pid;

        let mut child = lock(&self.child);
        if matches!(self.reap_status(&mut child), Some(true)) {
            return true;
        }
        let Ok(raw) = i32::try_from(self.pid) else {
            return false;
        };
        let delivered = match kill(Pid::from_raw(raw), Signal::SIGINT) {
            Ok(()) => {
                debug!(target: SUPERVISOR_TARGET, pid = self.pid, "interrupted debug adapter");
                true
            }
            Err(errno) => {
                debug!(target: SUPERVISOR_TARGET, pid = self.pid, %errno, "failed to interrupt debug adapter");
                false
            }
        };
        drop(child);
        delivered
    }

    #[cfg(not(unix))]
    #[expect(clippy::unused_self, reason = "signals exist only on unix")]
    const fn interrupt(&self) -> bool {
        false
    }

    /// Whether the guarded child has exited, or `None` if polling failed.
    fn reap_status(&self, child: &mut Child) -> Option<bool> {
        match child.try_wait() {
            Ok(status) => Some(status.is_some()),
            Err(error) => {
                debug!(target: SUPERVISOR_TARGET, pid = self.pid, %error, "failed to poll debug adapter status");
                None
            }
        }
    }

    fn exits_within(&self, grace: Duration) -> bool {
        let deadline = Instant::now() + grace;
        loop {
            if matches!(self.reap_status(&mut lock(&self.child)), Some(true)) {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(INTERRUPT_POLL);
        }
    }

    fn kill_quietly(&self) {
        if let Err(error) = self.kill() {
            warn!(
                target: SUPERVISOR_TARGET,
                pid = self.pid,
                %error,
                "failed to kill debug adapter"
            );
        }
    }
}

impl Drop for AdapterProcess {
    fn drop(&mut self) {
        if self.is_active() {
            self.kill_quietly();
        }
    }
}

impl std::fmt::Debug for AdapterProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterProcess")
            .field("pid", &self.pid)
            .field("active", &self.is_active())
            .finish_non_exhaustive()
    }
}

/// Watches for process exit and announces it once.
struct ExitMonitor {
    pid: u32,
    child: Arc<Mutex<Child>>,
    active: Arc<AtomicBool>,
    pending: Arc<PendingRequests>,
    notifier: Arc<Notifier>,
    poll_interval: Duration,
    stdout_drained: Receiver<()>,
}

impl ExitMonitor {
    fn run(self) {
        let code = self.wait_for_exit();

        // Let frames already in the pipe reach their callbacks first.
        if self.stdout_drained.recv_timeout(STDOUT_DRAIN_GRACE).is_err() {
            debug!(target: SUPERVISOR_TARGET, pid = self.pid, "stdout still open after exit");
        }

        self.active.store(false, Ordering::SeqCst);
        let failed = self.pending.fail_all(RequestFailure::ProcessExited);
        info!(
            target: SUPERVISOR_TARGET,
            pid = self.pid,
            code = ?code,
            failed_requests = failed,
            "debug adapter exited"
        );
        self.notifier
            .publish(&Notification::Disposed(ExitReport { code }));
    }

    fn wait_for_exit(&self) -> Option<i32> {
        loop {
            match lock(&self.child).try_wait() {
                Ok(Some(status)) => return status.code(),
                Ok(None) => {}
                Err(error) => {
                    warn!(
                        target: SUPERVISOR_TARGET,
                        pid = self.pid,
                        %error,
                        "failed to poll debug adapter status"
                    );
                    return None;
                }
            }
            thread::sleep(self.poll_interval);
        }
    }
}

fn take_pipes(child: &mut Child) -> Result<(ChildStdin, ChildStdout, ChildStderr), TransportError> {
    let stdin = child.stdin.take().ok_or_else(|| missing_pipe("stdin"))?;
    let stdout = child.stdout.take().ok_or_else(|| missing_pipe("stdout"))?;
    let stderr = child.stderr.take().ok_or_else(|| missing_pipe("stderr"))?;
    Ok((stdin, stdout, stderr))
}

fn missing_pipe(name: &str) -> TransportError {
    TransportError::SpawnFailed {
        message: format!("failed to capture {name}"),
        source: Arc::new(io::Error::other(format!("no {name}"))),
    }
}

fn reap(child: &mut Child) {
    drop(child.kill());
    drop(child.wait());
}

fn spawn_named<F>(name: &str, body: F) -> Result<(), TransportError>
where
    F: FnOnce() + Send + 'static,
{
    thread::Builder::new()
        .name(name.to_owned())
        .spawn(body)
        .map(|_detached| ())
        .map_err(|error| TransportError::SpawnFailed {
            message: format!("failed to start {name} thread"),
            source: Arc::new(error),
        })
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // Recover from poisoning so shutdown still works after a panic.
    mutex.lock().unwrap_or_else(|poison| poison.into_inner())
}

/// Reads stdout until EOF, routing every completed frame.
fn pump_stdout(
    pid: u32,
    mut stdout: impl Read,
    mut framer: Framer,
    router: &Router,
    read_size: usize,
    drained: &Sender<()>,
) {
    let mut buffer = vec![0_u8; read_size];
    loop {
        let read = match stdout.read(&mut buffer) {
            Ok(0) => break,
            Ok(read) => read,
            Err(error) if error.kind() == io::ErrorKind::Interrupted => continue,
            Err(error) => {
                warn!(target: SUPERVISOR_TARGET, pid, %error, "failed to read adapter stdout");
                break;
            }
        };
        let chunk = buffer.get(..read).unwrap_or_default();
        for frame in framer.feed(chunk) {
            router.route_frame(frame);
        }
    }
    debug!(
        target: SUPERVISOR_TARGET,
        pid,
        unconsumed = framer.buffered_len(),
        "adapter stdout closed"
    );
    drop(drained.send(()));
}

/// Forwards each stderr line to the diagnostic log.
fn drain_stderr(pid: u32, stderr: impl Read) {
    let reader = BufReader::new(stderr);
    for line in reader.split(b'\n') {
        match line {
            Ok(bytes) => {
                let text = String::from_utf8_lossy(&bytes);
                let trimmed = text.trim_end();
                if !trimmed.is_empty() {
                    warn!(target: SUPERVISOR_TARGET, pid, stderr = %trimmed, "debug adapter stderr");
                }
            }
            Err(error) => {
                debug!(target: SUPERVISOR_TARGET, pid, %error, "stopped reading adapter stderr");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use rstest::rstest;

    use super::*;
    use crate::protocol::Event;

    #[rstest]
    fn pump_routes_frames_across_reads_and_signals_drain() {
        let pending = Arc::new(PendingRequests::new());
        let notifier = Arc::new(Notifier::new());
        let notifications = notifier.subscribe();
        let router = Router::new(pending, notifier);
        let input = [
            encode(br#"{"type":"event","seq":1,"event":"initialized"}"#),
            encode(br#"{"type":"event","seq":2,"event":"stopped"}"#),
        ]
        .concat();
        let (tx, rx) = mpsc::channel();

        pump_stdout(1, Cursor::new(input), Framer::new(), &router, 7, &tx);

        let events: Vec<_> = notifications.try_iter().collect();
        assert_eq!(
            events,
            vec![
                Notification::Event(Event {
                    seq: 1,
                    event: Some(String::from("initialized")),
                    ..Event::default()
                }),
                Notification::Event(Event {
                    seq: 2,
                    event: Some(String::from("stopped")),
                    ..Event::default()
                }),
            ]
        );
        assert_eq!(rx.try_recv(), Ok(()));
    }

    #[rstest]
    fn stderr_drain_tolerates_invalid_utf8() {
        drain_stderr(1, Cursor::new(b"warning: \xff\xfe\n\nlast line".to_vec()));
    }
}
