//! Scripted adapters for process-level tests.
//!
//! Each adapter is a POSIX shell script run through `sh`, so the tests need
//! nothing beyond a unix userland.

use std::fs;
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::time::{Duration, Instant};

use camino::Utf8PathBuf;
use tempfile::TempDir;

use crate::config::{AdapterLaunch, LaunchSpec};
use crate::notify::Notification;

/// Upper bound on any single wait in the process tests.
pub(super) const WAIT: Duration = Duration::from_secs(5);

/// Shell helpers shared by every script: `send` frames its argument and
/// `receive` reads one framed body into `$body`, exiting on EOF.
const PRELUDE: &str = r##"
send() { printf 'Content-Length: %d\r\n\r\n%s' "${#1}" "$1"; }
receive() {
  IFS= read -r header || exit 0
  len=${header#Content-Length: }
  len=${len%?}
  IFS= read -r blank
  body=$(dd bs=1 count="$len" 2>/dev/null)
}
"##;

/// Answers every request successfully, exiting after `disconnect`.
pub(super) const RESPONDER: &str = r##"
while receive; do
  seq=$(printf '%s' "$body" | sed 's/.*"seq":\([0-9]*\).*/\1/')
  command=$(printf '%s' "$body" | sed 's/.*"command":"\([^"]*\)".*/\1/')
  send "{\"type\":\"response\",\"seq\":100,\"request_seq\":$seq,\"success\":true,\"command\":\"$command\"}"
  if [ "$command" = disconnect ]; then exit 0; fi
done
"##;

/// Never reads its input and never answers.
pub(super) const SILENT: &str = "exec sleep 30\n";

/// A temporary adapter script together with its working directory.
pub(super) struct ScriptedAdapter {
    /// Holds the script.
    scripts: TempDir,
    /// Used as the adapter's working directory.
    workspace: TempDir,
}

impl ScriptedAdapter {
    /// Writes `body`, prefixed with the shared helpers, to a fresh script.
    pub(super) fn new(body: &str) -> Self {
        let scripts = tempfile::tempdir().expect("create script dir");
        let workspace = tempfile::tempdir().expect("create workspace dir");
        fs::write(scripts.path().join("adapter.sh"), format!("{PRELUDE}{body}"))
            .expect("write adapter script");
        Self {
            scripts,
            workspace,
        }
    }

    /// Launch description running the script with `sh` in the workspace.
    pub(super) fn spec(&self) -> LaunchSpec {
        let script = self.scripts.path().join("adapter.sh");
        let launch = AdapterLaunch::program(script.to_str().expect("utf-8 script path"))
            .with_runtime("sh", std::iter::empty::<String>());
        LaunchSpec::new(launch, self.workspace_path())
    }

    pub(super) fn workspace_path(&self) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(self.workspace.path().to_path_buf())
            .expect("utf-8 workspace path")
    }
}

/// Waits for the first notification accepted by `accept`, skipping others.
pub(super) fn wait_for<F>(notifications: &Receiver<Notification>, mut accept: F) -> Notification
where
    F: FnMut(&Notification) -> bool,
{
    let deadline = Instant::now() + WAIT;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match notifications.recv_timeout(remaining) {
            Ok(notification) if accept(&notification) => return notification,
            Ok(_) => {}
            Err(RecvTimeoutError::Timeout) => panic!("timed out waiting for notification"),
            Err(RecvTimeoutError::Disconnected) => panic!("notification channel closed"),
        }
    }
}

/// Waits for the `Disposed` notification.
pub(super) fn wait_for_disposed(notifications: &Receiver<Notification>) -> Notification {
    wait_for(notifications, |notification| {
        matches!(notification, Notification::Disposed(_))
    })
}
