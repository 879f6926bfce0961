//! Graceful-then-forced shutdown of the debug adapter.

use std::sync::atomic::Ordering;

use serde_json::json;
use tracing::{debug, info, warn};

use crate::transport::DebugAdapterTransport;

/// Log target for shutdown.
const DISPOSAL_TARGET: &str = "dap_host::disposal";

/// Command sent to ask the adapter to end the session.
pub const DISCONNECT_COMMAND: &str = "disconnect";

/// What a call to [`DebugAdapterTransport::dispose`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisposeOutcome {
    /// The adapter had already exited or was already being disposed.
    Skipped,
    /// The adapter was sent `disconnect` and then killed.
    Terminated {
        /// Whether the adapter answered `disconnect` within the wait.
        acknowledged: bool,
    },
}

impl DebugAdapterTransport {
    /// Shuts the adapter down.
    ///
    /// Sends `disconnect` with `restart: false`, waits up to the configured
    /// disconnect timeout for the response, then kills the process whether
    /// or not it answered. Repeat calls, and calls after the adapter has
    /// exited, do nothing.
    ///
    /// The `Disposed` notification follows once the exit monitor observes
    /// the process has gone.
    pub fn dispose(&self) -> DisposeOutcome {
        if !self.is_active() {
            debug!(target: DISPOSAL_TARGET, pid = self.pid(), "adapter already exited");
            return DisposeOutcome::Skipped;
        }
        if self.disposing.swap(true, Ordering::SeqCst) {
            debug!(target: DISPOSAL_TARGET, pid = self.pid(), "dispose already in progress");
            return DisposeOutcome::Skipped;
        }

        let timeout = self.settings.disconnect_timeout();
        let arguments = json!({ "restart": false });
        let acknowledged = match self.request(DISCONNECT_COMMAND, Some(arguments), timeout) {
            Ok(response) => {
                debug!(
                    target: DISPOSAL_TARGET,
                    pid = self.pid(),
                    success = response.success,
                    "adapter acknowledged disconnect"
                );
                true
            }
            Err(error) => {
                warn!(
                    target: DISPOSAL_TARGET,
                    pid = self.pid(),
                    %error,
                    "disconnect handshake did not complete"
                );
                false
            }
        };

        if let Err(error) = self.process.kill() {
            warn!(target: DISPOSAL_TARGET, pid = self.pid(), %error, "failed to kill adapter");
        }
        info!(target: DISPOSAL_TARGET, pid = self.pid(), acknowledged, "adapter disposed");
        DisposeOutcome::Terminated { acknowledged }
    }
}
