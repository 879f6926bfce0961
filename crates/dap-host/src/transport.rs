//! The public face of a debug adapter connection.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::time::Duration;

use serde_json::Value;
use tracing::debug;

use crate::config::LaunchSpec;
use crate::error::{RequestFailure, TransportError};
use crate::notify::{Notification, Notifier};
use crate::pending::{PendingRequests, ResponseCallback};
use crate::protocol::{Outbound, Request, Response, SequenceCounter};
use crate::router::Router;
use crate::settings::HostSettings;
use crate::supervisor::{AdapterProcess, SUPERVISOR_TARGET, Wiring};

/// A connection to one spawned debug adapter.
///
/// Outbound requests are written to the adapter's stdin and correlated with
/// their responses by sequence number. Events, reverse requests, decode
/// faults and the final `Disposed` notice reach subscribers through
/// [`std::sync::mpsc`] receivers.
///
/// # Example
///
/// ```ignore
/// use dap_host::{AdapterLaunch, DebugAdapterTransport, HostSettings, LaunchSpec};
///
/// let spec = LaunchSpec::new(AdapterLaunch::program("lldb-dap"), "/workspace");
/// let (transport, notifications) = DebugAdapterTransport::spawn(&spec, HostSettings::default())?;
/// let response = transport.request("initialize", None, std::time::Duration::from_secs(5))?;
/// transport.dispose();
/// ```
pub struct DebugAdapterTransport {
    pub(crate) process: AdapterProcess,
    pub(crate) pending: Arc<PendingRequests>,
    pub(crate) notifier: Arc<Notifier>,
    pub(crate) sequence: SequenceCounter,
    pub(crate) settings: HostSettings,
    pub(crate) disposing: AtomicBool,
}

impl DebugAdapterTransport {
    /// Spawns the adapter and starts routing its output.
    ///
    /// The returned receiver is subscribed before the process starts, so it
    /// observes every notification, including events emitted immediately
    /// on start-up.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::BinaryNotFound`] when the executable does
    /// not exist and [`TransportError::SpawnFailed`] for other start-up
    /// failures.
    pub fn spawn(
        spec: &LaunchSpec,
        settings: HostSettings,
    ) -> Result<(Self, Receiver<Notification>), TransportError> {
        let pending = Arc::new(PendingRequests::new());
        let notifier = Arc::new(Notifier::new());
        let notifications = notifier.subscribe();
        let wiring = Wiring {
            router: Router::new(Arc::clone(&pending), Arc::clone(&notifier)),
            pending: Arc::clone(&pending),
            notifier: Arc::clone(&notifier),
        };
        let process = AdapterProcess::spawn(spec, &settings, wiring)?;

        let transport = Self {
            process,
            pending,
            notifier,
            sequence: SequenceCounter::new(),
            settings,
            disposing: AtomicBool::new(false),
        };
        Ok((transport, notifications))
    }

    /// Adds a subscriber for notifications published from now on.
    #[must_use]
    pub fn subscribe(&self) -> Receiver<Notification> {
        self.notifier.subscribe()
    }

    /// Whether the adapter process is believed to be running.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.process.is_active()
    }

    /// OS process identifier of the adapter.
    #[must_use]
    pub const fn pid(&self) -> u32 {
        self.process.pid()
    }

    /// Number of requests still awaiting a response.
    #[must_use]
    pub fn pending_requests(&self) -> usize {
        self.pending.len()
    }

    /// Settings this transport was created with.
    #[must_use]
    pub const fn settings(&self) -> &HostSettings {
        &self.settings
    }

    /// Sends a request without waiting; `callback` receives the outcome.
    ///
    /// The callback runs on the transport's reader thread when the response
    /// arrives, or on the exit monitor thread with
    /// [`RequestFailure::ProcessExited`] if the adapter dies first. Returns
    /// the sequence number assigned to the request.
    ///
    /// Every call ends in exactly one of two ways: `Ok`, after which the
    /// callback runs once, or `Err`, in which case it never runs. If the
    /// adapter exits while the request is being written and the exit sweep
    /// has already handed the callback `ProcessExited`, the call returns
    /// `Ok`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Inactive`] if the adapter is not running,
    /// [`TransportError::Codec`] if the arguments cannot be encoded, and
    /// [`TransportError::Io`] if the write fails.
    pub fn send_request<F>(
        &self,
        command: &str,
        arguments: Option<Value>,
        callback: F,
    ) -> Result<i64, TransportError>
    where
        F: FnOnce(Result<Response, RequestFailure>) + Send + 'static,
    {
        let seq = self.sequence.next();
        let request = Request::new(seq, command, arguments);
        let payload = Outbound::Request(&request).to_vec()?;

        let boxed: ResponseCallback = Box::new(callback);
        self.pending.register(seq, boxed)?;
        // The exit sweep may already have run; never leave an entry behind it.
        if !self.process.is_active() {
            return self.withdraw(seq, TransportError::Inactive);
        }

        debug!(target: SUPERVISOR_TARGET, seq, command, "sending request");
        match self.process.send(&payload) {
            Ok(()) => Ok(seq),
            Err(error) => self.withdraw(seq, error),
        }
    }

    /// Takes back a registered request after a failed send.
    ///
    /// When the entry is already gone the exit sweep has delivered the
    /// callback's outcome, so the request counts as sent.
    fn withdraw(&self, seq: i64, error: TransportError) -> Result<i64, TransportError> {
        if self.pending.abandon(seq) {
            Err(error)
        } else {
            debug!(target: SUPERVISOR_TARGET, seq, %error, "request already failed by exit sweep");
            Ok(seq)
        }
    }

    /// Sends a request and blocks until its response or `timeout`.
    ///
    /// On timeout the pending entry is abandoned, so a late response is
    /// dropped.
    ///
    /// # Errors
    ///
    /// Returns the errors of [`send_request`](Self::send_request), plus
    /// [`TransportError::Request`] when the wait times out or the adapter
    /// exits before answering.
    pub fn request(
        &self,
        command: &str,
        arguments: Option<Value>,
        timeout: Duration,
    ) -> Result<Response, TransportError> {
        let (tx, rx) = mpsc::channel();
        let seq = self.send_request(command, arguments, move |outcome| {
            drop(tx.send(outcome));
        })?;

        let failure = match rx.recv_timeout(timeout) {
            Ok(Ok(response)) => return Ok(response),
            Ok(Err(failure)) => failure,
            Err(RecvTimeoutError::Timeout) => {
                self.pending.abandon(seq);
                RequestFailure::TimedOut {
                    timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                }
            }
            Err(RecvTimeoutError::Disconnected) => RequestFailure::ProcessExited,
        };
        Err(TransportError::Request {
            command: command.to_owned(),
            failure,
        })
    }

    /// Answers a reverse request received from the adapter.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Inactive`] if the adapter is not running and
    /// [`TransportError::Io`] if the write fails.
    pub fn respond(
        &self,
        request: &Request,
        outcome: Result<Option<Value>, String>,
    ) -> Result<(), TransportError> {
        let response = Response::reply_to(request, self.sequence.next(), outcome);
        let payload = Outbound::Response(&response).to_vec()?;
        debug!(
            target: SUPERVISOR_TARGET,
            request_seq = request.seq,
            command = %request.command,
            success = response.success,
            "answering reverse request"
        );
        self.process.send(&payload)
    }
}

impl std::fmt::Debug for DebugAdapterTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DebugAdapterTransport")
            .field("process", &self.process)
            .field("pending", &self.pending)
            .finish_non_exhaustive()
    }
}
