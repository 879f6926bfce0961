//! Debug adapter transport.
//!
//! The crate spawns a debug adapter process, speaks the Content-Length framed
//! JSON protocol over its standard streams, correlates responses with the
//! requests that caused them, and supervises the process through to a
//! graceful-then-forced shutdown. It is the plumbing beneath a debugger
//! front end: command semantics are left to the caller, and message bodies
//! are treated as opaque JSON.
//!
//! # Architecture
//!
//! - [`framing`]: turns the adapter's byte stream into message bodies.
//! - [`router`]: decodes bodies and dispatches them by message kind.
//! - [`pending`]: the outstanding request table.
//! - [`supervisor`]: spawns the adapter and runs its I/O threads.
//! - [`DebugAdapterTransport`]: send, subscribe, respond and dispose.
//!
//! # Example
//!
//! ```ignore
//! use dap_host::{AdapterLaunch, DebugAdapterTransport, HostSettings, LaunchSpec, Notification};
//!
//! let launch = AdapterLaunch::program("adapter.js").with_runtime("node", ["--nolazy"]);
//! let spec = LaunchSpec::new(launch, "/workspace");
//! let (transport, notifications) = DebugAdapterTransport::spawn(&spec, HostSettings::default())?;
//! transport.send_request("initialize", None, |outcome| println!("{outcome:?}"))?;
//! while let Ok(notification) = notifications.recv() {
//!     if matches!(notification, Notification::Disposed(_)) {
//!         break;
//!     }
//! }
//! ```

pub mod config;
mod disposal;
pub mod error;
pub mod framing;
pub mod notify;
pub mod pending;
pub mod protocol;
pub mod router;
pub mod settings;
pub mod supervisor;
pub mod telemetry;
mod transport;

#[cfg(test)]
mod tests;

pub use self::config::{AdapterLaunch, CommandLine, LaunchSpec};
pub use self::disposal::{DISCONNECT_COMMAND, DisposeOutcome};
pub use self::error::{RequestFailure, TransportError, TransportFault};
pub use self::framing::{FrameState, Framer, FramingError};
pub use self::notify::{ExitReport, Notification};
pub use self::protocol::{Event, ProtocolMessage, Request, Response};
pub use self::settings::{HostSettings, LogFormat};
pub use self::transport::DebugAdapterTransport;
