//! Error types for the debug adapter transport.
//!
//! I/O errors are wrapped in `Arc` so the enums stay cheap to clone and small
//! enough for the `result_large_err` lint.

use std::io;
use std::sync::Arc;

use thiserror::Error;

use crate::framing::FramingError;

/// Errors returned by transport operations.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// The adapter executable was not found.
    #[error("debug adapter executable not found: {command}")]
    BinaryNotFound {
        /// The command that was not found.
        command: String,
        /// The underlying I/O error.
        #[source]
        source: Arc<io::Error>,
    },

    /// Failed to spawn the adapter process.
    #[error("failed to spawn debug adapter: {message}")]
    SpawnFailed {
        /// Description of the spawn failure.
        message: String,
        /// The underlying I/O error.
        #[source]
        source: Arc<io::Error>,
    },

    /// Writing to the adapter failed.
    #[error("I/O error talking to debug adapter: {0}")]
    Io(#[source] Arc<io::Error>),

    /// A message could not be encoded.
    #[error("JSON codec error: {0}")]
    Codec(#[source] Arc<serde_json::Error>),

    /// A request with this sequence number is already outstanding.
    #[error("request sequence {seq} is already pending")]
    DuplicateSequence {
        /// The clashing sequence number.
        seq: i64,
    },

    /// The adapter process is no longer running.
    #[error("debug adapter is not running")]
    Inactive,

    /// The request did not complete.
    #[error("request {command} failed: {failure}")]
    Request {
        /// Command that was sent.
        command: String,
        /// Why no response was delivered.
        failure: RequestFailure,
    },
}

impl From<io::Error> for TransportError {
    fn from(error: io::Error) -> Self {
        Self::Io(Arc::new(error))
    }
}

impl From<serde_json::Error> for TransportError {
    fn from(error: serde_json::Error) -> Self {
        Self::Codec(Arc::new(error))
    }
}

/// Reasons a pending request ends without a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RequestFailure {
    /// The adapter process exited first.
    #[error("debug adapter exited before responding")]
    ProcessExited,

    /// No response arrived within the allotted time.
    #[error("timed out after {timeout_ms}ms")]
    TimedOut {
        /// The wait that elapsed, in milliseconds.
        timeout_ms: u64,
    },
}

/// Recoverable inbound faults, reported to subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportFault {
    /// The byte stream could not be framed.
    #[error("framing error: {0}")]
    Framing(#[from] FramingError),

    /// A framed body was not a valid protocol message.
    #[error("failed to decode message: {message}")]
    Decode {
        /// Decoder error text.
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    fn io_errors_convert_into_transport_errors() {
        let error: TransportError = io::Error::from(io::ErrorKind::BrokenPipe).into();

        assert!(matches!(error, TransportError::Io(_)));
    }

    #[rstest]
    fn request_errors_name_the_command() {
        let error = TransportError::Request {
            command: String::from("threads"),
            failure: RequestFailure::TimedOut { timeout_ms: 250 },
        };

        assert_eq!(error.to_string(), "request threads failed: timed out after 250ms");
    }

    #[rstest]
    fn framing_faults_wrap_framing_errors() {
        let fault = TransportFault::from(FramingError::MissingContentLength);

        assert_eq!(
            fault.to_string(),
            "framing error: header block has no Content-Length entry"
        );
    }
}
