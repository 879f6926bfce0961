//! Debug Adapter Protocol message envelopes.
//!
//! Only the envelope is typed: `type`, `seq`, `request_seq` and the command
//! or event name. Arguments and bodies stay as opaque JSON values, and any
//! other top-level field is kept in `extra` so messages pass through intact.

use std::sync::atomic::{AtomicI64, Ordering};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Issues sequence numbers for outbound messages.
///
/// Numbers start at 1 and increase monotonically for the lifetime of one
/// transport.
#[derive(Debug)]
pub struct SequenceCounter(AtomicI64);

impl Default for SequenceCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl SequenceCounter {
    /// Creates a counter whose first value is 1.
    #[must_use]
    pub const fn new() -> Self {
        Self(AtomicI64::new(1))
    }

    /// Returns the next unused sequence number.
    pub fn next(&self) -> i64 {
        self.0.fetch_add(1, Ordering::SeqCst)
    }
}

/// Any message read from the adapter, classified by its `type` field.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProtocolMessage {
    /// A reverse request initiated by the adapter.
    Request(Request),
    /// A reply to one of our requests.
    Response(Response),
    /// An unsolicited notification.
    Event(Event),
    /// A message kind this host does not know about.
    #[serde(other)]
    Unknown,
}

impl ProtocolMessage {
    /// Decodes a message body.
    ///
    /// # Errors
    ///
    /// Returns the `serde_json` error when the body is not valid JSON or the
    /// envelope fields are missing.
    pub fn from_slice(body: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(body)
    }
}

/// A command request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// Sequence number of this request.
    pub seq: i64,
    /// Command name, e.g. `disconnect`.
    pub command: String,
    /// Command arguments.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Value>,
    /// Top-level fields outside the envelope.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Request {
    /// Builds a request with the given sequence number.
    #[must_use]
    pub fn new(seq: i64, command: impl Into<String>, arguments: Option<Value>) -> Self {
        Self {
            seq,
            command: command.into(),
            arguments,
            extra: Map::new(),
        }
    }
}

/// A reply correlated to a request through `request_seq`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// Sequence number of this response.
    pub seq: i64,
    /// Sequence number of the request being answered.
    pub request_seq: i64,
    /// Whether the request succeeded.
    #[serde(default)]
    pub success: bool,
    /// Command name echoed from the request.
    #[serde(default)]
    pub command: String,
    /// Error text when `success` is false.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Command-specific result.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    /// Top-level fields outside the envelope.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Response {
    /// Builds the reply to `request`.
    ///
    /// `Ok` carries the optional result body, `Err` the error message.
    #[must_use]
    pub fn reply_to(request: &Request, seq: i64, outcome: Result<Option<Value>, String>) -> Self {
        let (success, body, message) = match outcome {
            Ok(body) => (true, body, None),
            Err(message) => (false, None, Some(message)),
        };
        Self {
            seq,
            request_seq: request.seq,
            success,
            command: request.command.clone(),
            message,
            body,
            extra: Map::new(),
        }
    }
}

/// An event raised by the adapter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Sequence number of this event.
    #[serde(default)]
    pub seq: i64,
    /// Event name, e.g. `stopped`; absent if the adapter sent none.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
    /// Event payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    /// Top-level fields outside the envelope.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Messages this host writes to the adapter.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Outbound<'a> {
    /// A request we expect a response for.
    Request(&'a Request),
    /// Our reply to a reverse request.
    Response(&'a Response),
}

impl Outbound<'_> {
    /// Serialises the message body.
    ///
    /// # Errors
    ///
    /// Returns the `serde_json` error if an argument value fails to encode.
    pub fn to_vec(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}
