//! Dispatch of decoded adapter messages.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::TransportFault;
use crate::framing::FramingError;
use crate::notify::{Notification, Notifier};
use crate::pending::PendingRequests;
use crate::protocol::ProtocolMessage;

/// Log target for routing decisions.
const ROUTER_TARGET: &str = "dap_host::router";

/// What happened to a routed frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// A pending request received its response.
    Resolved,
    /// A response matched no pending request and was dropped.
    Unmatched,
    /// A reverse request was published.
    Request,
    /// An event was published.
    Event,
    /// The frame was empty or of an unknown kind.
    Ignored,
    /// The frame was malformed and reported as a transport error.
    Fault,
}

/// Routes framed bodies to pending callbacks or subscribers.
#[derive(Debug, Clone)]
pub struct Router {
    pending: Arc<PendingRequests>,
    notifier: Arc<Notifier>,
}

impl Router {
    /// Creates a router over the given table and hub.
    #[must_use]
    pub const fn new(pending: Arc<PendingRequests>, notifier: Arc<Notifier>) -> Self {
        Self { pending, notifier }
    }

    /// Routes one framer output, reporting framing faults.
    pub fn route_frame(&self, frame: Result<Vec<u8>, FramingError>) -> Disposition {
        match frame {
            Ok(body) => self.route(&body),
            Err(error) => {
                debug!(target: ROUTER_TARGET, %error, "publishing framing fault");
                self.fault(TransportFault::Framing(error))
            }
        }
    }

    /// Decodes `body` and hands it to exactly one consumer.
    pub fn route(&self, body: &[u8]) -> Disposition {
        if body.is_empty() {
            debug!(target: ROUTER_TARGET, "ignoring empty message body");
            return Disposition::Ignored;
        }

        let message = match ProtocolMessage::from_slice(body) {
            Ok(message) => message,
            Err(error) => {
                warn!(
                    target: ROUTER_TARGET,
                    %error,
                    body_bytes = body.len(),
                    "failed to decode adapter message"
                );
                return self.fault(TransportFault::Decode {
                    message: error.to_string(),
                });
            }
        };

        match message {
            ProtocolMessage::Response(response) => {
                if self.pending.resolve(response) {
                    Disposition::Resolved
                } else {
                    Disposition::Unmatched
                }
            }
            ProtocolMessage::Request(request) => {
                debug!(
                    target: ROUTER_TARGET,
                    seq = request.seq,
                    command = %request.command,
                    "received reverse request"
                );
                self.notifier.publish(&Notification::Request(request));
                Disposition::Request
            }
            ProtocolMessage::Event(event) => {
                debug!(
                    target: ROUTER_TARGET,
                    seq = event.seq,
                    event = ?event.event,
                    "received event"
                );
                self.notifier.publish(&Notification::Event(event));
                Disposition::Event
            }
            ProtocolMessage::Unknown => {
                debug!(target: ROUTER_TARGET, "ignoring message of unknown type");
                Disposition::Ignored
            }
        }
    }

    fn fault(&self, fault: TransportFault) -> Disposition {
        self.notifier.publish(&Notification::Error(fault));
        Disposition::Fault
    }
}
