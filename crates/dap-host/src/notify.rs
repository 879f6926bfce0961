//! Fan-out of inbound traffic and lifecycle changes to subscribers.

use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Mutex, MutexGuard};

use crate::error::TransportFault;
use crate::protocol::{Event, Request};

/// How the adapter process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitReport {
    /// Exit code, absent when the process was killed by a signal or its
    /// status could not be collected.
    pub code: Option<i32>,
}

/// Something a subscriber is told about.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    /// The adapter sent a reverse request.
    Request(Request),
    /// The adapter raised an event.
    Event(Event),
    /// Inbound data could not be framed or decoded. The transport carries on.
    Error(TransportFault),
    /// The adapter process has exited. Sent once per transport.
    Disposed(ExitReport),
}

/// Broadcasts notifications to every live subscriber.
///
/// Subscribers whose receiver has been dropped are pruned on the next
/// publish.
#[derive(Debug, Default)]
pub struct Notifier {
    subscribers: Mutex<Vec<Sender<Notification>>>,
}

impl Notifier {
    /// Creates a hub with no subscribers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Sender<Notification>>> {
        self.subscribers
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
    }

    /// Adds a subscriber; it sees every notification published afterwards.
    #[must_use]
    pub fn subscribe(&self) -> Receiver<Notification> {
        let (tx, rx) = mpsc::channel();
        self.lock().push(tx);
        rx
    }

    /// Delivers `notification` to every subscriber, returning how many
    /// received it.
    pub fn publish(&self, notification: &Notification) -> usize {
        let mut subscribers = self.lock();
        subscribers.retain(|tx| tx.send(notification.clone()).is_ok());
        subscribers.len()
    }
}
