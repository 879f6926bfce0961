//! Correlation of outstanding requests with their responses.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard};

use tracing::debug;

use crate::error::{RequestFailure, TransportError};
use crate::protocol::Response;

/// Log target for correlation events.
const PENDING_TARGET: &str = "dap_host::pending";

/// Callback invoked once with the outcome of a request.
pub type ResponseCallback = Box<dyn FnOnce(Result<Response, RequestFailure>) + Send + 'static>;

/// Table of requests awaiting a response, keyed by sequence number.
///
/// Every entry leaves the table exactly once: through [`resolve`],
/// [`abandon`] or [`fail_all`]. Callbacks run after the lock is released, so
/// a callback may register follow-up requests.
///
/// [`resolve`]: PendingRequests::resolve
/// [`abandon`]: PendingRequests::abandon
/// [`fail_all`]: PendingRequests::fail_all
#[derive(Default)]
pub struct PendingRequests {
    entries: Mutex<HashMap<i64, ResponseCallback>>,
}

impl PendingRequests {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<i64, ResponseCallback>> {
        // A panicking callback never holds the lock, so the map is intact.
        self.entries
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
    }

    /// Registers `callback` for `seq`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::DuplicateSequence`] if `seq` is already
    /// outstanding; the existing entry is left untouched.
    pub fn register(&self, seq: i64, callback: ResponseCallback) -> Result<(), TransportError> {
        let mut entries = self.lock();
        if entries.contains_key(&seq) {
            return Err(TransportError::DuplicateSequence { seq });
        }
        entries.insert(seq, callback);
        Ok(())
    }

    /// Delivers `response` to the entry named by its `request_seq`.
    ///
    /// Returns `false` when no entry matches; late or duplicate responses are
    /// dropped.
    pub fn resolve(&self, response: Response) -> bool {
        let callback = self.lock().remove(&response.request_seq);
        let Some(callback) = callback else {
            debug!(
                target: PENDING_TARGET,
                request_seq = response.request_seq,
                command = %response.command,
                "dropping response with no pending request"
            );
            return false;
        };
        callback(Ok(response));
        true
    }

    /// Removes the entry for `seq` without invoking it.
    pub fn abandon(&self, seq: i64) -> bool {
        self.lock().remove(&seq).is_some()
    }

    /// Fails every outstanding entry with `failure`.
    ///
    /// Returns the number of callbacks invoked.
    pub fn fail_all(&self, failure: RequestFailure) -> usize {
        let drained: Vec<(i64, ResponseCallback)> = self.lock().drain().collect();
        let count = drained.len();
        for (seq, callback) in drained {
            debug!(
                target: PENDING_TARGET,
                seq,
                %failure,
                "failing pending request"
            );
            callback(Err(failure));
        }
        count
    }

    /// Number of outstanding requests.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether no requests are outstanding.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Whether `seq` is outstanding.
    #[must_use]
    pub fn contains(&self, seq: i64) -> bool {
        self.lock().contains_key(&seq)
    }
}

impl fmt::Debug for PendingRequests {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut seqs: Vec<i64> = self.lock().keys().copied().collect();
        seqs.sort_unstable();
        f.debug_struct("PendingRequests")
            .field("outstanding", &seqs)
            .finish()
    }
}
