//! Pending-call table for the request/response channel.
//!
//! Each outbound call gets a strictly increasing id and parks a one-shot
//! resolver under it. Inbound responses are matched back by id, in whatever
//! order they arrive. Every id is settled at most once; responses for ids
//! nobody is waiting on are logged and dropped.

use crate::error::CallError;
use dashmap::DashMap;
use hula_protocol::{Outcome, Response};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::oneshot;
use tracing::{debug, warn};

type Resolver = oneshot::Sender<Result<Value, CallError>>;

/// How an inbound response was applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    /// The matching call was resolved with a result.
    Resolved,
    /// The matching call was rejected with an error.
    Rejected,
    /// The response was malformed; the matching call was rejected.
    Violation,
    /// No call was waiting on this id.
    Unmatched,
}

/// A call awaiting its response.
#[derive(Debug)]
pub struct PendingCall {
    id: u64,
    rx: oneshot::Receiver<Result<Value, CallError>>,
}

impl PendingCall {
    /// The call id.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Wait for the response.
    ///
    /// # Errors
    ///
    /// Returns the remote error, or [`CallError::Disconnected`] if the table
    /// was dropped without settling this call.
    pub async fn wait(self) -> Result<Value, CallError> {
        self.rx.await.unwrap_or(Err(CallError::Disconnected))
    }
}

/// Outstanding calls of one client.
#[derive(Debug)]
pub struct PendingCalls {
    next_id: AtomicU64,
    calls: DashMap<u64, Resolver>,
}

impl PendingCalls {
    /// Create an empty table. Ids start at 1.
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            calls: DashMap::new(),
        }
    }

    /// Allocate an id and park a resolver under it.
    pub fn register(&self) -> PendingCall {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.calls.insert(id, tx);
        debug!(call = id, pending = self.calls.len(), "Registered pending call");
        PendingCall { id, rx }
    }

    /// Apply an inbound response to the call it belongs to.
    pub fn settle(&self, response: Response) -> Settlement {
        let id = response.id;
        let Some((_, resolver)) = self.calls.remove(&id) else {
            warn!(call = id, path = %response.path, "Unhandled response");
            return Settlement::Unmatched;
        };

        let (outcome, settlement) = match response.outcome() {
            Ok(Outcome::Result(value)) => (Ok(value), Settlement::Resolved),
            Ok(Outcome::Error { message, code }) => {
                (Err(CallError::Remote { message, code }), Settlement::Rejected)
            }
            Err(violation) => {
                warn!(call = id, violation, "Malformed response");
                (Err(CallError::Protocol(violation.to_string())), Settlement::Violation)
            }
        };

        if resolver.send(outcome).is_err() {
            debug!(call = id, "Caller stopped waiting before the response arrived");
        }
        settlement
    }

    /// Reject one call without a response, e.g. on timeout.
    pub fn reject(&self, id: u64, error: CallError) -> bool {
        match self.calls.remove(&id) {
            Some((_, resolver)) => {
                let _ = resolver.send(Err(error));
                true
            }
            None => false,
        }
    }

    /// Forget one call; its waiter sees [`CallError::Disconnected`].
    pub fn cancel(&self, id: u64) -> bool {
        self.calls.remove(&id).is_some()
    }

    /// Reject every outstanding call, returning how many there were.
    pub fn fail_all(&self, error: &CallError) -> usize {
        let ids: Vec<u64> = self.calls.iter().map(|entry| *entry.key()).collect();
        let failed = ids
            .into_iter()
            .filter(|id| self.reject(*id, error.clone()))
            .count();
        if failed > 0 {
            debug!(failed, error = %error, "Failed all pending calls");
        }
        failed
    }

    /// Whether a call is still outstanding.
    #[must_use]
    pub fn contains(&self, id: u64) -> bool {
        self.calls.contains_key(&id)
    }

    /// Number of outstanding calls.
    #[must_use]
    pub fn len(&self) -> usize {
        self.calls.len()
    }

    /// Whether no calls are outstanding.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }
}

impl Default for PendingCalls {
    fn default() -> Self {
        Self::new()
    }
}
