//! Pending request correlation.
//!
//! Every command in flight owns one entry, keyed by its `requestId`. An
//! entry leaves the map exactly once: resolved by a capture reply, removed
//! by the task that finished it, or rejected when the bridge detaches.

// ============================================================================
// Imports
// ============================================================================

use std::time::{Duration, Instant};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tokio::sync::oneshot;
use tracing::debug;

use crate::error::{Error, Result};
use crate::identifiers::RequestId;

// ============================================================================
// Types
// ============================================================================

/// What a pending entry waits for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingKind {
    /// Script evaluation (also used by paste).
    Evaluation,
    /// Screenshot pipeline, resolved by a surface capture.
    Screenshot,
}

/// Reply delivered to a pending entry: a capture data URL or a rejection.
pub type PendingReply = Result<String>;

struct PendingEntry {
    kind: PendingKind,
    created_at: Instant,
    tx: oneshot::Sender<PendingReply>,
}

// ============================================================================
// PendingRequests
// ============================================================================

/// Map of in-flight requests.
#[derive(Default)]
pub struct PendingRequests {
    entries: Mutex<FxHashMap<RequestId, PendingEntry>>,
}

impl PendingRequests {
    /// Creates an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `request_id` and returns the receiver for its reply.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateRequest`] if the id is already in flight;
    /// the existing entry is left untouched.
    pub fn register(
        &self,
        request_id: RequestId,
        kind: PendingKind,
    ) -> Result<oneshot::Receiver<PendingReply>> {
        let mut entries = self.entries.lock();
        if entries.contains_key(&request_id) {
            return Err(Error::duplicate_request(request_id));
        }

        let (tx, rx) = oneshot::channel();
        entries.insert(
            request_id,
            PendingEntry {
                kind,
                created_at: Instant::now(),
                tx,
            },
        );
        Ok(rx)
    }

    /// Delivers a capture reply to a screenshot entry.
    ///
    /// Returns `false` if no screenshot entry has this id.
    pub fn resolve(&self, request_id: &RequestId, reply: PendingReply) -> bool {
        let entry = {
            let mut entries = self.entries.lock();
            match entries.get(request_id) {
                Some(entry) if entry.kind == PendingKind::Screenshot => entries.remove(request_id),
                _ => None,
            }
        };

        match entry {
            Some(entry) => {
                debug!(%request_id, elapsed_ms = entry.created_at.elapsed().as_millis() as u64, "Pending request resolved");
                let _ = entry.tx.send(reply);
                true
            }
            None => false,
        }
    }

    /// Removes an entry without replying.
    ///
    /// Returns `true` if the caller now owns the request's answer.
    pub fn remove(&self, request_id: &RequestId) -> bool {
        self.entries.lock().remove(request_id).is_some()
    }

    /// Rejects every entry with [`Error::ChannelDetached`].
    ///
    /// Returns the number of rejected entries.
    pub fn reject_all(&self, reason: &str) -> usize {
        let drained: Vec<_> = self.entries.lock().drain().collect();
        let count = drained.len();

        for (request_id, entry) in drained {
            debug!(%request_id, kind = ?entry.kind, "Pending request rejected");
            let _ = entry.tx.send(Err(Error::channel_detached(reason)));
        }

        count
    }

    /// Returns `true` if `request_id` is in flight.
    #[inline]
    #[must_use]
    pub fn contains(&self, request_id: &RequestId) -> bool {
        self.entries.lock().contains_key(request_id)
    }

    /// Returns the number of entries.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns `true` if nothing is in flight.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Returns the age of the oldest entry.
    #[must_use]
    pub fn oldest_age(&self) -> Option<Duration> {
        self.entries
            .lock()
            .values()
            .map(|entry| entry.created_at.elapsed())
            .max()
    }
}

// ============================================================================
// Tests
// ============================================================================
