//! Session table (connection pool) implementation
//!
//! One mutex guards both the live handles and the close-sent set, so every
//! compound check-then-act below is atomic with respect to the dispatch path,
//! the forward tasks and shutdown. The lock is never held across an await.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rb_core::error::SessionError;
use rb_protocol::SessionId;

use super::Downstream;

/// Live downstream handles and close bookkeeping for one tunnel
pub struct SessionTable {
    inner: Mutex<TableInner>,
}

#[derive(Default)]
struct TableInner {
    /// Registered handles indexed by session ID
    handles: HashMap<SessionId, Arc<Downstream>>,
    /// Sessions for which a close has already been sent
    close_sent: HashSet<SessionId>,
}

/// Result of looking up the target of an inbound frame
#[derive(Debug)]
pub enum Lookup {
    /// A handle is registered for the session
    Active(Arc<Downstream>),
    /// No handle is registered
    Unknown {
        /// Whether the caller now owns sending the close for this id
        send_close: bool,
    },
}

impl SessionTable {
    /// Create a new empty table
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(TableInner::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, TableInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Get the handle registered for a session
    pub fn get(&self, id: SessionId) -> Option<Arc<Downstream>> {
        self.lock().handles.get(&id).map(Arc::clone)
    }

    /// Register a handle for a session.
    ///
    /// A second registration for a live id is rejected and the newer handle
    /// is closed. Registering clears a close-sent flag left behind by an
    /// earlier session with the same id.
    pub fn put(&self, id: SessionId, handle: Arc<Downstream>) -> Result<(), SessionError> {
        let mut inner = self.lock();
        if inner.handles.contains_key(&id) {
            drop(inner);
            tracing::warn!("Rejecting duplicate registration for {}", id);
            handle.close();
            return Err(SessionError::AlreadyExists(id));
        }

        inner.close_sent.remove(&id);
        inner.handles.insert(id, handle);
        Ok(())
    }

    /// Remove a session's handle, handing it to the caller to close
    pub fn delete(&self, id: SessionId) -> Option<Arc<Downstream>> {
        self.lock().handles.remove(&id)
    }

    /// Whether a close has already been sent for a session
    pub fn is_close_sent(&self, id: SessionId) -> bool {
        self.lock().close_sent.contains(&id)
    }

    /// Mark a session as closed; returns `true` if this call set the flag
    pub fn set_close_sent(&self, id: SessionId) -> bool {
        self.lock().close_sent.insert(id)
    }

    /// Look up the target of an inbound frame.
    ///
    /// For an unknown session that has not been closed yet, the close is
    /// claimed in the same critical section so that only one caller answers.
    pub fn resolve(&self, id: SessionId) -> Lookup {
        let mut inner = self.lock();
        match inner.handles.get(&id) {
            Some(handle) => Lookup::Active(Arc::clone(handle)),
            None => Lookup::Unknown {
                send_close: inner.close_sent.insert(id),
            },
        }
    }

    /// Remove `handle` if it is still the one registered for `id` and claim
    /// the close for it.
    ///
    /// Returns `true` if the caller should send the close. When the entry is
    /// gone or belongs to a newer session, whoever removed it already took
    /// care of the close.
    pub fn retire(&self, id: SessionId, handle: &Arc<Downstream>) -> bool {
        let mut inner = self.lock();
        let owned = inner
            .handles
            .get(&id)
            .is_some_and(|current| Arc::ptr_eq(current, handle));
        if !owned {
            return false;
        }

        inner.handles.remove(&id);
        inner.close_sent.insert(id)
    }

    /// Remote teardown: remove the handle and mark the session closed.
    ///
    /// Returns the removed handle and whether this call set the close flag.
    pub fn remove_and_mark(&self, id: SessionId) -> (Option<Arc<Downstream>>, bool) {
        let mut inner = self.lock();
        let handle = inner.handles.remove(&id);
        let first = inner.close_sent.insert(id);
        (handle, first)
    }

    /// Remove every handle (used on shutdown)
    pub fn drain(&self) -> Vec<(SessionId, Arc<Downstream>)> {
        self.lock().handles.drain().collect()
    }

    /// List registered session IDs
    pub fn ids(&self) -> Vec<SessionId> {
        self.lock().handles.keys().copied().collect()
    }

    /// Number of registered sessions
    pub fn len(&self) -> usize {
        self.lock().handles.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.lock().handles.is_empty()
    }
}

impl Default for SessionTable {
    fn default() -> Self {
        Self::new()
    }
}
