//! Per-session exclusive locks.
//!
//! Every mutation of session-scoped state runs inside a guard from this map,
//! the in-process equivalent of `SELECT ... FOR UPDATE` on the session row.
//! Action recording, phase transitions and timer-driven transitions for one
//! session are thereby serialized; sessions never contend with each other.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::protocol::SessionId;

/// Guard proving exclusive access to one session's state.
pub type SessionGuard = OwnedMutexGuard<()>;

#[derive(Default)]
pub struct SessionLockMap {
    locks: DashMap<SessionId, Arc<Mutex<()>>>,
}

impl SessionLockMap {
    pub fn new() -> Self {
        Self {
            locks: DashMap::new(),
        }
    }

    /// Acquire the exclusive lock for a session, waiting if another task
    /// holds it.
    pub async fn acquire(&self, session_id: SessionId) -> SessionGuard {
        // Clone the Arc out of the shard before awaiting so the DashMap
        // shard guard is not held across the suspension point.
        let lock = self
            .locks
            .entry(session_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .value()
            .clone();
        lock.lock_owned().await
    }

    /// Drop the lock entry for a finished session. Outstanding guards remain
    /// valid; a later `acquire` simply creates a fresh entry.
    pub fn forget(&self, session_id: &SessionId) {
        self.locks.remove(session_id);
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.locks.len()
    }
}
