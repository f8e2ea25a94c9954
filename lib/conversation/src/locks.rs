//! Per-conversation mutual exclusion.
//!
//! A turn holds its conversation's lock from the moment it reads the
//! conversation until its final save, so turns on the same conversation run
//! one after another while turns on different conversations run freely.

use parley_core::ConversationId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type LockMap = HashMap<ConversationId, Arc<AsyncMutex<()>>>;

/// Registry of per-conversation locks.
///
/// Entries are created on first use and removed when the last holder or
/// waiter lets go, so the registry only grows with in-flight conversations.
#[derive(Debug, Default)]
pub struct ConversationLocks {
    locks: Mutex<LockMap>,
}

impl ConversationLocks {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for exclusive access to a conversation.
    pub async fn acquire(&self, id: ConversationId) -> ConversationGuard<'_> {
        let lock = self.map().entry(id).or_default().clone();
        let guard = lock.lock_owned().await;

        ConversationGuard {
            registry: self,
            id,
            guard: Some(guard),
        }
    }

    /// Returns the number of conversations with a live lock entry.
    #[must_use]
    pub fn len(&self) -> usize {
        self.map().len()
    }

    /// Returns true if no conversation is locked or awaited.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map().is_empty()
    }

    fn map(&self) -> MutexGuard<'_, LockMap> {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Exclusive access to one conversation; released on drop.
#[derive(Debug)]
pub struct ConversationGuard<'a> {
    registry: &'a ConversationLocks,
    id: ConversationId,
    guard: Option<OwnedMutexGuard<()>>,
}

impl ConversationGuard<'_> {
    /// Returns the locked conversation's ID.
    #[must_use]
    pub fn id(&self) -> ConversationId {
        self.id
    }
}

impl Drop for ConversationGuard<'_> {
    fn drop(&mut self) {
        let Some(guard) = self.guard.take() else {
            return;
        };

        let mut map = self.registry.map();
        let lock = Arc::clone(OwnedMutexGuard::mutex(&guard));
        drop(guard);

        // One reference in the map, one in `lock`: nobody else is waiting.
        if Arc::strong_count(&lock) == 2 {
            map.remove(&self.id);
        }
    }
}
