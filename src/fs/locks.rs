//! Per-key critical sections
//!
//! Serializes read-modify-write sequences on one `(uid, name)` pair while
//! leaving every other pair free to proceed. Each live key owns a mutex;
//! the slot is dropped again once nobody is using it, so names that are
//! looked up once and never again do not accumulate.

use std::sync::{Arc, Mutex, PoisonError};

use dashmap::DashMap;
use rustc_hash::FxBuildHasher;

use crate::identity::Uid;

type Key = (Uid, String);

/// One mutex per live `(uid, name)` key
#[derive(Default)]
pub struct KeyedLocks {
    slots: DashMap<Key, Arc<Mutex<()>>, FxBuildHasher>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` while holding the lock for `(uid, name)`
    pub fn with_key<R>(&self, uid: Uid, name: &str, f: impl FnOnce() -> R) -> R {
        let key = (uid, name.to_string());
        // Clone the slot out so the shard lock is released before we block
        let slot = self.slots.entry(key.clone()).or_default().clone();

        let result = {
            let _held = slot.lock().unwrap_or_else(PoisonError::into_inner);
            f()
        };

        drop(slot);
        // Only the map's reference left means nobody else is waiting
        self.slots.remove_if(&key, |_, slot| Arc::strong_count(slot) == 1);
        result
    }

    /// Number of keys currently in use
    pub fn active(&self) -> usize {
        self.slots.len()
    }
}
