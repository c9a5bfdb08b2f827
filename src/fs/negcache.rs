//! Per-user negative cache
//!
//! Remembers, for a short window, that a user just removed a name. An
//! atomic replace (`ln -sfn`) unlinks and then relinks; while the window
//! is open a lookup for the name reports "not found" instead of quietly
//! re-resolving the old target. Entries expire lazily: a lookup that finds
//! a stale entry evicts it.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use rustc_hash::{FxBuildHasher, FxHashMap};

use crate::identity::Uid;

/// Long enough to cover the gap between unlink and relink
pub const DEFAULT_NEGATIVE_TTL: Duration = Duration::from_millis(500);

/// Per-user names removed within the last TTL window
pub struct NegativeCache {
    users: DashMap<Uid, FxHashMap<String, Instant>, FxBuildHasher>,
    ttl: Duration,
}

impl NegativeCache {
    pub fn new(ttl: Duration) -> Self {
        NegativeCache {
            users: DashMap::with_hasher(FxBuildHasher::default()),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Record that `uid` removed `name` just now
    pub fn add(&self, uid: Uid, name: &str) {
        self.add_at(uid, name, Instant::now());
    }

    pub(crate) fn add_at(&self, uid: Uid, name: &str, at: Instant) {
        self.users.entry(uid).or_default().insert(name.to_string(), at);
    }

    /// Forget `name` for `uid`; absent entries are fine
    pub fn remove(&self, uid: Uid, name: &str) {
        if let Some(mut entries) = self.users.get_mut(&uid) {
            entries.remove(name);
        }
    }

    /// True while an entry for `(uid, name)` is younger than the TTL
    pub fn contains(&self, uid: Uid, name: &str) -> bool {
        self.contains_at(uid, name, Instant::now())
    }

    pub(crate) fn contains_at(&self, uid: Uid, name: &str, now: Instant) -> bool {
        let Some(mut entries) = self.users.get_mut(&uid) else {
            return false;
        };
        match entries.get(name) {
            Some(&added) if now.saturating_duration_since(added) < self.ttl => true,
            Some(_) => {
                entries.remove(name);
                false
            }
            None => false,
        }
    }

    /// Entries currently stored for `uid`, expired or not
    pub fn stored(&self, uid: Uid) -> usize {
        self.users.get(&uid).map(|entries| entries.len()).unwrap_or(0)
    }
}

impl Default for NegativeCache {
    fn default() -> Self {
        Self::new(DEFAULT_NEGATIVE_TTL)
    }
}
