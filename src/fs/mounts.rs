//! Per-user mount cache
//!
//! The session-lifetime memo of `(uid, name) -> target`. Entries appear on
//! a successful resolution or an explicit link, and leave only through an
//! explicit unlink; nothing here expires.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use rustc_hash::{FxBuildHasher, FxHashMap};

use crate::identity::Uid;

#[derive(Clone, Debug, PartialEq, Eq)]
struct MountEntry {
    target: String,
    /// Global insertion sequence, for reports that list in attach order
    seq: u64,
}

/// One row of the full `(uid, name, target)` relation
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MountRecord {
    pub uid: Uid,
    pub name: String,
    pub target: String,
    pub seq: u64,
}

/// Per-user `name -> target` links, kept for the life of the mount
pub struct MountCache {
    users: DashMap<Uid, FxHashMap<String, MountEntry>, FxBuildHasher>,
    next_seq: AtomicU64,
}

impl MountCache {
    pub fn new() -> Self {
        MountCache {
            users: DashMap::with_hasher(FxBuildHasher::default()),
            next_seq: AtomicU64::new(0),
        }
    }

    pub fn get(&self, uid: Uid, name: &str) -> Option<String> {
        self.users
            .get(&uid)
            .and_then(|entries| entries.get(name).map(|e| e.target.clone()))
    }

    /// Store `name -> target` for `uid`, replacing any previous target
    pub fn put(&self, uid: Uid, name: &str, target: &str) {
        let mut entries = self.users.entry(uid).or_default();
        if let Some(existing) = entries.get(name) {
            if existing.target == target {
                return;
            }
        }
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        entries.insert(
            name.to_string(),
            MountEntry {
                target: target.to_string(),
                seq,
            },
        );
    }

    /// Drop `name` for `uid`, returning the target it pointed at
    pub fn remove(&self, uid: Uid, name: &str) -> Option<String> {
        self.users
            .get_mut(&uid)
            .and_then(|mut entries| entries.remove(name))
            .map(|e| e.target)
    }

    /// Names `uid` currently has mapped
    pub fn names_for(&self, uid: Uid) -> BTreeSet<String> {
        self.users
            .get(&uid)
            .map(|entries| entries.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Every mapping of every user
    pub fn all_entries(&self) -> Vec<MountRecord> {
        let mut out = Vec::new();
        for user in self.users.iter() {
            for (name, entry) in user.value() {
                out.push(MountRecord {
                    uid: *user.key(),
                    name: name.clone(),
                    target: entry.target.clone(),
                    seq: entry.seq,
                });
            }
        }
        out
    }

    /// Total number of mappings across users
    pub fn len(&self) -> usize {
        self.users.iter().map(|user| user.value().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MountCache {
    fn default() -> Self {
        Self::new()
    }
}
