//! Process-wide cache of identity lookups keyed by subject.
//!
//! An entry records the expiry of the access token whose verification filled
//! it. It is served only to a token expiring strictly later than that
//! horizon. A token expiring at or before it (the same token presented again,
//! or an older one replayed after rotation) evicts the entry and forces a
//! fresh lookup. Entries are evicted on the read path only.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::identity::Identity;

/// Default upper bound on cached subjects.
pub const DEFAULT_CACHE_CAPACITY: usize = 10_000;

#[derive(Debug, Clone)]
struct CacheEntry {
    identity: Identity,
    expires: u64,
}

#[derive(Debug)]
pub struct IdentityCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
    capacity: Option<NonZeroUsize>,
}

impl Default for IdentityCache {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CACHE_CAPACITY)
    }
}

impl IdentityCache {
    /// Cache with no size bound.
    pub fn unbounded() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            capacity: None,
        }
    }

    /// Cache holding at most `capacity` subjects. Zero means unbounded.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            capacity: NonZeroUsize::new(capacity),
        }
    }

    // Entries are plain snapshots, so a panic mid-update cannot leave one half-written.
    fn lock(&self) -> MutexGuard<'_, HashMap<String, CacheEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Cached identity for `subject`, if the entry was filled by a token
    /// expiring before `token_exp`. Any other entry is removed.
    pub fn get(&self, subject: &str, token_exp: u64) -> Option<Identity> {
        let mut entries = self.lock();
        let entry = entries.get(subject)?;
        if entry.expires < token_exp {
            return Some(entry.identity.clone());
        }
        entries.remove(subject);
        None
    }

    /// Store `identity` for `subject`, overwriting any existing entry.
    pub fn put(&self, subject: &str, identity: Identity, expires: u64) {
        let mut entries = self.lock();

        if let Some(capacity) = self.capacity {
            if !entries.contains_key(subject) && entries.len() >= capacity.get() {
                let oldest = entries
                    .iter()
                    .min_by_key(|(_, entry)| entry.expires)
                    .map(|(key, _)| key.clone());
                if let Some(key) = oldest {
                    entries.remove(&key);
                }
            }
        }

        entries.insert(subject.to_string(), CacheEntry { identity, expires });
    }

    pub fn invalidate(&self, subject: &str) {
        self.lock().remove(subject);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, subject: &str) -> bool {
        self.lock().contains_key(subject)
    }
}
