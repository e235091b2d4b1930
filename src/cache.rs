//! Caller-owned memoization of computed views.

use std::collections::HashMap;
use std::hash::Hash;

use chrono::{DateTime, TimeDelta, Utc};

use crate::analyzers::types::PeriodKey;

/// Default lifetime of a cached value.
pub const DEFAULT_TTL_HOURS: i64 = 24;

/// Identifies a computed view.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub location: String,
    pub period: PeriodKey,
    /// Preset or purpose name, empty for plain rollups.
    pub purpose: String,
}

impl CacheKey {
    pub fn new(location: &str, period: PeriodKey, purpose: &str) -> Self {
        Self {
            location: location.to_string(),
            period,
            purpose: purpose.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    stored_at: DateTime<Utc>,
}

/// Time-limited map. Expired entries are evicted when they are read; there
/// is no background sweep. Callers that share one cache across threads wrap
/// it in their own lock.
#[derive(Debug, Clone)]
pub struct MemoCache<K, V> {
    ttl: TimeDelta,
    entries: HashMap<K, CacheEntry<V>>,
}

impl<K: Eq + Hash, V: Clone> MemoCache<K, V> {
    pub fn new(ttl: TimeDelta) -> Self {
        Self {
            ttl,
            entries: HashMap::new(),
        }
    }

    pub fn ttl(&self) -> TimeDelta {
        self.ttl
    }

    /// Returns the value stored for `key` if it is still fresh at `now`.
    pub fn get(&mut self, key: &K, now: DateTime<Utc>) -> Option<V> {
        let fresh = self
            .entries
            .get(key)
            .map(|entry| now - entry.stored_at < self.ttl)?;
        if !fresh {
            self.entries.remove(key);
            return None;
        }
        self.entries.get(key).map(|entry| entry.value.clone())
    }

    pub fn insert(&mut self, key: K, value: V, now: DateTime<Utc>) {
        self.entries.insert(
            key,
            CacheEntry {
                value,
                stored_at: now,
            },
        );
    }

    /// Returns the fresh cached value, or computes, stores and returns a new
    /// one. Errors from `compute` are returned and nothing is stored.
    pub fn get_or_insert_with<E>(
        &mut self,
        key: K,
        now: DateTime<Utc>,
        compute: impl FnOnce() -> Result<V, E>,
    ) -> Result<V, E> {
        if let Some(value) = self.get(&key, now) {
            return Ok(value);
        }
        let value = compute()?;
        self.insert(key, value.clone(), now);
        Ok(value)
    }

    /// Number of stored entries, expired ones included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Eq + Hash, V: Clone> Default for MemoCache<K, V> {
    fn default() -> Self {
        Self::new(TimeDelta::hours(DEFAULT_TTL_HOURS))
    }
}
