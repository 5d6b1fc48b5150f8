//! Aggregate caching
//!
//! Computed aggregates are memoized under structured keys instead of
//! concatenated strings. There is no TTL: entries live until an explicit
//! force-update recompute, `invalidate`, or `clear`. Interleaved writers
//! follow last-write-wins; the cache is a convenience, not a consistency
//! store.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

/// Structured cache key: operation, optional subject entity, optional date
/// range, optional filter signature
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub op: &'static str,
    pub entity: Option<String>,
    pub range: Option<(i64, i64)>,
    pub filter: Option<String>,
}

impl CacheKey {
    pub fn op(op: &'static str) -> Self {
        Self {
            op,
            entity: None,
            range: None,
            filter: None,
        }
    }

    pub fn entity(op: &'static str, id: impl Into<String>) -> Self {
        Self {
            op,
            entity: Some(id.into()),
            range: None,
            filter: None,
        }
    }

    pub fn range(op: &'static str, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            op,
            entity: None,
            range: Some((start.timestamp(), end.timestamp())),
            filter: None,
        }
    }

    pub fn with_range(mut self, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        self.range = Some((start.timestamp(), end.timestamp()));
        self
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }
}

/// Single-owner cache of aggregate snapshots
#[derive(Debug, Default)]
pub struct AggregateCache<T> {
    entries: HashMap<CacheKey, T>,
}

impl<T: Clone> AggregateCache<T> {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    pub fn get(&self, key: &CacheKey) -> Option<&T> {
        self.entries.get(key)
    }

    pub fn insert(&mut self, key: CacheKey, value: T) {
        self.entries.insert(key, value);
    }

    pub fn invalidate(&mut self, key: &CacheKey) -> bool {
        self.entries.remove(key).is_some()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
