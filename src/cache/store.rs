//! In-memory per-source cache
//!
//! Each source key maps to an immutable [`Snapshot`] behind an `Arc`. Writers
//! build a complete snapshot and swap it into the map as a unit, so readers
//! hold either the previous snapshot or the new one, never a mix of the two.
//! Reads for different keys never contend, and reads of the same key only
//! wait for the swap itself, not for a fetch.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;

use crate::data::Record;

/// Records from one successful fetch and when that fetch completed
#[derive(Debug)]
pub struct Snapshot {
    pub records: Arc<Vec<Record>>,
    pub fetched_at: DateTime<Utc>,
}

/// Current state of one source key
///
/// Either empty, or holding both data and fetch time: the two are stored
/// together in one [`Snapshot`] so one cannot exist without the other.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub source_key: String,
    snapshot: Option<Arc<Snapshot>>,
}

impl CacheEntry {
    pub fn data(&self) -> Option<&Arc<Vec<Record>>> {
        self.snapshot.as_ref().map(|s| &s.records)
    }

    pub fn fetched_at(&self) -> Option<DateTime<Utc>> {
        self.snapshot.as_ref().map(|s| s.fetched_at)
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot.is_none()
    }

    /// Age of the entry at `now`; `None` when empty
    pub fn age(&self, now: DateTime<Utc>) -> Option<chrono::Duration> {
        self.fetched_at().map(|fetched_at| now - fetched_at)
    }

    /// Whether the entry is present and younger than `ttl` at `now`
    pub fn is_fresh(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        let Some(age) = self.age(now) else {
            return false;
        };
        match chrono::Duration::from_std(ttl) {
            Ok(ttl) => age < ttl,
            // A TTL too large for chrono never expires
            Err(_) => true,
        }
    }
}

/// Per-key summary for health reporting
#[derive(Debug, Clone, Serialize)]
pub struct CacheStatus {
    pub source_key: String,
    pub records: usize,
    pub fetched_at: DateTime<Utc>,
    pub age_seconds: i64,
}

/// Process-wide cache of the last good record list per source
#[derive(Debug, Default)]
pub struct CacheStore {
    entries: DashMap<String, Arc<Snapshot>>,
}

impl CacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current entry for `source_key` (possibly empty)
    pub fn get(&self, source_key: &str) -> CacheEntry {
        CacheEntry {
            source_key: source_key.to_string(),
            snapshot: self
                .entries
                .get(source_key)
                .map(|entry| Arc::clone(entry.value())),
        }
    }

    /// Replaces the entry for `source_key` with `records` fetched at `fetched_at`
    ///
    /// Writes are ordered by fetch time: if the stored entry comes from a later
    /// fetch than this one, it is kept and `false` is returned.
    pub fn put(&self, source_key: &str, records: Vec<Record>, fetched_at: DateTime<Utc>) -> bool {
        let snapshot = Arc::new(Snapshot {
            records: Arc::new(records),
            fetched_at,
        });

        match self.entries.entry(source_key.to_string()) {
            Entry::Occupied(existing) if existing.get().fetched_at > fetched_at => {
                tracing::debug!(
                    source = source_key,
                    "ignoring write from an older fetch"
                );
                false
            }
            Entry::Occupied(mut existing) => {
                existing.insert(snapshot);
                true
            }
            Entry::Vacant(slot) => {
                slot.insert(snapshot);
                true
            }
        }
    }

    /// True iff the entry exists and `now - fetched_at < ttl`
    pub fn is_valid(&self, source_key: &str, now: DateTime<Utc>, ttl: Duration) -> bool {
        self.get(source_key).is_fresh(now, ttl)
    }

    /// Summaries of every populated entry, sorted by key
    pub fn status(&self, now: DateTime<Utc>) -> Vec<CacheStatus> {
        let mut statuses: Vec<CacheStatus> = self
            .entries
            .iter()
            .map(|entry| CacheStatus {
                source_key: entry.key().clone(),
                records: entry.value().records.len(),
                fetched_at: entry.value().fetched_at,
                age_seconds: (now - entry.value().fetched_at).num_seconds(),
            })
            .collect();
        statuses.sort_by(|a, b| a.source_key.cmp(&b.source_key));
        statuses
    }
}
