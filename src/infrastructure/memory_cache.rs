//! In-process expiring cache.
//!
//! Provides concurrent, sharded storage for counters, flags and cached
//! resolutions, with per-entry expiry driven by the `Clock` port so tests
//! can move time explicitly.

use crate::application::ports::{Cache, CacheError, Clock};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Writes between two sweeps of expired entries.
pub const DEFAULT_PURGE_INTERVAL: u64 = 1024;

#[derive(Debug, Clone)]
enum Slot {
    Bytes(Vec<u8>),
    Counter(u64),
}

#[derive(Debug, Clone)]
struct CacheEntry {
    slot: Slot,
    /// `None` when the TTL reaches past what `Instant` can represent.
    expires_at: Option<Instant>,
}

impl CacheEntry {
    fn new(slot: Slot, now: Instant, ttl: Duration) -> Self {
        Self {
            slot,
            expires_at: now.checked_add(ttl),
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }

    /// Counters read back as their decimal text, the way a network cache
    /// returns them.
    fn to_bytes(&self) -> Vec<u8> {
        match &self.slot {
            Slot::Bytes(bytes) => bytes.clone(),
            Slot::Counter(n) => n.to_string().into_bytes(),
        }
    }

    fn counter_value(&self, key: &str) -> Result<u64, CacheError> {
        match &self.slot {
            Slot::Counter(n) => Ok(*n),
            Slot::Bytes(bytes) => std::str::from_utf8(bytes)
                .ok()
                .and_then(|text| text.parse().ok())
                .ok_or_else(|| CacheError::NotACounter(key.to_string())),
        }
    }
}

/// Thread-safe expiring cache backed by DashMap.
///
/// DashMap provides lock-free reads and fine-grained locking for writes.
/// `add` and `incr` hold the shard lock for the whole read-modify-write, so
/// both are atomic per key.
///
/// Expired entries are dropped when touched, and every `purge_interval`
/// writes the whole map is swept so keys that are never read again do not
/// accumulate.
pub struct MemoryCache {
    map: DashMap<String, CacheEntry, ahash::RandomState>,
    clock: Arc<dyn Clock>,
    purge_interval: u64,
    writes: AtomicU64,
}

impl MemoryCache {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_purge_interval(clock, DEFAULT_PURGE_INTERVAL)
    }

    /// Sweep expired entries every `purge_interval` writes. Zero disables
    /// the sweep.
    pub fn with_purge_interval(clock: Arc<dyn Clock>, purge_interval: u64) -> Self {
        Self {
            map: DashMap::with_hasher(ahash::RandomState::new()),
            clock,
            purge_interval,
            writes: AtomicU64::new(0),
        }
    }

    /// Drop every expired entry, returning how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let before = self.map.len();
        self.map.retain(|_, entry| !entry.is_expired(now));
        before.saturating_sub(self.map.len())
    }

    // Must run before any shard lock is taken: `retain` locks every shard.
    fn note_write(&self) {
        if self.purge_interval == 0 {
            return;
        }
        let writes = self.writes.fetch_add(1, Ordering::Relaxed) + 1;
        if writes % self.purge_interval == 0 {
            let purged = self.purge_expired();
            if purged > 0 {
                debug!(purged, remaining = self.map.len(), "Purged expired cache entries");
            }
        }
    }

    /// Number of entries, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn clear(&self) {
        self.map.clear();
    }
}

impl fmt::Debug for MemoryCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryCache")
            .field("entries", &self.map.len())
            .finish_non_exhaustive()
    }
}

impl Cache for MemoryCache {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let now = self.clock.now();
        if let Some(entry) = self.map.get(key) {
            if !entry.is_expired(now) {
                return Ok(Some(entry.to_bytes()));
            }
        } else {
            return Ok(None);
        }

        self.map.remove_if(key, |_, entry| entry.is_expired(now));
        Ok(None)
    }

    fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), CacheError> {
        self.note_write();
        let entry = CacheEntry::new(Slot::Bytes(value.to_vec()), self.clock.now(), ttl);
        self.map.insert(key.to_string(), entry);
        Ok(())
    }

    fn add(&self, key: &str, value: &[u8], ttl: Duration) -> Result<bool, CacheError> {
        self.note_write();
        let now = self.clock.now();
        let fresh = || CacheEntry::new(Slot::Bytes(value.to_vec()), now, ttl);

        match self.map.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if !occupied.get().is_expired(now) {
                    return Ok(false);
                }
                occupied.insert(fresh());
                Ok(true)
            }
            Entry::Vacant(vacant) => {
                vacant.insert(fresh());
                Ok(true)
            }
        }
    }

    fn incr(&self, key: &str, ttl: Duration) -> Result<u64, CacheError> {
        self.note_write();
        let now = self.clock.now();

        match self.map.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_expired(now) {
                    occupied.insert(CacheEntry::new(Slot::Counter(1), now, ttl));
                    return Ok(1);
                }
                let next = occupied.get().counter_value(key)?.saturating_add(1);
                occupied.get_mut().slot = Slot::Counter(next);
                Ok(next)
            }
            Entry::Vacant(vacant) => {
                vacant.insert(CacheEntry::new(Slot::Counter(1), now, ttl));
                Ok(1)
            }
        }
    }

    fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.map.remove(key);
        Ok(())
    }
}
