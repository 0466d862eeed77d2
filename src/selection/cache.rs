use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use bon::Builder;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::Instant;
use tracing::debug;

use crate::media::{MediaKind, Platform};

/// One user-selectable download choice
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Builder)]
pub struct SelectionEntry {
    #[builder(into)]
    pub source_url: String,
    /// Opaque format id understood by the resolver
    #[builder(into)]
    pub format_id: String,
    pub media_kind: MediaKind,
    #[builder(into)]
    pub title: String,
    #[builder(into)]
    pub uploader: Option<String>,
    pub platform: Platform,
    /// Stamped by [`SelectionCache::put`]
    #[builder(skip = Utc::now())]
    pub created_at: DateTime<Utc>,
}

/// Counts from one sweep cycle
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepStats {
    pub expired: usize,
    pub evicted: usize,
}

struct Slot {
    entry: SelectionEntry,
    inserted: Instant,
    seq: u64,
}

#[derive(Default)]
struct Store {
    entries: HashMap<String, Slot>,
    /// Insertion order index: oldest first
    by_age: BTreeMap<(Instant, u64), String>,
    next_seq: u64,
}

impl Store {
    fn remove(&mut self, token: &str) -> Option<Slot> {
        let slot = self.entries.remove(token)?;
        self.by_age.remove(&(slot.inserted, slot.seq));
        Some(slot)
    }

    fn evict_over(&mut self, max_entries: usize) -> usize {
        let mut evicted = 0;
        while self.entries.len() > max_entries {
            let Some((_, token)) = self.by_age.pop_first() else {
                break;
            };
            self.entries.remove(&token);
            evicted += 1;
        }
        evicted
    }
}

/// Fixed-TTL, capacity-bounded store of pending selections
///
/// Two independent eviction triggers run under one lock:
/// - age: entries older than `ttl` are invisible to [`get`](Self::get) and
///   removed by [`sweep`](Self::sweep)
/// - capacity: once more than `max_entries` are stored, the oldest go first
///
/// Reads never refresh an entry and never remove it, so a token stays usable
/// any number of times until it ages out or is pushed out.
pub struct SelectionCache {
    ttl: Duration,
    max_entries: usize,
    store: Mutex<Store>,
}

impl SelectionCache {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        assert!(max_entries > 0, "max_entries must be positive");

        Self {
            ttl,
            max_entries,
            store: Mutex::new(Store::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Store> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert or overwrite `token`, stamping the entry with the current time.
    /// Returns how many older entries were evicted to stay within capacity.
    pub fn put(&self, token: impl Into<String>, mut entry: SelectionEntry) -> usize {
        let token = token.into();
        entry.created_at = Utc::now();

        let mut store = self.lock();
        store.remove(&token);

        let inserted = Instant::now();
        let seq = store.next_seq;
        store.next_seq += 1;

        store.by_age.insert((inserted, seq), token.clone());
        store.entries.insert(
            token,
            Slot {
                entry,
                inserted,
                seq,
            },
        );

        let evicted = store.evict_over(self.max_entries);
        if evicted > 0 {
            debug!(evicted, "Selection cache over capacity, dropped oldest");
        }
        evicted
    }

    /// Look up a live entry. Expired and unknown tokens look the same.
    pub fn get(&self, token: &str) -> Option<SelectionEntry> {
        let store = self.lock();
        let slot = store.entries.get(token)?;

        if slot.inserted.elapsed() > self.ttl {
            return None;
        }

        Some(slot.entry.clone())
    }

    /// Remove every entry older than the TTL, then enforce capacity
    pub fn sweep(&self) -> SweepStats {
        let mut store = self.lock();
        let mut expired = 0;

        while let Some((&(inserted, _), _)) = store.by_age.first_key_value() {
            if inserted.elapsed() <= self.ttl {
                break;
            }
            if let Some((_, token)) = store.by_age.pop_first() {
                store.entries.remove(&token);
                expired += 1;
            }
        }

        let evicted = store.evict_over(self.max_entries);

        SweepStats { expired, evicted }
    }

    /// Drop the oldest entries until at most `max_entries` remain
    pub fn enforce_capacity(&self) -> usize {
        self.lock().evict_over(self.max_entries)
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(30 * 60);

    fn entry(format_id: &str) -> SelectionEntry {
        SelectionEntry::builder()
            .source_url("https://youtu.be/abc")
            .format_id(format_id)
            .media_kind(MediaKind::Video)
            .title("Some clip")
            .uploader("someone")
            .platform(Platform::Youtube)
            .build()
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_expires_after_ttl() {
        let cache = SelectionCache::new(TTL, 1000);
        cache.put("tok1", entry("137"));

        tokio::time::advance(TTL - Duration::from_secs(1)).await;
        assert_eq!(cache.get("tok1").unwrap().format_id, "137");

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(cache.get("tok1").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_selection_after_31_minutes() {
        let cache = SelectionCache::new(TTL, 1000);
        cache.put("tok1", entry("22"));

        tokio::time::advance(Duration::from_secs(31 * 60)).await;
        assert!(cache.get("tok1").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reads_do_not_refresh_or_consume() {
        let cache = SelectionCache::new(TTL, 1000);
        cache.put("tok", entry("18"));

        for _ in 0..3 {
            tokio::time::advance(Duration::from_secs(9 * 60)).await;
            assert!(cache.get("tok").is_some());
        }

        // 27 minutes of reads did not extend the lifetime
        tokio::time::advance(Duration::from_secs(4 * 60)).await;
        assert!(cache.get("tok").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_removes_only_expired() {
        let cache = SelectionCache::new(TTL, 1000);
        cache.put("old", entry("1"));
        tokio::time::advance(Duration::from_secs(20 * 60)).await;
        cache.put("young", entry("2"));
        tokio::time::advance(Duration::from_secs(11 * 60)).await;

        let stats = cache.sweep();
        assert_eq!(stats, SweepStats { expired: 1, evicted: 0 });
        assert_eq!(cache.len(), 1);
        assert!(cache.get("young").is_some());
    }

    #[tokio::test]
    async fn test_capacity_evicts_oldest() {
        let cache = SelectionCache::new(TTL, 3);

        assert_eq!(cache.put("a", entry("1")), 0);
        cache.put("b", entry("2"));
        cache.put("c", entry("3"));
        assert_eq!(cache.put("d", entry("4")), 1);

        assert_eq!(cache.len(), 3);
        assert!(cache.get("a").is_none());
        for token in ["b", "c", "d"] {
            assert!(cache.get(token).is_some(), "{token} should survive");
        }
    }

    #[tokio::test]
    async fn test_overwrite_keeps_single_entry() {
        let cache = SelectionCache::new(TTL, 2);
        cache.put("a", entry("1"));
        cache.put("b", entry("2"));
        cache.put("a", entry("3"));

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("a").unwrap().format_id, "3");

        // "b" is now the oldest
        cache.put("c", entry("4"));
        assert!(cache.get("b").is_none());
        assert!(cache.get("a").is_some());
    }

    #[tokio::test]
    async fn test_put_stamps_creation_time() {
        let cache = SelectionCache::new(TTL, 10);
        let before = Utc::now();
        cache.put("a", entry("1"));

        assert!(cache.get("a").unwrap().created_at >= before);
    }

    #[tokio::test]
    async fn test_enforce_capacity_is_noop_within_bounds() {
        let cache = SelectionCache::new(TTL, 5);
        cache.put("a", entry("1"));
        assert_eq!(cache.enforce_capacity(), 0);
        assert_eq!(cache.len(), 1);
        assert!(cache.get("missing").is_none());
    }
}
