//! Concurrent key/value map with per-entry expiry.

use std::hash::Hash;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;

/// Outcome of a cache read.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheEntry<T> {
    /// Cached value.
    Present(T),
    /// Cached as known not to exist.
    Absent,
    /// Nothing cached, or the entry expired.
    Unset,
}

impl<T> CacheEntry<T> {
    pub fn is_unset(&self) -> bool {
        matches!(self, CacheEntry::Unset)
    }

    /// `Present` as `Some`, everything else as `None`.
    pub fn into_option(self) -> Option<T> {
        match self {
            CacheEntry::Present(v) => Some(v),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
struct Slot<V> {
    value: Option<V>,
    expires_at: DateTime<Utc>,
}

/// TTL map. Expiry is enforced lazily on read; [`TtlMap::purge_expired`]
/// reclaims memory eagerly.
#[derive(Debug)]
pub struct TtlMap<K: Eq + Hash, V> {
    entries: DashMap<K, Slot<V>>,
    ttl: chrono::Duration,
}

impl<K: Eq + Hash, V: Clone> TtlMap<K, V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl: chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX),
        }
    }

    fn deadline(&self) -> DateTime<Utc> {
        Utc::now()
            .checked_add_signed(self.ttl)
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    pub fn get(&self, key: &K) -> CacheEntry<V> {
        let now = Utc::now();
        match self.entries.get(key) {
            Some(slot) if now < slot.expires_at => match &slot.value {
                Some(v) => CacheEntry::Present(v.clone()),
                None => CacheEntry::Absent,
            },
            Some(slot) => {
                drop(slot);
                self.entries.remove_if(key, |_, s| s.expires_at <= now);
                CacheEntry::Unset
            }
            None => CacheEntry::Unset,
        }
    }

    /// Cache `Some(value)` as present and `None` as known-absent.
    pub fn insert(&self, key: K, value: Option<V>) {
        let expires_at = self.deadline();
        self.entries.insert(key, Slot { value, expires_at });
    }

    /// Whether an entry, expired or not, is held for `key`.
    pub fn contains_key(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    pub fn remove(&self, key: &K) {
        self.entries.remove(key);
    }

    /// Drop every present entry whose value fails `keep`.
    pub fn retain_present(&self, mut keep: impl FnMut(&V) -> bool) {
        self.entries
            .retain(|_, slot| slot.value.as_ref().is_none_or(&mut keep));
    }

    /// Remove expired entries. Returns how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let before = self.entries.len();
        self.entries.retain(|_, slot| now < slot.expires_at);
        before.saturating_sub(self.entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_key_is_unset() {
        let map: TtlMap<u32, String> = TtlMap::new(Duration::from_secs(60));
        assert_eq!(map.get(&1), CacheEntry::Unset);
    }

    #[test]
    fn absent_is_distinct_from_unset() {
        let map: TtlMap<u32, String> = TtlMap::new(Duration::from_secs(60));
        map.insert(1, None);
        map.insert(2, Some("v".into()));
        assert_eq!(map.get(&1), CacheEntry::Absent);
        assert_eq!(map.get(&2), CacheEntry::Present("v".into()));
        map.remove(&2);
        assert_eq!(map.get(&2), CacheEntry::Unset);
    }

    #[test]
    fn expired_entry_reads_as_unset() {
        let map: TtlMap<u32, String> = TtlMap::new(Duration::ZERO);
        map.insert(1, Some("v".into()));
        assert_eq!(map.get(&1), CacheEntry::Unset);
        assert!(map.is_empty());
    }

    #[test]
    fn purge_drops_only_expired() {
        let stale: TtlMap<u32, u32> = TtlMap::new(Duration::ZERO);
        stale.insert(1, Some(1));
        stale.insert(2, None);
        assert_eq!(stale.purge_expired(), 2);

        let fresh: TtlMap<u32, u32> = TtlMap::new(Duration::from_secs(60));
        fresh.insert(1, Some(1));
        assert_eq!(fresh.purge_expired(), 0);
        assert_eq!(fresh.len(), 1);
    }

    #[test]
    fn retain_present_keeps_absent_entries() {
        let map: TtlMap<u32, u32> = TtlMap::new(Duration::from_secs(60));
        map.insert(1, Some(10));
        map.insert(2, Some(20));
        map.insert(3, None);
        map.retain_present(|v| *v != 10);
        assert_eq!(map.get(&1), CacheEntry::Unset);
        assert_eq!(map.get(&2), CacheEntry::Present(20));
        assert_eq!(map.get(&3), CacheEntry::Absent);
    }
}
