//! Read-through / write-through cache in front of the [`Store`].
//!
//! Key spaces: users by id, users by presented API token, pages by id, and a
//! denylist of revoked subjects. Id-keyed reads fall back to the store on miss
//! and cache the result, including "not found". Token-keyed reads never touch
//! the store.
//!
//! Every mutation path calls the matching `set_*` right after its store write
//! returns, on the same task. Id-keyed fills carry the version stamp seen
//! before the store read, token-keyed fills a generation; a fill whose stamp
//! moved on in the meantime is dropped instead of repopulating the entry with
//! the old value.

mod ttl;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::debug;

use crate::id::Snowflake;
use crate::models::{Page, User};
use crate::store::{Store, StoreResult, UserLookup};

pub use ttl::{CacheEntry, TtlMap};

/// Default entry lifetime.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(60 * 60);

/// Id-keyed map with versioned fills.
///
/// Writes stamp their key from a shared clock. Keys without a stamp read as
/// `floor`, which only moves forward when stamps are pruned.
struct ReadThrough<V> {
    map: TtlMap<Snowflake, V>,
    versions: DashMap<Snowflake, u64>,
    clock: AtomicU64,
    floor: AtomicU64,
}

impl<V: Clone> ReadThrough<V> {
    fn new(ttl: Duration) -> Self {
        Self {
            map: TtlMap::new(ttl),
            versions: DashMap::new(),
            clock: AtomicU64::new(0),
            floor: AtomicU64::new(0),
        }
    }

    fn ticket(&self, key: Snowflake) -> u64 {
        match self.versions.get(&key) {
            Some(version) => *version,
            None => self.floor.load(Ordering::SeqCst),
        }
    }

    /// Cache a store read unless a write landed since `ticket` was taken.
    fn fill(&self, key: Snowflake, ticket: u64, value: Option<V>) {
        // The entry guard is held across the insert so a concurrent `set`
        // cannot slip in between the check and the write.
        match self.versions.entry(key) {
            Entry::Occupied(version) => {
                if *version.get() == ticket {
                    self.map.insert(key, value);
                }
            }
            Entry::Vacant(_guard) => {
                if self.floor.load(Ordering::SeqCst) == ticket {
                    self.map.insert(key, value);
                }
            }
        }
    }

    /// `Some` overwrites, `None` drops the entry so the next read refetches.
    fn set(&self, key: Snowflake, value: Option<V>) {
        let mut version = self.versions.entry(key).or_insert(0);
        *version = self.clock.fetch_add(1, Ordering::SeqCst) + 1;
        match value {
            Some(v) => self.map.insert(key, Some(v)),
            None => self.map.remove(&key),
        }
    }

    /// Drop expired entries, then forget stamps no outstanding fill can need.
    ///
    /// A stamp is kept while its key is cached or while it is newer than the
    /// new floor. Pruned keys read as the floor, which is at least every
    /// pruned stamp, so tickets taken before a pruned write still mismatch.
    fn purge_expired(&self) -> usize {
        let purged = self.map.purge_expired();
        let floor = self.clock.load(Ordering::SeqCst);
        self.floor.fetch_max(floor, Ordering::SeqCst);
        self.versions
            .retain(|key, version| *version > floor || self.map.contains_key(key));
        purged
    }
}

pub struct Cache {
    store: Arc<dyn Store>,
    users: ReadThrough<User>,
    users_by_token: TtlMap<String, User>,
    /// Bumped by every token-keyed write; guards token-keyed fills.
    token_generation: Mutex<u64>,
    pages: ReadThrough<Page>,
    revoked: TtlMap<Snowflake, DateTime<Utc>>,
}

impl Cache {
    /// `ttl` applies to entity entries; `revocation_ttl` to the subject
    /// denylist and should match the access-token lifetime.
    pub fn new(store: Arc<dyn Store>, ttl: Duration, revocation_ttl: Duration) -> Self {
        Self {
            store,
            users: ReadThrough::new(ttl),
            users_by_token: TtlMap::new(ttl),
            token_generation: Mutex::new(0),
            pages: ReadThrough::new(ttl),
            revoked: TtlMap::new(revocation_ttl),
        }
    }

    pub async fn get_user_by_id(&self, id: Snowflake) -> StoreResult<Option<User>> {
        match self.users.map.get(&id) {
            CacheEntry::Present(user) => return Ok(Some(user)),
            CacheEntry::Absent => return Ok(None),
            CacheEntry::Unset => {}
        }
        let ticket = self.users.ticket(id);
        let user = self.store.get_user(UserLookup::Id(id)).await?;
        debug!(uid = %id, found = user.is_some(), "user cache miss");
        self.users.fill(id, ticket, user.clone());
        Ok(user)
    }

    /// Overwrite (or with `None`, drop) the cached user. Token-keyed entries
    /// for the same user are dropped as well.
    pub fn set_user_by_id(&self, id: Snowflake, user: Option<User>) {
        self.users.set(id, user);
        let mut generation = self.lock_token_generation();
        *generation += 1;
        self.users_by_token.retain_present(|u| u.uid != id);
    }

    /// Pure cache lookup.
    pub fn get_user_by_token(&self, token: &str) -> CacheEntry<User> {
        self.users_by_token.get(&token.to_string())
    }

    /// `None` marks the token as known invalid.
    pub fn set_user_by_token(&self, token: &str, user: Option<User>) {
        let mut generation = self.lock_token_generation();
        *generation += 1;
        self.users_by_token.insert(token.to_string(), user);
    }

    /// Generation to take before resolving a token against the store.
    pub fn user_token_ticket(&self) -> u64 {
        *self.lock_token_generation()
    }

    /// Cache a store resolution of `token` unless a token-keyed write or a
    /// user write landed since `ticket` was taken.
    pub fn fill_user_by_token(&self, token: &str, ticket: u64, user: Option<User>) {
        let generation = self.lock_token_generation();
        if *generation == ticket {
            self.users_by_token.insert(token.to_string(), user);
        } else {
            debug!("token fill discarded after concurrent write");
        }
    }

    fn lock_token_generation(&self) -> std::sync::MutexGuard<'_, u64> {
        self.token_generation
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub async fn get_page_by_id(&self, id: Snowflake) -> StoreResult<Option<Page>> {
        match self.pages.map.get(&id) {
            CacheEntry::Present(page) => return Ok(Some(page)),
            CacheEntry::Absent => return Ok(None),
            CacheEntry::Unset => {}
        }
        let ticket = self.pages.ticket(id);
        let page = self.store.get_page(id).await?;
        self.pages.fill(id, ticket, page.clone());
        Ok(page)
    }

    pub fn set_page_by_id(&self, id: Snowflake, page: Option<Page>) {
        self.pages.set(id, page);
    }

    /// Reject access tokens for `uid` issued before `at`.
    pub fn revoke_subject(&self, uid: Snowflake, at: DateTime<Utc>) {
        self.revoked.insert(uid, Some(at));
    }

    /// When the subject was last revoked, if still within the denylist TTL.
    pub fn revoked_since(&self, uid: Snowflake) -> Option<DateTime<Utc>> {
        self.revoked.get(&uid).into_option()
    }

    /// Eagerly drop expired entries from every key space.
    pub fn purge_expired(&self) -> usize {
        self.users.purge_expired()
            + self.users_by_token.purge_expired()
            + self.pages.purge_expired()
            + self.revoked.purge_expired()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::store::counting::CountingStore;

    fn setup() -> (Cache, CountingStore<MemoryStore>) {
        let store = CountingStore::new(MemoryStore::new());
        let cache = Cache::new(
            Arc::new(store.clone()),
            Duration::from_secs(60),
            Duration::from_secs(60),
        );
        (cache, store)
    }

    #[tokio::test]
    async fn unset_entry_falls_back_exactly_once() {
        let (cache, store) = setup();
        let user = User::new("alice", "h".into());
        store.create_user(&user).await.unwrap();

        cache.set_user_by_id(user.uid, None);
        store.reset();

        let first = cache.get_user_by_id(user.uid).await.unwrap().unwrap();
        assert_eq!(first.uid, user.uid);
        assert_eq!(store.calls("get_user"), 1);

        let second = cache.get_user_by_id(user.uid).await.unwrap().unwrap();
        assert_eq!(second, first);
        assert_eq!(store.calls("get_user"), 1);
    }

    #[tokio::test]
    async fn not_found_is_cached() {
        let (cache, store) = setup();
        let id = Snowflake::from_i64(42);
        assert!(cache.get_user_by_id(id).await.unwrap().is_none());
        assert!(cache.get_user_by_id(id).await.unwrap().is_none());
        assert_eq!(store.calls("get_user"), 1);
    }

    #[tokio::test]
    async fn edit_then_set_is_visible() {
        let (cache, store) = setup();
        let mut user = User::new("bob", "h".into());
        store.create_user(&user).await.unwrap();
        cache.get_user_by_id(user.uid).await.unwrap();

        user.display_name = "Robert".into();
        store.edit_user(&user).await.unwrap();
        cache.set_user_by_id(user.uid, Some(user.clone()));

        let seen = cache.get_user_by_id(user.uid).await.unwrap().unwrap();
        assert_eq!(seen.display_name, "Robert");
    }

    #[test]
    fn stale_fill_after_write_is_discarded() {
        let cache = ReadThrough::<u32>::new(Duration::from_secs(60));
        let id = Snowflake::from_i64(1);
        let ticket = cache.ticket(id);
        cache.set(id, Some(2));
        cache.fill(id, ticket, Some(1));
        assert_eq!(cache.map.get(&id), CacheEntry::Present(2));
    }

    #[test]
    fn stamps_are_pruned_once_entries_expire() {
        let cache = ReadThrough::<u32>::new(Duration::ZERO);
        for i in 0..100 {
            cache.set(Snowflake::from_i64(i), Some(1));
        }
        assert_eq!(cache.versions.len(), 100);
        cache.purge_expired();
        assert!(cache.versions.is_empty());
        assert!(cache.map.is_empty());
    }

    #[test]
    fn live_entries_keep_their_stamp() {
        let cache = ReadThrough::<u32>::new(Duration::from_secs(60));
        let id = Snowflake::from_i64(1);
        cache.set(id, Some(1));
        cache.purge_expired();
        assert_eq!(cache.versions.len(), 1);
        let ticket = cache.ticket(id);
        cache.fill(id, ticket, Some(5));
        assert_eq!(cache.map.get(&id), CacheEntry::Present(5));
    }

    #[test]
    fn stale_fill_is_discarded_after_pruning() {
        let cache = ReadThrough::<u32>::new(Duration::from_secs(60));
        let id = Snowflake::from_i64(1);
        let ticket = cache.ticket(id);
        cache.set(id, None);
        cache.purge_expired();
        assert!(cache.versions.is_empty());
        cache.fill(id, ticket, Some(1));
        assert_eq!(cache.map.get(&id), CacheEntry::Unset);

        // A read that started after the pruning fills normally.
        let ticket = cache.ticket(id);
        cache.fill(id, ticket, Some(2));
        assert_eq!(cache.map.get(&id), CacheEntry::Present(2));
    }

    #[tokio::test]
    async fn token_lookup_never_hits_store() {
        let (cache, store) = setup();
        assert!(cache.get_user_by_token("tok").is_unset());
        cache.set_user_by_token("tok", None);
        assert_eq!(cache.get_user_by_token("tok"), CacheEntry::Absent);
        assert_eq!(store.total_calls(), 0);
    }

    #[tokio::test]
    async fn user_write_drops_token_entries() {
        let (cache, _store) = setup();
        let user = User::new("carol", "h".into());
        cache.set_user_by_token("tok", Some(user.clone()));
        cache.set_user_by_id(user.uid, Some(user.clone()));
        assert!(cache.get_user_by_token("tok").is_unset());
    }

    #[tokio::test]
    async fn token_fill_after_invalidation_is_discarded() {
        let (cache, _store) = setup();
        let user = User::new("dana", "h".into());

        let ticket = cache.user_token_ticket();
        cache.set_user_by_token("tok", None);
        cache.fill_user_by_token("tok", ticket, Some(user.clone()));
        assert_eq!(cache.get_user_by_token("tok"), CacheEntry::Absent);

        let ticket = cache.user_token_ticket();
        cache.set_user_by_id(user.uid, None);
        cache.fill_user_by_token("other", ticket, Some(user.clone()));
        assert!(cache.get_user_by_token("other").is_unset());

        let ticket = cache.user_token_ticket();
        cache.fill_user_by_token("other", ticket, Some(user.clone()));
        assert_eq!(cache.get_user_by_token("other"), CacheEntry::Present(user));
    }

    #[tokio::test]
    async fn pages_read_through() {
        let (cache, store) = setup();
        let page = Page::new(Snowflake::from_i64(1), "notes".into(), serde_json::json!({}));
        store.create_page(&page).await.unwrap();
        assert_eq!(cache.get_page_by_id(page.uid).await.unwrap(), Some(page.clone()));
        assert_eq!(cache.get_page_by_id(page.uid).await.unwrap(), Some(page.clone()));
        assert_eq!(store.calls("get_page"), 1);

        store.delete_page(page.uid).await.unwrap();
        cache.set_page_by_id(page.uid, None);
        assert!(cache.get_page_by_id(page.uid).await.unwrap().is_none());
    }

    #[test]
    fn revoked_subjects_are_remembered() {
        let cache = Cache::new(
            Arc::new(MemoryStore::new()),
            Duration::from_secs(60),
            Duration::from_secs(60),
        );
        let uid = Snowflake::from_i64(9);
        assert!(cache.revoked_since(uid).is_none());
        let at = Utc::now();
        cache.revoke_subject(uid, at);
        assert_eq!(cache.revoked_since(uid), Some(at));
    }
}
