use std::borrow::Borrow;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::builder::CacheBuilder;
use crate::clock::Clock;
use crate::error::NotFound;
use crate::expiry::ExpirationPolicy;
use crate::store::{Entry, GuardedStore};

/// Source of process-unique cache ids.  The registry keys on these.
static NEXT_ID: AtomicU64 = AtomicU64::new(1);

// ---------------------------------------------------------------------------
// Cache interior
// ---------------------------------------------------------------------------

/// Shared interior of an [`ObjectCache`].
pub(crate) struct Inner<K, V> {
    pub(crate) id: u64,
    pub(crate) name: Option<String>,
    pub(crate) store: GuardedStore<K, V>,
    pub(crate) policy: Box<dyn ExpirationPolicy<V>>,
    pub(crate) clock: Arc<dyn Clock>,
}

// ---------------------------------------------------------------------------
// Cache handle
// ---------------------------------------------------------------------------

/// An in-memory key/value cache with pluggable expiration.
///
/// Writes are best-effort: [`put`], [`remove`], [`clear`] and [`put_all`]
/// try to take the cache's write guard and return `false` straight away if
/// another writer holds it.  Reads never take the guard, so they may observe
/// the cache between the steps of a concurrent multi-key write or sweep.
///
/// Cloning the handle is cheap; all clones see the same entries.
///
/// # Example
/// ```
/// use lapse::ObjectCache;
/// use std::time::Duration;
///
/// let cache: ObjectCache<String, u64> = ObjectCache::with_ttl(Duration::from_secs(60));
/// assert!(cache.put("answer".to_string(), 42));
/// assert_eq!(*cache.get("answer").unwrap(), 42);
///
/// let v = cache.get_or_insert_with("computed".to_string(), |k| k.len() as u64);
/// assert_eq!(*v, 8);
/// ```
///
/// [`put`]: ObjectCache::put
/// [`remove`]: ObjectCache::remove
/// [`clear`]: ObjectCache::clear
/// [`put_all`]: ObjectCache::put_all
pub struct ObjectCache<K, V> {
    inner: Arc<Inner<K, V>>,
}

impl<K, V> Clone for ObjectCache<K, V> {
    fn clone(&self) -> Self {
        ObjectCache {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K, V> ObjectCache<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    pub(crate) fn new(
        policy: Box<dyn ExpirationPolicy<V>>,
        clock: Arc<dyn Clock>,
        name: Option<String>,
    ) -> Self {
        ObjectCache {
            inner: Arc::new(Inner {
                id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
                name,
                store: GuardedStore::new(),
                policy,
                clock,
            }),
        }
    }

    /// Returns a [`CacheBuilder`] for constructing a new cache.
    pub fn builder() -> CacheBuilder<K, V> {
        CacheBuilder::new()
    }

    /// A cache whose entries expire `ttl` after they were written.
    ///
    /// `Duration::ZERO` yields a permanently disabled cache and
    /// `Duration::MAX` one that never expires.  The cache is not registered
    /// anywhere; see [`CacheRegistry`](crate::CacheRegistry) for sweeping.
    pub fn with_ttl(ttl: Duration) -> Self {
        CacheBuilder::new().time_to_live(ttl).build()
    }

    /// A cache whose entries expire when `timeout(value, inserted_at)`
    /// returns `true`.
    pub fn with_predicate<F>(timeout: F) -> Self
    where
        F: Fn(&V, u64) -> bool + Send + Sync + 'static,
    {
        CacheBuilder::new().expire_when(timeout).build()
    }

    #[inline]
    fn now(&self) -> u64 {
        self.inner.clock.now_millis()
    }

    // -----------------------------------------------------------------------
    // Writes
    // -----------------------------------------------------------------------

    /// Stores `value` under `key`, replacing any previous entry.
    ///
    /// Returns `false` without touching the cache if it is disabled or if
    /// another write is in progress.
    pub fn put(&self, key: K, value: V) -> bool {
        self.put_arc(key, Arc::new(value))
    }

    fn put_arc(&self, key: K, value: Arc<V>) -> bool {
        if !self.inner.policy.is_enabled() {
            return false;
        }
        let entry = Entry::new(value, self.now());
        match self.inner.store.try_write() {
            Some(writer) => {
                writer.insert(key, entry);
                log::debug!("cache {}: entry stored", self.label());
                true
            }
            None => {
                log::trace!("cache {}: put dropped, write guard contended", self.label());
                false
            }
        }
    }

    /// Stores every pair from `entries` under a single acquisition of the
    /// write guard.
    ///
    /// Either the whole batch is written or none of it: returns `false` if
    /// the cache is disabled or the guard is contended.  Readers are not held
    /// off while the batch goes in and may see part of it.
    pub fn put_all<I>(&self, entries: I) -> bool
    where
        I: IntoIterator<Item = (K, V)>,
    {
        if !self.inner.policy.is_enabled() {
            return false;
        }
        let now = self.now();
        let batch: Vec<(K, Entry<V>)> = entries
            .into_iter()
            .map(|(k, v)| (k, Entry::new(Arc::new(v), now)))
            .collect();
        let count = batch.len();
        match self.inner.store.try_write() {
            Some(writer) => {
                for (k, e) in batch {
                    writer.insert(k, e);
                }
                log::debug!("cache {}: {} entries stored", self.label(), count);
                true
            }
            None => {
                log::trace!("cache {}: put_all dropped, write guard contended", self.label());
                false
            }
        }
    }

    /// Removes `key` if present.
    ///
    /// Returns `true` when the write guard was acquired, whether or not the
    /// key existed; `false` on contention.
    pub fn remove<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        match self.inner.store.try_write() {
            Some(writer) => {
                writer.remove(key);
                true
            }
            None => false,
        }
    }

    /// Removes every entry.  Returns `false` on contention.
    pub fn clear(&self) -> bool {
        match self.inner.store.try_write() {
            Some(writer) => {
                writer.clear();
                true
            }
            None => false,
        }
    }

    /// Removes every entry the policy reports as expired and returns how many
    /// removals went through.
    ///
    /// The expired keys are collected first, then removed one by one.  Each
    /// removal competes for the write guard on its own; removals that lose
    /// are skipped and left for a later `get` or sweep.
    pub fn sweep(&self) -> usize {
        let now = self.now();
        let expired: Vec<K> = self
            .inner
            .store
            .keys()
            .into_iter()
            .filter(|key| {
                let entry = self.inner.store.get(key);
                self.inner.policy.is_stale(entry.as_ref(), now)
            })
            .collect();
        if expired.is_empty() {
            return 0;
        }
        log::debug!(
            "cache {}: {} entries timed out and will be removed",
            self.label(),
            expired.len()
        );

        let mut removed = 0;
        for key in &expired {
            if self.remove(key) {
                removed += 1;
            }
        }
        if removed < expired.len() {
            log::trace!(
                "cache {}: {} sweep removals skipped, write guard contended",
                self.label(),
                expired.len() - removed
            );
        }
        removed
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// Returns the live value for `key`.
    ///
    /// Fails with [`NotFound`] if the cache is disabled, the key is absent,
    /// or its entry has expired.  An expired entry is removed on the way out
    /// if the write guard happens to be free.
    pub fn get<Q>(&self, key: &Q) -> Result<Arc<V>, NotFound>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        if !self.inner.policy.is_enabled() {
            return Err(NotFound);
        }
        let entry = self.inner.store.get(key).ok_or(NotFound)?;
        if self.inner.policy.is_expired(&entry, self.now()) {
            let _ = self.remove(key);
            return Err(NotFound);
        }
        Ok(Arc::clone(entry.value()))
    }

    /// Returns the cached value for `key`, or computes it with `loader`,
    /// stores it, and returns it.
    ///
    /// The computed value is returned even if storing it lost a race with
    /// another writer.  Concurrent misses on the same key each run `loader`.
    pub fn get_or_insert_with<F>(&self, key: K, loader: F) -> Arc<V>
    where
        F: FnOnce(&K) -> V,
    {
        if let Ok(v) = self.get(&key) {
            return v;
        }
        let value = Arc::new(loader(&key));
        let _ = self.put_arc(key, Arc::clone(&value));
        value
    }

    /// Like [`get_or_insert_with`](Self::get_or_insert_with) for loaders
    /// that can fail.  Nothing is stored when `loader` returns an error.
    pub fn try_get_or_insert_with<F, E>(&self, key: K, loader: F) -> Result<Arc<V>, E>
    where
        F: FnOnce(&K) -> Result<V, E>,
    {
        if let Ok(v) = self.get(&key) {
            return Ok(v);
        }
        let value = Arc::new(loader(&key)?);
        let _ = self.put_arc(key, Arc::clone(&value));
        Ok(value)
    }

    /// Returns the values for `keys`, in request order, or `None` if any of
    /// them is absent or expired.
    ///
    /// `None` means "not all of it right now", not "nothing matched".
    pub fn get_all<'a, Q, I>(&self, keys: I) -> Option<Vec<Arc<V>>>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized + 'a,
        I: IntoIterator<Item = &'a Q>,
    {
        keys.into_iter().map(|k| self.get(k).ok()).collect()
    }

    // -----------------------------------------------------------------------
    // Introspection
    // -----------------------------------------------------------------------

    pub fn is_enabled(&self) -> bool {
        self.inner.policy.is_enabled()
    }

    /// Number of stored entries, including expired ones not yet removed.
    pub fn len(&self) -> usize {
        self.inner.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.store.is_empty()
    }

    /// Returns `true` if an entry is stored for `key`, expired or not.
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.inner.store.contains_key(key)
    }

    /// Snapshot of the stored keys, expired or not.
    pub(crate) fn keys_where(&self, mut pred: impl FnMut(&K) -> bool) -> Vec<K> {
        self.inner.store.keys_where(|k, _| pred(k))
    }
}

impl<K, V> ObjectCache<K, V> {
    /// Process-unique identifier of this cache (shared by all clones).
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn name(&self) -> Option<&str> {
        self.inner.name.as_deref()
    }

    fn label(&self) -> CacheLabel<'_> {
        CacheLabel {
            id: self.inner.id,
            name: self.inner.name.as_deref(),
        }
    }
}

impl<K, V: 'static> std::fmt::Debug for ObjectCache<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectCache")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("enabled", &self.inner.policy.is_enabled())
            .finish()
    }
}

/// `name#id` in log lines, or just `#id` for unnamed caches.
struct CacheLabel<'a> {
    id: u64,
    name: Option<&'a str>,
}

impl std::fmt::Display for CacheLabel<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.name {
            Some(name) => write!(f, "{}#{}", name, self.id),
            None => write!(f, "#{}", self.id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::expiry::FixedTtl;
    use std::sync::Barrier;
    use std::thread;

    fn ttl_cache(ttl_ms: i64, clock: &ManualClock) -> ObjectCache<String, u32> {
        CacheBuilder::new()
            .policy(FixedTtl::from_millis(ttl_ms))
            .clock(clock.clone())
            .build()
    }

    #[test]
    fn ids_are_unique_and_shared_by_clones() {
        let a: ObjectCache<u8, u8> = ObjectCache::with_ttl(Duration::from_secs(1));
        let b: ObjectCache<u8, u8> = ObjectCache::with_ttl(Duration::from_secs(1));
        assert_ne!(a.id(), b.id());
        assert_eq!(a.id(), a.clone().id());
    }

    #[test]
    fn get_removes_expired_entry() {
        let clock = ManualClock::new(0);
        let cache = ttl_cache(10, &clock);
        cache.put("k".to_string(), 1);
        clock.advance(Duration::from_millis(10));
        assert_eq!(cache.get("k"), Err(NotFound));
        assert!(!cache.contains_key("k"), "expired entry should be dropped by get");
    }

    #[test]
    fn sweep_counts_removals() {
        let clock = ManualClock::new(0);
        let cache = ttl_cache(100, &clock);
        cache.put("old".to_string(), 1);
        clock.advance(Duration::from_millis(60));
        cache.put("new".to_string(), 2);
        clock.advance(Duration::from_millis(40));
        assert_eq!(cache.sweep(), 1);
        assert!(cache.contains_key("new"));
        assert!(!cache.contains_key("old"));
    }

    #[test]
    fn sweep_skips_removals_while_a_writer_holds_the_guard() {
        let clock = ManualClock::new(0);
        let cache = ttl_cache(1, &clock);
        assert!(cache.put_all((0..10).map(|i| (i.to_string(), i))));
        clock.advance(Duration::from_millis(5));

        let writer = cache.inner.store.try_write().unwrap();
        let removed = cache.sweep();
        drop(writer);

        assert!(removed < 10, "contended removals are skipped, not retried");
        assert_eq!(removed, 0);
        assert_eq!(cache.len(), 10, "skipped keys stay stored");
        assert_eq!(cache.sweep(), 10, "a later sweep catches them");
        assert!(cache.is_empty());
    }

    #[test]
    fn reads_are_served_while_a_writer_holds_the_guard() {
        let clock = ManualClock::new(0);
        let cache = ttl_cache(100, &clock);
        cache.put("old".to_string(), 2);
        clock.advance(Duration::from_millis(60));
        cache.put("young".to_string(), 3);
        clock.advance(Duration::from_millis(40));

        let held = Arc::new(Barrier::new(2));
        let released = Arc::new(Barrier::new(2));
        let c = cache.clone();
        let (h, r) = (Arc::clone(&held), Arc::clone(&released));
        let holder = thread::spawn(move || {
            let _writer = c.inner.store.try_write().unwrap();
            h.wait();
            r.wait();
        });

        held.wait();
        // None of these may wait for the writer thread.
        assert_eq!(*cache.get("young").unwrap(), 3);
        assert_eq!(cache.get("old"), Err(NotFound));
        assert!(cache.contains_key("old"), "removal on get lost to the writer");
        assert_eq!(cache.sweep(), 0);
        assert!(!cache.put("x".to_string(), 9));
        released.wait();
        holder.join().unwrap();

        assert_eq!(cache.sweep(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn every_write_fails_fast_under_contention() {
        let clock = ManualClock::new(0);
        let cache = ttl_cache(1_000, &clock);
        cache.put("k".to_string(), 1);

        let writer = cache.inner.store.try_write().unwrap();
        let outcomes = [
            cache.put("x".to_string(), 2),
            cache.put_all([("y".to_string(), 3), ("z".to_string(), 4)]),
            cache.remove("k"),
            cache.clear(),
        ];
        drop(writer);

        assert_eq!(outcomes, [false, false, false, false]);
        assert_eq!(cache.len(), 1, "nothing from the losing writes was applied");
        assert!(cache.put("x".to_string(), 2), "guard is free again");
    }

    #[test]
    fn try_loader_error_stores_nothing() {
        let clock = ManualClock::new(0);
        let cache = ttl_cache(1_000, &clock);
        let r: Result<_, &str> = cache.try_get_or_insert_with("k".to_string(), |_| Err("boom"));
        assert_eq!(r.unwrap_err(), "boom");
        assert!(cache.is_empty());

        let r: Result<_, &str> = cache.try_get_or_insert_with("k".to_string(), |_| Ok(5));
        assert_eq!(*r.unwrap(), 5);
        assert_eq!(*cache.get("k").unwrap(), 5);
    }

    #[test]
    fn label_formats_name_and_id() {
        let named: ObjectCache<u8, u8> = CacheBuilder::new().name("users").build();
        assert_eq!(named.label().to_string(), format!("users#{}", named.id()));
        let anon: ObjectCache<u8, u8> = CacheBuilder::new().build();
        assert_eq!(anon.label().to_string(), format!("#{}", anon.id()));
    }
}
