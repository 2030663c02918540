use std::borrow::Borrow;
use std::hash::Hash;
use std::sync::Arc;
use ahash::{AHashMap, RandomState};
use parking_lot::{Mutex, MutexGuard, RwLock};

// ---------------------------------------------------------------------------
// Entry
// ---------------------------------------------------------------------------

/// A stored value together with the time it was inserted.
///
/// Entries are immutable: replacing a value creates a new entry with a fresh
/// timestamp.
pub struct Entry<V> {
    value: Arc<V>,
    /// Milliseconds since the UNIX epoch, as reported by the cache's clock.
    inserted_at: u64,
}

impl<V> Entry<V> {
    pub fn new(value: Arc<V>, inserted_at: u64) -> Self {
        Entry { value, inserted_at }
    }

    #[inline]
    pub fn value(&self) -> &Arc<V> {
        &self.value
    }

    #[inline]
    pub fn inserted_at(&self) -> u64 {
        self.inserted_at
    }
}

impl<V> Clone for Entry<V> {
    fn clone(&self) -> Self {
        Entry {
            value: Arc::clone(&self.value),
            inserted_at: self.inserted_at,
        }
    }
}

impl<V: std::fmt::Debug> std::fmt::Debug for Entry<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Entry")
            .field("value", &self.value)
            .field("inserted_at", &self.inserted_at)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Shard
// ---------------------------------------------------------------------------

const NUM_SHARDS: usize = 16;

/// Cache-line padding to prevent false sharing between shards.
#[repr(align(64))]
struct Shard<K, V> {
    map: RwLock<AHashMap<K, Entry<V>>>,
}

// ---------------------------------------------------------------------------
// GuardedStore
// ---------------------------------------------------------------------------

/// Sharded key/entry map with a non-blocking write discipline.
///
/// Writers must win `write_guard` with `try_lock` (see [`try_write`]); a
/// writer that finds it held gives up instead of waiting.  Readers never
/// touch the guard.  Each shard lock is held for a single lookup or a single
/// mutation, so a read may land between two steps of a multi-key write such
/// as `put_all` or `clear` and never waits for the whole operation.
///
/// [`try_write`]: GuardedStore::try_write
pub struct GuardedStore<K, V> {
    shards: Box<[Shard<K, V>]>,
    /// Always `shards.len() - 1`; shards.len() is a power of two.
    shard_mask: usize,
    build_hasher: RandomState,
    write_guard: Mutex<()>,
}

impl<K: Hash + Eq, V> GuardedStore<K, V> {
    pub fn new() -> Self {
        let shards = (0..NUM_SHARDS)
            .map(|_| Shard {
                map: RwLock::new(AHashMap::new()),
            })
            .collect::<Vec<_>>()
            .into_boxed_slice();
        GuardedStore {
            shards,
            shard_mask: NUM_SHARDS - 1,
            build_hasher: RandomState::new(),
            write_guard: Mutex::new(()),
        }
    }

    #[inline]
    fn shard<Q: Hash + ?Sized>(&self, key: &Q) -> &RwLock<AHashMap<K, Entry<V>>> {
        let h = self.build_hasher.hash_one(key);
        &self.shards[((h >> 32) as usize) & self.shard_mask].map
    }

    /// Takes the write guard if no other writer holds it.
    ///
    /// Returns `None` on contention.  The guard is released when the
    /// returned writer is dropped.
    pub fn try_write(&self) -> Option<StoreWriter<'_, K, V>> {
        let guard = self.write_guard.try_lock()?;
        Some(StoreWriter {
            store: self,
            _guard: guard,
        })
    }

    /// Returns a copy of the entry for `key` without checking expiry.
    pub fn get<Q>(&self, key: &Q) -> Option<Entry<V>>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.shard(key).read().get(key).cloned()
    }

    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.shard(key).read().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.shards.iter().map(|s| s.map.read().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.shards.iter().all(|s| s.map.read().is_empty())
    }
}

impl<K: Hash + Eq + Clone, V> GuardedStore<K, V> {
    /// Snapshot of the keys whose entry satisfies `pred`.
    ///
    /// Shards are scanned one at a time; the result is not a consistent cut
    /// if writers are active.
    pub fn keys_where(&self, mut pred: impl FnMut(&K, &Entry<V>) -> bool) -> Vec<K> {
        let mut keys = Vec::new();
        for shard in self.shards.iter() {
            keys.extend(
                shard
                    .map
                    .read()
                    .iter()
                    .filter(|(k, e)| pred(k, e))
                    .map(|(k, _)| k.clone()),
            );
        }
        keys
    }

    /// Snapshot of every key currently held.
    pub fn keys(&self) -> Vec<K> {
        self.keys_where(|_, _| true)
    }
}

impl<K: Hash + Eq, V> Default for GuardedStore<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// StoreWriter
// ---------------------------------------------------------------------------

/// Exclusive write access to a [`GuardedStore`], obtained with
/// [`GuardedStore::try_write`].
pub struct StoreWriter<'a, K, V> {
    store: &'a GuardedStore<K, V>,
    _guard: MutexGuard<'a, ()>,
}

impl<K: Hash + Eq, V> StoreWriter<'_, K, V> {
    pub fn insert(&self, key: K, entry: Entry<V>) -> Option<Entry<V>> {
        self.store.shard(&key).write().insert(key, entry)
    }

    pub fn remove<Q>(&self, key: &Q) -> Option<Entry<V>>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.store.shard(key).write().remove(key)
    }

    /// Empties the shards one after another.
    pub fn clear(&self) {
        for shard in self.store.shards.iter() {
            shard.map.write().clear();
        }
    }
}
