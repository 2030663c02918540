//! Registry of caches subject to periodic sweeping.
//!
//! Caches expire entries lazily on `get`.  Entries that are never read again
//! would otherwise stay in memory forever, so a [`CacheRegistry`] keeps a set
//! of caches and sweeps all of them on demand ([`CacheRegistry::sweep_all`])
//! or on a background timer ([`CacheRegistry::start_periodic_sweep`]).
//!
//! # Example
//! ```
//! use lapse::CacheRegistry;
//! use std::time::Duration;
//!
//! let registry = CacheRegistry::new();
//! let users: lapse::ObjectCache<u64, String> = registry.fixed_ttl_cache(Duration::from_secs(300));
//! users.put(7, "ada".to_string());
//!
//! let sweeper = registry
//!     .start_periodic_sweep(Duration::from_secs(60), Duration::from_secs(60))
//!     .unwrap();
//! // ...
//! sweeper.stop();
//! ```

mod scheduler;

pub use scheduler::SweepHandle;

use std::hash::Hash;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use ahash::AHashMap;
use parking_lot::RwLock;

use crate::builder::CacheBuilder;
use crate::cache::ObjectCache;
use crate::error::SweepError;
use crate::fuzzy::FuzzyCache;

// ---------------------------------------------------------------------------
// Sweep trait
// ---------------------------------------------------------------------------

/// A cache the registry can sweep, with its key and value types erased.
pub trait Sweep: Send + Sync + 'static {
    /// Identity used to deduplicate registrations.
    fn cache_id(&self) -> u64;

    fn is_enabled(&self) -> bool;

    /// Removes expired entries; returns how many were removed.
    fn sweep(&self) -> usize;
}

impl<K, V> Sweep for ObjectCache<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    fn cache_id(&self) -> u64 {
        self.id()
    }

    fn is_enabled(&self) -> bool {
        ObjectCache::is_enabled(self)
    }

    fn sweep(&self) -> usize {
        ObjectCache::sweep(self)
    }
}

impl<V: Send + Sync + 'static> Sweep for FuzzyCache<V> {
    fn cache_id(&self) -> u64 {
        self.as_cache().id()
    }

    fn is_enabled(&self) -> bool {
        self.as_cache().is_enabled()
    }

    fn sweep(&self) -> usize {
        self.as_cache().sweep()
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

struct RegistryInner {
    caches: RwLock<AHashMap<u64, Arc<dyn Sweep>>>,
}

/// A set of caches that are swept together.
///
/// Cloning the handle is cheap; clones share the same set.  The registry
/// holds its caches strongly: a registered cache stays alive until it is
/// unregistered.
#[derive(Clone)]
pub struct CacheRegistry {
    inner: Arc<RegistryInner>,
}

impl CacheRegistry {
    pub fn new() -> Self {
        CacheRegistry {
            inner: Arc::new(RegistryInner {
                caches: RwLock::new(AHashMap::new()),
            }),
        }
    }

    /// A process-wide registry, created on first use.
    ///
    /// This is a deliberate singleton for hosts that want one shared sweeper
    /// without threading a registry through their code.  Nothing in this
    /// crate registers caches here implicitly, and no sweeper is started
    /// for it automatically.
    pub fn global() -> &'static CacheRegistry {
        static GLOBAL: OnceLock<CacheRegistry> = OnceLock::new();
        GLOBAL.get_or_init(CacheRegistry::new)
    }

    /// Adds `cache` to the set.  Returns `false` if it was already present.
    pub fn register<C: Sweep + Clone>(&self, cache: &C) -> bool {
        let id = cache.cache_id();
        let mut caches = self.inner.caches.write();
        if caches.contains_key(&id) {
            return false;
        }
        caches.insert(id, Arc::new(cache.clone()));
        log::debug!("registry: cache #{} registered", id);
        true
    }

    /// Removes `cache` from the set.  Returns `false` if it was not present.
    pub fn unregister<C: Sweep>(&self, cache: &C) -> bool {
        let id = cache.cache_id();
        let removed = self.inner.caches.write().remove(&id).is_some();
        if removed {
            log::debug!("registry: cache #{} unregistered", id);
        }
        removed
    }

    pub fn contains<C: Sweep>(&self, cache: &C) -> bool {
        self.inner.caches.read().contains_key(&cache.cache_id())
    }

    pub fn len(&self) -> usize {
        self.inner.caches.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.caches.read().is_empty()
    }

    /// Registers a caller-built cache and hands it back.
    pub fn track<C: Sweep + Clone>(&self, cache: C) -> C {
        self.register(&cache);
        cache
    }

    // -----------------------------------------------------------------------
    // Factories
    // -----------------------------------------------------------------------

    /// Builds a registered cache whose entries expire `ttl` after they are
    /// written.
    pub fn fixed_ttl_cache<K, V>(&self, ttl: Duration) -> ObjectCache<K, V>
    where
        K: Hash + Eq + Clone + Send + Sync + 'static,
        V: Send + Sync + 'static,
    {
        self.track(CacheBuilder::new().time_to_live(ttl).build())
    }

    /// Builds a registered cache whose entries expire once
    /// `timeout(value, inserted_at)` returns `true`.
    pub fn predicate_cache<K, V, F>(&self, timeout: F) -> ObjectCache<K, V>
    where
        K: Hash + Eq + Clone + Send + Sync + 'static,
        V: Send + Sync + 'static,
        F: Fn(&V, u64) -> bool + Send + Sync + 'static,
    {
        self.track(CacheBuilder::new().expire_when(timeout).build())
    }

    /// Builds a registered [`FuzzyCache`].
    pub fn fuzzy_cache<V: Send + Sync + 'static>(&self, ttl: Duration) -> FuzzyCache<V> {
        self.track(FuzzyCache::new(ttl))
    }

    // -----------------------------------------------------------------------
    // Sweeping
    // -----------------------------------------------------------------------

    /// Sweeps every registered, enabled cache once and returns the total
    /// number of entries removed.
    ///
    /// The set is snapshotted first, so registrations made during a sweep
    /// neither block nor are seen by it.  A cache whose sweep panics (e.g.
    /// a panicking expiry callback) is logged and skipped; the others are
    /// still swept.
    pub fn sweep_all(&self) -> usize {
        let caches: Vec<Arc<dyn Sweep>> = self.inner.caches.read().values().cloned().collect();
        let mut removed = 0;
        for cache in caches {
            if !cache.is_enabled() {
                continue;
            }
            match panic::catch_unwind(AssertUnwindSafe(|| cache.sweep())) {
                Ok(n) => removed += n,
                Err(_) => log::error!("registry: sweep of cache #{} panicked", cache.cache_id()),
            }
        }
        removed
    }

    /// Starts a background thread that calls [`sweep_all`](Self::sweep_all)
    /// first after `initial_delay`, then `period` after the start of each
    /// previous run.
    ///
    /// Nothing prevents starting several sweepers for the same registry;
    /// each would sweep independently.  The sweeper stops when the returned
    /// handle is stopped or dropped, unless it is
    /// [detached](SweepHandle::detach).
    pub fn start_periodic_sweep(
        &self,
        initial_delay: Duration,
        period: Duration,
    ) -> Result<SweepHandle, SweepError> {
        scheduler::spawn(self.clone(), initial_delay, period)
    }
}

impl Default for CacheRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CacheRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheRegistry")
            .field("caches", &self.len())
            .finish()
    }
}
