//! String-keyed cache with substring lookup.

use std::ops::Deref;
use std::sync::Arc;
use std::time::Duration;

use crate::builder::CacheBuilder;
use crate::cache::ObjectCache;

/// A cache keyed by `String` that can also be searched by key substring.
///
/// All single-key operations come from the underlying [`ObjectCache`], which
/// this type dereferences to.
///
/// ```
/// use lapse::FuzzyCache;
/// use std::time::Duration;
///
/// let cache: FuzzyCache<u32> = FuzzyCache::new(Duration::from_secs(30));
/// cache.put_all([("key1".to_string(), 1), ("Key2".to_string(), 2), ("other".to_string(), 3)]);
///
/// let hits = cache.get_fuzzy("KE").unwrap();
/// assert_eq!(hits.iter().map(|v| **v).collect::<Vec<_>>(), vec![2, 1]);
/// ```
pub struct FuzzyCache<V> {
    cache: ObjectCache<String, V>,
}

impl<V> Clone for FuzzyCache<V> {
    fn clone(&self) -> Self {
        FuzzyCache {
            cache: self.cache.clone(),
        }
    }
}

impl<V: Send + Sync + 'static> FuzzyCache<V> {
    /// Entries expire `ttl` after they are written; `Duration::ZERO`
    /// disables the cache.
    pub fn new(ttl: Duration) -> Self {
        CacheBuilder::<String, V>::new().time_to_live(ttl).build_fuzzy()
    }

    /// Values of every live key containing `pattern`, compared
    /// case-insensitively.
    ///
    /// Matching keys are fetched in sorted order.  Returns `None` if any
    /// matching key is absent or expired by the time it is fetched; callers
    /// should treat that as "try again later", not "no match".  A pattern that
    /// matches nothing yields an empty vector.
    pub fn get_fuzzy(&self, pattern: &str) -> Option<Vec<Arc<V>>> {
        let needle = pattern.to_uppercase();
        let mut keys = self
            .cache
            .keys_where(|k| k.to_uppercase().contains(needle.as_str()));
        keys.sort_unstable();
        self.cache.get_all(keys.iter().map(String::as_str))
    }

    /// The underlying cache handle.
    pub fn as_cache(&self) -> &ObjectCache<String, V> {
        &self.cache
    }
}

impl<V: Send + Sync + 'static> Default for FuzzyCache<V> {
    /// A disabled cache (zero TTL).
    fn default() -> Self {
        FuzzyCache::new(Duration::ZERO)
    }
}

impl<V> Deref for FuzzyCache<V> {
    type Target = ObjectCache<String, V>;

    fn deref(&self) -> &Self::Target {
        &self.cache
    }
}

impl<V> From<ObjectCache<String, V>> for FuzzyCache<V> {
    fn from(cache: ObjectCache<String, V>) -> Self {
        FuzzyCache { cache }
    }
}

impl<V: 'static> std::fmt::Debug for FuzzyCache<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("FuzzyCache").field(&self.cache).finish()
    }
}

impl<V: Send + Sync + 'static> CacheBuilder<String, V> {
    /// Builds a [`FuzzyCache`] instead of a plain [`ObjectCache`].
    pub fn build_fuzzy(self) -> FuzzyCache<V> {
        FuzzyCache { cache: self.build() }
    }
}
