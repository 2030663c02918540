use std::hash::Hash;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use crate::cache::ObjectCache;
use crate::clock::{Clock, SystemClock};
use crate::expiry::{ExpirationPolicy, FixedTtl, Predicate};

/// Builder for configuring and constructing an [`ObjectCache`].
///
/// Without an explicit policy the cache never expires its entries.
///
/// # Example
/// ```
/// use lapse::CacheBuilder;
/// use std::time::Duration;
///
/// let cache: lapse::ObjectCache<String, String> = CacheBuilder::new()
///     .name("sessions")
///     .time_to_live(Duration::from_secs(60))
///     .build();
/// assert_eq!(cache.name(), Some("sessions"));
/// ```
pub struct CacheBuilder<K, V> {
    policy: Box<dyn ExpirationPolicy<V>>,
    clock: Arc<dyn Clock>,
    name: Option<String>,
    _key: PhantomData<fn() -> K>,
}

impl<K: 'static, V: Send + Sync + 'static> CacheBuilder<K, V> {
    pub fn new() -> Self {
        CacheBuilder {
            policy: Box::new(FixedTtl::NEVER),
            clock: Arc::new(SystemClock),
            name: None,
            _key: PhantomData,
        }
    }

    /// Each entry expires `ttl` after it was written (or replaced).
    ///
    /// `Duration::ZERO` disables the cache; sub-millisecond TTLs round up
    /// to one millisecond.
    pub fn time_to_live(self, ttl: Duration) -> Self {
        self.policy(FixedTtl::new(ttl))
    }

    /// Entries never expire; they stay until removed or cleared.
    pub fn never_expire(self) -> Self {
        self.policy(FixedTtl::NEVER)
    }

    /// Entries expire once `timeout(value, inserted_at)` returns `true`.
    ///
    /// `inserted_at` is in milliseconds since the UNIX epoch.
    pub fn expire_when<F>(self, timeout: F) -> Self
    where
        F: Fn(&V, u64) -> bool + Send + Sync + 'static,
    {
        self.policy(Predicate::new(timeout))
    }

    /// Use any type that implements [`ExpirationPolicy`].
    pub fn policy<P: ExpirationPolicy<V>>(mut self, policy: P) -> Self {
        self.policy = Box::new(policy);
        self
    }

    /// Time source used to stamp and age entries (default: [`SystemClock`]).
    pub fn clock<C: Clock>(mut self, clock: C) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Name shown in log output.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

impl<K: 'static, V: Send + Sync + 'static> Default for CacheBuilder<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> CacheBuilder<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    pub fn build(self) -> ObjectCache<K, V> {
        ObjectCache::new(self.policy, self.clock, self.name)
    }
}
