use std::sync::Arc;

use super::ExpirationPolicy;
use crate::store::Entry;

/// Caller-supplied staleness test.
///
/// Receives the stored value and its insertion time (milliseconds since the
/// UNIX epoch) and returns `true` once the value must no longer be served.
pub trait TimeoutFn<V>: Send + Sync + 'static {
    fn is_timeout(&self, value: &V, inserted_at: u64) -> bool;
}

/// A [`TimeoutFn`] backed by a closure.
///
/// Created via [`Predicate::new`].
pub struct FnTimeout<F>(pub F);

impl<V, F> TimeoutFn<V> for FnTimeout<F>
where
    F: Fn(&V, u64) -> bool + Send + Sync + 'static,
{
    #[inline]
    fn is_timeout(&self, value: &V, inserted_at: u64) -> bool {
        (self.0)(value, inserted_at)
    }
}

/// Expiration decided by an external callback.
///
/// A predicate without a callback ([`Predicate::disabled`]) disables the
/// cache, and treats every entry as expired.
///
/// ```
/// use lapse::expiry::Predicate;
/// use lapse::CacheBuilder;
///
/// // Values expire once they are older than the version they carry.
/// let cache: lapse::ObjectCache<&str, (u64, String)> = CacheBuilder::new()
///     .policy(Predicate::new(|v: &(u64, String), inserted_at| inserted_at < v.0))
///     .build();
/// assert!(cache.is_enabled());
/// ```
pub struct Predicate<V> {
    timeout: Option<Arc<dyn TimeoutFn<V>>>,
}

impl<V: 'static> Predicate<V> {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&V, u64) -> bool + Send + Sync + 'static,
    {
        Predicate {
            timeout: Some(Arc::new(FnTimeout(f))),
        }
    }

    /// Uses any type that implements the [`TimeoutFn`] trait.
    pub fn from_impl<T: TimeoutFn<V>>(t: T) -> Self {
        Predicate {
            timeout: Some(Arc::new(t)),
        }
    }

    pub fn disabled() -> Self {
        Predicate { timeout: None }
    }
}

impl<V> Clone for Predicate<V> {
    fn clone(&self) -> Self {
        Predicate {
            timeout: self.timeout.clone(),
        }
    }
}

impl<V> std::fmt::Debug for Predicate<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Predicate")
            .field("enabled", &self.timeout.is_some())
            .finish()
    }
}

impl<V: Send + Sync + 'static> ExpirationPolicy<V> for Predicate<V> {
    #[inline]
    fn is_enabled(&self) -> bool {
        self.timeout.is_some()
    }

    fn is_expired(&self, entry: &Entry<V>, _now: u64) -> bool {
        match &self.timeout {
            Some(t) => t.is_timeout(entry.value(), entry.inserted_at()),
            None => true,
        }
    }
}
