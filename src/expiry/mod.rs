//! Expiration policies.
//!
//! A policy answers two questions for a cache: does it accept writes at all
//! ([`is_enabled`]), and is a given entry stale ([`is_expired`]).  Policies
//! are immutable once built.  Two are provided:
//!
//! - [`FixedTtl`]: every entry lives for the same duration.
//! - [`Predicate`]: a caller-supplied callback decides.
//!
//! Anything else can be plugged in by implementing [`ExpirationPolicy`] and
//! passing it to [`CacheBuilder::policy`](crate::CacheBuilder::policy).
//!
//! [`is_enabled`]: ExpirationPolicy::is_enabled
//! [`is_expired`]: ExpirationPolicy::is_expired

pub mod fixed;
pub mod predicate;

pub use fixed::FixedTtl;
pub use predicate::{FnTimeout, Predicate, TimeoutFn};

use crate::store::Entry;

/// Decides whether entries are stale and whether the cache is usable.
pub trait ExpirationPolicy<V>: Send + Sync + 'static {
    /// `false` turns the cache off: writes are refused and every read misses.
    fn is_enabled(&self) -> bool;

    /// Returns `true` if `entry` must no longer be served.
    ///
    /// `now` is the cache clock's current time in milliseconds since the
    /// UNIX epoch.
    fn is_expired(&self, entry: &Entry<V>, now: u64) -> bool;

    /// Like [`is_expired`](Self::is_expired), but an absent entry counts as
    /// expired.
    fn is_stale(&self, entry: Option<&Entry<V>>, now: u64) -> bool {
        match entry {
            Some(e) => self.is_expired(e, now),
            None => true,
        }
    }
}

impl<V, P> ExpirationPolicy<V> for Box<P>
where
    P: ExpirationPolicy<V> + ?Sized,
{
    fn is_enabled(&self) -> bool {
        (**self).is_enabled()
    }

    fn is_expired(&self, entry: &Entry<V>, now: u64) -> bool {
        (**self).is_expired(entry, now)
    }

    fn is_stale(&self, entry: Option<&Entry<V>>, now: u64) -> bool {
        (**self).is_stale(entry, now)
    }
}
