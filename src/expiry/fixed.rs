use std::time::Duration;

use super::ExpirationPolicy;
use crate::store::Entry;

/// Every entry expires a fixed time after it was written.
///
/// TTLs are kept at millisecond resolution; a non-zero TTL shorter than one
/// millisecond is rounded up to one.
///
/// Two values are special:
/// - a zero TTL disables the cache entirely;
/// - [`FixedTtl::NEVER`] (any TTL of `u64::MAX` ms or more) never expires.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FixedTtl {
    ttl_millis: u64,
}

impl FixedTtl {
    /// Entries never expire.
    pub const NEVER: FixedTtl = FixedTtl { ttl_millis: u64::MAX };

    /// The cache refuses all writes and misses on all reads.
    pub const DISABLED: FixedTtl = FixedTtl { ttl_millis: 0 };

    /// `Duration::ZERO` disables the cache; sub-millisecond TTLs round up.
    pub fn new(ttl: Duration) -> Self {
        let millis = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);
        FixedTtl {
            ttl_millis: if millis == 0 && !ttl.is_zero() { 1 } else { millis },
        }
    }

    /// Builds a policy from a signed millisecond count.
    ///
    /// `<= 0` disables the cache and `i64::MAX` never expires.
    pub fn from_millis(ttl_millis: i64) -> Self {
        match ttl_millis {
            i64::MAX => Self::NEVER,
            n if n <= 0 => Self::DISABLED,
            n => FixedTtl {
                ttl_millis: n as u64,
            },
        }
    }

    pub fn ttl(&self) -> Duration {
        if self.never_expires() {
            Duration::MAX
        } else {
            Duration::from_millis(self.ttl_millis)
        }
    }

    #[inline]
    pub fn never_expires(&self) -> bool {
        self.ttl_millis == u64::MAX
    }
}

impl<V> ExpirationPolicy<V> for FixedTtl {
    #[inline]
    fn is_enabled(&self) -> bool {
        self.ttl_millis > 0
    }

    #[inline]
    fn is_expired(&self, entry: &Entry<V>, now: u64) -> bool {
        if self.never_expires() {
            return false;
        }
        now.saturating_sub(entry.inserted_at()) >= self.ttl_millis
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn entry_at(t: u64) -> Entry<()> {
        Entry::new(Arc::new(()), t)
    }

    #[test]
    fn expires_exactly_at_ttl() {
        let p = FixedTtl::new(Duration::from_millis(100));
        let e = entry_at(1_000);
        assert!(!ExpirationPolicy::<()>::is_expired(&p, &e, 1_099));
        assert!(ExpirationPolicy::<()>::is_expired(&p, &e, 1_100));
    }

    #[test]
    fn never_does_not_expire() {
        let p = FixedTtl::NEVER;
        assert!(ExpirationPolicy::<()>::is_enabled(&p));
        assert!(!ExpirationPolicy::<()>::is_expired(&p, &entry_at(0), u64::MAX));
        assert_eq!(FixedTtl::from_millis(i64::MAX), FixedTtl::NEVER);
        assert_eq!(FixedTtl::new(Duration::MAX), FixedTtl::NEVER);
        assert_eq!(FixedTtl::NEVER.ttl(), Duration::MAX);
    }

    #[test]
    fn non_positive_ttl_disables() {
        for ms in [0, -1, i64::MIN] {
            let p = FixedTtl::from_millis(ms);
            assert!(!ExpirationPolicy::<()>::is_enabled(&p), "ttl {ms} should disable");
        }
        assert!(!ExpirationPolicy::<()>::is_enabled(&FixedTtl::new(Duration::ZERO)));
    }

    #[test]
    fn sub_millisecond_ttl_rounds_up() {
        let p = FixedTtl::new(Duration::from_micros(500));
        assert!(ExpirationPolicy::<()>::is_enabled(&p));
        assert_eq!(p.ttl(), Duration::from_millis(1));
        assert!(!ExpirationPolicy::<()>::is_expired(&p, &entry_at(10), 10));
        assert!(ExpirationPolicy::<()>::is_expired(&p, &entry_at(10), 11));
        assert_eq!(FixedTtl::new(Duration::from_nanos(1)), p);
    }

    #[test]
    fn absent_entry_is_stale() {
        let p = FixedTtl::from_millis(10);
        assert!(ExpirationPolicy::<()>::is_stale(&p, None, 0));
    }

    #[test]
    fn clock_going_backwards_does_not_expire() {
        let p = FixedTtl::from_millis(10);
        assert!(!ExpirationPolicy::<()>::is_expired(&p, &entry_at(500), 100));
    }
}
