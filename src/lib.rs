//! In-process object cache with pluggable expiration.
//!
//! - [`ObjectCache`]: generic key/value cache.  Writes never block: a write
//!   that finds another write in progress is dropped and reported as `false`.
//! - [`expiry`]: the [`ExpirationPolicy`] seam plus the built-in
//!   [`FixedTtl`] and [`Predicate`] policies.
//! - [`FuzzyCache`]: string-keyed cache with case-insensitive substring lookup.
//! - [`CacheRegistry`]: a set of caches swept for expired entries, on demand
//!   or on a background timer.
//!
//! ```
//! use lapse::CacheRegistry;
//! use std::time::Duration;
//!
//! let registry = CacheRegistry::new();
//! let cache: lapse::ObjectCache<String, u64> = registry.fixed_ttl_cache(Duration::from_secs(1));
//!
//! let v = cache.get_or_insert_with("x".to_string(), |_| 42);
//! assert_eq!(*v, 42);
//! assert_eq!(*cache.get("x").unwrap(), 42);
//! ```

mod builder;
mod cache;
mod fuzzy;
mod registry;
mod store;
pub mod clock;
pub mod error;
pub mod expiry;

pub use builder::CacheBuilder;
pub use cache::ObjectCache;
pub use error::{NotFound, SweepError};
pub use expiry::{ExpirationPolicy, FixedTtl, Predicate};
pub use fuzzy::FuzzyCache;
pub use registry::{CacheRegistry, Sweep, SweepHandle};
pub use store::Entry;
