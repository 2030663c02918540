//! Error types.
//!
//! Lookups fail with a single [`NotFound`] error that does not say *why* the
//! value is missing (cache disabled, key absent, or entry expired).  Writes
//! never fail with an error; they return `false` instead.

use std::io;
use thiserror::Error;

/// Returned by [`ObjectCache::get`](crate::ObjectCache::get) when the cache is
/// disabled, the key is absent, or the stored entry has expired.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq, Default)]
#[error("the data does not exist or has expired")]
pub struct NotFound;

/// Failure to start the periodic sweeper.
#[derive(Debug, Error)]
pub enum SweepError {
    /// A zero sweep period would spin the sweeper thread.
    #[error("sweep period must be greater than zero")]
    InvalidPeriod,
    /// The OS refused to spawn the background thread.
    #[error("failed to spawn sweeper thread: {0}")]
    Spawn(#[from] io::Error),
}
