pub mod guarded;

pub use guarded::{Entry, GuardedStore};
