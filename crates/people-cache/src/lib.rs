//! In-process implementation of [`people_core::cache::CacheLayer`].
//!
//! Entries live in a [`moka`] cache with a per-entry time-to-live. A side
//! index maps each tag to the keys stored under it so that
//! [`CacheLayer::invalidate`](people_core::cache::CacheLayer::invalidate) can
//! drop every entry carrying a tag.

mod memory;

pub use memory::{DEFAULT_CAPACITY, MemoryCache};
