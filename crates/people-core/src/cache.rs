//! The process-wide cache collaborator and the keys the repository uses.

use std::{future::Future, time::Duration};

use serde::{Serialize, de::DeserializeOwned};
use uuid::Uuid;

/// How long a cached person lives without explicit invalidation.
pub const PERSON_TTL: Duration = Duration::from_secs(30 * 60);

/// How long a cached monthly-active count lives.
pub const MONTHLY_ACTIVE_TTL: Duration = Duration::from_secs(6 * 60 * 60);

/// Cache key and tag for a single person.
pub fn person_key(id: Uuid) -> String { format!("person-{id}") }

/// Cache key and tag for an environment's monthly-active count.
pub fn monthly_active_key(environment_id: Uuid) -> String {
  format!("environment-{environment_id}-monthly-active-people")
}

/// A memoising cache keyed by opaque string parts and invalidated by tag.
///
/// Keys and tags are opaque. After `invalidate(tag)` returns, the next
/// `run_cached` call carrying that tag must recompute. Failed computations
/// are never stored.
pub trait CacheLayer: Send + Sync {
  fn run_cached<'a, T, E, F, Fut>(
    &'a self,
    key: &'a [String],
    ttl: Duration,
    tags: &'a [String],
    compute: F,
  ) -> impl Future<Output = Result<T, E>> + Send + 'a
  where
    T: Serialize + DeserializeOwned + Send + 'a,
    E: Send + 'a,
    F: FnOnce() -> Fut + Send + 'a,
    Fut: Future<Output = Result<T, E>> + Send + 'a;

  fn invalidate<'a>(&'a self, tag: &'a str) -> impl Future<Output = ()> + Send + 'a;
}
