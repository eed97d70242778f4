//! [`MemoryCache`] — tag-indexed TTL cache over `moka`.

use std::{
  collections::HashMap,
  future::Future,
  sync::{
    Arc, Mutex, MutexGuard, PoisonError,
    atomic::{AtomicU64, Ordering},
  },
  time::{Duration, Instant},
};

use moka::{Expiry, future::Cache};
use people_core::cache::CacheLayer;
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;

/// Default maximum number of live entries.
pub const DEFAULT_CAPACITY: u64 = 10_000;

// ─── Entries ─────────────────────────────────────────────────────────────────

#[derive(Clone)]
struct Entry {
  value:      Arc<Value>,
  ttl:        Duration,
  tags:       Arc<[String]>,
  /// Distinguishes this write from later writes to the same key, so evicting
  /// an old entry never unindexes its replacement.
  generation: u64,
}

struct PerEntryTtl;

impl Expiry<String, Entry> for PerEntryTtl {
  fn expire_after_create(
    &self,
    _key: &String,
    entry: &Entry,
    _created_at: Instant,
  ) -> Option<Duration> {
    Some(entry.ttl)
  }
}

/// tag → (key → generation of the entry indexed under that tag)
type TagIndex = HashMap<String, HashMap<String, u64>>;

/// Computations currently running under a tag, and how often the tag has been
/// invalidated while any of them ran.
#[derive(Default)]
struct InFlight {
  running: usize,
  epoch:   u64,
}

#[derive(Default)]
struct TagState {
  index:     TagIndex,
  in_flight: HashMap<String, InFlight>,
}

fn lock(state: &Mutex<TagState>) -> MutexGuard<'_, TagState> {
  state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Remove `key` from every tag of `entry`, unless a newer write re-indexed it.
fn unindex(state: &Mutex<TagState>, key: &str, entry: &Entry) {
  let mut state = lock(state);
  let index = &mut state.index;
  for tag in entry.tags.iter() {
    let now_empty = match index.get_mut(tag) {
      Some(keys) => {
        if keys.get(key) == Some(&entry.generation) {
          keys.remove(key);
        }
        keys.is_empty()
      }
      None => false,
    };
    if now_empty {
      index.remove(tag);
    }
  }
}

/// Registers a running computation under its tags. A result may only be
/// stored while [`is_current`](Self::is_current) holds, i.e. none of the tags
/// was invalidated since [`begin`](Self::begin).
struct Computation<'a> {
  state:  &'a Mutex<TagState>,
  tags:   &'a [String],
  epochs: Vec<u64>,
}

impl<'a> Computation<'a> {
  fn begin(state: &'a Mutex<TagState>, tags: &'a [String]) -> Self {
    let mut guard = lock(state);
    let epochs = tags
      .iter()
      .map(|tag| {
        let in_flight = guard.in_flight.entry(tag.clone()).or_default();
        in_flight.running += 1;
        in_flight.epoch
      })
      .collect();
    drop(guard);
    Self { state, tags, epochs }
  }

  fn is_current(&self, state: &TagState) -> bool {
    self.tags.iter().zip(&self.epochs).all(|(tag, epoch)| {
      state.in_flight.get(tag).map(|in_flight| in_flight.epoch) == Some(*epoch)
    })
  }
}

impl Drop for Computation<'_> {
  fn drop(&mut self) {
    let mut state = lock(self.state);
    for tag in self.tags {
      if let Some(in_flight) = state.in_flight.get_mut(tag) {
        in_flight.running -= 1;
        if in_flight.running == 0 {
          state.in_flight.remove(tag);
        }
      }
    }
  }
}

// ─── Cache ───────────────────────────────────────────────────────────────────

/// A process-wide cache shared by every repository that is handed a clone.
///
/// Cloning is cheap; clones share entries and the tag index.
#[derive(Clone)]
pub struct MemoryCache {
  entries:    Cache<String, Entry>,
  tags:       Arc<Mutex<TagState>>,
  generation: Arc<AtomicU64>,
}

impl MemoryCache {
  /// Create a cache holding at most `capacity` entries.
  pub fn new(capacity: u64) -> Self {
    let tags: Arc<Mutex<TagState>> = Arc::default();
    let listener_tags = Arc::clone(&tags);

    let entries = Cache::builder()
      .max_capacity(capacity)
      .expire_after(PerEntryTtl)
      .eviction_listener(move |key: Arc<String>, entry: Entry, _cause| {
        unindex(&listener_tags, &key, &entry);
      })
      .build();

    Self { entries, tags, generation: Arc::new(AtomicU64::new(0)) }
  }

  /// Number of tags with at least one indexed key.
  pub fn tag_count(&self) -> usize { lock(&self.tags).index.len() }

  /// Flush moka's pending maintenance (expiry, eviction notifications).
  pub async fn run_pending_tasks(&self) { self.entries.run_pending_tasks().await; }

  /// Store `value` unless one of the computation's tags was invalidated while
  /// it ran.
  async fn insert(
    &self,
    key: String,
    value: Value,
    ttl: Duration,
    computation: &Computation<'_>,
  ) {
    let generation = self.generation.fetch_add(1, Ordering::Relaxed);
    {
      let mut state = lock(&self.tags);
      if !computation.is_current(&state) {
        tracing::debug!(%key, "tag invalidated during compute, not caching");
        return;
      }
      for tag in computation.tags {
        state
          .index
          .entry(tag.clone())
          .or_default()
          .insert(key.clone(), generation);
      }
    }

    let entry = Entry {
      value: Arc::new(value),
      ttl,
      tags: computation.tags.into(),
      generation,
    };
    self.entries.insert(key.clone(), entry).await;

    // An invalidation between indexing and the insert above found nothing to
    // remove yet.
    let stale = !computation.is_current(&lock(&self.tags));
    if stale {
      self.entries.invalidate(&key).await;
    }
  }
}

impl Default for MemoryCache {
  fn default() -> Self { Self::new(DEFAULT_CAPACITY) }
}

/// Key parts are encoded as a JSON array, so `["a", "b"]` and `["a/b"]` never
/// collide.
fn encode_key(parts: &[String]) -> String { Value::from(parts.to_vec()).to_string() }

impl CacheLayer for MemoryCache {
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
    Fut: Future<Output = Result<T, E>> + Send + 'a,
  {
    async move {
      let key = encode_key(key);

      if let Some(entry) = self.entries.get(&key).await {
        match T::deserialize(entry.value.as_ref()) {
          Ok(value) => {
            tracing::trace!(%key, "cache hit");
            return Ok(value);
          }
          Err(error) => {
            tracing::warn!(%key, %error, "discarding undecodable cache entry");
          }
        }
      }

      let computation = Computation::begin(&self.tags, tags);
      let value = compute().await?;

      match serde_json::to_value(&value) {
        Ok(json) => self.insert(key, json, ttl, &computation).await,
        Err(error) => tracing::warn!(%key, %error, "result not cacheable"),
      }

      Ok(value)
    }
  }

  fn invalidate<'a>(&'a self, tag: &'a str) -> impl Future<Output = ()> + Send + 'a {
    async move {
      let keys: Vec<String> = {
        let mut state = lock(&self.tags);
        if let Some(in_flight) = state.in_flight.get_mut(tag) {
          in_flight.epoch += 1;
        }
        state
          .index
          .remove(tag)
          .map(|keys| keys.into_keys().collect())
          .unwrap_or_default()
      };

      tracing::debug!(tag, keys = keys.len(), "invalidating cache tag");
      for key in keys {
        self.entries.invalidate(&key).await;
      }
    }
  }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
  use std::{convert::Infallible, sync::atomic::AtomicUsize};

  use tokio::sync::oneshot;

  use super::*;

  fn parts(s: &str) -> Vec<String> { vec![s.to_owned()] }

  async fn counted(
    cache: &MemoryCache,
    key: &str,
    tags: &[String],
    ttl: Duration,
    calls: &AtomicUsize,
    value: u32,
  ) -> u32 {
    cache
      .run_cached(&parts(key), ttl, tags, move || async move {
        calls.fetch_add(1, Ordering::SeqCst);
        Ok::<_, Infallible>(value)
      })
      .await
      .unwrap()
  }

  #[tokio::test]
  async fn second_call_is_served_from_cache() {
    let cache = MemoryCache::default();
    let calls = AtomicUsize::new(0);
    let tags = parts("t");

    let a = counted(&cache, "k", &tags, Duration::from_secs(60), &calls, 1).await;
    let b = counted(&cache, "k", &tags, Duration::from_secs(60), &calls, 2).await;

    assert_eq!((a, b), (1, 1));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn invalidating_a_tag_forces_recompute() {
    let cache = MemoryCache::default();
    let calls = AtomicUsize::new(0);
    let ttl = Duration::from_secs(60);

    counted(&cache, "a", &parts("tag-a"), ttl, &calls, 1).await;
    counted(&cache, "b", &parts("tag-b"), ttl, &calls, 1).await;
    cache.invalidate("tag-a").await;

    assert_eq!(counted(&cache, "a", &parts("tag-a"), ttl, &calls, 2).await, 2);
    assert_eq!(counted(&cache, "b", &parts("tag-b"), ttl, &calls, 2).await, 1);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
  }

  #[tokio::test]
  async fn any_tag_of_an_entry_invalidates_it() {
    let cache = MemoryCache::default();
    let calls = AtomicUsize::new(0);
    let ttl = Duration::from_secs(60);
    let tags = vec!["x".to_owned(), "y".to_owned()];

    counted(&cache, "k", &tags, ttl, &calls, 1).await;
    cache.invalidate("y").await;
    cache.run_pending_tasks().await;

    assert_eq!(counted(&cache, "k", &tags, ttl, &calls, 2).await, 2);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
  }

  #[tokio::test]
  async fn invalidating_unknown_tag_is_a_no_op() {
    let cache = MemoryCache::default();
    cache.invalidate("never-used").await;
    assert_eq!(cache.tag_count(), 0);
  }

  #[tokio::test]
  async fn failures_are_not_cached() {
    let cache = MemoryCache::default();
    let key = parts("k");
    let ttl = Duration::from_secs(60);

    let first: Result<u32, &str> =
      cache.run_cached(&key, ttl, &key, || async { Err("boom") }).await;
    assert_eq!(first, Err("boom"));

    let second: Result<u32, &str> =
      cache.run_cached(&key, ttl, &key, || async { Ok(7) }).await;
    assert_eq!(second, Ok(7));
  }

  #[tokio::test]
  async fn entries_expire_after_their_ttl() {
    let cache = MemoryCache::default();
    let calls = AtomicUsize::new(0);
    let tags = parts("t");
    let ttl = Duration::from_millis(100);

    counted(&cache, "k", &tags, ttl, &calls, 1).await;
    tokio::time::sleep(Duration::from_millis(250)).await;

    assert_eq!(counted(&cache, "k", &tags, ttl, &calls, 2).await, 2);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
  }

  #[tokio::test]
  async fn expired_entries_leave_the_tag_index() {
    let cache = MemoryCache::default();
    let calls = AtomicUsize::new(0);

    counted(&cache, "k", &parts("t"), Duration::from_millis(50), &calls, 1).await;
    assert_eq!(cache.tag_count(), 1);

    // Expirations are processed on moka's one-second timer tick.
    tokio::time::sleep(Duration::from_millis(2_500)).await;
    cache.run_pending_tasks().await;
    assert_eq!(cache.tag_count(), 0);
  }

  #[tokio::test]
  async fn invalidation_during_compute_is_not_cached() {
    let cache = MemoryCache::default();
    let key = parts("person-1");
    let ttl = Duration::from_secs(60);
    let (started_tx, started_rx) = oneshot::channel::<()>();
    let (release_tx, release_rx) = oneshot::channel::<()>();

    let slow = cache.run_cached(&key, ttl, &key, move || async move {
      let _ = started_tx.send(());
      let _ = release_rx.await;
      Ok::<_, Infallible>(Some("old".to_owned()))
    });
    let writer = async {
      let _ = started_rx.await;
      cache.invalidate("person-1").await;
      let _ = release_tx.send(());
    };
    let (old, ()) = tokio::join!(slow, writer);
    assert_eq!(old.unwrap(), Some("old".to_owned()));

    let next: Result<Option<String>, Infallible> =
      cache.run_cached(&key, ttl, &key, || async { Ok(None) }).await;
    assert_eq!(next.unwrap(), None);
    assert!(lock(&cache.tags).in_flight.is_empty());
  }

  #[tokio::test]
  async fn unrelated_invalidation_during_compute_still_caches() {
    let cache = MemoryCache::default();
    let calls = AtomicUsize::new(0);
    let key = parts("person-1");
    let ttl = Duration::from_secs(60);
    let (started_tx, started_rx) = oneshot::channel::<()>();
    let (release_tx, release_rx) = oneshot::channel::<()>();

    let slow = cache.run_cached(&key, ttl, &key, move || async move {
      let _ = started_tx.send(());
      let _ = release_rx.await;
      Ok::<_, Infallible>(1_u32)
    });
    let writer = async {
      let _ = started_rx.await;
      cache.invalidate("person-2").await;
      let _ = release_tx.send(());
    };
    tokio::join!(slow, writer).0.unwrap();

    assert_eq!(counted(&cache, "person-1", &key, ttl, &calls, 2).await, 1);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
  }

  #[tokio::test]
  async fn failed_compute_releases_its_tags() {
    let cache = MemoryCache::default();
    let key = parts("k");

    let _: Result<u32, &str> = cache
      .run_cached(&key, Duration::from_secs(60), &key, || async { Err("boom") })
      .await;
    assert!(lock(&cache.tags).in_flight.is_empty());
  }

  #[test]
  fn key_parts_do_not_collide() {
    let joined = encode_key(&["a/b".to_owned()]);
    let split = encode_key(&["a".to_owned(), "b".to_owned()]);
    assert_ne!(joined, split);
  }
}
