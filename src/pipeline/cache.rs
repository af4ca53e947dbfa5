//! Process-wide TTL cache with single-flight fills.
//!
//! - One slot per key; concurrent callers on a cold key share one fetch
//! - Callers that joined a fill get its outcome, success or failure
//! - A slot expires `ttl` after its value was stored
//! - Failed fetches leave the slot empty, so the next caller retries
//! - Values are handed out as `Arc<V>` and never mutated

use dashmap::DashMap;
use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, info};

use crate::models::{Dataset, DatasetCategory};

/// Identity of a cached fetch: which fetch function, with which arguments.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FetchKey {
    /// Full API sweep, stamped with the as-of date it was fetched for
    ApiSweep { as_of: String },
    /// A category's snapshot file
    Snapshot(DatasetCategory),
}

/// Cache of normalized datasets shared by every consumer. Fill failures are
/// shared with waiting callers as their message.
pub type DatasetCache = TtlCache<FetchKey, Dataset, String>;

/// Outcome of one fill, published to the callers waiting on it.
type Outcome<V, E> = Option<Result<Arc<V>, E>>;

enum State<V, E> {
    Empty,
    Filling(watch::Receiver<Outcome<V, E>>),
    Filled { value: Arc<V>, stored_at: Instant },
}

struct Slot<V, E> {
    ttl: Duration,
    state: Mutex<State<V, E>>,
}

impl<V, E> Slot<V, E> {
    fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            state: Mutex::new(State::Empty),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State<V, E>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_expired(&self) -> bool {
        matches!(&*self.lock(), State::Filled { stored_at, .. } if stored_at.elapsed() >= self.ttl)
    }

    fn is_live(&self) -> bool {
        matches!(&*self.lock(), State::Filled { stored_at, .. } if stored_at.elapsed() < self.ttl)
    }
}

/// Resets a slot whose fill was abandoned mid-flight, so a waiter can take
/// the fill over.
struct FillGuard<'a, V, E> {
    slot: &'a Slot<V, E>,
    armed: bool,
}

impl<V, E> Drop for FillGuard<'_, V, E> {
    fn drop(&mut self) {
        if self.armed {
            *self.slot.lock() = State::Empty;
        }
    }
}

enum Claim<V, E> {
    Hit(Arc<V>),
    Wait(watch::Receiver<Outcome<V, E>>),
    Lead(Arc<Slot<V, E>>, watch::Sender<Outcome<V, E>>),
}

/// Keyed cache whose entries live for a fixed time after they are filled.
pub struct TtlCache<K, V, E> {
    slots: DashMap<K, Arc<Slot<V, E>>>,
    default_ttl: Duration,
    fills: AtomicU64,
    hits: AtomicU64,
}

impl<K, V, E> TtlCache<K, V, E>
where
    K: Eq + Hash + Clone + Debug,
    E: Clone,
{
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            slots: DashMap::new(),
            default_ttl,
            fills: AtomicU64::new(0),
            hits: AtomicU64::new(0),
        }
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Return the cached value for `key`, or run `fetch` to fill it.
    ///
    /// At most one `fetch` runs per key at a time. Callers arriving during a
    /// fill wait for it and receive its value or a clone of its error. An
    /// error is never stored: once the failed fill has been reported, the
    /// next caller fetches again.
    pub async fn get_or_fetch<F, Fut>(&self, key: K, ttl: Duration, fetch: F) -> Result<Arc<V>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        let (slot, tx) = loop {
            match self.claim(&key, ttl) {
                Claim::Hit(value) => {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    debug!(key = ?key, "Cache hit");
                    return Ok(value);
                }
                Claim::Wait(rx) => {
                    debug!(key = ?key, "Fill in flight, waiting");
                    if let Some(outcome) = wait_for_fill(rx).await {
                        if outcome.is_ok() {
                            self.hits.fetch_add(1, Ordering::Relaxed);
                        }
                        return outcome;
                    }
                    // The filling caller went away; claim again.
                }
                Claim::Lead(slot, tx) => break (slot, tx),
            }
        };

        let mut guard = FillGuard {
            slot: &*slot,
            armed: true,
        };

        debug!(key = ?key, "Cache miss, fetching");
        let outcome = fetch().await.map(Arc::new);

        *slot.lock() = match &outcome {
            Ok(value) => {
                self.fills.fetch_add(1, Ordering::Relaxed);
                State::Filled {
                    value: Arc::clone(value),
                    stored_at: Instant::now(),
                }
            }
            Err(_) => {
                debug!(key = ?key, "Fill failed, slot left empty");
                State::Empty
            }
        };
        guard.armed = false;

        tx.send_replace(Some(outcome.clone()));
        outcome
    }

    /// Decide this caller's role for `key`. Locks are released on return.
    fn claim(&self, key: &K, ttl: Duration) -> Claim<V, E> {
        let slot = self.slot(key, ttl);
        let mut state = slot.lock();
        let claim = match &*state {
            State::Filled { value, .. } => Claim::Hit(Arc::clone(value)),
            State::Filling(rx) => Claim::Wait(rx.clone()),
            State::Empty => {
                let (tx, rx) = watch::channel(None);
                *state = State::Filling(rx);
                Claim::Lead(Arc::clone(&slot), tx)
            }
        };
        drop(state);
        claim
    }

    /// Current slot for `key`, replacing it when expired. The map guard is
    /// released before any await.
    fn slot(&self, key: &K, ttl: Duration) -> Arc<Slot<V, E>> {
        let mut entry = self
            .slots
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Slot::new(ttl)));

        if entry.is_expired() {
            debug!(key = ?key, "Cache entry expired");
            *entry = Arc::new(Slot::new(ttl));
        }

        Arc::clone(entry.value())
    }

    /// Drop every key. Fills already in flight complete into detached slots.
    pub fn invalidate_all(&self) {
        let dropped = self.slots.len();
        self.slots.clear();
        info!(entries = dropped, "Cache invalidated");
    }

    /// Number of keys currently holding a live value.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_live()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            fills: self.fills.load(Ordering::Relaxed),
            hits: self.hits.load(Ordering::Relaxed),
            live_entries: self.len(),
        }
    }
}

/// Outcome of the fill behind `rx`; `None` when it was abandoned.
async fn wait_for_fill<V, E: Clone>(
    mut rx: watch::Receiver<Outcome<V, E>>,
) -> Outcome<V, E> {
    match rx.wait_for(Option::is_some).await {
        Ok(published) => (*published).clone(),
        Err(_) => None,
    }
}

/// Cache statistics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStats {
    pub fills: u64,
    pub hits: u64,
    pub live_entries: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counting_fetch(
        calls: &AtomicUsize,
        value: u32,
    ) -> impl Future<Output = Result<u32, String>> + '_ {
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok(value)
        }
    }

    #[tokio::test]
    async fn test_second_call_within_ttl_is_served_from_cache() {
        let cache: TtlCache<&str, u32, String> = TtlCache::new(Duration::from_secs(3600));
        let calls = AtomicUsize::new(0);
        let ttl = cache.default_ttl();

        let a = cache.get_or_fetch("k", ttl, || counting_fetch(&calls, 1)).await.unwrap();
        let b = cache.get_or_fetch("k", ttl, || counting_fetch(&calls, 2)).await.unwrap();

        assert_eq!((*a, *b), (1, 1));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.stats().hits, 1);
        assert_eq!(cache.stats().fills, 1);
    }

    #[tokio::test]
    async fn test_concurrent_cold_callers_share_one_fetch() {
        let cache: TtlCache<&str, u32, String> = TtlCache::new(Duration::from_secs(3600));
        let calls = AtomicUsize::new(0);
        let ttl = cache.default_ttl();

        let (a, b, c) = tokio::join!(
            cache.get_or_fetch("k", ttl, || counting_fetch(&calls, 1)),
            cache.get_or_fetch("k", ttl, || counting_fetch(&calls, 2)),
            cache.get_or_fetch("k", ttl, || counting_fetch(&calls, 3)),
        );

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(*a.unwrap(), *b.unwrap());
        assert_eq!(*c.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_expired_entry_is_refetched() {
        let cache: TtlCache<&str, u32, String> = TtlCache::new(Duration::from_millis(30));
        let calls = AtomicUsize::new(0);
        let ttl = cache.default_ttl();

        cache.get_or_fetch("k", ttl, || counting_fetch(&calls, 1)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;
        let v = cache.get_or_fetch("k", ttl, || counting_fetch(&calls, 2)).await.unwrap();

        assert_eq!(*v, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_errors_are_not_cached() {
        let cache: TtlCache<&str, u32, String> = TtlCache::new(Duration::from_secs(3600));
        let ttl = cache.default_ttl();

        let err = cache
            .get_or_fetch("k", ttl, || async { Err::<u32, _>("down".to_string()) })
            .await
            .unwrap_err();
        assert_eq!(err, "down");
        assert!(cache.is_empty());

        let v = cache
            .get_or_fetch("k", ttl, || async { Ok::<_, String>(7) })
            .await
            .unwrap();
        assert_eq!(*v, 7);
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_failure() {
        let cache: TtlCache<&str, u32, String> = TtlCache::new(Duration::from_secs(3600));
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let ttl = cache.default_ttl();
        let failing = || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            Err::<u32, _>("down".to_string())
        };

        let (a, b, c) = tokio::join!(
            cache.get_or_fetch("k", ttl, failing),
            cache.get_or_fetch("k", ttl, failing),
            cache.get_or_fetch("k", ttl, failing),
        );

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        for result in [a, b, c] {
            assert_eq!(result.unwrap_err(), "down");
        }
        assert!(cache.is_empty());

        // A later caller is not handed the old failure.
        let v = cache.get_or_fetch("k", ttl, || counting_fetch(calls, 9)).await.unwrap();
        assert_eq!(*v, 9);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_abandoned_fill_is_taken_over() {
        let cache: TtlCache<&str, u32, String> = TtlCache::new(Duration::from_secs(3600));
        let calls = AtomicUsize::new(0);
        let ttl = cache.default_ttl();

        let abandoned = tokio::time::timeout(
            Duration::from_millis(5),
            cache.get_or_fetch("k", ttl, || counting_fetch(&calls, 1)),
        )
        .await;
        assert!(abandoned.is_err());

        let v = cache.get_or_fetch("k", ttl, || counting_fetch(&calls, 2)).await.unwrap();
        assert_eq!(*v, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_invalidate_all_forces_refetch_for_every_key() {
        let cache: TtlCache<&str, u32, String> = TtlCache::new(Duration::from_secs(3600));
        let calls = AtomicUsize::new(0);
        let ttl = cache.default_ttl();

        cache.get_or_fetch("a", ttl, || counting_fetch(&calls, 1)).await.unwrap();
        cache.get_or_fetch("b", ttl, || counting_fetch(&calls, 1)).await.unwrap();
        assert_eq!(cache.len(), 2);

        cache.invalidate_all();
        assert!(cache.is_empty());

        cache.get_or_fetch("a", ttl, || counting_fetch(&calls, 1)).await.unwrap();
        cache.get_or_fetch("b", ttl, || counting_fetch(&calls, 1)).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }
}
