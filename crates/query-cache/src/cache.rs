//! Query cache engine
//!
//! Values are stored type-erased so one store can hold every entity family.
//! Fetches run as spawned tasks: a caller that stops waiting does not cancel
//! the fetch, and its result is still cached for the next reader.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::QueryError;
use crate::key::{InvalidationTag, QueryKey};
use crate::types::{CacheStats, EntryState};

type AnyValue = Arc<dyn Any + Send + Sync>;
type AnyError = Arc<dyn Any + Send + Sync>;
type FetchOutcome = std::result::Result<AnyValue, AnyError>;
type InFlight = Shared<BoxFuture<'static, FetchOutcome>>;

struct CacheEntry {
    value: Option<AnyValue>,
    fetched_at: Instant,
    stale_after: Duration,
    /// Set by invalidation; cleared only by a fetch that started after it
    invalidated: bool,
    generation: u64,
    in_flight: Option<Flight>,
    /// Id of the fetch that produced `value`; older fetches never overwrite it
    value_flight: u64,
}

/// A running fetch and the entry generation it started under
struct Flight {
    id: u64,
    generation: u64,
    shared: InFlight,
}

impl CacheEntry {
    fn empty() -> Self {
        Self {
            value: None,
            fetched_at: Instant::now(),
            stale_after: Duration::ZERO,
            invalidated: false,
            generation: 0,
            in_flight: None,
            value_flight: 0,
        }
    }

    fn is_stale_for(&self, now: Instant, stale_time: Duration) -> bool {
        if self.value.is_none() || self.invalidated || stale_time.is_zero() {
            return true;
        }
        now.saturating_duration_since(self.fetched_at) > stale_time
    }

    /// The running fetch, if it started after the latest invalidation
    fn current_flight(&self) -> Option<InFlight> {
        self.in_flight
            .as_ref()
            .filter(|flight| flight.generation == self.generation)
            .map(|flight| flight.shared.clone())
    }

    fn is_flight(&self, flight_id: u64) -> bool {
        matches!(&self.in_flight, Some(flight) if flight.id == flight_id)
    }
}

#[derive(Default)]
struct Store {
    entries: HashMap<QueryKey, CacheEntry>,
    /// Bumped by `clear`; results of fetches from an older epoch are dropped
    epoch: u64,
    next_flight_id: u64,
    stats: CacheStats,
}

enum Acquired {
    Fresh(AnyValue),
    Stale(AnyValue),
    Wait(InFlight),
}

/// Process-wide query cache
///
/// Cloning yields another handle to the same store.
#[derive(Clone, Default)]
pub struct QueryCache {
    inner: Arc<Mutex<Store>>,
}

impl QueryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached value for `key`, fetching it if absent or stale
    ///
    /// Concurrent calls for the same key share one fetch. A failed fetch leaves
    /// any previous value in place and returns the error to every waiting caller.
    pub async fn query<T, E, F, Fut>(
        &self,
        key: QueryKey,
        stale_time: Duration,
        fetcher: F,
    ) -> std::result::Result<Arc<T>, E>
    where
        T: Send + Sync + 'static,
        E: Clone + fmt::Display + From<QueryError> + Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>> + Send + 'static,
    {
        match self.acquire(&key, stale_time, fetcher, false) {
            Acquired::Fresh(value) | Acquired::Stale(value) => downcast_value(&key, value),
            Acquired::Wait(flight) => settle(&key, flight.await),
        }
    }

    /// Stale-while-revalidate variant of [`QueryCache::query`]
    ///
    /// A stale value is returned at once and a background refetch is started
    /// unless one is already running. Background failures are logged and the
    /// previous value stays servable. Without any value this waits like `query`.
    pub async fn query_optimistic<T, E, F, Fut>(
        &self,
        key: QueryKey,
        stale_time: Duration,
        fetcher: F,
    ) -> std::result::Result<Arc<T>, E>
    where
        T: Send + Sync + 'static,
        E: Clone + fmt::Display + From<QueryError> + Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>> + Send + 'static,
    {
        match self.acquire(&key, stale_time, fetcher, true) {
            Acquired::Fresh(value) | Acquired::Stale(value) => downcast_value(&key, value),
            Acquired::Wait(flight) => settle(&key, flight.await),
        }
    }

    /// Run a mutation and, only if it succeeds, invalidate every tag it declares
    pub async fn mutate<T, E, Fut>(
        &self,
        invalidates: &[InvalidationTag],
        op: Fut,
    ) -> std::result::Result<T, E>
    where
        Fut: Future<Output = std::result::Result<T, E>>,
    {
        let result = op.await;
        if result.is_ok() {
            for tag in invalidates {
                self.invalidate(tag);
            }
        }
        result
    }

    /// Mark every entry matching `tag` stale without evicting its value
    ///
    /// Returns the number of entries marked.
    pub fn invalidate(&self, tag: &InvalidationTag) -> usize {
        let mut store = self.store();
        let mut marked = 0;
        for (_, entry) in store.entries.iter_mut().filter(|(k, _)| tag.matches(k)) {
            entry.invalidated = true;
            entry.generation += 1;
            marked += 1;
        }
        store.stats.invalidations += marked as u64;
        debug!(tag = %tag, marked, "Invalidated cache entries");
        marked
    }

    /// Evict every entry matching `tag`
    pub fn remove(&self, tag: &InvalidationTag) -> usize {
        let mut store = self.store();
        let before = store.entries.len();
        store.entries.retain(|key, _| !tag.matches(key));
        before - store.entries.len()
    }

    /// Evict everything; fetches already running will not repopulate the store
    pub fn clear(&self) {
        let mut store = self.store();
        let evicted = store.entries.len();
        store.entries.clear();
        store.epoch += 1;
        debug!(evicted, epoch = store.epoch, "Cleared query cache");
    }

    /// Cached value for `key` regardless of staleness
    pub fn get_cached<T>(&self, key: &QueryKey) -> Option<Arc<T>>
    where
        T: Send + Sync + 'static,
    {
        let value = self.store().entries.get(key)?.value.clone()?;
        value.downcast::<T>().ok()
    }

    pub fn entry_state(&self, key: &QueryKey) -> Option<EntryState> {
        let store = self.store();
        let entry = store.entries.get(key)?;
        let now = Instant::now();
        Some(EntryState {
            has_value: entry.value.is_some(),
            stale: entry.is_stale_for(now, entry.stale_after),
            in_flight: entry.in_flight.is_some(),
            age: entry
                .value
                .as_ref()
                .map(|_| now.saturating_duration_since(entry.fetched_at)),
        })
    }

    /// Whether `key` is stale under the freshness window it was stored with
    pub fn is_stale(&self, key: &QueryKey) -> Option<bool> {
        self.entry_state(key).map(|state| state.stale)
    }

    pub fn stats(&self) -> CacheStats {
        let store = self.store();
        CacheStats {
            entries: store.entries.len(),
            ..store.stats.clone()
        }
    }

    pub fn len(&self) -> usize {
        self.store().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store().entries.is_empty()
    }

    fn store(&self) -> MutexGuard<'_, Store> {
        lock(&self.inner)
    }

    /// Decide hit, join or fetch within one critical section so that two
    /// callers can never both start a fetch for the same key
    fn acquire<T, E, F, Fut>(
        &self,
        key: &QueryKey,
        stale_time: Duration,
        fetcher: F,
        serve_stale: bool,
    ) -> Acquired
    where
        T: Send + Sync + 'static,
        E: Clone + fmt::Display + From<QueryError> + Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>> + Send + 'static,
    {
        let mut guard = self.store();
        let store = &mut *guard;
        let now = Instant::now();

        let (value, fresh, flight) = match store.entries.get(key) {
            Some(entry) => (
                entry.value.clone(),
                !entry.is_stale_for(now, stale_time),
                entry.current_flight(),
            ),
            None => (None, false, None),
        };

        if let Some(value) = value {
            if fresh {
                store.stats.hits += 1;
                debug!(key = %key, "Query cache hit");
                return Acquired::Fresh(value);
            }
            if serve_stale {
                store.stats.hits += 1;
                if flight.is_none() {
                    debug!(key = %key, "Serving stale value, refetching in background");
                    let _ = self.spawn_fetch(store, key, stale_time, fetcher());
                }
                return Acquired::Stale(value);
            }
        }

        store.stats.misses += 1;
        if let Some(flight) = flight {
            debug!(key = %key, "Joining in-flight fetch");
            return Acquired::Wait(flight);
        }

        debug!(key = %key, "Query cache miss");
        Acquired::Wait(self.spawn_fetch(store, key, stale_time, fetcher()))
    }

    fn spawn_fetch<T, E, Fut>(
        &self,
        store: &mut Store,
        key: &QueryKey,
        stale_time: Duration,
        fut: Fut,
    ) -> InFlight
    where
        T: Send + Sync + 'static,
        E: Clone + fmt::Display + From<QueryError> + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<T, E>> + Send + 'static,
    {
        store.next_flight_id += 1;
        store.stats.fetches += 1;
        let flight_id = store.next_flight_id;
        let epoch = store.epoch;
        let entry = store
            .entries
            .entry(key.clone())
            .or_insert_with(CacheEntry::empty);
        let generation = entry.generation;

        let guard = FlightGuard {
            inner: Arc::clone(&self.inner),
            key: key.clone(),
            flight_id,
        };
        let handle = tokio::spawn(async move {
            let result = fut.await;
            let outcome: FetchOutcome = match result {
                Ok(value) => Ok(Arc::new(value) as AnyValue),
                Err(err) => {
                    warn!(key = %guard.key, error = %err, "Query fetch failed");
                    Err(Arc::new(err) as AnyError)
                }
            };
            let mut store = lock(&guard.inner);
            complete(&mut store, &guard.key, epoch, flight_id, generation, stale_time, &outcome);
            outcome
        });

        let task_key = key.clone();
        let flight = async move {
            match handle.await {
                Ok(outcome) => outcome,
                Err(join_err) => Err(Arc::new(E::from(QueryError::FetchAborted {
                    key: task_key,
                    reason: join_err.to_string(),
                })) as AnyError),
            }
        }
        .boxed()
        .shared();

        entry.in_flight = Some(Flight {
            id: flight_id,
            generation,
            shared: flight.clone(),
        });
        flight
    }
}

/// Write a finished fetch back into the store
fn complete(
    store: &mut Store,
    key: &QueryKey,
    epoch: u64,
    flight_id: u64,
    generation: u64,
    stale_time: Duration,
    outcome: &FetchOutcome,
) {
    if store.epoch != epoch {
        debug!(key = %key, "Discarding result fetched before cache was cleared");
        return;
    }
    let Some(entry) = store.entries.get_mut(key) else {
        return;
    };
    if entry.is_flight(flight_id) {
        entry.in_flight = None;
    }

    match outcome {
        Ok(_) if entry.value_flight > flight_id => {
            debug!(key = %key, "Discarding result older than the cached value");
        }
        Ok(value) => {
            entry.value = Some(value.clone());
            entry.value_flight = flight_id;
            entry.fetched_at = Instant::now();
            entry.stale_after = stale_time;
            // invalidated while the fetch ran: the value may predate the write
            entry.invalidated = entry.generation != generation;
        }
        Err(_) => {
            if entry.value.is_none() && entry.in_flight.is_none() {
                store.entries.remove(key);
            }
        }
    }
}

/// Clears the in-flight marker if the fetch task ends without completing
struct FlightGuard {
    inner: Arc<Mutex<Store>>,
    key: QueryKey,
    flight_id: u64,
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        let mut guard = lock(&self.inner);
        let store = &mut *guard;
        let Some(entry) = store.entries.get_mut(&self.key) else {
            return;
        };
        if !entry.is_flight(self.flight_id) {
            return;
        }
        entry.in_flight = None;
        if entry.value.is_none() {
            store.entries.remove(&self.key);
        }
    }
}

fn lock(inner: &Mutex<Store>) -> MutexGuard<'_, Store> {
    inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn downcast_value<T, E>(key: &QueryKey, value: AnyValue) -> std::result::Result<Arc<T>, E>
where
    T: Send + Sync + 'static,
    E: From<QueryError>,
{
    value
        .downcast::<T>()
        .map_err(|_| E::from(QueryError::TypeMismatch { key: key.clone() }))
}

fn settle<T, E>(key: &QueryKey, outcome: FetchOutcome) -> std::result::Result<Arc<T>, E>
where
    T: Send + Sync + 'static,
    E: Clone + From<QueryError> + 'static,
{
    match outcome {
        Ok(value) => downcast_value(key, value),
        Err(err) => Err(err
            .downcast_ref::<E>()
            .cloned()
            .unwrap_or_else(|| E::from(QueryError::TypeMismatch { key: key.clone() }))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;

    const FIVE_MINUTES: Duration = Duration::from_secs(300);

    #[derive(Debug, Clone, PartialEq)]
    enum TestError {
        Remote(String),
        Cache(QueryError),
    }

    impl fmt::Display for TestError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            match self {
                TestError::Remote(msg) => write!(f, "remote: {}", msg),
                TestError::Cache(err) => write!(f, "cache: {}", err),
            }
        }
    }

    impl From<QueryError> for TestError {
        fn from(err: QueryError) -> Self {
            TestError::Cache(err)
        }
    }

    fn counted(
        calls: &Arc<AtomicUsize>,
        value: Vec<&'static str>,
    ) -> impl FnOnce() -> BoxFuture<'static, std::result::Result<Vec<&'static str>, TestError>>
    {
        let calls = Arc::clone(calls);
        move || {
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(value)
            }
            .boxed()
        }
    }

    fn failing(
        calls: &Arc<AtomicUsize>,
    ) -> impl FnOnce() -> BoxFuture<'static, std::result::Result<Vec<&'static str>, TestError>>
    {
        let calls = Arc::clone(calls);
        move || {
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(TestError::Remote("boom".to_string()))
            }
            .boxed()
        }
    }

    /// Fetcher that records its start and then blocks until `release` fires
    fn gated<T: Send + 'static>(
        started: &Arc<AtomicUsize>,
        release: &Arc<Notify>,
        result: std::result::Result<T, TestError>,
    ) -> impl FnOnce() -> BoxFuture<'static, std::result::Result<T, TestError>> {
        let started = Arc::clone(started);
        let release = Arc::clone(release);
        move || {
            async move {
                started.fetch_add(1, Ordering::SeqCst);
                release.notified().await;
                result
            }
            .boxed()
        }
    }

    async fn wait_until(mut cond: impl FnMut() -> bool) {
        for _ in 0..200 {
            if cond() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached");
    }

    #[tokio::test]
    async fn test_second_query_is_cache_hit() {
        let cache = QueryCache::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let key = QueryKey::new("students");

        let first: Arc<Vec<&str>> = cache
            .query(key.clone(), FIVE_MINUTES, counted(&calls, vec!["S1"]))
            .await
            .unwrap();
        let second: Arc<Vec<&str>> = cache
            .query(key.clone(), FIVE_MINUTES, counted(&calls, vec!["S2"]))
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(*first, vec!["S1"]);
        assert!(Arc::ptr_eq(&first, &second));
        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.fetches, 1);
        assert_eq!(stats.entries, 1);
    }

    #[tokio::test]
    async fn test_zero_stale_time_always_fetches() {
        let cache = QueryCache::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let key = QueryKey::new("attendance").with("statistics").with("S1");

        for _ in 0..3 {
            let _: Arc<Vec<&str>> = cache
                .query(key.clone(), Duration::ZERO, counted(&calls, vec!["x"]))
                .await
                .unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_goes_stale_after_window() {
        let cache = QueryCache::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let key = QueryKey::new("courses");

        let _: Arc<Vec<&str>> = cache
            .query(key.clone(), FIVE_MINUTES, counted(&calls, vec!["CS101"]))
            .await
            .unwrap();
        tokio::time::advance(Duration::from_secs(299)).await;
        assert_eq!(cache.is_stale(&key), Some(false));
        let _: Arc<Vec<&str>> = cache
            .query(key.clone(), FIVE_MINUTES, counted(&calls, vec!["CS101"]))
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(cache.is_stale(&key), Some(true));
        let fresh: Arc<Vec<&str>> = cache
            .query(key.clone(), FIVE_MINUTES, counted(&calls, vec!["CS102"]))
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(*fresh, vec!["CS102"]);
    }

    #[tokio::test]
    async fn test_concurrent_queries_share_one_fetch() {
        let cache = QueryCache::new();
        let started = Arc::new(AtomicUsize::new(0));
        let release = Arc::new(Notify::new());
        let key = QueryKey::new("courses");

        let a = cache.query(key.clone(), FIVE_MINUTES, gated(&started, &release, Ok(vec!["CS101"])));
        let b = cache.query(key.clone(), FIVE_MINUTES, gated(&started, &release, Ok(vec!["CS999"])));
        let releaser = async {
            wait_until(|| started.load(Ordering::SeqCst) == 1).await;
            release.notify_waiters();
        };

        let (a, b, ()) = tokio::join!(a, b, releaser);
        let a: Arc<Vec<&str>> = a.unwrap();
        let b: Arc<Vec<&str>> = b.unwrap();

        assert_eq!(started.load(Ordering::SeqCst), 1);
        assert_eq!(*a, vec!["CS101"]);
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_failure() {
        let cache = QueryCache::new();
        let started = Arc::new(AtomicUsize::new(0));
        let release = Arc::new(Notify::new());
        let key = QueryKey::new("students");

        let a = cache.query::<Vec<&str>, _, _, _>(
            key.clone(),
            FIVE_MINUTES,
            gated(&started, &release, Err(TestError::Remote("down".to_string()))),
        );
        let b = cache.query::<Vec<&str>, _, _, _>(
            key.clone(),
            FIVE_MINUTES,
            gated(&started, &release, Ok(vec!["never"])),
        );
        let releaser = async {
            wait_until(|| started.load(Ordering::SeqCst) == 1).await;
            release.notify_waiters();
        };

        let (a, b, ()) = tokio::join!(a, b, releaser);
        assert_eq!(a.unwrap_err(), TestError::Remote("down".to_string()));
        assert_eq!(b.unwrap_err(), TestError::Remote("down".to_string()));
        assert_eq!(started.load(Ordering::SeqCst), 1);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_failed_refetch_keeps_previous_value() {
        let cache = QueryCache::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let key = QueryKey::new("grades").with("S1").with("CS101");

        let _: Arc<Vec<&str>> = cache
            .query(key.clone(), FIVE_MINUTES, counted(&calls, vec!["A"]))
            .await
            .unwrap();
        cache.invalidate(&InvalidationTag::family("grades"));

        let err = cache
            .query::<Vec<&str>, _, _, _>(key.clone(), FIVE_MINUTES, failing(&calls))
            .await
            .unwrap_err();
        assert_eq!(err, TestError::Remote("boom".to_string()));

        let cached: Arc<Vec<&str>> = cache.get_cached(&key).unwrap();
        assert_eq!(*cached, vec!["A"]);
        assert_eq!(cache.is_stale(&key), Some(true));
    }

    #[tokio::test]
    async fn test_failed_first_fetch_caches_nothing() {
        let cache = QueryCache::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let key = QueryKey::new("students");

        assert!(cache
            .query::<Vec<&str>, _, _, _>(key.clone(), FIVE_MINUTES, failing(&calls))
            .await
            .is_err());
        assert!(cache.entry_state(&key).is_none());

        let _: Arc<Vec<&str>> = cache
            .query(key, FIVE_MINUTES, counted(&calls, vec!["S1"]))
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_invalidate_marks_only_matching_entries() {
        let cache = QueryCache::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let grades = QueryKey::new("grades").with("S1");
        let students = QueryKey::new("students");

        let _: Arc<Vec<&str>> = cache
            .query(grades.clone(), FIVE_MINUTES, counted(&calls, vec!["A"]))
            .await
            .unwrap();
        let _: Arc<Vec<&str>> = cache
            .query(students.clone(), FIVE_MINUTES, counted(&calls, vec!["S1"]))
            .await
            .unwrap();

        assert_eq!(cache.invalidate(&InvalidationTag::family("grades")), 1);
        assert_eq!(cache.is_stale(&grades), Some(true));
        assert_eq!(cache.is_stale(&students), Some(false));
        // value is kept
        assert!(cache.get_cached::<Vec<&str>>(&grades).is_some());

        assert_eq!(cache.invalidate(&InvalidationTag::family("projects")), 0);
        assert_eq!(cache.len(), 2);
    }

    #[tokio::test]
    async fn test_mutate_invalidates_only_on_success() {
        let cache = QueryCache::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let key = QueryKey::new("grades").with("S1");
        let tags = [InvalidationTag::family("grades")];

        let _: Arc<Vec<&str>> = cache
            .query(key.clone(), FIVE_MINUTES, counted(&calls, vec!["A"]))
            .await
            .unwrap();

        let failed: std::result::Result<(), TestError> = cache
            .mutate(&tags, async { Err(TestError::Remote("rejected".to_string())) })
            .await;
        assert!(failed.is_err());
        assert_eq!(cache.is_stale(&key), Some(false));

        let ok: std::result::Result<(), TestError> = cache.mutate(&tags, async { Ok(()) }).await;
        assert!(ok.is_ok());
        assert_eq!(cache.is_stale(&key), Some(true));
    }

    #[tokio::test]
    async fn test_query_after_mutation_returns_fresh_value() {
        let cache = QueryCache::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let key = QueryKey::new("grades").with("S1");

        let before: Arc<Vec<&str>> = cache
            .query(key.clone(), FIVE_MINUTES, counted(&calls, vec!["A"]))
            .await
            .unwrap();
        assert_eq!(*before, vec!["A"]);

        let _: std::result::Result<(), TestError> = cache
            .mutate(&[InvalidationTag::family("grades")], async { Ok(()) })
            .await;

        let after: Arc<Vec<&str>> = cache
            .query(key.clone(), FIVE_MINUTES, counted(&calls, vec!["A", "B"]))
            .await
            .unwrap();
        assert_eq!(*after, vec!["A", "B"]);
        assert_eq!(cache.is_stale(&key), Some(false));
    }

    #[tokio::test]
    async fn test_dropped_caller_does_not_cancel_fetch() {
        let cache = QueryCache::new();
        let started = Arc::new(AtomicUsize::new(0));
        let release = Arc::new(Notify::new());
        let key = QueryKey::new("project").with("P1");

        let task_cache = cache.clone();
        let task_key = key.clone();
        let fetcher = gated(&started, &release, Ok("report.pdf".to_string()));
        let caller = tokio::spawn(async move {
            task_cache.query(task_key, FIVE_MINUTES, fetcher).await
        });

        wait_until(|| started.load(Ordering::SeqCst) == 1).await;
        caller.abort();
        release.notify_waiters();

        wait_until(|| cache.get_cached::<String>(&key).is_some()).await;
        assert_eq!(*cache.get_cached::<String>(&key).unwrap(), "report.pdf");
        assert_eq!(cache.entry_state(&key).map(|s| s.in_flight), Some(false));
    }

    #[tokio::test]
    async fn test_optimistic_serves_stale_and_refetches() {
        let cache = QueryCache::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let key = QueryKey::new("students");

        let _: Arc<Vec<&str>> = cache
            .query_optimistic(key.clone(), FIVE_MINUTES, counted(&calls, vec!["S1"]))
            .await
            .unwrap();
        cache.invalidate(&InvalidationTag::family("students"));

        let served: Arc<Vec<&str>> = cache
            .query_optimistic(key.clone(), FIVE_MINUTES, counted(&calls, vec!["S1", "S2"]))
            .await
            .unwrap();
        assert_eq!(*served, vec!["S1"]);

        wait_until(|| cache.is_stale(&key) == Some(false)).await;
        let refreshed: Arc<Vec<&str>> = cache.get_cached(&key).unwrap();
        assert_eq!(*refreshed, vec!["S1", "S2"]);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_optimistic_background_failure_keeps_value() {
        let cache = QueryCache::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let key = QueryKey::new("courses");

        let _: Arc<Vec<&str>> = cache
            .query(key.clone(), FIVE_MINUTES, counted(&calls, vec!["CS101"]))
            .await
            .unwrap();
        cache.invalidate(&InvalidationTag::family("courses"));

        let served: Arc<Vec<&str>> = cache
            .query_optimistic(key.clone(), FIVE_MINUTES, failing(&calls))
            .await
            .unwrap();
        assert_eq!(*served, vec!["CS101"]);

        wait_until(|| cache.entry_state(&key).map(|s| s.in_flight) == Some(false)).await;
        assert_eq!(*cache.get_cached::<Vec<&str>>(&key).unwrap(), vec!["CS101"]);
        assert_eq!(cache.is_stale(&key), Some(true));
    }

    #[tokio::test]
    async fn test_invalidation_during_fetch_leaves_result_stale() {
        let cache = QueryCache::new();
        let started = Arc::new(AtomicUsize::new(0));
        let release = Arc::new(Notify::new());
        let key = QueryKey::new("grades").with("S1");

        let query = cache.query(key.clone(), FIVE_MINUTES, gated(&started, &release, Ok(vec!["pre-write"])));
        let writer = async {
            wait_until(|| started.load(Ordering::SeqCst) == 1).await;
            cache.invalidate(&InvalidationTag::family("grades"));
            release.notify_waiters();
        };

        let (value, ()) = tokio::join!(query, writer);
        let value: Arc<Vec<&str>> = value.unwrap();
        assert_eq!(*value, vec!["pre-write"]);
        assert_eq!(cache.is_stale(&key), Some(true));
    }

    #[tokio::test]
    async fn test_query_after_mutation_does_not_join_older_fetch() {
        let cache = QueryCache::new();
        let started = Arc::new(AtomicUsize::new(0));
        let calls = Arc::new(AtomicUsize::new(0));
        let release = Arc::new(Notify::new());
        let key = QueryKey::new("grades").with("S1");

        let poll = cache.query(key.clone(), FIVE_MINUTES, gated(&started, &release, Ok(vec!["pre-write"])));
        let reader = async {
            wait_until(|| started.load(Ordering::SeqCst) == 1).await;
            cache
                .mutate(&[InvalidationTag::family("grades")], async { Ok::<_, TestError>(()) })
                .await
                .unwrap();
            let fresh: Arc<Vec<&str>> = cache
                .query(key.clone(), FIVE_MINUTES, counted(&calls, vec!["pre-write", "post-write"]))
                .await
                .unwrap();
            release.notify_waiters();
            fresh
        };

        let (polled, fresh) = tokio::join!(poll, reader);
        let polled: Arc<Vec<&str>> = polled.unwrap();
        assert_eq!(*polled, vec!["pre-write"]);
        assert_eq!(*fresh, vec!["pre-write", "post-write"]);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // the older fetch finished last but must not replace the newer value
        let cached: Arc<Vec<&str>> = cache.get_cached(&key).unwrap();
        assert_eq!(*cached, vec!["pre-write", "post-write"]);
        assert_eq!(cache.is_stale(&key), Some(false));
    }

    #[tokio::test]
    async fn test_clear_discards_in_flight_results() {
        let cache = QueryCache::new();
        let started = Arc::new(AtomicUsize::new(0));
        let release = Arc::new(Notify::new());
        let key = QueryKey::new("currentUserProfile");

        let query = cache.query(key.clone(), FIVE_MINUTES, gated(&started, &release, Ok("alice".to_string())));
        let logout = async {
            wait_until(|| started.load(Ordering::SeqCst) == 1).await;
            cache.clear();
            release.notify_waiters();
        };

        let (value, ()) = tokio::join!(query, logout);
        let value: Arc<String> = value.unwrap();
        assert_eq!(*value, "alice");
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_type_mismatch() {
        let cache = QueryCache::new();
        let key = QueryKey::new("isCallerAdmin");

        let _: Arc<bool> = cache
            .query(key.clone(), FIVE_MINUTES, || async { Ok::<_, TestError>(true) })
            .await
            .unwrap();
        let err = cache
            .query::<String, TestError, _, _>(key.clone(), FIVE_MINUTES, || async {
                Ok("admin".to_string())
            })
            .await
            .unwrap_err();
        assert_eq!(err, TestError::Cache(QueryError::TypeMismatch { key }));
    }

    #[tokio::test]
    async fn test_remove_and_clear() {
        let cache = QueryCache::new();
        for kind in ["students", "student", "courses"] {
            let _: Arc<u32> = cache
                .query(QueryKey::new(kind), FIVE_MINUTES, || async { Ok::<_, TestError>(1u32) })
                .await
                .unwrap();
        }
        assert_eq!(cache.remove(&InvalidationTag::family("students")), 1);
        assert_eq!(cache.len(), 2);
        cache.clear();
        assert!(cache.is_empty());
    }
}
