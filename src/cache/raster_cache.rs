//! Cache of decoded raster sets keyed by source identity.
//!
//! Entries are either present (the rasters a source decoded to) or negative
//! (the source is known to be unreadable). The cache is bounded by the sum of
//! entry size hints and evicts least-recently-used entries past capacity.
//!
//! # Single flight
//!
//! [`RasterCache::get_or_load`] makes concurrent callers for the same
//! uncached source wait for one load instead of decoding it several times.
//! If the loading caller is dropped before it finishes, one of the waiters
//! takes over the load.
//!
//! # Removal listeners
//!
//! Every entry that leaves the cache (eviction, replacement, explicit removal
//! or clear) is reported exactly once to each registered listener, after the
//! cache lock is released.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use lru::LruCache;
use tokio::sync::{Mutex, Notify, RwLock};
use tracing::{debug, warn};

use crate::error::ReadError;
use crate::raster::DataRaster;
use crate::reader::{RasterSource, SourceKey};

/// Default capacity: 256 MiB of decoded rasters.
pub const DEFAULT_RASTER_CACHE_CAPACITY: usize = 256 * 1024 * 1024;

/// A decoded raster set, shared between the cache and its readers.
pub type RasterSet = Arc<Vec<DataRaster>>;

/// Result of a cache lookup.
#[derive(Debug, Clone)]
pub enum CacheLookup {
    /// The source decoded to these rasters
    Present(RasterSet),
    /// The source is known to be unreadable
    Unreadable,
    /// The cache knows nothing about the source
    NotPresent,
}

/// Why an entry left the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalCause {
    /// Evicted to stay within capacity
    Evicted,
    /// Overwritten by a new value for the same key
    Replaced,
    /// Removed with [`RasterCache::remove`]
    Removed,
    /// Dropped by [`RasterCache::clear`]
    Cleared,
}

/// Observer of entries leaving the cache.
///
/// `value` is `None` for negative entries.
pub trait RemovalListener: Send + Sync {
    fn on_removal(&self, key: &SourceKey, value: Option<&RasterSet>, cause: RemovalCause);
}

impl<F> RemovalListener for F
where
    F: Fn(&SourceKey, Option<&RasterSet>, RemovalCause) + Send + Sync,
{
    fn on_removal(&self, key: &SourceKey, value: Option<&RasterSet>, cause: RemovalCause) {
        self(key, value, cause)
    }
}

#[derive(Debug, Clone)]
struct Entry {
    value: Option<RasterSet>,
    size: usize,
}

struct Inner {
    entries: LruCache<SourceKey, Entry>,
    size: usize,
}

type LoadResult = Result<RasterSet, ReadError>;
type InFlightMap = StdMutex<HashMap<SourceKey, Arc<InFlight>>>;

/// State for an in-flight load.
#[derive(Default)]
struct InFlight {
    notify: Notify,
    /// Set once the leader stops, with or without a result
    closed: AtomicBool,
    result: StdMutex<Option<LoadResult>>,
}

impl InFlight {
    fn result(&self) -> Option<LoadResult> {
        self.result
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn finish(&self, result: LoadResult) {
        *self.result.lock().unwrap_or_else(PoisonError::into_inner) = Some(result);
    }
}

/// Held by the caller running a load. Dropping it, whether the load finished
/// or the caller was cancelled, removes the in-flight entry and wakes waiters.
struct LoadGuard<'a> {
    map: &'a InFlightMap,
    key: SourceKey,
    state: Arc<InFlight>,
}

impl Drop for LoadGuard<'_> {
    fn drop(&mut self) {
        {
            let mut map = self.map.lock().unwrap_or_else(PoisonError::into_inner);
            if map
                .get(&self.key)
                .is_some_and(|state| Arc::ptr_eq(state, &self.state))
            {
                map.remove(&self.key);
            }
        }
        self.state.closed.store(true, Ordering::Release);
        self.state.notify.notify_waiters();
    }
}

type Removed = Vec<(SourceKey, Entry, RemovalCause)>;

/// Size-bounded LRU cache of raster sets.
pub struct RasterCache {
    inner: Mutex<Inner>,
    capacity: usize,
    listeners: RwLock<Vec<Arc<dyn RemovalListener>>>,
    in_flight: InFlightMap,
}

impl Default for RasterCache {
    fn default() -> Self {
        Self::new()
    }
}

impl RasterCache {
    /// Create a cache with the default capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_RASTER_CACHE_CAPACITY)
    }

    /// Create a cache holding up to `capacity` bytes of size hints.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: LruCache::unbounded(),
                size: 0,
            }),
            capacity,
            listeners: RwLock::new(Vec::new()),
            in_flight: StdMutex::new(HashMap::new()),
        }
    }

    pub async fn add_removal_listener(&self, listener: Arc<dyn RemovalListener>) {
        self.listeners.write().await.push(listener);
    }

    async fn notify(&self, removed: Removed) {
        if removed.is_empty() {
            return;
        }
        let listeners = self.listeners.read().await;
        for (key, entry, cause) in &removed {
            debug!(key = %key, ?cause, size = entry.size, "raster cache removal");
            for listener in listeners.iter() {
                listener.on_removal(key, entry.value.as_ref(), *cause);
            }
        }
    }

    async fn insert(&self, key: SourceKey, value: Option<RasterSet>, size: usize) {
        if !self.admits(size) {
            debug!(key = %key, size, capacity = self.capacity, "entry larger than cache, not cached");
            return;
        }

        let mut removed = Removed::new();
        {
            let mut inner = self.inner.lock().await;
            if let Some(old) = inner.entries.put(key.clone(), Entry { value, size }) {
                inner.size -= old.size;
                removed.push((key, old, RemovalCause::Replaced));
            }
            inner.size += size;

            while inner.size > self.capacity {
                let Some((evicted_key, evicted)) = inner.entries.pop_lru() else {
                    break;
                };
                inner.size -= evicted.size;
                removed.push((evicted_key, evicted, RemovalCause::Evicted));
            }
        }
        self.notify(removed).await;
    }

    /// Store the rasters `source` decoded to, or a negative entry for `None`.
    pub async fn put(&self, source: &RasterSource, rasters: Option<Vec<DataRaster>>, size: usize) {
        self.insert(source.key().clone(), rasters.map(Arc::new), size)
            .await
    }

    pub async fn get(&self, source: &RasterSource) -> CacheLookup {
        let mut inner = self.inner.lock().await;
        match inner.entries.get(source.key()) {
            Some(Entry {
                value: Some(rasters),
                ..
            }) => CacheLookup::Present(rasters.clone()),
            Some(Entry { value: None, .. }) => CacheLookup::Unreadable,
            None => CacheLookup::NotPresent,
        }
    }

    /// Whether the cache has any entry (present or negative) for `source`.
    pub async fn contains(&self, source: &RasterSource) -> bool {
        self.inner.lock().await.entries.contains(source.key())
    }

    /// Remove the entry for `source`. Returns whether there was one.
    pub async fn remove(&self, source: &RasterSource) -> bool {
        let removed = {
            let mut inner = self.inner.lock().await;
            let popped = inner.entries.pop(source.key());
            if let Some(entry) = &popped {
                inner.size -= entry.size;
            }
            popped
        };
        match removed {
            Some(entry) => {
                self.notify(vec![(source.key().clone(), entry, RemovalCause::Removed)])
                    .await;
                true
            }
            None => false,
        }
    }

    pub async fn clear(&self) {
        let mut removed = Removed::new();
        {
            let mut inner = self.inner.lock().await;
            while let Some((key, entry)) = inner.entries.pop_lru() {
                removed.push((key, entry, RemovalCause::Cleared));
            }
            inner.size = 0;
        }
        self.notify(removed).await;
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Sum of the size hints of cached entries.
    pub async fn size(&self) -> usize {
        self.inner.lock().await.size
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Whether an entry of `size` bytes would be kept.
    pub fn admits(&self, size: usize) -> bool {
        size <= self.capacity
    }

    /// Cached rasters for `source`, loading them with `loader` on a miss.
    ///
    /// Concurrent callers for the same source share one load. A failed load
    /// is cached as a negative entry; later calls return
    /// [`ReadError::KnownUnreadable`] without invoking a loader.
    pub async fn get_or_load<F, Fut>(
        &self,
        source: &RasterSource,
        loader: F,
    ) -> Result<RasterSet, ReadError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<DataRaster>, ReadError>>,
    {
        let key = source.key();
        let mut loader = Some(loader);

        loop {
            match self.get(source).await {
                CacheLookup::Present(rasters) => return Ok(rasters),
                CacheLookup::Unreadable => return Err(ReadError::KnownUnreadable(source.name())),
                CacheLookup::NotPresent => {}
            }

            let (state, leader) = {
                let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
                match in_flight.get(key) {
                    Some(state) => (state.clone(), false),
                    None => {
                        let state = Arc::new(InFlight::default());
                        in_flight.insert(key.clone(), state.clone());
                        (state, true)
                    }
                }
            };

            if leader {
                let guard = LoadGuard {
                    map: &self.in_flight,
                    key: key.clone(),
                    state,
                };
                let loaded = match loader.take() {
                    Some(load) => load().await,
                    None => Err(ReadError::CannotRead(format!(
                        "loader for {} already used",
                        source.name()
                    ))),
                };

                let result = match loaded {
                    Ok(rasters) => {
                        let size = rasters.iter().map(DataRaster::size_in_bytes).sum();
                        let rasters = Arc::new(rasters);
                        self.insert(key.clone(), Some(rasters.clone()), size).await;
                        Ok(rasters)
                    }
                    Err(e) => {
                        warn!(source = %source.name(), error = %e, "caching unreadable source");
                        self.insert(key.clone(), None, 0).await;
                        Err(e)
                    }
                };

                guard.state.finish(result.clone());
                drop(guard);
                return result;
            }

            // Register before checking for completion so a wake-up in between is not lost
            let notified = state.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if !state.closed.load(Ordering::Acquire) {
                notified.await;
            }
            if let Some(result) = state.result() {
                return result;
            }
            debug!(source = %source.name(), "loading caller went away, retrying");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::Sector;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn raster() -> DataRaster {
        DataRaster::new_image(2, 2, Sector::new(0.0, 1.0, 0.0, 1.0))
    }

    #[tokio::test]
    async fn test_put_get() {
        let cache = RasterCache::with_capacity(1000);
        let source = RasterSource::from_path("/a.tif");
        assert!(matches!(cache.get(&source).await, CacheLookup::NotPresent));

        cache.put(&source, Some(vec![raster()]), 16).await;
        match cache.get(&source).await {
            CacheLookup::Present(rasters) => assert_eq!(rasters.len(), 1),
            other => panic!("expected Present, got {:?}", other),
        }
        assert_eq!(cache.size().await, 16);
        assert!(cache.contains(&source).await);
    }

    #[tokio::test]
    async fn test_negative_entry() {
        let cache = RasterCache::new();
        let source = RasterSource::from_path("/bad.tif");
        cache.put(&source, None, 0).await;
        assert!(matches!(cache.get(&source).await, CacheLookup::Unreadable));

        let calls = AtomicUsize::new(0);
        let result = cache
            .get_or_load(&source, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(vec![raster()])
            })
            .await;
        assert!(matches!(result, Err(ReadError::KnownUnreadable(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_eviction_by_size() {
        let cache = RasterCache::with_capacity(100);
        let a = RasterSource::from_path("/a");
        let b = RasterSource::from_path("/b");
        let c = RasterSource::from_path("/c");
        cache.put(&a, Some(vec![raster()]), 40).await;
        cache.put(&b, Some(vec![raster()]), 40).await;
        // Touch a so b is least recently used
        cache.get(&a).await;
        cache.put(&c, Some(vec![raster()]), 40).await;

        assert!(cache.contains(&a).await);
        assert!(!cache.contains(&b).await);
        assert!(cache.contains(&c).await);
        assert_eq!(cache.size().await, 80);
    }

    #[tokio::test]
    async fn test_oversized_entry_not_cached() {
        let cache = RasterCache::with_capacity(10);
        let a = RasterSource::from_path("/a");
        cache.put(&a, Some(vec![raster()]), 11).await;
        assert!(!cache.contains(&a).await);
    }

    #[tokio::test]
    async fn test_removal_listener_once_per_entry() {
        let cache = RasterCache::with_capacity(100);
        let events = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = events.clone();
        cache
            .add_removal_listener(Arc::new(
                move |key: &SourceKey, _: Option<&RasterSet>, cause: RemovalCause| {
                    sink.lock().unwrap().push((key.clone(), cause));
                },
            ))
            .await;

        let a = RasterSource::from_path("/a");
        let b = RasterSource::from_path("/b");
        let c = RasterSource::from_path("/c");
        cache.put(&a, Some(vec![raster()]), 10).await;
        cache.put(&a, Some(vec![raster()]), 10).await; // replaced
        cache.put(&b, None, 0).await;
        assert!(cache.remove(&b).await); // removed
        assert!(!cache.remove(&b).await);
        cache.put(&c, Some(vec![raster()]), 95).await; // evicts a
        cache.clear().await; // clears c

        let events = events.lock().unwrap();
        assert_eq!(
            *events,
            vec![
                (a.key().clone(), RemovalCause::Replaced),
                (b.key().clone(), RemovalCause::Removed),
                (a.key().clone(), RemovalCause::Evicted),
                (c.key().clone(), RemovalCause::Cleared),
            ]
        );
        drop(events);
        assert!(cache.is_empty().await);
        assert_eq!(cache.size().await, 0);
    }

    #[tokio::test]
    async fn test_failed_load_is_negative() {
        let cache = RasterCache::new();
        let source = RasterSource::from_path("/broken.png");
        let result = cache
            .get_or_load(&source, || async {
                Err(ReadError::CannotRead("broken".to_string()))
            })
            .await;
        assert!(matches!(result, Err(ReadError::CannotRead(_))));
        assert!(matches!(cache.get(&source).await, CacheLookup::Unreadable));
    }

    #[tokio::test]
    async fn test_cancelled_load_hands_over_to_waiter() {
        use std::time::Duration;

        let cache = Arc::new(RasterCache::with_capacity(1000));
        let source = RasterSource::from_path("/slow.tif");
        let loads = Arc::new(AtomicUsize::new(0));

        let leader = {
            let (cache, source) = (cache.clone(), source.clone());
            tokio::spawn(async move {
                cache
                    .get_or_load(&source, || async {
                        tokio::time::sleep(Duration::from_secs(3600)).await;
                        Ok(vec![raster()])
                    })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        let waiter = {
            let (cache, source, loads) = (cache.clone(), source.clone(), loads.clone());
            tokio::spawn(async move {
                cache
                    .get_or_load(&source, || async move {
                        loads.fetch_add(1, Ordering::SeqCst);
                        Ok(vec![raster()])
                    })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(loads.load(Ordering::SeqCst), 0);

        leader.abort();
        assert!(leader.await.unwrap_err().is_cancelled());

        let rasters = tokio::time::timeout(Duration::from_secs(2), waiter)
            .await
            .expect("waiter still blocked")
            .unwrap()
            .unwrap();
        assert_eq!(rasters.len(), 1);
        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert!(cache.in_flight.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_new_caller_after_cancelled_load() {
        use std::time::Duration;

        let cache = Arc::new(RasterCache::with_capacity(1000));
        let source = RasterSource::from_path("/slow.tif");

        let leader = {
            let (cache, source) = (cache.clone(), source.clone());
            tokio::spawn(async move {
                cache
                    .get_or_load(&source, || async {
                        tokio::time::sleep(Duration::from_secs(3600)).await;
                        Ok(vec![raster()])
                    })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        leader.abort();
        let _ = leader.await;

        let result = tokio::time::timeout(
            Duration::from_secs(2),
            cache.get_or_load(&source, || async { Ok(vec![raster(), raster()]) }),
        )
        .await
        .expect("second caller blocked");
        assert_eq!(result.unwrap().len(), 2);
    }

    #[test]
    fn test_admits() {
        let cache = RasterCache::with_capacity(100);
        assert!(cache.admits(100));
        assert!(!cache.admits(101));
    }
}
