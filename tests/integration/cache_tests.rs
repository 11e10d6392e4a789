//! Cache effectiveness integration tests.
//!
//! Tests verify:
//! - Concurrent loads of one source decode it once
//! - Unreadable sources are remembered without calling a reader again
//! - Eviction keeps the cache within its byte budget and notifies listeners

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use raster_tiler::reader::SourceKey;
use raster_tiler::{
    CacheLookup, DataRaster, DataRasterReader, RasterCache, RasterSet, RasterSource, ReadError,
    ReaderSet, RemovalCause, Sector,
};

use super::test_utils::{f32_geotiff, write_file};

fn tiff_source(dir: &std::path::Path, name: &str) -> RasterSource {
    let sector = Sector::new(0.0, 1.0, 0.0, 1.0);
    let path = write_file(dir, name, &f32_geotiff(2, 2, &[1.0, 2.0, 3.0, 4.0], &sector));
    RasterSource::from_path(path)
}

// =============================================================================
// Shared Loads
// =============================================================================

#[tokio::test]
async fn test_concurrent_loads_decode_once() {
    let dir = tempfile::tempdir().unwrap();
    let source = tiff_source(dir.path(), "dem.tif");
    let readers = ReaderSet::default();
    let reader = readers.find_reader(&source).await.unwrap();
    let cache = RasterCache::new();
    let decodes = AtomicUsize::new(0);

    let (counter, src) = (&decodes, &source);
    let load = move || async move {
        counter.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        reader.read(src).await
    };

    let (a, b) = tokio::join!(
        cache.get_or_load(&source, load),
        cache.get_or_load(&source, load)
    );
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_eq!(decodes.load(Ordering::SeqCst), 1);
    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(a[0].as_buffer().unwrap().get(1, 1, 0), 4.0);

    // Later calls hit the cache
    let c = cache.get_or_load(&source, load).await.unwrap();
    assert!(Arc::ptr_eq(&a, &c));
    assert_eq!(decodes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_unreadable_source_is_remembered() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(dir.path(), "broken.tif", b"II*\0garbage");
    let source = RasterSource::from_path(path);
    let readers = ReaderSet::default();
    let cache = RasterCache::new();
    let attempts = AtomicUsize::new(0);

    let (counter, readers, src) = (&attempts, &readers, &source);
    let load = move || async move {
        counter.fetch_add(1, Ordering::SeqCst);
        match readers.find_reader(src).await {
            Some(reader) => reader.read(src).await,
            None => Err(ReadError::CannotRead(src.name())),
        }
    };

    assert!(cache.get_or_load(&source, load).await.is_err());
    assert!(matches!(cache.get(&source).await, CacheLookup::Unreadable));
    assert!(matches!(
        cache.get_or_load(&source, load).await,
        Err(ReadError::KnownUnreadable(_))
    ));
    assert_eq!(attempts.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_negative_put_skips_readers() {
    let source = RasterSource::from_bytes("never.tif", Vec::<u8>::new());
    let cache = RasterCache::new();
    cache.put(&source, None, 0).await;
    assert!(cache.contains(&source).await);

    let loads = AtomicUsize::new(0);
    let counter = &loads;
    let result = cache
        .get_or_load(&source, move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok::<Vec<DataRaster>, ReadError>(Vec::new())
        })
        .await;
    assert!(matches!(result, Err(ReadError::KnownUnreadable(_))));
    assert_eq!(loads.load(Ordering::SeqCst), 0);
}

// =============================================================================
// Eviction
// =============================================================================

#[tokio::test]
async fn test_eviction_within_budget_notifies_listener() {
    let sector = Sector::new(0.0, 1.0, 0.0, 1.0);
    // Each 8x8 RGBA image holds 256 bytes
    let cache = RasterCache::with_capacity(600);
    let removed: Arc<Mutex<Vec<(SourceKey, RemovalCause)>>> = Arc::default();
    let log = removed.clone();
    cache
        .add_removal_listener(Arc::new(
            move |key: &SourceKey, _: Option<&RasterSet>, cause: RemovalCause| {
                log.lock().unwrap().push((key.clone(), cause));
            },
        ))
        .await;

    let sources: Vec<RasterSource> = (0..3)
        .map(|i| RasterSource::from_bytes(format!("{}.png", i), Vec::<u8>::new()))
        .collect();
    for source in &sources {
        let raster = DataRaster::new_image(8, 8, sector);
        let size = raster.size_in_bytes();
        cache.put(source, Some(vec![raster]), size).await;
    }

    assert_eq!(cache.len().await, 2);
    assert!(cache.size().await <= cache.capacity());
    assert!(!cache.contains(&sources[0]).await);

    let removed = removed.lock().unwrap().clone();
    assert_eq!(
        removed,
        vec![(sources[0].key().clone(), RemovalCause::Evicted)]
    );
}
