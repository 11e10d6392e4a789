//! Tile production integration tests.
//!
//! Tests verify:
//! - A source whose sector is exactly one tile is copied into it unchanged
//! - Multi-level pyramids write every tile and a matching descriptor
//! - Mosaics from several sources
//! - Write failures and cancellation remove the output a run created, and
//!   leave what was already there
//! - Progress only moves forward and ends at 1

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use image::Rgba;

use raster_tiler::{
    DatasetDescriptor, ElementType, PartialMetadata, PixelFormat, ProduceError, ProducerState,
    ProductionParams, RasterCache, RasterSource, ReaderSet, Sector, TileFormat, TileProducer,
};

use super::test_utils::{
    f32_geotiff, read_f32_tile, read_i16_tile, rgb_geotiff, write_bil, write_file,
};

fn producer(params: ProductionParams) -> TileProducer {
    TileProducer::new(
        params,
        Arc::new(ReaderSet::default()),
        Arc::new(RasterCache::new()),
    )
}

fn float_params(output: &Path, tile_dimension: u32) -> ProductionParams {
    ProductionParams::elevation(output)
        .with_dataset_name("dem")
        .with_tile_dimension(tile_dimension)
        .with_pixel_type(ElementType::F32)
        .with_missing_data(-9999.0)
}

fn tiff_source(dir: &Path, name: &str, values: &[f32; 4], sector: &Sector) -> RasterSource {
    RasterSource::from_path(write_file(dir, name, &f32_geotiff(2, 2, values, sector)))
}

// =============================================================================
// End to End
// =============================================================================

#[tokio::test]
async fn test_single_tile_is_exact_copy() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    let sector = Sector::new(0.0, 1.0, 0.0, 1.0);
    let source = tiff_source(input.path(), "dem.tif", &[1.0, 2.0, 3.0, 4.0], &sector);

    let producer = producer(float_params(output.path(), 2));
    let summary = producer.produce(vec![source]).await.unwrap();

    assert_eq!(producer.state(), ProducerState::Completed);
    assert_eq!(producer.progress(), 1.0);
    assert_eq!(summary.level_count, 1);
    assert_eq!(summary.tiles_written, 1);
    assert_eq!(summary.dataset_dir, output.path().join("dem"));

    let tile = summary.dataset_dir.join("0").join("90").join("180.bil");
    assert_eq!(read_f32_tile(&tile), vec![1.0, 2.0, 3.0, 4.0]);

    let descriptor = DatasetDescriptor::read(&summary.descriptor_path).await.unwrap();
    assert_eq!(descriptor.dataset, "dem");
    assert_eq!(descriptor.sector, sector);
    assert_eq!(descriptor.level_count, 1);
    assert_eq!(descriptor.tile_dimension, 2);
    assert_eq!(descriptor.level_zero_tile_delta.lat, 1.0);
    assert_eq!(descriptor.format_suffix, TileFormat::Bil);
    assert_eq!(descriptor.pixel_type, Some(ElementType::F32));
    assert_eq!(descriptor.missing_data, Some(-9999.0));
    assert_eq!(descriptor.tile_count, 1);
}

#[tokio::test]
async fn test_two_level_pyramid_from_grid() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    let sector = Sector::new(0.0, 2.0, 0.0, 2.0);
    let values: Vec<i16> = (1..=9).collect();
    let grid = write_bil(input.path(), "n00e000", 3, 3, &values, &sector);

    let params = ProductionParams::elevation(output.path())
        .with_dataset_name("grid")
        .with_tile_dimension(2);
    let producer = producer(params);
    let summary = producer
        .produce(vec![RasterSource::from_path(grid)])
        .await
        .unwrap();

    // Point pixel size 1 degree, finest tile 1 degree, extent 2 degrees
    assert_eq!(summary.level_count, 2);
    assert_eq!(summary.tiles_written, 5);

    let dir = &summary.dataset_dir;
    assert!(dir.join("0/45/90.bil").exists());
    for (row, col) in [(90, 180), (90, 181), (91, 180), (91, 181)] {
        let tile = dir.join(format!("1/{}/{}.bil", row, col));
        assert_eq!(std::fs::metadata(&tile).unwrap().len(), 2 * 2 * 2, "{}", tile.display());
    }

    let descriptor = DatasetDescriptor::read(&summary.descriptor_path).await.unwrap();
    assert_eq!(descriptor.level_count, 2);
    assert_eq!(descriptor.level_zero_tile_delta.lon, 2.0);
    assert_eq!(descriptor.pixel_type, Some(ElementType::I16));
    assert_eq!(descriptor.tile_count, 5);
}

#[tokio::test]
async fn test_mosaic_of_adjacent_sources() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    let west = tiff_source(
        input.path(),
        "west.tif",
        &[1.0, 2.0, 3.0, 4.0],
        &Sector::new(0.0, 1.0, 0.0, 1.0),
    );
    let east = tiff_source(
        input.path(),
        "east.tif",
        &[5.0, 6.0, 7.0, 8.0],
        &Sector::new(0.0, 1.0, 1.0, 2.0),
    );

    let producer = producer(float_params(output.path(), 2));
    let summary = producer.produce(vec![west, east]).await.unwrap();
    assert_eq!(summary.level_count, 2);

    let dir = &summary.dataset_dir;
    assert_eq!(read_f32_tile(&dir.join("1/90/180.bil")), vec![1.0, 2.0, 3.0, 4.0]);
    assert_eq!(read_f32_tile(&dir.join("1/90/181.bil")), vec![5.0, 6.0, 7.0, 8.0]);

    // The level-zero tile spans (0, 2); its northern row has no source
    let top = read_f32_tile(&dir.join("0/45/90.bil"));
    assert_eq!(&top[..2], &[-9999.0, -9999.0]);
}

#[tokio::test]
async fn test_imagery_png_tiles() {
    let output = tempfile::tempdir().unwrap();
    let sector = Sector::new(10.0, 11.0, 20.0, 21.0);
    let source = RasterSource::from_bytes("scan.tif", rgb_geotiff(4, 4, [40, 80, 120], None))
        .with_hints(PartialMetadata::new().with_sector(sector));

    let params = ProductionParams::imagery(output.path())
        .with_dataset_name("scan")
        .with_tile_dimension(4);
    let producer = producer(params);
    let summary = producer.produce(vec![source]).await.unwrap();
    assert_eq!(summary.level_count, 1);

    let tile = image::open(summary.dataset_dir.join("0/100/200.png"))
        .unwrap()
        .to_rgba8();
    assert_eq!(tile.dimensions(), (4, 4));
    assert_eq!(*tile.get_pixel(0, 0), Rgba([40, 80, 120, 255]));
    assert_eq!(*tile.get_pixel(3, 3), Rgba([40, 80, 120, 255]));

    let descriptor = DatasetDescriptor::read(&summary.descriptor_path).await.unwrap();
    assert_eq!(descriptor.kind, PixelFormat::Image);
    assert_eq!(descriptor.pixel_type, None);
}

// =============================================================================
// Validation
// =============================================================================

#[tokio::test]
async fn test_source_of_wrong_kind_is_rejected() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    let sector = Sector::new(0.0, 1.0, 0.0, 1.0);
    let source = tiff_source(input.path(), "dem.tif", &[1.0; 4], &sector);

    let producer = producer(ProductionParams::imagery(output.path()));
    assert!(matches!(
        producer.produce(vec![source]).await,
        Err(ProduceError::InvalidSource { .. })
    ));
    assert_eq!(producer.state(), ProducerState::Failed);
    assert!(!output.path().join("dataset").exists());
}

// =============================================================================
// Rollback
// =============================================================================

#[tokio::test]
async fn test_write_failure_removes_only_new_directories() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    let sector = Sector::new(0.0, 2.0, 0.0, 2.0);
    let grid = write_bil(input.path(), "n00e000", 3, 3, &[5; 9], &sector);

    // A file where the level-one directory belongs, next to unrelated content
    let dataset = output.path().join("grid");
    std::fs::create_dir_all(&dataset).unwrap();
    std::fs::write(dataset.join("1"), b"").unwrap();
    std::fs::write(dataset.join("notes.txt"), b"keep me").unwrap();

    let params = ProductionParams::elevation(output.path())
        .with_dataset_name("grid")
        .with_tile_dimension(2);
    let producer = producer(params);
    assert!(matches!(
        producer.produce(vec![RasterSource::from_path(grid)]).await,
        Err(ProduceError::WriteFailure { .. })
    ));
    assert_eq!(producer.state(), ProducerState::Failed);

    // Level zero was created by the run and is gone; what was there stays
    assert!(!dataset.join("0").exists());
    assert!(dataset.join("1").is_file());
    assert_eq!(std::fs::read(dataset.join("notes.txt")).unwrap(), b"keep me");
    assert!(!dataset.join("grid.json").exists());
}

#[tokio::test]
async fn test_cancellation_removes_dataset() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    let sector = Sector::new(0.0, 1.0, 0.0, 1.0);
    let source = tiff_source(input.path(), "dem.tif", &[1.0; 4], &sector);

    let producer = producer(float_params(output.path(), 2));
    producer.cancel_handle().cancel();
    assert!(matches!(
        producer.produce(vec![source]).await,
        Err(ProduceError::Cancelled)
    ));
    assert_eq!(producer.state(), ProducerState::Failed);
    assert!(!output.path().join("dem").exists());
}

#[tokio::test]
async fn test_cancelled_rerun_keeps_previous_output() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    let sector = Sector::new(0.0, 1.0, 0.0, 1.0);
    let source = tiff_source(input.path(), "dem.tif", &[1.0, 2.0, 3.0, 4.0], &sector);

    let first = producer(float_params(output.path(), 2));
    let summary = first.produce(vec![source.clone()]).await.unwrap();
    let tile = summary.dataset_dir.join("0/90/180.bil");

    let rerun = producer(float_params(output.path(), 2));
    rerun.cancel_handle().cancel();
    assert!(matches!(
        rerun.produce(vec![source]).await,
        Err(ProduceError::Cancelled)
    ));

    assert_eq!(read_f32_tile(&tile), vec![1.0, 2.0, 3.0, 4.0]);
    assert!(summary.descriptor_path.exists());
}

// =============================================================================
// Progress
// =============================================================================

#[tokio::test]
async fn test_progress_is_monotonic() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    let sector = Sector::new(0.0, 2.0, 0.0, 2.0);
    let grid = write_bil(input.path(), "n00e000", 3, 3, &[7; 9], &sector);

    let params = ProductionParams::elevation(output.path()).with_tile_dimension(2);
    let producer = producer(params);
    let mut progress = producer.subscribe_progress();
    let mut states = producer.subscribe_state();

    let watch = async {
        let mut seen = vec![*progress.borrow()];
        while *progress.borrow() < 1.0 {
            if progress.changed().await.is_err() {
                break;
            }
            seen.push(*progress.borrow_and_update());
        }
        seen
    };
    let (result, seen) = tokio::time::timeout(
        Duration::from_secs(30),
        async { tokio::join!(producer.produce(vec![RasterSource::from_path(grid)]), watch) },
    )
    .await
    .unwrap();

    let summary = result.unwrap();
    assert!(seen.windows(2).all(|w| w[0] <= w[1]), "{:?}", seen);
    assert_eq!(seen.last().copied(), Some(1.0));
    assert_eq!(*states.borrow_and_update(), ProducerState::Completed);

    let first = read_i16_tile(&summary.dataset_dir.join("1/90/180.bil"));
    assert!(first.iter().all(|v| *v == 7), "{:?}", first);
}
