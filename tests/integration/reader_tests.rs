//! Reader integration tests.
//!
//! Tests verify:
//! - The default reader set picks the right reader for each container
//! - RPF frames are placed by file name, or by header coverage when the
//!   name does not resolve
//! - Images are placed by world files or caller hints
//! - Grids are read with their `.hdr` sidecar

use std::io::Cursor;

use image::{ImageFormat, Rgba, RgbaImage};

use raster_tiler::format::rpf::sector_from_filename;
use raster_tiler::{
    DataRasterReader, ElementType, PartialMetadata, PixelFormat, RasterSource, ReadError,
    ReaderSet, Sector,
};

use super::test_utils::{f32_geotiff, rpf_frame, write_bil, write_file};

fn png_bytes(width: u32, height: u32, colour: [u8; 4]) -> Vec<u8> {
    let image = RgbaImage::from_pixel(width, height, Rgba(colour));
    let mut out = Cursor::new(Vec::new());
    image.write_to(&mut out, ImageFormat::Png).unwrap();
    out.into_inner()
}

// =============================================================================
// Reader Selection
// =============================================================================

#[tokio::test]
async fn test_reader_selection_by_content() {
    let dir = tempfile::tempdir().unwrap();
    let sector = Sector::new(0.0, 1.0, 0.0, 1.0);
    let tif = write_file(dir.path(), "dem.tif", &f32_geotiff(2, 2, &[1.0; 4], &sector));
    let png = write_file(dir.path(), "scan.png", &png_bytes(2, 2, [0, 0, 0, 255]));
    let frame = write_file(dir.path(), "00000011.ON1", &rpf_frame([1, 2, 3], None));
    let grid = write_bil(dir.path(), "n00e000", 2, 2, &[0; 4], &sector);

    let readers = ReaderSet::default();
    for (path, expected) in [(tif, "geotiff"), (png, "image"), (frame, "rpf"), (grid, "bil")] {
        let source = RasterSource::from_path(&path);
        let reader = readers.find_reader(&source).await.unwrap();
        assert_eq!(reader.name(), expected, "{}", path.display());
    }
}

#[tokio::test]
async fn test_file_url_source() {
    let dir = tempfile::tempdir().unwrap();
    let sector = Sector::new(5.0, 6.0, 7.0, 8.0);
    let path = write_file(dir.path(), "dem.tif", &f32_geotiff(2, 2, &[1.0; 4], &sector));
    let url = format!("file://{}", path.display());

    let source = RasterSource::from_url(&url).unwrap();
    assert_eq!(source.path(), Some(path.as_path()));

    let readers = ReaderSet::default();
    let reader = readers.find_reader(&source).await.unwrap();
    let meta = reader
        .read_metadata(&source, PartialMetadata::default())
        .await
        .unwrap();
    assert_eq!(meta.sector, sector);
    assert_eq!(meta.pixel_format, PixelFormat::Elevation);
    assert_eq!(meta.element_type, Some(ElementType::F32));
}

// =============================================================================
// RPF
// =============================================================================

#[tokio::test]
async fn test_rpf_frame_placed_by_file_name() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(dir.path(), "00000011.ON1", &rpf_frame([200, 100, 50], None));
    let source = RasterSource::from_path(&path);

    let readers = ReaderSet::default();
    let reader = readers.find_reader(&source).await.unwrap();
    let rasters = reader.read(&source).await.unwrap();
    assert_eq!(rasters.len(), 1);

    let expected = sector_from_filename("00000011.ON1").unwrap();
    assert_eq!(rasters[0].sector(), expected);
    assert_eq!(rasters[0].pixel_format(), PixelFormat::Image);
    let image = rasters[0].as_image().unwrap();
    assert_eq!(image.get_pixel(10, 10).0, [200, 100, 50, 255]);
}

#[tokio::test]
async fn test_rpf_unknown_series_falls_back_to_coverage() {
    let dir = tempfile::tempdir().unwrap();
    let coverage = Sector::new(85.0, 90.0, -180.0, 180.0);
    let name = "00000011.XX9";
    let path = write_file(dir.path(), name, &rpf_frame([7, 8, 9], Some(&coverage)));
    let source = RasterSource::from_path(&path);

    assert_eq!(sector_from_filename(name), None);

    let readers = ReaderSet::default();
    let reader = readers.find_reader(&source).await.unwrap();
    assert_eq!(reader.name(), "rpf");

    let meta = reader
        .read_metadata(&source, PartialMetadata::default())
        .await
        .unwrap();
    assert_eq!(meta.sector, coverage);
    assert_eq!((meta.width, meta.height), (1536, 1536));

    let rasters = reader.read(&source).await.unwrap();
    assert_eq!(rasters.len(), 1);
    assert_eq!(rasters[0].sector(), coverage);
}

#[tokio::test]
async fn test_rpf_unknown_series_without_coverage() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(dir.path(), "00000011.XX9", &rpf_frame([7, 8, 9], None));
    let source = RasterSource::from_path(&path);

    let readers = ReaderSet::default();
    let reader = readers.find_reader(&source).await.unwrap();
    assert!(matches!(
        reader.read(&source).await,
        Err(ReadError::MissingMetadata { .. })
    ));
}

// =============================================================================
// Images
// =============================================================================

#[tokio::test]
async fn test_png_with_world_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(dir.path(), "scan.png", &png_bytes(4, 2, [10, 20, 30, 255]));
    // Pixel centres: upper-left pixel at (10.5, 51.5), one degree per pixel
    write_file(dir.path(), "scan.pgw", b"1.0\n0.0\n0.0\n-1.0\n10.5\n51.5\n");

    let source = RasterSource::from_path(&path);
    let readers = ReaderSet::default();
    let reader = readers.find_reader(&source).await.unwrap();
    let meta = reader
        .read_metadata(&source, PartialMetadata::default())
        .await
        .unwrap();
    assert_eq!(meta.sector, Sector::new(50.0, 52.0, 10.0, 14.0));
    assert_eq!((meta.width, meta.height), (4, 2));
    assert_eq!(meta.pixel_format, PixelFormat::Image);

    let rasters = reader.read(&source).await.unwrap();
    assert_eq!(rasters[0].sector(), meta.sector);
    assert_eq!(rasters[0].as_image().unwrap().get_pixel(3, 1).0, [10, 20, 30, 255]);
}

#[tokio::test]
async fn test_in_memory_png_with_hints() {
    let sector = Sector::new(-10.0, -9.0, 100.0, 101.0);
    let source = RasterSource::from_bytes("tile.png", png_bytes(3, 3, [1, 1, 1, 255]))
        .with_hints(PartialMetadata::new().with_sector(sector));

    let readers = ReaderSet::default();
    let reader = readers.find_reader(&source).await.unwrap();
    let rasters = reader.read(&source).await.unwrap();
    assert_eq!(rasters[0].sector(), sector);
    assert_eq!(rasters[0].width(), 3);
}

#[tokio::test]
async fn test_png_without_sector() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(dir.path(), "scan.png", &png_bytes(2, 2, [0, 0, 0, 255]));
    let source = RasterSource::from_path(&path);

    let readers = ReaderSet::default();
    let reader = readers.find_reader(&source).await.unwrap();
    assert!(matches!(
        reader.read_metadata(&source, PartialMetadata::default()).await,
        Err(ReadError::MissingMetadata { .. })
    ));
}

// =============================================================================
// Grids
// =============================================================================

#[tokio::test]
async fn test_bil_grid_with_hdr() {
    let dir = tempfile::tempdir().unwrap();
    let sector = Sector::new(45.0, 46.0, 10.0, 12.0);
    let path = write_bil(dir.path(), "n45e010", 4, 2, &[1, 2, 3, 4, 5, 6, 7, -9999], &sector);
    let source = RasterSource::from_path(&path);

    let readers = ReaderSet::default();
    let reader = readers.find_reader(&source).await.unwrap();
    let meta = reader
        .read_metadata(&source, PartialMetadata::default())
        .await
        .unwrap();
    assert_eq!(meta.sector, sector);
    assert_eq!(meta.element_type, Some(ElementType::I16));
    assert_eq!(meta.missing_data, Some(-9999.0));

    let rasters = reader.read(&source).await.unwrap();
    let buffer = rasters[0].as_buffer().unwrap();
    assert_eq!(buffer.get(0, 1, 0), 5.0);
    assert!(buffer.is_missing(buffer.get(3, 1, 0)));
}
