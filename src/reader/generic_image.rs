//! PNG, JPEG, GIF and BMP images geo-referenced by hints or a world file.

use std::io::Cursor;

use image::{ImageFormat, ImageReader};
use tracing::debug;

use crate::error::{ProbeError, ReadError};
use crate::raster::{DataRaster, PixelFormat};

use super::metadata::{PartialMetadata, RasterMetadata};
use super::source::RasterSource;
use super::world_file::sector_from_world_file;

const SUFFIXES: &[&str] = &["png", "jpg", "jpeg", "gif", "bmp"];

/// Enough leading bytes for every supported magic number.
const MAGIC_LEN: usize = 16;

fn is_supported(format: ImageFormat) -> bool {
    matches!(
        format,
        ImageFormat::Png | ImageFormat::Jpeg | ImageFormat::Gif | ImageFormat::Bmp
    )
}

#[derive(Debug, Clone, Default)]
pub struct GenericImageReader;

impl GenericImageReader {
    pub fn new() -> Self {
        Self
    }

    /// Known suffix (or none) and a matching magic number.
    pub async fn probe(&self, source: &RasterSource) -> Result<bool, ProbeError> {
        if let Some(suffix) = source.suffix() {
            if !SUFFIXES.contains(&suffix.as_str()) {
                return Ok(false);
            }
        }
        let head = source.read_head(MAGIC_LEN).await?;
        Ok(image::guess_format(&head).map(is_supported).unwrap_or(false))
    }

    pub async fn read(&self, source: &RasterSource) -> Result<Vec<DataRaster>, ReadError> {
        let bytes = source.read_all().await?;
        let image = image::load_from_memory(&bytes)?.to_rgba8();
        let sector = locate(source, &PartialMetadata::default(), image.width(), image.height())
            .await?
            .ok_or_else(|| ReadError::MissingMetadata {
                source_name: source.name(),
                missing: "sector".to_string(),
            })?;
        debug!(
            source = %source.name(),
            width = image.width(),
            height = image.height(),
            %sector,
            "decoded image"
        );
        Ok(vec![DataRaster::from_image(image, sector)])
    }

    pub async fn read_metadata(
        &self,
        source: &RasterSource,
        partial: PartialMetadata,
    ) -> Result<RasterMetadata, ReadError> {
        let bytes = source.read_all().await?;
        let (width, height) = ImageReader::new(Cursor::new(&bytes[..]))
            .with_guessed_format()
            .map_err(|e| ReadError::Image(e.to_string()))?
            .into_dimensions()?;

        let sector = locate(source, &partial, width, height).await?;
        let derived = PartialMetadata {
            width: Some(width),
            height: Some(height),
            sector,
            pixel_format: Some(PixelFormat::Image),
            ..PartialMetadata::default()
        };
        derived.or(&partial).complete(&source.name())
    }
}

/// Sector from the caller, the source hints, or a world file.
async fn locate(
    source: &RasterSource,
    partial: &PartialMetadata,
    width: u32,
    height: u32,
) -> Result<Option<crate::raster::Sector>, ReadError> {
    if let Some(sector) = partial.sector.or(source.hints().sector) {
        return Ok(Some(sector));
    }
    match source.path() {
        Some(path) => sector_from_world_file(path, width, height).await,
        None => Ok(None),
    }
}
