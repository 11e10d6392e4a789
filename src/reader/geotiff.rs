//! GeoTIFF (and world-file TIFF) reader.

use tracing::{debug, warn};

use crate::error::{ProbeError, ReadError, TiffError};
use crate::format::tiff::{DecodedImage, GeoReference, TiffDecoder, TIFF_HEADER_SIZE};
use crate::format::is_tiff_header;
use crate::raster::{DataRaster, ElementBuffer, ElementType, PixelFormat, Sector};

use super::metadata::{PartialMetadata, RasterMetadata};
use super::source::{RasterSource, SourceReader};
use super::world_file::sector_from_world_file;

const SUFFIXES: &[&str] = &["tif", "tiff", "gtif"];

/// Split TIFF errors into the reader taxonomy.
pub(crate) fn tiff_error(err: TiffError) -> ReadError {
    match err {
        TiffError::ProjectionUnsupported(message) => ReadError::ProjectionUnsupported(message),
        e if e.is_unsupported() => ReadError::UnsupportedFormat {
            reason: e.to_string(),
        },
        e => ReadError::Tiff(e),
    }
}

#[derive(Debug, Clone, Default)]
pub struct GeoTiffReader;

impl GeoTiffReader {
    pub fn new() -> Self {
        Self
    }

    pub async fn probe(&self, source: &RasterSource) -> Result<bool, ProbeError> {
        if let Some(suffix) = source.suffix() {
            if !SUFFIXES.contains(&suffix.as_str()) {
                return Ok(false);
            }
        }
        let head = source.read_head(TIFF_HEADER_SIZE).await?;
        Ok(is_tiff_header(&head))
    }

    async fn open(&self, source: &RasterSource) -> Result<TiffDecoder<SourceReader>, ReadError> {
        let reader = source.range_reader().await?;
        TiffDecoder::open(reader).await.map_err(tiff_error)
    }

    /// Geo tags first, then caller hints, then a world file.
    async fn locate(
        &self,
        source: &RasterSource,
        partial: &PartialMetadata,
        geo: Option<&GeoReference>,
        width: u32,
        height: u32,
    ) -> Result<Option<Sector>, ReadError> {
        if let Some(geo) = geo {
            return geo.sector(width, height).map(Some).map_err(tiff_error);
        }
        if let Some(sector) = partial.sector.or(source.hints().sector) {
            return Ok(Some(sector));
        }
        match source.path() {
            Some(path) => sector_from_world_file(path, width, height).await,
            None => Ok(None),
        }
    }

    /// Decode every image sharing the first image's size and geo-referencing.
    pub async fn read(&self, source: &RasterSource) -> Result<Vec<DataRaster>, ReadError> {
        let decoder = self.open(source).await?;
        let (width, height) = decoder.dimensions(0).await.map_err(tiff_error)?;
        let geo = decoder.geo_reference(0).await.map_err(tiff_error)?;
        let sector = self
            .locate(source, &PartialMetadata::default(), geo.as_ref(), width, height)
            .await?
            .ok_or_else(|| ReadError::MissingMetadata {
                source_name: source.name(),
                missing: "sector".to_string(),
            })?;

        let mut rasters = Vec::new();
        for index in 0..decoder.image_count() {
            if index > 0 {
                let same_size = decoder.dimensions(index).await.ok() == Some((width, height));
                let same_geo = match decoder.geo_reference(index).await {
                    Ok(other) => other == geo,
                    Err(e) => {
                        warn!(source = %source.name(), index, error = %e, "unreadable geo tags");
                        false
                    }
                };
                if !(same_size && same_geo) {
                    debug!(source = %source.name(), index, "skipping image with other geo-referencing");
                    continue;
                }
            }

            let image = decoder.decode(index).await.map_err(tiff_error)?;
            let missing_data = decoder
                .nodata(index)
                .await
                .map_err(tiff_error)?
                .or(source.hints().missing_data);
            rasters.push(to_raster(source, image, sector, missing_data)?);
        }

        debug!(
            source = %source.name(),
            rasters = rasters.len(),
            %sector,
            "read GeoTIFF"
        );
        Ok(rasters)
    }

    pub async fn read_metadata(
        &self,
        source: &RasterSource,
        partial: PartialMetadata,
    ) -> Result<RasterMetadata, ReadError> {
        let decoder = self.open(source).await?;
        let info = decoder.image_info(0).await.map_err(tiff_error)?;
        let geo = decoder.geo_reference(0).await.map_err(tiff_error)?;
        let sector = self
            .locate(source, &partial, geo.as_ref(), info.width, info.height)
            .await?;

        let element_type = info.element_type();
        let (pixel_format, element_type) = match element_type {
            ElementType::U8 => (PixelFormat::Image, None),
            other => (PixelFormat::Elevation, Some(other)),
        };
        let derived = PartialMetadata {
            width: Some(info.width),
            height: Some(info.height),
            sector,
            pixel_format: Some(pixel_format),
            element_type,
            byte_order: Some(decoder.byte_order()),
            missing_data: decoder.nodata(0).await.map_err(tiff_error)?,
        };
        derived.or(&partial).complete(&source.name())
    }
}

/// 8-bit images become imagery, wider samples become elevation buffers.
fn to_raster(
    source: &RasterSource,
    image: DecodedImage,
    sector: Sector,
    missing_data: Option<f64>,
) -> Result<DataRaster, ReadError> {
    if image.data.element_type() == ElementType::U8 {
        let rgba = image.to_rgba().ok_or_else(|| ReadError::UnsupportedFormat {
            reason: format!("{} bands of 8-bit samples", image.bands),
        })?;
        return Ok(DataRaster::from_image(rgba, sector));
    }

    let (width, height, bands) = (image.width, image.height, image.bands);
    ElementBuffer::from_data(width, height, bands, image.data, missing_data)
        .map(|buffer| DataRaster::from_buffer(buffer, sector))
        .ok_or_else(|| ReadError::InvalidMetadata {
            source_name: source.name(),
            message: format!("decoded data shorter than {}x{}x{}", width, height, bands),
        })
}
