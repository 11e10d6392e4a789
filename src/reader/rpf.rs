//! CADRG / CIB frame file reader.

use tracing::{debug, warn};

use crate::error::{ProbeError, ReadError};
use crate::format::rpf::{
    decode_frame, frame_geometry, read_coverage, FrameGeometry, RpfFilename, FRAME_PIXELS,
    HEADER_SIZE,
};
use crate::raster::{DataRaster, PixelFormat, Sector};

use super::metadata::{PartialMetadata, RasterMetadata};
use super::source::RasterSource;

#[derive(Debug, Clone, Default)]
pub struct RpfReader;

impl RpfReader {
    pub fn new() -> Self {
        Self
    }

    /// An `FFFFFVVP.DDZ` name and a valid byte order flag.
    pub async fn probe(&self, source: &RasterSource) -> Result<bool, ProbeError> {
        let Some(name) = source.file_name() else {
            return Ok(false);
        };
        if RpfFilename::parse(&name).is_none() {
            return Ok(false);
        }
        let head = source.read_head(HEADER_SIZE).await?;
        Ok(head.len() == HEADER_SIZE && matches!(head[0], 0x00 | 0xFF))
    }

    fn geometry(&self, source: &RasterSource) -> Option<FrameGeometry> {
        let name = source.file_name()?;
        let parsed = RpfFilename::parse(&name)?;
        let geometry = frame_geometry(&parsed);
        if geometry.is_none() {
            warn!(
                source = %source.name(),
                frame = %parsed,
                "no frame geometry for file name, falling back to header coverage"
            );
        }
        geometry
    }

    /// Header coverage, then caller hints. Failures are logged, not raised.
    fn fallback_sector(
        &self,
        source: &RasterSource,
        coverage: Result<Option<Sector>, crate::error::RpfError>,
        partial: &PartialMetadata,
    ) -> Option<Sector> {
        match coverage {
            Ok(Some(sector)) => return Some(sector),
            Ok(None) => warn!(source = %source.name(), "frame has no coverage section"),
            Err(e) => warn!(source = %source.name(), error = %e, "unreadable coverage section"),
        }
        partial.sector.or(source.hints().sector)
    }

    pub async fn read(&self, source: &RasterSource) -> Result<Vec<DataRaster>, ReadError> {
        let bytes = source.read_all().await?;
        let frame = decode_frame(&bytes)?;

        let rasters = match self.geometry(source) {
            Some(FrameGeometry::Rectangular(sector)) => {
                vec![DataRaster::from_image(frame.image, sector)]
            }
            Some(FrameGeometry::Polar(polar)) => polar
                .deproject(&frame.image, FRAME_PIXELS)
                .into_iter()
                .map(|(sector, image)| DataRaster::from_image(image, sector))
                .collect(),
            None => {
                let sector = self
                    .fallback_sector(source, Ok(frame.coverage), &PartialMetadata::default())
                    .ok_or_else(|| ReadError::MissingMetadata {
                        source_name: source.name(),
                        missing: "sector".to_string(),
                    })?;
                vec![DataRaster::from_image(frame.image, sector)]
            }
        };

        debug!(source = %source.name(), rasters = rasters.len(), "read RPF frame");
        Ok(rasters)
    }

    pub async fn read_metadata(
        &self,
        source: &RasterSource,
        partial: PartialMetadata,
    ) -> Result<RasterMetadata, ReadError> {
        let sector = match self.geometry(source) {
            Some(geometry) => Some(geometry.sector()),
            None => {
                let bytes = source.read_all().await?;
                self.fallback_sector(source, read_coverage(&bytes), &partial)
            }
        };
        let derived = PartialMetadata {
            width: Some(FRAME_PIXELS),
            height: Some(FRAME_PIXELS),
            sector,
            pixel_format: Some(PixelFormat::Image),
            ..PartialMetadata::default()
        };
        derived.or(&partial).complete(&source.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_probe_requires_name_and_flag() {
        let reader = RpfReader::new();
        let mut header = vec![0u8; HEADER_SIZE];
        assert!(reader
            .probe(&RasterSource::from_bytes("00000011.ON1", header.clone()))
            .await
            .unwrap());
        assert!(!reader
            .probe(&RasterSource::from_bytes("frame.on1", header.clone()))
            .await
            .unwrap());

        header[0] = 0x12;
        assert!(!reader
            .probe(&RasterSource::from_bytes("00000011.ON1", header))
            .await
            .unwrap());
        assert!(!reader
            .probe(&RasterSource::from_bytes("00000011.ON1", vec![0u8; 4]))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_metadata_from_file_name() {
        let source = RasterSource::from_bytes("00000011.ON1", vec![0u8; HEADER_SIZE]);
        let meta = RpfReader::new()
            .read_metadata(&source, PartialMetadata::new())
            .await
            .unwrap();
        assert_eq!(meta.width, FRAME_PIXELS);
        assert_eq!(meta.sector.min_lat, 0.0);
        assert_eq!(meta.sector.min_lon, -180.0);
    }
}
