//! Raster readers.
//!
//! Each supported container has a reader that can probe a [`RasterSource`],
//! decode it into [`DataRaster`]s, and derive its metadata without decoding
//! pixels. [`RasterReader`] closes the set over the four formats and
//! [`ReaderSet`] picks the first reader whose probe accepts a source.
//!
//! # Example
//!
//! ```ignore
//! use raster_tiler::reader::{DataRasterReader, RasterSource, ReaderSet};
//!
//! let readers = ReaderSet::default();
//! let source = RasterSource::from_path("n45e010.tif");
//! if let Some(reader) = readers.find_reader(&source).await {
//!     let rasters = reader.read(&source).await?;
//! }
//! ```

mod bil;
mod generic_image;
mod geotiff;
mod metadata;
mod rpf;
mod source;
mod world_file;

use async_trait::async_trait;
use tracing::debug;

use crate::error::{ProbeError, ReadError};
use crate::raster::DataRaster;

pub use bil::{BilReader, HdrFile, DEFAULT_MMAP_THRESHOLD};
pub use generic_image::GenericImageReader;
pub use geotiff::GeoTiffReader;
pub use metadata::{PartialMetadata, RasterMetadata};
pub use rpf::RpfReader;
pub use source::{RasterSource, SourceKey, SourceReader};
pub use world_file::{candidate_names, find_world_file, sector_from_world_file, WorldFile};

// =============================================================================
// DataRasterReader Trait
// =============================================================================

/// A reader for one raster container format.
#[async_trait]
pub trait DataRasterReader: Send + Sync {
    /// Short format name for logs.
    fn name(&self) -> &'static str;

    /// Whether this reader understands the source.
    async fn probe(&self, source: &RasterSource) -> Result<bool, ProbeError>;

    /// [`probe`](Self::probe) with errors treated as "no".
    async fn can_read(&self, source: &RasterSource) -> bool {
        match self.probe(source).await {
            Ok(accepted) => accepted,
            Err(e) => {
                debug!(
                    reader = self.name(),
                    source = %source.name(),
                    error = %e,
                    "probe failed"
                );
                false
            }
        }
    }

    /// Decode the source. Fails with [`ReadError::CannotRead`] if the
    /// reader does not accept it.
    async fn read(&self, source: &RasterSource) -> Result<Vec<DataRaster>, ReadError>;

    /// Complete metadata from `partial`, the source hints and the source itself.
    async fn read_metadata(
        &self,
        source: &RasterSource,
        partial: PartialMetadata,
    ) -> Result<RasterMetadata, ReadError>;
}

// =============================================================================
// RasterReader
// =============================================================================

/// The supported formats.
#[derive(Debug, Clone)]
pub enum RasterReader {
    GenericImage(GenericImageReader),
    GeoTiff(GeoTiffReader),
    Rpf(RpfReader),
    RawGrid(BilReader),
}

#[async_trait]
impl DataRasterReader for RasterReader {
    fn name(&self) -> &'static str {
        match self {
            RasterReader::GenericImage(_) => "image",
            RasterReader::GeoTiff(_) => "geotiff",
            RasterReader::Rpf(_) => "rpf",
            RasterReader::RawGrid(_) => "bil",
        }
    }

    async fn probe(&self, source: &RasterSource) -> Result<bool, ProbeError> {
        match self {
            RasterReader::GenericImage(r) => r.probe(source).await,
            RasterReader::GeoTiff(r) => r.probe(source).await,
            RasterReader::Rpf(r) => r.probe(source).await,
            RasterReader::RawGrid(r) => r.probe(source).await,
        }
    }

    async fn read(&self, source: &RasterSource) -> Result<Vec<DataRaster>, ReadError> {
        if !self.can_read(source).await {
            return Err(ReadError::CannotRead(format!(
                "{} reader does not accept {}",
                self.name(),
                source.name()
            )));
        }
        match self {
            RasterReader::GenericImage(r) => r.read(source).await,
            RasterReader::GeoTiff(r) => r.read(source).await,
            RasterReader::Rpf(r) => r.read(source).await,
            RasterReader::RawGrid(r) => r.read(source).await,
        }
    }

    async fn read_metadata(
        &self,
        source: &RasterSource,
        partial: PartialMetadata,
    ) -> Result<RasterMetadata, ReadError> {
        match self {
            RasterReader::GenericImage(r) => r.read_metadata(source, partial).await,
            RasterReader::GeoTiff(r) => r.read_metadata(source, partial).await,
            RasterReader::Rpf(r) => r.read_metadata(source, partial).await,
            RasterReader::RawGrid(r) => r.read_metadata(source, partial).await,
        }
    }
}

// =============================================================================
// ReaderSet
// =============================================================================

/// An ordered list of readers, owned by the caller.
#[derive(Debug, Clone)]
pub struct ReaderSet {
    readers: Vec<RasterReader>,
}

impl Default for ReaderSet {
    /// One reader per format.
    fn default() -> Self {
        Self::with_mmap_threshold(DEFAULT_MMAP_THRESHOLD)
    }
}

impl ReaderSet {
    pub fn new(readers: Vec<RasterReader>) -> Self {
        Self { readers }
    }

    /// One reader per format, memory-mapping grids above `bytes`.
    pub fn with_mmap_threshold(bytes: u64) -> Self {
        Self::new(vec![
            RasterReader::Rpf(RpfReader::new()),
            RasterReader::GeoTiff(GeoTiffReader::new()),
            RasterReader::GenericImage(GenericImageReader::new()),
            RasterReader::RawGrid(BilReader::new().with_mmap_threshold(bytes)),
        ])
    }

    pub fn readers(&self) -> &[RasterReader] {
        &self.readers
    }

    /// The first reader that accepts `source`.
    pub async fn find_reader(&self, source: &RasterSource) -> Option<&RasterReader> {
        for reader in &self.readers {
            if reader.can_read(source).await {
                debug!(reader = reader.name(), source = %source.name(), "selected reader");
                return Some(reader);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_probe_errors_collapse_to_false() {
        let missing = RasterSource::from_path("/nonexistent/dir/scan.png");
        let reader = RasterReader::GenericImage(GenericImageReader::new());
        assert!(reader.probe(&missing).await.is_err());
        assert!(!reader.can_read(&missing).await);
    }

    #[tokio::test]
    async fn test_read_rejects_unaccepted_source() {
        let reader = RasterReader::GeoTiff(GeoTiffReader::new());
        let source = RasterSource::from_bytes("notes.txt", b"hello".to_vec());
        assert!(matches!(
            reader.read(&source).await,
            Err(ReadError::CannotRead(_))
        ));
    }

    #[tokio::test]
    async fn test_find_reader_by_probe() {
        let readers = ReaderSet::default();
        assert_eq!(readers.readers().len(), 4);

        let grid = RasterSource::from_bytes("n45.bil", vec![0u8; 8]);
        assert_eq!(readers.find_reader(&grid).await.unwrap().name(), "bil");

        let unknown = RasterSource::from_bytes("notes.txt", b"hello".to_vec());
        assert!(readers.find_reader(&unknown).await.is_none());
    }
}
