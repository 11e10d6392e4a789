//! # raster-tiler
//!
//! Decodes geo-referenced rasters and produces multi-resolution tile
//! pyramids on disk.
//!
//! ## Features
//!
//! - **Format support**: strip TIFF/GeoTIFF (uncompressed and LZW), RPF
//!   frames (CADRG/CIB), raw BIL grids with `.hdr` sidecars, and PNG, JPEG,
//!   GIF or BMP images referenced by world files
//! - **Compositing**: nearest-neighbour resampling of any raster onto a
//!   canvas by geographic sector
//! - **Caching**: decoded rasters are cached by source with a byte budget,
//!   and concurrent loads of one source are shared
//! - **Production**: bounded, cancellable tile writing with progress
//!   reporting and rollback of partial output
//!
//! ## Architecture
//!
//! - [`io`] - Range reads over files and memory
//! - [`mod@format`] - TIFF/GeoTIFF codec and RPF frame decoding
//! - [`raster`] - Sectors, element buffers, rasters and compositing
//! - [`reader`] - Source probing, decoding and metadata
//! - [`cache`] - Decoded raster cache
//! - [`produce`] - Pyramid geometry, tile production and the dataset descriptor
//! - [`config`] - CLI and configuration types
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use raster_tiler::{ProductionParams, RasterCache, RasterSource, ReaderSet, TileProducer};
//!
//! #[tokio::main]
//! async fn main() {
//!     let producer = TileProducer::new(
//!         ProductionParams::elevation("/tmp/tiles").with_dataset_name("dem"),
//!         Arc::new(ReaderSet::default()),
//!         Arc::new(RasterCache::new()),
//!     );
//!     let summary = producer
//!         .produce(vec![RasterSource::from_path("n45e010.tif")])
//!         .await;
//!     println!("{:?}", summary);
//! }
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod format;
pub mod io;
pub mod produce;
pub mod raster;
pub mod reader;

// Re-export commonly used types
pub use cache::{CacheLookup, RasterCache, RasterSet, RemovalCause, RemovalListener};
pub use config::{Cli, Command, InfoConfig, ProduceConfig};
pub use error::{IoError, ProbeError, ProduceError, ReadError, RpfError, TiffError};
pub use format::tiff::{GeoReference, GeoTiffWriter, TiffDecoder};
pub use format::is_tiff_header;
pub use io::{ByteOrder, FileRangeReader, MemoryRangeReader, RangeReader};
pub use produce::{
    CancelHandle, DatasetDescriptor, ProducerState, ProductionParams, ProductionSummary, Pyramid,
    TileFormat, TileKey, TileProducer,
};
pub use raster::{
    draw_on_canvas, DataRaster, ElementBuffer, ElementData, ElementType, PixelFormat, Sector,
};
pub use reader::{
    DataRasterReader, PartialMetadata, RasterMetadata, RasterReader, RasterSource, ReaderSet,
};
