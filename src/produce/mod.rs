//! Tile pyramid production.
//!
//! [`TileProducer`] turns a set of sources into a directory of tiles laid
//! out as `<output>/<dataset>/<level>/<row>/<col>.<suffix>` plus a JSON
//! [`DatasetDescriptor`].

mod descriptor;
mod params;
mod producer;
mod pyramid;
mod writer;

pub use descriptor::{DatasetDescriptor, DESCRIPTOR_FORMAT_VERSION};
pub use params::{
    ProductionParams, ResolvedParams, TileFormat, DEFAULT_DATASET_NAME,
    DEFAULT_ELEVATION_MISSING_DATA, DEFAULT_TILE_DIMENSION, DEFAULT_WRITER_COUNT,
    MAX_LEVEL_ZERO_DELTA,
};
pub use producer::{CancelHandle, ProducerState, ProductionSummary, TileProducer};
pub use pyramid::{Pyramid, SourceExtent, TileDelta, TileKey};
pub use writer::{Progress, TileEncoder, WriterPool};
