//! Command-line configuration for raster-tiler.
//!
//! Every option can also be set through an environment variable with the
//! `RT_` prefix:
//!
//! - `RT_OUTPUT` - Output directory (required for `produce`)
//! - `RT_DATASET` - Dataset name (default: dataset)
//! - `RT_KIND` - `elevation` or `imagery` (default: elevation)
//! - `RT_TILE_SIZE` - Tile width and height in pixels (default: 512)
//! - `RT_FORMAT` - `bil`, `png` or `tif` (default depends on the kind)
//! - `RT_BYTE_ORDER` - `little` or `big` (default: little)
//! - `RT_PIXEL_TYPE` - Elevation element type (default: int16)
//! - `RT_MISSING_DATA` - Elevation missing-data value (default: -32768)
//! - `RT_WRITERS` - Concurrent tile writers (default: 4)
//! - `RT_CACHE_MB` - Decoded raster cache size in MiB (default: 256)
//! - `RT_MMAP_THRESHOLD_MB` - Grids above this size are memory-mapped (default: 64)

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::cache::DEFAULT_RASTER_CACHE_CAPACITY;
use crate::io::ByteOrder;
use crate::produce::{
    ProductionParams, TileFormat, DEFAULT_DATASET_NAME, DEFAULT_TILE_DIMENSION,
    DEFAULT_WRITER_COUNT,
};
use crate::raster::{ElementType, PixelFormat};
use crate::reader::DEFAULT_MMAP_THRESHOLD;

const MIB: u64 = 1024 * 1024;

/// Default cache size in MiB.
pub const DEFAULT_CACHE_MB: u64 = DEFAULT_RASTER_CACHE_CAPACITY as u64 / MIB;

/// Default memory-map threshold in MiB.
pub const DEFAULT_MMAP_THRESHOLD_MB: u64 = DEFAULT_MMAP_THRESHOLD / MIB;

// =============================================================================
// CLI Arguments
// =============================================================================

/// raster-tiler - builds geographic tile pyramids from raster files.
///
/// Reads GeoTIFF, RPF frames, BIL grids and world-file referenced images
/// and writes a level/row/column tile tree with a JSON descriptor.
#[derive(Parser, Debug, Clone)]
#[command(name = "raster-tiler")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    pub fn into_command(self) -> Command {
        self.command
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Produce a tile pyramid from the input rasters.
    Produce(ProduceConfig),
    /// Print the reader and metadata of each input.
    Info(InfoConfig),
}

/// Kind of data a pyramid holds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum KindArg {
    Elevation,
    Imagery,
}

impl From<KindArg> for PixelFormat {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Elevation => PixelFormat::Elevation,
            KindArg::Imagery => PixelFormat::Image,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum FormatArg {
    Bil,
    Png,
    Tif,
}

impl From<FormatArg> for TileFormat {
    fn from(format: FormatArg) -> Self {
        match format {
            FormatArg::Bil => TileFormat::Bil,
            FormatArg::Png => TileFormat::Png,
            FormatArg::Tif => TileFormat::Tif,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ByteOrderArg {
    Little,
    Big,
}

impl From<ByteOrderArg> for ByteOrder {
    fn from(order: ByteOrderArg) -> Self {
        match order {
            ByteOrderArg::Little => ByteOrder::LittleEndian,
            ByteOrderArg::Big => ByteOrder::BigEndian,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum PixelTypeArg {
    Uint8,
    Int16,
    Uint16,
    Float32,
}

impl From<PixelTypeArg> for ElementType {
    fn from(pixel_type: PixelTypeArg) -> Self {
        match pixel_type {
            PixelTypeArg::Uint8 => ElementType::U8,
            PixelTypeArg::Int16 => ElementType::I16,
            PixelTypeArg::Uint16 => ElementType::U16,
            PixelTypeArg::Float32 => ElementType::F32,
        }
    }
}

/// Options of the `produce` command.
#[derive(Args, Debug, Clone)]
pub struct ProduceConfig {
    // =========================================================================
    // Output
    // =========================================================================
    /// Directory the dataset directory is created in.
    #[arg(short, long, env = "RT_OUTPUT")]
    pub output: PathBuf,

    /// Name of the dataset directory and descriptor.
    #[arg(long, default_value = DEFAULT_DATASET_NAME, env = "RT_DATASET")]
    pub dataset: String,

    /// Kind of data to produce.
    #[arg(long, value_enum, default_value_t = KindArg::Elevation, env = "RT_KIND")]
    pub kind: KindArg,

    // =========================================================================
    // Tiles
    // =========================================================================
    /// Tile width and height in pixels.
    #[arg(long, default_value_t = DEFAULT_TILE_DIMENSION, env = "RT_TILE_SIZE")]
    pub tile_size: u32,

    /// Tile encoding. Defaults to bil for elevation and png for imagery.
    #[arg(long, value_enum, env = "RT_FORMAT")]
    pub format: Option<FormatArg>,

    /// Byte order of bil and tif tiles.
    #[arg(long, value_enum, default_value_t = ByteOrderArg::Little, env = "RT_BYTE_ORDER")]
    pub byte_order: ByteOrderArg,

    /// Element type of elevation tiles.
    #[arg(long, value_enum, env = "RT_PIXEL_TYPE")]
    pub pixel_type: Option<PixelTypeArg>,

    /// Value written where no source has data (elevation only).
    #[arg(long, env = "RT_MISSING_DATA", allow_hyphen_values = true)]
    pub missing_data: Option<f64>,

    /// Level-zero tile size in degrees, instead of one derived from the inputs.
    #[arg(long, env = "RT_LEVEL_ZERO_DELTA")]
    pub level_zero_delta: Option<f64>,

    // =========================================================================
    // Resources
    // =========================================================================
    /// Number of concurrent tile writers.
    #[arg(long, default_value_t = DEFAULT_WRITER_COUNT, env = "RT_WRITERS")]
    pub writers: usize,

    /// Size of the decoded raster cache in MiB.
    #[arg(long, default_value_t = DEFAULT_CACHE_MB, env = "RT_CACHE_MB")]
    pub cache_mb: u64,

    /// Raw grids larger than this many MiB are memory-mapped.
    #[arg(long, default_value_t = DEFAULT_MMAP_THRESHOLD_MB, env = "RT_MMAP_THRESHOLD_MB")]
    pub mmap_threshold_mb: u64,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,

    /// Input rasters, as paths or file:// URLs.
    #[arg(required = true)]
    pub inputs: Vec<String>,
}

impl ProduceConfig {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.output.as_os_str().is_empty() {
            return Err("Output directory is required. Set --output or RT_OUTPUT".to_string());
        }
        if self.inputs.is_empty() {
            return Err("At least one input raster is required".to_string());
        }
        if self.tile_size < 2 {
            return Err("tile_size must be at least 2".to_string());
        }
        if self.writers == 0 {
            return Err("writers must be greater than 0".to_string());
        }
        if self.cache_mb == 0 {
            return Err("cache_mb must be greater than 0".to_string());
        }

        let kind = PixelFormat::from(self.kind);
        if let Some(format) = self.format {
            if !TileFormat::from(format).supports(kind) {
                return Err(format!(
                    "{} tiles cannot hold {} data",
                    TileFormat::from(format),
                    kind.name()
                ));
            }
        }
        if kind == PixelFormat::Image && (self.pixel_type.is_some() || self.missing_data.is_some())
        {
            return Err("pixel_type and missing_data only apply to elevation".to_string());
        }
        Ok(())
    }

    pub fn cache_bytes(&self) -> usize {
        (self.cache_mb * MIB) as usize
    }

    pub fn mmap_threshold_bytes(&self) -> u64 {
        self.mmap_threshold_mb * MIB
    }

    /// Production parameters for this run.
    pub fn to_params(&self) -> ProductionParams {
        let mut params = ProductionParams::new(&self.output, self.kind.into())
            .with_dataset_name(&self.dataset)
            .with_tile_dimension(self.tile_size)
            .with_byte_order(self.byte_order.into())
            .with_writer_count(self.writers);
        if let Some(format) = self.format {
            params = params.with_format(format.into());
        }
        if let Some(pixel_type) = self.pixel_type {
            params = params.with_pixel_type(pixel_type.into());
        }
        if let Some(value) = self.missing_data {
            params = params.with_missing_data(value);
        }
        if let Some(delta) = self.level_zero_delta {
            params = params.with_level_zero_delta(delta);
        }
        params
    }
}

/// Options of the `info` command.
#[derive(Args, Debug, Clone)]
pub struct InfoConfig {
    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,

    /// Input rasters, as paths or file:// URLs.
    #[arg(required = true)]
    pub inputs: Vec<String>,
}

// =============================================================================
// Tests
// =============================================================================
