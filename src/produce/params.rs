//! Production parameters and their defaults.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::ProduceError;
use crate::io::ByteOrder;
use crate::raster::{ElementType, PixelFormat};

pub const DEFAULT_DATASET_NAME: &str = "dataset";
pub const DEFAULT_TILE_DIMENSION: u32 = 512;
pub const DEFAULT_ELEVATION_MISSING_DATA: f64 = -32768.0;
pub const DEFAULT_WRITER_COUNT: usize = 4;
/// Upper bound of the level-zero tile delta derived from the extent, in degrees.
pub const MAX_LEVEL_ZERO_DELTA: f64 = 36.0;

/// On-disk tile encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TileFormat {
    /// Raw elements
    Bil,
    /// RGBA PNG
    Png,
    /// GeoTIFF
    Tif,
}

impl TileFormat {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim_start_matches('.').to_ascii_lowercase().as_str() {
            "bil" => Some(TileFormat::Bil),
            "png" => Some(TileFormat::Png),
            "tif" | "tiff" => Some(TileFormat::Tif),
            _ => None,
        }
    }

    pub const fn suffix(self) -> &'static str {
        match self {
            TileFormat::Bil => "bil",
            TileFormat::Png => "png",
            TileFormat::Tif => "tif",
        }
    }

    /// Default format for a producer kind.
    pub const fn default_for(kind: PixelFormat) -> Self {
        match kind {
            PixelFormat::Elevation => TileFormat::Bil,
            PixelFormat::Image => TileFormat::Png,
        }
    }

    pub fn supports(self, kind: PixelFormat) -> bool {
        matches!(
            (self, kind),
            (TileFormat::Bil, PixelFormat::Elevation)
                | (TileFormat::Png, PixelFormat::Image)
                | (TileFormat::Tif, _)
        )
    }
}

impl fmt::Display for TileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.suffix())
    }
}

/// Parameters of a production run. Unset options take per-kind defaults.
#[derive(Debug, Clone)]
pub struct ProductionParams {
    pub output_dir: PathBuf,
    pub kind: PixelFormat,
    pub dataset_name: Option<String>,
    pub tile_dimension: Option<u32>,
    pub format: Option<TileFormat>,
    pub byte_order: Option<ByteOrder>,
    pub pixel_type: Option<ElementType>,
    pub missing_data: Option<f64>,
    pub writer_count: Option<usize>,
    /// Level-zero tile delta in degrees, instead of the one derived from the extent
    pub level_zero_delta: Option<f64>,
}

impl ProductionParams {
    pub fn new(output_dir: impl Into<PathBuf>, kind: PixelFormat) -> Self {
        Self {
            output_dir: output_dir.into(),
            kind,
            dataset_name: None,
            tile_dimension: None,
            format: None,
            byte_order: None,
            pixel_type: None,
            missing_data: None,
            writer_count: None,
            level_zero_delta: None,
        }
    }

    pub fn elevation(output_dir: impl Into<PathBuf>) -> Self {
        Self::new(output_dir, PixelFormat::Elevation)
    }

    pub fn imagery(output_dir: impl Into<PathBuf>) -> Self {
        Self::new(output_dir, PixelFormat::Image)
    }

    pub fn with_dataset_name(mut self, name: impl Into<String>) -> Self {
        self.dataset_name = Some(name.into());
        self
    }

    pub fn with_tile_dimension(mut self, dimension: u32) -> Self {
        self.tile_dimension = Some(dimension);
        self
    }

    pub fn with_format(mut self, format: TileFormat) -> Self {
        self.format = Some(format);
        self
    }

    pub fn with_byte_order(mut self, byte_order: ByteOrder) -> Self {
        self.byte_order = Some(byte_order);
        self
    }

    pub fn with_pixel_type(mut self, pixel_type: ElementType) -> Self {
        self.pixel_type = Some(pixel_type);
        self
    }

    pub fn with_missing_data(mut self, value: f64) -> Self {
        self.missing_data = Some(value);
        self
    }

    pub fn with_writer_count(mut self, count: usize) -> Self {
        self.writer_count = Some(count);
        self
    }

    pub fn with_level_zero_delta(mut self, degrees: f64) -> Self {
        self.level_zero_delta = Some(degrees);
        self
    }

    /// Apply defaults and check every value.
    pub fn resolve(&self) -> Result<ResolvedParams, ProduceError> {
        let invalid = |message: String| Err(ProduceError::InvalidParameter(message));

        if self.output_dir.as_os_str().is_empty() {
            return invalid("output directory is required".to_string());
        }

        let dataset_name = self
            .dataset_name
            .clone()
            .unwrap_or_else(|| DEFAULT_DATASET_NAME.to_string());
        if dataset_name.is_empty()
            || dataset_name.contains(['/', '\\'])
            || dataset_name == "."
            || dataset_name == ".."
        {
            return invalid(format!("invalid dataset name '{}'", dataset_name));
        }

        let tile_dimension = self.tile_dimension.unwrap_or(DEFAULT_TILE_DIMENSION);
        if tile_dimension < 2 {
            return invalid(format!("tile dimension {} is below 2", tile_dimension));
        }

        let format = self.format.unwrap_or(TileFormat::default_for(self.kind));
        if !format.supports(self.kind) {
            return invalid(format!(
                "{} tiles cannot hold {} data",
                format,
                self.kind.name()
            ));
        }

        let writer_count = self.writer_count.unwrap_or(DEFAULT_WRITER_COUNT);
        if writer_count == 0 {
            return invalid("writer count must be at least 1".to_string());
        }

        if let Some(delta) = self.level_zero_delta {
            if !(delta.is_finite() && delta > 0.0 && delta <= 180.0) {
                return invalid(format!("level-zero delta {} is out of range", delta));
            }
        }

        let (pixel_type, missing_data) = match self.kind {
            PixelFormat::Elevation => (
                Some(self.pixel_type.unwrap_or(ElementType::I16)),
                Some(self.missing_data.unwrap_or(DEFAULT_ELEVATION_MISSING_DATA)),
            ),
            PixelFormat::Image => (None, None),
        };
        if let Some(value) = missing_data {
            if !value.is_finite() {
                return invalid(format!("missing-data value {} is not finite", value));
            }
        }

        Ok(ResolvedParams {
            output_dir: self.output_dir.clone(),
            kind: self.kind,
            dataset_name,
            tile_dimension,
            format,
            byte_order: self.byte_order.unwrap_or(ByteOrder::LittleEndian),
            pixel_type,
            missing_data,
            writer_count,
            level_zero_delta: self.level_zero_delta,
        })
    }
}

/// Parameters with defaults applied.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedParams {
    pub output_dir: PathBuf,
    pub kind: PixelFormat,
    pub dataset_name: String,
    pub tile_dimension: u32,
    pub format: TileFormat,
    pub byte_order: ByteOrder,
    /// Element type of elevation tiles
    pub pixel_type: Option<ElementType>,
    pub missing_data: Option<f64>,
    pub writer_count: usize,
    pub level_zero_delta: Option<f64>,
}

impl ResolvedParams {
    pub fn dataset_dir(&self) -> PathBuf {
        self.output_dir.join(&self.dataset_name)
    }
}
