//! Raster metadata as known before and after a reader inspects a source.

use serde::{Deserialize, Serialize};

use crate::error::ReadError;
use crate::io::ByteOrder;
use crate::raster::{ElementType, PixelFormat, Sector};

/// Metadata that may be only partly known: caller hints, or what a reader
/// has gathered so far.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PartialMetadata {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub sector: Option<Sector>,
    pub pixel_format: Option<PixelFormat>,
    pub element_type: Option<ElementType>,
    pub byte_order: Option<ByteOrder>,
    pub missing_data: Option<f64>,
}

impl PartialMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = Some(width);
        self.height = Some(height);
        self
    }

    pub fn with_sector(mut self, sector: Sector) -> Self {
        self.sector = Some(sector);
        self
    }

    pub fn with_pixel_format(mut self, format: PixelFormat) -> Self {
        self.pixel_format = Some(format);
        self
    }

    pub fn with_element_type(mut self, element_type: ElementType) -> Self {
        self.element_type = Some(element_type);
        self
    }

    pub fn with_byte_order(mut self, byte_order: ByteOrder) -> Self {
        self.byte_order = Some(byte_order);
        self
    }

    pub fn with_missing_data(mut self, value: f64) -> Self {
        self.missing_data = Some(value);
        self
    }

    /// Fill fields that are still unknown from `other`.
    pub fn or(self, other: &PartialMetadata) -> Self {
        Self {
            width: self.width.or(other.width),
            height: self.height.or(other.height),
            sector: self.sector.or(other.sector),
            pixel_format: self.pixel_format.or(other.pixel_format),
            element_type: self.element_type.or(other.element_type),
            byte_order: self.byte_order.or(other.byte_order),
            missing_data: self.missing_data.or(other.missing_data),
        }
    }

    /// Names of the fields every raster needs that are still unknown.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.width.is_none() {
            missing.push("width");
        }
        if self.height.is_none() {
            missing.push("height");
        }
        if self.sector.is_none() {
            missing.push("sector");
        }
        if self.pixel_format.is_none() {
            missing.push("pixel format");
        }
        missing
    }

    /// Complete metadata, or [`ReadError::MissingMetadata`] naming what is missing.
    pub fn complete(self, source_name: &str) -> Result<RasterMetadata, ReadError> {
        match (self.width, self.height, self.sector, self.pixel_format) {
            (Some(width), Some(height), Some(sector), Some(pixel_format)) => Ok(RasterMetadata {
                width,
                height,
                sector,
                pixel_format,
                element_type: self.element_type,
                byte_order: self.byte_order,
                missing_data: self.missing_data,
            }),
            _ => Err(ReadError::MissingMetadata {
                source_name: source_name.to_string(),
                missing: self.missing_fields().join(", "),
            }),
        }
    }
}

/// Metadata of a readable source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RasterMetadata {
    pub width: u32,
    pub height: u32,
    pub sector: Sector,
    pub pixel_format: PixelFormat,
    /// Sample type of buffer rasters; `None` for imagery
    pub element_type: Option<ElementType>,
    pub byte_order: Option<ByteOrder>,
    pub missing_data: Option<f64>,
}
