//! Geo-referenced in-memory rasters.
//!
//! A [`DataRaster`] is either an RGBA image (imagery) or a typed element
//! buffer (elevation and other scalar data), tagged with the [`Sector`] it
//! covers. Row 0 is the northern edge and column 0 the western edge.

use image::{Rgba, RgbaImage};
use serde::{Deserialize, Serialize};

use super::buffer::{ElementBuffer, ElementType};
use super::compositor;
use super::sector::Sector;

/// What a raster's samples represent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    /// Color imagery with an alpha channel
    Image,
    /// Scalar samples such as heights
    Elevation,
}

impl PixelFormat {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "image" | "imagery" => Some(PixelFormat::Image),
            "elevation" | "elevations" => Some(PixelFormat::Elevation),
            _ => None,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            PixelFormat::Image => "image",
            PixelFormat::Elevation => "elevation",
        }
    }
}

/// RGBA imagery covering a sector.
#[derive(Debug, Clone)]
pub struct ImageRaster {
    pub sector: Sector,
    pub image: RgbaImage,
}

/// Element grid covering a sector.
#[derive(Debug, Clone)]
pub struct BufferRaster {
    pub sector: Sector,
    pub buffer: ElementBuffer,
}

/// A geo-referenced raster.
#[derive(Debug, Clone)]
pub enum DataRaster {
    Image(ImageRaster),
    Buffer(BufferRaster),
}

impl DataRaster {
    /// A fully transparent image raster.
    pub fn new_image(width: u32, height: u32, sector: Sector) -> Self {
        DataRaster::Image(ImageRaster {
            sector,
            image: RgbaImage::from_pixel(width, height, Rgba([0, 0, 0, 0])),
        })
    }

    /// A single-band buffer raster prefilled with the missing-data value.
    pub fn new_buffer(
        width: u32,
        height: u32,
        sector: Sector,
        element_type: ElementType,
        missing_data: Option<f64>,
    ) -> Self {
        DataRaster::Buffer(BufferRaster {
            sector,
            buffer: ElementBuffer::new(width, height, 1, element_type, missing_data),
        })
    }

    pub fn from_image(image: RgbaImage, sector: Sector) -> Self {
        DataRaster::Image(ImageRaster { sector, image })
    }

    pub fn from_buffer(buffer: ElementBuffer, sector: Sector) -> Self {
        DataRaster::Buffer(BufferRaster { sector, buffer })
    }

    pub fn width(&self) -> u32 {
        match self {
            DataRaster::Image(r) => r.image.width(),
            DataRaster::Buffer(r) => r.buffer.width(),
        }
    }

    pub fn height(&self) -> u32 {
        match self {
            DataRaster::Image(r) => r.image.height(),
            DataRaster::Buffer(r) => r.buffer.height(),
        }
    }

    pub fn sector(&self) -> Sector {
        match self {
            DataRaster::Image(r) => r.sector,
            DataRaster::Buffer(r) => r.sector,
        }
    }

    pub fn pixel_format(&self) -> PixelFormat {
        match self {
            DataRaster::Image(_) => PixelFormat::Image,
            DataRaster::Buffer(_) => PixelFormat::Elevation,
        }
    }

    pub fn missing_data(&self) -> Option<f64> {
        match self {
            DataRaster::Image(_) => None,
            DataRaster::Buffer(r) => r.buffer.missing_data(),
        }
    }

    /// Approximate memory held by the raster, used as the cache size hint.
    pub fn size_in_bytes(&self) -> usize {
        match self {
            DataRaster::Image(r) => r.image.as_raw().len(),
            DataRaster::Buffer(r) => r.buffer.size_in_bytes(),
        }
    }

    pub fn as_image(&self) -> Option<&RgbaImage> {
        match self {
            DataRaster::Image(r) => Some(&r.image),
            DataRaster::Buffer(_) => None,
        }
    }

    pub fn as_buffer(&self) -> Option<&ElementBuffer> {
        match self {
            DataRaster::Image(_) => None,
            DataRaster::Buffer(r) => Some(&r.buffer),
        }
    }

    /// Resample this raster onto `canvas`, limited to `clip` when given.
    ///
    /// Does nothing when the two sectors share no area or when the raster
    /// kinds differ.
    pub fn draw_on_canvas(&self, canvas: &mut DataRaster, clip: Option<&Sector>) {
        compositor::draw_on_canvas(self, canvas, clip);
    }
}
