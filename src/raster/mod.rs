//! In-memory raster model: sectors, element buffers, data rasters and the
//! compositor that resamples one raster onto another.

mod buffer;
pub mod compositor;
mod data_raster;
mod sector;

pub use buffer::{ElementBuffer, ElementData, ElementStorage, ElementType, MappedGrid};
pub use compositor::{draw_on_canvas, geo_to_pixel, PixelRect, PixelTransform};
pub use data_raster::{BufferRaster, DataRaster, ImageRaster, PixelFormat};
pub use sector::Sector;
