//! Binary raster container formats.
//!
//! - **TIFF / GeoTIFF**: strip images, LZW, geo tags, and a writer for tile output
//! - **RPF**: CADRG / CIB frame files in the ARC zone system

pub mod rpf;
pub mod tiff;

pub use tiff::is_tiff_header;
