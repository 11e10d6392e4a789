//! TIFF and GeoTIFF codec.
//!
//! # Key Concepts
//!
//! - **Byte order**: TIFF files declare their endianness (II = little-endian, MM = big-endian)
//!   in the header. All multi-byte values must be read respecting this order.
//!
//! - **IFD (Image File Directory)**: Contains the tags of one image and pointers to its
//!   strips. IFDs form a chain through their next-IFD offsets.
//!
//! - **Inline vs offset values**: Values of up to 4 bytes are stored inline, left-justified,
//!   in the IFD entry; larger values are stored at an offset pointed to by the entry.
//!
//! - **Geo-referencing**: GeoTIFF tags map pixel positions to geographic coordinates.
//!   Only geographic (lat/lon) models are supported.
//!
//! Only classic (32-bit offset) TIFF with strip organization is decoded, uncompressed
//! or LZW-compressed.

mod decode;
pub mod geo;
pub mod lzw;
mod parser;
mod predictor;
mod tags;
mod values;
mod writer;

pub use decode::{DecodedImage, ImageInfo, TiffDecoder};
pub use geo::{GeoAffine, GeoKeyDirectory, GeoReference};
pub use parser::{
    is_tiff_header, parse_ifd_chain, ByteOrder, Ifd, IfdEntry, TiffHeader, TIFF_HEADER_SIZE,
};
pub use tags::{Compression, FieldType, Photometric, SampleFormat, TiffTag};
pub use values::{parse_f64_array, parse_u32_array, ValueReader};
pub use writer::{assemble, GeoTiffWriter, IfdBuilder};
