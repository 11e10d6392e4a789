//! TIFF tag and field type definitions.
//!
//! This module defines the vocabulary for TIFF parsing:
//! - Field types that determine how values are encoded
//! - Tag IDs for baseline image structure and GeoTIFF geo-referencing
//! - Enumerated tag values (compression, photometric interpretation, ...)

// =============================================================================
// TIFF Field Types
// =============================================================================

/// TIFF field types that determine how values are encoded.
///
/// Each field type has a specific size in bytes, which is critical for:
/// - Determining if a value fits inline in an IFD entry
/// - Reading arrays of values correctly
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum FieldType {
    /// Unsigned 8-bit integer (1 byte)
    Byte = 1,

    /// 8-bit ASCII character (1 byte)
    Ascii = 2,

    /// Unsigned 16-bit integer (2 bytes)
    Short = 3,

    /// Unsigned 32-bit integer (4 bytes)
    Long = 4,

    /// Two LONGs: numerator and denominator (8 bytes)
    Rational = 5,

    /// Signed 8-bit integer (1 byte)
    SByte = 6,

    /// Undefined byte data (1 byte per element)
    Undefined = 7,

    /// Signed 16-bit integer (2 bytes)
    SShort = 8,

    /// Signed 32-bit integer (4 bytes)
    SLong = 9,

    /// Two SLONGs: numerator and denominator (8 bytes)
    SRational = 10,

    /// IEEE single precision float (4 bytes)
    Float = 11,

    /// IEEE double precision float (8 bytes)
    Double = 12,
}

impl FieldType {
    /// Size of a single value of this type in bytes.
    #[inline]
    pub const fn size_in_bytes(self) -> usize {
        match self {
            FieldType::Byte | FieldType::Ascii | FieldType::SByte | FieldType::Undefined => 1,
            FieldType::Short | FieldType::SShort => 2,
            FieldType::Long | FieldType::SLong | FieldType::Float => 4,
            FieldType::Rational | FieldType::SRational | FieldType::Double => 8,
        }
    }

    /// Create a FieldType from its numeric value.
    ///
    /// Returns `None` for unknown type values.
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            1 => Some(FieldType::Byte),
            2 => Some(FieldType::Ascii),
            3 => Some(FieldType::Short),
            4 => Some(FieldType::Long),
            5 => Some(FieldType::Rational),
            6 => Some(FieldType::SByte),
            7 => Some(FieldType::Undefined),
            8 => Some(FieldType::SShort),
            9 => Some(FieldType::SLong),
            10 => Some(FieldType::SRational),
            11 => Some(FieldType::Float),
            12 => Some(FieldType::Double),
            _ => None,
        }
    }

    /// Get the numeric type code.
    #[inline]
    pub const fn as_u16(self) -> u16 {
        self as u16
    }

    /// Maximum bytes that can be stored inline in an IFD entry.
    pub const INLINE_THRESHOLD: usize = 4;

    /// Check if a value with this type and count fits inline in an entry.
    #[inline]
    pub fn fits_inline(self, count: u64) -> bool {
        self.size_in_bytes() as u64 * count <= Self::INLINE_THRESHOLD as u64
    }
}

// =============================================================================
// TIFF Tags
// =============================================================================

/// TIFF tag IDs used by the decoder and writer.
///
/// Tags not listed here are ignored during parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum TiffTag {
    // -------------------------------------------------------------------------
    // Basic Image Structure
    // -------------------------------------------------------------------------
    /// Image width in pixels
    ImageWidth = 256,

    /// Image height (length) in pixels
    ImageLength = 257,

    /// Bits per sample, one value per sample
    BitsPerSample = 258,

    /// Compression scheme used
    Compression = 259,

    /// Photometric interpretation (gray, RGB, palette)
    PhotometricInterpretation = 262,

    /// Free-form description string
    ImageDescription = 270,

    /// Number of components per pixel (e.g., 3 for RGB)
    SamplesPerPixel = 277,

    /// How components are organized (chunky vs planar)
    PlanarConfiguration = 284,

    /// Differencing applied before compression
    Predictor = 317,

    /// Palette for photometric interpretation 3
    ColorMap = 320,

    /// Meaning of samples past the color channels (alpha)
    ExtraSamples = 338,

    /// Interpretation of sample bits (unsigned, signed, float)
    SampleFormat = 339,

    // -------------------------------------------------------------------------
    // Strip Organization
    // -------------------------------------------------------------------------
    /// Byte offsets of strips
    StripOffsets = 273,

    /// Row count per strip
    RowsPerStrip = 278,

    /// Byte counts of strips
    StripByteCounts = 279,

    // -------------------------------------------------------------------------
    // Tile Organization (detected and rejected)
    // -------------------------------------------------------------------------
    TileWidth = 322,
    TileLength = 323,
    TileOffsets = 324,
    TileByteCounts = 325,

    // -------------------------------------------------------------------------
    // GeoTIFF
    // -------------------------------------------------------------------------
    /// Pixel size in model units (x, y, z)
    ModelPixelScale = 33550,

    /// Raster to model tie points (i, j, k, x, y, z)*
    ModelTiePoint = 33922,

    /// Full 4x4 raster to model transformation
    ModelTransformation = 34264,

    /// GeoKey directory (SHORT array)
    GeoKeyDirectory = 34735,

    /// Storage for DOUBLE-valued geo keys
    GeoDoubleParams = 34736,

    /// Storage for ASCII-valued geo keys
    GeoAsciiParams = 34737,

    /// GDAL no-data value as an ASCII string
    GdalNodata = 42113,
}

impl TiffTag {
    /// Create a TiffTag from its numeric value.
    ///
    /// Returns `None` for unrecognized tags. Unknown tags are not an error;
    /// they are simply ignored during parsing.
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            256 => Some(TiffTag::ImageWidth),
            257 => Some(TiffTag::ImageLength),
            258 => Some(TiffTag::BitsPerSample),
            259 => Some(TiffTag::Compression),
            262 => Some(TiffTag::PhotometricInterpretation),
            270 => Some(TiffTag::ImageDescription),
            273 => Some(TiffTag::StripOffsets),
            277 => Some(TiffTag::SamplesPerPixel),
            278 => Some(TiffTag::RowsPerStrip),
            279 => Some(TiffTag::StripByteCounts),
            284 => Some(TiffTag::PlanarConfiguration),
            317 => Some(TiffTag::Predictor),
            320 => Some(TiffTag::ColorMap),
            322 => Some(TiffTag::TileWidth),
            323 => Some(TiffTag::TileLength),
            324 => Some(TiffTag::TileOffsets),
            325 => Some(TiffTag::TileByteCounts),
            338 => Some(TiffTag::ExtraSamples),
            339 => Some(TiffTag::SampleFormat),
            33550 => Some(TiffTag::ModelPixelScale),
            33922 => Some(TiffTag::ModelTiePoint),
            34264 => Some(TiffTag::ModelTransformation),
            34735 => Some(TiffTag::GeoKeyDirectory),
            34736 => Some(TiffTag::GeoDoubleParams),
            34737 => Some(TiffTag::GeoAsciiParams),
            42113 => Some(TiffTag::GdalNodata),
            _ => None,
        }
    }

    /// Get the numeric tag ID.
    #[inline]
    pub const fn as_u16(self) -> u16 {
        self as u16
    }

    /// Tag name for error messages.
    pub const fn name(self) -> &'static str {
        match self {
            TiffTag::ImageWidth => "ImageWidth",
            TiffTag::ImageLength => "ImageLength",
            TiffTag::BitsPerSample => "BitsPerSample",
            TiffTag::Compression => "Compression",
            TiffTag::PhotometricInterpretation => "PhotometricInterpretation",
            TiffTag::ImageDescription => "ImageDescription",
            TiffTag::SamplesPerPixel => "SamplesPerPixel",
            TiffTag::PlanarConfiguration => "PlanarConfiguration",
            TiffTag::Predictor => "Predictor",
            TiffTag::ColorMap => "ColorMap",
            TiffTag::ExtraSamples => "ExtraSamples",
            TiffTag::SampleFormat => "SampleFormat",
            TiffTag::StripOffsets => "StripOffsets",
            TiffTag::RowsPerStrip => "RowsPerStrip",
            TiffTag::StripByteCounts => "StripByteCounts",
            TiffTag::TileWidth => "TileWidth",
            TiffTag::TileLength => "TileLength",
            TiffTag::TileOffsets => "TileOffsets",
            TiffTag::TileByteCounts => "TileByteCounts",
            TiffTag::ModelPixelScale => "ModelPixelScale",
            TiffTag::ModelTiePoint => "ModelTiePoint",
            TiffTag::ModelTransformation => "ModelTransformation",
            TiffTag::GeoKeyDirectory => "GeoKeyDirectory",
            TiffTag::GeoDoubleParams => "GeoDoubleParams",
            TiffTag::GeoAsciiParams => "GeoAsciiParams",
            TiffTag::GdalNodata => "GDAL_NODATA",
        }
    }
}

// =============================================================================
// Compression Values
// =============================================================================

/// TIFF compression scheme identifiers.
///
/// Only uncompressed and LZW strips are decoded. Other schemes are
/// reported as unsupported rather than malformed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum Compression {
    /// No compression
    None = 1,

    /// CCITT modified Huffman RLE (not supported)
    Ccitt = 2,

    /// LZW compression (supported)
    Lzw = 5,

    /// "Old-style" JPEG (not supported)
    OldJpeg = 6,

    /// JPEG compression (not supported)
    Jpeg = 7,

    /// Deflate/zlib compression (not supported)
    Deflate = 8,

    /// PackBits run-length encoding (not supported)
    PackBits = 32773,

    /// Adobe Deflate (not supported)
    AdobeDeflate = 32946,
}

impl Compression {
    /// Create a Compression from its numeric value.
    ///
    /// Returns `None` for unrecognized compression values.
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            1 => Some(Compression::None),
            2 => Some(Compression::Ccitt),
            5 => Some(Compression::Lzw),
            6 => Some(Compression::OldJpeg),
            7 => Some(Compression::Jpeg),
            8 => Some(Compression::Deflate),
            32773 => Some(Compression::PackBits),
            32946 => Some(Compression::AdobeDeflate),
            _ => None,
        }
    }

    /// Check if this compression scheme is decoded.
    #[inline]
    pub const fn is_supported(self) -> bool {
        matches!(self, Compression::None | Compression::Lzw)
    }

    /// Get a human-readable name for the compression scheme.
    pub const fn name(self) -> &'static str {
        match self {
            Compression::None => "None",
            Compression::Ccitt => "CCITT",
            Compression::Lzw => "LZW",
            Compression::OldJpeg => "Old JPEG",
            Compression::Jpeg => "JPEG",
            Compression::Deflate => "Deflate",
            Compression::PackBits => "PackBits",
            Compression::AdobeDeflate => "Adobe Deflate",
        }
    }
}

// =============================================================================
// Photometric Interpretation
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Photometric {
    WhiteIsZero,
    BlackIsZero,
    Rgb,
    Palette,
}

impl Photometric {
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            0 => Some(Photometric::WhiteIsZero),
            1 => Some(Photometric::BlackIsZero),
            2 => Some(Photometric::Rgb),
            3 => Some(Photometric::Palette),
            _ => None,
        }
    }

    pub const fn as_u16(self) -> u16 {
        match self {
            Photometric::WhiteIsZero => 0,
            Photometric::BlackIsZero => 1,
            Photometric::Rgb => 2,
            Photometric::Palette => 3,
        }
    }
}

/// SampleFormat tag values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleFormat {
    Unsigned,
    Signed,
    Float,
}

impl SampleFormat {
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            1 => Some(SampleFormat::Unsigned),
            2 => Some(SampleFormat::Signed),
            3 => Some(SampleFormat::Float),
            _ => None,
        }
    }

    pub const fn as_u16(self) -> u16 {
        match self {
            SampleFormat::Unsigned => 1,
            SampleFormat::Signed => 2,
            SampleFormat::Float => 3,
        }
    }
}

/// PlanarConfiguration value for interleaved samples.
pub const PLANAR_CHUNKY: u16 = 1;

/// PlanarConfiguration value for one plane per sample.
pub const PLANAR_SEPARATE: u16 = 2;

/// Predictor value for no prediction.
pub const PREDICTOR_NONE: u16 = 1;

/// Predictor value for horizontal differencing.
pub const PREDICTOR_HORIZONTAL: u16 = 2;

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_type_sizes() {
        assert_eq!(FieldType::Byte.size_in_bytes(), 1);
        assert_eq!(FieldType::Short.size_in_bytes(), 2);
        assert_eq!(FieldType::Long.size_in_bytes(), 4);
        assert_eq!(FieldType::Rational.size_in_bytes(), 8);
        assert_eq!(FieldType::Double.size_in_bytes(), 8);
        assert_eq!(FieldType::Float.size_in_bytes(), 4);
    }

    #[test]
    fn test_field_type_from_u16() {
        for code in 1..=12u16 {
            let field_type = FieldType::from_u16(code).unwrap();
            assert_eq!(field_type.as_u16(), code);
        }
        assert_eq!(FieldType::from_u16(0), None);
        assert_eq!(FieldType::from_u16(16), None);
    }

    #[test]
    fn test_fits_inline() {
        assert!(FieldType::Byte.fits_inline(4));
        assert!(FieldType::Short.fits_inline(2));
        assert!(FieldType::Long.fits_inline(1));

        assert!(!FieldType::Byte.fits_inline(5));
        assert!(!FieldType::Short.fits_inline(3));
        assert!(!FieldType::Double.fits_inline(1));
    }

    #[test]
    fn test_tiff_tag_round_trip() {
        for tag in [
            TiffTag::ImageWidth,
            TiffTag::StripOffsets,
            TiffTag::ColorMap,
            TiffTag::ModelTiePoint,
            TiffTag::GeoKeyDirectory,
            TiffTag::GdalNodata,
        ] {
            assert_eq!(TiffTag::from_u16(tag.as_u16()), Some(tag));
        }
        assert_eq!(TiffTag::from_u16(0), None);
        assert_eq!(TiffTag::from_u16(9999), None);
    }

    #[test]
    fn test_compression_is_supported() {
        assert!(Compression::None.is_supported());
        assert!(Compression::Lzw.is_supported());
        assert!(!Compression::Jpeg.is_supported());
        assert!(!Compression::Deflate.is_supported());
        assert!(!Compression::PackBits.is_supported());
        assert_eq!(Compression::from_u16(5), Some(Compression::Lzw));
        assert_eq!(Compression::Lzw.name(), "LZW");
    }
}
