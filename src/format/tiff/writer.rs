//! TIFF and GeoTIFF encoding.
//!
//! [`IfdBuilder`] collects tag values and strips for one image and
//! [`assemble`] lays out a classic TIFF file:
//!
//! ```text
//! header | IFD 0 | IFD 0 values | IFD 0 strips | IFD 1 | ...
//! ```
//!
//! StripOffsets and StripByteCounts are filled in during assembly.
//! [`GeoTiffWriter`] builds on these to write element grids and RGBA images
//! with WGS 84 geo tags.

use std::collections::BTreeMap;

use image::RgbaImage;

use crate::error::TiffError;
use crate::io::ByteOrder;
use crate::raster::{ElementData, ElementType, Sector};

use super::geo::wgs84_key_directory;
use super::lzw;
use super::parser::{Ifd, TIFF_HEADER_SIZE};
use super::predictor::apply_horizontal;
use super::tags::{
    Compression, FieldType, Photometric, SampleFormat, TiffTag, PLANAR_CHUNKY, PLANAR_SEPARATE,
    PREDICTOR_HORIZONTAL,
};

/// Target uncompressed strip size.
const STRIP_TARGET_BYTES: usize = 8192;

/// ExtraSamples value for unassociated alpha.
const EXTRA_SAMPLE_UNASSOCIATED_ALPHA: u16 = 2;

// =============================================================================
// IfdBuilder
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
enum TagValues {
    Short(Vec<u16>),
    Long(Vec<u32>),
    Double(Vec<f64>),
    Ascii(Vec<u8>),
}

impl TagValues {
    fn field_type(&self) -> FieldType {
        match self {
            TagValues::Short(_) => FieldType::Short,
            TagValues::Long(_) => FieldType::Long,
            TagValues::Double(_) => FieldType::Double,
            TagValues::Ascii(_) => FieldType::Ascii,
        }
    }

    fn count(&self) -> usize {
        match self {
            TagValues::Short(v) => v.len(),
            TagValues::Long(v) => v.len(),
            TagValues::Double(v) => v.len(),
            TagValues::Ascii(v) => v.len(),
        }
    }

    fn byte_len(&self) -> usize {
        self.count() * self.field_type().size_in_bytes()
    }

    fn encode(&self, byte_order: ByteOrder) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.byte_len());
        match self {
            TagValues::Short(v) => v
                .iter()
                .for_each(|&x| out.extend_from_slice(&byte_order.u16_bytes(x))),
            TagValues::Long(v) => v
                .iter()
                .for_each(|&x| out.extend_from_slice(&byte_order.u32_bytes(x))),
            TagValues::Double(v) => v
                .iter()
                .for_each(|&x| out.extend_from_slice(&byte_order.u64_bytes(x.to_bits()))),
            TagValues::Ascii(v) => out.extend_from_slice(v),
        }
        out
    }
}

/// Tags and strip data of one image.
#[derive(Debug, Clone, Default)]
pub struct IfdBuilder {
    entries: BTreeMap<u16, TagValues>,
    strips: Vec<Vec<u8>>,
}

impl IfdBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn short(&mut self, tag: TiffTag, values: &[u16]) -> &mut Self {
        self.entries
            .insert(tag.as_u16(), TagValues::Short(values.to_vec()));
        self
    }

    pub fn long(&mut self, tag: TiffTag, values: &[u32]) -> &mut Self {
        self.entries
            .insert(tag.as_u16(), TagValues::Long(values.to_vec()));
        self
    }

    pub fn double(&mut self, tag: TiffTag, values: &[f64]) -> &mut Self {
        self.entries
            .insert(tag.as_u16(), TagValues::Double(values.to_vec()));
        self
    }

    /// Store a NUL-terminated ASCII value.
    pub fn ascii(&mut self, tag: TiffTag, text: &str) -> &mut Self {
        let mut bytes = text.as_bytes().to_vec();
        bytes.push(0);
        self.entries.insert(tag.as_u16(), TagValues::Ascii(bytes));
        self
    }

    pub fn remove(&mut self, tag: TiffTag) -> &mut Self {
        self.entries.remove(&tag.as_u16());
        self
    }

    /// Append one strip of (already compressed) bytes.
    pub fn strip(&mut self, bytes: Vec<u8>) -> &mut Self {
        self.strips.push(bytes);
        self
    }
}

fn align_even(offset: usize) -> usize {
    offset + (offset & 1)
}

/// Lay out a classic TIFF file holding `images` in IFD-chain order.
pub fn assemble(byte_order: ByteOrder, images: &[IfdBuilder]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(match byte_order {
        ByteOrder::LittleEndian => b"II",
        ByteOrder::BigEndian => b"MM",
    });
    out.extend_from_slice(&byte_order.u16_bytes(42));
    out.extend_from_slice(&byte_order.u32_bytes(TIFF_HEADER_SIZE as u32));

    for (index, image) in images.iter().enumerate() {
        let ifd_offset = out.len();
        let mut entries = image.entries.clone();
        if !image.strips.is_empty() {
            let counts: Vec<u32> = image.strips.iter().map(|s| s.len() as u32).collect();
            entries.insert(
                TiffTag::StripOffsets.as_u16(),
                TagValues::Long(vec![0; counts.len()]),
            );
            entries.insert(TiffTag::StripByteCounts.as_u16(), TagValues::Long(counts));
        }

        // Place out-of-line values, then strips
        let mut cursor = ifd_offset + Ifd::calculate_size(entries.len());
        let mut value_offsets = BTreeMap::new();
        for (&tag, values) in &entries {
            if values.byte_len() > FieldType::INLINE_THRESHOLD {
                cursor = align_even(cursor);
                value_offsets.insert(tag, cursor);
                cursor += values.byte_len();
            }
        }
        let mut strip_offsets = Vec::with_capacity(image.strips.len());
        for strip in &image.strips {
            cursor = align_even(cursor);
            strip_offsets.push(cursor as u32);
            cursor += strip.len();
        }
        if !image.strips.is_empty() {
            entries.insert(
                TiffTag::StripOffsets.as_u16(),
                TagValues::Long(strip_offsets.clone()),
            );
        }

        let next_ifd = if index + 1 < images.len() {
            align_even(cursor)
        } else {
            0
        };
        out.resize(cursor, 0);

        let mut pos = ifd_offset;
        let mut put = |out: &mut Vec<u8>, bytes: &[u8]| {
            out[pos..pos + bytes.len()].copy_from_slice(bytes);
            pos += bytes.len();
        };
        put(&mut out, &byte_order.u16_bytes(entries.len() as u16));
        for (&tag, values) in &entries {
            let encoded = values.encode(byte_order);
            put(&mut out, &byte_order.u16_bytes(tag));
            put(&mut out, &byte_order.u16_bytes(values.field_type().as_u16()));
            put(&mut out, &byte_order.u32_bytes(values.count() as u32));
            match value_offsets.get(&tag) {
                Some(&offset) => {
                    put(&mut out, &byte_order.u32_bytes(offset as u32));
                    out[offset..offset + encoded.len()].copy_from_slice(&encoded);
                }
                None => {
                    // Inline values are left-justified
                    let mut field = [0u8; 4];
                    field[..encoded.len()].copy_from_slice(&encoded);
                    put(&mut out, &field);
                }
            }
        }
        put(&mut out, &byte_order.u32_bytes(next_ifd as u32));

        for (strip, &offset) in image.strips.iter().zip(&strip_offsets) {
            let offset = offset as usize;
            out[offset..offset + strip.len()].copy_from_slice(strip);
        }
        if next_ifd != 0 {
            out.resize(next_ifd, 0);
        }
    }
    out
}

// =============================================================================
// GeoTiffWriter
// =============================================================================

/// Writes single-image strip TIFFs, optionally geo-referenced.
#[derive(Debug, Clone)]
pub struct GeoTiffWriter {
    byte_order: ByteOrder,
    compression: Compression,
    predictor: bool,
    planar: bool,
    rows_per_strip: Option<u32>,
}

impl Default for GeoTiffWriter {
    fn default() -> Self {
        Self {
            byte_order: ByteOrder::LittleEndian,
            compression: Compression::None,
            predictor: false,
            planar: false,
            rows_per_strip: None,
        }
    }
}

impl GeoTiffWriter {
    pub fn new(byte_order: ByteOrder) -> Self {
        Self {
            byte_order,
            ..Self::default()
        }
    }

    /// Compress strips with LZW.
    pub fn with_lzw(mut self, enabled: bool) -> Self {
        self.compression = if enabled {
            Compression::Lzw
        } else {
            Compression::None
        };
        self
    }

    /// Apply horizontal differencing to 8 and 16-bit samples.
    pub fn with_predictor(mut self, enabled: bool) -> Self {
        self.predictor = enabled;
        self
    }

    /// Store one plane per band.
    pub fn with_planar(mut self, enabled: bool) -> Self {
        self.planar = enabled;
        self
    }

    pub fn with_rows_per_strip(mut self, rows: u32) -> Self {
        self.rows_per_strip = Some(rows.max(1));
        self
    }

    /// Encode an RGBA image.
    pub fn encode_rgba(&self, image: &RgbaImage, sector: Option<&Sector>) -> Result<Vec<u8>, TiffError> {
        let data = ElementData::U8(image.as_raw().clone());
        self.encode(image.width(), image.height(), 4, &data, sector, None)
    }

    /// Encode band-interleaved elements.
    ///
    /// 8-bit data may have 1, 3 or 4 bands (the fourth is alpha); 16 and
    /// 32-bit data must have one band.
    pub fn encode(
        &self,
        width: u32,
        height: u32,
        bands: usize,
        data: &ElementData,
        sector: Option<&Sector>,
        nodata: Option<f64>,
    ) -> Result<Vec<u8>, TiffError> {
        let element_type = data.element_type();
        let layout_ok = match element_type {
            ElementType::U8 => matches!(bands, 1 | 3 | 4),
            _ => bands == 1,
        };
        if !layout_ok || width == 0 || height == 0 {
            return Err(TiffError::UnsupportedSampleLayout(format!(
                "{}x{} image with {} bands of {}",
                width, height, bands, element_type
            )));
        }
        let pixels = width as usize * height as usize;
        if data.len() < pixels * bands {
            return Err(TiffError::InvalidTagValue {
                tag: TiffTag::StripByteCounts.name(),
                message: format!("{} elements for {} samples", data.len(), pixels * bands),
            });
        }

        let bps = element_type.size_in_bytes();
        let bits = (bps * 8) as u16;
        let sample_format = match element_type {
            ElementType::I16 => SampleFormat::Signed,
            ElementType::F32 => SampleFormat::Float,
            _ => SampleFormat::Unsigned,
        };
        let photometric = if bands >= 3 {
            Photometric::Rgb
        } else {
            Photometric::BlackIsZero
        };
        let planar = self.planar && bands > 1;
        let use_predictor = self.predictor && bps <= 2;

        let group = if planar { 1 } else { bands };
        let row_bytes = width as usize * group * bps;
        let rows_per_strip = self
            .rows_per_strip
            .unwrap_or_else(|| (STRIP_TARGET_BYTES / row_bytes).max(1) as u32)
            .min(height);

        let bytes = data.to_bytes(self.byte_order);
        let bytes = &bytes[..pixels * bands * bps];

        let mut ifd = IfdBuilder::new();
        ifd.long(TiffTag::ImageWidth, &[width])
            .long(TiffTag::ImageLength, &[height])
            .short(TiffTag::BitsPerSample, &vec![bits; bands])
            .short(TiffTag::Compression, &[self.compression as u16])
            .short(TiffTag::PhotometricInterpretation, &[photometric.as_u16()])
            .short(TiffTag::SamplesPerPixel, &[bands as u16])
            .long(TiffTag::RowsPerStrip, &[rows_per_strip])
            .short(
                TiffTag::PlanarConfiguration,
                &[if planar { PLANAR_SEPARATE } else { PLANAR_CHUNKY }],
            )
            .short(TiffTag::SampleFormat, &vec![sample_format.as_u16(); bands]);
        if bands == 4 {
            ifd.short(TiffTag::ExtraSamples, &[EXTRA_SAMPLE_UNASSOCIATED_ALPHA]);
        }
        if use_predictor {
            ifd.short(TiffTag::Predictor, &[PREDICTOR_HORIZONTAL]);
        }

        let planes: Vec<Vec<u8>> = if planar {
            (0..bands)
                .map(|band| {
                    bytes
                        .chunks_exact(bps * bands)
                        .flat_map(|pixel| pixel[band * bps..(band + 1) * bps].to_vec())
                        .collect()
                })
                .collect()
        } else {
            vec![bytes.to_vec()]
        };

        let strip_len = rows_per_strip as usize * row_bytes;
        for plane in &planes {
            for chunk in plane.chunks(strip_len) {
                let mut strip = chunk.to_vec();
                if use_predictor {
                    apply_horizontal(
                        &mut strip,
                        width as usize * group,
                        group,
                        bits,
                        self.byte_order,
                    );
                }
                if self.compression == Compression::Lzw {
                    strip = lzw::encode(&strip);
                }
                ifd.strip(strip);
            }
        }

        if let Some(sector) = sector {
            ifd.double(
                TiffTag::ModelPixelScale,
                &[
                    sector.lon_delta() / width as f64,
                    sector.lat_delta() / height as f64,
                    0.0,
                ],
            )
            .double(
                TiffTag::ModelTiePoint,
                &[0.0, 0.0, 0.0, sector.min_lon, sector.max_lat, 0.0],
            )
            .short(TiffTag::GeoKeyDirectory, &wgs84_key_directory());
        }
        if let Some(nodata) = nodata {
            ifd.ascii(TiffTag::GdalNodata, &nodata.to_string());
        }

        Ok(assemble(self.byte_order, &[ifd]))
    }
}
