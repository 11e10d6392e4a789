//! Strip decoding of TIFF images.
//!
//! [`TiffDecoder`] opens a TIFF through a [`RangeReader`], walks the IFD
//! chain once and then decodes images on demand. Only strip-organized,
//! uncompressed or LZW-compressed images are decoded. Samples are gathered
//! into a chunky, file-byte-order buffer before being converted to typed
//! elements, so planar and chunky files share one conversion path.

use image::{Rgba, RgbaImage};
use tracing::{debug, warn};

use crate::error::TiffError;
use crate::io::RangeReader;
use crate::raster::{ElementData, ElementType};

use super::geo::{parse_nodata, GeoReference};
use super::lzw;
use super::parser::{parse_ifd_chain, ByteOrder, Ifd, TiffHeader, TIFF_HEADER_SIZE};
use super::predictor::undo_horizontal;
use super::tags::{
    Compression, Photometric, SampleFormat, TiffTag, PLANAR_CHUNKY, PLANAR_SEPARATE,
    PREDICTOR_HORIZONTAL, PREDICTOR_NONE,
};
use super::values::ValueReader;

/// Largest decoded sample buffer accepted, in bytes.
pub const MAX_DECODED_BYTES: usize = 1 << 31;

// =============================================================================
// ImageInfo
// =============================================================================

/// Layout of one strip-organized image, validated for decoding.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageInfo {
    pub width: u32,
    pub height: u32,
    pub samples_per_pixel: u16,
    pub bits_per_sample: u16,
    pub sample_format: SampleFormat,
    pub photometric: Photometric,
    pub compression: Compression,
    pub planar_configuration: u16,
    pub predictor: u16,
    pub rows_per_strip: u32,
    pub strip_offsets: Vec<u32>,
    pub strip_byte_counts: Vec<u32>,
    /// Palette as 3 x 2^bits values (all reds, then greens, then blues)
    pub color_map: Option<Vec<u16>>,
}

impl ImageInfo {
    /// Element type of the decoded samples.
    pub fn element_type(&self) -> ElementType {
        match (self.bits_per_sample, self.sample_format) {
            (16, SampleFormat::Signed) => ElementType::I16,
            (16, _) => ElementType::U16,
            (32, _) => ElementType::F32,
            _ => ElementType::U8,
        }
    }

    /// Bands after palette expansion.
    pub fn output_bands(&self) -> usize {
        if self.photometric == Photometric::Palette {
            3
        } else {
            self.samples_per_pixel as usize
        }
    }

    fn bytes_per_sample(&self) -> usize {
        self.bits_per_sample as usize / 8
    }

    /// Size of the decoded sample buffer, `None` when it overflows.
    pub fn decoded_len(&self) -> Option<usize> {
        (self.width as usize)
            .checked_mul(self.height as usize)?
            .checked_mul(self.samples_per_pixel as usize * self.bytes_per_sample())
    }

    fn strips_per_plane(&self) -> usize {
        self.height.div_ceil(self.rows_per_strip) as usize
    }
}

/// Samples of one decoded image, band-interleaved by pixel.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedImage {
    pub width: u32,
    pub height: u32,
    pub bands: usize,
    pub data: ElementData,
}

impl DecodedImage {
    /// Convert 8-bit gray, RGB or RGBA samples to an RGBA image.
    ///
    /// Returns `None` for other element types or band counts.
    pub fn to_rgba(&self) -> Option<RgbaImage> {
        let ElementData::U8(samples) = &self.data else {
            return None;
        };
        let pixels = self.width as usize * self.height as usize;
        let mut out = Vec::with_capacity(pixels * 4);
        match self.bands {
            1 => samples[..pixels]
                .iter()
                .for_each(|&g| out.extend_from_slice(&[g, g, g, 255])),
            3 => samples[..pixels * 3].chunks_exact(3).for_each(|p| {
                out.extend_from_slice(&[p[0], p[1], p[2], 255]);
            }),
            4 => out.extend_from_slice(&samples[..pixels * 4]),
            _ => return None,
        }
        RgbaImage::from_raw(self.width, self.height, out)
    }

    /// Pixel at `(x, y)` as RGBA, for 8-bit images.
    pub fn rgba_at(&self, x: u32, y: u32) -> Option<Rgba<u8>> {
        let ElementData::U8(samples) = &self.data else {
            return None;
        };
        if x >= self.width || y >= self.height {
            return None;
        }
        let start = (y as usize * self.width as usize + x as usize) * self.bands;
        match *samples.get(start..start + self.bands)? {
            [g] => Some(Rgba([g, g, g, 255])),
            [r, g, b] => Some(Rgba([r, g, b, 255])),
            [r, g, b, a] => Some(Rgba([r, g, b, a])),
            _ => None,
        }
    }
}

// =============================================================================
// TiffDecoder
// =============================================================================

/// A parsed TIFF file ready for decoding.
pub struct TiffDecoder<R: RangeReader> {
    reader: R,
    header: TiffHeader,
    ifds: Vec<Ifd>,
}

impl<R: RangeReader> TiffDecoder<R> {
    /// Parse the header and IFD chain.
    pub async fn open(reader: R) -> Result<Self, TiffError> {
        let header_bytes = reader.read_at_most(0, TIFF_HEADER_SIZE).await?;
        let header = TiffHeader::parse(&header_bytes, reader.size())?;
        let ifds = parse_ifd_chain(&reader, &header).await?;

        debug!(
            source = reader.identifier(),
            byte_order = ?header.byte_order,
            images = ifds.len(),
            "opened TIFF"
        );

        Ok(Self {
            reader,
            header,
            ifds,
        })
    }

    pub fn byte_order(&self) -> ByteOrder {
        self.header.byte_order
    }

    pub fn image_count(&self) -> usize {
        self.ifds.len()
    }

    pub fn ifd(&self, index: usize) -> Result<&Ifd, TiffError> {
        self.ifds.get(index).ok_or(TiffError::ImageIndexOutOfRange {
            index,
            count: self.ifds.len(),
        })
    }

    fn values(&self) -> ValueReader<'_, R> {
        ValueReader::new(&self.reader, &self.header)
    }

    async fn required_u32(&self, ifd: &Ifd, tag: TiffTag) -> Result<u32, TiffError> {
        let entry = ifd
            .get_entry_by_tag(tag)
            .ok_or(TiffError::MissingTag(tag.name()))?;
        self.values().read_u32(entry).await
    }

    async fn optional_u32(&self, ifd: &Ifd, tag: TiffTag, default: u32) -> Result<u32, TiffError> {
        match ifd.get_entry_by_tag(tag) {
            Some(entry) => {
                let values = self.values().read_u32_array(entry).await?;
                Ok(values.first().copied().unwrap_or(default))
            }
            None => Ok(default),
        }
    }

    /// Width and height of the image at `index`.
    pub async fn dimensions(&self, index: usize) -> Result<(u32, u32), TiffError> {
        let ifd = self.ifd(index)?;
        let width = self.required_u32(ifd, TiffTag::ImageWidth).await?;
        let height = self.required_u32(ifd, TiffTag::ImageLength).await?;
        Ok((width, height))
    }

    /// Read and validate the layout of the image at `index`.
    pub async fn image_info(&self, index: usize) -> Result<ImageInfo, TiffError> {
        let ifd = self.ifd(index)?;
        let values = self.values();

        if ifd.has_tag(TiffTag::TileWidth) || ifd.has_tag(TiffTag::TileOffsets) {
            return Err(TiffError::TiledOrganization);
        }

        let (width, height) = self.dimensions(index).await?;
        let samples_per_pixel = self.required_u32(ifd, TiffTag::SamplesPerPixel).await? as u16;
        let photometric_raw = self
            .required_u32(ifd, TiffTag::PhotometricInterpretation)
            .await? as u16;
        let rows_per_strip = self.required_u32(ifd, TiffTag::RowsPerStrip).await?;
        let planar_configuration =
            self.required_u32(ifd, TiffTag::PlanarConfiguration).await? as u16;

        let offsets_entry = ifd
            .get_entry_by_tag(TiffTag::StripOffsets)
            .ok_or(TiffError::MissingTag(TiffTag::StripOffsets.name()))?;
        let counts_entry = ifd
            .get_entry_by_tag(TiffTag::StripByteCounts)
            .ok_or(TiffError::MissingTag(TiffTag::StripByteCounts.name()))?;

        if width == 0 || height == 0 {
            return Err(TiffError::InvalidTagValue {
                tag: TiffTag::ImageWidth.name(),
                message: format!("image is {}x{}", width, height),
            });
        }

        let compression_raw = self.optional_u32(ifd, TiffTag::Compression, 1).await? as u16;
        let compression = Compression::from_u16(compression_raw)
            .filter(|c| c.is_supported())
            .ok_or_else(|| {
                TiffError::UnsupportedCompression(
                    Compression::from_u16(compression_raw)
                        .map(|c| c.name().to_string())
                        .unwrap_or_else(|| compression_raw.to_string()),
                )
            })?;

        let photometric = Photometric::from_u16(photometric_raw).ok_or_else(|| {
            TiffError::UnsupportedSampleLayout(format!(
                "photometric interpretation {}",
                photometric_raw
            ))
        })?;

        let bits = match ifd.get_entry_by_tag(TiffTag::BitsPerSample) {
            Some(entry) => values.read_u32_array(entry).await?,
            None => vec![1],
        };
        let bits_per_sample = bits.first().copied().unwrap_or(1) as u16;
        if bits.iter().any(|&b| b as u16 != bits_per_sample) {
            return Err(TiffError::UnsupportedSampleLayout(format!(
                "mixed bits per sample {:?}",
                bits
            )));
        }

        let sample_format_raw = self.optional_u32(ifd, TiffTag::SampleFormat, 1).await? as u16;
        let sample_format = SampleFormat::from_u16(sample_format_raw).ok_or_else(|| {
            TiffError::UnsupportedSampleLayout(format!("sample format {}", sample_format_raw))
        })?;

        let layout_ok = match (bits_per_sample, sample_format, samples_per_pixel) {
            (8, SampleFormat::Unsigned, 1 | 3 | 4) => true,
            (16, SampleFormat::Unsigned | SampleFormat::Signed, 1) => true,
            (32, SampleFormat::Float, 1) => true,
            _ => false,
        };
        if !layout_ok {
            return Err(TiffError::UnsupportedSampleLayout(format!(
                "{} x {}-bit {:?} samples",
                samples_per_pixel, bits_per_sample, sample_format
            )));
        }

        if planar_configuration != PLANAR_CHUNKY && planar_configuration != PLANAR_SEPARATE {
            return Err(TiffError::InvalidTagValue {
                tag: TiffTag::PlanarConfiguration.name(),
                message: format!("unknown value {}", planar_configuration),
            });
        }

        let pixel_bytes = samples_per_pixel as usize * (bits_per_sample as usize / 8);
        let fits = (width as usize)
            .checked_mul(height as usize)
            .and_then(|n| n.checked_mul(pixel_bytes))
            .is_some_and(|len| len <= MAX_DECODED_BYTES);
        if !fits {
            return Err(TiffError::ImageTooLarge {
                width,
                height,
                limit: MAX_DECODED_BYTES,
            });
        }

        let predictor = self
            .optional_u32(ifd, TiffTag::Predictor, PREDICTOR_NONE as u32)
            .await? as u16;
        match predictor {
            PREDICTOR_NONE => {}
            PREDICTOR_HORIZONTAL if bits_per_sample == 8 || bits_per_sample == 16 => {}
            other => return Err(TiffError::UnsupportedPredictor(other)),
        }

        let color_map = if photometric == Photometric::Palette {
            if samples_per_pixel != 1 || bits_per_sample != 8 {
                return Err(TiffError::UnsupportedSampleLayout(format!(
                    "palette with {} x {}-bit samples",
                    samples_per_pixel, bits_per_sample
                )));
            }
            let entry = ifd
                .get_entry_by_tag(TiffTag::ColorMap)
                .ok_or(TiffError::MissingTag(TiffTag::ColorMap.name()))?;
            let map = values.read_u16_array(entry).await?;
            if map.len() < 3 * 256 {
                return Err(TiffError::InvalidTagValue {
                    tag: TiffTag::ColorMap.name(),
                    message: format!("expected 768 values, got {}", map.len()),
                });
            }
            Some(map)
        } else {
            None
        };

        let strip_offsets = values.read_u32_array(offsets_entry).await?;
        let strip_byte_counts = values.read_u32_array(counts_entry).await?;

        let info = ImageInfo {
            width,
            height,
            samples_per_pixel,
            bits_per_sample,
            sample_format,
            photometric,
            compression,
            planar_configuration,
            predictor,
            rows_per_strip: rows_per_strip.clamp(1, height),
            strip_offsets,
            strip_byte_counts,
            color_map,
        };

        let planes = if info.planar_configuration == PLANAR_SEPARATE {
            info.samples_per_pixel as usize
        } else {
            1
        };
        let expected_strips = info.strips_per_plane() * planes;
        if info.strip_offsets.len() < expected_strips
            || info.strip_byte_counts.len() < expected_strips
        {
            return Err(TiffError::InvalidTagValue {
                tag: TiffTag::StripOffsets.name(),
                message: format!(
                    "expected {} strips, got {} offsets and {} byte counts",
                    expected_strips,
                    info.strip_offsets.len(),
                    info.strip_byte_counts.len()
                ),
            });
        }

        Ok(info)
    }

    /// Decode the image at `index`.
    pub async fn decode(&self, index: usize) -> Result<DecodedImage, TiffError> {
        let info = self.image_info(index).await?;
        let byte_order = self.header.byte_order;

        let width = info.width as usize;
        let height = info.height as usize;
        let spp = info.samples_per_pixel as usize;
        let bps = info.bytes_per_sample();
        let pixel_bytes = spp * bps;
        let len = info.decoded_len().ok_or(TiffError::ImageTooLarge {
            width: info.width,
            height: info.height,
            limit: MAX_DECODED_BYTES,
        })?;
        let mut samples = vec![0u8; len];

        let planar = info.planar_configuration == PLANAR_SEPARATE;
        let planes = if planar { spp } else { 1 };
        let strips_per_plane = info.strips_per_plane();
        let rows_per_strip = info.rows_per_strip as usize;

        for plane in 0..planes {
            for strip in 0..strips_per_plane {
                let strip_index = plane * strips_per_plane + strip;
                let first_row = strip * rows_per_strip;
                let rows = rows_per_strip.min(height - first_row);
                let group = if planar { 1 } else { spp };
                let row_samples = width * group;
                let expected = rows * row_samples * bps;

                let data = self.read_strip(&info, strip_index, expected).await?;

                if planar {
                    for (i, sample) in data.chunks_exact(bps).enumerate() {
                        let pixel = first_row * width + i;
                        let dst = pixel * pixel_bytes + plane * bps;
                        samples[dst..dst + bps].copy_from_slice(sample);
                    }
                } else {
                    let start = first_row * width * pixel_bytes;
                    samples[start..start + expected].copy_from_slice(&data);
                }
            }
        }

        let element_type = info.element_type();
        let mut data = ElementData::from_bytes(element_type, &samples, byte_order);

        if let ElementData::U8(ref mut bytes) = data {
            if info.photometric == Photometric::WhiteIsZero {
                bytes.iter_mut().for_each(|b| *b = 255 - *b);
            }
        }

        let mut bands = spp;
        let expanded = match (&info.color_map, &data) {
            (Some(map), ElementData::U8(indices)) => Some(expand_palette(indices, map)),
            _ => None,
        };
        if let Some(rgb) = expanded {
            data = ElementData::U8(rgb);
            bands = 3;
        }

        debug!(
            index,
            width = info.width,
            height = info.height,
            bands,
            element_type = %element_type,
            "decoded TIFF image"
        );

        Ok(DecodedImage {
            width: info.width,
            height: info.height,
            bands,
            data,
        })
    }

    /// Read, decompress and un-predict one strip, padded or cut to `expected`
    /// bytes.
    async fn read_strip(
        &self,
        info: &ImageInfo,
        strip_index: usize,
        expected: usize,
    ) -> Result<Vec<u8>, TiffError> {
        let offset = info.strip_offsets[strip_index] as u64;
        let count = info.strip_byte_counts[strip_index] as usize;
        let raw = self.reader.read_exact_at(offset, count).await?;

        let mut data = match info.compression {
            Compression::Lzw => lzw::decode(&raw, expected)?,
            _ => raw.to_vec(),
        };

        if data.len() < expected {
            warn!(
                source = self.reader.identifier(),
                strip = strip_index,
                got = data.len(),
                expected,
                "short strip, padding with zeros"
            );
        }
        data.resize(expected, 0);

        if info.predictor == PREDICTOR_HORIZONTAL {
            let group = if info.planar_configuration == PLANAR_SEPARATE {
                1
            } else {
                info.samples_per_pixel as usize
            };
            undo_horizontal(
                &mut data,
                info.width as usize * group,
                group,
                info.bits_per_sample,
                self.header.byte_order,
            );
        }
        Ok(data)
    }

    /// Geo-referencing of the image at `index`, if it carries GeoTIFF tags.
    pub async fn geo_reference(&self, index: usize) -> Result<Option<GeoReference>, TiffError> {
        let ifd = self.ifd(index)?;
        GeoReference::read(&self.values(), ifd).await
    }

    /// GDAL_NODATA value of the image at `index`.
    pub async fn nodata(&self, index: usize) -> Result<Option<f64>, TiffError> {
        let ifd = self.ifd(index)?;
        match ifd.get_entry_by_tag(TiffTag::GdalNodata) {
            Some(entry) => {
                let text = self.values().read_string(entry).await?;
                Ok(parse_nodata(&text))
            }
            None => Ok(None),
        }
    }
}

/// Expand 8-bit palette indices to RGB using the high byte of each entry.
fn expand_palette(indices: &[u8], map: &[u16]) -> Vec<u8> {
    let entries = map.len() / 3;
    let mut out = Vec::with_capacity(indices.len() * 3);
    for &i in indices {
        let i = i as usize;
        out.push((map[i] >> 8) as u8);
        out.push((map[entries + i] >> 8) as u8);
        out.push((map[2 * entries + i] >> 8) as u8);
    }
    out
}
