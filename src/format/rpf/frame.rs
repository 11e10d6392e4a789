//! RPF frame file parsing.
//!
//! A frame file starts with a 48-byte header whose first byte gives the byte
//! order (0x00 big-endian, 0xFF little-endian) and whose last four bytes
//! point to the location section. The location section lists the file offset
//! of every other section by id:
//!
//! ```text
//! 130  coverage            corner coordinates
//! 131  compression         algorithm and record counts
//! 132  lookup tables       4 tables of 4096 records of 4 colour indices
//! 134  colour/grey         colormap count
//! 135  colormap            RGB + mono entries
//! 136  image description   subframe grid, mask table offsets
//! 138  mask                subframe presence table
//! 140  spatial data        6x6 subframes of 64x64 12-bit VQ codes
//! ```
//!
//! Each code selects one record from each of the four lookup tables; table
//! `r` gives the four colour indices of row `r` of a 4x4 pixel kernel.

use image::{Rgba, RgbaImage};
use tracing::debug;

use crate::error::RpfError;
use crate::io::ByteOrder;
use crate::raster::Sector;

pub const HEADER_SIZE: usize = 48;
const LOCATION_OFFSET_FIELD: usize = 44;

pub const SECTION_COVERAGE: u16 = 130;
pub const SECTION_COMPRESSION: u16 = 131;
pub const SECTION_LOOKUP_TABLES: u16 = 132;
pub const SECTION_COLOR_GRAY: u16 = 134;
pub const SECTION_COLORMAP: u16 = 135;
pub const SECTION_IMAGE_DESCRIPTION: u16 = 136;
pub const SECTION_MASK: u16 = 138;
pub const SECTION_SPATIAL_DATA: u16 = 140;

/// Value marking an absent table or a masked subframe.
pub const NOT_PRESENT: u32 = 0xFFFF_FFFF;

pub const SUBFRAMES_PER_SIDE: usize = 6;
pub const CODES_PER_SUBFRAME_SIDE: usize = 64;
pub const KERNEL: usize = 4;
pub const SUBFRAME_PIXELS: usize = CODES_PER_SUBFRAME_SIDE * KERNEL;
/// 64 x 64 codes of 12 bits
pub const SUBFRAME_BYTES: usize = CODES_PER_SUBFRAME_SIDE * CODES_PER_SUBFRAME_SIDE * 3 / 2;
pub const LOOKUP_RECORDS: usize = 4096;

/// Bounds-checked big/little-endian reads over the frame bytes.
struct Cursor<'a> {
    data: &'a [u8],
    order: ByteOrder,
}

impl<'a> Cursor<'a> {
    fn slice(&self, offset: usize, len: usize, section: &'static str) -> Result<&'a [u8], RpfError> {
        offset
            .checked_add(len)
            .and_then(|end| self.data.get(offset..end))
            .ok_or_else(|| RpfError::InvalidSection {
                section,
                message: format!(
                    "{} bytes at offset {} past end of file ({} bytes)",
                    len,
                    offset,
                    self.data.len()
                ),
            })
    }

    fn u8(&self, offset: usize, section: &'static str) -> Result<u8, RpfError> {
        Ok(self.slice(offset, 1, section)?[0])
    }

    fn u16(&self, offset: usize, section: &'static str) -> Result<u16, RpfError> {
        Ok(self.order.read_u16(self.slice(offset, 2, section)?))
    }

    fn u32(&self, offset: usize, section: &'static str) -> Result<u32, RpfError> {
        Ok(self.order.read_u32(self.slice(offset, 4, section)?))
    }

    fn f64(&self, offset: usize, section: &'static str) -> Result<f64, RpfError> {
        Ok(self.order.read_f64(self.slice(offset, 8, section)?))
    }
}

/// Section offsets from the location section.
#[derive(Debug, Clone, Default)]
pub struct Locations {
    records: Vec<(u16, u32)>,
}

impl Locations {
    pub fn get(&self, id: u16) -> Option<usize> {
        self.records
            .iter()
            .find(|(i, _)| *i == id)
            .map(|(_, loc)| *loc as usize)
    }

    fn require(&self, id: u16, name: &'static str) -> Result<usize, RpfError> {
        self.get(id).ok_or(RpfError::MissingSection(name))
    }
}

/// Parsed frame header and section directory.
struct FrameFile<'a> {
    cursor: Cursor<'a>,
    locations: Locations,
}

impl<'a> FrameFile<'a> {
    fn open(data: &'a [u8]) -> Result<Self, RpfError> {
        if data.len() < HEADER_SIZE {
            return Err(RpfError::InvalidHeader(format!(
                "file is {} bytes, header needs {}",
                data.len(),
                HEADER_SIZE
            )));
        }
        let order = match data[0] {
            0x00 => ByteOrder::BigEndian,
            0xFF => ByteOrder::LittleEndian,
            other => {
                return Err(RpfError::InvalidHeader(format!(
                    "byte order flag 0x{:02X}",
                    other
                )))
            }
        };
        let cursor = Cursor { data, order };

        let loc = cursor.u32(LOCATION_OFFSET_FIELD, "header")? as usize;
        let table_offset = cursor.u32(loc + 2, "location")? as usize;
        let count = cursor.u16(loc + 6, "location")? as usize;
        let record_len = cursor.u16(loc + 8, "location")? as usize;
        if record_len < 10 {
            return Err(RpfError::InvalidSection {
                section: "location",
                message: format!("record length {}", record_len),
            });
        }

        let mut records = Vec::with_capacity(count);
        for i in 0..count {
            let at = loc + table_offset + i * record_len;
            let id = cursor.u16(at, "location")?;
            let location = cursor.u32(at + 6, "location")?;
            records.push((id, location));
        }

        Ok(Self {
            cursor,
            locations: Locations { records },
        })
    }

    fn coverage(&self) -> Result<Option<Sector>, RpfError> {
        let Some(at) = self.locations.get(SECTION_COVERAGE) else {
            return Ok(None);
        };
        let c = &self.cursor;
        let mut v = [0.0; 8];
        for (i, slot) in v.iter_mut().enumerate() {
            *slot = c.f64(at + i * 8, "coverage")?;
        }
        // NW, SW, NE, SE as (lat, lon)
        let [nw_lat, nw_lon, sw_lat, sw_lon, ne_lat, ne_lon, se_lat, se_lon] = v;
        let sector = Sector::new(
            sw_lat.min(se_lat),
            nw_lat.max(ne_lat),
            nw_lon.min(sw_lon),
            ne_lon.max(se_lon),
        );
        if !sector.is_geographic() || sector.is_empty() {
            return Err(RpfError::InvalidSection {
                section: "coverage",
                message: format!("corners give {}", sector),
            });
        }
        Ok(Some(sector))
    }

    fn lookup_tables(&self) -> Result<Vec<Vec<[u8; 4]>>, RpfError> {
        let c = &self.cursor;
        let compression = self.locations.require(SECTION_COMPRESSION, "compression")?;
        let algorithm = c.u16(compression, "compression")?;
        let table_count = c.u16(compression + 2, "compression")? as usize;
        if algorithm != 1 || table_count != KERNEL {
            return Err(RpfError::InvalidSection {
                section: "compression",
                message: format!(
                    "algorithm {} with {} lookup tables, expected VQ with 4",
                    algorithm, table_count
                ),
            });
        }

        let base = self.locations.require(SECTION_LOOKUP_TABLES, "lookup tables")?;
        let table_offset = c.u32(base, "lookup tables")? as usize;
        let record_len = c.u16(base + 4, "lookup tables")? as usize;

        let mut tables = Vec::with_capacity(KERNEL);
        for t in 0..KERNEL {
            let at = base + table_offset + t * record_len;
            let records = c.u32(at + 2, "lookup tables")? as usize;
            let values = c.u16(at + 6, "lookup tables")? as usize;
            let bits = c.u16(at + 8, "lookup tables")?;
            let offset = c.u32(at + 10, "lookup tables")? as usize;
            if records != LOOKUP_RECORDS || values != KERNEL || bits != 8 {
                return Err(RpfError::InvalidSection {
                    section: "lookup tables",
                    message: format!(
                        "table {} has {} records of {} x {}-bit values",
                        t, records, values, bits
                    ),
                });
            }
            let raw = c.slice(base + offset, LOOKUP_RECORDS * KERNEL, "lookup tables")?;
            tables.push(
                raw.chunks_exact(KERNEL)
                    .map(|r| [r[0], r[1], r[2], r[3]])
                    .collect(),
            );
        }
        Ok(tables)
    }

    /// First colormap as RGBA; entries beyond its length stay transparent.
    fn colormap(&self) -> Result<Vec<Rgba<u8>>, RpfError> {
        let c = &self.cursor;
        let color_gray = self.locations.require(SECTION_COLOR_GRAY, "colour/grey")?;
        let maps = c.u8(color_gray, "colour/grey")?;
        if maps == 0 {
            return Err(RpfError::InvalidSection {
                section: "colour/grey",
                message: "no colormaps".to_string(),
            });
        }

        let base = self.locations.require(SECTION_COLORMAP, "colormap")?;
        let table_offset = c.u32(base, "colormap")? as usize;
        let at = base + table_offset;
        let colors = c.u32(at + 2, "colormap")? as usize;
        let element_len = c.u8(at + 6, "colormap")? as usize;
        let color_offset = c.u32(at + 9, "colormap")? as usize;
        if element_len < 3 || colors > 256 {
            return Err(RpfError::InvalidSection {
                section: "colormap",
                message: format!("{} colors of {} bytes", colors, element_len),
            });
        }

        let raw = c.slice(base + color_offset, colors * element_len, "colormap")?;
        let mut palette = vec![Rgba([0, 0, 0, 0]); 256];
        for (slot, entry) in palette.iter_mut().zip(raw.chunks_exact(element_len)) {
            *slot = Rgba([entry[0], entry[1], entry[2], 255]);
        }
        Ok(palette)
    }

    /// File offset of each subframe, `None` when masked.
    fn subframe_offsets(&self) -> Result<Vec<Option<usize>>, RpfError> {
        let c = &self.cursor;
        let description = self
            .locations
            .require(SECTION_IMAGE_DESCRIPTION, "image description")?;
        let spatial = self.locations.require(SECTION_SPATIAL_DATA, "spatial data")?;

        let across = c.u16(description + 8, "image description")? as usize;
        let down = c.u16(description + 10, "image description")? as usize;
        let columns = c.u32(description + 12, "image description")? as usize;
        let rows = c.u32(description + 16, "image description")? as usize;
        let mask_offset = c.u32(description + 20, "image description")?;
        if across != SUBFRAMES_PER_SIDE
            || down != SUBFRAMES_PER_SIDE
            || columns != SUBFRAME_PIXELS
            || rows != SUBFRAME_PIXELS
        {
            return Err(RpfError::InvalidSection {
                section: "image description",
                message: format!(
                    "{}x{} subframes of {}x{} pixels",
                    across, down, columns, rows
                ),
            });
        }

        let count = SUBFRAMES_PER_SIDE * SUBFRAMES_PER_SIDE;
        let mask = match (mask_offset, self.locations.get(SECTION_MASK)) {
            (NOT_PRESENT, _) | (_, None) => None,
            (offset, Some(mask)) => Some(mask + offset as usize),
        };

        let mut offsets = Vec::with_capacity(count);
        for i in 0..count {
            let offset = match mask {
                Some(table) => match c.u32(table + i * 4, "mask")? {
                    NOT_PRESENT => None,
                    rel => Some(spatial + rel as usize),
                },
                None => Some(spatial + i * SUBFRAME_BYTES),
            };
            offsets.push(offset);
        }
        Ok(offsets)
    }
}

/// Header-derived sector of a frame file, `None` without a coverage section.
pub fn read_coverage(data: &[u8]) -> Result<Option<Sector>, RpfError> {
    FrameFile::open(data)?.coverage()
}

/// Unpack two 12-bit codes from three bytes.
#[inline]
pub fn unpack_codes(b: &[u8]) -> (u16, u16) {
    let c0 = ((b[0] as u16) << 4) | (b[1] as u16 >> 4);
    let c1 = ((b[1] as u16 & 0x0F) << 8) | b[2] as u16;
    (c0, c1)
}

/// A decoded frame.
#[derive(Debug, Clone)]
pub struct RpfFrame {
    pub coverage: Option<Sector>,
    pub image: RgbaImage,
}

/// Decode a frame file into a 1536 x 1536 RGBA image.
pub fn decode_frame(data: &[u8]) -> Result<RpfFrame, RpfError> {
    let file = FrameFile::open(data)?;
    let coverage = file.coverage()?;
    let tables = file.lookup_tables()?;
    let palette = file.colormap()?;
    let subframes = file.subframe_offsets()?;

    let side = SUBFRAMES_PER_SIDE * SUBFRAME_PIXELS;
    let mut image = RgbaImage::from_pixel(side as u32, side as u32, Rgba([0, 0, 0, 0]));
    let mut masked = 0;

    for (index, offset) in subframes.iter().enumerate() {
        let Some(offset) = *offset else {
            masked += 1;
            continue;
        };
        let codes = file.cursor.slice(offset, SUBFRAME_BYTES, "spatial data")?;
        let origin_x = (index % SUBFRAMES_PER_SIDE) * SUBFRAME_PIXELS;
        let origin_y = (index / SUBFRAMES_PER_SIDE) * SUBFRAME_PIXELS;

        for (pair, bytes) in codes.chunks_exact(3).enumerate() {
            let (c0, c1) = unpack_codes(bytes);
            for (k, code) in [c0, c1].into_iter().enumerate() {
                let n = pair * 2 + k;
                let kx = origin_x + (n % CODES_PER_SUBFRAME_SIDE) * KERNEL;
                let ky = origin_y + (n / CODES_PER_SUBFRAME_SIDE) * KERNEL;
                for (r, table) in tables.iter().enumerate() {
                    let row = table[code as usize];
                    for (col, &index) in row.iter().enumerate() {
                        image.put_pixel(
                            (kx + col) as u32,
                            (ky + r) as u32,
                            palette[index as usize],
                        );
                    }
                }
            }
        }
    }

    debug!(masked, coverage = ?coverage, "decoded RPF frame");
    Ok(RpfFrame { coverage, image })
}
