//! Test utilities for integration tests.
//!
//! Builders for GeoTIFF, RPF frame and BIL grid fixtures, written with the
//! crate's own encoders where it has one.

use std::path::{Path, PathBuf};

use raster_tiler::format::rpf::{
    HEADER_SIZE, KERNEL, LOOKUP_RECORDS, NOT_PRESENT, SECTION_COLORMAP, SECTION_COLOR_GRAY,
    SECTION_COMPRESSION, SECTION_COVERAGE, SECTION_IMAGE_DESCRIPTION, SECTION_LOOKUP_TABLES,
    SECTION_SPATIAL_DATA, SUBFRAMES_PER_SIDE, SUBFRAME_BYTES, SUBFRAME_PIXELS,
};
use raster_tiler::{ByteOrder, ElementData, GeoTiffWriter, Sector};

// =============================================================================
// GeoTIFF
// =============================================================================

/// Single-band float32 GeoTIFF, values in row-major order from the north edge.
pub fn f32_geotiff(width: u32, height: u32, values: &[f32], sector: &Sector) -> Vec<u8> {
    GeoTiffWriter::new(ByteOrder::LittleEndian)
        .encode(
            width,
            height,
            1,
            &ElementData::F32(values.to_vec()),
            Some(sector),
            None,
        )
        .expect("encode float32 GeoTIFF")
}

/// Single-band int16 GeoTIFF with a GDAL no-data value.
pub fn i16_geotiff(
    width: u32,
    height: u32,
    values: &[i16],
    sector: &Sector,
    nodata: Option<f64>,
    byte_order: ByteOrder,
) -> Vec<u8> {
    GeoTiffWriter::new(byte_order)
        .with_lzw(true)
        .with_predictor(true)
        .encode(
            width,
            height,
            1,
            &ElementData::I16(values.to_vec()),
            Some(sector),
            nodata,
        )
        .expect("encode int16 GeoTIFF")
}

/// Solid-colour RGB GeoTIFF.
pub fn rgb_geotiff(width: u32, height: u32, rgb: [u8; 3], sector: Option<&Sector>) -> Vec<u8> {
    let pixels: Vec<u8> = (0..width * height).flat_map(|_| rgb).collect();
    GeoTiffWriter::new(ByteOrder::BigEndian)
        .encode(width, height, 3, &ElementData::U8(pixels), sector, None)
        .expect("encode RGB GeoTIFF")
}

// =============================================================================
// RPF Frames
// =============================================================================

const LOCATION_OFFSET: usize = HEADER_SIZE;
const LOCATION_HEADER: usize = 14;
const LOCATION_RECORD: usize = 10;
const LOOKUP_RECORD: usize = 14;
const COLORMAP_RECORD: usize = 13;

struct FrameBuilder {
    data: Vec<u8>,
    records: Vec<(u16, u32)>,
}

impl FrameBuilder {
    fn new(sections: usize) -> Self {
        let mut data = vec![0u8; HEADER_SIZE];
        data[44..48].copy_from_slice(&(LOCATION_OFFSET as u32).to_be_bytes());
        data.resize(LOCATION_OFFSET + LOCATION_HEADER + sections * LOCATION_RECORD, 0);
        Self {
            data,
            records: Vec::new(),
        }
    }

    /// Append a section and record its location.
    fn section(&mut self, id: u16, bytes: Vec<u8>) -> usize {
        let at = self.data.len();
        self.records.push((id, at as u32));
        self.data.extend_from_slice(&bytes);
        at
    }

    fn finish(mut self) -> Vec<u8> {
        let loc = LOCATION_OFFSET;
        self.data[loc + 2..loc + 6].copy_from_slice(&(LOCATION_HEADER as u32).to_be_bytes());
        self.data[loc + 6..loc + 8].copy_from_slice(&(self.records.len() as u16).to_be_bytes());
        self.data[loc + 8..loc + 10].copy_from_slice(&(LOCATION_RECORD as u16).to_be_bytes());
        for (i, (id, at)) in self.records.iter().enumerate() {
            let r = loc + LOCATION_HEADER + i * LOCATION_RECORD;
            self.data[r..r + 2].copy_from_slice(&id.to_be_bytes());
            self.data[r + 6..r + 10].copy_from_slice(&at.to_be_bytes());
        }
        self.data
    }
}

fn coverage_section(sector: &Sector) -> Vec<u8> {
    // NW, SW, NE, SE as (lat, lon)
    [
        sector.max_lat,
        sector.min_lon,
        sector.min_lat,
        sector.min_lon,
        sector.max_lat,
        sector.max_lon,
        sector.min_lat,
        sector.max_lon,
    ]
    .iter()
    .flat_map(|v| v.to_be_bytes())
    .collect()
}

/// Four lookup tables whose record 0 selects colour index 1 everywhere.
fn lookup_section() -> Vec<u8> {
    let tables_at = 6;
    let values_at = tables_at + KERNEL * LOOKUP_RECORD;
    let table_bytes = LOOKUP_RECORDS * KERNEL;

    let mut bytes = Vec::with_capacity(values_at + KERNEL * table_bytes);
    bytes.extend_from_slice(&(tables_at as u32).to_be_bytes());
    bytes.extend_from_slice(&(LOOKUP_RECORD as u16).to_be_bytes());
    for t in 0..KERNEL {
        bytes.extend_from_slice(&(t as u16).to_be_bytes());
        bytes.extend_from_slice(&(LOOKUP_RECORDS as u32).to_be_bytes());
        bytes.extend_from_slice(&(KERNEL as u16).to_be_bytes());
        bytes.extend_from_slice(&8u16.to_be_bytes());
        bytes.extend_from_slice(&((values_at + t * table_bytes) as u32).to_be_bytes());
    }
    for _ in 0..KERNEL {
        let mut table = vec![0u8; table_bytes];
        table[..KERNEL].copy_from_slice(&[1; KERNEL]);
        bytes.extend_from_slice(&table);
    }
    bytes
}

/// A colormap of two RGB entries: black, then `rgb`.
fn colormap_section(rgb: [u8; 3]) -> Vec<u8> {
    let record_at = 4usize;
    let colors_at = record_at + COLORMAP_RECORD;

    let mut bytes = Vec::new();
    bytes.extend_from_slice(&(record_at as u32).to_be_bytes());
    bytes.extend_from_slice(&0u16.to_be_bytes());
    bytes.extend_from_slice(&2u32.to_be_bytes());
    bytes.push(3);
    bytes.extend_from_slice(&0u16.to_be_bytes());
    bytes.extend_from_slice(&(colors_at as u32).to_be_bytes());
    bytes.extend_from_slice(&[0, 0, 0]);
    bytes.extend_from_slice(&rgb);
    bytes
}

fn image_description_section() -> Vec<u8> {
    let mut bytes = vec![0u8; 8];
    bytes.extend_from_slice(&(SUBFRAMES_PER_SIDE as u16).to_be_bytes());
    bytes.extend_from_slice(&(SUBFRAMES_PER_SIDE as u16).to_be_bytes());
    bytes.extend_from_slice(&(SUBFRAME_PIXELS as u32).to_be_bytes());
    bytes.extend_from_slice(&(SUBFRAME_PIXELS as u32).to_be_bytes());
    bytes.extend_from_slice(&NOT_PRESENT.to_be_bytes());
    bytes
}

/// A big-endian frame file painted in one colour, with an optional coverage section.
pub fn rpf_frame(rgb: [u8; 3], coverage: Option<&Sector>) -> Vec<u8> {
    let mut frame = FrameBuilder::new(8);
    if let Some(sector) = coverage {
        frame.section(SECTION_COVERAGE, coverage_section(sector));
    }
    let mut compression = 1u16.to_be_bytes().to_vec();
    compression.extend_from_slice(&(KERNEL as u16).to_be_bytes());
    frame.section(SECTION_COMPRESSION, compression);
    frame.section(SECTION_LOOKUP_TABLES, lookup_section());
    frame.section(SECTION_COLOR_GRAY, vec![1]);
    frame.section(SECTION_COLORMAP, colormap_section(rgb));
    frame.section(SECTION_IMAGE_DESCRIPTION, image_description_section());
    // All-zero codes select lookup record 0
    frame.section(
        SECTION_SPATIAL_DATA,
        vec![0u8; SUBFRAMES_PER_SIDE * SUBFRAMES_PER_SIDE * SUBFRAME_BYTES],
    );
    frame.finish()
}

// =============================================================================
// Files
// =============================================================================

/// Write `bytes` to `dir/name` and return the path.
pub fn write_file(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, bytes).expect("write fixture");
    path
}

/// A little-endian int16 BIL grid with its `.hdr` sidecar.
pub fn write_bil(dir: &Path, stem: &str, width: u32, height: u32, values: &[i16], sector: &Sector) -> PathBuf {
    let xdim = sector.lon_delta() / width as f64;
    let ydim = sector.lat_delta() / height as f64;
    let hdr = format!(
        "BYTEORDER I\nLAYOUT BIL\nNROWS {}\nNCOLS {}\nNBANDS 1\nNBITS 16\nPIXELTYPE SIGNEDINT\n\
         NODATA -9999\nULXMAP {}\nULYMAP {}\nXDIM {}\nYDIM {}\n",
        height,
        width,
        sector.min_lon + xdim / 2.0,
        sector.max_lat - ydim / 2.0,
        xdim,
        ydim
    );
    write_file(dir, &format!("{}.hdr", stem), hdr.as_bytes());
    let bytes: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
    write_file(dir, &format!("{}.bil", stem), &bytes)
}

/// Read a little-endian float32 tile.
pub fn read_f32_tile(path: &Path) -> Vec<f32> {
    std::fs::read(path)
        .expect("read tile")
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

/// Read a little-endian int16 tile.
pub fn read_i16_tile(path: &Path) -> Vec<i16> {
    std::fs::read(path)
        .expect("read tile")
        .chunks_exact(2)
        .map(|b| i16::from_le_bytes([b[0], b[1]]))
        .collect()
}
