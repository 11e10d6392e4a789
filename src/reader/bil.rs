//! Raw band-interleaved elevation grids (`.bil`) with ESRI `.hdr` and world
//! file sidecars.
//!
//! Grids above the memory-map threshold are mapped rather than read, so a
//! large grid costs address space instead of heap until it is sampled.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use memmap2::Mmap;
use tracing::{debug, warn};

use crate::error::{IoError, ProbeError, ReadError};
use crate::io::{ByteOrder, RangeReader};
use crate::raster::{
    DataRaster, ElementBuffer, ElementData, ElementType, MappedGrid, PixelFormat, Sector,
};

use super::metadata::{PartialMetadata, RasterMetadata};
use super::source::RasterSource;
use super::world_file::sector_from_world_file;

/// Default size above which grids are memory-mapped: 64 MiB.
pub const DEFAULT_MMAP_THRESHOLD: u64 = 64 * 1024 * 1024;

/// Fields of an ESRI `.hdr` file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HdrFile {
    pub byte_order: Option<ByteOrder>,
    pub nbits: Option<u32>,
    /// SIGNEDINT, UNSIGNEDINT or FLOAT, uppercase
    pub pixel_type: Option<String>,
    pub nrows: Option<u32>,
    pub ncols: Option<u32>,
    pub nbands: Option<u32>,
    pub nodata: Option<f64>,
    pub ulxmap: Option<f64>,
    pub ulymap: Option<f64>,
    pub xdim: Option<f64>,
    pub ydim: Option<f64>,
}

impl HdrFile {
    /// Parse whitespace-separated key/value lines. Unknown keys are ignored.
    pub fn parse(text: &str) -> Result<Self, String> {
        let mut hdr = HdrFile::default();
        for line in text.lines() {
            let mut parts = line.split_whitespace();
            let (Some(key), Some(value)) = (parts.next(), parts.next()) else {
                continue;
            };
            let key = key.to_ascii_uppercase();
            let number = || {
                value
                    .parse::<f64>()
                    .map_err(|_| format!("{}: not a number: '{}'", key, value))
            };
            let count = || {
                value
                    .parse::<u32>()
                    .map_err(|_| format!("{}: not a count: '{}'", key, value))
            };
            match key.as_str() {
                "BYTEORDER" => {
                    hdr.byte_order = match value.to_ascii_uppercase().as_str() {
                        "I" | "LSBFIRST" => Some(ByteOrder::LittleEndian),
                        "M" | "MSBFIRST" => Some(ByteOrder::BigEndian),
                        other => return Err(format!("BYTEORDER: unknown '{}'", other)),
                    }
                }
                "NBITS" => hdr.nbits = Some(count()?),
                "PIXELTYPE" => hdr.pixel_type = Some(value.to_ascii_uppercase()),
                "NROWS" => hdr.nrows = Some(count()?),
                "NCOLS" => hdr.ncols = Some(count()?),
                "NBANDS" => hdr.nbands = Some(count()?),
                "NODATA" | "NODATA_VALUE" => hdr.nodata = Some(number()?),
                "ULXMAP" => hdr.ulxmap = Some(number()?),
                "ULYMAP" => hdr.ulymap = Some(number()?),
                "XDIM" => hdr.xdim = Some(number()?),
                "YDIM" => hdr.ydim = Some(number()?),
                _ => {}
            }
        }
        Ok(hdr)
    }

    /// Element type from NBITS and PIXELTYPE.
    pub fn element_type(&self) -> Result<Option<ElementType>, String> {
        let Some(bits) = self.nbits else {
            return Ok(None);
        };
        let kind = self.pixel_type.as_deref().unwrap_or("UNSIGNEDINT");
        match (bits, kind) {
            (8, "UNSIGNEDINT") => Ok(Some(ElementType::U8)),
            (16, "SIGNEDINT") => Ok(Some(ElementType::I16)),
            (16, "UNSIGNEDINT") => Ok(Some(ElementType::U16)),
            (32, "FLOAT") => Ok(Some(ElementType::F32)),
            (bits, kind) => Err(format!("{}-bit {} samples", bits, kind)),
        }
    }

    /// Sector from ULXMAP/ULYMAP (upper-left pixel centre) and XDIM/YDIM.
    pub fn sector(&self) -> Option<Sector> {
        let (ulx, uly, xdim, ydim) = (self.ulxmap?, self.ulymap?, self.xdim?, self.ydim?);
        let (cols, rows) = (self.ncols? as f64, self.nrows? as f64);
        let min_lon = ulx - xdim / 2.0;
        let max_lat = uly + ydim / 2.0;
        Some(Sector::new(
            max_lat - ydim * rows,
            max_lat,
            min_lon,
            min_lon + xdim * cols,
        ))
    }
}

fn hdr_path(path: &Path) -> PathBuf {
    path.with_extension("hdr")
}

async fn read_hdr(path: &Path) -> Result<Option<HdrFile>, ReadError> {
    let hdr = hdr_path(path);
    match tokio::fs::read_to_string(&hdr).await {
        Ok(text) => HdrFile::parse(&text)
            .map(Some)
            .map_err(|message| ReadError::InvalidMetadata {
                source_name: hdr.display().to_string(),
                message,
            }),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(IoError::from(e).into()),
    }
}

/// Everything needed to lay out a grid.
struct GridLayout {
    width: u32,
    height: u32,
    sector: Sector,
    element_type: ElementType,
    byte_order: ByteOrder,
    missing_data: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct BilReader {
    mmap_threshold: u64,
}

impl Default for BilReader {
    fn default() -> Self {
        Self::new()
    }
}

impl BilReader {
    pub fn new() -> Self {
        Self {
            mmap_threshold: DEFAULT_MMAP_THRESHOLD,
        }
    }

    pub fn with_mmap_threshold(mut self, bytes: u64) -> Self {
        self.mmap_threshold = bytes;
        self
    }

    pub fn mmap_threshold(&self) -> u64 {
        self.mmap_threshold
    }

    pub async fn probe(&self, source: &RasterSource) -> Result<bool, ProbeError> {
        Ok(source.suffix().as_deref() == Some("bil"))
    }

    /// Caller metadata, then `.hdr` fields, then world file or `.hdr` geo.
    async fn gather(
        &self,
        source: &RasterSource,
        partial: &PartialMetadata,
    ) -> Result<PartialMetadata, ReadError> {
        let hints = partial.clone().or(source.hints());
        if hints.pixel_format == Some(PixelFormat::Image) {
            return Err(ReadError::UnsupportedFormat {
                reason: "raw grids hold elevation data".to_string(),
            });
        }

        let Some(path) = source.path() else {
            return Ok(PartialMetadata {
                pixel_format: Some(PixelFormat::Elevation),
                ..hints
            });
        };

        let hdr = read_hdr(path).await?.unwrap_or_default();
        if hdr.nbands.unwrap_or(1) != 1 {
            return Err(ReadError::UnsupportedFormat {
                reason: format!("{} bands", hdr.nbands.unwrap_or(1)),
            });
        }
        let element_type = hdr
            .element_type()
            .map_err(|reason| ReadError::UnsupportedFormat { reason })?;

        let mut meta = hints.or(&PartialMetadata {
            width: hdr.ncols,
            height: hdr.nrows,
            element_type,
            byte_order: hdr.byte_order,
            missing_data: hdr.nodata,
            pixel_format: Some(PixelFormat::Elevation),
            sector: None,
        });

        if meta.sector.is_none() {
            if let (Some(width), Some(height)) = (meta.width, meta.height) {
                meta.sector = match sector_from_world_file(path, width, height).await? {
                    Some(sector) => Some(sector),
                    None => hdr.sector(),
                };
            }
        }
        if let Some(sector) = meta.sector {
            if !sector.is_geographic() {
                return Err(ReadError::ProjectionUnsupported(format!(
                    "grid coordinates {} are outside geographic range",
                    sector
                )));
            }
        }
        Ok(meta)
    }

    async fn layout(
        &self,
        source: &RasterSource,
        partial: &PartialMetadata,
    ) -> Result<GridLayout, ReadError> {
        let meta = self.gather(source, partial).await?;
        let mut missing = meta.missing_fields();
        if meta.element_type.is_none() {
            missing.push("pixel type");
        }
        if meta.byte_order.is_none() {
            missing.push("byte order");
        }
        match (
            meta.width,
            meta.height,
            meta.sector,
            meta.element_type,
            meta.byte_order,
        ) {
            (Some(width), Some(height), Some(sector), Some(element_type), Some(byte_order))
                if missing.is_empty() =>
            {
                Ok(GridLayout {
                    width,
                    height,
                    sector,
                    element_type,
                    byte_order,
                    missing_data: meta.missing_data,
                })
            }
            _ => Err(ReadError::MissingMetadata {
                source_name: source.name(),
                missing: missing.join(", "),
            }),
        }
    }

    pub async fn read(&self, source: &RasterSource) -> Result<Vec<DataRaster>, ReadError> {
        let layout = self.layout(source, &PartialMetadata::default()).await?;
        let elements = layout.width as usize * layout.height as usize;
        let expected = (elements * layout.element_type.size_in_bytes()) as u64;

        let size = source.range_reader().await?.size();
        if size != expected {
            return Err(ReadError::InvalidMetadata {
                source_name: source.name(),
                message: format!(
                    "{} bytes, expected {}x{} {} elements ({} bytes)",
                    size, layout.width, layout.height, layout.element_type, expected
                ),
            });
        }

        let buffer = match source.path() {
            Some(path) if size > self.mmap_threshold => {
                debug!(source = %source.name(), size, "memory-mapping grid");
                let map = map_file(path)?;
                MappedGrid::new(
                    Arc::new(map),
                    0,
                    elements,
                    layout.element_type,
                    layout.byte_order,
                )
                .and_then(|grid| {
                    ElementBuffer::from_mapped(layout.width, layout.height, grid, layout.missing_data)
                })
            }
            _ => {
                let bytes = source.read_all().await?;
                let data = ElementData::from_bytes(layout.element_type, &bytes, layout.byte_order);
                ElementBuffer::from_data(layout.width, layout.height, 1, data, layout.missing_data)
            }
        }
        .ok_or_else(|| ReadError::InvalidMetadata {
            source_name: source.name(),
            message: "grid shorter than its dimensions".to_string(),
        })?;

        debug!(
            source = %source.name(),
            width = layout.width,
            height = layout.height,
            element_type = %layout.element_type,
            mapped = buffer.is_mapped(),
            "read raw grid"
        );
        Ok(vec![DataRaster::from_buffer(buffer, layout.sector)])
    }

    pub async fn read_metadata(
        &self,
        source: &RasterSource,
        partial: PartialMetadata,
    ) -> Result<RasterMetadata, ReadError> {
        let layout = self.layout(source, &partial).await?;
        Ok(RasterMetadata {
            width: layout.width,
            height: layout.height,
            sector: layout.sector,
            pixel_format: PixelFormat::Elevation,
            element_type: Some(layout.element_type),
            byte_order: Some(layout.byte_order),
            missing_data: layout.missing_data,
        })
    }
}

fn map_file(path: &Path) -> Result<Mmap, ReadError> {
    let file = std::fs::File::open(path).map_err(IoError::from)?;
    // The mapping is read-only; a file truncated underneath it is not supported
    let map = unsafe { Mmap::map(&file) }.map_err(|e| {
        warn!(path = %path.display(), error = %e, "memory map failed");
        IoError::from(e)
    })?;
    Ok(map)
}
