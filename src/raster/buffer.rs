//! Typed element buffers for elevation and other scalar grids.
//!
//! A buffer either owns its elements or views a memory-mapped file. Mapped
//! buffers are read-only and decode elements in the file's byte order on
//! access.

use std::fmt;
use std::sync::Arc;

use memmap2::Mmap;
use serde::{Deserialize, Serialize};

use crate::io::ByteOrder;

// =============================================================================
// ElementType
// =============================================================================

/// Storage type of a single buffer element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ElementType {
    #[serde(rename = "uint8")]
    U8,
    #[serde(rename = "int16")]
    I16,
    #[serde(rename = "uint16")]
    U16,
    #[serde(rename = "float32")]
    F32,
}

impl ElementType {
    #[inline]
    pub const fn size_in_bytes(self) -> usize {
        match self {
            ElementType::U8 => 1,
            ElementType::I16 | ElementType::U16 => 2,
            ElementType::F32 => 4,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            ElementType::U8 => "uint8",
            ElementType::I16 => "int16",
            ElementType::U16 => "uint16",
            ElementType::F32 => "float32",
        }
    }

    /// Parse a pixel type name, accepting the ESRI header spellings.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "uint8" | "u8" | "byte" | "unsignedint8" => Some(ElementType::U8),
            "int16" | "i16" | "short" | "signedint16" => Some(ElementType::I16),
            "uint16" | "u16" | "unsignedint16" => Some(ElementType::U16),
            "float32" | "f32" | "float" => Some(ElementType::F32),
            _ => None,
        }
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// =============================================================================
// ElementData
// =============================================================================

/// Owned, typed element storage.
#[derive(Debug, Clone, PartialEq)]
pub enum ElementData {
    U8(Vec<u8>),
    I16(Vec<i16>),
    U16(Vec<u16>),
    F32(Vec<f32>),
}

impl ElementData {
    /// Allocate `len` elements set to `value`.
    pub fn filled(element_type: ElementType, len: usize, value: f64) -> Self {
        match element_type {
            ElementType::U8 => ElementData::U8(vec![value as u8; len]),
            ElementType::I16 => ElementData::I16(vec![value as i16; len]),
            ElementType::U16 => ElementData::U16(vec![value as u16; len]),
            ElementType::F32 => ElementData::F32(vec![value as f32; len]),
        }
    }

    pub fn element_type(&self) -> ElementType {
        match self {
            ElementData::U8(_) => ElementType::U8,
            ElementData::I16(_) => ElementType::I16,
            ElementData::U16(_) => ElementType::U16,
            ElementData::F32(_) => ElementType::F32,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            ElementData::U8(v) => v.len(),
            ElementData::I16(v) => v.len(),
            ElementData::U16(v) => v.len(),
            ElementData::F32(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn get(&self, index: usize) -> f64 {
        match self {
            ElementData::U8(v) => v[index] as f64,
            ElementData::I16(v) => v[index] as f64,
            ElementData::U16(v) => v[index] as f64,
            ElementData::F32(v) => v[index] as f64,
        }
    }

    /// Store a value, saturating at the bounds of the element type.
    #[inline]
    pub fn set(&mut self, index: usize, value: f64) {
        match self {
            ElementData::U8(v) => v[index] = value.round() as u8,
            ElementData::I16(v) => v[index] = value.round() as i16,
            ElementData::U16(v) => v[index] = value.round() as u16,
            ElementData::F32(v) => v[index] = value as f32,
        }
    }

    pub fn fill(&mut self, value: f64) {
        match self {
            ElementData::U8(v) => v.fill(value as u8),
            ElementData::I16(v) => v.fill(value as i16),
            ElementData::U16(v) => v.fill(value as u16),
            ElementData::F32(v) => v.fill(value as f32),
        }
    }

    pub fn size_in_bytes(&self) -> usize {
        self.len() * self.element_type().size_in_bytes()
    }

    /// Decode elements from raw bytes in the given byte order.
    ///
    /// Trailing bytes that do not form a whole element are ignored.
    pub fn from_bytes(element_type: ElementType, bytes: &[u8], byte_order: ByteOrder) -> Self {
        match element_type {
            ElementType::U8 => ElementData::U8(bytes.to_vec()),
            ElementType::I16 => ElementData::I16(
                bytes
                    .chunks_exact(2)
                    .map(|c| byte_order.read_u16(c) as i16)
                    .collect(),
            ),
            ElementType::U16 => ElementData::U16(
                bytes
                    .chunks_exact(2)
                    .map(|c| byte_order.read_u16(c))
                    .collect(),
            ),
            ElementType::F32 => ElementData::F32(
                bytes
                    .chunks_exact(4)
                    .map(|c| byte_order.read_f32(c))
                    .collect(),
            ),
        }
    }

    /// Encode elements as raw bytes in the given byte order.
    pub fn to_bytes(&self, byte_order: ByteOrder) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.size_in_bytes());
        match self {
            ElementData::U8(v) => out.extend_from_slice(v),
            ElementData::I16(v) => v
                .iter()
                .for_each(|&x| out.extend_from_slice(&byte_order.u16_bytes(x as u16))),
            ElementData::U16(v) => v
                .iter()
                .for_each(|&x| out.extend_from_slice(&byte_order.u16_bytes(x))),
            ElementData::F32(v) => v
                .iter()
                .for_each(|&x| out.extend_from_slice(&byte_order.u32_bytes(x.to_bits()))),
        }
        out
    }
}

// =============================================================================
// MappedGrid
// =============================================================================

/// A read-only grid of elements backed by a memory-mapped file.
#[derive(Clone)]
pub struct MappedGrid {
    map: Arc<Mmap>,
    offset: usize,
    len: usize,
    element_type: ElementType,
    byte_order: ByteOrder,
}

impl MappedGrid {
    /// View `len` elements starting at byte `offset` of the mapping.
    ///
    /// Returns `None` if the mapping is too short.
    pub fn new(
        map: Arc<Mmap>,
        offset: usize,
        len: usize,
        element_type: ElementType,
        byte_order: ByteOrder,
    ) -> Option<Self> {
        let end = offset.checked_add(len.checked_mul(element_type.size_in_bytes())?)?;
        if end > map.len() {
            return None;
        }
        Some(Self {
            map,
            offset,
            len,
            element_type,
            byte_order,
        })
    }

    #[inline]
    pub fn get(&self, index: usize) -> f64 {
        let size = self.element_type.size_in_bytes();
        let start = self.offset + index * size;
        let bytes = &self.map[start..start + size];
        match self.element_type {
            ElementType::U8 => bytes[0] as f64,
            ElementType::I16 => self.byte_order.read_u16(bytes) as i16 as f64,
            ElementType::U16 => self.byte_order.read_u16(bytes) as f64,
            ElementType::F32 => self.byte_order.read_f32(bytes) as f64,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Copy the mapped elements into owned storage.
    pub fn to_owned_data(&self) -> ElementData {
        let size = self.element_type.size_in_bytes();
        let bytes = &self.map[self.offset..self.offset + self.len * size];
        ElementData::from_bytes(self.element_type, bytes, self.byte_order)
    }
}

impl fmt::Debug for MappedGrid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MappedGrid")
            .field("offset", &self.offset)
            .field("len", &self.len)
            .field("element_type", &self.element_type)
            .field("byte_order", &self.byte_order)
            .finish()
    }
}

// =============================================================================
// ElementBuffer
// =============================================================================

#[derive(Debug, Clone)]
pub enum ElementStorage {
    Owned(ElementData),
    Mapped(MappedGrid),
}

/// A `width x height x bands` grid of elements, band-interleaved by pixel.
#[derive(Debug, Clone)]
pub struct ElementBuffer {
    width: u32,
    height: u32,
    bands: usize,
    storage: ElementStorage,
    missing_data: Option<f64>,
}

impl ElementBuffer {
    /// Allocate a buffer prefilled with the missing-data value, or zero.
    pub fn new(
        width: u32,
        height: u32,
        bands: usize,
        element_type: ElementType,
        missing_data: Option<f64>,
    ) -> Self {
        let len = width as usize * height as usize * bands;
        Self {
            width,
            height,
            bands,
            storage: ElementStorage::Owned(ElementData::filled(
                element_type,
                len,
                missing_data.unwrap_or(0.0),
            )),
            missing_data,
        }
    }

    /// Wrap owned data. Returns `None` if the data is shorter than the grid.
    pub fn from_data(
        width: u32,
        height: u32,
        bands: usize,
        data: ElementData,
        missing_data: Option<f64>,
    ) -> Option<Self> {
        if bands == 0 || data.len() < width as usize * height as usize * bands {
            return None;
        }
        Some(Self {
            width,
            height,
            bands,
            storage: ElementStorage::Owned(data),
            missing_data,
        })
    }

    /// Wrap a single-band mapped grid. Returns `None` if the grid is too short.
    pub fn from_mapped(
        width: u32,
        height: u32,
        grid: MappedGrid,
        missing_data: Option<f64>,
    ) -> Option<Self> {
        if grid.len() < width as usize * height as usize {
            return None;
        }
        Some(Self {
            width,
            height,
            bands: 1,
            storage: ElementStorage::Mapped(grid),
            missing_data,
        })
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    pub fn bands(&self) -> usize {
        self.bands
    }

    pub fn missing_data(&self) -> Option<f64> {
        self.missing_data
    }

    pub fn element_type(&self) -> ElementType {
        match &self.storage {
            ElementStorage::Owned(data) => data.element_type(),
            ElementStorage::Mapped(grid) => grid.element_type,
        }
    }

    pub fn is_mapped(&self) -> bool {
        matches!(self.storage, ElementStorage::Mapped(_))
    }

    /// Owned data, `None` for mapped buffers.
    pub fn data(&self) -> Option<&ElementData> {
        match &self.storage {
            ElementStorage::Owned(data) => Some(data),
            ElementStorage::Mapped(_) => None,
        }
    }

    /// Mutable owned data, `None` for mapped buffers.
    pub fn data_mut(&mut self) -> Option<&mut ElementData> {
        match &mut self.storage {
            ElementStorage::Owned(data) => Some(data),
            ElementStorage::Mapped(_) => None,
        }
    }

    #[inline]
    fn index(&self, x: u32, y: u32, band: usize) -> usize {
        (y as usize * self.width as usize + x as usize) * self.bands + band
    }

    /// Element value at a pixel and band.
    ///
    /// # Panics
    /// Panics if the position is outside the buffer.
    #[inline]
    pub fn get(&self, x: u32, y: u32, band: usize) -> f64 {
        let i = self.index(x, y, band);
        match &self.storage {
            ElementStorage::Owned(data) => data.get(i),
            ElementStorage::Mapped(grid) => grid.get(i),
        }
    }

    /// Store a value, returning `false` for mapped buffers or positions
    /// outside the buffer.
    #[inline]
    pub fn set(&mut self, x: u32, y: u32, band: usize, value: f64) -> bool {
        if x >= self.width || y >= self.height || band >= self.bands {
            return false;
        }
        let i = self.index(x, y, band);
        match &mut self.storage {
            ElementStorage::Owned(data) => {
                data.set(i, value);
                true
            }
            ElementStorage::Mapped(_) => false,
        }
    }

    /// Whether a value equals the missing-data sentinel.
    #[inline]
    pub fn is_missing(&self, value: f64) -> bool {
        match self.missing_data {
            Some(m) => value == m || (m.is_nan() && value.is_nan()),
            None => false,
        }
    }

    /// Bytes held by the buffer (mapped bytes count too).
    pub fn size_in_bytes(&self) -> usize {
        self.width as usize * self.height as usize * self.bands * self.element_type().size_in_bytes()
    }

    /// Encode the elements as raw bytes in the given byte order.
    pub fn to_bytes(&self, byte_order: ByteOrder) -> Vec<u8> {
        match &self.storage {
            ElementStorage::Owned(data) => data.to_bytes(byte_order),
            ElementStorage::Mapped(grid) => grid.to_owned_data().to_bytes(byte_order),
        }
    }
}
