//! TIFF header and IFD parsing.
//!
//! # TIFF Header Structure (8 bytes)
//! ```text
//! Bytes 0-1: Byte order (0x4949 = little-endian "II", 0x4D4D = big-endian "MM")
//! Bytes 2-3: Version (42 = 0x002A)
//! Bytes 4-7: Offset to first IFD (4 bytes)
//! ```
//!
//! # IFD Structure
//! ```text
//! 2 bytes          entry count N
//! N x 12 bytes     entries: tag u16, type u16, count u32, value-or-offset u32
//! 4 bytes          offset of the next IFD (0 terminates the chain)
//! ```
//!
//! Values that fit in the 4-byte field are stored inline and left-justified,
//! so a single SHORT occupies the first two bytes of the field in file byte
//! order. Inline values are always read from the raw field bytes.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::error::TiffError;
use crate::io::RangeReader;

pub use crate::io::ByteOrder;

use super::tags::{FieldType, TiffTag};

// =============================================================================
// Constants
// =============================================================================

/// Magic bytes indicating little-endian byte order ("II" for Intel)
const BYTE_ORDER_LITTLE_ENDIAN: u16 = 0x4949;

/// Magic bytes indicating big-endian byte order ("MM" for Motorola)
const BYTE_ORDER_BIG_ENDIAN: u16 = 0x4D4D;

/// Version number for classic TIFF
const VERSION_TIFF: u16 = 42;

/// Version number for BigTIFF
const VERSION_BIGTIFF: u16 = 43;

/// Size of the TIFF header in bytes
pub const TIFF_HEADER_SIZE: usize = 8;

/// Size of one IFD entry in bytes
pub const IFD_ENTRY_SIZE: usize = 12;

/// Upper bound on the IFD chain length
pub const MAX_IFDS: usize = 64;

// =============================================================================
// TiffHeader
// =============================================================================

/// Parsed TIFF file header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TiffHeader {
    /// Byte order for all multi-byte values in the file
    pub byte_order: ByteOrder,

    /// Offset to the first IFD in the file
    pub first_ifd_offset: u64,
}

impl TiffHeader {
    /// Parse a TIFF header from raw bytes.
    ///
    /// # Arguments
    /// * `bytes` - Raw header bytes (at least 8 bytes)
    /// * `file_size` - Total file size (used to validate IFD offset)
    ///
    /// # Errors
    /// - `InvalidMagic` if byte order bytes are not II or MM
    /// - `BigTiff` for version 43
    /// - `InvalidVersion` for any other version than 42
    /// - `FileTooSmall` if there aren't enough bytes for the header
    /// - `InvalidIfdOffset` if the first IFD offset is outside the file
    pub fn parse(bytes: &[u8], file_size: u64) -> Result<Self, TiffError> {
        if bytes.len() < TIFF_HEADER_SIZE {
            return Err(TiffError::FileTooSmall {
                required: TIFF_HEADER_SIZE as u64,
                actual: bytes.len() as u64,
            });
        }

        // Read as little-endian because we're checking for specific byte patterns
        let magic = u16::from_le_bytes([bytes[0], bytes[1]]);
        let byte_order = match magic {
            BYTE_ORDER_LITTLE_ENDIAN => ByteOrder::LittleEndian,
            BYTE_ORDER_BIG_ENDIAN => ByteOrder::BigEndian,
            _ => return Err(TiffError::InvalidMagic(magic)),
        };

        let version = byte_order.read_u16(&bytes[2..4]);
        match version {
            VERSION_TIFF => {}
            VERSION_BIGTIFF => return Err(TiffError::BigTiff),
            _ => return Err(TiffError::InvalidVersion(version)),
        }

        let first_ifd_offset = byte_order.read_u32(&bytes[4..8]) as u64;
        if first_ifd_offset < TIFF_HEADER_SIZE as u64 || first_ifd_offset >= file_size {
            return Err(TiffError::InvalidIfdOffset(first_ifd_offset));
        }

        Ok(TiffHeader {
            byte_order,
            first_ifd_offset,
        })
    }
}

/// Quick check on the first bytes of a file.
pub fn is_tiff_header(bytes: &[u8]) -> bool {
    bytes.len() >= 4
        && ((bytes[0] == b'I' && bytes[1] == b'I' && bytes[2] == 42 && bytes[3] == 0)
            || (bytes[0] == b'M' && bytes[1] == b'M' && bytes[2] == 0 && bytes[3] == 42))
}

// =============================================================================
// IfdEntry
// =============================================================================

/// A single 12-byte IFD entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IfdEntry {
    /// Numeric tag ID
    pub tag_id: u16,

    /// Decoded field type, `None` if unknown
    pub field_type: Option<FieldType>,

    /// Raw field type code
    pub field_type_raw: u16,

    /// Number of values
    pub count: u64,

    /// Raw 4-byte value-or-offset field, in file byte order
    pub value_offset_bytes: [u8; 4],

    /// Whether the value is stored in `value_offset_bytes`
    pub is_inline: bool,
}

impl IfdEntry {
    /// Parse an entry from its 12 raw bytes.
    pub fn parse(bytes: &[u8], byte_order: ByteOrder) -> Self {
        let tag_id = byte_order.read_u16(&bytes[0..2]);
        let field_type_raw = byte_order.read_u16(&bytes[2..4]);
        let field_type = FieldType::from_u16(field_type_raw);
        let count = byte_order.read_u32(&bytes[4..8]) as u64;
        let value_offset_bytes = [bytes[8], bytes[9], bytes[10], bytes[11]];
        let is_inline = field_type.map(|t| t.fits_inline(count)).unwrap_or(false);

        Self {
            tag_id,
            field_type,
            field_type_raw,
            count,
            value_offset_bytes,
            is_inline,
        }
    }

    /// The recognized tag, if any.
    pub fn tag(&self) -> Option<TiffTag> {
        TiffTag::from_u16(self.tag_id)
    }

    /// Total size in bytes of this entry's value, `None` for unknown types.
    pub fn value_byte_size(&self) -> Option<u64> {
        self.field_type
            .map(|t| t.size_in_bytes() as u64 * self.count)
    }

    /// Interpret the value field as a file offset.
    #[inline]
    pub fn value_offset(&self, byte_order: ByteOrder) -> u64 {
        byte_order.read_u32(&self.value_offset_bytes) as u64
    }

    /// Read a single inline SHORT or LONG value.
    ///
    /// SHORT values are left-justified, so they are read from the first
    /// two bytes rather than by truncating the field read as a LONG.
    pub fn inline_u32(&self, byte_order: ByteOrder) -> Option<u32> {
        if !self.is_inline || self.count != 1 {
            return None;
        }
        match self.field_type? {
            FieldType::Byte => Some(self.value_offset_bytes[0] as u32),
            FieldType::Short => Some(byte_order.read_u16(&self.value_offset_bytes[0..2]) as u32),
            FieldType::Long => Some(byte_order.read_u32(&self.value_offset_bytes)),
            _ => None,
        }
    }
}

// =============================================================================
// Ifd
// =============================================================================

/// A parsed Image File Directory.
#[derive(Debug, Clone)]
pub struct Ifd {
    /// File offset of this IFD
    pub offset: u64,

    /// Entries in file order
    pub entries: Vec<IfdEntry>,

    /// Index into `entries` by tag ID
    entries_by_tag: HashMap<u16, usize>,

    /// Offset of the next IFD, 0 if this is the last one
    pub next_ifd_offset: u64,
}

impl Ifd {
    /// Size in bytes of an IFD holding `entry_count` entries.
    #[inline]
    pub const fn calculate_size(entry_count: usize) -> usize {
        2 + entry_count * IFD_ENTRY_SIZE + 4
    }

    /// Parse an IFD from bytes starting at its entry count.
    pub fn parse(bytes: &[u8], offset: u64, byte_order: ByteOrder) -> Result<Self, TiffError> {
        if bytes.len() < 2 {
            return Err(TiffError::InvalidIfdOffset(offset));
        }
        let entry_count = byte_order.read_u16(&bytes[0..2]) as usize;
        let size = Self::calculate_size(entry_count);
        if bytes.len() < size {
            return Err(TiffError::FileTooSmall {
                required: offset + size as u64,
                actual: offset + bytes.len() as u64,
            });
        }

        let mut entries = Vec::with_capacity(entry_count);
        let mut entries_by_tag = HashMap::with_capacity(entry_count);
        for i in 0..entry_count {
            let start = 2 + i * IFD_ENTRY_SIZE;
            let entry = IfdEntry::parse(&bytes[start..start + IFD_ENTRY_SIZE], byte_order);
            entries_by_tag.insert(entry.tag_id, entries.len());
            entries.push(entry);
        }

        let next_start = 2 + entry_count * IFD_ENTRY_SIZE;
        let next_ifd_offset = byte_order.read_u32(&bytes[next_start..next_start + 4]) as u64;

        Ok(Self {
            offset,
            entries,
            entries_by_tag,
            next_ifd_offset,
        })
    }

    /// Look up an entry by tag.
    pub fn get_entry_by_tag(&self, tag: TiffTag) -> Option<&IfdEntry> {
        self.get_entry(tag.as_u16())
    }

    /// Look up an entry by numeric tag ID.
    pub fn get_entry(&self, tag_id: u16) -> Option<&IfdEntry> {
        self.entries_by_tag.get(&tag_id).map(|&i| &self.entries[i])
    }

    pub fn has_tag(&self, tag: TiffTag) -> bool {
        self.entries_by_tag.contains_key(&tag.as_u16())
    }
}

/// Parse every IFD in the chain starting at the header's first IFD.
///
/// Traversal stops with `IfdLoop` if an offset repeats or the chain grows
/// past `MAX_IFDS`.
pub async fn parse_ifd_chain<R: RangeReader + ?Sized>(
    reader: &R,
    header: &TiffHeader,
) -> Result<Vec<Ifd>, TiffError> {
    let byte_order = header.byte_order;
    let size = reader.size();
    let mut ifds = Vec::new();
    let mut visited = HashSet::new();
    let mut offset = header.first_ifd_offset;

    while offset != 0 {
        if !visited.insert(offset) || ifds.len() >= MAX_IFDS {
            return Err(TiffError::IfdLoop(offset));
        }
        if offset + 2 > size {
            return Err(TiffError::InvalidIfdOffset(offset));
        }

        let count_bytes = reader.read_exact_at(offset, 2).await?;
        let entry_count = byte_order.read_u16(&count_bytes) as usize;
        let ifd_size = Ifd::calculate_size(entry_count);
        let bytes = reader.read_exact_at(offset, ifd_size).await?;
        let ifd = Ifd::parse(&bytes, offset, byte_order)?;

        debug!(
            offset,
            entries = entry_count,
            next = ifd.next_ifd_offset,
            "parsed IFD"
        );

        offset = ifd.next_ifd_offset;
        ifds.push(ifd);
    }

    Ok(ifds)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::MemoryRangeReader;

    #[test]
    fn test_parse_tiff_little_endian() {
        let header = [0x49, 0x49, 0x2A, 0x00, 0x08, 0x00, 0x00, 0x00];
        let result = TiffHeader::parse(&header, 1000).unwrap();
        assert_eq!(result.byte_order, ByteOrder::LittleEndian);
        assert_eq!(result.first_ifd_offset, 8);
    }

    #[test]
    fn test_parse_tiff_big_endian() {
        let header = [0x4D, 0x4D, 0x00, 0x2A, 0x00, 0x00, 0x00, 0x08];
        let result = TiffHeader::parse(&header, 1000).unwrap();
        assert_eq!(result.byte_order, ByteOrder::BigEndian);
        assert_eq!(result.first_ifd_offset, 8);
    }

    #[test]
    fn test_parse_invalid_magic() {
        let header = [0x00, 0x00, 0x2A, 0x00, 0x08, 0x00, 0x00, 0x00];
        let result = TiffHeader::parse(&header, 1000);
        assert!(matches!(result, Err(TiffError::InvalidMagic(0x0000))));
    }

    #[test]
    fn test_parse_invalid_version() {
        let header = [0x49, 0x49, 0x00, 0x00, 0x08, 0x00, 0x00, 0x00];
        let result = TiffHeader::parse(&header, 1000);
        assert!(matches!(result, Err(TiffError::InvalidVersion(0))));
    }

    #[test]
    fn test_parse_bigtiff_rejected() {
        let header = [0x49, 0x49, 0x2B, 0x00, 0x08, 0x00, 0x00, 0x00];
        let result = TiffHeader::parse(&header, 1000);
        assert!(matches!(result, Err(TiffError::BigTiff)));
    }

    #[test]
    fn test_parse_file_too_small() {
        let header = [0x49, 0x49, 0x2A, 0x00];
        let result = TiffHeader::parse(&header, 1000);
        assert!(matches!(
            result,
            Err(TiffError::FileTooSmall {
                required: 8,
                actual: 4
            })
        ));
    }

    #[test]
    fn test_parse_invalid_ifd_offset() {
        let header = [0x49, 0x49, 0x2A, 0x00, 0xE8, 0x03, 0x00, 0x00];
        let result = TiffHeader::parse(&header, 500);
        assert!(matches!(result, Err(TiffError::InvalidIfdOffset(1000))));
    }

    #[test]
    fn test_is_tiff_header() {
        assert!(is_tiff_header(b"II*\0"));
        assert!(is_tiff_header(b"MM\0*"));
        assert!(!is_tiff_header(b"\x89PNG"));
        assert!(!is_tiff_header(b"II"));
    }

    #[test]
    fn test_inline_short_is_left_justified_big_endian() {
        // SHORT 7, count 1, big-endian: value lives in the first two bytes
        let bytes = [
            0x01, 0x00, // tag 256
            0x00, 0x03, // SHORT
            0x00, 0x00, 0x00, 0x01, // count 1
            0x00, 0x07, 0x00, 0x00, // value, left-justified
        ];
        let entry = IfdEntry::parse(&bytes, ByteOrder::BigEndian);
        assert!(entry.is_inline);
        assert_eq!(entry.tag(), Some(TiffTag::ImageWidth));
        assert_eq!(entry.inline_u32(ByteOrder::BigEndian), Some(7));
    }

    #[test]
    fn test_inline_short_little_endian() {
        let bytes = [
            0x01, 0x01, 0x03, 0x00, 0x01, 0x00, 0x00, 0x00, 0x2C, 0x01, 0x00, 0x00,
        ];
        let entry = IfdEntry::parse(&bytes, ByteOrder::LittleEndian);
        assert_eq!(entry.tag(), Some(TiffTag::ImageLength));
        assert_eq!(entry.inline_u32(ByteOrder::LittleEndian), Some(300));
    }

    #[test]
    fn test_offset_entry_not_inline() {
        // 3 SHORTs do not fit in 4 bytes
        let bytes = [
            0x02, 0x01, 0x03, 0x00, 0x03, 0x00, 0x00, 0x00, 0x40, 0x00, 0x00, 0x00,
        ];
        let entry = IfdEntry::parse(&bytes, ByteOrder::LittleEndian);
        assert!(!entry.is_inline);
        assert_eq!(entry.value_offset(ByteOrder::LittleEndian), 64);
        assert_eq!(entry.value_byte_size(), Some(6));
        assert_eq!(entry.inline_u32(ByteOrder::LittleEndian), None);
    }

    fn one_entry_ifd(next: u32) -> Vec<u8> {
        let mut ifd = vec![0x01, 0x00];
        ifd.extend_from_slice(&[
            0x00, 0x01, 0x03, 0x00, 0x01, 0x00, 0x00, 0x00, 0x05, 0x00, 0x00, 0x00,
        ]);
        ifd.extend_from_slice(&next.to_le_bytes());
        ifd
    }

    #[tokio::test]
    async fn test_parse_ifd_chain_two_ifds() {
        let mut file = vec![0x49, 0x49, 0x2A, 0x00, 0x08, 0x00, 0x00, 0x00];
        let second = 8 + Ifd::calculate_size(1) as u32;
        file.extend(one_entry_ifd(second));
        file.extend(one_entry_ifd(0));

        let reader = MemoryRangeReader::new(file, "chain");
        let header = TiffHeader::parse(&reader.bytes()[..8], reader.size()).unwrap();
        let ifds = parse_ifd_chain(&reader, &header).await.unwrap();
        assert_eq!(ifds.len(), 2);
        assert_eq!(ifds[1].offset, second as u64);
        assert!(ifds[0].has_tag(TiffTag::ImageWidth));
    }

    #[tokio::test]
    async fn test_parse_ifd_chain_detects_loop() {
        let mut file = vec![0x49, 0x49, 0x2A, 0x00, 0x08, 0x00, 0x00, 0x00];
        file.extend(one_entry_ifd(8));

        let reader = MemoryRangeReader::new(file, "loop");
        let header = TiffHeader::parse(&reader.bytes()[..8], reader.size()).unwrap();
        let result = parse_ifd_chain(&reader, &header).await;
        assert!(matches!(result, Err(TiffError::IfdLoop(8))));
    }
}
