//! TIFF tag value reading.
//!
//! Values can be stored either inline in the IFD entry (for small values)
//! or at an offset in the file (for larger values like arrays). Arrays are
//! fetched with a single range read.

use bytes::Bytes;

use crate::error::TiffError;
use crate::io::RangeReader;

use super::parser::{ByteOrder, IfdEntry, TiffHeader};
use super::tags::FieldType;

// =============================================================================
// ValueReader
// =============================================================================

/// Reads tag values from a TIFF file.
///
/// Combines a RangeReader with the header so values are read respecting
/// the file's byte order.
pub struct ValueReader<'a, R: RangeReader + ?Sized> {
    reader: &'a R,
    header: &'a TiffHeader,
}

fn tag_name(entry: &IfdEntry) -> &'static str {
    entry.tag().map(|t| t.name()).unwrap_or("unknown")
}

impl<'a, R: RangeReader + ?Sized> ValueReader<'a, R> {
    /// Create a new ValueReader.
    pub fn new(reader: &'a R, header: &'a TiffHeader) -> Self {
        Self { reader, header }
    }

    /// Get the byte order from the header.
    #[inline]
    pub fn byte_order(&self) -> ByteOrder {
        self.header.byte_order
    }

    /// Read raw bytes for an IFD entry's value.
    ///
    /// For inline values, returns the bytes from the entry.
    /// For offset values, fetches the bytes from the file.
    pub async fn read_bytes(&self, entry: &IfdEntry) -> Result<Bytes, TiffError> {
        let size = entry
            .value_byte_size()
            .ok_or(TiffError::UnknownFieldType(entry.field_type_raw))?;

        if entry.is_inline {
            Ok(Bytes::copy_from_slice(
                &entry.value_offset_bytes[..size as usize],
            ))
        } else {
            let offset = entry.value_offset(self.header.byte_order);
            let bytes = self.reader.read_exact_at(offset, size as usize).await?;
            Ok(bytes)
        }
    }

    /// Read a single unsigned integer value from an entry.
    ///
    /// Handles Byte, Short and Long field types.
    pub async fn read_u32(&self, entry: &IfdEntry) -> Result<u32, TiffError> {
        if let Some(value) = entry.inline_u32(self.header.byte_order) {
            return Ok(value);
        }

        let values = self.read_u32_array(entry).await?;
        match values.as_slice() {
            [value] => Ok(*value),
            _ => Err(TiffError::InvalidTagValue {
                tag: tag_name(entry),
                message: format!("expected count 1, got {}", entry.count),
            }),
        }
    }

    /// Read an array of unsigned integers (Byte, Short or Long).
    ///
    /// This is the method for StripOffsets and StripByteCounts.
    pub async fn read_u32_array(&self, entry: &IfdEntry) -> Result<Vec<u32>, TiffError> {
        let field_type = entry
            .field_type
            .ok_or(TiffError::UnknownFieldType(entry.field_type_raw))?;

        if entry.count == 0 {
            return Ok(Vec::new());
        }

        let bytes = self.read_bytes(entry).await?;
        match field_type {
            FieldType::Byte | FieldType::Short | FieldType::Long => Ok(parse_u32_array(
                &bytes,
                entry.count as usize,
                field_type,
                self.header.byte_order,
            )),
            _ => Err(TiffError::InvalidTagValue {
                tag: tag_name(entry),
                message: format!("expected Byte, Short or Long, got {:?}", field_type),
            }),
        }
    }

    /// Read an array of Short values.
    pub async fn read_u16_array(&self, entry: &IfdEntry) -> Result<Vec<u16>, TiffError> {
        match entry.field_type {
            Some(FieldType::Short) => {}
            Some(other) => {
                return Err(TiffError::InvalidTagValue {
                    tag: tag_name(entry),
                    message: format!("expected Short, got {:?}", other),
                })
            }
            None => return Err(TiffError::UnknownFieldType(entry.field_type_raw)),
        }

        let bytes = self.read_bytes(entry).await?;
        let byte_order = self.header.byte_order;
        Ok(bytes
            .chunks_exact(2)
            .take(entry.count as usize)
            .map(|c| byte_order.read_u16(c))
            .collect())
    }

    /// Read an array of numeric values as f64.
    ///
    /// Accepts any integer, rational or floating point field type.
    pub async fn read_f64_array(&self, entry: &IfdEntry) -> Result<Vec<f64>, TiffError> {
        let field_type = entry
            .field_type
            .ok_or(TiffError::UnknownFieldType(entry.field_type_raw))?;

        if field_type == FieldType::Ascii {
            return Err(TiffError::InvalidTagValue {
                tag: tag_name(entry),
                message: "expected a numeric type, got Ascii".to_string(),
            });
        }

        let bytes = self.read_bytes(entry).await?;
        Ok(parse_f64_array(
            &bytes,
            entry.count as usize,
            field_type,
            self.header.byte_order,
        ))
    }

    /// Read a string value from an entry (ASCII type).
    ///
    /// The string is expected to be null-terminated. The null terminator
    /// is stripped from the result.
    pub async fn read_string(&self, entry: &IfdEntry) -> Result<String, TiffError> {
        let field_type = entry
            .field_type
            .ok_or(TiffError::UnknownFieldType(entry.field_type_raw))?;

        if field_type != FieldType::Ascii {
            return Err(TiffError::InvalidTagValue {
                tag: tag_name(entry),
                message: format!("expected Ascii type for string, got {:?}", field_type),
            });
        }

        let bytes = self.read_bytes(entry).await?;
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        Ok(String::from_utf8_lossy(&bytes[..end]).into_owned())
    }
}

// =============================================================================
// Convenience functions for reading from bytes directly
// =============================================================================

/// Parse an array of unsigned integers from raw bytes.
pub fn parse_u32_array(
    bytes: &[u8],
    count: usize,
    field_type: FieldType,
    byte_order: ByteOrder,
) -> Vec<u32> {
    let size = field_type.size_in_bytes();
    bytes
        .chunks_exact(size)
        .take(count)
        .filter_map(|c| match field_type {
            FieldType::Byte => Some(c[0] as u32),
            FieldType::Short => Some(byte_order.read_u16(c) as u32),
            FieldType::Long => Some(byte_order.read_u32(c)),
            _ => None,
        })
        .collect()
}

/// Parse an array of numeric values from raw bytes as f64.
pub fn parse_f64_array(
    bytes: &[u8],
    count: usize,
    field_type: FieldType,
    byte_order: ByteOrder,
) -> Vec<f64> {
    let size = field_type.size_in_bytes();
    bytes
        .chunks_exact(size)
        .take(count)
        .map(|c| match field_type {
            FieldType::Byte | FieldType::Undefined | FieldType::Ascii => c[0] as f64,
            FieldType::SByte => c[0] as i8 as f64,
            FieldType::Short => byte_order.read_u16(c) as f64,
            FieldType::SShort => byte_order.read_u16(c) as i16 as f64,
            FieldType::Long => byte_order.read_u32(c) as f64,
            FieldType::SLong => byte_order.read_u32(c) as i32 as f64,
            FieldType::Float => byte_order.read_f32(c) as f64,
            FieldType::Double => byte_order.read_f64(c),
            FieldType::Rational => {
                let num = byte_order.read_u32(&c[0..4]) as f64;
                let den = byte_order.read_u32(&c[4..8]) as f64;
                if den == 0.0 {
                    0.0
                } else {
                    num / den
                }
            }
            FieldType::SRational => {
                let num = byte_order.read_u32(&c[0..4]) as i32 as f64;
                let den = byte_order.read_u32(&c[4..8]) as i32 as f64;
                if den == 0.0 {
                    0.0
                } else {
                    num / den
                }
            }
        })
        .collect()
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::MemoryRangeReader;

    fn le_header() -> TiffHeader {
        TiffHeader {
            byte_order: ByteOrder::LittleEndian,
            first_ifd_offset: 8,
        }
    }

    fn entry(tag: u16, field_type: FieldType, count: u64, value: [u8; 4]) -> IfdEntry {
        IfdEntry {
            tag_id: tag,
            field_type: Some(field_type),
            field_type_raw: field_type.as_u16(),
            count,
            value_offset_bytes: value,
            is_inline: field_type.fits_inline(count),
        }
    }

    #[test]
    fn test_parse_u32_array_short() {
        let bytes = [0x64, 0x00, 0xC8, 0x00, 0x2C, 0x01, 0x90, 0x01];
        let result = parse_u32_array(&bytes, 4, FieldType::Short, ByteOrder::LittleEndian);
        assert_eq!(result, vec![100, 200, 300, 400]);
    }

    #[test]
    fn test_parse_u32_array_long_big_endian() {
        let bytes = [0x00, 0x00, 0x03, 0xE8, 0x00, 0x00, 0x07, 0xD0];
        let result = parse_u32_array(&bytes, 2, FieldType::Long, ByteOrder::BigEndian);
        assert_eq!(result, vec![1000, 2000]);
    }

    #[test]
    fn test_parse_f64_array_types() {
        let doubles: Vec<u8> = [0.5f64, -2.25]
            .iter()
            .flat_map(|v| v.to_le_bytes())
            .collect();
        assert_eq!(
            parse_f64_array(&doubles, 2, FieldType::Double, ByteOrder::LittleEndian),
            vec![0.5, -2.25]
        );

        let rational = [3u8, 0, 0, 0, 4, 0, 0, 0];
        assert_eq!(
            parse_f64_array(&rational, 1, FieldType::Rational, ByteOrder::LittleEndian),
            vec![0.75]
        );

        let sshort = [0xFF, 0xFE];
        assert_eq!(
            parse_f64_array(&sshort, 1, FieldType::SShort, ByteOrder::BigEndian),
            vec![-2.0]
        );
    }

    #[tokio::test]
    async fn test_read_inline_and_offset_values() {
        // Three doubles stored at offset 8
        let mut data = vec![0u8; 8];
        for v in [1.0f64, 2.0, 3.0] {
            data.extend_from_slice(&v.to_le_bytes());
        }
        let reader = MemoryRangeReader::new(data, "values");
        let header = le_header();
        let values = ValueReader::new(&reader, &header);

        let doubles = entry(33550, FieldType::Double, 3, [8, 0, 0, 0]);
        assert_eq!(values.read_f64_array(&doubles).await.unwrap(), vec![1.0, 2.0, 3.0]);

        let short = entry(256, FieldType::Short, 1, [0x10, 0x00, 0x00, 0x00]);
        assert_eq!(values.read_u32(&short).await.unwrap(), 16);

        let ascii = entry(42113, FieldType::Ascii, 4, [b'-', b'9', b'9', 0]);
        assert_eq!(values.read_string(&ascii).await.unwrap(), "-99");
    }

    #[tokio::test]
    async fn test_read_u32_rejects_arrays() {
        let reader = MemoryRangeReader::new(vec![0u8; 16], "values");
        let header = le_header();
        let values = ValueReader::new(&reader, &header);

        let pair = entry(258, FieldType::Short, 2, [8, 0, 8, 0]);
        assert!(matches!(
            values.read_u32(&pair).await,
            Err(TiffError::InvalidTagValue { tag: "BitsPerSample", .. })
        ));
        assert_eq!(values.read_u32_array(&pair).await.unwrap(), vec![8, 8]);
    }
}
