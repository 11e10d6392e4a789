use async_trait::async_trait;
use bytes::Bytes;

use super::range_reader::check_range;
use super::RangeReader;
use crate::error::IoError;

/// In-memory implementation of RangeReader over a shared byte buffer.
#[derive(Clone)]
pub struct MemoryRangeReader {
    data: Bytes,
    identifier: String,
}

impl MemoryRangeReader {
    pub fn new(data: impl Into<Bytes>, identifier: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            identifier: identifier.into(),
        }
    }

    /// The whole buffer.
    pub fn bytes(&self) -> &Bytes {
        &self.data
    }
}

#[async_trait]
impl RangeReader for MemoryRangeReader {
    async fn read_exact_at(&self, offset: u64, len: usize) -> Result<Bytes, IoError> {
        check_range(offset, len, self.data.len() as u64)?;
        let start = offset as usize;
        Ok(self.data.slice(start..start + len))
    }

    fn size(&self) -> u64 {
        self.data.len() as u64
    }

    fn identifier(&self) -> &str {
        &self.identifier
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_reader_slices() {
        let reader = MemoryRangeReader::new(vec![1u8, 2, 3, 4], "mem");
        assert_eq!(&reader.read_exact_at(1, 2).await.unwrap()[..], &[2, 3]);
        assert_eq!(reader.read_exact_at(0, 0).await.unwrap().len(), 0);
        assert!(matches!(
            reader.read_exact_at(3, 2).await,
            Err(IoError::RangeOutOfBounds { offset: 3, .. })
        ));
    }
}
