use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::Mutex;

use super::range_reader::check_range;
use super::RangeReader;
use crate::error::IoError;

/// Local file implementation of RangeReader.
///
/// The file size is fetched once on open. Reads seek the shared handle,
/// so concurrent reads on one reader are serialized.
pub struct FileRangeReader {
    file: Mutex<File>,
    path: PathBuf,
    size: u64,
    identifier: String,
}

impl FileRangeReader {
    /// Open a file for range reads.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, IoError> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => IoError::NotFound(path.display().to_string()),
            _ => IoError::from(e),
        })?;
        let size = file.metadata().await?.len();
        let identifier = path.display().to_string();

        Ok(Self {
            file: Mutex::new(file),
            path,
            size,
            identifier,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl RangeReader for FileRangeReader {
    async fn read_exact_at(&self, offset: u64, len: usize) -> Result<Bytes, IoError> {
        check_range(offset, len, self.size)?;
        if len == 0 {
            return Ok(Bytes::new());
        }

        let mut buf = vec![0u8; len];
        let mut file = self.file.lock().await;
        file.seek(SeekFrom::Start(offset)).await?;
        file.read_exact(&mut buf).await?;
        Ok(Bytes::from(buf))
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn identifier(&self) -> &str {
        &self.identifier
    }
}
