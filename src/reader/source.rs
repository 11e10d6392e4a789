//! Raster sources: what a reader is asked to read.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use url::Url;

use crate::error::{IoError, ReadError};
use crate::io::{FileRangeReader, MemoryRangeReader, RangeReader};

use super::metadata::PartialMetadata;

static NEXT_BUFFER_ID: AtomicU64 = AtomicU64::new(1);

/// Cache identity of a source.
///
/// Path sources with equal paths share a key; every buffer source gets its
/// own key when created, whatever its bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SourceKey {
    Path(PathBuf),
    Buffer(u64),
}

impl fmt::Display for SourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKey::Path(path) => write!(f, "{}", path.display()),
            SourceKey::Buffer(id) => write!(f, "buffer#{}", id),
        }
    }
}

#[derive(Debug, Clone)]
enum Location {
    Path(PathBuf),
    Buffer { name: String, bytes: Bytes },
}

/// A file path or named byte buffer, plus caller-supplied metadata hints.
#[derive(Debug, Clone)]
pub struct RasterSource {
    location: Location,
    key: SourceKey,
    hints: PartialMetadata,
}

impl RasterSource {
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            key: SourceKey::Path(path.clone()),
            location: Location::Path(path),
            hints: PartialMetadata::default(),
        }
    }

    /// A `file://` URL or a plain path.
    pub fn from_url(url: &str) -> Result<Self, ReadError> {
        match Url::parse(url) {
            Ok(parsed) if parsed.scheme() == "file" => parsed
                .to_file_path()
                .map(Self::from_path)
                .map_err(|_| ReadError::CannotRead(format!("invalid file URL: {}", url))),
            // Single letters are Windows drive prefixes, not schemes
            Ok(parsed) if parsed.scheme().len() > 1 => Err(ReadError::CannotRead(format!(
                "unsupported URL scheme '{}': {}",
                parsed.scheme(),
                url
            ))),
            _ => Ok(Self::from_path(url)),
        }
    }

    /// An in-memory source. `name` supplies the file name readers probe by.
    pub fn from_bytes(name: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            key: SourceKey::Buffer(NEXT_BUFFER_ID.fetch_add(1, Ordering::Relaxed)),
            location: Location::Buffer {
                name: name.into(),
                bytes: bytes.into(),
            },
            hints: PartialMetadata::default(),
        }
    }

    pub fn with_hints(mut self, hints: PartialMetadata) -> Self {
        self.hints = hints;
        self
    }

    pub fn hints(&self) -> &PartialMetadata {
        &self.hints
    }

    pub fn key(&self) -> &SourceKey {
        &self.key
    }

    /// Filesystem path, for path sources.
    pub fn path(&self) -> Option<&Path> {
        match &self.location {
            Location::Path(path) => Some(path),
            Location::Buffer { .. } => None,
        }
    }

    /// Name used in logs and errors.
    pub fn name(&self) -> String {
        match &self.location {
            Location::Path(path) => path.display().to_string(),
            Location::Buffer { name, .. } => name.clone(),
        }
    }

    /// Final path component (or the buffer name).
    pub fn file_name(&self) -> Option<String> {
        match &self.location {
            Location::Path(path) => path.file_name().map(|n| n.to_string_lossy().into_owned()),
            Location::Buffer { name, .. } => Path::new(name)
                .file_name()
                .map(|n| n.to_string_lossy().into_owned()),
        }
    }

    /// Lowercase file extension.
    pub fn suffix(&self) -> Option<String> {
        let name = self.file_name()?;
        Path::new(&name)
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
    }

    /// Open the source for range reads.
    pub async fn range_reader(&self) -> Result<SourceReader, IoError> {
        match &self.location {
            Location::Path(path) => Ok(SourceReader::File(FileRangeReader::open(path).await?)),
            Location::Buffer { name, bytes } => Ok(SourceReader::Memory(MemoryRangeReader::new(
                bytes.clone(),
                name.clone(),
            ))),
        }
    }

    /// The whole source.
    pub async fn read_all(&self) -> Result<Bytes, IoError> {
        match &self.location {
            Location::Path(path) => tokio::fs::read(path)
                .await
                .map(Bytes::from)
                .map_err(|e| match e.kind() {
                    std::io::ErrorKind::NotFound => IoError::NotFound(path.display().to_string()),
                    _ => IoError::from(e),
                }),
            Location::Buffer { bytes, .. } => Ok(bytes.clone()),
        }
    }

    /// Up to `len` leading bytes, for magic-number probes.
    pub async fn read_head(&self, len: usize) -> Result<Bytes, IoError> {
        self.range_reader().await?.read_at_most(0, len).await
    }
}

/// Range reader over either kind of source.
pub enum SourceReader {
    File(FileRangeReader),
    Memory(MemoryRangeReader),
}

#[async_trait]
impl RangeReader for SourceReader {
    async fn read_exact_at(&self, offset: u64, len: usize) -> Result<Bytes, IoError> {
        match self {
            SourceReader::File(r) => r.read_exact_at(offset, len).await,
            SourceReader::Memory(r) => r.read_exact_at(offset, len).await,
        }
    }

    fn size(&self) -> u64 {
        match self {
            SourceReader::File(r) => r.size(),
            SourceReader::Memory(r) => r.size(),
        }
    }

    fn identifier(&self) -> &str {
        match self {
            SourceReader::File(r) => r.identifier(),
            SourceReader::Memory(r) => r.identifier(),
        }
    }
}
