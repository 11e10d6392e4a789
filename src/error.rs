use thiserror::Error;

/// I/O errors that can occur when reading raster sources
#[derive(Debug, Clone, Error)]
pub enum IoError {
    /// Requested range exceeds resource bounds
    #[error("Range out of bounds: requested {requested} bytes at offset {offset}, size is {size}")]
    RangeOutOfBounds {
        offset: u64,
        requested: u64,
        size: u64,
    },

    /// File or resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Any other operating system error
    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for IoError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => IoError::NotFound(err.to_string()),
            _ => IoError::Io(err.to_string()),
        }
    }
}

/// Errors that can occur when parsing or decoding TIFF files
#[derive(Debug, Clone, Error)]
pub enum TiffError {
    /// I/O error while reading the file
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// Invalid TIFF magic bytes (not II or MM)
    #[error("Invalid TIFF magic bytes: expected 0x4949 (II) or 0x4D4D (MM), got 0x{0:04X}")]
    InvalidMagic(u16),

    /// Invalid TIFF version number
    #[error("Invalid TIFF version: expected 42, got {0}")]
    InvalidVersion(u16),

    /// BigTIFF (version 43) is recognized but not decoded
    #[error("BigTIFF files are not supported")]
    BigTiff,

    /// File is too small to contain a valid TIFF header
    #[error("File too small: need at least {required} bytes, got {actual}")]
    FileTooSmall { required: u64, actual: u64 },

    /// Invalid IFD offset (points outside file or to invalid location)
    #[error("Invalid IFD offset: {0}")]
    InvalidIfdOffset(u64),

    /// IFD chain revisits an offset or never terminates
    #[error("IFD chain loops back to offset {0}")]
    IfdLoop(u64),

    /// Image index past the end of the IFD chain
    #[error("Image index {index} out of range ({count} images)")]
    ImageIndexOutOfRange { index: usize, count: usize },

    /// Required tag is missing from IFD
    #[error("Missing required tag: {0}")]
    MissingTag(&'static str),

    /// Tag has unexpected type or count
    #[error("Invalid tag value for {tag}: {message}")]
    InvalidTagValue { tag: &'static str, message: String },

    /// Unknown field type in IFD entry
    #[error("Unknown field type: {0}")]
    UnknownFieldType(u16),

    /// Malformed LZW stream
    #[error("LZW error: {0}")]
    Lzw(String),

    /// Unsupported compression scheme
    #[error("Unsupported compression: {0} (only uncompressed and LZW are supported)")]
    UnsupportedCompression(String),

    /// File uses tiles instead of strips
    #[error("Unsupported organization: file uses tiles instead of strips")]
    TiledOrganization,

    /// Bits per sample, sample format or band count not handled
    #[error("Unsupported sample layout: {0}")]
    UnsupportedSampleLayout(String),

    /// Decoded samples would not fit in memory
    #[error("Image too large: {width}x{height} exceeds {limit} decoded bytes")]
    ImageTooLarge { width: u32, height: u32, limit: usize },

    /// Predictor other than none or horizontal differencing
    #[error("Unsupported predictor: {0}")]
    UnsupportedPredictor(u16),

    /// Geo keys describe a projected coordinate system
    #[error("Projected coordinate systems are not supported: {0}")]
    ProjectionUnsupported(String),
}

impl TiffError {
    /// Whether the file is well formed but uses a feature that is not decoded.
    pub fn is_unsupported(&self) -> bool {
        matches!(
            self,
            TiffError::BigTiff
                | TiffError::UnsupportedCompression(_)
                | TiffError::TiledOrganization
                | TiffError::UnsupportedSampleLayout(_)
                | TiffError::UnsupportedPredictor(_)
                | TiffError::ProjectionUnsupported(_)
        )
    }
}

/// Errors raised while parsing RPF frame files
#[derive(Debug, Clone, Error)]
pub enum RpfError {
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    #[error("Invalid RPF header: {0}")]
    InvalidHeader(String),

    #[error("Missing RPF section: {0}")]
    MissingSection(&'static str),

    #[error("Invalid RPF section {section}: {message}")]
    InvalidSection {
        section: &'static str,
        message: String,
    },
}

/// Errors raised by a probe. Readers collapse these to "cannot read".
#[derive(Debug, Clone, Error)]
pub enum ProbeError {
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    #[error("Malformed source: {0}")]
    Malformed(String),
}

/// Errors raised by raster readers
#[derive(Debug, Clone, Error)]
pub enum ReadError {
    /// No reader accepts the source, or the chosen reader rejected it
    #[error("Cannot read source: {0}")]
    CannotRead(String),

    /// I/O error while reading the source
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// TIFF container error
    #[error("TIFF error: {0}")]
    Tiff(#[from] TiffError),

    /// RPF container error
    #[error("RPF error: {0}")]
    Rpf(#[from] RpfError),

    /// Generic image decoding failed
    #[error("Image decode error: {0}")]
    Image(String),

    /// Well formed source using a feature that is not supported
    #[error("Unsupported format: {reason}")]
    UnsupportedFormat { reason: String },

    /// Source geo-referencing uses a projected coordinate system
    #[error("Projected coordinate systems are not supported: {0}")]
    ProjectionUnsupported(String),

    /// Width, height, sector or another required field could not be determined
    #[error("Missing metadata for {source_name}: {missing}")]
    MissingMetadata { source_name: String, missing: String },

    /// Metadata is present but inconsistent with the data
    #[error("Invalid metadata for {source_name}: {message}")]
    InvalidMetadata {
        source_name: String,
        message: String,
    },

    /// The raster cache already knows this source cannot be read
    #[error("Source previously failed to read: {0}")]
    KnownUnreadable(String),
}

impl ReadError {
    /// Whether the error describes a well formed source using an unsupported feature.
    pub fn is_unsupported(&self) -> bool {
        match self {
            ReadError::UnsupportedFormat { .. } | ReadError::ProjectionUnsupported(_) => true,
            ReadError::Tiff(e) => e.is_unsupported(),
            _ => false,
        }
    }
}

impl From<image::ImageError> for ReadError {
    fn from(err: image::ImageError) -> Self {
        match err {
            image::ImageError::Unsupported(e) => ReadError::UnsupportedFormat {
                reason: e.to_string(),
            },
            other => ReadError::Image(other.to_string()),
        }
    }
}

/// Errors raised by the tile producer
#[derive(Debug, Clone, Error)]
pub enum ProduceError {
    /// Production parameters are invalid
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// A source failed validation
    #[error("Invalid source {source_name}: {reason}")]
    InvalidSource { source_name: String, reason: String },

    /// No sources were offered
    #[error("No sources to produce")]
    NoSources,

    /// The producer has already run
    #[error("Producer already started")]
    AlreadyStarted,

    /// Output could not be created or removed
    #[error("I/O error: {0}")]
    Io(String),

    /// A tile writer failed
    #[error("Failed to write {path}: {message}")]
    WriteFailure { path: String, message: String },

    /// Production was cancelled
    #[error("Production cancelled")]
    Cancelled,
}

impl From<std::io::Error> for ProduceError {
    fn from(err: std::io::Error) -> Self {
        ProduceError::Io(err.to_string())
    }
}
