use thiserror::Error;

/// I/O errors that can occur when reading from remote storage
#[derive(Debug, Clone, Error)]
pub enum IoError {
    /// Object not found. This is a legitimate absence, not a failure.
    #[error("Object not found: {0}")]
    NotFound(String),

    /// Error from S3 or S3-compatible storage
    #[error("S3 error: {0}")]
    S3(String),

    /// Network or connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Error reading from the local filesystem
    #[error("Local I/O error: {0}")]
    Local(String),

    /// The stream ended before the requested bytes were read
    #[error("Unexpected end of stream at offset {offset}")]
    UnexpectedEof { offset: u64 },

    /// Seek target precedes the buffered history of a forward-only stream
    #[error("Cannot seek to {target}: buffered history starts at {buffer_start}")]
    SeekBeforeBuffer { target: u64, buffer_start: u64 },
}

impl IoError {
    /// Whether this error means the object legitimately does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, IoError::NotFound(_))
    }
}

/// Errors that can occur when parsing TIFF headers
#[derive(Debug, Clone, Error)]
pub enum TiffError {
    /// I/O error while reading the header
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// Invalid TIFF magic bytes (not II or MM)
    #[error("Invalid TIFF magic bytes: expected 0x4949 (II) or 0x4D4D (MM), got 0x{0:04X}")]
    InvalidMagic(u16),

    /// Invalid TIFF version number
    #[error("Invalid TIFF version: expected 42, got {0}")]
    InvalidVersion(u16),

    /// BigTIFF headers are recognised but not supported
    #[error("BigTIFF files are not supported")]
    UnsupportedBigTiff,

    /// Unknown field type in IFD entry
    #[error("Unknown field type: {0}")]
    UnknownFieldType(u16),

    /// Required tag is missing from IFD
    #[error("Missing required tag: {0}")]
    MissingTag(&'static str),

    /// Tag has unexpected type or count
    #[error("Invalid tag value for {tag}: {message}")]
    InvalidTagValue { tag: &'static str, message: String },
}

/// Errors surfaced by the MOG client.
///
/// Every variant is `Clone` so that a single shared metadata fetch can hand
/// the same outcome to all of its waiters.
#[derive(Debug, Clone, Error)]
pub enum MogError {
    /// Transport failure other than not-found
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// Malformed or unsupported header
    #[error("TIFF error: {0}")]
    Tiff(#[from] TiffError),

    /// No configured source covers the requested zoom
    #[error("No MOG source configured for zoom {zoom}")]
    NoSource { zoom: u8 },

    /// Zoom outside the range a source declares
    #[error("Zoom {zoom} outside source range {min}..={max}")]
    ZoomOutOfRange { zoom: u8, min: u8, max: u8 },

    /// Parsed header contradicts itself (e.g. tile index beyond offsets array)
    #[error("Data consistency violation: {0}")]
    DataConsistency(String),

    /// A framed tile could not be decoded
    #[error("Tile decode error: {0}")]
    Decode(String),

    /// A background fetch task panicked or was aborted
    #[error("Background task failed: {0}")]
    Task(String),
}
