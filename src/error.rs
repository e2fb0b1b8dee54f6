//! Error types for rw-zip

use std::io;

/// Result type for rw-zip operations
pub type Result<T> = std::result::Result<T, ZipError>;

/// Error types that can occur while reading or writing ZIP archives
#[derive(Debug)]
pub enum ZipError {
    /// I/O error from the underlying source or sink
    Io(io::Error),
    /// A read past the end of the source
    UnexpectedEof,
    /// Invalid ZIP format or structure
    InvalidFormat(String),
    /// Unsupported compression method
    UnsupportedCompression(u16),
    /// The archive uses a feature this library does not implement
    UnsupportedFeature(String),
    /// A name or comment could not be decoded or encoded
    Encoding(String),
    /// An option or argument was used in a way that has no meaning
    InvalidArgument(String),
    /// An entry path failed validation
    InvalidName(String),
    /// A file mode outside `[0, 0xFFFF]`
    InvalidMode(u32),
    /// A file name or comment longer than 65535 bytes
    TooLong { field: &'static str, length: usize },
    /// A buffer larger than the 0x3FFFFFFF limit for `add_buffer`
    BufferTooLarge(usize),
    /// The archive comment contains the end of central directory signature
    CommentContainsSignature,
    /// A size disagreed with a pre-declared or recorded value
    SizeMismatch {
        field: &'static str,
        expected: u64,
        actual: u64,
    },
    /// A CRC-32 disagreed with a pre-declared or recorded value
    CrcMismatch { expected: u32, actual: u32 },
    /// The writer is in a failed state from an earlier streaming error
    Poisoned,
}

impl std::fmt::Display for ZipError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ZipError::Io(e) => write!(f, "I/O error: {}", e),
            ZipError::UnexpectedEof => write!(f, "unexpected end of file"),
            ZipError::InvalidFormat(msg) => write!(f, "invalid ZIP format: {}", msg),
            ZipError::UnsupportedCompression(method) => {
                write!(f, "unsupported compression method: {}", method)
            }
            ZipError::UnsupportedFeature(msg) => write!(f, "unsupported feature: {}", msg),
            ZipError::Encoding(msg) => write!(f, "encoding error: {}", msg),
            ZipError::InvalidArgument(msg) => write!(f, "invalid argument: {}", msg),
            ZipError::InvalidName(msg) => write!(f, "invalid entry name: {}", msg),
            ZipError::InvalidMode(mode) => {
                write!(f, "invalid mode 0o{:o} (must be in [0, 0xFFFF])", mode)
            }
            ZipError::TooLong { field, length } => {
                write!(f, "{} is {} bytes (maximum is 65535)", field, length)
            }
            ZipError::BufferTooLarge(len) => {
                write!(f, "buffer is {} bytes (maximum is 0x3FFFFFFF)", len)
            }
            ZipError::CommentContainsSignature => write!(
                f,
                "archive comment contains the end of central directory record signature"
            ),
            ZipError::SizeMismatch {
                field,
                expected,
                actual,
            } => write!(
                f,
                "{} mismatch: expected {}, got {}",
                field, expected, actual
            ),
            ZipError::CrcMismatch { expected, actual } => write!(
                f,
                "CRC-32 mismatch: expected 0x{:08x}, got 0x{:08x}",
                expected, actual
            ),
            ZipError::Poisoned => {
                write!(f, "writer is in a failed state from an earlier error")
            }
        }
    }
}

impl std::error::Error for ZipError {}

impl From<io::Error> for ZipError {
    fn from(err: io::Error) -> Self {
        ZipError::Io(err)
    }
}

impl From<ZipError> for io::Error {
    fn from(err: ZipError) -> Self {
        match err {
            ZipError::Io(e) => e,
            ZipError::UnexpectedEof => io::Error::new(io::ErrorKind::UnexpectedEof, err),
            other => io::Error::new(io::ErrorKind::InvalidData, other),
        }
    }
}
