//! Error types for pkflate codec operations.
//!
//! The streaming compressor and decompressor report their progress through
//! status enums, so this type is only produced by the one-shot helpers
//! (buffer-to-buffer, buffer-to-heap, buffer-to-callback) and by header
//! parsing code that sits around the codecs.

use std::io;
use thiserror::Error;

/// The main error type for pkflate codec operations.
#[derive(Debug, Error)]
pub enum PkflateError {
    /// I/O error from an underlying reader/writer.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Malformed stream or container header.
    #[error("Invalid header: {message}")]
    InvalidHeader {
        /// Description of the header error.
        message: String,
    },

    /// The compressed stream is corrupted.
    #[error("Corrupted data at offset {offset}: {message}")]
    CorruptedData {
        /// Input byte offset where corruption was detected.
        offset: u64,
        /// Description of the corruption.
        message: String,
    },

    /// CRC-32 checksum mismatch.
    #[error("CRC mismatch: expected {expected:#010x}, computed {computed:#010x}")]
    CrcMismatch {
        /// Expected CRC value.
        expected: u32,
        /// CRC computed over the produced data.
        computed: u32,
    },

    /// Adler-32 trailer of a zlib stream did not match the output.
    #[error("Adler-32 mismatch: expected {expected:#010x}, computed {computed:#010x}")]
    AdlerMismatch {
        /// Adler-32 stored in the stream trailer.
        expected: u32,
        /// Adler-32 computed over the produced data.
        computed: u32,
    },

    /// Input ended before the stream was complete.
    #[error("Unexpected end of input: stream truncated after {consumed} bytes")]
    UnexpectedEof {
        /// Number of input bytes consumed before running dry.
        consumed: usize,
    },

    /// Output buffer is too small for the result.
    #[error("Buffer too small: need {needed} bytes, have {available}")]
    BufferTooSmall {
        /// Number of bytes needed (a lower bound when unknown).
        needed: usize,
        /// Number of bytes available.
        available: usize,
    },

    /// A parameter was rejected before any work was done.
    #[error("Invalid parameter: {message}")]
    InvalidParameter {
        /// Which parameter was wrong and why.
        message: String,
    },

    /// The compressor failed or its output sink rejected data.
    #[error("Compression failed: {message}")]
    CompressionFailed {
        /// Description of the failure.
        message: String,
    },
}

/// Result type alias for pkflate operations.
pub type Result<T> = std::result::Result<T, PkflateError>;

impl PkflateError {
    /// Create an invalid header error.
    pub fn invalid_header(message: impl Into<String>) -> Self {
        Self::InvalidHeader {
            message: message.into(),
        }
    }

    /// Create a corrupted data error.
    pub fn corrupted(offset: u64, message: impl Into<String>) -> Self {
        Self::CorruptedData {
            offset,
            message: message.into(),
        }
    }

    /// Create a CRC mismatch error.
    pub fn crc_mismatch(expected: u32, computed: u32) -> Self {
        Self::CrcMismatch { expected, computed }
    }

    /// Create an Adler-32 mismatch error.
    pub fn adler_mismatch(expected: u32, computed: u32) -> Self {
        Self::AdlerMismatch { expected, computed }
    }

    /// Create an unexpected EOF error.
    pub fn unexpected_eof(consumed: usize) -> Self {
        Self::UnexpectedEof { consumed }
    }

    /// Create a buffer too small error.
    pub fn buffer_too_small(needed: usize, available: usize) -> Self {
        Self::BufferTooSmall { needed, available }
    }

    /// Create an invalid parameter error.
    pub fn invalid_parameter(message: impl Into<String>) -> Self {
        Self::InvalidParameter {
            message: message.into(),
        }
    }

    /// Create a compression failure error.
    pub fn compression_failed(message: impl Into<String>) -> Self {
        Self::CompressionFailed {
            message: message.into(),
        }
    }

    /// Whether this error means the data itself is bad (as opposed to a
    /// caller or environment problem).
    pub fn is_data_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidHeader { .. }
                | Self::CorruptedData { .. }
                | Self::CrcMismatch { .. }
                | Self::AdlerMismatch { .. }
                | Self::UnexpectedEof { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PkflateError::invalid_header("bad zlib FCHECK");
        assert!(err.to_string().contains("Invalid header"));
        assert!(err.to_string().contains("FCHECK"));

        let err = PkflateError::crc_mismatch(0x12345678, 0xDEADBEEF);
        assert!(err.to_string().contains("CRC mismatch"));
        assert!(err.to_string().contains("0xdeadbeef"));

        let err = PkflateError::adler_mismatch(1, 2);
        assert!(err.to_string().contains("Adler-32"));
    }

    #[test]
    fn test_data_error_classification() {
        assert!(PkflateError::corrupted(7, "distance too far back").is_data_error());
        assert!(PkflateError::unexpected_eof(12).is_data_error());
        assert!(!PkflateError::buffer_too_small(10, 5).is_data_error());
        assert!(!PkflateError::invalid_parameter("level").is_data_error());
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let err: PkflateError = io_err.into();
        assert!(matches!(err, PkflateError::Io(_)));
    }
}
