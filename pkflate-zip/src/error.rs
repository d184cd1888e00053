//! Error codes and error type for ZIP archive operations.
//!
//! Every failure carries a [`ZipErrorKind`] with a stable numeric code. The
//! code maps to a fixed message through [`error_string`], which is what
//! front ends print.

use pkflate_core::error::PkflateError;
use std::fmt;
use std::io;
use thiserror::Error;

/// Kind of a ZIP failure. The discriminant is the stable error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u32)]
pub enum ZipErrorKind {
    /// No error.
    #[default]
    NoError = 0,
    /// Unclassified error.
    Undefined,
    /// Entry count exceeds the format limit.
    TooManyFiles,
    /// A file is too large for the archive format in use.
    FileTooLarge,
    /// Compression method other than stored or deflate.
    UnsupportedMethod,
    /// The entry is encrypted.
    UnsupportedEncryption,
    /// The entry uses a feature this engine does not handle.
    UnsupportedFeature,
    /// No end-of-central-directory record was found.
    FailedFindingCentralDir,
    /// The data is not a ZIP archive.
    NotAnArchive,
    /// A header field is inconsistent or out of bounds.
    InvalidHeaderOrCorrupted,
    /// The archive spans several disks.
    UnsupportedMultidisk,
    /// The deflate stream of an entry is bad.
    DecompressionFailed,
    /// The compressor failed.
    CompressionFailed,
    /// An entry decompressed to a different size than recorded.
    UnexpectedDecompressedSize,
    /// CRC-32 of the extracted data does not match.
    CrcCheckFailed,
    /// The central directory is too large.
    UnsupportedCdirSize,
    /// Memory allocation failed.
    AllocFailed,
    /// Opening a file failed.
    FileOpenFailed,
    /// Creating a file failed.
    FileCreateFailed,
    /// Writing to the backing store failed.
    FileWriteFailed,
    /// Reading from the backing store failed.
    FileReadFailed,
    /// Closing or flushing a file failed.
    FileCloseFailed,
    /// Seeking in a file failed.
    FileSeekFailed,
    /// Querying file metadata failed.
    FileStatFailed,
    /// A parameter was rejected before any I/O.
    InvalidParameter,
    /// The entry name is not acceptable.
    InvalidFilename,
    /// The caller's buffer is too small.
    BufTooSmall,
    /// Internal invariant violated.
    InternalError,
    /// No entry with the requested name.
    FileNotFound,
    /// The archive outgrew the 32-bit format.
    ArchiveTooLarge,
    /// Local and central headers disagree.
    ValidationFailed,
    /// The output callback refused data.
    WriteCallbackFailed,
}

impl ZipErrorKind {
    const ALL: [ZipErrorKind; 32] = [
        Self::NoError,
        Self::Undefined,
        Self::TooManyFiles,
        Self::FileTooLarge,
        Self::UnsupportedMethod,
        Self::UnsupportedEncryption,
        Self::UnsupportedFeature,
        Self::FailedFindingCentralDir,
        Self::NotAnArchive,
        Self::InvalidHeaderOrCorrupted,
        Self::UnsupportedMultidisk,
        Self::DecompressionFailed,
        Self::CompressionFailed,
        Self::UnexpectedDecompressedSize,
        Self::CrcCheckFailed,
        Self::UnsupportedCdirSize,
        Self::AllocFailed,
        Self::FileOpenFailed,
        Self::FileCreateFailed,
        Self::FileWriteFailed,
        Self::FileReadFailed,
        Self::FileCloseFailed,
        Self::FileSeekFailed,
        Self::FileStatFailed,
        Self::InvalidParameter,
        Self::InvalidFilename,
        Self::BufTooSmall,
        Self::InternalError,
        Self::FileNotFound,
        Self::ArchiveTooLarge,
        Self::ValidationFailed,
        Self::WriteCallbackFailed,
    ];

    /// Numeric code of this kind.
    pub fn code(self) -> u32 {
        self as u32
    }

    /// Look up a kind by its numeric code.
    pub fn from_code(code: u32) -> Option<Self> {
        Self::ALL.get(code as usize).copied()
    }

    /// Fixed human-readable message for this kind.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NoError => "no error",
            Self::Undefined => "undefined error",
            Self::TooManyFiles => "too many files",
            Self::FileTooLarge => "file too large",
            Self::UnsupportedMethod => "unsupported method",
            Self::UnsupportedEncryption => "unsupported encryption",
            Self::UnsupportedFeature => "unsupported feature",
            Self::FailedFindingCentralDir => "failed finding central directory",
            Self::NotAnArchive => "not a ZIP archive",
            Self::InvalidHeaderOrCorrupted => "invalid header or archive is corrupted",
            Self::UnsupportedMultidisk => "unsupported multidisk archive",
            Self::DecompressionFailed => "decompression failed or archive is corrupted",
            Self::CompressionFailed => "compression failed",
            Self::UnexpectedDecompressedSize => "unexpected decompressed size",
            Self::CrcCheckFailed => "CRC-32 check failed",
            Self::UnsupportedCdirSize => "unsupported central directory size",
            Self::AllocFailed => "allocation failed",
            Self::FileOpenFailed => "file open failed",
            Self::FileCreateFailed => "file create failed",
            Self::FileWriteFailed => "file write failed",
            Self::FileReadFailed => "file read failed",
            Self::FileCloseFailed => "file close failed",
            Self::FileSeekFailed => "file seek failed",
            Self::FileStatFailed => "file stat failed",
            Self::InvalidParameter => "invalid parameter",
            Self::InvalidFilename => "invalid filename",
            Self::BufTooSmall => "buffer too small",
            Self::InternalError => "internal error",
            Self::FileNotFound => "file not found",
            Self::ArchiveTooLarge => "archive is too large",
            Self::ValidationFailed => "validation failed",
            Self::WriteCallbackFailed => "write callback failed",
        }
    }

    /// Whether the archive data itself is at fault.
    pub fn is_format_error(self) -> bool {
        matches!(
            self,
            Self::FailedFindingCentralDir
                | Self::NotAnArchive
                | Self::InvalidHeaderOrCorrupted
                | Self::DecompressionFailed
                | Self::UnexpectedDecompressedSize
                | Self::CrcCheckFailed
                | Self::ValidationFailed
        )
    }
}

impl fmt::Display for ZipErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Message for a numeric error code. Unknown codes give "unknown error".
pub fn error_string(code: u32) -> &'static str {
    ZipErrorKind::from_code(code).map_or("unknown error", ZipErrorKind::as_str)
}

/// Error returned by archive operations.
#[derive(Debug, Error)]
pub enum ZipError {
    /// Failure described by its kind alone.
    #[error("{0}")]
    Kind(ZipErrorKind),

    /// Failure with extra context.
    #[error("{kind}: {message}")]
    Archive {
        /// Error kind.
        kind: ZipErrorKind,
        /// What was being done.
        message: String,
    },

    /// Failure caused by the backing store or a local file.
    #[error("{kind}: {source}")]
    Io {
        /// Error kind.
        kind: ZipErrorKind,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// Failure reported by the codec layer.
    #[error("{kind}: {source}")]
    Codec {
        /// Error kind.
        kind: ZipErrorKind,
        /// Underlying codec error.
        #[source]
        source: PkflateError,
    },
}

/// Result type alias for ZIP operations.
pub type Result<T> = std::result::Result<T, ZipError>;

impl ZipError {
    /// Create an error with context.
    pub fn new(kind: ZipErrorKind, message: impl Into<String>) -> Self {
        Self::Archive {
            kind,
            message: message.into(),
        }
    }

    /// Wrap an I/O error.
    pub fn io(kind: ZipErrorKind, source: io::Error) -> Self {
        Self::Io { kind, source }
    }

    /// Wrap a codec error.
    pub fn codec(kind: ZipErrorKind, source: PkflateError) -> Self {
        Self::Codec { kind, source }
    }

    /// Create a corrupted-archive error.
    pub fn corrupted(message: impl Into<String>) -> Self {
        Self::new(ZipErrorKind::InvalidHeaderOrCorrupted, message)
    }

    /// Create an invalid-parameter error.
    pub fn invalid_parameter(message: impl Into<String>) -> Self {
        Self::new(ZipErrorKind::InvalidParameter, message)
    }

    /// The error kind.
    pub fn kind(&self) -> ZipErrorKind {
        match self {
            Self::Kind(kind) => *kind,
            Self::Archive { kind, .. } | Self::Io { kind, .. } | Self::Codec { kind, .. } => *kind,
        }
    }

    /// Numeric error code.
    pub fn code(&self) -> u32 {
        self.kind().code()
    }
}

impl From<ZipErrorKind> for ZipError {
    fn from(kind: ZipErrorKind) -> Self {
        Self::Kind(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_dense_and_stable() {
        for (code, kind) in ZipErrorKind::ALL.iter().enumerate() {
            assert_eq!(kind.code(), code as u32);
            assert_eq!(ZipErrorKind::from_code(code as u32), Some(*kind));
        }
        assert_eq!(ZipErrorKind::WriteCallbackFailed.code(), 31);
    }

    #[test]
    fn test_error_string() {
        assert_eq!(error_string(0), "no error");
        assert_eq!(error_string(8), "not a ZIP archive");
        assert_eq!(error_string(14), "CRC-32 check failed");
        assert_eq!(error_string(28), "file not found");
        assert_eq!(error_string(32), "unknown error");
        assert_eq!(error_string(u32::MAX), "unknown error");
    }

    #[test]
    fn test_error_display() {
        let err = ZipError::corrupted("central directory truncated");
        assert_eq!(err.kind(), ZipErrorKind::InvalidHeaderOrCorrupted);
        assert_eq!(
            err.to_string(),
            "invalid header or archive is corrupted: central directory truncated"
        );

        let err: ZipError = ZipErrorKind::FileNotFound.into();
        assert_eq!(err.to_string(), "file not found");
        assert_eq!(err.code(), 28);
    }

    #[test]
    fn test_format_errors() {
        assert!(ZipErrorKind::CrcCheckFailed.is_format_error());
        assert!(!ZipErrorKind::FileOpenFailed.is_format_error());
    }
}
