//! Zlib format wrapper for DEFLATE compression.
//!
//! The zlib format (RFC 1950) wraps raw DEFLATE data with a two-byte header
//! and a big-endian Adler-32 of the uncompressed data.
//!
//! # Format
//!
//! ```text
//! +---+---+============+---+---+---+---+
//! |CMF|FLG| compressed |    ADLER32    |
//! +---+---+============+---+---+---+---+
//! ```
//!
//! - CMF: bits 0-3 compression method (8), bits 4-7 log2(window) - 8
//! - FLG: bits 0-4 check bits so that `(CMF * 256 + FLG) % 31 == 0`,
//!   bit 5 preset dictionary, bits 6-7 compression level hint

use crate::deflate::{compress_to_vec_with_flags, create_comp_flags};
use crate::inflate::{decompress_to_vec, inflate_flags};
use pkflate_core::config::{CompressionLevel, CompressionStrategy};
use pkflate_core::error::{PkflateError, Result};

/// Zlib compression level indicator in the FLG byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ZlibLevel {
    /// Fastest compression.
    Fastest = 0,
    /// Fast compression.
    Fast = 1,
    /// Default compression.
    Default = 2,
    /// Maximum compression.
    Maximum = 3,
}

impl ZlibLevel {
    /// Read the level hint from a FLG byte.
    pub fn from_flg(flg: u8) -> Self {
        match flg >> 6 {
            0 => Self::Fastest,
            1 => Self::Fast,
            2 => Self::Default,
            _ => Self::Maximum,
        }
    }
}

/// Check a zlib header and return its level hint.
///
/// Rejects a method other than deflate, a window above 32 KiB, a failed
/// mod-31 check and a preset dictionary.
pub fn parse_zlib_header(header: &[u8]) -> Result<ZlibLevel> {
    let [cmf, flg, ..] = *header else {
        return Err(PkflateError::unexpected_eof(header.len()));
    };

    if cmf & 0x0F != 8 {
        return Err(PkflateError::invalid_header("unsupported compression method"));
    }
    if cmf >> 4 > 7 {
        return Err(PkflateError::invalid_header("invalid window size"));
    }
    if (u16::from(cmf) * 256 + u16::from(flg)) % 31 != 0 {
        return Err(PkflateError::invalid_header("zlib header check failed"));
    }
    if flg & 0x20 != 0 {
        return Err(PkflateError::invalid_header("preset dictionary not supported"));
    }
    Ok(ZlibLevel::from_flg(flg))
}

/// Compress `input` into a zlib stream at `level` (0-10).
pub fn zlib_compress(input: &[u8], level: u8) -> Result<Vec<u8>> {
    zlib_compress_with_strategy(input, CompressionLevel::new(level), CompressionStrategy::Default)
}

/// Compress `input` into a zlib stream with an explicit strategy.
pub fn zlib_compress_with_strategy(
    input: &[u8],
    level: CompressionLevel,
    strategy: CompressionStrategy,
) -> Result<Vec<u8>> {
    compress_to_vec_with_flags(input, create_comp_flags(level, true, strategy))
}

/// Decompress a zlib stream, verifying the header and the Adler-32 trailer.
pub fn zlib_decompress(input: &[u8]) -> Result<Vec<u8>> {
    if input.len() < 6 {
        return Err(PkflateError::invalid_header("zlib data too short"));
    }
    parse_zlib_header(input)?;
    decompress_to_vec(input, inflate_flags::PARSE_ZLIB_HEADER)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zlib_roundtrip() {
        let original = b"Hello, World! This is a test of zlib compression.";
        let compressed = zlib_compress(original, 6).unwrap();

        assert_eq!(compressed[0], 0x78);
        assert_eq!(
            ((compressed[0] as u16) * 256 + compressed[1] as u16) % 31,
            0
        );

        let decompressed = zlib_decompress(&compressed).unwrap();
        assert_eq!(decompressed, original);
    }

    #[test]
    fn test_zlib_levels_in_header() {
        for (level, expected) in [
            (0, ZlibLevel::Fastest),
            (1, ZlibLevel::Fastest),
            (4, ZlibLevel::Fast),
            (6, ZlibLevel::Default),
            (9, ZlibLevel::Maximum),
        ] {
            let compressed = zlib_compress(b"level hint", level).unwrap();
            assert_eq!(parse_zlib_header(&compressed).unwrap(), expected, "level {level}");
        }
    }

    #[test]
    fn test_zlib_strategies_roundtrip() {
        let data: Vec<u8> = b"aaaaabbbbbcccccaaaaabbbbb".repeat(200);
        for strategy in [
            CompressionStrategy::Default,
            CompressionStrategy::Filtered,
            CompressionStrategy::HuffmanOnly,
            CompressionStrategy::Rle,
            CompressionStrategy::Fixed,
        ] {
            let compressed =
                zlib_compress_with_strategy(&data, CompressionLevel::DEFAULT, strategy).unwrap();
            assert_eq!(zlib_decompress(&compressed).unwrap(), data, "{strategy:?}");
        }
    }

    #[test]
    fn test_zlib_invalid_header() {
        assert!(zlib_decompress(&[0x00, 0x00, 0x00, 0x00, 0x00, 0x00]).is_err());
        // Valid check bits but FDICT set.
        assert!(matches!(
            parse_zlib_header(&[0x78, 0xBB]),
            Err(PkflateError::InvalidHeader { .. })
        ));
        assert!(matches!(
            parse_zlib_header(&[0x78]),
            Err(PkflateError::UnexpectedEof { .. })
        ));
    }

    #[test]
    fn test_zlib_checksum_mismatch() {
        let mut compressed = zlib_compress(b"checksum me", 6).unwrap();
        let last = compressed.len() - 1;
        compressed[last] ^= 0xFF;
        assert!(matches!(
            zlib_decompress(&compressed),
            Err(PkflateError::AdlerMismatch { .. })
        ));
    }
}
