//! Codec configuration types shared by the compressor and the archive writer.

/// Flush mode for compression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlushMode {
    /// No flush - buffer data for best compression.
    #[default]
    None,
    /// Sync flush - emit the current block plus an empty stored block so the
    /// output so far is byte-aligned and decodable.
    Sync,
    /// Full flush - like `Sync`, and also forget the match history.
    Full,
    /// Finish - complete the stream.
    Finish,
}

/// Compression level (0 = store, 1 = fastest, 9 = best, 10 = uber).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CompressionLevel(u8);

impl CompressionLevel {
    /// No compression (stored blocks only).
    pub const NONE: Self = Self(0);
    /// Fastest compression.
    pub const FAST: Self = Self(1);
    /// Default compression (balanced).
    pub const DEFAULT: Self = Self(6);
    /// Best compression at normal cost.
    pub const BEST: Self = Self(9);
    /// Exhaustive match search; very slow.
    pub const UBER: Self = Self(10);

    /// Create a compression level, clamped to 0..=10.
    pub fn new(level: u8) -> Self {
        Self(level.min(10))
    }

    /// Get the level value.
    pub fn level(&self) -> u8 {
        self.0
    }
}

impl Default for CompressionLevel {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl From<u8> for CompressionLevel {
    fn from(level: u8) -> Self {
        Self::new(level)
    }
}

/// Match-finding strategy, mirroring zlib's strategy parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompressionStrategy {
    /// Normal LZ77 + Huffman.
    #[default]
    Default,
    /// Drop short matches (length <= 5); suited to filtered image data.
    Filtered,
    /// No matches at all, literals only.
    HuffmanOnly,
    /// Only distance-1 matches (run-length encoding).
    Rle,
    /// Always emit static Huffman blocks.
    Fixed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compression_level() {
        assert_eq!(CompressionLevel::NONE.level(), 0);
        assert_eq!(CompressionLevel::FAST.level(), 1);
        assert_eq!(CompressionLevel::DEFAULT.level(), 6);
        assert_eq!(CompressionLevel::BEST.level(), 9);
        assert_eq!(CompressionLevel::UBER.level(), 10);

        assert_eq!(CompressionLevel::new(100).level(), 10);
        assert_eq!(CompressionLevel::from(3).level(), 3);
    }

    #[test]
    fn test_defaults() {
        assert_eq!(FlushMode::default(), FlushMode::None);
        assert_eq!(CompressionLevel::default(), CompressionLevel::DEFAULT);
        assert_eq!(CompressionStrategy::default(), CompressionStrategy::Default);
    }
}
