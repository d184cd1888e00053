//! # pkflate deflate
//!
//! Streaming implementation of DEFLATE (RFC 1951) with optional zlib
//! framing (RFC 1950).
//!
//! ## Features
//!
//! - **Compression**: [`Deflater`]
//!   - Levels 0-10 with greedy or lazy parsing
//!   - Stored, fixed and dynamic Huffman blocks, picked per block
//!   - Sync, full and finish flushes
//!   - Output to a caller buffer or a sink closure
//! - **Decompression**: [`Inflater`]
//!   - Resumable at any byte of input or output
//!   - Wrapping 32 KiB history or a flat output buffer
//!   - zlib header and Adler-32 verification
//!
//! ## Example
//!
//! ```rust
//! use pkflate_deflate::{deflate, inflate, zlib_compress, zlib_decompress};
//!
//! let original = b"Hello, World! Hello, World!";
//! let compressed = deflate(original, 6).unwrap();
//! assert_eq!(inflate(&compressed).unwrap(), original);
//!
//! let wrapped = zlib_compress(original, 9).unwrap();
//! assert_eq!(zlib_decompress(&wrapped).unwrap(), original);
//! ```
//!
//! ## Compression Levels
//!
//! - Level 0: stored blocks only
//! - Level 1: single-probe trigram matcher
//! - Levels 2-3: greedy hash-chain parsing
//! - Levels 4-9: lazy parsing with growing probe budgets (default 6)
//! - Level 10: level 9 with the largest probe budget

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod deflate;
pub mod huffman;
pub mod inflate;
pub mod lz77;
pub mod tables;
pub mod zlib;

// Re-exports
pub use deflate::{
    CompressStatus, Deflater, compress_to_callback, compress_to_slice, compress_to_vec,
    compress_to_vec_with_flags, compress_to_vec_zlib, create_comp_flags, deflate, deflate_flags,
};
pub use huffman::{DecodeTable, HuffmanTable};
pub use inflate::{
    InflateStatus, Inflater, decompress_to_callback, decompress_to_slice, decompress_to_vec,
    decompress_to_vec_with_limit, inflate, inflate_flags,
};
pub use zlib::{ZlibLevel, zlib_compress, zlib_decompress};
