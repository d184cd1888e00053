//! # pkflate core
//!
//! Shared building blocks for the pkflate DEFLATE/ZIP engine:
//!
//! - [`checksum`]: CRC-32 and Adler-32 accumulators and fold functions
//! - [`config`]: compression level, flush mode and strategy
//! - [`error`]: error types for the codec helpers
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │ L3: Tools                                               │
//! │     pkflate CLI                                         │
//! ├─────────────────────────────────────────────────────────┤
//! │ L2: Container                                           │
//! │     ZIP reader/writer, ZIP64, backing stores            │
//! ├─────────────────────────────────────────────────────────┤
//! │ L1: Codec                                               │
//! │     Deflate compressor, resumable inflater, zlib        │
//! ├─────────────────────────────────────────────────────────┤
//! │ L0: Core (this crate)                                   │
//! │     CRC-32, Adler-32, configuration, errors             │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust
//! use pkflate_core::checksum::{crc32, CRC32_INIT, Crc32};
//!
//! let crc = Crc32::compute(b"Hello, World!");
//! assert_eq!(crc, 0xEC4AC3D0);
//!
//! let folded = crc32(crc32(CRC32_INIT, b"Hello, "), b"World!");
//! assert_eq!(folded, crc);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod checksum;
pub mod config;
pub mod error;

pub use checksum::{ADLER32_INIT, Adler32, CRC32_INIT, Crc32, adler32, crc32};
pub use config::{CompressionLevel, CompressionStrategy, FlushMode};
pub use error::{PkflateError, Result};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::checksum::{Adler32, Crc32};
    pub use crate::config::{CompressionLevel, CompressionStrategy, FlushMode};
    pub use crate::error::{PkflateError, Result};
}
