//! # pkflate zip
//!
//! ZIP archive reading and writing on top of [`pkflate_deflate`].
//!
//! ## Features
//!
//! - **Reading**: [`ZipReader`]
//!   - Central directory located from the end record, with leading data
//!     (self-extractor stubs) tolerated
//!   - ZIP64 end records and extra fields
//!   - Case-insensitive name lookup through a sorted index
//!   - Extraction to a slice, vector, callback, writer or file
//!   - Per-entry and whole-archive validation
//! - **Writing**: [`ZipWriter`]
//!   - Stored and deflated entries from memory, callbacks or files
//!   - Raw entry copies between archives
//!   - Automatic switch to ZIP64 when counts or offsets overflow
//!   - In-place append to an existing archive file
//!
//! ## Storage
//!
//! Both sides work against the [`ZipStore`] trait, a positional byte store
//! implemented for heap buffers, borrowed slices, files and closures.
//!
//! ## Example
//!
//! ```rust
//! use pkflate_zip::{AddOptions, ExtractFlags, ZipReader, ZipWriter, ZipWriterOptions};
//!
//! let mut writer = ZipWriter::new_heap(ZipWriterOptions::default()).unwrap();
//! writer.add_mem("hello.txt", b"Hello, World!", &AddOptions::new().level(6)).unwrap();
//! let bytes = writer.finalize_to_vec().unwrap();
//!
//! let mut reader = ZipReader::from_vec(bytes).unwrap();
//! let data = reader.extract_file_to_vec("hello.txt", ExtractFlags::new()).unwrap();
//! assert_eq!(data, b"Hello, World!");
//! ```
//!
//! ## Errors
//!
//! Every failure carries a [`ZipErrorKind`] with a stable numeric code;
//! [`error_string`] maps codes to short descriptions.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod directory;
pub mod error;
pub mod header;
pub mod reader;
pub mod store;
pub mod writer;

// Re-exports
pub use directory::CentralDirectory;
pub use error::{Result, ZipError, ZipErrorKind, error_string};
pub use header::DosDateTime;
pub use reader::{
    EntryStat, ExtractFlags, ZipReader, ZipReaderOptions, validate_file, validate_memory,
};
pub use store::{CallbackStore, FileStore, HeapStore, SliceStore, ZipStore};
pub use writer::{
    AddOptions, Precompressed, WriterState, ZipWriter, ZipWriterOptions,
    add_mem_to_archive_file_in_place,
};
