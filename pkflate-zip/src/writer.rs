//! ZIP archive writer.
//!
//! Each added entry is laid out as padding, local header, name, optional
//! ZIP64 extra field, data and a data descriptor, while its central record
//! is appended to an in-memory [`CentralDirectory`]. [`ZipWriter::finalize`]
//! writes the directory and the end records.
//!
//! A failed add truncates the directory arena back to where it was and
//! restores the ZIP64 state, so the handle stays usable. Bytes already
//! written to the store past the last good entry are simply overwritten by
//! the next add or the directory.

use crate::directory::CentralDirectory;
use crate::error::{Result, ZipError, ZipErrorKind};
use crate::header::{
    CENTRAL_HEADER_SIZE, CentralHeader, DATA_DESCRIPTOR_SIG, DOS_DIR_ATTRIBUTE, DosDateTime,
    END_OF_CENTRAL_DIR_SIZE, EndOfCentralDir, LOCAL_HEADER_SIZE, LocalHeader, METHOD_DEFLATED,
    METHOD_STORED, SENTINEL_32, ZIP64_MAX_EXTRA_SIZE, Zip64EndOfCentralDir, Zip64Locator, clamp32,
    find_zip64_extra, flags, le32, put32, put64, strip_zip64_extra, zip64_extra_field,
};
use crate::reader::{MAX_IO_BUF_SIZE, ZipReader, ZipReaderOptions};
use crate::store::{CallbackStore, FileStore, HeapStore, ZipStore, write_all_at};
use log::debug;
use pkflate_core::checksum::{Crc32, crc32};
use pkflate_core::config::{CompressionLevel, CompressionStrategy, FlushMode};
use pkflate_deflate::deflate::{CompressStatus, Deflater, create_comp_flags};
use std::cell::Cell;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;
use std::time::SystemTime;

const MAX_U32: u64 = u32::MAX as u64;
const MAX_U16: usize = u16::MAX as usize;

/// Archive-wide writer options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ZipWriterOptions {
    /// Align every local header to this power of two. 0 disables.
    pub alignment: u32,
    /// Zero bytes reserved at the start of a new archive.
    pub reserve_bytes: u64,
    /// Write ZIP64 end records even when nothing overflows.
    pub force_zip64: bool,
    /// Leave the UTF-8 name flag clear.
    pub ascii_filenames: bool,
}

impl ZipWriterOptions {
    /// Default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the local header alignment.
    pub fn alignment(mut self, alignment: u32) -> Self {
        self.alignment = alignment;
        self
    }

    /// Set the number of reserved leading bytes.
    pub fn reserve_bytes(mut self, bytes: u64) -> Self {
        self.reserve_bytes = bytes;
        self
    }

    /// Force ZIP64 end records.
    pub fn force_zip64(mut self, yes: bool) -> Self {
        self.force_zip64 = yes;
        self
    }

    /// Write names without the UTF-8 flag.
    pub fn ascii_filenames(mut self, yes: bool) -> Self {
        self.ascii_filenames = yes;
        self
    }
}

/// Size and CRC-32 of data that was compressed elsewhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Precompressed {
    /// Size of the original data.
    pub uncompressed_size: u64,
    /// CRC-32 of the original data.
    pub crc32: u32,
}

/// Per-entry options.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AddOptions {
    /// Compression level. Level 0 stores.
    pub level: CompressionLevel,
    /// Entry comment.
    pub comment: String,
    /// Modification time; the current time when unset.
    pub last_modified: Option<SystemTime>,
    /// The data is already a raw DEFLATE stream.
    pub precompressed: Option<Precompressed>,
}

impl AddOptions {
    /// Default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the compression level (clamped to 0..=10).
    pub fn level(mut self, level: u8) -> Self {
        self.level = CompressionLevel::new(level);
        self
    }

    /// Set the entry comment.
    pub fn comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = comment.into();
        self
    }

    /// Set the modification time.
    pub fn last_modified(mut self, time: SystemTime) -> Self {
        self.last_modified = Some(time);
        self
    }

    /// Mark the data as a raw DEFLATE stream of `uncompressed_size` bytes
    /// with the given CRC-32.
    pub fn precompressed(mut self, uncompressed_size: u64, crc32: u32) -> Self {
        self.precompressed = Some(Precompressed {
            uncompressed_size,
            crc32,
        });
        self
    }
}

/// Writer lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterState {
    /// Entries may be added.
    Writing,
    /// The end records have been written.
    Finalized,
}

struct Snapshot {
    entries: usize,
    dir_bytes: usize,
    zip64: bool,
}

/// Fields of a central record about to be appended.
struct CentralEntry<'a> {
    name: &'a [u8],
    comment: &'a [u8],
    method: u16,
    flags: u16,
    modified: DosDateTime,
    crc32: u32,
    compressed_size: u64,
    uncompressed_size: u64,
    local_header_offset: u64,
    external_attr: u32,
}

/// Writer of a ZIP archive into a [`ZipStore`].
pub struct ZipWriter<S: ZipStore> {
    store: S,
    base: u64,
    archive_size: u64,
    dir: CentralDirectory,
    zip64: bool,
    options: ZipWriterOptions,
    state: WriterState,
    last_error: Cell<ZipErrorKind>,
}

impl ZipWriter<HeapStore> {
    /// Write into a growable in-memory buffer.
    pub fn new_heap(options: ZipWriterOptions) -> Result<Self> {
        Self::new(HeapStore::new(), options)
    }

    /// Write into an in-memory buffer with an initial capacity.
    pub fn with_capacity(capacity: usize, options: ZipWriterOptions) -> Result<Self> {
        Self::new(HeapStore::with_capacity(capacity), options)
    }

    /// Finalize and return the archive bytes.
    pub fn finalize_to_vec(mut self) -> Result<Vec<u8>> {
        self.finalize()?;
        let end = usize::try_from(self.base + self.archive_size)
            .map_err(|_| ZipError::from(ZipErrorKind::InternalError))?;
        let mut data = self.store.into_inner();
        data.truncate(end);
        Ok(data)
    }
}

impl ZipWriter<FileStore> {
    /// Create (or truncate) the file at `path` and write into it.
    pub fn create<P: AsRef<Path>>(path: P, options: ZipWriterOptions) -> Result<Self> {
        let store =
            FileStore::create(path).map_err(|e| ZipError::io(ZipErrorKind::FileCreateFailed, e))?;
        Self::new(store, options)
    }
}

impl<'a> ZipWriter<CallbackStore<'a>> {
    /// Write through `write(offset, data)`, which returns the number of
    /// bytes it accepted.
    pub fn from_callbacks<W>(write: W, options: ZipWriterOptions) -> Result<Self>
    where
        W: FnMut(u64, &[u8]) -> usize + 'a,
    {
        Self::new(CallbackStore::writer(write), options)
    }
}

impl<S: ZipStore> ZipWriter<S> {
    /// Start a new archive at offset 0 of `store`.
    pub fn new(store: S, options: ZipWriterOptions) -> Result<Self> {
        check_alignment(options.alignment)?;
        if !store.is_writable() {
            return Err(ZipError::invalid_parameter("store is not writable"));
        }
        let mut writer = Self {
            store,
            base: 0,
            archive_size: 0,
            dir: CentralDirectory::new(),
            zip64: options.force_zip64,
            options,
            state: WriterState::Writing,
            last_error: Cell::new(ZipErrorKind::NoError),
        };
        if options.reserve_bytes > 0 {
            writer.write_zeros(0, options.reserve_bytes)?;
            writer.archive_size = options.reserve_bytes;
        }
        Ok(writer)
    }

    /// Turn a reader into a writer that appends to the same archive.
    ///
    /// New entries overwrite the old central directory, which is rewritten
    /// with the old and new records on [`finalize`](Self::finalize). The
    /// reader's store must be writable.
    pub fn from_reader(reader: ZipReader<S>, options: ZipWriterOptions) -> Result<Self> {
        check_alignment(options.alignment)?;
        if options.force_zip64 && !reader.is_zip64() {
            return Err(ZipError::invalid_parameter(
                "cannot force ZIP64 when appending to a classic archive",
            ));
        }
        if reader.is_zip64() {
            if reader.file_count() as u64 >= MAX_U32 {
                return Err(ZipErrorKind::TooManyFiles.into());
            }
        } else {
            if reader.file_count() >= MAX_U16 {
                return Err(ZipErrorKind::TooManyFiles.into());
            }
            let needed = (CENTRAL_HEADER_SIZE + LOCAL_HEADER_SIZE) as u64;
            if reader.archive_size() + needed > MAX_U32 {
                return Err(ZipErrorKind::FileTooLarge.into());
            }
        }

        let parts = reader.into_parts();
        if !parts.store.is_writable() {
            return Err(ZipError::invalid_parameter("store is not writable"));
        }
        let mut dir = parts.dir;
        dir.clear_sorted();
        debug!(
            "appending to archive with {} entries at offset {}",
            dir.len(),
            parts.central_dir_offset
        );
        Ok(Self {
            store: parts.store,
            base: parts.base,
            archive_size: parts.central_dir_offset,
            dir,
            zip64: parts.zip64,
            options,
            state: WriterState::Writing,
            last_error: Cell::new(ZipErrorKind::NoError),
        })
    }

    fn track<T>(&self, result: Result<T>) -> Result<T> {
        if let Err(err) = &result {
            self.last_error.set(err.kind());
        }
        result
    }

    /// Kind of the most recent failure on this handle.
    pub fn last_error(&self) -> ZipErrorKind {
        self.last_error.get()
    }

    /// Return the most recent failure kind and reset it.
    pub fn take_last_error(&self) -> ZipErrorKind {
        self.last_error.replace(ZipErrorKind::NoError)
    }

    /// Number of entries written so far, including appended-to ones.
    pub fn file_count(&self) -> usize {
        self.dir.len()
    }

    /// Bytes written so far, excluding the directory.
    pub fn archive_size(&self) -> u64 {
        self.archive_size
    }

    /// Whether ZIP64 end records will be written.
    pub fn is_zip64(&self) -> bool {
        self.zip64
    }

    /// Current lifecycle state.
    pub fn state(&self) -> WriterState {
        self.state
    }

    /// Give back the store. Call [`finalize`](Self::finalize) first unless
    /// the partial archive is wanted.
    pub fn into_store(self) -> S {
        self.store
    }

    fn write(&mut self, offset: u64, data: &[u8]) -> Result<()> {
        write_all_at(&mut self.store, self.base + offset, data)
            .map_err(|e| ZipError::io(ZipErrorKind::FileWriteFailed, e))
    }

    fn write_zeros(&mut self, mut offset: u64, mut len: u64) -> Result<()> {
        let zeros = [0u8; 4096];
        while len > 0 {
            let n = len.min(zeros.len() as u64) as usize;
            self.write(offset, &zeros[..n])?;
            offset += n as u64;
            len -= n as u64;
        }
        Ok(())
    }

    fn padding(&self) -> u64 {
        let align = u64::from(self.options.alignment);
        if align == 0 {
            return 0;
        }
        (align - (self.archive_size & (align - 1))) & (align - 1)
    }

    fn snapshot(&self) -> Snapshot {
        Snapshot {
            entries: self.dir.len(),
            dir_bytes: self.dir.byte_len(),
            zip64: self.zip64,
        }
    }

    fn rollback(&mut self, snapshot: Snapshot) {
        self.dir.truncate(snapshot.entries, snapshot.dir_bytes);
        self.zip64 = snapshot.zip64;
    }

    fn guarded<T>(&mut self, add: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        let result = if self.state == WriterState::Writing {
            let snapshot = self.snapshot();
            let result = add(self);
            if result.is_err() {
                self.rollback(snapshot);
            }
            result
        } else {
            Err(ZipError::invalid_parameter("archive already finalized"))
        };
        self.track(result)
    }

    fn upgrade_to_zip64(&mut self, reason: &str) {
        if !self.zip64 {
            debug!("switching archive to ZIP64: {reason}");
            self.zip64 = true;
        }
    }

    fn check_entry_count(&mut self) -> Result<()> {
        if self.zip64 {
            if self.dir.len() as u64 >= MAX_U32 {
                return Err(ZipErrorKind::TooManyFiles.into());
            }
        } else if self.dir.len() >= MAX_U16 {
            self.upgrade_to_zip64("entry count");
        }
        Ok(())
    }

    fn check_name_and_comment(name: &str, comment: &str) -> Result<()> {
        if name.starts_with('/') || name.len() > MAX_U16 {
            return Err(ZipError::new(ZipErrorKind::InvalidFilename, name.to_string()));
        }
        if comment.len() > MAX_U16 {
            return Err(ZipError::invalid_parameter("comment longer than 65535 bytes"));
        }
        Ok(())
    }

    fn check_directory_room(&self, name: &str, comment: &str) -> Result<()> {
        let projected = self.dir.byte_len()
            + CENTRAL_HEADER_SIZE
            + name.len()
            + ZIP64_MAX_EXTRA_SIZE
            + comment.len();
        if projected as u64 >= MAX_U32 {
            return Err(ZipErrorKind::UnsupportedCdirSize.into());
        }
        Ok(())
    }

    fn check_projected_size(&mut self, padding: u64, name: &str, comment: &str) {
        if self.zip64 {
            return;
        }
        let projected = self.archive_size
            + padding
            + (LOCAL_HEADER_SIZE + name.len()) as u64
            + (CENTRAL_HEADER_SIZE + name.len() + comment.len()) as u64
            + self.dir.byte_len() as u64
            + (END_OF_CENTRAL_DIR_SIZE + 16) as u64;
        if projected > MAX_U32 {
            self.upgrade_to_zip64("projected archive size");
        }
    }

    fn general_flags(&self) -> u16 {
        if self.options.ascii_filenames {
            0
        } else {
            flags::UTF8
        }
    }

    fn write_local_header(
        &mut self,
        offset: u64,
        header: &LocalHeader,
        name: &[u8],
        extra: &[u8],
    ) -> Result<u64> {
        self.write(offset, &header.to_bytes())?;
        let mut cur = offset + LOCAL_HEADER_SIZE as u64;
        self.write(cur, name)?;
        cur += name.len() as u64;
        self.write(cur, extra)?;
        Ok(cur + extra.len() as u64)
    }

    fn write_descriptor(
        &mut self,
        offset: u64,
        crc: u32,
        compressed_size: u64,
        uncompressed_size: u64,
        wide: bool,
    ) -> Result<u64> {
        let mut buf = [0u8; 24];
        put32(&mut buf, 0, DATA_DESCRIPTOR_SIG);
        put32(&mut buf, 4, crc);
        let len = if wide {
            put64(&mut buf, 8, compressed_size);
            put64(&mut buf, 16, uncompressed_size);
            24
        } else {
            if compressed_size > MAX_U32 {
                return Err(ZipErrorKind::ArchiveTooLarge.into());
            }
            put32(&mut buf, 8, compressed_size as u32);
            put32(&mut buf, 12, uncompressed_size as u32);
            16
        };
        self.write(offset, &buf[..len])?;
        Ok(offset + len as u64)
    }

    fn push_central(&mut self, entry: CentralEntry<'_>) -> Result<()> {
        if !self.zip64 && entry.local_header_offset > MAX_U32 {
            return Err(ZipErrorKind::FileTooLarge.into());
        }
        let wide_sizes = entry.uncompressed_size >= MAX_U32 || entry.compressed_size >= MAX_U32;
        let wide_offset = entry.local_header_offset >= MAX_U32;
        let extra = if wide_sizes || wide_offset {
            zip64_extra_field(
                wide_sizes.then_some(entry.uncompressed_size),
                wide_sizes.then_some(entry.compressed_size),
                wide_offset.then_some(entry.local_header_offset),
            )
        } else {
            Vec::new()
        };

        let total = self.dir.byte_len()
            + CENTRAL_HEADER_SIZE
            + entry.name.len()
            + extra.len()
            + entry.comment.len();
        if total as u64 >= MAX_U32 {
            return Err(ZipErrorKind::UnsupportedCdirSize.into());
        }

        let header = CentralHeader {
            version_needed: if entry.method == METHOD_STORED { 0 } else { 20 },
            flags: entry.flags,
            method: entry.method,
            modified: entry.modified,
            crc32: entry.crc32,
            compressed_size: if wide_sizes {
                SENTINEL_32
            } else {
                entry.compressed_size as u32
            },
            uncompressed_size: if wide_sizes {
                SENTINEL_32
            } else {
                entry.uncompressed_size as u32
            },
            name_len: entry.name.len() as u16,
            extra_len: extra.len() as u16,
            comment_len: entry.comment.len() as u16,
            external_attr: entry.external_attr,
            local_header_offset: clamp32(entry.local_header_offset),
            ..CentralHeader::default()
        };
        self.dir
            .push_record(&header.to_bytes(), entry.name, &extra, entry.comment);
        Ok(())
    }

    /// Deflate `input` into the store at `*cur`. Returns whether the stream
    /// is finished.
    fn deflate_into_store(
        &mut self,
        deflater: &mut Deflater,
        mut input: &[u8],
        flush: FlushMode,
        cur: &mut u64,
    ) -> Result<bool> {
        let base = self.base;
        loop {
            let mut failure = None;
            let mut pos = *cur;
            let store = &mut self.store;
            let (status, used) = deflater.compress_to_sink(input, flush, &mut |block: &[u8]| {
                match write_all_at(store, base + pos, block) {
                    Ok(()) => {
                        pos += block.len() as u64;
                        true
                    }
                    Err(e) => {
                        failure = Some(e);
                        false
                    }
                }
            });
            *cur = pos;
            input = &input[used..];
            if let Some(e) = failure {
                return Err(ZipError::io(ZipErrorKind::FileWriteFailed, e));
            }
            match status {
                CompressStatus::Done => return Ok(true),
                CompressStatus::Okay if input.is_empty() && flush != FlushMode::Finish => {
                    return Ok(false);
                }
                CompressStatus::Okay if used > 0 || flush == FlushMode::Finish => {}
                other => {
                    return Err(ZipError::new(
                        ZipErrorKind::CompressionFailed,
                        format!("compressor stopped with {other:?}"),
                    ));
                }
            }
        }
    }

    /// Add an entry from memory.
    ///
    /// Names ending in `/` are directories and must carry no data. Data of
    /// three bytes or less is always stored.
    pub fn add_mem(&mut self, name: &str, data: &[u8], options: &AddOptions) -> Result<()> {
        self.guarded(|w| w.add_mem_inner(name, data, options))
    }

    fn add_mem_inner(&mut self, name: &str, data: &[u8], options: &AddOptions) -> Result<()> {
        let (uncompressed_size, crc) = match options.precompressed {
            Some(pre) => (pre.uncompressed_size, pre.crc32),
            None => (data.len() as u64, crc32(0, data)),
        };
        let mut level = options.level.level();
        if options.precompressed.is_none() && uncompressed_size <= 3 {
            level = 0;
        }
        let store_raw = level == 0 || options.precompressed.is_some();

        self.check_entry_count()?;
        if !self.zip64 && (data.len() as u64 > MAX_U32 || uncompressed_size > MAX_U32) {
            self.upgrade_to_zip64("entry size");
        }
        let comment = options.comment.as_str();
        Self::check_name_and_comment(name, comment)?;
        let padding = self.padding();
        self.check_directory_room(name, comment)?;
        self.check_projected_size(padding, name, comment);

        let is_dir = name.ends_with('/');
        if is_dir && (!data.is_empty() || uncompressed_size > 0) {
            return Err(ZipError::invalid_parameter("directory entries cannot hold data"));
        }

        let mut bit_flags = self.general_flags();
        if uncompressed_size > 0 {
            bit_flags |= flags::DATA_DESCRIPTOR;
        }
        let method = if store_raw && options.precompressed.is_none() {
            METHOD_STORED
        } else {
            METHOD_DEFLATED
        };
        let modified =
            DosDateTime::from_system_time(options.last_modified.unwrap_or_else(SystemTime::now));

        self.dir.reserve(CENTRAL_HEADER_SIZE + name.len() + comment.len() + ZIP64_MAX_EXTRA_SIZE);
        self.write_zeros(self.archive_size, padding)?;
        let local_ofs = self.archive_size + padding;

        let local_extra = if self.zip64 && (uncompressed_size >= MAX_U32 || local_ofs >= MAX_U32) {
            let wide = uncompressed_size >= MAX_U32;
            Some(zip64_extra_field(
                wide.then_some(uncompressed_size),
                wide.then_some(0),
                (local_ofs >= MAX_U32).then_some(local_ofs),
            ))
        } else {
            if !self.zip64 && local_ofs > MAX_U32 {
                return Err(ZipErrorKind::ArchiveTooLarge.into());
            }
            None
        };
        let extra = local_extra.as_deref().unwrap_or_default();

        debug!("adding {name}: {uncompressed_size} bytes, method {method}, level {level}");
        let header = LocalHeader {
            version_needed: if method == METHOD_STORED { 0 } else { 20 },
            flags: bit_flags,
            method,
            modified,
            name_len: name.len() as u16,
            extra_len: extra.len() as u16,
            ..LocalHeader::default()
        };
        let mut cur = self.write_local_header(local_ofs, &header, name.as_bytes(), extra)?;

        let compressed_size = if store_raw {
            self.write(cur, data)?;
            cur += data.len() as u64;
            data.len() as u64
        } else if !data.is_empty() {
            let start = cur;
            let mut deflater = Box::new(Deflater::new(create_comp_flags(
                CompressionLevel::new(level),
                false,
                CompressionStrategy::Default,
            )));
            if !self.deflate_into_store(&mut deflater, data, FlushMode::Finish, &mut cur)? {
                return Err(ZipErrorKind::CompressionFailed.into());
            }
            cur - start
        } else {
            0
        };

        if uncompressed_size > 0 {
            cur = self.write_descriptor(
                cur,
                crc,
                compressed_size,
                uncompressed_size,
                local_extra.is_some(),
            )?;
        }

        self.push_central(CentralEntry {
            name: name.as_bytes(),
            comment: comment.as_bytes(),
            method,
            flags: bit_flags,
            modified,
            crc32: crc,
            compressed_size,
            uncompressed_size,
            local_header_offset: local_ofs,
            external_attr: if is_dir { DOS_DIR_ATTRIBUTE } else { 0 },
        })?;
        self.archive_size = cur;
        Ok(())
    }

    /// Add an entry streamed from `read(offset, buf)`, which fills `buf`
    /// with source bytes starting at `offset` and returns 0 at the end.
    ///
    /// `max_size` bounds the source; reading past it fails the add. A
    /// bound of 4 GiB or more switches the archive to ZIP64 up front.
    pub fn add_callback<F>(
        &mut self,
        name: &str,
        max_size: u64,
        read: F,
        options: &AddOptions,
    ) -> Result<()>
    where
        F: FnMut(u64, &mut [u8]) -> io::Result<usize>,
    {
        self.guarded(|w| w.add_callback_inner(name, max_size, read, options))
    }

    fn add_callback_inner<F>(
        &mut self,
        name: &str,
        max_size: u64,
        mut read: F,
        options: &AddOptions,
    ) -> Result<()>
    where
        F: FnMut(u64, &mut [u8]) -> io::Result<usize>,
    {
        if options.precompressed.is_some() {
            return Err(ZipError::invalid_parameter(
                "precompressed data must be added from memory",
            ));
        }
        if max_size > MAX_U32 {
            self.upgrade_to_zip64("declared source size");
        }
        let comment = options.comment.as_str();
        Self::check_name_and_comment(name, comment)?;
        self.check_entry_count()?;
        let padding = self.padding();
        self.check_directory_room(name, comment)?;
        self.check_projected_size(padding, name, comment);

        let is_dir = name.ends_with('/');
        if is_dir && max_size > 0 {
            return Err(ZipError::invalid_parameter("directory entries cannot hold data"));
        }

        let level = if max_size <= 3 { 0 } else { options.level.level() };
        let method = if max_size > 0 && level > 0 {
            METHOD_DEFLATED
        } else {
            METHOD_STORED
        };
        let bit_flags = self.general_flags() | flags::DATA_DESCRIPTOR;
        let modified =
            DosDateTime::from_system_time(options.last_modified.unwrap_or_else(SystemTime::now));

        self.write_zeros(self.archive_size, padding)?;
        let local_ofs = self.archive_size + padding;
        let local_extra = if self.zip64 && (max_size >= MAX_U32 || local_ofs >= MAX_U32) {
            Some(zip64_extra_field(None, None, (local_ofs >= MAX_U32).then_some(local_ofs)))
        } else {
            if !self.zip64 && local_ofs > MAX_U32 {
                return Err(ZipErrorKind::ArchiveTooLarge.into());
            }
            None
        };
        let extra = local_extra.as_deref().unwrap_or_default();

        debug!("adding {name} from callback: up to {max_size} bytes, method {method}");
        let header = LocalHeader {
            version_needed: if method == METHOD_STORED { 0 } else { 20 },
            flags: bit_flags,
            method,
            modified,
            name_len: name.len() as u16,
            extra_len: extra.len() as u16,
            ..LocalHeader::default()
        };
        let mut cur = self.write_local_header(local_ofs, &header, name.as_bytes(), extra)?;
        let data_start = cur;

        let mut crc = Crc32::new();
        let mut file_ofs = 0u64;
        if max_size > 0 {
            let mut buf = vec![0u8; MAX_IO_BUF_SIZE];
            let mut deflater = (method == METHOD_DEFLATED).then(|| {
                Box::new(Deflater::new(create_comp_flags(
                    CompressionLevel::new(level),
                    false,
                    CompressionStrategy::Default,
                )))
            });
            loop {
                let n = read(file_ofs, &mut buf[..])
                    .map_err(|e| ZipError::io(ZipErrorKind::FileReadFailed, e))?;
                if n > buf.len() || file_ofs + n as u64 > max_size {
                    return Err(ZipError::new(
                        ZipErrorKind::FileReadFailed,
                        "source produced more than its declared size",
                    ));
                }
                file_ofs += n as u64;
                crc.update(&buf[..n]);

                match deflater.as_mut() {
                    None if n == 0 => break,
                    None => {
                        self.write(cur, &buf[..n])?;
                        cur += n as u64;
                    }
                    Some(deflater) => {
                        let flush = if n == 0 {
                            FlushMode::Finish
                        } else {
                            FlushMode::None
                        };
                        if self.deflate_into_store(deflater, &buf[..n], flush, &mut cur)? {
                            break;
                        }
                    }
                }
            }
        }
        let uncompressed_size = file_ofs;
        let compressed_size = cur - data_start;
        let crc = crc.value();

        cur = self.write_descriptor(
            cur,
            crc,
            compressed_size,
            uncompressed_size,
            local_extra.is_some(),
        )?;

        self.push_central(CentralEntry {
            name: name.as_bytes(),
            comment: comment.as_bytes(),
            method,
            flags: bit_flags,
            modified,
            crc32: crc,
            compressed_size,
            uncompressed_size,
            local_header_offset: local_ofs,
            external_attr: if is_dir { DOS_DIR_ATTRIBUTE } else { 0 },
        })?;
        self.archive_size = cur;
        Ok(())
    }

    /// Add the file at `path` as entry `name`. The modification time
    /// defaults to the file's own.
    pub fn add_file<P: AsRef<Path>>(
        &mut self,
        name: &str,
        path: P,
        options: &AddOptions,
    ) -> Result<()> {
        let opened = File::open(path.as_ref())
            .map_err(|e| ZipError::io(ZipErrorKind::FileOpenFailed, e))
            .and_then(|file| {
                let meta = file
                    .metadata()
                    .map_err(|e| ZipError::io(ZipErrorKind::FileStatFailed, e))?;
                Ok((file, meta))
            });
        let (mut file, meta) = self.track(opened)?;

        let mut options = options.clone();
        if options.last_modified.is_none() {
            options.last_modified = meta.modified().ok();
        }
        self.add_callback(
            name,
            meta.len(),
            |offset, buf| {
                file.seek(SeekFrom::Start(offset))?;
                let mut filled = 0;
                while filled < buf.len() {
                    match file.read(&mut buf[filled..]) {
                        Ok(0) => break,
                        Ok(n) => filled += n,
                        Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                        Err(e) => return Err(e),
                    }
                }
                Ok(filled)
            },
            &options,
        )
    }

    /// Copy entry `index` of `source` without recompressing it.
    ///
    /// The local header, name, extra field, data and any data descriptor
    /// are copied verbatim. The central record gets the new local header
    /// offset, rebuilt as ZIP64 fields when this archive is ZIP64.
    pub fn add_from_reader<R: ZipStore>(
        &mut self,
        source: &mut ZipReader<R>,
        index: usize,
    ) -> Result<()> {
        self.guarded(|w| w.add_from_reader_inner(source, index))
    }

    fn add_from_reader_inner<R: ZipStore>(
        &mut self,
        source: &mut ZipReader<R>,
        index: usize,
    ) -> Result<()> {
        if source.is_zip64() && !self.zip64 {
            return Err(ZipError::invalid_parameter(
                "cannot copy from a ZIP64 archive into a classic one",
            ));
        }
        let record = source.raw_record(index)?.to_vec();
        let src_header = CentralHeader::parse(&record)
            .ok_or_else(|| ZipError::corrupted("bad source central header"))?;
        let name_len = usize::from(src_header.name_len);
        let extra_len = usize::from(src_header.extra_len);
        let trailing = record.len() - CENTRAL_HEADER_SIZE;
        if (self.dir.byte_len() + CENTRAL_HEADER_SIZE + trailing + 32) as u64 >= MAX_U32 {
            return Err(ZipErrorKind::UnsupportedCdirSize.into());
        }
        if self.zip64 {
            if self.dir.len() as u64 >= MAX_U32 {
                return Err(ZipErrorKind::TooManyFiles.into());
            }
        } else if self.dir.len() >= MAX_U16 {
            return Err(ZipErrorKind::TooManyFiles.into());
        }

        let stat = source.stat(index)?;
        let (local, local_extra) = source.read_local_header(&stat)?;
        let wide_descriptor = find_zip64_extra(&local_extra)
            .map_err(|_| ZipError::corrupted("malformed local extra field"))?
            .is_some();
        let body_len =
            u64::from(local.name_len) + u64::from(local.extra_len) + stat.compressed_size;

        let padding = self.padding();
        if !self.zip64 {
            let approx = self.archive_size
                + padding
                + LOCAL_HEADER_SIZE as u64
                + body_len
                + 16
                + self.dir.byte_len() as u64
                + (CENTRAL_HEADER_SIZE + trailing + END_OF_CENTRAL_DIR_SIZE + 64) as u64;
            if approx >= MAX_U32 {
                return Err(ZipErrorKind::ArchiveTooLarge.into());
            }
        }

        self.write_zeros(self.archive_size, padding)?;
        let local_ofs = self.archive_size + padding;
        let mut cur = local_ofs;
        self.write(cur, &local.to_bytes())?;
        cur += LOCAL_HEADER_SIZE as u64;

        let mut src_ofs = stat.local_header_offset + LOCAL_HEADER_SIZE as u64;
        let mut remaining = body_len;
        let mut buf = vec![0u8; (remaining as usize).clamp(32, MAX_IO_BUF_SIZE)];
        while remaining > 0 {
            let n = (remaining as usize).min(buf.len());
            source.read_raw(src_ofs, &mut buf[..n])?;
            self.write(cur, &buf[..n])?;
            src_ofs += n as u64;
            cur += n as u64;
            remaining -= n as u64;
        }

        if local.flags & flags::DATA_DESCRIPTOR != 0 {
            let read_len = if wide_descriptor { 24 } else { 16 };
            source.read_raw(src_ofs, &mut buf[..read_len])?;
            let has_sig = le32(&buf, 0) == DATA_DESCRIPTOR_SIG;
            let len = read_len - if has_sig { 0 } else { 4 };
            let descriptor = buf[..len].to_vec();
            self.write(cur, &descriptor)?;
            cur += len as u64;
        }

        let extra_start = CENTRAL_HEADER_SIZE + name_len;
        let name = &record[CENTRAL_HEADER_SIZE..extra_start];
        let src_extra = &record[extra_start..extra_start + extra_len];
        let comment = &record[extra_start + extra_len..];
        let mut header = src_header;
        let extra = if self.zip64 {
            let mut extra = zip64_extra_field(
                Some(stat.uncompressed_size),
                Some(stat.compressed_size),
                Some(local_ofs),
            );
            extra.extend_from_slice(
                &strip_zip64_extra(src_extra)
                    .map_err(|_| ZipError::corrupted("malformed source extra field"))?,
            );
            if extra.len() > MAX_U16 {
                return Err(ZipError::corrupted("extra field too long after ZIP64 rewrite"));
            }
            header.compressed_size = SENTINEL_32;
            header.uncompressed_size = SENTINEL_32;
            header.local_header_offset = SENTINEL_32;
            extra
        } else {
            if cur > MAX_U32 || local_ofs >= MAX_U32 {
                return Err(ZipErrorKind::ArchiveTooLarge.into());
            }
            header.local_header_offset = local_ofs as u32;
            src_extra.to_vec()
        };
        header.extra_len = extra.len() as u16;

        if (self.dir.byte_len() + header.total_size()) as u64 >= MAX_U32 {
            return Err(ZipErrorKind::UnsupportedCdirSize.into());
        }
        self.dir.push_record(&header.to_bytes(), name, &extra, comment);
        self.archive_size = cur;
        Ok(())
    }

    /// Write the central directory and end records. No entries can be
    /// added afterwards.
    pub fn finalize(&mut self) -> Result<()> {
        let result = self.finalize_inner();
        self.track(result)
    }

    fn finalize_inner(&mut self) -> Result<()> {
        if self.state != WriterState::Writing {
            return Err(ZipError::invalid_parameter("archive already finalized"));
        }
        let entries = self.dir.len() as u64;
        let cdir_size = self.dir.byte_len() as u64;
        if self.zip64 {
            if cdir_size >= MAX_U32 || entries >= MAX_U32 {
                return Err(ZipErrorKind::TooManyFiles.into());
            }
        } else if entries > MAX_U16 as u64
            || self.archive_size + cdir_size + END_OF_CENTRAL_DIR_SIZE as u64 > MAX_U32
        {
            return Err(ZipErrorKind::TooManyFiles.into());
        }

        let mut cdir_ofs = 0;
        if entries > 0 {
            cdir_ofs = self.archive_size;
            let raw = std::mem::take(&mut self.dir);
            let written = self.write(cdir_ofs, raw.raw());
            self.dir = raw;
            written?;
            self.archive_size += cdir_size;
        }

        if self.zip64 {
            let eocd64_ofs = self.archive_size;
            let eocd64 = Zip64EndOfCentralDir {
                record_size: 44,
                version_made_by: 0x031E,
                version_needed: 0x002D,
                disk_number: 0,
                cdir_disk: 0,
                entries_on_disk: entries,
                total_entries: entries,
                cdir_size,
                cdir_offset: cdir_ofs,
            };
            self.write(eocd64_ofs, &eocd64.to_bytes())?;
            let locator = Zip64Locator {
                eocd64_disk: 0,
                eocd64_offset: eocd64_ofs,
                total_disks: 1,
            };
            self.write(eocd64_ofs + 56, &locator.to_bytes())?;
            self.archive_size += 56 + 20;
        }

        let count = entries.min(u64::from(u16::MAX)) as u16;
        let eocd = EndOfCentralDir {
            entries_on_disk: count,
            total_entries: count,
            cdir_size: clamp32(cdir_size),
            cdir_offset: clamp32(cdir_ofs),
            ..EndOfCentralDir::default()
        };
        self.write(self.archive_size, &eocd.to_bytes())?;
        self.archive_size += END_OF_CENTRAL_DIR_SIZE as u64;

        self.store
            .flush()
            .map_err(|e| ZipError::io(ZipErrorKind::FileCloseFailed, e))?;
        self.state = WriterState::Finalized;
        debug!(
            "finalized archive: {entries} entries, {} bytes, zip64={}",
            self.archive_size, self.zip64
        );
        Ok(())
    }
}

fn check_alignment(alignment: u32) -> Result<()> {
    if alignment != 0 && !alignment.is_power_of_two() {
        return Err(ZipError::invalid_parameter(format!(
            "alignment {alignment} is not a power of two"
        )));
    }
    Ok(())
}

/// Add `data` as entry `name` to the archive file at `path`, creating the
/// file if it does not exist.
///
/// An existing archive is appended to in place. Finalization is always
/// attempted and the first error is returned. A newly created file is
/// deleted when anything fails; an existing one keeps whatever was written.
pub fn add_mem_to_archive_file_in_place<P: AsRef<Path>>(
    path: P,
    name: &str,
    data: &[u8],
    options: &AddOptions,
) -> Result<()> {
    let path = path.as_ref();
    if name.starts_with('/') || name.len() > MAX_U16 {
        return Err(ZipError::new(ZipErrorKind::InvalidFilename, name.to_string()));
    }

    let created = !path.exists();
    let mut writer = if created {
        ZipWriter::create(path, ZipWriterOptions::default())?
    } else {
        let reader = ZipReader::open_rw(
            path,
            ZipReaderOptions {
                sort_central_dir: false,
            },
        )?;
        ZipWriter::from_reader(reader, ZipWriterOptions::default())?
    };

    let added = writer.add_mem(name, data, options);
    let finalized = writer.finalize();
    drop(writer);
    let result = added.and(finalized);

    if result.is_err() && created {
        if let Err(e) = std::fs::remove_file(path) {
            log::warn!("could not remove {}: {e}", path.display());
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::ExtractFlags;

    fn fixed_time() -> AddOptions {
        let when = SystemTime::UNIX_EPOCH + std::time::Duration::from_secs(1_600_000_000);
        AddOptions::new().last_modified(when)
    }

    #[test]
    fn test_write_and_read_back() {
        let mut writer = ZipWriter::new_heap(ZipWriterOptions::new()).unwrap();
        let text = b"The quick brown fox jumps over the lazy dog. ".repeat(40);
        writer.add_mem("fox.txt", &text, &fixed_time()).unwrap();
        writer.add_mem("raw.bin", &[1, 2, 3, 4, 5], &fixed_time().level(0)).unwrap();
        writer.add_mem("empty", b"", &fixed_time()).unwrap();
        writer.add_mem("dir/", b"", &fixed_time()).unwrap();
        let zip = writer.finalize_to_vec().unwrap();

        let mut reader = ZipReader::from_slice(&zip).unwrap();
        assert_eq!(reader.file_count(), 4);
        let fox = reader.stat(0).unwrap();
        assert_eq!(fox.method, METHOD_DEFLATED);
        assert!(fox.compressed_size < fox.uncompressed_size);
        assert_eq!(fox.flags & flags::UTF8, flags::UTF8);
        assert_eq!(reader.extract_to_vec(0, ExtractFlags::new()).unwrap(), text);
        assert_eq!(reader.stat(1).unwrap().method, METHOD_STORED);
        assert!(reader.stat(3).unwrap().is_directory);
        assert_eq!(reader.stat(3).unwrap().external_attr, DOS_DIR_ATTRIBUTE);
        reader.validate_archive(false).unwrap();
    }

    #[test]
    fn test_add_mem_descriptor_only_for_data() {
        let mut writer = ZipWriter::new_heap(ZipWriterOptions::new()).unwrap();
        writer.add_mem("data", b"four", &fixed_time().level(0)).unwrap();
        writer.add_mem("empty", b"", &fixed_time()).unwrap();
        writer.add_mem("dir/", b"", &fixed_time()).unwrap();
        let zip = writer.finalize_to_vec().unwrap();

        let reader = ZipReader::from_slice(&zip).unwrap();
        let flag_of = |index| reader.stat(index).unwrap().flags & flags::DATA_DESCRIPTOR;
        assert_eq!(flag_of(0), flags::DATA_DESCRIPTOR);
        assert_eq!(flag_of(1), 0);
        assert_eq!(flag_of(2), 0);

        // The descriptor follows the stored bytes: signature, CRC, sizes.
        let local = LocalHeader::parse(zip[..LOCAL_HEADER_SIZE].try_into().unwrap()).unwrap();
        let desc = local.total_size() as usize + 4;
        assert_eq!(le32(&zip, desc), DATA_DESCRIPTOR_SIG);
        assert_eq!(le32(&zip, desc + 8), 4);
        assert_eq!(le32(&zip, desc + 12), 4);
    }

    #[test]
    fn test_tiny_entries_are_stored() {
        let mut writer = ZipWriter::new_heap(ZipWriterOptions::new()).unwrap();
        writer.add_mem("abc", b"abc", &fixed_time().level(9)).unwrap();
        let zip = writer.finalize_to_vec().unwrap();
        let reader = ZipReader::from_slice(&zip).unwrap();
        assert_eq!(reader.stat(0).unwrap().method, METHOD_STORED);
    }

    #[test]
    fn test_invalid_names_and_rollback() {
        let mut writer = ZipWriter::new_heap(ZipWriterOptions::new()).unwrap();
        writer.add_mem("ok", b"first entry", &fixed_time()).unwrap();
        let size = writer.archive_size();

        let err = writer.add_mem("/abs", b"x", &fixed_time()).unwrap_err();
        assert_eq!(err.kind(), ZipErrorKind::InvalidFilename);
        let err = writer.add_mem("dir/", b"data", &fixed_time()).unwrap_err();
        assert_eq!(err.kind(), ZipErrorKind::InvalidParameter);
        assert_eq!(writer.last_error(), ZipErrorKind::InvalidParameter);
        assert_eq!(writer.file_count(), 1);
        assert_eq!(writer.archive_size(), size);

        let err = writer
            .add_callback("failing", 100, |_, _| Err(io::Error::other("boom")), &fixed_time())
            .unwrap_err();
        assert_eq!(err.kind(), ZipErrorKind::FileReadFailed);
        assert_eq!(writer.file_count(), 1);

        writer.add_mem("second", b"after the failures", &fixed_time()).unwrap();
        let zip = writer.finalize_to_vec().unwrap();
        let mut reader = ZipReader::from_slice(&zip).unwrap();
        assert_eq!(reader.file_count(), 2);
        let second = reader.extract_file_to_vec("second", ExtractFlags::new()).unwrap();
        assert_eq!(second, b"after the failures");
    }

    #[test]
    fn test_alignment_and_reserve() {
        let options = ZipWriterOptions::new().alignment(64).reserve_bytes(10);
        let mut writer = ZipWriter::new_heap(options).unwrap();
        writer.add_mem("a", b"aaaaaaaaaaaa", &fixed_time()).unwrap();
        writer.add_mem("b", b"bbbbbbbbbbbb", &fixed_time()).unwrap();
        let zip = writer.finalize_to_vec().unwrap();
        let reader = ZipReader::from_slice(&zip).unwrap();
        for index in 0..2 {
            assert_eq!(reader.stat(index).unwrap().local_header_offset % 64, 0);
        }
        assert!(ZipWriter::new_heap(ZipWriterOptions::new().alignment(48)).is_err());
    }

    #[test]
    fn test_force_zip64_and_finalize_once() {
        let mut writer = ZipWriter::new_heap(ZipWriterOptions::new().force_zip64(true)).unwrap();
        writer.add_mem("z", b"zip64 archive body", &fixed_time()).unwrap();
        writer.finalize().unwrap();
        assert_eq!(writer.state(), WriterState::Finalized);
        assert_eq!(
            writer.add_mem("late", b"x", &fixed_time()).unwrap_err().kind(),
            ZipErrorKind::InvalidParameter
        );
        assert!(writer.finalize().is_err());

        let zip = writer.into_store().into_inner();
        let mut reader = ZipReader::from_slice(&zip).unwrap();
        assert!(reader.is_zip64());
        reader.validate_archive(false).unwrap();
    }

    #[test]
    fn test_precompressed_entry() {
        let text = b"precompressed payload, precompressed payload".to_vec();
        let deflated =
            pkflate_deflate::deflate::compress_to_vec(&text, CompressionLevel::BEST).unwrap();
        let options = fixed_time().precompressed(text.len() as u64, crc32(0, &text));
        let mut writer = ZipWriter::new_heap(ZipWriterOptions::new()).unwrap();
        writer.add_mem("pre", &deflated, &options).unwrap();
        let zip = writer.finalize_to_vec().unwrap();

        let mut reader = ZipReader::from_slice(&zip).unwrap();
        assert_eq!(reader.extract_to_vec(0, ExtractFlags::new()).unwrap(), text);
        let raw = reader.extract_to_vec(0, ExtractFlags::new().compressed_data(true)).unwrap();
        assert_eq!(raw, deflated);
    }
}
