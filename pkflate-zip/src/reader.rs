//! ZIP archive reader.
//!
//! Opening an archive locates the end of central directory record, follows
//! the ZIP64 locator when present, and loads the whole central directory
//! into a [`CentralDirectory`] arena after checking every record. Entries
//! are then looked up by index or name and extracted through the inflater
//! into a slice, a vector, a callback, any writer or a file.

use crate::directory::CentralDirectory;
use crate::error::{Result, ZipError, ZipErrorKind};
use crate::header::{
    CENTRAL_HEADER_SIZE, CentralHeader, DATA_DESCRIPTOR_SIG, DOS_DIR_ATTRIBUTE, DosDateTime,
    END_OF_CENTRAL_DIR_SIG, END_OF_CENTRAL_DIR_SIZE, EndOfCentralDir, ExtraFields,
    LOCAL_HEADER_SIZE, LocalHeader, METHOD_DEFLATED, METHOD_STORED, SENTINEL_32,
    ZIP64_END_OF_CENTRAL_DIR_SIZE, ZIP64_EXTRA_ID, ZIP64_LOCATOR_SIZE, Zip64EndOfCentralDir,
    Zip64Locator, find_zip64_extra, flags, le32, le64,
};
use crate::store::{CallbackStore, FileStore, HeapStore, SliceStore, ZipStore, read_exact_at};
use log::{debug, warn};
use pkflate_core::checksum::Crc32;
use pkflate_deflate::inflate::{InflateStatus, Inflater, LZ_DICT_SIZE, inflate_flags};
use std::cell::Cell;
use std::fs::File;
use std::io::{self, Write};
use std::path::Path;
use std::time::SystemTime;

/// Chunk size for stored data and compressed input.
pub(crate) const MAX_IO_BUF_SIZE: usize = 64 * 1024;

/// Options applied when opening an archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZipReaderOptions {
    /// Build a name-sorted index for binary-search lookups.
    pub sort_central_dir: bool,
}

impl Default for ZipReaderOptions {
    fn default() -> Self {
        Self {
            sort_central_dir: true,
        }
    }
}

/// Flags for lookups and extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExtractFlags {
    /// Match names exactly instead of ignoring ASCII case.
    pub case_sensitive: bool,
    /// Match only the part of stored names after the last path separator.
    pub ignore_path: bool,
    /// Hand out the compressed bytes as stored, without inflating.
    pub compressed_data: bool,
    /// Skip the CRC-32 check.
    pub skip_crc: bool,
}

impl ExtractFlags {
    /// Default flags.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set case-sensitive name matching.
    pub fn case_sensitive(mut self, yes: bool) -> Self {
        self.case_sensitive = yes;
        self
    }

    /// Set path-insensitive name matching.
    pub fn ignore_path(mut self, yes: bool) -> Self {
        self.ignore_path = yes;
        self
    }

    /// Set raw passthrough of compressed data.
    pub fn compressed_data(mut self, yes: bool) -> Self {
        self.compressed_data = yes;
        self
    }

    /// Set CRC-32 verification skipping.
    pub fn skip_crc(mut self, yes: bool) -> Self {
        self.skip_crc = yes;
        self
    }
}

/// Metadata of one entry, with ZIP64 values already resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryStat {
    /// Entry index.
    pub index: usize,
    /// Offset of the record inside the central directory.
    pub central_dir_offset: u64,
    /// Version made by.
    pub version_made_by: u16,
    /// Version needed to extract.
    pub version_needed: u16,
    /// General purpose flags.
    pub flags: u16,
    /// Compression method.
    pub method: u16,
    /// DOS modification time.
    pub modified: DosDateTime,
    /// CRC-32 of the uncompressed data.
    pub crc32: u32,
    /// Compressed size.
    pub compressed_size: u64,
    /// Uncompressed size.
    pub uncompressed_size: u64,
    /// Internal attributes.
    pub internal_attr: u16,
    /// External attributes.
    pub external_attr: u32,
    /// Offset of the local header.
    pub local_header_offset: u64,
    /// Entry name (lossy UTF-8).
    pub name: String,
    /// Entry comment (lossy UTF-8).
    pub comment: String,
    /// Directory entry.
    pub is_directory: bool,
    /// Encrypted entry.
    pub is_encrypted: bool,
    /// Extractable by this crate.
    pub is_supported: bool,
}

impl EntryStat {
    /// Modification time, read as UTC.
    pub fn last_modified(&self) -> Option<SystemTime> {
        self.modified.to_system_time()
    }

    /// Method name for display.
    pub fn method_name(&self) -> &'static str {
        match self.method {
            METHOD_STORED => "stored",
            METHOD_DEFLATED => "deflate",
            _ => "unknown",
        }
    }
}

/// Reader over an archive held in a [`ZipStore`].
pub struct ZipReader<S: ZipStore> {
    store: S,
    base: u64,
    archive_size: u64,
    central_dir_offset: u64,
    dir: CentralDirectory,
    zip64: bool,
    has_zip64_extra: bool,
    last_error: Cell<ZipErrorKind>,
}

impl ZipReader<HeapStore> {
    /// Open an archive held in an owned buffer.
    pub fn from_vec(data: Vec<u8>) -> Result<Self> {
        Self::new(HeapStore::from_vec(data))
    }
}

impl<'a> ZipReader<SliceStore<'a>> {
    /// Open an archive held in a borrowed slice.
    pub fn from_slice(data: &'a [u8]) -> Result<Self> {
        Self::new(SliceStore::new(data))
    }
}

impl ZipReader<FileStore> {
    /// Open an archive file read-only.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let store =
            FileStore::open(path).map_err(|e| ZipError::io(ZipErrorKind::FileOpenFailed, e))?;
        Self::new(store)
    }

    /// Open an archive file for reading and later in-place appending.
    pub fn open_rw<P: AsRef<Path>>(path: P, options: ZipReaderOptions) -> Result<Self> {
        let store =
            FileStore::open_rw(path).map_err(|e| ZipError::io(ZipErrorKind::FileOpenFailed, e))?;
        Self::with_options(store, options)
    }

    /// Open an archive embedded in `file` at `start`. `size` of `None`
    /// extends the archive to the end of the file.
    pub fn from_file(file: File, start: u64, size: Option<u64>) -> Result<Self> {
        let store = FileStore::from_file(file, start, size, false)
            .map_err(|e| ZipError::io(ZipErrorKind::FileStatFailed, e))?;
        Self::new(store)
    }
}

impl<'a> ZipReader<CallbackStore<'a>> {
    /// Open an archive of `size` bytes served by `read(offset, buf)`.
    pub fn from_callbacks<R>(size: u64, read: R) -> Result<Self>
    where
        R: FnMut(u64, &mut [u8]) -> usize + 'a,
    {
        Self::new(CallbackStore::reader(size, read))
    }
}

impl<S: ZipStore> ZipReader<S> {
    /// Open the archive in `store` with default options.
    pub fn new(store: S) -> Result<Self> {
        Self::with_options(store, ZipReaderOptions::default())
    }

    /// Open the archive in `store`.
    pub fn with_options(store: S, options: ZipReaderOptions) -> Result<Self> {
        let archive_size = store.size();
        let mut reader = Self {
            store,
            base: 0,
            archive_size,
            central_dir_offset: 0,
            dir: CentralDirectory::new(),
            zip64: false,
            has_zip64_extra: false,
            last_error: Cell::new(ZipErrorKind::NoError),
        };
        reader.read_central_dir(options)?;
        Ok(reader)
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

    /// Number of entries.
    pub fn file_count(&self) -> usize {
        self.dir.len()
    }

    /// Archive size in bytes, excluding any leading prefix.
    pub fn archive_size(&self) -> u64 {
        self.archive_size
    }

    /// Length of data preceding the archive in its store, e.g. a
    /// self-extractor stub.
    pub fn archive_offset(&self) -> u64 {
        self.base
    }

    /// Offset of the central directory.
    pub fn central_dir_offset(&self) -> u64 {
        self.central_dir_offset
    }

    /// Whether the archive uses ZIP64 end records.
    pub fn is_zip64(&self) -> bool {
        self.zip64
    }

    /// Whether some entry carries a ZIP64 extra field in an archive
    /// without ZIP64 end records.
    pub fn has_zip64_extra(&self) -> bool {
        self.has_zip64_extra
    }

    /// The central directory arena.
    pub fn central_directory(&self) -> &CentralDirectory {
        &self.dir
    }

    /// Give back the store.
    pub fn into_store(self) -> S {
        self.store
    }

    pub(crate) fn into_parts(self) -> ReaderParts<S> {
        ReaderParts {
            store: self.store,
            base: self.base,
            central_dir_offset: self.central_dir_offset,
            dir: self.dir,
            zip64: self.zip64,
        }
    }

    fn read_exact(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        read_exact_at(&mut self.store, self.base + offset, buf)
            .map_err(|e| ZipError::io(ZipErrorKind::FileReadFailed, e))
    }

    /// Read raw archive bytes at an archive-relative offset.
    pub(crate) fn read_raw(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        self.read_exact(offset, buf)
    }

    fn read_central_dir(&mut self, options: ZipReaderOptions) -> Result<()> {
        let result = self.read_central_dir_inner(options);
        self.track(result)
    }

    fn locate_end_of_central_dir(&mut self) -> Result<u64> {
        let size = self.archive_size;
        let window = size.min(u64::from(u16::MAX) + END_OF_CENTRAL_DIR_SIZE as u64);
        let start = size - window;
        let mut tail = vec![0u8; window as usize];
        self.read_exact(start, &mut tail)?;

        let candidates = tail.len() + 1 - END_OF_CENTRAL_DIR_SIZE;
        tail.windows(4)
            .take(candidates)
            .rposition(|w| le32(w, 0) == END_OF_CENTRAL_DIR_SIG)
            .map(|pos| start + pos as u64)
            .ok_or_else(|| ZipErrorKind::FailedFindingCentralDir.into())
    }

    fn read_zip64_end(
        &mut self,
        eocd_ofs: u64,
    ) -> Result<Option<(Zip64Locator, Zip64EndOfCentralDir)>> {
        let records = (ZIP64_LOCATOR_SIZE + ZIP64_END_OF_CENTRAL_DIR_SIZE) as u64;
        if eocd_ofs < records {
            return Ok(None);
        }
        let mut buf = [0u8; ZIP64_LOCATOR_SIZE];
        self.read_exact(eocd_ofs - ZIP64_LOCATOR_SIZE as u64, &mut buf)?;
        let Some(locator) = Zip64Locator::parse(&buf) else {
            return Ok(None);
        };

        let mut record = [0u8; ZIP64_END_OF_CENTRAL_DIR_SIZE];
        self.read_exact(eocd_ofs - records, &mut record)?;
        if let Some(eocd64) = Zip64EndOfCentralDir::parse(&record) {
            return Ok(Some((locator, eocd64)));
        }

        // Not adjacent to the locator: trust the locator's own offset.
        let ofs = locator.eocd64_offset;
        if ofs > self.archive_size - ZIP64_END_OF_CENTRAL_DIR_SIZE as u64 {
            return Err(ZipError::new(
                ZipErrorKind::NotAnArchive,
                "ZIP64 end record offset out of range",
            ));
        }
        self.read_exact(ofs, &mut record)?;
        match Zip64EndOfCentralDir::parse(&record) {
            Some(eocd64) => Ok(Some((locator, eocd64))),
            None => Err(ZipError::new(
                ZipErrorKind::NotAnArchive,
                "bad ZIP64 end record signature",
            )),
        }
    }

    fn read_central_dir_inner(&mut self, options: ZipReaderOptions) -> Result<()> {
        if self.archive_size < END_OF_CENTRAL_DIR_SIZE as u64 {
            return Err(ZipErrorKind::NotAnArchive.into());
        }
        let eocd_ofs = self.locate_end_of_central_dir()?;
        let mut buf = [0u8; END_OF_CENTRAL_DIR_SIZE];
        self.read_exact(eocd_ofs, &mut buf)?;
        let eocd = EndOfCentralDir::parse(&buf).ok_or(ZipErrorKind::NotAnArchive)?;

        let mut total_files = u64::from(eocd.total_entries);
        let mut entries_on_disk = u64::from(eocd.entries_on_disk);
        let mut disk_number = u32::from(eocd.disk_number);
        let mut cdir_disk = u32::from(eocd.cdir_disk);
        let mut cdir_size = u64::from(eocd.cdir_size);
        let mut cdir_ofs = u64::from(eocd.cdir_offset);

        if let Some((locator, eocd64)) = self.read_zip64_end(eocd_ofs)? {
            self.zip64 = true;
            if eocd64.record_size < (ZIP64_END_OF_CENTRAL_DIR_SIZE - 12) as u64 {
                return Err(ZipError::corrupted("ZIP64 end record too small"));
            }
            if locator.total_disks != 1 {
                return Err(ZipErrorKind::UnsupportedMultidisk.into());
            }
            if eocd64.total_entries > u64::from(u32::MAX)
                || eocd64.entries_on_disk > u64::from(u32::MAX)
            {
                return Err(ZipErrorKind::TooManyFiles.into());
            }
            if eocd64.cdir_size > u64::from(u32::MAX) {
                return Err(ZipErrorKind::UnsupportedCdirSize.into());
            }
            total_files = eocd64.total_entries;
            entries_on_disk = eocd64.entries_on_disk;
            cdir_size = eocd64.cdir_size;
            disk_number = eocd64.disk_number;
            cdir_disk = eocd64.cdir_disk;
            cdir_ofs = eocd64.cdir_offset;
        }

        if total_files != entries_on_disk {
            return Err(ZipErrorKind::UnsupportedMultidisk.into());
        }
        if (disk_number | cdir_disk) != 0 && (disk_number != 1 || cdir_disk != 1) {
            return Err(ZipErrorKind::UnsupportedMultidisk.into());
        }
        if cdir_size < total_files * CENTRAL_HEADER_SIZE as u64 {
            return Err(ZipError::corrupted("central directory smaller than its entry count"));
        }
        let cdir_end = cdir_ofs
            .checked_add(cdir_size)
            .ok_or_else(|| ZipError::corrupted("central directory offset overflows"))?;
        if cdir_end > self.archive_size || eocd_ofs < cdir_end {
            return Err(ZipError::corrupted("central directory out of bounds"));
        }

        let mut prefix = eocd_ofs - cdir_end;
        if self.zip64 {
            let records = (ZIP64_END_OF_CENTRAL_DIR_SIZE + ZIP64_LOCATOR_SIZE) as u64;
            if prefix < records {
                return Err(ZipError::corrupted("ZIP64 end records overlap the directory"));
            }
            prefix -= records;
        }
        if prefix > 0 {
            warn!("archive starts {prefix} bytes into its store");
            self.base = prefix;
            self.archive_size -= prefix;
        }
        self.central_dir_offset = cdir_ofs;

        debug!(
            "central directory at {cdir_ofs}: {total_files} entries, {cdir_size} bytes, zip64={}",
            self.zip64
        );

        if total_files > 0 {
            let mut data = vec![0u8; cdir_size as usize];
            self.read_exact(cdir_ofs, &mut data)?;
            let offsets = self.index_records(&data, total_files as usize, disk_number)?;
            self.dir = CentralDirectory::from_parts(data, offsets);
        }
        if options.sort_central_dir {
            self.dir.sort_by_name();
        }
        Ok(())
    }

    fn index_records(&mut self, data: &[u8], count: usize, disk_number: u32) -> Result<Vec<u32>> {
        let mut offsets = Vec::with_capacity(count);
        let mut pos = 0usize;
        for _ in 0..count {
            let rest = &data[pos..];
            let header = CentralHeader::parse(rest)
                .ok_or_else(|| ZipError::corrupted("bad central header"))?;
            offsets.push(pos as u32);

            let comp = header.compressed_size;
            let uncomp = header.uncompressed_size;
            let local = header.local_header_offset;
            let name_len = usize::from(header.name_len);
            let extra_len = usize::from(header.extra_len);

            let total = header.total_size();
            if total > rest.len() {
                return Err(ZipError::corrupted("central header past directory end"));
            }
            let extra_start = CENTRAL_HEADER_SIZE + name_len;
            let extra = &rest[extra_start..extra_start + extra_len];

            let has_sentinel = comp.max(uncomp).max(local) == SENTINEL_32;
            if !self.has_zip64_extra && extra_len > 0 && has_sentinel {
                let found = find_zip64_extra(extra)
                    .map_err(|_| ZipError::corrupted("malformed extra field"))?;
                if found.is_some() && !self.zip64 {
                    warn!("ZIP64 extra field in an archive without ZIP64 end records");
                    self.has_zip64_extra = true;
                }
            }

            let disk = header.disk_start;
            if disk == u16::MAX || (u32::from(disk) != disk_number && disk != 1) {
                return Err(ZipErrorKind::UnsupportedMultidisk.into());
            }

            let (uncomp_size, comp_size, local_ofs) = resolve_sizes(&header, extra)?;
            let stored_mismatch = header.method == METHOD_STORED && uncomp_size != comp_size;
            if stored_mismatch || (uncomp_size > 0 && comp_size == 0) {
                return Err(ZipError::corrupted("inconsistent entry sizes"));
            }
            self.check_data_bounds(local_ofs, LOCAL_HEADER_SIZE as u64, comp_size)?;

            if header.flags & flags::LOCAL_DIR_IS_MASKED != 0 {
                return Err(ZipErrorKind::UnsupportedEncryption.into());
            }

            pos += total;
        }
        Ok(offsets)
    }

    /// Entry data of `size` bytes starting `header_len` bytes past
    /// `local_ofs` must end inside the archive.
    fn check_data_bounds(&self, local_ofs: u64, header_len: u64, size: u64) -> Result<u64> {
        local_ofs
            .checked_add(header_len)
            .and_then(|data_ofs| data_ofs.checked_add(size))
            .filter(|&end| end <= self.archive_size)
            .ok_or_else(|| ZipError::corrupted("entry data past archive end"))
    }

    fn record(&self, index: usize) -> Result<&[u8]> {
        self.dir.record(index).ok_or_else(|| {
            ZipError::invalid_parameter(format!("entry index {index} out of range"))
        })
    }

    /// Raw central directory record of an entry.
    pub(crate) fn raw_record(&self, index: usize) -> Result<&[u8]> {
        self.record(index)
    }

    fn stat_inner(&self, index: usize) -> Result<EntryStat> {
        let record = self.record(index)?;
        let header = CentralHeader::parse(record)
            .ok_or_else(|| ZipError::new(ZipErrorKind::InternalError, "bad stored record"))?;
        let name = self.dir.name(index).unwrap_or_default();
        let extra = self.dir.extra(index).unwrap_or_default();
        let comment = self.dir.comment(index).unwrap_or_default();

        let (uncompressed_size, compressed_size, local_header_offset) =
            resolve_sizes(&header, extra)?;

        let is_directory =
            name.last() == Some(&b'/') || header.external_attr & DOS_DIR_ATTRIBUTE != 0;
        let is_encrypted = header.flags & flags::ENCRYPTED != 0;
        let is_supported = matches!(header.method, METHOD_STORED | METHOD_DEFLATED)
            && header.flags
                & (flags::ENCRYPTED | flags::STRONG_ENCRYPTION | flags::COMPRESSED_PATCH)
                == 0;

        Ok(EntryStat {
            index,
            central_dir_offset: self.record_offset(index),
            version_made_by: header.version_made_by,
            version_needed: header.version_needed,
            flags: header.flags,
            method: header.method,
            modified: header.modified,
            crc32: header.crc32,
            compressed_size,
            uncompressed_size,
            internal_attr: header.internal_attr,
            external_attr: header.external_attr,
            local_header_offset,
            name: String::from_utf8_lossy(name).into_owned(),
            comment: String::from_utf8_lossy(comment).into_owned(),
            is_directory,
            is_encrypted,
            is_supported,
        })
    }

    fn record_offset(&self, index: usize) -> u64 {
        let raw = self.dir.raw().as_ptr() as usize;
        self.dir
            .record(index)
            .map_or(0, |record| (record.as_ptr() as usize - raw) as u64)
    }

    /// Metadata of entry `index`.
    pub fn stat(&self, index: usize) -> Result<EntryStat> {
        let result = self.stat_inner(index);
        self.track(result)
    }

    /// Name of entry `index`.
    pub fn name(&self, index: usize) -> Result<String> {
        let result = self.record(index).map(|_| {
            String::from_utf8_lossy(self.dir.name(index).unwrap_or_default()).into_owned()
        });
        self.track(result)
    }

    /// Comment of entry `index`.
    pub fn comment(&self, index: usize) -> Result<String> {
        let result = self.record(index).map(|_| {
            String::from_utf8_lossy(self.dir.comment(index).unwrap_or_default()).into_owned()
        });
        self.track(result)
    }

    /// Whether entry `index` is a directory.
    pub fn is_directory(&self, index: usize) -> Result<bool> {
        self.stat(index).map(|stat| stat.is_directory)
    }

    /// Whether entry `index` is encrypted.
    pub fn is_encrypted(&self, index: usize) -> Result<bool> {
        self.stat(index).map(|stat| stat.is_encrypted)
    }

    /// Whether entry `index` can be extracted by this crate.
    pub fn is_supported(&self, index: usize) -> Result<bool> {
        self.stat(index).map(|stat| stat.is_supported)
    }

    /// Find the index of the entry called `name`.
    ///
    /// Uses the sorted index when it exists and the lookup is neither
    /// case-sensitive nor path-insensitive; otherwise scans every record.
    pub fn locate(&self, name: &str, flags: ExtractFlags) -> Result<usize> {
        let result = self.locate_inner(name.as_bytes(), flags);
        self.track(result)
    }

    fn locate_inner(&self, name: &[u8], flags: ExtractFlags) -> Result<usize> {
        if name.len() > usize::from(u16::MAX) {
            return Err(ZipError::invalid_parameter("name longer than 65535 bytes"));
        }
        if !flags.ignore_path && !flags.case_sensitive && self.dir.is_sorted() {
            return self
                .dir
                .binary_search(name)
                .ok_or_else(|| ZipErrorKind::FileNotFound.into());
        }

        (0..self.dir.len())
            .find(|&index| {
                let mut stored = self.dir.name(index).unwrap_or_default();
                if flags.ignore_path {
                    let separator = |&b: &u8| matches!(b, b'/' | b'\\' | b':');
                    if let Some(pos) = stored.iter().rposition(separator) {
                        stored = &stored[pos + 1..];
                    }
                }
                if flags.case_sensitive {
                    stored == name
                } else {
                    stored.eq_ignore_ascii_case(name)
                }
            })
            .ok_or_else(|| ZipErrorKind::FileNotFound.into())
    }

    fn check_extractable(stat: &EntryStat, flags: ExtractFlags) -> Result<()> {
        if stat.flags & (flags::ENCRYPTED | flags::STRONG_ENCRYPTION | flags::COMPRESSED_PATCH) != 0
        {
            return Err(ZipErrorKind::UnsupportedEncryption.into());
        }
        if !flags.compressed_data && !matches!(stat.method, METHOD_STORED | METHOD_DEFLATED) {
            return Err(ZipErrorKind::UnsupportedMethod.into());
        }
        Ok(())
    }

    /// Read the local header of an entry. Returns the header and its extra
    /// field, after checking that the entry data fits the archive.
    pub(crate) fn read_local_header(&mut self, stat: &EntryStat) -> Result<(LocalHeader, Vec<u8>)> {
        let mut buf = [0u8; LOCAL_HEADER_SIZE];
        self.read_exact(stat.local_header_offset, &mut buf)?;
        let local =
            LocalHeader::parse(&buf).ok_or_else(|| ZipError::corrupted("bad local header"))?;
        let header_len = local.total_size();
        self.check_data_bounds(stat.local_header_offset, header_len, stat.compressed_size)?;
        let mut extra = vec![0u8; usize::from(local.extra_len)];
        self.read_exact(
            stat.local_header_offset + LOCAL_HEADER_SIZE as u64 + u64::from(local.name_len),
            &mut extra,
        )?;
        Ok((local, extra))
    }

    fn extract_with(
        &mut self,
        index: usize,
        flags: ExtractFlags,
        sink: &mut dyn FnMut(&[u8]) -> Result<()>,
    ) -> Result<()> {
        let stat = self.stat_inner(index)?;
        if stat.is_directory || stat.compressed_size == 0 {
            return Ok(());
        }
        Self::check_extractable(&stat, flags)?;
        let (local, _) = self.read_local_header(&stat)?;
        let data_ofs = stat.local_header_offset + local.total_size();

        if flags.compressed_data || stat.method == METHOD_STORED {
            return self.copy_stored(&stat, data_ofs, flags, sink);
        }
        self.inflate_entry(&stat, data_ofs, flags, sink)
    }

    fn copy_stored(
        &mut self,
        stat: &EntryStat,
        data_ofs: u64,
        flags: ExtractFlags,
        sink: &mut dyn FnMut(&[u8]) -> Result<()>,
    ) -> Result<()> {
        let verify = !flags.compressed_data && !flags.skip_crc;
        let mut crc = Crc32::new();
        let mut buf = vec![0u8; (stat.compressed_size as usize).min(MAX_IO_BUF_SIZE)];
        let mut ofs = data_ofs;
        let mut remaining = stat.compressed_size;
        while remaining > 0 {
            let n = buf.len().min(remaining as usize);
            self.read_exact(ofs, &mut buf[..n])?;
            if verify {
                crc.update(&buf[..n]);
            }
            sink(&buf[..n])?;
            ofs += n as u64;
            remaining -= n as u64;
        }
        if verify && crc.value() != stat.crc32 {
            return Err(ZipErrorKind::CrcCheckFailed.into());
        }
        Ok(())
    }

    fn inflate_entry(
        &mut self,
        stat: &EntryStat,
        data_ofs: u64,
        flags: ExtractFlags,
        sink: &mut dyn FnMut(&[u8]) -> Result<()>,
    ) -> Result<()> {
        let mut inflater = Inflater::new();
        let mut dict = vec![0u8; LZ_DICT_SIZE];
        let mut input = vec![0u8; (stat.compressed_size as usize).min(MAX_IO_BUF_SIZE)];
        let (mut in_pos, mut in_len) = (0usize, 0usize);
        let mut read_ofs = data_ofs;
        let mut comp_remaining = stat.compressed_size;
        let mut dict_ofs = 0usize;
        let mut produced = 0u64;
        let mut crc = Crc32::new();

        loop {
            if in_pos == in_len && comp_remaining > 0 {
                in_len = input.len().min(comp_remaining as usize);
                self.read_exact(read_ofs, &mut input[..in_len])?;
                in_pos = 0;
                read_ofs += in_len as u64;
                comp_remaining -= in_len as u64;
            }
            let more = if comp_remaining > 0 {
                inflate_flags::HAS_MORE_INPUT
            } else {
                0
            };
            let (status, consumed, out) =
                inflater.decompress(&input[in_pos..in_len], &mut dict, dict_ofs, more);
            in_pos += consumed;

            if out > 0 {
                produced += out as u64;
                if produced > stat.uncompressed_size {
                    return Err(ZipErrorKind::DecompressionFailed.into());
                }
                let chunk = &dict[dict_ofs..dict_ofs + out];
                crc.update(chunk);
                sink(chunk)?;
                dict_ofs = (dict_ofs + out) & (LZ_DICT_SIZE - 1);
            }

            match status {
                InflateStatus::Done => break,
                InflateStatus::NeedsMoreInput | InflateStatus::HasMoreOutput => {}
                _ => return Err(ZipErrorKind::DecompressionFailed.into()),
            }
        }

        if produced != stat.uncompressed_size {
            return Err(ZipErrorKind::UnexpectedDecompressedSize.into());
        }
        if !flags.skip_crc && crc.value() != stat.crc32 {
            return Err(ZipErrorKind::CrcCheckFailed.into());
        }
        Ok(())
    }

    fn output_size(stat: &EntryStat, flags: ExtractFlags) -> u64 {
        if flags.compressed_data {
            stat.compressed_size
        } else {
            stat.uncompressed_size
        }
    }

    /// Extract entry `index` into `buf`. Returns the number of bytes
    /// written.
    pub fn extract_to_slice(
        &mut self,
        index: usize,
        buf: &mut [u8],
        flags: ExtractFlags,
    ) -> Result<usize> {
        let result = self.extract_to_slice_inner(index, buf, flags);
        self.track(result)
    }

    fn extract_to_slice_inner(
        &mut self,
        index: usize,
        buf: &mut [u8],
        flags: ExtractFlags,
    ) -> Result<usize> {
        let stat = self.stat_inner(index)?;
        let needed = Self::output_size(&stat, flags);
        if needed > buf.len() as u64 {
            return Err(ZipError::new(
                ZipErrorKind::BufTooSmall,
                format!("entry needs {needed} bytes, buffer holds {}", buf.len()),
            ));
        }
        let mut written = 0usize;
        self.extract_with(index, flags, &mut |chunk| {
            let end = written + chunk.len();
            let dst = buf
                .get_mut(written..end)
                .ok_or(ZipErrorKind::BufTooSmall)?;
            dst.copy_from_slice(chunk);
            written = end;
            Ok(())
        })?;
        Ok(written)
    }

    /// Extract entry `index` into a new vector.
    pub fn extract_to_vec(&mut self, index: usize, flags: ExtractFlags) -> Result<Vec<u8>> {
        let result = self.extract_to_vec_inner(index, flags);
        self.track(result)
    }

    fn extract_to_vec_inner(&mut self, index: usize, flags: ExtractFlags) -> Result<Vec<u8>> {
        let stat = self.stat_inner(index)?;
        let needed = usize::try_from(Self::output_size(&stat, flags))
            .map_err(|_| ZipError::new(ZipErrorKind::AllocFailed, "entry exceeds address space"))?;
        // Start small and let the vector double; declared sizes are untrusted.
        let mut out = Vec::new();
        out.try_reserve(needed.min(MAX_IO_BUF_SIZE))
            .map_err(|_| ZipError::from(ZipErrorKind::AllocFailed))?;
        self.extract_with(index, flags, &mut |chunk| {
            out.try_reserve(chunk.len())
                .map_err(|_| ZipError::from(ZipErrorKind::AllocFailed))?;
            out.extend_from_slice(chunk);
            Ok(())
        })?;
        Ok(out)
    }

    /// Extract entry `index` through `callback(offset, chunk)`, which
    /// returns how many bytes it accepted. A short count fails the
    /// extraction with [`ZipErrorKind::WriteCallbackFailed`].
    pub fn extract_to_callback<F>(
        &mut self,
        index: usize,
        flags: ExtractFlags,
        mut callback: F,
    ) -> Result<()>
    where
        F: FnMut(u64, &[u8]) -> usize,
    {
        let mut offset = 0u64;
        let result = self.extract_with(index, flags, &mut |chunk| {
            if callback(offset, chunk) != chunk.len() {
                return Err(ZipErrorKind::WriteCallbackFailed.into());
            }
            offset += chunk.len() as u64;
            Ok(())
        });
        self.track(result)
    }

    /// Extract entry `index` into `writer`. Returns the number of bytes
    /// written.
    pub fn extract_to_writer<W: Write>(
        &mut self,
        index: usize,
        mut writer: W,
        flags: ExtractFlags,
    ) -> Result<u64> {
        let mut written = 0u64;
        let result = self.extract_with(index, flags, &mut |chunk| {
            writer
                .write_all(chunk)
                .map_err(|e| ZipError::io(ZipErrorKind::FileWriteFailed, e))?;
            written += chunk.len() as u64;
            Ok(())
        });
        self.track(result.map(|()| written))
    }

    /// Extract entry `index` into a new file at `path` and stamp it with
    /// the entry's modification time.
    pub fn extract_to_file<P: AsRef<Path>>(
        &mut self,
        index: usize,
        path: P,
        flags: ExtractFlags,
    ) -> Result<()> {
        let result = self.extract_to_file_inner(index, path.as_ref(), flags);
        self.track(result)
    }

    fn extract_to_file_inner(
        &mut self,
        index: usize,
        path: &Path,
        flags: ExtractFlags,
    ) -> Result<()> {
        let stat = self.stat_inner(index)?;
        let file = File::create(path).map_err(|e| ZipError::io(ZipErrorKind::FileCreateFailed, e))?;
        let mut writer = io::BufWriter::new(file);
        self.extract_with(index, flags, &mut |chunk| {
            writer
                .write_all(chunk)
                .map_err(|e| ZipError::io(ZipErrorKind::FileWriteFailed, e))
        })?;
        writer
            .into_inner()
            .map_err(|e| ZipError::io(ZipErrorKind::FileCloseFailed, e.into_error()))?
            .sync_all()
            .map_err(|e| ZipError::io(ZipErrorKind::FileCloseFailed, e))?;

        if let Some(mtime) = stat.last_modified() {
            let mtime = filetime::FileTime::from_system_time(mtime);
            if let Err(e) = filetime::set_file_mtime(path, mtime) {
                warn!("could not set modification time of {}: {e}", path.display());
            }
        }
        Ok(())
    }

    /// Extract the entry called `name` into `buf`.
    pub fn extract_file_to_slice(
        &mut self,
        name: &str,
        buf: &mut [u8],
        flags: ExtractFlags,
    ) -> Result<usize> {
        let index = self.locate(name, flags)?;
        self.extract_to_slice(index, buf, flags)
    }

    /// Extract the entry called `name` into a new vector.
    pub fn extract_file_to_vec(&mut self, name: &str, flags: ExtractFlags) -> Result<Vec<u8>> {
        let index = self.locate(name, flags)?;
        self.extract_to_vec(index, flags)
    }

    /// Extract the entry called `name` through a callback.
    pub fn extract_file_to_callback<F>(
        &mut self,
        name: &str,
        flags: ExtractFlags,
        callback: F,
    ) -> Result<()>
    where
        F: FnMut(u64, &[u8]) -> usize,
    {
        let index = self.locate(name, flags)?;
        self.extract_to_callback(index, flags, callback)
    }

    /// Extract the entry called `name` into `writer`.
    pub fn extract_file_to_writer<W: Write>(
        &mut self,
        name: &str,
        writer: W,
        flags: ExtractFlags,
    ) -> Result<u64> {
        let index = self.locate(name, flags)?;
        self.extract_to_writer(index, writer, flags)
    }

    /// Extract the entry called `name` into a file at `path`.
    pub fn extract_file_to_file<P: AsRef<Path>>(
        &mut self,
        name: &str,
        path: P,
        flags: ExtractFlags,
    ) -> Result<()> {
        let index = self.locate(name, flags)?;
        self.extract_to_file(index, path, flags)
    }

    /// Check the local header of entry `index` against its central record
    /// and, unless `headers_only` is set, decompress it and verify the
    /// CRC-32.
    pub fn validate_entry(&mut self, index: usize, headers_only: bool) -> Result<()> {
        let result = self.validate_entry_inner(index, headers_only);
        self.track(result)
    }

    fn validate_entry_inner(&mut self, index: usize, headers_only: bool) -> Result<()> {
        let stat = self.stat_inner(index)?;
        if stat.is_directory || stat.uncompressed_size == 0 {
            return Ok(());
        }
        if stat.is_encrypted {
            return Err(ZipErrorKind::UnsupportedEncryption.into());
        }
        if !matches!(stat.method, METHOD_STORED | METHOD_DEFLATED) {
            return Err(ZipErrorKind::UnsupportedMethod.into());
        }
        if !stat.is_supported {
            return Err(ZipErrorKind::UnsupportedFeature.into());
        }

        let (local, extra) = self.read_local_header(&stat)?;
        let central_name = self.dir.name(index).unwrap_or_default().to_vec();
        if usize::from(local.name_len) != central_name.len() {
            return Err(ZipError::corrupted("local name length differs from central record"));
        }
        let mut local_name = vec![0u8; central_name.len()];
        self.read_exact(stat.local_header_offset + LOCAL_HEADER_SIZE as u64, &mut local_name)?;
        if local_name != central_name {
            return Err(ZipError::new(ZipErrorKind::ValidationFailed, "local name differs"));
        }

        let mut local_comp = u64::from(local.compressed_size);
        let mut local_uncomp = u64::from(local.uncompressed_size);
        let mut local_zip64 = false;
        for field in ExtraFields::new(&extra) {
            let (id, data) = field.map_err(|_| ZipError::corrupted("malformed local extra field"))?;
            if id != ZIP64_EXTRA_ID {
                continue;
            }
            local_zip64 = true;
            if local.compressed_size == SENTINEL_32 || local.uncompressed_size == SENTINEL_32 {
                if data.len() < 16 {
                    return Err(ZipError::corrupted("local ZIP64 extra field too short"));
                }
                local_uncomp = le64(data, 0);
                local_comp = le64(data, 8);
            }
            break;
        }

        let deferred = local.compressed_size == 0 && local.crc32 == 0;
        if local.flags & flags::DATA_DESCRIPTOR != 0 && deferred {
            let wide = local_zip64;
            let mut desc = [0u8; 24];
            let len = if wide { 24 } else { 16 };
            let desc_ofs = self.check_data_bounds(
                stat.local_header_offset,
                local.total_size(),
                stat.compressed_size,
            )?;
            self.read_exact(desc_ofs, &mut desc[..len])?;
            let p = if le32(&desc, 0) == DATA_DESCRIPTOR_SIG { 4 } else { 0 };
            let crc = le32(&desc, p);
            let (comp, uncomp) = if wide {
                (le64(&desc, p + 4), le64(&desc, p + 12))
            } else {
                (u64::from(le32(&desc, p + 4)), u64::from(le32(&desc, p + 8)))
            };
            if crc != stat.crc32 || comp != stat.compressed_size || uncomp != stat.uncompressed_size
            {
                return Err(ZipError::new(
                    ZipErrorKind::ValidationFailed,
                    "data descriptor differs from central record",
                ));
            }
        } else if local.crc32 != stat.crc32
            || local_comp != stat.compressed_size
            || local_uncomp != stat.uncompressed_size
        {
            return Err(ZipError::new(
                ZipErrorKind::ValidationFailed,
                "local header differs from central record",
            ));
        }

        if !headers_only {
            self.extract_with(index, ExtractFlags::default(), &mut |_| Ok(()))?;
        }
        Ok(())
    }

    /// Validate every entry. Also rejects archives whose entry count or
    /// size overflow the classic format without ZIP64 records.
    pub fn validate_archive(&mut self, headers_only: bool) -> Result<()> {
        let result = self.validate_archive_inner(headers_only);
        self.track(result)
    }

    fn validate_archive_inner(&mut self, headers_only: bool) -> Result<()> {
        if self.zip64 {
            if self.dir.byte_len() as u64 >= u64::from(u32::MAX) {
                return Err(ZipErrorKind::ArchiveTooLarge.into());
            }
        } else if self.dir.len() > usize::from(u16::MAX)
            || self.archive_size > u64::from(u32::MAX)
        {
            return Err(ZipErrorKind::ArchiveTooLarge.into());
        }
        for index in 0..self.dir.len() {
            self.validate_entry_inner(index, headers_only)?;
        }
        Ok(())
    }
}

/// Pieces of a reader handed to a writer for in-place appending.
pub(crate) struct ReaderParts<S> {
    pub(crate) store: S,
    pub(crate) base: u64,
    pub(crate) central_dir_offset: u64,
    pub(crate) dir: CentralDirectory,
    pub(crate) zip64: bool,
}

/// Open `data` as an archive and validate every entry.
pub fn validate_memory(data: &[u8], headers_only: bool) -> Result<()> {
    ZipReader::from_slice(data)?.validate_archive(headers_only)
}

/// Open the archive at `path` and validate every entry.
pub fn validate_file<P: AsRef<Path>>(path: P, headers_only: bool) -> Result<()> {
    ZipReader::open(path)?.validate_archive(headers_only)
}

/// Resolve a central record's uncompressed size, compressed size and local
/// header offset. Each field holding the 32-bit sentinel takes the next value
/// of the ZIP64 extra field.
fn resolve_sizes(header: &CentralHeader, extra: &[u8]) -> Result<(u64, u64, u64)> {
    let raw = [
        header.uncompressed_size,
        header.compressed_size,
        header.local_header_offset,
    ];
    let mut values = raw.map(u64::from);
    if !raw.contains(&SENTINEL_32) {
        let [uncomp, comp, local] = values;
        return Ok((uncomp, comp, local));
    }

    let mut field = find_zip64_extra(extra)
        .map_err(|_| ZipError::corrupted("malformed extra field"))?
        .ok_or_else(|| ZipError::corrupted("missing ZIP64 extra field"))?;
    for (raw, value) in raw.iter().zip(values.iter_mut()) {
        if *raw != SENTINEL_32 {
            continue;
        }
        if field.len() < 8 {
            return Err(ZipError::corrupted("ZIP64 extra field too short"));
        }
        *value = le64(field, 0);
        field = &field[8..];
    }
    let [uncomp, comp, local] = values;
    Ok((uncomp, comp, local))
}
