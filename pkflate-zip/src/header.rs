//! ZIP wire structures.
//!
//! All multi-byte fields are little-endian. Sizes and offsets that do not
//! fit their 32-bit (or 16-bit) field are written as the all-ones sentinel
//! and carried in a ZIP64 extended information extra field instead.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Local file header signature.
pub const LOCAL_HEADER_SIG: u32 = 0x0403_4b50;
/// Central directory header signature.
pub const CENTRAL_HEADER_SIG: u32 = 0x0201_4b50;
/// End of central directory signature.
pub const END_OF_CENTRAL_DIR_SIG: u32 = 0x0605_4b50;
/// ZIP64 end of central directory signature.
pub const ZIP64_END_OF_CENTRAL_DIR_SIG: u32 = 0x0606_4b50;
/// ZIP64 end of central directory locator signature.
pub const ZIP64_LOCATOR_SIG: u32 = 0x0706_4b50;
/// Optional data descriptor signature.
pub const DATA_DESCRIPTOR_SIG: u32 = 0x0807_4b50;

/// Fixed part of a local header.
pub const LOCAL_HEADER_SIZE: usize = 30;
/// Fixed part of a central directory header.
pub const CENTRAL_HEADER_SIZE: usize = 46;
/// End of central directory record without comment.
pub const END_OF_CENTRAL_DIR_SIZE: usize = 22;
/// ZIP64 end of central directory record without extensible data.
pub const ZIP64_END_OF_CENTRAL_DIR_SIZE: usize = 56;
/// ZIP64 end of central directory locator.
pub const ZIP64_LOCATOR_SIZE: usize = 20;
/// Data descriptor with signature and 32-bit sizes.
pub const DATA_DESCRIPTOR_SIZE32: usize = 16;
/// Data descriptor with signature and 64-bit sizes.
pub const DATA_DESCRIPTOR_SIZE64: usize = 24;

/// Header id of the ZIP64 extended information extra field.
pub const ZIP64_EXTRA_ID: u16 = 0x0001;
/// Largest ZIP64 extra field this crate writes: header + three u64 + u32.
pub const ZIP64_MAX_EXTRA_SIZE: usize = 4 + 8 * 3 + 4;

/// 32-bit sentinel meaning "see the ZIP64 extra field".
pub const SENTINEL_32: u32 = u32::MAX;
/// 16-bit sentinel meaning "see the ZIP64 end record".
pub const SENTINEL_16: u16 = u16::MAX;

/// Compression method: stored.
pub const METHOD_STORED: u16 = 0;
/// Compression method: deflate.
pub const METHOD_DEFLATED: u16 = 8;

/// DOS directory attribute bit in the external attributes.
pub const DOS_DIR_ATTRIBUTE: u32 = 0x10;

/// General purpose flag bits.
pub mod flags {
    /// Entry is encrypted.
    pub const ENCRYPTED: u16 = 0x0001;
    /// Sizes and CRC follow the data in a descriptor.
    pub const DATA_DESCRIPTOR: u16 = 0x0008;
    /// Compressed patched data.
    pub const COMPRESSED_PATCH: u16 = 0x0020;
    /// Strong encryption.
    pub const STRONG_ENCRYPTION: u16 = 0x0040;
    /// Name and comment are UTF-8.
    pub const UTF8: u16 = 0x0800;
    /// Local header values are masked.
    pub const LOCAL_DIR_IS_MASKED: u16 = 0x2000;
}

#[inline]
pub(crate) fn le16(buf: &[u8], ofs: usize) -> u16 {
    u16::from_le_bytes([buf[ofs], buf[ofs + 1]])
}

#[inline]
pub(crate) fn le32(buf: &[u8], ofs: usize) -> u32 {
    u32::from_le_bytes([buf[ofs], buf[ofs + 1], buf[ofs + 2], buf[ofs + 3]])
}

#[inline]
pub(crate) fn le64(buf: &[u8], ofs: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&buf[ofs..ofs + 8]);
    u64::from_le_bytes(bytes)
}

#[inline]
pub(crate) fn put16(buf: &mut [u8], ofs: usize, value: u16) {
    buf[ofs..ofs + 2].copy_from_slice(&value.to_le_bytes());
}

#[inline]
pub(crate) fn put32(buf: &mut [u8], ofs: usize, value: u32) {
    buf[ofs..ofs + 4].copy_from_slice(&value.to_le_bytes());
}

#[inline]
pub(crate) fn put64(buf: &mut [u8], ofs: usize, value: u64) {
    buf[ofs..ofs + 8].copy_from_slice(&value.to_le_bytes());
}

/// Clamp a 64-bit value into a 32-bit field.
#[inline]
pub(crate) fn clamp32(value: u64) -> u32 {
    u32::try_from(value).unwrap_or(SENTINEL_32)
}

/// Fixed part of a local file header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LocalHeader {
    /// Version needed to extract.
    pub version_needed: u16,
    /// General purpose flags.
    pub flags: u16,
    /// Compression method.
    pub method: u16,
    /// DOS modification time and date.
    pub modified: DosDateTime,
    /// CRC-32 of the uncompressed data.
    pub crc32: u32,
    /// Compressed size (or sentinel).
    pub compressed_size: u32,
    /// Uncompressed size (or sentinel).
    pub uncompressed_size: u32,
    /// Length of the name that follows.
    pub name_len: u16,
    /// Length of the extra field that follows the name.
    pub extra_len: u16,
}

impl LocalHeader {
    /// Parse the fixed part. Returns `None` on a bad signature.
    pub fn parse(buf: &[u8; LOCAL_HEADER_SIZE]) -> Option<Self> {
        if le32(buf, 0) != LOCAL_HEADER_SIG {
            return None;
        }
        Some(Self {
            version_needed: le16(buf, 4),
            flags: le16(buf, 6),
            method: le16(buf, 8),
            modified: DosDateTime {
                time: le16(buf, 10),
                date: le16(buf, 12),
            },
            crc32: le32(buf, 14),
            compressed_size: le32(buf, 18),
            uncompressed_size: le32(buf, 22),
            name_len: le16(buf, 26),
            extra_len: le16(buf, 28),
        })
    }

    /// Serialize the fixed part.
    pub fn to_bytes(&self) -> [u8; LOCAL_HEADER_SIZE] {
        let mut buf = [0u8; LOCAL_HEADER_SIZE];
        put32(&mut buf, 0, LOCAL_HEADER_SIG);
        put16(&mut buf, 4, self.version_needed);
        put16(&mut buf, 6, self.flags);
        put16(&mut buf, 8, self.method);
        put16(&mut buf, 10, self.modified.time);
        put16(&mut buf, 12, self.modified.date);
        put32(&mut buf, 14, self.crc32);
        put32(&mut buf, 18, self.compressed_size);
        put32(&mut buf, 22, self.uncompressed_size);
        put16(&mut buf, 26, self.name_len);
        put16(&mut buf, 28, self.extra_len);
        buf
    }

    /// Bytes taken by the header, name and extra field.
    pub fn total_size(&self) -> u64 {
        LOCAL_HEADER_SIZE as u64 + u64::from(self.name_len) + u64::from(self.extra_len)
    }
}

/// Fixed part of a central directory header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CentralHeader {
    /// Version made by.
    pub version_made_by: u16,
    /// Version needed to extract.
    pub version_needed: u16,
    /// General purpose flags.
    pub flags: u16,
    /// Compression method.
    pub method: u16,
    /// DOS modification time and date.
    pub modified: DosDateTime,
    /// CRC-32 of the uncompressed data.
    pub crc32: u32,
    /// Compressed size (or sentinel).
    pub compressed_size: u32,
    /// Uncompressed size (or sentinel).
    pub uncompressed_size: u32,
    /// Name length.
    pub name_len: u16,
    /// Extra field length.
    pub extra_len: u16,
    /// Comment length.
    pub comment_len: u16,
    /// Disk on which the entry starts.
    pub disk_start: u16,
    /// Internal attributes.
    pub internal_attr: u16,
    /// External attributes (DOS attributes in the low byte).
    pub external_attr: u32,
    /// Offset of the local header (or sentinel).
    pub local_header_offset: u32,
}

impl CentralHeader {
    /// Parse the fixed part from the start of `buf`. Returns `None` if the
    /// buffer is short or the signature is wrong.
    pub fn parse(buf: &[u8]) -> Option<Self> {
        if buf.len() < CENTRAL_HEADER_SIZE || le32(buf, 0) != CENTRAL_HEADER_SIG {
            return None;
        }
        Some(Self {
            version_made_by: le16(buf, 4),
            version_needed: le16(buf, 6),
            flags: le16(buf, 8),
            method: le16(buf, 10),
            modified: DosDateTime {
                time: le16(buf, 12),
                date: le16(buf, 14),
            },
            crc32: le32(buf, 16),
            compressed_size: le32(buf, 20),
            uncompressed_size: le32(buf, 24),
            name_len: le16(buf, 28),
            extra_len: le16(buf, 30),
            comment_len: le16(buf, 32),
            disk_start: le16(buf, 34),
            internal_attr: le16(buf, 36),
            external_attr: le32(buf, 38),
            local_header_offset: le32(buf, 42),
        })
    }

    /// Serialize the fixed part.
    pub fn to_bytes(&self) -> [u8; CENTRAL_HEADER_SIZE] {
        let mut buf = [0u8; CENTRAL_HEADER_SIZE];
        put32(&mut buf, 0, CENTRAL_HEADER_SIG);
        put16(&mut buf, 4, self.version_made_by);
        put16(&mut buf, 6, self.version_needed);
        put16(&mut buf, 8, self.flags);
        put16(&mut buf, 10, self.method);
        put16(&mut buf, 12, self.modified.time);
        put16(&mut buf, 14, self.modified.date);
        put32(&mut buf, 16, self.crc32);
        put32(&mut buf, 20, self.compressed_size);
        put32(&mut buf, 24, self.uncompressed_size);
        put16(&mut buf, 28, self.name_len);
        put16(&mut buf, 30, self.extra_len);
        put16(&mut buf, 32, self.comment_len);
        put16(&mut buf, 34, self.disk_start);
        put16(&mut buf, 36, self.internal_attr);
        put32(&mut buf, 38, self.external_attr);
        put32(&mut buf, 42, self.local_header_offset);
        buf
    }

    /// Bytes taken by the header, name, extra field and comment.
    pub fn total_size(&self) -> usize {
        CENTRAL_HEADER_SIZE
            + usize::from(self.name_len)
            + usize::from(self.extra_len)
            + usize::from(self.comment_len)
    }
}

/// Classic end of central directory record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EndOfCentralDir {
    /// Number of this disk.
    pub disk_number: u16,
    /// Disk holding the start of the central directory.
    pub cdir_disk: u16,
    /// Entries on this disk.
    pub entries_on_disk: u16,
    /// Total entries.
    pub total_entries: u16,
    /// Central directory size.
    pub cdir_size: u32,
    /// Central directory offset.
    pub cdir_offset: u32,
    /// Archive comment length.
    pub comment_len: u16,
}

impl EndOfCentralDir {
    /// Parse from the start of `buf`.
    pub fn parse(buf: &[u8]) -> Option<Self> {
        if buf.len() < END_OF_CENTRAL_DIR_SIZE || le32(buf, 0) != END_OF_CENTRAL_DIR_SIG {
            return None;
        }
        Some(Self {
            disk_number: le16(buf, 4),
            cdir_disk: le16(buf, 6),
            entries_on_disk: le16(buf, 8),
            total_entries: le16(buf, 10),
            cdir_size: le32(buf, 12),
            cdir_offset: le32(buf, 16),
            comment_len: le16(buf, 20),
        })
    }

    /// Serialize without a comment.
    pub fn to_bytes(&self) -> [u8; END_OF_CENTRAL_DIR_SIZE] {
        let mut buf = [0u8; END_OF_CENTRAL_DIR_SIZE];
        put32(&mut buf, 0, END_OF_CENTRAL_DIR_SIG);
        put16(&mut buf, 4, self.disk_number);
        put16(&mut buf, 6, self.cdir_disk);
        put16(&mut buf, 8, self.entries_on_disk);
        put16(&mut buf, 10, self.total_entries);
        put32(&mut buf, 12, self.cdir_size);
        put32(&mut buf, 16, self.cdir_offset);
        put16(&mut buf, 20, self.comment_len);
        buf
    }
}

/// ZIP64 end of central directory record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Zip64EndOfCentralDir {
    /// Size of the remaining record (total size minus 12).
    pub record_size: u64,
    /// Version made by.
    pub version_made_by: u16,
    /// Version needed to extract.
    pub version_needed: u16,
    /// Number of this disk.
    pub disk_number: u32,
    /// Disk holding the start of the central directory.
    pub cdir_disk: u32,
    /// Entries on this disk.
    pub entries_on_disk: u64,
    /// Total entries.
    pub total_entries: u64,
    /// Central directory size.
    pub cdir_size: u64,
    /// Central directory offset.
    pub cdir_offset: u64,
}

impl Zip64EndOfCentralDir {
    /// Parse from the start of `buf`.
    pub fn parse(buf: &[u8]) -> Option<Self> {
        if buf.len() < ZIP64_END_OF_CENTRAL_DIR_SIZE || le32(buf, 0) != ZIP64_END_OF_CENTRAL_DIR_SIG
        {
            return None;
        }
        Some(Self {
            record_size: le64(buf, 4),
            version_made_by: le16(buf, 12),
            version_needed: le16(buf, 14),
            disk_number: le32(buf, 16),
            cdir_disk: le32(buf, 20),
            entries_on_disk: le64(buf, 24),
            total_entries: le64(buf, 32),
            cdir_size: le64(buf, 40),
            cdir_offset: le64(buf, 48),
        })
    }

    /// Serialize.
    pub fn to_bytes(&self) -> [u8; ZIP64_END_OF_CENTRAL_DIR_SIZE] {
        let mut buf = [0u8; ZIP64_END_OF_CENTRAL_DIR_SIZE];
        put32(&mut buf, 0, ZIP64_END_OF_CENTRAL_DIR_SIG);
        put64(&mut buf, 4, self.record_size);
        put16(&mut buf, 12, self.version_made_by);
        put16(&mut buf, 14, self.version_needed);
        put32(&mut buf, 16, self.disk_number);
        put32(&mut buf, 20, self.cdir_disk);
        put64(&mut buf, 24, self.entries_on_disk);
        put64(&mut buf, 32, self.total_entries);
        put64(&mut buf, 40, self.cdir_size);
        put64(&mut buf, 48, self.cdir_offset);
        buf
    }
}

/// ZIP64 end of central directory locator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Zip64Locator {
    /// Disk holding the ZIP64 end record.
    pub eocd64_disk: u32,
    /// Offset of the ZIP64 end record.
    pub eocd64_offset: u64,
    /// Total number of disks.
    pub total_disks: u32,
}

impl Zip64Locator {
    /// Parse from the start of `buf`.
    pub fn parse(buf: &[u8]) -> Option<Self> {
        if buf.len() < ZIP64_LOCATOR_SIZE || le32(buf, 0) != ZIP64_LOCATOR_SIG {
            return None;
        }
        Some(Self {
            eocd64_disk: le32(buf, 4),
            eocd64_offset: le64(buf, 8),
            total_disks: le32(buf, 16),
        })
    }

    /// Serialize.
    pub fn to_bytes(&self) -> [u8; ZIP64_LOCATOR_SIZE] {
        let mut buf = [0u8; ZIP64_LOCATOR_SIZE];
        put32(&mut buf, 0, ZIP64_LOCATOR_SIG);
        put32(&mut buf, 4, self.eocd64_disk);
        put64(&mut buf, 8, self.eocd64_offset);
        put32(&mut buf, 16, self.total_disks);
        buf
    }
}

/// Extra-field data was structurally broken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MalformedExtra;

/// Iterator over `(id, data)` records of an extra field.
pub struct ExtraFields<'a> {
    rest: &'a [u8],
}

impl<'a> ExtraFields<'a> {
    /// Walk the records of `extra`.
    pub fn new(extra: &'a [u8]) -> Self {
        Self { rest: extra }
    }
}

impl<'a> Iterator for ExtraFields<'a> {
    type Item = Result<(u16, &'a [u8]), MalformedExtra>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.rest.is_empty() {
            return None;
        }
        if self.rest.len() < 4 {
            self.rest = &[];
            return Some(Err(MalformedExtra));
        }
        let id = le16(self.rest, 0);
        let len = usize::from(le16(self.rest, 2));
        if 4 + len > self.rest.len() {
            self.rest = &[];
            return Some(Err(MalformedExtra));
        }
        let data = &self.rest[4..4 + len];
        self.rest = &self.rest[4 + len..];
        Some(Ok((id, data)))
    }
}

/// Find the ZIP64 extended information record in `extra`.
pub fn find_zip64_extra(extra: &[u8]) -> Result<Option<&[u8]>, MalformedExtra> {
    for field in ExtraFields::new(extra) {
        let (id, data) = field?;
        if id == ZIP64_EXTRA_ID {
            return Ok(Some(data));
        }
    }
    Ok(None)
}

/// Build a ZIP64 extended information record holding the given values in
/// the standard order.
pub fn zip64_extra_field(
    uncompressed_size: Option<u64>,
    compressed_size: Option<u64>,
    local_header_offset: Option<u64>,
) -> Vec<u8> {
    let mut field = Vec::with_capacity(ZIP64_MAX_EXTRA_SIZE);
    field.extend_from_slice(&ZIP64_EXTRA_ID.to_le_bytes());
    field.extend_from_slice(&0u16.to_le_bytes());
    for value in [uncompressed_size, compressed_size, local_header_offset]
        .into_iter()
        .flatten()
    {
        field.extend_from_slice(&value.to_le_bytes());
    }
    let len = (field.len() - 4) as u16;
    put16(&mut field, 2, len);
    field
}

/// Copy every extra record of `extra` except ZIP64 ones.
pub fn strip_zip64_extra(extra: &[u8]) -> Result<Vec<u8>, MalformedExtra> {
    let mut out = Vec::with_capacity(extra.len());
    for field in ExtraFields::new(extra) {
        let (id, data) = field?;
        if id != ZIP64_EXTRA_ID {
            out.extend_from_slice(&id.to_le_bytes());
            out.extend_from_slice(&(data.len() as u16).to_le_bytes());
            out.extend_from_slice(data);
        }
    }
    Ok(out)
}

/// MS-DOS packed date and time, two-second resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DosDateTime {
    /// Hour << 11 | minute << 5 | second / 2.
    pub time: u16,
    /// (year - 1980) << 9 | month << 5 | day.
    pub date: u16,
}

impl DosDateTime {
    /// Convert a timestamp, treating it as UTC. Times before 1980 clamp to
    /// 1980-01-01 00:00:00 and times after 2107 clamp to the last
    /// representable second.
    pub fn from_system_time(time: SystemTime) -> Self {
        let secs = time
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO)
            .as_secs();
        let days = (secs / 86_400) as i64;
        let tod = secs % 86_400;
        let (year, month, day) = civil_from_days(days);

        if year < 1980 {
            return Self {
                time: 0,
                date: (1 << 5) | 1,
            };
        }
        if year > 2107 {
            return Self {
                time: (23 << 11) | (59 << 5) | 29,
                date: (127 << 9) | (12 << 5) | 31,
            };
        }

        let hour = (tod / 3600) as u16;
        let minute = ((tod % 3600) / 60) as u16;
        let second = (tod % 60) as u16;
        Self {
            time: (hour << 11) | (minute << 5) | (second >> 1),
            date: (((year - 1980) as u16) << 9) | ((month as u16) << 5) | day as u16,
        }
    }

    /// Convert back to a timestamp, treating the fields as UTC. Returns
    /// `None` for out-of-range fields.
    pub fn to_system_time(self) -> Option<SystemTime> {
        let year = i64::from(self.date >> 9) + 1980;
        let month = u32::from((self.date >> 5) & 0x0F);
        let day = u32::from(self.date & 0x1F);
        let hour = u64::from(self.time >> 11);
        let minute = u64::from((self.time >> 5) & 0x3F);
        let second = u64::from(self.time & 0x1F) * 2;
        if !(1..=12).contains(&month) || day == 0 || hour > 23 || minute > 59 || second > 59 {
            return None;
        }

        let days = u64::try_from(days_from_civil(year, month, day)).ok()?;
        let secs = days * 86_400 + hour * 3600 + minute * 60 + second;
        Some(UNIX_EPOCH + Duration::from_secs(secs))
    }
}

// Howard Hinnant's days-from-civil algorithms on the proleptic Gregorian
// calendar.
fn civil_from_days(days: i64) -> (i64, u32, u32) {
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let month = if mp < 10 { mp + 3 } else { mp - 9 } as u32;
    let year = yoe + era * 400 + i64::from(month <= 2);
    (year, month, day)
}

fn days_from_civil(year: i64, month: u32, day: u32) -> i64 {
    let year = if month <= 2 { year - 1 } else { year };
    let era = year.div_euclid(400);
    let yoe = year.rem_euclid(400);
    let month = i64::from(month);
    let mp = if month > 2 { month - 3 } else { month + 9 };
    let doy = (153 * mp + 2) / 5 + i64::from(day) - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    era * 146_097 + doe - 719_468
}
