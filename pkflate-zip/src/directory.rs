//! Central directory arena.
//!
//! Raw central directory records are kept back to back in one byte buffer,
//! with a parallel array of record offsets and an optional index array
//! sorted by name. Records are bulk-loaded once on open and then only
//! appended to, so nothing points into the buffer but plain offsets.

use crate::header::{CENTRAL_HEADER_SIZE, le16};
use std::cmp::Ordering;

/// Arena of central directory records.
#[derive(Debug, Clone, Default)]
pub struct CentralDirectory {
    data: Vec<u8>,
    offsets: Vec<u32>,
    sorted: Vec<u32>,
}

impl CentralDirectory {
    /// Empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adopt a raw central directory already split into records.
    pub(crate) fn from_parts(data: Vec<u8>, offsets: Vec<u32>) -> Self {
        Self {
            data,
            offsets,
            sorted: Vec::new(),
        }
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    /// Whether there are no records.
    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    /// Total bytes of all records.
    pub fn byte_len(&self) -> usize {
        self.data.len()
    }

    /// All records as they are written to the archive.
    pub fn raw(&self) -> &[u8] {
        &self.data
    }

    /// Reserve room for `bytes` more record bytes and one more record.
    pub(crate) fn reserve(&mut self, bytes: usize) {
        self.data.reserve(bytes);
        self.offsets.reserve(1);
    }

    /// Append one complete record. The caller guarantees the directory stays
    /// below 4 GiB.
    pub(crate) fn push_record(
        &mut self,
        fixed: &[u8],
        name: &[u8],
        extra: &[u8],
        comment: &[u8],
    ) {
        self.offsets.push(self.data.len() as u32);
        self.data.extend_from_slice(fixed);
        self.data.extend_from_slice(name);
        self.data.extend_from_slice(extra);
        self.data.extend_from_slice(comment);
    }

    /// Drop records so that `len` records and `byte_len` bytes remain.
    pub(crate) fn truncate(&mut self, len: usize, byte_len: usize) {
        self.offsets.truncate(len);
        self.data.truncate(byte_len);
    }

    /// The full record at `index`.
    pub fn record(&self, index: usize) -> Option<&[u8]> {
        let start = *self.offsets.get(index)? as usize;
        let end = self
            .offsets
            .get(index + 1)
            .map_or(self.data.len(), |&next| next as usize);
        self.data.get(start..end)
    }

    fn field(&self, index: usize, skip: usize, len_ofs: usize) -> Option<&[u8]> {
        let record = self.record(index)?;
        let len = usize::from(le16(record, len_ofs));
        let start = CENTRAL_HEADER_SIZE + skip;
        record.get(start..start + len)
    }

    fn lens(&self, index: usize) -> Option<(usize, usize)> {
        let record = self.record(index)?;
        Some((usize::from(le16(record, 28)), usize::from(le16(record, 30))))
    }

    /// Name bytes of record `index`.
    pub fn name(&self, index: usize) -> Option<&[u8]> {
        self.field(index, 0, 28)
    }

    /// Extra field bytes of record `index`.
    pub fn extra(&self, index: usize) -> Option<&[u8]> {
        let (name_len, _) = self.lens(index)?;
        self.field(index, name_len, 30)
    }

    /// Comment bytes of record `index`.
    pub fn comment(&self, index: usize) -> Option<&[u8]> {
        let (name_len, extra_len) = self.lens(index)?;
        self.field(index, name_len + extra_len, 32)
    }

    /// Whether a name-sorted index is available.
    pub fn is_sorted(&self) -> bool {
        !self.offsets.is_empty() && self.sorted.len() == self.offsets.len()
    }

    /// Build the name-sorted index.
    pub fn sort_by_name(&mut self) {
        let mut sorted: Vec<u32> = (0..self.offsets.len() as u32).collect();
        sorted.sort_by(|&a, &b| {
            compare_names(
                self.name(a as usize).unwrap_or_default(),
                self.name(b as usize).unwrap_or_default(),
            )
        });
        self.sorted = sorted;
    }

    /// Forget the sorted index, e.g. before appending records.
    pub fn clear_sorted(&mut self) {
        self.sorted.clear();
    }

    /// Binary search the sorted index for `name`, ignoring ASCII case.
    pub fn binary_search(&self, name: &[u8]) -> Option<usize> {
        if !self.is_sorted() {
            return None;
        }
        self.sorted
            .binary_search_by(|&index| {
                compare_names(self.name(index as usize).unwrap_or_default(), name)
            })
            .ok()
            .map(|pos| self.sorted[pos] as usize)
    }
}

/// Order names by ASCII-lowercased bytes, then by length.
pub(crate) fn compare_names(a: &[u8], b: &[u8]) -> Ordering {
    a.iter()
        .map(u8::to_ascii_lowercase)
        .cmp(b.iter().map(u8::to_ascii_lowercase))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::CentralHeader;

    fn push(dir: &mut CentralDirectory, name: &str, extra: &[u8], comment: &str) {
        let fixed = CentralHeader {
            name_len: name.len() as u16,
            extra_len: extra.len() as u16,
            comment_len: comment.len() as u16,
            ..CentralHeader::default()
        }
        .to_bytes();
        dir.push_record(&fixed, name.as_bytes(), extra, comment.as_bytes());
    }

    #[test]
    fn test_record_fields() {
        let mut dir = CentralDirectory::new();
        push(&mut dir, "a.txt", &[1, 0, 0, 0], "first");
        push(&mut dir, "b/c.bin", &[], "");

        assert_eq!(dir.len(), 2);
        assert_eq!(dir.name(0), Some(&b"a.txt"[..]));
        assert_eq!(dir.extra(0), Some(&[1u8, 0, 0, 0][..]));
        assert_eq!(dir.comment(0), Some(&b"first"[..]));
        assert_eq!(dir.name(1), Some(&b"b/c.bin"[..]));
        assert_eq!(dir.comment(1), Some(&b""[..]));
        assert_eq!(dir.record(0).map(<[u8]>::len), Some(46 + 5 + 4 + 5));
        assert_eq!(dir.byte_len(), 46 * 2 + 5 + 4 + 5 + 7);
        assert!(dir.record(2).is_none());
    }

    #[test]
    fn test_truncate_restores_previous_state() {
        let mut dir = CentralDirectory::new();
        push(&mut dir, "keep", &[], "");
        let (len, bytes) = (dir.len(), dir.byte_len());
        push(&mut dir, "drop", &[], "comment");
        dir.truncate(len, bytes);
        assert_eq!(dir.len(), 1);
        assert_eq!(dir.byte_len(), 50);
        assert_eq!(dir.name(0), Some(&b"keep"[..]));
    }

    #[test]
    fn test_sorted_lookup_ignores_case() {
        let mut dir = CentralDirectory::new();
        for name in ["zeta", "Alpha", "beta/", "alphabet", "Beta"] {
            push(&mut dir, name, &[], "");
        }
        assert_eq!(dir.binary_search(b"alpha"), None);
        dir.sort_by_name();
        assert!(dir.is_sorted());

        assert_eq!(dir.binary_search(b"ALPHA"), Some(1));
        assert_eq!(dir.binary_search(b"alphabet"), Some(3));
        assert_eq!(dir.binary_search(b"zeta"), Some(0));
        assert_eq!(dir.binary_search(b"beta/"), Some(2));
        assert_eq!(dir.binary_search(b"gamma"), None);

        dir.clear_sorted();
        assert!(!dir.is_sorted());
    }

    #[test]
    fn test_compare_names() {
        assert_eq!(compare_names(b"ABC", b"abc"), Ordering::Equal);
        assert_eq!(compare_names(b"ab", b"abc"), Ordering::Less);
        assert_eq!(compare_names(b"b", b"ABC"), Ordering::Greater);
    }
}
