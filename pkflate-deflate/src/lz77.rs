//! LZ77 state for the DEFLATE compressor.
//!
//! Two pieces live here:
//!
//! - [`Dictionary`]: the 32 KiB sliding window plus hash chains used to find
//!   back-references.
//! - [`LzCodeBuffer`]: the packed stream of literals and matches for the
//!   block being built, waiting to be Huffman-coded.
//!
//! The window keeps a copy of its first `MAX_MATCH_LEN - 1` bytes past the
//! end, so a match that runs over the wrap point can be compared with a
//! plain slice.

use crate::huffman::HuffmanTable;
use crate::tables::{LARGE_DIST_SYM, LEN_SYM, SMALL_DIST_SYM};

/// Sliding window size.
pub const LZ_DICT_SIZE: usize = 32768;

/// Mask for positions inside the window.
pub const LZ_DICT_SIZE_MASK: usize = LZ_DICT_SIZE - 1;

/// Minimum match length.
pub const MIN_MATCH_LEN: usize = 3;

/// Maximum match length.
pub const MAX_MATCH_LEN: usize = 258;

/// Capacity of the code buffer for one block.
pub const LZ_CODE_BUF_SIZE: usize = 64 * 1024;

/// Bits in the hash used by the lazy matcher.
pub const LZ_HASH_BITS: u32 = 15;

/// Per-byte shift of the rolling hash.
pub const LZ_HASH_SHIFT: u32 = 5;

/// Number of hash heads.
pub const LZ_HASH_SIZE: usize = 1 << LZ_HASH_BITS;

/// Hash mask used by the level 1 trigram matcher.
pub const LEVEL1_HASH_SIZE_MASK: usize = 4095;

/// Bytes allocated for the window, including the mirrored tail.
pub const DICT_BUF_SIZE: usize = LZ_DICT_SIZE + MAX_MATCH_LEN - 1;

/// Sliding window with hash chains.
///
/// Hash heads and chain links store the low 16 bits of absolute positions.
/// A link of zero ends the chain.
pub struct Dictionary {
    /// Window bytes, followed by a mirror of the first `MAX_MATCH_LEN - 1`.
    pub dict: Box<[u8]>,
    /// Previous position with the same hash, indexed by window position.
    pub next: Box<[u16]>,
    /// Most recent position for each hash.
    pub hash: Box<[u16]>,
    /// Probe budgets: `[0]` for short current matches, `[1]` once the
    /// current match reaches 32 bytes.
    pub max_probes: [u32; 2],
}

impl Dictionary {
    /// Create a zeroed window with probe budgets derived from `flags`.
    pub fn new(flags: u32) -> Self {
        Self {
            dict: vec![0u8; DICT_BUF_SIZE].into_boxed_slice(),
            next: vec![0u16; LZ_DICT_SIZE].into_boxed_slice(),
            hash: vec![0u16; LZ_HASH_SIZE].into_boxed_slice(),
            max_probes: probes_from_flags(flags),
        }
    }

    /// Forget every hash chain.
    pub fn clear_hash(&mut self) {
        self.hash.fill(0);
        self.next.fill(0);
    }

    /// Store one byte at window position `pos`, keeping the mirror in sync.
    #[inline]
    pub fn write_byte(&mut self, pos: usize, c: u8) {
        self.dict[pos] = c;
        if pos < MAX_MATCH_LEN - 1 {
            self.dict[LZ_DICT_SIZE + pos] = c;
        }
    }

    /// Copy `data` to window position `pos`. `data` must not run past the
    /// end of the window.
    pub fn write_slice(&mut self, pos: usize, data: &[u8]) {
        self.dict[pos..pos + data.len()].copy_from_slice(data);
        if pos < MAX_MATCH_LEN - 1 {
            let n = data.len().min(MAX_MATCH_LEN - 1 - pos);
            self.dict[LZ_DICT_SIZE + pos..LZ_DICT_SIZE + pos + n].copy_from_slice(&data[..n]);
        }
    }

    /// Walk the hash chain at `lookahead_pos` looking for a match longer than
    /// `*match_len`.
    ///
    /// Candidates are filtered by comparing the two bytes at the end of the
    /// current best match before a full compare. The search stops when the
    /// probe budget runs out, the chain ends, a candidate lies beyond
    /// `max_dist`, or a match of `max_match_len` is found.
    pub fn find_match(
        &self,
        lookahead_pos: usize,
        max_dist: usize,
        max_match_len: usize,
        match_dist: &mut usize,
        match_len: &mut usize,
    ) {
        let pos = lookahead_pos & LZ_DICT_SIZE_MASK;
        let mut best_len = *match_len;
        if max_match_len <= best_len {
            return;
        }

        let mut probes_left = self.max_probes[usize::from(best_len >= 32)];
        let mut probe_pos = pos;
        let mut c0 = self.dict[pos + best_len];
        let mut c1 = self.dict[pos + best_len - 1];

        loop {
            let dist = 'probe: loop {
                probes_left -= 1;
                if probes_left == 0 {
                    return;
                }
                for _ in 0..3 {
                    let next_probe_pos = self.next[probe_pos] as usize;
                    if next_probe_pos == 0 {
                        return;
                    }
                    let dist = lookahead_pos.wrapping_sub(next_probe_pos) as u16 as usize;
                    if dist > max_dist {
                        return;
                    }
                    probe_pos = next_probe_pos & LZ_DICT_SIZE_MASK;
                    if self.dict[probe_pos + best_len] == c0
                        && self.dict[probe_pos + best_len - 1] == c1
                    {
                        break 'probe dist;
                    }
                }
            };

            if dist == 0 {
                return;
            }

            let probe_len = self.dict[pos..pos + max_match_len]
                .iter()
                .zip(&self.dict[probe_pos..probe_pos + max_match_len])
                .take_while(|(a, b)| a == b)
                .count();

            if probe_len > best_len {
                *match_dist = dist;
                *match_len = probe_len;
                best_len = probe_len;
                if best_len == max_match_len {
                    return;
                }
                c0 = self.dict[pos + best_len];
                c1 = self.dict[pos + best_len - 1];
            }
        }
    }
}

/// Probe budgets for the lazy matcher, from the low 12 bits of `flags`.
pub fn probes_from_flags(flags: u32) -> [u32; 2] {
    let probes = flags & 0xFFF;
    [1 + (probes + 2) / 3, 1 + ((probes >> 2) + 2) / 3]
}

/// Packed literal/match stream for one block.
///
/// Each flag byte describes the next eight items, least significant bit
/// first; a set bit marks a match. A literal takes one byte. A match takes
/// three: `len - 3`, then `dist - 1` as little-endian `u16`.
pub struct LzCodeBuffer {
    /// Packed flags and codes.
    pub codes: Box<[u8]>,
    /// Next free byte in `codes`.
    pub pos: usize,
    /// Index of the flag byte being filled.
    pub flag_pos: usize,
    /// Items still to be described by the current flag byte.
    pub num_flags_left: u32,
    /// Uncompressed bytes covered by the buffered codes.
    pub total_bytes: usize,
}

impl LzCodeBuffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self {
            codes: vec![0u8; LZ_CODE_BUF_SIZE].into_boxed_slice(),
            pos: 1,
            flag_pos: 0,
            num_flags_left: 8,
            total_bytes: 0,
        }
    }

    /// Start a new block.
    pub fn reset(&mut self) {
        self.pos = 1;
        self.flag_pos = 0;
        self.num_flags_left = 8;
        self.total_bytes = 0;
    }

    /// Whether the buffer must be flushed before recording more items.
    #[inline]
    pub fn is_full(&self) -> bool {
        self.pos > LZ_CODE_BUF_SIZE - 8
    }

    #[inline]
    fn advance_flags(&mut self) {
        self.num_flags_left -= 1;
        if self.num_flags_left == 0 {
            self.num_flags_left = 8;
            self.flag_pos = self.pos;
            self.pos += 1;
        }
    }

    /// Append a literal and count it in `huff[0]`.
    #[inline]
    pub fn record_literal(&mut self, lit: u8, huff: &mut [HuffmanTable; 3]) {
        self.total_bytes += 1;
        self.codes[self.pos] = lit;
        self.pos += 1;
        self.codes[self.flag_pos] >>= 1;
        self.advance_flags();
        huff[0].count[lit as usize] += 1;
    }

    /// Append a match and count its symbols in `huff[0]` and `huff[1]`.
    #[inline]
    pub fn record_match(
        &mut self,
        match_len: usize,
        match_dist: usize,
        huff: &mut [HuffmanTable; 3],
    ) {
        debug_assert!((MIN_MATCH_LEN..=MAX_MATCH_LEN).contains(&match_len));
        debug_assert!((1..=LZ_DICT_SIZE).contains(&match_dist));

        self.total_bytes += match_len;
        let len_code = match_len - MIN_MATCH_LEN;
        let dist_code = match_dist - 1;
        self.codes[self.pos] = len_code as u8;
        self.codes[self.pos + 1] = dist_code as u8;
        self.codes[self.pos + 2] = (dist_code >> 8) as u8;
        self.pos += 3;
        self.codes[self.flag_pos] = (self.codes[self.flag_pos] >> 1) | 0x80;
        self.advance_flags();

        let dist_sym = if dist_code < 512 {
            SMALL_DIST_SYM[dist_code]
        } else {
            LARGE_DIST_SYM[(dist_code >> 8) & 127]
        };
        huff[1].count[dist_sym as usize] += 1;
        huff[0].count[LEN_SYM[len_code] as usize] += 1;
    }

    /// Close the current flag byte so the buffer can be walked.
    ///
    /// A flag byte that describes nothing is dropped.
    pub fn finish_flags(&mut self) {
        self.codes[self.flag_pos] >>= self.num_flags_left;
        if self.num_flags_left == 8 {
            self.pos -= 1;
        }
    }

    /// Iterate over the buffered items. Call [`finish_flags`](Self::finish_flags) first.
    pub fn items(&self) -> LzItems<'_> {
        LzItems {
            codes: &self.codes[..self.pos],
            pos: 0,
            flags: 1,
        }
    }
}

impl Default for LzCodeBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// One entry of the code buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LzItem {
    /// A literal byte.
    Literal(u8),
    /// A back-reference, stored as `len - 3` and `dist - 1`.
    Match {
        /// Match length minus 3.
        len_code: u8,
        /// Distance minus 1.
        dist_code: u16,
    },
}

/// Iterator over [`LzCodeBuffer`] items.
pub struct LzItems<'a> {
    codes: &'a [u8],
    pos: usize,
    flags: u32,
}

impl Iterator for LzItems<'_> {
    type Item = LzItem;

    fn next(&mut self) -> Option<LzItem> {
        if self.pos >= self.codes.len() {
            return None;
        }
        if self.flags == 1 {
            self.flags = self.codes[self.pos] as u32 | 0x100;
            self.pos += 1;
            if self.pos >= self.codes.len() {
                return None;
            }
        }
        let is_match = self.flags & 1 != 0;
        self.flags >>= 1;

        if is_match {
            let c = self.codes.get(self.pos..self.pos + 3)?;
            self.pos += 3;
            Some(LzItem::Match {
                len_code: c[0],
                dist_code: u16::from_le_bytes([c[1], c[2]]),
            })
        } else {
            let lit = self.codes[self.pos];
            self.pos += 1;
            Some(LzItem::Literal(lit))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tables() -> Box<[HuffmanTable; 3]> {
        Box::new([HuffmanTable::new(), HuffmanTable::new(), HuffmanTable::new()])
    }

    #[test]
    fn test_probe_budgets() {
        assert_eq!(probes_from_flags(0), [1, 1]);
        assert_eq!(probes_from_flags(1), [2, 1]);
        assert_eq!(probes_from_flags(128), [44, 12]);
    }

    #[test]
    fn test_code_buffer_items() {
        let mut huff = tables();
        let mut buf = LzCodeBuffer::new();
        buf.record_literal(b'a', &mut huff);
        buf.record_match(10, 1, &mut huff);
        buf.record_literal(b'b', &mut huff);
        buf.finish_flags();

        let items: Vec<_> = buf.items().collect();
        assert_eq!(
            items,
            vec![
                LzItem::Literal(b'a'),
                LzItem::Match {
                    len_code: 7,
                    dist_code: 0
                },
                LzItem::Literal(b'b'),
            ]
        );
        assert_eq!(buf.total_bytes, 12);
        assert_eq!(huff[0].count[b'a' as usize], 1);
        assert_eq!(huff[0].count[264], 1);
        assert_eq!(huff[1].count[0], 1);
    }

    #[test]
    fn test_code_buffer_full_flag_byte() {
        let mut huff = tables();
        let mut buf = LzCodeBuffer::new();
        for i in 0..8u8 {
            buf.record_literal(i, &mut huff);
        }
        // A fresh flag byte was opened; finishing must drop it.
        assert_eq!(buf.pos, 10);
        buf.finish_flags();
        assert_eq!(buf.pos, 9);
        let items: Vec<_> = buf.items().collect();
        assert_eq!(items.len(), 8);
        assert_eq!(items[7], LzItem::Literal(7));
    }

    #[test]
    fn test_empty_buffer_has_no_items() {
        let mut buf = LzCodeBuffer::new();
        buf.finish_flags();
        assert_eq!(buf.items().count(), 0);
    }

    #[test]
    fn test_write_slice_mirrors_head() {
        let mut dict = Dictionary::new(0);
        dict.write_slice(0, b"abc");
        assert_eq!(&dict.dict[LZ_DICT_SIZE..LZ_DICT_SIZE + 3], b"abc");
        dict.write_byte(LZ_DICT_SIZE - 1, b'z');
        assert_eq!(dict.dict[LZ_DICT_SIZE - 1], b'z');
    }

    #[test]
    fn test_find_match_follows_chain() {
        let mut dict = Dictionary::new(128);
        let data = b"abcdefabcdefXY";
        dict.write_slice(0, data);
        // Position 7 ("bcdefXY") links back to position 1 ("bcdefab...").
        dict.next[7] = 1;
        let mut dist = 0;
        let mut len = MIN_MATCH_LEN - 1;
        dict.find_match(7, 7, 7, &mut dist, &mut len);
        assert_eq!(dist, 6);
        assert_eq!(len, 5);
    }
}
