//! Huffman coding for DEFLATE.
//!
//! Two halves live here:
//!
//! - [`HuffmanTable`] builds length-limited canonical codes from symbol
//!   frequencies for the compressor. Lengths come from an in-place
//!   minimum-redundancy pass over the frequency-sorted symbols; if the deepest
//!   length exceeds the limit, weight is moved down the length histogram until
//!   the Kraft sum is exactly `2^limit` again.
//! - [`DecodeTable`] is the decoder side: a 1024-entry fast lookup table for
//!   codes up to 10 bits plus a flat binary tree for longer codes.
//!
//! # Alphabets
//!
//! DEFLATE uses three Huffman alphabets:
//! - **Literal/Length**: 0-287 (0-255 literals, 256 EOB, 257-285 lengths)
//! - **Distance**: 0-31 (0-29 used)
//! - **Code Length**: 0-18 (for encoding dynamic Huffman trees)

use crate::tables::{MAX_HUFF_SYMBOLS_0, MAX_SUPPORTED_HUFF_CODESIZE};

/// Maximum code length allowed in a DEFLATE stream.
pub const MAX_CODE_LENGTH: usize = 15;

/// Number of bits resolved by the decoder's direct lookup table.
pub const FAST_LOOKUP_BITS: u32 = 10;

/// Size of the decoder's direct lookup table.
pub const FAST_LOOKUP_SIZE: usize = 1 << FAST_LOOKUP_BITS;

const TREE_SIZE: usize = MAX_HUFF_SYMBOLS_0 * 2;

#[derive(Debug, Clone, Copy, Default)]
struct SymFreq {
    key: u32,
    sym_index: u16,
}

/// Stable two-pass radix sort on the low 16 bits of `key`.
///
/// Returns which of the two buffers holds the sorted result.
fn radix_sort_symbols<'a>(
    num_syms: usize,
    syms0: &'a mut [SymFreq],
    syms1: &'a mut [SymFreq],
) -> &'a mut [SymFreq] {
    let mut hist = [[0usize; 256]; 2];
    for sym in &syms0[..num_syms] {
        hist[0][(sym.key & 0xFF) as usize] += 1;
        hist[1][((sym.key >> 8) & 0xFF) as usize] += 1;
    }

    // A second pass is pointless when every key has a zero high byte.
    let total_passes = if hist[1][0] == num_syms { 1 } else { 2 };

    let (mut cur, mut new) = (syms0, syms1);
    for (pass, pass_hist) in hist.iter().enumerate().take(total_passes) {
        let shift = pass * 8;
        let mut offsets = [0usize; 256];
        let mut ofs = 0;
        for (offset, &count) in offsets.iter_mut().zip(pass_hist.iter()) {
            *offset = ofs;
            ofs += count;
        }
        for sym in &cur[..num_syms] {
            let bucket = ((sym.key >> shift) & 0xFF) as usize;
            new[offsets[bucket]] = *sym;
            offsets[bucket] += 1;
        }
        std::mem::swap(&mut cur, &mut new);
    }
    cur
}

/// In-place minimum-redundancy code length computation (Moffat and
/// Katajainen). Input keys are frequencies sorted ascending; output keys are
/// code lengths, with the longest lengths at the front.
fn calculate_minimum_redundancy(a: &mut [SymFreq]) {
    let n = a.len();
    match n {
        0 => return,
        1 => {
            a[0].key = 1;
            return;
        }
        _ => {}
    }

    a[0].key += a[1].key;
    let mut root = 0usize;
    let mut leaf = 2usize;
    for next in 1..n - 1 {
        if leaf >= n || a[root].key < a[leaf].key {
            a[next].key = a[root].key;
            a[root].key = next as u32;
            root += 1;
        } else {
            a[next].key = a[leaf].key;
            leaf += 1;
        }

        if leaf >= n || (root < next && a[root].key < a[leaf].key) {
            a[next].key += a[root].key;
            a[root].key = next as u32;
            root += 1;
        } else {
            a[next].key += a[leaf].key;
            leaf += 1;
        }
    }

    a[n - 2].key = 0;
    for next in (0..n - 2).rev() {
        a[next].key = a[a[next].key as usize].key + 1;
    }

    let mut avbl = 1usize;
    let mut used = 0usize;
    let mut dpth = 0u32;
    let mut root = n as isize - 2;
    let mut next = n as isize - 1;
    while avbl > 0 {
        while root >= 0 && a[root as usize].key == dpth {
            used += 1;
            root -= 1;
        }
        while avbl > used {
            a[next as usize].key = dpth;
            next -= 1;
            avbl -= 1;
        }
        avbl = 2 * used;
        dpth += 1;
        used = 0;
    }
}

/// Fold lengths above `max_code_size` into it, then rebalance the histogram
/// until the Kraft sum is exactly `2^max_code_size`.
fn enforce_max_code_size(
    num_codes: &mut [i32; MAX_SUPPORTED_HUFF_CODESIZE + 1],
    code_list_len: usize,
    max_code_size: usize,
) {
    if code_list_len <= 1 {
        return;
    }

    let overflow: i32 = num_codes[max_code_size + 1..].iter().sum();
    num_codes[max_code_size] += overflow;
    for count in &mut num_codes[max_code_size + 1..] {
        *count = 0;
    }

    let mut total: u32 = (1..=max_code_size)
        .map(|i| (num_codes[i] as u32) << (max_code_size - i))
        .sum();

    while total != 1 << max_code_size {
        num_codes[max_code_size] -= 1;
        for i in (1..max_code_size).rev() {
            if num_codes[i] != 0 {
                num_codes[i] -= 1;
                num_codes[i + 1] += 2;
                break;
            }
        }
        total -= 1;
    }
}

/// Encoder-side Huffman table: per-symbol frequency, code length and
/// bit-reversed canonical code.
#[derive(Clone)]
pub struct HuffmanTable {
    /// Symbol frequencies for the block being built.
    pub count: [u16; MAX_HUFF_SYMBOLS_0],
    /// Code length per symbol (0 = unused).
    pub code_sizes: [u8; MAX_HUFF_SYMBOLS_0],
    /// Canonical code per symbol, bit-reversed for LSB-first output.
    pub codes: [u16; MAX_HUFF_SYMBOLS_0],
}

impl HuffmanTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self {
            count: [0; MAX_HUFF_SYMBOLS_0],
            code_sizes: [0; MAX_HUFF_SYMBOLS_0],
            codes: [0; MAX_HUFF_SYMBOLS_0],
        }
    }

    /// Reset all frequencies to zero.
    pub fn clear_counts(&mut self) {
        self.count = [0; MAX_HUFF_SYMBOLS_0];
    }

    /// Build codes for the first `table_len` symbols.
    ///
    /// With `static_table` set, `code_sizes` is taken as given (for the fixed
    /// DEFLATE tables) and only the codes are assigned. Otherwise lengths are
    /// computed from `count`, limited to `code_size_limit` bits.
    pub fn optimize(&mut self, table_len: usize, code_size_limit: usize, static_table: bool) {
        let mut num_codes = [0i32; MAX_SUPPORTED_HUFF_CODESIZE + 1];

        if static_table {
            for &size in &self.code_sizes[..table_len] {
                num_codes[size as usize] += 1;
            }
        } else {
            let mut syms0 = [SymFreq::default(); MAX_HUFF_SYMBOLS_0];
            let mut syms1 = [SymFreq::default(); MAX_HUFF_SYMBOLS_0];
            let mut num_used_syms = 0;
            for (i, &count) in self.count[..table_len].iter().enumerate() {
                if count != 0 {
                    syms0[num_used_syms] = SymFreq {
                        key: count as u32,
                        sym_index: i as u16,
                    };
                    num_used_syms += 1;
                }
            }

            let syms = radix_sort_symbols(num_used_syms, &mut syms0, &mut syms1);
            let syms = &mut syms[..num_used_syms];
            calculate_minimum_redundancy(syms);

            for sym in syms.iter() {
                num_codes[(sym.key as usize).min(MAX_SUPPORTED_HUFF_CODESIZE)] += 1;
            }

            enforce_max_code_size(&mut num_codes, num_used_syms, code_size_limit);

            self.code_sizes = [0; MAX_HUFF_SYMBOLS_0];
            self.codes = [0; MAX_HUFF_SYMBOLS_0];

            // Shortest lengths go to the most frequent symbols at the end.
            let mut j = num_used_syms;
            for (len, &n) in num_codes.iter().enumerate().take(code_size_limit + 1).skip(1) {
                for _ in 0..n {
                    j -= 1;
                    self.code_sizes[syms[j].sym_index as usize] = len as u8;
                }
            }
        }

        let mut next_code = [0u32; MAX_SUPPORTED_HUFF_CODESIZE + 1];
        let mut code = 0u32;
        for i in 2..=code_size_limit {
            code = (code + num_codes[i - 1] as u32) << 1;
            next_code[i] = code;
        }

        for (size, out) in self.code_sizes[..table_len]
            .iter()
            .zip(self.codes[..table_len].iter_mut())
        {
            let size = *size as usize;
            if size == 0 {
                continue;
            }
            let code = next_code[size];
            next_code[size] += 1;
            *out = reverse_bits(code, size as u32) as u16;
        }
    }
}

impl Default for HuffmanTable {
    fn default() -> Self {
        Self::new()
    }
}

#[inline]
fn reverse_bits(code: u32, length: u32) -> u32 {
    code.reverse_bits() >> (32 - length)
}

/// Result of looking up the next symbol in the bit buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    /// A complete code was found.
    Symbol {
        /// Decoded symbol.
        symbol: u16,
        /// Length of its code in bits.
        length: u32,
    },
    /// The buffered bits are a valid prefix; more are needed.
    NeedMoreBits,
    /// No code matches the buffered bits.
    Invalid,
}

/// Decoder-side Huffman table.
///
/// Entries in both arrays pack `(code_length << 9) | symbol`. A negative
/// lookup entry `t` points at a tree node whose two children sit at
/// `tree[!t]` and `tree[!t + 1]`. Zero means "no code".
#[derive(Clone)]
pub struct DecodeTable {
    /// Code length per symbol, filled in by the decoder before `build`.
    pub code_size: [u8; MAX_HUFF_SYMBOLS_0],
    look_up: [i16; FAST_LOOKUP_SIZE],
    tree: [i16; TREE_SIZE],
}

impl DecodeTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self {
            code_size: [0; MAX_HUFF_SYMBOLS_0],
            look_up: [0; FAST_LOOKUP_SIZE],
            tree: [0; TREE_SIZE],
        }
    }

    /// Build lookup structures from `code_size[..table_size]`.
    ///
    /// Returns `false` if the lengths do not form a complete prefix code.
    /// A code with a single used symbol is accepted even though it is
    /// incomplete, as is an empty code.
    pub fn build(&mut self, table_size: usize) -> bool {
        let mut total_syms = [0u32; 16];
        self.look_up = [0; FAST_LOOKUP_SIZE];
        self.tree = [0; TREE_SIZE];

        for &size in &self.code_size[..table_size] {
            if size as usize > MAX_CODE_LENGTH {
                return false;
            }
            total_syms[size as usize] += 1;
        }

        let mut next_code = [0u32; 17];
        let mut used_syms = 0;
        let mut total = 0u32;
        for i in 1..=MAX_CODE_LENGTH {
            used_syms += total_syms[i];
            total = (total + total_syms[i]) << 1;
            next_code[i + 1] = total;
        }
        if total != 65536 && used_syms > 1 {
            return false;
        }

        let mut tree_next: i16 = -1;
        for sym_index in 0..table_size {
            let code_size = self.code_size[sym_index] as u32;
            if code_size == 0 {
                continue;
            }
            let cur_code = next_code[code_size as usize];
            next_code[code_size as usize] += 1;
            let mut rev_code = reverse_bits(cur_code, code_size);
            let entry = ((code_size << 9) | sym_index as u32) as i16;

            if code_size <= FAST_LOOKUP_BITS {
                while (rev_code as usize) < FAST_LOOKUP_SIZE {
                    self.look_up[rev_code as usize] = entry;
                    rev_code += 1 << code_size;
                }
                continue;
            }

            let slot = (rev_code as usize) & (FAST_LOOKUP_SIZE - 1);
            let mut tree_cur = self.look_up[slot];
            if tree_cur == 0 {
                self.look_up[slot] = tree_next;
                tree_cur = tree_next;
                tree_next -= 2;
            } else if tree_cur > 0 {
                return false;
            }

            rev_code >>= FAST_LOOKUP_BITS - 1;
            for _ in (FAST_LOOKUP_BITS + 2..=code_size).rev() {
                rev_code >>= 1;
                tree_cur -= (rev_code & 1) as i16;
                let idx = (-tree_cur - 1) as usize;
                if idx >= TREE_SIZE {
                    return false;
                }
                match self.tree[idx] {
                    0 => {
                        self.tree[idx] = tree_next;
                        tree_cur = tree_next;
                        tree_next -= 2;
                    }
                    node if node < 0 => tree_cur = node,
                    _ => return false,
                }
            }
            rev_code >>= 1;
            tree_cur -= (rev_code & 1) as i16;
            let idx = (-tree_cur - 1) as usize;
            if idx >= TREE_SIZE {
                return false;
            }
            self.tree[idx] = entry;
        }
        true
    }

    /// Try to decode one symbol from the low `num_bits` bits of `bit_buf`.
    #[inline]
    pub fn lookup(&self, bit_buf: u64, num_bits: u32) -> Lookup {
        let entry = self.look_up[(bit_buf as usize) & (FAST_LOOKUP_SIZE - 1)];
        if entry > 0 {
            let length = (entry >> 9) as u32;
            return if length <= num_bits {
                Lookup::Symbol {
                    symbol: (entry & 511) as u16,
                    length,
                }
            } else {
                Lookup::NeedMoreBits
            };
        }
        if entry == 0 {
            return if num_bits >= FAST_LOOKUP_BITS {
                Lookup::Invalid
            } else {
                Lookup::NeedMoreBits
            };
        }
        if num_bits < FAST_LOOKUP_BITS {
            return Lookup::NeedMoreBits;
        }

        let mut node = entry;
        let mut code_len = FAST_LOOKUP_BITS;
        loop {
            if code_len >= num_bits {
                return Lookup::NeedMoreBits;
            }
            let idx = (!node) as usize + ((bit_buf >> code_len) & 1) as usize;
            code_len += 1;
            node = match self.tree.get(idx) {
                Some(&n) => n,
                None => return Lookup::Invalid,
            };
            if node > 0 {
                return Lookup::Symbol {
                    symbol: (node & 511) as u16,
                    length: code_len,
                };
            }
            if node == 0 || code_len as usize >= MAX_CODE_LENGTH {
                return Lookup::Invalid;
            }
        }
    }
}

impl Default for DecodeTable {
    fn default() -> Self {
        Self::new()
    }
}
