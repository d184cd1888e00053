//! DEFLATE compression.
//!
//! [`Deflater`] is a streaming compressor. Input is parsed into literals and
//! matches by one of two engines:
//!
//! - a single-probe trigram matcher for level 1
//! - a hash-chain matcher with lazy evaluation for everything else
//!
//! Parsed items accumulate in a 64 KiB code buffer. When it fills, or when
//! the parse stops paying for itself, the buffer is emitted as one block
//! using whichever of stored, fixed or dynamic Huffman coding is smallest.
//!
//! Compressed bytes go either into a caller buffer (any bytes that do not
//! fit are held and handed out on the next call) or to a sink closure.

use crate::huffman::HuffmanTable;
use crate::lz77::{
    Dictionary, LEVEL1_HASH_SIZE_MASK, LZ_CODE_BUF_SIZE, LZ_DICT_SIZE, LZ_DICT_SIZE_MASK,
    LZ_HASH_BITS, LZ_HASH_SHIFT, LZ_HASH_SIZE, LzCodeBuffer, LzItem, MAX_MATCH_LEN,
    MIN_MATCH_LEN, probes_from_flags,
};
use crate::tables::{
    CODE_LENGTH_ORDER, FIXED_DISTANCE_LENGTHS, FIXED_LITLEN_LENGTHS, LARGE_DIST_EXTRA,
    LARGE_DIST_SYM, LEN_EXTRA, LEN_SYM, MAX_HUFF_SYMBOLS_0, MAX_HUFF_SYMBOLS_1, MAX_HUFF_SYMBOLS_2,
    SMALL_DIST_EXTRA, SMALL_DIST_SYM,
};
use log::debug;
use pkflate_core::checksum::{ADLER32_INIT, adler32};
use pkflate_core::config::{CompressionLevel, CompressionStrategy, FlushMode};
use pkflate_core::error::{PkflateError, Result};

/// Size of the staging buffer for one compressed block.
pub const OUT_BUF_SIZE: usize = LZ_CODE_BUF_SIZE * 13 / 10;

/// Lookahead the level 1 matcher waits for before parsing.
const FAST_LOOKAHEAD_SIZE: usize = 4096;

/// Probe counts per level, stored in the low 12 bits of the flags.
const NUM_PROBES: [u32; 11] = [0, 1, 6, 32, 16, 32, 128, 256, 512, 768, 1500];

/// Compressor flags. The low 12 bits hold the probe count.
pub mod deflate_flags {
    /// Wrap the stream in a zlib header and Adler-32 trailer.
    pub const WRITE_ZLIB_HEADER: u32 = 0x0000_1000;
    /// Track Adler-32 of the input even without a zlib header.
    pub const COMPUTE_ADLER32: u32 = 0x0000_2000;
    /// Take the first acceptable match instead of trying one byte later.
    pub const GREEDY_PARSING_FLAG: u32 = 0x0000_4000;
    /// Skip clearing the hash tables on reset.
    pub const NONDETERMINISTIC_PARSING_FLAG: u32 = 0x0000_8000;
    /// Only look for runs of the previous byte (distance 1).
    pub const RLE_MATCHES: u32 = 0x0001_0000;
    /// Drop matches of five bytes or fewer.
    pub const FILTER_MATCHES: u32 = 0x0002_0000;
    /// Always use the fixed Huffman codes.
    pub const FORCE_ALL_STATIC_BLOCKS: u32 = 0x0004_0000;
    /// Always emit stored blocks.
    pub const FORCE_ALL_RAW_BLOCKS: u32 = 0x0008_0000;
    /// Mask for the probe count.
    pub const MAX_PROBES_MASK: u32 = 0x0000_0FFF;
}

use deflate_flags::*;

/// Build compressor flags from a level, framing choice and strategy.
///
/// Levels 0 through 3 parse greedily. Level 0 emits only stored blocks and
/// ignores the strategy.
pub fn create_comp_flags(
    level: CompressionLevel,
    zlib_header: bool,
    strategy: CompressionStrategy,
) -> u32 {
    let level = level.level() as usize;
    let mut flags = NUM_PROBES[level.min(10)];
    if level <= 3 {
        flags |= GREEDY_PARSING_FLAG;
    }
    if zlib_header {
        flags |= WRITE_ZLIB_HEADER;
    }

    if level == 0 {
        flags |= FORCE_ALL_RAW_BLOCKS;
    } else {
        match strategy {
            CompressionStrategy::Default => {}
            CompressionStrategy::Filtered => flags |= FILTER_MATCHES,
            CompressionStrategy::HuffmanOnly => flags &= !MAX_PROBES_MASK,
            CompressionStrategy::Fixed => flags |= FORCE_ALL_STATIC_BLOCKS,
            CompressionStrategy::Rle => flags |= RLE_MATCHES,
        }
    }
    flags
}

/// Outcome of a call to [`Deflater::compress`].
///
/// Anything other than [`Okay`](Self::Okay) is sticky: further calls return
/// [`BadParam`](Self::BadParam) until the compressor is reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressStatus {
    /// The output sink refused data.
    PutBufFailed,
    /// The call was not allowed in the current state.
    BadParam,
    /// Progress was made; call again with more input or output space.
    Okay,
    /// The stream is finished and all output has been handed out.
    Done,
}

/// Where compressed bytes go during one call.
enum Sink<'a> {
    Buffer { out: &'a mut [u8], ofs: usize },
    Callback(&'a mut dyn FnMut(&[u8]) -> bool),
}

/// Input and output of one call.
struct Call<'i, 'o> {
    src: &'i [u8],
    src_pos: usize,
    flush: FlushMode,
    sink: Sink<'o>,
}

impl Call<'_, '_> {
    fn src_left(&self) -> usize {
        self.src.len() - self.src_pos
    }
}

/// Bit-level writer into the block staging buffer. Bits are packed least
/// significant first.
struct BlockOutput {
    buf: Vec<u8>,
    bit_buffer: u32,
    bits_in: u32,
}

impl BlockOutput {
    fn new() -> Self {
        Self {
            buf: Vec::with_capacity(OUT_BUF_SIZE),
            bit_buffer: 0,
            bits_in: 0,
        }
    }

    #[inline]
    fn put_bits(&mut self, bits: u32, len: u32) {
        debug_assert!(len <= 16 && bits >> len == 0);
        self.bit_buffer |= bits << self.bits_in;
        self.bits_in += len;
        while self.bits_in >= 8 {
            self.buf.push(self.bit_buffer as u8);
            self.bit_buffer >>= 8;
            self.bits_in -= 8;
        }
    }

    fn align_to_byte(&mut self) {
        if self.bits_in > 0 {
            self.put_bits(0, 8 - self.bits_in);
        }
    }

    fn checkpoint(&self) -> (usize, u32, u32) {
        (self.buf.len(), self.bit_buffer, self.bits_in)
    }

    fn rewind(&mut self, (len, bit_buffer, bits_in): (usize, u32, u32)) {
        self.buf.truncate(len);
        self.bit_buffer = bit_buffer;
        self.bits_in = bits_in;
    }
}

/// Streaming DEFLATE compressor.
pub struct Deflater {
    flags: u32,
    greedy_parsing: bool,
    dict: Dictionary,
    lz: LzCodeBuffer,
    huff: Box<[HuffmanTable; 3]>,
    output: BlockOutput,
    output_flush_ofs: usize,
    output_flush_remaining: usize,
    lookahead_pos: usize,
    lookahead_size: usize,
    dict_size: usize,
    lz_code_buf_dict_pos: usize,
    saved_lit: u8,
    saved_match_dist: usize,
    saved_match_len: usize,
    resume_fast_parse: bool,
    adler32: u32,
    prev_status: CompressStatus,
    finished: bool,
    wants_to_finish: bool,
    block_index: u32,
}

impl std::fmt::Debug for Deflater {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Deflater")
            .field("flags", &format_args!("{:#x}", self.flags))
            .field("lookahead_pos", &self.lookahead_pos)
            .field("block_index", &self.block_index)
            .field("prev_status", &self.prev_status)
            .field("finished", &self.finished)
            .finish()
    }
}

impl Deflater {
    /// Create a compressor from raw [`deflate_flags`].
    pub fn new(flags: u32) -> Self {
        Self {
            flags,
            greedy_parsing: flags & GREEDY_PARSING_FLAG != 0,
            dict: Dictionary::new(flags),
            lz: LzCodeBuffer::new(),
            huff: Box::new([HuffmanTable::new(), HuffmanTable::new(), HuffmanTable::new()]),
            output: BlockOutput::new(),
            output_flush_ofs: 0,
            output_flush_remaining: 0,
            lookahead_pos: 0,
            lookahead_size: 0,
            dict_size: 0,
            lz_code_buf_dict_pos: 0,
            saved_lit: 0,
            saved_match_dist: 0,
            saved_match_len: 0,
            resume_fast_parse: false,
            adler32: ADLER32_INIT,
            prev_status: CompressStatus::Okay,
            finished: false,
            wants_to_finish: false,
            block_index: 0,
        }
    }

    /// Create a raw DEFLATE compressor for `level` with the default strategy.
    pub fn with_level(level: CompressionLevel) -> Self {
        Self::new(create_comp_flags(level, false, CompressionStrategy::Default))
    }

    /// Return to the initial state, optionally switching flags.
    pub fn reset(&mut self, flags: u32) {
        if flags & NONDETERMINISTIC_PARSING_FLAG == 0 {
            self.dict.clear_hash();
        }
        self.dict.max_probes = probes_from_flags(flags);
        self.flags = flags;
        self.greedy_parsing = flags & GREEDY_PARSING_FLAG != 0;
        self.lz.reset();
        for table in self.huff.iter_mut() {
            table.clear_counts();
        }
        self.output = BlockOutput::new();
        self.output_flush_ofs = 0;
        self.output_flush_remaining = 0;
        self.lookahead_pos = 0;
        self.lookahead_size = 0;
        self.dict_size = 0;
        self.lz_code_buf_dict_pos = 0;
        self.saved_lit = 0;
        self.saved_match_dist = 0;
        self.saved_match_len = 0;
        self.resume_fast_parse = false;
        self.adler32 = ADLER32_INIT;
        self.prev_status = CompressStatus::Okay;
        self.finished = false;
        self.wants_to_finish = false;
        self.block_index = 0;
    }

    /// Flags this compressor was created with.
    pub fn flags(&self) -> u32 {
        self.flags
    }

    /// Adler-32 of all input consumed so far.
    pub fn adler32(&self) -> u32 {
        self.adler32
    }

    /// Status returned by the previous call.
    pub fn prev_status(&self) -> CompressStatus {
        self.prev_status
    }

    /// Compress `input` into `output`.
    ///
    /// Returns the status, the number of input bytes consumed and the number
    /// of output bytes written. Unconsumed input must be passed again on the
    /// next call. Once [`FlushMode::Finish`] has been passed it must be passed
    /// on every following call until [`CompressStatus::Done`].
    pub fn compress(
        &mut self,
        input: &[u8],
        output: &mut [u8],
        flush: FlushMode,
    ) -> (CompressStatus, usize, usize) {
        let mut call = Call {
            src: input,
            src_pos: 0,
            flush,
            sink: Sink::Buffer { out: output, ofs: 0 },
        };
        let status = self.compress_inner(&mut call);
        let written = match call.sink {
            Sink::Buffer { ofs, .. } => ofs,
            Sink::Callback(_) => 0,
        };
        (status, call.src_pos, written)
    }

    /// Compress `input`, handing every finished block to `sink`.
    ///
    /// A `false` return from `sink` stops compression with
    /// [`CompressStatus::PutBufFailed`]. Returns the status and the number of
    /// input bytes consumed.
    pub fn compress_to_sink(
        &mut self,
        input: &[u8],
        flush: FlushMode,
        sink: &mut dyn FnMut(&[u8]) -> bool,
    ) -> (CompressStatus, usize) {
        let mut call = Call {
            src: input,
            src_pos: 0,
            flush,
            sink: Sink::Callback(sink),
        };
        let status = self.compress_inner(&mut call);
        (status, call.src_pos)
    }

    fn compress_inner(&mut self, call: &mut Call<'_, '_>) -> CompressStatus {
        if self.prev_status != CompressStatus::Okay
            || (self.wants_to_finish && call.flush != FlushMode::Finish)
        {
            self.prev_status = CompressStatus::BadParam;
            return CompressStatus::BadParam;
        }
        self.wants_to_finish |= call.flush == FlushMode::Finish;

        if self.output_flush_remaining > 0 || self.finished {
            return self.flush_output_buffer(call);
        }

        let use_fast = self.flags & MAX_PROBES_MASK == 1
            && self.flags & GREEDY_PARSING_FLAG != 0
            && self.flags & (FILTER_MATCHES | FORCE_ALL_RAW_BLOCKS | RLE_MATCHES) == 0;
        let ok = if use_fast {
            self.compress_fast(call)
        } else {
            self.compress_normal(call)
        };
        if !ok {
            return self.prev_status;
        }

        if self.flags & (WRITE_ZLIB_HEADER | COMPUTE_ADLER32) != 0 {
            self.adler32 = adler32(self.adler32, &call.src[..call.src_pos]);
        }

        let flush = call.flush;
        if flush != FlushMode::None
            && self.lookahead_size == 0
            && call.src_left() == 0
            && self.output_flush_remaining == 0
        {
            if self.flush_block(call, flush).is_err() {
                return self.prev_status;
            }
            self.finished = flush == FlushMode::Finish;
            if flush == FlushMode::Full {
                self.dict.clear_hash();
                self.dict_size = 0;
            }
        }

        self.flush_output_buffer(call)
    }

    /// Hand out pending block bytes and report whether the stream is done.
    fn flush_output_buffer(&mut self, call: &mut Call<'_, '_>) -> CompressStatus {
        if self.output_flush_remaining > 0 {
            let pending = &self.output.buf
                [self.output_flush_ofs..self.output_flush_ofs + self.output_flush_remaining];
            match &mut call.sink {
                Sink::Buffer { out, ofs } => {
                    let n = (out.len() - *ofs).min(pending.len());
                    out[*ofs..*ofs + n].copy_from_slice(&pending[..n]);
                    *ofs += n;
                    self.output_flush_ofs += n;
                    self.output_flush_remaining -= n;
                }
                Sink::Callback(sink) => {
                    if !sink(pending) {
                        self.prev_status = CompressStatus::PutBufFailed;
                        return CompressStatus::PutBufFailed;
                    }
                    self.output_flush_ofs += self.output_flush_remaining;
                    self.output_flush_remaining = 0;
                }
            }
        }

        self.prev_status = if self.finished && self.output_flush_remaining == 0 {
            CompressStatus::Done
        } else {
            CompressStatus::Okay
        };
        self.prev_status
    }

    /// Whether the parsed data is costly enough that a block should be cut.
    fn should_flush_normal(&self) -> bool {
        self.lz.is_full()
            || (self.lz.total_bytes > 31 * 1024
                && ((self.lz.pos * 115) >> 7 >= self.lz.total_bytes
                    || self.flags & FORCE_ALL_RAW_BLOCKS != 0))
    }

    /// Lazy hash-chain parser used for every level except 1.
    ///
    /// Returns `false` if the sink failed. Returns early with `true` when a
    /// block is waiting in the staging buffer for output space.
    fn compress_normal(&mut self, call: &mut Call<'_, '_>) -> bool {
        let flush = call.flush;

        while call.src_left() > 0 || (flush != FlushMode::None && self.lookahead_size > 0) {
            self.fill_lookahead(call);
            self.dict_size = self.dict_size.min(LZ_DICT_SIZE - self.lookahead_size);
            if flush == FlushMode::None && self.lookahead_size < MAX_MATCH_LEN {
                break;
            }

            let mut len_to_move = 1;
            let mut cur_match_dist = 0;
            let mut cur_match_len = if self.saved_match_len > 0 {
                self.saved_match_len
            } else {
                MIN_MATCH_LEN - 1
            };
            let cur_pos = self.lookahead_pos & LZ_DICT_SIZE_MASK;

            if self.flags & (RLE_MATCHES | FORCE_ALL_RAW_BLOCKS) != 0 {
                if self.dict_size > 0 && self.flags & FORCE_ALL_RAW_BLOCKS == 0 {
                    let c = self.dict.dict[cur_pos.wrapping_sub(1) & LZ_DICT_SIZE_MASK];
                    cur_match_len = self.dict.dict[cur_pos..cur_pos + self.lookahead_size]
                        .iter()
                        .take_while(|&&b| b == c)
                        .count();
                    if cur_match_len < MIN_MATCH_LEN {
                        cur_match_len = 0;
                    } else {
                        cur_match_dist = 1;
                    }
                }
            } else {
                self.dict.find_match(
                    self.lookahead_pos,
                    self.dict_size,
                    self.lookahead_size,
                    &mut cur_match_dist,
                    &mut cur_match_len,
                );
            }

            if (cur_match_len == MIN_MATCH_LEN && cur_match_dist >= 8 * 1024)
                || cur_pos == cur_match_dist
                || (self.flags & FILTER_MATCHES != 0 && cur_match_len <= 5)
            {
                cur_match_dist = 0;
                cur_match_len = 0;
            }

            if self.saved_match_len > 0 {
                if cur_match_len > self.saved_match_len {
                    self.lz.record_literal(self.saved_lit, &mut self.huff);
                    if cur_match_len >= 128 {
                        self.lz.record_match(cur_match_len, cur_match_dist, &mut self.huff);
                        self.saved_match_len = 0;
                        len_to_move = cur_match_len;
                    } else {
                        self.saved_lit = self.dict.dict[cur_pos];
                        self.saved_match_dist = cur_match_dist;
                        self.saved_match_len = cur_match_len;
                    }
                } else {
                    self.lz.record_match(
                        self.saved_match_len,
                        self.saved_match_dist,
                        &mut self.huff,
                    );
                    len_to_move = self.saved_match_len - 1;
                    self.saved_match_len = 0;
                }
            } else if cur_match_dist == 0 {
                self.lz.record_literal(self.dict.dict[cur_pos], &mut self.huff);
            } else if self.greedy_parsing
                || self.flags & RLE_MATCHES != 0
                || cur_match_len >= 128
            {
                self.lz.record_match(cur_match_len, cur_match_dist, &mut self.huff);
                len_to_move = cur_match_len;
            } else {
                self.saved_lit = self.dict.dict[cur_pos];
                self.saved_match_dist = cur_match_dist;
                self.saved_match_len = cur_match_len;
            }

            self.lookahead_pos += len_to_move;
            debug_assert!(self.lookahead_size >= len_to_move);
            self.lookahead_size -= len_to_move;
            self.dict_size = (self.dict_size + len_to_move).min(LZ_DICT_SIZE);

            if self.should_flush_normal() {
                match self.flush_block(call, FlushMode::None) {
                    Err(()) => return false,
                    Ok(0) => {}
                    Ok(_) => return true,
                }
            }
        }
        true
    }

    /// Move input into the window up to `MAX_MATCH_LEN` bytes of lookahead,
    /// inserting each completed trigram into the hash chains.
    fn fill_lookahead(&mut self, call: &mut Call<'_, '_>) {
        let dict = &mut self.dict;

        if self.lookahead_size + self.dict_size >= MIN_MATCH_LEN - 1 {
            let mut dst_pos = (self.lookahead_pos + self.lookahead_size) & LZ_DICT_SIZE_MASK;
            let mut ins_pos = self.lookahead_pos + self.lookahead_size - 2;
            let mut hash = ((dict.dict[ins_pos & LZ_DICT_SIZE_MASK] as usize) << LZ_HASH_SHIFT)
                ^ dict.dict[(ins_pos + 1) & LZ_DICT_SIZE_MASK] as usize;
            let n = call.src_left().min(MAX_MATCH_LEN - self.lookahead_size);

            for &c in &call.src[call.src_pos..call.src_pos + n] {
                dict.write_byte(dst_pos, c);
                hash = ((hash << LZ_HASH_SHIFT) ^ c as usize) & (LZ_HASH_SIZE - 1);
                dict.next[ins_pos & LZ_DICT_SIZE_MASK] = dict.hash[hash];
                dict.hash[hash] = ins_pos as u16;
                dst_pos = (dst_pos + 1) & LZ_DICT_SIZE_MASK;
                ins_pos += 1;
            }
            call.src_pos += n;
            self.lookahead_size += n;
        } else {
            while call.src_left() > 0 && self.lookahead_size < MAX_MATCH_LEN {
                let c = call.src[call.src_pos];
                call.src_pos += 1;
                let dst_pos = (self.lookahead_pos + self.lookahead_size) & LZ_DICT_SIZE_MASK;
                dict.write_byte(dst_pos, c);
                self.lookahead_size += 1;

                if self.lookahead_size + self.dict_size >= MIN_MATCH_LEN {
                    let ins_pos = self.lookahead_pos + self.lookahead_size - 3;
                    let hash = (((dict.dict[ins_pos & LZ_DICT_SIZE_MASK] as usize)
                        << (LZ_HASH_SHIFT * 2))
                        ^ ((dict.dict[(ins_pos + 1) & LZ_DICT_SIZE_MASK] as usize)
                            << LZ_HASH_SHIFT)
                        ^ c as usize)
                        & (LZ_HASH_SIZE - 1);
                    dict.next[ins_pos & LZ_DICT_SIZE_MASK] = dict.hash[hash];
                    dict.hash[hash] = ins_pos as u16;
                }
            }
        }
    }

    /// Level 1 parser: one probe per position through a 4096-entry trigram
    /// hash, always greedy.
    ///
    /// The lookahead is filled to 4096 bytes and then parsed to the end
    /// before more input is taken. If a block has to wait for output space
    /// mid-window, the next call finishes that window first so the parse
    /// does not depend on the caller's buffer sizes.
    fn compress_fast(&mut self, call: &mut Call<'_, '_>) -> bool {
        let mut cur_pos = self.lookahead_pos & LZ_DICT_SIZE_MASK;

        while call.src_left() > 0
            || self.resume_fast_parse
            || (call.flush != FlushMode::None && self.lookahead_size > 0)
        {
            if !std::mem::take(&mut self.resume_fast_parse) {
                let mut dst_pos = (self.lookahead_pos + self.lookahead_size) & LZ_DICT_SIZE_MASK;
                let mut n = call.src_left().min(FAST_LOOKAHEAD_SIZE - self.lookahead_size);
                self.lookahead_size += n;
                while n > 0 {
                    let chunk = (LZ_DICT_SIZE - dst_pos).min(n);
                    self.dict
                        .write_slice(dst_pos, &call.src[call.src_pos..call.src_pos + chunk]);
                    call.src_pos += chunk;
                    dst_pos = (dst_pos + chunk) & LZ_DICT_SIZE_MASK;
                    n -= chunk;
                }

                self.dict_size = self.dict_size.min(LZ_DICT_SIZE - self.lookahead_size);
                if call.flush == FlushMode::None && self.lookahead_size < FAST_LOOKAHEAD_SIZE {
                    break;
                }
            }

            while self.lookahead_size >= 4 {
                let first_trigram = self.trigram_at(cur_pos);
                let hash = (first_trigram ^ (first_trigram >> (24 - (LZ_HASH_BITS - 8))))
                    as usize
                    & LEVEL1_HASH_SIZE_MASK;
                let probe_pos = self.dict.hash[hash] as usize;
                self.dict.hash[hash] = self.lookahead_pos as u16;

                let cur_match_dist = self.lookahead_pos.wrapping_sub(probe_pos) as u16 as usize;
                let probe_pos = probe_pos & LZ_DICT_SIZE_MASK;
                let mut cur_match_len = 1;

                if cur_match_dist != 0
                    && cur_match_dist <= self.dict_size
                    && self.trigram_at(probe_pos) == first_trigram
                {
                    let max_len = MAX_MATCH_LEN.min(self.lookahead_size);
                    let len = self.dict.dict[cur_pos..cur_pos + max_len]
                        .iter()
                        .zip(&self.dict.dict[probe_pos..probe_pos + max_len])
                        .take_while(|(a, b)| a == b)
                        .count();
                    if len > MIN_MATCH_LEN || (len == MIN_MATCH_LEN && cur_match_dist < 8 * 1024) {
                        cur_match_len = len;
                    }
                }

                if cur_match_len > 1 {
                    self.lz.record_match(cur_match_len, cur_match_dist, &mut self.huff);
                } else {
                    self.lz.record_literal(self.dict.dict[cur_pos], &mut self.huff);
                }

                self.lookahead_pos += cur_match_len;
                self.dict_size = (self.dict_size + cur_match_len).min(LZ_DICT_SIZE);
                cur_pos = (cur_pos + cur_match_len) & LZ_DICT_SIZE_MASK;
                self.lookahead_size -= cur_match_len;

                if self.lz.is_full() {
                    match self.flush_block(call, FlushMode::None) {
                        Err(()) => return false,
                        Ok(0) => {}
                        Ok(_) => {
                            self.resume_fast_parse = true;
                            return true;
                        }
                    }
                }
            }

            while self.lookahead_size > 0 {
                self.lz.record_literal(self.dict.dict[cur_pos], &mut self.huff);
                self.lookahead_pos += 1;
                self.dict_size = (self.dict_size + 1).min(LZ_DICT_SIZE);
                cur_pos = (cur_pos + 1) & LZ_DICT_SIZE_MASK;
                self.lookahead_size -= 1;

                if self.lz.is_full() {
                    match self.flush_block(call, FlushMode::None) {
                        Err(()) => return false,
                        Ok(0) => {}
                        Ok(_) => {
                            self.resume_fast_parse = true;
                            return true;
                        }
                    }
                }
            }
        }
        true
    }

    #[inline]
    fn trigram_at(&self, pos: usize) -> u32 {
        let d = &self.dict.dict;
        u32::from_le_bytes([d[pos], d[pos + 1], d[pos + 2], 0])
    }

    /// Emit the buffered codes as one block and apply `flush`.
    ///
    /// Returns the number of block bytes still waiting for output space, or
    /// `Err(())` if the sink refused them (the status is latched).
    fn flush_block(
        &mut self,
        call: &mut Call<'_, '_>,
        flush: FlushMode,
    ) -> std::result::Result<usize, ()> {
        debug_assert_eq!(self.output_flush_remaining, 0);
        self.output.buf.clear();
        self.output_flush_ofs = 0;
        self.output_flush_remaining = 0;

        self.lz.finish_flags();

        if self.flags & WRITE_ZLIB_HEADER != 0 && self.block_index == 0 {
            let (cmf, flg) = zlib_header_bytes(self.flags);
            self.output.put_bits(cmf as u32, 8);
            self.output.put_bits(flg as u32, 8);
        }

        self.output.put_bits(u32::from(flush == FlushMode::Finish), 1);
        let saved = self.output.checkpoint();
        let total = self.lz.total_bytes;
        let in_window = self.lookahead_pos - self.lz_code_buf_dict_pos <= self.dict_size;

        let use_raw_block = self.flags & FORCE_ALL_RAW_BLOCKS != 0 && in_window;
        let mut block_kind = "raw";
        let mut succeeded = true;
        if !use_raw_block {
            let use_static = self.flags & FORCE_ALL_STATIC_BLOCKS != 0 || total < 48;
            block_kind = if use_static { "static" } else { "dynamic" };
            succeeded = self.compress_block(use_static);
        }

        let expanded = total != 0 && self.output.buf.len() - saved.0 + 1 >= total;
        if (use_raw_block || expanded) && in_window {
            self.output.rewind(saved);
            block_kind = "raw";
            self.output.put_bits(0, 2);
            self.output.align_to_byte();
            self.output.put_bits(total as u32 & 0xFFFF, 16);
            self.output.put_bits(!total as u32 & 0xFFFF, 16);
            for i in 0..total {
                let byte = self.dict.dict[(self.lz_code_buf_dict_pos + i) & LZ_DICT_SIZE_MASK];
                self.output.put_bits(byte as u32, 8);
            }
        } else if !succeeded {
            self.output.rewind(saved);
            block_kind = "static";
            self.compress_block(true);
        }

        match flush {
            FlushMode::None => {}
            FlushMode::Finish => {
                self.output.align_to_byte();
                if self.flags & WRITE_ZLIB_HEADER != 0 {
                    for byte in self.adler32.to_be_bytes() {
                        self.output.put_bits(byte as u32, 8);
                    }
                }
            }
            FlushMode::Sync | FlushMode::Full => {
                self.output.put_bits(0, 3);
                self.output.align_to_byte();
                self.output.put_bits(0, 16);
                self.output.put_bits(0xFFFF, 16);
            }
        }

        debug!(
            "deflate block {}: {} {} bytes in, {} bytes out",
            self.block_index,
            block_kind,
            total,
            self.output.buf.len()
        );

        self.huff[0].clear_counts();
        self.huff[1].clear_counts();
        self.lz.reset();
        self.lz_code_buf_dict_pos += total;
        self.block_index += 1;

        let n = self.output.buf.len();
        if n > 0 {
            match &mut call.sink {
                Sink::Callback(sink) => {
                    if !sink(&self.output.buf) {
                        self.prev_status = CompressStatus::PutBufFailed;
                        return Err(());
                    }
                }
                Sink::Buffer { out, ofs } => {
                    let copied = (out.len() - *ofs).min(n);
                    out[*ofs..*ofs + copied].copy_from_slice(&self.output.buf[..copied]);
                    *ofs += copied;
                    if copied < n {
                        self.output_flush_ofs = copied;
                        self.output_flush_remaining = n - copied;
                    }
                }
            }
        }
        Ok(self.output_flush_remaining)
    }

    /// Huffman-code the buffered items. Returns `false` if the block
    /// overran the staging buffer.
    fn compress_block(&mut self, static_block: bool) -> bool {
        if static_block {
            self.start_static_block();
        } else {
            self.start_dynamic_block();
        }
        self.compress_lz_codes()
    }

    fn start_static_block(&mut self) {
        self.huff[0].code_sizes[..MAX_HUFF_SYMBOLS_0].copy_from_slice(&FIXED_LITLEN_LENGTHS);
        self.huff[1].code_sizes[..MAX_HUFF_SYMBOLS_1].copy_from_slice(&FIXED_DISTANCE_LENGTHS);
        self.huff[0].optimize(MAX_HUFF_SYMBOLS_0, 15, true);
        self.huff[1].optimize(MAX_HUFF_SYMBOLS_1, 15, true);
        self.output.put_bits(1, 2);
    }

    fn start_dynamic_block(&mut self) {
        self.huff[0].count[256] = 1;
        self.huff[0].optimize(MAX_HUFF_SYMBOLS_0, 15, false);
        self.huff[1].optimize(MAX_HUFF_SYMBOLS_1, 15, false);

        let mut num_lit_codes = 286;
        while num_lit_codes > 257 && self.huff[0].code_sizes[num_lit_codes - 1] == 0 {
            num_lit_codes -= 1;
        }
        let mut num_dist_codes = 30;
        while num_dist_codes > 1 && self.huff[1].code_sizes[num_dist_codes - 1] == 0 {
            num_dist_codes -= 1;
        }

        let mut code_sizes_to_pack = [0u8; MAX_HUFF_SYMBOLS_0 + MAX_HUFF_SYMBOLS_1];
        code_sizes_to_pack[..num_lit_codes]
            .copy_from_slice(&self.huff[0].code_sizes[..num_lit_codes]);
        code_sizes_to_pack[num_lit_codes..num_lit_codes + num_dist_codes]
            .copy_from_slice(&self.huff[1].code_sizes[..num_dist_codes]);
        let total_code_sizes = num_lit_codes + num_dist_codes;

        self.huff[2].clear_counts();
        let mut rle = CodeSizeRle::new();
        for &code_size in &code_sizes_to_pack[..total_code_sizes] {
            rle.push(code_size, &mut self.huff[2].count);
        }
        rle.finish(&mut self.huff[2].count);

        self.huff[2].optimize(MAX_HUFF_SYMBOLS_2, 7, false);

        self.output.put_bits(2, 2);
        self.output.put_bits((num_lit_codes - 257) as u32, 5);
        self.output.put_bits((num_dist_codes - 1) as u32, 5);

        let mut num_bit_lengths = MAX_HUFF_SYMBOLS_2;
        while num_bit_lengths > 0
            && self.huff[2].code_sizes[CODE_LENGTH_ORDER[num_bit_lengths - 1] as usize] == 0
        {
            num_bit_lengths -= 1;
        }
        let num_bit_lengths = num_bit_lengths.max(4);
        self.output.put_bits((num_bit_lengths - 4) as u32, 4);
        for &sym in &CODE_LENGTH_ORDER[..num_bit_lengths] {
            self.output
                .put_bits(self.huff[2].code_sizes[sym as usize] as u32, 3);
        }

        let packed = &rle.packed[..rle.len];
        let mut i = 0;
        while i < packed.len() {
            let code = packed[i] as usize;
            i += 1;
            debug_assert!(code < MAX_HUFF_SYMBOLS_2);
            self.output.put_bits(
                self.huff[2].codes[code] as u32,
                self.huff[2].code_sizes[code] as u32,
            );
            if code >= 16 {
                let extra_bits = [2, 3, 7][code - 16];
                self.output.put_bits(packed[i] as u32, extra_bits);
                i += 1;
            }
        }
    }

    fn compress_lz_codes(&mut self) -> bool {
        let litlen = &self.huff[0];
        let dist = &self.huff[1];
        let out = &mut self.output;

        for item in self.lz.items() {
            match item {
                LzItem::Literal(lit) => {
                    let lit = lit as usize;
                    out.put_bits(litlen.codes[lit] as u32, litlen.code_sizes[lit] as u32);
                }
                LzItem::Match {
                    len_code,
                    dist_code,
                } => {
                    let len_code = len_code as usize;
                    let sym = LEN_SYM[len_code] as usize;
                    out.put_bits(litlen.codes[sym] as u32, litlen.code_sizes[sym] as u32);
                    let extra = LEN_EXTRA[len_code] as u32;
                    out.put_bits(len_code as u32 & ((1 << extra) - 1), extra);

                    let dist_code = dist_code as usize;
                    let (sym, extra) = if dist_code < 512 {
                        (SMALL_DIST_SYM[dist_code], SMALL_DIST_EXTRA[dist_code])
                    } else {
                        (LARGE_DIST_SYM[dist_code >> 8], LARGE_DIST_EXTRA[dist_code >> 8])
                    };
                    let (sym, extra) = (sym as usize, extra as u32);
                    out.put_bits(dist.codes[sym] as u32, dist.code_sizes[sym] as u32);
                    out.put_bits(dist_code as u32 & ((1 << extra) - 1), extra);
                }
            }
        }

        out.put_bits(litlen.codes[256] as u32, litlen.code_sizes[256] as u32);
        out.buf.len() < OUT_BUF_SIZE - 16
    }
}

/// Run-length packer for the code length sequence of a dynamic header.
///
/// Repeats of the previous nonzero length become symbol 16 (3-6 copies).
/// Zero runs become symbol 17 (3-10) or 18 (11-138). Each repeat symbol is
/// followed by its count in `packed`.
struct CodeSizeRle {
    packed: [u8; MAX_HUFF_SYMBOLS_0 + MAX_HUFF_SYMBOLS_1],
    len: usize,
    prev_code_size: u8,
    repeat_count: usize,
    zero_count: usize,
}

impl CodeSizeRle {
    fn new() -> Self {
        Self {
            packed: [0; MAX_HUFF_SYMBOLS_0 + MAX_HUFF_SYMBOLS_1],
            len: 0,
            prev_code_size: 0xFF,
            repeat_count: 0,
            zero_count: 0,
        }
    }

    fn emit(&mut self, value: u8) {
        self.packed[self.len] = value;
        self.len += 1;
    }

    fn flush_repeats(&mut self, counts: &mut [u16]) {
        if self.repeat_count == 0 {
            return;
        }
        if self.repeat_count < 3 {
            counts[self.prev_code_size as usize] += self.repeat_count as u16;
            for _ in 0..self.repeat_count {
                self.emit(self.prev_code_size);
            }
        } else {
            counts[16] += 1;
            self.emit(16);
            self.emit((self.repeat_count - 3) as u8);
        }
        self.repeat_count = 0;
    }

    fn flush_zeros(&mut self, counts: &mut [u16]) {
        if self.zero_count == 0 {
            return;
        }
        if self.zero_count < 3 {
            counts[0] += self.zero_count as u16;
            for _ in 0..self.zero_count {
                self.emit(0);
            }
        } else if self.zero_count <= 10 {
            counts[17] += 1;
            self.emit(17);
            self.emit((self.zero_count - 3) as u8);
        } else {
            counts[18] += 1;
            self.emit(18);
            self.emit((self.zero_count - 11) as u8);
        }
        self.zero_count = 0;
    }

    fn push(&mut self, code_size: u8, counts: &mut [u16]) {
        if code_size == 0 {
            self.flush_repeats(counts);
            self.zero_count += 1;
            if self.zero_count == 138 {
                self.flush_zeros(counts);
            }
        } else {
            self.flush_zeros(counts);
            if code_size != self.prev_code_size {
                self.flush_repeats(counts);
                counts[code_size as usize] += 1;
                self.emit(code_size);
            } else {
                self.repeat_count += 1;
                if self.repeat_count == 6 {
                    self.flush_repeats(counts);
                }
            }
        }
        self.prev_code_size = code_size;
    }

    fn finish(&mut self, counts: &mut [u16]) {
        if self.repeat_count > 0 {
            self.flush_repeats(counts);
        } else {
            self.flush_zeros(counts);
        }
    }
}

/// zlib CMF/FLG for the level implied by the probe count in `flags`.
fn zlib_header_bytes(flags: u32) -> (u8, u8) {
    const CMF: u32 = 0x78;
    let probes = flags & MAX_PROBES_MASK;
    let index = NUM_PROBES
        .iter()
        .position(|&p| p == probes)
        .unwrap_or(NUM_PROBES.len());
    let flevel = match index {
        0 | 1 => 0,
        2..=5 => 1,
        6 => 2,
        _ => 3,
    };
    let mut header = (CMF << 8) | (flevel << 6);
    header += 31 - (header % 31);
    (CMF as u8, (header & 0xFF) as u8)
}

/// Compress `data` in one call with raw [`deflate_flags`], appending to a
/// growable buffer.
pub fn compress_to_vec_with_flags(data: &[u8], flags: u32) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(128.max(data.len() / 2));
    compress_to_callback(data, flags, |block| {
        out.extend_from_slice(block);
        true
    })?;
    Ok(out)
}

/// Compress `data` to a raw DEFLATE stream.
pub fn compress_to_vec(data: &[u8], level: CompressionLevel) -> Result<Vec<u8>> {
    compress_to_vec_with_flags(
        data,
        create_comp_flags(level, false, CompressionStrategy::Default),
    )
}

/// Compress `data` to a zlib stream.
pub fn compress_to_vec_zlib(data: &[u8], level: CompressionLevel) -> Result<Vec<u8>> {
    compress_to_vec_with_flags(
        data,
        create_comp_flags(level, true, CompressionStrategy::Default),
    )
}

/// Compress `data` into `out` in one call. Returns the compressed length, or
/// [`PkflateError::BufferTooSmall`] if it does not fit.
pub fn compress_to_slice(out: &mut [u8], data: &[u8], flags: u32) -> Result<usize> {
    let available = out.len();
    let mut written = 0;
    let mut overflow = 0;
    let result = compress_to_callback(data, flags, |block| {
        if written + block.len() > available {
            overflow = written + block.len();
            return false;
        }
        out[written..written + block.len()].copy_from_slice(block);
        written += block.len();
        true
    });
    match result {
        Ok(()) => Ok(written),
        Err(_) if overflow > 0 => Err(PkflateError::buffer_too_small(overflow, available)),
        Err(e) => Err(e),
    }
}

/// Compress `data` in one call, handing each block to `sink`.
///
/// A `false` return from `sink` aborts with
/// [`PkflateError::CompressionFailed`].
pub fn compress_to_callback<F>(data: &[u8], flags: u32, mut sink: F) -> Result<()>
where
    F: FnMut(&[u8]) -> bool,
{
    let mut deflater = Box::new(Deflater::new(flags));
    let (status, _) = deflater.compress_to_sink(data, FlushMode::Finish, &mut sink);
    match status {
        CompressStatus::Done => Ok(()),
        CompressStatus::PutBufFailed => {
            Err(PkflateError::compression_failed("output sink rejected data"))
        }
        other => Err(PkflateError::compression_failed(format!(
            "compressor stopped with {other:?}"
        ))),
    }
}

/// Compress `data` to a raw DEFLATE stream at `level` (0-10).
pub fn deflate(data: &[u8], level: u8) -> Result<Vec<u8>> {
    compress_to_vec(data, CompressionLevel::new(level))
}
