//! DEFLATE decompression (inflate).
//!
//! [`Inflater`] is a resumable state machine. Every call to
//! [`Inflater::decompress`] runs until the input runs dry, the output fills
//! up, the stream ends or an error is found, and records exactly where it
//! stopped. The next call picks up from that state, so callers may feed
//! input and drain output in pieces as small as one byte.
//!
//! Output is written into a caller-owned buffer that doubles as the match
//! history:
//!
//! - With [`inflate_flags::USING_NON_WRAPPING_OUTPUT_BUF`] the buffer holds
//!   the entire output and back-references must stay inside it.
//! - Otherwise the buffer is a power-of-two ring (typically 32 KiB) and
//!   back-references are resolved modulo its size.
//!
//! Supports all three block types:
//! - Type 0: Stored (uncompressed)
//! - Type 1: Fixed Huffman codes
//! - Type 2: Dynamic Huffman codes

use crate::huffman::{DecodeTable, Lookup};
use crate::tables::{
    CODE_LENGTH_ORDER, DISTANCE_BASE, DISTANCE_EXTRA_BITS, FIXED_DISTANCE_LENGTHS,
    FIXED_LITLEN_LENGTHS, LENGTH_BASE, LENGTH_EXTRA_BITS, MAX_HUFF_SYMBOLS_0, MAX_HUFF_SYMBOLS_1,
    MAX_HUFF_SYMBOLS_2,
};
use pkflate_core::checksum::{ADLER32_INIT, adler32};
use pkflate_core::error::{PkflateError, Result};
use std::io;

/// Size of the ring buffer used by [`decompress_to_callback`].
pub const LZ_DICT_SIZE: usize = 32768;

/// Flags accepted by [`Inflater::decompress`].
pub mod inflate_flags {
    /// The input starts with a zlib header and ends with an Adler-32 trailer.
    pub const PARSE_ZLIB_HEADER: u32 = 1;
    /// More input may follow this call; running dry is not an error.
    pub const HAS_MORE_INPUT: u32 = 2;
    /// The output buffer holds the whole output rather than a ring.
    pub const USING_NON_WRAPPING_OUTPUT_BUF: u32 = 4;
    /// Compute Adler-32 over the output even without a zlib header.
    pub const COMPUTE_ADLER32: u32 = 8;
}

use inflate_flags::*;

/// Outcome of a call to [`Inflater::decompress`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InflateStatus {
    /// Input ran dry without `HAS_MORE_INPUT` set. Calling again with more
    /// input resumes where this call stopped.
    FailedCannotMakeProgress,
    /// The output buffer or flags were unusable. Nothing was consumed.
    BadParam,
    /// The stream decoded but its Adler-32 trailer did not match.
    Adler32Mismatch,
    /// The stream is malformed.
    Failed,
    /// The stream is complete.
    Done,
    /// More input is needed to continue.
    NeedsMoreInput,
    /// The output buffer is full and more output is pending.
    HasMoreOutput,
}

impl InflateStatus {
    /// Whether this status is an error.
    pub fn is_failure(self) -> bool {
        matches!(
            self,
            Self::FailedCannotMakeProgress | Self::BadParam | Self::Adler32Mismatch | Self::Failed
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Start,
    ReadZlibCmf,
    ReadZlibFlg,
    ReadBlockHeader,
    ReadStoredHeader,
    StoredCopy,
    ReadTableSizes,
    ReadCodeLengthLengths,
    ReadCodeLengths,
    ReadCodeLengthRepeat,
    DecodeLitLen,
    WriteLiteral,
    ReadLengthExtra,
    DecodeDistance,
    ReadDistanceExtra,
    CopyMatch,
    BlockDone,
    ReadAdler32,
    Done,
    Latched(InflateStatus),
}

/// Per-call view of the caller's buffers.
struct Buffers<'a> {
    input: &'a [u8],
    in_pos: usize,
    output: &'a mut [u8],
    out_start: usize,
    out_pos: usize,
    out_mask: usize,
    flags: u32,
}

impl Buffers<'_> {
    #[inline]
    fn input_left(&self) -> usize {
        self.input.len() - self.in_pos
    }

    #[inline]
    fn output_left(&self) -> usize {
        self.output.len() - self.out_pos
    }

    #[inline]
    fn non_wrapping(&self) -> bool {
        self.flags & USING_NON_WRAPPING_OUTPUT_BUF != 0
    }

    #[inline]
    fn exhausted(&self) -> InflateStatus {
        if self.flags & HAS_MORE_INPUT != 0 {
            InflateStatus::NeedsMoreInput
        } else {
            InflateStatus::FailedCannotMakeProgress
        }
    }
}

/// Resumable DEFLATE/zlib decompressor.
///
/// The struct is around 11 KiB; box it if it is kept on a small stack.
#[derive(Clone)]
pub struct Inflater {
    state: State,
    bit_buf: u64,
    num_bits: u32,
    zhdr0: u32,
    z_adler32: u32,
    check_adler32: u32,
    final_block: bool,
    counter: usize,
    dist: usize,
    num_extra: u32,
    code_sym: u16,
    literal: u8,
    total_out: u64,
    table_sizes: [usize; 3],
    tables: [DecodeTable; 3],
    len_codes: [u8; MAX_HUFF_SYMBOLS_0 + MAX_HUFF_SYMBOLS_1 + 137],
    raw_header: [u8; 4],
}

impl Inflater {
    /// Create a new decompressor.
    pub fn new() -> Self {
        Self {
            state: State::Start,
            bit_buf: 0,
            num_bits: 0,
            zhdr0: 0,
            z_adler32: 0,
            check_adler32: ADLER32_INIT,
            final_block: false,
            counter: 0,
            dist: 0,
            num_extra: 0,
            code_sym: 0,
            literal: 0,
            total_out: 0,
            table_sizes: [0; 3],
            tables: [DecodeTable::new(), DecodeTable::new(), DecodeTable::new()],
            len_codes: [0; MAX_HUFF_SYMBOLS_0 + MAX_HUFF_SYMBOLS_1 + 137],
            raw_header: [0; 4],
        }
    }

    /// Reset to the initial state so a new stream can be decoded.
    pub fn reset(&mut self) {
        self.state = State::Start;
    }

    /// Whether the end of the stream has been reached.
    pub fn is_done(&self) -> bool {
        self.state == State::Done
    }

    /// Adler-32 of the output produced so far (when it is being computed).
    pub fn adler32(&self) -> u32 {
        self.check_adler32
    }

    /// Adler-32 read from the zlib trailer.
    pub fn expected_adler32(&self) -> u32 {
        self.z_adler32
    }

    /// Total bytes produced since the last reset.
    pub fn total_out(&self) -> u64 {
        self.total_out
    }

    /// Decompress from `input` into `output[out_pos..]`.
    ///
    /// Returns the status and the number of input bytes consumed and output
    /// bytes produced. Bytes of `output` before `out_pos` are treated as
    /// history for back-references.
    pub fn decompress(
        &mut self,
        input: &[u8],
        output: &mut [u8],
        out_pos: usize,
        flags: u32,
    ) -> (InflateStatus, usize, usize) {
        let non_wrapping = flags & USING_NON_WRAPPING_OUTPUT_BUF != 0;
        if out_pos > output.len() || (!non_wrapping && !output.len().is_power_of_two()) {
            return (InflateStatus::BadParam, 0, 0);
        }

        let out_mask = if non_wrapping {
            usize::MAX
        } else {
            output.len() - 1
        };
        let mut buf = Buffers {
            input,
            in_pos: 0,
            output,
            out_start: out_pos,
            out_pos,
            out_mask,
            flags,
        };

        let mut status = self.run(&mut buf);

        // Hand back whole bytes that were read ahead but not used.
        if status != InflateStatus::NeedsMoreInput
            && status != InflateStatus::FailedCannotMakeProgress
        {
            while buf.in_pos > 0 && self.num_bits >= 8 {
                buf.in_pos -= 1;
                self.num_bits -= 8;
            }
            self.bit_buf &= (1u64 << self.num_bits) - 1;
        }

        let produced = buf.out_pos - buf.out_start;
        if flags & (COMPUTE_ADLER32 | PARSE_ZLIB_HEADER) != 0 && produced > 0 {
            let span = &buf.output[buf.out_start..buf.out_pos];
            self.check_adler32 = adler32(self.check_adler32, span);
        }
        self.total_out += produced as u64;

        if status == InflateStatus::Done
            && flags & PARSE_ZLIB_HEADER != 0
            && self.check_adler32 != self.z_adler32
        {
            status = InflateStatus::Adler32Mismatch;
            self.state = State::Latched(status);
        }

        (status, buf.in_pos, produced)
    }

    #[inline]
    fn fail(&mut self) -> InflateStatus {
        self.state = State::Latched(InflateStatus::Failed);
        InflateStatus::Failed
    }

    /// Make at least `n` bits available, reading one byte at a time.
    #[inline]
    fn need_bits(&mut self, buf: &mut Buffers<'_>, n: u32) -> bool {
        while self.num_bits < n {
            if buf.in_pos >= buf.input.len() {
                return false;
            }
            self.bit_buf |= (buf.input[buf.in_pos] as u64) << self.num_bits;
            buf.in_pos += 1;
            self.num_bits += 8;
        }
        true
    }

    /// Read ahead as many whole bytes as fit in the bit buffer.
    #[inline]
    fn refill(&mut self, buf: &mut Buffers<'_>) {
        while self.num_bits <= 55 && buf.in_pos < buf.input.len() {
            self.bit_buf |= (buf.input[buf.in_pos] as u64) << self.num_bits;
            buf.in_pos += 1;
            self.num_bits += 8;
        }
    }

    #[inline]
    fn take_bits(&mut self, n: u32) -> u32 {
        let value = (self.bit_buf & ((1u64 << n) - 1)) as u32;
        self.bit_buf >>= n;
        self.num_bits -= n;
        value
    }

    /// Decode one symbol. `Ok(None)` means the input ran dry mid-code.
    #[inline]
    fn decode(
        &mut self,
        buf: &mut Buffers<'_>,
        table: usize,
    ) -> std::result::Result<Option<u16>, ()> {
        if self.num_bits < 15 {
            self.refill(buf);
        }
        loop {
            match self.tables[table].lookup(self.bit_buf, self.num_bits) {
                Lookup::Symbol { symbol, length } => {
                    self.bit_buf >>= length;
                    self.num_bits -= length;
                    return Ok(Some(symbol));
                }
                Lookup::Invalid => return Err(()),
                Lookup::NeedMoreBits => {
                    if buf.input_left() == 0 {
                        return Ok(None);
                    }
                    self.refill(buf);
                }
            }
        }
    }

    fn start_fixed_block(&mut self) {
        self.table_sizes = [MAX_HUFF_SYMBOLS_0, MAX_HUFF_SYMBOLS_1, 0];
        self.tables[0].code_size = FIXED_LITLEN_LENGTHS;
        self.tables[1].code_size[..MAX_HUFF_SYMBOLS_1].copy_from_slice(&FIXED_DISTANCE_LENGTHS);
        // Complete codes; these cannot fail.
        self.tables[1].build(MAX_HUFF_SYMBOLS_1);
        self.tables[0].build(MAX_HUFF_SYMBOLS_0);
    }

    fn run(&mut self, buf: &mut Buffers<'_>) -> InflateStatus {
        loop {
            match self.state {
                State::Latched(status) => return status,
                State::Done => return InflateStatus::Done,

                State::Start => {
                    self.bit_buf = 0;
                    self.num_bits = 0;
                    self.zhdr0 = 0;
                    self.z_adler32 = 0;
                    self.check_adler32 = ADLER32_INIT;
                    self.final_block = false;
                    self.total_out = 0;
                    self.state = if buf.flags & PARSE_ZLIB_HEADER != 0 {
                        State::ReadZlibCmf
                    } else {
                        State::ReadBlockHeader
                    };
                }

                State::ReadZlibCmf => {
                    if !self.need_bits(buf, 8) {
                        return buf.exhausted();
                    }
                    self.zhdr0 = self.take_bits(8);
                    self.state = State::ReadZlibFlg;
                }

                State::ReadZlibFlg => {
                    if !self.need_bits(buf, 8) {
                        return buf.exhausted();
                    }
                    let zhdr1 = self.take_bits(8);
                    let mut bad = (self.zhdr0 * 256 + zhdr1) % 31 != 0
                        || zhdr1 & 32 != 0
                        || self.zhdr0 & 15 != 8;
                    if !buf.non_wrapping() {
                        let window = 1usize << (8 + (self.zhdr0 >> 4));
                        bad |= window > LZ_DICT_SIZE || window > buf.output.len();
                    }
                    if bad {
                        return self.fail();
                    }
                    self.state = State::ReadBlockHeader;
                }

                State::ReadBlockHeader => {
                    if !self.need_bits(buf, 3) {
                        return buf.exhausted();
                    }
                    let header = self.take_bits(3);
                    self.final_block = header & 1 != 0;
                    match header >> 1 {
                        0 => {
                            let skip = self.num_bits & 7;
                            self.take_bits(skip);
                            self.counter = 0;
                            self.state = State::ReadStoredHeader;
                        }
                        1 => {
                            self.start_fixed_block();
                            self.state = State::DecodeLitLen;
                        }
                        2 => self.state = State::ReadTableSizes,
                        _ => return self.fail(),
                    }
                }

                State::ReadStoredHeader => {
                    while self.counter < 4 {
                        if !self.need_bits(buf, 8) {
                            return buf.exhausted();
                        }
                        self.raw_header[self.counter] = self.take_bits(8) as u8;
                        self.counter += 1;
                    }
                    let len = u16::from_le_bytes([self.raw_header[0], self.raw_header[1]]);
                    let nlen = u16::from_le_bytes([self.raw_header[2], self.raw_header[3]]);
                    if len != !nlen {
                        return self.fail();
                    }
                    self.counter = len as usize;
                    self.state = State::StoredCopy;
                }

                State::StoredCopy => {
                    while self.counter > 0 {
                        if buf.output_left() == 0 {
                            return InflateStatus::HasMoreOutput;
                        }
                        if self.num_bits >= 8 {
                            buf.output[buf.out_pos] = self.take_bits(8) as u8;
                            buf.out_pos += 1;
                            self.counter -= 1;
                            continue;
                        }
                        if buf.input_left() == 0 {
                            return buf.exhausted();
                        }
                        let n = self
                            .counter
                            .min(buf.input_left())
                            .min(buf.output_left());
                        buf.output[buf.out_pos..buf.out_pos + n]
                            .copy_from_slice(&buf.input[buf.in_pos..buf.in_pos + n]);
                        buf.in_pos += n;
                        buf.out_pos += n;
                        self.counter -= n;
                    }
                    self.state = State::BlockDone;
                }

                State::ReadTableSizes => {
                    if !self.need_bits(buf, 14) {
                        return buf.exhausted();
                    }
                    self.table_sizes[0] = self.take_bits(5) as usize + 257;
                    self.table_sizes[1] = self.take_bits(5) as usize + 1;
                    self.table_sizes[2] = self.take_bits(4) as usize + 4;
                    self.tables[2].code_size = [0; MAX_HUFF_SYMBOLS_0];
                    self.counter = 0;
                    self.state = State::ReadCodeLengthLengths;
                }

                State::ReadCodeLengthLengths => {
                    while self.counter < self.table_sizes[2] {
                        if !self.need_bits(buf, 3) {
                            return buf.exhausted();
                        }
                        let sym = CODE_LENGTH_ORDER[self.counter] as usize;
                        self.tables[2].code_size[sym] = self.take_bits(3) as u8;
                        self.counter += 1;
                    }
                    self.table_sizes[2] = MAX_HUFF_SYMBOLS_2;
                    if !self.tables[2].build(MAX_HUFF_SYMBOLS_2) {
                        return self.fail();
                    }
                    self.counter = 0;
                    self.state = State::ReadCodeLengths;
                }

                State::ReadCodeLengths => {
                    let total = self.table_sizes[0] + self.table_sizes[1];
                    while self.counter < total {
                        let sym = match self.decode(buf, 2) {
                            Ok(Some(sym)) => sym,
                            Ok(None) => return buf.exhausted(),
                            Err(()) => return self.fail(),
                        };
                        if sym < 16 {
                            self.len_codes[self.counter] = sym as u8;
                            self.counter += 1;
                            continue;
                        }
                        if sym == 16 && self.counter == 0 {
                            return self.fail();
                        }
                        self.code_sym = sym;
                        break;
                    }

                    if self.counter < total {
                        self.state = State::ReadCodeLengthRepeat;
                        continue;
                    }

                    let (lit, dist) = (self.table_sizes[0], self.table_sizes[1]);
                    self.tables[0].code_size = [0; MAX_HUFF_SYMBOLS_0];
                    self.tables[0].code_size[..lit].copy_from_slice(&self.len_codes[..lit]);
                    self.tables[1].code_size = [0; MAX_HUFF_SYMBOLS_0];
                    self.tables[1].code_size[..dist]
                        .copy_from_slice(&self.len_codes[lit..lit + dist]);
                    if !self.tables[1].build(dist) || !self.tables[0].build(lit) {
                        return self.fail();
                    }
                    self.state = State::DecodeLitLen;
                }

                State::ReadCodeLengthRepeat => {
                    let which = (self.code_sym - 16) as usize;
                    let extra = [2u32, 3, 7][which];
                    if !self.need_bits(buf, extra) {
                        return buf.exhausted();
                    }
                    let repeat = self.take_bits(extra) as usize + [3usize, 3, 11][which];
                    let total = self.table_sizes[0] + self.table_sizes[1];
                    if self.counter + repeat > total {
                        return self.fail();
                    }
                    let fill = if self.code_sym == 16 {
                        self.len_codes[self.counter - 1]
                    } else {
                        0
                    };
                    self.len_codes[self.counter..self.counter + repeat].fill(fill);
                    self.counter += repeat;
                    self.state = State::ReadCodeLengths;
                }

                State::DecodeLitLen => loop {
                    let sym = match self.decode(buf, 0) {
                        Ok(Some(sym)) => sym,
                        Ok(None) => return buf.exhausted(),
                        Err(()) => return self.fail(),
                    };
                    if sym < 256 {
                        if buf.output_left() == 0 {
                            self.literal = sym as u8;
                            self.state = State::WriteLiteral;
                            return InflateStatus::HasMoreOutput;
                        }
                        buf.output[buf.out_pos] = sym as u8;
                        buf.out_pos += 1;
                        continue;
                    }
                    if sym == 256 {
                        self.state = State::BlockDone;
                        break;
                    }
                    let idx = (sym - 257) as usize;
                    if idx >= LENGTH_BASE.len() {
                        return self.fail();
                    }
                    self.counter = LENGTH_BASE[idx] as usize;
                    self.num_extra = LENGTH_EXTRA_BITS[idx] as u32;
                    self.state = State::ReadLengthExtra;
                    break;
                },

                State::WriteLiteral => {
                    if buf.output_left() == 0 {
                        return InflateStatus::HasMoreOutput;
                    }
                    buf.output[buf.out_pos] = self.literal;
                    buf.out_pos += 1;
                    self.state = State::DecodeLitLen;
                }

                State::ReadLengthExtra => {
                    if !self.need_bits(buf, self.num_extra) {
                        return buf.exhausted();
                    }
                    self.counter += self.take_bits(self.num_extra) as usize;
                    self.state = State::DecodeDistance;
                }

                State::DecodeDistance => {
                    let sym = match self.decode(buf, 1) {
                        Ok(Some(sym)) => sym as usize,
                        Ok(None) => return buf.exhausted(),
                        Err(()) => return self.fail(),
                    };
                    if sym >= DISTANCE_BASE.len() {
                        return self.fail();
                    }
                    self.dist = DISTANCE_BASE[sym] as usize;
                    self.num_extra = DISTANCE_EXTRA_BITS[sym] as u32;
                    self.state = State::ReadDistanceExtra;
                }

                State::ReadDistanceExtra => {
                    if !self.need_bits(buf, self.num_extra) {
                        return buf.exhausted();
                    }
                    self.dist += self.take_bits(self.num_extra) as usize;

                    let produced = self.total_out + (buf.out_pos - buf.out_start) as u64;
                    let out_of_range = if buf.non_wrapping() {
                        self.dist > buf.out_pos
                    } else {
                        self.dist > buf.output.len()
                    };
                    if self.dist as u64 > produced || out_of_range {
                        return self.fail();
                    }
                    self.state = State::CopyMatch;
                }

                State::CopyMatch => {
                    while self.counter > 0 {
                        let avail = buf.output_left();
                        if avail == 0 {
                            return InflateStatus::HasMoreOutput;
                        }
                        let n = self.counter.min(avail);
                        let dst = buf.out_pos;
                        let src = dst.wrapping_sub(self.dist) & buf.out_mask;
                        let disjoint = src + n <= dst || src >= dst + n;
                        if disjoint && src + n <= buf.output.len() {
                            buf.output.copy_within(src..src + n, dst);
                        } else {
                            for i in 0..n {
                                buf.output[dst + i] = buf.output[(src + i) & buf.out_mask];
                            }
                        }
                        buf.out_pos += n;
                        self.counter -= n;
                    }
                    self.state = State::DecodeLitLen;
                }

                State::BlockDone => {
                    if !self.final_block {
                        self.state = State::ReadBlockHeader;
                        continue;
                    }
                    let skip = self.num_bits & 7;
                    self.take_bits(skip);
                    if buf.flags & PARSE_ZLIB_HEADER != 0 {
                        self.counter = 0;
                        self.state = State::ReadAdler32;
                    } else {
                        self.state = State::Done;
                    }
                }

                State::ReadAdler32 => {
                    while self.counter < 4 {
                        if !self.need_bits(buf, 8) {
                            return buf.exhausted();
                        }
                        self.z_adler32 = (self.z_adler32 << 8) | self.take_bits(8);
                        self.counter += 1;
                    }
                    self.state = State::Done;
                }
            }
        }
    }
}

impl Default for Inflater {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Inflater {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Inflater")
            .field("state", &self.state)
            .field("num_bits", &self.num_bits)
            .field("total_out", &self.total_out)
            .finish_non_exhaustive()
    }
}

fn status_to_error(status: InflateStatus, inflater: &Inflater, consumed: usize) -> PkflateError {
    match status {
        InflateStatus::NeedsMoreInput | InflateStatus::FailedCannotMakeProgress => {
            PkflateError::unexpected_eof(consumed)
        }
        InflateStatus::Adler32Mismatch => {
            PkflateError::adler_mismatch(inflater.expected_adler32(), inflater.adler32())
        }
        InflateStatus::BadParam => PkflateError::invalid_parameter("unusable output buffer"),
        _ => PkflateError::corrupted(consumed as u64, "invalid deflate stream"),
    }
}

/// Decompress into a growable buffer, doubling its size whenever it fills.
///
/// Fails with [`PkflateError::BufferTooSmall`] once the output would exceed
/// `max_output` bytes.
pub fn decompress_to_vec_with_limit(
    data: &[u8],
    flags: u32,
    max_output: usize,
) -> Result<Vec<u8>> {
    let flags = (flags & !HAS_MORE_INPUT) | USING_NON_WRAPPING_OUTPUT_BUF;
    let mut inflater = Box::new(Inflater::new());
    let mut out = vec![0u8; 128.min(max_output)];
    let mut in_pos = 0;
    let mut out_pos = 0;

    loop {
        let (status, consumed, produced) =
            inflater.decompress(&data[in_pos..], &mut out, out_pos, flags);
        in_pos += consumed;
        out_pos += produced;

        match status {
            InflateStatus::Done => {
                out.truncate(out_pos);
                return Ok(out);
            }
            InflateStatus::HasMoreOutput => {
                if out.len() >= max_output {
                    return Err(PkflateError::buffer_too_small(out.len() + 1, max_output));
                }
                let new_len = out.len().saturating_mul(2).max(128).min(max_output);
                out.resize(new_len, 0);
            }
            _ => return Err(status_to_error(status, &inflater, in_pos)),
        }
    }
}

/// Decompress into a new `Vec`. Pass [`inflate_flags::PARSE_ZLIB_HEADER`]
/// for zlib streams.
pub fn decompress_to_vec(data: &[u8], flags: u32) -> Result<Vec<u8>> {
    decompress_to_vec_with_limit(data, flags, usize::MAX)
}

/// Decompress into a fixed buffer in one shot. Returns the output length.
pub fn decompress_to_slice(out: &mut [u8], data: &[u8], flags: u32) -> Result<usize> {
    let flags = (flags & !HAS_MORE_INPUT) | USING_NON_WRAPPING_OUTPUT_BUF;
    let mut inflater = Box::new(Inflater::new());
    let (status, consumed, produced) = inflater.decompress(data, out, 0, flags);
    match status {
        InflateStatus::Done => Ok(produced),
        InflateStatus::HasMoreOutput => {
            Err(PkflateError::buffer_too_small(out.len() + 1, out.len()))
        }
        _ => Err(status_to_error(status, &inflater, consumed)),
    }
}

/// Decompress through a 32 KiB ring buffer, handing each filled span to
/// `sink`. Returns the number of input bytes consumed.
///
/// A `false` return from `sink` aborts with an I/O error.
pub fn decompress_to_callback<F>(data: &[u8], flags: u32, mut sink: F) -> Result<usize>
where
    F: FnMut(&[u8]) -> bool,
{
    let flags = flags & !(HAS_MORE_INPUT | USING_NON_WRAPPING_OUTPUT_BUF);
    let mut inflater = Box::new(Inflater::new());
    let mut dict = vec![0u8; LZ_DICT_SIZE];
    let mut dict_ofs = 0;
    let mut in_pos = 0;

    loop {
        let (status, consumed, produced) =
            inflater.decompress(&data[in_pos..], &mut dict, dict_ofs, flags);
        in_pos += consumed;

        if produced > 0 && !sink(&dict[dict_ofs..dict_ofs + produced]) {
            return Err(PkflateError::Io(io::Error::other(
                "decompression sink rejected output",
            )));
        }
        dict_ofs = (dict_ofs + produced) & (LZ_DICT_SIZE - 1);

        match status {
            InflateStatus::Done => return Ok(in_pos),
            InflateStatus::HasMoreOutput => {}
            _ => return Err(status_to_error(status, &inflater, in_pos)),
        }
    }
}

/// Decompress a raw DEFLATE stream.
pub fn inflate(data: &[u8]) -> Result<Vec<u8>> {
    decompress_to_vec(data, 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ZLIB_HELLO: [u8; 13] = [
        0x78, 0x9C, 0xCB, 0x48, 0xCD, 0xC9, 0xC9, 0x07, 0x00, 0x06, 0x2C, 0x02, 0x15,
    ];

    #[test]
    fn test_inflate_stored() {
        // BFINAL=1 BTYPE=00, LEN=5, NLEN=!5, "Hello"
        let compressed = [
            0x01, 0x05, 0x00, 0xFA, 0xFF, b'H', b'e', b'l', b'l', b'o',
        ];
        assert_eq!(inflate(&compressed).unwrap(), b"Hello");
    }

    #[test]
    fn test_inflate_empty_blocks() {
        assert!(inflate(&[0x01, 0x00, 0x00, 0xFF, 0xFF]).unwrap().is_empty());
        // Empty fixed-Huffman block.
        assert!(inflate(&[0x03, 0x00]).unwrap().is_empty());
    }

    #[test]
    fn test_zlib_fixed_block() {
        let out = decompress_to_vec(&ZLIB_HELLO, PARSE_ZLIB_HEADER).unwrap();
        assert_eq!(out, b"hello");
    }

    #[test]
    fn test_back_reference_overlap() {
        // "abc" then a length-15 match at distance 3.
        let compressed = [0x4B, 0x4C, 0x4A, 0x4E, 0x44, 0x45, 0x00];
        assert_eq!(inflate(&compressed).unwrap(), b"abcabcabcabcabcabc");
    }

    #[test]
    fn test_bad_stored_length() {
        let compressed = [0x01, 0x05, 0x00, 0xFB, 0xFF, b'H', b'e', b'l', b'l', b'o'];
        assert!(inflate(&compressed).unwrap_err().is_data_error());
    }

    #[test]
    fn test_reserved_block_type() {
        let mut inflater = Inflater::new();
        let mut out = [0u8; 16];
        let flags = USING_NON_WRAPPING_OUTPUT_BUF;
        let (status, _, _) = inflater.decompress(&[0x07, 0x00], &mut out, 0, flags);
        assert_eq!(status, InflateStatus::Failed);

        // Failure latches.
        let (status, consumed, produced) = inflater.decompress(&[0x03, 0x00], &mut out, 0, flags);
        assert_eq!(status, InflateStatus::Failed);
        assert_eq!((consumed, produced), (0, 0));

        inflater.reset();
        let (status, _, _) = inflater.decompress(&[0x03, 0x00], &mut out, 0, flags);
        assert_eq!(status, InflateStatus::Done);
    }

    #[test]
    fn test_distance_too_far_back() {
        // Fixed block: literal 'a' then match length 3, distance 2.
        // Bits: header 1,01 ; 'a' = 0x91 (8 bits) ; len 257 = 0000001 ; dist code 1 = 00001.
        let mut bits: Vec<u8> = Vec::new();
        let mut push = |value: u32, len: u32, msb_first: bool| {
            for i in 0..len {
                let bit = if msb_first {
                    (value >> (len - 1 - i)) & 1
                } else {
                    (value >> i) & 1
                };
                bits.push(bit as u8);
            }
        };
        push(1, 1, false);
        push(1, 2, false);
        push(0x30 + b'a' as u32, 8, true);
        push(1, 7, true);
        push(1, 5, true);
        push(0, 7, true);
        let mut bytes = vec![0u8; bits.len().div_ceil(8)];
        for (i, bit) in bits.iter().enumerate() {
            bytes[i / 8] |= bit << (i % 8);
        }

        let err = inflate(&bytes).unwrap_err();
        assert!(err.is_data_error(), "{err}");
    }

    #[test]
    fn test_zlib_header_checks() {
        let mut bad = ZLIB_HELLO;
        bad[1] ^= 1;
        assert!(decompress_to_vec(&bad, PARSE_ZLIB_HEADER).is_err());

        // FDICT set (with a valid FCHECK).
        let mut fdict = ZLIB_HELLO;
        fdict[1] = 0xBB;
        assert_eq!((0x78u32 * 256 + 0xBB) % 31, 0);
        assert!(decompress_to_vec(&fdict, PARSE_ZLIB_HEADER).is_err());
    }

    #[test]
    fn test_adler_mismatch() {
        let mut corrupt = ZLIB_HELLO;
        corrupt[12] ^= 0xFF;
        let err = decompress_to_vec(&corrupt, PARSE_ZLIB_HEADER).unwrap_err();
        assert!(matches!(err, PkflateError::AdlerMismatch { .. }));
    }

    #[test]
    fn test_truncated_input() {
        let err = decompress_to_vec(&ZLIB_HELLO[..8], PARSE_ZLIB_HEADER).unwrap_err();
        assert!(matches!(err, PkflateError::UnexpectedEof { .. }));

        let mut inflater = Inflater::new();
        let mut out = [0u8; 32];
        let (status, _, _) = inflater.decompress(
            &ZLIB_HELLO[..8],
            &mut out,
            0,
            PARSE_ZLIB_HEADER | HAS_MORE_INPUT | USING_NON_WRAPPING_OUTPUT_BUF,
        );
        assert_eq!(status, InflateStatus::NeedsMoreInput);
    }

    #[test]
    fn test_wrapping_buffer_must_be_power_of_two() {
        let mut inflater = Inflater::new();
        let mut out = [0u8; 100];
        let (status, consumed, produced) =
            inflater.decompress(&ZLIB_HELLO, &mut out, 0, PARSE_ZLIB_HEADER);
        assert_eq!(status, InflateStatus::BadParam);
        assert_eq!((consumed, produced), (0, 0));
    }

    #[test]
    fn test_zlib_window_must_fit_ring() {
        let mut inflater = Inflater::new();
        let mut out = [0u8; 256];
        // CINFO=7 asks for a 32 KiB window.
        let (status, _, _) = inflater.decompress(&ZLIB_HELLO, &mut out, 0, PARSE_ZLIB_HEADER);
        assert_eq!(status, InflateStatus::Failed);
    }

    #[test]
    fn test_exact_output_buffer() {
        let mut out = [0u8; 5];
        let n = decompress_to_slice(&mut out, &ZLIB_HELLO, PARSE_ZLIB_HEADER).unwrap();
        assert_eq!(&out[..n], b"hello");

        let mut small = [0u8; 4];
        let err = decompress_to_slice(&mut small, &ZLIB_HELLO, PARSE_ZLIB_HEADER).unwrap_err();
        assert!(matches!(err, PkflateError::BufferTooSmall { .. }));
    }

    #[test]
    fn test_trailing_bytes_are_not_consumed() {
        let mut data = ZLIB_HELLO.to_vec();
        data.extend_from_slice(b"TRAILER");
        let consumed = decompress_to_callback(&data, PARSE_ZLIB_HEADER, |_| true).unwrap();
        assert_eq!(consumed, ZLIB_HELLO.len());
    }

    #[test]
    fn test_limit() {
        let err = decompress_to_vec_with_limit(&ZLIB_HELLO, PARSE_ZLIB_HEADER, 3).unwrap_err();
        assert!(matches!(err, PkflateError::BufferTooSmall { .. }));
        let ok = decompress_to_vec_with_limit(&ZLIB_HELLO, PARSE_ZLIB_HEADER, 5).unwrap();
        assert_eq!(ok, b"hello");
    }
}
