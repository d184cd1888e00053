//! Constant tables for DEFLATE (RFC 1951).
//!
//! The decoder uses the base/extra-bit tables directly. The encoder uses the
//! precomputed symbol lookups (`LEN_SYM`, `SMALL_DIST_SYM`, `LARGE_DIST_SYM`)
//! so that mapping a match to its symbol is a single array index.

/// Size of the literal/length alphabet including the two reserved codes.
pub const MAX_HUFF_SYMBOLS_0: usize = 288;
/// Size of the distance alphabet including the two reserved codes.
pub const MAX_HUFF_SYMBOLS_1: usize = 32;
/// Size of the code length alphabet.
pub const MAX_HUFF_SYMBOLS_2: usize = 19;

/// Maximum code length in DEFLATE.
pub const MAX_SUPPORTED_HUFF_CODESIZE: usize = 32;

/// End of block symbol.
pub const END_OF_BLOCK: u16 = 256;

/// Length code base values for symbols 257-285.
pub const LENGTH_BASE: [u16; 29] = [
    3, 4, 5, 6, 7, 8, 9, 10, // 257-264: 0 extra bits
    11, 13, 15, 17, // 265-268: 1 extra bit
    19, 23, 27, 31, // 269-272: 2 extra bits
    35, 43, 51, 59, // 273-276: 3 extra bits
    67, 83, 99, 115, // 277-280: 4 extra bits
    131, 163, 195, 227, // 281-284: 5 extra bits
    258, // 285: 0 extra bits
];

/// Number of extra bits for length symbols 257-285.
pub const LENGTH_EXTRA_BITS: [u8; 29] = [
    0, 0, 0, 0, 0, 0, 0, 0, // 257-264
    1, 1, 1, 1, // 265-268
    2, 2, 2, 2, // 269-272
    3, 3, 3, 3, // 273-276
    4, 4, 4, 4, // 277-280
    5, 5, 5, 5, // 281-284
    0, // 285
];

/// Distance code base values for symbols 0-29.
pub const DISTANCE_BASE: [u16; 30] = [
    1, 2, 3, 4, 5, 7, 9, 13, 17, 25, 33, 49, 65, 97, 129, 193, 257, 385, 513, 769, 1025, 1537,
    2049, 3073, 4097, 6145, 8193, 12289, 16385, 24577,
];

/// Number of extra bits for distance symbols 0-29.
pub const DISTANCE_EXTRA_BITS: [u8; 30] = [
    0, 0, 0, 0, 1, 1, 2, 2, 3, 3, 4, 4, 5, 5, 6, 6, 7, 7, 8, 8, 9, 9, 10, 10, 11, 11, 12, 12, 13,
    13,
];

/// Order in which code length code lengths are transmitted.
pub const CODE_LENGTH_ORDER: [u8; 19] = [
    16, 17, 18, 0, 8, 7, 9, 6, 10, 5, 11, 4, 12, 3, 13, 2, 14, 1, 15,
];

const fn length_symbol_index(length: u16) -> usize {
    let mut i = LENGTH_BASE.len() - 1;
    while LENGTH_BASE[i] > length {
        i -= 1;
    }
    i
}

const fn distance_symbol_index(distance: u32) -> usize {
    let mut i = DISTANCE_BASE.len() - 1;
    while DISTANCE_BASE[i] as u32 > distance {
        i -= 1;
    }
    i
}

/// Length symbol for `match_len - 3`.
pub const LEN_SYM: [u16; 256] = {
    let mut table = [0u16; 256];
    let mut i = 0;
    while i < 256 {
        table[i] = 257 + length_symbol_index(i as u16 + 3) as u16;
        i += 1;
    }
    table
};

/// Extra bit count for `match_len - 3`.
pub const LEN_EXTRA: [u8; 256] = {
    let mut table = [0u8; 256];
    let mut i = 0;
    while i < 256 {
        table[i] = LENGTH_EXTRA_BITS[length_symbol_index(i as u16 + 3)];
        i += 1;
    }
    table
};

/// Distance symbol for `dist - 1` when it is below 512.
pub const SMALL_DIST_SYM: [u8; 512] = {
    let mut table = [0u8; 512];
    let mut i = 0;
    while i < 512 {
        table[i] = distance_symbol_index(i as u32 + 1) as u8;
        i += 1;
    }
    table
};

/// Extra bit count for `dist - 1` when it is below 512.
pub const SMALL_DIST_EXTRA: [u8; 512] = {
    let mut table = [0u8; 512];
    let mut i = 0;
    while i < 512 {
        table[i] = DISTANCE_EXTRA_BITS[distance_symbol_index(i as u32 + 1)];
        i += 1;
    }
    table
};

/// Distance symbol for `(dist - 1) >> 8` when `dist - 1` is 512 or more.
pub const LARGE_DIST_SYM: [u8; 128] = {
    let mut table = [0u8; 128];
    let mut i = 0;
    while i < 128 {
        table[i] = distance_symbol_index(((i as u32) << 8) + 1) as u8;
        i += 1;
    }
    table
};

/// Extra bit count for `(dist - 1) >> 8` when `dist - 1` is 512 or more.
pub const LARGE_DIST_EXTRA: [u8; 128] = {
    let mut table = [0u8; 128];
    let mut i = 0;
    while i < 128 {
        table[i] = DISTANCE_EXTRA_BITS[distance_symbol_index(((i as u32) << 8) + 1)];
        i += 1;
    }
    table
};

/// Fixed literal/length code lengths (RFC 1951 Section 3.2.6).
///
/// - Symbols 0-143: 8 bits
/// - Symbols 144-255: 9 bits
/// - Symbols 256-279: 7 bits
/// - Symbols 280-287: 8 bits
pub const FIXED_LITLEN_LENGTHS: [u8; 288] = {
    let mut lengths = [8u8; 288];
    let mut i = 144;
    while i < 256 {
        lengths[i] = 9;
        i += 1;
    }
    while i < 280 {
        lengths[i] = 7;
        i += 1;
    }
    lengths
};

/// Fixed distance code lengths. All 32 distance codes use 5 bits.
pub const FIXED_DISTANCE_LENGTHS: [u8; 32] = [5; 32];

/// Map a match length (3-258) to `(symbol, extra_bits, extra_value)`.
#[inline]
pub fn length_to_code(length: u16) -> (u16, u8, u16) {
    debug_assert!((3..=258).contains(&length), "Length out of range: {length}");
    let i = (length - 3) as usize;
    let sym = LEN_SYM[i];
    (sym, LEN_EXTRA[i], length - LENGTH_BASE[(sym - 257) as usize])
}

/// Map a distance (1-32768) to `(symbol, extra_bits, extra_value)`.
#[inline]
pub fn distance_to_code(distance: u32) -> (u16, u8, u16) {
    debug_assert!(
        (1..=32768).contains(&distance),
        "Distance out of range: {distance}"
    );
    let d = (distance - 1) as usize;
    let (sym, extra) = if d < 512 {
        (SMALL_DIST_SYM[d], SMALL_DIST_EXTRA[d])
    } else {
        (LARGE_DIST_SYM[d >> 8], LARGE_DIST_EXTRA[d >> 8])
    };
    let base = DISTANCE_BASE[sym as usize] as u32;
    (sym as u16, extra, (distance - base) as u16)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_litlen_lengths() {
        let lengths = FIXED_LITLEN_LENGTHS;
        assert_eq!(lengths[0], 8);
        assert_eq!(lengths[143], 8);
        assert_eq!(lengths[144], 9);
        assert_eq!(lengths[255], 9);
        assert_eq!(lengths[256], 7);
        assert_eq!(lengths[279], 7);
        assert_eq!(lengths[280], 8);
        assert_eq!(lengths[287], 8);
    }

    #[test]
    fn test_length_codes_round_trip_through_base() {
        for length in 3..=258u16 {
            let (code, extra_bits, extra_value) = length_to_code(length);
            let idx = (code - 257) as usize;
            assert_eq!(LENGTH_EXTRA_BITS[idx], extra_bits);
            assert!(extra_bits == 0 || extra_value < (1 << extra_bits));
            assert_eq!(LENGTH_BASE[idx] + extra_value, length);
        }
    }

    #[test]
    fn test_distance_codes_round_trip_through_base() {
        for distance in 1..=32768u32 {
            let (code, extra_bits, extra_value) = distance_to_code(distance);
            let idx = code as usize;
            assert_eq!(DISTANCE_EXTRA_BITS[idx], extra_bits);
            assert_eq!(DISTANCE_BASE[idx] as u32 + extra_value as u32, distance);
        }
    }

    #[test]
    fn test_specific_codes() {
        assert_eq!(length_to_code(3), (257, 0, 0));
        assert_eq!(length_to_code(11), (265, 1, 0));
        assert_eq!(length_to_code(12), (265, 1, 1));
        assert_eq!(length_to_code(257), (284, 5, 30));
        assert_eq!(length_to_code(258), (285, 0, 0));

        assert_eq!(distance_to_code(1), (0, 0, 0));
        assert_eq!(distance_to_code(5), (4, 1, 0));
        assert_eq!(distance_to_code(513), (18, 8, 0));
        assert_eq!(distance_to_code(32768), (29, 13, 8191));
    }
}
