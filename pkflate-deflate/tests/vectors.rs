//! Decoding streams produced by an independent zlib encoder.

use pkflate_core::checksum::Adler32;
use pkflate_deflate::{decompress_to_vec, inflate_flags, zlib_compress, zlib_decompress};

/// 120 pseudo-random words compressed by a reference zlib at level 9. The
/// stream is a single dynamic Huffman block.
const WORDS_ZLIB: [u8; 155] = [
    0x78, 0xDA, 0x6D, 0x51, 0x49, 0x0E, 0x80, 0x20, 0x0C, 0xFC, 0x8A, 0x5F,
    0x2B, 0x91, 0x88, 0x09, 0x2A, 0x89, 0x9C, 0xFA, 0x7A, 0x97, 0xB2, 0x0C,
    0x2D, 0x07, 0x2B, 0x96, 0xD9, 0x5A, 0x57, 0x1F, 0x33, 0x2D, 0xFE, 0x7D,
    0xD6, 0x76, 0x72, 0x5F, 0xA1, 0x98, 0x42, 0xAD, 0x39, 0x7C, 0x1D, 0x9F,
    0xEE, 0x3D, 0x5E, 0x27, 0x00, 0x3D, 0x12, 0x5C, 0xEB, 0x14, 0x5C, 0x7D,
    0x4F, 0xD9, 0xE5, 0x6B, 0xA3, 0xE3, 0xA0, 0x85, 0x11, 0xF0, 0xEB, 0x08,
    0xC7, 0x56, 0x61, 0x63, 0x36, 0xD6, 0x61, 0xB5, 0x3D, 0x52, 0xC4, 0xCE,
    0x10, 0xB1, 0x2D, 0x70, 0x08, 0xC1, 0x3A, 0x83, 0x36, 0x10, 0xF6, 0x7C,
    0xDA, 0x31, 0x52, 0xB9, 0xCB, 0x84, 0x73, 0xA3, 0xB4, 0xEB, 0x77, 0xB8,
    0x79, 0x3B, 0x7B, 0x57, 0x82, 0x90, 0xD5, 0x86, 0x5B, 0xA7, 0xD8, 0x8F,
    0x30, 0xA7, 0xFC, 0xEC, 0x8F, 0x6B, 0x21, 0xC4, 0xB2, 0xEB, 0xA1, 0xA8,
    0x01, 0xC3, 0xA5, 0xA8, 0x77, 0x77, 0xBD, 0xEA, 0xD9, 0x92, 0xF4, 0x60,
    0x66, 0xAC, 0x71, 0x8B, 0x12, 0xED, 0x01, 0x22, 0x97, 0x00, 0x83,
];

fn words() -> Vec<u8> {
    const WORDS: [&str; 8] = [
        "alpha", "beta", "gamma", "delta", "epsilon", "zeta", "eta", "theta",
    ];
    let mut seed = 0x1234u32;
    let mut out = Vec::new();
    for _ in 0..120 {
        seed = seed.wrapping_mul(1_103_515_245).wrapping_add(12345) & 0x7fff_ffff;
        out.extend_from_slice(WORDS[((seed >> 16) % 8) as usize].as_bytes());
        out.push(b' ');
    }
    out
}

#[test]
fn test_reference_stream_uses_dynamic_block() {
    // BTYPE sits in bits 1-2 of the first deflate byte.
    assert_eq!((WORDS_ZLIB[2] >> 1) & 3, 2);
}

#[test]
fn test_decode_reference_dynamic_stream() {
    let expected = words();
    assert_eq!(expected.len(), 703);

    let decoded = zlib_decompress(&WORDS_ZLIB).unwrap();
    assert_eq!(decoded, expected);
    assert_eq!(Adler32::checksum(&decoded), 0x2297_0083);
}

#[test]
fn test_decode_reference_stream_as_raw_deflate() {
    let raw = &WORDS_ZLIB[2..WORDS_ZLIB.len() - 4];
    assert_eq!(decompress_to_vec(raw, 0).unwrap(), words());
    // Asking for Adler-32 on a raw stream must not change the output.
    assert_eq!(
        decompress_to_vec(raw, inflate_flags::COMPUTE_ADLER32).unwrap(),
        words()
    );
}

#[test]
fn test_reencode_at_level_nine_is_competitive() {
    let data = words();
    let ours = zlib_compress(&data, 9).unwrap();
    assert_eq!(zlib_decompress(&ours).unwrap(), data);
    // Within a few bytes of the reference encoder.
    assert!(ours.len() <= WORDS_ZLIB.len() + 24, "{} bytes", ours.len());
}
