//! Streaming behaviour of the compressor and decompressor.

use pkflate_core::config::{CompressionLevel, CompressionStrategy, FlushMode};
use pkflate_deflate::inflate::LZ_DICT_SIZE;
use pkflate_deflate::{
    CompressStatus, Deflater, InflateStatus, Inflater, compress_to_vec, compress_to_vec_zlib,
    compress_to_vec_with_flags, create_comp_flags, decompress_to_callback, decompress_to_vec,
    inflate, inflate_flags,
};

fn lcg_words(len: usize) -> Vec<u8> {
    const WORDS: [&str; 8] = [
        "alpha", "beta", "gamma", "delta", "epsilon", "zeta", "eta", "theta",
    ];
    let mut seed = 0x1234u32;
    let mut out = Vec::with_capacity(len + 8);
    while out.len() < len {
        seed = seed.wrapping_mul(1_103_515_245).wrapping_add(12345) & 0x7fff_ffff;
        out.extend_from_slice(WORDS[((seed >> 16) % 8) as usize].as_bytes());
        out.push(b' ');
    }
    out.truncate(len);
    out
}

fn mixed_data(len: usize) -> Vec<u8> {
    let mut seed = 0xDEAD_BEEFu32;
    let text = lcg_words(len);
    text.iter()
        .enumerate()
        .map(|(i, &b)| {
            if (i / 4096) % 3 == 2 {
                seed = seed.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
                (seed >> 24) as u8
            } else {
                b
            }
        })
        .collect()
}

const STRATEGIES: [CompressionStrategy; 5] = [
    CompressionStrategy::Default,
    CompressionStrategy::Filtered,
    CompressionStrategy::HuffmanOnly,
    CompressionStrategy::Rle,
    CompressionStrategy::Fixed,
];

/// Drive a compressor with `chunk`-sized input and `out_size`-sized output.
fn compress_streaming(data: &[u8], flags: u32, chunk: usize, out_size: usize) -> Vec<u8> {
    let mut deflater = Deflater::new(flags);
    let mut out = Vec::new();
    let mut buf = vec![0u8; out_size];
    let mut in_pos = 0;
    loop {
        let end = (in_pos + chunk).min(data.len());
        let flush = if end == data.len() {
            FlushMode::Finish
        } else {
            FlushMode::None
        };
        let (status, consumed, written) = deflater.compress(&data[in_pos..end], &mut buf, flush);
        in_pos += consumed;
        out.extend_from_slice(&buf[..written]);
        match status {
            CompressStatus::Done => return out,
            CompressStatus::Okay => {}
            other => panic!("compressor failed with {other:?}"),
        }
    }
}

#[test]
fn test_round_trip_every_level_and_strategy() {
    let data = mixed_data(80_000);
    for level in 0..=10u8 {
        for strategy in STRATEGIES {
            let flags = create_comp_flags(CompressionLevel::new(level), false, strategy);
            let compressed = compress_to_vec_with_flags(&data, flags).unwrap();
            assert_eq!(
                inflate(&compressed).unwrap(),
                data,
                "level {level} {strategy:?}"
            );
        }
    }
}

#[test]
fn test_tiny_output_buffer_matches_one_shot() {
    let data = mixed_data(150_000);
    for level in [1u8, 6, 9] {
        let flags =
            create_comp_flags(CompressionLevel::new(level), true, CompressionStrategy::Default);
        let one_shot = compress_to_vec_zlib(&data, CompressionLevel::new(level)).unwrap();
        for out_size in [1, 7, 4096] {
            let streamed = compress_streaming(&data, flags, 5000, out_size);
            assert_eq!(streamed, one_shot, "level {level} out {out_size}");
        }
    }
}

#[test]
fn test_byte_by_byte_inflate_matches_one_shot() {
    let data = mixed_data(100_000);
    let compressed = compress_to_vec_zlib(&data, CompressionLevel::BEST).unwrap();
    let one_shot = decompress_to_vec(&compressed, inflate_flags::PARSE_ZLIB_HEADER).unwrap();
    assert_eq!(one_shot, data);

    let mut inflater = Inflater::new();
    let mut ring = vec![0u8; LZ_DICT_SIZE];
    let mut ring_pos = 0;
    let mut out = Vec::new();
    let mut in_pos = 0;
    let flags = inflate_flags::PARSE_ZLIB_HEADER | inflate_flags::HAS_MORE_INPUT;

    loop {
        let end = (in_pos + 1).min(compressed.len());
        let (status, consumed, produced) =
            inflater.decompress(&compressed[in_pos..end], &mut ring, ring_pos, flags);
        in_pos += consumed;
        out.extend_from_slice(&ring[ring_pos..ring_pos + produced]);
        ring_pos = (ring_pos + produced) & (LZ_DICT_SIZE - 1);
        match status {
            InflateStatus::Done => break,
            InflateStatus::NeedsMoreInput | InflateStatus::HasMoreOutput => {}
            other => panic!("inflater failed with {other:?}"),
        }
    }
    assert_eq!(in_pos, compressed.len());
    assert_eq!(out, data);
    assert_eq!(inflater.adler32(), inflater.expected_adler32());
}

#[test]
fn test_one_byte_output_inflate() {
    let data = lcg_words(5_000);
    let compressed = compress_to_vec(&data, CompressionLevel::DEFAULT).unwrap();

    let mut inflater = Inflater::new();
    let mut out = vec![0u8; data.len()];
    let mut in_pos = 0;
    let mut out_pos = 0;
    let flags = inflate_flags::USING_NON_WRAPPING_OUTPUT_BUF;
    loop {
        let limit = (out_pos + 1).min(out.len());
        let (status, consumed, produced) =
            inflater.decompress(&compressed[in_pos..], &mut out[..limit], out_pos, flags);
        in_pos += consumed;
        out_pos += produced;
        match status {
            InflateStatus::Done => break,
            InflateStatus::HasMoreOutput => {}
            other => panic!("inflater failed with {other:?}"),
        }
    }
    assert_eq!(out_pos, data.len());
    assert_eq!(out, data);
}

#[test]
fn test_flush_modes_round_trip() {
    let data = lcg_words(20_000);
    for flush in [FlushMode::Sync, FlushMode::Full] {
        let mut deflater = Deflater::with_level(CompressionLevel::DEFAULT);
        let mut out = Vec::new();
        let mut buf = vec![0u8; 64 * 1024];

        for piece in data.chunks(3000) {
            let (status, consumed, written) = deflater.compress(piece, &mut buf, flush);
            assert_eq!(status, CompressStatus::Okay);
            assert_eq!(consumed, piece.len());
            out.extend_from_slice(&buf[..written]);
            assert_eq!(&out[out.len() - 4..], &[0x00, 0x00, 0xFF, 0xFF]);
        }
        let (status, _, written) = deflater.compress(&[], &mut buf, FlushMode::Finish);
        assert_eq!(status, CompressStatus::Done);
        out.extend_from_slice(&buf[..written]);

        assert_eq!(inflate(&out).unwrap(), data, "{flush:?}");
    }
}

#[test]
fn test_full_flush_restarts_matching() {
    // After a full flush the next segment cannot refer back to the first.
    let segment = lcg_words(4_000);
    let mut deflater = Deflater::with_level(CompressionLevel::DEFAULT);
    let mut buf = vec![0u8; 64 * 1024];

    let (_, _, first) = deflater.compress(&segment, &mut buf, FlushMode::Full);
    let first_part = buf[..first].to_vec();
    let (status, _, second) = deflater.compress(&segment, &mut buf, FlushMode::Finish);
    assert_eq!(status, CompressStatus::Done);

    // The second segment compresses exactly as well as the first did.
    assert!(second + 16 >= first, "first {first} second {second}");

    let mut stream = first_part;
    stream.extend_from_slice(&buf[..second]);
    let mut expected = segment.clone();
    expected.extend_from_slice(&segment);
    assert_eq!(inflate(&stream).unwrap(), expected);
}

#[test]
fn test_callback_inflate_reports_consumed() {
    let data = mixed_data(70_000);
    let mut compressed = compress_to_vec(&data, CompressionLevel::DEFAULT).unwrap();
    let stream_len = compressed.len();
    compressed.extend_from_slice(b"trailing junk");

    let mut out = Vec::new();
    let consumed = decompress_to_callback(&compressed, 0, |chunk| {
        out.extend_from_slice(chunk);
        true
    })
    .unwrap();
    assert_eq!(consumed, stream_len);
    assert_eq!(out, data);
}

#[test]
fn test_corrupted_streams_fail() {
    let data = lcg_words(10_000);
    let compressed = compress_to_vec(&data, CompressionLevel::DEFAULT).unwrap();
    let mut failures = 0;
    // The last byte may hold padding bits, so leave it alone.
    for i in (0..compressed.len() - 1).step_by(37) {
        let mut bad = compressed.clone();
        bad[i] ^= 0x55;
        match inflate(&bad) {
            Ok(out) => assert_ne!(out, data, "flip at {i} went unnoticed"),
            Err(_) => failures += 1,
        }
    }
    assert!(failures > 0);
}
