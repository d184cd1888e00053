//! Edge case tests for DEFLATE compression.

use pkflate_deflate::{deflate, inflate};

#[test]
fn test_empty_input() {
    let input = b"";
    let compressed = deflate(input, 6).unwrap();
    let decompressed = inflate(&compressed).unwrap();
    assert_eq!(decompressed, input);
}

#[test]
fn test_single_byte() {
    for level in [0, 1, 6, 10] {
        let compressed = deflate(b"A", level).unwrap();
        assert_eq!(inflate(&compressed).unwrap(), b"A");
    }
}

#[test]
fn test_all_zeros() {
    let input = vec![0u8; 1000];
    let compressed = deflate(&input, 6).unwrap();
    let decompressed = inflate(&compressed).unwrap();
    assert_eq!(decompressed, input);
    assert!(compressed.len() < input.len() / 10);
}

#[test]
fn test_all_same_byte() {
    let input = vec![255u8; 5000];
    let compressed = deflate(&input, 6).unwrap();
    let decompressed = inflate(&compressed).unwrap();
    assert_eq!(decompressed, input);
    assert!(compressed.len() < input.len() / 20);
}

#[test]
fn test_max_match_length() {
    let pattern = vec![42u8; 258];
    let mut input = Vec::new();
    for _ in 0..10 {
        input.extend_from_slice(&pattern);
    }

    for level in [1, 9] {
        let compressed = deflate(&input, level).unwrap();
        assert_eq!(inflate(&compressed).unwrap(), input);
    }
}

#[test]
fn test_all_byte_values() {
    let input: Vec<u8> = (0..=255u8).cycle().take(256 * 40).collect();
    for level in 0..=10 {
        let compressed = deflate(&input, level).unwrap();
        assert_eq!(inflate(&compressed).unwrap(), input, "level {level}");
    }
}

#[test]
fn test_window_boundary() {
    // A repeat exactly one window back, and one just beyond it.
    let mut input: Vec<u8> = (0..32768u32).map(|i| (i * 7 + i / 255) as u8).collect();
    let head = input[..300].to_vec();
    input.extend_from_slice(&head);
    input.push(0xAA);
    input.extend_from_slice(&head);

    for level in [1, 6, 9] {
        let compressed = deflate(&input, level).unwrap();
        assert_eq!(inflate(&compressed).unwrap(), input, "level {level}");
    }
}

#[test]
fn test_multi_block_input() {
    // Large enough to fill the code buffer several times.
    let mut seed = 0x1234_5678u32;
    let input: Vec<u8> = (0..600_000)
        .map(|_| {
            seed = seed.wrapping_mul(1_103_515_245).wrapping_add(12345);
            b"abcdefgh"[((seed >> 16) % 8) as usize]
        })
        .collect();

    for level in [1, 6] {
        let compressed = deflate(&input, level).unwrap();
        assert_eq!(inflate(&compressed).unwrap(), input, "level {level}");
    }
}

#[test]
fn test_truncated_stream_is_rejected() {
    let input = b"The quick brown fox jumps over the lazy dog".repeat(20);
    let compressed = deflate(&input, 6).unwrap();
    for cut in [1, compressed.len() / 2, compressed.len() - 1] {
        assert!(inflate(&compressed[..cut]).is_err(), "cut at {cut}");
    }
}

#[test]
fn test_reserved_block_type_is_rejected() {
    // BFINAL=1, BTYPE=11.
    assert!(inflate(&[0x07, 0x00]).is_err());
}
