//! Compression throughput across levels, strategies and data shapes.

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use pkflate_core::config::{CompressionLevel, CompressionStrategy};
use pkflate_deflate::{compress_to_vec_with_flags, create_comp_flags};
use std::hint::black_box;

mod test_data {
    pub fn random(size: usize) -> Vec<u8> {
        let mut data = Vec::with_capacity(size);
        let mut seed: u64 = 0x123456789ABCDEF0;
        for _ in 0..size {
            seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1);
            data.push((seed >> 32) as u8);
        }
        data
    }

    pub fn repeated(size: usize) -> Vec<u8> {
        let pattern = b"ABCDEFGHIJKLMNOP";
        pattern.iter().cycle().take(size).copied().collect()
    }

    pub fn text_like(size: usize) -> Vec<u8> {
        let words = [
            "the ", "quick ", "brown ", "fox ", "jumps ", "over ", "lazy ", "dog ",
        ];
        let mut data = Vec::with_capacity(size);
        let mut seed: u32 = 0x1234;
        while data.len() < size {
            seed = seed.wrapping_mul(1103515245).wrapping_add(12345) & 0x7fff_ffff;
            data.extend_from_slice(words[((seed >> 16) % 8) as usize].as_bytes());
        }
        data.truncate(size);
        data
    }
}

fn bench_levels(c: &mut Criterion) {
    let mut group = c.benchmark_group("deflate_levels");
    let data = test_data::text_like(256 * 1024);
    group.throughput(Throughput::Bytes(data.len() as u64));

    for level in [0u8, 1, 3, 6, 9, 10] {
        let flags = create_comp_flags(
            CompressionLevel::new(level),
            false,
            CompressionStrategy::Default,
        );
        group.bench_with_input(BenchmarkId::from_parameter(level), &flags, |b, &flags| {
            b.iter(|| black_box(compress_to_vec_with_flags(black_box(&data), flags)));
        });
    }

    group.finish();
}

fn bench_data_shapes(c: &mut Criterion) {
    let mut group = c.benchmark_group("deflate_data_shapes");
    let flags = create_comp_flags(CompressionLevel::DEFAULT, false, CompressionStrategy::Default);
    let size = 128 * 1024;

    for (name, data) in [
        ("random", test_data::random(size)),
        ("repeated", test_data::repeated(size)),
        ("text", test_data::text_like(size)),
    ] {
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(name), &data, |b, data| {
            b.iter(|| black_box(compress_to_vec_with_flags(black_box(data), flags)));
        });
    }

    group.finish();
}

fn bench_strategies(c: &mut Criterion) {
    let mut group = c.benchmark_group("deflate_strategies");
    let data = test_data::text_like(128 * 1024);
    group.throughput(Throughput::Bytes(data.len() as u64));

    for (name, strategy) in [
        ("default", CompressionStrategy::Default),
        ("filtered", CompressionStrategy::Filtered),
        ("huffman_only", CompressionStrategy::HuffmanOnly),
        ("rle", CompressionStrategy::Rle),
        ("fixed", CompressionStrategy::Fixed),
    ] {
        let flags = create_comp_flags(CompressionLevel::DEFAULT, false, strategy);
        group.bench_with_input(BenchmarkId::from_parameter(name), &flags, |b, &flags| {
            b.iter(|| black_box(compress_to_vec_with_flags(black_box(&data), flags)));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_levels, bench_data_shapes, bench_strategies);
criterion_main!(benches);
