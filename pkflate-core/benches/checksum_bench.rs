//! Throughput benchmarks for CRC-32 and Adler-32.
//!
//! Covers one-shot computation across sizes and chunked folding, which is how
//! the archive writer and the inflater feed the checksums.

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use pkflate_core::checksum::{ADLER32_INIT, Adler32, CRC32_INIT, Crc32, adler32, crc32};
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

    pub fn text_like(size: usize) -> Vec<u8> {
        let text = b"The quick brown fox jumps over the lazy dog. ";
        let mut data = Vec::with_capacity(size);
        while data.len() < size {
            let remaining = size - data.len();
            data.extend_from_slice(&text[..remaining.min(text.len())]);
        }
        data
    }
}

const SIZES: [(&str, usize); 4] = [
    ("16B", 16),
    ("4KB", 4 * 1024),
    ("64KB", 64 * 1024),
    ("1MB", 1024 * 1024),
];

fn bench_crc32_sizes(c: &mut Criterion) {
    let mut group = c.benchmark_group("crc32_sizes");

    for (name, size) in SIZES {
        let data = test_data::text_like(size);
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(name), &data, |b, data| {
            b.iter(|| black_box(Crc32::compute(black_box(data))));
        });
    }

    group.finish();
}

fn bench_adler32_sizes(c: &mut Criterion) {
    let mut group = c.benchmark_group("adler32_sizes");

    for (name, size) in SIZES {
        let data = test_data::random(size);
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(name), &data, |b, data| {
            b.iter(|| black_box(Adler32::checksum(black_box(data))));
        });
    }

    group.finish();
}

fn bench_chunked_fold(c: &mut Criterion) {
    let mut group = c.benchmark_group("chunked_fold");
    let data = test_data::random(256 * 1024);
    group.throughput(Throughput::Bytes(data.len() as u64));

    for chunk in [64usize, 4096, 32768] {
        group.bench_with_input(BenchmarkId::new("crc32", chunk), &chunk, |b, &chunk| {
            b.iter(|| {
                let crc = data
                    .chunks(chunk)
                    .fold(CRC32_INIT, |acc, part| crc32(acc, part));
                black_box(crc)
            });
        });
        group.bench_with_input(BenchmarkId::new("adler32", chunk), &chunk, |b, &chunk| {
            b.iter(|| {
                let adler = data
                    .chunks(chunk)
                    .fold(ADLER32_INIT, |acc, part| adler32(acc, part));
                black_box(adler)
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_crc32_sizes,
    bench_adler32_sizes,
    bench_chunked_fold
);
criterion_main!(benches);
