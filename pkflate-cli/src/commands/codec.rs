//! Raw DEFLATE and zlib stream commands.

use super::CmdResult;
use pkflate_core::CompressionLevel;
use pkflate_deflate::{compress_to_vec, compress_to_vec_zlib, decompress_to_vec, inflate_flags};
use std::path::Path;

pub fn cmd_compress(input: &Path, output: &Path, level: u8, zlib: bool) -> CmdResult {
    let data = std::fs::read(input)?;
    let level = CompressionLevel::new(level);
    let compressed = if zlib {
        compress_to_vec_zlib(&data, level)?
    } else {
        compress_to_vec(&data, level)?
    };
    std::fs::write(output, &compressed)?;
    println!(
        "{} -> {}: {} -> {} bytes",
        input.display(),
        output.display(),
        data.len(),
        compressed.len()
    );
    Ok(())
}

pub fn cmd_decompress(input: &Path, output: &Path, zlib: bool) -> CmdResult {
    let data = std::fs::read(input)?;
    let flags = if zlib {
        inflate_flags::PARSE_ZLIB_HEADER
    } else {
        0
    };
    let decompressed = decompress_to_vec(&data, flags)?;
    std::fs::write(output, &decompressed)?;
    println!(
        "{} -> {}: {} -> {} bytes",
        input.display(),
        output.display(),
        data.len(),
        decompressed.len()
    );
    Ok(())
}
