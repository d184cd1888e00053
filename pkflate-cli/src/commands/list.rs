//! List command implementation.

use super::CmdResult;
use crate::utils::print_entries;
use pkflate_zip::ZipReader;
use std::path::Path;

pub fn cmd_list(archive: &Path, verbose: bool) -> CmdResult {
    let reader = ZipReader::open(archive)?;

    println!("Archive: {}", archive.display());
    if verbose {
        let zip64 = if reader.is_zip64() { ", zip64" } else { "" };
        println!("  {} entries, {} bytes{zip64}", reader.file_count(), reader.archive_size());
        if reader.archive_offset() > 0 {
            println!("  {} bytes of leading data", reader.archive_offset());
        }
    }
    println!();

    let entries = (0..reader.file_count())
        .map(|index| reader.stat(index))
        .collect::<Result<Vec<_>, _>>()?;
    print_entries(&entries, verbose);
    Ok(())
}
