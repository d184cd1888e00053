//! Extract command implementation.

use super::CmdResult;
use crate::utils::{create_progress_bar, output_path};
use filetime::FileTime;
use pkflate_zip::{ExtractFlags, ZipReader};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Options for extracting archive contents.
pub struct ExtractOptions<'a> {
    pub output: &'a Path,
    pub files: &'a [String],
    pub no_verify: bool,
    pub verbose: bool,
    pub progress: bool,
}

pub fn cmd_extract(archive: &Path, options: &ExtractOptions) -> CmdResult {
    let mut reader = ZipReader::open(archive)?;
    let flags = ExtractFlags::new().skip_crc(options.no_verify);

    let indices: Vec<usize> = if options.files.is_empty() {
        (0..reader.file_count()).collect()
    } else {
        options
            .files
            .iter()
            .map(|name| reader.locate(name, ExtractFlags::new()))
            .collect::<Result<_, _>>()?
    };

    let pb = create_progress_bar(indices.len() as u64, options.progress && !options.verbose);
    let mut directories: Vec<(PathBuf, SystemTime)> = Vec::new();
    let mut extracted = 0usize;
    let mut skipped = 0usize;

    for index in indices {
        let stat = reader.stat(index)?;
        pb.set_message(stat.name.clone());

        let Some(path) = output_path(options.output, &stat.name) else {
            eprintln!("Skipping unsafe entry name: {}", stat.name);
            skipped += 1;
            pb.inc(1);
            continue;
        };

        if stat.is_directory {
            std::fs::create_dir_all(&path)?;
            if let Some(mtime) = stat.last_modified() {
                directories.push((path, mtime));
            }
        } else {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            reader.extract_to_file(index, &path, flags)?;
            if options.verbose {
                println!("  {} ({} bytes)", stat.name, stat.uncompressed_size);
            }
        }
        extracted += 1;
        pb.inc(1);
    }
    pb.finish_and_clear();

    // Writing into a directory resets its time, so these go last.
    for (path, mtime) in directories.iter().rev() {
        if let Err(e) = filetime::set_file_mtime(path, FileTime::from_system_time(*mtime)) {
            eprintln!("Warning: could not set time of {}: {e}", path.display());
        }
    }

    println!(
        "Extracted {extracted} entries to {}{}",
        options.output.display(),
        if skipped > 0 {
            format!(" ({skipped} skipped)")
        } else {
            String::new()
        }
    );
    Ok(())
}
