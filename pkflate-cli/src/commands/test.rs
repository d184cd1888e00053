//! Test command implementation.

use super::CmdResult;
use pkflate_zip::{ZipError, ZipErrorKind, ZipReader};
use std::path::Path;

pub fn cmd_test(archive: &Path, headers_only: bool, verbose: bool) -> CmdResult {
    let mut reader = ZipReader::open(archive)?;
    println!("Testing {}", archive.display());

    let mut ok_count = 0usize;
    let mut errors: Vec<(String, String)> = Vec::new();
    for index in 0..reader.file_count() {
        let name = reader.name(index)?;
        match reader.validate_entry(index, headers_only) {
            Ok(()) => {
                ok_count += 1;
                if verbose {
                    println!("  OK: {name}");
                }
            }
            Err(e) => {
                if verbose {
                    println!("  FAILED: {name} - {e}");
                }
                errors.push((name, e.to_string()));
            }
        }
    }

    println!();
    println!("{ok_count} OK, {} failed", errors.len());
    if errors.is_empty() {
        println!("No errors detected");
        return Ok(());
    }
    if !verbose {
        for (name, error) in &errors {
            println!("  {name}: {error}");
        }
    }
    Err(ZipError::new(
        ZipErrorKind::ValidationFailed,
        format!("{} of {} entries failed", errors.len(), reader.file_count()),
    )
    .into())
}
