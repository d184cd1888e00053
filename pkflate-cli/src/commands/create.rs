//! Create and append command implementations.

use super::CmdResult;
use crate::utils::{InputFile, collect_inputs, create_progress_bar};
use pkflate_zip::{
    AddOptions, ZipReader, ZipReaderOptions, ZipStore, ZipWriter, ZipWriterOptions,
};
use std::path::{Path, PathBuf};

/// Options shared by `create` and `append`.
pub struct CreateOptions {
    pub level: u8,
    pub align: u32,
    pub zip64: bool,
    pub verbose: bool,
    pub progress: bool,
}

pub fn cmd_create(archive: &Path, files: &[PathBuf], options: &CreateOptions) -> CmdResult {
    let inputs = collect_inputs(files)?;
    let writer_options = ZipWriterOptions::new()
        .alignment(options.align)
        .force_zip64(options.zip64);
    let mut writer = ZipWriter::create(archive, writer_options)?;

    let added = add_inputs(&mut writer, &inputs, options);
    let finalized = writer.finalize();
    drop(writer);
    if let Err(e) = added.and(finalized.map_err(Into::into)) {
        if let Err(remove) = std::fs::remove_file(archive) {
            eprintln!("Warning: could not remove {}: {remove}", archive.display());
        }
        return Err(e);
    }

    println!("Created {} with {} entries", archive.display(), inputs.len());
    Ok(())
}

pub fn cmd_append(archive: &Path, files: &[PathBuf], options: &CreateOptions) -> CmdResult {
    let inputs = collect_inputs(files)?;
    let reader = ZipReader::open_rw(
        archive,
        ZipReaderOptions {
            sort_central_dir: false,
        },
    )?;
    let before = reader.file_count();
    let writer_options = ZipWriterOptions::new().alignment(options.align);
    let mut writer = ZipWriter::from_reader(reader, writer_options)?;

    // A failed add leaves the earlier entries in place; still finalize them.
    let added = add_inputs(&mut writer, &inputs, options);
    let finalized = writer.finalize();
    let after = writer.file_count();
    drop(writer);
    added.and(finalized.map_err(Into::into))?;

    println!(
        "Appended {} entries to {} ({after} total)",
        after - before,
        archive.display()
    );
    Ok(())
}

fn add_inputs<S: ZipStore>(
    writer: &mut ZipWriter<S>,
    inputs: &[InputFile],
    options: &CreateOptions,
) -> CmdResult {
    let pb = create_progress_bar(inputs.len() as u64, options.progress && !options.verbose);
    for input in inputs {
        pb.set_message(input.name.clone());
        let mut add = AddOptions::new().level(options.level);
        if input.is_dir {
            if let Ok(mtime) = std::fs::metadata(&input.path).and_then(|m| m.modified()) {
                add = add.last_modified(mtime);
            }
            writer.add_mem(&input.name, b"", &add)?;
        } else {
            writer.add_file(&input.name, &input.path, &add)?;
        }
        if options.verbose {
            println!("  adding: {}", input.name);
        }
        pb.inc(1);
    }
    pb.finish_and_clear();
    Ok(())
}
