//! Utility functions for the CLI.

use indicatif::{ProgressBar, ProgressStyle};
use pkflate_zip::EntryStat;
use std::io;
use std::path::{Component, Path, PathBuf};

/// Create a progress bar with standard styling.
pub fn create_progress_bar(len: u64, enable: bool) -> ProgressBar {
    if !enable {
        return ProgressBar::hidden();
    }

    let pb = ProgressBar::new(len);
    let template = "[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}";
    if let Ok(style) = ProgressStyle::default_bar().template(template) {
        pb.set_style(style.progress_chars("█▓▒░ "));
    }
    pb
}

/// A file or directory to be added to an archive.
pub struct InputFile {
    /// Path on disk.
    pub path: PathBuf,
    /// Entry name inside the archive; directories end in `/`.
    pub name: String,
    /// Directory entry.
    pub is_dir: bool,
}

/// Archive entry name for a path: forward slashes, no root or `..`.
pub fn entry_name(path: &Path) -> String {
    let parts: Vec<String> = path
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();
    parts.join("/")
}

/// Expand the given paths, walking directories depth first.
pub fn collect_inputs(paths: &[PathBuf]) -> io::Result<Vec<InputFile>> {
    let mut inputs = Vec::new();
    for path in paths {
        walk(path, &mut inputs)?;
    }
    Ok(inputs)
}

fn walk(path: &Path, inputs: &mut Vec<InputFile>) -> io::Result<()> {
    let meta = std::fs::metadata(path)?;
    let name = entry_name(path);
    if !meta.is_dir() {
        inputs.push(InputFile {
            path: path.to_path_buf(),
            name,
            is_dir: false,
        });
        return Ok(());
    }

    if !name.is_empty() {
        inputs.push(InputFile {
            path: path.to_path_buf(),
            name: format!("{name}/"),
            is_dir: true,
        });
    }
    let mut children: Vec<PathBuf> = std::fs::read_dir(path)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<io::Result<_>>()?;
    children.sort();
    for child in children {
        walk(&child, inputs)?;
    }
    Ok(())
}

/// Resolve an entry name below `root`, refusing names that escape it.
pub fn output_path(root: &Path, name: &str) -> Option<PathBuf> {
    let mut path = root.to_path_buf();
    let mut pushed = false;
    for part in name.split(['/', '\\']) {
        match part {
            "" | "." => {}
            ".." => return None,
            part if part.contains(':') => return None,
            part => {
                path.push(part);
                pushed = true;
            }
        }
    }
    pushed.then_some(path)
}

/// Print entries in a formatted table.
pub fn print_entries(entries: &[EntryStat], verbose: bool) {
    if !verbose {
        for entry in entries {
            println!("{}", entry.name);
        }
        return;
    }

    println!(
        "{:>10} {:>10} {:>6} {:>8} {:>8}  Name",
        "Size", "Compressed", "Ratio", "Method", "CRC-32",
    );
    println!("{}", "-".repeat(70));

    let mut total_size = 0u64;
    let mut total_compressed = 0u64;
    for entry in entries {
        let ratio = if entry.uncompressed_size > 0 {
            let saved = 1.0 - entry.compressed_size as f64 / entry.uncompressed_size as f64;
            format!("{:.1}%", saved * 100.0)
        } else {
            "-".to_string()
        };
        let type_prefix = if entry.is_directory { "d " } else { "  " };
        println!(
            "{:>10} {:>10} {:>6} {:>8} {:08x}  {}{}",
            entry.uncompressed_size,
            entry.compressed_size,
            ratio,
            entry.method_name(),
            entry.crc32,
            type_prefix,
            entry.name
        );
        total_size += entry.uncompressed_size;
        total_compressed += entry.compressed_size;
    }

    println!("{}", "-".repeat(70));
    let total_ratio = if total_size > 0 {
        (1.0 - total_compressed as f64 / total_size as f64) * 100.0
    } else {
        0.0
    };
    println!(
        "{:>10} {:>10} {:>5.1}%                   {} files",
        total_size,
        total_compressed,
        total_ratio,
        entries.len()
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_name_normalizes() {
        assert_eq!(entry_name(Path::new("a/b/c.txt")), "a/b/c.txt");
        assert_eq!(entry_name(Path::new("./a/../b.txt")), "a/b.txt");
        assert_eq!(entry_name(Path::new("/abs/file")), "abs/file");
    }

    #[test]
    fn test_output_path_rejects_escapes() {
        let root = Path::new("out");
        assert_eq!(output_path(root, "x/y.txt"), Some(root.join("x").join("y.txt")));
        assert_eq!(output_path(root, "dir/"), Some(root.join("dir")));
        assert_eq!(output_path(root, "../evil"), None);
        assert_eq!(output_path(root, "a/../../evil"), None);
        assert_eq!(output_path(root, "C:/evil"), None);
        assert_eq!(output_path(root, "/"), None);
    }

    #[test]
    fn test_collect_inputs_walks_directories() {
        let root = std::env::temp_dir().join(format!("pkflate-cli-walk-{}", std::process::id()));
        std::fs::create_dir_all(root.join("sub")).unwrap();
        std::fs::write(root.join("b.txt"), b"b").unwrap();
        std::fs::write(root.join("sub").join("a.txt"), b"a").unwrap();

        let inputs = collect_inputs(std::slice::from_ref(&root)).unwrap();
        let base = entry_name(&root);
        let names: Vec<_> = inputs.iter().map(|i| i.name.clone()).collect();
        assert_eq!(
            names,
            vec![
                format!("{base}/"),
                format!("{base}/b.txt"),
                format!("{base}/sub/"),
                format!("{base}/sub/a.txt"),
            ]
        );
        assert!(inputs[0].is_dir && !inputs[1].is_dir);
        std::fs::remove_dir_all(&root).unwrap();
    }
}
