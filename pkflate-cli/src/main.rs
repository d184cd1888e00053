//! pkflate CLI
//!
//! ZIP archive and raw DEFLATE/zlib stream utility.

mod commands;
mod utils;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use commands::{
    CreateOptions, ExtractOptions, cmd_append, cmd_compress, cmd_create, cmd_decompress,
    cmd_extract, cmd_list, cmd_test,
};
use pkflate_zip::{ZipError, error_string};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "pkflate")]
#[command(author, version, about = "ZIP archives and DEFLATE streams in pure Rust")]
#[command(long_about = "
pkflate reads and writes ZIP archives (including ZIP64) and raw DEFLATE or
zlib streams.

Examples:
  pkflate list archive.zip
  pkflate extract archive.zip -o out
  pkflate create archive.zip src docs README.md -l 9
  pkflate append archive.zip notes.txt
  pkflate test archive.zip
  pkflate compress data.bin data.zz --zlib
  pkflate decompress data.zz data.bin --zlib
")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List contents of an archive
    #[command(alias = "l")]
    List {
        /// Archive file to list
        archive: PathBuf,

        /// Show sizes, method and CRC-32
        #[arg(short, long)]
        verbose: bool,
    },

    /// Extract files from an archive
    #[command(alias = "x")]
    Extract {
        /// Archive file to extract
        archive: PathBuf,

        /// Entries to extract (all if empty)
        files: Vec<String>,

        /// Output directory
        #[arg(short, long, default_value = ".")]
        output: PathBuf,

        /// Skip CRC-32 verification
        #[arg(long)]
        no_verify: bool,

        /// Show verbose output
        #[arg(short, long)]
        verbose: bool,

        /// Hide the progress bar
        #[arg(long)]
        no_progress: bool,
    },

    /// Create a new archive
    #[command(alias = "c")]
    Create {
        /// Output archive file
        archive: PathBuf,

        /// Files and directories to add
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Compression level (0 stores, 10 is slowest)
        #[arg(short, long, default_value_t = 6, value_parser = level_parser())]
        level: u8,

        /// Align local headers to this power of two
        #[arg(long, default_value_t = 0)]
        align: u32,

        /// Always write ZIP64 end records
        #[arg(long)]
        zip64: bool,

        /// Show verbose output
        #[arg(short, long)]
        verbose: bool,

        /// Hide the progress bar
        #[arg(long)]
        no_progress: bool,
    },

    /// Add files to an existing archive in place
    #[command(alias = "a")]
    Append {
        /// Archive file to extend
        archive: PathBuf,

        /// Files and directories to add
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Compression level (0 stores, 10 is slowest)
        #[arg(short, long, default_value_t = 6, value_parser = level_parser())]
        level: u8,

        /// Align local headers to this power of two
        #[arg(long, default_value_t = 0)]
        align: u32,

        /// Show verbose output
        #[arg(short, long)]
        verbose: bool,

        /// Hide the progress bar
        #[arg(long)]
        no_progress: bool,
    },

    /// Test archive integrity
    #[command(alias = "t")]
    Test {
        /// Archive file to test
        archive: PathBuf,

        /// Check headers only, without decompressing
        #[arg(long)]
        headers_only: bool,

        /// Show verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Compress a file into a raw DEFLATE or zlib stream
    Compress {
        /// Input file
        input: PathBuf,

        /// Output file
        output: PathBuf,

        /// Compression level (0 stores, 10 is slowest)
        #[arg(short, long, default_value_t = 6, value_parser = level_parser())]
        level: u8,

        /// Wrap the stream in a zlib header and Adler-32 trailer
        #[arg(long)]
        zlib: bool,
    },

    /// Decompress a raw DEFLATE or zlib stream
    Decompress {
        /// Input file
        input: PathBuf,

        /// Output file
        output: PathBuf,

        /// Expect a zlib header and Adler-32 trailer
        #[arg(long)]
        zlib: bool,
    },

    /// Print shell completions
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn level_parser() -> clap::builder::RangedI64ValueParser<u8> {
    clap::value_parser!(u8).range(0..=10)
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::List { archive, verbose } => cmd_list(&archive, verbose),
        Commands::Extract {
            archive,
            files,
            output,
            no_verify,
            verbose,
            no_progress,
        } => cmd_extract(
            &archive,
            &ExtractOptions {
                output: &output,
                files: &files,
                no_verify,
                verbose,
                progress: !no_progress,
            },
        ),
        Commands::Create {
            archive,
            files,
            level,
            align,
            zip64,
            verbose,
            no_progress,
        } => cmd_create(
            &archive,
            &files,
            &CreateOptions {
                level,
                align,
                zip64,
                verbose,
                progress: !no_progress,
            },
        ),
        Commands::Append {
            archive,
            files,
            level,
            align,
            verbose,
            no_progress,
        } => cmd_append(
            &archive,
            &files,
            &CreateOptions {
                level,
                align,
                zip64: false,
                verbose,
                progress: !no_progress,
            },
        ),
        Commands::Test {
            archive,
            headers_only,
            verbose,
        } => cmd_test(&archive, headers_only, verbose),
        Commands::Compress {
            input,
            output,
            level,
            zlib,
        } => cmd_compress(&input, &output, level, zlib),
        Commands::Decompress {
            input,
            output,
            zlib,
        } => cmd_decompress(&input, &output, zlib),
        Commands::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "pkflate", &mut std::io::stdout());
            Ok(())
        }
    };

    if let Err(e) = result {
        match e.downcast_ref::<ZipError>() {
            Some(zip) => {
                let summary = error_string(zip.code());
                eprintln!("Error: {summary} (code {})", zip.code());
                let detail = zip.to_string();
                if detail != summary {
                    eprintln!("  {detail}");
                }
            }
            None => eprintln!("Error: {e}"),
        }
        std::process::exit(1);
    }
}
