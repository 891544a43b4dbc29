use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use partcrc::package::{extract_blocks, read_blocks, verify_package};
use partcrc::{
    ConsoleProgress, NoProgress, ProgressObserver, compute_chunk_checksums_with_progress,
};

#[derive(Parser, Debug)]
#[command(
    name = "partcrc",
    about = "Chunked CRC16 checksums for firmware update partitions"
)]
struct Args {
    /// Log filter, e.g. `info` or `partcrc=debug`.
    #[arg(
        long,
        global = true,
        value_name = "FILTER",
        env = "PARTCRC_LOG",
        default_value = "warn"
    )]
    log_level: String,

    /// Do not print a progress percentage while hashing.
    #[arg(long, global = true, env = "PARTCRC_NO_PROGRESS")]
    no_progress: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print one CRC16 per chunk of a byte range of a file.
    Checksum {
        /// File to read
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Byte offset of the partition
        #[arg(long, value_name = "OFFSET", default_value_t = 0)]
        start: u64,

        /// Partition length in bytes. Defaults to the rest of the file.
        #[arg(long, value_name = "BYTES")]
        size: Option<u64>,

        /// Chunk length in bytes
        #[arg(
            long,
            value_name = "BYTES",
            env = "PARTCRC_CHUNK_SIZE",
            default_value_t = 4096
        )]
        chunk_size: u64,
    },

    /// Verify header and partition checksums of an UPDATE.APP file.
    Verify {
        #[arg(value_name = "UPDATE_APP")]
        file: PathBuf,

        /// Only check block header checksums.
        #[arg(long)]
        headers_only: bool,
    },

    /// List the blocks of an UPDATE.APP file.
    List {
        #[arg(value_name = "UPDATE_APP")]
        file: PathBuf,
    },

    /// Export the partition data of an UPDATE.APP file, one file per block name.
    Extract {
        #[arg(value_name = "UPDATE_APP")]
        file: PathBuf,

        /// Output directory; must not exist. Defaults to `extracted_files`
        /// next to the input file.
        #[arg(short, long, value_name = "DIR", env = "PARTCRC_OUTPUT_DIR")]
        output_dir: Option<PathBuf>,

        /// Verify partition checksums before writing each block.
        #[arg(long)]
        crc: bool,
    },
}

fn init_logging(filter: &str) {
    let filter = EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(&args.log_level);

    let mut quiet = NoProgress;
    let mut console = ConsoleProgress::new();
    let progress: &mut dyn ProgressObserver = if args.no_progress {
        &mut quiet
    } else {
        &mut console
    };

    match args.command {
        Command::Checksum {
            file,
            start,
            size,
            chunk_size,
        } => {
            let size = match size {
                Some(size) => size,
                None => match std::fs::metadata(&file) {
                    Ok(meta) => meta.len().saturating_sub(start),
                    Err(e) => {
                        tracing::error!("Failed to stat {}: {e}", file.display());
                        return ExitCode::FAILURE;
                    }
                },
            };

            match compute_chunk_checksums_with_progress(&file, start, size, chunk_size, progress) {
                Ok(sums) => {
                    for (index, sum) in sums.iter().enumerate() {
                        println!("{index}: 0x{sum:04X}");
                    }
                    ExitCode::SUCCESS
                }
                Err(e) => report(&e),
            }
        }

        Command::Verify { file, headers_only } => {
            println!("Verifying '{}'...", file.display());
            match verify_package(&file, !headers_only, progress) {
                Ok(summary) => {
                    for block in &summary.blocks {
                        let name = block.name.as_deref().unwrap_or("<unnamed>");
                        let status = match block.data_ok {
                            Some(true) => "ok",
                            Some(false) => "CHECKSUM MISMATCH",
                            None => "header ok",
                        };
                        println!("{:#010x} {name}: {status}", block.offset);
                    }

                    let total = summary.blocks.len();
                    let failed = summary.failed().count();
                    if failed == 0 {
                        println!("All {total} blocks verified.");
                        ExitCode::SUCCESS
                    } else {
                        eprintln!("{failed} of {total} blocks failed verification.");
                        ExitCode::from(2)
                    }
                }
                Err(e) => report(&e),
            }
        }

        Command::List { file } => match read_blocks(&file) {
            Ok(blocks) => {
                for block in &blocks {
                    println!(
                        "{:#010x} {:<16} {:>12} bytes  chunk {:>6}  {} {}",
                        block.offset,
                        block.name().unwrap_or_else(|| "<unnamed>".into()),
                        block.data_length(),
                        block.header.chunk_size,
                        block.header.date().unwrap_or_default(),
                        block.header.time().unwrap_or_default(),
                    );
                }
                println!("{} blocks.", blocks.len());
                ExitCode::SUCCESS
            }
            Err(e) => report(&e),
        },

        Command::Extract {
            file,
            output_dir,
            crc,
        } => match extract_blocks(&file, output_dir.as_deref(), crc, progress) {
            Ok(summary) => {
                println!("Exported to: {}", summary.output_dir.display());
                for fragment in &summary.fragments {
                    let action = if fragment.appended {
                        "Appending to"
                    } else {
                        "Creating"
                    };
                    println!(
                        "{action} '{}' with {} bytes.",
                        fragment.name, fragment.bytes
                    );
                }
                if summary.skipped > 0 {
                    println!("Skipped {} unnamed blocks.", summary.skipped);
                }
                println!(
                    "Total file fragments processed: {}",
                    summary.fragments.len()
                );
                ExitCode::SUCCESS
            }
            Err(e) => report(&e),
        },
    }
}

fn report(error: &dyn std::error::Error) -> ExitCode {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(&format!(": {cause}"));
        source = cause.source();
    }
    tracing::error!("{message}");
    ExitCode::FAILURE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksum_range_defaults() {
        let args = Args::try_parse_from(["partcrc", "checksum", "system.img"]).unwrap();
        match args.command {
            Command::Checksum {
                start,
                size,
                chunk_size,
                ..
            } => {
                assert_eq!(start, 0);
                assert_eq!(size, None);
                assert_eq!(chunk_size, 4096);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn checksum_range_explicit() {
        let args = Args::try_parse_from([
            "partcrc",
            "checksum",
            "system.img",
            "--start",
            "512",
            "--size",
            "100",
            "--chunk-size",
            "3",
        ])
        .unwrap();
        match args.command {
            Command::Checksum {
                start,
                size,
                chunk_size,
                ..
            } => assert_eq!((start, size, chunk_size), (512, Some(100), 3)),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn extract_flags() {
        let args =
            Args::try_parse_from(["partcrc", "extract", "UPDATE.APP", "-o", "out", "--crc"])
                .unwrap();
        match args.command {
            Command::Extract {
                file,
                output_dir,
                crc,
            } => {
                assert_eq!(file, PathBuf::from("UPDATE.APP"));
                assert_eq!(output_dir, Some(PathBuf::from("out")));
                assert!(crc);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
