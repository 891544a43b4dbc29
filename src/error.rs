use std::collections::TryReserveError;
use std::io;
use std::path::PathBuf;

/// Failure of a partition checksum computation. Nothing is returned alongside it.
#[derive(Debug, thiserror::Error)]
pub enum ChecksumError {
    #[error("failed to open {}", .path.display())]
    FileOpen {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to query size of {}", .path.display())]
    FileStat {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(
        "partition {start:#x}+{size:#x} extends beyond the end of {} ({file_size} bytes)",
        .path.display()
    )]
    PartitionOutOfBounds {
        path: PathBuf,
        start: u64,
        size: u64,
        file_size: u64,
    },

    #[error("failed to memory-map {}", .path.display())]
    MemoryMap {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to allocate space for {chunks} chunk checksums")]
    Allocation {
        chunks: u64,
        #[source]
        source: TryReserveError,
    },

    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
}

#[derive(Debug, thiserror::Error)]
pub enum PackageError {
    #[error("I/O error while reading {}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("bad block signature {found:02X?} at offset {offset:#x}")]
    BadSignature { offset: u64, found: [u8; 4] },

    #[error("unexpected block magic {found} at offset {offset:#x} (expected 1)")]
    BadMagic { offset: u64, found: u32 },

    #[error("block header at offset {offset:#x} declares length {found}, shorter than the header itself")]
    BadHeaderLength { offset: u64, found: u32 },

    #[error("header checksum mismatch at offset {offset:#x}")]
    HeaderCrcMismatch { offset: u64 },

    #[error("block at offset {offset:#x} runs past the end of the file")]
    Truncated { offset: u64 },

    #[error("partition checksum mismatch for {name:?} in block at offset {offset:#x}")]
    DataCrcMismatch { offset: u64, name: String },

    #[error("output directory {} already exists", .path.display())]
    OutputDirExists { path: PathBuf },

    #[error("block at offset {offset:#x} has a name that is not a plain file name: {name:?}")]
    UnsafeName { offset: u64, name: String },

    #[error(transparent)]
    Checksum(#[from] ChecksumError),
}
