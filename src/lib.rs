//! Chunked CRC16 checksums over partitions of firmware update files.
//! Provides the CRC16/CCITT engine, the partition chunk-checksum driver and
//! helpers for walking and verifying UPDATE.APP containers.

pub mod crc;
pub mod error;
pub mod header;
pub mod package;
pub mod partition;
pub mod progress;

pub use crc::Crc16;
pub use error::{ChecksumError, PackageError};
pub use partition::{
    checksums_to_le_bytes, compute_chunk_checksums, compute_chunk_checksums_with_progress,
    verify_partition,
};
pub use progress::{ConsoleProgress, NoProgress, ProgressObserver};
