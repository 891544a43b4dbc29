use std::fs::File;
use std::path::Path;

use memmap2::Mmap;

use crate::crc::Crc16;
use crate::error::ChecksumError;
use crate::progress::{NoProgress, ProgressObserver, should_report};

/// Computes one CRC16 per `chunk_size` bytes of the partition
/// `[partition_start_pos, partition_start_pos + partition_size)` of the file.
///
/// Every chunk starts from a fresh register; the last chunk may be shorter.
pub fn compute_chunk_checksums(
    path: impl AsRef<Path>,
    partition_start_pos: u64,
    partition_size: u64,
    chunk_size: u64,
) -> Result<Vec<u16>, ChecksumError> {
    compute_chunk_checksums_with_progress(
        path,
        partition_start_pos,
        partition_size,
        chunk_size,
        &mut NoProgress,
    )
}

/// Same as [`compute_chunk_checksums`], reporting progress to `progress`.
pub fn compute_chunk_checksums_with_progress(
    path: impl AsRef<Path>,
    partition_start_pos: u64,
    partition_size: u64,
    chunk_size: u64,
    progress: &mut dyn ProgressObserver,
) -> Result<Vec<u16>, ChecksumError> {
    let path = path.as_ref();

    if chunk_size == 0 {
        return Err(ChecksumError::InvalidArgument(
            "chunk size must be greater than zero",
        ));
    }

    let file = File::open(path).map_err(|source| ChecksumError::FileOpen {
        path: path.to_path_buf(),
        source,
    })?;

    let file_size = file
        .metadata()
        .map_err(|source| ChecksumError::FileStat {
            path: path.to_path_buf(),
            source,
        })?
        .len();

    let partition_end = partition_start_pos
        .checked_add(partition_size)
        .filter(|&end| end <= file_size)
        .ok_or_else(|| ChecksumError::PartitionOutOfBounds {
            path: path.to_path_buf(),
            start: partition_start_pos,
            size: partition_size,
            file_size,
        })?;

    let chunk_count = partition_size.div_ceil(chunk_size);
    tracing::debug!(
        path = %path.display(),
        start = partition_start_pos,
        size = partition_size,
        chunk_size,
        chunk_count,
        "computing partition chunk checksums"
    );

    if chunk_count == 0 {
        progress.on_finish();
        return Ok(Vec::new());
    }

    // SAFETY: read-only mapping, dropped together with `file` on every return.
    // A concurrent writer may change the hashed bytes; that is not detected.
    let mapping = unsafe { Mmap::map(&file) }.map_err(|source| ChecksumError::MemoryMap {
        path: path.to_path_buf(),
        source,
    })?;

    // The whole file is mapped, so every count and offset bounded by its
    // length fits in usize.
    let total = chunk_count as usize;
    let mut sums = Vec::new();
    sums.try_reserve_exact(total).map_err(|source| ChecksumError::Allocation {
        chunks: chunk_count,
        source,
    })?;

    let partition = &mapping[partition_start_pos as usize..partition_end as usize];
    let chunk_len = usize::try_from(chunk_size).unwrap_or(usize::MAX);

    let crc = Crc16::update_app();
    for (index, chunk) in partition.chunks(chunk_len).enumerate() {
        sums.push(crc.compute_sum(chunk));

        let done = index + 1;
        if should_report(done, total) {
            progress.on_progress(done, total);
        }
    }
    progress.on_finish();

    Ok(sums)
}

/// Packs chunk checksums as consecutive little-endian u16 values.
pub fn checksums_to_le_bytes(sums: &[u16]) -> Vec<u8> {
    sums.iter().flat_map(|sum| sum.to_le_bytes()).collect()
}

/// Recomputes the chunk checksums of a partition and compares them with
/// `expected`, the stored little-endian checksum bytes.
pub fn verify_partition(
    path: impl AsRef<Path>,
    partition_start_pos: u64,
    partition_size: u64,
    chunk_size: u64,
    expected: &[u8],
    progress: &mut dyn ProgressObserver,
) -> Result<bool, ChecksumError> {
    let sums = compute_chunk_checksums_with_progress(
        path,
        partition_start_pos,
        partition_size,
        chunk_size,
        progress,
    )?;
    Ok(checksums_to_le_bytes(&sums) == expected)
}
