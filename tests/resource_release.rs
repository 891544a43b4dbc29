#![cfg(target_os = "linux")]

use std::fs;
use std::path::{Path, PathBuf};

use partcrc::{ChecksumError, compute_chunk_checksums, compute_chunk_checksums_with_progress};

fn open_handles_to(path: &Path) -> usize {
    fs::read_dir("/proc/self/fd")
        .unwrap()
        .filter_map(|entry| fs::read_link(entry.ok()?.path()).ok())
        .filter(|target| target == path)
        .count()
}

fn mappings_of(path: &Path) -> usize {
    let needle = path.to_str().unwrap();
    fs::read_to_string("/proc/self/maps")
        .unwrap()
        .lines()
        .filter(|line| line.ends_with(needle))
        .count()
}

fn fixture(dir: &tempfile::TempDir, len: usize) -> PathBuf {
    let path = dir.path().join("partition.bin");
    fs::write(&path, vec![0x3Cu8; len]).unwrap();
    fs::canonicalize(path).unwrap()
}

#[test]
fn mapping_is_released_after_success() {
    let dir = tempfile::tempdir().unwrap();
    let path = fixture(&dir, 64 * 1024);

    let mut mapped_during_run = Vec::new();
    let mut observer = |_done: usize, _total: usize| {
        mapped_during_run.push((mappings_of(&path), open_handles_to(&path)));
    };
    let sums =
        compute_chunk_checksums_with_progress(&path, 0, 64 * 1024, 16, &mut observer).unwrap();
    assert_eq!(sums.len(), 4096);

    assert!(!mapped_during_run.is_empty());
    assert!(mapped_during_run.iter().all(|&(maps, fds)| maps > 0 && fds == 1));

    assert_eq!(mappings_of(&path), 0);
    assert_eq!(open_handles_to(&path), 0);
}

#[test]
fn nothing_is_left_open_after_failures() {
    let dir = tempfile::tempdir().unwrap();
    let path = fixture(&dir, 100);

    let err = compute_chunk_checksums(&path, 50, 51, 10).unwrap_err();
    assert!(matches!(err, ChecksumError::PartitionOutOfBounds { file_size: 100, .. }));
    assert_eq!(mappings_of(&path), 0);
    assert_eq!(open_handles_to(&path), 0);

    let err = compute_chunk_checksums(&path, 0, 100, 0).unwrap_err();
    assert!(matches!(err, ChecksumError::InvalidArgument(_)));
    assert_eq!(open_handles_to(&path), 0);
}

#[test]
fn repeated_calls_do_not_accumulate_handles() {
    let dir = tempfile::tempdir().unwrap();
    let path = fixture(&dir, 4096);

    for _ in 0..64 {
        compute_chunk_checksums(&path, 1024, 2048, 512).unwrap();
    }
    assert_eq!(mappings_of(&path), 0);
    assert_eq!(open_handles_to(&path), 0);
}

#[test]
fn unmappable_file_is_closed_after_failure() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("entry.bin"), b"x").unwrap();
    let path = fs::canonicalize(dir.path()).unwrap();

    let err = compute_chunk_checksums(&path, 0, 1, 1).unwrap_err();
    assert!(matches!(err, ChecksumError::MemoryMap { .. }));
    assert_eq!(open_handles_to(&path), 0);
}
