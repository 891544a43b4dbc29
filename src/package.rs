use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Component, Path, PathBuf};

use crate::error::PackageError;
use crate::header::{BlockHeader, HEADER_SIZE, verify_header_crc};
use crate::partition::verify_partition;
use crate::progress::ProgressObserver;

/// Bytes preceding the first block of an UPDATE.APP file.
pub const PACKAGE_PREAMBLE: u64 = 92;

/// Directory created next to the package when no output directory is given.
pub const DEFAULT_OUTPUT_DIR: &str = "extracted_files";

/// A block located inside an UPDATE.APP file.
#[derive(Clone, Debug)]
pub struct PackageBlock {
    /// File offset of the block header.
    pub offset: u64,
    pub header: BlockHeader,
    /// Stored chunk checksums, little-endian u16 values.
    pub checksums: Vec<u8>,
    /// File offset of the partition data.
    pub data_offset: u64,
}

impl PackageBlock {
    pub fn name(&self) -> Option<String> {
        self.header.name()
    }

    pub fn data_length(&self) -> u64 {
        u64::from(self.header.data_length)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockReport {
    pub offset: u64,
    pub name: Option<String>,
    /// `None` when the data was not checked.
    pub data_ok: Option<bool>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PackageReport {
    pub blocks: Vec<BlockReport>,
}

impl PackageReport {
    pub fn all_passed(&self) -> bool {
        self.blocks.iter().all(|block| block.data_ok != Some(false))
    }

    pub fn failed(&self) -> impl Iterator<Item = &BlockReport> {
        self.blocks.iter().filter(|block| block.data_ok == Some(false))
    }
}

/// Walks all blocks of an UPDATE.APP file, checking every header checksum.
///
/// Walking stops when less than a full header remains.
pub fn read_blocks(path: impl AsRef<Path>) -> Result<Vec<PackageBlock>, PackageError> {
    let path = path.as_ref();
    let io_err = |source: io::Error| PackageError::Io {
        path: path.to_path_buf(),
        source,
    };

    let mut file = File::open(path).map_err(io_err)?;
    let file_size = file.metadata().map_err(io_err)?.len();

    let mut blocks = Vec::new();
    let mut offset = PACKAGE_PREAMBLE;

    while offset + HEADER_SIZE as u64 <= file_size {
        let mut raw = [0u8; HEADER_SIZE];
        file.seek(SeekFrom::Start(offset)).map_err(io_err)?;
        file.read_exact(&mut raw).map_err(io_err)?;

        if !verify_header_crc(&raw) {
            return Err(PackageError::HeaderCrcMismatch { offset });
        }
        let header = BlockHeader::parse(&raw, offset)?;

        let checksum_len = header.checksum_len();
        let data_length = u64::from(header.data_length);
        let data_offset = offset + HEADER_SIZE as u64 + checksum_len;
        let block_end = data_offset + data_length;
        if block_end > file_size {
            return Err(PackageError::Truncated { offset });
        }

        // Bounded by the file size checked above.
        let mut checksums = vec![0u8; checksum_len as usize];
        file.read_exact(&mut checksums).map_err(io_err)?;

        tracing::debug!(
            offset,
            name = ?header.name(),
            data_length,
            chunk_size = header.chunk_size,
            "found block"
        );

        blocks.push(PackageBlock {
            offset,
            header,
            checksums,
            data_offset,
        });

        // Blocks are padded to a multiple of 4 bytes.
        let block_size = HEADER_SIZE as u64 + checksum_len + data_length;
        offset = block_end + (4 - block_size % 4) % 4;
    }

    Ok(blocks)
}

/// Verifies every block of an UPDATE.APP file.
///
/// Header checksums are always checked. With `check_data`, the partition data of
/// each named block is recomputed chunk by chunk and compared with the stored
/// checksums. Unnamed blocks are never data-checked.
pub fn verify_package(
    path: impl AsRef<Path>,
    check_data: bool,
    progress: &mut dyn ProgressObserver,
) -> Result<PackageReport, PackageError> {
    let path = path.as_ref();
    let mut report = PackageReport::default();

    for block in read_blocks(path)? {
        let name = block.name();
        let data_ok = match (&name, check_data) {
            (None, _) => {
                tracing::warn!(offset = block.offset, "skipping block with no name");
                None
            }
            (Some(_), false) => None,
            (Some(name), true) => {
                let ok = verify_partition(
                    path,
                    block.data_offset,
                    block.data_length(),
                    u64::from(block.header.chunk_size),
                    &block.checksums,
                    progress,
                )?;
                if !ok {
                    tracing::warn!(
                        offset = block.offset,
                        name = %name,
                        "partition checksum mismatch"
                    );
                }
                Some(ok)
            }
        };

        report.blocks.push(BlockReport {
            offset: block.offset,
            name,
            data_ok,
        });
    }

    Ok(report)
}

/// One block written out by [`extract_blocks`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExtractedFragment {
    pub offset: u64,
    pub name: String,
    pub bytes: u64,
    /// The block continued a file created by an earlier block of the same name.
    pub appended: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExtractReport {
    pub output_dir: PathBuf,
    pub fragments: Vec<ExtractedFragment>,
    /// Blocks without a name, which are never written.
    pub skipped: usize,
}

/// `extracted_files` in the directory containing `package`.
pub fn default_output_dir(package: &Path) -> PathBuf {
    package
        .parent()
        .unwrap_or_else(|| Path::new(""))
        .join(DEFAULT_OUTPUT_DIR)
}

/// Writes the data of every named block to `<output_dir>/<name>`.
///
/// The output directory must not exist yet; it defaults to
/// [`default_output_dir`]. Blocks sharing a name are appended in package
/// order. With `check_data`, each block's stored checksums are verified before
/// its data is written, and a mismatch aborts the extraction.
pub fn extract_blocks(
    path: impl AsRef<Path>,
    output_dir: Option<&Path>,
    check_data: bool,
    progress: &mut dyn ProgressObserver,
) -> Result<ExtractReport, PackageError> {
    let path = path.as_ref();
    let output_dir = output_dir.map_or_else(|| default_output_dir(path), Path::to_path_buf);

    if output_dir.exists() {
        return Err(PackageError::OutputDirExists { path: output_dir });
    }

    let blocks = read_blocks(path)?;

    fs::create_dir_all(&output_dir).map_err(|source| PackageError::Io {
        path: output_dir.clone(),
        source,
    })?;
    tracing::info!(output_dir = %output_dir.display(), "exporting blocks");

    let mut input = File::open(path).map_err(|source| PackageError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut report = ExtractReport {
        output_dir,
        fragments: Vec::new(),
        skipped: 0,
    };

    for block in blocks {
        let Some(name) = block.name() else {
            tracing::warn!(offset = block.offset, "skipping block with no name");
            report.skipped += 1;
            continue;
        };
        if !is_plain_file_name(&name) {
            return Err(PackageError::UnsafeName {
                offset: block.offset,
                name,
            });
        }

        if check_data {
            let ok = verify_partition(
                path,
                block.data_offset,
                block.data_length(),
                u64::from(block.header.chunk_size),
                &block.checksums,
                progress,
            )?;
            if !ok {
                return Err(PackageError::DataCrcMismatch {
                    offset: block.offset,
                    name,
                });
            }
        }

        let target = report.output_dir.join(&name);
        let appended = target.exists();
        let write_err = |source: io::Error| PackageError::Io {
            path: target.clone(),
            source,
        };

        let mut output = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&target)
            .map_err(write_err)?;
        input
            .seek(SeekFrom::Start(block.data_offset))
            .map_err(|source| PackageError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        let bytes = io::copy(&mut (&mut input).take(block.data_length()), &mut output)
            .map_err(write_err)?;

        tracing::info!(
            name = %name,
            bytes,
            appended,
            "{} block",
            if appended { "appended" } else { "created" }
        );
        report.fragments.push(ExtractedFragment {
            offset: block.offset,
            name,
            bytes,
            appended,
        });
    }

    Ok(report)
}

fn is_plain_file_name(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}
