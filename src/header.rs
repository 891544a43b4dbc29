use crate::crc::Crc16;
use crate::error::PackageError;

pub const HEADER_SIZE: usize = 98;
pub const BLOCK_SIGNATURE: [u8; 4] = [0x55, 0xAA, 0x5A, 0xA5];
pub const BLOCK_MAGIC: u32 = 1;

const HEADER_CRC_POS: usize = 92;

/// Header of one UPDATE.APP block.
///
/// Layout (98 bytes, little-endian):
/// [0..4)   signature 55 AA 5A A5
/// [4..8)   header_length, header plus stored checksums
/// [8..12)  magic (1)
/// [12..20) hardware_id
/// [20..24) sequence
/// [24..28) data_length
/// [28..44) date
/// [44..60) time
/// [60..76) partition name
/// [76..92) reserved
/// [92..94) header checksum
/// [94..96) chunk_size
/// [96..98) reserved
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockHeader {
    pub header_length: u32,
    pub hardware_id: u64,
    pub sequence: u32,
    pub data_length: u32,
    pub date: [u8; 16],
    pub time: [u8; 16],
    pub name: [u8; 16],
    pub header_checksum: u16,
    pub chunk_size: u16,
}

impl BlockHeader {
    /// Parses a raw header found at file offset `offset` (used for error reporting).
    pub fn parse(raw: &[u8; HEADER_SIZE], offset: u64) -> Result<Self, PackageError> {
        let signature: [u8; 4] = field(raw, 0);
        if signature != BLOCK_SIGNATURE {
            return Err(PackageError::BadSignature {
                offset,
                found: signature,
            });
        }

        let magic = u32::from_le_bytes(field(raw, 8));
        if magic != BLOCK_MAGIC {
            return Err(PackageError::BadMagic {
                offset,
                found: magic,
            });
        }

        let header_length = u32::from_le_bytes(field(raw, 4));
        if (header_length as usize) < HEADER_SIZE {
            return Err(PackageError::BadHeaderLength {
                offset,
                found: header_length,
            });
        }

        Ok(Self {
            header_length,
            hardware_id: u64::from_le_bytes(field(raw, 12)),
            sequence: u32::from_le_bytes(field(raw, 20)),
            data_length: u32::from_le_bytes(field(raw, 24)),
            date: field(raw, 28),
            time: field(raw, 44),
            name: field(raw, 60),
            header_checksum: u16::from_le_bytes(field(raw, HEADER_CRC_POS)),
            chunk_size: u16::from_le_bytes(field(raw, 94)),
        })
    }

    /// Number of stored checksum bytes following the header.
    pub fn checksum_len(&self) -> u64 {
        u64::from(self.header_length) - HEADER_SIZE as u64
    }

    /// Partition name, or `None` for an unnamed block.
    pub fn name(&self) -> Option<String> {
        text(&self.name)
    }

    pub fn date(&self) -> Option<String> {
        text(&self.date)
    }

    pub fn time(&self) -> Option<String> {
        text(&self.time)
    }
}

/// Checks the header checksum, computed with the checksum field zeroed.
pub fn verify_header_crc(raw: &[u8; HEADER_SIZE]) -> bool {
    let expected = u16::from_le_bytes(field(raw, HEADER_CRC_POS));

    let mut zeroed = *raw;
    zeroed[HEADER_CRC_POS..HEADER_CRC_POS + 2].fill(0);

    Crc16::update_app().compute_sum(&zeroed) == expected
}

fn field<const N: usize>(raw: &[u8; HEADER_SIZE], at: usize) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&raw[at..at + N]);
    out
}

fn text(bytes: &[u8]) -> Option<String> {
    let trimmed: &[u8] = {
        let start = bytes.iter().position(|&b| b != 0)?;
        let end = bytes.iter().rposition(|&b| b != 0).map_or(start, |i| i + 1);
        &bytes[start..end]
    };
    Some(String::from_utf8_lossy(trimmed).into_owned())
}
