//! Partition table inspection for WIC disk images
//!
//! Lists partitions the way `fdisk -l` does: MBR primary slots in slot order
//! (including extended containers), then logical partitions along the EBR
//! chain; or, for GPT images, every used entry in table order. Partition `N`
//! is the `N`th listed entry, counted positionally.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Logical sector size of disk images
pub const SECTOR_SIZE: u64 = 512;

const MBR_SIGNATURE: [u8; 2] = [0x55, 0xaa];
const MBR_SIGNATURE_OFFSET: usize = 510;
const MBR_PARTITION_TABLE_OFFSET: usize = 0x1be;
const MBR_PARTITION_ENTRY_LEN: usize = 16;
const MBR_PRIMARY_PARTITION_COUNT: usize = 4;

const MBR_TYPE_GPT_PROTECTIVE: u8 = 0xee;
const MBR_EXTENDED_TYPE_CHS: u8 = 0x05;
const MBR_EXTENDED_TYPE_LBA: u8 = 0x0f;
const MBR_EXTENDED_TYPE_LINUX: u8 = 0x85;
const MAX_LOGICAL_PARTITIONS: usize = 128;

const GPT_SIGNATURE: &[u8; 8] = b"EFI PART";
const GPT_MIN_PARTITION_ENTRY_SIZE: u32 = 128;
const GPT_MAX_PARTITION_TABLE_BYTES: u64 = 16 * 1024 * 1024;

/// Partition table errors
#[derive(Error, Debug)]
pub enum PartitionTableError {
    /// Reading the image failed
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Sector 0 carries no boot signature
    #[error("missing MBR boot signature")]
    MissingSignature,

    /// GPT header or entry array is malformed
    #[error("invalid GPT: {0}")]
    InvalidGpt(&'static str),
}

/// Kind of a listed partition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryKind {
    /// MBR primary partition
    Primary,
    /// MBR extended container
    Extended,
    /// MBR logical partition
    Logical,
    /// GPT partition
    Gpt,
}

/// One listed partition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionEntry {
    /// 1-based position in the listing
    pub number: u32,
    /// Kind of entry
    pub kind: EntryKind,
    /// First sector
    pub start_sector: u64,
    /// Length in sectors
    pub sector_count: u64,
}

impl PartitionEntry {
    /// Byte offset of the partition inside the image
    pub fn offset_bytes(&self) -> u64 {
        self.start_sector.saturating_mul(SECTOR_SIZE)
    }
}

/// Byte offset of partition `index` (1-based) in the image at `path`.
///
/// Returns `None` when the file does not exist, the table cannot be parsed,
/// or there is no `index`th partition.
pub fn get_wic_partition_offset(path: &Path, index: u32) -> Option<u64> {
    if index == 0 {
        return None;
    }
    match read_partition_table(path) {
        Ok(entries) => entries
            .iter()
            .find(|entry| entry.number == index)
            .map(PartitionEntry::offset_bytes),
        Err(e) => {
            debug!(image = %path.display(), error = %e, "partition table unreadable");
            None
        }
    }
}

/// List the partitions of the image at `path`.
pub fn read_partition_table(path: &Path) -> Result<Vec<PartitionEntry>, PartitionTableError> {
    let file = File::open(path)?;
    parse_partition_table(file)
}

/// List the partitions of an image read from `reader`.
pub fn parse_partition_table<R: Read + Seek>(
    mut reader: R,
) -> Result<Vec<PartitionEntry>, PartitionTableError> {
    let mbr = read_sector(&mut reader, 0)?;
    if !has_boot_signature(&mbr) {
        return Err(PartitionTableError::MissingSignature);
    }

    let slots: Vec<MbrSlot> = (0..MBR_PRIMARY_PARTITION_COUNT)
        .filter_map(|slot| mbr_slot(&mbr, slot))
        .collect();

    if slots.iter().any(|s| s.partition_type == MBR_TYPE_GPT_PROTECTIVE) {
        return parse_gpt(&mut reader);
    }

    // A slot is in use when it has a size, whatever its type byte says
    let mut entries = Vec::new();
    for slot in slots.iter().filter(|s| s.sector_count > 0) {
        let kind = if slot.is_extended() {
            EntryKind::Extended
        } else {
            EntryKind::Primary
        };
        push_entry(&mut entries, kind, slot.first_lba, slot.sector_count);
    }

    for extended in slots.iter().filter(|s| s.is_extended() && s.sector_count > 0) {
        walk_logical(&mut reader, extended.first_lba, &mut entries)?;
    }

    Ok(entries)
}

fn walk_logical<R: Read + Seek>(
    reader: &mut R,
    extended_start: u64,
    entries: &mut Vec<PartitionEntry>,
) -> Result<(), PartitionTableError> {
    let mut ebr_lba = extended_start;
    for _ in 0..MAX_LOGICAL_PARTITIONS {
        let ebr = read_sector(reader, ebr_lba)?;
        if !has_boot_signature(&ebr) {
            break;
        }

        if let Some(logical) = mbr_slot(&ebr, 0)
            && logical.sector_count > 0
        {
            push_entry(
                entries,
                EntryKind::Logical,
                ebr_lba.saturating_add(logical.first_lba),
                logical.sector_count,
            );
        }

        match mbr_slot(&ebr, 1) {
            Some(link) if link.is_extended() && link.first_lba != 0 => {
                ebr_lba = extended_start.saturating_add(link.first_lba);
            }
            _ => break,
        }
    }
    Ok(())
}

fn parse_gpt<R: Read + Seek>(reader: &mut R) -> Result<Vec<PartitionEntry>, PartitionTableError> {
    let header = read_sector(reader, 1)?;
    if header.get(0..8) != Some(GPT_SIGNATURE.as_slice()) {
        return Err(PartitionTableError::InvalidGpt("missing EFI PART signature"));
    }

    let entries_lba = le_u64(&header, 72).ok_or(PartitionTableError::InvalidGpt("short header"))?;
    let entry_count = le_u32(&header, 80).ok_or(PartitionTableError::InvalidGpt("short header"))?;
    let entry_size = le_u32(&header, 84).ok_or(PartitionTableError::InvalidGpt("short header"))?;

    if entry_size < GPT_MIN_PARTITION_ENTRY_SIZE {
        return Err(PartitionTableError::InvalidGpt("partition entry too small"));
    }
    let table_bytes = u64::from(entry_count) * u64::from(entry_size);
    if table_bytes == 0 {
        return Err(PartitionTableError::InvalidGpt("partition table is empty"));
    }
    if table_bytes > GPT_MAX_PARTITION_TABLE_BYTES {
        return Err(PartitionTableError::InvalidGpt("partition table is too large"));
    }
    let table_offset = entries_lba
        .checked_mul(SECTOR_SIZE)
        .ok_or(PartitionTableError::InvalidGpt("partition table offset overflow"))?;

    let mut table = vec![0u8; table_bytes as usize];
    reader.seek(SeekFrom::Start(table_offset))?;
    reader.read_exact(&mut table)?;

    let mut entries = Vec::new();
    for raw in table.chunks_exact(entry_size as usize) {
        let unused = raw.get(0..16).is_none_or(|guid| guid.iter().all(|b| *b == 0));
        if unused {
            continue;
        }
        let (Some(first), Some(last)) = (le_u64(raw, 32), le_u64(raw, 40)) else {
            continue;
        };
        let count = last.checked_sub(first).map_or(0, |span| span.saturating_add(1));
        push_entry(&mut entries, EntryKind::Gpt, first, count);
    }
    Ok(entries)
}

#[derive(Debug, Clone, Copy)]
struct MbrSlot {
    partition_type: u8,
    first_lba: u64,
    sector_count: u64,
}

impl MbrSlot {
    fn is_extended(&self) -> bool {
        matches!(
            self.partition_type,
            MBR_EXTENDED_TYPE_CHS | MBR_EXTENDED_TYPE_LBA | MBR_EXTENDED_TYPE_LINUX
        )
    }
}

fn mbr_slot(sector: &[u8], slot: usize) -> Option<MbrSlot> {
    let start = MBR_PARTITION_TABLE_OFFSET + slot * MBR_PARTITION_ENTRY_LEN;
    let raw = sector.get(start..start + MBR_PARTITION_ENTRY_LEN)?;
    Some(MbrSlot {
        partition_type: *raw.get(4)?,
        first_lba: u64::from(le_u32(raw, 8)?),
        sector_count: u64::from(le_u32(raw, 12)?),
    })
}

fn push_entry(entries: &mut Vec<PartitionEntry>, kind: EntryKind, start: u64, count: u64) {
    let number = u32::try_from(entries.len()).map_or(u32::MAX, |n| n.saturating_add(1));
    entries.push(PartitionEntry {
        number,
        kind,
        start_sector: start,
        sector_count: count,
    });
}

fn has_boot_signature(sector: &[u8]) -> bool {
    sector.get(MBR_SIGNATURE_OFFSET..MBR_SIGNATURE_OFFSET + 2) == Some(MBR_SIGNATURE.as_slice())
}

fn read_sector<R: Read + Seek>(reader: &mut R, lba: u64) -> io::Result<[u8; SECTOR_SIZE as usize]> {
    let offset = lba
        .checked_mul(SECTOR_SIZE)
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "sector offset overflow"))?;
    let mut sector = [0u8; SECTOR_SIZE as usize];
    reader.seek(SeekFrom::Start(offset))?;
    reader.read_exact(&mut sector)?;
    Ok(sector)
}

fn le_u32(buf: &[u8], at: usize) -> Option<u32> {
    let bytes: [u8; 4] = buf.get(at..at + 4)?.try_into().ok()?;
    Some(u32::from_le_bytes(bytes))
}

fn le_u64(buf: &[u8], at: usize) -> Option<u64> {
    let bytes: [u8; 8] = buf.get(at..at + 8)?.try_into().ok()?;
    Some(u64::from_le_bytes(bytes))
}
