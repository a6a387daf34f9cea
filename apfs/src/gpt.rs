//! GUID Partition Table parsing: header at LBA 1, primary entry array, and
//! partition-type classification for APFS/ESP discovery.

use byteorder::{LittleEndian, ReadBytesExt};
use std::io::{Cursor, Read, Seek};
use uuid::Uuid;

use crate::blockio::BlockDevice;
use crate::error::{ApfsError, Result};

pub const GPT_SIGNATURE: [u8; 8] = *b"EFI PART";
pub const GPT_HEADER_SIZE: usize = 92;
pub const EXPECTED_PARTITION_ENTRY_SIZE: u32 = 128;

/// GUID of the "Apple APFS container" partition type.
pub const APFS_CONTAINER_GUID: Uuid = Uuid::from_bytes([
    0x7c, 0x34, 0x57, 0xef, 0x00, 0x00, 0x11, 0xaa,
    0xaa, 0x11, 0x00, 0x30, 0x65, 0x43, 0xec, 0xac,
]);

/// GUID of the "EFI system partition" type.
pub const ESP_GUID: Uuid = Uuid::from_bytes([
    0xc1, 0x2a, 0x73, 0x28, 0xf8, 0x1f, 0x11, 0xd2,
    0xba, 0x4b, 0x00, 0xa0, 0xc9, 0x3e, 0xc9, 0x3b,
]);

#[derive(Debug, Clone)]
pub struct GptHeader {
    pub revision: u32,
    pub header_size: u32,
    pub current_lba: u64,
    pub backup_lba: u64,
    pub first_usable_lba: u64,
    pub last_usable_lba: u64,
    pub disk_guid: Uuid,
    pub partition_entry_lba: u64,
    pub num_partition_entries: u32,
    pub size_of_partition_entry: u32,
}

impl GptHeader {
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < GPT_HEADER_SIZE {
            return Err(ApfsError::StructureTooSmall(
                "GPT header shorter than 92 bytes".into(),
            ));
        }
        let mut cur = Cursor::new(data);
        let mut sig = [0u8; 8];
        cur.read_exact(&mut sig)?;
        if sig != GPT_SIGNATURE {
            return Err(ApfsError::InvalidMagic {
                expected: u32::from_le_bytes([sig[0], sig[1], sig[2], sig[3]]),
                observed: u32::from_le_bytes(GPT_SIGNATURE[0..4].try_into().unwrap()),
            });
        }
        let revision = cur.read_u32::<LittleEndian>()?;
        let header_size = cur.read_u32::<LittleEndian>()?;
        let _crc32 = cur.read_u32::<LittleEndian>()?;
        let _reserved = cur.read_u32::<LittleEndian>()?;
        let current_lba = cur.read_u64::<LittleEndian>()?;
        let backup_lba = cur.read_u64::<LittleEndian>()?;
        let first_usable_lba = cur.read_u64::<LittleEndian>()?;
        let last_usable_lba = cur.read_u64::<LittleEndian>()?;
        let mut guid_bytes = [0u8; 16];
        cur.read_exact(&mut guid_bytes)?;
        let disk_guid = read_mixed_endian_uuid(&guid_bytes);
        let partition_entry_lba = cur.read_u64::<LittleEndian>()?;
        let num_partition_entries = cur.read_u32::<LittleEndian>()?;
        let size_of_partition_entry = cur.read_u32::<LittleEndian>()?;
        let _array_crc32 = cur.read_u32::<LittleEndian>()?;

        Ok(GptHeader {
            revision,
            header_size,
            current_lba,
            backup_lba,
            first_usable_lba,
            last_usable_lba,
            disk_guid,
            partition_entry_lba,
            num_partition_entries,
            size_of_partition_entry,
        })
    }
}

/// A resolved partition entry with byte offsets computed for a given
/// logical block size.
#[derive(Debug, Clone)]
pub struct GptPartition {
    pub type_guid: Uuid,
    pub unique_guid: Uuid,
    pub first_lba: u64,
    pub last_lba: u64,
    pub attributes: u64,
    pub name: String,
    pub offset: u64,
    pub size: u64,
}

impl GptPartition {
    pub fn is_apfs_container(&self) -> bool {
        self.type_guid == APFS_CONTAINER_GUID
    }

    pub fn is_esp(&self) -> bool {
        self.type_guid == ESP_GUID
    }
}

fn read_mixed_endian_uuid(b: &[u8; 16]) -> Uuid {
    // GPT GUIDs store the first three fields little-endian and the last
    // two big-endian; `Uuid::from_fields` takes them in canonical order.
    let d1 = u32::from_le_bytes([b[0], b[1], b[2], b[3]]);
    let d2 = u16::from_le_bytes([b[4], b[5]]);
    let d3 = u16::from_le_bytes([b[6], b[7]]);
    let mut d4 = [0u8; 8];
    d4.copy_from_slice(&b[8..16]);
    Uuid::from_fields(d1, d2, d3, &d4)
}

fn decode_utf16le_name(bytes: &[u8]) -> String {
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .take_while(|&u| u != 0)
        .collect();
    String::from_utf16_lossy(&units)
}

/// Read the GPT header and enumerate every non-empty primary partition
/// entry, given the device's logical block size (typically 512).
pub fn read_partitions<D: BlockDevice>(
    device: &mut D,
    logical_block_size: u64,
) -> Result<(GptHeader, Vec<GptPartition>)> {
    let mut header_buf = vec![0u8; GPT_HEADER_SIZE];
    let got = device.read_at(logical_block_size, &mut header_buf)?;
    if got != header_buf.len() {
        return Err(ApfsError::IoShortRead {
            offset: logical_block_size,
            needed: header_buf.len(),
            got,
        });
    }
    let header = GptHeader::parse(&header_buf)?;

    if header.size_of_partition_entry != EXPECTED_PARTITION_ENTRY_SIZE {
        log::warn!(
            "GPT declares partition entry size {}, expected {}",
            header.size_of_partition_entry,
            EXPECTED_PARTITION_ENTRY_SIZE
        );
    }
    if header.size_of_partition_entry < 128 {
        return Err(ApfsError::StructureTooSmall(format!(
            "short read for partition entry array: entry size {} < 128",
            header.size_of_partition_entry
        )));
    }

    let array_offset = header.partition_entry_lba * logical_block_size;
    let entry_size = header.size_of_partition_entry as usize;
    let mut partitions = Vec::new();

    for i in 0..header.num_partition_entries {
        let entry_offset = array_offset + i as u64 * entry_size as u64;
        let mut buf = vec![0u8; entry_size];
        let got = device.read_at(entry_offset, &mut buf)?;
        if got != buf.len() {
            return Err(ApfsError::IoShortRead {
                offset: entry_offset,
                needed: buf.len(),
                got,
            });
        }

        let mut type_guid_bytes = [0u8; 16];
        type_guid_bytes.copy_from_slice(&buf[0..16]);
        let type_guid = read_mixed_endian_uuid(&type_guid_bytes);
        if type_guid.is_nil() {
            continue;
        }

        let mut unique_guid_bytes = [0u8; 16];
        unique_guid_bytes.copy_from_slice(&buf[16..32]);
        let unique_guid = read_mixed_endian_uuid(&unique_guid_bytes);

        let first_lba = u64::from_le_bytes(buf[32..40].try_into().unwrap());
        let last_lba = u64::from_le_bytes(buf[40..48].try_into().unwrap());
        let attributes = u64::from_le_bytes(buf[48..56].try_into().unwrap());
        let name_bytes = if buf.len() >= 128 { &buf[56..128] } else { &buf[56..] };
        let name = decode_utf16le_name(name_bytes);

        let offset = first_lba * logical_block_size;
        let size = (last_lba.saturating_sub(first_lba) + 1) * logical_block_size;

        partitions.push(GptPartition {
            type_guid,
            unique_guid,
            first_lba,
            last_lba,
            attributes,
            name,
            offset,
            size,
        });
    }

    Ok((header, partitions))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn build_gpt_header(entry_size: u32, num_entries: u32) -> Vec<u8> {
        let mut buf = vec![0u8; GPT_HEADER_SIZE];
        buf[0..8].copy_from_slice(&GPT_SIGNATURE);
        buf[8..12].copy_from_slice(&1u32.to_le_bytes());
        buf[12..16].copy_from_slice(&(GPT_HEADER_SIZE as u32).to_le_bytes());
        buf[24..32].copy_from_slice(&1u64.to_le_bytes());
        buf[32..40].copy_from_slice(&2u64.to_le_bytes());
        buf[40..48].copy_from_slice(&34u64.to_le_bytes());
        buf[48..56].copy_from_slice(&100u64.to_le_bytes());
        buf[72..80].copy_from_slice(&2u64.to_le_bytes());
        buf[80..84].copy_from_slice(&num_entries.to_le_bytes());
        buf[84..88].copy_from_slice(&entry_size.to_le_bytes());
        buf
    }

    #[test]
    fn test_parse_header_rejects_bad_signature() {
        let mut buf = build_gpt_header(128, 0);
        buf[0] = b'X';
        assert!(GptHeader::parse(&buf).is_err());
    }

    #[test]
    fn test_parse_header_ok() {
        let buf = build_gpt_header(128, 0);
        let header = GptHeader::parse(&buf).unwrap();
        assert_eq!(header.size_of_partition_entry, 128);
        assert_eq!(header.partition_entry_lba, 2);
    }

    #[test]
    fn test_mismatched_entry_size_rejected() {
        // logical_block_size 512, header at LBA 1, entry array at LBA 2.
        let mut device = Vec::new();
        device.resize(512 * 3, 0);
        let header = build_gpt_header(100, 1);
        device[512..512 + GPT_HEADER_SIZE].copy_from_slice(&header);
        let mut cur = Cursor::new(device);
        let result = read_partitions(&mut cur, 512);
        assert!(result.is_err());
    }

    #[test]
    fn test_read_partitions_apfs_guid() {
        let mut device = vec![0u8; 512 * 4];
        let header = build_gpt_header(128, 1);
        device[512..512 + GPT_HEADER_SIZE].copy_from_slice(&header);

        let mut entry = vec![0u8; 128];
        // Mixed-endian encode of APFS_CONTAINER_GUID.
        let fields = APFS_CONTAINER_GUID.as_fields();
        entry[0..4].copy_from_slice(&fields.0.to_le_bytes());
        entry[4..6].copy_from_slice(&fields.1.to_le_bytes());
        entry[6..8].copy_from_slice(&fields.2.to_le_bytes());
        entry[8..16].copy_from_slice(fields.3);
        entry[32..40].copy_from_slice(&10u64.to_le_bytes());
        entry[40..48].copy_from_slice(&20u64.to_le_bytes());
        device[1024..1024 + 128].copy_from_slice(&entry);

        let mut cur = Cursor::new(device);
        let (_header, parts) = read_partitions(&mut cur, 512).unwrap();
        assert_eq!(parts.len(), 1);
        assert!(parts[0].is_apfs_container());
        assert_eq!(parts[0].offset, 10 * 512);
        assert_eq!(parts[0].size, 11 * 512);
    }
}
