//! Reaper state machine, encryption-rolling recovery chain, and the
//! general bitmap structures the reaper and space manager share.
//!
//! No teacher module does anything like this; each reader here follows
//! the `ObjectHeader::parse` + `Cursor`-based field reads already used
//! by `superblock.rs`/`object.rs`.

use byteorder::{LittleEndian, ReadBytesExt};
use std::io::Cursor;

use crate::error::{ApfsError, Result};
use crate::object::ObjectHeader;

pub const NR_BHM_FLAG: u32 = 0x0000_0001;
pub const NR_CONTINUE: u32 = 0x0000_0002;

pub const NRLE_VALID: u32 = 0x0000_0001;
pub const NRLE_REAP_ID_RECORD: u32 = 0x0000_0002;
pub const NRLE_CALL: u32 = 0x0000_0004;
pub const NRLE_COMPLETION: u32 = 0x0000_0008;
pub const NRLE_CLEANUP: u32 = 0x0000_0010;

/// Linear progression of the container reaper.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaperPhase {
    Start,
    Snapshots,
    ActiveFs,
    DestroyOmap,
    Done,
}

impl ReaperPhase {
    pub fn from_u32(v: u32) -> Result<Self> {
        match v {
            1 => Ok(ReaperPhase::Start),
            2 => Ok(ReaperPhase::Snapshots),
            3 => Ok(ReaperPhase::ActiveFs),
            4 => Ok(ReaperPhase::DestroyOmap),
            5 => Ok(ReaperPhase::Done),
            other => Err(ApfsError::InvalidInput(format!("unknown reaper phase {}", other))),
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            ReaperPhase::Start => "initializing reap of a destroyed object",
            ReaperPhase::Snapshots => "reaping snapshot metadata trees",
            ReaperPhase::ActiveFs => "reaping the active filesystem tree",
            ReaperPhase::DestroyOmap => "destroying the volume's object map",
            ReaperPhase::Done => "reap complete",
        }
    }

    /// The phase that linearly follows this one, or `None` once `Done`.
    pub fn next(&self) -> Option<ReaperPhase> {
        match self {
            ReaperPhase::Start => Some(ReaperPhase::Snapshots),
            ReaperPhase::Snapshots => Some(ReaperPhase::ActiveFs),
            ReaperPhase::ActiveFs => Some(ReaperPhase::DestroyOmap),
            ReaperPhase::DestroyOmap => Some(ReaperPhase::Done),
            ReaperPhase::Done => None,
        }
    }
}

/// Container-level reaper object (`nx_reaper_phys_t`).
#[derive(Debug, Clone)]
pub struct NxReaper {
    pub header: ObjectHeader,
    pub phase: ReaperPhase,
    pub flags: u32,
    pub reap_count: u32,
    pub last_processed_paddr: u64,
    pub fs_oid: u64,
    pub current_snap_xid: u64,
}

impl NxReaper {
    pub fn parse(data: &[u8]) -> Result<Self> {
        let header = ObjectHeader::parse(data)?;
        let body = &data[ObjectHeader::SIZE..];
        if body.len() < 36 {
            return Err(ApfsError::StructureTooSmall("nx_reaper_phys_t body too short".into()));
        }
        let mut cursor = Cursor::new(body);
        let flags = cursor.read_u32::<LittleEndian>()?;
        let reap_count = cursor.read_u32::<LittleEndian>()?;
        let phase_raw = cursor.read_u32::<LittleEndian>()?;
        let last_processed_paddr = cursor.read_u64::<LittleEndian>()?;
        let fs_oid = cursor.read_u64::<LittleEndian>()?;
        let current_snap_xid = cursor.read_u64::<LittleEndian>()?;

        Ok(NxReaper {
            header,
            phase: ReaperPhase::from_u32(phase_raw)?,
            flags,
            reap_count,
            last_processed_paddr,
            fs_oid,
            current_snap_xid,
        })
    }

    pub fn is_busy(&self) -> bool {
        self.flags & NR_BHM_FLAG != 0
    }

    pub fn should_continue(&self) -> bool {
        self.flags & NR_CONTINUE != 0
    }
}

/// One entry in a reaper list (`nx_reap_list_entry_t`).
#[derive(Debug, Clone)]
pub struct ReaperListEntry {
    pub next_index: u32,
    pub flags: u32,
    pub rtype: u32,
    pub size: u32,
    pub fs_oid: u64,
    pub oid: u64,
    pub xid: u64,
}

impl ReaperListEntry {
    pub const SIZE: usize = 40;

    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE {
            return Err(ApfsError::StructureTooSmall("reaper list entry too short".into()));
        }
        let mut cursor = Cursor::new(data);
        Ok(ReaperListEntry {
            next_index: cursor.read_u32::<LittleEndian>()?,
            flags: cursor.read_u32::<LittleEndian>()?,
            rtype: cursor.read_u32::<LittleEndian>()?,
            size: cursor.read_u32::<LittleEndian>()?,
            fs_oid: cursor.read_u64::<LittleEndian>()?,
            oid: cursor.read_u64::<LittleEndian>()?,
            xid: cursor.read_u64::<LittleEndian>()?,
        })
    }

    pub fn is_valid(&self) -> bool {
        self.flags & NRLE_VALID != 0
    }

    pub fn is_completion(&self) -> bool {
        self.flags & NRLE_COMPLETION != 0
    }
}

/// Parse every entry packed into a reaper list block's body.
pub fn parse_reaper_list_entries(body: &[u8], count: usize) -> Result<Vec<ReaperListEntry>> {
    let mut entries = Vec::with_capacity(count);
    for i in 0..count {
        let start = i * ReaperListEntry::SIZE;
        let end = start + ReaperListEntry::SIZE;
        if end > body.len() {
            return Err(ApfsError::StructureTooSmall(format!(
                "reaper list entry {} extends past block", i
            )));
        }
        entries.push(ReaperListEntry::parse(&body[start..end])?);
    }
    Ok(entries)
}

/// Encryption-rolling recovery block (`er_recovery_block_phys_t`): a
/// node in a singly linked chain of in-progress rolling state.
#[derive(Debug, Clone)]
pub struct ErRecoveryBlock {
    pub header: ObjectHeader,
    pub next_oid: u64,
    pub crypto_id: u64,
    pub key_data: Vec<u8>,
}

impl ErRecoveryBlock {
    pub fn parse(data: &[u8]) -> Result<Self> {
        let header = ObjectHeader::parse(data)?;
        let body = &data[ObjectHeader::SIZE..];
        if body.len() < 16 {
            return Err(ApfsError::StructureTooSmall("er recovery block body too short".into()));
        }
        let mut cursor = Cursor::new(body);
        let next_oid = cursor.read_u64::<LittleEndian>()?;
        let crypto_id = cursor.read_u64::<LittleEndian>()?;
        let key_data = body[16..].to_vec();

        Ok(ErRecoveryBlock {
            header,
            next_oid,
            crypto_id,
            key_data,
        })
    }

    pub fn has_next(&self) -> bool {
        self.next_oid != 0
    }
}

/// A general bitmap block (`gbitmap_block_phys_t`): a flat array of
/// 64-bit words addressed bit-by-bit.
#[derive(Debug, Clone)]
pub struct GeneralBitmapBlock {
    pub header: ObjectHeader,
    pub words: Vec<u64>,
}

impl GeneralBitmapBlock {
    pub fn parse(data: &[u8]) -> Result<Self> {
        let header = ObjectHeader::parse(data)?;
        let body = &data[ObjectHeader::SIZE..];
        let mut words = Vec::with_capacity(body.len() / 8);
        let mut cursor = Cursor::new(body);
        while cursor.position() as usize + 8 <= body.len() {
            words.push(cursor.read_u64::<LittleEndian>()?);
        }
        Ok(GeneralBitmapBlock { header, words })
    }

    pub fn bit_capacity(&self) -> u64 {
        self.words.len() as u64 * 64
    }

    /// Returns `None` rather than panicking when `bit` is out of range.
    pub fn get_bit(&self, bit: u64) -> Option<bool> {
        let word_idx = (bit / 64) as usize;
        let word = self.words.get(word_idx)?;
        Some(word & (1u64 << (bit % 64)) != 0)
    }

    /// No-op when `bit` is out of range.
    pub fn set_bit(&mut self, bit: u64) {
        let word_idx = (bit / 64) as usize;
        if let Some(word) = self.words.get_mut(word_idx) {
            *word |= 1u64 << (bit % 64);
        }
    }

    /// No-op when `bit` is out of range.
    pub fn clear_bit(&mut self, bit: u64) {
        let word_idx = (bit / 64) as usize;
        if let Some(word) = self.words.get_mut(word_idx) {
            *word &= !(1u64 << (bit % 64));
        }
    }
}

/// General bitmap descriptor (`gbitmap_t`): names the tree holding the
/// bitmap's blocks and its logical size.
#[derive(Debug, Clone)]
pub struct GeneralBitmapDescriptor {
    pub tree_oid: u64,
    pub bit_count: u64,
    pub flags: u32,
}

impl GeneralBitmapDescriptor {
    pub const SIZE: usize = 20;

    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE {
            return Err(ApfsError::StructureTooSmall("gbitmap descriptor too short".into()));
        }
        let mut cursor = Cursor::new(data);
        Ok(GeneralBitmapDescriptor {
            tree_oid: cursor.read_u64::<LittleEndian>()?,
            bit_count: cursor.read_u64::<LittleEndian>()?,
            flags: cursor.read_u32::<LittleEndian>()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_object_header(obj_type: u32) -> Vec<u8> {
        let mut h = vec![0u8; ObjectHeader::SIZE];
        h[0x18..0x1C].copy_from_slice(&obj_type.to_le_bytes());
        h
    }

    #[test]
    fn test_reaper_phase_from_u32_and_next() {
        let phase = ReaperPhase::from_u32(2).unwrap();
        assert_eq!(phase, ReaperPhase::Snapshots);
        assert_eq!(phase.next(), Some(ReaperPhase::ActiveFs));
        assert_eq!(ReaperPhase::Done.next(), None);
    }

    #[test]
    fn test_reaper_phase_rejects_unknown() {
        assert!(ReaperPhase::from_u32(99).is_err());
    }

    #[test]
    fn test_nx_reaper_parse() {
        let mut data = make_object_header(crate::object::OBJECT_TYPE_NX_REAPER);
        data.extend_from_slice(&(NR_BHM_FLAG | NR_CONTINUE).to_le_bytes());
        data.extend_from_slice(&5u32.to_le_bytes());
        data.extend_from_slice(&3u32.to_le_bytes()); // ActiveFs
        data.extend_from_slice(&1000u64.to_le_bytes());
        data.extend_from_slice(&42u64.to_le_bytes());
        data.extend_from_slice(&7u64.to_le_bytes());

        let reaper = NxReaper::parse(&data).unwrap();
        assert_eq!(reaper.phase, ReaperPhase::ActiveFs);
        assert!(reaper.is_busy());
        assert!(reaper.should_continue());
        assert_eq!(reaper.fs_oid, 42);
        assert_eq!(reaper.current_snap_xid, 7);
    }

    #[test]
    fn test_reaper_list_entry_parse() {
        let mut data = Vec::new();
        data.extend_from_slice(&1u32.to_le_bytes());
        data.extend_from_slice(&(NRLE_VALID | NRLE_COMPLETION).to_le_bytes());
        data.extend_from_slice(&2u32.to_le_bytes());
        data.extend_from_slice(&64u32.to_le_bytes());
        data.extend_from_slice(&10u64.to_le_bytes());
        data.extend_from_slice(&20u64.to_le_bytes());
        data.extend_from_slice(&30u64.to_le_bytes());

        let entry = ReaperListEntry::parse(&data).unwrap();
        assert!(entry.is_valid());
        assert!(entry.is_completion());
        assert_eq!(entry.fs_oid, 10);
    }

    #[test]
    fn test_parse_reaper_list_entries_rejects_truncation() {
        let data = vec![0u8; ReaperListEntry::SIZE - 1];
        assert!(parse_reaper_list_entries(&data, 1).is_err());
    }

    #[test]
    fn test_er_recovery_block_chain_detection() {
        let mut data = make_object_header(crate::object::OBJECT_TYPE_ER_RECOVERY_BLOCK);
        data.extend_from_slice(&99u64.to_le_bytes());
        data.extend_from_slice(&5u64.to_le_bytes());
        data.extend_from_slice(&[0xAA; 32]);

        let block = ErRecoveryBlock::parse(&data).unwrap();
        assert!(block.has_next());
        assert_eq!(block.next_oid, 99);
    }

    #[test]
    fn test_general_bitmap_block_get_set_clear_out_of_range() {
        let mut data = make_object_header(crate::object::OBJECT_TYPE_GBITMAP_BLOCK);
        data.extend_from_slice(&0u64.to_le_bytes());

        let mut block = GeneralBitmapBlock::parse(&data).unwrap();
        assert_eq!(block.bit_capacity(), 64);
        assert_eq!(block.get_bit(0), Some(false));
        assert_eq!(block.get_bit(1000), None);

        block.set_bit(3);
        assert_eq!(block.get_bit(3), Some(true));
        block.clear_bit(3);
        assert_eq!(block.get_bit(3), Some(false));

        // Out-of-range set/clear must not panic.
        block.set_bit(1000);
        block.clear_bit(1000);
    }

    #[test]
    fn test_general_bitmap_descriptor_parse() {
        let mut data = Vec::new();
        data.extend_from_slice(&5u64.to_le_bytes());
        data.extend_from_slice(&4096u64.to_le_bytes());
        data.extend_from_slice(&0u32.to_le_bytes());

        let desc = GeneralBitmapDescriptor::parse(&data).unwrap();
        assert_eq!(desc.tree_oid, 5);
        assert_eq!(desc.bit_count, 4096);
    }
}
