//! Checkpoint descriptor ring and checkpoint-map chain resolution.
//!
//! The container superblock points at a circular descriptor area; each
//! descriptor slot holds either another superblock or a checkpoint map
//! that records where a checkpoint's ephemeral objects (OMAP tree,
//! space manager state, reaper, EFI jumpstart, ...) physically live.

use byteorder::{LittleEndian, ReadBytesExt};
use std::io::{Cursor, Read, Seek};

use crate::error::{ApfsError, Result};
use crate::object::{ObjectHeader, OBJECT_TYPE_CHECKPOINT_MAP};
use crate::superblock::NxSuperblock;

pub const CHECKPOINT_MAP_LAST: u32 = 0x00000001;
const MAX_MAPPING_COUNT: u32 = 1000;

#[derive(Debug, Clone)]
pub struct CheckpointMapping {
    pub obj_type: u32,
    pub obj_subtype: u32,
    pub size: u32,
    pub fs_oid: u64,
    pub oid: u64,
    pub paddr: u64,
}

#[derive(Debug, Clone)]
pub struct CheckpointMap {
    pub header: ObjectHeader,
    pub flags: u32,
    pub mappings: Vec<CheckpointMapping>,
}

impl CheckpointMap {
    pub fn is_last(&self) -> bool {
        self.flags & CHECKPOINT_MAP_LAST != 0
    }

    /// Parse and validate a checkpoint map block: object type must be
    /// CHECKPOINT_MAP and the declared count must be in (0, 1000].
    pub fn parse(block: &[u8]) -> Result<Self> {
        let header = ObjectHeader::parse(block)?;
        if header.object_type() != OBJECT_TYPE_CHECKPOINT_MAP {
            return Err(ApfsError::InvalidMagic {
                expected: OBJECT_TYPE_CHECKPOINT_MAP,
                observed: header.object_type(),
            });
        }

        let mut cursor = Cursor::new(block);
        cursor.set_position(ObjectHeader::SIZE as u64);

        let flags = cursor.read_u32::<LittleEndian>()?;
        let count = cursor.read_u32::<LittleEndian>()?;

        if count == 0 || count > MAX_MAPPING_COUNT {
            return Err(ApfsError::StructureTooSmall(format!(
                "checkpoint map declares {} mappings, expected (0, {}]",
                count, MAX_MAPPING_COUNT
            )));
        }

        let mut mappings = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let obj_type = cursor.read_u32::<LittleEndian>()?;
            let obj_subtype = cursor.read_u32::<LittleEndian>()?;
            let size = cursor.read_u32::<LittleEndian>()?;
            let _pad = cursor.read_u32::<LittleEndian>()?;
            let fs_oid = cursor.read_u64::<LittleEndian>()?;
            let oid = cursor.read_u64::<LittleEndian>()?;
            let paddr = cursor.read_u64::<LittleEndian>()?;
            mappings.push(CheckpointMapping {
                obj_type,
                obj_subtype,
                size,
                fs_oid,
                oid,
                paddr,
            });
        }

        if mappings.len() != count as usize {
            return Err(ApfsError::StructureTooSmall(
                "parsed mapping count does not match declared count".into(),
            ));
        }

        Ok(CheckpointMap { header, flags, mappings })
    }

    pub fn find_by_type(&self, obj_type: u32) -> Option<&CheckpointMapping> {
        self.mappings.iter().find(|m| m.obj_type == obj_type)
    }

    pub fn find_by_oid(&self, oid: u64) -> Option<&CheckpointMapping> {
        self.mappings.iter().find(|m| m.oid == oid)
    }
}

/// Which strategy located the active checkpoint map, recorded for
/// diagnostics and for the EFI jumpstart resolver's fallback ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocatorOutcome {
    TryLatest,
    TrySuperblockIndex,
    FullScan,
}

/// Resolves the active checkpoint-map chain for a container, implementing
/// the `TRY_LATEST -> TRY_SUPERBLOCK_INDEX -> FULL_SCAN -> FAIL` search.
pub struct CheckpointLocator<'a, R> {
    reader: &'a mut R,
    nxsb: &'a NxSuperblock,
}

impl<'a, R: Read + Seek> CheckpointLocator<'a, R> {
    pub fn new(reader: &'a mut R, nxsb: &'a NxSuperblock) -> Self {
        CheckpointLocator { reader, nxsb }
    }

    fn descriptor_index_valid(&self, index: u32) -> bool {
        index < self.nxsb.xp_desc_blocks
    }

    fn read_map_at_index(&mut self, index: u32) -> Result<CheckpointMap> {
        if !self.descriptor_index_valid(index) {
            return Err(ApfsError::OutOfRange(format!(
                "checkpoint descriptor index {} out of range [0, {})",
                index, self.nxsb.xp_desc_blocks
            )));
        }
        let block_num = self.nxsb.xp_desc_base + index as u64;
        let block = crate::object::read_block(self.reader, block_num, self.nxsb.block_size)?;
        CheckpointMap::parse(&block)
    }

    /// Walk the chain starting at `index`, following internal
    /// checkpoint-map-typed mappings until `CPM_LAST` is set. Returns the
    /// full chain, root first.
    pub fn read_chain_at(&mut self, index: u32) -> Result<Vec<CheckpointMap>> {
        let mut chain = Vec::new();
        let mut current = self.read_map_at_index(index)?;
        loop {
            let is_last = current.is_last();
            let next_mapping = current
                .find_by_type(OBJECT_TYPE_CHECKPOINT_MAP)
                .map(|m| m.paddr);
            chain.push(current);
            if is_last {
                break;
            }
            match next_mapping {
                Some(paddr) => {
                    let block = crate::object::read_block(self.reader, paddr, self.nxsb.block_size)?;
                    current = CheckpointMap::parse(&block)?;
                }
                None => break,
            }
        }
        Ok(chain)
    }

    /// Locate the most recent checkpoint-map chain using the state
    /// machine described for the EFI jumpstart resolver and strict-open
    /// validation path: try the computed "latest" slot, then fall back
    /// to the superblock's reported index, then a full linear scan.
    pub fn locate(&mut self) -> Result<(LocatorOutcome, Vec<CheckpointMap>)> {
        let latest_index = if self.nxsb.xp_desc_next == 0 {
            self.nxsb.xp_desc_blocks.saturating_sub(1)
        } else {
            self.nxsb.xp_desc_next - 1
        };

        if self.descriptor_index_valid(latest_index) {
            if let Ok(chain) = self.read_chain_at(latest_index) {
                return Ok((LocatorOutcome::TryLatest, chain));
            }
        }

        if self.descriptor_index_valid(self.nxsb.xp_desc_index) {
            if let Ok(chain) = self.read_chain_at(self.nxsb.xp_desc_index) {
                return Ok((LocatorOutcome::TrySuperblockIndex, chain));
            }
        }

        for index in 0..self.nxsb.xp_desc_blocks {
            if let Ok(chain) = self.read_chain_at(index) {
                return Ok((LocatorOutcome::FullScan, chain));
            }
        }

        Err(ApfsError::NotFound(
            "no valid checkpoint map found in descriptor area".into(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_checkpoint_map_block(block_size: usize, flags: u32, mappings: &[(u32, u32, u64, u64, u64)]) -> Vec<u8> {
        let mut block = vec![0u8; block_size];
        block[24..28].copy_from_slice(&OBJECT_TYPE_CHECKPOINT_MAP.to_le_bytes());
        block[32..36].copy_from_slice(&flags.to_le_bytes());
        block[36..40].copy_from_slice(&(mappings.len() as u32).to_le_bytes());
        let mut off = 40;
        for &(obj_type, obj_subtype, fs_oid, oid, paddr) in mappings {
            block[off..off + 4].copy_from_slice(&obj_type.to_le_bytes());
            block[off + 4..off + 8].copy_from_slice(&obj_subtype.to_le_bytes());
            block[off + 8..off + 12].copy_from_slice(&0u32.to_le_bytes()); // size
            block[off + 12..off + 16].copy_from_slice(&0u32.to_le_bytes()); // pad
            block[off + 16..off + 24].copy_from_slice(&fs_oid.to_le_bytes());
            block[off + 24..off + 32].copy_from_slice(&oid.to_le_bytes());
            block[off + 32..off + 40].copy_from_slice(&paddr.to_le_bytes());
            off += 40;
        }
        block
    }

    #[test]
    fn test_parse_checkpoint_map_rejects_zero_count() {
        let block = build_checkpoint_map_block(4096, CHECKPOINT_MAP_LAST, &[]);
        assert!(CheckpointMap::parse(&block).is_err());
    }

    #[test]
    fn test_parse_checkpoint_map_finds_mapping() {
        let block = build_checkpoint_map_block(4096, CHECKPOINT_MAP_LAST, &[(0x0B, 0, 0, 5, 100)]);
        let map = CheckpointMap::parse(&block).unwrap();
        assert!(map.is_last());
        assert_eq!(map.find_by_type(0x0B).unwrap().paddr, 100);
        assert!(map.find_by_oid(5).is_some());
    }
}
