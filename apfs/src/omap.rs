use byteorder::{LittleEndian, ReadBytesExt};
use std::io::{Cursor, Read, Seek};

use crate::btree;
use crate::error::{ApfsError, Result};
use crate::object;

/// OMAP key: (oid: u64, xid: u64) — 16 bytes, fixed-size.
/// OMAP value: (flags: u32, size: u32, paddr: u64) — 16 bytes, fixed-size.
const OMAP_KEY_SIZE: u32 = 16;
const OMAP_VAL_SIZE: u32 = 16;

pub const OMAP_VAL_DELETED: u32 = 0x00000001;
pub const OMAP_VAL_SAVED: u32 = 0x00000002;
pub const OMAP_VAL_ENCRYPTED: u32 = 0x00000004;
pub const OMAP_VAL_NOHEADER: u32 = 0x00000008;

/// Read the OMAP structure at a given physical block and return the
/// physical block number of the OMAP B-tree root.
pub fn read_omap_tree_root<R: Read + Seek>(
    reader: &mut R,
    omap_block: u64,
    block_size: u32,
) -> Result<u64> {
    let block_data = object::read_block(reader, omap_block, block_size)?;

    // omap_phys_t layout after obj_phys_t (32 bytes):
    //   om_flags: u32 (4)
    //   om_snap_count: u32 (4)
    //   om_tree_type: u32 (4)
    //   om_snapshot_tree_type: u32 (4)
    //   om_tree_oid: u64 (8)  <- B-tree root physical block
    let mut cursor = Cursor::new(&block_data[object::ObjectHeader::SIZE..]);
    let _om_flags = cursor.read_u32::<LittleEndian>()?;
    let _om_snap_count = cursor.read_u32::<LittleEndian>()?;
    let _om_tree_type = cursor.read_u32::<LittleEndian>()?;
    let _om_snap_tree_type = cursor.read_u32::<LittleEndian>()?;
    let om_tree_oid = cursor.read_u64::<LittleEndian>()?;

    Ok(om_tree_oid)
}

/// Look up a virtual OID in an OMAP B-tree, bounded by a snapshot
/// transaction id: returns the entry with matching `oid` and the
/// largest `xid <= snapshot_xid`. A matching entry carrying the
/// DELETED flag is treated as not found.
pub fn omap_lookup_snapshot<R: Read + Seek>(
    reader: &mut R,
    omap_tree_root: u64,
    block_size: u32,
    target_oid: u64,
    snapshot_xid: u64,
) -> Result<(u64, u32)> {
    let range_fn = |key: &[u8]| -> Option<bool> {
        if key.len() < 16 {
            return Some(false);
        }
        let key_oid = u64::from_le_bytes(key[0..8].try_into().unwrap());
        if key_oid < target_oid {
            Some(false)
        } else if key_oid == target_oid {
            Some(true)
        } else {
            None
        }
    };

    let entries = btree::btree_scan(
        reader,
        omap_tree_root,
        block_size,
        OMAP_KEY_SIZE,
        OMAP_VAL_SIZE,
        &range_fn,
        None,
    )?;

    let mut best: Option<(u64, u64, u32)> = None; // (xid, paddr, flags)
    for (key, val) in &entries {
        if key.len() < 16 {
            continue;
        }
        let xid = u64::from_le_bytes(key[8..16].try_into().unwrap());
        if xid > snapshot_xid {
            continue;
        }
        if best.map_or(true, |(best_xid, _, _)| xid > best_xid) {
            let (paddr, flags) = parse_omap_val(val)?;
            best = Some((xid, paddr, flags));
        }
    }

    match best {
        Some((_, _, flags)) if flags & OMAP_VAL_DELETED != 0 => Err(ApfsError::NotFound(format!(
            "OMAP entry for OID {} at xid <= {} is deleted",
            target_oid, snapshot_xid
        ))),
        Some((_, paddr, flags)) => Ok((paddr, flags)),
        None => Err(ApfsError::NotFound(format!(
            "OMAP lookup failed: OID {} has no entry with xid <= {}",
            target_oid, snapshot_xid
        ))),
    }
}

/// Convenience wrapper over [`omap_lookup_snapshot`] that resolves the
/// current (most recent) mapping for an OID, the way a container mounted
/// without a snapshot bound reads its live tree.
pub fn omap_lookup<R: Read + Seek>(
    reader: &mut R,
    omap_tree_root: u64,
    block_size: u32,
    target_oid: u64,
) -> Result<u64> {
    let (paddr, _flags) =
        omap_lookup_snapshot(reader, omap_tree_root, block_size, target_oid, u64::MAX)?;
    Ok(paddr)
}

/// Parse an OMAP value: (flags: u32, size: u32, paddr: u64)
fn parse_omap_val(val: &[u8]) -> Result<(u64, u32)> {
    if val.len() < 16 {
        return Err(ApfsError::InvalidBTree("omap value too short".into()));
    }
    let flags = u32::from_le_bytes(val[0..4].try_into().unwrap());
    let paddr = u64::from_le_bytes(val[8..16].try_into().unwrap());
    Ok((paddr, flags))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::superblock;
    use std::io::BufReader;

    #[test]
    fn test_omap_val_flag_decode() {
        let mut val = [0u8; 16];
        val[0..4].copy_from_slice(&OMAP_VAL_DELETED.to_le_bytes());
        val[8..16].copy_from_slice(&42u64.to_le_bytes());
        let (paddr, flags) = parse_omap_val(&val).unwrap();
        assert_eq!(paddr, 42);
        assert_eq!(flags & OMAP_VAL_DELETED, OMAP_VAL_DELETED);
    }

    /// Requires ../tests/appfs.raw fixture. Run with `cargo test -- --ignored`.
    #[test]
    #[ignore]
    fn test_omap_lookup() {
        let file = std::fs::File::open("../tests/appfs.raw").unwrap();
        let mut reader = BufReader::new(file);

        let nxsb = superblock::read_nxsb(&mut reader).unwrap();
        let latest = superblock::find_latest_nxsb(&mut reader, &nxsb).unwrap();

        let omap_root = read_omap_tree_root(&mut reader, latest.omap_oid, latest.block_size).unwrap();

        let vol_oid = latest.fs_oids.iter().find(|&&o| o != 0).copied().unwrap();

        let vol_block = omap_lookup(&mut reader, omap_root, latest.block_size, vol_oid).unwrap();
        assert!(vol_block > 0 && vol_block < latest.block_count,
            "Physical block {} should be within container", vol_block);

        let vol_data = object::read_block(&mut reader, vol_block, latest.block_size).unwrap();
        let vol_sb = superblock::ApfsSuperblock::parse(&vol_data).unwrap();
        assert_eq!(vol_sb.magic, superblock::APSB_MAGIC);
    }
}
