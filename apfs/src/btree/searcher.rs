use std::io::{Read, Seek};

use crate::error::Result;

use super::navigator::Navigator;
use super::node::BTreeNode;

/// Point and range search over a tree reached through a [`Navigator`].
pub struct Searcher<'a, 'b, R> {
    nav: &'a mut Navigator<'b, R>,
}

impl<'a, 'b, R: Read + Seek> Searcher<'a, 'b, R> {
    pub fn new(nav: &'a mut Navigator<'b, R>) -> Self {
        Searcher { nav }
    }

    /// Descend using "first entry whose key > search key"; if none,
    /// take the rightmost child. On leaves, scan for a byte-equal key.
    pub fn find<F>(&mut self, root_oid: u64, compare: &F) -> Result<Option<Vec<u8>>>
    where
        F: Fn(&[u8]) -> std::cmp::Ordering,
    {
        let root = self.nav.get_root_node(root_oid)?;
        self.find_in(&root, compare)
    }

    fn find_in<F>(&mut self, node: &BTreeNode, compare: &F) -> Result<Option<Vec<u8>>>
    where
        F: Fn(&[u8]) -> std::cmp::Ordering,
    {
        let fks = self.nav.fixed_key_size();
        let fvs = self.nav.fixed_val_size();

        if node.node_header.is_leaf() {
            for i in 0..node.node_header.btn_nkeys as usize {
                let key = node.key(i, fks)?;
                match compare(key) {
                    std::cmp::Ordering::Equal => return Ok(Some(node.value(i, fvs)?.to_vec())),
                    std::cmp::Ordering::Greater => return Ok(None),
                    std::cmp::Ordering::Less => continue,
                }
            }
            return Ok(None);
        }

        let mut child_idx: Option<usize> = None;
        for i in 0..node.node_header.btn_nkeys as usize {
            let key = node.key(i, fks)?;
            match compare(key) {
                std::cmp::Ordering::Less | std::cmp::Ordering::Equal => child_idx = Some(i),
                std::cmp::Ordering::Greater => break,
            }
        }

        let child_idx = match child_idx {
            Some(i) => i,
            None => return Ok(None),
        };

        let child = self.nav.get_child_node(node, child_idx)?;
        self.find_in(&child, compare)
    }

    pub fn contains_key<F>(&mut self, root_oid: u64, compare: &F) -> Result<bool>
    where
        F: Fn(&[u8]) -> std::cmp::Ordering,
    {
        Ok(self.find(root_oid, compare)?.is_some())
    }

    /// Collect every `(key, value)` pair whose key lies in `[lo, hi]`
    /// under byte-lexicographic order via `key_cmp`. Rejects `lo > hi`.
    pub fn find_range<F>(
        &mut self,
        root_oid: u64,
        lo: &[u8],
        hi: &[u8],
        key_cmp: &F,
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>>
    where
        F: Fn(&[u8], &[u8]) -> std::cmp::Ordering,
    {
        if key_cmp(lo, hi) == std::cmp::Ordering::Greater {
            return Err(crate::error::ApfsError::InvalidInput(
                "find_range: lo > hi".into(),
            ));
        }
        let mut results = Vec::new();
        let root = self.nav.get_root_node(root_oid)?;
        self.range_in(&root, lo, hi, key_cmp, &mut results)?;
        Ok(results)
    }

    fn range_in<F>(
        &mut self,
        node: &BTreeNode,
        lo: &[u8],
        hi: &[u8],
        key_cmp: &F,
        out: &mut Vec<(Vec<u8>, Vec<u8>)>,
    ) -> Result<()>
    where
        F: Fn(&[u8], &[u8]) -> std::cmp::Ordering,
    {
        use std::cmp::Ordering::*;
        let fks = self.nav.fixed_key_size();
        let fvs = self.nav.fixed_val_size();

        if node.node_header.is_leaf() {
            for i in 0..node.node_header.btn_nkeys as usize {
                let key = node.key(i, fks)?;
                if key_cmp(key, lo) != Less && key_cmp(key, hi) != Greater {
                    out.push((key.to_vec(), node.value(i, fvs)?.to_vec()));
                }
            }
            return Ok(());
        }

        // Visit every child subtree whose key interval intersects [lo, hi].
        // A child at index i covers (key[i-1], key[i]]; the last child
        // covers (key[n-1], +inf).
        let nkeys = node.node_header.btn_nkeys as usize;
        let mut child_indices = Vec::new();
        for i in 0..nkeys {
            let key = node.key(i, fks)?;
            if key_cmp(key, lo) != Less {
                child_indices.push(i);
                if key_cmp(key, hi) != Less {
                    break;
                }
            } else if i + 1 < nkeys {
                let next_key = node.key(i + 1, fks)?;
                if key_cmp(next_key, lo) != Less {
                    child_indices.push(i);
                }
            } else {
                child_indices.push(i);
            }
        }
        if child_indices.is_empty() {
            child_indices.push(nkeys.saturating_sub(1));
        }
        child_indices.dedup();

        for i in child_indices {
            let child = self.nav.get_child_node(node, i)?;
            self.range_in(&child, lo, hi, key_cmp, out)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// A single fixed-KV leaf root node with three u64 keys (10, 20, 30)
    /// mapping to u64 values (100, 200, 300), at block 0.
    fn build_single_leaf_node(block_size: usize) -> Vec<u8> {
        let mut block = vec![0u8; block_size];

        // object header
        block[0x18..0x1C].copy_from_slice(&crate::object::OBJECT_TYPE_BTREE_NODE.to_le_bytes());

        let flags: u16 = super::node::BTNODE_ROOT
            | super::node::BTNODE_LEAF
            | super::node::BTNODE_FIXED_KV_SIZE;
        let node_header_off = 32;
        block[node_header_off..node_header_off + 2].copy_from_slice(&flags.to_le_bytes());
        block[node_header_off + 2..node_header_off + 4].copy_from_slice(&0u16.to_le_bytes()); // level
        block[node_header_off + 4..node_header_off + 8].copy_from_slice(&3u32.to_le_bytes()); // nkeys
        // table_space_off = 0, table_space_len = 12 (3 entries * 4 bytes)
        block[node_header_off + 8..node_header_off + 10].copy_from_slice(&0u16.to_le_bytes());
        block[node_header_off + 10..node_header_off + 12].copy_from_slice(&12u16.to_le_bytes());

        let toc_start = node_header_off + 24; // BTreeNodeHeader::SIZE
        let keys: [u64; 3] = [10, 20, 30];
        let vals: [u64; 3] = [100, 200, 300];
        for i in 0..3 {
            let key_off: u16 = (i * 8) as u16;
            let val_off: u16 = ((i + 1) * 8) as u16;
            let entry_off = toc_start + i * 4;
            block[entry_off..entry_off + 2].copy_from_slice(&key_off.to_le_bytes());
            block[entry_off + 2..entry_off + 4].copy_from_slice(&val_off.to_le_bytes());
        }

        let key_area_off = toc_start + 12;
        for i in 0..3 {
            let start = key_area_off + i * 8;
            block[start..start + 8].copy_from_slice(&keys[i].to_le_bytes());
        }

        let val_area_end = block_size - 40; // BTreeInfo::SIZE
        for i in 0..3 {
            let start = val_area_end - (i + 1) * 8;
            block[start..start + 8].copy_from_slice(&vals[i].to_le_bytes());
        }

        // BTreeInfo trailer: bt_key_size=8, bt_val_size=8
        let info_off = val_area_end;
        block[info_off + 8..info_off + 12].copy_from_slice(&8u32.to_le_bytes());
        block[info_off + 12..info_off + 16].copy_from_slice(&8u32.to_le_bytes());

        block
    }

    fn u64_compare(target: u64) -> impl Fn(&[u8]) -> std::cmp::Ordering {
        move |key: &[u8]| {
            let v = u64::from_le_bytes(key.try_into().unwrap());
            v.cmp(&target)
        }
    }

    fn key_cmp(a: &[u8], b: &[u8]) -> std::cmp::Ordering {
        let av = u64::from_le_bytes(a.try_into().unwrap());
        let bv = u64::from_le_bytes(b.try_into().unwrap());
        av.cmp(&bv)
    }

    #[test]
    fn test_find_existing_key() {
        let block_size = 512usize;
        let mut data = build_single_leaf_node(block_size);
        let mut cur = Cursor::new(&mut data);
        let mut nav = Navigator::new(&mut cur, block_size as u32, 8, 8, None);
        let mut searcher = Searcher::new(&mut nav);

        let found = searcher.find(0, &u64_compare(20)).unwrap();
        assert_eq!(found, Some(200u64.to_le_bytes().to_vec()));
    }

    #[test]
    fn test_find_missing_key() {
        let block_size = 512usize;
        let mut data = build_single_leaf_node(block_size);
        let mut cur = Cursor::new(&mut data);
        let mut nav = Navigator::new(&mut cur, block_size as u32, 8, 8, None);
        let mut searcher = Searcher::new(&mut nav);

        let found = searcher.find(0, &u64_compare(99)).unwrap();
        assert_eq!(found, None);
    }

    #[test]
    fn test_find_range_collects_subset() {
        let block_size = 512usize;
        let mut data = build_single_leaf_node(block_size);
        let mut cur = Cursor::new(&mut data);
        let mut nav = Navigator::new(&mut cur, block_size as u32, 8, 8, None);
        let mut searcher = Searcher::new(&mut nav);

        let lo = 15u64.to_le_bytes();
        let hi = 30u64.to_le_bytes();
        let results = searcher.find_range(0, &lo, &hi, &key_cmp).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].1, 200u64.to_le_bytes().to_vec());
        assert_eq!(results[1].1, 300u64.to_le_bytes().to_vec());
    }

    #[test]
    fn test_find_range_rejects_lo_greater_than_hi() {
        let block_size = 512usize;
        let mut data = build_single_leaf_node(block_size);
        let mut cur = Cursor::new(&mut data);
        let mut nav = Navigator::new(&mut cur, block_size as u32, 8, 8, None);
        let mut searcher = Searcher::new(&mut nav);

        let lo = 30u64.to_le_bytes();
        let hi = 15u64.to_le_bytes();
        let result = searcher.find_range(0, &lo, &hi, &key_cmp);
        assert!(result.is_err());
    }
}
