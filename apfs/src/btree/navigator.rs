use std::collections::HashMap;
use std::io::{Read, Seek};
use std::rc::Rc;

use crate::error::{ApfsError, Result};
use crate::object;

use super::node::{self, BTreeNode};

/// Reads and caches B-tree nodes by physical block/OID, resolving child
/// pointers through the container or volume OMAP when the tree is
/// virtual. Cache entries are never silently evicted; callers that want
/// a fresh view after a write-generation bump call [`Navigator::clear_cache`].
pub struct Navigator<'a, R> {
    reader: &'a mut R,
    block_size: u32,
    fixed_key_size: u32,
    fixed_val_size: u32,
    omap_root: Option<u64>,
    cache: HashMap<u64, Rc<BTreeNode>>,
}

impl<'a, R: Read + Seek> Navigator<'a, R> {
    pub fn new(
        reader: &'a mut R,
        block_size: u32,
        fixed_key_size: u32,
        fixed_val_size: u32,
        omap_root: Option<u64>,
    ) -> Self {
        Navigator {
            reader,
            block_size,
            fixed_key_size,
            fixed_val_size,
            omap_root,
            cache: HashMap::new(),
        }
    }

    pub fn fixed_key_size(&self) -> u32 {
        self.fixed_key_size
    }

    pub fn fixed_val_size(&self) -> u32 {
        self.fixed_val_size
    }

    /// Read (or return cached) the node at a given oid/paddr, resolving
    /// it to the BTreeInfo-declared sizes where present.
    pub fn get_node_by_oid(&mut self, oid: u64) -> Result<Rc<BTreeNode>> {
        if let Some(node) = self.cache.get(&oid) {
            return Ok(Rc::clone(node));
        }

        let paddr = node::resolve_child_oid(self.reader, oid, self.block_size, self.omap_root)?;
        let block_data = object::read_block(self.reader, paddr, self.block_size)?;
        let parsed = BTreeNode::parse(&block_data)?;

        if let Some(ref info) = parsed.info {
            if info.bt_fixed.bt_key_size > 0 {
                self.fixed_key_size = info.bt_fixed.bt_key_size;
            }
            if info.bt_fixed.bt_val_size > 0 {
                self.fixed_val_size = info.bt_fixed.bt_val_size;
            }
        }

        let rc = Rc::new(parsed);
        self.cache.insert(oid, Rc::clone(&rc));
        Ok(rc)
    }

    /// Read the tree's root node. `root_oid` is a physical block number
    /// when the tree has no OMAP (OMAP itself, space manager trees);
    /// otherwise it is a virtual OID resolved through `omap_root`.
    pub fn get_root_node(&mut self, root_oid: u64) -> Result<Rc<BTreeNode>> {
        self.get_node_by_oid(root_oid)
    }

    /// Fetch a non-leaf node's i-th child. Fails on leaves and on an
    /// out-of-range index.
    pub fn get_child_node(&mut self, parent: &BTreeNode, i: usize) -> Result<Rc<BTreeNode>> {
        if parent.node_header.is_leaf() {
            return Err(ApfsError::InvalidBTree("cannot get child of a leaf node".into()));
        }
        if i >= parent.node_header.btn_nkeys as usize {
            return Err(ApfsError::OutOfRange(format!(
                "child index {} out of range [0, {})",
                i, parent.node_header.btn_nkeys
            )));
        }
        let child_oid = parent.child_oid(i)?;
        self.get_node_by_oid(child_oid)
    }

    pub fn get_height(&mut self, root_oid: u64) -> Result<u32> {
        let root = self.get_root_node(root_oid)?;
        Ok(root.node_header.btn_level as u32 + 1)
    }

    pub fn clear_cache(&mut self) {
        self.cache.clear();
    }

    pub fn cache_size(&self) -> usize {
        self.cache.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_cache_size_starts_empty() {
        let mut data = vec![0u8; 16];
        let mut cur = Cursor::new(&mut data);
        let nav = Navigator::new(&mut cur, 4096, 16, 16, None);
        assert_eq!(nav.cache_size(), 0);
    }
}
