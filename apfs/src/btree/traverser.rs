use std::collections::VecDeque;
use std::io::{Read, Seek};

use crate::error::Result;

use super::navigator::Navigator;
use super::node::BTreeNode;

/// Outcome of visiting one node: whether to descend into its children,
/// and an error that aborts the whole traversal if present.
pub struct VisitResult {
    pub keep_going: bool,
    pub error: Option<crate::error::ApfsError>,
}

impl VisitResult {
    pub fn cont() -> Self {
        VisitResult { keep_going: true, error: None }
    }
    pub fn halt() -> Self {
        VisitResult { keep_going: false, error: None }
    }
    pub fn err(e: crate::error::ApfsError) -> Self {
        VisitResult { keep_going: false, error: Some(e) }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    Pre,
    In,
    Post,
    Level,
}

/// Drives pre/in/post/level-order walks of a tree reached through a
/// [`Navigator`], calling a visitor on every node. `keep_going=false`
/// stops descent into that node's children without aborting siblings
/// already queued.
pub struct Traverser<'a, 'b, R> {
    nav: &'a mut Navigator<'b, R>,
}

impl<'a, 'b, R: Read + Seek> Traverser<'a, 'b, R> {
    pub fn new(nav: &'a mut Navigator<'b, R>) -> Self {
        Traverser { nav }
    }

    pub fn walk<V>(&mut self, root_oid: u64, order: Order, visit: &mut V) -> Result<()>
    where
        V: FnMut(&BTreeNode) -> VisitResult,
    {
        match order {
            Order::Pre => self.walk_pre(root_oid, visit),
            Order::In => self.walk_in(root_oid, visit),
            Order::Post => self.walk_post(root_oid, visit),
            Order::Level => self.walk_level(root_oid, visit),
        }
    }

    fn walk_pre<V>(&mut self, oid: u64, visit: &mut V) -> Result<()>
    where
        V: FnMut(&BTreeNode) -> VisitResult,
    {
        let node = self.nav.get_root_node(oid)?;
        let result = visit(&node);
        if let Some(e) = result.error {
            return Err(e);
        }
        if !result.keep_going || node.node_header.is_leaf() {
            return Ok(());
        }
        for i in 0..node.node_header.btn_nkeys as usize {
            let child_oid = node.child_oid(i)?;
            self.walk_pre(child_oid, visit)?;
        }
        Ok(())
    }

    fn walk_in<V>(&mut self, oid: u64, visit: &mut V) -> Result<()>
    where
        V: FnMut(&BTreeNode) -> VisitResult,
    {
        let node = self.nav.get_root_node(oid)?;
        if node.node_header.is_leaf() {
            let result = visit(&node);
            return result.error.map_or(Ok(()), Err);
        }
        let nkeys = node.node_header.btn_nkeys as usize;
        // Visit first half of children, then this node, then the rest —
        // approximating in-order for an (n keys, n children) internal layout.
        let mid = nkeys / 2;
        for i in 0..mid {
            let child_oid = node.child_oid(i)?;
            self.walk_in(child_oid, visit)?;
        }
        let result = visit(&node);
        if let Some(e) = result.error {
            return Err(e);
        }
        if result.keep_going {
            for i in mid..nkeys {
                let child_oid = node.child_oid(i)?;
                self.walk_in(child_oid, visit)?;
            }
        }
        Ok(())
    }

    fn walk_post<V>(&mut self, oid: u64, visit: &mut V) -> Result<()>
    where
        V: FnMut(&BTreeNode) -> VisitResult,
    {
        let node = self.nav.get_root_node(oid)?;
        if !node.node_header.is_leaf() {
            for i in 0..node.node_header.btn_nkeys as usize {
                let child_oid = node.child_oid(i)?;
                self.walk_post(child_oid, visit)?;
            }
        }
        let result = visit(&node);
        result.error.map_or(Ok(()), Err)
    }

    fn walk_level<V>(&mut self, root_oid: u64, visit: &mut V) -> Result<()>
    where
        V: FnMut(&BTreeNode) -> VisitResult,
    {
        let mut queue: VecDeque<u64> = VecDeque::new();
        queue.push_back(root_oid);
        while let Some(oid) = queue.pop_front() {
            let node = self.nav.get_root_node(oid)?;
            let result = visit(&node);
            if let Some(e) = result.error {
                return Err(e);
            }
            if result.keep_going && !node.node_header.is_leaf() {
                for i in 0..node.node_header.btn_nkeys as usize {
                    queue.push_back(node.child_oid(i)?);
                }
            }
        }
        Ok(())
    }

    pub fn leaves_only<V>(&mut self, root_oid: u64, visit: &mut V) -> Result<()>
    where
        V: FnMut(&BTreeNode) -> VisitResult,
    {
        self.walk(root_oid, Order::Pre, &mut |node| {
            if node.node_header.is_leaf() {
                visit(node)
            } else {
                VisitResult::cont()
            }
        })
    }

    pub fn node_count(&mut self, root_oid: u64) -> Result<usize> {
        let mut count = 0usize;
        self.walk(root_oid, Order::Pre, &mut |_| {
            count += 1;
            VisitResult::cont()
        })?;
        Ok(count)
    }

    pub fn leaf_count(&mut self, root_oid: u64) -> Result<usize> {
        let mut count = 0usize;
        self.leaves_only(root_oid, &mut |_| {
            count += 1;
            VisitResult::cont()
        })?;
        Ok(count)
    }

    pub fn max_depth(&mut self, root_oid: u64) -> Result<u32> {
        let root = self.nav.get_root_node(root_oid)?;
        Ok(root.node_header.btn_level as u32 + 1)
    }

    /// Group every visited node by its tree level.
    pub fn by_level(&mut self, root_oid: u64) -> Result<std::collections::BTreeMap<u32, usize>> {
        let mut counts = std::collections::BTreeMap::new();
        self.walk(root_oid, Order::Level, &mut |node| {
            *counts.entry(node.node_header.btn_level as u32).or_insert(0) += 1;
            VisitResult::cont()
        })?;
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// A single fixed-KV leaf root node with three u64 keys, at block 0.
    fn build_single_leaf_node(block_size: usize) -> Vec<u8> {
        let mut block = vec![0u8; block_size];
        block[0x18..0x1C].copy_from_slice(&crate::object::OBJECT_TYPE_BTREE_NODE.to_le_bytes());

        let flags: u16 = super::node::BTNODE_ROOT
            | super::node::BTNODE_LEAF
            | super::node::BTNODE_FIXED_KV_SIZE;
        let node_header_off = 32;
        block[node_header_off..node_header_off + 2].copy_from_slice(&flags.to_le_bytes());
        block[node_header_off + 2..node_header_off + 4].copy_from_slice(&0u16.to_le_bytes());
        block[node_header_off + 4..node_header_off + 8].copy_from_slice(&3u32.to_le_bytes());
        block[node_header_off + 8..node_header_off + 10].copy_from_slice(&0u16.to_le_bytes());
        block[node_header_off + 10..node_header_off + 12].copy_from_slice(&12u16.to_le_bytes());

        let toc_start = node_header_off + 24;
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

        let val_area_end = block_size - 40;
        for i in 0..3 {
            let start = val_area_end - (i + 1) * 8;
            block[start..start + 8].copy_from_slice(&vals[i].to_le_bytes());
        }

        let info_off = val_area_end;
        block[info_off + 8..info_off + 12].copy_from_slice(&8u32.to_le_bytes());
        block[info_off + 12..info_off + 16].copy_from_slice(&8u32.to_le_bytes());

        block
    }

    #[test]
    fn test_node_count_single_leaf() {
        let block_size = 512usize;
        let mut data = build_single_leaf_node(block_size);
        let mut cur = Cursor::new(&mut data);
        let mut nav = Navigator::new(&mut cur, block_size as u32, 8, 8, None);
        let mut traverser = Traverser::new(&mut nav);
        assert_eq!(traverser.node_count(0).unwrap(), 1);
    }

    #[test]
    fn test_leaf_count_single_leaf() {
        let block_size = 512usize;
        let mut data = build_single_leaf_node(block_size);
        let mut cur = Cursor::new(&mut data);
        let mut nav = Navigator::new(&mut cur, block_size as u32, 8, 8, None);
        let mut traverser = Traverser::new(&mut nav);
        assert_eq!(traverser.leaf_count(0).unwrap(), 1);
    }

    #[test]
    fn test_by_level_reports_single_level() {
        let block_size = 512usize;
        let mut data = build_single_leaf_node(block_size);
        let mut cur = Cursor::new(&mut data);
        let mut nav = Navigator::new(&mut cur, block_size as u32, 8, 8, None);
        let mut traverser = Traverser::new(&mut nav);
        let levels = traverser.by_level(0).unwrap();
        assert_eq!(levels.get(&0), Some(&1usize));
    }

    #[test]
    fn test_walk_halts_without_error() {
        let block_size = 512usize;
        let mut data = build_single_leaf_node(block_size);
        let mut cur = Cursor::new(&mut data);
        let mut nav = Navigator::new(&mut cur, block_size as u32, 8, 8, None);
        let mut traverser = Traverser::new(&mut nav);
        let mut visited = 0;
        traverser
            .walk(0, Order::Pre, &mut |_| {
                visited += 1;
                VisitResult::halt()
            })
            .unwrap();
        assert_eq!(visited, 1);
    }
}
