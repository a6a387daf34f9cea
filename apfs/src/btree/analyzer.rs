use std::io::{Read, Seek};

use crate::error::{ApfsError, Result};
use crate::object::ObjectHeader;

use super::navigator::Navigator;
use super::node::BTreeNode;
use super::traverser::{Order, Traverser, VisitResult};

const NODE_HEADER_OVERHEAD: usize = ObjectHeader::SIZE + super::node::BTreeNodeHeader::SIZE;

#[derive(Debug, Clone, Default)]
pub struct NodeDistribution {
    pub per_level_count: std::collections::BTreeMap<u32, usize>,
    pub per_level_avg_keys: std::collections::BTreeMap<u32, f64>,
    pub per_level_min_keys: std::collections::BTreeMap<u32, u32>,
    pub per_level_max_keys: std::collections::BTreeMap<u32, u32>,
}

#[derive(Debug, Clone)]
pub struct FillFactorReport {
    pub used_bytes: u64,
    pub capacity_bytes: u64,
    pub fill_percent: f64,
}

#[derive(Debug, Clone)]
pub struct StructureReport {
    pub height: u32,
    pub node_count: usize,
    pub leaf_count: usize,
    pub balanced: bool,
}

#[derive(Debug, Clone, Default)]
pub struct StorageEfficiencyReport {
    pub theoretical_data_bytes: u64,
    pub actual_data_bytes: u64,
    pub wasted_bytes: i64,
}

/// Structural statistics over a tree reached through a [`Navigator`].
pub struct Analyzer<'a, 'b, R> {
    nav: &'a mut Navigator<'b, R>,
}

impl<'a, 'b, R: Read + Seek> Analyzer<'a, 'b, R> {
    pub fn new(nav: &'a mut Navigator<'b, R>) -> Self {
        Analyzer { nav }
    }

    pub fn calculate_height(&mut self, root_oid: u64) -> Result<u32> {
        let root = self.nav.get_root_node(root_oid)?;
        Ok(root.node_header.btn_level as u32 + 1)
    }

    pub fn node_distribution(&mut self, root_oid: u64) -> Result<NodeDistribution> {
        let mut per_level_keys: std::collections::BTreeMap<u32, Vec<u32>> = Default::default();
        {
            let mut traverser = Traverser::new(self.nav);
            traverser.walk(root_oid, Order::Level, &mut |node| {
                per_level_keys
                    .entry(node.node_header.btn_level as u32)
                    .or_default()
                    .push(node.node_header.btn_nkeys);
                VisitResult::cont()
            })?;
        }

        let mut dist = NodeDistribution::default();
        for (level, keys) in per_level_keys {
            let count = keys.len();
            let sum: u64 = keys.iter().map(|&k| k as u64).sum();
            let avg = sum as f64 / count as f64;
            let min = *keys.iter().min().unwrap_or(&0);
            let max = *keys.iter().max().unwrap_or(&0);
            dist.per_level_count.insert(level, count);
            dist.per_level_avg_keys.insert(level, avg);
            dist.per_level_min_keys.insert(level, min);
            dist.per_level_max_keys.insert(level, max);
        }
        Ok(dist)
    }

    pub fn calculate_fill_factor(&mut self, root_oid: u64, node_size: u64) -> Result<FillFactorReport> {
        if node_size == 0 {
            return Err(ApfsError::InvalidInput("node_size must be non-zero".into()));
        }
        let mut used_bytes: u64 = 0;
        let mut node_count: u64 = 0;
        {
            let mut traverser = Traverser::new(self.nav);
            traverser.walk(root_oid, Order::Pre, &mut |node: &BTreeNode| {
                let data_len = node.val_area_end.saturating_sub(node.key_area_off);
                used_bytes += (data_len + NODE_HEADER_OVERHEAD) as u64;
                node_count += 1;
                VisitResult::cont()
            })?;
        }

        let capacity_bytes = node_count * node_size;
        let fill_percent = if capacity_bytes > 0 {
            used_bytes as f64 / capacity_bytes as f64 * 100.0
        } else {
            0.0
        };

        Ok(FillFactorReport {
            used_bytes,
            capacity_bytes,
            fill_percent,
        })
    }

    pub fn analyze_structure(&mut self, root_oid: u64) -> Result<StructureReport> {
        let height = self.calculate_height(root_oid)?;
        let (node_count, leaf_count, balanced) = {
            let mut traverser = Traverser::new(self.nav);
            let node_count = traverser.node_count(root_oid)?;
            let leaf_count = traverser.leaf_count(root_oid)?;

            let mut leaf_levels = std::collections::HashSet::new();
            traverser.leaves_only(root_oid, &mut |node| {
                leaf_levels.insert(node.node_header.btn_level);
                VisitResult::cont()
            })?;
            let balanced = leaf_levels.len() <= 1;
            (node_count, leaf_count, balanced)
        };

        Ok(StructureReport {
            height,
            node_count,
            leaf_count,
            balanced,
        })
    }

    pub fn analyze_key_distribution(&mut self, root_oid: u64) -> Result<std::collections::BTreeMap<u32, u32>> {
        let mut counts = std::collections::BTreeMap::new();
        let mut traverser = Traverser::new(self.nav);
        traverser.walk(root_oid, Order::Pre, &mut |node| {
            counts.insert(node.header.oid as u32, node.node_header.btn_nkeys);
            VisitResult::cont()
        })?;
        Ok(counts)
    }

    /// For fixed-KV trees, compute theoretical vs actual data-area
    /// occupancy and report the difference as waste.
    pub fn analyze_storage_efficiency(
        &mut self,
        root_oid: u64,
        fixed_key_size: u32,
        fixed_val_size: u32,
    ) -> Result<StorageEfficiencyReport> {
        let mut report = StorageEfficiencyReport::default();
        let mut traverser = Traverser::new(self.nav);
        let per_entry = (fixed_key_size + fixed_val_size) as u64;
        traverser.walk(root_oid, Order::Pre, &mut |node| {
            if node.node_header.is_fixed_kv() {
                report.theoretical_data_bytes += node.node_header.btn_nkeys as u64 * per_entry;
            }
            let actual = node.val_area_end.saturating_sub(node.key_area_off) as u64;
            report.actual_data_bytes += actual;
            VisitResult::cont()
        })?;
        report.wasted_bytes = report.actual_data_bytes as i64 - report.theoretical_data_bytes as i64;
        Ok(report)
    }
}
