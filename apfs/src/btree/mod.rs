//! B-tree engine: node parsing, a cached navigator, point/range search,
//! multi-order traversal, and structural analysis.

pub mod node;
pub mod navigator;
pub mod searcher;
pub mod traverser;
pub mod analyzer;

pub use node::{
    btree_lookup, btree_scan, BTreeInfo, BTreeInfoFixed, BTreeNode, BTreeNodeHeader, TocEntry,
    BTNODE_FIXED_KV_SIZE, BTNODE_LEAF, BTNODE_ROOT, BTREE_PHYSICAL,
};
pub use navigator::Navigator;
pub use searcher::Searcher;
pub use traverser::{Traverser, VisitResult};
pub use analyzer::{Analyzer, FillFactorReport, NodeDistribution, StorageEfficiencyReport, StructureReport};
