//! Octree data structures - Pure DOP
//!
//! NO METHODS. Just data.
//! Nodes live in one flat arena addressed by index; the 8 children of an
//! interior node are contiguous. Leaves own a range of `item_indices`.

use crate::math::Aabb;
use crate::scene::RenderItemId;

/// Marks a node without children
pub const NO_CHILDREN: u32 = u32::MAX;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OctreeNode {
    pub bounds: Aabb,
    /// Index of the first of 8 contiguous children, or `NO_CHILDREN`
    pub first_child: u32,
    /// Leaf only: range into `OctreeData::item_indices`
    pub item_start: u32,
    pub item_count: u32,
    pub depth: u32,
}

#[derive(Debug, Clone)]
pub struct OctreeData {
    pub nodes: Vec<OctreeNode>,
    /// Item references of every leaf, leaf by leaf. An item straddling a
    /// cell boundary appears once per leaf it touches
    pub item_indices: Vec<RenderItemId>,

    pub max_depth: u32,
    pub leaf_threshold: usize,

    /// Scene spatial generation the tree was built from; `None` before the
    /// first build
    pub built_generation: Option<u64>,
    /// Number of distinct items indexed
    pub indexed_items: usize,
    pub rebuild_count: u64,
}

/// Per-query traversal counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OctreeQueryStats {
    pub nodes_visited: u32,
    /// Subtrees skipped because their box lies outside the frustum
    pub nodes_pruned: u32,
    /// Subtrees accepted without per-item tests
    pub nodes_inside: u32,
    pub items_tested: u32,
    /// Leaf references skipped because the item was already returned
    pub duplicates_skipped: u32,
}
