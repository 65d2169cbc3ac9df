//! Visibility data structures - Pure DOP
//!
//! The draw list is the only thing the render graph reads from visibility:
//! which items, which mesh and draw range for each, split by pipeline.

use bit_vec::BitVec;

use crate::scene::{DrawArgs, GeometryId, LodLevel, MaterialId, MeshId, RenderItemId};

/// One visible item resolved to the geometry it draws this frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrawItem {
    pub item: RenderItemId,
    pub mesh: MeshId,
    pub geometry: GeometryId,
    pub args: DrawArgs,
    pub material: MaterialId,
    /// Level actually drawn, after falling back to base
    pub lod: LodLevel,
    /// Bounds center to eye
    pub distance: f32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VisibilityStats {
    pub considered: u32,
    pub visible: u32,
    /// Rejected by the frustum
    pub culled: u32,
    /// Skipped by the item's own visibility flag
    pub hidden: u32,
    /// Indexed by `lod_index`: low, base, high
    pub lod_histogram: [u32; 3],
    pub nodes_visited: u32,
    pub nodes_pruned: u32,
    pub used_octree: bool,
}

#[derive(Debug, Clone, Default)]
pub struct DrawList {
    pub opaque: Vec<DrawItem>,
    /// Displacement-mapped or patch items, drawn with the tessellated pipeline
    pub tessellated: Vec<DrawItem>,
    /// Bit per render item, set when it made the list
    pub visible_mask: BitVec,
    pub stats: VisibilityStats,
}
