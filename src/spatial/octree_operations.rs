//! Octree Operations - Pure DOP Functions
//!
//! Build from the scene's world-space item bounds, query against a
//! world-space frustum. The tree is rebuilt from scratch when the scene's
//! spatial generation moves, never updated in place.

use bit_vec::BitVec;

use super::octree_data::{OctreeData, OctreeNode, OctreeQueryStats, NO_CHILDREN};
use crate::config::EngineConfig;
use crate::constants::spatial::{OCTANT_COUNT, OCTREE_LEAF_THRESHOLD, OCTREE_MAX_DEPTH};
use crate::math::{aabb_intersects, aabb_octants, aabb_union, classify_aabb, Aabb, Containment, Frustum};
use crate::scene::{RenderItemId, SceneData};

pub fn create_octree(max_depth: u32, leaf_threshold: usize) -> OctreeData {
    OctreeData {
        nodes: Vec::new(),
        item_indices: Vec::new(),
        max_depth,
        leaf_threshold,
        built_generation: None,
        indexed_items: 0,
        rebuild_count: 0,
    }
}

pub fn create_octree_from_config(config: &EngineConfig) -> OctreeData {
    create_octree(config.octree_max_depth, config.octree_leaf_threshold)
}

impl Default for OctreeData {
    fn default() -> Self {
        create_octree(OCTREE_MAX_DEPTH, OCTREE_LEAF_THRESHOLD)
    }
}

pub fn is_leaf(node: &OctreeNode) -> bool {
    node.first_child == NO_CHILDREN
}

pub fn root_bounds(octree: &OctreeData) -> Option<Aabb> {
    octree.nodes.first().map(|node| node.bounds)
}

pub fn needs_rebuild(octree: &OctreeData, scene: &SceneData) -> bool {
    octree.built_generation != Some(scene.spatial_generation)
}

// ============================================================================
// BUILD
// ============================================================================

/// Rebuild from `(id, world bounds)` pairs.
///
/// The root is the union of all bounds, first entry seeding the box. Nodes
/// with fewer than `leaf_threshold` items, or at `max_depth`, keep their
/// items; others split at the center into 8 octants and hand every item to
/// each octant its bounds intersect.
pub fn build_octree(octree: &mut OctreeData, items: &[(RenderItemId, Aabb)]) {
    octree.nodes.clear();
    octree.item_indices.clear();
    octree.indexed_items = items.len();
    octree.rebuild_count += 1;

    let Some(((_, first), rest)) = items.split_first() else {
        return;
    };
    let bounds = rest.iter().fold(*first, |acc, (_, b)| aabb_union(&acc, b));

    octree.nodes.push(OctreeNode {
        bounds,
        first_child: NO_CHILDREN,
        item_start: 0,
        item_count: 0,
        depth: 0,
    });
    let all: Vec<u32> = (0..items.len() as u32).collect();
    build_node(octree, items, 0, all);
}

fn build_node(octree: &mut OctreeData, items: &[(RenderItemId, Aabb)], node_index: usize, members: Vec<u32>) {
    let node = octree.nodes[node_index];

    if members.len() < octree.leaf_threshold || node.depth >= octree.max_depth {
        let leaf = &mut octree.nodes[node_index];
        leaf.item_start = octree.item_indices.len() as u32;
        leaf.item_count = members.len() as u32;
        octree
            .item_indices
            .extend(members.iter().map(|&member| items[member as usize].0));
        return;
    }

    let first_child = octree.nodes.len();
    octree.nodes[node_index].first_child = first_child as u32;
    let octants = aabb_octants(&node.bounds);
    for bounds in octants {
        octree.nodes.push(OctreeNode {
            bounds,
            first_child: NO_CHILDREN,
            item_start: 0,
            item_count: 0,
            depth: node.depth + 1,
        });
    }

    for (offset, bounds) in octants.iter().enumerate() {
        let child_members: Vec<u32> = members
            .iter()
            .copied()
            .filter(|&member| aabb_intersects(bounds, &items[member as usize].1))
            .collect();
        build_node(octree, items, first_child + offset, child_members);
    }
}

/// Rebuild from the scene if its spatial generation moved.
/// Returns true when a rebuild happened.
pub fn ensure_octree(octree: &mut OctreeData, scene: &SceneData) -> bool {
    if !needs_rebuild(octree, scene) {
        return false;
    }

    let items: Vec<(RenderItemId, Aabb)> = scene
        .items
        .iter()
        .enumerate()
        .map(|(index, item)| (RenderItemId(index as u32), item.world_bounds))
        .collect();
    build_octree(octree, &items);
    octree.built_generation = Some(scene.spatial_generation);

    log::info!(
        "[Octree::ensure] Rebuilt for {} items: {} nodes, {} leaf references (rebuild #{})",
        items.len(),
        octree.nodes.len(),
        octree.item_indices.len(),
        octree.rebuild_count
    );
    true
}

// ============================================================================
// QUERY
// ============================================================================

fn leaf_items<'a>(octree: &'a OctreeData, node: &OctreeNode) -> &'a [RenderItemId] {
    let start = node.item_start as usize;
    &octree.item_indices[start..start + node.item_count as usize]
}

/// Depth-first frustum query.
///
/// `accept` is called at most once per item, in traversal order. Subtrees
/// outside the frustum are skipped; subtrees fully inside accept their
/// items without testing them. In intersecting leaves `item_visible`
/// decides each item.
pub fn query_octree<V, F>(octree: &OctreeData, frustum: &Frustum, item_visible: V, mut accept: F) -> OctreeQueryStats
where
    V: Fn(RenderItemId) -> bool,
    F: FnMut(RenderItemId),
{
    let mut stats = OctreeQueryStats::default();
    if octree.nodes.is_empty() {
        return stats;
    }

    let mut returned = BitVec::from_elem(octree.indexed_items, false);
    // (node, whole subtree already known to be inside)
    let mut stack: Vec<(u32, bool)> = vec![(0, false)];

    while let Some((index, known_inside)) = stack.pop() {
        let node = &octree.nodes[index as usize];
        stats.nodes_visited += 1;

        let inside = known_inside || {
            match classify_aabb(frustum, &node.bounds) {
                Containment::Outside => {
                    stats.nodes_pruned += 1;
                    continue;
                }
                Containment::Inside => {
                    stats.nodes_inside += 1;
                    true
                }
                Containment::Intersecting => false,
            }
        };

        if !is_leaf(node) {
            // Reverse so octant 0 is visited first
            for child in (0..OCTANT_COUNT as u32).rev() {
                stack.push((node.first_child + child, inside));
            }
            continue;
        }

        for &id in leaf_items(octree, node) {
            let slot = id.0 as usize;
            if returned.get(slot).unwrap_or(true) {
                stats.duplicates_skipped += 1;
                continue;
            }
            if !inside {
                stats.items_tested += 1;
                if !item_visible(id) {
                    continue;
                }
            }
            returned.set(slot, true);
            accept(id);
        }
    }

    stats
}

/// Leaves whose item range references `id`
pub fn leaves_containing(octree: &OctreeData, id: RenderItemId) -> Vec<u32> {
    octree
        .nodes
        .iter()
        .enumerate()
        .filter(|(_, node)| is_leaf(node) && leaf_items(octree, node).contains(&id))
        .map(|(index, _)| index as u32)
        .collect()
}

/// Leaves whose box intersects `bounds`
pub fn leaves_intersecting(octree: &OctreeData, bounds: &Aabb) -> Vec<u32> {
    octree
        .nodes
        .iter()
        .enumerate()
        .filter(|(_, node)| is_leaf(node) && aabb_intersects(&node.bounds, bounds))
        .map(|(index, _)| index as u32)
        .collect()
}

pub fn leaf_count(octree: &OctreeData) -> usize {
    octree.nodes.iter().filter(|node| is_leaf(node)).count()
}

pub fn tree_depth(octree: &OctreeData) -> u32 {
    octree.nodes.iter().map(|node| node.depth).max().unwrap_or(0)
}
