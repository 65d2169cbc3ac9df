/// Spatial Module - flat-arena octree over render item bounds
pub mod octree_data;
pub mod octree_operations;

pub use octree_data::{OctreeData, OctreeNode, OctreeQueryStats, NO_CHILDREN};
pub use octree_operations::{
    build_octree, create_octree, create_octree_from_config, ensure_octree, is_leaf, leaf_count, leaves_containing,
    leaves_intersecting, needs_rebuild, query_octree, root_bounds, tree_depth,
};
