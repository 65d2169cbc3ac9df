/// Visibility Module - frustum culling, LOD selection and the draw list
pub mod visibility_data;
pub mod visibility_operations;

pub use visibility_data::{DrawItem, DrawList, VisibilityStats};
pub use visibility_operations::{
    apply_lod_selection, build_draw_list_linear, build_draw_list_octree, build_draw_list_unculled, draw_count,
    is_item_visible, lod_index, resolve_draw_list, resolve_lod_mesh, select_lod_level,
};
