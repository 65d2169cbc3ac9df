//! Visibility & LOD Operations - Pure DOP Functions
//!
//! Turns the scene plus camera into this frame's draw list. Two paths:
//! the octree query and a flat scan over every item. Both resolve each
//! accepted item the same way, so they differ only in which items they
//! accept.

use bit_vec::BitVec;

use super::visibility_data::{DrawItem, DrawList, VisibilityStats};
use crate::camera::{camera_frustum, CameraData};
use crate::constants::lod::HIGH_DETAIL_FRACTION;
use crate::math::{aabb_center, frustum_intersects_aabb, Frustum};
use crate::render_graph::RenderSettings;
use crate::scene::{is_tessellated, LodLevel, LodMeshSet, MeshId, RenderItem, RenderItemId, SceneData};
use crate::spatial::{query_octree, OctreeData};

// ============================================================================
// LOD
// ============================================================================

/// Detail level for an item `distance` away with switch distance `threshold`.
///
/// Farther than the threshold is low detail, nearer than half of it is high
/// detail. Both boundaries themselves select base.
pub fn select_lod_level(distance: f32, threshold: f32) -> LodLevel {
    if distance > threshold {
        LodLevel::Low
    } else if distance < threshold * HIGH_DETAIL_FRACTION {
        LodLevel::High
    } else {
        LodLevel::Base
    }
}

/// Mesh for `level`, falling back to base when the variant is absent
pub fn resolve_lod_mesh(meshes: &LodMeshSet, level: LodLevel) -> (MeshId, LodLevel) {
    let variant = match level {
        LodLevel::Low => meshes.low,
        LodLevel::High => meshes.high,
        LodLevel::Base => None,
    };
    match variant {
        Some(mesh) => (mesh, level),
        None => (meshes.base, LodLevel::Base),
    }
}

pub fn lod_index(level: LodLevel) -> usize {
    match level {
        LodLevel::Low => 0,
        LodLevel::Base => 1,
        LodLevel::High => 2,
    }
}

/// Resolve an accepted item to the mesh and draw range it uses this frame
fn resolve_draw_item(
    scene: &SceneData,
    id: RenderItemId,
    record: &RenderItem,
    eye: glam::Vec3,
    lod_threshold: f32,
) -> Option<DrawItem> {
    let distance = aabb_center(&record.world_bounds).distance(eye);
    let level = if record.lod_enabled {
        select_lod_level(distance, record.lod_threshold.unwrap_or(lod_threshold))
    } else {
        LodLevel::Base
    };
    let (mesh, lod) = resolve_lod_mesh(&record.meshes, level);

    let Some(mesh_record) = scene.meshes.get(mesh.0 as usize) else {
        log::error!("[Visibility::resolve] Item {} references missing mesh {}", id.0, mesh.0);
        return None;
    };

    Some(DrawItem {
        item: id,
        mesh,
        geometry: mesh_record.geometry,
        args: mesh_record.args,
        material: record.material,
        lod,
        distance,
    })
}

fn push_draw_item(list: &mut DrawList, scene: &SceneData, draw: DrawItem) {
    list.stats.visible += 1;
    list.stats.lod_histogram[lod_index(draw.lod)] += 1;
    list.visible_mask.set(draw.item.0 as usize, true);

    let tessellated = scene
        .items
        .get(draw.item.0 as usize)
        .map(|record| is_tessellated(scene, record))
        .unwrap_or(false);
    if tessellated {
        list.tessellated.push(draw);
    } else {
        list.opaque.push(draw);
    }
}

fn empty_draw_list(scene: &SceneData) -> DrawList {
    DrawList {
        opaque: Vec::new(),
        tessellated: Vec::new(),
        visible_mask: BitVec::from_elem(scene.items.len(), false),
        stats: VisibilityStats {
            considered: scene.items.len() as u32,
            ..Default::default()
        },
    }
}

// ============================================================================
// DRAW LIST
// ============================================================================

fn scan_items(scene: &SceneData, camera: &CameraData, lod_threshold: f32, frustum: Option<&Frustum>) -> DrawList {
    let mut list = empty_draw_list(scene);

    for (index, record) in scene.items.iter().enumerate() {
        if !record.visible {
            list.stats.hidden += 1;
            continue;
        }
        if let Some(frustum) = frustum {
            if !frustum_intersects_aabb(frustum, &record.world_bounds) {
                list.stats.culled += 1;
                continue;
            }
        }
        let id = RenderItemId(index as u32);
        if let Some(draw) = resolve_draw_item(scene, id, record, camera.position, lod_threshold) {
            push_draw_item(&mut list, scene, draw);
        }
    }

    list
}

/// Flat scan testing every item against the frustum.
///
/// The reference the octree query must agree with.
pub fn build_draw_list_linear(scene: &SceneData, camera: &CameraData, lod_threshold: f32) -> DrawList {
    let frustum = camera_frustum(camera);
    scan_items(scene, camera, lod_threshold, Some(&frustum))
}

/// Every item whose own flag is set, with no frustum test
pub fn build_draw_list_unculled(scene: &SceneData, camera: &CameraData, lod_threshold: f32) -> DrawList {
    scan_items(scene, camera, lod_threshold, None)
}

/// Query the octree. The tree must be current for `scene`
pub fn build_draw_list_octree(
    octree: &OctreeData,
    scene: &SceneData,
    camera: &CameraData,
    lod_threshold: f32,
) -> DrawList {
    let frustum = camera_frustum(camera);
    let mut list = empty_draw_list(scene);
    list.stats.used_octree = true;

    let mut accepted: Vec<RenderItemId> = Vec::new();
    let item_in_frustum = |id: RenderItemId| {
        scene
            .items
            .get(id.0 as usize)
            .map(|record| frustum_intersects_aabb(&frustum, &record.world_bounds))
            .unwrap_or(false)
    };
    let query = query_octree(octree, &frustum, item_in_frustum, |id| accepted.push(id));
    list.stats.nodes_visited = query.nodes_visited;
    list.stats.nodes_pruned = query.nodes_pruned;

    for id in accepted {
        let Some(record) = scene.items.get(id.0 as usize) else {
            continue;
        };
        if !record.visible {
            list.stats.hidden += 1;
            continue;
        }
        if let Some(draw) = resolve_draw_item(scene, id, record, camera.position, lod_threshold) {
            push_draw_item(&mut list, scene, draw);
        }
    }

    let accepted = list.stats.visible + list.stats.hidden;
    list.stats.culled = list.stats.considered.saturating_sub(accepted);
    list
}

/// Draw list for this frame under the current settings
pub fn resolve_draw_list(
    octree: &OctreeData,
    scene: &SceneData,
    camera: &CameraData,
    settings: &RenderSettings,
) -> DrawList {
    let list = if settings.frustum_culling {
        build_draw_list_octree(octree, scene, camera, settings.lod_threshold)
    } else {
        build_draw_list_unculled(scene, camera, settings.lod_threshold)
    };

    log::debug!(
        "[Visibility::resolve_draw_list] {} visible ({} opaque, {} tessellated), {} culled, LOD {:?}",
        list.stats.visible,
        list.opaque.len(),
        list.tessellated.len(),
        list.stats.culled,
        list.stats.lod_histogram
    );
    list
}

/// Record the chosen mesh and draw range on each drawn item
pub fn apply_lod_selection(scene: &mut SceneData, list: &DrawList) {
    for draw in list.opaque.iter().chain(list.tessellated.iter()) {
        if let Some(record) = scene.items.get_mut(draw.item.0 as usize) {
            record.active_mesh = draw.mesh;
            record.active_lod = draw.lod;
            record.draw_args = draw.args;
        }
    }
}

pub fn is_item_visible(list: &DrawList, id: RenderItemId) -> bool {
    list.visible_mask.get(id.0 as usize).unwrap_or(false)
}

pub fn draw_count(list: &DrawList) -> usize {
    list.opaque.len() + list.tessellated.len()
}
