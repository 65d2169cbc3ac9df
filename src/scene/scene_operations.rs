//! Scene registry operations
//!
//! Registration happens at load time and hands out integer handles. Edits
//! go through the functions here so every change lands in the change queue
//! and every bounds change bumps the spatial generation.

use super::descriptor_table::{register_texture_slot, texture_slot_or_error, DescriptorTable};
use super::scene_data::{
    DrawArgs, GeometryId, GeometryRecord, LodLevel, MaterialDesc, MaterialFlags, MaterialId, MaterialRecord,
    MeshGeometry, MeshId, MeshRecord, PrimitiveTopology, RenderItem, RenderItemDesc, RenderItemId, SceneData,
    TextureSlot,
};
use crate::constants::descriptors::{ERROR_MATERIAL_NAME, ERROR_TEXTURE_SLOT};
use crate::error::{EngineError, EngineResult, OptionExt};
use crate::frame::{queue_change, ChangeEvent, ChangeQueue, FrameCapacity};
use crate::math::{aabb_from_points, aabb_transformed, aabb_union, Aabb};
use glam::{Mat4, Vec3, Vec4};
use rustc_hash::FxHashMap;

// ============================================================================
// CREATION
// ============================================================================

/// Empty scene holding only the fallback material
pub fn create_scene() -> SceneData {
    let mut scene = SceneData {
        geometries: Vec::new(),
        meshes: Vec::new(),
        materials: Vec::new(),
        material_names: FxHashMap::default(),
        items: Vec::new(),
        lights: Vec::new(),
        free_light_slots: Vec::new(),
        textures: DescriptorTable::default(),
        error_material: MaterialId(0),
        spatial_generation: 0,
        changes: ChangeQueue::default(),
    };

    let error_material = MaterialDesc {
        name: ERROR_MATERIAL_NAME.to_string(),
        diffuse_albedo: Vec4::new(1.0, 0.0, 1.0, 1.0),
        ..Default::default()
    };
    // The name is fresh and the table is empty, so this cannot collide
    let id = insert_material(&mut scene, error_material);
    scene.error_material = id;
    scene
}

// ============================================================================
// GEOMETRY AND MESHES
// ============================================================================

pub fn register_geometry(scene: &mut SceneData, geometry: &MeshGeometry) -> GeometryId {
    let id = GeometryId(scene.geometries.len() as u32);
    scene.geometries.push(GeometryRecord {
        name: geometry.name.clone(),
        vertex_count: geometry.vertices.len() as u32,
        index_count: geometry.indices.len() as u32,
    });
    id
}

/// Object-space bounds of the vertices one submesh references
pub fn compute_submesh_bounds(geometry: &MeshGeometry, args: &DrawArgs) -> Option<Aabb> {
    let start = args.start_index as usize;
    let end = start.checked_add(args.index_count as usize)?;
    let indices = geometry.indices.get(start..end)?;
    let points: Vec<Vec3> = indices
        .iter()
        .filter_map(|&i| {
            let v = i64::from(i) + i64::from(args.base_vertex);
            usize::try_from(v).ok().and_then(|v| geometry.vertices.get(v))
        })
        .map(|v| Vec3::from(v.position))
        .collect();
    aabb_from_points(&points)
}

pub fn register_mesh(
    scene: &mut SceneData,
    name: &str,
    geometry: GeometryId,
    args: DrawArgs,
    bounds: Aabb,
) -> MeshId {
    let id = MeshId(scene.meshes.len() as u32);
    scene.meshes.push(MeshRecord {
        name: name.to_string(),
        geometry,
        args,
        bounds,
    });
    id
}

pub fn mesh(scene: &SceneData, id: MeshId) -> EngineResult<&MeshRecord> {
    scene.meshes.get(id.0 as usize).ok_or_engine(|| EngineError::InvalidHandle {
        kind: "mesh",
        index: id.0,
    })
}

// ============================================================================
// TEXTURES AND MATERIALS
// ============================================================================

/// Reserve a descriptor slot for a texture the host is about to upload
pub fn register_texture(scene: &mut SceneData, name: &str) -> EngineResult<TextureSlot> {
    register_texture_slot(&mut scene.textures, name)
}

fn resolve_texture(table: &mut DescriptorTable, name: &Option<String>) -> TextureSlot {
    match name {
        Some(name) => texture_slot_or_error(table, name),
        None => TextureSlot(ERROR_TEXTURE_SLOT),
    }
}

fn insert_material(scene: &mut SceneData, desc: MaterialDesc) -> MaterialId {
    let id = MaterialId(scene.materials.len() as u32);
    let diffuse_slot = resolve_texture(&mut scene.textures, &desc.diffuse_texture);
    let normal_slot = resolve_texture(&mut scene.textures, &desc.normal_texture);
    let displacement_slot = resolve_texture(&mut scene.textures, &desc.displacement_texture);

    scene.materials.push(MaterialRecord {
        name: desc.name.clone(),
        diffuse_albedo: desc.diffuse_albedo,
        fresnel_r0: desc.fresnel_r0,
        roughness: desc.roughness,
        transform: desc.transform,
        diffuse_slot,
        normal_slot,
        displacement_slot,
        flags: MaterialFlags {
            has_normal_map: desc.normal_texture.is_some(),
            has_displacement_map: desc.displacement_texture.is_some(),
        },
        dirty_frames: 0,
    });
    scene.material_names.insert(desc.name, id);
    queue_change(&mut scene.changes, ChangeEvent::Material(id));
    id
}

/// Register a material. Names are unique
pub fn register_material(scene: &mut SceneData, desc: MaterialDesc) -> EngineResult<MaterialId> {
    if scene.material_names.contains_key(&desc.name) {
        return Err(EngineError::ResourceCreation {
            resource: format!("material '{}'", desc.name),
            reason: "name already registered".to_string(),
        });
    }
    Ok(insert_material(scene, desc))
}

/// Authoring-time lookup. An unknown name is a scene construction bug
pub fn material_id_by_name(scene: &SceneData, name: &str) -> EngineResult<MaterialId> {
    scene
        .material_names
        .get(name)
        .copied()
        .ok_or_engine(|| EngineError::MaterialNotFound { name: name.to_string() })
}

/// Lookup for content references: unknown names get the error material
pub fn resolve_material_or_fallback(scene: &SceneData, name: &str) -> MaterialId {
    match scene.material_names.get(name) {
        Some(id) => *id,
        None => {
            log::warn!(
                "[Scene::resolve_material_or_fallback] Material '{}' not found, substituting error material",
                name
            );
            scene.error_material
        }
    }
}

pub fn material(scene: &SceneData, id: MaterialId) -> EngineResult<&MaterialRecord> {
    scene.materials.get(id.0 as usize).ok_or_engine(|| EngineError::InvalidHandle {
        kind: "material",
        index: id.0,
    })
}

pub fn set_material_params(
    scene: &mut SceneData,
    id: MaterialId,
    diffuse_albedo: Vec4,
    fresnel_r0: Vec3,
    roughness: f32,
) -> EngineResult<()> {
    let record = scene
        .materials
        .get_mut(id.0 as usize)
        .ok_or_engine(|| EngineError::InvalidHandle {
            kind: "material",
            index: id.0,
        })?;
    record.diffuse_albedo = diffuse_albedo;
    record.fresnel_r0 = fresnel_r0;
    record.roughness = roughness.clamp(0.0, 1.0);
    queue_change(&mut scene.changes, ChangeEvent::Material(id));
    Ok(())
}

// ============================================================================
// RENDER ITEMS
// ============================================================================

pub fn add_render_item(scene: &mut SceneData, desc: RenderItemDesc) -> EngineResult<RenderItemId> {
    let base = mesh(scene, desc.meshes.base)?.clone();
    for variant in [desc.meshes.low, desc.meshes.high].into_iter().flatten() {
        mesh(scene, variant)?;
    }

    let material = resolve_material_or_fallback(scene, &desc.material);
    let world_bounds = aabb_transformed(&base.bounds, &desc.world);
    let id = RenderItemId(scene.items.len() as u32);

    scene.items.push(RenderItem {
        world: desc.world,
        tex_transform: desc.tex_transform,
        meshes: desc.meshes,
        active_mesh: desc.meshes.base,
        active_lod: LodLevel::Base,
        draw_args: base.args,
        material,
        topology: desc.topology,
        visible: desc.visible,
        lod_enabled: desc.lod_enabled,
        lod_threshold: desc.lod_threshold,
        local_bounds: base.bounds,
        world_bounds,
        dirty_frames: 0,
    });

    queue_change(&mut scene.changes, ChangeEvent::Object(id));
    scene.spatial_generation += 1;
    Ok(id)
}

pub fn item(scene: &SceneData, id: RenderItemId) -> EngineResult<&RenderItem> {
    scene.items.get(id.0 as usize).ok_or_engine(|| EngineError::InvalidHandle {
        kind: "render item",
        index: id.0,
    })
}

fn item_mut(scene: &mut SceneData, id: RenderItemId) -> EngineResult<&mut RenderItem> {
    scene.items.get_mut(id.0 as usize).ok_or_engine(|| EngineError::InvalidHandle {
        kind: "render item",
        index: id.0,
    })
}

pub fn set_item_transform(scene: &mut SceneData, id: RenderItemId, world: Mat4) -> EngineResult<()> {
    let record = item_mut(scene, id)?;
    record.world = world;
    let new_bounds = aabb_transformed(&record.local_bounds, &world);
    let moved = new_bounds != record.world_bounds;
    record.world_bounds = new_bounds;

    queue_change(&mut scene.changes, ChangeEvent::Object(id));
    if moved {
        scene.spatial_generation += 1;
    }
    Ok(())
}

pub fn set_item_tex_transform(scene: &mut SceneData, id: RenderItemId, tex_transform: Mat4) -> EngineResult<()> {
    item_mut(scene, id)?.tex_transform = tex_transform;
    queue_change(&mut scene.changes, ChangeEvent::Object(id));
    Ok(())
}

/// Rebind an item's material by name; unknown names get the error material
pub fn set_item_material(scene: &mut SceneData, id: RenderItemId, material_name: &str) -> EngineResult<()> {
    let material = resolve_material_or_fallback(scene, material_name);
    item_mut(scene, id)?.material = material;
    queue_change(&mut scene.changes, ChangeEvent::Object(id));
    Ok(())
}

pub fn set_item_visible(scene: &mut SceneData, id: RenderItemId, visible: bool) -> EngineResult<()> {
    item_mut(scene, id)?.visible = visible;
    Ok(())
}

pub fn set_item_lod(
    scene: &mut SceneData,
    id: RenderItemId,
    enabled: bool,
    threshold: Option<f32>,
) -> EngineResult<()> {
    let record = item_mut(scene, id)?;
    record.lod_enabled = enabled;
    record.lod_threshold = threshold;
    Ok(())
}

/// Tessellated items draw with the displacement pipeline
pub fn is_tessellated(scene: &SceneData, record: &RenderItem) -> bool {
    record.topology == PrimitiveTopology::PatchList
        || scene
            .materials
            .get(record.material.0 as usize)
            .map(|m| m.flags.has_displacement_map)
            .unwrap_or(false)
}

/// Union of all item bounds, first item seeding the box
pub fn scene_world_bounds(scene: &SceneData) -> Option<Aabb> {
    let (first, rest) = scene.items.split_first()?;
    Some(rest.iter().fold(first.world_bounds, |acc, i| aabb_union(&acc, &i.world_bounds)))
}

/// Constant buffer element counts this scene needs
pub fn required_frame_capacity(scene: &SceneData) -> FrameCapacity {
    FrameCapacity {
        objects: scene.items.len() as u32,
        materials: scene.materials.len() as u32,
        lights: scene.lights.len() as u32,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::create_aabb;
    use crate::scene::Vertex;

    fn scene_with_mesh() -> (SceneData, MeshId) {
        let mut scene = create_scene();
        let geometry = register_geometry(&mut scene, &MeshGeometry::default());
        let mesh = register_mesh(
            &mut scene,
            "unit",
            geometry,
            DrawArgs::default(),
            create_aabb(Vec3::splat(-1.0), Vec3::ONE),
        );
        (scene, mesh)
    }

    #[test]
    fn test_scene_starts_with_error_material() {
        let scene = create_scene();
        assert_eq!(scene.materials.len(), 1);
        assert_eq!(material_id_by_name(&scene, ERROR_MATERIAL_NAME).expect("present"), scene.error_material);
    }

    #[test]
    fn test_missing_material_name_is_error_on_lookup() {
        let scene = create_scene();
        assert!(matches!(
            material_id_by_name(&scene, "marble"),
            Err(EngineError::MaterialNotFound { .. })
        ));
    }

    #[test]
    fn test_item_with_missing_material_gets_fallback() {
        let (mut scene, mesh) = scene_with_mesh();
        let id = add_render_item(&mut scene, RenderItemDesc::new(mesh, "does-not-exist")).expect("item");
        assert_eq!(item(&scene, id).expect("item").material, scene.error_material);
    }

    #[test]
    fn test_invalid_mesh_handle_is_rejected() {
        let mut scene = create_scene();
        let result = add_render_item(&mut scene, RenderItemDesc::new(MeshId(9), "x"));
        assert!(matches!(result, Err(EngineError::InvalidHandle { kind: "mesh", .. })));
    }

    #[test]
    fn test_transform_updates_world_bounds_and_generation() {
        let (mut scene, mesh) = scene_with_mesh();
        let id = add_render_item(&mut scene, RenderItemDesc::new(mesh, ERROR_MATERIAL_NAME)).expect("item");
        let generation = scene.spatial_generation;

        set_item_transform(&mut scene, id, Mat4::from_translation(Vec3::new(10.0, 0.0, 0.0))).expect("move");
        let record = item(&scene, id).expect("item");
        assert_eq!(record.world_bounds.min, Vec3::new(9.0, -1.0, -1.0));
        assert_eq!(scene.spatial_generation, generation + 1);

        // Same transform again: constants re-queued, bounds unchanged
        let pending = scene.changes.events.len();
        set_item_transform(&mut scene, id, Mat4::from_translation(Vec3::new(10.0, 0.0, 0.0))).expect("move");
        assert_eq!(scene.spatial_generation, generation + 1);
        assert_eq!(scene.changes.events.len(), pending + 1);
    }

    #[test]
    fn test_displacement_material_marks_item_tessellated() {
        let (mut scene, mesh) = scene_with_mesh();
        register_material(
            &mut scene,
            MaterialDesc {
                name: "cobble".to_string(),
                displacement_texture: Some("cobble_disp".to_string()),
                ..Default::default()
            },
        )
        .expect("material");
        let flat = add_render_item(&mut scene, RenderItemDesc::new(mesh, ERROR_MATERIAL_NAME)).expect("item");
        let bumpy = add_render_item(&mut scene, RenderItemDesc::new(mesh, "cobble")).expect("item");

        assert!(!is_tessellated(&scene, &scene.items[flat.0 as usize]));
        assert!(is_tessellated(&scene, &scene.items[bumpy.0 as usize]));
        // The displacement texture was never loaded, so its slot is the error texture
        assert_eq!(scene.materials[1].displacement_slot, TextureSlot(0));
    }

    #[test]
    fn test_submesh_bounds() {
        let v = |x: f32, y: f32, z: f32| Vertex {
            position: [x, y, z],
            normal: [0.0, 1.0, 0.0],
            tex_coord: [0.0, 0.0],
            tangent: [1.0, 0.0, 0.0],
        };
        let geometry = MeshGeometry {
            name: "tri".to_string(),
            vertices: vec![v(0.0, 0.0, 0.0), v(2.0, 1.0, 0.0), v(-1.0, 3.0, 4.0), v(100.0, 0.0, 0.0)],
            indices: vec![0, 1, 2, 3, 3, 3],
        };
        let bounds = compute_submesh_bounds(
            &geometry,
            &DrawArgs {
                index_count: 3,
                start_index: 0,
                base_vertex: 0,
            },
        )
        .expect("bounds");
        assert_eq!(bounds.min, Vec3::new(-1.0, 0.0, 0.0));
        assert_eq!(bounds.max, Vec3::new(2.0, 3.0, 4.0));
    }

    #[test]
    fn test_scene_bounds_union() {
        let (mut scene, mesh) = scene_with_mesh();
        assert!(scene_world_bounds(&scene).is_none());
        let mut a = RenderItemDesc::new(mesh, ERROR_MATERIAL_NAME);
        a.world = Mat4::from_translation(Vec3::new(-10.0, 0.0, 0.0));
        let mut b = RenderItemDesc::new(mesh, ERROR_MATERIAL_NAME);
        b.world = Mat4::from_translation(Vec3::new(0.0, 0.0, 20.0));
        add_render_item(&mut scene, a).expect("a");
        add_render_item(&mut scene, b).expect("b");

        let bounds = scene_world_bounds(&scene).expect("bounds");
        assert_eq!(bounds.min, Vec3::new(-11.0, -1.0, -1.0));
        assert_eq!(bounds.max, Vec3::new(1.0, 1.0, 21.0));
    }
}
