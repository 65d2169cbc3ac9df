/// Scene Module - Data-Oriented Programming (DOP) style
///
/// Arenas of geometry, meshes, materials, render items and lights,
/// addressed by integer handles issued at registration time.
pub mod descriptor_table;
pub mod light_data;
pub mod light_operations;
pub mod scene_data;
pub mod scene_operations;

pub use descriptor_table::{
    create_descriptor_table, error_texture, register_texture_slot, texture_slot_or_error, validate_texture_upload,
    DescriptorTable, ERROR_TEXTURE_NAME,
};
pub use light_data::{LightDescriptor, LightEntry, LightId, LightItem, LightKind, LightMotion};
pub use scene_data::{
    DrawArgs, GeometryId, GeometryRecord, LodLevel, LodMeshSet, MaterialDesc, MaterialFlags, MaterialId,
    MaterialRecord, MeshGeometry, MeshId, MeshRecord, PrimitiveTopology, RenderItem, RenderItemDesc, RenderItemId,
    SceneData, TextureSlot, TextureUpload, Vertex,
};

pub use light_operations::{
    despawn_light, integrate_dynamic_lights, light, live_light_count, set_light_descriptor, spawn_light,
};
pub use scene_operations::{
    add_render_item, compute_submesh_bounds, create_scene, is_tessellated, item, material, material_id_by_name,
    mesh, register_geometry, register_material, register_mesh, register_texture, required_frame_capacity,
    resolve_material_or_fallback, scene_world_bounds, set_item_lod, set_item_material, set_item_tex_transform,
    set_item_transform, set_item_visible, set_material_params,
};
