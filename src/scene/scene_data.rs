//! Scene data structures - Pure DOP
//!
//! Arenas of geometry, meshes, materials and render items addressed by
//! integer handles. Handles are stable for the life of the scene; nothing
//! here is destroyed during steady-state rendering.

use super::descriptor_table::DescriptorTable;
use super::light_data::LightEntry;
use crate::frame::ChangeQueue;
use crate::math::Aabb;
use glam::{Mat4, Vec3, Vec4};
use rustc_hash::FxHashMap;

/// Vertex and index buffer pair uploaded to the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GeometryId(pub u32);

/// Sub-range of a geometry with its own bounds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MeshId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MaterialId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RenderItemId(pub u32);

/// Shader-visible texture table index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureSlot(pub u32);

/// Vertex layout shared by every geometry
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub tex_coord: [f32; 2],
    pub tangent: [f32; 3],
}

/// Model data handed over by the asset loader
#[derive(Debug, Clone, Default)]
pub struct MeshGeometry {
    pub name: String,
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
}

/// RGBA8 pixels handed over by the asset loader
#[derive(Debug, Clone)]
pub struct TextureUpload {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub rgba8: Vec<u8>,
}

/// Index count / start index / base vertex triple for one draw
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrawArgs {
    pub index_count: u32,
    pub start_index: u32,
    pub base_vertex: i32,
}

#[derive(Debug, Clone)]
pub struct GeometryRecord {
    pub name: String,
    pub vertex_count: u32,
    pub index_count: u32,
}

#[derive(Debug, Clone)]
pub struct MeshRecord {
    pub name: String,
    pub geometry: GeometryId,
    pub args: DrawArgs,
    /// Object-space bounds
    pub bounds: Aabb,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaterialFlags {
    pub has_normal_map: bool,
    pub has_displacement_map: bool,
}

/// Material description supplied by the asset loader
#[derive(Debug, Clone)]
pub struct MaterialDesc {
    pub name: String,
    pub diffuse_albedo: Vec4,
    pub fresnel_r0: Vec3,
    pub roughness: f32,
    pub transform: Mat4,
    pub diffuse_texture: Option<String>,
    pub normal_texture: Option<String>,
    pub displacement_texture: Option<String>,
}

impl Default for MaterialDesc {
    fn default() -> Self {
        Self {
            name: String::new(),
            diffuse_albedo: Vec4::ONE,
            fresnel_r0: Vec3::splat(0.01),
            roughness: 0.25,
            transform: Mat4::IDENTITY,
            diffuse_texture: None,
            normal_texture: None,
            displacement_texture: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MaterialRecord {
    pub name: String,
    pub diffuse_albedo: Vec4,
    pub fresnel_r0: Vec3,
    pub roughness: f32,
    pub transform: Mat4,
    pub diffuse_slot: TextureSlot,
    pub normal_slot: TextureSlot,
    pub displacement_slot: TextureSlot,
    pub flags: MaterialFlags,
    /// Frame resources that still hold stale constants for this material
    pub dirty_frames: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveTopology {
    TriangleList,
    /// Tessellated patches
    PatchList,
}

/// Detail variants of one item. Missing variants fall back to `base`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LodMeshSet {
    pub base: MeshId,
    pub low: Option<MeshId>,
    pub high: Option<MeshId>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum LodLevel {
    #[default]
    Base,
    Low,
    High,
}

/// What the host asks for when adding an item
#[derive(Debug, Clone)]
pub struct RenderItemDesc {
    pub world: Mat4,
    pub tex_transform: Mat4,
    pub meshes: LodMeshSet,
    pub material: String,
    pub topology: PrimitiveTopology,
    pub lod_enabled: bool,
    /// Per-item LOD distance; `None` uses the global setting
    pub lod_threshold: Option<f32>,
    pub visible: bool,
}

impl RenderItemDesc {
    pub fn new(mesh: MeshId, material: impl Into<String>) -> Self {
        Self {
            world: Mat4::IDENTITY,
            tex_transform: Mat4::IDENTITY,
            meshes: LodMeshSet {
                base: mesh,
                low: None,
                high: None,
            },
            material: material.into(),
            topology: PrimitiveTopology::TriangleList,
            lod_enabled: false,
            lod_threshold: None,
            visible: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RenderItem {
    pub world: Mat4,
    pub tex_transform: Mat4,
    pub meshes: LodMeshSet,

    /// Mesh and draw args chosen by the last visibility pass
    pub active_mesh: MeshId,
    pub active_lod: LodLevel,
    pub draw_args: DrawArgs,

    pub material: MaterialId,
    pub topology: PrimitiveTopology,
    pub visible: bool,
    pub lod_enabled: bool,
    pub lod_threshold: Option<f32>,

    /// Base mesh bounds in object space
    pub local_bounds: Aabb,
    /// `local_bounds` under `world`, kept in sync on every transform edit
    pub world_bounds: Aabb,

    pub dirty_frames: u32,
}

/// Scene registry: the only owner of items, lights and their resources
#[derive(Debug)]
pub struct SceneData {
    pub geometries: Vec<GeometryRecord>,
    pub meshes: Vec<MeshRecord>,
    pub materials: Vec<MaterialRecord>,
    pub material_names: FxHashMap<String, MaterialId>,
    pub items: Vec<RenderItem>,

    /// Light arena indexed by constant buffer slot; empty entries are free
    pub lights: Vec<LightEntry>,
    pub free_light_slots: Vec<u32>,

    pub textures: DescriptorTable,
    pub error_material: MaterialId,

    /// Bumped whenever an item is added or its world bounds change
    pub spatial_generation: u64,

    pub changes: ChangeQueue,
}
