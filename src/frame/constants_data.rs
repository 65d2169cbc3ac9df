//! GPU constant block layouts
//!
//! Must match shader layout exactly. Every block is a multiple of 16 bytes
//! so arrays of them can be bound as structured storage.

use static_assertions::const_assert_eq;

/// Per-frame camera and timing data
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct PassConstants {
    pub view: [[f32; 4]; 4],
    pub inv_view: [[f32; 4]; 4],
    pub proj: [[f32; 4]; 4],
    pub inv_proj: [[f32; 4]; 4],
    pub view_proj: [[f32; 4]; 4],
    pub inv_view_proj: [[f32; 4]; 4],
    pub eye_pos_w: [f32; 3],
    pub _pad0: f32,
    pub render_target_size: [f32; 2],
    pub inv_render_target_size: [f32; 2],
    pub near_z: f32,
    pub far_z: f32,
    pub total_time: f32,
    pub delta_time: f32,
    pub ambient_light: [f32; 4],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ObjectConstants {
    pub world: [[f32; 4]; 4],
    pub tex_transform: [[f32; 4]; 4],
    pub material_index: u32,
    pub _pad: [u32; 3],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct MaterialConstants {
    pub diffuse_albedo: [f32; 4],
    pub fresnel_r0: [f32; 3],
    pub roughness: f32,
    pub mat_transform: [[f32; 4]; 4],
    pub diffuse_slot: u32,
    pub normal_slot: u32,
    pub displacement_slot: u32,
    /// Bit 0: normal map, bit 1: displacement map
    pub flags: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct LightConstants {
    pub strength: [f32; 3],
    pub falloff_start: f32,
    pub direction: [f32; 3],
    pub falloff_end: f32,
    pub position: [f32; 3],
    pub spot_power: f32,
    pub light_type: u32,
    pub _pad: [u32; 3],
    /// Places the unit proxy volume around the light
    pub world: [[f32; 4]; 4],
}

const_assert_eq!(std::mem::size_of::<PassConstants>() % 16, 0);
const_assert_eq!(std::mem::size_of::<ObjectConstants>() % 16, 0);
const_assert_eq!(std::mem::size_of::<MaterialConstants>() % 16, 0);
const_assert_eq!(std::mem::size_of::<LightConstants>() % 16, 0);
const_assert_eq!(std::mem::size_of::<PassConstants>(), 448);
