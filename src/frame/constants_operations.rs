//! Constant buffer writes and constant block packing

use super::constants_data::{LightConstants, MaterialConstants, ObjectConstants, PassConstants};
use super::frame_data::ConstantBuffer;
use crate::camera::{build_projection_matrix, build_view_matrix, CameraData};
use crate::error::{EngineError, EngineResult};
use crate::scene::{LightDescriptor, LightKind, MaterialRecord, RenderItem};
use glam::{Mat4, Quat, Vec3, Vec4};

// ============================================================================
// CONSTANT BUFFERS
// ============================================================================

pub fn create_constant_buffer<T: bytemuck::Pod>(label: &'static str, capacity: u32) -> ConstantBuffer<T> {
    ConstantBuffer {
        label,
        elements: vec![T::zeroed(); capacity as usize],
        write_count: 0,
    }
}

pub fn constant_buffer_capacity<T>(buffer: &ConstantBuffer<T>) -> u32 {
    buffer.elements.len() as u32
}

/// Write one element. An out-of-range slot is a scene construction bug
pub fn write_constant<T: Copy>(buffer: &mut ConstantBuffer<T>, index: u32, value: T) -> EngineResult<()> {
    let capacity = buffer.elements.len() as u32;
    let element = buffer
        .elements
        .get_mut(index as usize)
        .ok_or(EngineError::InvalidConstantSlot {
            buffer: buffer.label,
            index,
            capacity,
        })?;
    *element = value;
    buffer.write_count += 1;
    Ok(())
}

pub fn read_constant<T>(buffer: &ConstantBuffer<T>, index: u32) -> Option<&T> {
    buffer.elements.get(index as usize)
}

pub fn constant_bytes<T: bytemuck::Pod>(buffer: &ConstantBuffer<T>) -> &[u8] {
    bytemuck::cast_slice(&buffer.elements)
}

// ============================================================================
// PACKING
// ============================================================================

pub fn pack_object_constants(item: &RenderItem) -> ObjectConstants {
    ObjectConstants {
        world: item.world.to_cols_array_2d(),
        tex_transform: item.tex_transform.to_cols_array_2d(),
        material_index: item.material.0,
        _pad: [0; 3],
    }
}

pub fn pack_material_constants(material: &MaterialRecord) -> MaterialConstants {
    let mut flags = 0;
    if material.flags.has_normal_map {
        flags |= 1;
    }
    if material.flags.has_displacement_map {
        flags |= 2;
    }
    MaterialConstants {
        diffuse_albedo: material.diffuse_albedo.to_array(),
        fresnel_r0: material.fresnel_r0.to_array(),
        roughness: material.roughness,
        mat_transform: material.transform.to_cols_array_2d(),
        diffuse_slot: material.diffuse_slot.0,
        normal_slot: material.normal_slot.0,
        displacement_slot: material.displacement_slot.0,
        flags,
    }
}

/// Intensity cut-off used to size spot light volumes
const SPOT_CUTOFF: f32 = 0.01;

/// Transform that places the unit proxy volume around a light.
///
/// Point lights use a unit sphere scaled to the falloff end. Spot lights use
/// a unit cylinder along +Y, aimed down the light direction and widened to
/// the angle where `cos^spot_power` drops below the cut-off.
pub fn light_world_matrix(light: &LightDescriptor) -> Mat4 {
    match light.kind {
        LightKind::Ambient | LightKind::Directional => Mat4::IDENTITY,
        LightKind::Point => {
            Mat4::from_scale_rotation_translation(Vec3::splat(light.falloff_end), Quat::IDENTITY, light.position)
        }
        LightKind::Spot => {
            let power = light.spot_power.max(1.0);
            let cos_cutoff = SPOT_CUTOFF.powf(1.0 / power).clamp(0.05, 1.0);
            let tan_cutoff = (1.0 - cos_cutoff * cos_cutoff).sqrt() / cos_cutoff;
            let radius = light.falloff_end * tan_cutoff;
            let direction = light.direction.try_normalize().unwrap_or(Vec3::NEG_Y);
            let rotation = Quat::from_rotation_arc(Vec3::Y, direction);
            Mat4::from_scale_rotation_translation(
                Vec3::new(radius, light.falloff_end, radius),
                rotation,
                light.position,
            )
        }
    }
}

pub fn pack_light_constants(light: &LightDescriptor) -> LightConstants {
    LightConstants {
        strength: light.strength.to_array(),
        falloff_start: light.falloff_start,
        direction: light.direction.to_array(),
        falloff_end: light.falloff_end,
        position: light.position.to_array(),
        spot_power: light.spot_power,
        light_type: light.kind.code(),
        _pad: [0; 3],
        world: light_world_matrix(light).to_cols_array_2d(),
    }
}

/// Per-frame pass block. Written every frame, never dirty-tracked
pub fn build_pass_constants(
    camera: &CameraData,
    target_size: (u32, u32),
    total_time: f32,
    delta_time: f32,
    ambient_light: Vec4,
) -> PassConstants {
    let view = build_view_matrix(camera);
    let proj = build_projection_matrix(camera);
    let view_proj = proj * view;
    let width = target_size.0.max(1) as f32;
    let height = target_size.1.max(1) as f32;

    PassConstants {
        view: view.to_cols_array_2d(),
        inv_view: view.inverse().to_cols_array_2d(),
        proj: proj.to_cols_array_2d(),
        inv_proj: proj.inverse().to_cols_array_2d(),
        view_proj: view_proj.to_cols_array_2d(),
        inv_view_proj: view_proj.inverse().to_cols_array_2d(),
        eye_pos_w: camera.position.to_array(),
        _pad0: 0.0,
        render_target_size: [width, height],
        inv_render_target_size: [1.0 / width, 1.0 / height],
        near_z: camera.near_plane,
        far_z: camera.far_plane,
        total_time,
        delta_time,
        ambient_light: ambient_light.to_array(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_out_of_range_fails_loudly() {
        let mut buffer = create_constant_buffer::<LightConstants>("light", 5);
        let light = pack_light_constants(&LightDescriptor::default());
        assert!(write_constant(&mut buffer, 4, light).is_ok());
        match write_constant(&mut buffer, 10, light) {
            Err(EngineError::InvalidConstantSlot { buffer, index, capacity }) => {
                assert_eq!(buffer, "light");
                assert_eq!(index, 10);
                assert_eq!(capacity, 5);
            }
            other => panic!("expected InvalidConstantSlot, got {:?}", other),
        }
        assert_eq!(buffer.write_count, 1);
    }

    #[test]
    fn test_light_type_codes() {
        let mut light = LightDescriptor::default();
        for (kind, code) in [
            (LightKind::Ambient, 0),
            (LightKind::Directional, 1),
            (LightKind::Point, 2),
            (LightKind::Spot, 3),
        ] {
            light.kind = kind;
            assert_eq!(pack_light_constants(&light).light_type, code);
        }
    }

    #[test]
    fn test_point_light_volume_covers_falloff() {
        let light = LightDescriptor {
            kind: LightKind::Point,
            position: Vec3::new(3.0, 1.0, 0.0),
            falloff_end: 6.0,
            ..Default::default()
        };
        let world = light_world_matrix(&light);
        let edge = world.transform_point3(Vec3::X);
        assert!((edge - Vec3::new(9.0, 1.0, 0.0)).length() < 1e-4);
    }

    #[test]
    fn test_spot_volume_points_along_direction() {
        let light = LightDescriptor {
            kind: LightKind::Spot,
            position: Vec3::ZERO,
            direction: Vec3::new(1.0, 0.0, 0.0),
            falloff_end: 10.0,
            ..Default::default()
        };
        let world = light_world_matrix(&light);
        let tip = world.transform_point3(Vec3::Y);
        assert!((tip - Vec3::new(10.0, 0.0, 0.0)).length() < 1e-3);
    }

    #[test]
    fn test_pass_constants_inverse_pairs() {
        let camera = CameraData::default();
        let pass = build_pass_constants(&camera, (800, 600), 1.0, 0.016, Vec4::new(0.25, 0.25, 0.35, 1.0));
        let view = Mat4::from_cols_array_2d(&pass.view);
        let inv = Mat4::from_cols_array_2d(&pass.inv_view);
        assert!((view * inv).abs_diff_eq(Mat4::IDENTITY, 1e-4));
        assert_eq!(pass.render_target_size, [800.0, 600.0]);
        assert_eq!(pass.eye_pos_w, camera.position.to_array());
    }
}
