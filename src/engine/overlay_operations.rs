//! Overlay controls
//!
//! Read/write surface for an immediate-mode UI. Render switches take effect
//! on the next recorded frame; scene edits go through the scene operations
//! so they enqueue change events and reach every frame slot.

use glam::{Mat4, Vec3, Vec4};

use super::engine_data::Renderer;
use crate::error::{EngineError, EngineResult};
use crate::particles::{kill_all, set_particle_force};
use crate::render_graph::RenderSettings;
use crate::scene::{
    despawn_light, set_item_material, set_item_transform, set_item_visible, set_light_descriptor,
    set_material_params, spawn_light, LightDescriptor, LightId, LightMotion, MaterialId, MeshId, RenderItemId,
};

pub fn render_settings(renderer: &Renderer) -> &RenderSettings {
    &renderer.settings
}

pub fn set_wireframe(renderer: &mut Renderer, enabled: bool) {
    renderer.settings.wireframe = enabled;
}

pub fn set_frustum_culling(renderer: &mut Renderer, enabled: bool) {
    if renderer.settings.frustum_culling != enabled {
        log::info!("[Overlay::set_frustum_culling] {}", enabled);
    }
    renderer.settings.frustum_culling = enabled;
}

pub fn set_debug_light_volumes(renderer: &mut Renderer, enabled: bool) {
    renderer.settings.debug_light_volumes = enabled;
}

pub fn set_clear_color(renderer: &mut Renderer, color: [f32; 4]) {
    renderer.settings.clear_color = color;
}

pub fn set_ambient_light(renderer: &mut Renderer, ambient: Vec4) {
    renderer.ambient_light = ambient;
}

pub fn set_lod_threshold(renderer: &mut Renderer, threshold: f32) -> EngineResult<()> {
    if !threshold.is_finite() || threshold <= 0.0 {
        return Err(EngineError::InvalidConfig {
            field: "lod_threshold".to_string(),
            value: threshold.to_string(),
            reason: "must be a positive distance".to_string(),
        });
    }
    renderer.settings.lod_threshold = threshold;
    Ok(())
}

// ============================================================================
// SCENE EDITS
// ============================================================================

pub fn edit_item_transform(renderer: &mut Renderer, id: RenderItemId, world: Mat4) -> EngineResult<()> {
    set_item_transform(&mut renderer.scene, id, world)
}

pub fn edit_item_material(renderer: &mut Renderer, id: RenderItemId, material_name: &str) -> EngineResult<()> {
    set_item_material(&mut renderer.scene, id, material_name)
}

pub fn edit_item_visible(renderer: &mut Renderer, id: RenderItemId, visible: bool) -> EngineResult<()> {
    set_item_visible(&mut renderer.scene, id, visible)
}

pub fn edit_material(
    renderer: &mut Renderer,
    id: MaterialId,
    diffuse_albedo: Vec4,
    fresnel_r0: Vec3,
    roughness: f32,
) -> EngineResult<()> {
    set_material_params(&mut renderer.scene, id, diffuse_albedo, fresnel_r0, roughness)
}

pub fn edit_light(renderer: &mut Renderer, id: LightId, descriptor: LightDescriptor) -> EngineResult<()> {
    set_light_descriptor(&mut renderer.scene, id, descriptor)
}

// ============================================================================
// DYNAMIC LIGHTS AND PARTICLES
// ============================================================================

/// Spawn a moving light that slows down under the configured damping.
///
/// If this outgrows the light buffers the ring is rebuilt on the next frame.
pub fn spawn_dynamic_light(
    renderer: &mut Renderer,
    descriptor: LightDescriptor,
    proxy_mesh: Option<MeshId>,
    velocity: Vec3,
) -> LightId {
    let motion = LightMotion {
        velocity,
        linear_damping: renderer.config.light_linear_damping,
        at_rest: false,
    };
    spawn_light(&mut renderer.scene, descriptor, proxy_mesh, Some(motion))
}

pub fn despawn_dynamic_light(renderer: &mut Renderer, id: LightId) -> EngineResult<()> {
    despawn_light(&mut renderer.scene, id)
}

pub fn set_particle_gravity(renderer: &mut Renderer, force: Vec3) {
    set_particle_force(&mut renderer.particles, force);
}

pub fn reset_particles(renderer: &mut Renderer) {
    kill_all(&mut renderer.particles);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::engine::{create_renderer, flush_renderer, item_drawn_last_frame, submit_frame};
    use crate::gpu::{create_headless_gpu, headless_stats, HeadlessConfig, HeadlessControl};
    use crate::math::create_aabb;
    use crate::scene::{add_render_item, register_geometry, register_mesh, DrawArgs, MeshGeometry, RenderItemDesc};

    const DT: f32 = 1.0 / 60.0;

    fn renderer() -> (Renderer, HeadlessControl) {
        let gpu = create_headless_gpu(HeadlessConfig::default()).expect("headless gpu");
        let control = gpu.clone_control();
        let config = EngineConfig {
            window_width: 160,
            window_height: 120,
            particle_capacity: 64,
            ..Default::default()
        };
        (create_renderer(config, Box::new(gpu)).expect("renderer"), control)
    }

    fn cube(renderer: &mut Renderer) -> MeshId {
        let geometry = register_geometry(&mut renderer.scene, &MeshGeometry::default());
        register_mesh(
            &mut renderer.scene,
            "cube",
            geometry,
            DrawArgs {
                index_count: 36,
                start_index: 0,
                base_vertex: 0,
            },
            create_aabb(Vec3::splat(-1.0), Vec3::ONE),
        )
    }

    #[test]
    fn test_lod_threshold_must_be_positive() {
        let (mut renderer, _control) = renderer();
        assert!(set_lod_threshold(&mut renderer, 0.0).is_err());
        assert!(set_lod_threshold(&mut renderer, f32::NAN).is_err());
        set_lod_threshold(&mut renderer, 12.5).expect("threshold");
        assert_eq!(render_settings(&renderer).lod_threshold, 12.5);
    }

    #[test]
    fn test_spawning_past_capacity_rebuilds_ring() {
        let (mut renderer, control) = renderer();
        let mesh = cube(&mut renderer);
        submit_frame(&mut renderer, DT).expect("frame");
        let capacity = renderer.ring.capacity.lights;

        let ids: Vec<LightId> = (0..capacity + 2)
            .map(|i| {
                spawn_dynamic_light(
                    &mut renderer,
                    LightDescriptor::default(),
                    Some(mesh),
                    Vec3::new(i as f32, 0.0, 0.0),
                )
            })
            .collect();

        let report = submit_frame(&mut renderer, DT).expect("frame").expect("not paused");
        assert!(report.ring_rebuilt);
        assert!(renderer.ring.capacity.lights >= capacity + 2);
        assert!(report.lights_moving > 0);

        despawn_dynamic_light(&mut renderer, ids[0]).expect("despawn");
        submit_frame(&mut renderer, DT).expect("frame after despawn");
        flush_renderer(&mut renderer).expect("flush");
        assert!(headless_stats(&control).validation_errors.is_empty());
    }

    #[test]
    fn test_hidden_item_not_drawn() {
        let (mut renderer, _control) = renderer();
        let mesh = cube(&mut renderer);
        let mut desc = RenderItemDesc::new(mesh, "anything");
        desc.world = Mat4::from_translation(Vec3::new(0.0, 5.0, 0.0));
        let id = add_render_item(&mut renderer.scene, desc).expect("item");

        submit_frame(&mut renderer, DT).expect("frame");
        assert!(item_drawn_last_frame(&renderer, id));

        edit_item_visible(&mut renderer, id, false).expect("hide");
        submit_frame(&mut renderer, DT).expect("frame");
        assert!(!item_drawn_last_frame(&renderer, id));
    }

    #[test]
    fn test_culling_toggle_draws_offscreen_items() {
        let (mut renderer, _control) = renderer();
        let mesh = cube(&mut renderer);
        let mut desc = RenderItemDesc::new(mesh, "anything");
        // Behind the default camera, which looks down -Z from z = 20
        desc.world = Mat4::from_translation(Vec3::new(0.0, 5.0, 80.0));
        let id = add_render_item(&mut renderer.scene, desc).expect("item");

        submit_frame(&mut renderer, DT).expect("frame");
        assert!(!item_drawn_last_frame(&renderer, id));

        set_frustum_culling(&mut renderer, false);
        let report = submit_frame(&mut renderer, DT).expect("frame").expect("not paused");
        assert!(item_drawn_last_frame(&renderer, id));
        assert!(!report.octree_rebuilt);
    }

    #[test]
    fn test_particle_controls() {
        let (mut renderer, _control) = renderer();
        set_particle_gravity(&mut renderer, Vec3::new(0.0, -1.0, 0.0));
        assert_eq!(renderer.particles.settings.force, Vec3::new(0.0, -1.0, 0.0));

        submit_frame(&mut renderer, 0.2).expect("frame");
        reset_particles(&mut renderer);
        assert!(renderer.particles.pending_clear);
        assert!(renderer.particles.shadow_life.iter().all(|life| *life == 0.0));
    }
}
