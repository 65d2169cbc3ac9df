//! Driver / content boundary
//!
//! The only trait between the engine driver and what it draws. Content builds
//! its scene once and may edit it every frame; the frame loop itself stays a
//! fixed sequence of free functions.

use super::engine_data::{FrameInput, FrameReport, Renderer};
use super::engine_operations::{guarded, submit_frame};
use crate::camera::apply_transform_batch;
use crate::error::EngineResult;

pub trait SceneContent {
    /// Debug name used in logs
    fn name(&self) -> &str;

    /// Register geometry, materials, items and lights
    fn build(&mut self, renderer: &mut Renderer) -> EngineResult<()>;

    /// Per-frame scene edits, run before the frame is recorded
    fn update(&mut self, _renderer: &mut Renderer, _input: &FrameInput) -> EngineResult<()> {
        Ok(())
    }
}

pub fn load_content(renderer: &mut Renderer, content: &mut dyn SceneContent) -> EngineResult<()> {
    guarded(renderer, |r| content.build(r))?;
    log::info!(
        "[Engine::load_content] '{}' loaded: {} items, {} materials, {} lights",
        content.name(),
        renderer.scene.items.len(),
        renderer.scene.materials.len(),
        renderer.scene.lights.len()
    );
    Ok(())
}

/// Apply camera input, let the content update, then run the frame loop
pub fn run_content_frame(
    renderer: &mut Renderer,
    content: &mut dyn SceneContent,
    input: &FrameInput,
) -> EngineResult<Option<FrameReport>> {
    renderer.camera = apply_transform_batch(&renderer.camera, &input.camera, input.delta_time);
    guarded(renderer, |r| content.update(r, input))?;
    submit_frame(renderer, input.delta_time)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::CameraTransformBatch;
    use crate::config::EngineConfig;
    use crate::engine::{create_renderer, flush_renderer, load_geometry};
    use crate::gpu::{create_headless_gpu, headless_stats, HeadlessConfig};
    use crate::math::create_aabb;
    use crate::scene::{
        add_render_item, register_mesh, set_item_transform, DrawArgs, MeshGeometry, RenderItemDesc, RenderItemId,
    };
    use glam::{Mat4, Vec3};

    #[derive(Default)]
    struct Spinner {
        item: Option<RenderItemId>,
        angle: f32,
        updates: u32,
    }

    impl SceneContent for Spinner {
        fn name(&self) -> &str {
            "spinner"
        }

        fn build(&mut self, renderer: &mut Renderer) -> EngineResult<()> {
            let geometry = load_geometry(renderer, &MeshGeometry::default())?;
            let mesh = register_mesh(
                &mut renderer.scene,
                "cube",
                geometry,
                DrawArgs {
                    index_count: 36,
                    start_index: 0,
                    base_vertex: 0,
                },
                create_aabb(Vec3::splat(-1.0), Vec3::ONE),
            );
            self.item = Some(add_render_item(&mut renderer.scene, RenderItemDesc::new(mesh, "default"))?);
            Ok(())
        }

        fn update(&mut self, renderer: &mut Renderer, input: &FrameInput) -> EngineResult<()> {
            self.updates += 1;
            self.angle += input.delta_time;
            if let Some(item) = self.item {
                set_item_transform(&mut renderer.scene, item, Mat4::from_rotation_y(self.angle))?;
            }
            Ok(())
        }
    }

    #[test]
    fn test_content_drives_frames() {
        let gpu = create_headless_gpu(HeadlessConfig::default()).expect("headless gpu");
        let control = gpu.clone_control();
        let config = EngineConfig {
            window_width: 128,
            window_height: 128,
            particle_capacity: 64,
            ..Default::default()
        };
        let mut renderer = create_renderer(config, Box::new(gpu)).expect("renderer");
        let mut content = Spinner::default();
        load_content(&mut renderer, &mut content).expect("build");

        let input = FrameInput {
            delta_time: 1.0 / 30.0,
            camera: CameraTransformBatch {
                forward_delta: 1.0,
                ..Default::default()
            },
        };
        let start = renderer.camera.position;
        for _ in 0..4 {
            run_content_frame(&mut renderer, &mut content, &input).expect("frame");
        }
        flush_renderer(&mut renderer).expect("flush");

        assert_eq!(content.updates, 4);
        assert!(renderer.camera.position.distance(start) > 0.0);
        let stats = headless_stats(&control);
        assert_eq!(stats.geometries_uploaded, 1);
        assert!(stats.validation_errors.is_empty());
    }
}
