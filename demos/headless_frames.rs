//! Headless frame loop demo
//!
//! Builds a grid of boxes with a few bouncing lights and runs the full
//! deferred frame loop against the software backend, with artificial GPU
//! latency so the frame ring actually has to wait.
//!
//! Usage: cargo run --example headless_frames [config.toml]

use anyhow::Context;
use glam::{Mat4, Vec3};
use hearth_deferred::{
    camera::CameraTransformBatch,
    engine::{flush_renderer, load_geometry, spawn_dynamic_light},
    gpu::{headless_stats, HeadlessControl},
    math::create_aabb,
    scene::{add_render_item, register_material, register_mesh, spawn_light, DrawArgs, LightKind},
    create_headless_gpu, create_renderer, init_logging, load_content, run_content_frame, shutdown_renderer,
    EngineConfig, EngineResult, FrameInput, HeadlessConfig, HeadlessTimeline, LightDescriptor, MaterialDesc,
    MeshGeometry, Renderer, RenderItemDesc, SceneContent, Vertex,
};
use std::time::Duration;

const FRAMES: u32 = 180;
const GRID: i32 = 12;

fn box_geometry() -> MeshGeometry {
    let corners = [
        [-1.0, -1.0, -1.0],
        [1.0, -1.0, -1.0],
        [1.0, 1.0, -1.0],
        [-1.0, 1.0, -1.0],
        [-1.0, -1.0, 1.0],
        [1.0, -1.0, 1.0],
        [1.0, 1.0, 1.0],
        [-1.0, 1.0, 1.0],
    ];
    let vertices = corners
        .iter()
        .map(|p: &[f32; 3]| Vertex {
            position: *p,
            normal: Vec3::from_array(*p).normalize().to_array(),
            tex_coord: [(p[0] + 1.0) * 0.5, (p[1] + 1.0) * 0.5],
            tangent: [1.0, 0.0, 0.0],
        })
        .collect();
    let indices = vec![
        0, 2, 1, 0, 3, 2, // back
        4, 5, 6, 4, 6, 7, // front
        0, 1, 5, 0, 5, 4, // bottom
        3, 7, 6, 3, 6, 2, // top
        0, 4, 7, 0, 7, 3, // left
        1, 2, 6, 1, 6, 5, // right
    ];
    MeshGeometry {
        name: "box".to_string(),
        vertices,
        indices,
    }
}

struct BoxField;

impl SceneContent for BoxField {
    fn name(&self) -> &str {
        "box field"
    }

    fn build(&mut self, renderer: &mut Renderer) -> EngineResult<()> {
        let geometry = box_geometry();
        let geometry_id = load_geometry(renderer, &geometry)?;
        let mesh = register_mesh(
            &mut renderer.scene,
            "box",
            geometry_id,
            DrawArgs {
                index_count: geometry.indices.len() as u32,
                start_index: 0,
                base_vertex: 0,
            },
            create_aabb(Vec3::splat(-1.0), Vec3::ONE),
        );
        register_material(
            &mut renderer.scene,
            MaterialDesc {
                name: "stone".to_string(),
                diffuse_texture: Some("stone_diffuse".to_string()),
                ..Default::default()
            },
        )?;

        for x in -GRID..GRID {
            for z in -GRID..GRID {
                let mut desc = RenderItemDesc::new(mesh, "stone");
                desc.world = Mat4::from_translation(Vec3::new(x as f32 * 6.0, 0.0, z as f32 * 6.0));
                add_render_item(&mut renderer.scene, desc)?;
            }
        }

        spawn_light(
            &mut renderer.scene,
            LightDescriptor {
                kind: LightKind::Directional,
                direction: Vec3::new(0.3, -1.0, 0.2).normalize(),
                ..Default::default()
            },
            None,
            None,
        );
        for i in 0..6 {
            let angle = i as f32 * std::f32::consts::TAU / 6.0;
            spawn_dynamic_light(
                renderer,
                LightDescriptor {
                    position: Vec3::new(0.0, 4.0, 0.0),
                    ..Default::default()
                },
                Some(mesh),
                Vec3::new(angle.cos(), 0.0, angle.sin()) * 8.0,
            );
        }
        Ok(())
    }
}

fn print_stats(control: &HeadlessControl, renderer: &Renderer) {
    let stats = headless_stats(control);
    println!("Frames submitted:   {}", renderer.frames_submitted);
    println!("Ring waits:         {}", renderer.ring.ring_waits);
    println!("Ring rebuilds:      {}", renderer.ring.rebuilds);
    println!("Octree rebuilds:    {}", renderer.octree.rebuild_count);
    println!("GPU passes:         {}", stats.passes);
    println!("GPU draws:          {}", stats.draws);
    println!("Particle dispatches {}", stats.dispatches);
    println!("Fences completed:   {}", stats.fences_completed);
    println!("Validation errors:  {}", stats.validation_errors.len());
    println!("Average:            {:.1} fps, {:.2} ms/frame", renderer.timer.fps, renderer.timer.ms_per_frame);
}

fn main() -> anyhow::Result<()> {
    init_logging("info");

    let config = match std::env::args().nth(1) {
        Some(path) => EngineConfig::load(&path).with_context(|| format!("loading {}", path))?,
        None => EngineConfig::default(),
    };

    println!("Headless Deferred Frame Loop");
    println!("============================");

    let gpu = create_headless_gpu(HeadlessConfig {
        timeline: HeadlessTimeline::Latency(Duration::from_millis(4)),
        validate: true,
    })?;
    let control = gpu.clone_control();

    let mut renderer = create_renderer(config, Box::new(gpu))?;
    let mut content = BoxField;
    load_content(&mut renderer, &mut content)?;

    let input = FrameInput {
        delta_time: 1.0 / 60.0,
        camera: CameraTransformBatch {
            yaw_delta: 0.002,
            ..Default::default()
        },
    };

    let mut visible = 0;
    for _ in 0..FRAMES {
        if let Some(report) = run_content_frame(&mut renderer, &mut content, &input)? {
            visible = report.visibility.visible;
        }
    }
    flush_renderer(&mut renderer)?;

    println!("Visible items (last frame): {}", visible);
    print_stats(&control, &renderer);
    shutdown_renderer(&mut renderer)?;
    Ok(())
}
