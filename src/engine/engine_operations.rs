//! Engine orchestrator operations - Pure functions for the frame loop
//!
//! `submit_frame` is the fixed-function frame loop. Each step reads and
//! writes plain subsystem data; the only dynamic dispatch is the backend.
//! Any fatal error moves the renderer to `EngineState::DeviceLost` and the
//! loop refuses to run from then on.

use glam::Vec4;

use super::engine_data::{EngineState, FrameReport, FrameTimer, Renderer, ResizeState};
use crate::camera::init_camera_from_config;
use crate::config::EngineConfig;
use crate::constants::descriptors::ERROR_TEXTURE_SLOT;
use crate::constants::frame::CAPACITY_GROWTH_HEADROOM;
use crate::error::{EngineError, EngineResult};
use crate::frame::{
    acquire_frame, complete_frame, create_frame_ring, current_frame_mut, drain_changes, ensure_capacity,
    frame_count, mark_all_dirty, propagate_dirty_constants, write_constant, build_pass_constants, FrameCapacity,
};
use crate::gpu::{create_sync_gate, flush, signal, GpuBackend};
use crate::particles::{create_particle_system, update_emission};
use crate::render_graph::{
    create_pipeline_library, create_target_set, record_frame, rotate_back_buffer, FrameRecordContext, RenderSettings,
};
use crate::scene::{
    create_scene, error_texture, integrate_dynamic_lights, register_geometry, register_texture,
    required_frame_capacity, validate_texture_upload, GeometryId, MeshGeometry, RenderItemId, TextureSlot,
    TextureUpload,
};
use crate::spatial::{create_octree_from_config, ensure_octree};
use crate::visibility::{apply_lod_selection, is_item_visible, resolve_draw_list, DrawList};

/// Side of the generated checkerboard fallback texture
const ERROR_TEXTURE_SIZE: u32 = 64;
const ERROR_TEXTURE_CELL: u32 = 8;

/// Ambient term written into the pass constants until the host changes it
pub const DEFAULT_AMBIENT_LIGHT: Vec4 = Vec4::new(0.25, 0.25, 0.35, 1.0);

// ============================================================================
// CREATION
// ============================================================================

pub fn render_settings_from_config(config: &EngineConfig) -> RenderSettings {
    RenderSettings {
        wireframe: config.wireframe,
        frustum_culling: config.frustum_culling,
        lod_threshold: config.lod_threshold,
        debug_light_volumes: config.debug_light_volumes,
        msaa_4x: config.msaa_4x,
        clear_color: config.clear_color,
    }
}

pub fn sample_count_for(msaa_4x: bool) -> u32 {
    if msaa_4x {
        4
    } else {
        1
    }
}

fn with_headroom(need: FrameCapacity) -> FrameCapacity {
    FrameCapacity {
        objects: need.objects + CAPACITY_GROWTH_HEADROOM,
        materials: need.materials + CAPACITY_GROWTH_HEADROOM,
        lights: need.lights + CAPACITY_GROWTH_HEADROOM,
    }
}

/// Build every subsystem and create its device objects.
///
/// Any failure here is returned as is; there is no partially built renderer.
pub fn create_renderer(config: EngineConfig, mut backend: Box<dyn GpuBackend>) -> EngineResult<Renderer> {
    config.validate()?;

    let scene = create_scene();
    backend.upload_texture(
        TextureSlot(ERROR_TEXTURE_SLOT),
        &error_texture(ERROR_TEXTURE_SIZE, ERROR_TEXTURE_CELL),
    )?;

    let capacity = with_headroom(required_frame_capacity(&scene));
    let ring = create_frame_ring(config.frame_resource_count, capacity)?;
    backend.configure_frame_resources(config.frame_resource_count, &capacity)?;

    let settings = render_settings_from_config(&config);
    let sample_count = sample_count_for(settings.msaa_4x);
    let targets = create_target_set(
        config.window_width,
        config.window_height,
        config.swap_chain_buffer_count,
        sample_count,
    )?;
    backend.configure_targets(&targets)?;

    let particles = create_particle_system(&config);
    backend.configure_particles(particles.capacity)?;

    let library = create_pipeline_library(backend.as_mut(), sample_count)?;

    log::info!(
        "[Engine::create_renderer] {} backend, {}x{} ({}x samples), {} frame slots, {} particles",
        backend.backend_name(),
        targets.width,
        targets.height,
        sample_count,
        config.frame_resource_count,
        particles.capacity
    );

    Ok(Renderer {
        camera: init_camera_from_config(&config),
        octree: create_octree_from_config(&config),
        state: EngineState::Ready,
        backend,
        gate: create_sync_gate(),
        ring,
        scene,
        particles,
        library,
        targets,
        settings,
        resize: ResizeState::default(),
        timer: FrameTimer::default(),
        draw_list: DrawList::default(),
        total_time: 0.0,
        ambient_light: DEFAULT_AMBIENT_LIGHT,
        frames_submitted: 0,
        config,
    })
}

// ============================================================================
// STATE GUARDS
// ============================================================================

/// Fail with `InvalidState` once the device is gone
pub fn ensure_device_alive(renderer: &Renderer) -> EngineResult<()> {
    if renderer.state == EngineState::DeviceLost {
        return Err(EngineError::InvalidState {
            expected: "Ready or Paused".to_string(),
            actual: renderer.state.name().to_string(),
        });
    }
    Ok(())
}

/// Move to the terminal state on a fatal error, then hand the error back
pub fn note_error(renderer: &mut Renderer, error: EngineError) -> EngineError {
    if error.is_fatal() && renderer.state != EngineState::DeviceLost {
        log::error!("[Engine::note_error] Fatal device error, renderer stopped: {}", error);
        renderer.state = EngineState::DeviceLost;
    }
    error
}

/// Run `step` and route its error through `note_error`
pub fn guarded<T>(renderer: &mut Renderer, step: impl FnOnce(&mut Renderer) -> EngineResult<T>) -> EngineResult<T> {
    ensure_device_alive(renderer)?;
    match step(renderer) {
        Ok(value) => Ok(value),
        Err(error) => Err(note_error(renderer, error)),
    }
}

// ============================================================================
// FRAME LOOP
// ============================================================================

/// Run one frame. Returns `None` while paused.
pub fn submit_frame(renderer: &mut Renderer, delta_time: f32) -> EngineResult<Option<FrameReport>> {
    ensure_device_alive(renderer)?;
    if renderer.state == EngineState::Paused {
        log::debug!("[Engine::submit_frame] Paused, frame skipped");
        return Ok(None);
    }
    guarded(renderer, |r| run_frame(r, delta_time)).map(Some)
}

fn run_frame(renderer: &mut Renderer, delta_time: f32) -> EngineResult<FrameReport> {
    if let Some(reason) = renderer.backend.device_lost_reason() {
        return Err(EngineError::device_lost(reason));
    }

    let lights_moving = integrate_dynamic_lights(&mut renderer.scene, delta_time, renderer.config.light_rest_speed);

    // Entity counts may have grown since the last frame
    let need = required_frame_capacity(&renderer.scene);
    let ring_rebuilt = ensure_capacity(&mut renderer.ring, &need, &mut renderer.gate, renderer.backend.as_mut())?;
    let slot_count = frame_count(&renderer.ring) as u32;
    if ring_rebuilt {
        mark_all_dirty(&mut renderer.scene, slot_count);
    }

    let slot = acquire_frame(&mut renderer.ring, &mut renderer.gate, renderer.backend.as_mut())?;
    drain_changes(&mut renderer.scene, slot_count);

    renderer.total_time += delta_time;
    let pass = build_pass_constants(
        &renderer.camera,
        (renderer.targets.width, renderer.targets.height),
        renderer.total_time,
        delta_time,
        renderer.ambient_light,
    );

    let frame = current_frame_mut(&mut renderer.ring);
    let propagation = propagate_dirty_constants(&mut renderer.scene, frame)?;
    write_constant(&mut frame.pass, 0, pass)?;

    let octree_rebuilt = renderer.settings.frustum_culling && ensure_octree(&mut renderer.octree, &renderer.scene);
    let draw_list = resolve_draw_list(&renderer.octree, &renderer.scene, &renderer.camera, &renderer.settings);
    apply_lod_selection(&mut renderer.scene, &draw_list);

    let particles_emitted = update_emission(&mut renderer.particles, delta_time);

    let ctx = FrameRecordContext {
        scene: &renderer.scene,
        draw_list: &draw_list,
        pipelines: &renderer.library,
        targets: &renderer.targets,
        settings: &renderer.settings,
        delta_time,
    };
    let recorded = record_frame(&mut frame.allocator, &ctx, &mut renderer.particles);

    let mut lists = Vec::with_capacity(2);
    if let Some(scene_list) = recorded.scene {
        lists.push(scene_list);
    }
    lists.push(recorded.ui);
    renderer.backend.submit(&*frame, lists)?;

    let fence = signal(&mut renderer.gate, renderer.backend.as_mut())?;
    complete_frame(&mut renderer.ring, fence);

    renderer.backend.present(renderer.targets.current_back_buffer)?;
    rotate_back_buffer(&mut renderer.targets);

    renderer.frames_submitted += 1;
    if update_frame_timer(&mut renderer.timer, delta_time) {
        log::debug!(
            "[Engine::submit_frame] {:.1} fps, {:.2} ms/frame",
            renderer.timer.fps,
            renderer.timer.ms_per_frame
        );
    }

    let report = FrameReport {
        frame_index: renderer.frames_submitted,
        slot,
        fence,
        visibility: draw_list.stats,
        draws: recorded.draws,
        propagation,
        ring_rebuilt,
        octree_rebuilt,
        ring_waits: renderer.ring.ring_waits,
        particles_emitted,
        lights_moving,
        scene_error: recorded.scene_error,
    };
    renderer.draw_list = draw_list;
    Ok(report)
}

/// Accumulate one frame. Returns true when a one-second window closed
pub fn update_frame_timer(timer: &mut FrameTimer, delta_time: f32) -> bool {
    timer.total_frames += 1;
    timer.window_frames += 1;
    timer.window_elapsed += delta_time.max(0.0);

    if timer.window_elapsed < 1.0 {
        return false;
    }

    timer.fps = timer.window_frames as f32 / timer.window_elapsed;
    timer.ms_per_frame = if timer.fps > 0.0 { 1000.0 / timer.fps } else { 0.0 };
    timer.window_frames = 0;
    timer.window_elapsed = 0.0;
    true
}

// ============================================================================
// ASSETS
// ============================================================================

/// Register a loaded model and create its device buffers
pub fn load_geometry(renderer: &mut Renderer, geometry: &MeshGeometry) -> EngineResult<GeometryId> {
    guarded(renderer, |r| {
        let id = register_geometry(&mut r.scene, geometry);
        r.backend.upload_geometry(id, geometry)?;
        Ok(id)
    })
}

/// Assign a descriptor slot to a decoded texture and upload it.
///
/// Corrupt data or a full descriptor table degrade to the error texture
/// slot; only device failures come back as errors.
pub fn load_texture(renderer: &mut Renderer, texture: &TextureUpload) -> EngineResult<TextureSlot> {
    ensure_device_alive(renderer)?;
    let slot = match validate_texture_upload(texture).and_then(|_| register_texture(&mut renderer.scene, &texture.name)) {
        Ok(slot) => slot,
        Err(error) => {
            log::warn!("[Engine::load_texture] {}, using error texture", error);
            return Ok(TextureSlot(ERROR_TEXTURE_SLOT));
        }
    };
    guarded(renderer, |r| {
        r.backend.upload_texture(slot, texture)?;
        Ok(slot)
    })
}

// ============================================================================
// QUERIES AND SHUTDOWN
// ============================================================================

/// Whether `id` was drawn in the last submitted frame
pub fn item_drawn_last_frame(renderer: &Renderer, id: RenderItemId) -> bool {
    is_item_visible(&renderer.draw_list, id)
}

/// Block until every submitted frame has retired
pub fn flush_renderer(renderer: &mut Renderer) -> EngineResult<()> {
    guarded(renderer, |r| flush(&mut r.gate, r.backend.as_mut()).map(|_| ()))
}

/// Drain the queue before the renderer is dropped. A lost device is not an error here
pub fn shutdown_renderer(renderer: &mut Renderer) -> EngineResult<()> {
    if renderer.state == EngineState::DeviceLost {
        log::warn!("[Engine::shutdown_renderer] Device already lost, skipping flush");
        return Ok(());
    }
    flush_renderer(renderer)?;
    log::info!(
        "[Engine::shutdown_renderer] Shut down after {} frames ({} ring waits)",
        renderer.frames_submitted,
        renderer.ring.ring_waits
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::{
        create_headless_gpu, headless_stats, release_fences_through, simulate_device_loss, HeadlessConfig,
        HeadlessControl, HeadlessTimeline,
    };
    use crate::math::create_aabb;
    use crate::scene::{
        add_render_item, register_material, register_mesh, set_item_transform, spawn_light, DrawArgs,
        LightDescriptor, LightKind, MaterialDesc, RenderItemDesc,
    };
    use glam::{Mat4, Vec3};
    use std::thread;
    use std::time::Duration;

    const DT: f32 = 1.0 / 60.0;

    fn small_config() -> EngineConfig {
        EngineConfig {
            window_width: 320,
            window_height: 240,
            particle_capacity: 256,
            ..Default::default()
        }
    }

    fn headless_renderer(timeline: HeadlessTimeline) -> (Renderer, HeadlessControl) {
        let gpu = create_headless_gpu(HeadlessConfig {
            timeline,
            validate: true,
        })
        .expect("headless gpu");
        let control = gpu.clone_control();
        let renderer = create_renderer(small_config(), Box::new(gpu)).expect("renderer");
        (renderer, control)
    }

    fn populate(renderer: &mut Renderer) -> Vec<RenderItemId> {
        let geometry = load_geometry(renderer, &MeshGeometry::default()).expect("geometry");
        let cube = register_mesh(
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
        register_material(
            &mut renderer.scene,
            MaterialDesc {
                name: "stone".to_string(),
                ..Default::default()
            },
        )
        .expect("material");

        let mut ids = Vec::new();
        for i in 0..12 {
            let mut desc = RenderItemDesc::new(cube, "stone");
            desc.world = Mat4::from_translation(Vec3::new((i % 4) as f32 * 3.0 - 4.5, 0.0, -(i / 4) as f32 * 4.0));
            ids.push(add_render_item(&mut renderer.scene, desc).expect("item"));
        }
        spawn_light(
            &mut renderer.scene,
            LightDescriptor {
                kind: LightKind::Ambient,
                ..Default::default()
            },
            None,
            None,
        );
        spawn_light(&mut renderer.scene, LightDescriptor::default(), Some(cube), None);
        ids
    }

    #[test]
    fn test_frames_validate_clean() {
        let (mut renderer, control) = headless_renderer(HeadlessTimeline::Immediate);
        populate(&mut renderer);

        for _ in 0..6 {
            let report = submit_frame(&mut renderer, DT).expect("frame").expect("not paused");
            assert!(report.scene_error.is_none());
            assert!(report.draws.geometry > 0);
        }
        flush_renderer(&mut renderer).expect("flush");

        let stats = headless_stats(&control);
        assert!(stats.validation_errors.is_empty(), "{:?}", stats.validation_errors);
        assert_eq!(stats.presents, 6);
        assert_eq!(stats.submissions, 6);
        assert_eq!(renderer.frames_submitted, 6);
    }

    #[test]
    fn test_first_frame_grows_ring_for_scene() {
        let (mut renderer, _control) = headless_renderer(HeadlessTimeline::Immediate);
        populate(&mut renderer);

        let first = submit_frame(&mut renderer, DT).expect("frame").expect("not paused");
        assert!(first.ring_rebuilt);
        assert!(first.octree_rebuilt);
        assert_eq!(first.propagation.objects_written, 12);

        let second = submit_frame(&mut renderer, DT).expect("frame").expect("not paused");
        assert!(!second.ring_rebuilt);
        assert!(!second.octree_rebuilt);
    }

    #[test]
    fn test_edit_propagates_to_every_slot_then_stops() {
        let (mut renderer, _control) = headless_renderer(HeadlessTimeline::Immediate);
        let ids = populate(&mut renderer);
        for _ in 0..4 {
            submit_frame(&mut renderer, DT).expect("frame");
        }

        set_item_transform(&mut renderer.scene, ids[0], Mat4::from_translation(Vec3::new(0.0, 1.0, -2.0)))
            .expect("edit");
        let slots = frame_count(&renderer.ring);
        let mut written = Vec::new();
        for _ in 0..slots + 1 {
            let report = submit_frame(&mut renderer, DT).expect("frame").expect("not paused");
            written.push((report.slot, report.propagation.objects_written));
        }

        let touched: Vec<usize> = written.iter().filter(|(_, n)| *n == 1).map(|(s, _)| *s).collect();
        assert_eq!(touched.len(), slots);
        let mut distinct = touched.clone();
        distinct.sort_unstable();
        distinct.dedup();
        assert_eq!(distinct.len(), slots);
        assert_eq!(written[slots].1, 0);
        assert_eq!(renderer.scene.items[ids[0].0 as usize].dirty_frames, 0);
    }

    #[test]
    fn test_paused_renderer_skips_frames() {
        let (mut renderer, control) = headless_renderer(HeadlessTimeline::Immediate);
        renderer.state = EngineState::Paused;
        assert!(submit_frame(&mut renderer, DT).expect("paused frame").is_none());
        assert_eq!(headless_stats(&control).submissions, 0);
    }

    #[test]
    fn test_device_loss_is_terminal() {
        let (mut renderer, control) = headless_renderer(HeadlessTimeline::Immediate);
        populate(&mut renderer);
        submit_frame(&mut renderer, DT).expect("frame");

        simulate_device_loss(&control, "adapter removed");
        let error = submit_frame(&mut renderer, DT).expect_err("lost device");
        assert!(error.is_fatal());
        assert_eq!(renderer.state, EngineState::DeviceLost);

        match submit_frame(&mut renderer, DT) {
            Err(EngineError::InvalidState { actual, .. }) => assert_eq!(actual, "DeviceLost"),
            other => panic!("expected InvalidState, got {:?}", other),
        }
        assert!(shutdown_renderer(&mut renderer).is_ok());
    }

    #[test]
    fn test_manual_timeline_blocks_on_reused_slot() {
        let (mut renderer, control) = headless_renderer(HeadlessTimeline::Manual);
        populate(&mut renderer);

        // Frame 1 flushes for the ring rebuild, so fences must be released from elsewhere
        let releaser = control.clone();
        let worker = thread::spawn(move || {
            for value in 1..=8 {
                thread::sleep(Duration::from_millis(30));
                release_fences_through(&releaser, value);
            }
        });

        for _ in 0..5 {
            submit_frame(&mut renderer, DT).expect("frame");
        }
        worker.join().expect("releaser");
        assert!(renderer.ring.ring_waits >= 1);
        flush_renderer(&mut renderer).expect("flush");
        assert!(headless_stats(&control).validation_errors.is_empty());
    }

    #[test]
    fn test_frame_timer_windows() {
        let mut timer = FrameTimer::default();
        let mut closed = 0;
        for _ in 0..120 {
            if update_frame_timer(&mut timer, 1.0 / 60.0) {
                closed += 1;
            }
        }
        assert!(closed >= 1);
        assert!((timer.fps - 60.0).abs() < 1.5, "fps {}", timer.fps);
        assert!((timer.ms_per_frame - 16.67).abs() < 0.5);
        assert_eq!(timer.total_frames, 120);
    }

    #[test]
    fn test_load_texture_uses_next_slot() {
        let (mut renderer, control) = headless_renderer(HeadlessTimeline::Immediate);
        let upload = TextureUpload {
            name: "bricks".to_string(),
            width: 2,
            height: 2,
            rgba8: vec![255; 16],
        };
        let slot = load_texture(&mut renderer, &upload).expect("texture");
        assert_ne!(slot.0, ERROR_TEXTURE_SLOT);
        // error texture plus this one
        assert_eq!(headless_stats(&control).textures_uploaded, 2);
    }

    #[test]
    fn test_corrupt_texture_degrades_to_error_slot() {
        let (mut renderer, control) = headless_renderer(HeadlessTimeline::Immediate);
        populate(&mut renderer);
        let upload = TextureUpload {
            name: "bricks".to_string(),
            width: 4,
            height: 4,
            rgba8: vec![0; 3],
        };

        let slot = load_texture(&mut renderer, &upload).expect("degraded, not an error");
        assert_eq!(slot.0, ERROR_TEXTURE_SLOT);
        assert_eq!(renderer.state, EngineState::Ready);
        // the name never got a slot of its own
        assert!(!renderer.scene.textures.by_name.contains_key("bricks"));
        assert_eq!(headless_stats(&control).textures_uploaded, 1);

        assert!(submit_frame(&mut renderer, DT).expect("frame").is_some());
        assert!(headless_stats(&control).validation_errors.is_empty());
    }

    #[test]
    fn test_full_descriptor_table_degrades_to_error_slot() {
        let (mut renderer, _control) = headless_renderer(HeadlessTimeline::Immediate);
        renderer.scene.textures.capacity = 2;
        let texture = |name: &str| TextureUpload {
            name: name.to_string(),
            width: 1,
            height: 1,
            rgba8: vec![255; 4],
        };

        let first = load_texture(&mut renderer, &texture("one")).expect("first");
        assert_eq!(first.0, 1);
        let second = load_texture(&mut renderer, &texture("two")).expect("degraded");
        assert_eq!(second.0, ERROR_TEXTURE_SLOT);
        assert_eq!(renderer.state, EngineState::Ready);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let gpu = create_headless_gpu(HeadlessConfig::default()).expect("headless gpu");
        let config = EngineConfig {
            frame_resource_count: 9,
            ..small_config()
        };
        assert!(matches!(
            create_renderer(config, Box::new(gpu)),
            Err(EngineError::InvalidConfig { .. })
        ));
    }
}
