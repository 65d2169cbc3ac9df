//! Deferred frame graph
//!
//! Fixed pass order per frame:
//!
//! 1. particle simulation (compute, ping-pong)
//! 2. geometry pass into three G-buffers plus depth
//! 3. G-buffers and depth to shader-readable
//! 4. lighting pass, additive, one proxy draw per light
//! 5. debug light volumes and particles into the lit target
//! 6. G-buffers and depth back to writable
//! 7. post-process from the lit target into the back buffer
//! 8. UI into the back buffer, in its own command list
//!
//! Every resource ends the frame in the state it started in, so frames can
//! be recorded independently of each other.

use super::graph_data::{FrameRecordContext, PassDrawCounts, RecordedFrame, RenderSettings, ScenePipelines};
use super::pipeline_library::{geometry_pipeline_key, light_pipeline_key, pipeline_handle, PipelineKey, PipelineLibrary};
use super::target_operations::current_back_buffer;
use crate::error::EngineResult;
use crate::gpu::{
    close_command_list, open_command_list, record, CommandAllocator, CommandList, DepthAttachment, DrawIndexedArgs,
    GBufferSlot, GpuCommand, LightProxy, PassDesc, PassKind, PipelineHandle, ResourceId, ResourceState,
};
use crate::particles::{record_particle_render, record_particle_simulate, ParticleSystem};
use crate::scene::{SceneData, TextureSlot};
use crate::visibility::DrawItem;

const LIT_CLEAR: [f32; 4] = [0.0, 0.0, 0.0, 1.0];

// ============================================================================
// PIPELINE RESOLUTION
// ============================================================================

/// Resolve every handle up front so recording itself cannot fail halfway
pub fn resolve_scene_pipelines(library: &PipelineLibrary, settings: &RenderSettings) -> EngineResult<ScenePipelines> {
    Ok(ScenePipelines {
        geometry_opaque: pipeline_handle(library, geometry_pipeline_key(false, settings.wireframe))?,
        geometry_tessellated: pipeline_handle(library, geometry_pipeline_key(true, settings.wireframe))?,
        light_fullscreen: pipeline_handle(library, PipelineKey::LightFullscreen)?,
        light_sphere: pipeline_handle(library, PipelineKey::LightVolumeSphere)?,
        light_cylinder: pipeline_handle(library, PipelineKey::LightVolumeCylinder)?,
        light_debug: if settings.debug_light_volumes {
            Some(pipeline_handle(library, PipelineKey::LightVolumeDebug)?)
        } else {
            None
        },
        particle_simulate: pipeline_handle(library, PipelineKey::ParticleSimulate)?,
        particle_render: pipeline_handle(library, PipelineKey::ParticleRender)?,
        post_process: pipeline_handle(library, PipelineKey::PostProcess)?,
    })
}

// ============================================================================
// HELPERS
// ============================================================================

fn transition(list: &mut CommandList, resource: ResourceId, before: ResourceState, after: ResourceState) {
    record(list, GpuCommand::Transition { resource, before, after });
}

fn gbuffer_targets() -> Vec<ResourceId> {
    GBufferSlot::ALL.iter().map(|slot| ResourceId::GBuffer(*slot)).collect()
}

/// G-buffers and depth between the geometry and lighting passes
fn transition_gbuffers(list: &mut CommandList, to_readable: bool) {
    let (color_from, color_to, depth_from, depth_to) = if to_readable {
        (
            ResourceState::RenderTarget,
            ResourceState::ShaderResource,
            ResourceState::DepthWrite,
            ResourceState::DepthRead,
        )
    } else {
        (
            ResourceState::ShaderResource,
            ResourceState::RenderTarget,
            ResourceState::DepthRead,
            ResourceState::DepthWrite,
        )
    };
    for target in gbuffer_targets() {
        transition(list, target, color_from, color_to);
    }
    transition(list, ResourceId::DepthStencil, depth_from, depth_to);
}

fn draw_item_command(scene: &SceneData, draw: &DrawItem) -> GpuCommand {
    let texture_slot = scene
        .materials
        .get(draw.material.0 as usize)
        .map(|m| m.diffuse_slot)
        .unwrap_or(TextureSlot(0));
    GpuCommand::DrawIndexed(DrawIndexedArgs {
        geometry: draw.geometry,
        args: draw.args,
        object_index: draw.item.0,
        material_index: draw.material.0,
        texture_slot,
    })
}

// ============================================================================
// PASSES
// ============================================================================

fn record_geometry_pass(
    list: &mut CommandList,
    ctx: &FrameRecordContext,
    pipelines: &ScenePipelines,
    draws: &mut PassDrawCounts,
) {
    record(
        list,
        GpuCommand::BeginPass(PassDesc {
            kind: PassKind::Geometry,
            color_targets: gbuffer_targets(),
            depth: Some(DepthAttachment {
                resource: ResourceId::DepthStencil,
                read_only: false,
                clear: Some(1.0),
            }),
            reads: Vec::new(),
            clear_color: Some(ctx.settings.clear_color),
        }),
    );

    let buckets = [
        (&ctx.draw_list.opaque, pipelines.geometry_opaque),
        (&ctx.draw_list.tessellated, pipelines.geometry_tessellated),
    ];
    for (bucket, pipeline) in buckets {
        if bucket.is_empty() {
            continue;
        }
        record(list, GpuCommand::SetPipeline(pipeline));
        for draw in bucket.iter() {
            record(list, draw_item_command(ctx.scene, draw));
            draws.geometry += 1;
        }
    }

    record(list, GpuCommand::EndPass);
}

/// One draw per live light with the proxy its type calls for
fn record_light_draws(list: &mut CommandList, scene: &SceneData, pipelines: &ScenePipelines) -> u32 {
    let mut bound: Option<PipelineHandle> = None;
    let mut count = 0;

    for light in scene.lights.iter().filter_map(|entry| entry.item.as_ref()) {
        let proxy_geometry = light.proxy_mesh.and_then(|id| {
            let found = scene.meshes.get(id.0 as usize).map(|m| (m.geometry, m.args));
            if found.is_none() {
                log::warn!("[FrameGraph::record_light_draws] Light slot {} has unknown proxy mesh {}", light.slot, id.0);
            }
            found
        });

        let (key, proxy) = light_pipeline_key(light.descriptor.kind, proxy_geometry.is_some());
        let pipeline = match key {
            PipelineKey::LightVolumeSphere => pipelines.light_sphere,
            PipelineKey::LightVolumeCylinder => pipelines.light_cylinder,
            _ => pipelines.light_fullscreen,
        };
        if bound != Some(pipeline) {
            record(list, GpuCommand::SetPipeline(pipeline));
            bound = Some(pipeline);
        }

        let geometry = match proxy {
            LightProxy::FullscreenQuad => None,
            _ => proxy_geometry,
        };
        record(
            list,
            GpuCommand::DrawLight {
                proxy,
                geometry,
                light_index: light.slot,
            },
        );
        count += 1;
    }
    count
}

fn record_debug_volumes(list: &mut CommandList, scene: &SceneData, pipeline: PipelineHandle) -> u32 {
    record(list, GpuCommand::SetPipeline(pipeline));
    let mut count = 0;
    for light in scene.lights.iter().filter_map(|entry| entry.item.as_ref()) {
        let Some(mesh) = light.proxy_mesh.and_then(|id| scene.meshes.get(id.0 as usize)) else {
            continue;
        };
        let (_, proxy) = light_pipeline_key(light.descriptor.kind, true);
        record(
            list,
            GpuCommand::DrawLight {
                proxy,
                geometry: Some((mesh.geometry, mesh.args)),
                light_index: light.slot,
            },
        );
        count += 1;
    }
    count
}

fn record_lighting_pass(
    list: &mut CommandList,
    ctx: &FrameRecordContext,
    pipelines: &ScenePipelines,
    particles: &ParticleSystem,
    draws: &mut PassDrawCounts,
) {
    let mut reads = gbuffer_targets();
    reads.push(ResourceId::DepthStencil);
    reads.push(ResourceId::Particles(particles.current));

    record(
        list,
        GpuCommand::BeginPass(PassDesc {
            kind: PassKind::Lighting,
            color_targets: vec![ResourceId::LitTarget],
            depth: Some(DepthAttachment {
                resource: ResourceId::DepthStencil,
                read_only: true,
                clear: None,
            }),
            reads,
            clear_color: Some(LIT_CLEAR),
        }),
    );

    draws.lighting += record_light_draws(list, ctx.scene, pipelines);

    if let Some(debug) = pipelines.light_debug {
        draws.overlay += record_debug_volumes(list, ctx.scene, debug);
    }
    record_particle_render(particles, list, pipelines.particle_render);
    draws.overlay += 1;

    record(list, GpuCommand::EndPass);
}

fn record_post_process_pass(
    list: &mut CommandList,
    back_buffer: ResourceId,
    pipelines: &ScenePipelines,
    draws: &mut PassDrawCounts,
) {
    transition(list, ResourceId::LitTarget, ResourceState::RenderTarget, ResourceState::ShaderResource);
    transition(list, back_buffer, ResourceState::Present, ResourceState::RenderTarget);

    record(
        list,
        GpuCommand::BeginPass(PassDesc {
            kind: PassKind::PostProcess,
            color_targets: vec![back_buffer],
            depth: None,
            reads: vec![ResourceId::LitTarget],
            clear_color: None,
        }),
    );
    record(list, GpuCommand::SetPipeline(pipelines.post_process));
    record(list, GpuCommand::DrawFullscreen);
    draws.post_process += 1;
    record(list, GpuCommand::EndPass);

    transition(list, ResourceId::LitTarget, ResourceState::ShaderResource, ResourceState::RenderTarget);
    transition(list, back_buffer, ResourceState::RenderTarget, ResourceState::Present);
}

/// Record the 3D passes into `list`. Steps the particle system
pub fn record_scene_passes(
    list: &mut CommandList,
    ctx: &FrameRecordContext,
    pipelines: &ScenePipelines,
    particles: &mut ParticleSystem,
) -> PassDrawCounts {
    let mut draws = PassDrawCounts::default();

    record_particle_simulate(particles, list, pipelines.particle_simulate, ctx.delta_time);
    draws.particle_dispatches += 1;

    record(
        list,
        GpuCommand::SetViewport {
            width: ctx.targets.width,
            height: ctx.targets.height,
        },
    );
    record_geometry_pass(list, ctx, pipelines, &mut draws);
    transition_gbuffers(list, true);
    record_lighting_pass(list, ctx, pipelines, particles, &mut draws);
    transition_gbuffers(list, false);
    record_post_process_pass(list, current_back_buffer(ctx.targets), pipelines, &mut draws);

    draws
}

/// UI into the back buffer. Clears first when no 3D image was produced
pub fn record_ui_pass(list: &mut CommandList, ctx: &FrameRecordContext, clear: bool) -> u32 {
    let back_buffer = current_back_buffer(ctx.targets);
    transition(list, back_buffer, ResourceState::Present, ResourceState::RenderTarget);
    record(
        list,
        GpuCommand::BeginPass(PassDesc {
            kind: PassKind::Ui,
            color_targets: vec![back_buffer],
            depth: None,
            reads: Vec::new(),
            clear_color: clear.then_some(ctx.settings.clear_color),
        }),
    );

    let mut count = 0;
    match pipeline_handle(ctx.pipelines, PipelineKey::Ui) {
        Ok(ui) => {
            record(list, GpuCommand::SetPipeline(ui));
            record(list, GpuCommand::DrawUi);
            count += 1;
        }
        Err(error) => log::warn!("[FrameGraph::record_ui_pass] UI skipped: {}", error),
    }

    record(list, GpuCommand::EndPass);
    transition(list, back_buffer, ResourceState::RenderTarget, ResourceState::Present);
    count
}

/// Record one whole frame on `allocator`.
///
/// A 3D failure (missing pipeline) drops the scene list and is reported in
/// the result; the UI list is recorded either way.
pub fn record_frame(
    allocator: &mut CommandAllocator,
    ctx: &FrameRecordContext,
    particles: &mut ParticleSystem,
) -> RecordedFrame {
    let (scene, mut draws, scene_error) = match resolve_scene_pipelines(ctx.pipelines, ctx.settings) {
        Ok(pipelines) => {
            let mut list = open_command_list(allocator, "scene");
            let draws = record_scene_passes(&mut list, ctx, &pipelines, particles);
            close_command_list(allocator, &list);
            (Some(list), draws, None)
        }
        Err(error) => {
            log::warn!("[FrameGraph::record_frame] 3D passes skipped: {}", error);
            (None, PassDrawCounts::default(), Some(error.to_string()))
        }
    };

    let mut ui = open_command_list(allocator, "ui");
    draws.ui = record_ui_pass(&mut ui, ctx, scene.is_none());
    close_command_list(allocator, &ui);

    log::debug!(
        "[FrameGraph::record_frame] geometry {} lighting {} overlay {} post {} ui {}",
        draws.geometry,
        draws.lighting,
        draws.overlay,
        draws.post_process,
        draws.ui
    );

    RecordedFrame {
        scene,
        ui,
        draws,
        scene_error,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::gpu::{create_command_allocator, create_headless_gpu, count_draws_in_pass, pass_sequence, HeadlessConfig};
    use crate::math::create_aabb;
    use crate::particles::create_particle_system;
    use crate::render_graph::{
        create_pipeline_library, create_pipeline_library_for, create_state_tracker, create_target_set,
        diff_states, initial_resource_states, validate_command_list, TargetSet,
    };
    use crate::scene::{
        add_render_item, create_scene, register_geometry, register_mesh, spawn_light, DrawArgs, LightDescriptor,
        LightKind, MeshGeometry, MeshId, RenderItemDesc,
    };
    use crate::visibility::{build_draw_list_linear, DrawList};
    use glam::{Mat4, Vec3};

    fn settings() -> RenderSettings {
        RenderSettings {
            wireframe: false,
            frustum_culling: true,
            lod_threshold: 50.0,
            debug_light_volumes: true,
            msaa_4x: false,
            clear_color: [0.1, 0.1, 0.1, 1.0],
        }
    }

    fn scene_with_lights() -> (SceneData, MeshId) {
        let mut scene = create_scene();
        let geometry = register_geometry(&mut scene, &MeshGeometry::default());
        let args = DrawArgs {
            index_count: 36,
            start_index: 0,
            base_vertex: 0,
        };
        let cube = register_mesh(&mut scene, "cube", geometry, args, create_aabb(Vec3::splat(-1.0), Vec3::splat(1.0)));
        for x in 0..3 {
            let mut desc = RenderItemDesc::new(cube, "missing");
            desc.world = Mat4::from_translation(Vec3::new(x as f32 * 3.0, 0.0, 0.0));
            add_render_item(&mut scene, desc).expect("item");
        }
        let ambient = LightDescriptor {
            kind: LightKind::Ambient,
            ..Default::default()
        };
        spawn_light(&mut scene, ambient, None, None);
        spawn_light(&mut scene, LightDescriptor::default(), Some(cube), None);
        spawn_light(
            &mut scene,
            LightDescriptor {
                kind: LightKind::Spot,
                ..Default::default()
            },
            None,
            None,
        );
        (scene, cube)
    }

    fn targets() -> TargetSet {
        create_target_set(128, 128, 2, 1).expect("targets")
    }

    fn draw_list(scene: &SceneData) -> DrawList {
        let camera = crate::camera::CameraData::default();
        build_draw_list_linear(scene, &camera, settings().lod_threshold)
    }

    #[test]
    fn test_pass_order() {
        let mut gpu = create_headless_gpu(HeadlessConfig::default()).expect("headless gpu");
        let library = create_pipeline_library(&mut gpu, 1).expect("library");
        let (scene, _) = scene_with_lights();
        let draw_list = draw_list(&scene);
        let targets = targets();
        let settings = settings();
        let mut particles = create_particle_system(&EngineConfig::default());
        let mut allocator = create_command_allocator(0);

        let ctx = FrameRecordContext {
            scene: &scene,
            draw_list: &draw_list,
            pipelines: &library,
            targets: &targets,
            settings: &settings,
            delta_time: 0.016,
        };
        let frame = record_frame(&mut allocator, &ctx, &mut particles);
        let scene_list = frame.scene.expect("scene list");

        assert_eq!(
            pass_sequence(&[scene_list.clone(), frame.ui.clone()]),
            vec![
                PassKind::ParticleSimulate,
                PassKind::Geometry,
                PassKind::Lighting,
                PassKind::PostProcess,
                PassKind::Ui
            ]
        );
        assert_eq!(count_draws_in_pass(&scene_list, PassKind::Geometry), 3);
        assert_eq!(frame.draws.lighting, 3);
        // One debug volume (only the point light has a proxy) plus particles
        assert_eq!(frame.draws.overlay, 2);
        assert_eq!(allocator.open_lists, 0);
    }

    #[test]
    fn test_recorded_frame_passes_validation() {
        let mut gpu = create_headless_gpu(HeadlessConfig::default()).expect("headless gpu");
        let library = create_pipeline_library(&mut gpu, 1).expect("library");
        let (scene, _) = scene_with_lights();
        let draw_list = draw_list(&scene);
        let mut targets = targets();
        let settings = settings();
        let mut particles = create_particle_system(&EngineConfig::default());
        let mut allocator = create_command_allocator(0);

        let initial = initial_resource_states(&targets);
        let mut tracker = create_state_tracker(initial.clone());

        for _ in 0..4 {
            crate::particles::update_emission(&mut particles, 0.06);
            let ctx = FrameRecordContext {
                scene: &scene,
                draw_list: &draw_list,
                pipelines: &library,
                targets: &targets,
                settings: &settings,
                delta_time: 0.06,
            };
            let frame = record_frame(&mut allocator, &ctx, &mut particles);
            let scene_list = frame.scene.expect("scene list");
            assert!(validate_command_list(&mut tracker, &scene_list).is_empty());
            assert!(validate_command_list(&mut tracker, &frame.ui).is_empty());
            assert!(diff_states(&tracker, &initial).is_empty());
            crate::render_graph::rotate_back_buffer(&mut targets);
        }
    }

    #[test]
    fn test_dropping_gbuffer_barrier_is_caught() {
        let mut gpu = create_headless_gpu(HeadlessConfig::default()).expect("headless gpu");
        let library = create_pipeline_library(&mut gpu, 1).expect("library");
        let (scene, _) = scene_with_lights();
        let draw_list = draw_list(&scene);
        let targets = targets();
        let settings = settings();
        let mut particles = create_particle_system(&EngineConfig::default());
        let mut allocator = create_command_allocator(0);

        let ctx = FrameRecordContext {
            scene: &scene,
            draw_list: &draw_list,
            pipelines: &library,
            targets: &targets,
            settings: &settings,
            delta_time: 0.016,
        };
        let mut scene_list = record_frame(&mut allocator, &ctx, &mut particles).scene.expect("scene list");
        let barrier = scene_list
            .commands
            .iter()
            .position(|c| {
                matches!(
                    c,
                    GpuCommand::Transition {
                        resource: ResourceId::GBuffer(GBufferSlot::Normal),
                        after: ResourceState::ShaderResource,
                        ..
                    }
                )
            })
            .expect("normal buffer barrier");
        scene_list.commands.remove(barrier);

        let mut tracker = create_state_tracker(initial_resource_states(&targets));
        assert!(!validate_command_list(&mut tracker, &scene_list).is_empty());
    }

    #[test]
    fn test_ui_survives_missing_scene_pipeline() {
        let mut gpu = create_headless_gpu(HeadlessConfig::default()).expect("headless gpu");
        let library = create_pipeline_library_for(&mut gpu, &[PipelineKey::Ui], 1).expect("library");
        let (scene, _) = scene_with_lights();
        let draw_list = draw_list(&scene);
        let targets = targets();
        let settings = settings();
        let mut particles = create_particle_system(&EngineConfig::default());
        let mut allocator = create_command_allocator(0);

        let ctx = FrameRecordContext {
            scene: &scene,
            draw_list: &draw_list,
            pipelines: &library,
            targets: &targets,
            settings: &settings,
            delta_time: 0.016,
        };
        let frame = record_frame(&mut allocator, &ctx, &mut particles);
        assert!(frame.scene.is_none());
        assert!(frame.scene_error.is_some());
        assert_eq!(frame.draws.ui, 1);
        // Particle state untouched when the 3D passes are skipped
        assert_eq!(particles.simulate_count, 0);

        let clears_back_buffer = frame.ui.commands.iter().any(|c| match c {
            GpuCommand::BeginPass(desc) => desc.kind == PassKind::Ui && desc.clear_color.is_some(),
            _ => false,
        });
        assert!(clears_back_buffer);

        let mut tracker = create_state_tracker(initial_resource_states(&targets));
        assert!(validate_command_list(&mut tracker, &frame.ui).is_empty());
    }
}
