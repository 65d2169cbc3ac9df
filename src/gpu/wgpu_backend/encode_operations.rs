//! Command list encoding
//!
//! Translates recorded command lists into one wgpu command encoder. wgpu
//! tracks resource usage itself, so explicit transitions and UAV barriers
//! are dropped here; the headless backend is where they get validated.

use wgpu::util::DeviceExt;

use super::wgpu_data::{LayoutKind, RenderTexture, SlotBuffers, TargetTextures, WgpuGpu, WgpuPipeline};
use crate::constants::descriptors::ERROR_TEXTURE_SLOT;
use crate::error::{EngineError, EngineResult, OptionExt};
use crate::gpu::{
    CommandList, DepthAttachment, GBufferSlot, GpuCommand, PassDesc, PassKind, PipelineHandle, ResourceId,
};
use crate::particles::{ParticleBufferId, ParticleRecord};
use crate::scene::{DrawArgs, GeometryId, TextureSlot};

const PARTICLE_RECORD_SIZE: u64 = std::mem::size_of::<ParticleRecord>() as u64;

fn buffer_index(buffer: ParticleBufferId) -> usize {
    match buffer {
        ParticleBufferId::A => 0,
        ParticleBufferId::B => 1,
    }
}

fn gbuffer_index(slot: GBufferSlot) -> usize {
    match slot {
        GBufferSlot::Albedo => 0,
        GBufferSlot::Normal => 1,
        GBufferSlot::Specular => 2,
    }
}

fn targets(gpu: &WgpuGpu) -> EngineResult<&TargetTextures> {
    gpu.targets.as_ref().ok_or_engine(|| EngineError::InvalidState {
        expected: "render targets configured".to_string(),
        actual: "no render targets".to_string(),
    })
}

fn particle_buffers(gpu: &WgpuGpu) -> EngineResult<&super::wgpu_data::ParticleBuffers> {
    gpu.particles.as_ref().ok_or_engine(|| EngineError::InvalidState {
        expected: "particle buffers configured".to_string(),
        actual: "no particle buffers".to_string(),
    })
}

fn pipeline(gpu: &WgpuGpu, handle: PipelineHandle) -> EngineResult<&WgpuPipeline> {
    gpu.pipelines.get(&handle).ok_or_engine(|| EngineError::InvalidHandle {
        kind: "pipeline",
        index: handle.0,
    })
}

/// Color view plus optional resolve target for one color attachment
fn color_view(targets: &TargetTextures, resource: ResourceId) -> EngineResult<(&wgpu::TextureView, Option<&wgpu::TextureView>)> {
    let texture: &RenderTexture = match resource {
        ResourceId::BackBuffer(index) => targets
            .back_buffers
            .get(index as usize)
            .ok_or_engine(|| EngineError::InvalidHandle {
                kind: "back buffer",
                index,
            })?,
        ResourceId::GBuffer(slot) => &targets.gbuffers[gbuffer_index(slot)],
        ResourceId::LitTarget => {
            return Ok(match &targets.lit_msaa {
                Some(msaa) => (&msaa.view, Some(&targets.lit.view)),
                None => (&targets.lit.view, None),
            })
        }
        other => {
            return Err(EngineError::Internal {
                message: format!("{:?} is not a color target", other),
            })
        }
    };
    Ok((&texture.view, None))
}

fn depth_attachment<'a>(
    targets: &'a TargetTextures,
    depth: &DepthAttachment,
) -> wgpu::RenderPassDepthStencilAttachment<'a> {
    let (depth_ops, stencil_ops) = if depth.read_only {
        (None, None)
    } else {
        let load = match depth.clear {
            Some(value) => wgpu::LoadOp::Clear(value),
            None => wgpu::LoadOp::Load,
        };
        let stencil_load = match depth.clear {
            Some(_) => wgpu::LoadOp::Clear(0),
            None => wgpu::LoadOp::Load,
        };
        (
            Some(wgpu::Operations {
                load,
                store: wgpu::StoreOp::Store,
            }),
            Some(wgpu::Operations {
                load: stencil_load,
                store: wgpu::StoreOp::Store,
            }),
        )
    };
    wgpu::RenderPassDepthStencilAttachment {
        view: &targets.depth.view,
        depth_ops,
        stencil_ops,
    }
}

/// Encode every list into `encoder`, in order
pub fn encode_lists(
    gpu: &WgpuGpu,
    encoder: &mut wgpu::CommandEncoder,
    slot: usize,
    lists: &[CommandList],
) -> EngineResult<()> {
    let slot_buffers = gpu.slots.get(slot).ok_or_engine(|| EngineError::InvalidHandle {
        kind: "frame slot",
        index: slot as u32,
    })?;

    let mut viewport = None;
    for list in lists {
        let mut index = 0;
        while index < list.commands.len() {
            match &list.commands[index] {
                GpuCommand::BeginPass(desc) => {
                    let end = list.commands[index..]
                        .iter()
                        .position(|command| matches!(command, GpuCommand::EndPass))
                        .map(|offset| index + offset)
                        .ok_or_engine(|| EngineError::SubmissionFailed {
                            reason: format!("'{}' leaves a pass open", list.label),
                        })?;
                    let body = &list.commands[index + 1..end];
                    if desc.kind == PassKind::ParticleSimulate {
                        encode_compute_pass(gpu, encoder, body)?;
                    } else {
                        encode_render_pass(gpu, encoder, slot_buffers, desc, body, viewport)?;
                    }
                    index = end + 1;
                    continue;
                }
                GpuCommand::SetViewport { width, height } => viewport = Some((*width, *height)),
                GpuCommand::UploadParticles { buffer, spawns } => {
                    encode_particle_upload(gpu, encoder, *buffer, spawns)?;
                }
                GpuCommand::ClearParticles { buffer } => {
                    let particles = particle_buffers(gpu)?;
                    encoder.clear_buffer(&particles.buffers[buffer_index(*buffer)], 0, None);
                }
                GpuCommand::Transition { .. } | GpuCommand::UavBarrier { .. } => {}
                other => {
                    log::warn!("[WgpuGpu::encode] '{}': {:?} outside a pass ignored", list.label, other);
                }
            }
            index += 1;
        }
    }
    Ok(())
}

/// Staged copies keep uploads ordered after any clear in the same encoder
fn encode_particle_upload(
    gpu: &WgpuGpu,
    encoder: &mut wgpu::CommandEncoder,
    buffer: ParticleBufferId,
    spawns: &[(u32, ParticleRecord)],
) -> EngineResult<()> {
    if spawns.is_empty() {
        return Ok(());
    }
    let particles = particle_buffers(gpu)?;
    let records: Vec<ParticleRecord> = spawns.iter().map(|(_, record)| *record).collect();
    let staging = gpu.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some("Particle Spawn Staging"),
        contents: bytemuck::cast_slice(&records),
        usage: wgpu::BufferUsages::COPY_SRC,
    });

    let target = &particles.buffers[buffer_index(buffer)];
    for (position, (index, _)) in spawns.iter().enumerate() {
        if *index >= particles.capacity {
            return Err(EngineError::InvalidHandle {
                kind: "particle slot",
                index: *index,
            });
        }
        encoder.copy_buffer_to_buffer(
            &staging,
            position as u64 * PARTICLE_RECORD_SIZE,
            target,
            u64::from(*index) * PARTICLE_RECORD_SIZE,
            PARTICLE_RECORD_SIZE,
        );
    }
    Ok(())
}

fn encode_compute_pass(gpu: &WgpuGpu, encoder: &mut wgpu::CommandEncoder, body: &[GpuCommand]) -> EngineResult<()> {
    let particles = particle_buffers(gpu)?;
    let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
        label: Some("Particle Simulate"),
        timestamp_writes: None,
    });

    for command in body {
        match command {
            GpuCommand::SetPipeline(handle) => match pipeline(gpu, *handle)? {
                WgpuPipeline::Compute { pipeline } => pass.set_pipeline(pipeline),
                WgpuPipeline::Render { .. } => {
                    return Err(EngineError::Internal {
                        message: format!("render pipeline {} bound in a compute pass", handle.0),
                    })
                }
            },
            GpuCommand::Dispatch {
                groups, input, params, ..
            } => {
                gpu.queue.write_buffer(&particles.params, 0, bytemuck::bytes_of(params));
                pass.set_bind_group(0, &particles.simulate_bind_groups[buffer_index(*input)], &[]);
                pass.dispatch_workgroups(groups[0], groups[1], groups[2]);
            }
            _ => {}
        }
    }
    Ok(())
}

fn bind_geometry<'a>(
    gpu: &'a WgpuGpu,
    pass: &mut wgpu::RenderPass<'a>,
    geometry: GeometryId,
    args: &DrawArgs,
) -> EngineResult<()> {
    let buffers = gpu.geometries.get(&geometry).ok_or_engine(|| EngineError::InvalidHandle {
        kind: "geometry",
        index: geometry.0,
    })?;
    pass.set_vertex_buffer(0, buffers.vertex.slice(..));
    pass.set_index_buffer(buffers.index.slice(..), wgpu::IndexFormat::Uint32);
    pass.draw_indexed(args.start_index..args.start_index + args.index_count, args.base_vertex, 0..1);
    Ok(())
}

fn encode_render_pass(
    gpu: &WgpuGpu,
    encoder: &mut wgpu::CommandEncoder,
    slot: &SlotBuffers,
    desc: &PassDesc,
    body: &[GpuCommand],
    viewport: Option<(u32, u32)>,
) -> EngineResult<()> {
    let targets = targets(gpu)?;
    let load = match desc.clear_color {
        Some([r, g, b, a]) => wgpu::LoadOp::Clear(wgpu::Color {
            r: f64::from(r),
            g: f64::from(g),
            b: f64::from(b),
            a: f64::from(a),
        }),
        None => wgpu::LoadOp::Load,
    };

    let mut color_attachments = Vec::with_capacity(desc.color_targets.len());
    for resource in &desc.color_targets {
        let (view, resolve_target) = color_view(targets, *resource)?;
        color_attachments.push(Some(wgpu::RenderPassColorAttachment {
            view,
            resolve_target,
            ops: wgpu::Operations {
                load,
                store: wgpu::StoreOp::Store,
            },
        }));
    }

    let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: Some(match desc.kind {
            PassKind::Geometry => "Geometry Pass",
            PassKind::Lighting => "Lighting Pass",
            PassKind::PostProcess => "Post Process Pass",
            PassKind::Ui => "UI Pass",
            PassKind::ParticleSimulate => "Particle Simulate",
        }),
        color_attachments: &color_attachments,
        depth_stencil_attachment: desc.depth.as_ref().map(|depth| depth_attachment(targets, depth)),
        timestamp_writes: None,
        occlusion_query_set: None,
    });

    let (width, height) = viewport.unwrap_or((targets.width, targets.height));
    pass.set_viewport(0.0, 0.0, width as f32, height as f32, 0.0, 1.0);

    let strides = gpu.strides;
    let mut layout = None;
    for command in body {
        match command {
            GpuCommand::SetPipeline(handle) => match pipeline(gpu, *handle)? {
                WgpuPipeline::Render { pipeline, layout: kind } => {
                    pass.set_pipeline(pipeline);
                    match kind {
                        LayoutKind::Lighting => pass.set_bind_group(1, &targets.gbuffer_bind_group, &[]),
                        LayoutKind::Composite => pass.set_bind_group(1, &targets.composite_bind_group, &[]),
                        _ => {}
                    }
                    layout = Some(*kind);
                }
                WgpuPipeline::Compute { .. } => {
                    return Err(EngineError::Internal {
                        message: format!("compute pipeline {} bound in a render pass", handle.0),
                    })
                }
            },
            GpuCommand::SetViewport { width, height } => {
                pass.set_viewport(0.0, 0.0, *width as f32, *height as f32, 0.0, 1.0);
            }
            GpuCommand::DrawIndexed(draw) => {
                let offsets = [
                    draw.object_index * strides.object as u32,
                    draw.material_index * strides.material as u32,
                    0,
                ];
                pass.set_bind_group(0, &slot.bind_group, &offsets);
                let texture = gpu
                    .textures
                    .get(&draw.texture_slot)
                    .or_else(|| gpu.textures.get(&TextureSlot(ERROR_TEXTURE_SLOT)))
                    .ok_or_engine(|| EngineError::InvalidHandle {
                        kind: "texture slot",
                        index: draw.texture_slot.0,
                    })?;
                pass.set_bind_group(1, &texture.bind_group, &[]);
                bind_geometry(gpu, &mut pass, draw.geometry, &draw.args)?;
            }
            GpuCommand::DrawLight {
                geometry, light_index, ..
            } => {
                pass.set_bind_group(0, &slot.bind_group, &[0, 0, light_index * strides.light as u32]);
                match geometry {
                    Some((geometry, args)) => bind_geometry(gpu, &mut pass, *geometry, args)?,
                    None => pass.draw(0..3, 0..1),
                }
            }
            GpuCommand::DrawFullscreen => {
                pass.set_bind_group(0, &slot.bind_group, &[0, 0, 0]);
                pass.draw(0..3, 0..1);
            }
            GpuCommand::DrawParticles { buffer, instance_count } => {
                if layout != Some(LayoutKind::ParticleRender) {
                    log::warn!("[WgpuGpu::encode] Particle draw without the particle pipeline bound");
                    continue;
                }
                let particles = particle_buffers(gpu)?;
                pass.set_bind_group(0, &slot.bind_group, &[0, 0, 0]);
                pass.set_bind_group(1, &particles.render_bind_groups[buffer_index(*buffer)], &[]);
                pass.draw(0..*instance_count, 0..1);
            }
            // UI is drawn by the host's UI renderer on top of this pass
            GpuCommand::DrawUi => {}
            GpuCommand::Transition { .. } | GpuCommand::UavBarrier { .. } => {}
            other => {
                log::warn!("[WgpuGpu::encode] {:?} inside {:?} pass ignored", other, desc.kind);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_indices() {
        assert_eq!(buffer_index(ParticleBufferId::A), 0);
        assert_eq!(buffer_index(ParticleBufferId::B), 1);
        assert_eq!(buffer_index(ParticleBufferId::A.other()), 1);
    }

    #[test]
    fn test_gbuffer_indices_follow_slot_order() {
        let indices: Vec<usize> = GBufferSlot::ALL.iter().map(|slot| gbuffer_index(*slot)).collect();
        assert_eq!(indices, vec![0, 1, 2]);
    }
}
