//! Particle system operations
//!
//! Emission runs on the CPU against the shadow life array; integration runs
//! in a compute dispatch that reads the current buffer and writes the
//! other. After every dispatch the roles swap.

use super::particle_data::{EmitterSettings, ParticleBufferId, ParticleRecord, ParticleSimParams, ParticleSystem};
use crate::config::EngineConfig;
use crate::constants::particles::{ALPHA_FADE_PER_SECOND, WORKGROUP_SIZE};
use crate::gpu::{record, CommandList, GpuCommand, PassDesc, PassKind, PipelineHandle, ResourceId, ResourceState};
use glam::Vec3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Bursts allowed in one update; longer stalls drop the backlog
const MAX_BURSTS_PER_UPDATE: u32 = 4;

// ============================================================================
// CREATION
// ============================================================================

pub fn create_particle_system(config: &EngineConfig) -> ParticleSystem {
    let capacity = config.particle_capacity.max(1);
    ParticleSystem {
        capacity,
        current: ParticleBufferId::A,
        shadow_life: vec![0.0; capacity as usize],
        pending_spawns: Vec::new(),
        pending_clear: false,
        emit_accumulator: 0.0,
        settings: EmitterSettings {
            interval: config.particle_emit_interval,
            batch: config.particle_emit_batch,
            lifetime: config.particle_lifetime,
            origin: Vec3::from(config.particle_origin),
            force: Vec3::from(config.particle_force),
            color_delta: [0.0, 0.0, 0.0, ALPHA_FADE_PER_SECOND],
        },
        rng: StdRng::seed_from_u64(config.particle_seed),
        simulate_count: 0,
        total_emitted: 0,
    }
}

/// Dispatch width covering every slot
pub fn particle_group_count(capacity: u32) -> u32 {
    capacity.div_ceil(WORKGROUP_SIZE)
}

// ============================================================================
// EMISSION (CPU)
// ============================================================================

/// New particle at `origin` moving up with a random horizontal spread
pub fn spawn_particle(rng: &mut StdRng, origin: Vec3, lifetime: f32) -> ParticleRecord {
    let velocity = Vec3::new(
        rng.gen_range(-1.0..1.0),
        rng.gen_range(1.0..3.0),
        rng.gen_range(-1.0..1.0),
    );
    ParticleRecord {
        position: origin.to_array(),
        life: lifetime,
        velocity: velocity.to_array(),
        lifetime,
        color: [1.0, 1.0, 1.0, 1.0],
        size: 1.0,
        rotation: 0.0,
        alive: 1,
        _pad: 0.0,
    }
}

/// Age the shadow copy in step with the GPU integration
pub fn age_shadow(system: &mut ParticleSystem, delta_time: f32) {
    for life in &mut system.shadow_life {
        if *life > 0.0 {
            *life = (*life - delta_time).max(0.0);
        }
    }
}

pub fn live_particle_count(system: &ParticleSystem) -> u32 {
    system.shadow_life.iter().filter(|l| **l > 0.0).count() as u32
}

/// Mark up to `count` dead slots alive. Returns how many were spawned
pub fn emit_particles(system: &mut ParticleSystem, count: u32) -> u32 {
    let mut emitted = 0;
    for index in 0..system.shadow_life.len() {
        if emitted >= count {
            break;
        }
        if system.shadow_life[index] > 0.0 {
            continue;
        }
        // A slot spawned earlier this frame is not uploaded yet
        if system.pending_spawns.iter().any(|(slot, _)| *slot as usize == index) {
            continue;
        }

        let record = spawn_particle(&mut system.rng, system.settings.origin, system.settings.lifetime);
        system.shadow_life[index] = record.life;
        system.pending_spawns.push((index as u32, record));
        emitted += 1;
    }
    system.total_emitted += u64::from(emitted);
    emitted
}

/// Advance emission time. Emits one batch per elapsed interval
pub fn update_emission(system: &mut ParticleSystem, delta_time: f32) -> u32 {
    age_shadow(system, delta_time);
    system.emit_accumulator += delta_time;

    let mut emitted = 0;
    let mut bursts = 0;
    while system.emit_accumulator >= system.settings.interval {
        system.emit_accumulator -= system.settings.interval;
        if bursts < MAX_BURSTS_PER_UPDATE {
            emitted += emit_particles(system, system.settings.batch);
            bursts += 1;
        }
    }
    emitted
}

pub fn set_particle_force(system: &mut ParticleSystem, force: Vec3) {
    system.settings.force = force;
}

/// Kill every particle and reset emission
pub fn kill_all(system: &mut ParticleSystem) {
    system.shadow_life.iter_mut().for_each(|l| *l = 0.0);
    system.pending_spawns.clear();
    system.pending_clear = true;
    system.emit_accumulator = 0.0;
    log::info!("[Particles::kill_all] Particle system reset");
}

pub fn swap_particle_buffers(system: &mut ParticleSystem) {
    system.current = system.current.other();
}

// ============================================================================
// RECORDING
// ============================================================================

fn transition(list: &mut CommandList, buffer: ParticleBufferId, before: ResourceState, after: ResourceState) {
    record(
        list,
        GpuCommand::Transition {
            resource: ResourceId::Particles(buffer),
            before,
            after,
        },
    );
}

/// Record upload, integration dispatch and barriers, then swap roles.
///
/// Both buffers are shader-readable before and after.
pub fn record_particle_simulate(
    system: &mut ParticleSystem,
    list: &mut CommandList,
    pipeline: PipelineHandle,
    delta_time: f32,
) {
    let input = system.current;
    let output = input.other();

    if system.pending_clear {
        for buffer in [ParticleBufferId::A, ParticleBufferId::B] {
            transition(list, buffer, ResourceState::ShaderResource, ResourceState::CopyDest);
            record(list, GpuCommand::ClearParticles { buffer });
            transition(list, buffer, ResourceState::CopyDest, ResourceState::ShaderResource);
        }
        system.pending_clear = false;
    }

    if !system.pending_spawns.is_empty() {
        transition(list, input, ResourceState::ShaderResource, ResourceState::CopyDest);
        record(
            list,
            GpuCommand::UploadParticles {
                buffer: input,
                spawns: std::mem::take(&mut system.pending_spawns),
            },
        );
        transition(list, input, ResourceState::CopyDest, ResourceState::ShaderResource);
    }

    transition(list, output, ResourceState::ShaderResource, ResourceState::UnorderedAccess);
    record(
        list,
        GpuCommand::BeginPass(PassDesc {
            kind: PassKind::ParticleSimulate,
            color_targets: Vec::new(),
            depth: None,
            reads: vec![ResourceId::Particles(input)],
            clear_color: None,
        }),
    );
    record(list, GpuCommand::SetPipeline(pipeline));
    record(
        list,
        GpuCommand::Dispatch {
            groups: [particle_group_count(system.capacity), 1, 1],
            input,
            output,
            params: ParticleSimParams {
                force: system.settings.force.to_array(),
                delta_time,
                color_delta: system.settings.color_delta,
                capacity: system.capacity,
                _pad: [0; 3],
            },
        },
    );
    record(list, GpuCommand::EndPass);
    record(
        list,
        GpuCommand::UavBarrier {
            resource: ResourceId::Particles(output),
        },
    );
    transition(list, output, ResourceState::UnorderedAccess, ResourceState::ShaderResource);

    swap_particle_buffers(system);
    system.simulate_count += 1;
}

/// Draw the buffer written last. Every slot is drawn; dead ones are
/// discarded by the shader
pub fn record_particle_render(system: &ParticleSystem, list: &mut CommandList, pipeline: PipelineHandle) {
    record(list, GpuCommand::SetPipeline(pipeline));
    record(
        list,
        GpuCommand::DrawParticles {
            buffer: system.current,
            instance_count: system.capacity,
        },
    );
}

// ============================================================================
// REFERENCE INTEGRATOR
// ============================================================================

/// CPU version of the compute shader: one thread per slot
pub fn simulate_particles_cpu(input: &[ParticleRecord], output: &mut [ParticleRecord], params: &ParticleSimParams) {
    let dt = params.delta_time;
    let force = Vec3::from(params.force);

    for (src, dst) in input.iter().zip(output.iter_mut()) {
        let mut p = *src;
        if p.alive != 0 {
            let velocity = Vec3::from(p.velocity) + force * dt;
            let position = Vec3::from(p.position) + velocity * dt;
            p.velocity = velocity.to_array();
            p.position = position.to_array();
            p.life -= dt;
            for (c, d) in p.color.iter_mut().zip(params.color_delta.iter()) {
                *c = (*c + d * dt).clamp(0.0, 1.0);
            }
            if p.life <= 0.0 {
                p.life = 0.0;
                p.alive = 0;
            }
        }
        *dst = p;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::{create_command_allocator, open_command_list};

    fn system_with_capacity(capacity: u32) -> ParticleSystem {
        create_particle_system(&EngineConfig {
            particle_capacity: capacity,
            ..Default::default()
        })
    }

    #[test]
    fn test_group_count_rounds_up() {
        assert_eq!(particle_group_count(1), 1);
        assert_eq!(particle_group_count(256), 1);
        assert_eq!(particle_group_count(257), 2);
        assert_eq!(particle_group_count(1024), 4);
    }

    #[test]
    fn test_ping_pong_alternates() {
        let mut system = system_with_capacity(64);
        let mut allocator = create_command_allocator(0);
        let mut list = open_command_list(&mut allocator, "particles");

        let mut order = Vec::new();
        for _ in 0..6 {
            order.push(system.current);
            record_particle_simulate(&mut system, &mut list, PipelineHandle(0), 0.016);
        }
        use ParticleBufferId::{A, B};
        assert_eq!(order, vec![A, B, A, B, A, B]);
        assert_eq!(system.simulate_count, 6);
    }

    #[test]
    fn test_emission_cadence() {
        let mut system = system_with_capacity(1024);
        // Not yet one interval
        assert_eq!(update_emission(&mut system, 0.03), 0);
        // Crosses the first interval: one batch of five
        assert_eq!(update_emission(&mut system, 0.03), 5);
        assert_eq!(live_particle_count(&system), 5);
        assert_eq!(system.pending_spawns.len(), 5);
    }

    #[test]
    fn test_emission_reuses_dead_slots() {
        let mut system = system_with_capacity(8);
        assert_eq!(emit_particles(&mut system, 8), 8);
        system.pending_spawns.clear();
        assert_eq!(emit_particles(&mut system, 3), 0);

        // Past the full lifetime everything is dead again
        let past_lifetime = system.settings.lifetime + 0.1;
        age_shadow(&mut system, past_lifetime);
        assert_eq!(live_particle_count(&system), 0);
        assert_eq!(emit_particles(&mut system, 3), 3);
    }

    #[test]
    fn test_spawn_velocity_ranges() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let p = spawn_particle(&mut rng, Vec3::ZERO, 5.0);
            assert!(p.velocity[0] >= -1.0 && p.velocity[0] < 1.0);
            assert!(p.velocity[1] >= 1.0 && p.velocity[1] < 3.0);
            assert!(p.velocity[2] >= -1.0 && p.velocity[2] < 1.0);
            assert_eq!(p.alive, 1);
        }
    }

    #[test]
    fn test_cpu_integrator_applies_force_and_kills() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut p = spawn_particle(&mut rng, Vec3::ZERO, 0.15);
        p.velocity = [0.0, 0.0, 0.0];
        let input = vec![p, ParticleRecord { alive: 0, ..p }];
        let mut output = vec![ParticleRecord { alive: 7, ..p }; 2];

        let params = ParticleSimParams {
            force: [0.0, -9.8, 0.0],
            delta_time: 0.1,
            color_delta: [0.0, 0.0, 0.0, -0.5],
            capacity: 2,
            _pad: [0; 3],
        };
        simulate_particles_cpu(&input, &mut output, &params);
        assert!((output[0].velocity[1] + 0.98).abs() < 1e-5);
        assert!(output[0].position[1] < 0.0);
        assert!((output[0].color[3] - 0.95).abs() < 1e-5);
        assert_eq!(output[0].alive, 1);
        // Dead input is copied through untouched
        assert_eq!(output[1], input[1]);

        let mut second = output.clone();
        simulate_particles_cpu(&output, &mut second, &params);
        assert_eq!(second[0].alive, 0);
        assert_eq!(second[0].life, 0.0);
    }

    #[test]
    fn test_kill_all_schedules_clear() {
        let mut system = system_with_capacity(16);
        emit_particles(&mut system, 4);
        kill_all(&mut system);
        assert_eq!(live_particle_count(&system), 0);
        assert!(system.pending_spawns.is_empty());

        let mut allocator = create_command_allocator(0);
        let mut list = open_command_list(&mut allocator, "particles");
        record_particle_simulate(&mut system, &mut list, PipelineHandle(0), 0.016);
        let clears = list
            .commands
            .iter()
            .filter(|c| matches!(c, GpuCommand::ClearParticles { .. }))
            .count();
        assert_eq!(clears, 2);
        assert!(!system.pending_clear);
    }
}
