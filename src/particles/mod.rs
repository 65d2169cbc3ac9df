//! Particles Module - GPU ping-pong particle simulation
//!
//! - particle_data.rs: GPU record layout and system state
//! - particle_operations.rs: emission, recording, reference integrator

pub mod particle_data;
pub mod particle_operations;

pub use particle_data::{EmitterSettings, ParticleBufferId, ParticleRecord, ParticleSimParams, ParticleSystem};
pub use particle_operations::{
    age_shadow, create_particle_system, emit_particles, kill_all, live_particle_count, particle_group_count,
    record_particle_render, record_particle_simulate, set_particle_force, simulate_particles_cpu, spawn_particle,
    swap_particle_buffers, update_emission,
};
