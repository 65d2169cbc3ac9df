//! Particle data structures - Pure DOP
//!
//! Particle records live in two GPU buffers that swap roles every
//! simulation step. The CPU keeps only remaining life per slot, which is
//! enough to find dead slots when emitting.

use glam::Vec3;
use rand::rngs::StdRng;

/// Per-particle GPU record. Must match the compute and render shaders
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ParticleRecord {
    pub position: [f32; 3],
    /// Remaining life in seconds
    pub life: f32,
    pub velocity: [f32; 3],
    /// Life at spawn
    pub lifetime: f32,
    pub color: [f32; 4],
    pub size: f32,
    pub rotation: f32,
    /// Non-zero while alive; dead particles are skipped in the shader
    pub alive: u32,
    pub _pad: f32,
}

/// Per-dispatch simulation constants
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ParticleSimParams {
    pub force: [f32; 3],
    pub delta_time: f32,
    pub color_delta: [f32; 4],
    pub capacity: u32,
    pub _pad: [u32; 3],
}

static_assertions::const_assert_eq!(std::mem::size_of::<ParticleRecord>(), 64);
static_assertions::const_assert_eq!(std::mem::size_of::<ParticleSimParams>() % 16, 0);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ParticleBufferId {
    A,
    B,
}

impl ParticleBufferId {
    pub fn other(self) -> Self {
        match self {
            ParticleBufferId::A => ParticleBufferId::B,
            ParticleBufferId::B => ParticleBufferId::A,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EmitterSettings {
    pub interval: f32,
    pub batch: u32,
    pub lifetime: f32,
    pub origin: Vec3,
    pub force: Vec3,
    pub color_delta: [f32; 4],
}

#[derive(Debug)]
pub struct ParticleSystem {
    pub capacity: u32,
    /// Buffer read by the next simulation and drawn by the next render
    pub current: ParticleBufferId,

    /// Remaining life per slot, aged on the CPU in step with the GPU
    pub shadow_life: Vec<f32>,
    /// Freshly emitted particles not yet uploaded
    pub pending_spawns: Vec<(u32, ParticleRecord)>,
    /// Both buffers must be zeroed before the next simulation
    pub pending_clear: bool,

    pub emit_accumulator: f32,
    pub settings: EmitterSettings,
    pub rng: StdRng,

    pub simulate_count: u64,
    pub total_emitted: u64,
}
