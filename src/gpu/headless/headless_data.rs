//! Headless GPU data - Pure DOP
//!
//! A software stand-in for a GPU queue: command lists execute on a worker
//! thread in submission order, fences retire after the work queued before
//! them, and every list is replayed through the resource state tracker the
//! way a validation layer would.

use std::collections::VecDeque;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::Sender;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::frame::FrameCapacity;
use crate::gpu::{CommandList, FenceValue, GpuFence, PipelineDesc, PipelineHandle};
use crate::particles::{ParticleBufferId, ParticleRecord};
use crate::render_graph::{ResourceStates, StateTracker, StateViolation, TargetSet};

/// How signaled fences retire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HeadlessTimeline {
    /// As soon as the worker reaches the signal
    #[default]
    Immediate,
    /// After an artificial per-signal delay
    Latency(Duration),
    /// Only when the test releases them
    Manual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeadlessConfig {
    pub timeline: HeadlessTimeline,
    pub validate: bool,
}

impl Default for HeadlessConfig {
    fn default() -> Self {
        Self {
            timeline: HeadlessTimeline::Immediate,
            validate: true,
        }
    }
}

/// Dispatch inputs remembered for inspection
pub const RECENT_DISPATCH_HISTORY: usize = 16;

#[derive(Debug, Clone, Default)]
pub struct HeadlessStats {
    pub submissions: u64,
    pub lists_executed: u64,
    pub passes: u64,
    pub draws: u64,
    pub dispatches: u64,
    pub recent_dispatch_inputs: VecDeque<ParticleBufferId>,
    pub presents: u64,
    pub fences_signaled: u64,
    pub fences_completed: u64,
    pub pipelines_created: u32,
    pub geometries_uploaded: u32,
    pub textures_uploaded: u32,
    pub target_configurations: u32,
    pub frame_configurations: u32,
    pub validation_errors: Vec<StateViolation>,
}

#[derive(Debug, Default)]
pub struct HeadlessState {
    pub released_through: FenceValue,
    /// Signals waiting for a manual release
    pub pending: Vec<(GpuFence, FenceValue)>,
    /// Every fence ever signaled, so device loss can reach all waiters
    pub fences: Vec<GpuFence>,
    pub lost: Option<String>,
    pub stats: HeadlessStats,
    pub particles: [Vec<ParticleRecord>; 2],
    pub tracker: StateTracker,
    /// Frame-boundary states for the configured targets
    pub boundary_states: ResourceStates,
}

#[derive(Debug, Default)]
pub struct HeadlessShared {
    pub state: Mutex<HeadlessState>,
}

/// Handle tests keep after moving the backend into another thread
pub type HeadlessControl = Arc<HeadlessShared>;

#[derive(Debug)]
pub enum HeadlessJob {
    Execute(Vec<CommandList>),
    Signal(GpuFence, FenceValue),
    Present(u32),
    Shutdown,
}

#[derive(Debug)]
pub struct HeadlessGpu {
    pub config: HeadlessConfig,
    pub control: HeadlessControl,
    pub sender: Sender<HeadlessJob>,
    pub worker: Option<JoinHandle<()>>,

    pub pipelines: FxHashMap<PipelineHandle, PipelineDesc>,
    pub targets: Option<TargetSet>,
    pub frame_slots: usize,
    pub frame_capacity: FrameCapacity,
    pub particle_capacity: u32,
}
