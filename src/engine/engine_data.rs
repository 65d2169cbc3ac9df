//! Engine orchestrator data - Pure DOP
//!
//! The renderer is one plain struct composed of the subsystems. It has no
//! methods; every frame-loop step is a free function in engine_operations.rs.

use glam::Vec4;

use crate::camera::{CameraData, CameraTransformBatch};
use crate::config::EngineConfig;
use crate::frame::{FrameRing, PropagationStats};
use crate::gpu::{FenceValue, GpuBackend, SyncGate};
use crate::particles::ParticleSystem;
use crate::render_graph::{PassDrawCounts, PipelineLibrary, RenderSettings, TargetSet};
use crate::scene::SceneData;
use crate::spatial::OctreeData;
use crate::visibility::{DrawList, VisibilityStats};

/// Lifecycle of the orchestrator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// Frames are recorded and submitted
    Ready,
    /// Window minimised; frames are skipped
    Paused,
    /// Terminal. A fatal device error was seen and no frame will run again
    DeviceLost,
}

impl EngineState {
    pub fn name(self) -> &'static str {
        match self {
            EngineState::Ready => "Ready",
            EngineState::Paused => "Paused",
            EngineState::DeviceLost => "DeviceLost",
        }
    }
}

/// Host window state that gates size-dependent work
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResizeState {
    pub minimized: bool,
    /// The user is dragging the window border
    pub dragging: bool,
    /// Latest size reported during a drag, applied on drag end
    pub pending: Option<(u32, u32)>,
}

/// Frame rate averaged over one-second windows
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FrameTimer {
    pub window_elapsed: f32,
    pub window_frames: u32,
    pub fps: f32,
    pub ms_per_frame: f32,
    pub total_frames: u64,
}

/// What one submitted frame did
#[derive(Debug, Clone, Default)]
pub struct FrameReport {
    pub frame_index: u64,
    pub slot: usize,
    pub fence: FenceValue,
    pub visibility: VisibilityStats,
    pub draws: PassDrawCounts,
    pub propagation: PropagationStats,
    pub ring_rebuilt: bool,
    pub octree_rebuilt: bool,
    /// Ring waits so far, including this frame's acquire
    pub ring_waits: u64,
    pub particles_emitted: u32,
    pub lights_moving: u32,
    /// Set when the 3D passes were dropped and only the UI was drawn
    pub scene_error: Option<String>,
}

/// Per-frame input already resolved by the host's window layer
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FrameInput {
    pub delta_time: f32,
    pub camera: CameraTransformBatch,
}

pub struct Renderer {
    pub config: EngineConfig,
    pub state: EngineState,

    pub backend: Box<dyn GpuBackend>,
    pub gate: SyncGate,
    pub ring: FrameRing,

    pub scene: SceneData,
    pub octree: OctreeData,
    pub camera: CameraData,
    pub particles: ParticleSystem,

    pub library: PipelineLibrary,
    pub targets: TargetSet,
    pub settings: RenderSettings,

    pub resize: ResizeState,
    pub timer: FrameTimer,
    /// Draw list of the last submitted frame
    pub draw_list: DrawList,

    pub total_time: f32,
    pub ambient_light: Vec4,
    pub frames_submitted: u64,
}

impl std::fmt::Debug for Renderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Renderer")
            .field("backend", &self.backend.backend_name())
            .field("state", &self.state)
            .field("frames_submitted", &self.frames_submitted)
            .field("targets", &(self.targets.width, self.targets.height))
            .finish()
    }
}
