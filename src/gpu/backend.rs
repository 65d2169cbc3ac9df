//! Backend boundary
//!
//! The renderer core records API-neutral command lists; a backend owns the
//! device objects and executes them. Everything above this trait is
//! testable against the headless backend.

use super::command_data::CommandList;
use super::fence_data::{FenceValue, GpuFence};
use super::pipeline_data::{PipelineDesc, PipelineHandle};
use crate::error::EngineResult;
use crate::frame::{FrameCapacity, FrameResource};
use crate::render_graph::TargetSet;
use crate::scene::{GeometryId, MeshGeometry, TextureSlot, TextureUpload};

pub trait GpuBackend: Send {
    fn backend_name(&self) -> &'static str;

    /// Build the device object for a fixed pipeline description
    fn create_pipeline(&mut self, handle: PipelineHandle, desc: &PipelineDesc) -> EngineResult<()>;

    /// Create vertex and index buffers for a loaded model
    fn upload_geometry(&mut self, id: GeometryId, geometry: &MeshGeometry) -> EngineResult<()>;

    /// Fill one descriptor table slot; slots are fixed once assigned
    fn upload_texture(&mut self, slot: TextureSlot, texture: &TextureUpload) -> EngineResult<()>;

    /// (Re)allocate the per-slot constant buffers. Called with the queue idle
    fn configure_frame_resources(&mut self, slot_count: usize, capacity: &FrameCapacity) -> EngineResult<()>;

    /// (Re)create every size-dependent target. Called with the queue idle
    fn configure_targets(&mut self, targets: &TargetSet) -> EngineResult<()>;

    fn configure_particles(&mut self, capacity: u32) -> EngineResult<()>;

    /// Execute `lists` in order, reading constants from `frame`
    fn submit(&mut self, frame: &FrameResource, lists: Vec<CommandList>) -> EngineResult<()>;

    /// Enqueue a marker that completes `fence` to `value` after prior work
    fn signal(&mut self, fence: &GpuFence, value: FenceValue) -> EngineResult<()>;

    /// Drive completion notifications toward `value`. May block
    fn pump(&mut self, fence: &GpuFence, value: FenceValue) -> EngineResult<()>;

    fn present(&mut self, back_buffer: u32) -> EngineResult<()>;

    fn device_lost_reason(&self) -> Option<String>;
}
