//! GPU Module - backend boundary, command model and timeline sync
//!
//! - command_data.rs / command_operations.rs: recorded command lists
//! - pipeline_data.rs: API-independent pipeline state
//! - fence_data.rs / fence_operations.rs: fences and the sync gate
//! - backend.rs: the trait a backend implements
//! - headless: CPU timeline that validates every list it executes
//! - wgpu_backend: real device execution

pub mod backend;
pub mod command_data;
pub mod command_operations;
pub mod fence_data;
pub mod fence_operations;
pub mod headless;
pub mod pipeline_data;
#[cfg(feature = "wgpu-backend")]
pub mod wgpu_backend;

pub use backend::GpuBackend;
pub use command_data::{
    CommandAllocator, CommandList, DepthAttachment, DrawIndexedArgs, GBufferSlot, GpuCommand, LightProxy, PassDesc,
    PassKind, ResourceId, ResourceState,
};
pub use command_operations::{
    close_command_list, count_draws, count_draws_in_pass, create_command_allocator, open_command_list,
    pass_sequence, record, reset_command_allocator,
};
pub use fence_data::{FenceValue, GpuFence, SyncGate};
pub use fence_operations::{
    create_fence, create_sync_gate, fence_completed_value, fence_lost_reason, flush, is_complete, signal,
    wait_for_fence, wait_until_complete,
};
pub use headless::{
    create_headless_gpu, headless_live_particles, headless_particles, headless_stats, release_fences_through,
    simulate_device_loss, HeadlessConfig, HeadlessControl, HeadlessGpu, HeadlessStats, HeadlessTimeline,
};
pub use pipeline_data::{
    BlendMode, CullMode, DepthMode, FillMode, PipelineDesc, PipelineHandle, ShaderPair, TargetLayout, Topology,
};
#[cfg(feature = "wgpu-backend")]
pub use wgpu_backend::{create_wgpu_gpu, create_wgpu_gpu_for_surface, register_shader, WgpuConfig, WgpuGpu};
