//! wgpu backend data
//!
//! Device objects behind the backend boundary. Constant buffers are laid
//! out with a 256-byte element stride and bound with dynamic offsets, one
//! bind group per frame slot.

use std::sync::Arc;

use rustc_hash::FxHashMap;

use super::device_watch::DeviceWatch;
use crate::gpu::{FenceValue, PipelineHandle};
use crate::scene::{GeometryId, TextureSlot};

#[derive(Debug, Clone)]
pub struct WgpuConfig {
    pub power_preference: wgpu::PowerPreference,
    pub backends: wgpu::Backends,
    /// Needed for wireframe pipelines; falls back to solid fill without it
    pub request_polygon_line: bool,
}

impl Default for WgpuConfig {
    fn default() -> Self {
        Self {
            power_preference: wgpu::PowerPreference::HighPerformance,
            backends: wgpu::Backends::all(),
            request_polygon_line: true,
        }
    }
}

/// Which bind group layouts a pipeline expects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LayoutKind {
    /// Frame constants + material texture
    Geometry,
    /// Frame constants + G-buffers and depth
    Lighting,
    /// Frame constants + particle storage
    ParticleRender,
    /// Frame constants + lit target
    Composite,
    /// Input, output and parameters
    ParticleSimulate,
}

#[derive(Debug)]
pub enum WgpuPipeline {
    Render {
        pipeline: wgpu::RenderPipeline,
        layout: LayoutKind,
    },
    Compute {
        pipeline: wgpu::ComputePipeline,
    },
}

#[derive(Debug)]
pub struct GeometryBuffers {
    pub vertex: wgpu::Buffer,
    pub index: wgpu::Buffer,
}

#[derive(Debug)]
pub struct TextureBinding {
    pub texture: wgpu::Texture,
    pub bind_group: wgpu::BindGroup,
}

/// Byte strides of each constant array
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConstantStrides {
    pub object: u64,
    pub material: u64,
    pub light: u64,
}

#[derive(Debug)]
pub struct SlotBuffers {
    pub pass: wgpu::Buffer,
    pub objects: wgpu::Buffer,
    pub materials: wgpu::Buffer,
    pub lights: wgpu::Buffer,
    pub bind_group: wgpu::BindGroup,
}

#[derive(Debug)]
pub struct TargetLayouts {
    pub gbuffer: wgpu::BindGroupLayout,
    pub composite: wgpu::BindGroupLayout,
}

#[derive(Debug)]
pub struct RenderTexture {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
}

#[derive(Debug)]
pub struct TargetTextures {
    pub width: u32,
    pub height: u32,
    pub sample_count: u32,
    pub back_buffers: Vec<RenderTexture>,
    pub depth: RenderTexture,
    /// Depth aspect only, for sampling
    pub depth_sample_view: wgpu::TextureView,
    pub gbuffers: [RenderTexture; 3],
    /// Single-sampled lighting result read by post-processing
    pub lit: RenderTexture,
    /// Multisampled lighting target resolved into `lit`
    pub lit_msaa: Option<RenderTexture>,
    pub gbuffer_bind_group: wgpu::BindGroup,
    pub composite_bind_group: wgpu::BindGroup,
}

#[derive(Debug)]
pub struct ParticleBuffers {
    pub capacity: u32,
    pub buffers: [wgpu::Buffer; 2],
    pub params: wgpu::Buffer,
    /// Indexed by input buffer
    pub simulate_bind_groups: [wgpu::BindGroup; 2],
    pub render_bind_groups: [wgpu::BindGroup; 2],
}

#[derive(Debug)]
pub struct WgpuLayouts {
    pub frame: wgpu::BindGroupLayout,
    pub texture: wgpu::BindGroupLayout,
    pub particle_render: wgpu::BindGroupLayout,
    pub particle_simulate: wgpu::BindGroupLayout,
    /// Keyed by sample count
    pub targets: FxHashMap<u32, TargetLayouts>,
}

/// Window surface the back buffer is copied into on present
pub struct PresentSurface {
    pub surface: wgpu::Surface<'static>,
    pub config: wgpu::SurfaceConfiguration,
}

pub struct WgpuGpu {
    pub device: Arc<wgpu::Device>,
    pub queue: Arc<wgpu::Queue>,
    pub adapter_name: String,
    pub features: wgpu::Features,
    pub watch: DeviceWatch,

    pub shaders: FxHashMap<String, wgpu::ShaderModule>,
    pub layouts: WgpuLayouts,
    pub sampler: wgpu::Sampler,
    pub strides: ConstantStrides,

    pub pipelines: FxHashMap<PipelineHandle, WgpuPipeline>,
    pub geometries: FxHashMap<GeometryId, GeometryBuffers>,
    pub textures: FxHashMap<TextureSlot, TextureBinding>,
    pub slots: Vec<SlotBuffers>,
    pub targets: Option<TargetTextures>,
    pub particles: Option<ParticleBuffers>,

    pub last_submission: Option<wgpu::SubmissionIndex>,
    /// Submission each signaled fence value waits behind
    pub signaled: Vec<(FenceValue, wgpu::SubmissionIndex)>,
    /// `None` renders offscreen only
    pub surface: Option<PresentSurface>,
    pub presented: u64,
    pub presents_skipped: u64,
}
