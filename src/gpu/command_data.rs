//! Recorded GPU command model - Pure DOP
//!
//! Command lists are plain data: the render graph records them, a backend
//! executes them. Resource states and barriers are explicit so a backend
//! without implicit tracking (or a validator) can check every hazard.

use super::pipeline_data::PipelineHandle;
use crate::particles::{ParticleBufferId, ParticleRecord, ParticleSimParams};
use crate::scene::{DrawArgs, GeometryId, TextureSlot};

/// Geometry buffer render targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum GBufferSlot {
    Albedo,
    Normal,
    Specular,
}

impl GBufferSlot {
    pub const ALL: [GBufferSlot; 3] = [GBufferSlot::Albedo, GBufferSlot::Normal, GBufferSlot::Specular];
}

/// Every resource whose state the render graph tracks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceId {
    BackBuffer(u32),
    DepthStencil,
    GBuffer(GBufferSlot),
    /// Intermediate HDR target the lighting pass accumulates into
    LitTarget,
    Particles(ParticleBufferId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceState {
    Common,
    RenderTarget,
    DepthWrite,
    /// Depth readable by shaders and bound read-only for depth testing
    DepthRead,
    ShaderResource,
    UnorderedAccess,
    CopyDest,
    Present,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PassKind {
    ParticleSimulate,
    Geometry,
    Lighting,
    PostProcess,
    Ui,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DepthAttachment {
    pub resource: ResourceId,
    pub read_only: bool,
    pub clear: Option<f32>,
}

/// Render pass binding: what is written, what is sampled
#[derive(Debug, Clone, PartialEq)]
pub struct PassDesc {
    pub kind: PassKind,
    pub color_targets: Vec<ResourceId>,
    pub depth: Option<DepthAttachment>,
    pub reads: Vec<ResourceId>,
    pub clear_color: Option<[f32; 4]>,
}

/// Light proxy geometry chosen by light type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LightProxy {
    FullscreenQuad,
    Sphere,
    Cylinder,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrawIndexedArgs {
    pub geometry: GeometryId,
    pub args: DrawArgs,
    pub object_index: u32,
    pub material_index: u32,
    pub texture_slot: TextureSlot,
}

#[derive(Debug, Clone, PartialEq)]
pub enum GpuCommand {
    Transition {
        resource: ResourceId,
        before: ResourceState,
        after: ResourceState,
    },
    /// Make unordered-access writes visible to later readers
    UavBarrier {
        resource: ResourceId,
    },
    BeginPass(PassDesc),
    EndPass,
    SetPipeline(PipelineHandle),
    SetViewport {
        width: u32,
        height: u32,
    },
    DrawIndexed(DrawIndexedArgs),
    DrawLight {
        proxy: LightProxy,
        /// Proxy mesh; `None` draws a fullscreen triangle
        geometry: Option<(GeometryId, DrawArgs)>,
        light_index: u32,
    },
    DrawFullscreen,
    UploadParticles {
        buffer: ParticleBufferId,
        spawns: Vec<(u32, ParticleRecord)>,
    },
    ClearParticles {
        buffer: ParticleBufferId,
    },
    Dispatch {
        groups: [u32; 3],
        input: ParticleBufferId,
        output: ParticleBufferId,
        params: ParticleSimParams,
    },
    DrawParticles {
        buffer: ParticleBufferId,
        instance_count: u32,
    },
    DrawUi,
}

/// Recording state owned by a frame resource slot.
/// Reset only once the slot's fence has retired.
#[derive(Debug, Default)]
pub struct CommandAllocator {
    pub slot: usize,
    pub reset_count: u64,
    pub open_lists: u32,
    /// Capacity hint carried over from the previous use of this slot
    pub last_command_count: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandList {
    pub label: &'static str,
    pub slot: usize,
    pub commands: Vec<GpuCommand>,
}
