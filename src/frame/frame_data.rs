//! Frame resource ring data - Pure DOP
//!
//! N independent bundles of command allocator plus constant memory. The
//! CPU writes slot `i` only after the fence stored in slot `i` retired.

use super::constants_data::{LightConstants, MaterialConstants, ObjectConstants, PassConstants};
use crate::gpu::{CommandAllocator, FenceValue};
use crate::scene::{LightId, MaterialId, RenderItemId};

/// CPU-visible constant memory of one slot
#[derive(Debug, Clone)]
pub struct ConstantBuffer<T> {
    pub label: &'static str,
    pub elements: Vec<T>,
    pub write_count: u64,
}

/// Entity counts the constant buffers must hold
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameCapacity {
    pub objects: u32,
    pub materials: u32,
    pub lights: u32,
}

#[derive(Debug)]
pub struct FrameResource {
    pub slot: usize,
    pub allocator: CommandAllocator,
    pub pass: ConstantBuffer<PassConstants>,
    pub objects: ConstantBuffer<ObjectConstants>,
    pub materials: ConstantBuffer<MaterialConstants>,
    pub lights: ConstantBuffer<LightConstants>,

    /// Fence marking the last submission that used this slot
    pub fence: FenceValue,
}

#[derive(Debug)]
pub struct FrameRing {
    pub resources: Vec<FrameResource>,
    pub current: usize,
    pub capacity: FrameCapacity,

    pub frames_acquired: u64,
    /// Acquires that had to block on the slot fence
    pub ring_waits: u64,
    pub rebuilds: u64,
}

/// Entity whose constants changed this frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeEvent {
    Object(RenderItemId),
    Material(MaterialId),
    Light(LightId),
}

/// Edits made since the last drain
#[derive(Debug, Clone, Default)]
pub struct ChangeQueue {
    pub events: Vec<ChangeEvent>,
}

/// Constant writes performed by one propagation step
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PropagationStats {
    pub objects_written: u32,
    pub materials_written: u32,
    pub lights_written: u32,
}
