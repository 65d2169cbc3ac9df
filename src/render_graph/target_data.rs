//! Render target data - Pure DOP
//!
//! Size-dependent targets: swap chain back buffers, depth, the three
//! geometry buffers and the intermediate lit target the post-process pass
//! samples.

use rustc_hash::FxHashMap;

use crate::gpu::{ResourceId, ResourceState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetFormat {
    Rgba8Unorm,
    Rgba16Float,
    Rgba32Float,
    R32Float,
    /// Depth 24 + stencil 8, sampled as depth only
    Depth24Stencil8,
    Bgra8UnormSrgb,
    /// Particle storage buffer
    Buffer,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetSet {
    pub width: u32,
    pub height: u32,
    /// Fixed at creation and kept across resizes
    pub back_buffer_count: u32,
    pub current_back_buffer: u32,
    pub sample_count: u32,
    pub recreate_count: u64,
}

/// Resource state at a frame boundary
pub type ResourceStates = FxHashMap<ResourceId, ResourceState>;
