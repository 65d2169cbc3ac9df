//! Engine-wide constants
//!
//! Single source of truth for the fixed numbers the frame loop, culling and
//! particle systems agree on. Runtime-tunable values live in `EngineConfig`
//! and default to these.

/// Frame resource ring constants
pub mod frame {
    /// Number of frame resource slots in flight (triple buffering)
    pub const FRAME_RESOURCE_COUNT: usize = 3;

    /// Smallest ring depth that still overlaps CPU and GPU work
    pub const MIN_FRAME_RESOURCE_COUNT: usize = 2;

    /// Deepest ring we allow; more slots only add latency
    pub const MAX_FRAME_RESOURCE_COUNT: usize = 4;

    /// Back buffers in the swap chain, preserved across resizes
    pub const SWAP_CHAIN_BUFFER_COUNT: u32 = 2;

    /// One pass constant block per frame (main camera)
    pub const PASS_COUNT: u32 = 1;

    /// Headroom added when the ring is rebuilt for grown entity counts
    pub const CAPACITY_GROWTH_HEADROOM: u32 = 8;
}

/// Spatial index constants
pub mod spatial {
    /// Maximum octree subdivision depth (root is depth 0)
    pub const OCTREE_MAX_DEPTH: u32 = 4;

    /// A node holding fewer items than this becomes a leaf
    pub const OCTREE_LEAF_THRESHOLD: usize = 8;

    /// Children per interior node
    pub const OCTANT_COUNT: usize = 8;
}

/// Level-of-detail constants
pub mod lod {
    /// Default LOD switch distance in world units
    pub const DEFAULT_LOD_THRESHOLD: f32 = 50.0;

    /// High detail is selected below `threshold * HIGH_DETAIL_FRACTION`
    pub const HIGH_DETAIL_FRACTION: f32 = 0.5;
}

/// GPU particle constants
pub mod particles {
    /// Compute workgroup width of the particle simulation shader
    pub const WORKGROUP_SIZE: u32 = 256;

    /// Default particle buffer capacity
    pub const DEFAULT_CAPACITY: u32 = 1024;

    /// Seconds between emission bursts
    pub const EMIT_INTERVAL_SECONDS: f32 = 0.05;

    /// Particles spawned per emission burst
    pub const EMIT_BATCH: u32 = 5;

    /// Lifetime of a freshly emitted particle in seconds
    pub const PARTICLE_LIFETIME_SECONDS: f32 = 5.0;

    /// Default external force (gravity)
    pub const DEFAULT_FORCE: [f32; 3] = [0.0, -9.8, 0.0];

    /// Alpha lost per second of particle life
    pub const ALPHA_FADE_PER_SECOND: f32 = -0.5;
}

/// Light model constants
pub mod lights {
    /// Shader-side light type codes
    pub const LIGHT_TYPE_AMBIENT: u32 = 0;
    pub const LIGHT_TYPE_DIRECTIONAL: u32 = 1;
    pub const LIGHT_TYPE_POINT: u32 = 2;
    pub const LIGHT_TYPE_SPOT: u32 = 3;

    /// Dynamic lights slower than this are considered at rest
    pub const DEFAULT_REST_SPEED: f32 = 0.01;

    /// Default linear damping applied to dynamic light velocity per second
    pub const DEFAULT_LINEAR_DAMPING: f32 = 1.5;
}

/// Descriptor table layout
pub mod descriptors {
    /// Slot 0 of the texture table always holds the checkerboard error texture
    pub const ERROR_TEXTURE_SLOT: u32 = 0;

    /// Total shader-visible texture slots
    pub const TEXTURE_TABLE_CAPACITY: u32 = 256;

    /// Name of the fallback material registered with every scene
    pub const ERROR_MATERIAL_NAME: &str = "__error_material";
}

/// Render target layout
pub mod targets {
    /// Geometry buffer render targets (albedo, normal, roughness/specular)
    pub const GBUFFER_TARGET_COUNT: usize = 3;

    /// Default client size when the host has not reported one yet
    pub const DEFAULT_WIDTH: u32 = 800;
    pub const DEFAULT_HEIGHT: u32 = 800;

    /// Largest texture side we will allocate
    pub const MAX_TARGET_DIMENSION: u32 = 16384;
}
