//! Pipeline state descriptions - Pure DOP
//!
//! Fixed-function state for one pipeline, independent of any graphics API.
//! Shaders are opaque keys the host registers source for.

/// Integer handle issued when a pipeline is registered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PipelineHandle(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendMode {
    Opaque,
    /// Source one, dest one
    Additive,
    AlphaBlend,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DepthMode {
    Disabled,
    /// Test and write, less-equal
    ReadWrite,
    /// Test only
    ReadOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CullMode {
    None,
    Back,
    Front,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FillMode {
    Solid,
    Wireframe,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topology {
    TriangleList,
    PointList,
    LineList,
}

/// Which render target layout the pipeline writes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetLayout {
    GBuffer,
    Lit,
    BackBuffer,
    Compute,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShaderPair {
    pub vertex: &'static str,
    /// Fragment shader key, or the compute shader key for compute pipelines
    pub fragment: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PipelineDesc {
    pub label: &'static str,
    pub shaders: ShaderPair,
    pub blend: BlendMode,
    pub depth: DepthMode,
    pub cull: CullMode,
    pub fill: FillMode,
    pub topology: Topology,
    pub targets: TargetLayout,
    pub sample_count: u32,
}
