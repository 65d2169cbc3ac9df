// Hearth Deferred - Data-Oriented Programming (DOP) deferred renderer core
//
// Every subsystem is plain data plus free functions:
// - *_data.rs holds structs with no behaviour
// - *_operations.rs transforms that data
// - the only trait objects are the GPU backend and the scene content
//
// Frame loop: integrate lights -> grow ring if needed -> acquire slot ->
// propagate dirty constants -> octree cull + LOD -> record passes ->
// submit, signal, present.

// Constants module
pub mod constants;

// Ambient
pub mod config;
pub mod error;
pub mod logging;

// Math and view
pub mod camera;
pub mod math;

// GPU boundary, fences and backends
pub mod gpu;

// Per-frame resources and scene data
pub mod frame;
pub mod scene;

// Culling
pub mod spatial;
pub mod visibility;

// Frame recording
pub mod particles;
pub mod render_graph;

// Orchestrator
pub mod engine;

pub use camera::{CameraData, CameraTransformBatch};
pub use config::EngineConfig;
pub use error::{EngineError, EngineResult, ErrorContext, OptionExt};
pub use logging::init_logging;

pub use engine::{
    create_renderer, load_content, run_content_frame, shutdown_renderer, submit_frame, EngineState, FrameInput,
    FrameReport, Renderer, SceneContent,
};
pub use gpu::{create_headless_gpu, GpuBackend, HeadlessConfig, HeadlessTimeline};
pub use render_graph::RenderSettings;
pub use scene::{
    LightDescriptor, LightId, LightKind, MaterialDesc, MeshGeometry, MeshId, RenderItemDesc, RenderItemId,
    TextureUpload, Vertex,
};

#[cfg(feature = "wgpu-backend")]
pub use gpu::{create_wgpu_gpu, create_wgpu_gpu_for_surface, WgpuConfig};

// Re-export wgpu for hosts that create their own surface
#[cfg(feature = "wgpu-backend")]
pub use wgpu;
