//! Frame graph data - Pure DOP

use crate::gpu::{CommandList, PipelineHandle};
use crate::scene::SceneData;
use crate::visibility::DrawList;

use super::pipeline_library::PipelineLibrary;
use super::target_data::TargetSet;

/// Overlay-editable render switches
#[derive(Debug, Clone, PartialEq)]
pub struct RenderSettings {
    pub wireframe: bool,
    pub frustum_culling: bool,
    pub lod_threshold: f32,
    pub debug_light_volumes: bool,
    pub msaa_4x: bool,
    pub clear_color: [f32; 4],
}

/// Handles the scene passes need, resolved before anything is recorded
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScenePipelines {
    pub geometry_opaque: PipelineHandle,
    pub geometry_tessellated: PipelineHandle,
    pub light_fullscreen: PipelineHandle,
    pub light_sphere: PipelineHandle,
    pub light_cylinder: PipelineHandle,
    pub light_debug: Option<PipelineHandle>,
    pub particle_simulate: PipelineHandle,
    pub particle_render: PipelineHandle,
    pub post_process: PipelineHandle,
}

/// Everything the frame graph reads while recording
pub struct FrameRecordContext<'a> {
    pub scene: &'a SceneData,
    pub draw_list: &'a DrawList,
    pub pipelines: &'a PipelineLibrary,
    pub targets: &'a TargetSet,
    pub settings: &'a RenderSettings,
    pub delta_time: f32,
}

/// Draw calls recorded per pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassDrawCounts {
    pub particle_dispatches: u32,
    pub geometry: u32,
    pub lighting: u32,
    pub overlay: u32,
    pub post_process: u32,
    pub ui: u32,
}

#[derive(Debug, Clone)]
pub struct RecordedFrame {
    /// `None` when the 3D passes could not be recorded
    pub scene: Option<CommandList>,
    pub ui: CommandList,
    pub draws: PassDrawCounts,
    pub scene_error: Option<String>,
}
