/// Render Graph Module - deferred frame recording
///
/// - pipeline_library.rs: fixed pipeline descriptions by key, handle table
/// - target_data.rs / target_operations.rs: size-dependent render targets
/// - state_tracker.rs: resource state replay and hazard detection
/// - graph_data.rs / graph_operations.rs: per-frame pass ordering and barriers
pub mod graph_data;
pub mod graph_operations;
pub mod pipeline_library;
pub mod state_tracker;
pub mod target_data;
pub mod target_operations;

pub use graph_data::{FrameRecordContext, PassDrawCounts, RecordedFrame, RenderSettings, ScenePipelines};
pub use pipeline_library::{PipelineKey, PipelineLibrary};
pub use state_tracker::{StateTracker, StateViolation};
pub use target_data::{ResourceStates, TargetFormat, TargetSet};

pub use graph_operations::{record_frame, record_scene_passes, record_ui_pass, resolve_scene_pipelines};
pub use pipeline_library::{
    create_pipeline_library, create_pipeline_library_for, geometry_pipeline_key, light_pipeline_key,
    pipeline_desc_for, pipeline_handle,
};
pub use state_tracker::{
    apply_command, check_present, create_state_tracker, diff_states, resource_state, validate_command_list,
};
pub use target_operations::{
    all_resources, create_target_set, current_back_buffer, initial_resource_states, resize_target_set,
    rotate_back_buffer, set_sample_count, target_format,
};
