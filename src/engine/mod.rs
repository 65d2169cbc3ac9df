/// Engine Module - frame orchestrator
///
/// - engine_data.rs: the renderer state machine and per-frame reports
/// - engine_operations.rs: creation, the frame loop, asset uploads, shutdown
/// - resize_operations.rs: flush-then-recreate for size and sample changes
/// - overlay_operations.rs: UI-editable switches and scene edits
/// - content.rs: `SceneContent`, the driver/content boundary
pub mod content;
pub mod engine_data;
pub mod engine_operations;
pub mod overlay_operations;
pub mod resize_operations;

pub use content::{load_content, run_content_frame, SceneContent};
pub use engine_data::{EngineState, FrameInput, FrameReport, FrameTimer, Renderer, ResizeState};

pub use engine_operations::{
    create_renderer, ensure_device_alive, flush_renderer, guarded, item_drawn_last_frame, load_geometry,
    load_texture, note_error, render_settings_from_config, sample_count_for, shutdown_renderer, submit_frame,
    update_frame_timer, DEFAULT_AMBIENT_LIGHT,
};
pub use overlay_operations::{
    despawn_dynamic_light, edit_item_material, edit_item_transform, edit_item_visible, edit_light, edit_material,
    render_settings, reset_particles, set_ambient_light, set_clear_color, set_debug_light_volumes,
    set_frustum_culling, set_lod_threshold, set_particle_gravity, set_wireframe, spawn_dynamic_light,
};
pub use resize_operations::{begin_resize_drag, end_resize_drag, resize, set_minimized, set_msaa};
