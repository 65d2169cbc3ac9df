/// Camera Module - Data-Oriented Programming (DOP) style
///
/// - camera_data.rs: Pure data structures with NO methods
/// - camera_operations.rs: Pure functions that operate on data
pub mod camera_data;
pub mod camera_operations;

pub use camera_data::{CameraData, CameraTransformBatch};

pub use camera_operations::{
    // Initialization
    init_camera,
    init_camera_from_config,

    // View/projection
    build_projection_matrix,
    build_view_matrix,
    build_view_projection,
    camera_frustum,

    // Updates
    update_aspect_ratio,
    update_fov,

    // Movement
    move_forward,
    move_right,
    move_up,
    rotate,

    // Batch operations
    apply_transform_batch,

    // Utilities
    calculate_forward_vector,
    calculate_right_vector,
    log_camera_context,
};
