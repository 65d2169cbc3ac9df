//! Camera data structures - Pure DOP
//!
//! NO METHODS. Just data.
//! All transformations happen in camera_operations.rs

use glam::Vec3;

/// Camera data structure - pure data, no methods
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraData {
    /// Eye position in world space
    pub position: Vec3,

    /// Yaw rotation (radians, around Y axis). Zero looks down +X
    pub yaw_radians: f32,

    /// Pitch rotation (radians, around X axis)
    pub pitch_radians: f32,

    /// Field of view (vertical, radians)
    pub fov_radians: f32,

    /// Aspect ratio (width / height)
    pub aspect_ratio: f32,

    pub near_plane: f32,
    pub far_plane: f32,

    /// Movement speed (world units per second)
    pub movement_speed: f32,

    /// Rotation sensitivity (radians per input unit)
    pub rotation_sensitivity: f32,
}

/// Movement and rotation deltas resolved by the host's input layer.
/// Applied once per frame; movement is scaled by frame delta time.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CameraTransformBatch {
    pub forward_delta: f32,
    pub right_delta: f32,
    pub up_delta: f32,

    /// Yaw rotation delta (radians)
    pub yaw_delta: f32,

    /// Pitch rotation delta (radians)
    pub pitch_delta: f32,

    /// FOV delta (radians)
    pub fov_delta: f32,
}

impl Default for CameraData {
    fn default() -> Self {
        Self {
            position: Vec3::new(0.0, 5.0, 20.0),
            yaw_radians: -std::f32::consts::FRAC_PI_2,
            pitch_radians: 0.0,
            fov_radians: 45.0_f32.to_radians(),
            aspect_ratio: 1.0,
            near_plane: 1.0,
            far_plane: 1000.0,
            movement_speed: 10.0,
            rotation_sensitivity: 0.25_f32.to_radians(),
        }
    }
}
