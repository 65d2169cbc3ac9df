//! Camera operations - Pure DOP functions
//!
//! All functions are pure: they take data, return new data, no side effects.

use super::camera_data::{CameraData, CameraTransformBatch};
use crate::config::EngineConfig;
use crate::math::{extract_frustum, Frustum};
use glam::{Mat4, Vec3};

// ============================================================================
// INITIALIZATION
// ============================================================================

/// Initialize camera at a position with a given orientation
pub fn init_camera(position: Vec3, yaw: f32, pitch: f32) -> CameraData {
    CameraData {
        position,
        yaw_radians: yaw,
        pitch_radians: pitch,
        ..Default::default()
    }
}

/// Initialize camera lens settings from engine config
pub fn init_camera_from_config(config: &EngineConfig) -> CameraData {
    let camera = CameraData {
        fov_radians: config.camera_fov_degrees.to_radians(),
        near_plane: config.camera_near,
        far_plane: config.camera_far,
        ..Default::default()
    };
    update_aspect_ratio(&camera, config.window_width, config.window_height)
}

// ============================================================================
// VIEW/PROJECTION MATRICES
// ============================================================================

/// Build view matrix from camera data
pub fn build_view_matrix(camera: &CameraData) -> Mat4 {
    let forward = calculate_forward_vector(camera.yaw_radians, camera.pitch_radians);
    Mat4::look_at_rh(camera.position, camera.position + forward, Vec3::Y)
}

/// Build projection matrix from camera data (0..1 clip depth)
pub fn build_projection_matrix(camera: &CameraData) -> Mat4 {
    Mat4::perspective_rh(
        camera.fov_radians,
        camera.aspect_ratio,
        camera.near_plane,
        camera.far_plane,
    )
}

pub fn build_view_projection(camera: &CameraData) -> Mat4 {
    build_projection_matrix(camera) * build_view_matrix(camera)
}

/// World-space culling frustum for the camera
pub fn camera_frustum(camera: &CameraData) -> Frustum {
    extract_frustum(&build_view_projection(camera))
}

// ============================================================================
// UPDATES
// ============================================================================

/// Update aspect ratio on resize. Zero-sized surfaces keep the old ratio
pub fn update_aspect_ratio(camera: &CameraData, width: u32, height: u32) -> CameraData {
    let mut new_camera = *camera;
    if width > 0 && height > 0 {
        new_camera.aspect_ratio = width as f32 / height as f32;
    }
    new_camera
}

pub fn update_fov(camera: &CameraData, fov_degrees: f32) -> CameraData {
    let mut new_camera = *camera;
    new_camera.fov_radians = fov_degrees.to_radians();
    new_camera
}

// ============================================================================
// MOVEMENT
// ============================================================================

/// Move camera forward by distance (in camera's forward direction)
pub fn move_forward(camera: &CameraData, distance: f32) -> CameraData {
    let forward = calculate_forward_vector(camera.yaw_radians, camera.pitch_radians);
    let mut new_camera = *camera;
    new_camera.position += forward * distance;
    new_camera
}

/// Move camera right by distance (in camera's right direction)
pub fn move_right(camera: &CameraData, distance: f32) -> CameraData {
    let right = calculate_right_vector(camera.yaw_radians);
    let mut new_camera = *camera;
    new_camera.position += right * distance;
    new_camera
}

/// Move camera up by distance (in world up direction)
pub fn move_up(camera: &CameraData, distance: f32) -> CameraData {
    let mut new_camera = *camera;
    new_camera.position.y += distance;
    new_camera
}

/// Rotate camera by yaw/pitch deltas (radians)
pub fn rotate(camera: &CameraData, yaw_delta: f32, pitch_delta: f32) -> CameraData {
    let mut new_camera = *camera;
    new_camera.yaw_radians += yaw_delta;
    new_camera.pitch_radians += pitch_delta;

    // Clamp pitch to avoid gimbal lock
    const PITCH_LIMIT: f32 = std::f32::consts::FRAC_PI_2 - 0.01;
    new_camera.pitch_radians = new_camera.pitch_radians.clamp(-PITCH_LIMIT, PITCH_LIMIT);

    new_camera
}

// ============================================================================
// BATCH OPERATIONS
// ============================================================================

/// Apply one frame of input deltas
pub fn apply_transform_batch(
    camera: &CameraData,
    batch: &CameraTransformBatch,
    delta_time: f32,
) -> CameraData {
    let mut result = rotate(camera, batch.yaw_delta, batch.pitch_delta);

    let step = camera.movement_speed * delta_time;
    result = move_forward(&result, batch.forward_delta * step);
    result = move_right(&result, batch.right_delta * step);
    result = move_up(&result, batch.up_delta * step);

    if batch.fov_delta.abs() > 0.001 {
        result.fov_radians = (result.fov_radians + batch.fov_delta).clamp(0.1, 3.0);
    }

    result
}

// ============================================================================
// UTILITIES
// ============================================================================

/// Calculate forward vector from yaw and pitch
pub fn calculate_forward_vector(yaw: f32, pitch: f32) -> Vec3 {
    Vec3::new(yaw.cos() * pitch.cos(), pitch.sin(), yaw.sin() * pitch.cos()).normalize()
}

/// Calculate right vector from yaw
pub fn calculate_right_vector(yaw: f32) -> Vec3 {
    let forward = Vec3::new(yaw.cos(), 0.0, yaw.sin());
    forward.cross(Vec3::Y).normalize()
}

pub fn log_camera_context(camera: &CameraData) {
    log::debug!(
        "[Camera] Position: ({:.1}, {:.1}, {:.1}) | Yaw: {:.1}° | Pitch: {:.1}° | FOV: {:.1}° | Aspect: {:.3}",
        camera.position.x,
        camera.position.y,
        camera.position.z,
        camera.yaw_radians.to_degrees(),
        camera.pitch_radians.to_degrees(),
        camera.fov_radians.to_degrees(),
        camera.aspect_ratio
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_camera_looks_down_negative_z() {
        let camera = CameraData::default();
        let forward = calculate_forward_vector(camera.yaw_radians, camera.pitch_radians);
        assert!((forward - Vec3::new(0.0, 0.0, -1.0)).length() < 1e-5);

        let right = calculate_right_vector(camera.yaw_radians);
        assert!((right - Vec3::X).length() < 1e-5);
    }

    #[test]
    fn test_aspect_ratio_follows_resize() {
        let camera = CameraData::default();
        let resized = update_aspect_ratio(&camera, 1600, 900);
        assert!((resized.aspect_ratio - 16.0 / 9.0).abs() < 1e-6);

        let minimized = update_aspect_ratio(&resized, 0, 0);
        assert_eq!(minimized.aspect_ratio, resized.aspect_ratio);
    }

    #[test]
    fn test_pitch_is_clamped() {
        let camera = rotate(&CameraData::default(), 0.0, 10.0);
        assert!(camera.pitch_radians < std::f32::consts::FRAC_PI_2);
    }

    #[test]
    fn test_transform_batch_scales_by_delta_time() {
        let camera = init_camera(Vec3::ZERO, -std::f32::consts::FRAC_PI_2, 0.0);
        let batch = CameraTransformBatch {
            forward_delta: 1.0,
            ..Default::default()
        };
        let moved = apply_transform_batch(&camera, &batch, 0.5);
        let expected = Vec3::new(0.0, 0.0, -camera.movement_speed * 0.5);
        assert!((moved.position - expected).length() < 1e-4);
    }

    #[test]
    fn test_frustum_sees_what_is_in_front() {
        let camera = init_camera(Vec3::ZERO, -std::f32::consts::FRAC_PI_2, 0.0);
        let frustum = camera_frustum(&camera);
        assert!(crate::math::frustum_contains_point(&frustum, Vec3::new(0.0, 0.0, -10.0)));
        assert!(!crate::math::frustum_contains_point(&frustum, Vec3::new(0.0, 0.0, 10.0)));
    }
}
