//! View frustum extraction and containment tests
//!
//! Planes come from the view-projection matrix (Gribb-Hartmann), so the
//! frustum lives in world space and can be tested directly against
//! world-space boxes. Normals point inward.

use super::aabb::Aabb;
use glam::{Mat4, Vec3, Vec4};

/// Plane `normal . p + d = 0`, normal pointing into the frustum
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plane {
    pub normal: Vec3,
    pub d: f32,
}

/// Six inward-facing planes: left, right, bottom, top, near, far
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frustum {
    pub planes: [Plane; 6],
}

/// Result of a box-versus-frustum test
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Containment {
    Outside,
    Intersecting,
    Inside,
}

/// Normalize plane equation
pub fn normalize_plane(v: Vec4) -> Plane {
    let normal = v.truncate();
    let length = normal.length();
    if length > 0.0 {
        Plane {
            normal: normal / length,
            d: v.w / length,
        }
    } else {
        Plane { normal, d: v.w }
    }
}

/// Extract frustum planes from a view-projection matrix.
///
/// Expects a 0..1 clip depth range (glam `perspective_rh`), so the near
/// plane is row 2 alone rather than row 3 + row 2.
pub fn extract_frustum(view_proj: &Mat4) -> Frustum {
    let r0 = view_proj.row(0);
    let r1 = view_proj.row(1);
    let r2 = view_proj.row(2);
    let r3 = view_proj.row(3);

    Frustum {
        planes: [
            normalize_plane(r3 + r0),
            normalize_plane(r3 - r0),
            normalize_plane(r3 + r1),
            normalize_plane(r3 - r1),
            normalize_plane(r2),
            normalize_plane(r3 - r2),
        ],
    }
}

fn signed_distance(plane: &Plane, point: Vec3) -> f32 {
    plane.normal.dot(point) + plane.d
}

pub fn frustum_contains_point(frustum: &Frustum, point: Vec3) -> bool {
    frustum
        .planes
        .iter()
        .all(|plane| signed_distance(plane, point) >= 0.0)
}

/// Classify a world-space box against the frustum.
///
/// Uses the positive/negative vertex per plane. Conservative: a box near a
/// frustum corner may report `Intersecting` while lying just outside.
pub fn classify_aabb(frustum: &Frustum, aabb: &Aabb) -> Containment {
    let mut result = Containment::Inside;

    for plane in &frustum.planes {
        let n = plane.normal;
        let positive = Vec3::new(
            if n.x >= 0.0 { aabb.max.x } else { aabb.min.x },
            if n.y >= 0.0 { aabb.max.y } else { aabb.min.y },
            if n.z >= 0.0 { aabb.max.z } else { aabb.min.z },
        );
        if signed_distance(plane, positive) < 0.0 {
            return Containment::Outside;
        }

        let negative = Vec3::new(
            if n.x >= 0.0 { aabb.min.x } else { aabb.max.x },
            if n.y >= 0.0 { aabb.min.y } else { aabb.max.y },
            if n.z >= 0.0 { aabb.min.z } else { aabb.max.z },
        );
        if signed_distance(plane, negative) < 0.0 {
            result = Containment::Intersecting;
        }
    }

    result
}

#[inline]
pub fn frustum_intersects_aabb(frustum: &Frustum, aabb: &Aabb) -> bool {
    classify_aabb(frustum, aabb) != Containment::Outside
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::aabb::create_aabb;

    fn looking_down_negative_z() -> Frustum {
        let view = Mat4::look_at_rh(Vec3::ZERO, Vec3::new(0.0, 0.0, -1.0), Vec3::Y);
        let proj = Mat4::perspective_rh(60.0_f32.to_radians(), 1.0, 1.0, 100.0);
        extract_frustum(&(proj * view))
    }

    #[test]
    fn test_box_in_front_is_inside() {
        let frustum = looking_down_negative_z();
        let b = create_aabb(Vec3::new(-1.0, -1.0, -11.0), Vec3::new(1.0, 1.0, -9.0));
        assert_eq!(classify_aabb(&frustum, &b), Containment::Inside);
    }

    #[test]
    fn test_box_behind_is_outside() {
        let frustum = looking_down_negative_z();
        let b = create_aabb(Vec3::new(-1.0, -1.0, 9.0), Vec3::new(1.0, 1.0, 11.0));
        assert_eq!(classify_aabb(&frustum, &b), Containment::Outside);
    }

    #[test]
    fn test_box_beyond_far_plane_is_outside() {
        let frustum = looking_down_negative_z();
        let b = create_aabb(Vec3::new(-1.0, -1.0, -210.0), Vec3::new(1.0, 1.0, -200.0));
        assert!(!frustum_intersects_aabb(&frustum, &b));
    }

    #[test]
    fn test_box_straddling_near_plane_intersects() {
        let frustum = looking_down_negative_z();
        let b = create_aabb(Vec3::new(-0.1, -0.1, -2.0), Vec3::new(0.1, 0.1, 2.0));
        assert_eq!(classify_aabb(&frustum, &b), Containment::Intersecting);
    }

    #[test]
    fn test_point_containment() {
        let frustum = looking_down_negative_z();
        assert!(frustum_contains_point(&frustum, Vec3::new(0.0, 0.0, -50.0)));
        assert!(!frustum_contains_point(&frustum, Vec3::new(0.0, 0.0, 50.0)));
        assert!(!frustum_contains_point(&frustum, Vec3::new(100.0, 0.0, -10.0)));
    }

    #[test]
    fn test_planes_are_normalized() {
        let frustum = looking_down_negative_z();
        for plane in &frustum.planes {
            assert!((plane.normal.length() - 1.0).abs() < 1e-5);
        }
    }
}
