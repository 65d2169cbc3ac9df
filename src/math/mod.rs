//! Math Module - bounding volumes and view frustums
//!
//! Pure data plus pure functions, glam underneath.

pub mod aabb;
pub mod frustum;

pub use aabb::{
    aabb_center, aabb_contains, aabb_contains_point, aabb_from_points, aabb_half_extents,
    aabb_intersects, aabb_octant, aabb_octants, aabb_transformed, aabb_union, create_aabb, Aabb,
};
pub use frustum::{
    classify_aabb, extract_frustum, frustum_contains_point, frustum_intersects_aabb,
    normalize_plane, Containment, Frustum, Plane,
};
