/// Data-Oriented Axis-Aligned Bounding Box
///
/// Pure functions over a plain min/max pair. Boxes are closed: touching
/// faces count as intersecting.
use glam::{Mat4, Vec3};
use serde::{Deserialize, Serialize};

/// Axis-Aligned Bounding Box - pure data structure
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Default for Aabb {
    fn default() -> Self {
        Self {
            min: Vec3::ZERO,
            max: Vec3::ZERO,
        }
    }
}

/// Create new AABB from min/max points
pub fn create_aabb(min: Vec3, max: Vec3) -> Aabb {
    Aabb { min, max }
}

/// Smallest box holding every point; `None` for an empty slice
pub fn aabb_from_points(points: &[Vec3]) -> Option<Aabb> {
    let (first, rest) = points.split_first()?;
    let mut result = Aabb {
        min: *first,
        max: *first,
    };
    for p in rest {
        result.min = result.min.min(*p);
        result.max = result.max.max(*p);
    }
    Some(result)
}

pub fn aabb_center(aabb: &Aabb) -> Vec3 {
    (aabb.min + aabb.max) * 0.5
}

pub fn aabb_half_extents(aabb: &Aabb) -> Vec3 {
    (aabb.max - aabb.min) * 0.5
}

/// Union of two boxes
pub fn aabb_union(a: &Aabb, b: &Aabb) -> Aabb {
    Aabb {
        min: a.min.min(b.min),
        max: a.max.max(b.max),
    }
}

/// Test if two AABBs intersect (closed intervals)
pub fn aabb_intersects(a: &Aabb, b: &Aabb) -> bool {
    a.min.x <= b.max.x
        && a.max.x >= b.min.x
        && a.min.y <= b.max.y
        && a.max.y >= b.min.y
        && a.min.z <= b.max.z
        && a.max.z >= b.min.z
}

/// Test if `outer` fully contains `inner`
pub fn aabb_contains(outer: &Aabb, inner: &Aabb) -> bool {
    outer.min.cmple(inner.min).all() && outer.max.cmpge(inner.max).all()
}

pub fn aabb_contains_point(aabb: &Aabb, point: Vec3) -> bool {
    aabb.min.cmple(point).all() && aabb.max.cmpge(point).all()
}

/// World-space box of an object-space box under `transform`.
///
/// All 8 corners are transformed and re-enclosed, so rotations grow the box
/// rather than clipping it.
pub fn aabb_transformed(aabb: &Aabb, transform: &Mat4) -> Aabb {
    let corners = [
        Vec3::new(aabb.min.x, aabb.min.y, aabb.min.z),
        Vec3::new(aabb.max.x, aabb.min.y, aabb.min.z),
        Vec3::new(aabb.min.x, aabb.max.y, aabb.min.z),
        Vec3::new(aabb.max.x, aabb.max.y, aabb.min.z),
        Vec3::new(aabb.min.x, aabb.min.y, aabb.max.z),
        Vec3::new(aabb.max.x, aabb.min.y, aabb.max.z),
        Vec3::new(aabb.min.x, aabb.max.y, aabb.max.z),
        Vec3::new(aabb.max.x, aabb.max.y, aabb.max.z),
    ];

    let mut min = Vec3::splat(f32::INFINITY);
    let mut max = Vec3::splat(f32::NEG_INFINITY);
    for corner in corners {
        let p = transform.transform_point3(corner);
        min = min.min(p);
        max = max.max(p);
    }
    Aabb { min, max }
}

/// One of the 8 equal octants split at the center.
///
/// Bit 0 of `index` selects the upper x half, bit 1 y, bit 2 z.
pub fn aabb_octant(aabb: &Aabb, index: usize) -> Aabb {
    let center = aabb_center(aabb);
    let pick = |bit: usize, lo: f32, mid: f32, hi: f32| {
        if index & bit == 0 {
            (lo, mid)
        } else {
            (mid, hi)
        }
    };
    let (x0, x1) = pick(1, aabb.min.x, center.x, aabb.max.x);
    let (y0, y1) = pick(2, aabb.min.y, center.y, aabb.max.y);
    let (z0, z1) = pick(4, aabb.min.z, center.z, aabb.max.z);
    Aabb {
        min: Vec3::new(x0, y0, z0),
        max: Vec3::new(x1, y1, z1),
    }
}

pub fn aabb_octants(aabb: &Aabb) -> [Aabb; 8] {
    std::array::from_fn(|i| aabb_octant(aabb, i))
}
