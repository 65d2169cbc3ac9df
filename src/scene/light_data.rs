//! Light data structures - Pure DOP

use super::scene_data::MeshId;
use crate::constants::lights;
use glam::Vec3;

/// Light handle. The generation catches use after despawn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LightId {
    pub index: u32,
    pub generation: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LightKind {
    Ambient,
    Directional,
    Point,
    Spot,
}

impl LightKind {
    /// Shader-side type code
    pub fn code(self) -> u32 {
        match self {
            LightKind::Ambient => lights::LIGHT_TYPE_AMBIENT,
            LightKind::Directional => lights::LIGHT_TYPE_DIRECTIONAL,
            LightKind::Point => lights::LIGHT_TYPE_POINT,
            LightKind::Spot => lights::LIGHT_TYPE_SPOT,
        }
    }
}

/// Light model parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LightDescriptor {
    pub kind: LightKind,
    /// Colour times intensity
    pub strength: Vec3,
    pub falloff_start: f32,
    pub falloff_end: f32,
    pub direction: Vec3,
    pub position: Vec3,
    pub spot_power: f32,
}

impl Default for LightDescriptor {
    fn default() -> Self {
        Self {
            kind: LightKind::Point,
            strength: Vec3::splat(0.5),
            falloff_start: 1.0,
            falloff_end: 10.0,
            direction: Vec3::new(0.0, -1.0, 0.0),
            position: Vec3::ZERO,
            spot_power: 64.0,
        }
    }
}

/// Simple decaying motion of runtime-spawned lights
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LightMotion {
    pub velocity: Vec3,
    /// Fraction of velocity lost per second
    pub linear_damping: f32,
    pub at_rest: bool,
}

#[derive(Debug, Clone)]
pub struct LightItem {
    pub descriptor: LightDescriptor,
    /// Wireframe volume drawn when debug light volumes are on
    pub proxy_mesh: Option<MeshId>,
    /// Light constant buffer slot
    pub slot: u32,
    pub dirty_frames: u32,
    pub motion: Option<LightMotion>,
}

#[derive(Debug, Clone)]
pub struct LightEntry {
    pub generation: u32,
    pub item: Option<LightItem>,
}
