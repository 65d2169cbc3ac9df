//! Engine configuration
//!
//! Plain data loaded from TOML with every field defaulted, so a config file
//! only needs to name what it changes. `validate` is run by the orchestrator
//! before any GPU object is created.

use crate::constants::{frame, lights, lod, particles, spatial, targets};
use crate::error::{EngineError, EngineResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub window_width: u32,
    pub window_height: u32,

    /// Frame resource slots in flight
    pub frame_resource_count: usize,
    pub swap_chain_buffer_count: u32,

    pub octree_max_depth: u32,
    pub octree_leaf_threshold: usize,

    pub lod_threshold: f32,
    pub frustum_culling: bool,
    pub wireframe: bool,
    pub debug_light_volumes: bool,
    pub msaa_4x: bool,
    pub clear_color: [f32; 4],

    pub particle_capacity: u32,
    pub particle_emit_interval: f32,
    pub particle_emit_batch: u32,
    pub particle_lifetime: f32,
    pub particle_origin: [f32; 3],
    pub particle_force: [f32; 3],
    /// Seed for emission velocities; fixed so runs are reproducible
    pub particle_seed: u64,

    pub camera_fov_degrees: f32,
    pub camera_near: f32,
    pub camera_far: f32,

    pub light_linear_damping: f32,
    pub light_rest_speed: f32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            window_width: targets::DEFAULT_WIDTH,
            window_height: targets::DEFAULT_HEIGHT,
            frame_resource_count: frame::FRAME_RESOURCE_COUNT,
            swap_chain_buffer_count: frame::SWAP_CHAIN_BUFFER_COUNT,
            octree_max_depth: spatial::OCTREE_MAX_DEPTH,
            octree_leaf_threshold: spatial::OCTREE_LEAF_THRESHOLD,
            lod_threshold: lod::DEFAULT_LOD_THRESHOLD,
            frustum_culling: true,
            wireframe: false,
            debug_light_volumes: false,
            msaa_4x: false,
            clear_color: [0.0, 0.0, 0.0, 1.0],
            particle_capacity: particles::DEFAULT_CAPACITY,
            particle_emit_interval: particles::EMIT_INTERVAL_SECONDS,
            particle_emit_batch: particles::EMIT_BATCH,
            particle_lifetime: particles::PARTICLE_LIFETIME_SECONDS,
            particle_origin: [0.0, 0.0, 0.0],
            particle_force: particles::DEFAULT_FORCE,
            particle_seed: 0x5EED,
            camera_fov_degrees: 45.0,
            camera_near: 1.0,
            camera_far: 1000.0,
            light_linear_damping: lights::DEFAULT_LINEAR_DAMPING,
            light_rest_speed: lights::DEFAULT_REST_SPEED,
        }
    }
}

fn invalid(field: &str, value: impl ToString, reason: &str) -> EngineError {
    EngineError::InvalidConfig {
        field: field.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

impl EngineConfig {
    /// Parse a TOML document; missing keys take their defaults
    pub fn from_toml_str(text: &str) -> EngineResult<Self> {
        let config: EngineConfig = toml::from_str(text)?;
        Ok(config)
    }

    /// Load and validate a TOML config file
    pub fn load(path: impl AsRef<Path>) -> EngineResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| EngineError::ConfigLoad {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;

        let config = Self::from_toml_str(&text).map_err(|e| match e {
            EngineError::ConfigLoad { error, .. } => EngineError::ConfigLoad {
                path: path.display().to_string(),
                error,
            },
            other => other,
        })?;

        config.validate()?;
        log::info!("[EngineConfig::load] Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn to_toml_string(&self) -> EngineResult<String> {
        toml::to_string_pretty(self).map_err(|e| EngineError::Internal {
            message: format!("config serialization failed: {}", e),
        })
    }

    /// Validate configuration parameters
    pub fn validate(&self) -> EngineResult<()> {
        if self.window_width > targets::MAX_TARGET_DIMENSION {
            return Err(invalid("window_width", self.window_width, "exceeds maximum texture size"));
        }
        if self.window_height > targets::MAX_TARGET_DIMENSION {
            return Err(invalid("window_height", self.window_height, "exceeds maximum texture size"));
        }

        if self.frame_resource_count < frame::MIN_FRAME_RESOURCE_COUNT
            || self.frame_resource_count > frame::MAX_FRAME_RESOURCE_COUNT
        {
            return Err(invalid(
                "frame_resource_count",
                self.frame_resource_count,
                "must be between 2 and 4",
            ));
        }

        if self.swap_chain_buffer_count < 2 {
            return Err(invalid(
                "swap_chain_buffer_count",
                self.swap_chain_buffer_count,
                "need at least two back buffers",
            ));
        }

        if self.octree_max_depth > 8 {
            return Err(invalid("octree_max_depth", self.octree_max_depth, "must be at most 8"));
        }
        if self.octree_leaf_threshold == 0 {
            return Err(invalid("octree_leaf_threshold", 0, "must be non-zero"));
        }

        if !(self.lod_threshold > 0.0) {
            return Err(invalid("lod_threshold", self.lod_threshold, "must be positive"));
        }

        if self.particle_capacity == 0 {
            return Err(invalid("particle_capacity", 0, "must be non-zero"));
        }
        if !(self.particle_emit_interval > 0.0) {
            return Err(invalid(
                "particle_emit_interval",
                self.particle_emit_interval,
                "must be positive",
            ));
        }
        if !(self.particle_lifetime > 0.0) {
            return Err(invalid("particle_lifetime", self.particle_lifetime, "must be positive"));
        }

        if !(self.camera_fov_degrees > 1.0 && self.camera_fov_degrees < 179.0) {
            return Err(invalid(
                "camera_fov_degrees",
                self.camera_fov_degrees,
                "must be within (1, 179)",
            ));
        }
        if !(self.camera_near > 0.0) || self.camera_far <= self.camera_near {
            return Err(invalid(
                "camera_near",
                self.camera_near,
                "near plane must be positive and closer than the far plane",
            ));
        }

        if self.light_linear_damping < 0.0 {
            return Err(invalid(
                "light_linear_damping",
                self.light_linear_damping,
                "must not be negative",
            ));
        }
        if self.light_rest_speed < 0.0 {
            return Err(invalid("light_rest_speed", self.light_rest_speed, "must not be negative"));
        }

        log::info!("[EngineConfig] Configuration validated successfully");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.frame_resource_count, 3);
        assert_eq!(config.swap_chain_buffer_count, 2);
        assert_eq!(config.octree_max_depth, 4);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = EngineConfig::from_toml_str(
            "frame_resource_count = 2\nlod_threshold = 80.0\nwireframe = true\n",
        )
        .expect("partial config should parse");

        assert_eq!(config.frame_resource_count, 2);
        assert_eq!(config.lod_threshold, 80.0);
        assert!(config.wireframe);
        assert_eq!(config.particle_capacity, particles::DEFAULT_CAPACITY);
    }

    #[test]
    fn test_ring_depth_out_of_range_rejected() {
        let config = EngineConfig {
            frame_resource_count: 5,
            ..Default::default()
        };
        match config.validate() {
            Err(EngineError::InvalidConfig { field, .. }) => {
                assert_eq!(field, "frame_resource_count")
            }
            other => panic!("expected InvalidConfig, got {:?}", other),
        }
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(file, "window_width = 1280").expect("write");
        writeln!(file, "window_height = 720").expect("write");
        writeln!(file, "particle_force = [0.0, -4.9, 0.0]").expect("write");

        let config = EngineConfig::load(file.path()).expect("config should load");
        assert_eq!(config.window_width, 1280);
        assert_eq!(config.window_height, 720);
        assert_eq!(config.particle_force, [0.0, -4.9, 0.0]);
    }

    #[test]
    fn test_load_reports_path_on_parse_error() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(file, "window_width = \"wide\"").expect("write");

        match EngineConfig::load(file.path()) {
            Err(EngineError::ConfigLoad { path, .. }) => {
                assert_eq!(path, file.path().display().to_string())
            }
            other => panic!("expected ConfigLoad, got {:?}", other),
        }
    }

    #[test]
    fn test_toml_round_trip_preserves_values() {
        let config = EngineConfig {
            msaa_4x: true,
            light_rest_speed: 0.5,
            ..Default::default()
        };
        let text = config.to_toml_string().expect("serialize");
        let parsed = EngineConfig::from_toml_str(&text).expect("parse");
        assert_eq!(parsed, config);
    }
}
