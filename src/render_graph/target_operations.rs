//! Render target operations

use super::target_data::{ResourceStates, TargetFormat, TargetSet};
use crate::constants::targets::MAX_TARGET_DIMENSION;
use crate::error::{EngineError, EngineResult};
use crate::gpu::{GBufferSlot, ResourceId, ResourceState};
use crate::particles::ParticleBufferId;

fn validate_size(width: u32, height: u32) -> EngineResult<()> {
    for (field, value) in [("width", width), ("height", height)] {
        if value == 0 || value > MAX_TARGET_DIMENSION {
            return Err(EngineError::InvalidConfig {
                field: field.to_string(),
                value: value.to_string(),
                reason: format!("must be between 1 and {}", MAX_TARGET_DIMENSION),
            });
        }
    }
    Ok(())
}

pub fn create_target_set(width: u32, height: u32, back_buffer_count: u32, sample_count: u32) -> EngineResult<TargetSet> {
    validate_size(width, height)?;
    if back_buffer_count < 2 {
        return Err(EngineError::InvalidConfig {
            field: "swap_chain_buffer_count".to_string(),
            value: back_buffer_count.to_string(),
            reason: "need at least two back buffers".to_string(),
        });
    }
    Ok(TargetSet {
        width,
        height,
        back_buffer_count,
        current_back_buffer: 0,
        sample_count,
        recreate_count: 0,
    })
}

/// Apply a new client size. Returns false for zero or unchanged sizes.
///
/// The back buffer index restarts at 0, as a swap chain resize does.
pub fn resize_target_set(targets: &mut TargetSet, width: u32, height: u32) -> bool {
    if width == 0 || height == 0 {
        return false;
    }
    if width == targets.width && height == targets.height {
        return false;
    }
    targets.width = width.min(MAX_TARGET_DIMENSION);
    targets.height = height.min(MAX_TARGET_DIMENSION);
    targets.current_back_buffer = 0;
    targets.recreate_count += 1;
    true
}

/// Returns false if nothing changed
pub fn set_sample_count(targets: &mut TargetSet, sample_count: u32) -> bool {
    if targets.sample_count == sample_count {
        return false;
    }
    targets.sample_count = sample_count;
    targets.recreate_count += 1;
    true
}

pub fn current_back_buffer(targets: &TargetSet) -> ResourceId {
    ResourceId::BackBuffer(targets.current_back_buffer)
}

/// Advance after present
pub fn rotate_back_buffer(targets: &mut TargetSet) {
    targets.current_back_buffer = (targets.current_back_buffer + 1) % targets.back_buffer_count;
}

pub fn target_format(resource: ResourceId) -> TargetFormat {
    match resource {
        ResourceId::BackBuffer(_) => TargetFormat::Bgra8UnormSrgb,
        ResourceId::DepthStencil => TargetFormat::Depth24Stencil8,
        ResourceId::GBuffer(GBufferSlot::Albedo) => TargetFormat::Rgba8Unorm,
        ResourceId::GBuffer(GBufferSlot::Normal) => TargetFormat::Rgba32Float,
        ResourceId::GBuffer(GBufferSlot::Specular) => TargetFormat::R32Float,
        ResourceId::LitTarget => TargetFormat::Rgba16Float,
        ResourceId::Particles(_) => TargetFormat::Buffer,
    }
}

/// Every tracked resource
pub fn all_resources(targets: &TargetSet) -> Vec<ResourceId> {
    let mut resources: Vec<ResourceId> = (0..targets.back_buffer_count).map(ResourceId::BackBuffer).collect();
    resources.push(ResourceId::DepthStencil);
    resources.extend(GBufferSlot::ALL.iter().map(|slot| ResourceId::GBuffer(*slot)));
    resources.push(ResourceId::LitTarget);
    resources.push(ResourceId::Particles(ParticleBufferId::A));
    resources.push(ResourceId::Particles(ParticleBufferId::B));
    resources
}

/// States every resource is in between frames. A recorded frame must leave
/// them exactly like this
pub fn initial_resource_states(targets: &TargetSet) -> ResourceStates {
    all_resources(targets)
        .into_iter()
        .map(|resource| {
            let state = match resource {
                ResourceId::BackBuffer(_) => ResourceState::Present,
                ResourceId::DepthStencil => ResourceState::DepthWrite,
                ResourceId::GBuffer(_) | ResourceId::LitTarget => ResourceState::RenderTarget,
                ResourceId::Particles(_) => ResourceState::ShaderResource,
            };
            (resource, state)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resize_ignores_zero_and_same_size() {
        let mut targets = create_target_set(800, 600, 2, 1).expect("targets");
        assert!(!resize_target_set(&mut targets, 0, 600));
        assert!(!resize_target_set(&mut targets, 800, 600));
        assert!(resize_target_set(&mut targets, 1024, 768));
        assert_eq!((targets.width, targets.height), (1024, 768));
        assert_eq!(targets.back_buffer_count, 2);
        assert_eq!(targets.recreate_count, 1);
    }

    #[test]
    fn test_back_buffer_rotation() {
        let mut targets = create_target_set(64, 64, 2, 1).expect("targets");
        assert_eq!(current_back_buffer(&targets), ResourceId::BackBuffer(0));
        rotate_back_buffer(&mut targets);
        assert_eq!(current_back_buffer(&targets), ResourceId::BackBuffer(1));
        rotate_back_buffer(&mut targets);
        assert_eq!(current_back_buffer(&targets), ResourceId::BackBuffer(0));
    }

    #[test]
    fn test_initial_states_cover_every_resource() {
        let targets = create_target_set(64, 64, 3, 1).expect("targets");
        let states = initial_resource_states(&targets);
        assert_eq!(states.len(), 3 + 1 + 3 + 1 + 2);
        assert_eq!(states[&ResourceId::BackBuffer(2)], ResourceState::Present);
        assert_eq!(states[&ResourceId::DepthStencil], ResourceState::DepthWrite);
        assert_eq!(
            states[&ResourceId::GBuffer(GBufferSlot::Normal)],
            ResourceState::RenderTarget
        );
    }

    #[test]
    fn test_invalid_sizes_rejected() {
        assert!(create_target_set(0, 10, 2, 1).is_err());
        assert!(create_target_set(10, MAX_TARGET_DIMENSION + 1, 2, 1).is_err());
        assert!(create_target_set(10, 10, 1, 1).is_err());
    }
}
