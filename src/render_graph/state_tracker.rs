//! Resource state tracker
//!
//! Replays recorded command lists against the current state of every
//! tracked resource and reports each hazard a validation layer would: a
//! transition whose `before` is wrong, a target bound in the wrong state,
//! a read without a preceding barrier, compute writes without a UAV
//! barrier before the next read.

use super::target_data::ResourceStates;
use crate::error::{EngineError, EngineResult};
use crate::gpu::{CommandList, GpuCommand, PassDesc, PassKind, ResourceId, ResourceState};
use rustc_hash::FxHashSet;

#[derive(Debug, Clone, PartialEq)]
pub struct StateViolation {
    pub list: &'static str,
    pub command_index: usize,
    pub message: String,
}

#[derive(Debug, Clone, Default)]
pub struct StateTracker {
    pub states: ResourceStates,
    pub open_pass: Option<PassKind>,
    /// Buffers written as unordered access since their last UAV barrier
    pub unflushed_writes: FxHashSet<ResourceId>,
    pub commands_checked: u64,
}

pub fn create_state_tracker(initial: ResourceStates) -> StateTracker {
    StateTracker {
        states: initial,
        ..Default::default()
    }
}

pub fn resource_state(tracker: &StateTracker, resource: ResourceId) -> Option<ResourceState> {
    tracker.states.get(&resource).copied()
}

fn mismatch(resource: ResourceId, expected: ResourceState, found: Option<ResourceState>) -> EngineError {
    EngineError::ResourceStateMismatch {
        resource: format!("{:?}", resource),
        expected: format!("{:?}", expected),
        found: found.map_or_else(|| "untracked".to_string(), |s| format!("{:?}", s)),
    }
}

fn require(tracker: &StateTracker, resource: ResourceId, expected: ResourceState) -> EngineResult<()> {
    let found = resource_state(tracker, resource);
    if found == Some(expected) {
        Ok(())
    } else {
        Err(mismatch(resource, expected, found))
    }
}

fn require_pass(tracker: &StateTracker, command: &str) -> EngineResult<PassKind> {
    tracker.open_pass.ok_or_else(|| EngineError::InvalidState {
        expected: "open pass".to_string(),
        actual: format!("{} outside a pass", command),
    })
}

fn require_no_pass(tracker: &StateTracker, command: &str) -> EngineResult<()> {
    match tracker.open_pass {
        Some(kind) => Err(EngineError::InvalidState {
            expected: "no open pass".to_string(),
            actual: format!("{} inside {:?} pass", command, kind),
        }),
        None => Ok(()),
    }
}

fn require_flushed(tracker: &StateTracker, resource: ResourceId) -> EngineResult<()> {
    if tracker.unflushed_writes.contains(&resource) {
        return Err(EngineError::InvalidState {
            expected: format!("UAV barrier on {:?}", resource),
            actual: "unordered writes not yet visible".to_string(),
        });
    }
    Ok(())
}

fn begin_pass(tracker: &mut StateTracker, desc: &PassDesc) -> EngineResult<()> {
    require_no_pass(tracker, "BeginPass")?;

    for target in &desc.color_targets {
        require(tracker, *target, ResourceState::RenderTarget)?;
    }
    if let Some(depth) = &desc.depth {
        let expected = if depth.read_only {
            ResourceState::DepthRead
        } else {
            ResourceState::DepthWrite
        };
        require(tracker, depth.resource, expected)?;
        if depth.read_only && depth.clear.is_some() {
            return Err(EngineError::InvalidState {
                expected: "writable depth for clear".to_string(),
                actual: "clear on read-only depth".to_string(),
            });
        }
    }
    for read in &desc.reads {
        if desc.color_targets.contains(read) {
            return Err(EngineError::InvalidState {
                expected: "read and write sets disjoint".to_string(),
                actual: format!("{:?} bound as target and input", read),
            });
        }
        let expected = match read {
            ResourceId::DepthStencil => ResourceState::DepthRead,
            _ => ResourceState::ShaderResource,
        };
        require(tracker, *read, expected)?;
        require_flushed(tracker, *read)?;
    }

    tracker.open_pass = Some(desc.kind);
    Ok(())
}

/// Check one command and apply its state change.
///
/// State changes are applied even when the check fails so one bad barrier
/// reports once instead of cascading through the rest of the frame.
pub fn apply_command(tracker: &mut StateTracker, command: &GpuCommand) -> EngineResult<()> {
    tracker.commands_checked += 1;

    match command {
        GpuCommand::Transition {
            resource,
            before,
            after,
        } => {
            let found = resource_state(tracker, *resource);
            tracker.states.insert(*resource, *after);
            require_no_pass(tracker, "Transition")?;
            if found != Some(*before) {
                return Err(mismatch(*resource, *before, found));
            }
            Ok(())
        }
        GpuCommand::UavBarrier { resource } => {
            require(tracker, *resource, ResourceState::UnorderedAccess)?;
            tracker.unflushed_writes.remove(resource);
            Ok(())
        }
        GpuCommand::BeginPass(desc) => begin_pass(tracker, desc),
        GpuCommand::EndPass => {
            require_pass(tracker, "EndPass")?;
            tracker.open_pass = None;
            Ok(())
        }
        GpuCommand::SetPipeline(_) | GpuCommand::SetViewport { .. } => Ok(()),
        GpuCommand::DrawIndexed(_)
        | GpuCommand::DrawLight { .. }
        | GpuCommand::DrawFullscreen
        | GpuCommand::DrawUi => {
            let kind = require_pass(tracker, "draw")?;
            if kind == PassKind::ParticleSimulate {
                return Err(EngineError::InvalidState {
                    expected: "graphics pass".to_string(),
                    actual: "draw inside compute pass".to_string(),
                });
            }
            Ok(())
        }
        GpuCommand::DrawParticles { buffer, .. } => {
            require_pass(tracker, "DrawParticles")?;
            let resource = ResourceId::Particles(*buffer);
            require(tracker, resource, ResourceState::ShaderResource)?;
            require_flushed(tracker, resource)
        }
        GpuCommand::UploadParticles { buffer, .. } | GpuCommand::ClearParticles { buffer } => {
            require_no_pass(tracker, "particle copy")?;
            require(tracker, ResourceId::Particles(*buffer), ResourceState::CopyDest)
        }
        GpuCommand::Dispatch { input, output, .. } => {
            let kind = require_pass(tracker, "Dispatch")?;
            if kind != PassKind::ParticleSimulate {
                return Err(EngineError::InvalidState {
                    expected: "compute pass".to_string(),
                    actual: format!("dispatch inside {:?} pass", kind),
                });
            }
            require(tracker, ResourceId::Particles(*input), ResourceState::ShaderResource)?;
            require_flushed(tracker, ResourceId::Particles(*input))?;
            require(tracker, ResourceId::Particles(*output), ResourceState::UnorderedAccess)?;
            tracker.unflushed_writes.insert(ResourceId::Particles(*output));
            Ok(())
        }
    }
}

/// Replay one list, collecting every violation
pub fn validate_command_list(tracker: &mut StateTracker, list: &CommandList) -> Vec<StateViolation> {
    let mut violations = Vec::new();
    for (index, command) in list.commands.iter().enumerate() {
        if let Err(error) = apply_command(tracker, command) {
            violations.push(StateViolation {
                list: list.label,
                command_index: index,
                message: error.to_string(),
            });
        }
    }
    if tracker.open_pass.take().is_some() {
        violations.push(StateViolation {
            list: list.label,
            command_index: list.commands.len(),
            message: "pass left open at end of command list".to_string(),
        });
    }
    violations
}

/// Before present the back buffer must be back in present state
pub fn check_present(tracker: &StateTracker, back_buffer: u32) -> EngineResult<()> {
    require(tracker, ResourceId::BackBuffer(back_buffer), ResourceState::Present)
}

/// Resources whose state differs from `expected`
pub fn diff_states(tracker: &StateTracker, expected: &ResourceStates) -> Vec<ResourceId> {
    let mut differing: Vec<ResourceId> = expected
        .iter()
        .filter(|(resource, state)| tracker.states.get(resource) != Some(state))
        .map(|(resource, _)| *resource)
        .collect();
    differing.sort();
    differing
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::{DepthAttachment, GBufferSlot};
    use crate::render_graph::{create_target_set, initial_resource_states};

    fn tracker() -> StateTracker {
        let targets = create_target_set(64, 64, 2, 1).expect("targets");
        create_state_tracker(initial_resource_states(&targets))
    }

    fn list(commands: Vec<GpuCommand>) -> CommandList {
        CommandList {
            label: "test",
            slot: 0,
            commands,
        }
    }

    fn lighting_pass() -> GpuCommand {
        GpuCommand::BeginPass(PassDesc {
            kind: PassKind::Lighting,
            color_targets: vec![ResourceId::LitTarget],
            depth: Some(DepthAttachment {
                resource: ResourceId::DepthStencil,
                read_only: true,
                clear: None,
            }),
            reads: vec![ResourceId::GBuffer(GBufferSlot::Albedo), ResourceId::DepthStencil],
            clear_color: None,
        })
    }

    #[test]
    fn test_read_without_barrier_is_reported() {
        let mut tracker = tracker();
        let violations = validate_command_list(&mut tracker, &list(vec![lighting_pass(), GpuCommand::EndPass]));
        assert!(!violations.is_empty());
        assert_eq!(violations[0].command_index, 0);
    }

    #[test]
    fn test_read_after_barrier_is_clean() {
        let mut tracker = tracker();
        let violations = validate_command_list(
            &mut tracker,
            &list(vec![
                GpuCommand::Transition {
                    resource: ResourceId::GBuffer(GBufferSlot::Albedo),
                    before: ResourceState::RenderTarget,
                    after: ResourceState::ShaderResource,
                },
                GpuCommand::Transition {
                    resource: ResourceId::DepthStencil,
                    before: ResourceState::DepthWrite,
                    after: ResourceState::DepthRead,
                },
                lighting_pass(),
                GpuCommand::DrawFullscreen,
                GpuCommand::EndPass,
            ]),
        );
        assert!(violations.is_empty(), "{:?}", violations);
    }

    #[test]
    fn test_wrong_before_state_is_reported_once() {
        let mut tracker = tracker();
        let violations = validate_command_list(
            &mut tracker,
            &list(vec![
                GpuCommand::Transition {
                    resource: ResourceId::LitTarget,
                    before: ResourceState::ShaderResource,
                    after: ResourceState::RenderTarget,
                },
                GpuCommand::Transition {
                    resource: ResourceId::LitTarget,
                    before: ResourceState::RenderTarget,
                    after: ResourceState::ShaderResource,
                },
            ]),
        );
        assert_eq!(violations.len(), 1);
        assert_eq!(
            resource_state(&tracker, ResourceId::LitTarget),
            Some(ResourceState::ShaderResource)
        );
    }

    #[test]
    fn test_open_pass_at_end_is_reported() {
        let mut tracker = tracker();
        let violations = validate_command_list(
            &mut tracker,
            &list(vec![GpuCommand::BeginPass(PassDesc {
                kind: PassKind::Geometry,
                color_targets: vec![ResourceId::GBuffer(GBufferSlot::Albedo)],
                depth: None,
                reads: Vec::new(),
                clear_color: None,
            })]),
        );
        assert_eq!(violations.len(), 1);
        assert!(tracker.open_pass.is_none());
    }

    #[test]
    fn test_present_requires_present_state() {
        let mut tracker = tracker();
        assert!(check_present(&tracker, 0).is_ok());
        tracker.states.insert(ResourceId::BackBuffer(0), ResourceState::RenderTarget);
        assert!(check_present(&tracker, 0).is_err());
    }
}
