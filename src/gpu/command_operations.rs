//! Command allocator and list operations

use super::command_data::{CommandAllocator, CommandList, GpuCommand, PassKind};
use crate::error::{EngineError, EngineResult};

pub fn create_command_allocator(slot: usize) -> CommandAllocator {
    CommandAllocator {
        slot,
        ..Default::default()
    }
}

/// Reclaim the allocator. Callers guarantee the GPU is done with it
pub fn reset_command_allocator(allocator: &mut CommandAllocator) -> EngineResult<()> {
    if allocator.open_lists > 0 {
        return Err(EngineError::InvalidState {
            expected: "all command lists closed".to_string(),
            actual: format!("{} lists still open on slot {}", allocator.open_lists, allocator.slot),
        });
    }
    allocator.reset_count += 1;
    Ok(())
}

pub fn open_command_list(allocator: &mut CommandAllocator, label: &'static str) -> CommandList {
    allocator.open_lists += 1;
    CommandList {
        label,
        slot: allocator.slot,
        commands: Vec::with_capacity(allocator.last_command_count),
    }
}

/// Close a list for submission
pub fn close_command_list(allocator: &mut CommandAllocator, list: &CommandList) {
    allocator.open_lists = allocator.open_lists.saturating_sub(1);
    allocator.last_command_count = allocator.last_command_count.max(list.commands.len());
}

#[inline]
pub fn record(list: &mut CommandList, command: GpuCommand) {
    list.commands.push(command);
}

/// Number of draw-type commands in the list
pub fn count_draws(list: &CommandList) -> usize {
    list.commands
        .iter()
        .filter(|c| {
            matches!(
                c,
                GpuCommand::DrawIndexed(_)
                    | GpuCommand::DrawLight { .. }
                    | GpuCommand::DrawFullscreen
                    | GpuCommand::DrawParticles { .. }
                    | GpuCommand::DrawUi
            )
        })
        .count()
}

/// Draw commands recorded inside passes of `kind`
pub fn count_draws_in_pass(list: &CommandList, kind: PassKind) -> usize {
    let mut inside = false;
    let mut count = 0;
    for command in &list.commands {
        match command {
            GpuCommand::BeginPass(desc) => inside = desc.kind == kind,
            GpuCommand::EndPass => inside = false,
            GpuCommand::DrawIndexed(_)
            | GpuCommand::DrawLight { .. }
            | GpuCommand::DrawFullscreen
            | GpuCommand::DrawParticles { .. }
            | GpuCommand::DrawUi
                if inside =>
            {
                count += 1
            }
            _ => {}
        }
    }
    count
}

/// Pass kinds in recorded order
pub fn pass_sequence(lists: &[CommandList]) -> Vec<PassKind> {
    lists
        .iter()
        .flat_map(|l| l.commands.iter())
        .filter_map(|c| match c {
            GpuCommand::BeginPass(desc) => Some(desc.kind),
            _ => None,
        })
        .collect()
}
