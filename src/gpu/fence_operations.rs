//! Fence and sync gate operations
//!
//! `signal` advances the timeline, `wait_until_complete` is the only
//! blocking call and sleeps on the fence condvar rather than spinning.
//! Device loss wakes every waiter and turns all waits into errors.

use super::backend::GpuBackend;
use super::fence_data::{FenceValue, GpuFence, SyncGate};
use crate::error::{EngineError, EngineResult};

// ============================================================================
// FENCE
// ============================================================================

pub fn create_fence() -> GpuFence {
    GpuFence::default()
}

pub fn fence_completed_value(fence: &GpuFence) -> FenceValue {
    fence.shared.state.lock().completed
}

/// Report GPU progress. Values never move backwards
pub fn complete_fence(fence: &GpuFence, value: FenceValue) {
    let mut state = fence.shared.state.lock();
    if value > state.completed {
        state.completed = value;
    }
    drop(state);
    fence.shared.completion.notify_all();
}

/// Mark the device behind this fence as lost and wake every waiter
pub fn mark_fence_lost(fence: &GpuFence, reason: &str) {
    let mut state = fence.shared.state.lock();
    if state.device_lost.is_none() {
        log::error!("[Fence::mark_fence_lost] Device lost: {}", reason);
        state.device_lost = Some(reason.to_string());
    }
    drop(state);
    fence.shared.completion.notify_all();
}

pub fn fence_lost_reason(fence: &GpuFence) -> Option<String> {
    fence.shared.state.lock().device_lost.clone()
}

/// Block until `value` retires or the device is lost
pub fn wait_for_fence(fence: &GpuFence, value: FenceValue) -> EngineResult<()> {
    let mut state = fence.shared.state.lock();
    loop {
        if let Some(reason) = &state.device_lost {
            return Err(EngineError::device_lost(reason.clone()));
        }
        if state.completed >= value {
            return Ok(());
        }
        fence.shared.completion.wait(&mut state);
    }
}

// ============================================================================
// SYNC GATE
// ============================================================================

pub fn create_sync_gate() -> SyncGate {
    SyncGate::default()
}

/// Enqueue a marker after all submitted work and return its value
pub fn signal(gate: &mut SyncGate, backend: &mut dyn GpuBackend) -> EngineResult<FenceValue> {
    if let Some(reason) = fence_lost_reason(&gate.fence) {
        return Err(EngineError::device_lost(reason));
    }

    let value = gate.last_signaled + 1;
    backend.signal(&gate.fence, value)?;
    gate.last_signaled = value;
    Ok(value)
}

/// Non-blocking completion check
pub fn is_complete(gate: &SyncGate, value: FenceValue) -> bool {
    fence_completed_value(&gate.fence) >= value
}

/// Block the calling thread until `value` retires.
///
/// The backend is pumped first so completion callbacks that only fire on
/// device polling get a chance to run; after that the wait is purely
/// event-driven.
pub fn wait_until_complete(
    gate: &mut SyncGate,
    backend: &mut dyn GpuBackend,
    value: FenceValue,
) -> EngineResult<()> {
    if let Some(reason) = fence_lost_reason(&gate.fence) {
        return Err(EngineError::device_lost(reason));
    }
    if is_complete(gate, value) {
        return Ok(());
    }
    if value > gate.last_signaled {
        return Err(EngineError::InvalidState {
            expected: format!("fence value <= {}", gate.last_signaled),
            actual: format!("wait on unsignaled value {}", value),
        });
    }

    gate.blocking_waits += 1;
    log::debug!(
        "[SyncGate::wait_until_complete] Waiting for fence {} (completed {})",
        value,
        fence_completed_value(&gate.fence)
    );

    backend.pump(&gate.fence, value)?;
    wait_for_fence(&gate.fence, value)
}

/// Signal a fresh value and wait for it: nothing is in flight afterwards
pub fn flush(gate: &mut SyncGate, backend: &mut dyn GpuBackend) -> EngineResult<FenceValue> {
    let value = signal(gate, backend)?;
    wait_until_complete(gate, backend, value)?;
    log::debug!("[SyncGate::flush] Queue flushed at fence {}", value);
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_complete_is_monotonic() {
        let fence = create_fence();
        complete_fence(&fence, 5);
        complete_fence(&fence, 3);
        assert_eq!(fence_completed_value(&fence), 5);
    }

    #[test]
    fn test_wait_wakes_on_completion() {
        let fence = create_fence();
        let remote = fence.clone();

        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            complete_fence(&remote, 2);
        });

        wait_for_fence(&fence, 2).expect("wait should succeed");
        assert!(fence_completed_value(&fence) >= 2);
        handle.join().expect("completer thread");
    }

    #[test]
    fn test_device_loss_fails_blocked_wait() {
        let fence = create_fence();
        let remote = fence.clone();

        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            mark_fence_lost(&remote, "adapter removed");
        });

        let result = wait_for_fence(&fence, 10);
        assert!(matches!(result, Err(EngineError::DeviceLost { .. })));
        handle.join().expect("loser thread");
    }

    #[test]
    fn test_completed_wait_returns_immediately() {
        let fence = create_fence();
        complete_fence(&fence, 1);
        assert!(wait_for_fence(&fence, 1).is_ok());
        assert!(wait_for_fence(&fence, 0).is_ok());
    }
}
