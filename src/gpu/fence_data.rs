//! Fence and sync gate data - Pure DOP
//!
//! A fence is a monotonically increasing completed value shared between the
//! CPU and whatever executes the GPU timeline. Waiters sleep on a condvar
//! that is notified on every completion and on device loss.

use parking_lot::{Condvar, Mutex};
use std::sync::Arc;

/// Position on the GPU timeline. Zero means "never signaled"
pub type FenceValue = u64;

/// Mutable fence state guarded by the fence mutex
#[derive(Debug, Default)]
pub struct FenceState {
    /// Highest value the GPU has reported as retired
    pub completed: FenceValue,

    /// Set once the device is gone; every wait fails from then on
    pub device_lost: Option<String>,
}

#[derive(Debug, Default)]
pub struct FenceShared {
    pub state: Mutex<FenceState>,
    pub completion: Condvar,
}

/// Cloneable handle to one fence. Clones observe the same timeline
#[derive(Debug, Clone, Default)]
pub struct GpuFence {
    pub shared: Arc<FenceShared>,
}

/// CPU side of the queue fence: the fence plus the last value handed out
#[derive(Debug, Default)]
pub struct SyncGate {
    pub fence: GpuFence,
    pub last_signaled: FenceValue,

    /// Number of waits that actually blocked
    pub blocking_waits: u64,
}
