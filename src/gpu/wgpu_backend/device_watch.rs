//! Device watch
//!
//! Hooks the device's uncaptured error callback. Out-of-memory marks the
//! device lost and fails every registered fence, so a render thread blocked
//! in a frame wait is woken with an error instead of hanging.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::gpu::fence_operations::mark_fence_lost;
use crate::gpu::GpuFence;

/// Validation errors tolerated before the device is treated as lost
pub const MAX_VALIDATION_ERRORS: u32 = 10;

#[derive(Debug, Default)]
pub struct DeviceWatchState {
    pub lost: Option<String>,
    pub fences: Vec<GpuFence>,
}

#[derive(Debug, Clone, Default)]
pub struct DeviceWatch {
    pub state: Arc<Mutex<DeviceWatchState>>,
    pub validation_errors: Arc<AtomicU32>,
}

pub fn create_device_watch(device: &wgpu::Device) -> DeviceWatch {
    let watch = DeviceWatch::default();
    let handler_watch = watch.clone();

    device.on_uncaptured_error(Box::new(move |error| {
        log::error!("[DeviceWatch] Uncaptured GPU error: {:?}", error);
        match error {
            wgpu::Error::OutOfMemory { .. } => {
                mark_device_lost(&handler_watch, "GPU out of memory");
            }
            wgpu::Error::Validation { description, .. } => {
                log::error!("[DeviceWatch] GPU validation error: {}", description);
                let count = handler_watch.validation_errors.fetch_add(1, Ordering::Relaxed) + 1;
                if count > MAX_VALIDATION_ERRORS {
                    mark_device_lost(&handler_watch, &format!("{} GPU validation errors", count));
                }
            }
        }
    }));

    watch
}

/// Fences signaled through this device; loss reaches all of them
pub fn watch_fence(watch: &DeviceWatch, fence: &GpuFence) {
    let mut state = watch.state.lock();
    if !state.fences.iter().any(|known| Arc::ptr_eq(&known.shared, &fence.shared)) {
        state.fences.push(fence.clone());
    }
    if let Some(reason) = &state.lost {
        mark_fence_lost(fence, reason);
    }
}

pub fn mark_device_lost(watch: &DeviceWatch, reason: &str) {
    let mut state = watch.state.lock();
    if state.lost.is_none() {
        log::error!("[DeviceWatch] Device lost: {}", reason);
        state.lost = Some(reason.to_string());
    }
    for fence in &state.fences {
        mark_fence_lost(fence, reason);
    }
}

pub fn lost_reason(watch: &DeviceWatch) -> Option<String> {
    watch.state.lock().lost.clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::{create_fence, fence_lost_reason};

    #[test]
    fn test_loss_reaches_registered_and_late_fences() {
        let watch = DeviceWatch::default();
        let early = create_fence();
        watch_fence(&watch, &early);
        watch_fence(&watch, &early);
        assert_eq!(watch.state.lock().fences.len(), 1);

        mark_device_lost(&watch, "removed");
        assert!(fence_lost_reason(&early).is_some());

        let late = create_fence();
        watch_fence(&watch, &late);
        assert_eq!(fence_lost_reason(&late).as_deref(), Some("removed"));
        assert_eq!(lost_reason(&watch).as_deref(), Some("removed"));
    }
}
