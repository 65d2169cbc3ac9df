//! Frame resource ring operations
//!
//! `acquire_frame` is the single steady-state synchronization point: it
//! waits on the fence stored in the slot it is about to reuse, which bounds
//! the GPU to N-1 frames behind the CPU.

use super::constants_operations::create_constant_buffer;
use super::frame_data::{FrameCapacity, FrameResource, FrameRing};
use crate::constants::frame::{CAPACITY_GROWTH_HEADROOM, MAX_FRAME_RESOURCE_COUNT, MIN_FRAME_RESOURCE_COUNT, PASS_COUNT};
use crate::error::{EngineError, EngineResult};
use crate::gpu::{
    create_command_allocator, flush, is_complete, reset_command_allocator, wait_until_complete, FenceValue,
    GpuBackend, SyncGate,
};

fn create_frame_resource(slot: usize, capacity: &FrameCapacity) -> FrameResource {
    FrameResource {
        slot,
        allocator: create_command_allocator(slot),
        pass: create_constant_buffer("pass", PASS_COUNT),
        objects: create_constant_buffer("object", capacity.objects),
        materials: create_constant_buffer("material", capacity.materials),
        lights: create_constant_buffer("light", capacity.lights),
        fence: 0,
    }
}

/// Build N slots sized for `capacity`
pub fn create_frame_ring(count: usize, capacity: FrameCapacity) -> EngineResult<FrameRing> {
    if !(MIN_FRAME_RESOURCE_COUNT..=MAX_FRAME_RESOURCE_COUNT).contains(&count) {
        return Err(EngineError::InvalidConfig {
            field: "frame_resource_count".to_string(),
            value: count.to_string(),
            reason: "must be between 2 and 4".to_string(),
        });
    }

    let resources = (0..count).map(|slot| create_frame_resource(slot, &capacity)).collect();
    log::info!(
        "[FrameRing::create_frame_ring] {} slots (objects {}, materials {}, lights {})",
        count,
        capacity.objects,
        capacity.materials,
        capacity.lights
    );

    Ok(FrameRing {
        resources,
        // First acquire lands on slot 0
        current: count - 1,
        capacity,
        frames_acquired: 0,
        ring_waits: 0,
        rebuilds: 0,
    })
}

pub fn frame_count(ring: &FrameRing) -> usize {
    ring.resources.len()
}

/// Advance to the next slot and make it safe to overwrite.
///
/// Blocks only if the slot's previous submission has not retired.
pub fn acquire_frame(
    ring: &mut FrameRing,
    gate: &mut SyncGate,
    backend: &mut dyn GpuBackend,
) -> EngineResult<usize> {
    let next = (ring.current + 1) % ring.resources.len();
    let fence = ring.resources[next].fence;

    if fence != 0 && !is_complete(gate, fence) {
        ring.ring_waits += 1;
        log::debug!(
            "[FrameRing::acquire_frame] Slot {} still in flight (fence {}), waiting",
            next,
            fence
        );
        wait_until_complete(gate, backend, fence)?;
    }

    ring.current = next;
    ring.frames_acquired += 1;
    reset_command_allocator(&mut ring.resources[next].allocator)?;
    Ok(next)
}

pub fn current_frame(ring: &FrameRing) -> &FrameResource {
    &ring.resources[ring.current]
}

pub fn current_frame_mut(ring: &mut FrameRing) -> &mut FrameResource {
    &mut ring.resources[ring.current]
}

/// Record the fence that retires the current slot's submission
pub fn complete_frame(ring: &mut FrameRing, fence: FenceValue) {
    let slot = ring.current;
    ring.resources[slot].fence = fence;
}

pub fn capacity_fits(have: &FrameCapacity, need: &FrameCapacity) -> bool {
    need.objects <= have.objects && need.materials <= have.materials && need.lights <= have.lights
}

/// Rebuild every slot if the entity counts outgrew the constant buffers.
///
/// Flushes the queue first. Returns true when the ring was rebuilt, in which
/// case every entity must be marked dirty again.
pub fn ensure_capacity(
    ring: &mut FrameRing,
    need: &FrameCapacity,
    gate: &mut SyncGate,
    backend: &mut dyn GpuBackend,
) -> EngineResult<bool> {
    if capacity_fits(&ring.capacity, need) {
        return Ok(false);
    }

    let grown = FrameCapacity {
        objects: need.objects.max(ring.capacity.objects) + CAPACITY_GROWTH_HEADROOM,
        materials: need.materials.max(ring.capacity.materials) + CAPACITY_GROWTH_HEADROOM,
        lights: need.lights.max(ring.capacity.lights) + CAPACITY_GROWTH_HEADROOM,
    };

    log::info!(
        "[FrameRing::ensure_capacity] Rebuilding {} slots: objects {} -> {}, materials {} -> {}, lights {} -> {}",
        ring.resources.len(),
        ring.capacity.objects,
        grown.objects,
        ring.capacity.materials,
        grown.materials,
        ring.capacity.lights,
        grown.lights
    );

    rebuild_frame_ring(ring, grown, gate, backend)?;
    Ok(true)
}

/// Reallocate all N slots with the queue idle
pub fn rebuild_frame_ring(
    ring: &mut FrameRing,
    capacity: FrameCapacity,
    gate: &mut SyncGate,
    backend: &mut dyn GpuBackend,
) -> EngineResult<()> {
    flush(gate, backend)?;

    let count = ring.resources.len();
    backend.configure_frame_resources(count, &capacity)?;
    ring.resources = (0..count).map(|slot| create_frame_resource(slot, &capacity)).collect();
    ring.capacity = capacity;
    ring.current = count - 1;
    ring.rebuilds += 1;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::{create_headless_gpu, create_sync_gate, fence_completed_value, release_fences_through, signal, HeadlessConfig, HeadlessTimeline};
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    fn small_capacity() -> FrameCapacity {
        FrameCapacity {
            objects: 4,
            materials: 2,
            lights: 2,
        }
    }

    #[test]
    fn test_ring_depth_is_validated() {
        assert!(create_frame_ring(1, small_capacity()).is_err());
        assert!(create_frame_ring(5, small_capacity()).is_err());
        assert!(create_frame_ring(3, small_capacity()).is_ok());
    }

    #[test]
    fn test_slots_rotate_round_robin() {
        let mut gpu = create_headless_gpu(HeadlessConfig::default()).expect("headless gpu");
        let mut gate = create_sync_gate();
        let mut ring = create_frame_ring(3, small_capacity()).expect("ring");

        let mut slots = Vec::new();
        for _ in 0..6 {
            let slot = acquire_frame(&mut ring, &mut gate, &mut gpu).expect("acquire");
            slots.push(slot);
            let fence = signal(&mut gate, &mut gpu).expect("signal");
            complete_frame(&mut ring, fence);
        }
        assert_eq!(slots, vec![0, 1, 2, 0, 1, 2]);
    }

    #[test]
    fn test_fourth_acquire_waits_for_first_fence() {
        let mut gpu = create_headless_gpu(HeadlessConfig {
            timeline: HeadlessTimeline::Manual,
            ..Default::default()
        })
        .expect("headless gpu");
        let control = gpu.clone_control();

        let acquired = Arc::new(AtomicU64::new(0));
        let acquired_in_thread = acquired.clone();
        let (fence_tx, fence_rx) = crossbeam_channel::unbounded();

        let worker = thread::spawn(move || {
            let mut gate = create_sync_gate();
            fence_tx.send(gate.fence.clone()).expect("send fence");
            let mut ring = create_frame_ring(3, small_capacity()).expect("ring");
            for _ in 0..5 {
                acquire_frame(&mut ring, &mut gate, &mut gpu).expect("acquire");
                acquired_in_thread.fetch_add(1, Ordering::SeqCst);
                let fence = signal(&mut gate, &mut gpu).expect("signal");
                complete_frame(&mut ring, fence);
            }
            ring.ring_waits
        });

        let fence = fence_rx.recv().expect("fence");

        // Frames 1-3 never wait, frame 4 reuses slot 0 and must block on fence 1
        thread::sleep(Duration::from_millis(100));
        assert_eq!(acquired.load(Ordering::SeqCst), 3);
        assert_eq!(fence_completed_value(&fence), 0);

        // Fences 2 and 3 are still pending: frame 4 needs only fence 1
        release_fences_through(&control, 1);
        thread::sleep(Duration::from_millis(100));
        assert_eq!(acquired.load(Ordering::SeqCst), 4);

        release_fences_through(&control, 2);
        let ring_waits = worker.join().expect("worker");
        assert_eq!(acquired.load(Ordering::SeqCst), 5);
        assert_eq!(ring_waits, 2);
        release_fences_through(&control, 5);
    }

    #[test]
    fn test_ensure_capacity_rebuilds_all_slots() {
        let mut gpu = create_headless_gpu(HeadlessConfig::default()).expect("headless gpu");
        let mut gate = create_sync_gate();
        let mut ring = create_frame_ring(3, small_capacity()).expect("ring");

        let same = ensure_capacity(&mut ring, &small_capacity(), &mut gate, &mut gpu).expect("fits");
        assert!(!same);

        let need = FrameCapacity {
            objects: 4,
            materials: 2,
            lights: 7,
        };
        let rebuilt = ensure_capacity(&mut ring, &need, &mut gate, &mut gpu).expect("grow");
        assert!(rebuilt);
        assert_eq!(ring.rebuilds, 1);
        for resource in &ring.resources {
            assert!(resource.lights.elements.len() as u32 >= 7);
            assert_eq!(resource.fence, 0);
        }
    }
}
