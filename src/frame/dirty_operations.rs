//! Change queue and dirty-count propagation
//!
//! Edits only enqueue events. Once per frame the queue is drained, which
//! sets each touched entity's dirty count to N; then the current slot gets
//! fresh constants for every entity with a non-zero count, and the count
//! drops by one. After N frames every physical slot holds the edit.

use super::constants_operations::{pack_light_constants, pack_material_constants, pack_object_constants, write_constant};
use super::frame_data::{ChangeEvent, ChangeQueue, FrameResource, PropagationStats};
use crate::error::EngineResult;
use crate::scene::SceneData;

pub fn queue_change(queue: &mut ChangeQueue, event: ChangeEvent) {
    queue.events.push(event);
}

pub fn pending_changes(queue: &ChangeQueue) -> usize {
    queue.events.len()
}

/// Apply queued edits: every touched entity needs `frame_count` more writes
pub fn drain_changes(scene: &mut SceneData, frame_count: u32) -> usize {
    let events = std::mem::take(&mut scene.changes.events);
    let drained = events.len();

    for event in events {
        match event {
            ChangeEvent::Object(id) => {
                if let Some(item) = scene.items.get_mut(id.0 as usize) {
                    item.dirty_frames = frame_count;
                }
            }
            ChangeEvent::Material(id) => {
                if let Some(material) = scene.materials.get_mut(id.0 as usize) {
                    material.dirty_frames = frame_count;
                }
            }
            ChangeEvent::Light(id) => {
                let live = scene
                    .lights
                    .get_mut(id.index as usize)
                    .filter(|entry| entry.generation == id.generation)
                    .and_then(|entry| entry.item.as_mut());
                match live {
                    Some(light) => light.dirty_frames = frame_count,
                    None => log::debug!(
                        "[Dirty::drain_changes] Dropping change for despawned light {:?}",
                        id
                    ),
                }
            }
        }
    }

    drained
}

/// Force a full re-upload, used after the ring is rebuilt
pub fn mark_all_dirty(scene: &mut SceneData, frame_count: u32) {
    for item in &mut scene.items {
        item.dirty_frames = frame_count;
    }
    for material in &mut scene.materials {
        material.dirty_frames = frame_count;
    }
    for light in scene.lights.iter_mut().filter_map(|e| e.item.as_mut()) {
        light.dirty_frames = frame_count;
    }
}

/// Write stale constants into the current slot and count down
pub fn propagate_dirty_constants(scene: &mut SceneData, frame: &mut FrameResource) -> EngineResult<PropagationStats> {
    let mut stats = PropagationStats::default();

    for (index, item) in scene.items.iter_mut().enumerate() {
        if item.dirty_frames > 0 {
            write_constant(&mut frame.objects, index as u32, pack_object_constants(item))?;
            item.dirty_frames -= 1;
            stats.objects_written += 1;
        }
    }

    for (index, material) in scene.materials.iter_mut().enumerate() {
        if material.dirty_frames > 0 {
            write_constant(&mut frame.materials, index as u32, pack_material_constants(material))?;
            material.dirty_frames -= 1;
            stats.materials_written += 1;
        }
    }

    for light in scene.lights.iter_mut().filter_map(|e| e.item.as_mut()) {
        if light.dirty_frames > 0 {
            write_constant(&mut frame.lights, light.slot, pack_light_constants(&light.descriptor))?;
            light.dirty_frames -= 1;
            stats.lights_written += 1;
        }
    }

    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{create_frame_ring, FrameCapacity};
    use crate::scene::{
        add_render_item, create_scene, register_geometry, register_material, register_mesh, set_item_transform,
        spawn_light, DrawArgs, LightDescriptor, MaterialDesc, MeshGeometry, RenderItemDesc,
    };
    use crate::math::create_aabb;
    use glam::{Mat4, Vec3};

    fn one_item_scene() -> (SceneData, crate::scene::RenderItemId) {
        let mut scene = create_scene();
        let geometry = register_geometry(&mut scene, &MeshGeometry::default());
        let mesh = register_mesh(
            &mut scene,
            "box",
            geometry,
            DrawArgs {
                index_count: 36,
                start_index: 0,
                base_vertex: 0,
            },
            create_aabb(Vec3::splat(-1.0), Vec3::ONE),
        );
        register_material(
            &mut scene,
            MaterialDesc {
                name: "stone".to_string(),
                ..Default::default()
            },
        )
        .expect("material");
        let item = add_render_item(&mut scene, RenderItemDesc::new(mesh, "stone")).expect("item");
        (scene, item)
    }

    #[test]
    fn test_single_edit_written_exactly_n_times() {
        const N: usize = 3;
        let (mut scene, item) = one_item_scene();
        let mut ring = create_frame_ring(
            N,
            FrameCapacity {
                objects: 4,
                materials: 4,
                lights: 4,
            },
        )
        .expect("ring");

        // Settle the initial upload first
        drain_changes(&mut scene, N as u32);
        for resource in ring.resources.iter_mut() {
            propagate_dirty_constants(&mut scene, resource).expect("propagate");
        }
        assert_eq!(scene.items[0].dirty_frames, 0);
        let before: Vec<u64> = ring.resources.iter().map(|r| r.objects.write_count).collect();

        let moved = Mat4::from_translation(Vec3::new(5.0, 0.0, 0.0));
        set_item_transform(&mut scene, item, moved).expect("edit");
        drain_changes(&mut scene, N as u32);
        assert_eq!(scene.items[0].dirty_frames, N as u32);

        // Two full rotations: writes happen only during the first N frames
        for frame in 0..2 * N {
            let slot = frame % N;
            propagate_dirty_constants(&mut scene, &mut ring.resources[slot]).expect("propagate");
        }

        assert_eq!(scene.items[0].dirty_frames, 0);
        for (slot, resource) in ring.resources.iter().enumerate() {
            assert_eq!(resource.objects.write_count - before[slot], 1, "slot {} written once", slot);
            assert_eq!(resource.objects.elements[0].world, moved.to_cols_array_2d());
        }
    }

    #[test]
    fn test_dirty_count_never_underflows() {
        let (mut scene, _) = one_item_scene();
        let mut ring = create_frame_ring(
            2,
            FrameCapacity {
                objects: 1,
                materials: 2,
                lights: 1,
            },
        )
        .expect("ring");
        drain_changes(&mut scene, 2);
        for _ in 0..5 {
            propagate_dirty_constants(&mut scene, &mut ring.resources[0]).expect("propagate");
        }
        assert_eq!(scene.items[0].dirty_frames, 0);
    }

    #[test]
    fn test_light_slot_beyond_capacity_is_an_error() {
        let (mut scene, _) = one_item_scene();
        let mut ring = create_frame_ring(
            2,
            FrameCapacity {
                objects: 4,
                materials: 4,
                lights: 1,
            },
        )
        .expect("ring");
        spawn_light(&mut scene, LightDescriptor::default(), None, None);
        spawn_light(&mut scene, LightDescriptor::default(), None, None);
        drain_changes(&mut scene, 2);

        let result = propagate_dirty_constants(&mut scene, &mut ring.resources[0]);
        assert!(matches!(result, Err(crate::error::EngineError::InvalidConstantSlot { .. })));
    }
}
