//! Light operations
//!
//! Static lights are spawned at build time; dynamic ones at runtime with a
//! velocity that decays until the light comes to rest. Despawned slots go
//! on a free list and are reused before the arena grows.

use super::light_data::{LightDescriptor, LightEntry, LightId, LightItem, LightMotion};
use super::scene_data::{MeshId, SceneData};
use crate::error::{EngineError, EngineResult, OptionExt};
use crate::frame::{queue_change, ChangeEvent};

pub fn spawn_light(
    scene: &mut SceneData,
    descriptor: LightDescriptor,
    proxy_mesh: Option<MeshId>,
    motion: Option<LightMotion>,
) -> LightId {
    let index = match scene.free_light_slots.pop() {
        Some(index) => index,
        None => {
            scene.lights.push(LightEntry {
                generation: 0,
                item: None,
            });
            scene.lights.len() as u32 - 1
        }
    };

    let entry = &mut scene.lights[index as usize];
    entry.item = Some(LightItem {
        descriptor,
        proxy_mesh,
        slot: index,
        dirty_frames: 0,
        motion,
    });

    let id = LightId {
        index,
        generation: entry.generation,
    };
    queue_change(&mut scene.changes, ChangeEvent::Light(id));
    log::debug!("[Lights::spawn_light] {:?} light in slot {}", descriptor.kind, index);
    id
}

fn invalid_light(id: LightId) -> EngineError {
    EngineError::InvalidHandle {
        kind: "light",
        index: id.index,
    }
}

/// Free the light's constant buffer slot for reuse
pub fn despawn_light(scene: &mut SceneData, id: LightId) -> EngineResult<()> {
    let entry = scene
        .lights
        .get_mut(id.index as usize)
        .filter(|e| e.generation == id.generation && e.item.is_some())
        .ok_or_engine(|| invalid_light(id))?;

    entry.item = None;
    entry.generation = entry.generation.wrapping_add(1);
    scene.free_light_slots.push(id.index);
    Ok(())
}

pub fn light(scene: &SceneData, id: LightId) -> EngineResult<&LightItem> {
    scene
        .lights
        .get(id.index as usize)
        .filter(|e| e.generation == id.generation)
        .and_then(|e| e.item.as_ref())
        .ok_or_engine(|| invalid_light(id))
}

fn light_mut(scene: &mut SceneData, id: LightId) -> EngineResult<&mut LightItem> {
    scene
        .lights
        .get_mut(id.index as usize)
        .filter(|e| e.generation == id.generation)
        .and_then(|e| e.item.as_mut())
        .ok_or_engine(|| invalid_light(id))
}

pub fn set_light_descriptor(scene: &mut SceneData, id: LightId, descriptor: LightDescriptor) -> EngineResult<()> {
    light_mut(scene, id)?.descriptor = descriptor;
    queue_change(&mut scene.changes, ChangeEvent::Light(id));
    Ok(())
}

pub fn live_light_count(scene: &SceneData) -> usize {
    scene.lights.iter().filter(|e| e.item.is_some()).count()
}

/// Integrate dynamic lights one step. Returns how many moved
pub fn integrate_dynamic_lights(scene: &mut SceneData, delta_time: f32, rest_speed: f32) -> u32 {
    let mut moved = 0;

    for (index, entry) in scene.lights.iter_mut().enumerate() {
        let Some(light) = entry.item.as_mut() else {
            continue;
        };
        let Some(motion) = light.motion.as_mut() else {
            continue;
        };
        if motion.at_rest {
            continue;
        }

        light.descriptor.position += motion.velocity * delta_time;
        let decay = (1.0 - motion.linear_damping * delta_time).max(0.0);
        motion.velocity *= decay;

        if motion.velocity.length() < rest_speed {
            motion.velocity = glam::Vec3::ZERO;
            motion.at_rest = true;
            log::debug!("[Lights::integrate_dynamic_lights] Light {} came to rest", index);
        }

        moved += 1;
        scene.changes.events.push(ChangeEvent::Light(LightId {
            index: index as u32,
            generation: entry.generation,
        }));
    }

    moved
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::{create_scene, LightKind};
    use glam::Vec3;

    #[test]
    fn test_despawned_slot_is_reused() {
        let mut scene = create_scene();
        let a = spawn_light(&mut scene, LightDescriptor::default(), None, None);
        let b = spawn_light(&mut scene, LightDescriptor::default(), None, None);
        assert_eq!((a.index, b.index), (0, 1));

        despawn_light(&mut scene, a).expect("despawn");
        let c = spawn_light(&mut scene, LightDescriptor::default(), None, None);
        assert_eq!(c.index, 0);
        assert_ne!(c.generation, a.generation);
        assert_eq!(scene.lights.len(), 2);
        assert_eq!(live_light_count(&scene), 2);
    }

    #[test]
    fn test_stale_handle_is_rejected() {
        let mut scene = create_scene();
        let a = spawn_light(&mut scene, LightDescriptor::default(), None, None);
        despawn_light(&mut scene, a).expect("despawn");
        assert!(light(&scene, a).is_err());
        assert!(despawn_light(&mut scene, a).is_err());
        assert!(set_light_descriptor(&mut scene, a, LightDescriptor::default()).is_err());
    }

    #[test]
    fn test_dynamic_light_decays_to_rest() {
        let mut scene = create_scene();
        let id = spawn_light(
            &mut scene,
            LightDescriptor {
                kind: LightKind::Point,
                ..Default::default()
            },
            None,
            Some(LightMotion {
                velocity: Vec3::new(4.0, 0.0, 0.0),
                linear_damping: 2.0,
                at_rest: false,
            }),
        );

        let mut steps = 0;
        while integrate_dynamic_lights(&mut scene, 0.1, 0.01) > 0 {
            steps += 1;
            assert!(steps < 1000, "light never came to rest");
        }

        let record = light(&scene, id).expect("light");
        let motion = record.motion.expect("motion");
        assert!(motion.at_rest);
        assert_eq!(motion.velocity, Vec3::ZERO);
        assert!(record.descriptor.position.x > 0.0);
        // Static lights never move
        assert_eq!(integrate_dynamic_lights(&mut scene, 0.1, 0.01), 0);
    }
}
