//! Texture descriptor table
//!
//! Slots are handed out once at load time and never reassigned, so the
//! table needs no locking while frames are in flight. Slot 0 always holds
//! the checkerboard error texture.

use super::scene_data::{TextureSlot, TextureUpload};
use crate::constants::descriptors::{ERROR_TEXTURE_SLOT, TEXTURE_TABLE_CAPACITY};
use crate::error::{EngineError, EngineResult};
use rustc_hash::{FxHashMap, FxHashSet};

pub const ERROR_TEXTURE_NAME: &str = "__error_texture";

#[derive(Debug, Clone)]
pub struct DescriptorTable {
    pub capacity: u32,
    /// Texture name per occupied slot
    pub names: Vec<String>,
    pub by_name: FxHashMap<String, TextureSlot>,
    /// Names already reported missing, so each is logged once
    pub reported_missing: FxHashSet<String>,
}

pub fn create_descriptor_table(capacity: u32) -> DescriptorTable {
    let mut by_name = FxHashMap::default();
    by_name.insert(ERROR_TEXTURE_NAME.to_string(), TextureSlot(ERROR_TEXTURE_SLOT));
    DescriptorTable {
        capacity: capacity.max(1),
        names: vec![ERROR_TEXTURE_NAME.to_string()],
        by_name,
        reported_missing: FxHashSet::default(),
    }
}

impl Default for DescriptorTable {
    fn default() -> Self {
        create_descriptor_table(TEXTURE_TABLE_CAPACITY)
    }
}

/// Assign the next free slot to `name`; registering twice returns the same slot
pub fn register_texture_slot(table: &mut DescriptorTable, name: &str) -> EngineResult<TextureSlot> {
    if let Some(slot) = table.by_name.get(name) {
        return Ok(*slot);
    }
    let index = table.names.len() as u32;
    if index >= table.capacity {
        return Err(EngineError::InvalidAsset {
            asset: format!("texture '{}'", name),
            reason: format!("descriptor table full ({} slots)", table.capacity),
        });
    }
    let slot = TextureSlot(index);
    table.names.push(name.to_string());
    table.by_name.insert(name.to_string(), slot);
    log::debug!("[DescriptorTable::register_texture_slot] '{}' -> slot {}", name, index);
    Ok(slot)
}

/// Reject empty or truncated RGBA8 data before it reaches a device
pub fn validate_texture_upload(texture: &TextureUpload) -> EngineResult<()> {
    let expected = texture.width as usize * texture.height as usize * 4;
    if expected == 0 || texture.rgba8.len() != expected {
        return Err(EngineError::InvalidAsset {
            asset: format!("texture '{}'", texture.name),
            reason: format!("expected {} bytes, got {}", expected, texture.rgba8.len()),
        });
    }
    Ok(())
}

/// Slot for `name`, or the error texture slot if it was never loaded
pub fn texture_slot_or_error(table: &mut DescriptorTable, name: &str) -> TextureSlot {
    match table.by_name.get(name) {
        Some(slot) => *slot,
        None => {
            if table.reported_missing.insert(name.to_string()) {
                log::warn!(
                    "[DescriptorTable::texture_slot_or_error] Texture '{}' missing, using error texture",
                    name
                );
            }
            TextureSlot(ERROR_TEXTURE_SLOT)
        }
    }
}

/// Magenta and black checkerboard bound at slot 0
pub fn error_texture(size: u32, cell: u32) -> TextureUpload {
    let size = size.max(1);
    let cell = cell.max(1);
    let mut rgba8 = Vec::with_capacity((size * size * 4) as usize);
    for y in 0..size {
        for x in 0..size {
            let on = ((x / cell) + (y / cell)) % 2 == 0;
            if on {
                rgba8.extend_from_slice(&[255, 0, 255, 255]);
            } else {
                rgba8.extend_from_slice(&[0, 0, 0, 255]);
            }
        }
    }
    TextureUpload {
        name: ERROR_TEXTURE_NAME.to_string(),
        width: size,
        height: size,
        rgba8,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slots_are_stable() {
        let mut table = create_descriptor_table(4);
        let a = register_texture_slot(&mut table, "bricks").expect("slot");
        let b = register_texture_slot(&mut table, "tile").expect("slot");
        assert_eq!(a, TextureSlot(1));
        assert_eq!(b, TextureSlot(2));
        assert_eq!(register_texture_slot(&mut table, "bricks").expect("slot"), a);
    }

    #[test]
    fn test_table_full_is_an_error() {
        let mut table = create_descriptor_table(2);
        assert!(register_texture_slot(&mut table, "one").is_ok());
        let error = register_texture_slot(&mut table, "two").expect_err("table full");
        assert!(!error.is_fatal());
        assert!(!table.by_name.contains_key("two"));
    }

    #[test]
    fn test_validate_texture_upload() {
        let mut texture = TextureUpload {
            name: "bricks".to_string(),
            width: 4,
            height: 4,
            rgba8: vec![0; 3],
        };
        assert!(matches!(
            validate_texture_upload(&texture),
            Err(EngineError::InvalidAsset { .. })
        ));
        texture.rgba8 = vec![0; 64];
        assert!(validate_texture_upload(&texture).is_ok());
        texture.width = 0;
        texture.rgba8.clear();
        assert!(validate_texture_upload(&texture).is_err());
    }

    #[test]
    fn test_missing_texture_falls_back_to_slot_zero() {
        let mut table = create_descriptor_table(8);
        assert_eq!(texture_slot_or_error(&mut table, "nope"), TextureSlot(0));
        assert!(table.reported_missing.contains("nope"));
    }

    #[test]
    fn test_error_texture_pattern() {
        let tex = error_texture(4, 2);
        assert_eq!(tex.rgba8.len(), 64);
        assert_eq!(&tex.rgba8[0..4], &[255, 0, 255, 255]);
        // (2, 0) lies in the next cell
        assert_eq!(&tex.rgba8[8..12], &[0, 0, 0, 255]);
    }
}
