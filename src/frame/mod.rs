/// Frame Module - per-frame resource rotation and constant propagation
///
/// - frame_data.rs / constants_data.rs: slot bundles and GPU constant layouts
/// - frame_ring_operations.rs: acquire / complete / capacity growth
/// - dirty_operations.rs: change queue drained into N physical slots
/// - constants_operations.rs: constant writes and packing
pub mod constants_data;
pub mod constants_operations;
pub mod dirty_operations;
pub mod frame_data;
pub mod frame_ring_operations;

pub use constants_data::{LightConstants, MaterialConstants, ObjectConstants, PassConstants};
pub use frame_data::{
    ChangeEvent, ChangeQueue, ConstantBuffer, FrameCapacity, FrameResource, FrameRing, PropagationStats,
};

pub use constants_operations::{
    build_pass_constants, constant_buffer_capacity, constant_bytes, create_constant_buffer, light_world_matrix,
    pack_light_constants, pack_material_constants, pack_object_constants, read_constant, write_constant,
};
pub use dirty_operations::{drain_changes, mark_all_dirty, pending_changes, propagate_dirty_constants, queue_change};
pub use frame_ring_operations::{
    acquire_frame, capacity_fits, complete_frame, create_frame_ring, current_frame, current_frame_mut,
    ensure_capacity, frame_count, rebuild_frame_ring,
};
