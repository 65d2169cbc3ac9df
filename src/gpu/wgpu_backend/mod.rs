/// wgpu backend - executes recorded command lists on a real device
///
/// Rendering always targets offscreen back buffers. A device created with
/// `create_wgpu_gpu_for_surface` copies each presented back buffer into the
/// host's window surface.
pub mod device_watch;
pub mod encode_operations;
pub mod wgpu_data;
pub mod wgpu_operations;

pub use device_watch::{DeviceWatch, MAX_VALIDATION_ERRORS};
pub use wgpu_data::{PresentSurface, WgpuConfig, WgpuGpu};
pub use wgpu_operations::{create_wgpu_gpu, create_wgpu_gpu_for_surface, pick_surface_format, register_shader};
