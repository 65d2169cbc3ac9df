//! Headless software GPU backend
//!
//! Used by tests and the headless demo: no adapter needed.

pub mod headless_data;
pub mod headless_operations;

pub use headless_data::{HeadlessConfig, HeadlessControl, HeadlessGpu, HeadlessStats, HeadlessTimeline};
pub use headless_operations::{
    create_headless_gpu, headless_live_particles, headless_particles, headless_stats, release_fences_through,
    simulate_device_loss,
};
