//! Window resize and sample count changes
//!
//! Every size-dependent resource is recreated with the queue idle: the sync
//! gate is flushed first, then targets are rebuilt in one piece. Resizes
//! reported while the user drags the window border are held back and applied
//! once on drag end.

use super::engine_data::{EngineState, Renderer};
use super::engine_operations::{ensure_device_alive, guarded, sample_count_for};
use crate::camera::update_aspect_ratio;
use crate::error::EngineResult;
use crate::gpu::flush;
use crate::render_graph::{create_pipeline_library, resize_target_set, set_sample_count};

/// Host reported a new client size. Returns true if targets were recreated
pub fn resize(renderer: &mut Renderer, width: u32, height: u32) -> EngineResult<bool> {
    ensure_device_alive(renderer)?;
    if width == 0 || height == 0 {
        log::debug!("[Engine::resize] Ignoring zero-sized resize {}x{}", width, height);
        return Ok(false);
    }
    if renderer.resize.dragging {
        renderer.resize.pending = Some((width, height));
        return Ok(false);
    }
    apply_resize(renderer, width, height)
}

fn apply_resize(renderer: &mut Renderer, width: u32, height: u32) -> EngineResult<bool> {
    if width == renderer.targets.width && height == renderer.targets.height {
        return Ok(false);
    }

    guarded(renderer, |r| {
        flush(&mut r.gate, r.backend.as_mut())?;
        if !resize_target_set(&mut r.targets, width, height) {
            return Ok(false);
        }
        r.backend.configure_targets(&r.targets)?;
        r.camera = update_aspect_ratio(&r.camera, r.targets.width, r.targets.height);
        r.config.window_width = r.targets.width;
        r.config.window_height = r.targets.height;

        log::info!(
            "[Engine::resize] Targets recreated at {}x{} ({} back buffers)",
            r.targets.width,
            r.targets.height,
            r.targets.back_buffer_count
        );
        Ok(true)
    })
}

pub fn begin_resize_drag(renderer: &mut Renderer) {
    renderer.resize.dragging = true;
}

/// Apply the last size reported during the drag, if any
pub fn end_resize_drag(renderer: &mut Renderer) -> EngineResult<bool> {
    renderer.resize.dragging = false;
    match renderer.resize.pending.take() {
        Some((width, height)) => resize(renderer, width, height),
        None => Ok(false),
    }
}

/// Minimising pauses the frame loop; restoring resumes it
pub fn set_minimized(renderer: &mut Renderer, minimized: bool) {
    renderer.resize.minimized = minimized;
    renderer.state = match (renderer.state, minimized) {
        (EngineState::DeviceLost, _) => EngineState::DeviceLost,
        (_, true) => EngineState::Paused,
        (_, false) => EngineState::Ready,
    };
    log::info!("[Engine::set_minimized] minimized = {}, state {}", minimized, renderer.state.name());
}

/// Toggle 4x MSAA. Recreates the targets and every pipeline
pub fn set_msaa(renderer: &mut Renderer, enabled: bool) -> EngineResult<bool> {
    if renderer.settings.msaa_4x == enabled {
        return Ok(false);
    }

    guarded(renderer, |r| {
        flush(&mut r.gate, r.backend.as_mut())?;
        let sample_count = sample_count_for(enabled);
        set_sample_count(&mut r.targets, sample_count);
        r.backend.configure_targets(&r.targets)?;
        r.library = create_pipeline_library(r.backend.as_mut(), sample_count)?;
        r.settings.msaa_4x = enabled;
        r.config.msaa_4x = enabled;

        log::info!("[Engine::set_msaa] {}x samples", sample_count);
        Ok(true)
    })
}
