//! Headless GPU operations
//!
//! The calling thread only enqueues jobs; the worker owns execution order.
//! Fence completion happens on the worker, so a waiting render thread is
//! woken exactly like it would be by a driver callback.

use std::sync::Arc;
use std::thread;

use crossbeam_channel::Receiver;

use super::headless_data::{
    HeadlessConfig, HeadlessControl, HeadlessGpu, HeadlessJob, HeadlessShared, HeadlessState, HeadlessStats,
    HeadlessTimeline, RECENT_DISPATCH_HISTORY,
};
use crate::error::{EngineError, EngineResult};
use crate::frame::{FrameCapacity, FrameResource};
use crate::gpu::backend::GpuBackend;
use crate::gpu::fence_operations::{complete_fence, fence_lost_reason, mark_fence_lost};
use crate::gpu::{CommandList, FenceValue, GpuCommand, GpuFence, PipelineDesc, PipelineHandle};
use crate::particles::{simulate_particles_cpu, ParticleBufferId, ParticleRecord};
use crate::render_graph::{check_present, create_state_tracker, initial_resource_states, validate_command_list, StateViolation, TargetSet};
use crate::scene::{validate_texture_upload, GeometryId, MeshGeometry, TextureSlot, TextureUpload};

// ============================================================================
// CREATION
// ============================================================================

/// Spawn the worker thread and return the backend
pub fn create_headless_gpu(config: HeadlessConfig) -> EngineResult<HeadlessGpu> {
    let control: HeadlessControl = Arc::new(HeadlessShared::default());
    let (sender, receiver) = crossbeam_channel::unbounded();

    let worker_control = control.clone();
    let worker = thread::Builder::new()
        .name("headless-gpu".to_string())
        .spawn(move || run_worker(worker_control, receiver, config))
        .map_err(|e| EngineError::DeviceCreation {
            reason: format!("headless worker thread: {}", e),
        })?;

    log::info!("[HeadlessGpu::create] Timeline {:?}, validation {}", config.timeline, config.validate);

    Ok(HeadlessGpu {
        config,
        control,
        sender,
        worker: Some(worker),
        pipelines: Default::default(),
        targets: None,
        frame_slots: 0,
        frame_capacity: FrameCapacity::default(),
        particle_capacity: 0,
    })
}

impl HeadlessGpu {
    pub fn clone_control(&self) -> HeadlessControl {
        self.control.clone()
    }
}

impl Drop for HeadlessGpu {
    fn drop(&mut self) {
        // A disconnected worker already exited
        let _ = self.sender.send(HeadlessJob::Shutdown);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::error!("[HeadlessGpu::drop] Worker thread panicked");
            }
        }
    }
}

// ============================================================================
// CONTROL (test side)
// ============================================================================

/// Retire every manual-timeline signal at or below `value`
pub fn release_fences_through(control: &HeadlessControl, value: FenceValue) {
    let mut state = control.state.lock();
    state.released_through = state.released_through.max(value);

    let released = state.released_through;
    let mut retired = 0;
    state.pending.retain(|(fence, signaled)| {
        if *signaled <= released {
            complete_fence(fence, *signaled);
            retired += 1;
            false
        } else {
            true
        }
    });
    state.stats.fences_completed += retired;
}

/// Lose the device: every fence fails, every later call errors
pub fn simulate_device_loss(control: &HeadlessControl, reason: &str) {
    let mut state = control.state.lock();
    if state.lost.is_none() {
        state.lost = Some(reason.to_string());
    }
    for fence in &state.fences {
        mark_fence_lost(fence, reason);
    }
    state.pending.clear();
}

pub fn headless_stats(control: &HeadlessControl) -> HeadlessStats {
    control.state.lock().stats.clone()
}

pub fn headless_particles(control: &HeadlessControl, buffer: ParticleBufferId) -> Vec<ParticleRecord> {
    control.state.lock().particles[buffer_index(buffer)].clone()
}

/// Particles alive in `buffer`
pub fn headless_live_particles(control: &HeadlessControl, buffer: ParticleBufferId) -> u32 {
    control.state.lock().particles[buffer_index(buffer)]
        .iter()
        .filter(|p| p.alive != 0)
        .count() as u32
}

// ============================================================================
// WORKER
// ============================================================================

fn buffer_index(buffer: ParticleBufferId) -> usize {
    match buffer {
        ParticleBufferId::A => 0,
        ParticleBufferId::B => 1,
    }
}

fn run_worker(control: HeadlessControl, receiver: Receiver<HeadlessJob>, config: HeadlessConfig) {
    while let Ok(job) = receiver.recv() {
        match job {
            HeadlessJob::Execute(lists) => {
                let mut state = control.state.lock();
                if state.lost.is_some() {
                    continue;
                }
                for list in &lists {
                    execute_list(&mut state, list, config.validate);
                }
            }
            HeadlessJob::Signal(fence, value) => retire_signal(&control, &config, fence, value),
            HeadlessJob::Present(back_buffer) => {
                let mut state = control.state.lock();
                state.stats.presents += 1;
                if config.validate {
                    if let Err(error) = check_present(&state.tracker, back_buffer) {
                        record_violations(
                            &mut state,
                            vec![StateViolation {
                                list: "present",
                                command_index: 0,
                                message: error.to_string(),
                            }],
                        );
                    }
                }
            }
            HeadlessJob::Shutdown => break,
        }
    }
    log::debug!("[HeadlessGpu::worker] Worker exiting");
}

fn retire_signal(control: &HeadlessControl, config: &HeadlessConfig, fence: GpuFence, value: FenceValue) {
    if let HeadlessTimeline::Latency(delay) = config.timeline {
        thread::sleep(delay);
    }

    let mut state = control.state.lock();
    if let Some(reason) = &state.lost {
        mark_fence_lost(&fence, reason);
        return;
    }
    match config.timeline {
        HeadlessTimeline::Manual if value > state.released_through => state.pending.push((fence, value)),
        _ => {
            complete_fence(&fence, value);
            state.stats.fences_completed += 1;
        }
    }
}

fn record_violations(state: &mut HeadlessState, violations: Vec<StateViolation>) {
    for violation in &violations {
        log::error!(
            "[HeadlessGpu::validate] {}[{}]: {}",
            violation.list,
            violation.command_index,
            violation.message
        );
    }
    state.stats.validation_errors.extend(violations);
}

fn execute_list(state: &mut HeadlessState, list: &CommandList, validate: bool) {
    if validate {
        let violations = validate_command_list(&mut state.tracker, list);
        if !violations.is_empty() {
            record_violations(state, violations);
        }
    }

    state.stats.lists_executed += 1;
    for command in &list.commands {
        match command {
            GpuCommand::BeginPass(_) => state.stats.passes += 1,
            GpuCommand::DrawIndexed(_)
            | GpuCommand::DrawLight { .. }
            | GpuCommand::DrawFullscreen
            | GpuCommand::DrawParticles { .. }
            | GpuCommand::DrawUi => state.stats.draws += 1,
            GpuCommand::UploadParticles { buffer, spawns } => {
                let records = &mut state.particles[buffer_index(*buffer)];
                for (slot, record) in spawns {
                    if let Some(target) = records.get_mut(*slot as usize) {
                        *target = *record;
                    }
                }
            }
            GpuCommand::ClearParticles { buffer } => {
                state.particles[buffer_index(*buffer)]
                    .iter_mut()
                    .for_each(|p| *p = ParticleRecord::default());
            }
            GpuCommand::Dispatch {
                input, output, params, ..
            } => {
                let [a, b] = &mut state.particles;
                let (src, dst) = match (input, output) {
                    (ParticleBufferId::A, ParticleBufferId::B) => (&*a, b),
                    (ParticleBufferId::B, ParticleBufferId::A) => (&*b, a),
                    _ => {
                        log::error!("[HeadlessGpu::execute_list] Dispatch reads and writes {:?}", input);
                        continue;
                    }
                };
                simulate_particles_cpu(src, dst, params);

                state.stats.dispatches += 1;
                let history = &mut state.stats.recent_dispatch_inputs;
                if history.len() == RECENT_DISPATCH_HISTORY {
                    history.pop_front();
                }
                history.push_back(*input);
            }
            _ => {}
        }
    }
}

// ============================================================================
// SUBMISSION CHECKS
// ============================================================================

fn check_slot(buffer: &'static str, index: u32, capacity: usize) -> EngineResult<()> {
    if index as usize >= capacity {
        return Err(EngineError::InvalidConstantSlot {
            buffer,
            index,
            capacity: capacity as u32,
        });
    }
    Ok(())
}

/// Every constant index a list references must exist in the slot's buffers
fn check_constant_indices(frame: &FrameResource, list: &CommandList) -> EngineResult<()> {
    for command in &list.commands {
        match command {
            GpuCommand::DrawIndexed(draw) => {
                check_slot("object", draw.object_index, frame.objects.elements.len())?;
                check_slot("material", draw.material_index, frame.materials.elements.len())?;
            }
            GpuCommand::DrawLight { light_index, .. } => {
                check_slot("light", *light_index, frame.lights.elements.len())?;
            }
            _ => {}
        }
    }
    Ok(())
}

impl HeadlessGpu {
    fn ensure_alive(&self) -> EngineResult<()> {
        match &self.control.state.lock().lost {
            Some(reason) => Err(EngineError::device_lost(reason.clone())),
            None => Ok(()),
        }
    }

    fn send(&self, job: HeadlessJob) -> EngineResult<()> {
        self.sender.send(job)?;
        Ok(())
    }
}

// ============================================================================
// BACKEND
// ============================================================================

impl GpuBackend for HeadlessGpu {
    fn backend_name(&self) -> &'static str {
        "headless"
    }

    fn create_pipeline(&mut self, handle: PipelineHandle, desc: &PipelineDesc) -> EngineResult<()> {
        self.ensure_alive()?;
        self.pipelines.insert(handle, desc.clone());
        self.control.state.lock().stats.pipelines_created += 1;
        Ok(())
    }

    fn upload_geometry(&mut self, id: GeometryId, geometry: &MeshGeometry) -> EngineResult<()> {
        self.ensure_alive()?;
        log::debug!(
            "[HeadlessGpu::upload_geometry] {} '{}': {} vertices, {} indices",
            id.0,
            geometry.name,
            geometry.vertices.len(),
            geometry.indices.len()
        );
        self.control.state.lock().stats.geometries_uploaded += 1;
        Ok(())
    }

    fn upload_texture(&mut self, slot: TextureSlot, texture: &TextureUpload) -> EngineResult<()> {
        self.ensure_alive()?;
        validate_texture_upload(texture)?;
        log::debug!("[HeadlessGpu::upload_texture] '{}' -> slot {}", texture.name, slot.0);
        self.control.state.lock().stats.textures_uploaded += 1;
        Ok(())
    }

    fn configure_frame_resources(&mut self, slot_count: usize, capacity: &FrameCapacity) -> EngineResult<()> {
        self.ensure_alive()?;
        self.frame_slots = slot_count;
        self.frame_capacity = *capacity;
        self.control.state.lock().stats.frame_configurations += 1;
        Ok(())
    }

    fn configure_targets(&mut self, targets: &TargetSet) -> EngineResult<()> {
        self.ensure_alive()?;
        let boundary = initial_resource_states(targets);

        let mut state = self.control.state.lock();
        state.tracker = create_state_tracker(boundary.clone());
        state.boundary_states = boundary;
        state.stats.target_configurations += 1;
        drop(state);

        self.targets = Some(targets.clone());
        Ok(())
    }

    fn configure_particles(&mut self, capacity: u32) -> EngineResult<()> {
        self.ensure_alive()?;
        self.particle_capacity = capacity;
        let mut state = self.control.state.lock();
        state.particles = [
            vec![ParticleRecord::default(); capacity as usize],
            vec![ParticleRecord::default(); capacity as usize],
        ];
        Ok(())
    }

    fn submit(&mut self, frame: &FrameResource, lists: Vec<CommandList>) -> EngineResult<()> {
        self.ensure_alive()?;
        for list in &lists {
            check_constant_indices(frame, list)?;
        }
        self.control.state.lock().stats.submissions += 1;
        self.send(HeadlessJob::Execute(lists))
    }

    fn signal(&mut self, fence: &GpuFence, value: FenceValue) -> EngineResult<()> {
        {
            let mut state = self.control.state.lock();
            if !state.fences.iter().any(|known| Arc::ptr_eq(&known.shared, &fence.shared)) {
                state.fences.push(fence.clone());
            }
            if let Some(reason) = &state.lost {
                mark_fence_lost(fence, reason);
                return Err(EngineError::device_lost(reason.clone()));
            }
            state.stats.fences_signaled += 1;
        }
        self.send(HeadlessJob::Signal(fence.clone(), value))
    }

    fn pump(&mut self, fence: &GpuFence, _value: FenceValue) -> EngineResult<()> {
        // The worker retires fences on its own
        match fence_lost_reason(fence) {
            Some(reason) => Err(EngineError::device_lost(reason)),
            None => Ok(()),
        }
    }

    fn present(&mut self, back_buffer: u32) -> EngineResult<()> {
        self.ensure_alive()?;
        self.send(HeadlessJob::Present(back_buffer))
    }

    fn device_lost_reason(&self) -> Option<String> {
        self.control.state.lock().lost.clone()
    }
}
