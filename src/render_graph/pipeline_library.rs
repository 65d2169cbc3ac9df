//! Pipeline library
//!
//! Every pipeline the frame uses is a fixed description selected by an enum
//! key. Keys are resolved to integer handles once, when the library is
//! built; the recording path only ever sees handles.

use crate::error::{EngineError, EngineResult};
use crate::gpu::{
    BlendMode, CullMode, DepthMode, FillMode, GpuBackend, LightProxy, PipelineDesc, PipelineHandle, ShaderPair,
    TargetLayout, Topology,
};
use crate::scene::LightKind;
use rustc_hash::FxHashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PipelineKey {
    GeometryOpaque,
    GeometryOpaqueWireframe,
    GeometryTessellated,
    GeometryTessellatedWireframe,
    LightFullscreen,
    LightVolumeSphere,
    LightVolumeCylinder,
    LightVolumeDebug,
    ParticleSimulate,
    ParticleRender,
    PostProcess,
    Ui,
}

impl PipelineKey {
    pub const ALL: [PipelineKey; 12] = [
        PipelineKey::GeometryOpaque,
        PipelineKey::GeometryOpaqueWireframe,
        PipelineKey::GeometryTessellated,
        PipelineKey::GeometryTessellatedWireframe,
        PipelineKey::LightFullscreen,
        PipelineKey::LightVolumeSphere,
        PipelineKey::LightVolumeCylinder,
        PipelineKey::LightVolumeDebug,
        PipelineKey::ParticleSimulate,
        PipelineKey::ParticleRender,
        PipelineKey::PostProcess,
        PipelineKey::Ui,
    ];

    /// Debug name, also used as the label of the device object
    pub fn name(self) -> &'static str {
        match self {
            PipelineKey::GeometryOpaque => "geometry_opaque",
            PipelineKey::GeometryOpaqueWireframe => "geometry_opaque_wireframe",
            PipelineKey::GeometryTessellated => "geometry_tessellated",
            PipelineKey::GeometryTessellatedWireframe => "geometry_tessellated_wireframe",
            PipelineKey::LightFullscreen => "light_fullscreen",
            PipelineKey::LightVolumeSphere => "light_volume_sphere",
            PipelineKey::LightVolumeCylinder => "light_volume_cylinder",
            PipelineKey::LightVolumeDebug => "light_volume_debug",
            PipelineKey::ParticleSimulate => "particle_simulate",
            PipelineKey::ParticleRender => "particle_render",
            PipelineKey::PostProcess => "post_process",
            PipelineKey::Ui => "ui",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PipelineLibrary {
    pub handles: FxHashMap<PipelineKey, PipelineHandle>,
    pub descs: Vec<PipelineDesc>,
    pub sample_count: u32,
}

// ============================================================================
// DESCRIPTIONS
// ============================================================================

/// Fixed-function state for `key`
pub fn pipeline_desc_for(key: PipelineKey, sample_count: u32) -> PipelineDesc {
    let geometry = |shaders: ShaderPair, fill: FillMode| PipelineDesc {
        label: key.name(),
        shaders,
        blend: BlendMode::Opaque,
        depth: DepthMode::ReadWrite,
        cull: if fill == FillMode::Wireframe { CullMode::None } else { CullMode::Back },
        fill,
        topology: Topology::TriangleList,
        targets: TargetLayout::GBuffer,
        sample_count,
    };
    let light = |vertex: &'static str, depth: DepthMode, cull: CullMode| PipelineDesc {
        label: key.name(),
        shaders: ShaderPair {
            vertex,
            fragment: "deferred_light_fs",
        },
        blend: BlendMode::Additive,
        depth,
        cull,
        fill: FillMode::Solid,
        topology: Topology::TriangleList,
        targets: TargetLayout::Lit,
        sample_count,
    };

    let opaque_shaders = ShaderPair {
        vertex: "gbuffer_vs",
        fragment: "gbuffer_fs",
    };
    let tessellated_shaders = ShaderPair {
        vertex: "gbuffer_displaced_vs",
        fragment: "gbuffer_fs",
    };

    match key {
        PipelineKey::GeometryOpaque => geometry(opaque_shaders, FillMode::Solid),
        PipelineKey::GeometryOpaqueWireframe => geometry(opaque_shaders, FillMode::Wireframe),
        PipelineKey::GeometryTessellated => geometry(tessellated_shaders, FillMode::Solid),
        PipelineKey::GeometryTessellatedWireframe => geometry(tessellated_shaders, FillMode::Wireframe),
        // Fullscreen accumulation has no depth test
        PipelineKey::LightFullscreen => light("fullscreen_vs", DepthMode::Disabled, CullMode::None),
        // Back faces so the volume still lights when the eye is inside it
        PipelineKey::LightVolumeSphere => light("light_volume_vs", DepthMode::ReadOnly, CullMode::Front),
        PipelineKey::LightVolumeCylinder => light("light_volume_vs", DepthMode::ReadOnly, CullMode::Front),
        PipelineKey::LightVolumeDebug => PipelineDesc {
            label: key.name(),
            shaders: ShaderPair {
                vertex: "light_volume_vs",
                fragment: "debug_volume_fs",
            },
            blend: BlendMode::AlphaBlend,
            depth: DepthMode::ReadOnly,
            cull: CullMode::None,
            fill: FillMode::Wireframe,
            topology: Topology::TriangleList,
            targets: TargetLayout::Lit,
            sample_count,
        },
        PipelineKey::ParticleSimulate => PipelineDesc {
            label: key.name(),
            shaders: ShaderPair {
                vertex: "",
                fragment: "particle_simulate_cs",
            },
            blend: BlendMode::Opaque,
            depth: DepthMode::Disabled,
            cull: CullMode::None,
            fill: FillMode::Solid,
            topology: Topology::PointList,
            targets: TargetLayout::Compute,
            sample_count: 1,
        },
        PipelineKey::ParticleRender => PipelineDesc {
            label: key.name(),
            shaders: ShaderPair {
                vertex: "particle_vs",
                fragment: "particle_fs",
            },
            blend: BlendMode::Additive,
            depth: DepthMode::ReadOnly,
            cull: CullMode::None,
            fill: FillMode::Solid,
            topology: Topology::PointList,
            targets: TargetLayout::Lit,
            sample_count,
        },
        PipelineKey::PostProcess => PipelineDesc {
            label: key.name(),
            shaders: ShaderPair {
                vertex: "fullscreen_vs",
                fragment: "post_process_fs",
            },
            blend: BlendMode::Opaque,
            depth: DepthMode::Disabled,
            cull: CullMode::None,
            fill: FillMode::Solid,
            topology: Topology::TriangleList,
            targets: TargetLayout::BackBuffer,
            sample_count: 1,
        },
        PipelineKey::Ui => PipelineDesc {
            label: key.name(),
            shaders: ShaderPair {
                vertex: "ui_vs",
                fragment: "ui_fs",
            },
            blend: BlendMode::AlphaBlend,
            depth: DepthMode::Disabled,
            cull: CullMode::None,
            fill: FillMode::Solid,
            topology: Topology::TriangleList,
            targets: TargetLayout::BackBuffer,
            sample_count: 1,
        },
    }
}

/// Geometry pipeline for one bucket
pub fn geometry_pipeline_key(tessellated: bool, wireframe: bool) -> PipelineKey {
    match (tessellated, wireframe) {
        (false, false) => PipelineKey::GeometryOpaque,
        (false, true) => PipelineKey::GeometryOpaqueWireframe,
        (true, false) => PipelineKey::GeometryTessellated,
        (true, true) => PipelineKey::GeometryTessellatedWireframe,
    }
}

/// Proxy geometry and pipeline for a light type.
///
/// Point and spot lights without a proxy mesh fall back to a fullscreen
/// pass, which is correct but touches every pixel.
pub fn light_pipeline_key(kind: LightKind, has_proxy_mesh: bool) -> (PipelineKey, LightProxy) {
    match kind {
        LightKind::Ambient | LightKind::Directional => (PipelineKey::LightFullscreen, LightProxy::FullscreenQuad),
        LightKind::Point if has_proxy_mesh => (PipelineKey::LightVolumeSphere, LightProxy::Sphere),
        LightKind::Spot if has_proxy_mesh => (PipelineKey::LightVolumeCylinder, LightProxy::Cylinder),
        LightKind::Point | LightKind::Spot => (PipelineKey::LightFullscreen, LightProxy::FullscreenQuad),
    }
}

// ============================================================================
// LIBRARY
// ============================================================================

/// Create every pipeline on the backend. Any failure aborts startup
pub fn create_pipeline_library(backend: &mut dyn GpuBackend, sample_count: u32) -> EngineResult<PipelineLibrary> {
    create_pipeline_library_for(backend, &PipelineKey::ALL, sample_count)
}

/// Create only `keys`. Recording a pass whose pipeline is absent fails
pub fn create_pipeline_library_for(
    backend: &mut dyn GpuBackend,
    keys: &[PipelineKey],
    sample_count: u32,
) -> EngineResult<PipelineLibrary> {
    let mut library = PipelineLibrary {
        sample_count,
        ..Default::default()
    };

    for (index, key) in keys.iter().enumerate() {
        let handle = PipelineHandle(index as u32);
        let desc = pipeline_desc_for(*key, sample_count);
        backend.create_pipeline(handle, &desc)?;
        library.handles.insert(*key, handle);
        library.descs.push(desc);
    }

    log::info!(
        "[PipelineLibrary::create] {} pipelines on {} backend ({}x samples)",
        library.handles.len(),
        backend.backend_name(),
        sample_count
    );
    Ok(library)
}

pub fn pipeline_handle(library: &PipelineLibrary, key: PipelineKey) -> EngineResult<PipelineHandle> {
    library
        .handles
        .get(&key)
        .copied()
        .ok_or_else(|| EngineError::PipelineMissing {
            key: key.name().to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::{create_headless_gpu, HeadlessConfig};

    #[test]
    fn test_light_proxy_selection() {
        assert_eq!(
            light_pipeline_key(LightKind::Ambient, true),
            (PipelineKey::LightFullscreen, LightProxy::FullscreenQuad)
        );
        assert_eq!(
            light_pipeline_key(LightKind::Directional, false).1,
            LightProxy::FullscreenQuad
        );
        assert_eq!(light_pipeline_key(LightKind::Point, true).1, LightProxy::Sphere);
        assert_eq!(light_pipeline_key(LightKind::Spot, true).1, LightProxy::Cylinder);
        assert_eq!(
            light_pipeline_key(LightKind::Spot, false),
            (PipelineKey::LightFullscreen, LightProxy::FullscreenQuad)
        );
    }

    #[test]
    fn test_light_pipelines_accumulate() {
        for key in [
            PipelineKey::LightFullscreen,
            PipelineKey::LightVolumeSphere,
            PipelineKey::LightVolumeCylinder,
        ] {
            let desc = pipeline_desc_for(key, 1);
            assert_eq!(desc.blend, BlendMode::Additive);
            assert_eq!(desc.targets, TargetLayout::Lit);
        }
        assert_eq!(pipeline_desc_for(PipelineKey::LightFullscreen, 1).depth, DepthMode::Disabled);
        assert_eq!(pipeline_desc_for(PipelineKey::LightVolumeSphere, 1).depth, DepthMode::ReadOnly);
    }

    #[test]
    fn test_msaa_only_touches_scene_targets() {
        assert_eq!(pipeline_desc_for(PipelineKey::GeometryOpaque, 4).sample_count, 4);
        assert_eq!(pipeline_desc_for(PipelineKey::PostProcess, 4).sample_count, 1);
        assert_eq!(pipeline_desc_for(PipelineKey::ParticleSimulate, 4).sample_count, 1);
    }

    #[test]
    fn test_library_issues_handles() {
        let mut gpu = create_headless_gpu(HeadlessConfig::default()).expect("headless gpu");
        let library = create_pipeline_library(&mut gpu, 1).expect("library");
        assert_eq!(library.handles.len(), PipelineKey::ALL.len());
        assert!(pipeline_handle(&library, PipelineKey::Ui).is_ok());

        let partial = create_pipeline_library_for(&mut gpu, &[PipelineKey::Ui], 1).expect("partial");
        assert!(matches!(
            pipeline_handle(&partial, PipelineKey::PostProcess),
            Err(EngineError::PipelineMissing { .. })
        ));
    }
}
