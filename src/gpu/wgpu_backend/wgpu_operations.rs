//! wgpu backend operations
//!
//! Device creation, resource (re)allocation and pipeline building. Command
//! list execution lives in `encode_operations.rs`.

use std::num::NonZeroU64;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use wgpu::util::DeviceExt;

use super::device_watch::{create_device_watch, lost_reason, watch_fence};
use super::encode_operations::encode_lists;
use super::wgpu_data::{
    ConstantStrides, GeometryBuffers, LayoutKind, ParticleBuffers, PresentSurface, RenderTexture, SlotBuffers,
    TargetLayouts, TargetTextures, TextureBinding, WgpuConfig, WgpuGpu, WgpuLayouts, WgpuPipeline,
};
use crate::error::{EngineError, EngineResult, OptionExt};
use crate::frame::{
    constant_bytes, ConstantBuffer, FrameCapacity, FrameResource, LightConstants, MaterialConstants, ObjectConstants,
    PassConstants,
};
use crate::gpu::backend::GpuBackend;
use crate::gpu::fence_operations::complete_fence;
use crate::gpu::{
    BlendMode, CommandList, CullMode, DepthMode, FenceValue, FillMode, GpuFence, PipelineDesc, PipelineHandle,
    TargetLayout, Topology,
};
use crate::particles::{ParticleRecord, ParticleSimParams};
use crate::render_graph::TargetSet;
use crate::scene::{validate_texture_upload, GeometryId, MeshGeometry, TextureSlot, TextureUpload, Vertex};

pub const VERTEX_ENTRY: &str = "vs_main";
pub const FRAGMENT_ENTRY: &str = "fs_main";
pub const COMPUTE_ENTRY: &str = "cs_main";

pub const BACK_BUFFER_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Bgra8UnormSrgb;
pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth24PlusStencil8;
pub const LIT_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;
pub const GBUFFER_FORMATS: [wgpu::TextureFormat; 3] = [
    wgpu::TextureFormat::Rgba8Unorm,
    wgpu::TextureFormat::Rgba32Float,
    wgpu::TextureFormat::R32Float,
];

// ============================================================================
// DEVICE
// ============================================================================

/// Create an adapter and device with no surface attached.
///
/// Frames render offscreen and `present` only rotates back buffers.
pub fn create_wgpu_gpu(config: &WgpuConfig) -> EngineResult<WgpuGpu> {
    let instance = create_instance(config);
    let (gpu, _) = create_device(config, &instance, None)?;
    Ok(gpu)
}

/// Create a device that presents into `target`, typically the host's window.
///
/// The surface is configured for the initial size and reconfigured whenever
/// the renderer recreates its targets.
pub fn create_wgpu_gpu_for_surface(
    config: &WgpuConfig,
    target: impl Into<wgpu::SurfaceTarget<'static>>,
    width: u32,
    height: u32,
) -> EngineResult<WgpuGpu> {
    let instance = create_instance(config);
    let surface = instance
        .create_surface(target)
        .map_err(|e| EngineError::DeviceCreation {
            reason: format!("surface creation failed: {}", e),
        })?;
    let (mut gpu, adapter) = create_device(config, &instance, Some(&surface))?;

    let capabilities = surface.get_capabilities(&adapter);
    let format = pick_surface_format(&capabilities.formats).ok_or_engine(|| EngineError::DeviceCreation {
        reason: format!(
            "surface offers no format copy-compatible with {:?}: {:?}",
            BACK_BUFFER_FORMAT, capabilities.formats
        ),
    })?;
    if !capabilities.usages.contains(wgpu::TextureUsages::COPY_DST) {
        return Err(EngineError::DeviceCreation {
            reason: "surface textures cannot be copy destinations".to_string(),
        });
    }

    let surface_config = wgpu::SurfaceConfiguration {
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_DST,
        format,
        width: width.max(1),
        height: height.max(1),
        present_mode: wgpu::PresentMode::Fifo,
        desired_maximum_frame_latency: 2,
        alpha_mode: capabilities
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto),
        view_formats: Vec::new(),
    };
    surface.configure(&gpu.device, &surface_config);
    log::info!(
        "[WgpuGpu::create_for_surface] Surface {:?} {}x{}",
        format,
        surface_config.width,
        surface_config.height
    );

    gpu.surface = Some(PresentSurface {
        surface,
        config: surface_config,
    });
    Ok(gpu)
}

/// Surface format the back buffer can be copied into, exact match first
pub fn pick_surface_format(formats: &[wgpu::TextureFormat]) -> Option<wgpu::TextureFormat> {
    formats
        .iter()
        .copied()
        .find(|format| *format == BACK_BUFFER_FORMAT)
        .or_else(|| {
            formats
                .iter()
                .copied()
                .find(|format| format.remove_srgb_suffix() == BACK_BUFFER_FORMAT.remove_srgb_suffix())
        })
}

fn create_instance(config: &WgpuConfig) -> wgpu::Instance {
    wgpu::Instance::new(wgpu::InstanceDescriptor {
        backends: config.backends,
        ..Default::default()
    })
}

fn create_device(
    config: &WgpuConfig,
    instance: &wgpu::Instance,
    compatible_surface: Option<&wgpu::Surface<'static>>,
) -> EngineResult<(WgpuGpu, wgpu::Adapter)> {
    let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
        power_preference: config.power_preference,
        compatible_surface,
        force_fallback_adapter: false,
    }))
    .ok_or_engine(|| EngineError::DeviceCreation {
        reason: "no suitable GPU adapter".to_string(),
    })?;

    let adapter_name = adapter.get_info().name;
    let mut required_features = wgpu::Features::empty();
    if config.request_polygon_line && adapter.features().contains(wgpu::Features::POLYGON_MODE_LINE) {
        required_features |= wgpu::Features::POLYGON_MODE_LINE;
    }

    let (device, queue) = pollster::block_on(adapter.request_device(
        &wgpu::DeviceDescriptor {
            label: Some("Deferred Renderer Device"),
            required_features,
            required_limits: wgpu::Limits::default(),
        },
        None,
    ))
    .map_err(|e| EngineError::DeviceCreation {
        reason: e.to_string(),
    })?;

    let watch = create_device_watch(&device);
    let alignment = u64::from(device.limits().min_uniform_buffer_offset_alignment);
    let strides = ConstantStrides {
        object: align_to(std::mem::size_of::<ObjectConstants>() as u64, alignment),
        material: align_to(std::mem::size_of::<MaterialConstants>() as u64, alignment),
        light: align_to(std::mem::size_of::<LightConstants>() as u64, alignment),
    };

    let layouts = create_layouts(&device);
    let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
        label: Some("Material Sampler"),
        address_mode_u: wgpu::AddressMode::Repeat,
        address_mode_v: wgpu::AddressMode::Repeat,
        mag_filter: wgpu::FilterMode::Linear,
        min_filter: wgpu::FilterMode::Linear,
        ..Default::default()
    });

    log::info!(
        "[WgpuGpu::create] Adapter '{}', features {:?}, constant stride {}",
        adapter_name,
        required_features,
        alignment
    );

    let gpu = WgpuGpu {
        device: Arc::new(device),
        queue: Arc::new(queue),
        adapter_name,
        features: required_features,
        watch,
        shaders: FxHashMap::default(),
        layouts,
        sampler,
        strides,
        pipelines: FxHashMap::default(),
        geometries: FxHashMap::default(),
        textures: FxHashMap::default(),
        slots: Vec::new(),
        targets: None,
        particles: None,
        last_submission: None,
        signaled: Vec::new(),
        surface: None,
        presented: 0,
        presents_skipped: 0,
    };
    Ok((gpu, adapter))
}

pub fn align_to(size: u64, alignment: u64) -> u64 {
    size.div_ceil(alignment) * alignment
}

/// Compile WGSL for a shader key referenced by pipeline descriptions.
///
/// Entry points are `vs_main`, `fs_main` and `cs_main`.
pub fn register_shader(gpu: &mut WgpuGpu, key: &str, wgsl: &str) {
    let module = gpu.device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(key),
        source: wgpu::ShaderSource::Wgsl(wgsl.into()),
    });
    gpu.shaders.insert(key.to_string(), module);
}

// ============================================================================
// LAYOUTS
// ============================================================================

fn uniform_entry(binding: u32, size: u64, dynamic: bool) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::VERTEX_FRAGMENT | wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: dynamic,
            min_binding_size: NonZeroU64::new(size),
        },
        count: None,
    }
}

fn storage_entry(binding: u32, read_only: bool, visibility: wgpu::ShaderStages) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn texture_entry(binding: u32, sample_type: wgpu::TextureSampleType, multisampled: bool) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Texture {
            sample_type,
            view_dimension: wgpu::TextureViewDimension::D2,
            multisampled,
        },
        count: None,
    }
}

fn create_layouts(device: &wgpu::Device) -> WgpuLayouts {
    let frame = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("Frame Constants Layout"),
        entries: &[
            uniform_entry(0, std::mem::size_of::<PassConstants>() as u64, false),
            uniform_entry(1, std::mem::size_of::<ObjectConstants>() as u64, true),
            uniform_entry(2, std::mem::size_of::<MaterialConstants>() as u64, true),
            uniform_entry(3, std::mem::size_of::<LightConstants>() as u64, true),
        ],
    });

    let texture = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("Material Texture Layout"),
        entries: &[
            texture_entry(0, wgpu::TextureSampleType::Float { filterable: true }, false),
            wgpu::BindGroupLayoutEntry {
                binding: 1,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                count: None,
            },
        ],
    });

    let particle_render = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("Particle Render Layout"),
        entries: &[storage_entry(0, true, wgpu::ShaderStages::VERTEX)],
    });

    let particle_simulate = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("Particle Simulate Layout"),
        entries: &[
            storage_entry(0, true, wgpu::ShaderStages::COMPUTE),
            storage_entry(1, false, wgpu::ShaderStages::COMPUTE),
            uniform_entry(2, std::mem::size_of::<ParticleSimParams>() as u64, false),
        ],
    });

    WgpuLayouts {
        frame,
        texture,
        particle_render,
        particle_simulate,
        targets: FxHashMap::default(),
    }
}

fn create_target_layouts(device: &wgpu::Device, sample_count: u32) -> TargetLayouts {
    let multisampled = sample_count > 1;
    let float = wgpu::TextureSampleType::Float { filterable: false };

    let gbuffer = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("G-Buffer Layout"),
        entries: &[
            texture_entry(0, float, multisampled),
            texture_entry(1, float, multisampled),
            texture_entry(2, float, multisampled),
            texture_entry(3, wgpu::TextureSampleType::Depth, multisampled),
        ],
    });
    let composite = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("Composite Layout"),
        entries: &[texture_entry(0, float, multisampled)],
    });

    TargetLayouts { gbuffer, composite }
}

fn ensure_target_layouts(gpu: &mut WgpuGpu, sample_count: u32) {
    if !gpu.layouts.targets.contains_key(&sample_count) {
        let layouts = create_target_layouts(&gpu.device, sample_count);
        gpu.layouts.targets.insert(sample_count, layouts);
    }
}

fn target_layouts(gpu: &WgpuGpu, sample_count: u32) -> EngineResult<&TargetLayouts> {
    gpu.layouts.targets.get(&sample_count).ok_or_engine(|| EngineError::Internal {
        message: format!("no target layouts for {}x sampling", sample_count),
    })
}

// ============================================================================
// PIPELINES
// ============================================================================

fn layout_kind(desc: &PipelineDesc) -> LayoutKind {
    match (desc.targets, desc.topology) {
        (TargetLayout::GBuffer, _) => LayoutKind::Geometry,
        (TargetLayout::Lit, Topology::PointList) => LayoutKind::ParticleRender,
        (TargetLayout::Lit, _) => LayoutKind::Lighting,
        (TargetLayout::BackBuffer, _) => LayoutKind::Composite,
        (TargetLayout::Compute, _) => LayoutKind::ParticleSimulate,
    }
}

fn blend_state(blend: BlendMode) -> Option<wgpu::BlendState> {
    match blend {
        BlendMode::Opaque => None,
        BlendMode::Additive => {
            let add = wgpu::BlendComponent {
                src_factor: wgpu::BlendFactor::One,
                dst_factor: wgpu::BlendFactor::One,
                operation: wgpu::BlendOperation::Add,
            };
            Some(wgpu::BlendState { color: add, alpha: add })
        }
        BlendMode::AlphaBlend => Some(wgpu::BlendState::ALPHA_BLENDING),
    }
}

fn depth_state(depth: DepthMode, layout: TargetLayout) -> Option<wgpu::DepthStencilState> {
    // Passes on the lit target attach depth read-only, so every pipeline
    // drawn there needs a matching depth format even without a test
    let (write, compare) = match (depth, layout) {
        (_, TargetLayout::BackBuffer) | (_, TargetLayout::Compute) => return None,
        (DepthMode::ReadWrite, _) => (true, wgpu::CompareFunction::LessEqual),
        (DepthMode::ReadOnly, _) => (false, wgpu::CompareFunction::LessEqual),
        (DepthMode::Disabled, _) => (false, wgpu::CompareFunction::Always),
    };
    Some(wgpu::DepthStencilState {
        format: DEPTH_FORMAT,
        depth_write_enabled: write,
        depth_compare: compare,
        stencil: wgpu::StencilState::default(),
        bias: wgpu::DepthBiasState::default(),
    })
}

fn shader<'a>(gpu: &'a WgpuGpu, key: &str, pipeline: &str) -> EngineResult<&'a wgpu::ShaderModule> {
    gpu.shaders.get(key).ok_or_engine(|| EngineError::ResourceCreation {
        resource: format!("pipeline '{}'", pipeline),
        reason: format!("shader '{}' not registered", key),
    })
}

fn build_pipeline(gpu: &mut WgpuGpu, desc: &PipelineDesc) -> EngineResult<WgpuPipeline> {
    let kind = layout_kind(desc);
    if matches!(kind, LayoutKind::Lighting | LayoutKind::Composite | LayoutKind::ParticleRender) {
        ensure_target_layouts(gpu, desc.sample_count);
    }
    ensure_target_layouts(gpu, 1);

    let gpu = &*gpu;
    let group_one = match kind {
        LayoutKind::Geometry => Some(&gpu.layouts.texture),
        LayoutKind::Lighting => Some(&target_layouts(gpu, desc.sample_count)?.gbuffer),
        LayoutKind::ParticleRender => Some(&gpu.layouts.particle_render),
        LayoutKind::Composite => Some(&target_layouts(gpu, 1)?.composite),
        LayoutKind::ParticleSimulate => None,
    };

    if kind == LayoutKind::ParticleSimulate {
        let layout = gpu.device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(desc.label),
            bind_group_layouts: &[&gpu.layouts.particle_simulate],
            push_constant_ranges: &[],
        });
        let pipeline = gpu.device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some(desc.label),
            layout: Some(&layout),
            module: shader(gpu, desc.shaders.fragment, desc.label)?,
            entry_point: COMPUTE_ENTRY,
        });
        return Ok(WgpuPipeline::Compute { pipeline });
    }

    let mut groups: Vec<&wgpu::BindGroupLayout> = vec![&gpu.layouts.frame];
    groups.extend(group_one);
    let layout = gpu.device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some(desc.label),
        bind_group_layouts: &groups,
        push_constant_ranges: &[],
    });

    let polygon_mode = match desc.fill {
        FillMode::Wireframe if gpu.features.contains(wgpu::Features::POLYGON_MODE_LINE) => wgpu::PolygonMode::Line,
        FillMode::Wireframe => {
            log::warn!("[WgpuGpu::build_pipeline] '{}' drawn solid: no line fill support", desc.label);
            wgpu::PolygonMode::Fill
        }
        FillMode::Solid => wgpu::PolygonMode::Fill,
    };
    let cull_mode = match desc.cull {
        CullMode::None => None,
        CullMode::Back => Some(wgpu::Face::Back),
        CullMode::Front => Some(wgpu::Face::Front),
    };
    let topology = match desc.topology {
        Topology::TriangleList => wgpu::PrimitiveTopology::TriangleList,
        Topology::PointList => wgpu::PrimitiveTopology::PointList,
        Topology::LineList => wgpu::PrimitiveTopology::LineList,
    };

    let blend = blend_state(desc.blend);
    let target = |format| Some(wgpu::ColorTargetState {
        format,
        blend,
        write_mask: wgpu::ColorWrites::ALL,
    });
    let targets: Vec<Option<wgpu::ColorTargetState>> = match desc.targets {
        TargetLayout::GBuffer => GBUFFER_FORMATS.iter().map(|f| target(*f)).collect(),
        TargetLayout::Lit => vec![target(LIT_FORMAT)],
        TargetLayout::BackBuffer | TargetLayout::Compute => vec![target(BACK_BUFFER_FORMAT)],
    };

    // Geometry meshes carry vertices; proxies and fullscreen triangles too,
    // except the fullscreen path which ignores them
    let vertex_layout = wgpu::VertexBufferLayout {
        array_stride: std::mem::size_of::<Vertex>() as u64,
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes: &wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x3, 2 => Float32x2, 3 => Float32x3],
    };
    let buffers: &[wgpu::VertexBufferLayout] = match kind {
        LayoutKind::Geometry | LayoutKind::Lighting if desc.shaders.vertex != "fullscreen_vs" => {
            std::slice::from_ref(&vertex_layout)
        }
        _ => &[],
    };

    let pipeline = gpu.device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(desc.label),
        layout: Some(&layout),
        vertex: wgpu::VertexState {
            module: shader(gpu, desc.shaders.vertex, desc.label)?,
            entry_point: VERTEX_ENTRY,
            buffers,
        },
        primitive: wgpu::PrimitiveState {
            topology,
            strip_index_format: None,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode,
            unclipped_depth: false,
            polygon_mode,
            conservative: false,
        },
        depth_stencil: depth_state(desc.depth, desc.targets),
        multisample: wgpu::MultisampleState {
            count: desc.sample_count,
            mask: !0,
            alpha_to_coverage_enabled: false,
        },
        fragment: Some(wgpu::FragmentState {
            module: shader(gpu, desc.shaders.fragment, desc.label)?,
            entry_point: FRAGMENT_ENTRY,
            targets: &targets,
        }),
        multiview: None,
    });

    Ok(WgpuPipeline::Render { pipeline, layout: kind })
}

// ============================================================================
// RESOURCES
// ============================================================================

fn create_render_texture(
    device: &wgpu::Device,
    label: &str,
    size: (u32, u32),
    format: wgpu::TextureFormat,
    sample_count: u32,
    extra_usage: wgpu::TextureUsages,
) -> RenderTexture {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size: wgpu::Extent3d {
            width: size.0,
            height: size.1,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count,
        dimension: wgpu::TextureDimension::D2,
        format,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING | extra_usage,
        view_formats: &[],
    });
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    RenderTexture { texture, view }
}

fn create_targets(gpu: &mut WgpuGpu, targets: &TargetSet) -> EngineResult<TargetTextures> {
    let samples = targets.sample_count;
    ensure_target_layouts(gpu, samples);
    ensure_target_layouts(gpu, 1);

    let device = &gpu.device;
    let size = (targets.width, targets.height);
    let back_buffers = (0..targets.back_buffer_count)
        .map(|i| {
            create_render_texture(
                device,
                &format!("Back Buffer {}", i),
                size,
                BACK_BUFFER_FORMAT,
                1,
                wgpu::TextureUsages::COPY_SRC,
            )
        })
        .collect();
    let depth = create_render_texture(device, "Depth Stencil", size, DEPTH_FORMAT, samples, wgpu::TextureUsages::empty());
    let depth_sample_view = depth.texture.create_view(&wgpu::TextureViewDescriptor {
        aspect: wgpu::TextureAspect::DepthOnly,
        ..Default::default()
    });
    let plain = wgpu::TextureUsages::empty();
    let gbuffers = [
        create_render_texture(device, "G-Buffer Albedo", size, GBUFFER_FORMATS[0], samples, plain),
        create_render_texture(device, "G-Buffer Normal", size, GBUFFER_FORMATS[1], samples, plain),
        create_render_texture(device, "G-Buffer Specular", size, GBUFFER_FORMATS[2], samples, plain),
    ];
    let lit = create_render_texture(device, "Lit Target", size, LIT_FORMAT, 1, plain);
    let lit_msaa =
        (samples > 1).then(|| create_render_texture(device, "Lit Target MSAA", size, LIT_FORMAT, samples, plain));

    let layouts = target_layouts(gpu, samples)?;
    let gbuffer_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("G-Buffer Bind Group"),
        layout: &layouts.gbuffer,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(&gbuffers[0].view),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::TextureView(&gbuffers[1].view),
            },
            wgpu::BindGroupEntry {
                binding: 2,
                resource: wgpu::BindingResource::TextureView(&gbuffers[2].view),
            },
            wgpu::BindGroupEntry {
                binding: 3,
                resource: wgpu::BindingResource::TextureView(&depth_sample_view),
            },
        ],
    });
    let composite_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("Composite Bind Group"),
        layout: &target_layouts(gpu, 1)?.composite,
        entries: &[wgpu::BindGroupEntry {
            binding: 0,
            resource: wgpu::BindingResource::TextureView(&lit.view),
        }],
    });

    Ok(TargetTextures {
        width: targets.width,
        height: targets.height,
        sample_count: samples,
        back_buffers,
        depth,
        depth_sample_view,
        gbuffers,
        lit,
        lit_msaa,
        gbuffer_bind_group,
        composite_bind_group,
    })
}

fn constant_binding(buffer: &wgpu::Buffer, size: usize) -> wgpu::BindingResource<'_> {
    wgpu::BindingResource::Buffer(wgpu::BufferBinding {
        buffer,
        offset: 0,
        size: NonZeroU64::new(size as u64),
    })
}

fn create_slot_buffers(gpu: &WgpuGpu, slot: usize, capacity: &FrameCapacity) -> SlotBuffers {
    let buffer = |label: String, size: u64| {
        gpu.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(&label),
            size: size.max(256),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        })
    };

    let pass = buffer(format!("Pass Constants {}", slot), std::mem::size_of::<PassConstants>() as u64);
    let objects = buffer(format!("Object Constants {}", slot), gpu.strides.object * u64::from(capacity.objects.max(1)));
    let materials = buffer(
        format!("Material Constants {}", slot),
        gpu.strides.material * u64::from(capacity.materials.max(1)),
    );
    let lights = buffer(format!("Light Constants {}", slot), gpu.strides.light * u64::from(capacity.lights.max(1)));

    let bind_group = gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("Frame Constants Bind Group"),
        layout: &gpu.layouts.frame,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: constant_binding(&pass, std::mem::size_of::<PassConstants>()),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: constant_binding(&objects, std::mem::size_of::<ObjectConstants>()),
            },
            wgpu::BindGroupEntry {
                binding: 2,
                resource: constant_binding(&materials, std::mem::size_of::<MaterialConstants>()),
            },
            wgpu::BindGroupEntry {
                binding: 3,
                resource: constant_binding(&lights, std::mem::size_of::<LightConstants>()),
            },
        ],
    });

    SlotBuffers {
        pass,
        objects,
        materials,
        lights,
        bind_group,
    }
}

fn create_particle_buffers(gpu: &WgpuGpu, capacity: u32) -> ParticleBuffers {
    let zeroed = vec![ParticleRecord::default(); capacity.max(1) as usize];
    let buffer = |label: &str| {
        gpu.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(label),
            contents: bytemuck::cast_slice(&zeroed),
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
        })
    };
    let buffers = [buffer("Particles A"), buffer("Particles B")];
    let params = gpu.device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("Particle Params"),
        size: std::mem::size_of::<ParticleSimParams>() as u64,
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });

    let simulate = |input: usize| {
        gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Particle Simulate Bind Group"),
            layout: &gpu.layouts.particle_simulate,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: buffers[input].as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: buffers[1 - input].as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: params.as_entire_binding(),
                },
            ],
        })
    };
    let render = |index: usize| {
        gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Particle Render Bind Group"),
            layout: &gpu.layouts.particle_render,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: buffers[index].as_entire_binding(),
            }],
        })
    };
    let simulate_bind_groups = [simulate(0), simulate(1)];
    let render_bind_groups = [render(0), render(1)];

    ParticleBuffers {
        capacity,
        buffers,
        params,
        simulate_bind_groups,
        render_bind_groups,
    }
}

/// Lay out `source` with `stride` bytes per element
fn strided_bytes<T: bytemuck::Pod>(source: &ConstantBuffer<T>, stride: u64) -> Vec<u8> {
    let element = std::mem::size_of::<T>();
    let packed = constant_bytes(source);
    let mut bytes = vec![0u8; stride as usize * source.elements.len()];
    for (index, chunk) in packed.chunks_exact(element).enumerate() {
        let offset = index * stride as usize;
        bytes[offset..offset + element].copy_from_slice(chunk);
    }
    bytes
}

fn upload_constants(gpu: &WgpuGpu, frame: &FrameResource) -> EngineResult<()> {
    let slot = gpu.slots.get(frame.slot).ok_or_engine(|| EngineError::InvalidHandle {
        kind: "frame slot",
        index: frame.slot as u32,
    })?;

    gpu.queue.write_buffer(&slot.pass, 0, constant_bytes(&frame.pass));
    for (buffer, bytes) in [
        (&slot.objects, strided_bytes(&frame.objects, gpu.strides.object)),
        (&slot.materials, strided_bytes(&frame.materials, gpu.strides.material)),
        (&slot.lights, strided_bytes(&frame.lights, gpu.strides.light)),
    ] {
        if bytes.len() as u64 > buffer.size() {
            return Err(EngineError::OutOfMemory {
                requested: bytes.len() as u64,
                available: buffer.size(),
            });
        }
        gpu.queue.write_buffer(buffer, 0, &bytes);
    }
    Ok(())
}

// ============================================================================
// BACKEND
// ============================================================================

impl WgpuGpu {
    fn ensure_alive(&self) -> EngineResult<()> {
        match lost_reason(&self.watch) {
            Some(reason) => Err(EngineError::device_lost(reason)),
            None => Ok(()),
        }
    }
}

// ============================================================================
// PRESENTATION
// ============================================================================

/// Copy the finished back buffer into the next surface texture and hand it
/// to the swap chain. Stale or busy surfaces skip the frame.
fn present_to_surface(gpu: &mut WgpuGpu, back_buffer: u32) -> EngineResult<()> {
    let (Some(present), Some(targets)) = (gpu.surface.as_ref(), gpu.targets.as_ref()) else {
        return Ok(());
    };
    let source = targets
        .back_buffers
        .get(back_buffer as usize)
        .ok_or_engine(|| EngineError::Internal {
            message: format!("back buffer {} out of range", back_buffer),
        })?;

    let frame = match present.surface.get_current_texture() {
        Ok(frame) => frame,
        Err(wgpu::SurfaceError::Outdated) | Err(wgpu::SurfaceError::Lost) => {
            log::warn!("[WgpuGpu::present] Surface outdated, reconfiguring and skipping frame");
            present.surface.configure(&gpu.device, &present.config);
            gpu.presents_skipped += 1;
            return Ok(());
        }
        Err(wgpu::SurfaceError::Timeout) => {
            log::warn!("[WgpuGpu::present] Surface timed out, skipping frame");
            gpu.presents_skipped += 1;
            return Ok(());
        }
        Err(wgpu::SurfaceError::OutOfMemory) => {
            return Err(EngineError::device_lost("out of memory acquiring surface texture"));
        }
    };

    let size = wgpu::Extent3d {
        width: targets.width.min(frame.texture.width()),
        height: targets.height.min(frame.texture.height()),
        depth_or_array_layers: 1,
    };
    let mut encoder = gpu.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("Present Encoder"),
    });
    encoder.copy_texture_to_texture(source.texture.as_image_copy(), frame.texture.as_image_copy(), size);
    let index = gpu.queue.submit(Some(encoder.finish()));
    gpu.last_submission = Some(index);
    frame.present();
    Ok(())
}

impl GpuBackend for WgpuGpu {
    fn backend_name(&self) -> &'static str {
        "wgpu"
    }

    fn create_pipeline(&mut self, handle: PipelineHandle, desc: &PipelineDesc) -> EngineResult<()> {
        self.ensure_alive()?;
        let pipeline = build_pipeline(self, desc)?;
        self.pipelines.insert(handle, pipeline);
        Ok(())
    }

    fn upload_geometry(&mut self, id: GeometryId, geometry: &MeshGeometry) -> EngineResult<()> {
        self.ensure_alive()?;
        if geometry.vertices.is_empty() || geometry.indices.is_empty() {
            return Err(EngineError::ResourceCreation {
                resource: format!("geometry '{}'", geometry.name),
                reason: "empty vertex or index data".to_string(),
            });
        }
        let vertex = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&geometry.name),
            contents: bytemuck::cast_slice(&geometry.vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&geometry.name),
            contents: bytemuck::cast_slice(&geometry.indices),
            usage: wgpu::BufferUsages::INDEX,
        });
        self.geometries.insert(id, GeometryBuffers { vertex, index });
        Ok(())
    }

    fn upload_texture(&mut self, slot: TextureSlot, upload: &TextureUpload) -> EngineResult<()> {
        self.ensure_alive()?;
        validate_texture_upload(upload)?;

        let size = wgpu::Extent3d {
            width: upload.width,
            height: upload.height,
            depth_or_array_layers: 1,
        };
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(&upload.name),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8UnormSrgb,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        self.queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &upload.rgba8,
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(4 * upload.width),
                rows_per_image: Some(upload.height),
            },
            size,
        );

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(&upload.name),
            layout: &self.layouts.texture,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
            ],
        });
        self.textures.insert(slot, TextureBinding { texture, bind_group });
        Ok(())
    }

    fn configure_frame_resources(&mut self, slot_count: usize, capacity: &FrameCapacity) -> EngineResult<()> {
        self.ensure_alive()?;
        let slots = (0..slot_count).map(|slot| create_slot_buffers(self, slot, capacity)).collect();
        self.slots = slots;
        log::info!(
            "[WgpuGpu::configure_frame_resources] {} slots, objects {}, materials {}, lights {}",
            slot_count,
            capacity.objects,
            capacity.materials,
            capacity.lights
        );
        Ok(())
    }

    fn configure_targets(&mut self, targets: &TargetSet) -> EngineResult<()> {
        self.ensure_alive()?;
        // Drop the old set before allocating the new one
        self.targets = None;
        let textures = create_targets(self, targets)?;
        self.targets = Some(textures);
        if let Some(present) = self.surface.as_mut() {
            present.config.width = targets.width;
            present.config.height = targets.height;
            present.surface.configure(&self.device, &present.config);
        }
        log::info!(
            "[WgpuGpu::configure_targets] {}x{}, {} back buffers, {}x samples",
            targets.width,
            targets.height,
            targets.back_buffer_count,
            targets.sample_count
        );
        Ok(())
    }

    fn configure_particles(&mut self, capacity: u32) -> EngineResult<()> {
        self.ensure_alive()?;
        self.particles = Some(create_particle_buffers(self, capacity));
        Ok(())
    }

    fn submit(&mut self, frame: &FrameResource, lists: Vec<CommandList>) -> EngineResult<()> {
        self.ensure_alive()?;
        upload_constants(self, frame)?;

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Frame Encoder"),
        });
        encode_lists(self, &mut encoder, frame.slot, &lists)?;
        let index = self.queue.submit(std::iter::once(encoder.finish()));
        self.last_submission = Some(index);
        Ok(())
    }

    fn signal(&mut self, fence: &GpuFence, value: FenceValue) -> EngineResult<()> {
        watch_fence(&self.watch, fence);
        self.ensure_alive()?;

        let remote = fence.clone();
        self.queue.on_submitted_work_done(move || complete_fence(&remote, value));
        if let Some(index) = &self.last_submission {
            self.signaled.push((value, index.clone()));
        }
        Ok(())
    }

    fn pump(&mut self, _fence: &GpuFence, value: FenceValue) -> EngineResult<()> {
        self.ensure_alive()?;

        // Wait only for the submission the value was signaled behind
        let target = self
            .signaled
            .iter()
            .rev()
            .find(|(signaled, _)| *signaled <= value)
            .map(|(_, index)| index.clone());
        match target {
            Some(index) => {
                let _ = self.device.poll(wgpu::Maintain::WaitForSubmissionIndex(index));
            }
            None => {
                let _ = self.device.poll(wgpu::Maintain::Wait);
            }
        }
        self.signaled.retain(|(signaled, _)| *signaled > value);

        self.ensure_alive()
    }

    fn present(&mut self, back_buffer: u32) -> EngineResult<()> {
        self.ensure_alive()?;
        if self.surface.is_some() {
            present_to_surface(self, back_buffer)?;
        }
        self.presented += 1;
        log::debug!("[WgpuGpu::present] Back buffer {} (frame {})", back_buffer, self.presented);
        self.ensure_alive()
    }

    fn device_lost_reason(&self) -> Option<String> {
        lost_reason(&self.watch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_strides_align() {
        assert_eq!(align_to(144, 256), 256);
        assert_eq!(align_to(256, 256), 256);
        assert_eq!(align_to(448, 256), 512);
    }

    #[test]
    fn test_layout_kind_by_target() {
        use crate::render_graph::{pipeline_desc_for, PipelineKey};
        assert_eq!(layout_kind(&pipeline_desc_for(PipelineKey::GeometryOpaque, 1)), LayoutKind::Geometry);
        assert_eq!(layout_kind(&pipeline_desc_for(PipelineKey::LightVolumeSphere, 1)), LayoutKind::Lighting);
        assert_eq!(layout_kind(&pipeline_desc_for(PipelineKey::ParticleRender, 1)), LayoutKind::ParticleRender);
        assert_eq!(layout_kind(&pipeline_desc_for(PipelineKey::Ui, 1)), LayoutKind::Composite);
        assert_eq!(
            layout_kind(&pipeline_desc_for(PipelineKey::ParticleSimulate, 1)),
            LayoutKind::ParticleSimulate
        );
    }

    #[test]
    fn test_surface_format_prefers_exact_match() {
        use wgpu::TextureFormat;
        assert_eq!(
            pick_surface_format(&[TextureFormat::Bgra8Unorm, TextureFormat::Bgra8UnormSrgb]),
            Some(TextureFormat::Bgra8UnormSrgb)
        );
        assert_eq!(
            pick_surface_format(&[TextureFormat::Rgba8Unorm, TextureFormat::Bgra8Unorm]),
            Some(TextureFormat::Bgra8Unorm)
        );
        assert_eq!(pick_surface_format(&[TextureFormat::Rgba16Float]), None);
    }

    #[test]
    fn test_strided_layout_pads_elements() {
        let buffer = crate::frame::create_constant_buffer::<ObjectConstants>("object", 2);
        let bytes = strided_bytes(&buffer, 256);
        assert_eq!(bytes.len(), 512);
    }
}
