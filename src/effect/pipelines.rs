//! Process-lifetime compute/render pipeline cache.
//!
//! The dust effect needs exactly two pipeline objects: the particle-update
//! compute pipeline and the instanced sprite render pipeline. Both are built
//! on first use and cached for the process lifetime via a compute-if-absent
//! accessor. A failed build (shader validation error, unsupported device) is
//! cached as absent: the effect is unavailable for the rest of the process,
//! items are still tracked, and nothing crashes or retries.

use std::sync::OnceLock;

/// Format of the layer's offscreen render target.
///
/// Non-sRGB to match the item textures: the effect samples source pixels
/// verbatim and the host composites the premultiplied result.
pub const DUST_TARGET_FORMAT: wgpu::TextureFormat =
    wgpu::TextureFormat::Rgba8Unorm;

/// The compiled dust pipelines and their bind group layouts.
pub struct DustPipelines {
    /// Particle-update compute pipeline.
    pub update: wgpu::ComputePipeline,
    /// Instanced point-sprite render pipeline.
    pub render: wgpu::RenderPipeline,
    /// Layout for the compute bind group (particles + params).
    pub update_layout: wgpu::BindGroupLayout,
    /// Layout for the render bind group (params + particles + texture +
    /// sampler).
    pub render_layout: wgpu::BindGroupLayout,
    /// Shared clamp-to-edge linear sampler for item textures.
    pub sampler: wgpu::Sampler,
}

/// The process-wide dust pipelines, built on first use.
///
/// The cache is bound to the first device it sees; the effect targets a
/// single rendering device per process. Returns `None` permanently if the
/// build fails.
pub fn dust_pipelines(device: &wgpu::Device) -> Option<&'static DustPipelines> {
    static PIPELINES: OnceLock<Option<DustPipelines>> = OnceLock::new();
    PIPELINES.get_or_init(|| build(device)).as_ref()
}

/// Storage-buffer bind group layout entry.
fn storage_buffer(
    binding: u32,
    visibility: wgpu::ShaderStages,
    read_only: bool,
) -> wgpu::BindGroupLayoutEntry {
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

/// Uniform-buffer bind group layout entry.
fn uniform_buffer(
    binding: u32,
    visibility: wgpu::ShaderStages,
) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn build(device: &wgpu::Device) -> Option<DustPipelines> {
    // Any validation error inside the scope surfaces as "effect
    // unavailable" rather than an uncaptured-error panic.
    device.push_error_scope(wgpu::ErrorFilter::Validation);

    let update_shader =
        device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Dust Update Shader"),
            source: wgpu::ShaderSource::Wgsl(
                include_str!("../../assets/shaders/dust_update.wgsl").into(),
            ),
        });
    let render_shader =
        device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Dust Render Shader"),
            source: wgpu::ShaderSource::Wgsl(
                include_str!("../../assets/shaders/dust_render.wgsl").into(),
            ),
        });

    let update_layout =
        device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Dust Update Bind Group Layout"),
            entries: &[
                storage_buffer(0, wgpu::ShaderStages::COMPUTE, false),
                uniform_buffer(1, wgpu::ShaderStages::COMPUTE),
            ],
        });
    let update_pipeline_layout =
        device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Dust Update Pipeline Layout"),
            bind_group_layouts: &[&update_layout],
            push_constant_ranges: &[],
        });
    let update =
        device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("Dust Update Pipeline"),
            layout: Some(&update_pipeline_layout),
            module: &update_shader,
            entry_point: Some("main"),
            compilation_options: Default::default(),
            cache: None,
        });

    let render_layout =
        device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Dust Render Bind Group Layout"),
            entries: &[
                uniform_buffer(0, wgpu::ShaderStages::VERTEX),
                storage_buffer(1, wgpu::ShaderStages::VERTEX, true),
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float {
                            filterable: true,
                        },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 3,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(
                        wgpu::SamplerBindingType::Filtering,
                    ),
                    count: None,
                },
            ],
        });
    let render_pipeline_layout =
        device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Dust Render Pipeline Layout"),
            bind_group_layouts: &[&render_layout],
            push_constant_ranges: &[],
        });

    // Additive-then-alpha: source added on top, destination attenuated by
    // inverse source alpha. Avoids darkening halos while sprites disperse.
    let blend = wgpu::BlendState {
        color: wgpu::BlendComponent {
            src_factor: wgpu::BlendFactor::One,
            dst_factor: wgpu::BlendFactor::OneMinusSrcAlpha,
            operation: wgpu::BlendOperation::Add,
        },
        alpha: wgpu::BlendComponent {
            src_factor: wgpu::BlendFactor::One,
            dst_factor: wgpu::BlendFactor::One,
            operation: wgpu::BlendOperation::Add,
        },
    };

    let render =
        device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Dust Render Pipeline"),
            layout: Some(&render_pipeline_layout),
            vertex: wgpu::VertexState {
                module: &render_shader,
                entry_point: Some("vs_main"),
                buffers: &[],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &render_shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: DUST_TARGET_FORMAT,
                    blend: Some(blend),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState::default(),
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

    let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
        label: Some("Dust Item Sampler"),
        address_mode_u: wgpu::AddressMode::ClampToEdge,
        address_mode_v: wgpu::AddressMode::ClampToEdge,
        mag_filter: wgpu::FilterMode::Linear,
        min_filter: wgpu::FilterMode::Linear,
        ..Default::default()
    });

    if let Some(error) = pollster::block_on(device.pop_error_scope()) {
        log::error!("dust pipelines unavailable: {error}");
        return None;
    }

    Some(DustPipelines {
        update,
        render,
        update_layout,
        render_layout,
        sampler,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::test_support::shared_device;

    #[test]
    fn test_pipelines_build_once_and_are_cached() {
        let Some((device, _)) = shared_device() else {
            return;
        };
        let first = dust_pipelines(device);
        let second = dust_pipelines(device);
        assert!(first.is_some());
        // Compute-if-absent: both calls observe the same static build.
        if let (Some(a), Some(b)) = (first, second) {
            assert!(std::ptr::eq(a, b));
        }
    }
}
