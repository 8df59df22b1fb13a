//! wgpu implementation of [`FogBackend`]: two compute kernels writing 3D
//! storage textures and a fullscreen composite pass.
//!
//! All stages of a frame are recorded into one command encoder between
//! [`FogBackend::begin_frame`] and [`FogBackend::end_frame`], so the queue
//! executes them in order and each pass sees the previous pass's writes.

use froxel_lighting::PointLightParams;
use glam::Vec4;
use wgpu::util::DeviceExt;

use crate::backend::{FogBackend, FogError, VolumeRole};
use crate::composite::{COMPOSITE_SHADER_SOURCE, CompositeUniforms};
use crate::cpu::ColorImage;
use crate::gpu::{GpuCapabilities, GpuContext, IMAGE_FORMAT, VOLUME_FORMAT};
use crate::inject::{INJECT_SHADER_SOURCE, INJECT_WORKGROUP, InjectUniforms, workgroup_count};
use crate::params::FrameParams;
use crate::scatter::{SCATTER_SHADER_SOURCE, SCATTER_WORKGROUP, ScatterUniforms};
use crate::volume::VolumeResolution;

/// Format of the optional linear scene depth attached to a source image.
pub const SCENE_DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::R32Float;

/// A froxel volume on the device.
pub struct GpuVolume {
    resolution: VolumeResolution,
    #[allow(dead_code)]
    texture: wgpu::Texture,
    view: wgpu::TextureView,
}

impl GpuVolume {
    pub fn resolution(&self) -> VolumeResolution {
        self.resolution
    }
}

/// Storage buffer holding [`PointLightParams`].
pub struct GpuLightBuffer {
    buffer: wgpu::Buffer,
    capacity: usize,
}

impl GpuLightBuffer {
    /// Number of lights the buffer can hold.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// A color image on the device with optional linear scene depth.
pub struct GpuImage {
    width: u32,
    height: u32,
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    depth: Option<(wgpu::Texture, wgpu::TextureView)>,
}

impl GpuImage {
    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn has_depth(&self) -> bool {
        self.depth.is_some()
    }
}

/// Runs the fog stages as wgpu compute and render passes.
pub struct WgpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    capabilities: GpuCapabilities,
    inject_bgl: wgpu::BindGroupLayout,
    inject_pipeline: wgpu::ComputePipeline,
    inject_uniforms: wgpu::Buffer,
    scatter_bgl: wgpu::BindGroupLayout,
    scatter_pipeline: wgpu::ComputePipeline,
    scatter_uniforms: wgpu::Buffer,
    composite_bgl: wgpu::BindGroupLayout,
    composite_pipeline: wgpu::RenderPipeline,
    composite_uniforms: wgpu::Buffer,
    blit_bgl: wgpu::BindGroupLayout,
    blit_pipeline: wgpu::RenderPipeline,
    sampler: wgpu::Sampler,
    // Bound when the source image carries no depth.
    #[allow(dead_code)]
    fallback_depth: wgpu::Texture,
    fallback_depth_view: wgpu::TextureView,
    encoder: Option<wgpu::CommandEncoder>,
}

impl WgpuBackend {
    /// Build every pipeline on `context`'s device.
    pub fn new(context: &GpuContext) -> Result<Self, FogError> {
        Self::from_device(
            context.device.clone(),
            context.queue.clone(),
            context.capabilities(),
        )
    }

    /// Build every pipeline on an existing device.
    ///
    /// Fails with [`FogError::UnsupportedPlatform`] before any pipeline is
    /// created if `capabilities` lacks something the passes need.
    pub fn from_device(
        device: wgpu::Device,
        queue: wgpu::Queue,
        capabilities: GpuCapabilities,
    ) -> Result<Self, FogError> {
        capabilities.check()?;

        let inject_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("fog-inject-shader"),
            source: wgpu::ShaderSource::Wgsl(INJECT_SHADER_SOURCE.into()),
        });
        let scatter_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("fog-scatter-shader"),
            source: wgpu::ShaderSource::Wgsl(SCATTER_SHADER_SOURCE.into()),
        });
        let composite_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("fog-composite-shader"),
            source: wgpu::ShaderSource::Wgsl(COMPOSITE_SHADER_SOURCE.into()),
        });

        let inject_bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("fog-inject-bgl"),
            entries: &[
                uniform_entry(0, wgpu::ShaderStages::COMPUTE),
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Storage { read_only: true },
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                storage_volume_entry(2),
            ],
        });

        let scatter_bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("fog-scatter-bgl"),
            entries: &[
                uniform_entry(0, wgpu::ShaderStages::COMPUTE),
                texture_entry(
                    1,
                    wgpu::ShaderStages::COMPUTE,
                    wgpu::TextureViewDimension::D3,
                    false,
                ),
                storage_volume_entry(2),
            ],
        });

        let composite_bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("fog-composite-bgl"),
            entries: &[
                uniform_entry(0, wgpu::ShaderStages::FRAGMENT),
                texture_entry(
                    1,
                    wgpu::ShaderStages::FRAGMENT,
                    wgpu::TextureViewDimension::D2,
                    false,
                ),
                texture_entry(
                    2,
                    wgpu::ShaderStages::FRAGMENT,
                    wgpu::TextureViewDimension::D2,
                    false,
                ),
                texture_entry(
                    3,
                    wgpu::ShaderStages::FRAGMENT,
                    wgpu::TextureViewDimension::D3,
                    true,
                ),
                wgpu::BindGroupLayoutEntry {
                    binding: 4,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let blit_bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("fog-blit-bgl"),
            entries: &[texture_entry(
                1,
                wgpu::ShaderStages::FRAGMENT,
                wgpu::TextureViewDimension::D2,
                false,
            )],
        });

        let inject_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("fog-inject-layout"),
            bind_group_layouts: &[&inject_bgl],
            immediate_size: 0,
        });
        let scatter_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("fog-scatter-layout"),
            bind_group_layouts: &[&scatter_bgl],
            immediate_size: 0,
        });
        let composite_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("fog-composite-layout"),
            bind_group_layouts: &[&composite_bgl],
            immediate_size: 0,
        });
        let blit_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("fog-blit-layout"),
            bind_group_layouts: &[&blit_bgl],
            immediate_size: 0,
        });

        let inject_pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("fog-inject"),
            layout: Some(&inject_layout),
            module: &inject_shader,
            entry_point: Some("inject_main"),
            compilation_options: wgpu::PipelineCompilationOptions::default(),
            cache: None,
        });
        let scatter_pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("fog-scatter"),
            layout: Some(&scatter_layout),
            module: &scatter_shader,
            entry_point: Some("scatter_main"),
            compilation_options: wgpu::PipelineCompilationOptions::default(),
            cache: None,
        });
        let composite_pipeline = create_fullscreen_pipeline(
            &device,
            &composite_shader,
            &composite_layout,
            "fs_composite",
            "fog-composite",
        );
        let blit_pipeline = create_fullscreen_pipeline(
            &device,
            &composite_shader,
            &blit_layout,
            "fs_blit",
            "fog-blit",
        );

        let inject_uniforms = create_uniform_buffer(
            &device,
            "fog-inject-uniforms",
            std::mem::size_of::<InjectUniforms>(),
        );
        let scatter_uniforms = create_uniform_buffer(
            &device,
            "fog-scatter-uniforms",
            std::mem::size_of::<ScatterUniforms>(),
        );
        let composite_uniforms = create_uniform_buffer(
            &device,
            "fog-composite-uniforms",
            std::mem::size_of::<CompositeUniforms>(),
        );

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("fog-scatter-sampler"),
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let fallback_depth = device.create_texture_with_data(
            &queue,
            &wgpu::TextureDescriptor {
                label: Some("fog-fallback-depth"),
                size: wgpu::Extent3d {
                    width: 1,
                    height: 1,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: SCENE_DEPTH_FORMAT,
                usage: wgpu::TextureUsages::TEXTURE_BINDING,
                view_formats: &[],
            },
            wgpu::util::TextureDataOrder::LayerMajor,
            bytemuck::cast_slice(&[1.0_f32]),
        );
        let fallback_depth_view =
            fallback_depth.create_view(&wgpu::TextureViewDescriptor::default());

        log::debug!("Fog pipelines created");

        Ok(Self {
            device,
            queue,
            capabilities,
            inject_bgl,
            inject_pipeline,
            inject_uniforms,
            scatter_bgl,
            scatter_pipeline,
            scatter_uniforms,
            composite_bgl,
            composite_pipeline,
            composite_uniforms,
            blit_bgl,
            blit_pipeline,
            sampler,
            fallback_depth,
            fallback_depth_view,
            encoder: None,
        })
    }

    pub fn capabilities(&self) -> &GpuCapabilities {
        &self.capabilities
    }

    /// Allocate an uninitialized image.
    pub fn create_image(&self, width: u32, height: u32) -> GpuImage {
        let texture =
            create_image_texture(&self.device, width, height, IMAGE_FORMAT, "fog-image");
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        GpuImage {
            width: width.max(1),
            height: height.max(1),
            texture,
            view,
            depth: None,
        }
    }

    /// Copy a host image (and its depth, if any) to the device.
    pub fn upload_image(&self, image: &ColorImage) -> GpuImage {
        let mut gpu = self.create_image(image.width(), image.height());
        let texels: Vec<f32> = image.pixels().iter().flat_map(|p| p.to_array()).collect();
        write_image_texture(&self.queue, &gpu.texture, &texels, 16);

        if image.has_depth() {
            let depth: Vec<f32> = (0..image.height())
                .flat_map(|y| (0..image.width()).map(move |x| (x, y)))
                .map(|(x, y)| image.depth_at(x, y).unwrap_or(1.0))
                .collect();
            let texture = create_image_texture(
                &self.device,
                image.width(),
                image.height(),
                SCENE_DEPTH_FORMAT,
                "fog-scene-depth",
            );
            write_image_texture(&self.queue, &texture, &depth, 4);
            let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
            gpu.depth = Some((texture, view));
        }
        gpu
    }

    /// Submit pending work and copy `image` back to host memory.
    pub fn read_image(&mut self, image: &GpuImage) -> Result<ColorImage, FogError> {
        self.end_frame();

        let bytes_per_pixel = 16u32;
        let unpadded = image.width * bytes_per_pixel;
        let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let padded = unpadded.div_ceil(align) * align;

        let readback = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("fog-image-readback"),
            size: u64::from(padded) * u64::from(image.height),
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("fog-readback-encoder"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &image.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &readback,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded),
                    rows_per_image: Some(image.height),
                },
            },
            wgpu::Extent3d {
                width: image.width,
                height: image.height,
                depth_or_array_layers: 1,
            },
        );
        self.queue.submit(Some(encoder.finish()));

        let slice = readback.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        let _ = self.device.poll(wgpu::PollType::Wait {
            submission_index: None,
            timeout: None,
        });
        match rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(FogError::Readback(e.to_string())),
            Err(e) => return Err(FogError::Readback(e.to_string())),
        }

        let mapped = slice.get_mapped_range();
        let mut pixels = Vec::with_capacity((image.width * image.height) as usize);
        for row in 0..image.height {
            let start = (row * padded) as usize;
            let end = start + unpadded as usize;
            pixels.extend(
                mapped[start..end]
                    .chunks_exact(bytes_per_pixel as usize)
                    .map(|texel| Vec4::from_array(bytemuck::pod_read_unaligned::<[f32; 4]>(texel))),
            );
        }
        drop(mapped);
        readback.unmap();

        let width = image.width;
        Ok(ColorImage::from_fn(image.width, image.height, |x, y| {
            pixels[(y * width + x) as usize]
        }))
    }

    fn encoder(&mut self) -> &mut wgpu::CommandEncoder {
        let device = &self.device;
        self.encoder.get_or_insert_with(|| {
            device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("fog-frame-encoder"),
            })
        })
    }

    fn run_fullscreen_pass(
        &mut self,
        pipeline: PassKind,
        bind_group: &wgpu::BindGroup,
        target: &wgpu::TextureView,
        label: &str,
    ) {
        let pipeline = match pipeline {
            PassKind::Composite => self.composite_pipeline.clone(),
            PassKind::Blit => self.blit_pipeline.clone(),
        };
        let encoder = self.encoder();
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some(label),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: target,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
            multiview_mask: None,
        });
        pass.set_pipeline(&pipeline);
        pass.set_bind_group(0, bind_group, &[]);
        pass.draw(0..3, 0..1);
    }
}

#[derive(Clone, Copy)]
enum PassKind {
    Composite,
    Blit,
}

impl FogBackend for WgpuBackend {
    type Volume = GpuVolume;
    type LightBuffer = GpuLightBuffer;
    type Image = GpuImage;

    fn check_support(&self, _resolution: VolumeResolution) -> Result<(), FogError> {
        self.capabilities.check()
    }

    fn begin_frame(&mut self) {
        self.encoder();
    }

    fn end_frame(&mut self) {
        if let Some(encoder) = self.encoder.take() {
            self.queue.submit(Some(encoder.finish()));
        }
    }

    fn create_volume(
        &mut self,
        resolution: VolumeResolution,
        role: VolumeRole,
    ) -> Result<GpuVolume, FogError> {
        self.capabilities.check_volume(resolution)?;
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(role.label()),
            size: wgpu::Extent3d {
                width: resolution.x,
                height: resolution.y,
                depth_or_array_layers: resolution.z,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D3,
            format: VOLUME_FORMAT,
            usage: wgpu::TextureUsages::STORAGE_BINDING | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        log::debug!(
            "Created {} ({}x{}x{})",
            role.label(),
            resolution.x,
            resolution.y,
            resolution.z
        );
        Ok(GpuVolume {
            resolution,
            texture,
            view,
        })
    }

    fn create_light_buffer(&mut self, light_count: usize) -> Result<GpuLightBuffer, FogError> {
        // Storage bindings cannot be empty.
        let capacity = light_count.max(1);
        let size = (capacity * std::mem::size_of::<PointLightParams>()) as u64;
        self.capabilities.check_storage_buffer(size)?;
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("fog-light-buffer"),
            size,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        Ok(GpuLightBuffer { buffer, capacity })
    }

    fn upload_lights(&mut self, buffer: &mut GpuLightBuffer, lights: &[PointLightParams]) {
        if lights.len() > buffer.capacity {
            log::warn!(
                "light buffer holds {} lights, dropping {}",
                buffer.capacity,
                lights.len() - buffer.capacity
            );
        }
        let lights = &lights[..lights.len().min(buffer.capacity)];
        if !lights.is_empty() {
            self.queue
                .write_buffer(&buffer.buffer, 0, bytemuck::cast_slice(lights));
        }
    }

    fn dispatch_inject(
        &mut self,
        frame: &FrameParams,
        lights: &GpuLightBuffer,
        light_count: usize,
        injection: &mut GpuVolume,
    ) {
        let uniforms = InjectUniforms::new(frame, light_count.min(lights.capacity));
        self.queue
            .write_buffer(&self.inject_uniforms, 0, bytemuck::bytes_of(&uniforms));
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("fog-inject-bg"),
            layout: &self.inject_bgl,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: self.inject_uniforms.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: lights.buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(&injection.view),
                },
            ],
        });
        let res = injection.resolution;
        let [gx, gy, gz] = workgroup_count([res.x, res.y, res.z], INJECT_WORKGROUP);
        let pipeline = self.inject_pipeline.clone();
        let mut pass = self
            .encoder()
            .begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("fog-inject-pass"),
                timestamp_writes: None,
            });
        pass.set_pipeline(&pipeline);
        pass.set_bind_group(0, &bind_group, &[]);
        pass.dispatch_workgroups(gx, gy, gz);
    }

    fn dispatch_scatter(
        &mut self,
        frame: &FrameParams,
        injection: &GpuVolume,
        scatter: &mut GpuVolume,
    ) {
        let uniforms = ScatterUniforms::new(frame);
        self.queue
            .write_buffer(&self.scatter_uniforms, 0, bytemuck::bytes_of(&uniforms));
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("fog-scatter-bg"),
            layout: &self.scatter_bgl,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: self.scatter_uniforms.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&injection.view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(&scatter.view),
                },
            ],
        });
        let res = scatter.resolution;
        let [gx, gy, _] = workgroup_count([res.x, res.y, 1], SCATTER_WORKGROUP);
        let pipeline = self.scatter_pipeline.clone();
        let mut pass = self
            .encoder()
            .begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("fog-scatter-pass"),
                timestamp_writes: None,
            });
        pass.set_pipeline(&pipeline);
        pass.set_bind_group(0, &bind_group, &[]);
        pass.dispatch_workgroups(gx, gy, 1);
    }

    fn composite(
        &mut self,
        frame: &FrameParams,
        scatter: &GpuVolume,
        source: &GpuImage,
        destination: &mut GpuImage,
    ) {
        if (source.width, source.height) != (destination.width, destination.height) {
            log::warn!(
                "composite source {}x{} and destination {}x{} differ",
                source.width,
                source.height,
                destination.width,
                destination.height
            );
        }
        let uniforms = CompositeUniforms::new(frame, source.has_depth());
        self.queue
            .write_buffer(&self.composite_uniforms, 0, bytemuck::bytes_of(&uniforms));
        let depth_view = source
            .depth
            .as_ref()
            .map_or(&self.fallback_depth_view, |(_, view)| view);
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("fog-composite-bg"),
            layout: &self.composite_bgl,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: self.composite_uniforms.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&source.view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(depth_view),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::TextureView(&scatter.view),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
            ],
        });
        self.run_fullscreen_pass(
            PassKind::Composite,
            &bind_group,
            &destination.view,
            "fog-composite-pass",
        );
    }

    fn blit(&mut self, source: &GpuImage, destination: &mut GpuImage) {
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("fog-blit-bg"),
            layout: &self.blit_bgl,
            entries: &[wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::TextureView(&source.view),
            }],
        });
        self.run_fullscreen_pass(PassKind::Blit, &bind_group, &destination.view, "fog-blit-pass");
    }
}

fn uniform_entry(binding: u32, visibility: wgpu::ShaderStages) -> wgpu::BindGroupLayoutEntry {
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

fn texture_entry(
    binding: u32,
    visibility: wgpu::ShaderStages,
    view_dimension: wgpu::TextureViewDimension,
    filterable: bool,
) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Float { filterable },
            view_dimension,
            multisampled: false,
        },
        count: None,
    }
}

fn storage_volume_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::StorageTexture {
            access: wgpu::StorageTextureAccess::WriteOnly,
            format: VOLUME_FORMAT,
            view_dimension: wgpu::TextureViewDimension::D3,
        },
        count: None,
    }
}

fn create_uniform_buffer(device: &wgpu::Device, label: &str, size: usize) -> wgpu::Buffer {
    device.create_buffer(&wgpu::BufferDescriptor {
        label: Some(label),
        size: size as u64,
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    })
}

/// Create a fullscreen render pipeline with the given fragment entry point.
fn create_fullscreen_pipeline(
    device: &wgpu::Device,
    shader: &wgpu::ShaderModule,
    layout: &wgpu::PipelineLayout,
    fragment_entry: &str,
    label: &str,
) -> wgpu::RenderPipeline {
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(label),
        layout: Some(layout),
        vertex: wgpu::VertexState {
            module: shader,
            entry_point: Some("vs_fullscreen"),
            buffers: &[],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        },
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            ..Default::default()
        },
        depth_stencil: None,
        multisample: wgpu::MultisampleState::default(),
        fragment: Some(wgpu::FragmentState {
            module: shader,
            entry_point: Some(fragment_entry),
            targets: &[Some(wgpu::ColorTargetState {
                format: IMAGE_FORMAT,
                blend: None,
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        }),
        multiview_mask: None,
        cache: None,
    })
}

fn create_image_texture(
    device: &wgpu::Device,
    width: u32,
    height: u32,
    format: wgpu::TextureFormat,
    label: &str,
) -> wgpu::Texture {
    device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size: wgpu::Extent3d {
            width: width.max(1),
            height: height.max(1),
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format,
        usage: wgpu::TextureUsages::TEXTURE_BINDING
            | wgpu::TextureUsages::RENDER_ATTACHMENT
            | wgpu::TextureUsages::COPY_SRC
            | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    })
}

fn write_image_texture(
    queue: &wgpu::Queue,
    texture: &wgpu::Texture,
    data: &[f32],
    bytes_per_pixel: u32,
) {
    let size = texture.size();
    if data.len() < (size.width * size.height) as usize {
        return;
    }
    queue.write_texture(
        wgpu::TexelCopyTextureInfo {
            texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        bytemuck::cast_slice(data),
        wgpu::TexelCopyBufferLayout {
            offset: 0,
            bytes_per_row: Some(size.width * bytes_per_pixel),
            rows_per_image: Some(size.height),
        },
        size,
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::Camera;
    use crate::params::{FogParameters, FogSettings};
    use crate::volume::VolumeGrid;
    use glam::Vec3;

    fn create_test_backend() -> Option<WgpuBackend> {
        // Returns None on headless CI.
        let context = crate::gpu::init_headless_blocking().ok()?;
        WgpuBackend::new(&context).ok()
    }

    fn reference_frame(
        backend: &mut WgpuBackend,
        settings: &FogSettings,
        image: &ColorImage,
    ) -> (ColorImage, ColorImage) {
        let res = VolumeResolution::new(16, 8, 32).unwrap();
        let camera = Camera::looking_at(Vec3::new(0.0, 0.0, -5.0), Vec3::ZERO, Vec3::Y);
        let frame = FrameParams::new(settings, &camera, res);
        let lights = [PointLightParams::from_light(
            &froxel_lighting::LightSource::point(Vec3::ZERO, 10.0),
        )];
        let (width, height) = (image.width(), image.height());

        let mut cpu = crate::cpu::CpuBackend::new();
        let mut cpu_grid = VolumeGrid::new();
        let cpu_out = {
            let pair = cpu_grid.ensure_allocated(&mut cpu, res).unwrap();
            let mut buffer = cpu.create_light_buffer(1).unwrap();
            cpu.upload_lights(&mut buffer, &lights);
            cpu.dispatch_inject(&frame, &buffer, 1, &mut pair.injection);
            cpu.dispatch_scatter(&frame, &pair.injection, &mut pair.scatter);
            let mut out = ColorImage::new(width, height);
            cpu.composite(&frame, &pair.scatter, image, &mut out);
            out
        };

        let mut gpu_grid = VolumeGrid::new();
        let pair = gpu_grid.ensure_allocated(backend, res).unwrap();
        let mut buffer = backend.create_light_buffer(1).unwrap();
        backend.upload_lights(&mut buffer, &lights);
        let source = backend.upload_image(image);
        let mut destination = backend.create_image(width, height);
        backend.begin_frame();
        backend.dispatch_inject(&frame, &buffer, 1, &mut pair.injection);
        backend.dispatch_scatter(&frame, &pair.injection, &mut pair.scatter);
        backend.composite(&frame, &pair.scatter, &source, &mut destination);
        backend.end_frame();
        (backend.read_image(&destination).unwrap(), cpu_out)
    }

    fn assert_close(gpu: &ColorImage, cpu: &ColorImage, tolerance: f32) {
        for (a, b) in gpu.pixels().iter().zip(cpu.pixels()) {
            assert!((*a - *b).abs().max_element() < tolerance, "gpu {a} vs cpu {b}");
        }
    }

    #[test]
    fn test_missing_capability_fails_before_pipelines() {
        let Ok(context) = crate::gpu::init_headless_blocking() else {
            return;
        };
        let capabilities = GpuCapabilities {
            renderable_image_format: false,
            ..context.capabilities()
        };
        let result = WgpuBackend::from_device(
            context.device.clone(),
            context.queue.clone(),
            capabilities,
        );
        assert!(matches!(result, Err(FogError::UnsupportedPlatform(_))));
    }

    #[test]
    fn test_image_round_trip() {
        let Some(mut backend) = create_test_backend() else {
            return;
        };
        let image = ColorImage::from_fn(70, 3, |x, y| Vec4::new(x as f32, y as f32, 0.5, 1.0));
        let gpu = backend.upload_image(&image);
        let back = backend.read_image(&gpu).unwrap();
        assert_eq!(back, image);
    }

    #[test]
    fn test_blit_is_exact() {
        let Some(mut backend) = create_test_backend() else {
            return;
        };
        let image = ColorImage::from_fn(8, 5, |x, y| Vec4::new(x as f32 * 0.1, y as f32, 2.0, 0.5));
        let source = backend.upload_image(&image);
        let mut destination = backend.create_image(8, 5);
        backend.begin_frame();
        backend.blit(&source, &mut destination);
        backend.end_frame();
        assert_eq!(backend.read_image(&destination).unwrap(), image);
    }

    #[test]
    fn test_gpu_matches_cpu_reference() {
        let Some(mut backend) = create_test_backend() else {
            return;
        };
        let settings = FogSettings {
            far_clip: 20.0,
            fog: FogParameters {
                constant_density: 0.3,
                ..FogParameters::default()
            },
            ..FogSettings::default()
        };
        let image = ColorImage::filled(32, 16, Vec4::new(0.2, 0.4, 0.6, 1.0));
        let (gpu_out, cpu_out) = reference_frame(&mut backend, &settings, &image);
        // Half-float volumes bound the agreement.
        assert_close(&gpu_out, &cpu_out, 2e-2);
    }

    #[test]
    fn test_gpu_matches_cpu_with_height_fog_and_depth() {
        let Some(mut backend) = create_test_backend() else {
            return;
        };
        let settings = FogSettings {
            near_clip: 1.0,
            far_clip: 20.0,
            fog: FogParameters {
                constant_density: 0.05,
                height_fog_amount: 1.0,
                height_fog_exponent: 0.5,
                height_fog_offset: 0.5,
                ..FogParameters::default()
            },
            ..FogSettings::default()
        };
        let image = ColorImage::from_fn(32, 16, |x, y| {
            Vec4::new(x as f32 / 32.0, y as f32 / 16.0, 0.5, 1.0)
        })
        .with_depth(|x, y| 0.02 + 0.1 * ((x + y) % 8) as f32);
        let (gpu_out, cpu_out) = reference_frame(&mut backend, &settings, &image);
        assert_close(&gpu_out, &cpu_out, 3e-2);
    }
}
