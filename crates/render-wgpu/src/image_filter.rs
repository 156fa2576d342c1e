use crate::alloc::scoped;
use crate::frame::FrameEncoder;
use crate::shaders;
use bytemuck::{Pod, Zeroable};
use pingpong_common::{ImageFilter, LayoutError, Parity, SlotId, SlotLayout, WorkgroupSize};
use pingpong_kernel::{Backend, BackendError};
use std::sync::Arc;
use wgpu::util::DeviceExt;

/// 3x3 convolution applied by one filter pipeline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterKernel {
    pub weights: [f32; 9],
    pub denom: f32,
    pub offset: f32,
    /// Convolve the channel average and write gray instead of per-channel color.
    pub grayscale: bool,
}

impl FilterKernel {
    pub fn for_filter(filter: ImageFilter) -> Self {
        match filter {
            ImageFilter::Blur => Self {
                weights: [1.0, 2.0, 1.0, 2.0, 4.0, 2.0, 1.0, 2.0, 1.0],
                denom: 16.0,
                offset: 0.0,
                grayscale: false,
            },
            ImageFilter::Emboss => Self {
                weights: [-1.0, 0.0, 0.0, 0.0, -1.0, 0.0, 0.0, 0.0, 2.0],
                denom: 1.0,
                offset: 0.5,
                grayscale: true,
            },
            ImageFilter::EdgeDetect => Self {
                weights: [-1.0, -1.0, -1.0, -1.0, 8.0, -1.0, -1.0, -1.0, -1.0],
                denom: 0.1,
                offset: 0.0,
                grayscale: true,
            },
            ImageFilter::Sharpen => Self {
                weights: [-1.0, -1.0, -1.0, -1.0, 9.0, -1.0, -1.0, -1.0, -1.0],
                denom: 1.0,
                offset: 0.0,
                grayscale: false,
            },
        }
    }

    /// Compute shader source for this kernel.
    pub fn shader_source(&self, workgroup: WorkgroupSize) -> String {
        let weights = self
            .weights
            .iter()
            .map(|w| format!("{w:?}"))
            .collect::<Vec<_>>()
            .join(", ");
        shaders::with_workgroup(shaders::IMAGE_FILTER_COMPUTE, workgroup)
            .replace("{{KERNEL}}", &weights)
            .replace("{{DENOM}}", &format!("{:?}", self.denom))
            .replace("{{OFFSET}}", &format!("{:?}", self.offset))
            .replace("{{GRAYSCALE}}", if self.grayscale { "true" } else { "false" })
    }
}

/// Pack an RGBA8 color the way `unpack4x8unorm` reads it: red in the low byte.
pub fn pack_rgba(r: u8, g: u8, b: u8, a: u8) -> u32 {
    u32::from_le_bytes([r, g, b, a])
}

/// Procedural source image: colored checkerboard with a diagonal gradient.
pub fn checkerboard(width: u32, height: u32, tile: u32) -> Vec<u32> {
    let tile = tile.max(1);
    (0..height)
        .flat_map(|y| (0..width).map(move |x| (x, y)))
        .map(|(x, y)| {
            let shade = ((x + y) * 255 / (width + height).max(1)) as u8;
            if ((x / tile) + (y / tile)) % 2 == 0 {
                pack_rgba(230, shade, 40, 255)
            } else {
                pack_rgba(30, 60, 255 - shade, 255)
            }
        })
        .collect()
}

#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
struct Params {
    width: u32,
    height: u32,
    _pad: [u32; 2],
}

/// One slot of packed pixels plus the render bind group that displays it.
pub struct ImageSlot {
    id: SlotId,
    buffer: wgpu::Buffer,
    render_group: wgpu::BindGroup,
}

impl ImageSlot {
    pub fn id(&self) -> SlotId {
        self.id
    }

    pub fn buffer(&self) -> &wgpu::Buffer {
        &self.buffer
    }
}

/// The image-filter demo as an orchestrator backend.
///
/// Every computing frame filters the previous result again, so effects
/// accumulate: blur keeps softening and edge detection saturates within a few
/// frames. The untouched source stays on the left half for comparison. All
/// filter pipelines share one bind group layout, so switching filters never
/// touches the binding sets.
pub struct ImageFilterProgram {
    device: Arc<wgpu::Device>,
    width: u32,
    height: u32,
    filter: ImageFilter,
    workgroup: WorkgroupSize,
    compute_layout: wgpu::BindGroupLayout,
    pipelines: Vec<wgpu::ComputePipeline>,
    render_layout: wgpu::BindGroupLayout,
    render_pipeline: wgpu::RenderPipeline,
    params: wgpu::Buffer,
    source: wgpu::Buffer,
}

impl ImageFilterProgram {
    /// `source` is the untouched image shown on the left half of the screen.
    pub fn new(
        device: Arc<wgpu::Device>,
        width: u32,
        height: u32,
        source: &[u32],
        filter: ImageFilter,
        workgroup: WorkgroupSize,
        surface_format: wgpu::TextureFormat,
    ) -> Result<Self, BackendError> {
        let pixels = SlotLayout::grid(width, height, 4).map_err(|e| BackendError::Validation {
            label: "image_source".into(),
            message: e.to_string(),
        })?;
        if source.len() as u64 != pixels.item_count() as u64 {
            return Err(BackendError::Validation {
                label: "image_source".into(),
                message: format!("{} pixels for a {width}x{height} image", source.len()),
            });
        }

        let source = scoped(&device, "image_source", || {
            device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("image_source"),
                contents: bytemuck::cast_slice(source),
                usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
            })
        })?;
        let params = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("image_params"),
            contents: bytemuck::bytes_of(&Params {
                width,
                height,
                _pad: [0; 2],
            }),
            usage: wgpu::BufferUsages::UNIFORM,
        });

        let compute_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("image_compute_layout"),
            entries: &[
                storage_entry(0, wgpu::ShaderStages::COMPUTE, true),
                storage_entry(1, wgpu::ShaderStages::COMPUTE, false),
                uniform_entry(2, wgpu::ShaderStages::COMPUTE),
            ],
        });
        let compute_pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("image_compute_pipeline_layout"),
            bind_group_layouts: &[&compute_layout],
            push_constant_ranges: &[],
        });

        let mut pipelines = Vec::with_capacity(ImageFilter::ALL.len());
        for f in ImageFilter::ALL {
            let label = format!("image_{}_pipeline", f.name());
            let kernel = FilterKernel::for_filter(f);
            let pipeline = scoped(&device, &label, || {
                let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
                    label: Some(&label),
                    source: wgpu::ShaderSource::Wgsl(kernel.shader_source(workgroup).into()),
                });
                device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                    label: Some(&label),
                    layout: Some(&compute_pipeline_layout),
                    module: &module,
                    entry_point: Some("cs_main"),
                    compilation_options: Default::default(),
                    cache: None,
                })
            })?;
            pipelines.push(pipeline);
        }

        let render_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("image_render_layout"),
            entries: &[
                storage_entry(0, wgpu::ShaderStages::FRAGMENT, true),
                storage_entry(1, wgpu::ShaderStages::FRAGMENT, true),
                uniform_entry(2, wgpu::ShaderStages::FRAGMENT),
            ],
        });
        let render_pipeline = scoped(&device, "image_render_pipeline", || {
            let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some("image_render_shader"),
                source: wgpu::ShaderSource::Wgsl(shaders::IMAGE_RENDER.into()),
            });
            let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("image_render_pipeline_layout"),
                bind_group_layouts: &[&render_layout],
                push_constant_ranges: &[],
            });
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("image_render_pipeline"),
                layout: Some(&layout),
                vertex: wgpu::VertexState {
                    module: &module,
                    entry_point: Some("vs_main"),
                    compilation_options: Default::default(),
                    buffers: &[],
                },
                fragment: Some(wgpu::FragmentState {
                    module: &module,
                    entry_point: Some("fs_main"),
                    compilation_options: Default::default(),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: surface_format,
                        blend: Some(wgpu::BlendState::REPLACE),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                }),
                primitive: Default::default(),
                depth_stencil: None,
                multisample: Default::default(),
                multiview: None,
                cache: None,
            })
        })?;

        tracing::info!(width, height, filter = filter.name(), "image filter program ready");

        Ok(Self {
            device,
            width,
            height,
            filter,
            workgroup,
            compute_layout,
            pipelines,
            render_layout,
            render_pipeline,
            params,
            source,
        })
    }

    pub fn layout(&self) -> Result<SlotLayout, LayoutError> {
        SlotLayout::grid(self.width, self.height, 4)
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn filter(&self) -> ImageFilter {
        self.filter
    }

    /// Select the pipeline used by later dispatches.
    pub fn set_filter(&mut self, filter: ImageFilter) {
        if filter != self.filter {
            tracing::info!(from = self.filter.name(), to = filter.name(), "filter changed");
            self.filter = filter;
        }
    }
}

impl Backend for ImageFilterProgram {
    type Slot = ImageSlot;
    type BindingSet = wgpu::BindGroup;
    type Encoder = FrameEncoder;

    fn workgroup(&self) -> WorkgroupSize {
        self.workgroup
    }

    fn create_slot(
        &mut self,
        id: SlotId,
        layout: &SlotLayout,
        contents: Option<&[u8]>,
    ) -> Result<ImageSlot, BackendError> {
        let label = format!("image_pixels_{id}");
        // The shader indexes pixels as y * width + x.
        if layout.item_count() as u64 != self.width as u64 * self.height as u64 {
            return Err(BackendError::Validation {
                label,
                message: format!(
                    "{} items in a slot for a {}x{} image",
                    layout.item_count(),
                    self.width,
                    self.height
                ),
            });
        }
        let usage = wgpu::BufferUsages::STORAGE
            | wgpu::BufferUsages::COPY_SRC
            | wgpu::BufferUsages::COPY_DST;
        let buffer = scoped(&self.device, &label, || match contents {
            Some(bytes) => self
                .device
                .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some(&label),
                    contents: bytes,
                    usage,
                }),
            None => self.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(&label),
                size: layout.byte_size(),
                usage,
                mapped_at_creation: false,
            }),
        })?;
        let group_label = format!("image_render_bind_group_{id}");
        let render_group = scoped(&self.device, &group_label, || {
            self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(&group_label),
                layout: &self.render_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: self.source.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: buffer.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: self.params.as_entire_binding(),
                    },
                ],
            })
        });
        match render_group {
            Ok(render_group) => Ok(ImageSlot {
                id,
                buffer,
                render_group,
            }),
            Err(e) => {
                buffer.destroy();
                Err(e)
            }
        }
    }

    fn create_binding_set(
        &mut self,
        parity: Parity,
        input: &ImageSlot,
        output: &ImageSlot,
    ) -> Result<wgpu::BindGroup, BackendError> {
        let label = format!("image_compute_bind_group_{parity}");
        scoped(&self.device, &label, || {
            self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(&label),
                layout: &self.compute_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: input.buffer.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: output.buffer.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: self.params.as_entire_binding(),
                    },
                ],
            })
        })
    }

    fn encode_dispatch(&mut self, encoder: &mut FrameEncoder, set: &wgpu::BindGroup, groups: u32) {
        let mut pass = encoder
            .encoder()
            .begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("image_filter_pass"),
                timestamp_writes: None,
            });
        pass.set_pipeline(&self.pipelines[self.filter.index()]);
        pass.set_bind_group(0, set, &[]);
        pass.dispatch_workgroups(groups, 1, 1);
    }

    fn encode_draw(&mut self, encoder: &mut FrameEncoder, slot: &ImageSlot, _instances: u32) {
        let (encoder, target) = encoder.parts_mut();
        let Some(view) = target else {
            tracing::warn!("image draw skipped: frame has no render target");
            return;
        };
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("image_render_pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                    store: wgpu::StoreOp::Store,
                },
            })],
            ..Default::default()
        });
        pass.set_pipeline(&self.render_pipeline);
        pass.set_bind_group(0, &slot.render_group, &[]);
        pass.draw(0..3, 0..1);
    }

    fn release_slot(&mut self, id: SlotId, slot: ImageSlot) {
        tracing::debug!(%id, "image slot released");
        drop(slot.render_group);
        slot.buffer.destroy();
    }

    fn release_binding_set(&mut self, parity: Parity, set: wgpu::BindGroup) {
        tracing::debug!(%parity, "image binding set released");
        drop(set);
    }
}

fn storage_entry(binding: u32, visibility: wgpu::ShaderStages, read_only: bool) -> wgpu::BindGroupLayoutEntry {
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
