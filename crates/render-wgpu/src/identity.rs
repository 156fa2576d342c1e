use crate::alloc::scoped;
use crate::frame::FrameEncoder;
use crate::shaders;
use pingpong_common::{Parity, SlotId, SlotLayout, WorkgroupSize};
use pingpong_kernel::{Backend, BackendError};
use std::sync::Arc;
use wgpu::util::DeviceExt;

/// A slot of `u32` items.
pub struct IdentitySlot {
    id: SlotId,
    buffer: wgpu::Buffer,
}

impl IdentitySlot {
    pub fn id(&self) -> SlotId {
        self.id
    }

    pub fn buffer(&self) -> &wgpu::Buffer {
        &self.buffer
    }
}

/// Headless program whose compute pass copies input to output unchanged.
///
/// Its "draw" copies the render slot into a presentation buffer, so a readback
/// shows exactly what the frame's render pass would have consumed.
pub struct IdentityProgram {
    device: Arc<wgpu::Device>,
    workgroup: WorkgroupSize,
    compute_layout: wgpu::BindGroupLayout,
    pipeline: wgpu::ComputePipeline,
    presented: wgpu::Buffer,
}

impl IdentityProgram {
    pub fn new(
        device: Arc<wgpu::Device>,
        layout: &SlotLayout,
        workgroup: WorkgroupSize,
    ) -> Result<Self, BackendError> {
        if layout.item_stride() != 4 {
            return Err(BackendError::Validation {
                label: "identity_program".into(),
                message: format!("items must be 4 bytes, got {}", layout.item_stride()),
            });
        }

        let presented = scoped(&device, "identity_presented", || {
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("identity_presented"),
                size: layout.byte_size(),
                usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::COPY_SRC,
                mapped_at_creation: false,
            })
        })?;

        let entry = |binding: u32, read_only: bool| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Storage { read_only },
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        };
        let compute_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("identity_compute_layout"),
            entries: &[entry(0, true), entry(1, false)],
        });

        let pipeline = scoped(&device, "identity_pipeline", || {
            let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some("identity_shader"),
                source: wgpu::ShaderSource::Wgsl(
                    shaders::with_workgroup(shaders::IDENTITY_COMPUTE, workgroup).into(),
                ),
            });
            let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("identity_pipeline_layout"),
                bind_group_layouts: &[&compute_layout],
                push_constant_ranges: &[],
            });
            device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some("identity_pipeline"),
                layout: Some(&pipeline_layout),
                module: &module,
                entry_point: Some("cs_main"),
                compilation_options: Default::default(),
                cache: None,
            })
        })?;

        Ok(Self {
            device,
            workgroup,
            compute_layout,
            pipeline,
            presented,
        })
    }

    /// Buffer holding what the most recent draw read.
    pub fn presented(&self) -> &wgpu::Buffer {
        &self.presented
    }
}

impl Backend for IdentityProgram {
    type Slot = IdentitySlot;
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
    ) -> Result<IdentitySlot, BackendError> {
        let label = format!("identity_items_{id}");
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
        Ok(IdentitySlot { id, buffer })
    }

    fn create_binding_set(
        &mut self,
        parity: Parity,
        input: &IdentitySlot,
        output: &IdentitySlot,
    ) -> Result<wgpu::BindGroup, BackendError> {
        let label = format!("identity_bind_group_{parity}");
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
                ],
            })
        })
    }

    fn encode_dispatch(&mut self, encoder: &mut FrameEncoder, set: &wgpu::BindGroup, groups: u32) {
        let mut pass = encoder
            .encoder()
            .begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("identity_pass"),
                timestamp_writes: None,
            });
        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, set, &[]);
        pass.dispatch_workgroups(groups, 1, 1);
    }

    fn encode_draw(&mut self, encoder: &mut FrameEncoder, slot: &IdentitySlot, _instances: u32) {
        encoder
            .encoder()
            .copy_buffer_to_buffer(&slot.buffer, 0, &self.presented, 0, self.presented.size());
    }

    fn release_slot(&mut self, _id: SlotId, slot: IdentitySlot) {
        slot.buffer.destroy();
    }

    fn release_binding_set(&mut self, _parity: Parity, set: wgpu::BindGroup) {
        drop(set);
    }
}

