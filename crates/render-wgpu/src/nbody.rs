use crate::alloc::scoped;
use crate::frame::FrameEncoder;
use crate::shaders;
use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};
use pingpong_common::{Parity, SlotId, SlotLayout, WorkgroupSize};
use pingpong_kernel::{Backend, BackendError};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use wgpu::util::DeviceExt;

/// Background the bodies are drawn over.
const CLEAR_COLOR: wgpu::Color = wgpu::Color {
    r: 0.0,
    g: 0.0,
    b: 0.1,
    a: 1.0,
};

/// Billboard half-size in clip units.
const PARTICLE_SIZE: f32 = 0.005;

#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
struct Uniforms {
    view_proj: [[f32; 4]; 4],
    params: [f32; 4],
}

/// `count` unit-mass bodies spread uniformly over a sphere of `radius`.
pub fn sphere_positions(count: u32, radius: f32, seed: u64) -> Vec<[f32; 4]> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|_| {
            let z: f32 = rng.gen_range(-1.0..=1.0);
            let theta: f32 = rng.gen_range(0.0..std::f32::consts::TAU);
            let r = (1.0 - z * z).max(0.0).sqrt();
            let p = Vec3::new(r * theta.cos(), r * theta.sin(), z) * radius;
            [p.x, p.y, p.z, 1.0]
        })
        .collect()
}

/// One slot of body positions; doubles as the instance vertex buffer.
pub struct NBodySlot {
    id: SlotId,
    buffer: wgpu::Buffer,
}

impl NBodySlot {
    pub fn id(&self) -> SlotId {
        self.id
    }

    pub fn buffer(&self) -> &wgpu::Buffer {
        &self.buffer
    }
}

/// The N-body demo as an orchestrator backend.
///
/// Owns the velocity buffer shared by both parities, the compute and render
/// pipelines and the view-projection uniform.
pub struct NBodyProgram {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    bodies: u32,
    workgroup: WorkgroupSize,
    compute_layout: wgpu::BindGroupLayout,
    compute_pipeline: wgpu::ComputePipeline,
    render_pipeline: wgpu::RenderPipeline,
    uniform_buffer: wgpu::Buffer,
    uniform_bind_group: wgpu::BindGroup,
    velocities: wgpu::Buffer,
}

impl NBodyProgram {
    pub fn new(
        device: Arc<wgpu::Device>,
        queue: Arc<wgpu::Queue>,
        bodies: u32,
        workgroup: WorkgroupSize,
        surface_format: wgpu::TextureFormat,
    ) -> Result<Self, BackendError> {
        let velocities = scoped(&device, "nbody_velocities", || {
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("nbody_velocities"),
                size: bodies as u64 * 16,
                usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
                mapped_at_creation: false,
            })
        })?;

        let storage_entry = |binding: u32, read_only: bool| wgpu::BindGroupLayoutEntry {
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
            label: Some("nbody_compute_layout"),
            entries: &[
                storage_entry(0, true),
                storage_entry(1, false),
                storage_entry(2, false),
            ],
        });

        let compute_pipeline = scoped(&device, "nbody_compute_pipeline", || {
            let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some("nbody_compute_shader"),
                source: wgpu::ShaderSource::Wgsl(
                    shaders::with_workgroup(shaders::NBODY_COMPUTE, workgroup).into(),
                ),
            });
            let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("nbody_compute_pipeline_layout"),
                bind_group_layouts: &[&compute_layout],
                push_constant_ranges: &[],
            });
            device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some("nbody_compute_pipeline"),
                layout: Some(&layout),
                module: &module,
                entry_point: Some("cs_main"),
                compilation_options: Default::default(),
                cache: None,
            })
        })?;

        let uniform_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("nbody_uniforms"),
            contents: bytemuck::bytes_of(&Uniforms {
                view_proj: Mat4::IDENTITY.to_cols_array_2d(),
                params: [PARTICLE_SIZE, 0.0, 0.0, 0.0],
            }),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let uniform_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("nbody_uniform_layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });
        let uniform_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("nbody_uniform_bind_group"),
            layout: &uniform_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform_buffer.as_entire_binding(),
            }],
        });

        let render_pipeline = scoped(&device, "nbody_render_pipeline", || {
            let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some("nbody_render_shader"),
                source: wgpu::ShaderSource::Wgsl(shaders::NBODY_RENDER.into()),
            });
            let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("nbody_render_pipeline_layout"),
                bind_group_layouts: &[&uniform_layout],
                push_constant_ranges: &[],
            });
            let additive = wgpu::BlendComponent {
                src_factor: wgpu::BlendFactor::One,
                dst_factor: wgpu::BlendFactor::One,
                operation: wgpu::BlendOperation::Add,
            };
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("nbody_render_pipeline"),
                layout: Some(&layout),
                vertex: wgpu::VertexState {
                    module: &module,
                    entry_point: Some("vs_main"),
                    compilation_options: Default::default(),
                    buffers: &[wgpu::VertexBufferLayout {
                        array_stride: 16,
                        step_mode: wgpu::VertexStepMode::Instance,
                        attributes: &wgpu::vertex_attr_array![0 => Float32x4],
                    }],
                },
                fragment: Some(wgpu::FragmentState {
                    module: &module,
                    entry_point: Some("fs_main"),
                    compilation_options: Default::default(),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: surface_format,
                        blend: Some(wgpu::BlendState {
                            color: additive,
                            alpha: additive,
                        }),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    ..Default::default()
                },
                depth_stencil: None,
                multisample: Default::default(),
                multiview: None,
                cache: None,
            })
        })?;

        tracing::info!(bodies, workgroup = workgroup.get(), "nbody program ready");

        Ok(Self {
            device,
            queue,
            bodies,
            workgroup,
            compute_layout,
            compute_pipeline,
            render_pipeline,
            uniform_buffer,
            uniform_bind_group,
            velocities,
        })
    }

    pub fn bodies(&self) -> u32 {
        self.bodies
    }

    /// Layout of one position slot for this program.
    pub fn layout(&self) -> Result<SlotLayout, pingpong_common::LayoutError> {
        SlotLayout::of::<[f32; 4]>(self.bodies)
    }

    pub fn velocities(&self) -> &wgpu::Buffer {
        &self.velocities
    }

    /// Upload a new view-projection. Call only when the camera changed.
    pub fn set_view_projection(&self, view_proj: Mat4) {
        self.queue.write_buffer(
            &self.uniform_buffer,
            0,
            bytemuck::bytes_of(&Uniforms {
                view_proj: view_proj.to_cols_array_2d(),
                params: [PARTICLE_SIZE, 0.0, 0.0, 0.0],
            }),
        );
    }
}

impl Backend for NBodyProgram {
    type Slot = NBodySlot;
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
    ) -> Result<NBodySlot, BackendError> {
        let label = format!("nbody_positions_{id}");
        // The velocity buffer is sized for `bodies`; a longer slot would index past it.
        if layout.item_count() != self.bodies {
            return Err(BackendError::Validation {
                label,
                message: format!(
                    "{} items in a slot for {} bodies",
                    layout.item_count(),
                    self.bodies
                ),
            });
        }
        let usage = wgpu::BufferUsages::STORAGE
            | wgpu::BufferUsages::VERTEX
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
        Ok(NBodySlot { id, buffer })
    }

    fn create_binding_set(
        &mut self,
        parity: Parity,
        input: &NBodySlot,
        output: &NBodySlot,
    ) -> Result<wgpu::BindGroup, BackendError> {
        let label = format!("nbody_compute_bind_group_{parity}");
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
                        resource: self.velocities.as_entire_binding(),
                    },
                ],
            })
        })
    }

    fn encode_dispatch(&mut self, encoder: &mut FrameEncoder, set: &wgpu::BindGroup, groups: u32) {
        let mut pass = encoder
            .encoder()
            .begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("nbody_compute_pass"),
                timestamp_writes: None,
            });
        pass.set_pipeline(&self.compute_pipeline);
        pass.set_bind_group(0, set, &[]);
        pass.dispatch_workgroups(groups, 1, 1);
    }

    fn encode_draw(&mut self, encoder: &mut FrameEncoder, slot: &NBodySlot, instances: u32) {
        let (encoder, target) = encoder.parts_mut();
        let Some(view) = target else {
            tracing::warn!("nbody draw skipped: frame has no render target");
            return;
        };
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("nbody_render_pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(CLEAR_COLOR),
                    store: wgpu::StoreOp::Store,
                },
            })],
            ..Default::default()
        });
        pass.set_pipeline(&self.render_pipeline);
        pass.set_bind_group(0, &self.uniform_bind_group, &[]);
        pass.set_vertex_buffer(0, slot.buffer.slice(..));
        pass.draw(0..6, 0..instances);
    }

    fn release_slot(&mut self, id: SlotId, slot: NBodySlot) {
        tracing::debug!(%id, "nbody slot released");
        slot.buffer.destroy();
    }

    fn release_binding_set(&mut self, parity: Parity, set: wgpu::BindGroup) {
        tracing::debug!(%parity, "nbody binding set released");
        drop(set);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sphere_positions_lie_on_sphere() {
        let bodies = sphere_positions(512, 0.6, 7);
        assert_eq!(bodies.len(), 512);
        for b in &bodies {
            let r = Vec3::new(b[0], b[1], b[2]).length();
            assert!((r - 0.6).abs() < 1e-4, "radius {r}");
            assert_eq!(b[3], 1.0);
        }
    }

    #[test]
    fn sphere_positions_are_seeded() {
        assert_eq!(sphere_positions(16, 0.6, 1), sphere_positions(16, 0.6, 1));
        assert_ne!(sphere_positions(16, 0.6, 1), sphere_positions(16, 0.6, 2));
    }
}
