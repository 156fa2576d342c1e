/// One frame's command encoder and, when rendering, its target view.
///
/// Everything a frame records goes into this single encoder and is submitted
/// once; the compute dispatch and the render draw are ordered by that alone.
pub struct FrameEncoder {
    encoder: wgpu::CommandEncoder,
    target: Option<wgpu::TextureView>,
}

impl FrameEncoder {
    pub fn new(device: &wgpu::Device, target: wgpu::TextureView) -> Self {
        Self {
            encoder: Self::create_encoder(device),
            target: Some(target),
        }
    }

    /// Encoder with no render target; draws that need one are skipped.
    pub fn headless(device: &wgpu::Device) -> Self {
        Self {
            encoder: Self::create_encoder(device),
            target: None,
        }
    }

    pub fn encoder(&mut self) -> &mut wgpu::CommandEncoder {
        &mut self.encoder
    }

    pub fn target(&self) -> Option<&wgpu::TextureView> {
        self.target.as_ref()
    }

    /// Encoder and target together, for passes recorded outside a program.
    pub fn parts_mut(&mut self) -> (&mut wgpu::CommandEncoder, Option<&wgpu::TextureView>) {
        (&mut self.encoder, self.target.as_ref())
    }

    pub fn finish(self) -> wgpu::CommandBuffer {
        self.encoder.finish()
    }

    fn create_encoder(device: &wgpu::Device) -> wgpu::CommandEncoder {
        device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("frame_encoder"),
        })
    }
}
