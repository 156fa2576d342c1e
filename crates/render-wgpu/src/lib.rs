//! wgpu backends for the pingpong orchestrator.
//!
//! Three programs implement the orchestrator's backend trait: the N-body
//! particle simulation, the iterated image filter, and a headless identity
//! copy used for verification.
//!
//! # Invariants
//! - Each frame's work goes into one `FrameEncoder` and one submission.
//! - Slot and binding-set creation runs under error scopes; failures surface as
//!   `BackendError`, never as a later device panic.
//! - Workgroup size is fixed when a program's pipelines are built.
//! - Camera motion only touches the uniform buffer, never slot contents.

mod alloc;
mod camera;
mod context;
mod frame;
mod identity;
mod image_filter;
mod nbody;
mod readback;
mod shaders;

pub use camera::{Camera, EYE_STEP};
pub use context::{GpuContext, GpuError};
pub use frame::FrameEncoder;
pub use identity::{IdentityProgram, IdentitySlot};
pub use image_filter::{FilterKernel, ImageFilterProgram, ImageSlot, checkerboard, pack_rgba};
pub use nbody::{NBodyProgram, NBodySlot, sphere_positions};
pub use readback::read_buffer;

pub fn crate_info() -> &'static str {
    "pingpong-wgpu v0.1.0"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crate_loads() {
        assert!(crate_info().contains("wgpu"));
    }
}
