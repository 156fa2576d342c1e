use pingpong_common::{Parity, SlotId, SlotLayout, WorkgroupSize};

/// Errors raised by a backend while creating GPU objects.
///
/// Allocation is never retried: the same parameters fail the same way.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    #[error("out of memory allocating {label}")]
    OutOfMemory { label: String },
    #[error("validation failed for {label}: {message}")]
    Validation { label: String, message: String },
}

/// The GPU-side collaborator an [`Orchestrator`](crate::Orchestrator) drives.
///
/// A backend owns everything that is not double-buffered (pipelines, auxiliary
/// buffers, uniforms) and knows how to bind a pair of slots and how to draw
/// from one. The orchestrator decides which slot plays which role each frame.
pub trait Backend {
    /// One generation of double-buffered state.
    type Slot;
    /// Precomputed binding of (input slot, output slot, auxiliary state).
    type BindingSet;
    /// Per-frame command recorder; dispatches and draws recorded into one
    /// encoder execute in recording order.
    type Encoder;

    /// Workgroup size the backend's compute kernel was built for.
    fn workgroup(&self) -> WorkgroupSize;

    /// Allocate a slot of `layout.byte_size()` bytes. `contents`, when given, is
    /// exactly that long; otherwise the slot is zero-initialized.
    fn create_slot(
        &mut self,
        id: SlotId,
        layout: &SlotLayout,
        contents: Option<&[u8]>,
    ) -> Result<Self::Slot, BackendError>;

    /// Build the binding set used when `parity` is current: read `input`, write `output`.
    fn create_binding_set(
        &mut self,
        parity: Parity,
        input: &Self::Slot,
        output: &Self::Slot,
    ) -> Result<Self::BindingSet, BackendError>;

    /// Record one compute dispatch of `groups` workgroups.
    fn encode_dispatch(&mut self, encoder: &mut Self::Encoder, set: &Self::BindingSet, groups: u32);

    /// Record the draw that reads `slot` as its per-instance source.
    fn encode_draw(&mut self, encoder: &mut Self::Encoder, slot: &Self::Slot, instances: u32);

    fn release_slot(&mut self, id: SlotId, slot: Self::Slot);

    fn release_binding_set(&mut self, parity: Parity, set: Self::BindingSet);
}
