use crate::buffer::GuardedBuffer;
use crate::kernels::{Invocation, Kernel};
use pingpong_common::{Parity, SlotId, SlotLayout, WorkgroupSize};
use pingpong_kernel::{Backend, BackendError};
use sha2::{Digest, Sha256};

/// Errors raised while executing a submitted encoder.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SoftwareError {
    #[error("buffer #{0} was released before the commands using it ran")]
    Released(usize),
}

/// Handle to one slot buffer in the backend's arena.
#[derive(Debug)]
pub struct SoftwareSlot {
    id: SlotId,
    buffer: usize,
}

impl SoftwareSlot {
    pub fn id(&self) -> SlotId {
        self.id
    }

    pub fn buffer(&self) -> usize {
        self.buffer
    }
}

/// Input/output pairing for one parity.
#[derive(Debug)]
pub struct SoftwareBindingSet {
    parity: Parity,
    input: usize,
    output: usize,
}

impl SoftwareBindingSet {
    pub fn parity(&self) -> Parity {
        self.parity
    }
}

/// One recorded command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Dispatch {
        parity: Parity,
        input: usize,
        output: usize,
        groups: u32,
    },
    Draw {
        slot: SlotId,
        buffer: usize,
        instances: u32,
    },
}

/// Command list. Executes in recording order on [`SoftwareBackend::submit`].
#[derive(Debug, Default)]
pub struct SoftwareEncoder {
    commands: Vec<Command>,
}

impl SoftwareEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

/// What a draw saw when it executed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrawRecord {
    pub slot: SlotId,
    pub instances: u32,
    pub contents: Vec<u8>,
}

impl DrawRecord {
    /// Decode the snapshot as items of `T`.
    pub fn items<T: bytemuck::Pod>(&self) -> Vec<T> {
        decode_items(&self.contents)
    }

    /// Hex SHA-256 of the snapshot, for comparing frames without dumping them.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(&self.contents);
        format!("{:x}", hasher.finalize())
    }
}

/// Allocation bookkeeping.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AllocationCounters {
    pub slots_created: usize,
    pub binding_sets_created: usize,
    pub slots_released: usize,
    pub binding_sets_released: usize,
}

impl AllocationCounters {
    pub fn live_slots(&self) -> usize {
        self.slots_created - self.slots_released
    }

    pub fn live_binding_sets(&self) -> usize {
        self.binding_sets_created - self.binding_sets_released
    }
}

struct Allocation {
    buffer: GuardedBuffer,
    layout: SlotLayout,
}

/// Runs a [`Kernel`] over guarded CPU buffers.
///
/// Each slot gets a guard zone one workgroup long, which is exactly the most an
/// unchecked tail can overrun.
pub struct SoftwareBackend {
    kernel: Box<dyn Kernel>,
    workgroup: WorkgroupSize,
    buffers: Vec<Option<Allocation>>,
    aux: Vec<u8>,
    counters: AllocationCounters,
    fail_slot: Option<SlotId>,
    fail_binding_set: Option<Parity>,
    dispatches: u64,
}

impl SoftwareBackend {
    pub fn new(kernel: impl Kernel + 'static, workgroup: WorkgroupSize) -> Self {
        Self {
            kernel: Box::new(kernel),
            workgroup,
            buffers: Vec::new(),
            aux: Vec::new(),
            counters: AllocationCounters::default(),
            fail_slot: None,
            fail_binding_set: None,
            dispatches: 0,
        }
    }

    /// Auxiliary state visible to every invocation (N-body velocities).
    pub fn with_aux(mut self, aux: Vec<u8>) -> Self {
        self.aux = aux;
        self
    }

    /// Make `create_slot` fail for `id`.
    pub fn fail_slot(mut self, id: SlotId) -> Self {
        self.fail_slot = Some(id);
        self
    }

    /// Make `create_binding_set` fail for `parity`.
    pub fn fail_binding_set(mut self, parity: Parity) -> Self {
        self.fail_binding_set = Some(parity);
        self
    }

    pub fn counters(&self) -> AllocationCounters {
        self.counters
    }

    pub fn dispatches(&self) -> u64 {
        self.dispatches
    }

    pub fn aux(&self) -> &[u8] {
        &self.aux
    }

    pub fn buffer(&self, slot: &SoftwareSlot) -> Option<&GuardedBuffer> {
        self.allocation(slot.buffer).map(|a| &a.buffer)
    }

    pub fn slot_contents(&self, slot: &SoftwareSlot) -> Option<&[u8]> {
        self.buffer(slot).map(GuardedBuffer::contents)
    }

    pub fn read_items<T: bytemuck::Pod>(&self, slot: &SoftwareSlot) -> Option<Vec<T>> {
        self.slot_contents(slot).map(decode_items)
    }

    /// Guard bytes overwritten past the end of `slot`.
    pub fn guard_damage(&self, slot: &SoftwareSlot) -> Option<usize> {
        self.buffer(slot).map(GuardedBuffer::guard_damage)
    }

    /// Execute `encoder` in recording order, returning the draws it performed.
    pub fn submit(&mut self, encoder: SoftwareEncoder) -> Result<Vec<DrawRecord>, SoftwareError> {
        let mut draws = Vec::new();
        for command in encoder.commands {
            match command {
                Command::Dispatch {
                    input,
                    output,
                    groups,
                    ..
                } => self.run_dispatch(input, output, groups)?,
                Command::Draw {
                    slot,
                    buffer,
                    instances,
                } => {
                    let alloc = self
                        .allocation(buffer)
                        .ok_or(SoftwareError::Released(buffer))?;
                    draws.push(DrawRecord {
                        slot,
                        instances,
                        contents: alloc.buffer.contents().to_vec(),
                    });
                }
            }
        }
        Ok(draws)
    }

    fn allocation(&self, buffer: usize) -> Option<&Allocation> {
        self.buffers.get(buffer).and_then(Option::as_ref)
    }

    fn run_dispatch(&mut self, input: usize, output: usize, groups: u32) -> Result<(), SoftwareError> {
        let mut out = self
            .buffers
            .get_mut(output)
            .and_then(Option::take)
            .ok_or(SoftwareError::Released(output))?;

        let result = match self.buffers.get(input).and_then(Option::as_ref) {
            Some(src) => {
                let invocations = groups.saturating_mul(self.workgroup.get());
                let stride = src.layout.item_stride() as usize;
                for global_id in 0..invocations {
                    let mut invocation = Invocation {
                        global_id,
                        item_count: src.layout.item_count(),
                        stride,
                        input: src.buffer.contents(),
                        output: out.buffer.raw_mut(),
                        aux: &mut self.aux,
                    };
                    self.kernel.invoke(&mut invocation);
                }
                self.dispatches += 1;
                tracing::trace!(input, output, groups, invocations, "software dispatch");
                Ok(())
            }
            None => Err(SoftwareError::Released(input)),
        };

        self.buffers[output] = Some(out);
        result
    }
}

impl Backend for SoftwareBackend {
    type Slot = SoftwareSlot;
    type BindingSet = SoftwareBindingSet;
    type Encoder = SoftwareEncoder;

    fn workgroup(&self) -> WorkgroupSize {
        self.workgroup
    }

    fn create_slot(
        &mut self,
        id: SlotId,
        layout: &SlotLayout,
        contents: Option<&[u8]>,
    ) -> Result<SoftwareSlot, BackendError> {
        if self.fail_slot == Some(id) {
            return Err(BackendError::OutOfMemory {
                label: format!("software {id}"),
            });
        }
        let len = layout.byte_size() as usize;
        if let Some(bytes) = contents {
            if bytes.len() != len {
                return Err(BackendError::Validation {
                    label: format!("software {id}"),
                    message: format!("seed is {} bytes, slot is {len}", bytes.len()),
                });
            }
        }
        let guard = self.workgroup.get() as usize * layout.item_stride() as usize;
        self.buffers.push(Some(Allocation {
            buffer: GuardedBuffer::new(len, guard, contents),
            layout: *layout,
        }));
        self.counters.slots_created += 1;
        tracing::debug!(%id, bytes = len, guard, "software slot created");
        Ok(SoftwareSlot {
            id,
            buffer: self.buffers.len() - 1,
        })
    }

    fn create_binding_set(
        &mut self,
        parity: Parity,
        input: &SoftwareSlot,
        output: &SoftwareSlot,
    ) -> Result<SoftwareBindingSet, BackendError> {
        if self.fail_binding_set == Some(parity) {
            return Err(BackendError::OutOfMemory {
                label: format!("software binding set {parity}"),
            });
        }
        if input.buffer == output.buffer {
            return Err(BackendError::Validation {
                label: format!("software binding set {parity}"),
                message: "input and output alias the same slot".into(),
            });
        }
        self.counters.binding_sets_created += 1;
        Ok(SoftwareBindingSet {
            parity,
            input: input.buffer,
            output: output.buffer,
        })
    }

    fn encode_dispatch(&mut self, encoder: &mut SoftwareEncoder, set: &SoftwareBindingSet, groups: u32) {
        encoder.commands.push(Command::Dispatch {
            parity: set.parity,
            input: set.input,
            output: set.output,
            groups,
        });
    }

    fn encode_draw(&mut self, encoder: &mut SoftwareEncoder, slot: &SoftwareSlot, instances: u32) {
        encoder.commands.push(Command::Draw {
            slot: slot.id,
            buffer: slot.buffer,
            instances,
        });
    }

    fn release_slot(&mut self, id: SlotId, slot: SoftwareSlot) {
        if let Some(entry) = self.buffers.get_mut(slot.buffer) {
            if entry.take().is_some() {
                self.counters.slots_released += 1;
                tracing::debug!(%id, "software slot released");
            }
        }
    }

    fn release_binding_set(&mut self, parity: Parity, _set: SoftwareBindingSet) {
        self.counters.binding_sets_released += 1;
        tracing::debug!(%parity, "software binding set released");
    }
}

fn decode_items<T: bytemuck::Pod>(bytes: &[u8]) -> Vec<T> {
    bytes
        .chunks_exact(std::mem::size_of::<T>())
        .map(bytemuck::pod_read_unaligned)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernels;

    fn layout(items: u32) -> SlotLayout {
        SlotLayout::of::<u32>(items).unwrap()
    }

    #[test]
    fn seed_size_is_validated() {
        let mut backend = SoftwareBackend::new(kernels::identity, WorkgroupSize::default());
        let err = backend
            .create_slot(SlotId::ZERO, &layout(4), Some(&[0u8; 3]))
            .unwrap_err();
        assert!(matches!(err, BackendError::Validation { .. }));
        assert_eq!(backend.counters().slots_created, 0);
    }

    #[test]
    fn aliased_binding_set_is_rejected() {
        let mut backend = SoftwareBackend::new(kernels::identity, WorkgroupSize::default());
        let slot = backend.create_slot(SlotId::ZERO, &layout(4), None).unwrap();
        let err = backend
            .create_binding_set(Parity::Even, &slot, &slot)
            .unwrap_err();
        assert!(matches!(err, BackendError::Validation { .. }));
    }

    #[test]
    fn submit_runs_commands_in_order() {
        let wg = WorkgroupSize::new(4).unwrap();
        let mut backend = SoftwareBackend::new(kernels::identity, wg);
        let seed: Vec<u8> = bytemuck::cast_slice(&[1u32, 2, 3, 4]).to_vec();
        let a = backend.create_slot(SlotId::ZERO, &layout(4), Some(&seed)).unwrap();
        let b = backend.create_slot(SlotId::ONE, &layout(4), None).unwrap();
        let set = backend.create_binding_set(Parity::Even, &a, &b).unwrap();

        let mut encoder = SoftwareEncoder::new();
        backend.encode_draw(&mut encoder, &b, 4);
        backend.encode_dispatch(&mut encoder, &set, 1);
        backend.encode_draw(&mut encoder, &b, 4);
        let draws = backend.submit(encoder).unwrap();

        assert_eq!(draws[0].items::<u32>(), vec![0, 0, 0, 0]);
        assert_eq!(draws[1].items::<u32>(), vec![1, 2, 3, 4]);
        assert_ne!(draws[0].digest(), draws[1].digest());
        assert_eq!(draws[1].digest().len(), 64);
        assert_eq!(backend.dispatches(), 1);
    }

    #[test]
    fn released_buffer_fails_submission() {
        let mut backend = SoftwareBackend::new(kernels::identity, WorkgroupSize::default());
        let a = backend.create_slot(SlotId::ZERO, &layout(4), None).unwrap();
        let mut encoder = SoftwareEncoder::new();
        backend.encode_draw(&mut encoder, &a, 4);
        let buffer = a.buffer();
        backend.release_slot(SlotId::ZERO, a);
        assert_eq!(backend.submit(encoder), Err(SoftwareError::Released(buffer)));
        assert_eq!(backend.counters().live_slots(), 0);
    }
}
