use crate::backend::{Backend, BackendError};
use pingpong_common::{LayoutError, Parity, SlotId, SlotLayout, WorkgroupSize, dispatch_groups};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;

/// Frame events kept for inspection; older ones are dropped first.
const EVENT_LOG_CAPACITY: usize = 1024;

/// Errors from orchestrator operations. None of them are retryable.
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("resource allocation failed: {0}")]
    ResourceAllocation(#[from] BackendError),
    #[error("invalid state: {0}")]
    InvalidState(&'static str),
    #[error("seed item stride mismatch: layout expects {expected} bytes, generator produced {actual}")]
    SeedStride { expected: u64, actual: u64 },
    #[error("seed item count mismatch: layout expects {expected} items, generator produced {actual}")]
    SeedLength { expected: u64, actual: u64 },
    #[error("layout error: {0}")]
    Layout(#[from] LayoutError),
}

/// Record of one `advance_frame` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FrameEvent {
    /// Compute ran with `parity`: read `parity.input()`, wrote `parity.output()`.
    Computed { frame: u64, parity: Parity },
    /// Compute skipped; the render pass re-read `render_slot`.
    Paused { frame: u64, render_slot: SlotId },
}

impl FrameEvent {
    pub fn render_slot(&self) -> SlotId {
        match self {
            FrameEvent::Computed { parity, .. } => parity.output(),
            FrameEvent::Paused { render_slot, .. } => *render_slot,
        }
    }
}

/// Running counters over the orchestrator's lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameStats {
    pub frames: u64,
    pub computed: u64,
    pub paused: u64,
}

/// What a `shutdown` call released.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReleaseReport {
    pub slots: usize,
    pub binding_sets: usize,
}

/// Per-frame record produced by [`Orchestrator::advance_frame`].
///
/// Only valid for the frame and orchestrator it was produced for; the record
/// calls reject it once the next frame has been advanced.
#[derive(Debug)]
pub struct FrameState {
    owner: Arc<()>,
    frame: u64,
    parity: Option<Parity>,
    render_slot: SlotId,
    dispatched: bool,
}

impl FrameState {
    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Parity used by this frame's compute pass, `None` when paused.
    pub fn parity(&self) -> Option<Parity> {
        self.parity
    }

    pub fn computes(&self) -> bool {
        self.parity.is_some()
    }

    /// Slot the render draw reads.
    pub fn render_slot(&self) -> SlotId {
        self.render_slot
    }

    pub fn dispatched(&self) -> bool {
        self.dispatched
    }
}

struct Resources<B: Backend> {
    slots: [B::Slot; 2],
    /// Indexed by `Parity::index()`.
    binding_sets: [B::BindingSet; 2],
}

/// Owns two slots and their two binding sets and sequences compute and render
/// work across frames.
///
/// Per frame the caller does:
/// 1. `advance_frame(compute_enabled)`
/// 2. `record_compute_dispatch` (computing frames only)
/// 3. `record_render_draw`
/// 4. submit the encoder
///
/// Dropping the orchestrator releases anything `shutdown` has not.
pub struct Orchestrator<B: Backend> {
    backend: B,
    layout: SlotLayout,
    workgroup: WorkgroupSize,
    groups: u32,
    resources: Option<Resources<B>>,
    /// Parity the next computing frame will use.
    parity: Parity,
    /// Slot written by the most recent computing frame (slot 0 before any).
    last_output: SlotId,
    frame: u64,
    current: Option<u64>,
    /// Identity token shared with every [`FrameState`] this instance hands out.
    owner: Arc<()>,
    stats: FrameStats,
    event_log: VecDeque<FrameEvent>,
}

impl<B: Backend> Orchestrator<B> {
    /// Allocate both slots, seed slot 0 from `generate`, and build both binding sets.
    ///
    /// `workgroup` must be the size the backend's kernel was built for, since the
    /// dispatch grid is derived from it. On allocation failure everything
    /// created so far is released before the error is returned.
    pub fn initialize<T, G>(
        mut backend: B,
        layout: SlotLayout,
        workgroup: WorkgroupSize,
        generate: G,
    ) -> Result<Self, OrchestratorError>
    where
        T: bytemuck::Pod,
        G: FnOnce(&SlotLayout) -> Vec<T>,
    {
        if backend.workgroup() != workgroup {
            tracing::warn!(
                backend = backend.workgroup().get(),
                requested = workgroup.get(),
                "workgroup size mismatch"
            );
            return Err(OrchestratorError::InvalidState(
                "backend kernel was built for a different workgroup size",
            ));
        }
        let stride = std::mem::size_of::<T>() as u64;
        if stride != layout.item_stride() {
            return Err(OrchestratorError::SeedStride {
                expected: layout.item_stride(),
                actual: stride,
            });
        }
        let seed = generate(&layout);
        if seed.len() as u64 != layout.item_count() as u64 {
            return Err(OrchestratorError::SeedLength {
                expected: layout.item_count() as u64,
                actual: seed.len() as u64,
            });
        }
        let seed_bytes: &[u8] = bytemuck::cast_slice(&seed);

        let slot0 = backend.create_slot(SlotId::ZERO, &layout, Some(seed_bytes))?;
        let slot1 = match backend.create_slot(SlotId::ONE, &layout, None) {
            Ok(slot) => slot,
            Err(e) => {
                tracing::warn!("slot1 allocation failed, rolling back: {e}");
                backend.release_slot(SlotId::ZERO, slot0);
                return Err(e.into());
            }
        };
        let slots = [slot0, slot1];

        let even = match backend.create_binding_set(
            Parity::Even,
            &slots[Parity::Even.input().index()],
            &slots[Parity::Even.output().index()],
        ) {
            Ok(set) => set,
            Err(e) => {
                tracing::warn!("binding set 0 failed, rolling back: {e}");
                release_slots(&mut backend, slots);
                return Err(e.into());
            }
        };
        let odd = match backend.create_binding_set(
            Parity::Odd,
            &slots[Parity::Odd.input().index()],
            &slots[Parity::Odd.output().index()],
        ) {
            Ok(set) => set,
            Err(e) => {
                tracing::warn!("binding set 1 failed, rolling back: {e}");
                backend.release_binding_set(Parity::Even, even);
                release_slots(&mut backend, slots);
                return Err(e.into());
            }
        };

        let groups = dispatch_groups(layout.item_count(), workgroup);
        tracing::info!(
            items = layout.item_count(),
            stride = layout.item_stride(),
            workgroup = workgroup.get(),
            groups,
            "orchestrator initialized"
        );

        Ok(Self {
            backend,
            layout,
            workgroup,
            groups,
            resources: Some(Resources {
                slots,
                binding_sets: [even, odd],
            }),
            parity: Parity::Even,
            last_output: SlotId::ZERO,
            frame: 0,
            current: None,
            owner: Arc::new(()),
            stats: FrameStats::default(),
            event_log: VecDeque::new(),
        })
    }

    /// Start a frame.
    ///
    /// With compute enabled the frame renders the slot its dispatch writes and
    /// parity flips for the next call. Paused, it renders the slot written by the
    /// last computing frame and parity is left alone.
    pub fn advance_frame(&mut self, compute_enabled: bool) -> Result<FrameState, OrchestratorError> {
        if self.resources.is_none() {
            return Err(OrchestratorError::InvalidState("advance_frame after shutdown"));
        }
        let frame = self.frame;
        self.frame += 1;
        self.current = Some(frame);
        self.stats.frames += 1;

        let state = if compute_enabled {
            let parity = self.parity;
            self.parity = parity.flipped();
            self.last_output = parity.output();
            self.stats.computed += 1;
            self.push_event(FrameEvent::Computed { frame, parity });
            tracing::debug!(frame, %parity, render = %parity.output(), "compute frame");
            FrameState {
                owner: self.owner.clone(),
                frame,
                parity: Some(parity),
                render_slot: parity.output(),
                dispatched: false,
            }
        } else {
            self.stats.paused += 1;
            self.push_event(FrameEvent::Paused {
                frame,
                render_slot: self.last_output,
            });
            tracing::debug!(frame, render = %self.last_output, "paused frame");
            FrameState {
                owner: self.owner.clone(),
                frame,
                parity: None,
                render_slot: self.last_output,
                dispatched: false,
            }
        };
        Ok(state)
    }

    /// Record this frame's compute dispatch. Returns the workgroup count.
    pub fn record_compute_dispatch(
        &mut self,
        encoder: &mut B::Encoder,
        state: &mut FrameState,
    ) -> Result<u32, OrchestratorError> {
        self.check_frame(state)?;
        let Some(parity) = state.parity else {
            return Err(OrchestratorError::InvalidState(
                "compute dispatch recorded for a paused frame",
            ));
        };
        if state.dispatched {
            return Err(OrchestratorError::InvalidState(
                "compute dispatch already recorded for this frame",
            ));
        }
        let resources = self
            .resources
            .as_ref()
            .ok_or(OrchestratorError::InvalidState("dispatch after shutdown"))?;

        tracing::trace!(frame = state.frame, %parity, groups = self.groups, "encode dispatch");
        self.backend
            .encode_dispatch(encoder, &resources.binding_sets[parity.index()], self.groups);
        state.dispatched = true;
        Ok(self.groups)
    }

    /// Record this frame's render draw from `state.render_slot()`.
    ///
    /// On a computing frame the dispatch must already be in `encoder`, so the
    /// draw executes after the write it reads.
    pub fn record_render_draw(
        &mut self,
        encoder: &mut B::Encoder,
        state: &FrameState,
    ) -> Result<(), OrchestratorError> {
        self.check_frame(state)?;
        if state.computes() && !state.dispatched {
            return Err(OrchestratorError::InvalidState(
                "render draw recorded before the frame's compute dispatch",
            ));
        }
        let resources = self
            .resources
            .as_ref()
            .ok_or(OrchestratorError::InvalidState("draw after shutdown"))?;

        tracing::trace!(frame = state.frame, slot = %state.render_slot, "encode draw");
        self.backend.encode_draw(
            encoder,
            &resources.slots[state.render_slot.index()],
            self.layout.item_count(),
        );
        Ok(())
    }

    /// Release both binding sets and both slots. Later calls release nothing.
    pub fn shutdown(&mut self) -> ReleaseReport {
        let Some(Resources {
            slots,
            binding_sets,
        }) = self.resources.take()
        else {
            return ReleaseReport::default();
        };

        let [even, odd] = binding_sets;
        self.backend.release_binding_set(Parity::Even, even);
        self.backend.release_binding_set(Parity::Odd, odd);
        release_slots(&mut self.backend, slots);
        self.current = None;

        tracing::info!(frames = self.stats.frames, "orchestrator shut down");
        ReleaseReport {
            slots: 2,
            binding_sets: 2,
        }
    }

    pub fn is_live(&self) -> bool {
        self.resources.is_some()
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn layout(&self) -> &SlotLayout {
        &self.layout
    }

    pub fn workgroup(&self) -> WorkgroupSize {
        self.workgroup
    }

    /// Workgroups per dispatch.
    pub fn dispatch_groups(&self) -> u32 {
        self.groups
    }

    /// Parity the next computing frame will use.
    pub fn parity(&self) -> Parity {
        self.parity
    }

    /// Slot written by the most recent computing frame.
    pub fn last_output(&self) -> SlotId {
        self.last_output
    }

    /// Number of frames advanced so far.
    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn stats(&self) -> FrameStats {
        self.stats
    }

    pub fn slot(&self, id: SlotId) -> Option<&B::Slot> {
        self.resources.as_ref().map(|r| &r.slots[id.index()])
    }

    /// Most recent frame events, oldest first.
    pub fn events(&self) -> impl Iterator<Item = &FrameEvent> {
        self.event_log.iter()
    }

    pub fn drain_events(&mut self) -> Vec<FrameEvent> {
        self.event_log.drain(..).collect()
    }

    fn check_frame(&self, state: &FrameState) -> Result<(), OrchestratorError> {
        if self.resources.is_none() {
            return Err(OrchestratorError::InvalidState("orchestrator is shut down"));
        }
        if !Arc::ptr_eq(&self.owner, &state.owner) {
            return Err(OrchestratorError::InvalidState(
                "frame state belongs to another orchestrator",
            ));
        }
        if self.current != Some(state.frame) {
            return Err(OrchestratorError::InvalidState("frame state is stale"));
        }
        Ok(())
    }

    fn push_event(&mut self, event: FrameEvent) {
        if self.event_log.len() == EVENT_LOG_CAPACITY {
            self.event_log.pop_front();
        }
        self.event_log.push_back(event);
    }
}

impl<B: Backend> Drop for Orchestrator<B> {
    fn drop(&mut self) {
        if self.resources.is_some() {
            let report = self.shutdown();
            tracing::debug!(?report, "released on drop");
        }
    }
}

fn release_slots<B: Backend>(backend: &mut B, slots: [B::Slot; 2]) {
    let [slot0, slot1] = slots;
    backend.release_slot(SlotId::ZERO, slot0);
    backend.release_slot(SlotId::ONE, slot1);
}
