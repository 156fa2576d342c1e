use pingpong_common::{Parity, SlotId};
use pingpong_kernel::{Backend, FrameEvent, Orchestrator};
use serde::Serialize;

/// Read-only queries against an orchestrator for overlays and CLI output.
pub struct FrameInspector;

impl FrameInspector {
    /// Snapshot of the orchestrator's frame state.
    pub fn summary<B: Backend>(orch: &Orchestrator<B>) -> FrameSummary {
        let stats = orch.stats();
        FrameSummary {
            frame: orch.frame(),
            next_parity: orch.parity(),
            last_output: orch.last_output(),
            computed: stats.computed,
            paused: stats.paused,
            items: orch.layout().item_count(),
            workgroup: orch.workgroup().get(),
            groups: orch.dispatch_groups(),
            live: orch.is_live(),
        }
    }

    /// Rendered slot per event as a compact string, e.g. `"1 0 0* 1"`.
    /// Paused frames are starred.
    pub fn slot_sequence<'a>(events: impl IntoIterator<Item = &'a FrameEvent>) -> String {
        events
            .into_iter()
            .map(|e| match e {
                FrameEvent::Computed { parity, .. } => parity.output().index().to_string(),
                FrameEvent::Paused { render_slot, .. } => format!("{}*", render_slot.index()),
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Summary of orchestrator state for the inspector.
#[derive(Debug, Clone, Serialize)]
pub struct FrameSummary {
    pub frame: u64,
    pub next_parity: Parity,
    pub last_output: SlotId,
    pub computed: u64,
    pub paused: u64,
    pub items: u32,
    pub workgroup: u32,
    pub groups: u32,
    pub live: bool,
}

impl std::fmt::Display for FrameSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Frames: frame={} parity={} last_output={} computed={} paused={} grid={}x{} items={}{}",
            self.frame,
            self.next_parity,
            self.last_output,
            self.computed,
            self.paused,
            self.groups,
            self.workgroup,
            self.items,
            if self.live { "" } else { " (shut down)" },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pingpong_common::{SlotLayout, WorkgroupSize};
    use pingpong_software::{SoftwareBackend, SoftwareEncoder, kernels};

    fn orchestrator() -> Orchestrator<SoftwareBackend> {
        let wg = WorkgroupSize::new(64).unwrap();
        Orchestrator::initialize(
            SoftwareBackend::new(kernels::identity, wg),
            SlotLayout::of::<u32>(200).unwrap(),
            wg,
            |l| vec![7u32; l.item_count() as usize],
        )
        .unwrap()
    }

    fn frame(orch: &mut Orchestrator<SoftwareBackend>, compute: bool) {
        let mut encoder = SoftwareEncoder::new();
        let mut state = orch.advance_frame(compute).unwrap();
        if state.computes() {
            orch.record_compute_dispatch(&mut encoder, &mut state).unwrap();
        }
        orch.record_render_draw(&mut encoder, &state).unwrap();
        orch.backend_mut().submit(encoder).unwrap();
    }

    #[test]
    fn summary_fresh_orchestrator() {
        let orch = orchestrator();
        let summary = FrameInspector::summary(&orch);
        assert_eq!(summary.frame, 0);
        assert_eq!(summary.next_parity, Parity::Even);
        assert_eq!(summary.last_output, SlotId::ZERO);
        assert_eq!(summary.groups, 4);
        assert!(summary.live);
    }

    #[test]
    fn summary_counts_frames() {
        let mut orch = orchestrator();
        frame(&mut orch, true);
        frame(&mut orch, false);
        frame(&mut orch, true);
        let summary = FrameInspector::summary(&orch);
        assert_eq!(summary.frame, 3);
        assert_eq!(summary.computed, 2);
        assert_eq!(summary.paused, 1);
        assert_eq!(summary.last_output, SlotId::ZERO);
    }

    #[test]
    fn slot_sequence_marks_paused_frames() {
        let mut orch = orchestrator();
        for compute in [true, false, true, true] {
            frame(&mut orch, compute);
        }
        assert_eq!(FrameInspector::slot_sequence(orch.events()), "1 1* 0 1");
    }

    #[test]
    fn summary_display() {
        let mut orch = orchestrator();
        orch.shutdown();
        let s = format!("{}", FrameInspector::summary(&orch));
        assert!(s.contains("frame=0"));
        assert!(s.contains("grid=4x64"));
        assert!(s.contains("shut down"));
    }

    #[test]
    fn summary_serializes() {
        let json = serde_json::to_string(&FrameInspector::summary(&orchestrator())).unwrap();
        assert!(json.contains("\"next_parity\":\"Even\""));
    }
}
