use pingpong_common::{Parity, SlotId, SlotLayout, WorkgroupSize};
use pingpong_kernel::{Orchestrator, OrchestratorError, ReleaseReport};
use pingpong_software::{DrawRecord, SoftwareBackend, SoftwareEncoder, kernels};

fn wg(size: u32) -> WorkgroupSize {
    WorkgroupSize::new(size).unwrap()
}

fn ramp(layout: &SlotLayout) -> Vec<u32> {
    (0..layout.item_count()).map(|i| i * 3 + 1).collect()
}

fn identity_orchestrator(items: u32, workgroup: u32) -> Orchestrator<SoftwareBackend> {
    let backend = SoftwareBackend::new(kernels::identity, wg(workgroup));
    Orchestrator::initialize(backend, SlotLayout::of::<u32>(items).unwrap(), wg(workgroup), ramp)
        .unwrap()
}

/// Advance, record and submit one frame; returns the single draw it performed.
fn frame(orch: &mut Orchestrator<SoftwareBackend>, compute: bool) -> DrawRecord {
    let mut encoder = SoftwareEncoder::new();
    let mut state = orch.advance_frame(compute).unwrap();
    if state.computes() {
        orch.record_compute_dispatch(&mut encoder, &mut state).unwrap();
    }
    orch.record_render_draw(&mut encoder, &state).unwrap();
    let mut draws = orch.backend_mut().submit(encoder).unwrap();
    assert_eq!(draws.len(), 1);
    draws.remove(0)
}

#[test]
fn identity_round_trip_preserves_seed() {
    let mut orch = identity_orchestrator(256, 64);
    let seed = ramp(orch.layout());
    for _ in 0..5 {
        let draw = frame(&mut orch, true);
        assert_eq!(draw.items::<u32>(), seed);
        assert_eq!(draw.instances, 256);
    }
    let report = orch.shutdown();
    assert_eq!(report, ReleaseReport { slots: 2, binding_sets: 2 });
}

#[test]
fn render_alternates_between_slots() {
    let mut orch = identity_orchestrator(64, 64);
    let slots: Vec<SlotId> = (0..6).map(|_| frame(&mut orch, true).slot).collect();
    assert_eq!(
        slots,
        vec![SlotId::ONE, SlotId::ZERO, SlotId::ONE, SlotId::ZERO, SlotId::ONE, SlotId::ZERO]
    );
    assert_eq!(orch.backend().dispatches(), 6);
}

#[test]
fn three_paused_frames_render_the_same_contents() {
    let backend = SoftwareBackend::new(kernels::nbody, wg(64)).with_aux(vec![0u8; 128 * 16]);
    let layout = SlotLayout::of::<[f32; 4]>(128).unwrap();
    let mut orch = Orchestrator::initialize(backend, layout, wg(64), |l| {
        (0..l.item_count())
            .map(|i| {
                let t = i as f32 / l.item_count() as f32 * std::f32::consts::TAU;
                [t.cos() * 0.6, t.sin() * 0.6, 0.0, 1.0]
            })
            .collect::<Vec<_>>()
    })
    .unwrap();

    let computed = frame(&mut orch, true);
    let parity = orch.parity();
    let dispatches = orch.backend().dispatches();
    for _ in 0..3 {
        let paused = frame(&mut orch, false);
        assert_eq!(paused.slot, computed.slot);
        assert_eq!(paused.contents, computed.contents);
    }
    assert_eq!(orch.parity(), parity);
    assert_eq!(orch.backend().dispatches(), dispatches);

    let resumed = frame(&mut orch, true);
    assert_ne!(resumed.slot, computed.slot);
}

#[test]
fn nbody_step_moves_velocities() {
    let bodies = 64;
    let backend = SoftwareBackend::new(kernels::nbody, wg(64)).with_aux(vec![0u8; bodies * 16]);
    let layout = SlotLayout::of::<[f32; 4]>(bodies as u32).unwrap();
    let mut orch = Orchestrator::initialize(backend, layout, wg(64), |l| {
        (0..l.item_count())
            .map(|i| [i as f32 * 0.01 - 0.3, 0.1, -0.2, 1.0])
            .collect::<Vec<_>>()
    })
    .unwrap();
    frame(&mut orch, true);
    let moving = orch
        .backend()
        .aux()
        .chunks_exact(16)
        .map(bytemuck::pod_read_unaligned::<[f32; 4]>)
        .filter(|v| v[0] != 0.0)
        .count();
    assert!(moving > 0);
}

#[test]
fn partial_tail_group_is_dispatched_but_guarded() {
    let mut orch = identity_orchestrator(8200, 64);
    assert_eq!(orch.dispatch_groups(), 129);
    let seed = ramp(orch.layout());

    let draw = frame(&mut orch, true);
    assert_eq!(draw.items::<u32>(), seed);
    let written = orch.slot(SlotId::ONE).unwrap();
    assert_eq!(orch.backend().guard_damage(written), Some(0));
}

#[test]
fn exact_multiple_dispatches_128_groups() {
    let orch = identity_orchestrator(8192, 64);
    assert_eq!(orch.dispatch_groups(), 128);
}

#[test]
fn unchecked_kernel_overruns_into_guard() {
    let backend = SoftwareBackend::new(kernels::identity_unchecked, wg(64));
    let mut orch =
        Orchestrator::initialize(backend, SlotLayout::of::<u32>(8200).unwrap(), wg(64), ramp)
            .unwrap();
    frame(&mut orch, true);
    let written = orch.slot(SlotId::ONE).unwrap();
    let damage = orch.backend().guard_damage(written).unwrap();
    assert!(damage > 0, "tail invocations should have written past the slot");
}

#[test]
fn shutdown_counts_do_not_depend_on_frames_run() {
    for frames in [0usize, 1, 10] {
        let mut orch = identity_orchestrator(64, 64);
        for i in 0..frames {
            frame(&mut orch, i % 4 != 3);
        }
        assert_eq!(orch.shutdown(), ReleaseReport { slots: 2, binding_sets: 2 });
        assert_eq!(orch.shutdown(), ReleaseReport::default());
        let counters = orch.backend().counters();
        assert_eq!(counters.slots_released, 2);
        assert_eq!(counters.binding_sets_released, 2);
        assert_eq!(counters.live_slots(), 0);
        assert_eq!(counters.live_binding_sets(), 0);
    }
}

#[test]
fn allocation_failure_rolls_back() {
    let backend = SoftwareBackend::new(kernels::identity, wg(64)).fail_binding_set(Parity::Odd);
    let err = Orchestrator::initialize(backend, SlotLayout::of::<u32>(64).unwrap(), wg(64), ramp)
        .err()
        .unwrap();
    assert!(matches!(err, OrchestratorError::ResourceAllocation(_)));

    let backend = SoftwareBackend::new(kernels::identity, wg(64)).fail_slot(SlotId::ONE);
    let err = Orchestrator::initialize(backend, SlotLayout::of::<u32>(64).unwrap(), wg(64), ramp)
        .err()
        .unwrap();
    assert!(err.to_string().contains("slot1"));
}

#[test]
fn backend_built_for_another_workgroup_is_rejected() {
    let backend = SoftwareBackend::new(kernels::identity, wg(64));
    let layout = SlotLayout::of::<u32>(8192).unwrap();
    let err = Orchestrator::initialize(backend, layout, wg(128), ramp)
        .err()
        .unwrap();
    assert!(matches!(err, OrchestratorError::InvalidState(_)));
}

#[test]
fn each_computing_frame_consumes_the_previous_output() {
    let increment = |inv: &mut pingpong_software::Invocation<'_>| {
        if inv.in_bounds() {
            let id = inv.global_id();
            let value: u32 = inv.read_input(id);
            inv.write_output(id, value + 1);
        }
    };
    let backend = SoftwareBackend::new(increment, wg(64));
    let mut orch =
        Orchestrator::initialize(backend, SlotLayout::of::<u32>(100).unwrap(), wg(64), ramp).unwrap();
    let seed = ramp(orch.layout());

    for n in 1..=5u32 {
        let draw = frame(&mut orch, true);
        let expected: Vec<u32> = seed.iter().map(|v| v + n).collect();
        assert_eq!(draw.items::<u32>(), expected, "after {n} computing frames");
    }
    // Pausing holds the accumulated result.
    let held = frame(&mut orch, false);
    assert_eq!(held.items::<u32>()[0], seed[0] + 5);
    let next = frame(&mut orch, true);
    assert_eq!(next.items::<u32>()[0], seed[0] + 6);
}

#[test]
fn ordering_violations_leave_encoder_untouched() {
    let mut orch = identity_orchestrator(64, 64);
    let mut encoder = SoftwareEncoder::new();

    let state = orch.advance_frame(true).unwrap();
    assert!(matches!(
        orch.record_render_draw(&mut encoder, &state),
        Err(OrchestratorError::InvalidState(_))
    ));

    let mut paused = orch.advance_frame(false).unwrap();
    assert!(matches!(
        orch.record_compute_dispatch(&mut encoder, &mut paused),
        Err(OrchestratorError::InvalidState(_))
    ));
    assert!(encoder.is_empty());
}

#[test]
fn independent_orchestrators_do_not_interfere() {
    let mut a = identity_orchestrator(64, 64);
    let mut b = identity_orchestrator(128, 32);
    frame(&mut a, true);
    frame(&mut b, false);
    frame(&mut a, true);
    assert_eq!(a.parity(), Parity::Even);
    assert_eq!(b.parity(), Parity::Even);
    assert_eq!(b.last_output(), SlotId::ZERO);
    assert_eq!(a.stats().computed, 2);
    assert_eq!(b.stats().paused, 1);
}

#[test]
fn frame_state_is_bound_to_its_orchestrator() {
    let mut a = identity_orchestrator(64, 64);
    let mut b = identity_orchestrator(64, 64);
    let mut from_a = a.advance_frame(true).unwrap();
    let _from_b = b.advance_frame(true).unwrap();

    let mut encoder = SoftwareEncoder::new();
    assert!(matches!(
        b.record_compute_dispatch(&mut encoder, &mut from_a),
        Err(OrchestratorError::InvalidState(_))
    ));
    assert!(encoder.is_empty());
    assert_eq!(b.backend().dispatches(), 0);
}
