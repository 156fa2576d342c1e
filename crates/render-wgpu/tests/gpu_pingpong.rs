//! Runs the programs on a real adapter. Each test returns early when the
//! machine has none.

use pingpong_common::{ImageFilter, SlotId, SlotLayout, WorkgroupSize};
use pingpong_kernel::{BackendError, Orchestrator, OrchestratorError, ReleaseReport};
use pingpong_wgpu::{
    FrameEncoder, GpuContext, IdentityProgram, ImageFilterProgram, NBodyProgram, pack_rgba,
    read_buffer, sphere_positions,
};

const TARGET_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

fn context() -> Option<GpuContext> {
    match GpuContext::headless() {
        Ok(ctx) => Some(ctx),
        Err(e) => {
            eprintln!("skipping GPU test: {e}");
            None
        }
    }
}

fn offscreen_target(device: &wgpu::Device, width: u32, height: u32) -> wgpu::TextureView {
    device
        .create_texture(&wgpu::TextureDescriptor {
            label: Some("test_target"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: TARGET_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        })
        .create_view(&Default::default())
}

fn identity_orchestrator(ctx: &GpuContext, items: u32) -> Orchestrator<IdentityProgram> {
    let layout = SlotLayout::of::<u32>(items).unwrap();
    let wg = WorkgroupSize::default();
    let program = IdentityProgram::new(ctx.device().clone(), &layout, wg).unwrap();
    Orchestrator::initialize(program, layout, wg, |l| {
        (0..l.item_count()).map(|i| i ^ 0x5a5a).collect::<Vec<u32>>()
    })
    .unwrap()
}

fn run_frame<F>(ctx: &GpuContext, orch: &mut Orchestrator<F>, frame: FrameEncoder, compute: bool)
where
    F: pingpong_kernel::Backend<Encoder = FrameEncoder>,
{
    let mut frame = frame;
    let mut state = orch.advance_frame(compute).unwrap();
    if state.computes() {
        orch.record_compute_dispatch(&mut frame, &mut state).unwrap();
    }
    orch.record_render_draw(&mut frame, &state).unwrap();
    ctx.submit(frame);
}

#[test]
fn identity_round_trip_with_partial_tail_group() {
    let Some(ctx) = context() else { return };
    let mut orch = identity_orchestrator(&ctx, 8200);
    assert_eq!(orch.dispatch_groups(), 129);
    let seed: Vec<u32> = (0..8200).map(|i| i ^ 0x5a5a).collect();

    for _ in 0..4 {
        run_frame(&ctx, &mut orch, FrameEncoder::headless(ctx.device()), true);
        let presented: Vec<u32> =
            read_buffer(ctx.device(), ctx.queue(), orch.backend().presented()).unwrap();
        assert_eq!(presented, seed);
    }
    assert_eq!(orch.shutdown(), ReleaseReport { slots: 2, binding_sets: 2 });
}

#[test]
fn paused_frames_present_the_last_output() {
    let Some(ctx) = context() else { return };
    let mut orch = identity_orchestrator(&ctx, 256);
    run_frame(&ctx, &mut orch, FrameEncoder::headless(ctx.device()), true);
    let written = orch.last_output();
    for _ in 0..3 {
        run_frame(&ctx, &mut orch, FrameEncoder::headless(ctx.device()), false);
        assert_eq!(orch.last_output(), written);
    }
    let slot = orch.slot(written).unwrap();
    let items: Vec<u32> = read_buffer(ctx.device(), ctx.queue(), slot.buffer()).unwrap();
    assert_eq!(items[1], 1 ^ 0x5a5a);
}

#[test]
fn nbody_step_updates_velocities() {
    let Some(ctx) = context() else { return };
    let bodies = 256;
    let wg = WorkgroupSize::default();
    let program =
        NBodyProgram::new(ctx.device().clone(), ctx.queue().clone(), bodies, wg, TARGET_FORMAT)
            .unwrap();
    let layout = program.layout().unwrap();
    let mut orch =
        Orchestrator::initialize(program, layout, wg, |l| sphere_positions(l.item_count(), 0.6, 3))
            .unwrap();

    let target = offscreen_target(ctx.device(), 64, 64);
    run_frame(&ctx, &mut orch, FrameEncoder::new(ctx.device(), target), true);

    let velocities: Vec<[f32; 4]> =
        read_buffer(ctx.device(), ctx.queue(), orch.backend().velocities()).unwrap();
    assert!(velocities.iter().any(|v| v[0] != 0.0 || v[1] != 0.0 || v[2] != 0.0));

    let positions: Vec<[f32; 4]> = read_buffer(
        ctx.device(),
        ctx.queue(),
        orch.slot(SlotId::ONE).unwrap().buffer(),
    )
    .unwrap();
    assert!(positions.iter().all(|p| p[3] == 1.0));
}

#[test]
fn blur_keeps_a_flat_image_flat() {
    let Some(ctx) = context() else { return };
    let (width, height) = (32, 16);
    let color = pack_rgba(120, 60, 200, 255);
    let source = vec![color; (width * height) as usize];
    let wg = WorkgroupSize::default();
    let program = ImageFilterProgram::new(
        ctx.device().clone(),
        width,
        height,
        &source,
        ImageFilter::Blur,
        wg,
        TARGET_FORMAT,
    )
    .unwrap();
    let layout = program.layout().unwrap();
    let seed = source.clone();
    let mut orch = Orchestrator::initialize(program, layout, wg, move |_| seed).unwrap();

    let target = offscreen_target(ctx.device(), 64, 32);
    run_frame(&ctx, &mut orch, FrameEncoder::new(ctx.device(), target), true);

    let pixels: Vec<u32> = read_buffer(
        ctx.device(),
        ctx.queue(),
        orch.slot(SlotId::ONE).unwrap().buffer(),
    )
    .unwrap();
    for p in pixels {
        let [r, g, b, a] = p.to_le_bytes();
        assert!(r.abs_diff(120) <= 1 && g.abs_diff(60) <= 1 && b.abs_diff(200) <= 1);
        assert_eq!(a, 255);
    }
}

#[test]
fn switching_filters_keeps_binding_sets() {
    let Some(ctx) = context() else { return };
    let wg = WorkgroupSize::default();
    let source = pingpong_wgpu::checkerboard(16, 16, 4);
    let program = ImageFilterProgram::new(
        ctx.device().clone(),
        16,
        16,
        &source,
        ImageFilter::Emboss,
        wg,
        TARGET_FORMAT,
    )
    .unwrap();
    let layout = program.layout().unwrap();
    let mut orch = Orchestrator::initialize(program, layout, wg, move |_| source).unwrap();

    for filter in ImageFilter::ALL {
        orch.backend_mut().set_filter(filter);
        let target = offscreen_target(ctx.device(), 32, 16);
        run_frame(&ctx, &mut orch, FrameEncoder::new(ctx.device(), target), true);
    }
    assert_eq!(orch.stats().computed, 4);
    assert_eq!(orch.shutdown(), ReleaseReport { slots: 2, binding_sets: 2 });
}

#[test]
fn nbody_rejects_a_slot_sized_for_other_bodies() {
    let Some(ctx) = context() else { return };
    let wg = WorkgroupSize::default();
    let program =
        NBodyProgram::new(ctx.device().clone(), ctx.queue().clone(), 256, wg, TARGET_FORMAT)
            .unwrap();
    let layout = SlotLayout::of::<[f32; 4]>(512).unwrap();
    let err = Orchestrator::initialize(program, layout, wg, |l| {
        sphere_positions(l.item_count(), 0.6, 3)
    })
    .err()
    .unwrap();
    assert!(matches!(
        err,
        OrchestratorError::ResourceAllocation(BackendError::Validation { .. })
    ));
}

#[test]
fn image_size_past_slot_indexing_is_rejected() {
    let Some(ctx) = context() else { return };
    let err = ImageFilterProgram::new(
        ctx.device().clone(),
        70_000,
        70_000,
        &[],
        ImageFilter::Blur,
        WorkgroupSize::default(),
        TARGET_FORMAT,
    )
    .err()
    .unwrap();
    assert!(err.to_string().contains("70000x70000"));
}

#[test]
fn dropping_programs_after_submit_leaves_device_clean() {
    let Some(ctx) = context() else { return };
    let wg = WorkgroupSize::default();
    ctx.device().push_error_scope(wgpu::ErrorFilter::Validation);

    let mut orch = identity_orchestrator(&ctx, 256);
    run_frame(&ctx, &mut orch, FrameEncoder::headless(ctx.device()), true);
    drop(orch);

    let program =
        NBodyProgram::new(ctx.device().clone(), ctx.queue().clone(), 128, wg, TARGET_FORMAT)
            .unwrap();
    let layout = program.layout().unwrap();
    let mut orch =
        Orchestrator::initialize(program, layout, wg, |l| sphere_positions(l.item_count(), 0.6, 5))
            .unwrap();
    let target = offscreen_target(ctx.device(), 32, 32);
    run_frame(&ctx, &mut orch, FrameEncoder::new(ctx.device(), target), true);
    drop(orch);

    let _ = ctx.device().poll(wgpu::Maintain::Wait);
    let error = pollster::block_on(ctx.device().pop_error_scope());
    assert!(error.is_none(), "{error:?}");
}
