use anyhow::{Context, bail};
use clap::{Parser, Subcommand, ValueEnum};
use pingpong_common::{DemoConfig, Parity, SlotId, SlotLayout, WorkgroupSize, dispatch_groups};
use pingpong_kernel::Orchestrator;
use pingpong_software::{DrawRecord, SoftwareBackend, SoftwareEncoder, kernels};
use pingpong_tools::FrameInspector;
use pingpong_wgpu::{FrameEncoder, GpuContext, IdentityProgram, read_buffer, sphere_positions};
use serde::Serialize;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "pingpong-cli", about = "CLI tool for pingpong orchestration")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// YAML demo configuration
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print crate info and the effective configuration
    Info,
    /// Show the dispatch grid for an item count and workgroup size
    Grid {
        #[arg(short, long, default_value = "8192")]
        items: u32,
        #[arg(short, long, default_value = "64")]
        workgroup: u32,
    },
    /// Run frames on the CPU backend and print which slot each one rendered
    Trace {
        #[arg(short, long, default_value = "8")]
        frames: u64,
        /// Frame indices with compute disabled, e.g. `--pause 2,3,4`
        #[arg(short, long, value_delimiter = ',')]
        pause: Vec<u64>,
        #[arg(short, long, default_value = "64")]
        items: u32,
        #[arg(short, long, value_enum, default_value_t = TraceKernel::Identity)]
        kernel: TraceKernel,
        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Check that an identity kernel round-trips data on the CPU and, when
    /// available, the GPU
    Verify {
        #[arg(short, long, default_value = "8200")]
        items: u32,
        #[arg(short, long, default_value = "64")]
        workgroup: u32,
        #[arg(short, long, default_value = "4")]
        frames: u32,
        /// Fail instead of skipping when no GPU adapter is available
        #[arg(long)]
        require_gpu: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum TraceKernel {
    Identity,
    Nbody,
}

#[derive(Serialize)]
struct TraceLine {
    frame: u64,
    computed: bool,
    parity: Option<Parity>,
    render_slot: SlotId,
    digest: String,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .init();

    let config = DemoConfig::load_or_default(cli.config.as_deref())
        .context("loading configuration")?;

    match cli.command {
        Commands::Info => {
            println!("pingpong-cli v{}", env!("CARGO_PKG_VERSION"));
            println!("common: {}", pingpong_common::crate_info());
            println!("kernel: {}", pingpong_kernel::crate_info());
            println!("software: {}", pingpong_software::crate_info());
            println!("wgpu: {}", pingpong_wgpu::crate_info());
            println!("tools: {}", pingpong_tools::crate_info());
            println!(
                "nbody: bodies={} workgroup={} radius={} seed={}",
                config.nbody.bodies,
                config.nbody.workgroup_size,
                config.nbody.radius,
                config.nbody.seed
            );
            println!(
                "image: {}x{} workgroup={} filter={}",
                config.image.width,
                config.image.height,
                config.image.workgroup_size,
                config.image.filter.name()
            );
        }
        Commands::Grid { items, workgroup } => {
            let wg = WorkgroupSize::new(workgroup)?;
            let layout = SlotLayout::new(items, 4)?;
            let groups = dispatch_groups(layout.item_count(), wg);
            let invocations = groups as u64 * wg.get() as u64;
            println!("items={items} workgroup={wg} groups={groups}");
            println!(
                "invocations={invocations} idle_tail={}",
                invocations - items as u64
            );
        }
        Commands::Trace {
            frames,
            pause,
            items,
            kernel,
            json,
        } => {
            let wg = config.nbody.workgroup_size;
            let lines = match kernel {
                TraceKernel::Identity => {
                    let backend = SoftwareBackend::new(kernels::identity, wg);
                    let layout = SlotLayout::of::<u32>(items)?;
                    let mut orch = Orchestrator::initialize(backend, layout, wg, |l| {
                        (0..l.item_count()).collect::<Vec<u32>>()
                    })?;
                    trace(&mut orch, frames, &pause)?
                }
                TraceKernel::Nbody => {
                    let backend = SoftwareBackend::new(kernels::nbody, wg)
                        .with_aux(vec![0u8; items as usize * 16]);
                    let layout = SlotLayout::of::<[f32; 4]>(items)?;
                    let (radius, seed) = (config.nbody.radius, config.nbody.seed);
                    let mut orch = Orchestrator::initialize(backend, layout, wg, |l| {
                        sphere_positions(l.item_count(), radius, seed)
                    })?;
                    trace(&mut orch, frames, &pause)?
                }
            };

            if json {
                println!("{}", serde_json::to_string_pretty(&lines)?);
            } else {
                for line in &lines {
                    println!(
                        "frame {:>3}  {}  render={}  {}",
                        line.frame,
                        match line.parity {
                            Some(p) => format!("compute parity={p}"),
                            None => "paused          ".to_string(),
                        },
                        line.render_slot,
                        &line.digest[..16]
                    );
                }
            }
        }
        Commands::Verify {
            items,
            workgroup,
            frames,
            require_gpu,
        } => {
            let wg = WorkgroupSize::new(workgroup)?;
            let layout = SlotLayout::of::<u32>(items)?;
            let seed: Vec<u32> = (0..items).map(|i| i.wrapping_mul(2_654_435_761)).collect();

            verify_cpu(layout, wg, frames, &seed)?;
            println!("cpu: {frames} frames, {items} items, round trip OK");

            match GpuContext::headless() {
                Ok(ctx) => {
                    verify_gpu(&ctx, layout, wg, frames, &seed)?;
                    println!("gpu: {frames} frames, {items} items, round trip OK");
                }
                Err(e) if !require_gpu => {
                    tracing::warn!("skipping GPU verification: {e}");
                    println!("gpu: skipped ({e})");
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    Ok(())
}

/// Run one frame on the CPU backend and return its draw.
fn software_frame(
    orch: &mut Orchestrator<SoftwareBackend>,
    compute: bool,
) -> anyhow::Result<DrawRecord> {
    let mut encoder = SoftwareEncoder::new();
    let mut state = orch.advance_frame(compute)?;
    if state.computes() {
        orch.record_compute_dispatch(&mut encoder, &mut state)?;
    }
    orch.record_render_draw(&mut encoder, &state)?;
    let mut draws = orch.backend_mut().submit(encoder)?;
    draws.pop().context("frame recorded no draw")
}

fn trace(
    orch: &mut Orchestrator<SoftwareBackend>,
    frames: u64,
    pause: &[u64],
) -> anyhow::Result<Vec<TraceLine>> {
    let mut lines = Vec::with_capacity(frames as usize);
    for frame in 0..frames {
        let compute = !pause.contains(&frame);
        let parity = compute.then(|| orch.parity());
        let draw = software_frame(orch, compute)?;
        lines.push(TraceLine {
            frame,
            computed: compute,
            parity,
            render_slot: draw.slot,
            digest: draw.digest(),
        });
    }
    tracing::info!(
        sequence = %FrameInspector::slot_sequence(orch.events()),
        "{}",
        FrameInspector::summary(orch)
    );
    Ok(lines)
}

fn verify_cpu(
    layout: SlotLayout,
    wg: WorkgroupSize,
    frames: u32,
    seed: &[u32],
) -> anyhow::Result<()> {
    let backend = SoftwareBackend::new(kernels::identity, wg);
    let mut orch = Orchestrator::initialize(backend, layout, wg, |_| seed.to_vec())?;
    for frame in 0..frames {
        let draw = software_frame(&mut orch, true)?;
        if draw.items::<u32>() != seed {
            bail!("cpu frame {frame}: {} did not match the seed", draw.slot);
        }
    }
    for id in SlotId::ALL {
        let damage = orch
            .slot(id)
            .and_then(|slot| orch.backend().guard_damage(slot))
            .unwrap_or(0);
        if damage != 0 {
            bail!("cpu: {damage} guard bytes overwritten past {id}");
        }
    }
    let report = orch.shutdown();
    tracing::debug!(?report, "cpu verification released");
    Ok(())
}

fn verify_gpu(
    ctx: &GpuContext,
    layout: SlotLayout,
    wg: WorkgroupSize,
    frames: u32,
    seed: &[u32],
) -> anyhow::Result<()> {
    let program = IdentityProgram::new(ctx.device().clone(), &layout, wg)?;
    let mut orch = Orchestrator::initialize(program, layout, wg, |_| seed.to_vec())?;
    for frame in 0..frames {
        let mut encoder = FrameEncoder::headless(ctx.device());
        let mut state = orch.advance_frame(true)?;
        orch.record_compute_dispatch(&mut encoder, &mut state)?;
        orch.record_render_draw(&mut encoder, &state)?;
        ctx.submit(encoder);

        let presented: Vec<u32> =
            read_buffer(ctx.device(), ctx.queue(), orch.backend().presented())?;
        if presented != seed {
            bail!("gpu frame {frame}: {} did not match the seed", state.render_slot());
        }
    }
    let report = orch.shutdown();
    tracing::debug!(?report, "gpu verification released");
    Ok(())
}
