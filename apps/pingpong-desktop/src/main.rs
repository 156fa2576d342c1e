use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use egui::Context as EguiContext;
use pingpong_common::{DemoConfig, ImageFilter, WorkgroupSize};
use pingpong_kernel::{Backend, FrameState, Orchestrator, OrchestratorError, ReleaseReport};
use pingpong_tools::{FpsCounter, FrameInspector, FrameSummary, FrameTimer};
use pingpong_wgpu::{
    Camera, FrameEncoder, GpuContext, ImageFilterProgram, NBodyProgram, checkerboard,
    sphere_positions,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing_subscriber::EnvFilter;
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, KeyEvent, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{Window, WindowId};

#[derive(Parser)]
#[command(name = "pingpong-desktop", about = "Double-buffered compute/render demos")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Which demo to run
    #[arg(long, value_enum, default_value_t = Demo::Nbody)]
    demo: Demo,

    /// YAML demo configuration
    #[arg(long)]
    config: Option<PathBuf>,

    /// Number of bodies (N-body demo)
    #[arg(long)]
    bodies: Option<u32>,

    /// Compute workgroup size for the selected demo
    #[arg(long)]
    workgroup: Option<u32>,

    /// Initial filter (image demo): blur, emboss, edgedetect or sharpen
    #[arg(long)]
    filter: Option<ImageFilter>,

    /// Start with compute disabled
    #[arg(long)]
    paused: bool,
}

impl Cli {
    /// Configuration file values with command-line overrides applied.
    fn demo_config(&self) -> Result<DemoConfig> {
        let mut config = DemoConfig::load_or_default(self.config.as_deref())
            .context("loading configuration")?;
        if let Some(bodies) = self.bodies {
            config.nbody.bodies = bodies;
        }
        if let Some(size) = self.workgroup {
            let wg = WorkgroupSize::new(size)?;
            config.nbody.workgroup_size = wg;
            config.image.workgroup_size = wg;
        }
        if let Some(filter) = self.filter {
            config.image.filter = filter;
        }
        config.start_paused |= self.paused;
        config.validate()?;
        Ok(config)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Demo {
    Nbody,
    Image,
}

/// Per-demo orchestrator.
enum Scene {
    NBody(Orchestrator<NBodyProgram>),
    Image(Orchestrator<ImageFilterProgram>),
}

impl Scene {
    fn record(
        &mut self,
        frame: &mut FrameEncoder,
        compute: bool,
    ) -> Result<FrameState, OrchestratorError> {
        match self {
            Scene::NBody(orch) => record_frame(orch, frame, compute),
            Scene::Image(orch) => record_frame(orch, frame, compute),
        }
    }

    fn summary(&self) -> FrameSummary {
        match self {
            Scene::NBody(orch) => FrameInspector::summary(orch),
            Scene::Image(orch) => FrameInspector::summary(orch),
        }
    }

    fn shutdown(&mut self) -> ReleaseReport {
        match self {
            Scene::NBody(orch) => orch.shutdown(),
            Scene::Image(orch) => orch.shutdown(),
        }
    }
}

/// Advance one frame and record its compute dispatch (unless paused) and draw.
fn record_frame<B>(
    orch: &mut Orchestrator<B>,
    frame: &mut FrameEncoder,
    compute: bool,
) -> Result<FrameState, OrchestratorError>
where
    B: Backend<Encoder = FrameEncoder>,
{
    let mut state = orch.advance_frame(compute)?;
    if state.computes() {
        orch.record_compute_dispatch(frame, &mut state)?;
    }
    orch.record_render_draw(frame, &state)?;
    Ok(state)
}

/// Application state.
struct AppState {
    demo: Demo,
    config: DemoConfig,
    paused: bool,
    show_overlay: bool,
    camera: Camera,
    camera_dirty: bool,
    filter: ImageFilter,
    fps: FpsCounter,
    timer: FrameTimer,
    last_frame: Instant,
}

impl AppState {
    fn new(demo: Demo, config: DemoConfig) -> Self {
        let now = Instant::now();
        Self {
            demo,
            paused: config.start_paused,
            show_overlay: true,
            camera: Camera::with_eye_z(config.nbody.eye_z),
            camera_dirty: true,
            filter: config.image.filter,
            config,
            fps: FpsCounter::new(now),
            timer: FrameTimer::new(240),
            last_frame: now,
        }
    }

    fn tick(&mut self) {
        let now = Instant::now();
        self.timer.record(now - self.last_frame);
        self.last_frame = now;
        self.fps.tick(now);
    }

    fn toggle_pause(&mut self) {
        self.paused = !self.paused;
        tracing::info!(paused = self.paused, "compute toggled");
    }

    fn nudge_camera(&mut self, steps: f32) {
        if self.camera.nudge(steps) {
            self.camera_dirty = true;
            tracing::debug!(eye_z = self.camera.eye.z, "camera moved");
        }
    }

    fn handle_key(&mut self, key: KeyCode) {
        match key {
            KeyCode::KeyP | KeyCode::Space => self.toggle_pause(),
            KeyCode::ArrowUp if self.demo == Demo::Nbody => self.nudge_camera(1.0),
            KeyCode::ArrowDown if self.demo == Demo::Nbody => self.nudge_camera(-1.0),
            KeyCode::Digit1 => self.filter = ImageFilter::Blur,
            KeyCode::Digit2 => self.filter = ImageFilter::Emboss,
            KeyCode::Digit3 => self.filter = ImageFilter::EdgeDetect,
            KeyCode::Digit4 => self.filter = ImageFilter::Sharpen,
            KeyCode::F1 => self.show_overlay = !self.show_overlay,
            _ => {}
        }
    }

    fn draw_ui(&mut self, ctx: &EguiContext, summary: &FrameSummary) {
        if !self.show_overlay {
            return;
        }

        egui::Window::new("pingpong")
            .default_pos([12.0, 12.0])
            .resizable(false)
            .show(ctx, |ui| {
                ui.label(format!(
                    "{:.1} fps  ({:.2} ms avg, {:.2} ms max)",
                    self.fps.fps(),
                    self.timer.average().as_secs_f64() * 1000.0,
                    self.timer.max().as_secs_f64() * 1000.0
                ));
                ui.separator();
                ui.label(format!("Frame: {}", summary.frame));
                ui.label(format!(
                    "Computed: {}  Paused: {}",
                    summary.computed, summary.paused
                ));
                ui.label(format!(
                    "Next parity: {}  Last output: {}",
                    summary.next_parity, summary.last_output
                ));
                ui.label(format!(
                    "Grid: {} x {} for {} items",
                    summary.groups, summary.workgroup, summary.items
                ));
                let label = if self.paused { "Resume (P)" } else { "Pause (P)" };
                if ui.button(label).clicked() {
                    self.toggle_pause();
                }
                ui.separator();

                match self.demo {
                    Demo::Nbody => {
                        ui.label(format!("Eye z: {:.3}", self.camera.eye.z));
                        ui.horizontal(|ui| {
                            if ui.button("Closer (Up)").clicked() {
                                self.nudge_camera(1.0);
                            }
                            if ui.button("Farther (Down)").clicked() {
                                self.nudge_camera(-1.0);
                            }
                        });
                    }
                    Demo::Image => {
                        ui.horizontal(|ui| {
                            for (i, filter) in ImageFilter::ALL.into_iter().enumerate() {
                                let text = format!("{} ({})", filter.name(), i + 1);
                                if ui.selectable_label(self.filter == filter, text).clicked() {
                                    self.filter = filter;
                                }
                            }
                        });
                    }
                }

                ui.separator();
                ui.small("F1: Toggle Overlay | Esc: Quit");
            });
    }
}

/// Window, surface and everything created against its device.
struct Gpu {
    window: Arc<Window>,
    surface: wgpu::Surface<'static>,
    ctx: GpuContext,
    config: wgpu::SurfaceConfiguration,
    scene: Scene,
    egui_winit: egui_winit::State,
    egui_renderer: egui_wgpu::Renderer,
}

impl Gpu {
    fn new(
        event_loop: &ActiveEventLoop,
        state: &mut AppState,
        egui_ctx: &EguiContext,
    ) -> Result<Self> {
        let (title, size) = match state.demo {
            Demo::Nbody => ("pingpong: N-body", PhysicalSize::new(1280u32, 720)),
            Demo::Image => ("pingpong: image filter", PhysicalSize::new(1024u32, 512)),
        };
        let attrs = Window::default_attributes()
            .with_title(title)
            .with_inner_size(size);
        let window = Arc::new(event_loop.create_window(attrs)?);

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });
        let surface = instance.create_surface(window.clone())?;
        let ctx = GpuContext::new(&instance, Some(&surface))?;

        let size = window.inner_size();
        let surface_caps = surface.get_capabilities(ctx.adapter());
        let surface_format = surface_caps
            .formats
            .iter()
            .find(|f| f.is_srgb())
            .or_else(|| surface_caps.formats.first())
            .copied()
            .context("surface reports no supported formats")?;

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: wgpu::PresentMode::AutoVsync,
            alpha_mode: surface_caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(ctx.device(), &config);
        state.camera.aspect = config.width as f32 / config.height as f32;

        let scene = match state.demo {
            Demo::Nbody => {
                let cfg = &state.config.nbody;
                let program = NBodyProgram::new(
                    ctx.device().clone(),
                    ctx.queue().clone(),
                    cfg.bodies,
                    cfg.workgroup_size,
                    surface_format,
                )?;
                program.set_view_projection(state.camera.view_projection());
                state.camera_dirty = false;
                let layout = program.layout()?;
                let (radius, seed) = (cfg.radius, cfg.seed);
                Scene::NBody(Orchestrator::initialize(
                    program,
                    layout,
                    cfg.workgroup_size,
                    |l| sphere_positions(l.item_count(), radius, seed),
                )?)
            }
            Demo::Image => {
                let cfg = &state.config.image;
                let source = checkerboard(cfg.width, cfg.height, cfg.tile);
                let program = ImageFilterProgram::new(
                    ctx.device().clone(),
                    cfg.width,
                    cfg.height,
                    &source,
                    cfg.filter,
                    cfg.workgroup_size,
                    surface_format,
                )?;
                let layout = program.layout()?;
                Scene::Image(Orchestrator::initialize(
                    program,
                    layout,
                    cfg.workgroup_size,
                    move |_| source,
                )?)
            }
        };

        let egui_winit = egui_winit::State::new(
            egui_ctx.clone(),
            egui::ViewportId::ROOT,
            &window,
            Some(window.scale_factor() as f32),
            None,
            None,
        );
        let egui_renderer =
            egui_wgpu::Renderer::new(ctx.device(), surface_format, None, 1, false);

        Ok(Self {
            window,
            surface,
            ctx,
            config,
            scene,
            egui_winit,
            egui_renderer,
        })
    }

    fn resize(&mut self, state: &mut AppState, width: u32, height: u32) {
        self.config.width = width.max(1);
        self.config.height = height.max(1);
        self.surface.configure(self.ctx.device(), &self.config);
        state.camera.aspect = self.config.width as f32 / self.config.height as f32;
        state.camera_dirty = true;
    }

    /// Push camera and filter changes into the programs before a frame is recorded.
    fn apply(&mut self, state: &mut AppState) {
        match &mut self.scene {
            Scene::NBody(orch) => {
                if state.camera_dirty {
                    orch.backend()
                        .set_view_projection(state.camera.view_projection());
                    state.camera_dirty = false;
                }
            }
            Scene::Image(orch) => {
                if orch.backend().filter() != state.filter {
                    orch.backend_mut().set_filter(state.filter);
                }
            }
        }
    }
}

struct GpuApp {
    state: AppState,
    gpu: Option<Gpu>,
    egui_ctx: EguiContext,
    failure: Option<anyhow::Error>,
}

impl GpuApp {
    fn new(demo: Demo, config: DemoConfig) -> Self {
        Self {
            state: AppState::new(demo, config),
            gpu: None,
            egui_ctx: EguiContext::default(),
            failure: None,
        }
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, error: anyhow::Error) {
        tracing::error!("{error:#}");
        self.failure = Some(error);
        event_loop.exit();
    }

    fn shutdown(&mut self) {
        if let Some(gpu) = &mut self.gpu {
            let report = gpu.scene.shutdown();
            tracing::info!(
                slots = report.slots,
                binding_sets = report.binding_sets,
                "resources released"
            );
            tracing::info!(
                "frame time min/avg/max: {:?} / {:?} / {:?}",
                self.state.timer.min(),
                self.state.timer.average(),
                self.state.timer.max()
            );
        }
    }

    fn redraw(&mut self, event_loop: &ActiveEventLoop) {
        let Some(gpu) = &mut self.gpu else {
            return;
        };
        self.state.tick();

        let output = match gpu.surface.get_current_texture() {
            Ok(t) => t,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                gpu.surface.configure(gpu.ctx.device(), &gpu.config);
                return;
            }
            Err(e) => {
                tracing::error!("surface error: {e}");
                return;
            }
        };
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let mut frame = FrameEncoder::new(gpu.ctx.device(), view);

        gpu.apply(&mut self.state);
        let computed = !self.state.paused;
        match gpu.scene.record(&mut frame, computed) {
            Ok(fs) => tracing::trace!(
                frame = fs.frame(),
                render_slot = %fs.render_slot(),
                "frame recorded"
            ),
            Err(e) => {
                let error = anyhow::Error::new(e).context("recording frame");
                self.fail(event_loop, error);
                return;
            }
        }

        let summary = gpu.scene.summary();
        let raw_input = gpu.egui_winit.take_egui_input(&gpu.window);
        let full_output = self.egui_ctx.run(raw_input, |ctx| {
            self.state.draw_ui(ctx, &summary);
        });
        gpu.egui_winit
            .handle_platform_output(&gpu.window, full_output.platform_output);

        let paint_jobs = self
            .egui_ctx
            .tessellate(full_output.shapes, full_output.pixels_per_point);
        let screen_descriptor = egui_wgpu::ScreenDescriptor {
            size_in_pixels: [gpu.config.width, gpu.config.height],
            pixels_per_point: full_output.pixels_per_point,
        };

        let (device, queue) = (gpu.ctx.device(), gpu.ctx.queue());
        for (id, image_delta) in &full_output.textures_delta.set {
            gpu.egui_renderer
                .update_texture(device, queue, *id, image_delta);
        }
        {
            let (encoder, target) = frame.parts_mut();
            gpu.egui_renderer.update_buffers(
                device,
                queue,
                encoder,
                &paint_jobs,
                &screen_descriptor,
            );
            if let Some(view) = target {
                let mut pass = encoder
                    .begin_render_pass(&wgpu::RenderPassDescriptor {
                        label: Some("egui_pass"),
                        color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                            view,
                            resolve_target: None,
                            ops: wgpu::Operations {
                                load: wgpu::LoadOp::Load,
                                store: wgpu::StoreOp::Store,
                            },
                        })],
                        depth_stencil_attachment: None,
                        ..Default::default()
                    })
                    .forget_lifetime();
                gpu.egui_renderer
                    .render(&mut pass, &paint_jobs, &screen_descriptor);
            }
        }

        // Compute, draw and overlay go out in one submission.
        gpu.ctx.submit(frame);
        for id in &full_output.textures_delta.free {
            gpu.egui_renderer.free_texture(id);
        }

        output.present();
        gpu.window.request_redraw();
    }
}

impl ApplicationHandler for GpuApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.gpu.is_some() {
            return;
        }
        match Gpu::new(event_loop, &mut self.state, &self.egui_ctx) {
            Ok(gpu) => self.gpu = Some(gpu),
            Err(e) => self.fail(event_loop, e.context("initializing GPU")),
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        if let Some(gpu) = &mut self.gpu {
            let response = gpu.egui_winit.on_window_event(&gpu.window, &event);
            if response.consumed {
                return;
            }
        }

        match event {
            WindowEvent::CloseRequested => {
                self.shutdown();
                event_loop.exit();
            }
            WindowEvent::Resized(new_size) => {
                if let Some(gpu) = &mut self.gpu {
                    gpu.resize(&mut self.state, new_size.width, new_size.height);
                }
            }
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(key),
                        state: ElementState::Pressed,
                        ..
                    },
                ..
            } => {
                if key == KeyCode::Escape {
                    self.shutdown();
                    event_loop.exit();
                } else {
                    self.state.handle_key(key);
                }
            }
            WindowEvent::RedrawRequested => self.redraw(event_loop),
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(gpu) = &self.gpu {
            gpu.window.request_redraw();
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    let config = cli.demo_config()?;
    tracing::info!(demo = ?cli.demo, paused = config.start_paused, "pingpong-desktop starting");

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = GpuApp::new(cli.demo, config);
    event_loop.run_app(&mut app)?;

    match app.failure.take() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
