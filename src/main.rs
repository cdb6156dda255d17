//! Camquad: live camera preview CLI.

use anyhow::Result;
use camquad::capture::{CameraFacing, CaptureBackend, NokhwaCapture, StartOutcome};
use camquad::config::{ConfigWatcher, Overrides, Settings};
use camquad::error::SetupError;
use camquad::geometry::Rotation;
use camquad::mailbox::{Backpressure, Notifier};
use camquad::output::{OffscreenOutput, RenderTarget, WindowOutput};
use camquad::render::DrawOutcome;
use camquad::shader::GpuContext;
use camquad::utils::RateCounter;
use camquad::view::CameraView;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop, EventLoopProxy};
use winit::window::{Window, WindowAttributes, WindowId};

/// How often the config file is checked while idle.
const CONFIG_POLL: Duration = Duration::from_millis(250);

/// Where the preview is drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputMode {
    /// Display in a window (default)
    Window,
    /// Render offscreen until Ctrl-C
    Headless,
}

/// Live camera preview drawn as a textured quad.
#[derive(Parser, Debug)]
#[command(name = "camquad")]
#[command(about = "Show a live webcam preview rendered with wgpu")]
struct Args {
    /// YAML settings file (watched for changes)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Camera device index (overrides --facing)
    #[arg(short, long)]
    input: Option<u32>,

    /// Camera facing: front, back or any
    #[arg(long)]
    facing: Option<CameraFacing>,

    /// Frame width
    #[arg(long)]
    width: Option<u32>,

    /// Frame height
    #[arg(long)]
    height: Option<u32>,

    /// Target frames per second
    #[arg(long)]
    fps: Option<u32>,

    /// Clockwise rotation in degrees: 0, 90, 180 or 270
    #[arg(long)]
    rotation: Option<Rotation>,

    /// Mirror the image horizontally (default true)
    #[arg(long)]
    mirror: Option<bool>,

    /// Flip the image vertically
    #[arg(long)]
    flip: bool,

    /// What to do with frames arriving while one is drawn:
    /// drop-incoming, replace-pending or wait-for-draw
    #[arg(long)]
    backpressure: Option<Backpressure>,

    /// Path to a GLSL or WGSL fragment shader
    #[arg(short, long)]
    shader: Option<PathBuf>,

    /// List available cameras and exit
    #[arg(long)]
    list_devices: bool,

    /// Output mode: window or headless
    #[arg(long, value_enum, default_value = "window")]
    output: OutputMode,
}

impl Args {
    fn overrides(&self) -> Overrides {
        Overrides {
            device_index: self.input,
            facing: self.facing,
            width: self.width,
            height: self.height,
            fps: self.fps,
            rotation: self.rotation,
            mirror: self.mirror,
            flip: self.flip,
            backpressure: self.backpressure,
            shader: self.shader.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum UserEvent {
    /// The capture thread put a frame in the mailbox
    FrameReady,
}

/// Application state for the event loop.
struct CamquadApp {
    settings: Settings,
    proxy: EventLoopProxy<UserEvent>,
    watcher: Option<ConfigWatcher>,
    window: Option<Arc<Window>>,
    view: Option<CameraView<WindowOutput>>,
}

impl CamquadApp {
    fn new(settings: Settings, watcher: Option<ConfigWatcher>, proxy: EventLoopProxy<UserEvent>) -> Self {
        Self {
            settings,
            proxy,
            watcher,
            window: None,
            view: None,
        }
    }

    fn notifier(&self) -> Notifier {
        // The proxy is Send but not necessarily Sync on every platform
        let proxy = Mutex::new(self.proxy.clone());
        Arc::new(move || {
            if let Ok(proxy) = proxy.lock() {
                let _ = proxy.send_event(UserEvent::FrameReady);
            }
        })
    }

    fn initialize(&mut self, window: Arc<Window>) -> Result<(), SetupError> {
        let size = window.inner_size();
        let mut view = CameraView::new(self.settings.clone());
        view.initialize(|| {
            let (gpu, surface) = GpuContext::for_window(window)?;
            let target = WindowOutput::new(&gpu, surface, size.width, size.height);
            Ok((gpu, target))
        })?;

        match view.start::<NokhwaCapture>(Some(self.notifier()))? {
            StartOutcome::Streaming { width, height } => {
                info!("Streaming camera at {}x{}", width, height)
            }
            StartOutcome::NoDevice => warn!("No camera available, showing an empty preview"),
        }
        self.view = Some(view);
        Ok(())
    }
}

impl ApplicationHandler<UserEvent> for CamquadApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let camera = &self.settings.camera;
        let window_attrs = WindowAttributes::default()
            .with_title("Camquad")
            .with_inner_size(PhysicalSize::new(camera.width, camera.height));

        let window = match event_loop.create_window(window_attrs) {
            Ok(window) => Arc::new(window),
            Err(e) => {
                error!("Failed to create window: {}", e);
                event_loop.exit();
                return;
            }
        };
        self.window = Some(window.clone());
        info!("Window created successfully");

        if let Err(e) = self.initialize(window.clone()) {
            error!("Initialization error: {}", e);
            event_loop.exit();
            return;
        }
        window.request_redraw();
    }

    fn user_event(&mut self, _event_loop: &ActiveEventLoop, event: UserEvent) {
        match event {
            UserEvent::FrameReady => {
                if let Some(window) = &self.window {
                    window.request_redraw();
                }
            }
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::CloseRequested => {
                info!("Window closed");
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                if let Some(view) = &mut self.view {
                    view.layout(size.width, size.height);
                }
                if let Some(window) = &self.window {
                    window.request_redraw();
                }
            }
            WindowEvent::RedrawRequested => {
                if let Some(view) = &mut self.view {
                    log_draw(view.redraw());
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        let Some(watcher) = &mut self.watcher else {
            return;
        };
        if let (Some(view), Some(window)) = (&mut self.view, &self.window) {
            if apply_config_changes(watcher, view) {
                window.request_redraw();
            }
        }
        event_loop.set_control_flow(ControlFlow::WaitUntil(Instant::now() + CONFIG_POLL));
    }
}

fn log_draw(result: Result<DrawOutcome, camquad::error::FrameError>) {
    match result {
        Ok(DrawOutcome::Skipped(reason)) => debug!("Draw skipped: {:?}", reason),
        Ok(_) => {}
        Err(e) => warn!("Frame skipped: {}", e),
    }
}

/// Applies a reloaded config file to a running view. Returns true when the
/// view changed and should be redrawn.
fn apply_config_changes<T: RenderTarget>(watcher: &mut ConfigWatcher, view: &mut CameraView<T>) -> bool {
    let Some((old, new)) = watcher.check_for_changes() else {
        return false;
    };
    if old.restart_required(&new) {
        warn!("Camera, backpressure or shader settings changed; restart to apply them");
    }
    if old.render.orientation == new.render.orientation {
        return false;
    }
    info!("Orientation changed to {:?}", new.render.orientation);
    view.set_orientation(new.render.orientation);
    true
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    // List devices mode
    if args.list_devices {
        println!("Available cameras:");
        match NokhwaCapture::list_devices() {
            Ok(devices) => {
                for device in devices {
                    let facing = device
                        .facing_hint()
                        .map(|f| f.to_string())
                        .unwrap_or_else(|| "unknown".into());
                    println!("  [{}] {} ({})", device.index, device.name, facing);
                }
            }
            Err(e) => {
                eprintln!("Failed to list devices: {}", e);
            }
        }
        return Ok(());
    }

    let overrides = args.overrides();
    let mut settings = match &args.config {
        Some(path) => {
            info!("Loading config from {:?}", path);
            Settings::load(path)?
        }
        None => Settings::default(),
    };
    overrides.apply(&mut settings);
    debug!("Settings: {:?}", settings);

    let watcher = args
        .config
        .clone()
        .and_then(|path| ConfigWatcher::new(path, overrides, settings.clone()));

    info!("Starting Camquad...");

    // Dispatch based on output mode
    match args.output {
        OutputMode::Window => run_window_mode(settings, watcher)?,
        OutputMode::Headless => run_headless_mode(settings, watcher)?,
    }

    Ok(())
}

/// Run in window output mode (default).
fn run_window_mode(settings: Settings, watcher: Option<ConfigWatcher>) -> Result<()> {
    let event_loop = EventLoop::<UserEvent>::with_user_event().build()?;
    event_loop.set_control_flow(ControlFlow::Wait);

    let mut app = CamquadApp::new(settings, watcher, event_loop.create_proxy());
    event_loop.run_app(&mut app)?;

    Ok(())
}

/// Run offscreen, drawing at the camera frame rate until interrupted.
fn run_headless_mode(settings: Settings, mut watcher: Option<ConfigWatcher>) -> Result<()> {
    // Set up signal handler for graceful shutdown
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        info!("Received interrupt signal, shutting down...");
        r.store(false, Ordering::SeqCst);
    })?;

    let (width, height) = (settings.camera.width, settings.camera.height);
    let frame_duration = Duration::from_secs_f64(1.0 / settings.camera.fps.max(1) as f64);

    let mut view = CameraView::new(settings);
    view.initialize(|| {
        let gpu = GpuContext::headless()?;
        let target = OffscreenOutput::new(&gpu, width, height)?;
        Ok((gpu, target))
    })?;
    if view.start::<NokhwaCapture>(None)? == StartOutcome::NoDevice {
        warn!("No camera available, rendering the placeholder only");
    }

    let mut rate = RateCounter::default();
    info!("Rendering offscreen at {}x{}", width, height);

    // Main loop
    while running.load(Ordering::SeqCst) {
        let frame_start = Instant::now();

        let result = view.redraw();
        let fps = match result {
            Ok(DrawOutcome::Frame { .. }) => rate.tick(),
            _ => rate.poll(),
        };
        if let Some(fps) = fps {
            info!("Headless: {:.2} FPS", fps);
        }
        log_draw(result);

        if let Some(watcher) = &mut watcher {
            apply_config_changes(watcher, &mut view);
        }

        // Frame rate limiting
        let elapsed = frame_start.elapsed();
        if elapsed < frame_duration {
            thread::sleep(frame_duration - elapsed);
        }
    }

    let stats = view.render_stats();
    info!(
        "Headless run stopped after {} frames ({} failed)",
        stats.frames_drawn, stats.failed
    );
    Ok(())
}
