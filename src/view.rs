//! The camera view: owns the GPU side, the render target and the capture
//! source, and walks them through their lifecycle.

use crate::capture::{CaptureBackend, CaptureSource, StartOutcome};
use crate::config::Settings;
use crate::error::{FrameError, SetupError};
use crate::geometry::QuadOrientation;
use crate::mailbox::{frame_mailbox, MailboxSender, Notifier};
use crate::output::RenderTarget;
use crate::render::{DrawOutcome, RenderBridge, RenderStats, SkipReason};
use crate::shader::{GpuContext, ShaderLibrary, ShaderSource};
use tracing::{debug, info};

/// Where a [`CameraView`] is in its life. There is no stopped state;
/// dropping the view stops everything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Uninitialized,
    /// GPU, target and pipeline exist; no camera yet
    Initialized,
    /// Capture started (or found no camera); redraws draw
    Running,
}

impl Lifecycle {
    pub fn name(self) -> &'static str {
        match self {
            Lifecycle::Uninitialized => "uninitialized",
            Lifecycle::Initialized => "initialized",
            Lifecycle::Running => "running",
        }
    }

    fn check(self, to: Lifecycle) -> Result<(), SetupError> {
        match (self, to) {
            (Lifecycle::Uninitialized, Lifecycle::Initialized)
            | (Lifecycle::Initialized, Lifecycle::Running) => Ok(()),
            _ => Err(SetupError::InvalidTransition {
                from: self.name(),
                to: to.name(),
            }),
        }
    }
}

/// GPU state that exists from `initialize` on.
struct Attached<T> {
    // The bridge goes first so the mailbox closes before the target and
    // the capture thread are torn down
    bridge: RenderBridge,
    target: T,
    gpu: GpuContext,
}

/// A camera preview drawn into a [`RenderTarget`].
pub struct CameraView<T: RenderTarget> {
    settings: Settings,
    state: Lifecycle,
    attached: Option<Attached<T>>,
    sender: Option<MailboxSender>,
    capture: Option<CaptureSource>,
}

impl<T: RenderTarget> CameraView<T> {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            state: Lifecycle::Uninitialized,
            attached: None,
            sender: None,
            capture: None,
        }
    }

    /// Compiles the shaders, then calls `connect` for the GPU context and
    /// render target and builds the quad pipeline for them.
    ///
    /// Shader problems are reported before `connect` runs. On any error the
    /// view stays uninitialized.
    pub fn initialize<F>(&mut self, connect: F) -> Result<(), SetupError>
    where
        F: FnOnce() -> Result<(GpuContext, T), SetupError>,
    {
        self.state.check(Lifecycle::Initialized)?;

        let fragment = match &self.settings.render.shader {
            Some(path) => {
                info!("Loading shader from {:?}", path);
                Some(ShaderSource::load(path)?)
            }
            None => {
                info!("Using passthrough shader");
                None
            }
        };
        let library = ShaderLibrary::compile(fragment.as_ref())?;

        let (gpu, target) = connect()?;
        let (sender, receiver) = frame_mailbox(self.settings.render.backpressure, None);
        let bridge = RenderBridge::new(
            &gpu,
            &library,
            target.format(),
            self.settings.render.orientation,
            receiver,
        );
        let (width, height) = target.size();
        info!(
            "Camera view initialized ({}x{} {:?})",
            width,
            height,
            target.format()
        );

        self.attached = Some(Attached { bridge, target, gpu });
        self.sender = Some(sender);
        self.state = Lifecycle::Initialized;
        Ok(())
    }

    /// Starts capturing with backend `B`. `notifier` runs on the capture
    /// thread whenever a frame is ready to draw.
    ///
    /// The view runs even when no camera is found; it then shows the
    /// placeholder.
    pub fn start<B>(&mut self, notifier: Option<Notifier>) -> Result<StartOutcome, SetupError>
    where
        B: CaptureBackend + 'static,
    {
        self.state.check(Lifecycle::Running)?;
        let mut sender = self.sender.take().ok_or(SetupError::InvalidTransition {
            from: self.state.name(),
            to: Lifecycle::Running.name(),
        })?;
        if let Some(notifier) = notifier {
            sender = sender.with_notifier(notifier);
        }
        info!("Starting capture with {} backpressure", sender.policy());

        let source = CaptureSource::start::<B, _>(self.settings.camera.clone(), sender);
        let outcome = source.outcome();
        self.capture = Some(source);
        self.state = Lifecycle::Running;
        info!("Camera view running ({:?})", outcome);
        Ok(outcome)
    }

    /// Resizes the render target. Called on every layout pass.
    pub fn layout(&mut self, width: u32, height: u32) {
        if let Some(attached) = &mut self.attached {
            debug!("Layout {}x{}", width, height);
            attached.target.resize(&attached.gpu, width, height);
            attached.bridge.invalidate();
        }
    }

    /// Draws the latest camera frame. Does nothing until the view runs.
    pub fn redraw(&mut self) -> Result<DrawOutcome, FrameError> {
        if self.state != Lifecycle::Running {
            return Ok(DrawOutcome::Skipped(SkipReason::NotRunning));
        }
        match &mut self.attached {
            Some(attached) => attached.bridge.render(&attached.gpu, &mut attached.target),
            None => Ok(DrawOutcome::Skipped(SkipReason::NotRunning)),
        }
    }

    /// Changes how the image lies on the quad; takes effect with the next draw.
    pub fn set_orientation(&mut self, orientation: QuadOrientation) {
        self.settings.render.orientation = orientation;
        if let Some(attached) = &mut self.attached {
            attached.bridge.set_orientation(&attached.gpu, orientation);
            attached.bridge.invalidate();
        }
    }

    pub fn state(&self) -> Lifecycle {
        self.state
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn capture_outcome(&self) -> Option<StartOutcome> {
        self.capture.as_ref().map(CaptureSource::outcome)
    }

    pub fn render_stats(&self) -> RenderStats {
        self.attached
            .as_ref()
            .map(|a| a.bridge.stats())
            .unwrap_or_default()
    }

    pub fn gpu(&self) -> Option<&GpuContext> {
        self.attached.as_ref().map(|a| &a.gpu)
    }

    pub fn target(&self) -> Option<&T> {
        self.attached.as_ref().map(|a| &a.target)
    }
}
