//! Capture thread driving a [`CaptureBackend`] into a [`FrameSink`].

use super::{select_device, CaptureBackend, CaptureConfig, FrameSink};
use crate::error::CaptureError;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Reads failing back to back before the camera counts as unplugged.
const MAX_READ_FAILURES: u32 = 30;
/// Pause after a failed read.
const READ_RETRY_DELAY: Duration = Duration::from_millis(10);

/// Result of [`CaptureSource::start`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// Frames are flowing at the given size
    Streaming { width: u32, height: u32 },
    /// No usable camera; nothing will ever be delivered
    NoDevice,
}

/// A running (or idle) capture pipeline.
///
/// Dropping it stops the capture thread.
pub struct CaptureSource {
    running: Arc<AtomicBool>,
    delivered: Arc<AtomicU64>,
    thread: Option<JoinHandle<()>>,
    outcome: StartOutcome,
}

impl CaptureSource {
    /// Finds a camera matching `config`, opens it on a new capture thread and
    /// starts delivering frames to `sink`.
    ///
    /// A missing or unusable camera is not an error: the source comes back
    /// idle with [`StartOutcome::NoDevice`].
    pub fn start<B, S>(config: CaptureConfig, sink: S) -> Self
    where
        B: CaptureBackend + 'static,
        S: FrameSink + 'static,
    {
        let devices = match B::list_devices() {
            Ok(devices) => devices,
            Err(e) => {
                warn!("Camera discovery failed: {}", e);
                Vec::new()
            }
        };

        let Some(device) = select_device(&devices, config.facing, config.device_index) else {
            let reason = CaptureError::NoDevice(config.facing.to_string());
            warn!("{}; showing placeholder only", reason);
            return Self::idle();
        };
        info!("Selected camera [{}] {}", device.index, device.name);

        let running = Arc::new(AtomicBool::new(true));
        let delivered = Arc::new(AtomicU64::new(0));
        let (opened_tx, opened_rx) = mpsc::channel();
        let index = device.index;

        let thread = {
            let running = running.clone();
            let delivered = delivered.clone();
            thread::Builder::new()
                .name("camera-capture".into())
                .spawn(move || {
                    let backend = match B::open(index, &config) {
                        Ok(backend) => {
                            let _ = opened_tx.send(Ok(backend.frame_size()));
                            backend
                        }
                        Err(e) => {
                            let _ = opened_tx.send(Err(e));
                            return;
                        }
                    };
                    capture_loop(backend, sink, &running, &delivered);
                })
        };

        let thread = match thread {
            Ok(thread) => thread,
            Err(e) => {
                warn!("Failed to spawn capture thread: {}", e);
                return Self::idle();
            }
        };

        let outcome = match opened_rx.recv() {
            Ok(Ok((width, height))) => {
                info!("Camera opened at {}x{}", width, height);
                StartOutcome::Streaming { width, height }
            }
            Ok(Err(e)) => {
                warn!("{}; showing placeholder only", e);
                StartOutcome::NoDevice
            }
            Err(_) => {
                warn!("Capture thread exited before opening the camera");
                StartOutcome::NoDevice
            }
        };

        Self {
            running,
            delivered,
            thread: Some(thread),
            outcome,
        }
    }

    fn idle() -> Self {
        Self {
            running: Arc::new(AtomicBool::new(false)),
            delivered: Arc::new(AtomicU64::new(0)),
            thread: None,
            outcome: StartOutcome::NoDevice,
        }
    }

    pub fn outcome(&self) -> StartOutcome {
        self.outcome
    }

    /// Frames handed to the sink so far.
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    /// Whether the capture thread is still running.
    pub fn is_active(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }
}

impl Drop for CaptureSource {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("Capture thread panicked");
            }
        }
    }
}

fn capture_loop<B: CaptureBackend, S: FrameSink>(
    mut backend: B,
    mut sink: S,
    running: &AtomicBool,
    delivered: &AtomicU64,
) {
    let mut failures = 0;
    while running.load(Ordering::SeqCst) {
        match backend.capture_frame() {
            Ok(frame) => {
                if failures > 0 {
                    debug!("Camera recovered after {} failed reads", failures);
                }
                failures = 0;
                sink.on_frame(frame);
                delivered.fetch_add(1, Ordering::Relaxed);
            }
            Err(CaptureError::Disconnected) => {
                warn!("Camera disconnected, capture stopped");
                break;
            }
            Err(e) => {
                failures += 1;
                if failures >= MAX_READ_FAILURES {
                    warn!(
                        "{} reads failed in a row (last: {}), treating the camera as disconnected",
                        failures, e
                    );
                    break;
                }
                // Only the first failure of a run is worth a warning
                if failures == 1 {
                    warn!("Dropped frame: {}", e);
                } else {
                    debug!("Dropped frame: {}", e);
                }
                thread::sleep(READ_RETRY_DELAY);
            }
        }
    }
    debug!("Capture loop finished");
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::capture::{CameraFacing, CameraInfo};
    use crate::frame::Frame;
    use std::sync::atomic::AtomicU32;
    use std::sync::Mutex;

    /// One front camera producing `FRAMES` small frames, then disconnecting.
    pub(crate) struct FakeCamera {
        produced: u32,
    }

    impl FakeCamera {
        pub(crate) const FRAMES: u32 = 5;
    }

    impl CaptureBackend for FakeCamera {
        fn list_devices() -> Result<Vec<CameraInfo>, CaptureError> {
            Ok(vec![CameraInfo { index: 0, name: "Fake Front Camera".into() }])
        }

        fn open(_index: u32, _config: &CaptureConfig) -> Result<Self, CaptureError> {
            Ok(Self { produced: 0 })
        }

        fn capture_frame(&mut self) -> Result<Frame, CaptureError> {
            if self.produced == Self::FRAMES {
                return Err(CaptureError::Disconnected);
            }
            self.produced += 1;
            thread::sleep(Duration::from_millis(2));
            let shade = (self.produced * 40) as u8;
            Ok(Frame::solid_bgra(8, 4, [shade, shade, shade, 255]))
        }

        fn frame_size(&self) -> (u32, u32) {
            (8, 4)
        }
    }

    /// A machine without cameras.
    pub(crate) struct NoCamera;

    impl CaptureBackend for NoCamera {
        fn list_devices() -> Result<Vec<CameraInfo>, CaptureError> {
            Ok(Vec::new())
        }

        fn open(_index: u32, _config: &CaptureConfig) -> Result<Self, CaptureError> {
            Err(CaptureError::Open("no camera".into()))
        }

        fn capture_frame(&mut self) -> Result<Frame, CaptureError> {
            Err(CaptureError::Disconnected)
        }

        fn frame_size(&self) -> (u32, u32) {
            (0, 0)
        }
    }

    /// A camera that is listed but refuses to open.
    struct BusyCamera;

    impl CaptureBackend for BusyCamera {
        fn list_devices() -> Result<Vec<CameraInfo>, CaptureError> {
            Ok(vec![CameraInfo { index: 0, name: "Front Camera".into() }])
        }

        fn open(_index: u32, _config: &CaptureConfig) -> Result<Self, CaptureError> {
            Err(CaptureError::Open("device busy".into()))
        }

        fn capture_frame(&mut self) -> Result<Frame, CaptureError> {
            unreachable!("never opened")
        }

        fn frame_size(&self) -> (u32, u32) {
            (0, 0)
        }
    }

    static UNPLUGGED_READS: AtomicU32 = AtomicU32::new(0);

    /// Opens fine, then every read fails the way a pulled USB camera does.
    struct UnpluggedCamera;

    impl CaptureBackend for UnpluggedCamera {
        fn list_devices() -> Result<Vec<CameraInfo>, CaptureError> {
            Ok(vec![CameraInfo { index: 0, name: "USB Webcam".into() }])
        }

        fn open(_index: u32, _config: &CaptureConfig) -> Result<Self, CaptureError> {
            Ok(Self)
        }

        fn capture_frame(&mut self) -> Result<Frame, CaptureError> {
            UNPLUGGED_READS.fetch_add(1, Ordering::SeqCst);
            Err(CaptureError::Read("No such device".into()))
        }

        fn frame_size(&self) -> (u32, u32) {
            (640, 480)
        }
    }

    /// Fails every other read and stops after `FRAMES` good ones.
    struct FlakyCamera {
        reads: u32,
        produced: u32,
    }

    impl FlakyCamera {
        const FRAMES: u32 = 4;
    }

    impl CaptureBackend for FlakyCamera {
        fn list_devices() -> Result<Vec<CameraInfo>, CaptureError> {
            Ok(vec![CameraInfo { index: 0, name: "USB Webcam".into() }])
        }

        fn open(_index: u32, _config: &CaptureConfig) -> Result<Self, CaptureError> {
            Ok(Self { reads: 0, produced: 0 })
        }

        fn capture_frame(&mut self) -> Result<Frame, CaptureError> {
            self.reads += 1;
            if self.produced == Self::FRAMES {
                return Err(CaptureError::Disconnected);
            }
            if self.reads % 2 == 1 {
                return Err(CaptureError::Read("timeout".into()));
            }
            self.produced += 1;
            Ok(Frame::solid_bgra(2, 2, [0, 0, 0, 255]))
        }

        fn frame_size(&self) -> (u32, u32) {
            (2, 2)
        }
    }

    fn wait_until_finished(source: &CaptureSource) {
        for _ in 0..1000 {
            if !source.is_active() {
                return;
            }
            thread::sleep(Duration::from_millis(2));
        }
        panic!("capture thread did not finish");
    }

    #[test]
    fn test_frames_reach_sink_in_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = {
            let seen = seen.clone();
            move |frame: Frame| seen.lock().unwrap().push(frame.data[0])
        };
        let source = CaptureSource::start::<FakeCamera, _>(CaptureConfig::default(), sink);
        assert_eq!(source.outcome(), StartOutcome::Streaming { width: 8, height: 4 });

        wait_until_finished(&source);
        assert_eq!(source.delivered(), FakeCamera::FRAMES as u64);
        assert_eq!(*seen.lock().unwrap(), vec![40, 80, 120, 160, 200]);
    }

    #[test]
    fn test_no_device_starts_idle() {
        let calls = Arc::new(AtomicU64::new(0));
        let sink = {
            let calls = calls.clone();
            move |_frame: Frame| {
                calls.fetch_add(1, Ordering::SeqCst);
            }
        };
        let source = CaptureSource::start::<NoCamera, _>(CaptureConfig::default(), sink);
        assert_eq!(source.outcome(), StartOutcome::NoDevice);
        assert!(!source.is_active());
        thread::sleep(Duration::from_millis(10));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_back_facing_request_without_back_camera() {
        let config = CaptureConfig { facing: CameraFacing::Back, ..CaptureConfig::default() };
        let source = CaptureSource::start::<FakeCamera, _>(config, |_frame: Frame| {});
        assert_eq!(source.outcome(), StartOutcome::NoDevice);
        assert_eq!(source.delivered(), 0);
    }

    #[test]
    fn test_open_failure_is_not_fatal() {
        let source = CaptureSource::start::<BusyCamera, _>(CaptureConfig::default(), |_frame: Frame| {});
        assert_eq!(source.outcome(), StartOutcome::NoDevice);
        wait_until_finished(&source);
        assert_eq!(source.delivered(), 0);
    }

    #[test]
    fn test_drop_stops_thread() {
        let source = CaptureSource::start::<FakeCamera, _>(CaptureConfig::default(), |_frame: Frame| {});
        drop(source);
    }

    #[test]
    fn test_failing_reads_end_capture() {
        let source = CaptureSource::start::<UnpluggedCamera, _>(CaptureConfig::default(), |_frame: Frame| {});
        assert_eq!(source.outcome(), StartOutcome::Streaming { width: 640, height: 480 });

        wait_until_finished(&source);
        assert_eq!(UNPLUGGED_READS.load(Ordering::SeqCst), MAX_READ_FAILURES);
        assert_eq!(source.delivered(), 0);
    }

    #[test]
    fn test_sporadic_read_errors_keep_capturing() {
        let source = CaptureSource::start::<FlakyCamera, _>(CaptureConfig::default(), |_frame: Frame| {});
        wait_until_finished(&source);
        assert_eq!(source.delivered(), FlakyCamera::FRAMES as u64);
    }
}
