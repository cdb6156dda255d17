//! Nokhwa-based webcam capture backend.

use super::{CameraInfo, CaptureBackend, CaptureConfig};
use crate::error::CaptureError;
use crate::frame::{swap_red_blue, Frame, PixelFormat};
use nokhwa::pixel_format::RgbAFormat;
use nokhwa::utils::{
    ApiBackend, CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType,
    Resolution,
};
use nokhwa::Camera;

/// Webcam capture using the nokhwa library.
pub struct NokhwaCapture {
    camera: Camera,
    width: u32,
    height: u32,
}

impl NokhwaCapture {
    /// Formats tried in order when the requested one is refused.
    /// Built-in cameras usually stream NV12/YUYV, USB webcams MJPEG.
    fn seed_formats(config: &CaptureConfig) -> Vec<CameraFormat> {
        let requested = Resolution::new(config.width, config.height);
        let mut seeds = Vec::new();
        for resolution in [requested, Resolution::new(1280, 720), Resolution::new(640, 480)] {
            for format in [FrameFormat::NV12, FrameFormat::YUYV, FrameFormat::MJPEG] {
                let seed = CameraFormat::new(resolution, format, config.fps);
                if !seeds.contains(&seed) {
                    seeds.push(seed);
                }
            }
        }
        seeds
    }
}

impl CaptureBackend for NokhwaCapture {
    fn list_devices() -> Result<Vec<CameraInfo>, CaptureError> {
        let devices =
            nokhwa::query(ApiBackend::Auto).map_err(|e| CaptureError::Query(e.to_string()))?;
        Ok(devices
            .into_iter()
            .enumerate()
            .map(|(i, d)| CameraInfo {
                index: d.index().as_index().unwrap_or(i as u32),
                name: d.human_name(),
            })
            .collect())
    }

    fn open(index: u32, config: &CaptureConfig) -> Result<Self, CaptureError> {
        let mut last_error = String::from("no format accepted");

        for seed in Self::seed_formats(config) {
            let requested = RequestedFormat::new::<RgbAFormat>(RequestedFormatType::Closest(seed));
            let mut camera = match Camera::new(CameraIndex::Index(index), requested) {
                Ok(camera) => camera,
                Err(e) => {
                    last_error = e.to_string();
                    continue;
                }
            };

            // Creating the camera is not enough for some drivers, the stream must open too
            match camera.open_stream() {
                Ok(()) => {
                    let resolution = camera.resolution();
                    tracing::info!(
                        "Camera {} streaming {} ({:?} seed)",
                        index,
                        resolution,
                        seed
                    );
                    return Ok(Self {
                        camera,
                        width: resolution.width(),
                        height: resolution.height(),
                    });
                }
                Err(e) => {
                    tracing::debug!("Seed format {:?} refused: {}", seed, e);
                    last_error = e.to_string();
                }
            }
        }

        Err(CaptureError::Open(format!("camera {index}: {last_error}")))
    }

    fn capture_frame(&mut self) -> Result<Frame, CaptureError> {
        let buffer = self.camera.frame().map_err(|e| CaptureError::Read(e.to_string()))?;
        let decoded = buffer
            .decode_image::<RgbAFormat>()
            .map_err(|e| CaptureError::Read(e.to_string()))?;
        let (width, height) = decoded.dimensions();
        let mut data = decoded.into_raw();
        swap_red_blue(&mut data);

        self.width = width;
        self.height = height;
        Ok(Frame::from_data(width, height, PixelFormat::Bgra, data))
    }

    fn frame_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

impl Drop for NokhwaCapture {
    fn drop(&mut self) {
        if let Err(e) = self.camera.stop_stream() {
            tracing::debug!("Failed to stop camera stream: {}", e);
        }
    }
}
