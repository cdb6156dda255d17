//! Camera capture: device discovery, backends and the capture thread.

mod nokhwa_backend;
pub(crate) mod source;

pub use nokhwa_backend::NokhwaCapture;
pub use source::{CaptureSource, StartOutcome};

use crate::error::CaptureError;
use crate::frame::Frame;
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;

/// Trait for webcam capture backends.
///
/// Backends are opened and read on the capture thread, so they don't need
/// to be `Send`.
pub trait CaptureBackend {
    /// Returns a list of available camera devices.
    fn list_devices() -> Result<Vec<CameraInfo>, CaptureError>
    where
        Self: Sized;

    /// Opens the camera at `index` with the requested configuration.
    fn open(index: u32, config: &CaptureConfig) -> Result<Self, CaptureError>
    where
        Self: Sized;

    /// Blocks until the next frame is available and returns it as BGRA.
    fn capture_frame(&mut self) -> Result<Frame, CaptureError>;

    /// Returns the current frame dimensions.
    fn frame_size(&self) -> (u32, u32);
}

/// Receives every captured frame on the capture thread.
///
/// The frame is owned for the duration of the call; a sink that wants to
/// keep it must move it somewhere (the frame mailbox does).
pub trait FrameSink: Send {
    fn on_frame(&mut self, frame: Frame);
}

impl<F> FrameSink for F
where
    F: FnMut(Frame) + Send,
{
    fn on_frame(&mut self, frame: Frame) {
        self(frame)
    }
}

/// Information about a camera device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraInfo {
    /// Device index
    pub index: u32,
    /// Human-readable name
    pub name: String,
}

impl CameraInfo {
    /// Guesses which way the camera faces from its name.
    pub fn facing_hint(&self) -> Option<CameraFacing> {
        let name = self.name.to_lowercase();
        const FRONT: [&str; 4] = ["front", "user", "facetime", "integrated"];
        const BACK: [&str; 4] = ["back", "rear", "environment", "world"];
        if FRONT.iter().any(|k| name.contains(k)) {
            Some(CameraFacing::Front)
        } else if BACK.iter().any(|k| name.contains(k)) {
            Some(CameraFacing::Back)
        } else {
            None
        }
    }
}

/// Which way the requested camera should face.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CameraFacing {
    #[default]
    Front,
    Back,
    /// First camera found
    Any,
}

impl FromStr for CameraFacing {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "front" => Ok(CameraFacing::Front),
            "back" => Ok(CameraFacing::Back),
            "any" => Ok(CameraFacing::Any),
            other => Err(format!("unknown camera facing `{other}` (front, back, any)")),
        }
    }
}

impl fmt::Display for CameraFacing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CameraFacing::Front => "front",
            CameraFacing::Back => "back",
            CameraFacing::Any => "any",
        };
        f.write_str(name)
    }
}

/// Configuration for camera capture. Frames are always delivered as BGRA.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Which way the camera should face
    pub facing: CameraFacing,
    /// Explicit device index; wins over `facing` when the device exists
    pub device_index: Option<u32>,
    /// Desired frame width
    pub width: u32,
    /// Desired frame height
    pub height: u32,
    /// Desired frame rate
    pub fps: u32,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            facing: CameraFacing::Front,
            device_index: None,
            width: 1280,
            height: 720,
            fps: 30,
        }
    }
}

/// Picks the camera to open.
///
/// Front requests fall back to cameras whose name carries no facing hint,
/// since desktop webcams face the user without saying so.
pub fn select_device(
    devices: &[CameraInfo],
    facing: CameraFacing,
    device_index: Option<u32>,
) -> Option<&CameraInfo> {
    if let Some(index) = device_index {
        return devices.iter().find(|d| d.index == index);
    }
    match facing {
        CameraFacing::Any => devices.first(),
        CameraFacing::Front => devices
            .iter()
            .find(|d| d.facing_hint() == Some(CameraFacing::Front))
            .or_else(|| devices.iter().find(|d| d.facing_hint().is_none())),
        CameraFacing::Back => devices
            .iter()
            .find(|d| d.facing_hint() == Some(CameraFacing::Back)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cam(index: u32, name: &str) -> CameraInfo {
        CameraInfo { index, name: name.to_string() }
    }

    #[test]
    fn test_front_prefers_named_front_camera() {
        let devices = vec![cam(0, "Back Camera"), cam(1, "USB Webcam"), cam(2, "Front Camera")];
        assert_eq!(select_device(&devices, CameraFacing::Front, None), Some(&devices[2]));
    }

    #[test]
    fn test_front_falls_back_to_unlabelled_webcam() {
        let devices = vec![cam(0, "Rear Camera"), cam(1, "Logitech C920")];
        assert_eq!(select_device(&devices, CameraFacing::Front, None), Some(&devices[1]));
    }

    #[test]
    fn test_front_never_picks_back_camera() {
        let devices = vec![cam(0, "Back Triple Camera")];
        assert_eq!(select_device(&devices, CameraFacing::Front, None), None);
    }

    #[test]
    fn test_back_requires_back_hint() {
        let devices = vec![cam(0, "FaceTime HD Camera"), cam(1, "Integrated Webcam")];
        assert_eq!(select_device(&devices, CameraFacing::Back, None), None);
    }

    #[test]
    fn test_any_takes_first() {
        let devices = vec![cam(4, "Back Camera"), cam(7, "Front Camera")];
        assert_eq!(select_device(&devices, CameraFacing::Any, None), Some(&devices[0]));
    }

    #[test]
    fn test_explicit_index_wins() {
        let devices = vec![cam(0, "Front Camera"), cam(3, "Back Camera")];
        assert_eq!(select_device(&devices, CameraFacing::Front, Some(3)), Some(&devices[1]));
        assert_eq!(select_device(&devices, CameraFacing::Front, Some(9)), None);
    }

    #[test]
    fn test_no_devices() {
        assert_eq!(select_device(&[], CameraFacing::Any, None), None);
    }

    #[test]
    fn test_facing_parsing() {
        assert_eq!("FRONT".parse::<CameraFacing>(), Ok(CameraFacing::Front));
        assert!("sideways".parse::<CameraFacing>().is_err());
    }
}
