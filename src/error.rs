//! Error types, split by severity.
//!
//! [`SetupError`] aborts initialization. [`FrameError`] only costs the frame
//! (or refresh) it happened on. [`CaptureError`] never reaches the render
//! side: the capture source turns it into a log line.

use crate::frame::PixelFormat;
use thiserror::Error;

/// Fatal errors raised while bringing the pipeline up.
#[derive(Error, Debug)]
pub enum SetupError {
    #[error("no GPU adapter available: {0}")]
    NoAdapter(String),
    #[error("failed to create GPU device: {0}")]
    Device(String),
    #[error("failed to create display surface: {0}")]
    Surface(String),
    #[error("shader parse error: {0}")]
    ShaderParse(String),
    #[error("shader validation error: {0}")]
    ShaderValidation(String),
    #[error("shader has no {stage} entry point named `{name}`")]
    MissingEntryPoint { stage: &'static str, name: String },
    #[error("render target {width}x{height} exceeds the GPU texture limit of {max}")]
    TargetTooLarge { width: u32, height: u32, max: u32 },
    #[error("cannot go from {from} to {to}")]
    InvalidTransition { from: &'static str, to: &'static str },
    #[error("config error: {0}")]
    Config(String),
}

/// Recoverable errors; the affected draw is skipped.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("pixel format {0:?} cannot be sampled as a texture")]
    UnsupportedFormat(PixelFormat),
    #[error("invalid frame: {0}")]
    InvalidFrame(String),
    #[error("no drawable available: {0}")]
    NoDrawable(String),
}

/// Camera-side failures.
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("no camera matches the requested facing ({0})")]
    NoDevice(String),
    #[error("failed to open camera: {0}")]
    Open(String),
    #[error("failed to read frame: {0}")]
    Read(String),
    #[error("camera disconnected")]
    Disconnected,
    #[error("failed to query cameras: {0}")]
    Query(String),
}
