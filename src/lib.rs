//! Camquad: live camera preview drawn as a full-viewport textured quad.
//!
//! Captures BGRA frames from a webcam on a background thread, hands them to
//! the renderer through a single-slot mailbox and draws each one as a texture
//! on a triangle-strip quad.

pub mod bridge;
pub mod capture;
pub mod config;
pub mod error;
pub mod frame;
pub mod geometry;
pub mod mailbox;
pub mod output;
pub mod render;
pub mod shader;
pub mod utils;
pub mod view;
