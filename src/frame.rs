//! Captured frame type and pixel layouts.

use crate::error::FrameError;

/// Pixel layouts a frame can carry.
///
/// Capture always produces [`PixelFormat::Bgra`]; the other layouts exist so
/// that foreign buffers can be described and rejected by the texture bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// Packed BGRA, 8 bits per channel (32 bits per pixel)
    Bgra,
    /// Packed RGBA, 8 bits per channel (32 bits per pixel)
    Rgba,
    /// Packed RGB, 8 bits per channel (24 bits per pixel)
    Rgb,
    /// YUV 4:2:2 packed format (Y0 U0 Y1 V0)
    Yuyv,
    /// NV12 semi-planar format (Y plane + interleaved UV)
    Nv12,
}

impl PixelFormat {
    /// Returns the number of bytes per pixel for packed formats.
    /// For planar formats like NV12, this returns the bytes for the Y component only.
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            PixelFormat::Bgra | PixelFormat::Rgba => 4,
            PixelFormat::Rgb => 3,
            PixelFormat::Yuyv => 2,
            PixelFormat::Nv12 => 1,
        }
    }
}

/// One captured camera image.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Bytes between the starts of two consecutive rows
    pub bytes_per_row: u32,
    /// Pixel format of the frame data
    pub format: PixelFormat,
    /// Raw pixel data
    pub data: Vec<u8>,
}

impl Frame {
    /// Creates a tightly packed frame from existing data.
    pub fn from_data(width: u32, height: u32, format: PixelFormat, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            bytes_per_row: width * format.bytes_per_pixel() as u32,
            format,
            data,
        }
    }

    /// Creates a frame whose rows are `bytes_per_row` apart (platform padding).
    pub fn with_stride(
        width: u32,
        height: u32,
        bytes_per_row: u32,
        format: PixelFormat,
        data: Vec<u8>,
    ) -> Self {
        Self {
            width,
            height,
            bytes_per_row,
            format,
            data,
        }
    }

    /// Creates a BGRA frame filled with one color.
    pub fn solid_bgra(width: u32, height: u32, bgra: [u8; 4]) -> Self {
        let data = bgra
            .iter()
            .copied()
            .cycle()
            .take(width as usize * height as usize * 4)
            .collect();
        Self::from_data(width, height, PixelFormat::Bgra, data)
    }

    /// Checks that the buffer really holds `height` rows of `width` pixels.
    pub fn check_layout(&self) -> Result<(), FrameError> {
        if self.width == 0 || self.height == 0 {
            return Err(FrameError::InvalidFrame(format!(
                "empty frame {}x{}",
                self.width, self.height
            )));
        }
        let row_bytes = self.width as usize * self.format.bytes_per_pixel();
        if (self.bytes_per_row as usize) < row_bytes {
            return Err(FrameError::InvalidFrame(format!(
                "stride {} is shorter than a row of {} bytes",
                self.bytes_per_row, row_bytes
            )));
        }
        let needed = self.bytes_per_row as usize * (self.height as usize - 1) + row_bytes;
        if self.data.len() < needed {
            return Err(FrameError::InvalidFrame(format!(
                "buffer holds {} bytes, {}x{} needs {}",
                self.data.len(),
                self.width,
                self.height,
                needed
            )));
        }
        Ok(())
    }
}

/// Swaps the red and blue channels of packed 32-bit pixels in place.
/// Turns RGBA into BGRA and back.
pub fn swap_red_blue(data: &mut [u8]) {
    for px in data.chunks_exact_mut(4) {
        px.swap(0, 2);
    }
}
