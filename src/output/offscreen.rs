//! Offscreen render target for headless runs.

use super::{Drawable, RenderTarget};
use crate::error::{FrameError, SetupError};
use crate::shader::GpuContext;
use anyhow::{anyhow, Result};
use tracing::warn;

const FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Bgra8Unorm;

/// A BGRA texture standing in for the display surface.
pub struct OffscreenOutput {
    texture: wgpu::Texture,
    width: u32,
    height: u32,
}

impl OffscreenOutput {
    /// Fails when the size is beyond what the device can allocate.
    pub fn new(gpu: &GpuContext, width: u32, height: u32) -> Result<Self, SetupError> {
        let width = width.max(1);
        let height = height.max(1);
        let max = gpu.max_texture_dimension();
        if width > max || height > max {
            return Err(SetupError::TargetTooLarge { width, height, max });
        }
        Ok(Self {
            texture: Self::create_texture(gpu, width, height),
            width,
            height,
        })
    }

    fn create_texture(gpu: &GpuContext, width: u32, height: u32) -> wgpu::Texture {
        gpu.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Offscreen Target"),
            size: wgpu::Extent3d { width, height, depth_or_array_layers: 1 },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        })
    }

    /// Reads the last rendered image back as tightly packed BGRA rows.
    pub fn read_pixels(&self, gpu: &GpuContext) -> Result<Vec<u8>> {
        let row_bytes = self.width * 4;
        let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let padded_row = row_bytes.div_ceil(align) * align;

        let readback = gpu.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Offscreen Readback Buffer"),
            size: (padded_row * self.height) as wgpu::BufferAddress,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = gpu.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Offscreen Readback Encoder"),
        });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &self.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &readback,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_row),
                    rows_per_image: Some(self.height),
                },
            },
            wgpu::Extent3d { width: self.width, height: self.height, depth_or_array_layers: 1 },
        );
        gpu.queue.submit(std::iter::once(encoder.finish()));

        let slice = readback.slice(..);
        let (sender, receiver) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        gpu.device
            .poll(wgpu::PollType::Wait { submission_index: None, timeout: None })
            .map_err(|e| anyhow!("GPU poll failed: {:?}", e))?;
        receiver.recv()??;

        let mapped = slice.get_mapped_range();
        let mut pixels = Vec::with_capacity((row_bytes * self.height) as usize);
        for row in mapped.chunks(padded_row as usize) {
            pixels.extend_from_slice(&row[..row_bytes as usize]);
        }
        drop(mapped);
        readback.unmap();
        Ok(pixels)
    }
}

impl RenderTarget for OffscreenOutput {
    fn acquire(&mut self, _gpu: &GpuContext) -> Result<Drawable, FrameError> {
        Ok(Drawable::from_view(
            self.texture.create_view(&wgpu::TextureViewDescriptor::default()),
        ))
    }

    fn resize(&mut self, gpu: &GpuContext, width: u32, height: u32) {
        let max = gpu.max_texture_dimension();
        if width > max || height > max {
            warn!("Ignoring resize to {}x{}, the GPU texture limit is {}", width, height, max);
            return;
        }
        if width > 0 && height > 0 && (width, height) != (self.width, self.height) {
            self.texture = Self::create_texture(gpu, width, height);
            self.width = width;
            self.height = height;
        }
    }

    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn format(&self) -> wgpu::TextureFormat {
        FORMAT
    }
}
