//! Texture bridge: turns captured frames into GPU textures.
//!
//! Textures are cached per (format, size) on the bridge's device, so a steady
//! camera stream reuses one texture and only its pixels change. The handle
//! returned by [`TextureBridge::wrap`] borrows both the cache and the frame,
//! which keeps it from outliving either.

use crate::error::FrameError;
use crate::frame::{Frame, PixelFormat};
use crate::shader::GpuContext;
use std::collections::HashMap;
use std::marker::PhantomData;
use tracing::debug;

/// How a frame will be laid out on the GPU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureLayout {
    pub format: wgpu::TextureFormat,
    pub width: u32,
    pub height: u32,
    pub bytes_per_row: u32,
}

impl TextureLayout {
    fn key(&self) -> CacheKey {
        CacheKey {
            format: self.format,
            width: self.width,
            height: self.height,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct CacheKey {
    format: wgpu::TextureFormat,
    width: u32,
    height: u32,
}

struct CacheEntry {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
}

/// A GPU texture holding one frame's pixels, valid while the frame is.
pub struct FrameTexture<'a> {
    view: &'a wgpu::TextureView,
    layout: TextureLayout,
    _frame: PhantomData<&'a Frame>,
}

impl<'a> FrameTexture<'a> {
    pub fn view(&self) -> &'a wgpu::TextureView {
        self.view
    }

    pub fn width(&self) -> u32 {
        self.layout.width
    }

    pub fn height(&self) -> u32 {
        self.layout.height
    }

    pub fn format(&self) -> wgpu::TextureFormat {
        self.layout.format
    }
}

/// Texture cache for one GPU device.
#[derive(Default)]
pub struct TextureBridge {
    cache: HashMap<CacheKey, CacheEntry>,
    /// Layout of the most recent successful upload
    last: Option<TextureLayout>,
}

impl TextureBridge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Maps a frame to its GPU layout, rejecting anything that cannot be
    /// sampled as-is.
    pub fn describe(frame: &Frame) -> Result<TextureLayout, FrameError> {
        let format = match frame.format {
            PixelFormat::Bgra => wgpu::TextureFormat::Bgra8Unorm,
            PixelFormat::Rgba => wgpu::TextureFormat::Rgba8Unorm,
            other => return Err(FrameError::UnsupportedFormat(other)),
        };
        frame.check_layout()?;
        Ok(TextureLayout {
            format,
            width: frame.width,
            height: frame.height,
            bytes_per_row: frame.bytes_per_row,
        })
    }

    /// [`describe`](Self::describe) plus the device's texture size limit.
    pub fn validate(gpu: &GpuContext, frame: &Frame) -> Result<TextureLayout, FrameError> {
        let layout = Self::describe(frame)?;
        let max = gpu.max_texture_dimension();
        if layout.width > max || layout.height > max {
            return Err(FrameError::InvalidFrame(format!(
                "{}x{} exceeds the GPU texture limit of {}",
                layout.width, layout.height, max
            )));
        }
        Ok(layout)
    }

    /// Uploads `frame` into the cached texture for its layout and returns a
    /// handle scoped to the frame.
    pub fn wrap<'a>(
        &'a mut self,
        gpu: &GpuContext,
        frame: &'a Frame,
    ) -> Result<FrameTexture<'a>, FrameError> {
        let layout = Self::validate(gpu, frame)?;
        let size = wgpu::Extent3d {
            width: layout.width,
            height: layout.height,
            depth_or_array_layers: 1,
        };

        let entry = self.cache.entry(layout.key()).or_insert_with(|| {
            debug!(
                "Creating frame texture {}x{} {:?}",
                layout.width, layout.height, layout.format
            );
            let texture = gpu.device.create_texture(&wgpu::TextureDescriptor {
                label: Some("Frame Texture"),
                size,
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: layout.format,
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            });
            let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
            CacheEntry { texture, view }
        });

        gpu.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &entry.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &frame.data,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(layout.bytes_per_row),
                rows_per_image: Some(layout.height),
            },
            size,
        );
        self.last = Some(layout);

        Ok(FrameTexture {
            view: &entry.view,
            layout,
            _frame: PhantomData,
        })
    }

    /// The texture of the last wrapped frame.
    ///
    /// Its pixels were copied to the GPU, so it stays valid after that frame
    /// is released; the handle only borrows the cache.
    pub fn last_wrapped(&self) -> Option<FrameTexture<'_>> {
        let layout = self.last?;
        let entry = self.cache.get(&layout.key())?;
        Some(FrameTexture {
            view: &entry.view,
            layout,
            _frame: PhantomData,
        })
    }

    /// Number of cached textures.
    pub fn cached(&self) -> usize {
        self.cache.len()
    }

    /// Drops every cached texture except the one for `keep`.
    pub fn retain_only(&mut self, keep: &TextureLayout) {
        let key = keep.key();
        self.cache.retain(|k, _| *k == key);
        if self.last.is_some_and(|last| last.key() != key) {
            self.last = None;
        }
    }
}
