//! Render targets the quad can be drawn into.

pub mod offscreen;
pub mod window_output;

pub use offscreen::OffscreenOutput;
pub use window_output::WindowOutput;

use crate::error::FrameError;
use crate::shader::GpuContext;

/// Something that hands out one drawable per presented frame.
pub trait RenderTarget {
    /// Acquires the texture to draw the next frame into.
    fn acquire(&mut self, gpu: &GpuContext) -> Result<Drawable, FrameError>;

    /// Resizes the target; zero sizes are ignored.
    fn resize(&mut self, gpu: &GpuContext, width: u32, height: u32);

    /// Current size in pixels.
    fn size(&self) -> (u32, u32);

    /// Color format the quad pipeline must render in.
    fn format(&self) -> wgpu::TextureFormat;
}

/// A texture acquired for exactly one frame.
pub struct Drawable {
    view: wgpu::TextureView,
    surface_texture: Option<wgpu::SurfaceTexture>,
}

impl Drawable {
    pub fn from_surface(surface_texture: wgpu::SurfaceTexture) -> Self {
        let view = surface_texture
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            view,
            surface_texture: Some(surface_texture),
        }
    }

    pub fn from_view(view: wgpu::TextureView) -> Self {
        Self {
            view,
            surface_texture: None,
        }
    }

    pub fn view(&self) -> &wgpu::TextureView {
        &self.view
    }

    /// Shows the frame on screen. Offscreen drawables have nothing to present.
    pub fn present(self) {
        if let Some(surface_texture) = self.surface_texture {
            surface_texture.present();
        }
    }
}
