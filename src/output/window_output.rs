//! Window output backend using winit and wgpu.

use super::{Drawable, RenderTarget};
use crate::error::FrameError;
use crate::shader::GpuContext;
use tracing::{debug, warn};

/// The display-backed surface of a window.
pub struct WindowOutput {
    surface: wgpu::Surface<'static>,
    config: wgpu::SurfaceConfiguration,
}

impl WindowOutput {
    /// Configures `surface` at the window's current size.
    ///
    /// Camera frames are BGRA, so a plain `Bgra8Unorm` surface passes them
    /// through untouched; other formats are used when it is not offered.
    pub fn new(gpu: &GpuContext, surface: wgpu::Surface<'static>, width: u32, height: u32) -> Self {
        let surface_caps = surface.get_capabilities(&gpu.adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .copied()
            .find(|f| *f == wgpu::TextureFormat::Bgra8Unorm)
            .or_else(|| surface_caps.formats.iter().copied().find(|f| !f.is_srgb()))
            .or_else(|| surface_caps.formats.first().copied())
            .unwrap_or(wgpu::TextureFormat::Bgra8Unorm);
        let alpha_mode = surface_caps
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);

        let max = gpu.max_texture_dimension();
        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: width.clamp(1, max),
            height: height.clamp(1, max),
            present_mode: wgpu::PresentMode::AutoVsync,
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&gpu.device, &config);
        debug!("Surface configured {}x{} {:?}", config.width, config.height, surface_format);

        Self { surface, config }
    }
}

impl RenderTarget for WindowOutput {
    fn acquire(&mut self, gpu: &GpuContext) -> Result<Drawable, FrameError> {
        match self.surface.get_current_texture() {
            Ok(surface_texture) => Ok(Drawable::from_surface(surface_texture)),
            Err(e) => {
                // Lost or outdated surfaces come back after a reconfigure
                warn!("Surface unavailable ({}), reconfiguring", e);
                self.surface.configure(&gpu.device, &self.config);
                Err(FrameError::NoDrawable(e.to_string()))
            }
        }
    }

    fn resize(&mut self, gpu: &GpuContext, width: u32, height: u32) {
        if width > 0 && height > 0 {
            // Surfaces larger than a texture can be are refused by the device
            let max = gpu.max_texture_dimension();
            self.config.width = width.min(max);
            self.config.height = height.min(max);
            self.surface.configure(&gpu.device, &self.config);
        }
    }

    fn size(&self) -> (u32, u32) {
        (self.config.width, self.config.height)
    }

    fn format(&self) -> wgpu::TextureFormat {
        self.config.format
    }
}
