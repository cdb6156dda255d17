//! Shared GPU context for wgpu resources.

use crate::error::SetupError;
use std::sync::Arc;
use winit::window::Window;

/// Device and queue shared by the texture bridge, the quad pipeline and the
/// render targets.
pub struct GpuContext {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub instance: wgpu::Instance,
    pub adapter: wgpu::Adapter,
}

impl GpuContext {
    /// Initializes a GPU context able to present to `window` and returns the
    /// window's surface along with it.
    pub fn for_window(window: Arc<Window>) -> Result<(Self, wgpu::Surface<'static>), SetupError> {
        let instance = Self::instance();
        let surface = instance
            .create_surface(window)
            .map_err(|e| SetupError::Surface(e.to_string()))?;
        let context = Self::with_instance(instance, Some(&surface), wgpu::Limits::default())?;
        Ok((context, surface))
    }

    /// Largest width or height a texture may have on this device.
    pub fn max_texture_dimension(&self) -> u32 {
        self.device.limits().max_texture_dimension_2d
    }

    /// Initializes a GPU context for offscreen rendering.
    pub fn headless() -> Result<Self, SetupError> {
        Self::with_instance(Self::instance(), None, wgpu::Limits::downlevel_defaults())
    }

    fn instance() -> wgpu::Instance {
        wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        })
    }

    fn with_instance(
        instance: wgpu::Instance,
        surface: Option<&wgpu::Surface<'_>>,
        required_limits: wgpu::Limits,
    ) -> Result<Self, SetupError> {
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: surface,
            force_fallback_adapter: false,
        }))
        .map_err(|e| SetupError::NoAdapter(format!("{:?}", e)))?;

        let info = adapter.get_info();
        tracing::info!("Using GPU adapter {} ({:?})", info.name, info.backend);

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("Camquad Device"),
            required_features: wgpu::Features::empty(),
            // Camera frames can be 4K, so take the adapter's texture size limits
            required_limits: required_limits.using_resolution(adapter.limits()),
            memory_hints: wgpu::MemoryHints::Performance,
            ..Default::default()
        }))
        .map_err(|e| SetupError::Device(e.to_string()))?;

        Ok(Self {
            device,
            queue,
            instance,
            adapter,
        })
    }
}

/// Headless context for GPU-backed tests; `None` on machines without an adapter.
#[cfg(test)]
pub(crate) fn test_context() -> Option<GpuContext> {
    match GpuContext::headless() {
        Ok(gpu) => Some(gpu),
        Err(e) => {
            eprintln!("skipping GPU test: {e}");
            None
        }
    }
}
