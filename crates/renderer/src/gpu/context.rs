use anyhow::{bail, Context as AnyhowContext, Result};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};

use crate::backend::SurfaceSize;

/// Device, queue and swapchain for the preview window.
pub(crate) struct GpuContext {
    _instance: wgpu::Instance,
    pub surface: wgpu::Surface<'static>,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub surface_format: wgpu::TextureFormat,
    config: wgpu::SurfaceConfiguration,
}

impl GpuContext {
    pub(crate) fn new<T>(target: T, initial_size: SurfaceSize) -> Result<Self>
    where
        T: HasDisplayHandle + HasWindowHandle + Send + Sync + 'static,
    {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::from_env_or_default());
        let surface = instance
            .create_surface(target)
            .context("window refused a wgpu surface")?;

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::default(),
            compatible_surface: Some(&surface),
            force_fallback_adapter: false,
        }))
        .context("no GPU adapter can present to this window")?;
        let info = adapter.get_info();
        tracing::debug!(
            adapter = %info.name,
            backend = ?info.backend,
            kind = ?info.device_type,
            "using GPU adapter"
        );

        let limits = adapter.limits();
        let size = SurfaceSize::new(initial_size.width.max(1), initial_size.height.max(1));
        let edge = limits.max_texture_dimension_2d;
        if size.width > edge || size.height > edge {
            bail!("window {size} exceeds the adapter's {edge}px texture limit");
        }

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("instantglsl device"),
            required_features: wgpu::Features::empty(),
            required_limits: limits,
            memory_hints: wgpu::MemoryHints::MemoryUsage,
            trace: wgpu::Trace::default(),
        }))
        .context("GPU device request was rejected")?;

        let caps = surface.get_capabilities(&adapter);
        let Some(surface_format) = choose_format(&caps.formats) else {
            bail!("surface reports no supported formats");
        };
        let present_mode = if caps.present_modes.contains(&wgpu::PresentMode::Fifo) {
            wgpu::PresentMode::Fifo
        } else {
            caps.present_modes
                .first()
                .copied()
                .unwrap_or(wgpu::PresentMode::AutoVsync)
        };
        let alpha_mode = caps
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);
        tracing::debug!(?surface_format, ?present_mode, "configuring swapchain");

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width,
            height: size.height,
            present_mode,
            alpha_mode,
            view_formats: Vec::new(),
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        Ok(Self {
            _instance: instance,
            surface,
            device,
            queue,
            surface_format,
            config,
        })
    }

    pub(crate) fn size(&self) -> SurfaceSize {
        SurfaceSize::new(self.config.width, self.config.height)
    }

    /// Ignores zero-area sizes reported while the window is minimised.
    pub(crate) fn resize(&mut self, size: SurfaceSize) {
        if size.is_empty() {
            return;
        }
        self.config.width = size.width;
        self.config.height = size.height;
        self.reconfigure();
    }

    pub(crate) fn reconfigure(&self) {
        self.surface.configure(&self.device, &self.config);
    }
}

/// Fragment programs write display-ready colour, so a non-sRGB format is
/// preferred to avoid a second gamma encode.
fn choose_format(formats: &[wgpu::TextureFormat]) -> Option<wgpu::TextureFormat> {
    let linear = formats.iter().copied().find(|format| !format.is_srgb());
    if linear.is_none() {
        if let Some(fallback) = formats.first() {
            tracing::warn!(?fallback, "only sRGB swapchain formats available");
        }
    }
    linear.or_else(|| formats.first().copied())
}
