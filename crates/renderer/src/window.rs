use std::time::Duration;

use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use tracing::{debug, info, warn};
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, Event, KeyEvent, WindowEvent};
use winit::event_loop::EventLoop;
use winit::keyboard::{Key, NamedKey};
use winit::platform::pump_events::{EventLoopExtPumpEvents, PumpStatus};
use winit::window::{Window, WindowBuilder};

use crate::error::{FrameError, GpuInitError, RuntimeGpuError};
use crate::gpu::context::create_instance;
use crate::gpu::GpuContext;
use crate::surface::{DisplaySurface, SurfaceEvents, SurfaceFrame};

#[derive(Debug, Clone)]
pub struct WindowOptions {
    pub title: String,
    pub size: (u32, u32),
    /// Wait for vertical blank when presenting.
    pub vsync: bool,
}

impl Default for WindowOptions {
    fn default() -> Self {
        Self {
            title: "Compute Shader Test".to_string(),
            size: (512, 512),
            vsync: true,
        }
    }
}

/// A winit window with a configured wgpu surface.
///
/// Events are pumped once per frame from the driver's thread. Escape or
/// closing the window ends the run; `R` reloads the kernel.
pub struct WindowSurface {
    // Declared before `window` so the surface is dropped first.
    surface: wgpu::Surface<'static>,
    config: wgpu::SurfaceConfiguration,
    window: Window,
    event_loop: EventLoop<()>,
}

impl WindowSurface {
    /// Opens the window and a device able to present to it.
    pub fn open(options: &WindowOptions) -> Result<(Self, GpuContext), GpuInitError> {
        let event_loop = EventLoop::new().map_err(|err| GpuInitError::Window(err.to_string()))?;
        let window = WindowBuilder::new()
            .with_title(&options.title)
            .with_inner_size(PhysicalSize::new(options.size.0, options.size.1))
            .build(&event_loop)
            .map_err(|err| GpuInitError::Window(err.to_string()))?;

        let instance = create_instance();
        let window_handle = window
            .window_handle()
            .map_err(|err| GpuInitError::Surface(format!("failed to acquire window handle: {err}")))?;
        let display_handle = window
            .display_handle()
            .map_err(|err| GpuInitError::Surface(format!("failed to acquire display handle: {err}")))?;
        let raw_window_handle = window_handle.as_raw();
        let raw_display_handle = display_handle.as_raw();
        // SAFETY: the window outlives the surface; `WindowSurface` drops the surface first.
        let surface = unsafe {
            instance.create_surface_unsafe(wgpu::SurfaceTargetUnsafe::RawHandle {
                raw_display_handle,
                raw_window_handle,
            })
        }
        .map_err(|err| GpuInitError::Surface(err.to_string()))?;

        let gpu = GpuContext::from_instance(instance, Some(&surface))?;

        let caps = surface.get_capabilities(gpu.adapter());
        let format = caps
            .formats
            .iter()
            .copied()
            .find(|format| format.is_srgb())
            .or_else(|| caps.formats.first().copied())
            .ok_or_else(|| GpuInitError::Surface("surface reports no formats".to_string()))?;
        let present_mode = select_present_mode(&caps.present_modes, options.vsync);
        let alpha_mode = caps
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);

        let size = window.inner_size();
        gpu.check_extent(size.width.max(1), size.height.max(1))
            .map_err(|err| GpuInitError::Surface(err.to_string()))?;
        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode,
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        gpu.checked("configure surface", |device| surface.configure(device, &config))
            .map_err(|err| GpuInitError::Surface(err.to_string()))?;
        info!(
            ?format,
            ?present_mode,
            width = config.width,
            height = config.height,
            "configured window surface"
        );

        Ok((
            Self {
                surface,
                config,
                window,
                event_loop,
            },
            gpu,
        ))
    }

    fn reconfigure(
        &mut self,
        gpu: &GpuContext,
        width: u32,
        height: u32,
    ) -> Result<(), FrameError> {
        if width == 0 || height == 0 {
            debug!("window minimised; keeping previous surface size");
            return Ok(());
        }
        gpu.check_extent(width, height)?;
        self.config.width = width;
        self.config.height = height;
        gpu.checked("configure surface", |device| {
            self.surface.configure(device, &self.config)
        })?;
        debug!(width, height, "reconfigured window surface");
        Ok(())
    }
}

impl DisplaySurface for WindowSurface {
    fn format(&self) -> wgpu::TextureFormat {
        self.config.format
    }

    fn size(&self) -> (u32, u32) {
        (self.config.width, self.config.height)
    }

    fn poll_events(&mut self, gpu: &GpuContext) -> Result<SurfaceEvents, FrameError> {
        let mut events = SurfaceEvents::default();
        let status = self
            .event_loop
            .pump_events(Some(Duration::ZERO), |event, _target| {
                let Event::WindowEvent { event, .. } = event else {
                    return;
                };
                match event {
                    WindowEvent::CloseRequested => events.close_requested = true,
                    WindowEvent::Resized(size) => {
                        events.resized = Some((size.width, size.height));
                    }
                    WindowEvent::KeyboardInput {
                        event:
                            KeyEvent {
                                logical_key,
                                state: ElementState::Pressed,
                                repeat: false,
                                ..
                            },
                        ..
                    } => match logical_key {
                        Key::Named(NamedKey::Escape) => events.close_requested = true,
                        Key::Character(text) if text.eq_ignore_ascii_case("r") => {
                            events.reload_kernel = true;
                        }
                        _ => {}
                    },
                    _ => {}
                }
            });
        if let PumpStatus::Exit(code) = status {
            debug!(code, "event loop exited");
            events.close_requested = true;
        }
        if let Some((width, height)) = events.resized {
            self.reconfigure(gpu, width, height)?;
        }
        Ok(events)
    }

    fn acquire(&mut self, gpu: &GpuContext) -> Result<SurfaceFrame, FrameError> {
        match self.surface.get_current_texture() {
            Ok(texture) => Ok(SurfaceFrame::swapchain(texture)),
            Err(err @ (wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated)) => {
                warn!("surface {err}; reconfiguring");
                let size = self.window.inner_size();
                self.reconfigure(gpu, size.width, size.height)?;
                let texture = self
                    .surface
                    .get_current_texture()
                    .map_err(RuntimeGpuError::from)?;
                Ok(SurfaceFrame::swapchain(texture))
            }
            Err(err) => Err(RuntimeGpuError::from(err).into()),
        }
    }

    fn present(&mut self, frame: SurfaceFrame) {
        self.window.pre_present_notify();
        frame.present();
    }
}

/// Picks Fifo for vsync, otherwise the lowest-latency mode the surface offers.
pub(crate) fn select_present_mode(
    available: &[wgpu::PresentMode],
    vsync: bool,
) -> wgpu::PresentMode {
    if vsync {
        return wgpu::PresentMode::Fifo;
    }
    [wgpu::PresentMode::Immediate, wgpu::PresentMode::Mailbox]
        .into_iter()
        .find(|mode| available.contains(mode))
        .unwrap_or(wgpu::PresentMode::Fifo)
}
