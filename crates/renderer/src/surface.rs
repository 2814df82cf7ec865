use std::collections::BTreeMap;

use tracing::debug;

use crate::error::{AllocationError, FrameError, RuntimeGpuError};
use crate::gpu::{read_texture, GpuContext};

/// What happened on the display side since the previous poll.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SurfaceEvents {
    pub close_requested: bool,
    /// New framebuffer size in pixels, already applied to the surface.
    pub resized: Option<(u32, u32)>,
    pub reload_kernel: bool,
}

/// A presentation target acquired for one frame.
pub struct SurfaceFrame {
    view: wgpu::TextureView,
    swapchain: Option<wgpu::SurfaceTexture>,
}

impl SurfaceFrame {
    pub(crate) fn offscreen(view: wgpu::TextureView) -> Self {
        Self {
            view,
            swapchain: None,
        }
    }

    pub(crate) fn swapchain(texture: wgpu::SurfaceTexture) -> Self {
        let view = texture
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            view,
            swapchain: Some(texture),
        }
    }

    pub fn view(&self) -> &wgpu::TextureView {
        &self.view
    }

    pub(crate) fn present(self) {
        if let Some(texture) = self.swapchain {
            texture.present();
        }
    }
}

/// The window-system side of the frame loop.
///
/// Resizes are applied while polling, so both calls can fail with the
/// allocation or device error of the new presentation target.
pub trait DisplaySurface {
    fn format(&self) -> wgpu::TextureFormat;

    fn size(&self) -> (u32, u32);

    fn poll_events(&mut self, gpu: &GpuContext) -> Result<SurfaceEvents, FrameError>;

    fn acquire(&mut self, gpu: &GpuContext) -> Result<SurfaceFrame, FrameError>;

    fn present(&mut self, frame: SurfaceFrame) {
        frame.present();
    }
}

pub const OFFSCREEN_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

/// Renders into a texture nobody looks at.
///
/// Used for headless benchmarking and by tests, which can script close,
/// resize and reload events by poll number and read the result back.
pub struct OffscreenSurface {
    target: wgpu::Texture,
    polls: u64,
    presented: u64,
    close_at: Option<u64>,
    resizes: BTreeMap<u64, (u32, u32)>,
    reloads: Vec<u64>,
}

impl OffscreenSurface {
    pub fn new(gpu: &GpuContext, width: u32, height: u32) -> Result<Self, AllocationError> {
        Ok(Self {
            target: create_target(gpu, width, height)?,
            polls: 0,
            presented: 0,
            close_at: None,
            resizes: BTreeMap::new(),
            reloads: Vec::new(),
        })
    }

    /// Reports a close request on the `poll`-th poll (zero-based).
    pub fn close_at(mut self, poll: u64) -> Self {
        self.close_at = Some(poll);
        self
    }

    pub fn resize_at(mut self, poll: u64, size: (u32, u32)) -> Self {
        self.resizes.insert(poll, size);
        self
    }

    pub fn reload_at(mut self, poll: u64) -> Self {
        self.reloads.push(poll);
        self
    }

    pub fn presented(&self) -> u64 {
        self.presented
    }

    /// Reads the last presented frame as RGBA8 texels.
    pub fn read_pixels(&self, gpu: &GpuContext) -> Result<Vec<[u8; 4]>, RuntimeGpuError> {
        let bytes = read_texture(gpu, &self.target, 4)?;
        Ok(bytes
            .chunks_exact(4)
            .map(|texel| [texel[0], texel[1], texel[2], texel[3]])
            .collect())
    }
}

impl DisplaySurface for OffscreenSurface {
    fn format(&self) -> wgpu::TextureFormat {
        OFFSCREEN_FORMAT
    }

    fn size(&self) -> (u32, u32) {
        (self.target.width(), self.target.height())
    }

    fn poll_events(&mut self, gpu: &GpuContext) -> Result<SurfaceEvents, FrameError> {
        let poll = self.polls;
        self.polls += 1;

        let mut events = SurfaceEvents {
            close_requested: self.close_at == Some(poll),
            reload_kernel: self.reloads.contains(&poll),
            ..SurfaceEvents::default()
        };
        if let Some((width, height)) = self.resizes.remove(&poll) {
            // A minimised window reports 0x0; the target keeps its size.
            if width > 0 && height > 0 {
                debug!(width, height, "resizing offscreen target");
                self.target = create_target(gpu, width, height)?;
            }
            events.resized = Some((width, height));
        }
        Ok(events)
    }

    fn acquire(&mut self, _gpu: &GpuContext) -> Result<SurfaceFrame, FrameError> {
        let view = self
            .target
            .create_view(&wgpu::TextureViewDescriptor::default());
        Ok(SurfaceFrame::offscreen(view))
    }

    fn present(&mut self, frame: SurfaceFrame) {
        self.presented += 1;
        frame.present();
    }
}

fn create_target(
    gpu: &GpuContext,
    width: u32,
    height: u32,
) -> Result<wgpu::Texture, AllocationError> {
    gpu.check_extent(width, height)?;
    gpu.allocate("offscreen target", |device| {
        device.create_texture(&wgpu::TextureDescriptor {
            label: Some("offscreen target"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: OFFSCREEN_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        })
    })
}
