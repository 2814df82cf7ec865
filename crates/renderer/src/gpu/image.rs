use tracing::{debug, info};

use crate::error::{AllocationError, RuntimeGpuError};

use super::context::GpuContext;
use super::readback::read_texture;
use super::tracking::{LiveObject, ObjectKind};

pub(crate) const IMAGE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba32Float;
const BYTES_PER_TEXEL: u32 = 16;

/// The RGBA32F image the kernel writes and the blit samples.
///
/// Contents are undefined until the first dispatch.
pub struct ImageResource {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    width: u32,
    height: u32,
    _live: LiveObject,
}

impl ImageResource {
    pub fn create(gpu: &GpuContext, width: u32, height: u32) -> Result<Self, AllocationError> {
        gpu.check_extent(width, height)?;
        let texture = gpu.allocate("kernel image", |device| {
            device.create_texture(&wgpu::TextureDescriptor {
                label: Some("kernel image"),
                size: wgpu::Extent3d {
                    width,
                    height,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: IMAGE_FORMAT,
                usage: wgpu::TextureUsages::STORAGE_BINDING
                    | wgpu::TextureUsages::TEXTURE_BINDING
                    | wgpu::TextureUsages::COPY_SRC,
                view_formats: &[],
            })
        })?;

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        info!(width, height, format = ?IMAGE_FORMAT, "allocated kernel image");
        Ok(Self {
            texture,
            view,
            width,
            height,
            _live: gpu.ledger().track(ObjectKind::Image),
        })
    }

    /// Destroys the current storage and allocates a fresh one of the new size.
    ///
    /// An invalid size is refused before anything is released. Bind groups
    /// that referenced the old storage must be rebuilt.
    pub fn recreate(
        &mut self,
        gpu: &GpuContext,
        width: u32,
        height: u32,
    ) -> Result<(), AllocationError> {
        gpu.check_extent(width, height)?;
        debug!(
            from = ?(self.width, self.height),
            to = ?(width, height),
            "recreating kernel image"
        );
        self.texture.destroy();
        *self = Self::create(gpu, width, height)?;
        Ok(())
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Binds the image for write-only storage access.
    pub fn bind_as_compute_target(&self, binding: u32) -> wgpu::BindGroupEntry<'_> {
        wgpu::BindGroupEntry {
            binding,
            resource: wgpu::BindingResource::TextureView(&self.view),
        }
    }

    /// Binds the image for sampling in the blit fragment stage.
    pub fn bind_as_sampled_texture(&self, binding: u32) -> wgpu::BindGroupEntry<'_> {
        wgpu::BindGroupEntry {
            binding,
            resource: wgpu::BindingResource::TextureView(&self.view),
        }
    }

    /// Copies every texel back to the CPU, row-major from the top-left.
    pub fn read_back(&self, gpu: &GpuContext) -> Result<Vec<[f32; 4]>, RuntimeGpuError> {
        let bytes = read_texture(gpu, &self.texture, BYTES_PER_TEXEL)?;
        Ok(bytes
            .chunks_exact(BYTES_PER_TEXEL as usize)
            .map(bytemuck::pod_read_unaligned)
            .collect())
    }
}
