use tracing::trace;
use wgpu::util::DeviceExt;

use crate::error::{AllocationError, RuntimeGpuError};

use super::compute::ImageWritten;
use super::context::GpuContext;
use super::image::ImageResource;
use super::pipeline::{BindingLayouts, LinkedPipeline, Program, ProgramSlot};

/// Background behind the quad; only visible if the quad does not cover the target.
pub const CLEAR_COLOR: wgpu::Color = wgpu::Color {
    r: 0.075,
    g: 0.075,
    b: 0.2,
    a: 1.0,
};

/// Corners of the fullscreen quad in triangle-strip order.
pub const QUAD_VERTICES: [[f32; 2]; 4] = [[-1.0, -1.0], [-1.0, 1.0], [1.0, -1.0], [1.0, 1.0]];

/// Draws the kernel image onto the presentation target as a fullscreen quad.
pub(crate) struct BlitPass {
    slot: ProgramSlot,
    quad: wgpu::Buffer,
    sampler: wgpu::Sampler,
    bind_group: wgpu::BindGroup,
}

impl BlitPass {
    pub fn new(
        gpu: &GpuContext,
        layouts: &BindingLayouts,
        program: Program,
        image: &ImageResource,
    ) -> Result<Self, AllocationError> {
        let quad = gpu.allocate("quad vertices", |device| {
            device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("quad vertices"),
                contents: bytemuck::cast_slice(&QUAD_VERTICES),
                usage: wgpu::BufferUsages::VERTEX,
            })
        })?;
        let filter = if gpu.filterable_float() {
            wgpu::FilterMode::Linear
        } else {
            wgpu::FilterMode::Nearest
        };
        let sampler = gpu.allocate("image sampler", |device| {
            device.create_sampler(&wgpu::SamplerDescriptor {
                label: Some("image sampler"),
                address_mode_u: wgpu::AddressMode::ClampToEdge,
                address_mode_v: wgpu::AddressMode::ClampToEdge,
                address_mode_w: wgpu::AddressMode::ClampToEdge,
                mag_filter: filter,
                min_filter: filter,
                mipmap_filter: wgpu::FilterMode::Nearest,
                ..Default::default()
            })
        })?;
        let bind_group = create_bind_group(gpu, layouts, &sampler, image)?;
        Ok(Self {
            slot: ProgramSlot::new(program),
            quad,
            sampler,
            bind_group,
        })
    }

    pub fn rebind(
        &mut self,
        gpu: &GpuContext,
        layouts: &BindingLayouts,
        image: &ImageResource,
    ) -> Result<(), AllocationError> {
        self.bind_group = create_bind_group(gpu, layouts, &self.sampler, image)?;
        Ok(())
    }

    /// Clears `target` and draws the image over it.
    pub fn draw(
        &self,
        gpu: &GpuContext,
        target: &wgpu::TextureView,
        written: &ImageWritten,
    ) -> Result<wgpu::CommandBuffer, RuntimeGpuError> {
        let LinkedPipeline::Render(pipeline) = self.slot.active().pipeline() else {
            return Err(RuntimeGpuError::ProgramMismatch {
                operation: "draw screen",
                found: "compute",
            });
        };
        trace!(frame = written.frame(), "drawing screen quad");

        gpu.checked("draw screen", |device| {
            let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("screen encoder"),
            });
            {
                let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                    label: Some("screen pass"),
                    color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                        view: target,
                        depth_slice: None,
                        resolve_target: None,
                        ops: wgpu::Operations {
                            load: wgpu::LoadOp::Clear(CLEAR_COLOR),
                            store: wgpu::StoreOp::Store,
                        },
                    })],
                    depth_stencil_attachment: None,
                    occlusion_query_set: None,
                    timestamp_writes: None,
                });
                pass.set_pipeline(pipeline);
                pass.set_bind_group(0, &self.bind_group, &[]);
                pass.set_vertex_buffer(0, self.quad.slice(..));
                pass.draw(0..QUAD_VERTICES.len() as u32, 0..1);
            }
            encoder.finish()
        })
    }
}

fn create_bind_group(
    gpu: &GpuContext,
    layouts: &BindingLayouts,
    sampler: &wgpu::Sampler,
    image: &ImageResource,
) -> Result<wgpu::BindGroup, AllocationError> {
    gpu.allocate("blit bind group", |device| {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("blit bind group"),
            layout: &layouts.blit,
            entries: &[
                image.bind_as_sampled_texture(0),
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(sampler),
                },
            ],
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quad_corners_map_to_unit_texture_coordinates() {
        let coords: Vec<[f32; 2]> = QUAD_VERTICES
            .iter()
            .map(|[x, y]| [x * 0.5 + 0.5, y * 0.5 + 0.5])
            .collect();
        assert_eq!(coords, vec![[0.0, 0.0], [0.0, 1.0], [1.0, 0.0], [1.0, 1.0]]);
    }
}
