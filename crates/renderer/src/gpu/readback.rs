use crossbeam_channel::bounded;

use crate::error::RuntimeGpuError;

use super::context::GpuContext;

/// Copies a whole 2D texture back to the CPU, stripping row padding.
///
/// This waits for the GPU; it exists for tests and diagnostics and is never
/// called from the frame loop.
pub(crate) fn read_texture(
    gpu: &GpuContext,
    texture: &wgpu::Texture,
    bytes_per_pixel: u32,
) -> Result<Vec<u8>, RuntimeGpuError> {
    let width = texture.width();
    let height = texture.height();
    let unpadded_row = width * bytes_per_pixel;
    let padded_row = padded_bytes_per_row(unpadded_row);

    let staging = gpu.checked("read back texture", |device| {
        let staging = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("readback staging"),
            size: u64::from(padded_row) * u64::from(height),
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("readback encoder"),
        });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &staging,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_row),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        gpu.queue.submit(std::iter::once(encoder.finish()));
        staging
    })?;

    let slice = staging.slice(..);
    let (tx, rx) = bounded(1);
    slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = tx.send(result);
    });
    gpu.device
        .poll(wgpu::PollType::Wait)
        .map_err(|err| RuntimeGpuError::Operation {
            operation: "readback poll",
            diagnostic: err.to_string(),
        })?;
    rx.recv()
        .map_err(|_| RuntimeGpuError::ReadbackDisconnected)??;

    let mut pixels = Vec::with_capacity((unpadded_row * height) as usize);
    {
        let data = slice.get_mapped_range();
        for row in data.chunks(padded_row as usize) {
            pixels.extend_from_slice(&row[..unpadded_row as usize]);
        }
    }
    staging.unmap();
    Ok(pixels)
}

pub(crate) fn padded_bytes_per_row(unpadded: u32) -> u32 {
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    unpadded.div_ceil(align) * align
}
