use tracing::{trace, warn};

use crate::compile::ShaderUnit;
use crate::error::{AllocationError, FrameError, RuntimeGpuError};
use crate::types::MismatchPolicy;

use super::context::GpuContext;
use super::image::ImageResource;
use super::pipeline::{BindingLayouts, LinkedPipeline, Linker, Program, ProgramSlot};
use super::uniforms::KernelParams;

/// Proof that the kernel for a frame has been recorded.
///
/// The blit pass takes this by reference, so a frame cannot sample the image
/// before its compute work is encoded ahead of the draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub struct ImageWritten {
    frame: u64,
    dispatched: bool,
}

impl ImageWritten {
    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// False when the dispatch was skipped and the image keeps its previous contents.
    pub fn dispatched(&self) -> bool {
        self.dispatched
    }
}

/// Number of workgroups covering `extent` with `tile`-sized groups.
///
/// Rounds up; the kernel discards invocations outside the image.
pub fn workgroup_grid(extent: (u32, u32), tile: (u32, u32)) -> (u32, u32) {
    (
        extent.0.div_ceil(tile.0.max(1)),
        extent.1.div_ceil(tile.1.max(1)),
    )
}

/// Runs the kernel program over the whole image once per frame.
///
/// The pass keeps the kernel's shader unit so a reload can recompile it in
/// place; the bound program is only replaced once the new one links.
pub(crate) struct ComputePass {
    slot: ProgramSlot,
    kernel: ShaderUnit,
    params: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    extent: (u32, u32),
    policy: MismatchPolicy,
}

impl ComputePass {
    pub fn new(
        gpu: &GpuContext,
        layouts: &BindingLayouts,
        kernel: ShaderUnit,
        program: Program,
        image: &ImageResource,
        policy: MismatchPolicy,
    ) -> Result<Self, AllocationError> {
        let params = gpu.allocate("kernel params", |device| {
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("kernel params"),
                size: std::mem::size_of::<KernelParams>() as u64,
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            })
        })?;
        let bind_group = create_bind_group(gpu, layouts, &params, image)?;
        Ok(Self {
            slot: ProgramSlot::new(program),
            kernel,
            params,
            bind_group,
            extent: image.size(),
            policy,
        })
    }

    /// Points the kernel at a recreated image.
    pub fn rebind(
        &mut self,
        gpu: &GpuContext,
        layouts: &BindingLayouts,
        image: &ImageResource,
    ) -> Result<(), AllocationError> {
        self.bind_group = create_bind_group(gpu, layouts, &self.params, image)?;
        self.extent = image.size();
        Ok(())
    }

    /// Recompiles the kernel from `source`, links it and swaps it in.
    ///
    /// The old shader module is released before compiling. On failure the
    /// previously bound program keeps running.
    pub fn reload(
        &mut self,
        gpu: &GpuContext,
        linker: &Linker<'_>,
        source: &str,
        max_source_bytes: usize,
    ) -> Result<(), FrameError> {
        self.kernel.recompile(gpu, source, max_source_bytes)?;
        let program = linker.link(&[&self.kernel])?;
        self.slot.replace(program)?;
        Ok(())
    }

    pub fn program(&self) -> &Program {
        self.slot.active()
    }

    /// Uploads the frame's parameters and records one dispatch covering the image.
    pub fn dispatch(
        &self,
        gpu: &GpuContext,
        time: f32,
        frame: u64,
    ) -> Result<(wgpu::CommandBuffer, ImageWritten), RuntimeGpuError> {
        let (pipeline, tile) = match self.slot.active().pipeline() {
            LinkedPipeline::Compute { pipeline, tile } => (pipeline, *tile),
            LinkedPipeline::Render(_) => {
                if self.policy.skips() {
                    warn!(frame, "skipping dispatch: active program is not a compute program");
                    let commands = gpu.checked("dispatch compute kernel", |device| {
                        device
                            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                                label: Some("skipped kernel encoder"),
                            })
                            .finish()
                    })?;
                    let written = ImageWritten {
                        frame,
                        dispatched: false,
                    };
                    return Ok((commands, written));
                }
                return Err(RuntimeGpuError::ProgramMismatch {
                    operation: "dispatch compute kernel",
                    found: "render",
                });
            }
        };

        let params = KernelParams::new(time, frame, self.extent);
        let grid = workgroup_grid(self.extent, tile);
        trace!(frame, time, ?grid, "dispatching kernel");

        let commands = gpu.checked("dispatch compute kernel", |device| {
            gpu.queue.write_buffer(&self.params, 0, params.as_bytes());
            let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("kernel encoder"),
            });
            {
                let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                    label: Some("kernel pass"),
                    timestamp_writes: None,
                });
                pass.set_pipeline(pipeline);
                pass.set_bind_group(0, &self.bind_group, &[]);
                pass.dispatch_workgroups(grid.0, grid.1, 1);
            }
            encoder.finish()
        })?;

        Ok((
            commands,
            ImageWritten {
                frame,
                dispatched: true,
            },
        ))
    }
}

fn create_bind_group(
    gpu: &GpuContext,
    layouts: &BindingLayouts,
    params: &wgpu::Buffer,
    image: &ImageResource,
) -> Result<wgpu::BindGroup, AllocationError> {
    gpu.allocate("kernel bind group", |device| {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("kernel bind group"),
            layout: &layouts.compute,
            entries: &[
                image.bind_as_compute_target(0),
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: params.as_entire_binding(),
                },
            ],
        })
    })
}
