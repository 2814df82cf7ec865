use tracing::{debug, error, info, warn};

use crate::compile::{ShaderUnit, BLIT_FRAGMENT_GLSL, BLIT_VERTEX_GLSL};
use crate::error::{FrameError, ProgramError};
use crate::gpu::blit::BlitPass;
use crate::gpu::compute::ComputePass;
use crate::gpu::pipeline::{BindingLayouts, Linker};
use crate::gpu::{GpuContext, ImageResource, Program};
use crate::runtime::{DriverPhase, FrameState, RunSummary, TerminationReason, TimeSample};
use crate::source::{PipelineSources, ShaderSource};
use crate::surface::DisplaySurface;
use crate::types::{DriverConfig, StageKind};
use crate::viewport::Viewport;

/// Owns the GPU objects of a run and drives the dispatch/draw/present loop.
///
/// Fields drop top to bottom, which releases the render pass, the compute
/// pass, the binding layouts and then the image: the reverse of creation order.
pub struct FrameDriver {
    blit: BlitPass,
    compute: ComputePass,
    layouts: BindingLayouts,
    image: ImageResource,
    viewport: Viewport,
    phase: DriverPhase,
    reloads: u32,
    failed_reloads: u32,
    color_format: wgpu::TextureFormat,
    config: DriverConfig,
    gpu: GpuContext,
}

impl FrameDriver {
    /// Allocates the image, then builds the compute and render programs.
    ///
    /// `color_format` is the format of the surface the blit will draw into.
    /// The driver is `Running` once this returns.
    pub fn new(
        gpu: GpuContext,
        config: DriverConfig,
        sources: PipelineSources,
        color_format: wgpu::TextureFormat,
        surface_size: (u32, u32),
    ) -> Result<Self, FrameError> {
        let (width, height) = config.image_size;
        let image = ImageResource::create(&gpu, width, height)?;
        let layouts = BindingLayouts::new(&gpu)?;
        let linker = Linker::new(&gpu, &layouts, color_format);

        let (kernel, kernel_program) =
            build_kernel(&gpu, &linker, sources.kernel.text(), config.max_source_bytes)
                .inspect_err(|err| error!(path = %sources.kernel.path().display(), "{err}"))?;
        let compute = ComputePass::new(
            &gpu,
            &layouts,
            kernel,
            kernel_program,
            &image,
            config.mismatch_policy,
        )?;

        let vertex = sources
            .vertex
            .as_ref()
            .map_or(BLIT_VERTEX_GLSL, ShaderSource::text);
        let fragment = sources
            .fragment
            .as_ref()
            .map_or(BLIT_FRAGMENT_GLSL, ShaderSource::text);
        let blit_program = build_blit(&gpu, &linker, vertex, fragment, config.max_source_bytes)?;
        let blit = BlitPass::new(&gpu, &layouts, blit_program, &image)?;

        info!(
            width,
            height,
            frame_budget = config.frame_budget,
            "frame driver ready"
        );
        Ok(Self {
            blit,
            compute,
            layouts,
            image,
            viewport: Viewport::new(surface_size.0, surface_size.1),
            phase: DriverPhase::Running,
            reloads: 0,
            failed_reloads: 0,
            color_format,
            config,
            gpu,
        })
    }

    pub fn gpu(&self) -> &GpuContext {
        &self.gpu
    }

    pub fn image(&self) -> &ImageResource {
        &self.image
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    pub fn phase(&self) -> DriverPhase {
        self.phase
    }

    /// Renders until the frame budget is spent or the surface closes.
    ///
    /// Any GPU error ends the run; there are no partial frames.
    pub fn run(&mut self, surface: &mut dyn DisplaySurface) -> Result<RunSummary, FrameError> {
        let mut state = FrameState::start(self.config.time_step);
        info!(frame_budget = self.config.frame_budget, "render loop started");

        let termination = loop {
            if state.frame_index() >= self.config.frame_budget {
                break TerminationReason::BudgetReached;
            }

            let events = match surface.poll_events(&self.gpu) {
                Ok(events) => events,
                Err(err) => return Err(self.fail(state.frame_index(), err)),
            };
            if events.close_requested {
                break TerminationReason::SurfaceClosed;
            }
            if let Some((width, height)) = events.resized {
                self.viewport.reshape(width, height);
            }
            if events.reload_kernel {
                if let Err(err) = self.reload_kernel() {
                    warn!("kernel reload failed, keeping the previous kernel: {err}");
                }
            }

            if let Err(err) = self.render_frame(surface, state.sample()) {
                return Err(self.fail(state.frame_index(), err));
            }
            state.advance();
        };

        self.phase = DriverPhase::Terminating;
        let summary = RunSummary {
            frames: state.frame_index(),
            frame_budget: self.config.frame_budget,
            elapsed: state.elapsed(),
            reloads: self.reloads,
            failed_reloads: self.failed_reloads,
            termination,
        };
        info!(
            frames = summary.frames,
            elapsed = ?summary.elapsed,
            reason = %summary.termination,
            "render loop finished"
        );
        Ok(summary)
    }

    fn fail(&mut self, frame: u64, err: FrameError) -> FrameError {
        self.phase = DriverPhase::Terminating;
        error!(frame, "{err}");
        err
    }

    /// Re-reads the kernel file, recompiles it and swaps the new program in.
    ///
    /// On any failure the previous kernel stays bound and keeps running.
    pub fn reload_kernel(&mut self) -> Result<(), FrameError> {
        let path = self.config.shaders.kernel.clone();
        info!(path = %path.display(), "reloading kernel");
        let linker = Linker::new(&self.gpu, &self.layouts, self.color_format);
        let result = ShaderSource::load(&path, self.config.max_source_bytes)
            .map_err(FrameError::from)
            .and_then(|source| {
                self.compute.reload(
                    &self.gpu,
                    &linker,
                    source.text(),
                    self.config.max_source_bytes,
                )
            });

        match result {
            Ok(()) => {
                self.reloads += 1;
                info!(
                    reloads = self.reloads,
                    tile = ?self.compute.program().tile(),
                    "kernel reloaded"
                );
                Ok(())
            }
            Err(err) => {
                self.failed_reloads += 1;
                Err(err)
            }
        }
    }

    fn render_frame(
        &mut self,
        surface: &mut dyn DisplaySurface,
        sample: TimeSample,
    ) -> Result<(), FrameError> {
        let frame = surface.acquire(&self.gpu)?;
        let (kernel_commands, written) =
            self.compute
                .dispatch(&self.gpu, sample.time, sample.frame_index)?;
        let screen_commands = self.blit.draw(&self.gpu, frame.view(), &written)?;

        // One submission: wgpu orders the storage write before the sampled read.
        self.gpu.checked("submit frame", |_| {
            self.gpu
                .queue
                .submit([kernel_commands, screen_commands])
        })?;
        surface.present(frame);
        Ok(())
    }

    /// Replaces the image with one of a new size and rebinds both passes.
    pub fn resize_image(&mut self, width: u32, height: u32) -> Result<(), FrameError> {
        self.image.recreate(&self.gpu, width, height)?;
        self.compute.rebind(&self.gpu, &self.layouts, &self.image)?;
        self.blit.rebind(&self.gpu, &self.layouts, &self.image)?;
        self.config.image_size = (width, height);
        Ok(())
    }
}

impl Drop for FrameDriver {
    fn drop(&mut self) {
        debug!("releasing render pass, compute pass, layouts and image");
    }
}

fn build_kernel(
    gpu: &GpuContext,
    linker: &Linker<'_>,
    source: &str,
    max_source_bytes: usize,
) -> Result<(ShaderUnit, Program), ProgramError> {
    let unit = ShaderUnit::compile(gpu, StageKind::Compute, source, max_source_bytes)?;
    let program = linker.link(&[&unit])?;
    Ok((unit, program))
}

fn build_blit(
    gpu: &GpuContext,
    linker: &Linker<'_>,
    vertex: &str,
    fragment: &str,
    max_source_bytes: usize,
) -> Result<Program, ProgramError> {
    let vertex = ShaderUnit::compile(gpu, StageKind::Vertex, vertex, max_source_bytes)?;
    let fragment = ShaderUnit::compile(gpu, StageKind::Fragment, fragment, max_source_bytes)?;
    Ok(linker.link(&[&vertex, &fragment])?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    use crate::error::{AllocationError, CompileError, LinkError};
    use crate::gpu::context::test_context;
    use crate::surface::{OffscreenSurface, OFFSCREEN_FORMAT};
    use crate::testing::{
        scratch_file, BROKEN_KERNEL, FILL_KERNEL, PARITY_KERNEL, UNBOUND_KERNEL,
    };
    use crate::types::ShaderPaths;

    /// Builds a driver whose kernel file lives in the returned directory.
    fn driver_with(
        gpu: GpuContext,
        kernel: &str,
        name: &str,
        image_size: (u32, u32),
        frame_budget: u64,
    ) -> (TempDir, FrameDriver) {
        let (dir, kernel) = scratch_file(name, kernel);
        let config = DriverConfig {
            image_size,
            frame_budget,
            shaders: ShaderPaths {
                kernel,
                vertex: None,
                fragment: None,
            },
            ..DriverConfig::default()
        };
        let sources = PipelineSources::load(&config.shaders, config.max_source_bytes).unwrap();
        let driver = FrameDriver::new(gpu, config, sources, OFFSCREEN_FORMAT, (64, 64)).unwrap();
        (dir, driver)
    }

    fn offscreen(gpu: &GpuContext, width: u32, height: u32) -> OffscreenSurface {
        OffscreenSurface::new(gpu, width, height).unwrap()
    }

    #[test]
    fn stops_exactly_at_the_budget() {
        let Some(gpu) = test_context() else { return };
        let mut surface = offscreen(&gpu, 64, 64);
        let (_dir, mut driver) = driver_with(gpu, FILL_KERNEL, "budget.comp", (4, 4), 8);
        assert_eq!(driver.phase(), DriverPhase::Running);

        let summary = driver.run(&mut surface).unwrap();
        assert_eq!(summary.frames, 8);
        assert_eq!(summary.termination, TerminationReason::BudgetReached);
        assert_eq!(surface.presented(), 8);
        assert_eq!(driver.phase(), DriverPhase::Terminating);
    }

    #[test]
    fn close_request_stops_within_one_iteration() {
        let Some(gpu) = test_context() else { return };
        let mut surface = offscreen(&gpu, 64, 64).close_at(3);
        let (_dir, mut driver) = driver_with(gpu, FILL_KERNEL, "close.comp", (4, 4), 1024);

        let summary = driver.run(&mut surface).unwrap();
        assert_eq!(summary.frames, 3);
        assert_eq!(summary.termination, TerminationReason::SurfaceClosed);
        assert_eq!(surface.presented(), 3);
    }

    #[test]
    fn fill_kernel_leaves_the_last_frame_time_in_the_image() {
        let Some(gpu) = test_context() else { return };
        let mut surface = offscreen(&gpu, 64, 64);
        let (_dir, mut driver) = driver_with(gpu, FILL_KERNEL, "fill.comp", (4, 4), 26);

        driver.run(&mut surface).unwrap();
        // Last frame index is 25, so t = 0.25.
        let texels = driver.image().read_back(driver.gpu()).unwrap();
        assert_eq!(texels.len(), 16);
        for texel in texels {
            assert!((texel[0] - 0.25).abs() < 1e-6);
            assert_eq!(texel[0], texel[1]);
            assert_eq!(texel[1], texel[2]);
            assert_eq!(texel[3], 1.0);
        }
    }

    #[test]
    fn presented_frame_matches_the_frame_index() {
        // Even frames are blue, odd frames red.
        for (budget, expected) in [(1, [0, 0, 255, 255]), (2, [255, 0, 0, 255])] {
            let Some(gpu) = test_context() else { return };
            let mut surface = offscreen(&gpu, 16, 16);
            let name = format!("parity-{budget}.comp");
            let (_dir, mut driver) = driver_with(gpu, PARITY_KERNEL, &name, (8, 8), budget);
            driver.run(&mut surface).unwrap();

            let pixels = surface.read_pixels(driver.gpu()).unwrap();
            assert!(
                pixels.iter().all(|pixel| *pixel == expected),
                "budget {budget}: first pixel {:?}",
                pixels[0]
            );
        }
    }

    #[test]
    fn reload_cycles_do_not_leak() {
        let Some(gpu) = test_context() else { return };
        let (_dir, mut driver) = driver_with(gpu, FILL_KERNEL, "reload.comp", (4, 4), 1);
        let kernel_path = driver.config.shaders.kernel.clone();
        let baseline = driver.gpu().ledger().snapshot();

        for _ in 0..5 {
            std::fs::write(&kernel_path, FILL_KERNEL).unwrap();
            driver.reload_kernel().unwrap();
            assert_eq!(driver.gpu().ledger().snapshot(), baseline);

            std::fs::write(&kernel_path, BROKEN_KERNEL).unwrap();
            let err = driver.reload_kernel().unwrap_err();
            match err {
                FrameError::Compile(CompileError::Rejected { diagnostic, .. }) => {
                    assert!(!diagnostic.trim().is_empty());
                }
                other => panic!("unexpected reload error: {other}"),
            }
            // The kernel's module was released before the failed compile.
            let after = driver.gpu().ledger().snapshot();
            assert_eq!(after.shaders, baseline.shaders - 1);
            assert_eq!(after.programs, baseline.programs);
            assert_eq!(after.images, baseline.images);
        }
        assert_eq!(driver.reloads, 5);
        assert_eq!(driver.failed_reloads, 5);

        // The last good kernel is still bound and still runs.
        let mut surface = offscreen(driver.gpu(), 8, 8);
        driver.run(&mut surface).unwrap();
        let texels = driver.image().read_back(driver.gpu()).unwrap();
        assert!(texels.iter().all(|texel| *texel == [0.0, 0.0, 0.0, 1.0]));
    }

    #[test]
    fn link_failure_on_reload_keeps_the_previous_kernel() {
        let Some(gpu) = test_context() else { return };
        let (_dir, mut driver) = driver_with(gpu, FILL_KERNEL, "relink.comp", (4, 4), 3);
        let kernel_path = driver.config.shaders.kernel.clone();
        let baseline = driver.gpu().ledger().snapshot();

        std::fs::write(&kernel_path, UNBOUND_KERNEL).unwrap();
        match driver.reload_kernel().unwrap_err() {
            FrameError::Link(LinkError::Rejected {
                program,
                diagnostic,
            }) => {
                assert_eq!(program, "compute");
                assert!(!diagnostic.trim().is_empty());
            }
            other => panic!("unexpected reload error: {other}"),
        }
        assert_eq!(driver.failed_reloads, 1);
        assert_eq!(driver.reloads, 0);
        assert_eq!(driver.gpu().ledger().snapshot(), baseline);

        let mut surface = offscreen(driver.gpu(), 8, 8);
        driver.run(&mut surface).unwrap();
        let texels = driver.image().read_back(driver.gpu()).unwrap();
        assert!(texels.iter().all(|texel| (texel[0] - 0.02).abs() < 1e-6));
    }

    #[test]
    fn reload_request_from_the_surface_is_counted() {
        let Some(gpu) = test_context() else { return };
        let mut surface = offscreen(&gpu, 16, 16).reload_at(1);
        let (_dir, mut driver) = driver_with(gpu, FILL_KERNEL, "reload-event.comp", (4, 4), 3);

        let summary = driver.run(&mut surface).unwrap();
        assert_eq!(summary.frames, 3);
        assert_eq!(summary.reloads, 1);
        assert_eq!(summary.failed_reloads, 0);
    }

    #[test]
    fn resize_recomputes_viewport_but_not_the_image() {
        let Some(gpu) = test_context() else { return };
        let mut surface = offscreen(&gpu, 64, 64).resize_at(1, (1024, 256));
        let (_dir, mut driver) = driver_with(gpu, FILL_KERNEL, "resize.comp", (8, 8), 3);
        let before = *driver.viewport().projection();

        driver.run(&mut surface).unwrap();
        assert_eq!(driver.viewport().size(), (1024, 256));
        assert_ne!(*driver.viewport().projection(), before);
        assert_eq!(driver.image().size(), (8, 8));
        assert_eq!(surface.presented(), 3);
    }

    #[test]
    fn malformed_kernel_fails_startup_with_compile_error() {
        let Some(gpu) = test_context() else { return };
        let (_dir, kernel) = scratch_file("startup-broken.comp", BROKEN_KERNEL);
        let config = DriverConfig {
            image_size: (4, 4),
            shaders: ShaderPaths {
                kernel,
                vertex: None,
                fragment: None,
            },
            ..DriverConfig::default()
        };
        let sources = PipelineSources::load(&config.shaders, config.max_source_bytes).unwrap();
        let ledger = gpu.ledger().clone();
        let err = FrameDriver::new(gpu, config, sources, OFFSCREEN_FORMAT, (4, 4))
            .err()
            .unwrap();
        assert!(matches!(
            err,
            FrameError::Compile(CompileError::Rejected {
                stage: StageKind::Compute,
                ..
            })
        ));
        assert_eq!(ledger.snapshot().programs, 0);
        assert_eq!(ledger.snapshot().images, 0);
    }

    #[test]
    fn resize_image_with_bad_size_keeps_rendering() {
        let Some(gpu) = test_context() else { return };
        let (_dir, mut driver) = driver_with(gpu, FILL_KERNEL, "resize-bad.comp", (4, 4), 2);

        let err = driver.resize_image(0, 4).unwrap_err();
        assert!(matches!(
            err,
            FrameError::Allocation(AllocationError::InvalidSize { .. })
        ));
        assert_eq!(driver.image().size(), (4, 4));

        let mut surface = offscreen(driver.gpu(), 8, 8);
        driver.run(&mut surface).unwrap();
        assert_eq!(driver.image().read_back(driver.gpu()).unwrap().len(), 16);
    }

    #[test]
    fn resize_image_rebinds_both_passes() {
        let Some(gpu) = test_context() else { return };
        let (_dir, mut driver) = driver_with(gpu, FILL_KERNEL, "resize-image.comp", (4, 4), 2);
        driver.resize_image(6, 5).unwrap();
        assert_eq!(driver.gpu().ledger().snapshot().images, 1);

        let mut surface = offscreen(driver.gpu(), 8, 8);
        driver.run(&mut surface).unwrap();
        let texels = driver.image().read_back(driver.gpu()).unwrap();
        assert_eq!(texels.len(), 30);
        assert!(texels.iter().all(|texel| (texel[0] - 0.01).abs() < 1e-6));
    }
}
