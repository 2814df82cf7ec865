use std::fmt;
use std::num::NonZeroU64;

use tracing::{debug, info, warn};

use crate::compile::ShaderUnit;
use crate::error::{LinkError, RuntimeGpuError};
use crate::types::StageKind;

use super::context::GpuContext;
use super::image::IMAGE_FORMAT;
use super::tracking::{LiveObject, ObjectKind};
use super::uniforms::KernelParams;

/// Bind group layouts both programs are linked against.
///
/// Kernel: `binding 0` write-only RGBA32F storage image, `binding 1` [`KernelParams`].
/// Blit: `binding 0` sampled image, `binding 1` sampler.
pub(crate) struct BindingLayouts {
    pub compute: wgpu::BindGroupLayout,
    pub blit: wgpu::BindGroupLayout,
    compute_pipeline: wgpu::PipelineLayout,
    blit_pipeline: wgpu::PipelineLayout,
}

impl BindingLayouts {
    pub fn new(gpu: &GpuContext) -> Result<Self, RuntimeGpuError> {
        let filterable = gpu.filterable_float();
        gpu.checked("create binding layouts", |device| {
            Self::create(device, filterable)
        })
    }

    fn create(device: &wgpu::Device, filterable: bool) -> Self {
        let compute = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("kernel layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::StorageTexture {
                        access: wgpu::StorageTextureAccess::WriteOnly,
                        format: IMAGE_FORMAT,
                        view_dimension: wgpu::TextureViewDimension::D2,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: NonZeroU64::new(
                            std::mem::size_of::<KernelParams>() as u64
                        ),
                    },
                    count: None,
                },
            ],
        });

        let blit = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("blit layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(if filterable {
                        wgpu::SamplerBindingType::Filtering
                    } else {
                        wgpu::SamplerBindingType::NonFiltering
                    }),
                    count: None,
                },
            ],
        });

        let compute_pipeline = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("kernel pipeline layout"),
            bind_group_layouts: &[&compute],
            push_constant_ranges: &[],
        });
        let blit_pipeline = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("blit pipeline layout"),
            bind_group_layouts: &[&blit],
            push_constant_ranges: &[],
        });

        Self {
            compute,
            blit,
            compute_pipeline,
            blit_pipeline,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProgramKind {
    Compute,
    Render,
}

impl ProgramKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ProgramKind::Compute => "compute",
            ProgramKind::Render => "render",
        }
    }
}

impl fmt::Display for ProgramKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub(crate) enum LinkedPipeline {
    Compute {
        pipeline: wgpu::ComputePipeline,
        tile: (u32, u32),
    },
    Render(wgpu::RenderPipeline),
}

/// A linked pipeline and the stages it was built from.
///
/// There is no unlinked state: a `Program` only exists once the driver
/// accepted the link. The pipeline keeps its shader modules alive, so the
/// units may be recompiled or dropped afterwards.
pub struct Program {
    pipeline: LinkedPipeline,
    stages: Vec<StageKind>,
    _live: LiveObject,
}

impl Program {
    pub fn kind(&self) -> ProgramKind {
        match self.pipeline {
            LinkedPipeline::Compute { .. } => ProgramKind::Compute,
            LinkedPipeline::Render(_) => ProgramKind::Render,
        }
    }

    pub fn stages(&self) -> &[StageKind] {
        &self.stages
    }

    /// Workgroup tile of a compute program.
    pub fn tile(&self) -> Option<(u32, u32)> {
        match self.pipeline {
            LinkedPipeline::Compute { tile, .. } => Some(tile),
            LinkedPipeline::Render(_) => None,
        }
    }

    pub(crate) fn pipeline(&self) -> &LinkedPipeline {
        &self.pipeline
    }
}

/// Links shader units into programs against the shared [`BindingLayouts`].
pub(crate) struct Linker<'a> {
    gpu: &'a GpuContext,
    layouts: &'a BindingLayouts,
    color_format: wgpu::TextureFormat,
}

impl<'a> Linker<'a> {
    pub fn new(
        gpu: &'a GpuContext,
        layouts: &'a BindingLayouts,
        color_format: wgpu::TextureFormat,
    ) -> Self {
        Self {
            gpu,
            layouts,
            color_format,
        }
    }

    /// Accepts exactly one compute unit, or one vertex and one fragment unit.
    pub fn link(&self, units: &[&ShaderUnit]) -> Result<Program, LinkError> {
        let mut stages: Vec<StageKind> = units.iter().map(|unit| unit.stage()).collect();
        stages.sort();
        if let Some(unit) = units.iter().find(|unit| !unit.is_compiled()) {
            return Err(LinkError::UncompiledStage {
                stage: unit.stage(),
            });
        }

        let (pipeline, error) = match stages.as_slice() {
            [StageKind::Compute] => self.link_compute(units[0]),
            [StageKind::Vertex, StageKind::Fragment] => {
                let vertex = find_stage(units, StageKind::Vertex)?;
                let fragment = find_stage(units, StageKind::Fragment)?;
                self.link_render(vertex, fragment)
            }
            other => {
                let found = other
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", ");
                return Err(LinkError::IncompatibleStageSet { found });
            }
        }?;

        if let Some(error) = error {
            let program = match pipeline {
                LinkedPipeline::Compute { .. } => "compute",
                LinkedPipeline::Render(_) => "render",
            };
            drop(pipeline);
            let diagnostic = error.to_string();
            warn!(program, "link failed:\n{diagnostic}");
            return Err(LinkError::Rejected {
                program,
                diagnostic,
            });
        }

        let program = Program {
            pipeline,
            stages: units.iter().map(|unit| unit.stage()).collect(),
            _live: self.gpu.ledger().track(ObjectKind::Program),
        };
        info!(kind = %program.kind(), stages = ?program.stages(), "linked program");
        Ok(program)
    }

    fn link_compute(
        &self,
        unit: &ShaderUnit,
    ) -> Result<(LinkedPipeline, Option<wgpu::Error>), LinkError> {
        let module = unit.module().ok_or(LinkError::UncompiledStage {
            stage: StageKind::Compute,
        })?;
        let [tile_x, tile_y, _] = unit.workgroup_size().unwrap_or([1, 1, 1]);
        let (pipeline, error) = self.gpu.scoped(|device| {
            device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some("kernel pipeline"),
                layout: Some(&self.layouts.compute_pipeline),
                module,
                entry_point: Some("main"),
                compilation_options: wgpu::PipelineCompilationOptions::default(),
                cache: None,
            })
        });
        let tile = (tile_x.max(1), tile_y.max(1));
        Ok((LinkedPipeline::Compute { pipeline, tile }, error))
    }

    fn link_render(
        &self,
        vertex: &ShaderUnit,
        fragment: &ShaderUnit,
    ) -> Result<(LinkedPipeline, Option<wgpu::Error>), LinkError> {
        let vertex_module = vertex.module().ok_or(LinkError::UncompiledStage {
            stage: StageKind::Vertex,
        })?;
        let fragment_module = fragment.module().ok_or(LinkError::UncompiledStage {
            stage: StageKind::Fragment,
        })?;
        let (pipeline, error) = self.gpu.scoped(|device| {
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("blit pipeline"),
                layout: Some(&self.layouts.blit_pipeline),
                vertex: wgpu::VertexState {
                    module: vertex_module,
                    entry_point: Some("main"),
                    buffers: &[QUAD_VERTEX_LAYOUT],
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                },
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleStrip,
                    strip_index_format: None,
                    front_face: wgpu::FrontFace::Ccw,
                    cull_mode: None,
                    polygon_mode: wgpu::PolygonMode::Fill,
                    unclipped_depth: false,
                    conservative: false,
                },
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                fragment: Some(wgpu::FragmentState {
                    module: fragment_module,
                    entry_point: Some("main"),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: self.color_format,
                        blend: None,
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                }),
                multiview: None,
                cache: None,
            })
        });
        Ok((LinkedPipeline::Render(pipeline), error))
    }
}

fn find_stage<'u>(
    units: &[&'u ShaderUnit],
    stage: StageKind,
) -> Result<&'u ShaderUnit, LinkError> {
    units
        .iter()
        .copied()
        .find(|unit| unit.stage() == stage)
        .ok_or(LinkError::UncompiledStage { stage })
}

const QUAD_ATTRIBUTES: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![0 => Float32x2];

pub(crate) const QUAD_VERTEX_LAYOUT: wgpu::VertexBufferLayout<'static> =
    wgpu::VertexBufferLayout {
        array_stride: 2 * std::mem::size_of::<f32>() as wgpu::BufferAddress,
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes: &QUAD_ATTRIBUTES,
    };

/// Owns the active program of one pass and swaps it atomically.
pub(crate) struct ProgramSlot {
    active: Program,
    generation: u32,
}

impl ProgramSlot {
    pub fn new(program: Program) -> Self {
        Self {
            active: program,
            generation: 0,
        }
    }

    pub fn active(&self) -> &Program {
        &self.active
    }

    /// Installs `program`, releasing the previous one only after the swap.
    ///
    /// A program of a different kind is refused and the active one kept.
    pub fn replace(&mut self, program: Program) -> Result<(), RuntimeGpuError> {
        if program.kind() != self.active.kind() {
            return Err(RuntimeGpuError::ProgramMismatch {
                operation: "replace program",
                found: program.kind().as_str(),
            });
        }
        let previous = std::mem::replace(&mut self.active, program);
        self.generation += 1;
        drop(previous);
        debug!(generation = self.generation, "replaced program");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::{BLIT_FRAGMENT_GLSL, BLIT_VERTEX_GLSL};
    use crate::gpu::context::test_context;
    use crate::testing::{FILL_KERNEL, UNBOUND_KERNEL};

    const LIMIT: usize = 16 * 1024;

    fn compute_unit(gpu: &GpuContext) -> ShaderUnit {
        ShaderUnit::compile(gpu, StageKind::Compute, FILL_KERNEL, LIMIT).unwrap()
    }

    fn blit_units(gpu: &GpuContext) -> [ShaderUnit; 2] {
        [
            ShaderUnit::compile(gpu, StageKind::Fragment, BLIT_FRAGMENT_GLSL, LIMIT).unwrap(),
            ShaderUnit::compile(gpu, StageKind::Vertex, BLIT_VERTEX_GLSL, LIMIT).unwrap(),
        ]
    }

    fn link_blit(linker: &Linker<'_>, gpu: &GpuContext) -> Result<Program, LinkError> {
        let [fragment, vertex] = blit_units(gpu);
        linker.link(&[&fragment, &vertex])
    }

    #[test]
    fn links_compute_and_render_programs() {
        let Some(gpu) = test_context() else { return };
        let layouts = BindingLayouts::new(&gpu).unwrap();
        let linker = Linker::new(&gpu, &layouts, wgpu::TextureFormat::Rgba8Unorm);

        let kernel = linker.link(&[&compute_unit(&gpu)]).unwrap();
        assert_eq!(kernel.kind(), ProgramKind::Compute);
        assert_eq!(kernel.tile(), Some((2, 2)));

        let blit = link_blit(&linker, &gpu).unwrap();
        assert_eq!(blit.kind(), ProgramKind::Render);
        assert_eq!(blit.stages(), &[StageKind::Fragment, StageKind::Vertex]);
        assert_eq!(blit.tile(), None);
        assert_eq!(gpu.ledger().snapshot().programs, 2);
    }

    #[test]
    fn refuses_mixed_stage_sets() {
        let Some(gpu) = test_context() else { return };
        let layouts = BindingLayouts::new(&gpu).unwrap();
        let linker = Linker::new(&gpu, &layouts, wgpu::TextureFormat::Rgba8Unorm);

        let [fragment, vertex] = blit_units(&gpu);
        let kernel = compute_unit(&gpu);
        let err = linker.link(&[&fragment, &vertex, &kernel]).err().unwrap();
        assert!(matches!(err, LinkError::IncompatibleStageSet { .. }));
        assert!(err.to_string().contains("compute, vertex, fragment"));

        let err = linker.link(&[]).err().unwrap();
        assert!(matches!(err, LinkError::IncompatibleStageSet { .. }));
        assert_eq!(gpu.ledger().snapshot().programs, 0);
    }

    #[test]
    fn kernel_outside_the_fixed_layout_is_rejected_at_link() {
        let Some(gpu) = test_context() else { return };
        let layouts = BindingLayouts::new(&gpu).unwrap();
        let linker = Linker::new(&gpu, &layouts, wgpu::TextureFormat::Rgba8Unorm);

        let unit = ShaderUnit::compile(&gpu, StageKind::Compute, UNBOUND_KERNEL, LIMIT).unwrap();
        let before = gpu.ledger().snapshot();
        match linker.link(&[&unit]).err().unwrap() {
            LinkError::Rejected {
                program,
                diagnostic,
            } => {
                assert_eq!(program, "compute");
                assert!(!diagnostic.trim().is_empty());
            }
            other => panic!("unexpected link error: {other}"),
        }
        assert_eq!(gpu.ledger().snapshot(), before);
        assert_eq!(before.programs, 0);

        // The unit is untouched and a good kernel still links afterwards.
        assert!(unit.is_compiled());
        assert!(linker.link(&[&compute_unit(&gpu)]).is_ok());
    }

    #[test]
    fn refuses_units_that_lost_their_module() {
        let Some(gpu) = test_context() else { return };
        let layouts = BindingLayouts::new(&gpu).unwrap();
        let linker = Linker::new(&gpu, &layouts, wgpu::TextureFormat::Rgba8Unorm);

        let mut unit = compute_unit(&gpu);
        assert!(unit.recompile(&gpu, "", LIMIT).is_err());
        let err = linker.link(&[&unit]).err().unwrap();
        assert!(matches!(
            err,
            LinkError::UncompiledStage {
                stage: StageKind::Compute
            }
        ));
    }

    #[test]
    fn slot_swaps_without_leaking() {
        let Some(gpu) = test_context() else { return };
        let layouts = BindingLayouts::new(&gpu).unwrap();
        let linker = Linker::new(&gpu, &layouts, wgpu::TextureFormat::Rgba8Unorm);

        let mut slot = ProgramSlot::new(linker.link(&[&compute_unit(&gpu)]).unwrap());
        let baseline = gpu.ledger().snapshot();
        for _ in 0..8 {
            slot.replace(linker.link(&[&compute_unit(&gpu)]).unwrap())
                .unwrap();
            assert_eq!(gpu.ledger().snapshot(), baseline);
        }
        assert_eq!(slot.generation, 8);

        let blit = link_blit(&linker, &gpu).unwrap();
        let err = slot.replace(blit).err().unwrap();
        assert!(matches!(
            err,
            RuntimeGpuError::ProgramMismatch { found: "render", .. }
        ));
        assert_eq!(slot.active().kind(), ProgramKind::Compute);
        assert_eq!(gpu.ledger().snapshot(), baseline);
    }
}
