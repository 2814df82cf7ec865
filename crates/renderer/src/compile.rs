use std::borrow::Cow;

use tracing::{debug, info, warn};
use wgpu::naga;

use crate::error::CompileError;
use crate::gpu::tracking::{LiveObject, ObjectKind};
use crate::gpu::GpuContext;
use crate::types::StageKind;

/// One shader stage compiled from GLSL source.
///
/// A unit without a compiled module (after a failed [`ShaderUnit::recompile`])
/// cannot be linked.
pub struct ShaderUnit {
    stage: StageKind,
    source: String,
    compiled: Option<CompiledModule>,
}

pub(crate) struct CompiledModule {
    pub module: wgpu::ShaderModule,
    /// `local_size` of the compute entry point, zeros for other stages.
    pub workgroup_size: [u32; 3],
    _live: LiveObject,
}

impl ShaderUnit {
    /// Compiles `source` for `stage`.
    ///
    /// The source is first run through naga's GLSL front end and validator so
    /// the caller receives the compiler diagnostic verbatim; the device module
    /// is then created inside an error scope and discarded if the driver
    /// rejects it.
    pub fn compile(
        gpu: &GpuContext,
        stage: StageKind,
        source: &str,
        max_source_bytes: usize,
    ) -> Result<Self, CompileError> {
        let compiled = compile_module(gpu, stage, source, max_source_bytes)?;
        Ok(Self {
            stage,
            source: source.to_owned(),
            compiled: Some(compiled),
        })
    }

    /// Replaces the unit's source and compiles it again.
    ///
    /// The previously compiled module is released before compilation starts.
    /// On failure the unit is left uncompiled; programs already linked from
    /// the old module are unaffected.
    pub fn recompile(
        &mut self,
        gpu: &GpuContext,
        source: &str,
        max_source_bytes: usize,
    ) -> Result<(), CompileError> {
        if self.compiled.take().is_some() {
            debug!(stage = %self.stage, "released previous shader module");
        }
        self.source = source.to_owned();
        self.compiled = Some(compile_module(gpu, self.stage, source, max_source_bytes)?);
        Ok(())
    }

    pub fn stage(&self) -> StageKind {
        self.stage
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn is_compiled(&self) -> bool {
        self.compiled.is_some()
    }

    /// Tile size declared by a compute kernel.
    pub fn workgroup_size(&self) -> Option<[u32; 3]> {
        self.compiled.as_ref().map(|compiled| compiled.workgroup_size)
    }

    pub(crate) fn module(&self) -> Option<&wgpu::ShaderModule> {
        self.compiled.as_ref().map(|compiled| &compiled.module)
    }
}

fn compile_module(
    gpu: &GpuContext,
    stage: StageKind,
    source: &str,
    max_source_bytes: usize,
) -> Result<CompiledModule, CompileError> {
    if source.trim().is_empty() {
        return Err(CompileError::EmptySource { stage });
    }
    if source.len() > max_source_bytes {
        return Err(CompileError::SourceTooLarge {
            stage,
            len: source.len(),
            limit: max_source_bytes,
        });
    }

    let workgroup_size = validate_glsl(stage, source).map_err(|diagnostic| {
        warn!(%stage, "shader failed to compile:\n{diagnostic}");
        CompileError::Rejected { stage, diagnostic }
    })?;

    let label = format!("{stage} shader");
    let (module, error) = gpu.scoped(|device| {
        device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(&label),
            source: wgpu::ShaderSource::Glsl {
                shader: Cow::Owned(source.to_owned()),
                stage: stage.naga_stage(),
                defines: &[],
            },
        })
    });
    if let Some(error) = error {
        drop(module);
        let diagnostic = error.to_string();
        warn!(%stage, "driver rejected shader module:\n{diagnostic}");
        return Err(CompileError::Rejected { stage, diagnostic });
    }

    info!(%stage, ?workgroup_size, "compiled shader");
    Ok(CompiledModule {
        module,
        workgroup_size,
        _live: gpu.ledger().track(ObjectKind::Shader),
    })
}

/// Parses and validates GLSL with naga, returning the entry point's workgroup size.
fn validate_glsl(stage: StageKind, source: &str) -> Result<[u32; 3], String> {
    let mut frontend = naga::front::glsl::Frontend::default();
    let options = naga::front::glsl::Options::from(stage.naga_stage());
    let module = frontend
        .parse(&options, source)
        .map_err(|errors| errors.emit_to_string(source))?;

    let mut validator = naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::all(),
    );
    validator
        .validate(&module)
        .map_err(|error| error.emit_to_string(source))?;

    let entry = module
        .entry_points
        .iter()
        .find(|entry| entry.stage == stage.naga_stage())
        .ok_or_else(|| format!("no {stage} entry point named `main`"))?;
    Ok(entry.workgroup_size)
}

/// Vertex stage of the blit program: maps quad corners to texture coordinates.
pub const BLIT_VERTEX_GLSL: &str = r"#version 450
layout(location = 0) in vec2 pos;
layout(location = 0) out vec2 texCoord;

void main() {
    texCoord = pos * 0.5 + 0.5;
    gl_Position = vec4(pos.x, pos.y, 0.0, 1.0);
}
";

/// Fragment stage of the blit program: copies the sampled image with full opacity.
pub const BLIT_FRAGMENT_GLSL: &str = r"#version 450
layout(location = 0) in vec2 texCoord;
layout(location = 0) out vec4 color;

layout(set = 0, binding = 0) uniform texture2D srcTex;
layout(set = 0, binding = 1) uniform sampler srcSampler;

void main() {
    vec3 rgb = texture(sampler2D(srcTex, srcSampler), texCoord).xyz;
    color = vec4(rgb, 1.0);
}
";
