use std::path::PathBuf;

use crate::types::StageKind;

/// Failure to bring up an adapter or device.
#[derive(Debug, thiserror::Error)]
pub enum GpuInitError {
    #[error("no suitable GPU adapter found")]
    NoAdapter,
    #[error("failed to create rendering surface: {0}")]
    Surface(String),
    #[error("failed to request GPU device: {0}")]
    DeviceRequest(#[from] wgpu::RequestDeviceError),
    #[error("failed to open window: {0}")]
    Window(String),
}

/// Shader source could not be turned into an in-memory buffer.
#[derive(Debug, thiserror::Error)]
pub enum ResourceLoadError {
    #[error("failed to load shader: {} does not exist", path.display())]
    Missing { path: PathBuf },
    #[error("failed to read shader {}: {source}", path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("shader {} is {len} bytes, above the {limit}-byte source ceiling", path.display())]
    TooLarge {
        path: PathBuf,
        len: u64,
        limit: usize,
    },
    #[error("shader {} is empty", path.display())]
    Empty { path: PathBuf },
}

impl ResourceLoadError {
    pub fn path(&self) -> &std::path::Path {
        match self {
            ResourceLoadError::Missing { path }
            | ResourceLoadError::Unreadable { path, .. }
            | ResourceLoadError::TooLarge { path, .. }
            | ResourceLoadError::Empty { path } => path,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    #[error("{stage} shader source is empty")]
    EmptySource { stage: StageKind },
    #[error("{stage} shader source is {len} bytes, above the {limit}-byte ceiling")]
    SourceTooLarge {
        stage: StageKind,
        len: usize,
        limit: usize,
    },
    /// Diagnostic text is the compiler's output, verbatim.
    #[error("failed to compile {stage} shader:\n{diagnostic}")]
    Rejected { stage: StageKind, diagnostic: String },
}

impl CompileError {
    pub fn stage(&self) -> StageKind {
        match self {
            CompileError::EmptySource { stage }
            | CompileError::SourceTooLarge { stage, .. }
            | CompileError::Rejected { stage, .. } => *stage,
        }
    }

    pub fn diagnostic(&self) -> String {
        match self {
            CompileError::Rejected { diagnostic, .. } => diagnostic.clone(),
            other => other.to_string(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("cannot link stage set [{found}]; expected a single compute stage or one vertex and one fragment stage")]
    IncompatibleStageSet { found: String },
    #[error("{stage} stage was attached before it compiled")]
    UncompiledStage { stage: StageKind },
    #[error("failed to link {program} program:\n{diagnostic}")]
    Rejected { program: &'static str, diagnostic: String },
}

#[derive(Debug, thiserror::Error)]
pub enum AllocationError {
    #[error("texture size {width}x{height} is invalid (device limit {limit})")]
    InvalidSize { width: u32, height: u32, limit: u32 },
    #[error("GPU rejected {resource} allocation: {diagnostic}")]
    Rejected {
        resource: &'static str,
        diagnostic: String,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum RuntimeGpuError {
    /// An operation reported a device error after it was issued.
    #[error("GPU error in \"{operation}\": {diagnostic}")]
    Operation {
        operation: &'static str,
        diagnostic: String,
    },
    #[error("failed to acquire presentation frame: {0}")]
    Surface(#[from] wgpu::SurfaceError),
    #[error("{operation} was handed a {found} program")]
    ProgramMismatch {
        operation: &'static str,
        found: &'static str,
    },
    #[error("failed to map readback buffer: {0}")]
    Readback(#[from] wgpu::BufferAsyncError),
    #[error("readback channel closed before the GPU answered")]
    ReadbackDisconnected,
}

/// Everything that can stop the frame driver.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error(transparent)]
    Init(#[from] GpuInitError),
    #[error(transparent)]
    Load(#[from] ResourceLoadError),
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error(transparent)]
    Link(#[from] LinkError),
    #[error(transparent)]
    Allocation(#[from] AllocationError),
    #[error(transparent)]
    Runtime(#[from] RuntimeGpuError),
}

/// Building a program from source failed at load, compile, or link time.
#[derive(Debug, thiserror::Error)]
pub enum ProgramError {
    #[error(transparent)]
    Load(#[from] ResourceLoadError),
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error(transparent)]
    Link(#[from] LinkError),
}

impl From<ProgramError> for FrameError {
    fn from(value: ProgramError) -> Self {
        match value {
            ProgramError::Load(err) => FrameError::Load(err),
            ProgramError::Compile(err) => FrameError::Compile(err),
            ProgramError::Link(err) => FrameError::Link(err),
        }
    }
}
