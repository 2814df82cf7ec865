use renderer::{
    AllocationError, CompileError, FrameError, GpuInitError, LinkError, ProgramError,
    ResourceLoadError, RuntimeGpuError, StageKind,
};
use runconfig::ConfigError;

pub const INIT: u8 = 1;
pub const RESOURCE_LOAD: u8 = 2;
pub const CONFIG: u8 = 3;
pub const GPU_RUNTIME: u8 = 20;
pub const ALLOCATION: u8 = 21;
pub const VERTEX_COMPILE: u8 = 30;
pub const FRAGMENT_COMPILE: u8 = 31;
pub const LINK: u8 = 32;
pub const COMPUTE_COMPILE: u8 = 33;

/// Picks the process exit code for the first recognised error in the chain.
pub fn code_for(err: &anyhow::Error) -> u8 {
    for cause in err.chain() {
        if let Some(err) = cause.downcast_ref::<FrameError>() {
            return frame_code(err);
        }
        if let Some(err) = cause.downcast_ref::<ProgramError>() {
            return match err {
                ProgramError::Load(_) => RESOURCE_LOAD,
                ProgramError::Compile(err) => compile_code(err),
                ProgramError::Link(_) => LINK,
            };
        }
        if cause.is::<ConfigError>() {
            return CONFIG;
        }
        if cause.is::<ResourceLoadError>() {
            return RESOURCE_LOAD;
        }
        if let Some(err) = cause.downcast_ref::<CompileError>() {
            return compile_code(err);
        }
        if cause.is::<LinkError>() {
            return LINK;
        }
        if cause.is::<AllocationError>() {
            return ALLOCATION;
        }
        if cause.is::<RuntimeGpuError>() {
            return GPU_RUNTIME;
        }
        if cause.is::<GpuInitError>() {
            return INIT;
        }
    }
    INIT
}

fn frame_code(err: &FrameError) -> u8 {
    match err {
        FrameError::Init(_) => INIT,
        FrameError::Load(_) => RESOURCE_LOAD,
        FrameError::Compile(err) => compile_code(err),
        FrameError::Link(_) => LINK,
        FrameError::Allocation(_) => ALLOCATION,
        FrameError::Runtime(_) => GPU_RUNTIME,
    }
}

fn compile_code(err: &CompileError) -> u8 {
    match err.stage() {
        StageKind::Vertex => VERTEX_COMPILE,
        StageKind::Fragment => FRAGMENT_COMPILE,
        StageKind::Compute => COMPUTE_COMPILE,
    }
}
