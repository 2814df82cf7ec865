use std::fmt;
use std::path::PathBuf;

use wgpu::naga::ShaderStage;

/// Shader stages the pipeline knows how to compile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StageKind {
    Compute,
    Vertex,
    Fragment,
}

impl StageKind {
    pub(crate) fn naga_stage(self) -> ShaderStage {
        match self {
            StageKind::Compute => ShaderStage::Compute,
            StageKind::Vertex => ShaderStage::Vertex,
            StageKind::Fragment => ShaderStage::Fragment,
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageKind::Compute => f.write_str("compute"),
            StageKind::Vertex => f.write_str("vertex"),
            StageKind::Fragment => f.write_str("fragment"),
        }
    }
}

/// Reaction to a compute dispatch that was handed a program it cannot run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MismatchPolicy {
    /// Abort the frame with a fatal error.
    #[default]
    Fail,
    /// Skip the dispatch with a warning in release builds; debug builds still fail.
    SkipInRelease,
}

impl MismatchPolicy {
    pub(crate) fn skips(self) -> bool {
        matches!(self, MismatchPolicy::SkipInRelease) && !cfg!(debug_assertions)
    }
}

/// Where the shader stages of the two programs come from.
#[derive(Debug, Clone)]
pub struct ShaderPaths {
    /// Compute kernel consuming the time uniform and writing the image.
    pub kernel: PathBuf,
    /// Replacement for the built-in blit vertex stage.
    pub vertex: Option<PathBuf>,
    /// Replacement for the built-in blit fragment stage.
    pub fragment: Option<PathBuf>,
}

/// Immutable configuration the frame driver is built from.
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Size of the off-screen image written by the kernel.
    pub image_size: (u32, u32),
    /// Number of frames to render before reporting throughput and exiting.
    pub frame_budget: u64,
    /// Kernel time advanced per frame (simulation units, not seconds).
    pub time_step: f32,
    /// Upper bound on a single shader source, in bytes.
    pub max_source_bytes: usize,
    pub shaders: ShaderPaths,
    pub mismatch_policy: MismatchPolicy,
}

impl Default for DriverConfig {
    /// The reference benchmark: 1024 frames of a 512x512 kernel at 0.01 per frame.
    fn default() -> Self {
        Self {
            image_size: (512, 512),
            frame_budget: 1024,
            time_step: 0.01,
            max_source_bytes: 16 * 1024,
            shaders: ShaderPaths {
                kernel: PathBuf::from("shaders/ao.comp"),
                vertex: None,
                fragment: None,
            },
            mismatch_policy: MismatchPolicy::Fail,
        }
    }
}
