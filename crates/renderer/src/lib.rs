//! GPU compute-to-screen pipeline for aoquad.
//!
//! A compute kernel fills an RGBA32F image every frame; a fullscreen quad
//! then samples that image into the window. The flow per frame is:
//!
//! ```text
//!   FrameDriver::run
//!        │ poll events (close / resize / reload)
//!        ▼
//!   ComputePass::dispatch ──▶ ImageResource ──▶ BlitPass::draw ──▶ DisplaySurface::present
//!        │ (time = frame × step)                    ▲
//!        └──────── ImageWritten token ──────────────┘
//! ```
//!
//! Both passes are recorded into separate command buffers and submitted in
//! one call, so wgpu places the storage-write to sampled-read barrier between
//! them. Every fallible GPU call runs inside an error scope and surfaces as a
//! typed error from [`error`]; nothing in this crate exits the process.

pub mod compile;
pub mod driver;
pub mod error;
pub mod gpu;
pub mod runtime;
pub mod source;
pub mod surface;
#[cfg(test)]
mod testing;
pub mod types;
pub mod viewport;
pub mod window;

pub use compile::ShaderUnit;
pub use driver::FrameDriver;
pub use error::{
    AllocationError, CompileError, FrameError, GpuInitError, LinkError, ProgramError,
    ResourceLoadError, RuntimeGpuError,
};
pub use gpu::{AdapterProfile, GpuContext, ImageResource, ImageWritten, LiveObjects, Program};
pub use runtime::{RunSummary, TerminationReason};
pub use source::{PipelineSources, ShaderSource};
pub use surface::{DisplaySurface, OffscreenSurface, SurfaceEvents, SurfaceFrame};
pub use types::{DriverConfig, MismatchPolicy, ShaderPaths, StageKind};
pub use viewport::Viewport;
pub use window::{WindowOptions, WindowSurface};
