//! GPU side of the pipeline.
//!
//! - `context` opens the adapter/device and wraps wgpu's error scopes so each
//!   operation can report its own failure.
//! - `image` owns the RGBA32F texture shared by both passes.
//! - `pipeline` holds the shared bind group layouts, links shader units into
//!   programs, and swaps programs in place.
//! - `compute` dispatches the kernel; `blit` draws the result as a quad.
//! - `tracking` counts live GPU objects so reload paths can prove they do not leak.

pub(crate) mod blit;
pub(crate) mod compute;
pub(crate) mod context;
pub(crate) mod image;
pub(crate) mod pipeline;
mod readback;
pub(crate) mod tracking;
mod uniforms;

pub use compute::{workgroup_grid, ImageWritten};
pub use context::{AdapterProfile, GpuContext};
pub use image::ImageResource;
pub use pipeline::{Program, ProgramKind};
pub use tracking::{LiveObjects, ObjectLedger};

pub(crate) use readback::read_texture;
