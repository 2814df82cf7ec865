use bytemuck::{Pod, Zeroable};

/// Uniform block the compute kernel reads at `set = 0, binding = 1`.
///
/// std140 layout, mirrored in GLSL as:
///
/// ```glsl
/// layout(set = 0, binding = 1) uniform KernelParams {
///     float time;
///     uint frame;
///     uvec2 extent;
/// } params;
/// ```
#[repr(C, align(16))]
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct KernelParams {
    pub time: f32,
    pub frame: u32,
    pub extent: [u32; 2],
}

unsafe impl Zeroable for KernelParams {}
unsafe impl Pod for KernelParams {}

impl KernelParams {
    pub fn new(time: f32, frame: u64, extent: (u32, u32)) -> Self {
        Self {
            time,
            // The kernel only needs the low bits for seeding.
            frame: frame as u32,
            extent: [extent.0, extent.1],
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }
}
