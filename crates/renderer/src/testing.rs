//! Kernels shared by the GPU tests.

use std::path::PathBuf;

use tempfile::TempDir;

/// Fills every in-bounds pixel with `(time, time, time, 1)` using a 2x2 tile.
pub(crate) const FILL_KERNEL: &str = r"#version 450
layout(local_size_x = 2, local_size_y = 2) in;

layout(set = 0, binding = 0, rgba32f) uniform writeonly image2D destTex;
layout(set = 0, binding = 1) uniform KernelParams {
    float time;
    uint frame;
    uvec2 extent;
} params;

void main() {
    uvec2 gid = gl_GlobalInvocationID.xy;
    if (gid.x >= params.extent.x || gid.y >= params.extent.y) {
        return;
    }
    imageStore(destTex, ivec2(gid), vec4(params.time, params.time, params.time, 1.0));
}
";

/// Writes red on odd frames and blue on even frames.
pub(crate) const PARITY_KERNEL: &str = r"#version 450
layout(local_size_x = 8, local_size_y = 8) in;

layout(set = 0, binding = 0, rgba32f) uniform writeonly image2D destTex;
layout(set = 0, binding = 1) uniform KernelParams {
    float time;
    uint frame;
    uvec2 extent;
} params;

void main() {
    uvec2 gid = gl_GlobalInvocationID.xy;
    if (gid.x >= params.extent.x || gid.y >= params.extent.y) {
        return;
    }
    float odd = float(params.frame % 2u);
    imageStore(destTex, ivec2(gid), vec4(odd, 0.0, 1.0 - odd, 1.0));
}
";

/// Valid GLSL that reads a uniform at binding 2, which the kernel layout lacks.
pub(crate) const UNBOUND_KERNEL: &str = r"#version 450
layout(local_size_x = 2, local_size_y = 2) in;

layout(set = 0, binding = 0, rgba32f) uniform writeonly image2D destTex;
layout(set = 0, binding = 2) uniform Extra {
    float scale;
} extra;

void main() {
    imageStore(destTex, ivec2(gl_GlobalInvocationID.xy), vec4(extra.scale));
}
";

pub(crate) const BROKEN_KERNEL: &str = r"#version 450
layout(local_size_x = 2, local_size_y = 2) in;

void main() {
    this is not a statement
}
";

/// Writes `contents` into a fresh temporary directory.
///
/// The directory is removed when the returned guard drops.
pub(crate) fn scratch_file(name: &str, contents: &str) -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(name);
    std::fs::write(&path, contents).unwrap();
    (dir, path)
}
