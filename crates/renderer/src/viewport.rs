//! Window-size dependent transforms, recomputed on every resize.

use tracing::debug;

const Z_NEAR: f32 = 1.0;
const Z_FAR: f32 = 1000.0;
const EYE_DISTANCE: f32 = 5.0;

/// Column-major 4x4 matrix.
pub type Mat4 = [[f32; 4]; 4];

/// Viewport rectangle plus the perspective projection and modelview derived from it.
///
/// The blit draws in clip space and ignores both matrices; they are kept so
/// kernels or overlays that want a camera can read one consistent with the
/// window's aspect ratio.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    width: u32,
    height: u32,
    projection: Mat4,
    modelview: Mat4,
}

impl Viewport {
    pub fn new(width: u32, height: u32) -> Self {
        let mut viewport = Self {
            width: 1,
            height: 1,
            projection: IDENTITY,
            modelview: IDENTITY,
        };
        viewport.reshape(width, height);
        viewport
    }

    /// Recomputes the transforms for a new window size.
    ///
    /// Returns false and keeps the previous state for a zero-sized (minimised) window.
    pub fn reshape(&mut self, width: u32, height: u32) -> bool {
        if width == 0 || height == 0 {
            return false;
        }
        let aspect = height as f32 / width as f32;
        let xmax = Z_NEAR * 0.5;
        self.width = width;
        self.height = height;
        self.projection = frustum(-xmax, xmax, -xmax * aspect, xmax * aspect, Z_NEAR, Z_FAR);
        self.modelview = translation(0.0, 0.0, -EYE_DISTANCE);
        debug!(width, height, aspect, "reshaped viewport");
        true
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn projection(&self) -> &Mat4 {
        &self.projection
    }

    pub fn modelview(&self) -> &Mat4 {
        &self.modelview
    }
}

const IDENTITY: Mat4 = [
    [1.0, 0.0, 0.0, 0.0],
    [0.0, 1.0, 0.0, 0.0],
    [0.0, 0.0, 1.0, 0.0],
    [0.0, 0.0, 0.0, 1.0],
];

fn frustum(left: f32, right: f32, bottom: f32, top: f32, near: f32, far: f32) -> Mat4 {
    let width = right - left;
    let height = top - bottom;
    let depth = far - near;
    [
        [2.0 * near / width, 0.0, 0.0, 0.0],
        [0.0, 2.0 * near / height, 0.0, 0.0],
        [
            (right + left) / width,
            (top + bottom) / height,
            -(far + near) / depth,
            -1.0,
        ],
        [0.0, 0.0, -2.0 * far * near / depth, 0.0],
    ]
}

fn translation(x: f32, y: f32, z: f32) -> Mat4 {
    let mut matrix = IDENTITY;
    matrix[3] = [x, y, z, 1.0];
    matrix
}
