//! Frustum ray reconstruction: the four far-plane corner rays that make the
//! grid frustum-aligned.
//!
//! Each ray runs from the camera to a far-plane corner at the fog far clip, so
//! its length encodes the distance to that corner. The injection kernel
//! interpolates them bilinearly per voxel column and scales by the slice depth.

use glam::{Vec2, Vec3};

use crate::camera::Camera;

/// Far-plane corner UVs, counter-clockwise from the bottom-left.
pub const FRUSTUM_CORNER_UVS: [Vec2; 4] = [
    Vec2::new(0.0, 0.0),
    Vec2::new(1.0, 0.0),
    Vec2::new(1.0, 1.0),
    Vec2::new(0.0, 1.0),
];

/// Camera-relative rays to the far-plane corners. Not normalized.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrustumRays {
    pub rays: [Vec3; 4],
}

impl FrustumRays {
    /// Unproject the four corner UVs at `far_clip` and subtract the camera
    /// position.
    pub fn compute(camera: &Camera, far_clip: f32) -> Self {
        let rays =
            FRUSTUM_CORNER_UVS.map(|uv| camera.viewport_to_world(uv, far_clip) - camera.position);
        Self { rays }
    }

    /// Bilinearly interpolate the corner rays at column `uv`.
    pub fn interpolate(&self, uv: Vec2) -> Vec3 {
        let [bottom_left, bottom_right, top_right, top_left] = self.rays;
        let bottom = bottom_left.lerp(bottom_right, uv.x);
        let top = top_left.lerp(top_right, uv.x);
        bottom.lerp(top, uv.y)
    }

    /// Rays as `vec4` rows for uniform upload (w = 0).
    pub fn to_uniform(&self) -> [[f32; 4]; 4] {
        self.rays.map(|r| r.extend(0.0).to_array())
    }
}
