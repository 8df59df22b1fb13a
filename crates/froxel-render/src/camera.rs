//! Perspective camera state supplied by the host each frame.

use glam::{Mat3, Mat4, Quat, Vec2, Vec3};

/// A perspective camera.
#[derive(Debug, Clone)]
pub struct Camera {
    /// World-space position.
    pub position: Vec3,
    /// Rotation as a unit quaternion.
    pub rotation: Quat,
    /// Vertical field of view in radians.
    pub fov_y: f32,
    /// Width / height.
    pub aspect_ratio: f32,
    /// Near clip plane distance (always positive).
    pub near: f32,
    /// Far clip plane distance (always positive, > near).
    pub far: f32,
}

impl Camera {
    /// Place a camera at `position` looking at `target`.
    ///
    /// Falls back to `Vec3::Z` as the up hint when the view direction is
    /// parallel to `up`.
    pub fn looking_at(position: Vec3, target: Vec3, up: Vec3) -> Self {
        let forward = (target - position).normalize_or(Vec3::NEG_Z);
        let mut right = forward.cross(up);
        if right.length_squared() < 1e-8 {
            right = forward.cross(Vec3::Z);
        }
        let right = right.normalize();
        let up = right.cross(forward);
        Self {
            position,
            rotation: Quat::from_mat3(&Mat3::from_cols(right, up, -forward)),
            ..Self::default()
        }
    }

    /// Right-handed perspective projection with a `[0, 1]` depth range.
    pub fn projection_matrix(&self) -> Mat4 {
        Mat4::perspective_rh(self.fov_y, self.aspect_ratio, self.near, self.far)
    }

    /// The forward direction vector (-Z in camera space).
    pub fn forward(&self) -> Vec3 {
        self.rotation * Vec3::NEG_Z
    }

    /// The up direction vector (+Y in camera space).
    pub fn up(&self) -> Vec3 {
        self.rotation * Vec3::Y
    }

    /// The right direction vector (+X in camera space).
    pub fn right(&self) -> Vec3 {
        self.rotation * Vec3::X
    }

    /// Update the aspect ratio.
    pub fn set_aspect_ratio(&mut self, width: f32, height: f32) {
        self.aspect_ratio = width / height.max(f32::EPSILON);
    }

    /// Unproject a viewport point to world space.
    ///
    /// `viewport` is in `[0, 1]²` with `(0, 0)` at the bottom-left corner.
    /// `depth` is the distance along the view axis, not along the ray.
    pub fn viewport_to_world(&self, viewport: Vec2, depth: f32) -> Vec3 {
        let ndc = Vec3::new(viewport.x * 2.0 - 1.0, viewport.y * 2.0 - 1.0, 1.0);
        let view_far = self.projection_matrix().inverse().project_point3(ndc);
        let view_point = view_far * (depth / -view_far.z);
        self.position + self.rotation * view_point
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            fov_y: std::f32::consts::FRAC_PI_3,
            aspect_ratio: 16.0 / 9.0,
            near: 0.1,
            far: 1000.0,
        }
    }
}
