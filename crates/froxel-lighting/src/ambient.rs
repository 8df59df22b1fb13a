//! Ambient term added to every froxel before point lights.

/// Factor applied to `color * intensity` before upload.
pub const AMBIENT_SCALE: f32 = 0.1;

/// Uniform ambient light.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AmbientLight {
    /// Linear RGB color.
    pub color: glam::Vec3,
    pub intensity: f32,
}

impl Default for AmbientLight {
    fn default() -> Self {
        Self {
            color: glam::Vec3::ONE,
            intensity: 0.0,
        }
    }
}

impl AmbientLight {
    pub fn new(color: glam::Vec3, intensity: f32) -> Self {
        Self { color, intensity }
    }

    /// The single RGB triple the injection kernel consumes.
    pub fn packed(&self) -> glam::Vec3 {
        self.color * self.intensity * AMBIENT_SCALE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packed_applies_scale() {
        let ambient = AmbientLight::new(glam::Vec3::new(1.0, 0.5, 0.0), 2.0);
        let packed = ambient.packed();
        assert!((packed - glam::Vec3::new(0.2, 0.1, 0.0)).length() < 1e-6);
    }

    #[test]
    fn test_default_ambient_is_dark() {
        assert_eq!(AmbientLight::default().packed(), glam::Vec3::ZERO);
    }
}
