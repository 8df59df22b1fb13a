//! Scene light descriptors as supplied by the host.

/// Kind of light source.
///
/// Only [`LightKind::Point`] contributes to fog injection; the other kinds are
/// carried so hosts can pass their full light list unfiltered.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LightKind {
    Point,
    Directional,
    Spot,
}

/// A light in the host scene.
#[derive(Clone, Debug)]
pub struct LightSource {
    pub kind: LightKind,
    /// World-space position.
    pub position: glam::Vec3,
    /// Range of influence in world units. Must be positive; non-positive ranges
    /// are clamped during collection.
    pub range: f32,
    /// Linear RGB color.
    pub color: glam::Vec3,
    /// Color multiplier.
    pub intensity: f32,
}

impl LightSource {
    /// A white point light of unit intensity.
    pub fn point(position: glam::Vec3, range: f32) -> Self {
        Self {
            kind: LightKind::Point,
            position,
            range,
            color: glam::Vec3::ONE,
            intensity: 1.0,
        }
    }

    /// Replace the color.
    pub fn with_color(mut self, color: glam::Vec3) -> Self {
        self.color = color;
        self
    }

    /// Replace the intensity.
    pub fn with_intensity(mut self, intensity: f32) -> Self {
        self.intensity = intensity;
        self
    }

    /// Linear color premultiplied by intensity.
    pub fn radiant_color(&self) -> glam::Vec3 {
        self.color * self.intensity
    }
}
