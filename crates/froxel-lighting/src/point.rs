//! Point lights: packed GPU parameters, inverse-square attenuation, and the
//! per-frame collector that feeds the injection stage.
//!
//! [`PointLightCollector`] filters the host light list down to point lights,
//! preserving order, and packs each into a [`PointLightParams`]. The packed slice
//! is what gets uploaded into the light buffer.

use bytemuck::{Pod, Zeroable};

use crate::{LightKind, LightSource};

/// Smallest range accepted for a point light. Non-positive ranges are clamped
/// here so `1 / range²` stays finite.
pub const MIN_LIGHT_RANGE: f32 = 1e-4;

/// Per-light GPU data, 32 bytes, std430-compatible.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct PointLightParams {
    /// World-space position.
    pub position: [f32; 3],
    /// Precomputed `1 / range²`.
    pub inverse_range_squared: f32,
    /// Linear RGB color, premultiplied by intensity.
    pub color: [f32; 3],
    /// Keeps the 16-byte stride of the `vec3` + scalar pairs.
    pub _padding: f32,
}

impl PointLightParams {
    /// Pack a light. The range is clamped to [`MIN_LIGHT_RANGE`].
    pub fn from_light(light: &LightSource) -> Self {
        let color = light.radiant_color();
        Self {
            position: light.position.to_array(),
            inverse_range_squared: inverse_range_squared(light.range),
            color: color.to_array(),
            _padding: 0.0,
        }
    }

    pub fn position(&self) -> glam::Vec3 {
        glam::Vec3::from_array(self.position)
    }

    pub fn color(&self) -> glam::Vec3 {
        glam::Vec3::from_array(self.color)
    }

    /// Radiance this light contributes at `point`.
    pub fn radiance_at(&self, point: glam::Vec3) -> glam::Vec3 {
        let distance_sq = self.position().distance_squared(point);
        self.color() * attenuation(distance_sq, self.inverse_range_squared)
    }
}

/// `1 / range²` with the range clamped to [`MIN_LIGHT_RANGE`].
pub fn inverse_range_squared(range: f32) -> f32 {
    let range = if range_needs_clamp(range) {
        MIN_LIGHT_RANGE
    } else {
        range
    };
    1.0 / (range * range)
}

fn range_needs_clamp(range: f32) -> bool {
    range.is_nan() || range < MIN_LIGHT_RANGE
}

/// Inverse-square falloff: `1 / (1 + d² / range²)`.
///
/// Equals 1.0 at the light, 0.5 at one range away, and approaches zero as the
/// distance grows. Takes the squared distance to avoid a square root per light
/// per voxel.
pub fn attenuation(distance_sq: f32, inverse_range_squared: f32) -> f32 {
    1.0 / (1.0 + distance_sq * inverse_range_squared)
}

/// Collects point lights from the host light list each frame.
///
/// The output vector is reused across frames so a stable light count never
/// reallocates on the CPU side either.
///
/// Lights whose range gets clamped are reported once, and again only when the
/// number of such lights changes, so a bad light does not warn every frame.
#[derive(Debug, Default)]
pub struct PointLightCollector {
    params: Vec<PointLightParams>,
    clamped_ranges: usize,
    range_warnings: u32,
}

impl PointLightCollector {
    /// Create an empty collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Pack every point light in `lights`, in source order.
    pub fn collect(&mut self, lights: &[LightSource]) -> &[PointLightParams] {
        self.params.clear();
        let mut clamped = 0;
        for light in lights.iter().filter(|light| light.kind == LightKind::Point) {
            if range_needs_clamp(light.range) {
                clamped += 1;
            }
            self.params.push(PointLightParams::from_light(light));
        }
        if clamped != self.clamped_ranges {
            if clamped > 0 {
                log::warn!(
                    "{clamped} point light(s) have a non-positive range, clamping to {MIN_LIGHT_RANGE}"
                );
                self.range_warnings += 1;
            }
            self.clamped_ranges = clamped;
        }
        &self.params
    }

    /// Point lights whose range was clamped by the last collect.
    pub fn clamped_ranges(&self) -> usize {
        self.clamped_ranges
    }

    /// Lights packed by the last [`collect`](Self::collect).
    pub fn params(&self) -> &[PointLightParams] {
        &self.params
    }

    /// Number of point lights packed by the last collect.
    pub fn len(&self) -> usize {
        self.params.len()
    }

    /// Returns `true` if the last collect found no point lights.
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }
}
