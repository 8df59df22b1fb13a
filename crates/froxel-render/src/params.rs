//! Fog settings and the per-frame parameter block shared by every stage.

use froxel_lighting::AmbientLight;
use glam::{Vec2, Vec3};

use crate::camera::Camera;
use crate::frustum::FrustumRays;
use crate::volume::VolumeResolution;

/// Upper bound on the height-falloff exponent so `exp` stays finite.
const MAX_FALLOFF_EXPONENT: f32 = 80.0;

/// Largest extinction written to a volume. Half-float texels top out at 65504,
/// and at this density a single slice is already opaque.
pub const MAX_DENSITY: f32 = 1.0e3;

/// Density model: a constant term plus an exponential height term.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FogParameters {
    pub constant_density: f32,
    pub height_fog_amount: f32,
    pub height_fog_exponent: f32,
    pub height_fog_offset: f32,
    pub global_density_scale: f32,
}

impl Default for FogParameters {
    fn default() -> Self {
        Self {
            constant_density: 0.0,
            height_fog_amount: 0.0,
            height_fog_exponent: 0.0,
            height_fog_offset: 0.0,
            global_density_scale: 1.0,
        }
    }
}

impl FogParameters {
    /// Extinction at world height `height`, in `[0, MAX_DENSITY]`.
    pub fn density_at(&self, height: f32) -> f32 {
        let exponent = (-self.height_fog_exponent * (height - self.height_fog_offset))
            .min(MAX_FALLOFF_EXPONENT);
        let base = (self.constant_density + self.height_fog_amount * exponent.exp()).max(0.0);
        (base * self.global_density_scale).clamp(0.0, MAX_DENSITY)
    }

    /// `[constant, height exponent, height offset, height amount]`.
    pub fn to_uniform(&self) -> [f32; 4] {
        [
            self.constant_density,
            self.height_fog_exponent,
            self.height_fog_offset,
            self.height_fog_amount,
        ]
    }
}

/// Maps the fixed volume depth range onto the fog and camera clip planes.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ClipMapping {
    /// Distance at which slice 0 sits.
    pub near_clip: f32,
    /// Distance reached by the last slice boundary.
    pub far_clip: f32,
    /// The rendering camera's far plane.
    pub camera_far_clip: f32,
}

impl ClipMapping {
    /// `near_clip / far_clip`.
    pub fn near_over_far(&self) -> f32 {
        self.near_clip / self.far_clip
    }

    /// `camera_far_clip / far_clip`.
    pub fn depth_ratio(&self) -> f32 {
        self.camera_far_clip / self.far_clip
    }

    /// Fraction of the far-clip ray the volume spans past the near clip.
    ///
    /// Zero when the near clip lies at or beyond the far clip.
    pub fn depth_span(&self) -> f32 {
        (1.0 - self.near_over_far()).max(0.0)
    }

    /// Fraction of the far-clip ray reached at normalized volume depth `t`.
    pub fn depth_fraction(&self, t: f32) -> f32 {
        self.near_over_far() + self.depth_span() * t
    }

    /// Normalized volume depth for a pixel.
    ///
    /// `linear01` is view depth divided by the camera far plane. Without depth
    /// the far clip is used.
    pub fn volume_depth(&self, linear01: Option<f32>) -> f32 {
        let Some(linear01) = linear01 else {
            return 1.0;
        };
        let span = self.depth_span();
        if span <= 0.0 {
            return 1.0;
        }
        let d = linear01 * self.depth_ratio();
        ((d - self.near_over_far()) / span).clamp(0.0, 1.0)
    }
}

/// The user-tunable fog surface, in pipeline terms.
#[derive(Clone, Debug, PartialEq)]
pub struct FogSettings {
    pub global_intensity: f32,
    pub ambient: AmbientLight,
    pub near_clip: f32,
    pub far_clip: f32,
    pub fog: FogParameters,
}

impl Default for FogSettings {
    fn default() -> Self {
        Self {
            global_intensity: 1.0,
            ambient: AmbientLight::default(),
            near_clip: 0.1,
            far_clip: 100.0,
            fog: FogParameters::default(),
        }
    }
}

/// Everything the three stages read for one frame. Rebuilt every frame.
#[derive(Clone, Debug)]
pub struct FrameParams {
    pub resolution: VolumeResolution,
    pub camera_position: Vec3,
    pub rays: FrustumRays,
    pub fog: FogParameters,
    /// Ambient color premultiplied by intensity and the ambient scale.
    pub ambient: Vec3,
    pub global_intensity: f32,
    pub clip: ClipMapping,
}

impl FrameParams {
    /// Derive the frame parameters from settings and the current camera.
    pub fn new(settings: &FogSettings, camera: &Camera, resolution: VolumeResolution) -> Self {
        Self {
            resolution,
            camera_position: camera.position,
            rays: FrustumRays::compute(camera, settings.far_clip),
            fog: settings.fog,
            ambient: settings.ambient.packed(),
            global_intensity: settings.global_intensity,
            clip: ClipMapping {
                near_clip: settings.near_clip,
                far_clip: settings.far_clip,
                camera_far_clip: camera.far,
            },
        }
    }

    /// Normalized UV of voxel column `(x, y)`.
    pub fn column_uv(&self, x: u32, y: u32) -> Vec2 {
        Vec2::new(
            x as f32 / self.resolution.x as f32,
            y as f32 / self.resolution.y as f32,
        )
    }

    /// Interpolated far-clip ray for column `(x, y)`.
    pub fn column_ray(&self, x: u32, y: u32) -> Vec3 {
        self.rays.interpolate(self.column_uv(x, y))
    }

    /// World-space distance between consecutive slices of column `(x, y)`.
    pub fn slice_length(&self, x: u32, y: u32) -> f32 {
        self.column_ray(x, y).length() * self.clip.depth_span() / self.resolution.z as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_density_only() {
        let fog = FogParameters {
            constant_density: 0.7,
            ..FogParameters::default()
        };
        assert!((fog.density_at(-100.0) - 0.7).abs() < 1e-6);
        assert!((fog.density_at(100.0) - 0.7).abs() < 1e-6);
    }

    #[test]
    fn test_height_fog_decays_upward() {
        let fog = FogParameters {
            height_fog_amount: 1.0,
            height_fog_exponent: 0.5,
            height_fog_offset: 2.0,
            ..FogParameters::default()
        };
        assert!((fog.density_at(2.0) - 1.0).abs() < 1e-6);
        assert!(fog.density_at(10.0) < fog.density_at(3.0));
        assert!(fog.density_at(0.0) > 1.0);
    }

    #[test]
    fn test_density_never_negative() {
        let fog = FogParameters {
            constant_density: -3.0,
            height_fog_amount: 1.0,
            height_fog_exponent: 1.0,
            height_fog_offset: 0.0,
            global_density_scale: 1.0,
        };
        for h in [-1.0, 0.0, 5.0, 1000.0] {
            assert!(fog.density_at(h) >= 0.0);
        }
        let negative_scale = FogParameters {
            constant_density: 1.0,
            global_density_scale: -2.0,
            ..FogParameters::default()
        };
        assert_eq!(negative_scale.density_at(0.0), 0.0);
    }

    #[test]
    fn test_density_stays_finite_far_below_offset() {
        let fog = FogParameters {
            height_fog_amount: 1.0,
            height_fog_exponent: 5.0,
            ..FogParameters::default()
        };
        assert!(fog.density_at(-1.0e6).is_finite());
    }

    #[test]
    fn test_height_fog_density_fits_half_float() {
        // Slider maxima: amount 5, exponent 5, global scale 5.
        let fog = FogParameters {
            height_fog_amount: 5.0,
            height_fog_exponent: 5.0,
            global_density_scale: 5.0,
            ..FogParameters::default()
        };
        for h in [-20.0, -5.0, -1.0, 0.0] {
            let density = fog.density_at(h);
            assert!(density <= MAX_DENSITY, "density {density} at height {h}");
        }
        assert_eq!(fog.density_at(-20.0), MAX_DENSITY);
    }

    #[test]
    fn test_zero_amount_with_huge_exponent_adds_nothing() {
        let fog = FogParameters {
            constant_density: 0.25,
            height_fog_amount: 0.0,
            height_fog_exponent: 5.0,
            ..FogParameters::default()
        };
        assert_eq!(fog.density_at(-1.0e6), 0.25);
    }

    #[test]
    fn test_clip_mapping_endpoints() {
        let clip = ClipMapping {
            near_clip: 1.0,
            far_clip: 20.0,
            camera_far_clip: 100.0,
        };
        assert!((clip.depth_fraction(0.0) - 0.05).abs() < 1e-6);
        assert!((clip.depth_fraction(1.0) - 1.0).abs() < 1e-6);
        assert!((clip.depth_ratio() - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_volume_depth_inverts_depth_fraction() {
        let clip = ClipMapping {
            near_clip: 1.0,
            far_clip: 20.0,
            camera_far_clip: 100.0,
        };
        for t in [0.0, 0.25, 0.5, 1.0] {
            let linear01 = clip.depth_fraction(t) / clip.depth_ratio();
            assert!((clip.volume_depth(Some(linear01)) - t).abs() < 1e-5);
        }
    }

    #[test]
    fn test_volume_depth_clamps_and_defaults_to_far() {
        let clip = ClipMapping {
            near_clip: 1.0,
            far_clip: 20.0,
            camera_far_clip: 100.0,
        };
        assert_eq!(clip.volume_depth(None), 1.0);
        assert_eq!(clip.volume_depth(Some(0.0)), 0.0);
        assert_eq!(clip.volume_depth(Some(1.0)), 1.0);
    }

    #[test]
    fn test_near_beyond_far_collapses_span() {
        let clip = ClipMapping {
            near_clip: 50.0,
            far_clip: 10.0,
            camera_far_clip: 100.0,
        };
        assert_eq!(clip.depth_span(), 0.0);
        assert_eq!(clip.depth_fraction(0.0), clip.depth_fraction(1.0));
        assert_eq!(clip.volume_depth(Some(0.3)), 1.0);

        let settings = FogSettings {
            near_clip: 50.0,
            far_clip: 10.0,
            ..FogSettings::default()
        };
        let res = VolumeResolution::new(2, 2, 8).unwrap();
        let frame = FrameParams::new(&settings, &Camera::default(), res);
        assert_eq!(frame.slice_length(0, 0), 0.0);
    }

    #[test]
    fn test_slice_length_center_column() {
        let camera = Camera::default();
        let settings = FogSettings {
            near_clip: 0.0,
            far_clip: 64.0,
            ..FogSettings::default()
        };
        let res = VolumeResolution::new(2, 2, 64).unwrap();
        let frame = FrameParams::new(&settings, &camera, res);
        // Column (1, 1) has uv (0.5, 0.5): the central ray, 64 units long.
        assert!((frame.slice_length(1, 1) - 1.0).abs() < 1e-4);
    }
}
