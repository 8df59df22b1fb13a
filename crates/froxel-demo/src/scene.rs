//! Demo scene: camera, lights and a synthetic source image built from config.

use froxel_config::{CameraConfig, Config, FogConfig, LightConfig, LightKindConfig};
use froxel_lighting::{AmbientLight, LightKind, LightSource};
use froxel_render::{Camera, ColorImage, FogParameters, FogSettings};
use glam::{Vec2, Vec3, Vec4};

/// Height of the checkered ground plane.
pub const GROUND_HEIGHT: f32 = -1.0;

const SKY_HORIZON: Vec3 = Vec3::new(0.55, 0.65, 0.8);
const SKY_ZENITH: Vec3 = Vec3::new(0.15, 0.25, 0.5);

/// Everything the demo renders one frame from.
pub struct Scene {
    pub camera: Camera,
    pub lights: Vec<LightSource>,
    pub settings: FogSettings,
    pub source: ColorImage,
}

impl Scene {
    pub fn from_config(config: &Config) -> Self {
        let width = config.output.width.max(1);
        let height = config.output.height.max(1);
        let camera = camera_from_config(&config.camera, width, height);
        let lights = if config.lights.is_empty() {
            vec![light_from_config(&LightConfig::default())]
        } else {
            config.lights.iter().map(light_from_config).collect()
        };
        let source = source_image(&camera, width, height);
        Self {
            camera,
            lights,
            settings: settings_from_config(&config.fog),
            source,
        }
    }
}

/// Map the fog config onto pipeline settings, applying the slider ranges.
pub fn settings_from_config(fog: &FogConfig) -> FogSettings {
    let fog = fog.clamped();
    FogSettings {
        global_intensity: fog.global_intensity,
        ambient: AmbientLight::new(
            Vec3::from_array(fog.ambient_light_color),
            fog.ambient_light_intensity,
        ),
        near_clip: fog.near_clip,
        far_clip: fog.far_clip,
        fog: FogParameters {
            constant_density: fog.constant_fog,
            height_fog_amount: fog.height_fog_amount,
            height_fog_exponent: fog.height_fog_exponent,
            height_fog_offset: fog.height_fog_offset,
            global_density_scale: fog.global_density,
        },
    }
}

pub fn camera_from_config(config: &CameraConfig, width: u32, height: u32) -> Camera {
    let mut camera = Camera::looking_at(
        Vec3::from_array(config.position),
        Vec3::from_array(config.look_at),
        Vec3::Y,
    );
    camera.fov_y = config.fov_y_degrees.to_radians();
    camera.near = config.near;
    camera.far = config.far;
    camera.set_aspect_ratio(width as f32, height as f32);
    camera
}

pub fn light_from_config(config: &LightConfig) -> LightSource {
    LightSource {
        kind: match config.kind {
            LightKindConfig::Point => LightKind::Point,
            LightKindConfig::Directional => LightKind::Directional,
            LightKindConfig::Spot => LightKind::Spot,
        },
        position: Vec3::from_array(config.position),
        range: config.range,
        color: Vec3::from_array(config.color),
        intensity: config.intensity,
    }
}

/// View depth at which the pixel ray through `viewport` meets the ground, if
/// it does before the camera far plane.
pub fn ground_depth(camera: &Camera, viewport: Vec2) -> Option<f32> {
    // One unit of view depth along this pixel's ray.
    let step = camera.viewport_to_world(viewport, 1.0) - camera.position;
    if step.y >= -1e-6 {
        return None;
    }
    let depth = (GROUND_HEIGHT - camera.position.y) / step.y;
    (depth > 0.0 && depth <= camera.far).then_some(depth)
}

/// A checkered ground under a gradient sky, with linear depth attached.
pub fn source_image(camera: &Camera, width: u32, height: u32) -> ColorImage {
    let viewport = |x: u32, y: u32| {
        Vec2::new(
            (x as f32 + 0.5) / width as f32,
            1.0 - (y as f32 + 0.5) / height as f32,
        )
    };
    ColorImage::from_fn(width, height, |x, y| {
        let uv = viewport(x, y);
        match ground_depth(camera, uv) {
            Some(depth) => {
                let hit = camera.viewport_to_world(uv, depth);
                let checker = (hit.x.floor() + hit.z.floor()) as i32 & 1;
                let shade = if checker == 0 { 0.8 } else { 0.3 };
                Vec4::new(shade, shade, shade, 1.0)
            }
            None => SKY_HORIZON.lerp(SKY_ZENITH, uv.y).extend(1.0),
        }
    })
    .with_depth(|x, y| {
        ground_depth(camera, viewport(x, y)).map_or(1.0, |depth| depth / camera.far)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_follow_config() {
        let fog = FogConfig {
            constant_fog: 1.0,
            ambient_light_intensity: 2.0,
            ambient_light_color: [1.0, 0.0, 0.0],
            far_clip: 20.0,
            ..FogConfig::default()
        };
        let settings = settings_from_config(&fog);
        assert_eq!(settings.fog.constant_density, 1.0);
        assert_eq!(settings.far_clip, 20.0);
        assert_eq!(settings.ambient.packed(), Vec3::new(0.2, 0.0, 0.0));
    }

    #[test]
    fn test_settings_are_clamped() {
        let fog = FogConfig {
            constant_fog: -1.0,
            global_density: 50.0,
            ..FogConfig::default()
        };
        let settings = settings_from_config(&fog);
        assert_eq!(settings.fog.constant_density, 0.0);
        assert_eq!(settings.fog.global_density_scale, 5.0);
    }

    #[test]
    fn test_empty_light_list_gets_default_light() {
        let scene = Scene::from_config(&Config {
            output: froxel_config::OutputConfig {
                width: 8,
                height: 4,
                ..Default::default()
            },
            ..Config::default()
        });
        assert_eq!(scene.lights.len(), 1);
        assert_eq!(scene.lights[0].kind, LightKind::Point);
        assert_eq!(scene.lights[0].position, Vec3::ZERO);
        assert_eq!(scene.source.width(), 8);
    }

    #[test]
    fn test_light_kinds_map() {
        let spot = light_from_config(&LightConfig {
            kind: LightKindConfig::Spot,
            ..LightConfig::default()
        });
        assert_eq!(spot.kind, LightKind::Spot);
    }

    #[test]
    fn test_ground_below_horizon_only() {
        let camera = camera_from_config(&CameraConfig::default(), 16, 9);
        let down = ground_depth(&camera, Vec2::new(0.5, 0.0)).unwrap();
        assert!(down > 0.0);
        assert!(ground_depth(&camera, Vec2::new(0.5, 1.0)).is_none());
    }

    #[test]
    fn test_source_depth_is_linear01() {
        let camera = camera_from_config(&CameraConfig::default(), 16, 9);
        let image = source_image(&camera, 16, 9);
        assert_eq!(image.depth_at(8, 0), Some(1.0));
        let ground = image.depth_at(8, 8).unwrap();
        assert!(ground > 0.0 && ground < 0.01);
    }
}
