//! Configuration structs with sensible defaults and RON persistence.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Upper bound of the intensity, fog-term and density sliders.
const MAX_FOG_TERM: f32 = 5.0;
/// Bounds of the near/far clip sliders.
const CLIP_RANGE: (f32, f32) = (0.1, 1000.0);

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Fog look: density, lighting and clip mapping.
    pub fog: FogConfig,
    /// Froxel grid settings.
    pub volume: VolumeConfig,
    /// Camera used by the demo scene.
    pub camera: CameraConfig,
    /// Lights in the demo scene. Only point lights contribute to fog.
    pub lights: Vec<LightConfig>,
    /// Where and how the demo renders.
    pub output: OutputConfig,
    /// Debug/development settings.
    pub debug: DebugConfig,
}

/// User-tunable fog surface.
///
/// Every scalar is non-negative and bounded; [`FogConfig::clamped`] applies the
/// documented slider ranges.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FogConfig {
    /// Multiplier on all in-scattered light. Range \[0, 5\].
    pub global_intensity: f32,
    /// Ambient light strength. Range \[0, 5\].
    pub ambient_light_intensity: f32,
    /// Linear RGB ambient colour.
    pub ambient_light_color: [f32; 3],
    /// Distance at which the froxel volume starts. Range \[0.1, 1000\].
    pub near_clip: f32,
    /// Distance at which the froxel volume ends. Range \[0.1, 1000\].
    pub far_clip: f32,
    /// Height-independent density term. Range \[0, 5\].
    pub constant_fog: f32,
    /// Scale of the exponential height term. Range \[0, 5\].
    pub height_fog_amount: f32,
    /// Falloff rate of the height term. Range \[0, 5\].
    pub height_fog_exponent: f32,
    /// Height at which the height term equals `height_fog_amount`. Range \[0, 5\].
    pub height_fog_offset: f32,
    /// Multiplier on the final density. Range \[0, 5\].
    pub global_density: f32,
}

/// Froxel grid configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct VolumeConfig {
    /// Grid resolution (x, y, depth slices).
    pub resolution: [u32; 3],
}

/// Camera for the demo scene.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CameraConfig {
    /// World-space position.
    pub position: [f32; 3],
    /// World-space point the camera looks at.
    pub look_at: [f32; 3],
    /// Vertical field of view in degrees.
    pub fov_y_degrees: f32,
    /// Camera near clip plane.
    pub near: f32,
    /// Camera far clip plane.
    pub far: f32,
}

/// Light type as written in config files.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum LightKindConfig {
    Point,
    Directional,
    Spot,
}

/// A scene light.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LightConfig {
    pub kind: LightKindConfig,
    /// World-space position.
    pub position: [f32; 3],
    /// Range of influence in world units.
    pub range: f32,
    /// Linear RGB colour.
    pub color: [f32; 3],
    /// Colour multiplier.
    pub intensity: f32,
}

/// Which compute backend the demo uses.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum BackendKind {
    /// Multithreaded reference implementation.
    #[default]
    Cpu,
    /// wgpu compute + fullscreen pass.
    Gpu,
}

/// Demo output settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OutputConfig {
    /// Image width in pixels.
    pub width: u32,
    /// Image height in pixels.
    pub height: u32,
    /// PNG file the composited frame is written to.
    pub path: PathBuf,
    /// Compute backend.
    pub backend: BackendKind,
}

/// Debug/development configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebugConfig {
    /// Log level override (e.g., "debug", "info", "warn").
    pub log_level: String,
}

// --- Default implementations ---

impl Default for FogConfig {
    fn default() -> Self {
        Self {
            global_intensity: 1.0,
            ambient_light_intensity: 0.0,
            ambient_light_color: [1.0, 1.0, 1.0],
            near_clip: 0.1,
            far_clip: 100.0,
            constant_fog: 0.0,
            height_fog_amount: 0.0,
            height_fog_exponent: 0.0,
            height_fog_offset: 0.0,
            global_density: 1.0,
        }
    }
}

impl Default for VolumeConfig {
    fn default() -> Self {
        Self {
            resolution: [160, 90, 128],
        }
    }
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            position: [0.0, 0.0, -5.0],
            look_at: [0.0, 0.0, 0.0],
            fov_y_degrees: 60.0,
            near: 0.1,
            far: 1000.0,
        }
    }
}

impl Default for LightConfig {
    fn default() -> Self {
        Self {
            kind: LightKindConfig::Point,
            position: [0.0, 0.0, 0.0],
            range: 10.0,
            color: [1.0, 1.0, 1.0],
            intensity: 1.0,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            width: 640,
            height: 360,
            path: PathBuf::from("froxel-fog.png"),
            backend: BackendKind::Cpu,
        }
    }
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

impl FogConfig {
    /// Clamp every field into its slider range.
    ///
    /// `far_clip` is additionally kept strictly above `near_clip` so the
    /// near/far ratio stays below one.
    pub fn clamped(&self) -> Self {
        let term = |v: f32| v.clamp(0.0, MAX_FOG_TERM);
        let clip = |v: f32| v.clamp(CLIP_RANGE.0, CLIP_RANGE.1);
        let near_clip = clip(self.near_clip);
        let far_clip = clip(self.far_clip).max(near_clip + CLIP_RANGE.0);
        Self {
            global_intensity: term(self.global_intensity),
            ambient_light_intensity: term(self.ambient_light_intensity),
            ambient_light_color: self.ambient_light_color.map(|c| c.max(0.0)),
            near_clip,
            far_clip,
            constant_fog: term(self.constant_fog),
            height_fog_amount: term(self.height_fog_amount),
            height_fog_exponent: term(self.height_fog_exponent),
            height_fog_offset: term(self.height_fog_offset),
            global_density: term(self.global_density),
        }
    }
}

// --- Load / Save / Reload ---

impl Config {
    /// Load config from the given directory, or create a default config file.
    pub fn load_or_create(config_dir: &Path) -> Result<Self, ConfigError> {
        let config_path = config_dir.join("config.ron");

        if config_path.exists() {
            let config = read_config(&config_path)?;
            log::info!("Loaded config from {}", config_path.display());
            Ok(config)
        } else {
            let config = Config::default();
            config.save(config_dir)?;
            log::info!("Created default config at {}", config_path.display());
            Ok(config)
        }
    }

    /// Save config to the given directory as `config.ron`.
    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        std::fs::create_dir_all(config_dir).map_err(|source| ConfigError::Write {
            path: config_dir.to_path_buf(),
            source,
        })?;

        let config_path = config_dir.join("config.ron");
        let pretty = ron::ser::PrettyConfig::new()
            .depth_limit(3)
            .separate_tuple_members(true)
            .enumerate_arrays(false);

        let serialized = ron::ser::to_string_pretty(self, pretty)?;

        std::fs::write(&config_path, serialized).map_err(|source| ConfigError::Write {
            path: config_path,
            source,
        })
    }

    /// Hot-reload: returns `Some(new_config)` if the file changed, `None` otherwise.
    pub fn reload(&self, config_dir: &Path) -> Result<Option<Self>, ConfigError> {
        let config_path = config_dir.join("config.ron");
        let new_config = read_config(&config_path)?;

        if &new_config != self {
            log::info!("Config reloaded with changes");
            Ok(Some(new_config))
        } else {
            Ok(None)
        }
    }
}

fn read_config(path: &Path) -> Result<Config, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    ron::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}
