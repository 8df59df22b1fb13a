//! Configuration system for the froxel fog renderer.
//!
//! Holds the user-tunable fog surface, the volume resolution and the demo scene.
//! Settings persist to disk as RON files and can be overridden from the command
//! line via clap.

mod cli;
mod config;
mod error;

pub use cli::{CliArgs, parse_resolution};
pub use config::{
    BackendKind, CameraConfig, Config, DebugConfig, FogConfig, LightConfig, LightKindConfig,
    OutputConfig, VolumeConfig,
};
pub use error::ConfigError;
