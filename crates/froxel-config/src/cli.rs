//! Command-line argument parsing.

use std::path::PathBuf;

use clap::Parser;

use crate::{BackendKind, Config};

/// Froxel fog command-line arguments.
///
/// CLI values override settings loaded from `config.ron`.
#[derive(Parser, Debug, Default)]
#[command(name = "froxel-demo", about = "Froxel volumetric fog renderer")]
pub struct CliArgs {
    /// Global density multiplier.
    #[arg(long)]
    pub density: Option<f32>,

    /// Constant (height-independent) fog density.
    #[arg(long)]
    pub constant_fog: Option<f32>,

    /// Global light intensity.
    #[arg(long)]
    pub intensity: Option<f32>,

    /// Ambient light intensity.
    #[arg(long)]
    pub ambient: Option<f32>,

    /// Fog volume near clip.
    #[arg(long)]
    pub near_clip: Option<f32>,

    /// Fog volume far clip.
    #[arg(long)]
    pub far_clip: Option<f32>,

    /// Volume resolution as `XxYxZ`, e.g. `160x90x128`.
    #[arg(long, value_parser = parse_resolution)]
    pub resolution: Option<[u32; 3]>,

    /// Compute backend.
    #[arg(long, value_enum)]
    pub backend: Option<BackendArg>,

    /// Output PNG path.
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Path to config directory (overrides default location).
    #[arg(long)]
    pub config: Option<PathBuf>,
}

/// Backend selection on the command line.
#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackendArg {
    Cpu,
    Gpu,
}

impl From<BackendArg> for BackendKind {
    fn from(arg: BackendArg) -> Self {
        match arg {
            BackendArg::Cpu => BackendKind::Cpu,
            BackendArg::Gpu => BackendKind::Gpu,
        }
    }
}

/// Parse a `XxYxZ` resolution string. Every axis must be non-zero.
pub fn parse_resolution(s: &str) -> Result<[u32; 3], String> {
    let parts: Vec<&str> = s.split(['x', 'X']).collect();
    let [x, y, z] = parts.as_slice() else {
        return Err(format!("expected XxYxZ, got '{s}'"));
    };
    let axis = |p: &str| -> Result<u32, String> {
        match p.trim().parse::<u32>() {
            Ok(0) => Err(format!("resolution axis must be non-zero in '{s}'")),
            Ok(v) => Ok(v),
            Err(e) => Err(format!("invalid resolution axis '{p}': {e}")),
        }
    };
    Ok([axis(x)?, axis(y)?, axis(z)?])
}

impl Config {
    /// Apply CLI overrides to a loaded config.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(d) = args.density {
            self.fog.global_density = d;
        }
        if let Some(c) = args.constant_fog {
            self.fog.constant_fog = c;
        }
        if let Some(i) = args.intensity {
            self.fog.global_intensity = i;
        }
        if let Some(a) = args.ambient {
            self.fog.ambient_light_intensity = a;
        }
        if let Some(n) = args.near_clip {
            self.fog.near_clip = n;
        }
        if let Some(f) = args.far_clip {
            self.fog.far_clip = f;
        }
        if let Some(res) = args.resolution {
            self.volume.resolution = res;
        }
        if let Some(backend) = args.backend {
            self.output.backend = backend.into();
        }
        if let Some(ref path) = args.output {
            self.output.path = path.clone();
        }
        if let Some(ref level) = args.log_level {
            self.debug.log_level = level.clone();
        }
    }
}
