//! Renders one fogged frame of a synthetic scene to a PNG.
//!
//! Configuration is loaded from `config.ron` and can be overridden via CLI flags.
//! Run with `cargo run -p froxel-demo -- --constant-fog 0.5 --backend gpu`.

mod output;
mod scene;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use froxel_config::{BackendKind, CliArgs, Config};
use froxel_render::{
    ColorImage, CpuBackend, FogBackend, FogPipeline, FrameInput, FrameOutcome, VolumeResolution,
    WgpuBackend, init_headless_blocking,
};
use tracing::{error, info, warn};

use scene::Scene;

fn main() -> ExitCode {
    let args = CliArgs::parse();

    // Resolve config directory
    let config_dir = args.config.clone().unwrap_or_else(|| {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("froxel-fog")
    });

    // Load or create config, then apply CLI overrides
    let mut config = Config::load_or_create(&config_dir).unwrap_or_else(|e| {
        eprintln!("Failed to load config: {e}, using defaults");
        Config::default()
    });
    config.apply_cli_overrides(&args);

    let log_dir = config_dir.join("logs");
    froxel_log::init_logging(Some(&log_dir), cfg!(debug_assertions), Some(&config));

    let [x, y, z] = config.volume.resolution;
    let resolution = match VolumeResolution::new(x, y, z) {
        Ok(resolution) => resolution,
        Err(e) => {
            error!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let scene = Scene::from_config(&config);
    info!(
        "Rendering {}x{} frame with {} lights into a {x}x{y}x{z} volume",
        scene.source.width(),
        scene.source.height(),
        scene.lights.len()
    );

    let image = match config.output.backend {
        BackendKind::Gpu => render_gpu(&scene, resolution).unwrap_or_else(|| {
            warn!("GPU backend unavailable, falling back to CPU");
            render_cpu(&scene, resolution)
        }),
        BackendKind::Cpu => render_cpu(&scene, resolution),
    };

    match output::write_png(&config.output.path, &image) {
        Ok(()) => {
            info!("Wrote {}", config.output.path.display());
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn render_frame<B: FogBackend>(
    backend: &mut B,
    scene: &Scene,
    resolution: VolumeResolution,
    source: &B::Image,
    destination: &mut B::Image,
) {
    let mut pipeline = FogPipeline::new(scene.settings.clone(), resolution);
    let input = FrameInput {
        camera: &scene.camera,
        lights: &scene.lights,
    };
    match pipeline.render(backend, input, source, destination) {
        FrameOutcome::Composited => {
            info!("Fog composited with {} point lights", pipeline.light_count())
        }
        FrameOutcome::PassThrough(reason) => warn!("Frame passed through: {reason:?}"),
    }
}

fn render_cpu(scene: &Scene, resolution: VolumeResolution) -> ColorImage {
    let mut backend = CpuBackend::new();
    let mut destination = ColorImage::new(scene.source.width(), scene.source.height());
    render_frame(&mut backend, scene, resolution, &scene.source, &mut destination);
    destination
}

fn render_gpu(scene: &Scene, resolution: VolumeResolution) -> Option<ColorImage> {
    let context = match init_headless_blocking() {
        Ok(context) => context,
        Err(e) => {
            warn!("Failed to initialize GPU: {e}");
            return None;
        }
    };
    let mut backend = match WgpuBackend::new(&context) {
        Ok(backend) => backend,
        Err(e) => {
            warn!("{e}");
            return None;
        }
    };
    let source = backend.upload_image(&scene.source);
    let mut destination = backend.create_image(scene.source.width(), scene.source.height());
    render_frame(&mut backend, scene, resolution, &source, &mut destination);
    match backend.read_image(&destination) {
        Ok(image) => Some(image),
        Err(e) => {
            warn!("{e}");
            None
        }
    }
}
