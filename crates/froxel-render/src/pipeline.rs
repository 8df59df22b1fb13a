//! Per-frame orchestration of the three fog stages.
//!
//! [`FogPipeline::render`] is the host callback: it always leaves a valid
//! image in the destination, either fog-composited or a copy of the source.

use froxel_lighting::{LightSource, PointLightCollector};

use crate::backend::{FogBackend, FogError};
use crate::camera::Camera;
use crate::params::{FogSettings, FrameParams};
use crate::volume::{VolumeGrid, VolumePair, VolumeResolution};

/// Host-supplied state for one frame.
#[derive(Clone, Copy, Debug)]
pub struct FrameInput<'a> {
    pub camera: &'a Camera,
    pub lights: &'a [LightSource],
}

/// Why a frame was copied through instead of composited.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PassThroughReason {
    /// The platform check failed on an earlier frame.
    Disabled,
    /// The platform check failed on this frame.
    Unsupported,
    /// A volume or the light buffer could not be allocated this frame.
    AllocationFailure,
}

/// What [`FogPipeline::render`] wrote to the destination.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameOutcome {
    Composited,
    PassThrough(PassThroughReason),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Support {
    Unchecked,
    Supported,
    Unsupported,
}

struct LightBufferSlot<L> {
    buffer: L,
    light_count: usize,
}

/// Owns the persistent fog resources and runs inject, scatter and composite
/// once per frame.
pub struct FogPipeline<B: FogBackend> {
    settings: FogSettings,
    resolution: VolumeResolution,
    support: Support,
    grid: VolumeGrid<B::Volume>,
    light_buffer: Option<LightBufferSlot<B::LightBuffer>>,
    light_buffer_allocations: u64,
    collector: PointLightCollector,
}

impl<B: FogBackend> FogPipeline<B> {
    pub fn new(settings: FogSettings, resolution: VolumeResolution) -> Self {
        Self {
            settings,
            resolution,
            support: Support::Unchecked,
            grid: VolumeGrid::new(),
            light_buffer: None,
            light_buffer_allocations: 0,
            collector: PointLightCollector::new(),
        }
    }

    pub fn settings(&self) -> &FogSettings {
        &self.settings
    }

    /// Replace the tunable settings. Takes effect on the next frame.
    pub fn set_settings(&mut self, settings: FogSettings) {
        self.settings = settings;
    }

    pub fn resolution(&self) -> VolumeResolution {
        self.resolution
    }

    /// Change the grid resolution. Both volumes are reallocated on the next frame.
    pub fn set_resolution(&mut self, resolution: VolumeResolution) {
        if resolution != self.resolution {
            log::debug!(
                "Fog resolution set to {}x{}x{}",
                resolution.x,
                resolution.y,
                resolution.z
            );
            self.resolution = resolution;
        }
    }

    /// `false` once the platform check has failed. Never becomes `true` again.
    pub fn is_enabled(&self) -> bool {
        self.support != Support::Unsupported
    }

    /// The current volumes, if allocated.
    pub fn volumes(&self) -> Option<&VolumePair<B::Volume>> {
        self.grid.volumes()
    }

    /// How many times the volume pair has been (re)created.
    pub fn volume_allocations(&self) -> u64 {
        self.grid.allocations()
    }

    /// How many times the light buffer has been (re)created.
    pub fn light_buffer_allocations(&self) -> u64 {
        self.light_buffer_allocations
    }

    /// Point lights collected by the last frame that ran the fog stages.
    ///
    /// A frame that then passed through on an allocation failure still counts.
    /// Frames skipped because fog is unsupported leave it unchanged.
    pub fn light_count(&self) -> usize {
        self.collector.len()
    }

    /// Run one frame. `destination` always ends up holding a valid image.
    pub fn render(
        &mut self,
        backend: &mut B,
        input: FrameInput<'_>,
        source: &B::Image,
        destination: &mut B::Image,
    ) -> FrameOutcome {
        match self.support {
            Support::Unsupported => {
                return pass_through(backend, source, destination, PassThroughReason::Disabled);
            }
            Support::Unchecked => match backend.check_support(self.resolution) {
                Ok(()) => self.support = Support::Supported,
                Err(e) => {
                    log::error!("Volumetric fog disabled: {e}");
                    self.support = Support::Unsupported;
                    return pass_through(
                        backend,
                        source,
                        destination,
                        PassThroughReason::Unsupported,
                    );
                }
            },
            Support::Supported => {}
        }

        match self.run_stages(backend, input, source, destination) {
            Ok(()) => FrameOutcome::Composited,
            Err(e) => {
                log::warn!("Fog frame skipped: {e}");
                pass_through(
                    backend,
                    source,
                    destination,
                    PassThroughReason::AllocationFailure,
                )
            }
        }
    }

    fn run_stages(
        &mut self,
        backend: &mut B,
        input: FrameInput<'_>,
        source: &B::Image,
        destination: &mut B::Image,
    ) -> Result<(), FogError> {
        let lights = self.collector.collect(input.lights);
        let light_count = lights.len();

        let stale = self
            .light_buffer
            .as_ref()
            .is_none_or(|slot| slot.light_count != light_count);
        if stale {
            self.light_buffer = None;
            let buffer = backend.create_light_buffer(light_count)?;
            self.light_buffer_allocations += 1;
            log::debug!("Light buffer allocated for {light_count} point lights");
            self.light_buffer = Some(LightBufferSlot {
                buffer,
                light_count,
            });
        }
        let Some(slot) = self.light_buffer.as_mut() else {
            return Err(FogError::AllocationFailure {
                resource: "fog-light-buffer",
                reason: "light buffer missing after allocation".to_string(),
            });
        };

        let volumes = self.grid.ensure_allocated(backend, self.resolution)?;
        let frame = FrameParams::new(&self.settings, input.camera, self.resolution);

        backend.begin_frame();
        backend.upload_lights(&mut slot.buffer, lights);
        log::trace!("Dispatching fog inject with {light_count} point lights");
        backend.dispatch_inject(&frame, &slot.buffer, light_count, &mut volumes.injection);
        log::trace!("Dispatching fog scatter");
        backend.dispatch_scatter(&frame, &volumes.injection, &mut volumes.scatter);
        log::trace!("Compositing fog");
        backend.composite(&frame, &volumes.scatter, source, destination);
        backend.end_frame();
        Ok(())
    }
}

fn pass_through<B: FogBackend>(
    backend: &mut B,
    source: &B::Image,
    destination: &mut B::Image,
    reason: PassThroughReason,
) -> FrameOutcome {
    backend.begin_frame();
    backend.blit(source, destination);
    backend.end_frame();
    FrameOutcome::PassThrough(reason)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::{ColorImage, CpuBackend};
    use crate::params::FogParameters;
    use glam::{Vec3, Vec4};

    fn foggy_settings() -> FogSettings {
        FogSettings {
            far_clip: 20.0,
            fog: FogParameters {
                constant_density: 0.5,
                ..FogParameters::default()
            },
            ..FogSettings::default()
        }
    }

    fn small() -> VolumeResolution {
        VolumeResolution::new(8, 6, 16).unwrap()
    }

    #[test]
    fn test_first_frame_allocates_everything_once() {
        let mut backend = CpuBackend::new();
        let mut pipeline = FogPipeline::new(foggy_settings(), small());
        let camera = Camera::default();
        let lights = [LightSource::point(Vec3::new(0.0, 0.0, -4.0), 5.0)];
        let source = ColorImage::filled(4, 4, Vec4::ONE);
        let mut destination = ColorImage::new(4, 4);
        for _ in 0..3 {
            let input = FrameInput {
                camera: &camera,
                lights: &lights,
            };
            let outcome = pipeline.render(&mut backend, input, &source, &mut destination);
            assert_eq!(outcome, FrameOutcome::Composited);
        }
        assert_eq!(pipeline.volume_allocations(), 1);
        assert_eq!(pipeline.light_buffer_allocations(), 1);
        assert_eq!(backend.volumes_created(), 2);
        assert_eq!(pipeline.light_count(), 1);
    }

    #[test]
    fn test_set_resolution_reallocates_next_frame() {
        let mut backend = CpuBackend::new();
        let mut pipeline = FogPipeline::new(foggy_settings(), small());
        let camera = Camera::default();
        let source = ColorImage::filled(2, 2, Vec4::ONE);
        let mut destination = ColorImage::new(2, 2);
        let input = FrameInput {
            camera: &camera,
            lights: &[],
        };
        pipeline.render(&mut backend, input, &source, &mut destination);
        let larger = VolumeResolution::new(16, 9, 16).unwrap();
        pipeline.set_resolution(larger);
        assert_eq!(pipeline.volume_allocations(), 1);
        pipeline.render(&mut backend, input, &source, &mut destination);
        assert_eq!(pipeline.volume_allocations(), 2);
        let volumes = pipeline.volumes().unwrap();
        assert_eq!(volumes.injection.resolution(), larger);
        assert_eq!(volumes.scatter.resolution(), larger);
    }

    #[test]
    fn test_allocation_failure_passes_through_and_retries() {
        let mut backend = CpuBackend::new().with_voxel_budget(8 * 6 * 16);
        let too_big = VolumeResolution::new(32, 32, 32).unwrap();
        let mut pipeline = FogPipeline::new(foggy_settings(), too_big);
        let camera = Camera::default();
        let source = ColorImage::from_fn(3, 3, |x, y| Vec4::new(x as f32, y as f32, 1.0, 1.0));
        let mut destination = ColorImage::new(3, 3);
        let input = FrameInput {
            camera: &camera,
            lights: &[],
        };

        let outcome = pipeline.render(&mut backend, input, &source, &mut destination);
        assert_eq!(
            outcome,
            FrameOutcome::PassThrough(PassThroughReason::AllocationFailure)
        );
        assert_eq!(destination, source);
        assert!(pipeline.is_enabled());

        pipeline.set_resolution(small());
        let outcome = pipeline.render(&mut backend, input, &source, &mut destination);
        assert_eq!(outcome, FrameOutcome::Composited);
    }

    #[test]
    fn test_light_count_includes_frames_that_passed_through() {
        let mut backend = CpuBackend::new().with_voxel_budget(8);
        let mut pipeline = FogPipeline::new(foggy_settings(), small());
        let camera = Camera::default();
        let lights = [
            LightSource::point(Vec3::ZERO, 5.0),
            LightSource::point(Vec3::ONE, 5.0),
        ];
        let source = ColorImage::filled(2, 2, Vec4::ONE);
        let mut destination = ColorImage::new(2, 2);
        let input = FrameInput {
            camera: &camera,
            lights: &lights,
        };
        let outcome = pipeline.render(&mut backend, input, &source, &mut destination);
        assert_eq!(
            outcome,
            FrameOutcome::PassThrough(PassThroughReason::AllocationFailure)
        );
        assert_eq!(pipeline.light_count(), 2);
    }

    #[test]
    fn test_settings_update_applies_next_frame() {
        let mut backend = CpuBackend::new();
        let mut pipeline = FogPipeline::new(foggy_settings(), small());
        let camera = Camera::default();
        let source = ColorImage::filled(4, 4, Vec4::new(1.0, 1.0, 1.0, 1.0));
        let mut foggy = ColorImage::new(4, 4);
        let input = FrameInput {
            camera: &camera,
            lights: &[],
        };
        pipeline.render(&mut backend, input, &source, &mut foggy);
        assert!(foggy.pixel(1, 1).x < 1.0);

        pipeline.set_settings(FogSettings {
            fog: FogParameters {
                global_density_scale: 0.0,
                ..foggy_settings().fog
            },
            ..foggy_settings()
        });
        let mut clear = ColorImage::new(4, 4);
        pipeline.render(&mut backend, input, &source, &mut clear);
        assert_eq!(clear, source);
    }
}
