//! The compute/graphics capability set the fog pipeline runs on.
//!
//! [`FogBackend`] is the seam between the orchestration in
//! [`FogPipeline`](crate::FogPipeline) and a concrete device. Two
//! implementations ship: [`CpuBackend`](crate::CpuBackend) (rayon parallel-for)
//! and [`WgpuBackend`](crate::WgpuBackend) (WGSL compute + fullscreen pass).

use froxel_lighting::PointLightParams;

use crate::params::FrameParams;
use crate::volume::VolumeResolution;

/// Errors raised by fog backends.
#[derive(Debug, thiserror::Error)]
pub enum FogError {
    /// A required compute or texture capability is missing.
    #[error("unsupported platform: {0}")]
    UnsupportedPlatform(String),

    /// A volume or buffer could not be created.
    #[error("failed to allocate {resource}: {reason}")]
    AllocationFailure {
        resource: &'static str,
        reason: String,
    },

    /// A volume axis was zero.
    #[error("volume resolution must be non-zero on every axis, got {x}x{y}x{z}")]
    InvalidResolution { x: u32, y: u32, z: u32 },

    /// Mapping a device image back to host memory failed.
    #[error("image readback failed: {0}")]
    Readback(String),
}

/// Which of the two froxel volumes a texture is.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VolumeRole {
    /// Per-voxel extinction and in-scattered radiance.
    Injection,
    /// Front-to-back accumulated radiance and transmittance.
    Scatter,
}

impl VolumeRole {
    pub fn label(self) -> &'static str {
        match self {
            VolumeRole::Injection => "fog-injection-volume",
            VolumeRole::Scatter => "fog-scatter-volume",
        }
    }
}

/// Device capabilities the fog pipeline depends on.
///
/// Work recorded between [`begin_frame`](Self::begin_frame) and
/// [`end_frame`](Self::end_frame) executes in call order; every stage sees the
/// writes of the stages recorded before it.
pub trait FogBackend {
    /// A 4-channel 3D texture with random-access write.
    type Volume;
    /// Typed storage for [`PointLightParams`].
    type LightBuffer;
    /// A color image, optionally carrying linear scene depth when used as a source.
    type Image;

    /// Verify the device can run the pipeline at `resolution`.
    fn check_support(&self, resolution: VolumeResolution) -> Result<(), FogError>;

    /// Start recording a frame.
    fn begin_frame(&mut self) {}

    /// Submit everything recorded since [`begin_frame`](Self::begin_frame).
    fn end_frame(&mut self) {}

    /// Allocate one froxel volume.
    fn create_volume(
        &mut self,
        resolution: VolumeResolution,
        role: VolumeRole,
    ) -> Result<Self::Volume, FogError>;

    /// Allocate a light buffer sized for `light_count` lights.
    fn create_light_buffer(&mut self, light_count: usize) -> Result<Self::LightBuffer, FogError>;

    /// Overwrite the buffer contents with `lights`.
    fn upload_lights(&mut self, buffer: &mut Self::LightBuffer, lights: &[PointLightParams]);

    /// Injection stage: one invocation per voxel.
    fn dispatch_inject(
        &mut self,
        frame: &FrameParams,
        lights: &Self::LightBuffer,
        light_count: usize,
        injection: &mut Self::Volume,
    );

    /// Scatter integration stage: one invocation per column, sequential in depth.
    fn dispatch_scatter(
        &mut self,
        frame: &FrameParams,
        injection: &Self::Volume,
        scatter: &mut Self::Volume,
    );

    /// Compositing stage: one invocation per destination pixel.
    fn composite(
        &mut self,
        frame: &FrameParams,
        scatter: &Self::Volume,
        source: &Self::Image,
        destination: &mut Self::Image,
    );

    /// Copy `source` to `destination` unmodified.
    fn blit(&mut self, source: &Self::Image, destination: &mut Self::Image);
}
