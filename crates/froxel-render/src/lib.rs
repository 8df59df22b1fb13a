//! Froxel volumetric fog: frustum-aligned volume addressing, the inject,
//! scatter and composite stages, and CPU and wgpu backends that run them.

pub mod backend;
pub mod camera;
pub mod composite;
pub mod cpu;
pub mod frustum;
pub mod gpu;
pub mod inject;
pub mod params;
pub mod pipeline;
pub mod scatter;
pub mod volume;
pub mod wgpu_backend;

pub use backend::{FogBackend, FogError, VolumeRole};
pub use camera::Camera;
pub use composite::{COMPOSITE_SHADER_SOURCE, IDENTITY_SCATTER, composite_pixel};
pub use cpu::{ColorImage, CpuBackend, CpuVolume};
pub use frustum::{FRUSTUM_CORNER_UVS, FrustumRays};
pub use gpu::{
    GpuCapabilities, GpuContext, GpuContextError, IMAGE_FORMAT, VOLUME_FORMAT,
    init_headless_blocking,
};
pub use inject::{INJECT_SHADER_SOURCE, INJECT_WORKGROUP, inject_voxel, voxel_world_position};
pub use params::{ClipMapping, FogParameters, FogSettings, FrameParams};
pub use pipeline::{FogPipeline, FrameInput, FrameOutcome, PassThroughReason};
pub use scatter::{SCATTER_SHADER_SOURCE, SCATTER_WORKGROUP, ScatterAccumulator, scan_column};
pub use volume::{VolumeGrid, VolumePair, VolumeResolution};
pub use wgpu_backend::{GpuImage, GpuLightBuffer, GpuVolume, WgpuBackend};
