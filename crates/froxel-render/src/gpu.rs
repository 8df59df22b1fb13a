//! Headless GPU device initialization and capability queries.
//!
//! Provides [`GpuContext`] which owns the wgpu instance, adapter, device and
//! queue, [`GpuCapabilities`] describing what the fog pipeline needs from them,
//! and [`GpuContextError`] for clear diagnostics when initialization fails.

use crate::backend::FogError;
use crate::inject::INJECT_WORKGROUP;
use crate::volume::VolumeResolution;

/// Format of both froxel volumes.
pub const VOLUME_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;

/// Color format of source and destination images.
pub const IMAGE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba32Float;

/// Error type for GPU context initialization failures.
#[derive(Debug, thiserror::Error)]
pub enum GpuContextError {
    /// No compatible GPU adapter found.
    #[error("no compatible GPU adapter found")]
    NoAdapter,

    /// Failed to request GPU device.
    #[error("failed to request GPU device: {0}")]
    DeviceRequest(#[from] wgpu::RequestDeviceError),
}

/// Owns all GPU state: instance, adapter, device and queue.
pub struct GpuContext {
    pub instance: wgpu::Instance,
    pub adapter: wgpu::Adapter,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
}

impl GpuContext {
    /// Initialize the GPU asynchronously without a surface.
    pub async fn new_headless() -> Result<Self, GpuContextError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = match instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
        {
            Ok(adapter) => adapter,
            Err(_) => return Err(GpuContextError::NoAdapter),
        };

        let info = adapter.get_info();
        log::info!(
            "Selected GPU: {} ({:?}, {:?})",
            info.name,
            info.backend,
            info.device_type
        );

        // The injection workgroup is larger than the WebGPU default allows.
        let adapter_limits = adapter.limits();
        let required_limits = wgpu::Limits {
            max_compute_invocations_per_workgroup: adapter_limits
                .max_compute_invocations_per_workgroup,
            max_texture_dimension_3d: adapter_limits.max_texture_dimension_3d,
            ..wgpu::Limits::default()
        };

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("froxel-device"),
                required_features: wgpu::Features::empty(),
                required_limits,
                memory_hints: wgpu::MemoryHints::default(),
                experimental_features: wgpu::ExperimentalFeatures::default(),
                trace: wgpu::Trace::Off,
            })
            .await?;

        Ok(Self {
            instance,
            adapter,
            device,
            queue,
        })
    }

    /// Query what this device can do for the fog pipeline.
    pub fn capabilities(&self) -> GpuCapabilities {
        GpuCapabilities::query(&self.adapter, &self.device)
    }
}

/// Initialize a headless GPU context synchronously using `pollster`.
pub fn init_headless_blocking() -> Result<GpuContext, GpuContextError> {
    pollster::block_on(GpuContext::new_headless())
}

/// The subset of adapter and device capabilities the fog pipeline depends on.
#[derive(Clone, Debug, PartialEq)]
pub struct GpuCapabilities {
    pub compute_shaders: bool,
    /// Write-only storage binding of [`VOLUME_FORMAT`].
    pub storage_volume_format: bool,
    /// Linear filtering of [`VOLUME_FORMAT`] in the composite pass.
    pub filterable_volume_format: bool,
    /// [`IMAGE_FORMAT`] as a color attachment for the composite and blit passes.
    pub renderable_image_format: bool,
    pub max_compute_invocations_per_workgroup: u32,
    pub max_texture_dimension_3d: u32,
    pub max_storage_buffer_binding_size: u64,
}

impl GpuCapabilities {
    pub fn query(adapter: &wgpu::Adapter, device: &wgpu::Device) -> Self {
        let downlevel = adapter.get_downlevel_capabilities();
        let format = adapter.get_texture_format_features(VOLUME_FORMAT);
        let image = adapter.get_texture_format_features(IMAGE_FORMAT);
        let limits = device.limits();
        Self {
            compute_shaders: downlevel
                .flags
                .contains(wgpu::DownlevelFlags::COMPUTE_SHADERS),
            storage_volume_format: format
                .allowed_usages
                .contains(wgpu::TextureUsages::STORAGE_BINDING),
            filterable_volume_format: format
                .flags
                .contains(wgpu::TextureFormatFeatureFlags::FILTERABLE),
            renderable_image_format: image
                .allowed_usages
                .contains(wgpu::TextureUsages::RENDER_ATTACHMENT),
            max_compute_invocations_per_workgroup: limits.max_compute_invocations_per_workgroup,
            max_texture_dimension_3d: limits.max_texture_dimension_3d,
            max_storage_buffer_binding_size: limits.max_storage_buffer_binding_size as u64,
        }
    }

    /// Check the platform-level requirements. Size limits are checked at
    /// allocation time instead.
    pub fn check(&self) -> Result<(), FogError> {
        if !self.compute_shaders {
            return Err(FogError::UnsupportedPlatform(
                "compute shaders are not available".to_string(),
            ));
        }
        if !self.storage_volume_format {
            return Err(FogError::UnsupportedPlatform(format!(
                "{VOLUME_FORMAT:?} cannot be bound as a storage texture"
            )));
        }
        if !self.filterable_volume_format {
            return Err(FogError::UnsupportedPlatform(format!(
                "{VOLUME_FORMAT:?} is not filterable"
            )));
        }
        if !self.renderable_image_format {
            return Err(FogError::UnsupportedPlatform(format!(
                "{IMAGE_FORMAT:?} cannot be used as a render target"
            )));
        }
        let needed: u32 = INJECT_WORKGROUP.iter().product();
        if self.max_compute_invocations_per_workgroup < needed {
            return Err(FogError::UnsupportedPlatform(format!(
                "workgroup size {needed} exceeds device limit {}",
                self.max_compute_invocations_per_workgroup
            )));
        }
        Ok(())
    }

    /// Check that a volume of `resolution` fits the 3D texture limit.
    pub fn check_volume(&self, resolution: VolumeResolution) -> Result<(), FogError> {
        let axis = resolution.max_axis();
        if axis > self.max_texture_dimension_3d {
            return Err(FogError::AllocationFailure {
                resource: "fog volume",
                reason: format!(
                    "axis {axis} exceeds max 3D texture dimension {}",
                    self.max_texture_dimension_3d
                ),
            });
        }
        Ok(())
    }

    /// Check that `bytes` fits in one storage buffer binding.
    pub fn check_storage_buffer(&self, bytes: u64) -> Result<(), FogError> {
        if bytes > self.max_storage_buffer_binding_size {
            return Err(FogError::AllocationFailure {
                resource: "fog-light-buffer",
                reason: format!(
                    "{bytes} bytes exceeds max storage binding size {}",
                    self.max_storage_buffer_binding_size
                ),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capable() -> GpuCapabilities {
        GpuCapabilities {
            compute_shaders: true,
            storage_volume_format: true,
            filterable_volume_format: true,
            renderable_image_format: true,
            max_compute_invocations_per_workgroup: 1024,
            max_texture_dimension_3d: 2048,
            max_storage_buffer_binding_size: 128 << 20,
        }
    }

    #[test]
    fn test_capable_device_passes() {
        assert!(capable().check().is_ok());
        assert!(capable().check_volume(VolumeResolution::DEFAULT).is_ok());
    }

    #[test]
    fn test_missing_compute_is_unsupported() {
        let caps = GpuCapabilities {
            compute_shaders: false,
            ..capable()
        };
        assert!(matches!(caps.check(), Err(FogError::UnsupportedPlatform(_))));
    }

    #[test]
    fn test_missing_storage_format_is_unsupported() {
        let caps = GpuCapabilities {
            storage_volume_format: false,
            ..capable()
        };
        let err = caps.check().unwrap_err();
        assert!(err.to_string().contains("storage"));
    }

    #[test]
    fn test_missing_render_target_is_unsupported() {
        let caps = GpuCapabilities {
            renderable_image_format: false,
            ..capable()
        };
        let err = caps.check().unwrap_err();
        assert!(matches!(err, FogError::UnsupportedPlatform(_)));
        assert!(err.to_string().contains("render target"));
    }

    #[test]
    fn test_small_workgroup_limit_is_unsupported() {
        let caps = GpuCapabilities {
            max_compute_invocations_per_workgroup: 256,
            ..capable()
        };
        assert!(matches!(caps.check(), Err(FogError::UnsupportedPlatform(_))));
    }

    #[test]
    fn test_oversized_volume_is_allocation_failure() {
        let caps = GpuCapabilities {
            max_texture_dimension_3d: 64,
            ..capable()
        };
        let res = VolumeResolution::new(160, 90, 128).unwrap();
        assert!(matches!(
            caps.check_volume(res),
            Err(FogError::AllocationFailure { .. })
        ));
    }

    #[test]
    fn test_storage_buffer_limit() {
        let caps = capable();
        assert!(caps.check_storage_buffer(32 * 1024).is_ok());
        assert!(caps.check_storage_buffer(u64::MAX).is_err());
    }

    #[test]
    fn test_headless_context_capabilities() {
        // Skips on machines without a GPU adapter.
        let Ok(ctx) = init_headless_blocking() else {
            return;
        };
        let caps = ctx.capabilities();
        assert!(caps.max_texture_dimension_3d > 0);
    }
}
