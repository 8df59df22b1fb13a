//! Froxel grid resolution and the lazily (re)allocated volume pair.

use crate::backend::{FogBackend, FogError, VolumeRole};

/// Voxel resolution of the froxel grid: `x` and `y` across the screen, `z`
/// depth slices.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct VolumeResolution {
    pub x: u32,
    pub y: u32,
    pub z: u32,
}

impl VolumeResolution {
    /// 160×90 columns (16:9) with 128 depth slices.
    pub const DEFAULT: Self = Self {
        x: 160,
        y: 90,
        z: 128,
    };

    /// Create a resolution. Every axis must be non-zero.
    pub fn new(x: u32, y: u32, z: u32) -> Result<Self, FogError> {
        if x == 0 || y == 0 || z == 0 {
            return Err(FogError::InvalidResolution { x, y, z });
        }
        Ok(Self { x, y, z })
    }

    /// Create from an `[x, y, z]` array.
    pub fn from_array(axes: [u32; 3]) -> Result<Self, FogError> {
        Self::new(axes[0], axes[1], axes[2])
    }

    /// Total voxel count.
    pub fn voxel_count(&self) -> usize {
        self.x as usize * self.y as usize * self.z as usize
    }

    /// Number of (x, y) columns.
    pub fn column_count(&self) -> usize {
        self.x as usize * self.y as usize
    }

    /// Largest axis, for device limit checks.
    pub fn max_axis(&self) -> u32 {
        self.x.max(self.y).max(self.z)
    }
}

impl Default for VolumeResolution {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Both froxel volumes. They always share one resolution.
pub struct VolumePair<V> {
    pub resolution: VolumeResolution,
    pub injection: V,
    pub scatter: V,
}

/// Owns the injection and scatter volumes and reallocates them when the
/// requested resolution changes.
pub struct VolumeGrid<V> {
    volumes: Option<VolumePair<V>>,
    allocations: u64,
}

impl<V> VolumeGrid<V> {
    /// An empty grid; nothing is allocated until the first
    /// [`ensure_allocated`](Self::ensure_allocated).
    pub fn new() -> Self {
        Self {
            volumes: None,
            allocations: 0,
        }
    }

    /// Make sure both volumes exist at `resolution`. Idempotent.
    ///
    /// On failure the grid is left empty so the next call retries.
    pub fn ensure_allocated<B>(
        &mut self,
        backend: &mut B,
        resolution: VolumeResolution,
    ) -> Result<&mut VolumePair<V>, FogError>
    where
        B: FogBackend<Volume = V>,
    {
        let current = self.volumes.as_ref().map(|pair| pair.resolution);
        if current != Some(resolution) {
            // Release the old pair before creating the new one.
            self.volumes = None;
            let injection = backend.create_volume(resolution, VolumeRole::Injection)?;
            let scatter = backend.create_volume(resolution, VolumeRole::Scatter)?;
            self.allocations += 1;
            match current {
                Some(old) => log::info!(
                    "Reallocated fog volumes {}x{}x{} -> {}x{}x{}",
                    old.x,
                    old.y,
                    old.z,
                    resolution.x,
                    resolution.y,
                    resolution.z
                ),
                None => log::info!(
                    "Allocated fog volumes {}x{}x{}",
                    resolution.x,
                    resolution.y,
                    resolution.z
                ),
            }
            self.volumes = Some(VolumePair {
                resolution,
                injection,
                scatter,
            });
        }
        match self.volumes.as_mut() {
            Some(pair) => Ok(pair),
            None => Err(FogError::AllocationFailure {
                resource: "fog volumes",
                reason: "volume pair missing after allocation".to_string(),
            }),
        }
    }

    /// The current volumes, if allocated.
    pub fn volumes(&self) -> Option<&VolumePair<V>> {
        self.volumes.as_ref()
    }

    /// Resolution of the current volumes, if allocated.
    pub fn resolution(&self) -> Option<VolumeResolution> {
        self.volumes.as_ref().map(|pair| pair.resolution)
    }

    /// How many times the pair has been (re)created.
    pub fn allocations(&self) -> u64 {
        self.allocations
    }
}

impl<V> Default for VolumeGrid<V> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::CpuBackend;

    #[test]
    fn test_zero_axis_rejected() {
        assert!(matches!(
            VolumeResolution::new(0, 90, 128),
            Err(FogError::InvalidResolution { x: 0, .. })
        ));
        assert!(VolumeResolution::from_array([160, 90, 0]).is_err());
    }

    #[test]
    fn test_default_resolution() {
        let res = VolumeResolution::default();
        assert_eq!((res.x, res.y, res.z), (160, 90, 128));
        assert_eq!(res.voxel_count(), 160 * 90 * 128);
        assert_eq!(res.column_count(), 160 * 90);
        assert_eq!(res.max_axis(), 160);
    }

    #[test]
    fn test_ensure_allocated_is_idempotent() {
        let mut backend = CpuBackend::new();
        let mut grid = VolumeGrid::new();
        let res = VolumeResolution::new(8, 4, 8).unwrap();
        grid.ensure_allocated(&mut backend, res).unwrap();
        grid.ensure_allocated(&mut backend, res).unwrap();
        assert_eq!(grid.allocations(), 1);
        assert_eq!(backend.volumes_created(), 2);
    }

    #[test]
    fn test_resolution_change_reallocates_both() {
        let mut backend = CpuBackend::new();
        let mut grid = VolumeGrid::new();
        let small = VolumeResolution::new(8, 4, 8).unwrap();
        let large = VolumeResolution::new(16, 8, 8).unwrap();
        grid.ensure_allocated(&mut backend, small).unwrap();
        let pair = grid.ensure_allocated(&mut backend, large).unwrap();
        assert_eq!(pair.injection.resolution(), large);
        assert_eq!(pair.scatter.resolution(), large);
        assert_eq!(grid.allocations(), 2);
        assert_eq!(grid.resolution(), Some(large));
    }

    #[test]
    fn test_failed_allocation_leaves_grid_empty_and_retries() {
        let mut backend = CpuBackend::new().with_voxel_budget(1000);
        let mut grid = VolumeGrid::new();
        let too_big = VolumeResolution::new(16, 16, 16).unwrap();
        assert!(grid.ensure_allocated(&mut backend, too_big).is_err());
        assert!(grid.volumes().is_none());

        let fits = VolumeResolution::new(8, 8, 8).unwrap();
        assert!(grid.ensure_allocated(&mut backend, fits).is_ok());
        assert_eq!(grid.allocations(), 1);
    }
}
