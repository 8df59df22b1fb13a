//! Reference backend: the three stages as rayon parallel-for loops over
//! host-memory volumes.
//!
//! Volumes are stored column-contiguous (`z` fastest) so injection and scatter
//! both split the voxel array into independent per-column chunks.

use froxel_lighting::PointLightParams;
use glam::{Vec3, Vec4};
use rayon::prelude::*;

use crate::backend::{FogBackend, FogError, VolumeRole};
use crate::composite::{composite_pixel, fade_to_identity, pixel_volume_uv, scatter_coordinate};
use crate::inject::inject_column;
use crate::params::FrameParams;
use crate::scatter::{column_slice_length, scan_column};
use crate::volume::VolumeResolution;

/// A host-memory froxel volume.
#[derive(Clone, Debug)]
pub struct CpuVolume {
    resolution: VolumeResolution,
    voxels: Vec<Vec4>,
}

impl CpuVolume {
    fn index(&self, x: u32, y: u32, z: u32) -> usize {
        let res = self.resolution;
        z as usize + res.z as usize * (x as usize + res.x as usize * y as usize)
    }

    pub fn resolution(&self) -> VolumeResolution {
        self.resolution
    }

    /// Voxel `(x, y, z)`. Panics if out of range.
    pub fn get(&self, x: u32, y: u32, z: u32) -> Vec4 {
        self.voxels[self.index(x, y, z)]
    }

    /// All slices of column `(x, y)`, nearest first.
    pub fn column(&self, x: u32, y: u32) -> &[Vec4] {
        let start = self.index(x, y, 0);
        &self.voxels[start..start + self.resolution.z as usize]
    }

    /// Trilinear sample at a continuous voxel coordinate, clamped to the edges.
    pub fn sample(&self, coord: Vec3) -> Vec4 {
        let res = self.resolution;
        let max = Vec3::new(
            (res.x - 1) as f32,
            (res.y - 1) as f32,
            (res.z - 1) as f32,
        );
        let c = coord.clamp(Vec3::ZERO, max);
        let base = c.floor();
        let f = c - base;
        let (x0, y0, z0) = (base.x as u32, base.y as u32, base.z as u32);
        let x1 = (x0 + 1).min(res.x - 1);
        let y1 = (y0 + 1).min(res.y - 1);
        let z1 = (z0 + 1).min(res.z - 1);

        let along_z = |x, y| lerp(self.get(x, y, z0), self.get(x, y, z1), f.z);
        let bottom = lerp(along_z(x0, y0), along_z(x1, y0), f.x);
        let top = lerp(along_z(x0, y1), along_z(x1, y1), f.x);
        lerp(bottom, top, f.y)
    }
}

/// `a + (b - a) * t`, exact when `a == b`.
fn lerp(a: Vec4, b: Vec4, t: f32) -> Vec4 {
    a + (b - a) * t
}

/// An RGBA float image with optional linear scene depth.
///
/// Row 0 is the top of the image. Depth is view depth divided by the camera
/// far plane.
#[derive(Clone, Debug, PartialEq)]
pub struct ColorImage {
    width: u32,
    height: u32,
    pixels: Vec<Vec4>,
    depth: Option<Vec<f32>>,
}

impl ColorImage {
    /// A transparent black image.
    pub fn new(width: u32, height: u32) -> Self {
        Self::filled(width, height, Vec4::ZERO)
    }

    /// An image with every pixel set to `color`.
    pub fn filled(width: u32, height: u32, color: Vec4) -> Self {
        Self {
            width,
            height,
            pixels: vec![color; width as usize * height as usize],
            depth: None,
        }
    }

    /// Build an image from a per-pixel function.
    pub fn from_fn(width: u32, height: u32, f: impl Fn(u32, u32) -> Vec4) -> Self {
        let pixels = (0..height)
            .flat_map(|y| (0..width).map(move |x| (x, y)))
            .map(|(x, y)| f(x, y))
            .collect();
        Self {
            width,
            height,
            pixels,
            depth: None,
        }
    }

    /// Attach linear depth computed per pixel.
    pub fn with_depth(mut self, f: impl Fn(u32, u32) -> f32) -> Self {
        let (width, height) = (self.width, self.height);
        let depth = (0..height)
            .flat_map(|y| (0..width).map(move |x| (x, y)))
            .map(|(x, y)| f(x, y))
            .collect();
        self.depth = Some(depth);
        self
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixel(&self, x: u32, y: u32) -> Vec4 {
        self.pixels[(y * self.width + x) as usize]
    }

    pub fn pixels(&self) -> &[Vec4] {
        &self.pixels
    }

    /// Linear depth at `(x, y)`, if the image carries depth.
    pub fn depth_at(&self, x: u32, y: u32) -> Option<f32> {
        self.depth
            .as_ref()
            .map(|depth| depth[(y * self.width + x) as usize])
    }

    pub fn has_depth(&self) -> bool {
        self.depth.is_some()
    }

    /// Match `source` dimensions, dropping any depth.
    fn reshape_like(&mut self, source: &ColorImage) {
        self.width = source.width;
        self.height = source.height;
        self.pixels
            .resize(source.width as usize * source.height as usize, Vec4::ZERO);
        self.depth = None;
    }
}

/// Runs every stage on the CPU with rayon.
#[derive(Debug, Default)]
pub struct CpuBackend {
    voxel_budget: Option<usize>,
    volumes_created: usize,
}

impl CpuBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse volumes with more than `voxels` voxels.
    pub fn with_voxel_budget(mut self, voxels: usize) -> Self {
        self.voxel_budget = Some(voxels);
        self
    }

    /// Number of successful [`FogBackend::create_volume`] calls.
    pub fn volumes_created(&self) -> usize {
        self.volumes_created
    }
}

impl FogBackend for CpuBackend {
    type Volume = CpuVolume;
    type LightBuffer = Vec<PointLightParams>;
    type Image = ColorImage;

    fn check_support(&self, _resolution: VolumeResolution) -> Result<(), FogError> {
        Ok(())
    }

    fn create_volume(
        &mut self,
        resolution: VolumeResolution,
        role: VolumeRole,
    ) -> Result<CpuVolume, FogError> {
        let count = resolution.voxel_count();
        if let Some(budget) = self.voxel_budget {
            if count > budget {
                return Err(FogError::AllocationFailure {
                    resource: role.label(),
                    reason: format!("{count} voxels exceeds budget of {budget}"),
                });
            }
        }
        let mut voxels = Vec::new();
        voxels
            .try_reserve_exact(count)
            .map_err(|e| FogError::AllocationFailure {
                resource: role.label(),
                reason: e.to_string(),
            })?;
        voxels.resize(count, Vec4::ZERO);
        self.volumes_created += 1;
        log::debug!(
            "Created {} ({}x{}x{})",
            role.label(),
            resolution.x,
            resolution.y,
            resolution.z
        );
        Ok(CpuVolume { resolution, voxels })
    }

    fn create_light_buffer(&mut self, light_count: usize) -> Result<Self::LightBuffer, FogError> {
        let mut buffer = Vec::new();
        buffer
            .try_reserve_exact(light_count)
            .map_err(|e| FogError::AllocationFailure {
                resource: "fog-light-buffer",
                reason: e.to_string(),
            })?;
        Ok(buffer)
    }

    fn upload_lights(&mut self, buffer: &mut Self::LightBuffer, lights: &[PointLightParams]) {
        buffer.clear();
        buffer.extend_from_slice(lights);
    }

    fn dispatch_inject(
        &mut self,
        frame: &FrameParams,
        lights: &Self::LightBuffer,
        light_count: usize,
        injection: &mut CpuVolume,
    ) {
        let res = injection.resolution;
        let lights = &lights[..light_count.min(lights.len())];
        injection
            .voxels
            .par_chunks_mut(res.z as usize)
            .enumerate()
            .for_each(|(c, column)| {
                let x = (c % res.x as usize) as u32;
                let y = (c / res.x as usize) as u32;
                inject_column(frame, lights, x, y, column);
            });
    }

    fn dispatch_scatter(
        &mut self,
        frame: &FrameParams,
        injection: &CpuVolume,
        scatter: &mut CpuVolume,
    ) {
        let res = scatter.resolution;
        scatter
            .voxels
            .par_chunks_mut(res.z as usize)
            .zip(injection.voxels.par_chunks(res.z as usize))
            .enumerate()
            .for_each(|(c, (output, input))| {
                let x = (c % res.x as usize) as u32;
                let y = (c / res.x as usize) as u32;
                scan_column(input, output, column_slice_length(frame, x, y));
            });
    }

    fn composite(
        &mut self,
        frame: &FrameParams,
        scatter: &CpuVolume,
        source: &ColorImage,
        destination: &mut ColorImage,
    ) {
        destination.reshape_like(source);
        let (width, height) = (source.width, source.height);
        if width == 0 {
            return;
        }
        destination
            .pixels
            .par_chunks_mut(width as usize)
            .enumerate()
            .for_each(|(py, row)| {
                let py = py as u32;
                for (px, out) in row.iter_mut().enumerate() {
                    let px = px as u32;
                    let uv = pixel_volume_uv(px, py, width, height);
                    let t = frame.clip.volume_depth(source.depth_at(px, py));
                    let coord = scatter_coordinate(frame, uv, t);
                    let fog = fade_to_identity(scatter.sample(coord), coord.z);
                    *out = composite_pixel(source.pixel(px, py), fog);
                }
            });
    }

    fn blit(&mut self, source: &ColorImage, destination: &mut ColorImage) {
        destination.reshape_like(source);
        destination.pixels.copy_from_slice(&source.pixels);
    }
}
