//! Scatter integration stage: a front-to-back scan along each depth column.
//!
//! Each column walks its slices nearest first, turning the injected
//! `(in-scatter, extinction)` pairs into cumulative `(radiance, transmittance)`.
//! After slice `z` the stored value is what a ray from the camera has gathered
//! by the far edge of that slice.

use bytemuck::{Pod, Zeroable};
use glam::{Vec3, Vec4};

use crate::params::FrameParams;

/// Threads per workgroup for the scatter dispatch (columns only, no z).
pub const SCATTER_WORKGROUP: [u32; 3] = [32, 2, 1];

/// Extinction below which a slice is treated as empty.
pub const MIN_EXTINCTION: f32 = 1e-6;

/// GPU uniform for the scatter kernel.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub(crate) struct ScatterUniforms {
    pub frustum_rays: [[f32; 4]; 4],
    pub resolution: [u32; 4],
    /// Near-over-far, depth span.
    pub clip: [f32; 4],
}

impl ScatterUniforms {
    pub fn new(frame: &FrameParams) -> Self {
        let res = frame.resolution;
        Self {
            frustum_rays: frame.rays.to_uniform(),
            resolution: [res.x, res.y, res.z, 0],
            clip: [frame.clip.near_over_far(), frame.clip.depth_span(), 0.0, 0.0],
        }
    }
}

/// WGSL source for the scatter compute kernel.
pub const SCATTER_SHADER_SOURCE: &str = r#"
struct ScatterUniforms {
    frustum_rays: array<vec4<f32>, 4>,
    resolution: vec4<u32>,
    clip: vec4<f32>,
};

@group(0) @binding(0) var<uniform> params: ScatterUniforms;
@group(0) @binding(1) var injection: texture_3d<f32>;
@group(0) @binding(2) var scatter: texture_storage_3d<rgba16float, write>;

@compute @workgroup_size(32, 2, 1)
fn scatter_main(@builtin(global_invocation_id) id: vec3<u32>) {
    let res = params.resolution.xyz;
    if (id.x >= res.x || id.y >= res.y) {
        return;
    }

    let uv = vec2<f32>(f32(id.x) / f32(res.x), f32(id.y) / f32(res.y));
    let bottom = mix(params.frustum_rays[0].xyz, params.frustum_rays[1].xyz, uv.x);
    let top = mix(params.frustum_rays[3].xyz, params.frustum_rays[2].xyz, uv.x);
    let ray = mix(bottom, top, uv.y);
    let slice_length = length(ray) * params.clip.y / f32(res.z);

    var radiance = vec3<f32>(0.0);
    var transmittance = 1.0;
    for (var z = 0u; z < res.z; z = z + 1u) {
        let coord = vec3<i32>(i32(id.x), i32(id.y), i32(z));
        let injected = textureLoad(injection, coord, 0);
        let extinction = injected.a;
        var slice_radiance = vec3<f32>(0.0);
        if (extinction > 1e-6) {
            slice_radiance = injected.rgb / extinction;
        }
        let step_transmittance = exp(-extinction * slice_length);
        radiance = radiance + transmittance * slice_radiance * (1.0 - step_transmittance);
        transmittance = transmittance * step_transmittance;
        textureStore(scatter, coord, vec4<f32>(radiance, transmittance));
    }
}
"#;

/// Running state of one column scan.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScatterAccumulator {
    pub radiance: Vec3,
    pub transmittance: f32,
}

impl Default for ScatterAccumulator {
    fn default() -> Self {
        Self {
            radiance: Vec3::ZERO,
            transmittance: 1.0,
        }
    }
}

impl ScatterAccumulator {
    /// Fold in one injected slice and return the cumulative value for it.
    pub fn step(&mut self, injected: Vec4, slice_length: f32) -> Vec4 {
        let extinction = injected.w;
        let slice_radiance = if extinction > MIN_EXTINCTION {
            injected.truncate() / extinction
        } else {
            Vec3::ZERO
        };
        let step_transmittance = (-extinction * slice_length.max(0.0)).exp();
        self.radiance += self.transmittance * slice_radiance * (1.0 - step_transmittance);
        self.transmittance *= step_transmittance;
        self.radiance.extend(self.transmittance)
    }
}

/// World-space length of one slice in column `(x, y)`.
pub fn column_slice_length(frame: &FrameParams, x: u32, y: u32) -> f32 {
    frame.slice_length(x, y)
}

/// Integrate one column. `input` and `output` are indexed by slice.
pub fn scan_column(input: &[Vec4], output: &mut [Vec4], slice_length: f32) {
    let mut acc = ScatterAccumulator::default();
    for (injected, out) in input.iter().zip(output.iter_mut()) {
        *out = acc.step(*injected, slice_length);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_size() {
        assert_eq!(std::mem::size_of::<ScatterUniforms>(), 96);
    }

    #[test]
    fn test_empty_column_is_identity() {
        let input = vec![Vec4::ZERO; 32];
        let mut output = vec![Vec4::splat(-1.0); 32];
        scan_column(&input, &mut output, 0.5);
        assert!(output.iter().all(|v| *v == Vec4::new(0.0, 0.0, 0.0, 1.0)));
    }

    #[test]
    fn test_transmittance_is_beer_lambert() {
        let sigma = 0.3;
        let len = 0.25;
        let input = vec![Vec4::new(0.0, 0.0, 0.0, sigma); 10];
        let mut output = vec![Vec4::ZERO; 10];
        scan_column(&input, &mut output, len);
        for (z, v) in output.iter().enumerate() {
            let expected = (-sigma * len * (z + 1) as f32).exp();
            assert!((v.w - expected).abs() < 1e-5, "slice {z}: {} vs {expected}", v.w);
        }
    }

    #[test]
    fn test_transmittance_non_increasing_and_radiance_non_decreasing() {
        let input: Vec<Vec4> = (0..20)
            .map(|z| {
                let sigma = (z % 3) as f32 * 0.2;
                Vec4::new(sigma * 2.0, sigma, 0.0, sigma)
            })
            .collect();
        let mut output = vec![Vec4::ZERO; 20];
        scan_column(&input, &mut output, 0.7);
        for pair in output.windows(2) {
            assert!(pair[1].w <= pair[0].w);
            assert!(pair[1].x >= pair[0].x);
            assert!(pair[1].y >= pair[0].y);
        }
        assert!(output.iter().all(|v| v.w > 0.0 && v.w <= 1.0));
    }

    #[test]
    fn test_uniform_medium_converges_to_source_radiance() {
        // Constant radiance L = rgb / sigma; an optically thick column approaches L.
        let input = vec![Vec4::new(1.5, 0.5, 0.0, 0.5); 200];
        let mut output = vec![Vec4::ZERO; 200];
        scan_column(&input, &mut output, 1.0);
        let last = output[199];
        assert!((last.x - 3.0).abs() < 1e-3);
        assert!((last.y - 1.0).abs() < 1e-3);
        assert!(last.w < 1e-6);
    }

    #[test]
    fn test_slice_closed_form() {
        let mut acc = ScatterAccumulator::default();
        let v = acc.step(Vec4::new(0.4, 0.0, 0.0, 0.2), 2.0);
        let step_t = (-0.4_f32).exp();
        assert!((v.x - 2.0 * (1.0 - step_t)).abs() < 1e-6);
        assert!((v.w - step_t).abs() < 1e-6);
    }

    #[test]
    fn test_negative_slice_length_never_amplifies() {
        let input = vec![Vec4::new(0.5, 0.5, 0.5, 1.0); 8];
        let mut output = vec![Vec4::ZERO; 8];
        scan_column(&input, &mut output, -3.0);
        assert!(output.iter().all(|v| *v == Vec4::new(0.0, 0.0, 0.0, 1.0)));
    }

    #[test]
    fn test_in_scatter_without_extinction_is_ignored() {
        let mut acc = ScatterAccumulator::default();
        let v = acc.step(Vec4::new(5.0, 5.0, 5.0, 0.0), 1.0);
        assert_eq!(v, Vec4::new(0.0, 0.0, 0.0, 1.0));
    }
}
