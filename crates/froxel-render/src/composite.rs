//! Compositing stage: blend the scatter volume over the source image.
//!
//! Each destination pixel maps its scene depth into volume depth, samples the
//! accumulated `(radiance, transmittance)` there and outputs
//! `source * transmittance + radiance`. Pixels in front of the first slice fade
//! from the identity value `(0, 0, 0, 1)` toward slice 0.

use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3, Vec4};

use crate::params::FrameParams;

/// The "no fog" scatter value.
pub const IDENTITY_SCATTER: Vec4 = Vec4::new(0.0, 0.0, 0.0, 1.0);

/// GPU uniform for the composite pass.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub(crate) struct CompositeUniforms {
    /// Volume resolution; `w` is 1 when a depth texture is bound.
    pub resolution: [u32; 4],
    /// Depth ratio, near-over-far, depth span.
    pub clip: [f32; 4],
}

impl CompositeUniforms {
    pub fn new(frame: &FrameParams, has_depth: bool) -> Self {
        let res = frame.resolution;
        Self {
            resolution: [res.x, res.y, res.z, u32::from(has_depth)],
            clip: [
                frame.clip.depth_ratio(),
                frame.clip.near_over_far(),
                frame.clip.depth_span(),
                0.0,
            ],
        }
    }
}

/// WGSL source for the composite and blit passes.
pub const COMPOSITE_SHADER_SOURCE: &str = r#"
struct CompositeUniforms {
    resolution: vec4<u32>,
    clip: vec4<f32>,
};

struct VertexOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) uv: vec2<f32>,
};

@group(0) @binding(0) var<uniform> params: CompositeUniforms;
@group(0) @binding(1) var source_tex: texture_2d<f32>;
@group(0) @binding(2) var depth_tex: texture_2d<f32>;
@group(0) @binding(3) var scatter_tex: texture_3d<f32>;
@group(0) @binding(4) var scatter_sampler: sampler;

@vertex
fn vs_fullscreen(@builtin(vertex_index) idx: u32) -> VertexOutput {
    let uv = vec2<f32>(f32((idx << 1u) & 2u), f32(idx & 2u));
    var out: VertexOutput;
    out.position = vec4<f32>(uv * 2.0 - 1.0, 0.0, 1.0);
    out.uv = vec2<f32>(uv.x, 1.0 - uv.y);
    return out;
}

fn volume_depth(pixel: vec2<i32>) -> f32 {
    let span = params.clip.z;
    if (params.resolution.w == 0u || span <= 0.0) {
        return 1.0;
    }
    let linear01 = textureLoad(depth_tex, pixel, 0).r;
    return clamp((linear01 * params.clip.x - params.clip.y) / span, 0.0, 1.0);
}

fn sample_scatter(uv: vec2<f32>, t: f32) -> vec4<f32> {
    let res = vec3<f32>(params.resolution.xyz);
    let slice = t * res.z - 1.0;
    let xy = uv + 0.5 / res.xy;
    let z = (max(slice, 0.0) + 0.5) / res.z;
    let fog = textureSampleLevel(scatter_tex, scatter_sampler, vec3<f32>(xy, z), 0.0);
    if (slice < 0.0) {
        let identity = vec4<f32>(0.0, 0.0, 0.0, 1.0);
        return identity + (fog - identity) * (slice + 1.0);
    }
    return fog;
}

@fragment
fn fs_composite(in: VertexOutput) -> @location(0) vec4<f32> {
    let pixel = vec2<i32>(in.position.xy);
    let source = textureLoad(source_tex, pixel, 0);
    let volume_uv = vec2<f32>(in.uv.x, 1.0 - in.uv.y);
    let fog = sample_scatter(volume_uv, volume_depth(pixel));
    return vec4<f32>(source.rgb * fog.a + fog.rgb, source.a);
}

@fragment
fn fs_blit(in: VertexOutput) -> @location(0) vec4<f32> {
    return textureLoad(source_tex, vec2<i32>(in.position.xy), 0);
}
"#;

/// Volume-space UV of pixel `(px, py)` in a `width`×`height` image whose
/// row 0 is the top.
pub fn pixel_volume_uv(px: u32, py: u32, width: u32, height: u32) -> Vec2 {
    Vec2::new(
        (px as f32 + 0.5) / width as f32,
        1.0 - (py as f32 + 0.5) / height as f32,
    )
}

/// Continuous scatter-volume coordinate for volume UV `uv` at depth `t`.
///
/// `x`/`y` are column indices and `z` is the slice index, which is negative in
/// front of the first slice boundary.
pub fn scatter_coordinate(frame: &FrameParams, uv: Vec2, t: f32) -> Vec3 {
    let res = frame.resolution;
    Vec3::new(
        uv.x * res.x as f32,
        uv.y * res.y as f32,
        t * res.z as f32 - 1.0,
    )
}

/// Fade `first_slice` toward the identity for slice coordinates below zero.
pub fn fade_to_identity(first_slice: Vec4, slice: f32) -> Vec4 {
    if slice >= 0.0 {
        return first_slice;
    }
    let w = (slice + 1.0).max(0.0);
    IDENTITY_SCATTER + (first_slice - IDENTITY_SCATTER) * w
}

/// `source * transmittance + radiance`, keeping the source alpha.
pub fn composite_pixel(source: Vec4, fog: Vec4) -> Vec4 {
    (source.truncate() * fog.w + fog.truncate()).extend(source.w)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::Camera;
    use crate::params::FogSettings;
    use crate::volume::VolumeResolution;

    #[test]
    fn test_uniform_size() {
        assert_eq!(std::mem::size_of::<CompositeUniforms>(), 32);
    }

    #[test]
    fn test_identity_fog_is_exact_passthrough() {
        let source = Vec4::new(0.3, 0.6, 0.9, 0.5);
        assert_eq!(composite_pixel(source, IDENTITY_SCATTER), source);
    }

    #[test]
    fn test_opaque_fog_replaces_source() {
        let source = Vec4::new(1.0, 1.0, 1.0, 1.0);
        let fog = Vec4::new(0.2, 0.3, 0.4, 0.0);
        assert_eq!(composite_pixel(source, fog), Vec4::new(0.2, 0.3, 0.4, 1.0));
    }

    #[test]
    fn test_fade_before_first_slice() {
        let first = Vec4::new(1.0, 1.0, 1.0, 0.5);
        assert_eq!(fade_to_identity(first, -1.0), IDENTITY_SCATTER);
        assert_eq!(fade_to_identity(first, 0.0), first);
        let half = fade_to_identity(first, -0.5);
        assert!((half - Vec4::new(0.5, 0.5, 0.5, 0.75)).length() < 1e-6);
    }

    #[test]
    fn test_far_pixel_reads_last_slice() {
        let settings = FogSettings::default();
        let frame = FrameParams::new(
            &settings,
            &Camera::default(),
            VolumeResolution::new(4, 4, 32).unwrap(),
        );
        let c = scatter_coordinate(&frame, Vec2::new(0.5, 0.5), 1.0);
        assert_eq!(c, Vec3::new(2.0, 2.0, 31.0));
        let near = scatter_coordinate(&frame, Vec2::ZERO, 0.0);
        assert_eq!(near.z, -1.0);
    }

    #[test]
    fn test_pixel_uv_flips_rows() {
        let top_left = pixel_volume_uv(0, 0, 4, 2);
        let bottom_right = pixel_volume_uv(3, 1, 4, 2);
        assert_eq!(top_left, Vec2::new(0.125, 0.75));
        assert_eq!(bottom_right, Vec2::new(0.875, 0.25));
    }
}
