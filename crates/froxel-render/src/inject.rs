//! Injection stage: per-voxel density and in-scattered light.
//!
//! Every voxel reconstructs its world position from the interpolated frustum
//! ray, evaluates the height-fog density there, sums the ambient term and every
//! point light, and writes `(lighting * density, density)`.

use bytemuck::{Pod, Zeroable};
use froxel_lighting::PointLightParams;
use glam::{Vec3, Vec4};

use crate::params::FrameParams;

/// Threads per workgroup for the injection dispatch.
pub const INJECT_WORKGROUP: [u32; 3] = [16, 2, 16];

/// Per-channel ceiling on injected radiance, just under the half-float maximum.
pub const MAX_INJECTED_RADIANCE: f32 = 6.0e4;

/// GPU uniform for the injection kernel.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub(crate) struct InjectUniforms {
    pub camera_position: [f32; 4],
    pub frustum_rays: [[f32; 4]; 4],
    /// Packed ambient color; `w` is the global intensity.
    pub ambient_intensity: [f32; 4],
    /// Constant, height exponent, height offset, height amount.
    pub fog_params: [f32; 4],
    /// Global density scale, near-over-far, depth span.
    pub density_clip: [f32; 4],
    /// Volume resolution; `w` is the point light count.
    pub resolution: [u32; 4],
}

impl InjectUniforms {
    pub fn new(frame: &FrameParams, light_count: usize) -> Self {
        let res = frame.resolution;
        Self {
            camera_position: frame.camera_position.extend(1.0).to_array(),
            frustum_rays: frame.rays.to_uniform(),
            ambient_intensity: frame.ambient.extend(frame.global_intensity).to_array(),
            fog_params: frame.fog.to_uniform(),
            density_clip: [
                frame.fog.global_density_scale,
                frame.clip.near_over_far(),
                frame.clip.depth_span(),
                0.0,
            ],
            resolution: [res.x, res.y, res.z, light_count as u32],
        }
    }
}

/// WGSL source for the injection compute kernel.
pub const INJECT_SHADER_SOURCE: &str = r#"
struct InjectUniforms {
    camera_position: vec4<f32>,
    frustum_rays: array<vec4<f32>, 4>,
    ambient_intensity: vec4<f32>,
    fog_params: vec4<f32>,
    density_clip: vec4<f32>,
    resolution: vec4<u32>,
};

struct PointLight {
    position: vec3<f32>,
    inverse_range_squared: f32,
    color: vec3<f32>,
    _padding: f32,
};

@group(0) @binding(0) var<uniform> params: InjectUniforms;
@group(0) @binding(1) var<storage, read> lights: array<PointLight>;
@group(0) @binding(2) var injection: texture_storage_3d<rgba16float, write>;

fn fog_density(height: f32) -> f32 {
    let falloff = min(-params.fog_params.y * (height - params.fog_params.z), 80.0);
    let base = max(params.fog_params.x + params.fog_params.w * exp(falloff), 0.0);
    return clamp(base * params.density_clip.x, 0.0, 1000.0);
}

@compute @workgroup_size(16, 2, 16)
fn inject_main(@builtin(global_invocation_id) id: vec3<u32>) {
    let res = params.resolution.xyz;
    if (id.x >= res.x || id.y >= res.y || id.z >= res.z) {
        return;
    }

    let uv = vec2<f32>(f32(id.x) / f32(res.x), f32(id.y) / f32(res.y));
    let bottom = mix(params.frustum_rays[0].xyz, params.frustum_rays[1].xyz, uv.x);
    let top = mix(params.frustum_rays[3].xyz, params.frustum_rays[2].xyz, uv.x);
    let ray = mix(bottom, top, uv.y);

    let t = f32(id.z) / f32(res.z);
    let world = params.camera_position.xyz + ray * (params.density_clip.y + params.density_clip.z * t);

    let density = fog_density(world.y);

    var lighting = params.ambient_intensity.xyz;
    for (var i = 0u; i < params.resolution.w; i = i + 1u) {
        let light = lights[i];
        let offset = light.position - world;
        let d2 = dot(offset, offset);
        lighting = lighting + light.color / (1.0 + d2 * light.inverse_range_squared);
    }
    lighting = lighting * params.ambient_intensity.w;

    let in_scatter = min(lighting * density, vec3<f32>(60000.0));
    textureStore(injection, vec3<i32>(id), vec4<f32>(in_scatter, density));
}
"#;

/// Workgroup counts covering `extent` with `workgroup` threads per axis.
pub fn workgroup_count(extent: [u32; 3], workgroup: [u32; 3]) -> [u32; 3] {
    [
        extent[0].div_ceil(workgroup[0]),
        extent[1].div_ceil(workgroup[1]),
        extent[2].div_ceil(workgroup[2]),
    ]
}

/// World position of voxel `(x, y, z)`.
pub fn voxel_world_position(frame: &FrameParams, x: u32, y: u32, z: u32) -> Vec3 {
    let ray = frame.column_ray(x, y);
    let t = z as f32 / frame.resolution.z as f32;
    frame.camera_position + ray * frame.clip.depth_fraction(t)
}

/// Ambient plus every point light at `world`, scaled by the global intensity.
pub fn light_at(frame: &FrameParams, lights: &[PointLightParams], world: Vec3) -> Vec3 {
    let lighting = lights
        .iter()
        .fold(frame.ambient, |acc, light| acc + light.radiance_at(world));
    lighting * frame.global_intensity
}

/// Injected value for one voxel: `(lighting * density, density)`, with the
/// radiance capped at [`MAX_INJECTED_RADIANCE`].
pub fn inject_voxel(
    frame: &FrameParams,
    lights: &[PointLightParams],
    x: u32,
    y: u32,
    z: u32,
) -> Vec4 {
    let world = voxel_world_position(frame, x, y, z);
    let density = frame.fog.density_at(world.y);
    (light_at(frame, lights, world) * density)
        .min(Vec3::splat(MAX_INJECTED_RADIANCE))
        .extend(density)
}

/// Fill one depth column. `column.len()` is the slice count.
pub fn inject_column(
    frame: &FrameParams,
    lights: &[PointLightParams],
    x: u32,
    y: u32,
    column: &mut [Vec4],
) {
    for (z, voxel) in column.iter_mut().enumerate() {
        *voxel = inject_voxel(frame, lights, x, y, z as u32);
    }
}
