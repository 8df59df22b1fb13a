//! Light list model, GPU light layout, and per-frame light collection for fog injection.

mod ambient;
mod light;
mod point;

pub use ambient::{AMBIENT_SCALE, AmbientLight};
pub use light::{LightKind, LightSource};
pub use point::{
    MIN_LIGHT_RANGE, PointLightCollector, PointLightParams, attenuation, inverse_range_squared,
};
