//! Common structs, algorithms etc. used by the GI kernels and the renderer.

#![allow(clippy::len_without_is_empty)]
#![allow(clippy::manual_range_contains)]
#![allow(clippy::too_many_arguments)]

mod ddgi;
mod gbuffer;
mod light;
mod light_node;
mod light_sampler;
mod noise;
mod normal;
mod passes;
mod ray;
mod reservoir;
mod surfel;
mod texture;
mod utils;

pub use self::ddgi::*;
pub use self::gbuffer::*;
pub use self::light::*;
pub use self::light_node::*;
pub use self::light_sampler::*;
pub use self::noise::*;
pub use self::normal::*;
pub use self::passes::*;
pub use self::ray::*;
pub use self::reservoir::*;
pub use self::surfel::*;
pub use self::texture::*;
pub use self::utils::*;

pub mod prelude {
    pub use core::f32::consts::PI;

    pub use glam::*;

    pub use crate::*;
}

pub const RTGI_EPSILON: f32 = 1e-6;

/// Golden angle, used for spatial sampling patterns.
pub const GOLDEN_ANGLE: f32 = 2.39996;

/// Number of offsets in the spatial-resampling disc table; a power of two,
/// so that it can be indexed with `& (SPATIAL_DISC_SIZE - 1)`.
pub const SPATIAL_DISC_SIZE: usize = 8192;

/// Marks "infinite" hit distances (sky, missed probe rays).
pub const FAR_DISTANCE: f32 = 1e27;
