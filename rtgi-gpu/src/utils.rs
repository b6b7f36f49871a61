mod f32_ext;
mod packing;
mod vec3_ext;

use core::ops;

pub use self::f32_ext::*;
pub use self::packing::*;
pub use self::vec3_ext::*;

pub fn lerp<T>(a: T, b: T, t: f32) -> T
where
    T: ops::Add<Output = T>,
    T: ops::Sub<Output = T>,
    T: ops::Mul<f32, Output = T>,
    T: Copy,
{
    a + (b - a) * t.clamp(0.0, 1.0)
}

/// Returns `ceil(a / b)`, used for work-group counts and padded extents.
pub fn div_round_up(a: u32, b: u32) -> u32 {
    (a + b - 1) / b
}

/// Returns `i`-th of `n` low-discrepancy points in the unit disk (a Vogel
/// spiral), used to build the spatial-resampling disc table.
pub fn spatial_disc_point(i: u32, n: u32) -> glam::Vec2 {
    let r = ((i as f32 + 0.5) / n.max(1) as f32).sqrt();
    let theta = i as f32 * crate::GOLDEN_ANGLE;

    glam::vec2(theta.cos(), theta.sin()) * r
}
