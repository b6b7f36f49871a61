mod gi;
mod packed;

pub use self::gi::*;
pub use self::packed::*;

use crate::WhiteNoise;

/// Weighted-reservoir-sampling state: one selected sample, the sum of
/// candidate weights (`w`, later normalized into the unbiased contribution
/// weight) and the number of candidates seen so far (`m`).
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Reservoir<T> {
    pub sample: T,
    pub m: f32,
    pub w: f32,
}

impl<T> Reservoir<T>
where
    T: Clone + Copy,
{
    pub fn update(
        &mut self,
        wnoise: &mut WhiteNoise,
        sample: T,
        weight: f32,
    ) -> bool {
        self.m += 1.0;
        self.w += weight;

        if wnoise.sample() * self.w < weight {
            self.sample = sample;
            true
        } else {
            false
        }
    }

    /// Merges `rhs` (already normalized) into this reservoir, using `pdf` as
    /// the target pdf of `rhs.sample` at this reservoir's pixel.
    pub fn merge(
        &mut self,
        wnoise: &mut WhiteNoise,
        rhs: &Self,
        pdf: f32,
    ) -> bool {
        if rhs.m <= 0.0 {
            return false;
        }

        self.m += rhs.m - 1.0;
        self.update(wnoise, rhs.sample, rhs.w * rhs.m * pdf)
    }

    pub fn normalize(&mut self, pdf: f32) {
        let t = self.m * pdf;

        self.w = if t == 0.0 { 0.0 } else { self.w / t };
    }

    pub fn normalize_ex(&mut self, pdf: f32, norm_num: f32, norm_denom: f32) {
        let denom = pdf * norm_denom;

        self.w = if denom == 0.0 {
            0.0
        } else {
            (self.w * norm_num) / denom
        };
    }

    pub fn clamp_m(&mut self, max: f32) {
        self.m = self.m.min(max);
    }

    pub fn is_empty(&self) -> bool {
        self.m <= 0.0
    }
}
