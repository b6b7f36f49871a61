use glam::Vec3;

use crate::{F32Ext, Ray, Reservoir, Vec3Ext};

/// A single GI path sample: the visible surface it was created from, the
/// secondary surface it bounced off and the radiance leaving that surface.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct GiSample {
    pub creation_point: Vec3,
    pub creation_normal: Vec3,
    pub hit_point: Vec3,
    pub hit_normal: Vec3,
    pub radiance: Vec3,

    /// Index of the light whose sample was used to light the hit point,
    /// `u32::MAX` when none was.
    pub light_id: u32,
}

pub type GiReservoir = Reservoir<GiSample>;

impl GiSample {
    /// Distance at which escaped (sky) samples are placed.
    pub const SKY_DISTANCE: f32 = 100_000.0;

    pub const NO_LIGHT: u32 = u32::MAX;

    pub fn exists(&self) -> bool {
        self.hit_normal != Vec3::ZERO
    }

    pub fn dir(&self, point: Vec3) -> Vec3 {
        (self.hit_point - point).normalize_or_zero()
    }

    pub fn cosine(&self, point: Vec3, normal: Vec3) -> f32 {
        self.dir(point).dot(normal).max(0.0)
    }

    /// Target function of this sample, as seen from given surface.
    pub fn target_pdf(&self, point: Vec3, normal: Vec3) -> f32 {
        if !self.exists() {
            return 0.0;
        }

        self.radiance.luma() * self.cosine(point, normal)
    }

    /// Ray going from given point towards the sample, used for visibility
    /// tests.
    pub fn ray(&self, point: Vec3, bias: f32) -> Ray {
        Ray::between(point, self.hit_point, bias)
    }

    /// Reconnection jacobian for reusing this sample from `new_point`.
    pub fn jacobian(&self, new_point: Vec3) -> f32 {
        if !self.exists() {
            return 1.0;
        }

        let (new_dist, new_cos) = self.partial_jacobian(new_point);
        let (old_dist, old_cos) = self.partial_jacobian(self.creation_point);

        let x = new_cos * old_dist.sqr();
        let y = old_cos * new_dist.sqr();

        if y == 0.0 {
            0.0
        } else {
            x / y
        }
    }

    fn partial_jacobian(&self, point: Vec3) -> (f32, f32) {
        let vec = point - self.hit_point;
        let dist = vec.length();

        if dist == 0.0 {
            return (0.0, 0.0);
        }

        let cos = self.hit_normal.dot(vec / dist).saturate();

        (dist, cos)
    }
}

impl GiReservoir {
    /// Returns the final contribution weight of the selected sample, i.e.
    /// `W` after normalization.
    pub fn weight(&self) -> f32 {
        self.w
    }

    /// Drops the selected sample while keeping the reservoir's age, which is
    /// what feedback visibility does for occluded samples.
    pub fn invalidate(&mut self) {
        self.w = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use glam::vec3;

    use super::*;

    fn sample() -> GiSample {
        GiSample {
            creation_point: vec3(0.0, 0.0, 0.0),
            creation_normal: Vec3::Y,
            hit_point: vec3(0.0, 2.0, 0.0),
            hit_normal: -Vec3::Y,
            radiance: Vec3::ONE,
            light_id: 0,
        }
    }

    #[test]
    fn target_pdf() {
        let sample = sample();

        assert_relative_eq!(1.0, sample.target_pdf(Vec3::ZERO, Vec3::Y));
        assert_eq!(0.0, sample.target_pdf(Vec3::ZERO, -Vec3::Y));
        assert_eq!(0.0, GiSample::default().target_pdf(Vec3::ZERO, Vec3::Y));
    }

    #[test]
    fn jacobian() {
        let sample = sample();

        assert_relative_eq!(1.0, sample.jacobian(Vec3::ZERO));

        // Twice as far, seen head-on: a quarter of the solid angle
        assert_relative_eq!(
            0.25,
            sample.jacobian(vec3(0.0, -2.0, 0.0)),
            epsilon = 1e-5
        );
    }
}
