use core::f32::consts::PI;

use glam::{vec2, vec3, UVec2, Vec2, Vec3};

use crate::Vec3Ext;

/// PCG-based white noise; one instance per invocation.
#[derive(Copy, Clone, Debug)]
pub struct WhiteNoise {
    state: u32,
}

impl WhiteNoise {
    pub fn new(seed: u32, id: UVec2) -> Self {
        Self {
            state: seed
                ^ 48619u32.wrapping_mul(id.x)
                ^ 95461u32.wrapping_mul(id.y),
        }
    }

    /// Creates noise for a 1D invocation (probe, surfel, light etc.).
    pub fn from_index(seed: u32, idx: u32) -> Self {
        Self::new(seed, glam::uvec2(idx, idx.rotate_left(16) ^ 0x9e37_79b9))
    }

    /// Generates a uniform sample in range `<0.0, 1.0)`.
    pub fn sample(&mut self) -> f32 {
        // 24 bits keep the result strictly below 1.0
        ((self.sample_int() >> 8) as f32) / ((1u32 << 24) as f32)
    }

    /// Generates a uniform sample in range `<0, u32::MAX>`.
    pub fn sample_int(&mut self) -> u32 {
        self.state = self
            .state
            .wrapping_mul(747796405)
            .wrapping_add(2891336453);

        let word = ((self.state >> ((self.state >> 28) + 4)) ^ self.state)
            .wrapping_mul(277803737);

        (word >> 22) ^ word
    }

    /// Generates a uniform sample on a circle.
    pub fn sample_circle(&mut self) -> Vec2 {
        let angle = self.sample() * PI * 2.0;

        vec2(angle.cos(), angle.sin())
    }

    /// Generates a uniform sample inside of a disk.
    pub fn sample_disk(&mut self) -> Vec2 {
        let radius = self.sample().sqrt();

        self.sample_circle() * radius
    }

    /// Generates a uniform sample on a sphere.
    pub fn sample_sphere(&mut self) -> Vec3 {
        let z = self.sample() * 2.0 - 1.0;
        let phi = self.sample() * 2.0 * PI;
        let r = (1.0 - z * z).max(0.0).sqrt();

        vec3(r * phi.cos(), r * phi.sin(), z)
    }

    /// Generates a cosine-weighted sample on a hemisphere around given
    /// normal; the pdf of the returned direction is `cos(theta) / PI`.
    pub fn sample_hemisphere(&mut self, normal: Vec3) -> Vec3 {
        let u = self.sample_disk();
        let z = (1.0 - u.length_squared()).max(0.0).sqrt();
        let t = normal.any_orthonormal();
        let b = normal.cross(t);

        (t * u.x + b * u.y + normal * z).normalize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn samples_stay_in_range() {
        let mut noise = WhiteNoise::new(1234, glam::uvec2(5, 7));
        let normal = vec3(0.0, 1.0, 0.0);

        for _ in 0..10_000 {
            let s = noise.sample();

            assert!((0.0..1.0).contains(&s));
            assert!(noise.sample_disk().length() <= 1.0 + 1e-5);
            assert!(noise.sample_hemisphere(normal).dot(normal) >= -1e-5);
        }
    }

    #[test]
    fn different_pixels_diverge() {
        let mut a = WhiteNoise::new(1, glam::uvec2(0, 0));
        let mut b = WhiteNoise::new(1, glam::uvec2(1, 0));

        assert_ne!(a.sample_int(), b.sample_int());
    }
}
