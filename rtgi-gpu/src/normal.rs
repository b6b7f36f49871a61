use glam::{vec3, Vec2, Vec3, Vec3Swizzles};

use crate::{pack_unorm, unpack_unorm};

pub struct Normal;

impl Normal {
    /// Compresses normal from Vec3 into Vec2 using octahedron-normal mapping.
    pub fn encode(n: Vec3) -> Vec2 {
        let n = n / (n.x.abs() + n.y.abs() + n.z.abs());

        let n = if n.z >= 0.0 {
            n.xy()
        } else {
            let mut t = 1.0 - n.yx().abs();

            t.x = t.x.copysign(n.x);
            t.y = t.y.copysign(n.y);
            t
        };

        n * 0.5 + 0.5
    }

    /// See: [`Self::encode()`].
    pub fn decode(n: Vec2) -> Vec3 {
        let n = n * 2.0 - 1.0;
        let mut n = vec3(n.x, n.y, 1.0 - n.x.abs() - n.y.abs());
        let t = (-n.z).max(0.0);

        n.x -= t.copysign(n.x);
        n.y -= t.copysign(n.y);
        n.normalize()
    }

    /// Encodes normal into a single word (2x16 bits).
    pub fn pack(n: Vec3) -> u32 {
        let n = Self::encode(n);

        pack_unorm(n.x, 16) | (pack_unorm(n.y, 16) << 16)
    }

    /// See: [`Self::pack()`].
    pub fn unpack(word: u32) -> Vec3 {
        Self::decode(glam::vec2(
            unpack_unorm(word & 0xffff, 16),
            unpack_unorm(word >> 16, 16),
        ))
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;

    #[test]
    fn pack() {
        for n in [
            vec3(0.0, 0.0, 1.0),
            vec3(0.0, 0.0, -1.0),
            vec3(1.0, -2.0, 0.5).normalize(),
            vec3(-0.3, 0.1, -0.9).normalize(),
        ] {
            let decoded = Normal::unpack(Normal::pack(n));

            assert_abs_diff_eq!(n.x, decoded.x, epsilon = 1e-3);
            assert_abs_diff_eq!(n.y, decoded.y, epsilon = 1e-3);
            assert_abs_diff_eq!(n.z, decoded.z, epsilon = 1e-3);
        }
    }
}
