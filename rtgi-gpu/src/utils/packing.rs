//! Bit-level encodings shared by the reservoir records and probe textures.

use glam::{vec3, Vec3};

use crate::F32Ext;

/// Converts a float into IEEE-754 binary16, rounding to nearest.
pub fn f32_to_f16(value: f32) -> u16 {
    let bits = value.to_bits();
    let sign = ((bits >> 16) & 0x8000) as u16;
    let exp = ((bits >> 23) & 0xff) as i32;
    let mant = bits & 0x007f_ffff;

    if exp == 0xff {
        let nan = if mant != 0 { 0x0200 } else { 0 };

        return sign | 0x7c00 | nan;
    }

    let exp = exp - 127 + 15;

    if exp >= 0x1f {
        return sign | 0x7c00;
    }

    if exp <= 0 {
        if exp < -10 {
            return sign;
        }

        let mant = mant | 0x0080_0000;
        let shift = (14 - exp) as u32;
        let half = mant >> shift;
        let round = (mant >> (shift - 1)) & 1;

        return sign | (half + round) as u16;
    }

    let half = ((exp as u32) << 10) | (mant >> 13);
    let round = (mant >> 12) & 1;

    sign | (half + round) as u16
}

/// See: [`f32_to_f16()`].
pub fn f16_to_f32(half: u16) -> f32 {
    let sign = ((half & 0x8000) as u32) << 16;
    let exp = ((half >> 10) & 0x1f) as u32;
    let mant = (half & 0x03ff) as u32;

    let bits = match exp {
        0 if mant == 0 => sign,

        0 => {
            let value = mant as f32 * 2.0f32.powi(-24);

            return if sign != 0 { -value } else { value };
        }

        0x1f => sign | 0x7f80_0000 | (mant << 13),
        _ => sign | ((exp + 112) << 23) | (mant << 13),
    };

    f32::from_bits(bits)
}

/// Largest value representable by [`pack_rgb9e5()`].
pub const RGB9E5_MAX: f32 = 65408.0;

/// Packs a non-negative color into a shared-exponent `R9G9B9E5` word.
pub fn pack_rgb9e5(rgb: Vec3) -> u32 {
    const EXP_BIAS: i32 = 15;
    const MANT_BITS: i32 = 9;

    let rgb = vec3(
        sanitize_rgb9e5(rgb.x),
        sanitize_rgb9e5(rgb.y),
        sanitize_rgb9e5(rgb.z),
    );

    let max_c = rgb.max_element();

    let exp = (max_c.max(2.0f32.powi(-EXP_BIAS - 1)).log2().floor() as i32
        + 1
        + EXP_BIAS)
        .max(0);

    let mut denom = 2.0f32.powi(exp - EXP_BIAS - MANT_BITS);
    let max_m = (max_c / denom + 0.5).floor() as i32;

    let exp = if max_m == (1 << MANT_BITS) {
        denom *= 2.0;
        exp + 1
    } else {
        exp
    };

    let r = ((rgb.x / denom + 0.5).floor() as u32).min(511);
    let g = ((rgb.y / denom + 0.5).floor() as u32).min(511);
    let b = ((rgb.z / denom + 0.5).floor() as u32).min(511);

    r | (g << 9) | (b << 18) | ((exp as u32) << 27)
}

/// See: [`pack_rgb9e5()`].
pub fn unpack_rgb9e5(word: u32) -> Vec3 {
    let exp = (word >> 27) as i32;
    let scale = 2.0f32.powi(exp - 15 - 9);

    vec3(
        (word & 0x1ff) as f32,
        ((word >> 9) & 0x1ff) as f32,
        ((word >> 18) & 0x1ff) as f32,
    ) * scale
}

fn sanitize_rgb9e5(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, RGB9E5_MAX)
    }
}

/// Packs a value from `<0.0, 1.0>` into an unsigned normalized integer of
/// given bit width.
pub fn pack_unorm(value: f32, bits: u32) -> u32 {
    let max = ((1u64 << bits) - 1) as f32;

    (value.saturate() * max + 0.5) as u32
}

/// See: [`pack_unorm()`].
pub fn unpack_unorm(value: u32, bits: u32) -> f32 {
    let max = ((1u64 << bits) - 1) as f32;

    (value as f32) / max
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn f16() {
        for value in [0.0, 1.0, -2.5, 0.333, 1000.0, 6.1e-5, 65504.0] {
            assert_relative_eq!(
                value,
                f16_to_f32(f32_to_f16(value)),
                max_relative = 1e-3
            );
        }

        assert_eq!(0x7c00, f32_to_f16(1e9));
        assert!(f16_to_f32(f32_to_f16(f32::NAN)).is_nan());
    }

    #[test]
    fn rgb9e5() {
        let color = vec3(0.25, 3.5, 120.0);
        let decoded = unpack_rgb9e5(pack_rgb9e5(color));

        assert_relative_eq!(color.z, decoded.z, max_relative = 1e-2);
        assert_relative_eq!(color.y, decoded.y, max_relative = 5e-2);
        assert_eq!(Vec3::ZERO, unpack_rgb9e5(pack_rgb9e5(Vec3::ZERO)));
        assert_eq!(Vec3::ZERO, unpack_rgb9e5(pack_rgb9e5(Vec3::splat(-1.0))));
    }

    #[test]
    fn unorm() {
        assert_eq!(1023, pack_unorm(1.0, 10));
        assert_eq!(0, pack_unorm(-1.0, 10));
        assert_eq!(65535, pack_unorm(2.0, 16));
        assert_relative_eq!(0.5, unpack_unorm(pack_unorm(0.5, 16), 16), epsilon = 1e-4);
    }
}
