use glam::{uvec2, vec4, UVec2, Vec2, Vec4};

use crate::{f16_to_f32, f32_to_f16, lerp, pack_unorm, unpack_unorm};

/// Storage format of a texture's texels; the numeric values are the tags
/// written into persisted probe data.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    A32B32G32R32F = 1,
    G16R16F = 15,
    G32R32F = 17,
    A2B10G10R10 = 18,
    A16B16G16R16 = 19,
    R8Uint = 62,
}

impl PixelFormat {
    pub fn from_tag(tag: u32) -> Option<Self> {
        Some(match tag {
            1 => Self::A32B32G32R32F,
            15 => Self::G16R16F,
            17 => Self::G32R32F,
            18 => Self::A2B10G10R10,
            19 => Self::A16B16G16R16,
            62 => Self::R8Uint,
            _ => return None,
        })
    }

    pub fn tag(self) -> u32 {
        self as u32
    }

    pub fn bytes_per_pixel(self) -> usize {
        match self {
            Self::A32B32G32R32F => 16,
            Self::G32R32F | Self::A16B16G16R16 => 8,
            Self::G16R16F | Self::A2B10G10R10 => 4,
            Self::R8Uint => 1,
        }
    }

    /// Encodes a texel; channels not present in the format are dropped and
    /// normalized formats saturate.
    pub fn encode(self, value: Vec4, out: &mut [u8]) {
        match self {
            Self::A32B32G32R32F => {
                for (i, v) in value.to_array().into_iter().enumerate() {
                    out[4 * i..4 * i + 4].copy_from_slice(&v.to_le_bytes());
                }
            }

            Self::G32R32F => {
                out[0..4].copy_from_slice(&value.x.to_le_bytes());
                out[4..8].copy_from_slice(&value.y.to_le_bytes());
            }

            Self::G16R16F => {
                out[0..2].copy_from_slice(&f32_to_f16(value.x).to_le_bytes());
                out[2..4].copy_from_slice(&f32_to_f16(value.y).to_le_bytes());
            }

            Self::A2B10G10R10 => {
                let word = pack_unorm(value.x, 10)
                    | (pack_unorm(value.y, 10) << 10)
                    | (pack_unorm(value.z, 10) << 20)
                    | (pack_unorm(value.w, 2) << 30);

                out[0..4].copy_from_slice(&word.to_le_bytes());
            }

            Self::A16B16G16R16 => {
                for (i, v) in value.to_array().into_iter().enumerate() {
                    let v = pack_unorm(v, 16) as u16;

                    out[2 * i..2 * i + 2].copy_from_slice(&v.to_le_bytes());
                }
            }

            Self::R8Uint => {
                out[0] = value.x.clamp(0.0, 255.0) as u8;
            }
        }
    }

    /// See: [`Self::encode()`].
    pub fn decode(self, data: &[u8]) -> Vec4 {
        let f32_at = |i: usize| {
            f32::from_le_bytes([data[i], data[i + 1], data[i + 2], data[i + 3]])
        };

        let u16_at = |i: usize| u16::from_le_bytes([data[i], data[i + 1]]);

        match self {
            Self::A32B32G32R32F => {
                vec4(f32_at(0), f32_at(4), f32_at(8), f32_at(12))
            }

            Self::G32R32F => vec4(f32_at(0), f32_at(4), 0.0, 1.0),

            Self::G16R16F => vec4(
                f16_to_f32(u16_at(0)),
                f16_to_f32(u16_at(2)),
                0.0,
                1.0,
            ),

            Self::A2B10G10R10 => {
                let word = u32::from_le_bytes([data[0], data[1], data[2], data[3]]);

                vec4(
                    unpack_unorm(word & 0x3ff, 10),
                    unpack_unorm((word >> 10) & 0x3ff, 10),
                    unpack_unorm((word >> 20) & 0x3ff, 10),
                    unpack_unorm(word >> 30, 2),
                )
            }

            Self::A16B16G16R16 => vec4(
                unpack_unorm(u16_at(0) as u32, 16),
                unpack_unorm(u16_at(2) as u32, 16),
                unpack_unorm(u16_at(4) as u32, 16),
                unpack_unorm(u16_at(6) as u32, 16),
            ),

            Self::R8Uint => vec4(data[0] as f32, 0.0, 0.0, 1.0),
        }
    }
}

/// Read-only view of a tightly packed 2D texture.
#[derive(Clone, Copy, Debug)]
pub struct TextureView<'a> {
    size: UVec2,
    format: PixelFormat,
    data: &'a [u8],
}

impl<'a> TextureView<'a> {
    pub fn new(size: UVec2, format: PixelFormat, data: &'a [u8]) -> Self {
        debug_assert_eq!(
            (size.x * size.y) as usize * format.bytes_per_pixel(),
            data.len()
        );

        Self { size, format, data }
    }

    pub fn size(&self) -> UVec2 {
        self.size
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn load(&self, pos: UVec2) -> Vec4 {
        let bpp = self.format.bytes_per_pixel();
        let offset = (pos.y * self.size.x + pos.x) as usize * bpp;

        self.format.decode(&self.data[offset..offset + bpp])
    }

    /// Bilinearly samples the texture at given position (in texels, where
    /// `(0.5, 0.5)` is the center of the first texel), clamping to the edges.
    pub fn sample_bilinear(&self, pos: Vec2) -> Vec4 {
        let max = self.size.as_vec2() - Vec2::ONE;
        let pos = (pos - 0.5).clamp(Vec2::ZERO, max);
        let base = pos.floor();
        let t = pos - base;

        let p0 = base.as_uvec2();
        let p1 = (base + Vec2::ONE).min(max).as_uvec2();

        let a = self.load(p0);
        let b = self.load(uvec2(p1.x, p0.y));
        let c = self.load(uvec2(p0.x, p1.y));
        let d = self.load(p1);

        lerp(lerp(a, b, t.x), lerp(c, d, t.x), t.y)
    }
}

/// Mutable view of a tightly packed 2D texture.
#[derive(Debug)]
pub struct TextureViewMut<'a> {
    size: UVec2,
    format: PixelFormat,
    data: &'a mut [u8],
}

impl<'a> TextureViewMut<'a> {
    pub fn new(size: UVec2, format: PixelFormat, data: &'a mut [u8]) -> Self {
        debug_assert_eq!(
            (size.x * size.y) as usize * format.bytes_per_pixel(),
            data.len()
        );

        Self { size, format, data }
    }

    pub fn size(&self) -> UVec2 {
        self.size
    }

    pub fn as_view(&self) -> TextureView<'_> {
        TextureView {
            size: self.size,
            format: self.format,
            data: &*self.data,
        }
    }

    pub fn load(&self, pos: UVec2) -> Vec4 {
        self.as_view().load(pos)
    }

    pub fn store(&mut self, pos: UVec2, value: Vec4) {
        let bpp = self.format.bytes_per_pixel();
        let offset = (pos.y * self.size.x + pos.x) as usize * bpp;

        self.format.encode(value, &mut self.data[offset..offset + bpp]);
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use glam::uvec2;

    use super::*;

    #[test]
    fn formats() {
        let value = vec4(0.25, 0.5, 0.75, 1.0);

        for (format, epsilon) in [
            (PixelFormat::A32B32G32R32F, 0.0),
            (PixelFormat::A2B10G10R10, 1e-3),
            (PixelFormat::A16B16G16R16, 1e-4),
        ] {
            let mut data = [0; 16];

            format.encode(value, &mut data);

            let decoded = format.decode(&data);

            assert_abs_diff_eq!(value.x, decoded.x, epsilon = epsilon);
            assert_abs_diff_eq!(value.z, decoded.z, epsilon = epsilon);
            assert_abs_diff_eq!(value.w, decoded.w, epsilon = epsilon);
        }

        let mut data = [0; 4];

        PixelFormat::G16R16F.encode(vec4(1234.0, -0.5, 0.0, 0.0), &mut data);

        let decoded = PixelFormat::G16R16F.decode(&data);

        assert_eq!(1234.0, decoded.x);
        assert_eq!(-0.5, decoded.y);
    }

    #[test]
    fn tags() {
        for format in [
            PixelFormat::A32B32G32R32F,
            PixelFormat::G16R16F,
            PixelFormat::G32R32F,
            PixelFormat::A2B10G10R10,
            PixelFormat::A16B16G16R16,
            PixelFormat::R8Uint,
        ] {
            assert_eq!(Some(format), PixelFormat::from_tag(format.tag()));
        }

        assert_eq!(None, PixelFormat::from_tag(1234));
    }

    #[test]
    fn view() {
        let mut data = vec![0; 3 * 2];
        let mut tex = TextureViewMut::new(uvec2(3, 2), PixelFormat::R8Uint, &mut data);

        tex.store(uvec2(2, 1), vec4(7.0, 0.0, 0.0, 0.0));

        assert_eq!(7.0, tex.load(uvec2(2, 1)).x);
        assert_eq!(0.0, tex.load(uvec2(1, 1)).x);
        assert_eq!(7, data[5]);
    }

    #[test]
    fn bilinear() {
        let mut data = vec![0; 2 * 2 * 16];
        let mut tex = TextureViewMut::new(
            uvec2(2, 2),
            PixelFormat::A32B32G32R32F,
            &mut data,
        );

        tex.store(uvec2(0, 0), Vec4::splat(0.0));
        tex.store(uvec2(1, 0), Vec4::splat(1.0));
        tex.store(uvec2(0, 1), Vec4::splat(2.0));
        tex.store(uvec2(1, 1), Vec4::splat(3.0));

        let tex = tex.as_view();

        assert_eq!(0.0, tex.sample_bilinear(Vec2::splat(0.5)).x);
        assert_eq!(1.5, tex.sample_bilinear(Vec2::splat(1.0)).x);
        assert_eq!(3.0, tex.sample_bilinear(Vec2::splat(5.0)).x);
    }
}
