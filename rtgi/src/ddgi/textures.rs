use glam::{UVec2, Vec3, Vec4};
use log::{debug, warn};
use rtgi_gpu::{
    encode_probe_offset, DdgiVolumeDesc, PixelFormat, ProbeState, TextureView,
    TextureViewMut, DDGI_DISTANCE_TEXELS, DDGI_IRRADIANCE_TEXELS,
};

use super::{DDGI_OFFSETS_FORMAT, DDGI_STATES_FORMAT};
use crate::{Handle, HistoryArena};

/// Tightly packed 2D texture living on the host.
#[derive(Clone, Debug, PartialEq)]
pub struct ProbeTexture {
    size: UVec2,
    format: PixelFormat,
    data: Vec<u8>,
}

impl ProbeTexture {
    pub fn new(size: UVec2, format: PixelFormat) -> Self {
        Self {
            size,
            format,
            data: vec![0; (size.x * size.y) as usize * format.bytes_per_pixel()],
        }
    }

    pub fn filled(size: UVec2, format: PixelFormat, value: Vec4) -> Self {
        let mut this = Self::new(size, format);
        let bpp = format.bytes_per_pixel();

        for texel in this.data.chunks_exact_mut(bpp) {
            format.encode(value, texel);
        }

        this
    }

    pub fn size(&self) -> UVec2 {
        self.size
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// Distance between rows, in bytes.
    pub fn stride(&self) -> usize {
        self.size.x as usize * self.format.bytes_per_pixel()
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn view(&self) -> TextureView<'_> {
        TextureView::new(self.size, self.format, &self.data)
    }

    pub fn view_mut(&mut self) -> TextureViewMut<'_> {
        TextureViewMut::new(self.size, self.format, &mut self.data)
    }

    pub fn read_back(&self) -> TexturePixels {
        TexturePixels {
            width: self.size.x,
            height: self.size.y,
            stride: self.stride() as u32,
            format: Some(self.format),
            pixels: self.data.clone(),
        }
    }

    /// Copies persisted pixels into this texture.
    ///
    /// Rows stored with a different stride (e.g. saved by another graphics
    /// API) are copied one by one, each up to the shorter of both strides.
    /// Returns whether anything got copied.
    pub fn write_pixels(&mut self, pixels: &TexturePixels) -> bool {
        if pixels.width != self.size.x || pixels.height != self.size.y {
            warn!(
                "Ignoring probe texture of mismatched size: expected {}x{}, got {}x{}",
                self.size.x, self.size.y, pixels.width, pixels.height
            );

            return false;
        }

        let height = pixels.height as usize;
        let src_stride = pixels.stride as usize;
        let dst_stride = self.stride();

        if pixels.pixels.is_empty() || pixels.pixels.len() != height * src_stride {
            return false;
        }

        if src_stride == dst_stride {
            self.data.copy_from_slice(&pixels.pixels);
        } else {
            let len = src_stride.min(dst_stride);

            for (dst, src) in self
                .data
                .chunks_exact_mut(dst_stride)
                .zip(pixels.pixels.chunks_exact(src_stride))
            {
                dst[..len].copy_from_slice(&src[..len]);
            }
        }

        true
    }
}

/// Pixels of a probe texture, as persisted.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TexturePixels {
    pub width: u32,
    pub height: u32,

    /// Distance between rows, in bytes; may be larger than `width` texels.
    pub stride: u32,

    /// `None` for archives written before the format got stored.
    pub format: Option<PixelFormat>,

    pub pixels: Vec<u8>,
}

impl TexturePixels {
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0 || self.stride == 0
    }
}

/// Probe data waiting to be copied into a volume's textures.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DdgiLoadContext {
    pub ready: bool,
    pub irradiance: TexturePixels,
    pub distance: TexturePixels,
    pub offsets: TexturePixels,
    pub states: TexturePixels,
}

/// Textures of a single volume, kept in the history arena.
#[derive(Clone, Copy, Debug)]
pub struct DdgiTextureHandles {
    pub irradiance: Handle<ProbeTexture>,
    pub distance: Handle<ProbeTexture>,

    /// Present only when relocation is enabled.
    pub offsets: Option<Handle<ProbeTexture>>,

    pub states: Handle<ProbeTexture>,

    /// Last seen scroll space of every probe.
    pub spaces: Handle<Vec<u32>>,
}

impl DdgiTextureHandles {
    pub fn allocate(
        history: &mut HistoryArena,
        desc: &DdgiVolumeDesc,
        irradiance_format: PixelFormat,
        distance_format: PixelFormat,
    ) -> Self {
        let probes = desc.probe_grid_2d();

        debug!(
            "Allocating probe textures; probes = {}, irradiance = {}, distance = {}",
            probes,
            desc.atlas_size(DDGI_IRRADIANCE_TEXELS),
            desc.atlas_size(DDGI_DISTANCE_TEXELS),
        );

        let irradiance = history.insert(ProbeTexture::new(
            desc.atlas_size(DDGI_IRRADIANCE_TEXELS),
            irradiance_format,
        ));

        let distance = history.insert(ProbeTexture::new(
            desc.atlas_size(DDGI_DISTANCE_TEXELS),
            distance_format,
        ));

        let offsets = desc.is_relocation_enabled().then(|| {
            history.insert(ProbeTexture::filled(
                probes,
                DDGI_OFFSETS_FORMAT,
                encode_probe_offset(Vec3::ZERO).extend(0.0),
            ))
        });

        let states = history.insert(ProbeTexture::filled(
            probes,
            DDGI_STATES_FORMAT,
            Vec4::splat(ProbeState::Active as u32 as f32),
        ));

        let spaces = history.insert(
            (0..desc.probe_count())
                .map(|probe| desc.scroll_space(probe))
                .collect::<Vec<_>>(),
        );

        Self {
            irradiance,
            distance,
            offsets,
            states,
            spaces,
        }
    }

    pub fn release(self, history: &mut HistoryArena) {
        history.remove(self.irradiance);
        history.remove(self.distance);
        history.remove(self.states);
        history.remove(self.spaces);

        if let Some(offsets) = self.offsets {
            history.remove(offsets);
        }
    }

    pub fn is_alive(&self, history: &HistoryArena) -> bool {
        history.contains(self.irradiance.id())
            && history.contains(self.distance.id())
            && history.contains(self.states.id())
    }

    /// Copies the textures' contents out, the way they get persisted.
    pub fn read_back(&self, history: &HistoryArena) -> DdgiLoadContext {
        let read = |handle: Handle<ProbeTexture>| {
            history
                .get(handle)
                .map(|texture| texture.read_back())
                .unwrap_or_default()
        };

        DdgiLoadContext {
            ready: true,
            irradiance: read(self.irradiance),
            distance: read(self.distance),
            offsets: self.offsets.map(read).unwrap_or_default(),
            states: read(self.states),
        }
    }

    /// Copies loaded probe data into the textures; empty entries (and
    /// textures this volume doesn't have) are left alone.
    pub fn apply(&self, history: &HistoryArena, context: &DdgiLoadContext) {
        let targets = [
            (Some(self.irradiance), &context.irradiance),
            (Some(self.distance), &context.distance),
            (self.offsets, &context.offsets),
            (Some(self.states), &context.states),
        ];

        for (handle, pixels) in targets {
            if pixels.is_empty() {
                continue;
            }

            let Some(mut texture) = handle.and_then(|handle| history.get_mut(handle)) else {
                continue;
            };

            if pixels.format.map_or(false, |format| format != texture.format()) {
                warn!(
                    "Ignoring probe texture of mismatched format: expected {:?}, got {:?}",
                    texture.format(),
                    pixels.format
                );

                continue;
            }

            texture.write_pixels(pixels);
        }
    }
}

#[cfg(test)]
mod tests {
    use glam::uvec2;

    use super::*;

    fn pixels(width: u32, height: u32, stride: u32) -> TexturePixels {
        TexturePixels {
            width,
            height,
            stride,
            format: Some(PixelFormat::A2B10G10R10),
            pixels: (0..height * stride).map(|i| (i % 251) as u8).collect(),
        }
    }

    #[test]
    fn matching_strides_copy_everything() {
        let mut texture = ProbeTexture::new(uvec2(5, 3), PixelFormat::A2B10G10R10);
        let pixels = pixels(5, 3, 20);

        assert!(texture.write_pixels(&pixels));
        assert_eq!(pixels.pixels, texture.data());
        assert_eq!(pixels, texture.read_back());
    }

    #[test]
    fn mismatched_strides_copy_row_by_row() {
        // source rows longer than ours
        let mut texture = ProbeTexture::new(uvec2(5, 3), PixelFormat::A2B10G10R10);
        let longer = pixels(5, 3, 32);

        assert!(texture.write_pixels(&longer));

        for row in 0..3 {
            assert_eq!(
                &longer.pixels[row * 32..row * 32 + 20],
                &texture.data()[row * 20..row * 20 + 20]
            );
        }

        // source rows shorter than ours (truncated by a buggy exporter)
        let mut texture = ProbeTexture::new(uvec2(5, 3), PixelFormat::A2B10G10R10);
        let shorter = pixels(5, 3, 12);

        assert!(texture.write_pixels(&shorter));

        for row in 0..3 {
            assert_eq!(
                &shorter.pixels[row * 12..row * 12 + 12],
                &texture.data()[row * 20..row * 20 + 12]
            );

            assert!(texture.data()[row * 20 + 12..row * 20 + 20].iter().all(|&b| b == 0));
        }
    }

    #[test]
    fn empty_pixels_are_ignored() {
        let mut texture = ProbeTexture::new(uvec2(5, 3), PixelFormat::A2B10G10R10);
        let empty = pixels(5, 3, 0);

        assert!(empty.pixels.is_empty());
        assert!(!texture.write_pixels(&empty));
        assert!(texture.data().iter().all(|&b| b == 0));
    }

    #[test]
    fn truncated_pixels_are_ignored() {
        let mut texture = ProbeTexture::new(uvec2(5, 3), PixelFormat::A2B10G10R10);
        let mut pixels = pixels(5, 3, 20);

        pixels.pixels.pop();

        assert!(!texture.write_pixels(&pixels));
        assert!(texture.data().iter().all(|&b| b == 0));
        assert!(!texture.write_pixels(&self::pixels(4, 3, 20)));
    }
}
