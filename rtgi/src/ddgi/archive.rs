//! Persistence of probe data.
//!
//! The archive starts with its version, followed by the four probe textures
//! (irradiance, distance, offsets, states). Every texture is stored as its
//! width, height, row stride, a length-prefixed byte blob and (since
//! [`DdgiArchiveVersion::SaveLoadProbeTexturesFmt`]) its pixel format tag.
//! Integers are little-endian.

use std::fmt;

use log::warn;
use rtgi_gpu::PixelFormat;

use super::{DdgiLoadContext, TexturePixels};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum DdgiArchiveVersion {
    /// Written before the archive carried any probe data.
    BeforeCustomVersion = 0,

    AddingCustomVersion = 1,
    SaveLoadProbeTextures = 2,

    /// The pixel format can change in the project settings, so it's stored
    /// alongside the pixels.
    SaveLoadProbeTexturesFmt = 3,

    /// Probe data is optional, guarded by a flag.
    SaveLoadProbeDataIsOptional = 4,
}

impl DdgiArchiveVersion {
    pub const LATEST: Self = Self::SaveLoadProbeDataIsOptional;

    pub fn from_i32(version: i32) -> Option<Self> {
        Some(match version {
            0 => Self::BeforeCustomVersion,
            1 => Self::AddingCustomVersion,
            2 => Self::SaveLoadProbeTextures,
            3 => Self::SaveLoadProbeTexturesFmt,
            4 => Self::SaveLoadProbeDataIsOptional,
            _ => return None,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ArchiveError {
    UnexpectedEof,
    UnknownPixelFormat(u32),
    UnknownVersion(i32),
}

impl fmt::Display for ArchiveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnexpectedEof => write!(f, "unexpected end of archive"),
            Self::UnknownPixelFormat(tag) => write!(f, "unknown pixel format: {tag}"),
            Self::UnknownVersion(version) => write!(f, "unknown archive version: {version}"),
        }
    }
}

impl std::error::Error for ArchiveError {}

/// Pixel formats a volume expects its textures to be loaded in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DdgiTextureFormats {
    pub irradiance: PixelFormat,
    pub distance: PixelFormat,
    pub offsets: PixelFormat,
    pub states: PixelFormat,
}

pub fn save_probe_data(context: &DdgiLoadContext, version: DdgiArchiveVersion, probes_serialized: bool) -> Vec<u8> {
    let mut ar = ArchiveWriter::default();

    ar.write_i32(version as i32);

    if version < DdgiArchiveVersion::AddingCustomVersion {
        // no probe data back then; leave an empty image, as readers expect
        ar.write_u32(0);
        ar.write_u32(0);
        ar.write_u32(0);

        return ar.finish();
    }

    if version < DdgiArchiveVersion::SaveLoadProbeTextures {
        return ar.finish();
    }

    if version >= DdgiArchiveVersion::SaveLoadProbeDataIsOptional {
        ar.write_bool(probes_serialized);

        if !probes_serialized {
            return ar.finish();
        }
    }

    let with_format = version >= DdgiArchiveVersion::SaveLoadProbeTexturesFmt;

    for pixels in [
        &context.irradiance,
        &context.distance,
        &context.offsets,
        &context.states,
    ] {
        ar.write_u32(pixels.width);
        ar.write_u32(pixels.height);
        ar.write_u32(pixels.stride);
        ar.write_bytes(&pixels.pixels);

        if with_format {
            ar.write_u32(pixels.format.map_or(0, PixelFormat::tag));
        }
    }

    ar.finish()
}

/// Loads probe data; returns `None` when the archive carries none.
///
/// Textures stored in a format other than the expected one are skipped
/// (left empty); archives written before the format got stored are assumed
/// to use the expected formats.
pub fn load_probe_data(data: &[u8], formats: DdgiTextureFormats) -> Result<Option<DdgiLoadContext>, ArchiveError> {
    let mut ar = ArchiveReader::new(data);
    let version = ar.read_i32()?;

    let version =
        DdgiArchiveVersion::from_i32(version).ok_or(ArchiveError::UnknownVersion(version))?;

    if version < DdgiArchiveVersion::AddingCustomVersion {
        // legacy single image, not used anymore
        ar.read_u32()?;
        ar.read_u32()?;

        let len = ar.read_u32()? as usize;

        ar.read_slice(len * 4)?;

        return Ok(None);
    }

    if version < DdgiArchiveVersion::SaveLoadProbeTextures {
        return Ok(None);
    }

    if version >= DdgiArchiveVersion::SaveLoadProbeDataIsOptional && !ar.read_bool()? {
        return Ok(None);
    }

    let with_format = version >= DdgiArchiveVersion::SaveLoadProbeTexturesFmt;

    let mut read = |expected: PixelFormat| -> Result<TexturePixels, ArchiveError> {
        let mut pixels = TexturePixels {
            width: ar.read_u32()?,
            height: ar.read_u32()?,
            stride: ar.read_u32()?,
            format: Some(expected),
            pixels: Default::default(),
        };

        let len = ar.read_u32()? as usize;

        pixels.pixels = ar.read_slice(len)?.to_vec();

        if with_format {
            let tag = ar.read_u32()?;

            // empty textures (e.g. offsets of volumes without relocation)
            // are stored with no format at all
            if tag == 0 && pixels.is_empty() {
                return Ok(TexturePixels::default());
            }

            let format = PixelFormat::from_tag(tag).ok_or(ArchiveError::UnknownPixelFormat(tag))?;

            if format != expected {
                warn!(
                    "Skipping probe texture stored as {:?} (expected {:?})",
                    format, expected
                );

                return Ok(TexturePixels::default());
            }
        }

        if pixels.is_empty() {
            return Ok(TexturePixels::default());
        }

        Ok(pixels)
    };

    let irradiance = read(formats.irradiance)?;
    let distance = read(formats.distance)?;
    let offsets = read(formats.offsets)?;
    let states = read(formats.states)?;

    Ok(Some(DdgiLoadContext {
        ready: true,
        irradiance,
        distance,
        offsets,
        states,
    }))
}

#[derive(Default)]
struct ArchiveWriter {
    data: Vec<u8>,
}

impl ArchiveWriter {
    fn write_u32(&mut self, value: u32) {
        self.data.extend_from_slice(&value.to_le_bytes());
    }

    fn write_i32(&mut self, value: i32) {
        self.data.extend_from_slice(&value.to_le_bytes());
    }

    fn write_bool(&mut self, value: bool) {
        self.write_u32(value as u32);
    }

    fn write_bytes(&mut self, bytes: &[u8]) {
        self.write_u32(bytes.len() as u32);
        self.data.extend_from_slice(bytes);
    }

    fn finish(self) -> Vec<u8> {
        self.data
    }
}

struct ArchiveReader<'a> {
    data: &'a [u8],
}

impl<'a> ArchiveReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    fn read_slice(&mut self, len: usize) -> Result<&'a [u8], ArchiveError> {
        if self.data.len() < len {
            return Err(ArchiveError::UnexpectedEof);
        }

        let (head, tail) = self.data.split_at(len);

        self.data = tail;

        Ok(head)
    }

    fn read_array(&mut self) -> Result<[u8; 4], ArchiveError> {
        let slice = self.read_slice(4)?;

        Ok([slice[0], slice[1], slice[2], slice[3]])
    }

    fn read_u32(&mut self) -> Result<u32, ArchiveError> {
        self.read_array().map(u32::from_le_bytes)
    }

    fn read_i32(&mut self) -> Result<i32, ArchiveError> {
        self.read_array().map(i32::from_le_bytes)
    }

    fn read_bool(&mut self) -> Result<bool, ArchiveError> {
        Ok(self.read_u32()? != 0)
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    use super::*;

    const FORMATS: DdgiTextureFormats = DdgiTextureFormats {
        irradiance: PixelFormat::A2B10G10R10,
        distance: PixelFormat::G16R16F,
        offsets: PixelFormat::A16B16G16R16,
        states: PixelFormat::R8Uint,
    };

    fn pixels(rng: &mut StdRng, width: u32, height: u32, format: PixelFormat) -> TexturePixels {
        let stride = width * format.bytes_per_pixel() as u32;

        TexturePixels {
            width,
            height,
            stride,
            format: Some(format),
            pixels: (0..stride * height).map(|_| rng.gen()).collect(),
        }
    }

    fn context() -> DdgiLoadContext {
        let mut rng = StdRng::seed_from_u64(1234);

        DdgiLoadContext {
            ready: true,
            irradiance: pixels(&mut rng, 64, 8, FORMATS.irradiance),
            distance: pixels(&mut rng, 128, 16, FORMATS.distance),
            offsets: pixels(&mut rng, 8, 1, FORMATS.offsets),
            states: pixels(&mut rng, 8, 1, FORMATS.states),
        }
    }

    #[test]
    fn round_trip() {
        let context = context();
        let data = save_probe_data(&context, DdgiArchiveVersion::LATEST, true);

        assert_eq!(Some(context), load_probe_data(&data, FORMATS).unwrap());
    }

    #[test]
    fn older_versions() {
        let context = context();

        // no format tag: assumed to be the expected one
        let data = save_probe_data(&context, DdgiArchiveVersion::SaveLoadProbeTextures, true);

        assert_eq!(Some(context.clone()), load_probe_data(&data, FORMATS).unwrap());

        let data = save_probe_data(&context, DdgiArchiveVersion::AddingCustomVersion, true);

        assert_eq!(None, load_probe_data(&data, FORMATS).unwrap());

        let data = save_probe_data(&context, DdgiArchiveVersion::BeforeCustomVersion, true);

        assert_eq!(None, load_probe_data(&data, FORMATS).unwrap());

        let data = save_probe_data(&context, DdgiArchiveVersion::LATEST, false);

        assert_eq!(None, load_probe_data(&data, FORMATS).unwrap());
    }

    #[test]
    fn mismatched_formats_are_skipped() {
        let context = context();
        let data = save_probe_data(&context, DdgiArchiveVersion::LATEST, true);

        let formats = DdgiTextureFormats {
            irradiance: PixelFormat::A32B32G32R32F,
            ..FORMATS
        };

        let loaded = load_probe_data(&data, formats).unwrap().unwrap();

        assert!(loaded.irradiance.is_empty());
        assert_eq!(context.distance, loaded.distance);
        assert_eq!(context.states, loaded.states);
    }

    #[test]
    fn missing_textures() {
        let context = DdgiLoadContext {
            offsets: TexturePixels::default(),
            ..context()
        };

        let data = save_probe_data(&context, DdgiArchiveVersion::LATEST, true);

        assert_eq!(Some(context), load_probe_data(&data, FORMATS).unwrap());
    }

    #[test]
    fn errors() {
        let data = save_probe_data(&context(), DdgiArchiveVersion::LATEST, true);

        assert_eq!(
            Err(ArchiveError::UnexpectedEof),
            load_probe_data(&data[..data.len() - 1], FORMATS)
        );

        assert_eq!(
            Err(ArchiveError::UnknownVersion(5)),
            load_probe_data(&5i32.to_le_bytes(), FORMATS)
        );

        let mut data = data;
        let len = data.len();

        data[len - 4..].copy_from_slice(&1234u32.to_le_bytes());

        assert_eq!(
            Err(ArchiveError::UnknownPixelFormat(1234)),
            load_probe_data(&data, FORMATS)
        );
    }
}
