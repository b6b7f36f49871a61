use core::f32::consts::PI;

use bytemuck::{Pod, Zeroable};
use glam::Vec3;

use crate::{F32Ext, Vec3Ext, WhiteNoise};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LightType {
    Sky = 0,
    Directional = 1,
    Point = 2,
    Spot = 3,
    Rect = 4,
}

impl LightType {
    pub fn from_bits(bits: u32) -> Self {
        match bits {
            0 => Self::Sky,
            1 => Self::Directional,
            3 => Self::Spot,
            4 => Self::Rect,
            _ => Self::Point,
        }
    }

    /// Infinite lights have no position and bypass the light tree.
    pub fn is_infinite(self) -> bool {
        matches!(self, Self::Sky | Self::Directional)
    }
}

/// A scene light, flattened for upload.
///
/// Meaning of the shape-specific fields:
///
/// - `normal`: direction towards the light for directional lights, emission
///   axis for spot and rect lights,
/// - `dimensions`: rect width / height, source radius (x) for point lights,
/// - `shaping`: cosine of the outer cone angle and inverse cosine range for
///   spot lights, barn door cosine and length for rect lights,
/// - `attenuation`: inverse attenuation radius.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct LightRecord {
    pub color: Vec3,
    pub flags: u32,
    pub position: Vec3,
    pub attenuation: f32,
    pub normal: Vec3,
    pub falloff_exponent: f32,
    pub dpdu: Vec3,
    pub shaping_x: f32,
    pub dpdv: Vec3,
    pub shaping_y: f32,
    pub dimensions: Vec3,
    pub _pad: u32,
    pub bound_min: Vec3,
    pub bound_max: Vec3,
}

impl LightRecord {
    pub const FLAG_LIGHTING_CHANNEL_MASK: u32 = 0xff;
    pub const FLAG_TRANSMISSION: u32 = 1 << 8;
    pub const FLAG_NON_INVERSE_SQUARE_FALLOFF: u32 = 1 << 9;
    pub const FLAG_CASTS_SHADOW: u32 = 1 << 10;
    pub const TYPE_SHIFT: u32 = 16;

    pub fn light_type(&self) -> LightType {
        LightType::from_bits((self.flags >> Self::TYPE_SHIFT) & 0xff)
    }

    pub fn with_type(mut self, ty: LightType) -> Self {
        self.flags &= !(0xff << Self::TYPE_SHIFT);
        self.flags |= (ty as u32) << Self::TYPE_SHIFT;
        self
    }

    pub fn is_infinite(&self) -> bool {
        self.light_type().is_infinite()
    }

    pub fn casts_shadow(&self) -> bool {
        self.flags & Self::FLAG_CASTS_SHADOW != 0
    }

    pub fn lighting_channel_mask(&self) -> u32 {
        self.flags & Self::FLAG_LIGHTING_CHANNEL_MASK
    }

    pub fn area(&self) -> f32 {
        self.dimensions.x * self.dimensions.y
    }

    /// Scalar power proxy, used as the light-tree intensity of leaves.
    pub fn intensity(&self) -> f32 {
        let luma = self.color.luma().max(0.0);

        match self.light_type() {
            LightType::Rect => luma * self.area().max(1.0),
            _ => luma,
        }
    }

    pub fn center(&self) -> Vec3 {
        (self.bound_min + self.bound_max) * 0.5
    }

    /// Distance attenuation of this light at given distance.
    pub fn falloff(&self, distance: f32) -> f32 {
        let normalized = distance * self.attenuation;

        if self.flags & Self::FLAG_NON_INVERSE_SQUARE_FALLOFF != 0 {
            (1.0 - normalized.sqr()).saturate().powf(self.falloff_exponent)
        } else {
            let window = (1.0 - normalized.sqr().sqr()).saturate().sqr();

            window / distance.sqr().max(0.0001)
        }
    }

    /// Samples this light from given surface point and returns its
    /// cosine-weighted, pdf-divided irradiance (no BRDF and no visibility).
    pub fn sample(
        &self,
        wnoise: &mut WhiteNoise,
        point: Vec3,
        normal: Vec3,
    ) -> LightSample {
        match self.light_type() {
            LightType::Sky => {
                let dir = wnoise.sample_hemisphere(normal);

                LightSample {
                    dir,
                    distance: f32::MAX,
                    irradiance: self.color * PI,
                }
            }

            LightType::Directional => {
                let dir = self.normal.normalize_or_zero();
                let cos = normal.dot(dir).max(0.0);

                LightSample {
                    dir,
                    distance: f32::MAX,
                    irradiance: self.color * cos,
                }
            }

            LightType::Point | LightType::Spot => {
                let to_light = self.position - point;
                let distance = to_light.length();

                if distance <= 0.0 {
                    return Default::default();
                }

                let dir = to_light / distance;
                let cos = normal.dot(dir).max(0.0);

                let cone = if self.light_type() == LightType::Spot {
                    ((self.normal.dot(-dir) - self.shaping_x) * self.shaping_y)
                        .saturate()
                        .sqr()
                } else {
                    1.0
                };

                LightSample {
                    dir,
                    distance,
                    irradiance: self.color
                        * (self.falloff(distance) * cone * cos),
                }
            }

            LightType::Rect => {
                let u = wnoise.sample() - 0.5;
                let v = wnoise.sample() - 0.5;

                let light_point = self.position
                    + self.dpdu * (u * self.dimensions.x)
                    + self.dpdv * (v * self.dimensions.y);

                let to_light = light_point - point;
                let distance = to_light.length();

                if distance <= 0.0 {
                    return Default::default();
                }

                let dir = to_light / distance;
                let cos = normal.dot(dir).max(0.0);
                let cos_light = self.normal.dot(-dir).max(0.0);

                LightSample {
                    dir,
                    distance,
                    irradiance: self.color
                        * (self.falloff(distance) * cos * cos_light * self.area()),
                }
            }
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct LightSample {
    pub dir: Vec3,
    pub distance: f32,
    pub irradiance: Vec3,
}

impl LightSample {
    pub fn is_some(&self) -> bool {
        self.irradiance.max_element() > 0.0
    }
}

/// Read-only view of the uploaded light buffer.
///
/// The buffer always holds at least one record (so that it can be bound),
/// which is why the count is carried separately.
#[derive(Clone, Copy, Debug)]
pub struct LightsView<'a> {
    records: &'a [LightRecord],
    count: u32,
    infinite_count: u32,
}

impl<'a> LightsView<'a> {
    pub fn new(
        records: &'a [LightRecord],
        count: u32,
        infinite_count: u32,
    ) -> Self {
        Self {
            records,
            count: count.min(records.len() as u32),
            infinite_count,
        }
    }

    pub fn len(&self) -> u32 {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn infinite_count(&self) -> u32 {
        self.infinite_count
    }

    pub fn get(&self, id: u32) -> LightRecord {
        self.records[id as usize]
    }

    pub fn iter(&self) -> impl Iterator<Item = &'a LightRecord> {
        self.records[..self.count as usize].iter()
    }

    /// Radiance seen by rays that escape the scene.
    pub fn sky_radiance(&self) -> Vec3 {
        self.iter()
            .filter(|light| light.light_type() == LightType::Sky)
            .map(|light| light.color)
            .sum()
    }
}
