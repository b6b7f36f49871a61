use glam::Vec3;
use rtgi_gpu::{LightRecord, LightType, Vec3Ext};

#[derive(Clone, Debug, PartialEq)]
pub enum LightShape {
    Sky,

    Directional {
        /// Direction the light travels in.
        direction: Vec3,
    },

    Point {
        position: Vec3,
        source_radius: f32,
        attenuation_radius: f32,
    },

    Spot {
        position: Vec3,
        direction: Vec3,
        source_radius: f32,
        attenuation_radius: f32,

        /// Cone angles, in radians.
        inner_angle: f32,
        outer_angle: f32,
    },

    /// Rectangular area emitter; mesh lights get expressed as these, too.
    Rect {
        position: Vec3,
        direction: Vec3,
        tangent: Vec3,
        width: f32,
        height: f32,
        attenuation_radius: f32,
        barn_door_angle: f32,
        barn_door_length: f32,
    },
}

/// A scene light, as provided by the host.
#[derive(Clone, Debug, PartialEq)]
pub struct Light {
    pub shape: LightShape,
    pub color: Vec3,

    /// Scale applied to the light's contribution to indirect lighting.
    pub indirect_lighting_scale: f32,

    pub casts_shadow: bool,
    pub affects_gi: bool,

    /// Lights whose contribution is already baked get skipped.
    pub has_static_lighting: bool,

    pub transmission: bool,
    pub lighting_channels: u8,

    /// Exponent of the non-physical falloff; `None` means inverse-square.
    pub falloff_exponent: Option<f32>,
}

impl Light {
    pub fn new(shape: LightShape, color: Vec3) -> Self {
        Self {
            shape,
            color,
            indirect_lighting_scale: 1.0,
            casts_shadow: true,
            affects_gi: true,
            has_static_lighting: false,
            transmission: false,
            lighting_channels: 1,
            falloff_exponent: None,
        }
    }

    pub fn point(position: Vec3, color: Vec3, attenuation_radius: f32) -> Self {
        Self::new(
            LightShape::Point {
                position,
                source_radius: 0.0,
                attenuation_radius,
            },
            color,
        )
    }

    pub fn directional(direction: Vec3, color: Vec3) -> Self {
        Self::new(LightShape::Directional { direction }, color)
    }

    pub fn sky(color: Vec3) -> Self {
        Self::new(LightShape::Sky, color)
    }

    pub fn light_type(&self) -> LightType {
        match self.shape {
            LightShape::Sky => LightType::Sky,
            LightShape::Directional { .. } => LightType::Directional,
            LightShape::Point { .. } => LightType::Point,
            LightShape::Spot { .. } => LightType::Spot,
            LightShape::Rect { .. } => LightType::Rect,
        }
    }

    /// Position and reach of a finite light.
    pub fn sphere(&self) -> Option<(Vec3, f32)> {
        match self.shape {
            LightShape::Sky | LightShape::Directional { .. } => None,

            LightShape::Point {
                position,
                attenuation_radius,
                ..
            }
            | LightShape::Spot {
                position,
                attenuation_radius,
                ..
            }
            | LightShape::Rect {
                position,
                attenuation_radius,
                ..
            } => Some((position, attenuation_radius)),
        }
    }

    pub fn luminance(&self) -> f32 {
        self.color.luma().max(0.0)
    }

    pub(crate) fn serialize(&self) -> LightRecord {
        let mut flags = self.lighting_channels as u32;

        if self.transmission {
            flags |= LightRecord::FLAG_TRANSMISSION;
        }

        if self.casts_shadow {
            flags |= LightRecord::FLAG_CASTS_SHADOW;
        }

        if self.falloff_exponent.is_some() {
            flags |= LightRecord::FLAG_NON_INVERSE_SQUARE_FALLOFF;
        }

        let mut record = LightRecord {
            color: self.color * self.indirect_lighting_scale,
            flags,
            falloff_exponent: self.falloff_exponent.unwrap_or_default(),
            ..Default::default()
        };

        match self.shape {
            LightShape::Sky => {}

            LightShape::Directional { direction } => {
                record.normal = -direction.normalize_or_zero();
            }

            LightShape::Point {
                position,
                source_radius,
                attenuation_radius,
            } => {
                record.position = position;
                record.dimensions.x = source_radius;
                record.attenuation = attenuation_radius.max(1e-4).recip();
            }

            LightShape::Spot {
                position,
                direction,
                source_radius,
                attenuation_radius,
                inner_angle,
                outer_angle,
            } => {
                let cos_outer = outer_angle.cos();
                let cos_inner = inner_angle.min(outer_angle).cos();

                record.position = position;
                record.normal = direction.normalize_or_zero();
                record.dimensions.x = source_radius;
                record.attenuation = attenuation_radius.max(1e-4).recip();
                record.shaping_x = cos_outer;
                record.shaping_y = (cos_inner - cos_outer).max(1e-4).recip();
            }

            LightShape::Rect {
                position,
                direction,
                tangent,
                width,
                height,
                attenuation_radius,
                barn_door_angle,
                barn_door_length,
            } => {
                let normal = direction.normalize_or_zero();
                let dpdu = tangent.normalize_or_zero();

                record.position = position;
                record.normal = normal;
                record.dpdu = dpdu;
                record.dpdv = normal.cross(dpdu);
                record.dimensions = Vec3::new(width, height, 0.0);
                record.attenuation = attenuation_radius.max(1e-4).recip();
                record.shaping_x = barn_door_angle.cos();
                record.shaping_y = barn_door_length;
            }
        }

        if let Some((position, radius)) = self.sphere() {
            record.bound_min = position - radius;
            record.bound_max = position + radius;
        }

        record.with_type(self.light_type())
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use glam::vec3;

    use super::*;

    #[test]
    fn serialize_point() {
        let mut light = Light::point(vec3(1.0, 2.0, 3.0), Vec3::ONE, 4.0);

        light.indirect_lighting_scale = 0.5;

        let record = light.serialize();

        assert_eq!(LightType::Point, record.light_type());
        assert_eq!(Vec3::splat(0.5), record.color);
        assert_eq!(vec3(-3.0, -2.0, -1.0), record.bound_min);
        assert_eq!(vec3(5.0, 6.0, 7.0), record.bound_max);
        assert_relative_eq!(0.25, record.attenuation);
        assert!(record.casts_shadow());
        assert_eq!(1, record.lighting_channel_mask());
    }

    #[test]
    fn serialize_infinite() {
        let record = Light::directional(-Vec3::Y, Vec3::ONE).serialize();

        assert!(record.is_infinite());
        assert_eq!(Vec3::Y, record.normal);
        assert_eq!(Vec3::ZERO, record.bound_min);
        assert_eq!(Vec3::ZERO, record.bound_max);
    }
}
