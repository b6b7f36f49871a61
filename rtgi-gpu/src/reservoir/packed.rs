use bytemuck::{Pod, Zeroable};
use glam::{vec3, UVec2, UVec3, Vec3};

use crate::{pack_rgb9e5, unpack_rgb9e5, GiReservoir, GiSample, Normal};

/// GPU layout of a [`GiReservoir`]: three `int4`s holding the creation
/// geometry, the hit geometry and the light information.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct PackedReservoir {
    pub creation: [i32; 4],
    pub hit: [i32; 4],
    pub light: [i32; 4],
}

impl PackedReservoir {
    pub fn pack(reservoir: &GiReservoir) -> Self {
        let sample = &reservoir.sample;

        Self {
            creation: Self::pack_point(
                sample.creation_point,
                sample.creation_normal,
            ),
            hit: Self::pack_point(sample.hit_point, sample.hit_normal),
            light: [
                pack_rgb9e5(sample.radiance) as i32,
                reservoir.w.to_bits() as i32,
                reservoir.m.to_bits() as i32,
                sample.light_id as i32,
            ],
        }
    }

    pub fn unpack(&self) -> GiReservoir {
        let (creation_point, creation_normal) =
            Self::unpack_point(self.creation);

        let (hit_point, hit_normal) = Self::unpack_point(self.hit);

        GiReservoir {
            sample: GiSample {
                creation_point,
                creation_normal,
                hit_point,
                hit_normal,
                radiance: unpack_rgb9e5(self.light[0] as u32),
                light_id: self.light[3] as u32,
            },
            w: f32::from_bits(self.light[1] as u32),
            m: f32::from_bits(self.light[2] as u32),
        }
    }

    pub fn m(&self) -> f32 {
        f32::from_bits(self.light[2] as u32)
    }

    pub fn w(&self) -> f32 {
        f32::from_bits(self.light[1] as u32)
    }

    fn pack_point(point: Vec3, normal: Vec3) -> [i32; 4] {
        let normal = if normal == Vec3::ZERO {
            0
        } else {
            Normal::pack(normal)
        };

        [
            point.x.to_bits() as i32,
            point.y.to_bits() as i32,
            point.z.to_bits() as i32,
            normal as i32,
        ]
    }

    fn unpack_point(data: [i32; 4]) -> (Vec3, Vec3) {
        let point = vec3(
            f32::from_bits(data[0] as u32),
            f32::from_bits(data[1] as u32),
            f32::from_bits(data[2] as u32),
        );

        let normal = if data[3] == 0 {
            Vec3::ZERO
        } else {
            Normal::unpack(data[3] as u32)
        };

        (point, normal)
    }
}

/// Addressing of a 3D `(x, y, slice)` reservoir buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReservoirBufferDim(pub UVec3);

impl ReservoirBufferDim {
    pub fn new(padded_size: UVec2, slices: u32) -> Self {
        Self(padded_size.extend(slices))
    }

    pub fn slices(&self) -> u32 {
        self.0.z
    }

    pub fn len(&self) -> usize {
        (self.0.x * self.0.y * self.0.z) as usize
    }

    pub fn index(&self, pixel: UVec2, slice: u32) -> usize {
        ((slice * self.0.y + pixel.y) * self.0.x + pixel.x) as usize
    }
}
