use bytemuck::{Pod, Zeroable};
use glam::{IVec3, Vec3, Vec4};

use crate::{F32Ext, Normal};

/// Number of elements scanned by a single work-group of the prefix scan;
/// the scan handles up to `SEGMENT_SIZE * SEGMENT_SIZE` elements.
pub const SEGMENT_SIZE: u32 = 1024;

pub const MAX_SURFEL_CELLS: u32 = 1024 * 1024;
pub const MAX_SURFELS: u32 = 256 * 1024;
pub const MAX_SURFELS_PER_CELL: u32 = 32;

/// Size of screen tiles within which at most one surfel is spawned per
/// frame.
pub const SURFEL_TILE_SIZE: u32 = 8;

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Surfel {
    pub position: Vec3,
    pub radius: f32,
    pub normal: u32,
    /// Frames since this surfel last contributed to a visible pixel.
    pub lifetime: u32,
    pub flags: u32,
    pub _pad: u32,
}

impl Surfel {
    pub const FLAG_ALIVE: u32 = 1;

    pub fn new(position: Vec3, normal: Vec3, radius: f32) -> Self {
        Self {
            position,
            radius,
            normal: Normal::pack(normal),
            lifetime: 0,
            flags: Self::FLAG_ALIVE,
            _pad: 0,
        }
    }

    pub fn is_alive(&self) -> bool {
        self.flags & Self::FLAG_ALIVE != 0
    }

    pub fn normal(&self) -> Vec3 {
        Normal::unpack(self.normal)
    }

    /// How much this surfel covers given surface point, from one at its
    /// center to zero at its rim (or for surfaces facing elsewhere).
    pub fn coverage(&self, point: Vec3, normal: Vec3) -> f32 {
        if !self.is_alive() {
            return 0.0;
        }

        let dist = self.position.distance(point);

        if dist >= self.radius {
            return 0.0;
        }

        let facing = self.normal().dot(normal);

        if facing < 0.5 {
            return 0.0;
        }

        (1.0 - dist / self.radius).saturate() * facing
    }
}

/// Bookkeeping shared by the allocation and binning kernels.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct SurfelMeta {
    /// Number of entries on the free-list stack.
    pub free_count: u32,

    /// One past the highest surfel index handed out so far; kernels that
    /// iterate surfels dispatch over `0..high_water`.
    pub high_water: u32,
}

/// Accumulated irradiance of a surfel; `w` counts the blended samples.
pub type SurfelIrradiance = Vec4;

pub fn surfel_cell(position: Vec3, cell_size: f32) -> IVec3 {
    (position / cell_size).floor().as_ivec3()
}

/// Hashes a grid cell into `0..cells`.
pub fn surfel_cell_hash(cell: IVec3, cells: u32) -> u32 {
    let h = (cell.x as u32).wrapping_mul(73856093)
        ^ (cell.y as u32).wrapping_mul(19349663)
        ^ (cell.z as u32).wrapping_mul(83492791);

    h % cells.max(1)
}

/// Calls `f` for every grid cell touched by a sphere of given radius; at
/// most 27 cells when `radius <= cell_size`.
pub fn for_each_surfel_cell(
    position: Vec3,
    radius: f32,
    cell_size: f32,
    mut f: impl FnMut(IVec3),
) {
    let min = surfel_cell(position - radius, cell_size);
    let max = surfel_cell(position + radius, cell_size);

    for z in min.z..=max.z {
        for y in min.y..=max.y {
            for x in min.x..=max.x {
                f(IVec3::new(x, y, z));
            }
        }
    }
}

/// Binned surfels: the indices of surfels touching hashed cell `c` live at
/// `indices[offsets[c]..offsets[c + 1]]`.
#[derive(Clone, Copy, Debug)]
pub struct SurfelGridView<'a> {
    pub cell_size: f32,
    pub cells: u32,
    pub offsets: &'a [u32],
    pub indices: &'a [u32],
}

impl<'a> SurfelGridView<'a> {
    /// Returns surfels binned into the cell containing given point, at most
    /// [`MAX_SURFELS_PER_CELL`] of them.
    pub fn surfels_at(&self, point: Vec3) -> impl Iterator<Item = u32> + 'a {
        let cell = surfel_cell_hash(surfel_cell(point, self.cell_size), self.cells) as usize;

        let (start, end) = match (self.offsets.get(cell), self.offsets.get(cell + 1)) {
            (Some(&start), Some(&end)) => (start as usize, end as usize),
            _ => (0, 0),
        };

        let end = end.min(self.indices.len()).min(start + MAX_SURFELS_PER_CELL as usize);

        self.indices
            .get(start..end)
            .unwrap_or_default()
            .iter()
            .copied()
    }
}
