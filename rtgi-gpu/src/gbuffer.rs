use glam::{ivec2, IVec2, UVec2, Vec2, Vec3};

/// Primary-surface attributes of a single pixel, as produced by the
/// rasterizer (or a primary-ray pass).
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct GBufferEntry {
    /// World-space position of the surface.
    pub position: Vec3,

    /// Linear view depth; zero means that the pixel doesn't contain any
    /// geometry (sky).
    pub depth: f32,

    pub normal: Vec3,
    pub albedo: Vec3,
    pub emissive: Vec3,

    /// Where this surface was located on the screen during the previous
    /// frame; negative coordinates mean that the surface wasn't visible.
    pub prev_screen_pos: Vec2,
}

impl GBufferEntry {
    pub fn is_some(&self) -> bool {
        self.depth > 0.0
    }

    pub fn is_none(&self) -> bool {
        !self.is_some()
    }

    /// Returns whether `other` is similar enough to be considered the same
    /// surface for the purposes of reservoir reuse.
    pub fn is_similar(
        &self,
        other: &Self,
        normal_threshold: f32,
        depth_threshold: f32,
    ) -> bool {
        if other.is_none() {
            return false;
        }

        if self.normal.dot(other.normal) < normal_threshold {
            return false;
        }

        (self.depth - other.depth).abs() <= depth_threshold * self.depth
    }
}

/// Read-only view of a G-buffer laid out in row-major order.
#[derive(Clone, Copy, Debug)]
pub struct GBufferView<'a> {
    size: UVec2,
    entries: &'a [GBufferEntry],
}

impl<'a> GBufferView<'a> {
    pub fn new(size: UVec2, entries: &'a [GBufferEntry]) -> Self {
        debug_assert_eq!((size.x * size.y) as usize, entries.len());

        Self { size, entries }
    }

    pub fn size(&self) -> UVec2 {
        self.size
    }

    pub fn contains(&self, pos: IVec2) -> bool {
        pos.x >= 0
            && pos.y >= 0
            && (pos.x as u32) < self.size.x
            && (pos.y as u32) < self.size.y
    }

    /// Clamps given position into the screen.
    pub fn contain(&self, pos: IVec2) -> UVec2 {
        pos.clamp(IVec2::ZERO, self.size.as_ivec2() - ivec2(1, 1))
            .as_uvec2()
    }

    pub fn screen_to_idx(&self, pos: UVec2) -> usize {
        (pos.y * self.size.x + pos.x) as usize
    }

    pub fn get(&self, pos: UVec2) -> GBufferEntry {
        self.entries[self.screen_to_idx(pos)]
    }

    pub fn entries(&self) -> &'a [GBufferEntry] {
        self.entries
    }
}
