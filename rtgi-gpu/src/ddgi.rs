//! Probe-volume layout and sampling shared by the probe update kernels and
//! the shading passes.
//!
//! Probes are stored in 2D atlases of `counts.y * counts.z` columns by
//! `counts.x` rows of tiles; each tile holds an octahedral map of
//! `N x N` texels surrounded by a one-texel border.

use core::f32::consts::PI;

use bytemuck::{Pod, Zeroable};
use glam::{ivec3, uvec2, vec2, vec3, IVec3, Quat, UVec2, Vec2, Vec3};

use crate::{F32Ext, TextureView};

pub const DDGI_IRRADIANCE_TEXELS: u32 = 6;
pub const DDGI_DISTANCE_TEXELS: u32 = 14;

/// Maximum number of volumes considered when shading a view.
pub const DDGI_MAX_SHADING_VOLUMES: usize = 12;

/// Supported ray counts per probe.
/// Leading probe rays that are never rotated; relocation and classification
/// look only at these, so that their results stay stable across frames.
pub const DDGI_FIXED_RAYS: u32 = 32;

pub const DDGI_RAYS_PER_PROBE: [u32; 7] = [144, 288, 432, 576, 720, 864, 1008];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProbeState {
    Active = 0,
    Inactive = 1,
}

impl ProbeState {
    pub fn from_texel(value: f32) -> Self {
        if value >= 0.5 {
            Self::Inactive
        } else {
            Self::Active
        }
    }
}

/// Condensed volume descriptor, as uploaded for the probe kernels.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct DdgiVolumeDesc {
    pub origin: Vec3,
    pub rays_per_probe: u32,

    /// Volume rotation (quaternion, xyzw).
    pub rotation: [f32; 4],

    pub spacing: Vec3,
    pub max_ray_distance: f32,
    pub counts: IVec3,
    pub distance_exponent: f32,
    pub hysteresis: f32,
    pub change_threshold: f32,
    pub brightness_threshold: f32,
    pub irradiance_gamma: f32,
    pub normal_bias: f32,
    pub view_bias: f32,
    pub blend_distance: f32,
    pub blend_cutoff: f32,

    /// Positive scroll offsets (centered around `i32::MAX / 2`).
    pub scroll_offsets: IVec3,
    pub backface_threshold: f32,
    pub min_frontface_distance: f32,
    pub flags: u32,

    /// Per-update random rotation of the probe rays (quaternion, xyzw).
    pub ray_rotation: [f32; 4],

    pub probe_index_start: u32,
    pub probe_index_count: u32,
    pub _pad: [u32; 2],
}

impl DdgiVolumeDesc {
    pub const FLAG_RELOCATION: u32 = 1;
    pub const FLAG_SCROLLING: u32 = 1 << 1;
    pub const FLAG_CLASSIFICATION: u32 = 1 << 2;

    pub fn is_relocation_enabled(&self) -> bool {
        self.flags & Self::FLAG_RELOCATION != 0
    }

    pub fn is_scrolling_enabled(&self) -> bool {
        self.flags & Self::FLAG_SCROLLING != 0
    }

    pub fn is_classification_enabled(&self) -> bool {
        self.flags & Self::FLAG_CLASSIFICATION != 0
    }

    pub fn probe_count(&self) -> u32 {
        (self.counts.x * self.counts.y * self.counts.z).max(0) as u32
    }

    /// Size of the probe grid when flattened into 2D (in probes).
    pub fn probe_grid_2d(&self) -> UVec2 {
        uvec2(
            (self.counts.y * self.counts.z) as u32,
            self.counts.x as u32,
        )
    }

    pub fn atlas_size(&self, num_texels: u32) -> UVec2 {
        self.probe_grid_2d() * (num_texels + 2)
    }

    /// Storage coordinates of the probe stored at given index.
    pub fn probe_coords(&self, index: u32) -> IVec3 {
        let index = index as i32;
        let plane = self.counts.y * self.counts.z;
        let col = index % plane;

        ivec3(index / plane, col % self.counts.y, col / self.counts.y)
    }

    pub fn probe_index(&self, coords: IVec3) -> u32 {
        let plane = self.counts.y * self.counts.z;

        (coords.x * plane + coords.z * self.counts.y + coords.y) as u32
    }

    /// Position of the probe's tile within the atlas (in tiles).
    pub fn probe_tile(&self, index: u32) -> UVec2 {
        let plane = (self.counts.y * self.counts.z) as u32;

        uvec2(index % plane, index / plane)
    }

    /// Position of given interior texel of the probe's tile within the atlas.
    pub fn probe_texel(&self, index: u32, texel: UVec2, num_texels: u32) -> UVec2 {
        self.probe_tile(index) * (num_texels + 2) + 1 + texel
    }

    /// Maps an atlas texel back onto the probe owning it and the texel's
    /// position within the probe's tile (border included, so interior texels
    /// are `1..=num_texels`).
    pub fn atlas_probe(&self, pos: UVec2, num_texels: u32) -> Option<(u32, UVec2)> {
        let tile_size = num_texels + 2;
        let tile = pos / tile_size;
        let grid = self.probe_grid_2d();

        if tile.x >= grid.x || tile.y >= grid.y {
            return None;
        }

        Some((tile.y * grid.x + tile.x, pos % tile_size))
    }

    /// Index of given probe ray within the ray-data buffer.
    pub fn ray_data_index(&self, probe: u32, ray: u32) -> usize {
        (probe * self.rays_per_probe + ray) as usize
    }

    /// Maps grid coordinates (relative to the volume's current origin) into
    /// storage coordinates.
    pub fn storage_coords(&self, grid: IVec3) -> IVec3 {
        if self.is_scrolling_enabled() {
            rem_euclid(grid + rem_euclid(self.scroll_offsets, self.counts), self.counts)
        } else {
            grid
        }
    }

    /// See: [`Self::storage_coords()`].
    pub fn grid_coords(&self, storage: IVec3) -> IVec3 {
        if self.is_scrolling_enabled() {
            rem_euclid(storage - rem_euclid(self.scroll_offsets, self.counts), self.counts)
        } else {
            storage
        }
    }

    /// Parity of the "lap" each axis of the probe is on; it changes when a
    /// probe wraps to the other side of a scrolling volume.
    pub fn scroll_space(&self, index: u32) -> u32 {
        let grid = self.grid_coords(self.probe_coords(index));
        let mut space = 0;

        for axis in 0..3 {
            let lap = (grid[axis] as i64 + self.scroll_offsets[axis] as i64)
                .div_euclid(self.counts[axis] as i64);

            space |= ((lap & 1) as u32) << axis;
        }

        space
    }

    pub fn rotation(&self) -> Quat {
        Quat::from_array(self.rotation)
    }

    /// World-space position of the probe stored at given index, without
    /// relocation offsets.
    pub fn probe_grid_position(&self, index: u32) -> Vec3 {
        let grid = self.grid_coords(self.probe_coords(index));
        let shift = (self.counts - 1).as_vec3() * self.spacing * 0.5;
        let local = grid.as_vec3() * self.spacing - shift;

        self.origin + self.rotation() * local
    }

    pub fn probe_position(&self, index: u32, offsets: Option<&TextureView>) -> Vec3 {
        let position = self.probe_grid_position(index);

        match offsets {
            Some(offsets) => {
                let tile = self.probe_tile(index);

                position
                    + self.rotation() * (decode_probe_offset(offsets.load(tile).truncate()) * self.spacing)
            }
            None => position,
        }
    }

    /// Whether the leading [`DDGI_FIXED_RAYS`] rays are reserved for
    /// relocation and classification (and skipped by blending).
    pub fn has_fixed_rays(&self) -> bool {
        (self.is_relocation_enabled() || self.is_classification_enabled())
            && self.rays_per_probe > DDGI_FIXED_RAYS
    }

    /// Direction of given probe ray; all but the fixed rays are rotated by
    /// the per-update rotation.
    pub fn probe_ray_direction(&self, ray_index: u32) -> Vec3 {
        if self.has_fixed_rays() {
            if ray_index < DDGI_FIXED_RAYS {
                return spherical_fibonacci(ray_index as f32, DDGI_FIXED_RAYS as f32);
            }

            let dir = spherical_fibonacci(
                (ray_index - DDGI_FIXED_RAYS) as f32,
                (self.rays_per_probe - DDGI_FIXED_RAYS) as f32,
            );

            return Quat::from_array(self.ray_rotation) * dir;
        }

        let dir = spherical_fibonacci(ray_index as f32, self.rays_per_probe as f32);

        Quat::from_array(self.ray_rotation) * dir
    }

    /// Whether given probe is scheduled for an update this frame.
    pub fn is_probe_scheduled(&self, index: u32) -> bool {
        let count = self.probe_count();

        if count == 0 {
            return false;
        }

        let rel = (index + count - self.probe_index_start % count) % count;

        rel < self.probe_index_count
    }

    /// Fade of this volume's contribution at given point, from one deep
    /// inside of the volume to zero at (and past) its blending cutoff.
    pub fn volume_weight(&self, point: Vec3) -> f32 {
        let local = self.rotation().inverse() * (point - self.origin);
        let extent = (self.counts - 1).as_vec3() * self.spacing * 0.5;
        let inside = (extent - local.abs()).min_element();

        if inside < self.blend_cutoff {
            return 0.0;
        }

        if self.blend_distance <= 0.0 {
            return 1.0;
        }

        ((inside - self.blend_cutoff) / self.blend_distance).saturate()
    }

    /// Samples the irradiance arriving at given surface from the probes
    /// surrounding it.
    ///
    /// `view_dir` points from the camera towards the surface.
    pub fn sample_irradiance(
        &self,
        textures: &DdgiTexturesView,
        point: Vec3,
        normal: Vec3,
        view_dir: Vec3,
    ) -> Vec3 {
        let rotation_inv = self.rotation().inverse();
        let shift = (self.counts - 1).as_vec3() * self.spacing * 0.5;
        let biased = point + normal * self.normal_bias - view_dir * self.view_bias;
        let local = rotation_inv * (biased - self.origin) + shift;

        let base = (local / self.spacing)
            .floor()
            .as_ivec3()
            .clamp(IVec3::ZERO, self.counts - 1);

        let alpha = ((local - base.as_vec3() * self.spacing) / self.spacing)
            .clamp(Vec3::ZERO, Vec3::ONE);

        let mut irradiance = Vec3::ZERO;
        let mut weights = 0.0;

        for i in 0..8 {
            let offset = ivec3(i & 1, (i >> 1) & 1, (i >> 2) & 1);
            let grid = (base + offset).clamp(IVec3::ZERO, self.counts - 1);
            let index = self.probe_index(self.storage_coords(grid));

            if let Some(states) = &textures.states {
                let state = states.load(self.probe_tile(index)).x;

                if ProbeState::from_texel(state) == ProbeState::Inactive {
                    continue;
                }
            }

            let probe = self.probe_position(index, textures.offsets.as_ref());
            let to_probe = (probe - point).normalize_or_zero();
            let biased_to_probe = probe - biased;
            let biased_dist = biased_to_probe.length();
            let biased_to_probe = biased_to_probe.normalize_or_zero();

            let trilinear = Vec3::ONE - alpha + offset.as_vec3() * (2.0 * alpha - Vec3::ONE);
            let trilinear = trilinear.max(Vec3::splat(0.001));
            let trilinear = trilinear.x * trilinear.y * trilinear.z;

            let wrap = (to_probe.dot(normal) + 1.0) * 0.5;
            let mut weight = wrap.sqr() + 0.2;

            let distance = textures.distance.sample_bilinear(self.probe_uv(
                index,
                -biased_to_probe,
                DDGI_DISTANCE_TEXELS,
            ));

            let mean = distance.x;
            let variance = (mean.sqr() - distance.y).abs();

            let chebyshev = if biased_dist > mean {
                let v = biased_dist - mean;

                (variance / (variance + v.sqr())).powi(3).max(0.0)
            } else {
                1.0
            };

            weight *= chebyshev.max(0.05);
            weight = weight.max(0.000001);

            const CRUSH: f32 = 0.2;

            if weight < CRUSH {
                weight *= weight.sqr() / CRUSH.sqr();
            }

            weight *= trilinear;

            let probe_irradiance = textures
                .irradiance
                .sample_bilinear(self.probe_uv(index, normal, DDGI_IRRADIANCE_TEXELS))
                .truncate()
                .max(Vec3::ZERO)
                .powf(self.irradiance_gamma * 0.5);

            irradiance += probe_irradiance * weight;
            weights += weight;
        }

        if weights == 0.0 {
            return Vec3::ZERO;
        }

        let irradiance = irradiance / weights;

        irradiance * irradiance * 2.0 * PI
    }

    /// Position (in atlas texels) at which the probe's octahedral map should
    /// be sampled for given direction.
    pub fn probe_uv(&self, index: u32, dir: Vec3, num_texels: u32) -> Vec2 {
        let tile = self.probe_tile(index).as_vec2() * (num_texels + 2) as f32;
        let oct = oct_encode(dir) * 0.5 + 0.5;

        tile + 1.0 + oct * num_texels as f32
    }
}

/// Result of tracing a single probe ray; back-face hits carry a negative
/// distance and misses [`crate::FAR_DISTANCE`].
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct DdgiRayData {
    pub radiance: Vec3,
    pub distance: f32,
}

impl DdgiRayData {
    pub fn is_backface(&self) -> bool {
        self.distance < 0.0
    }

    pub fn is_miss(&self) -> bool {
        self.distance >= crate::FAR_DISTANCE
    }
}

/// Views of the textures of a single volume.
#[derive(Clone, Copy, Debug)]
pub struct DdgiTexturesView<'a> {
    pub irradiance: TextureView<'a>,
    pub distance: TextureView<'a>,
    pub offsets: Option<TextureView<'a>>,
    pub states: Option<TextureView<'a>>,
}

/// Encodes a probe offset (in units of probe spacing, within `+-0.5`) into
/// an unsigned-normalized texel.
pub fn encode_probe_offset(offset: Vec3) -> Vec3 {
    (offset + 0.5).clamp(Vec3::ZERO, Vec3::ONE)
}

/// See: [`encode_probe_offset()`].
pub fn decode_probe_offset(texel: Vec3) -> Vec3 {
    texel - 0.5
}

/// Maps a direction onto the `[-1, 1]` octahedral square.
pub fn oct_encode(dir: Vec3) -> Vec2 {
    let l1 = dir.x.abs() + dir.y.abs() + dir.z.abs();

    if l1 == 0.0 {
        return Vec2::ZERO;
    }

    let mut uv = vec2(dir.x, dir.y) / l1;

    if dir.z < 0.0 {
        uv = vec2(
            (1.0 - uv.y.abs()) * sign_not_zero(uv.x),
            (1.0 - uv.x.abs()) * sign_not_zero(uv.y),
        );
    }

    uv
}

/// See: [`oct_encode()`].
pub fn oct_decode(uv: Vec2) -> Vec3 {
    let mut dir = vec3(uv.x, uv.y, 1.0 - uv.x.abs() - uv.y.abs());

    if dir.z < 0.0 {
        let x = (1.0 - dir.y.abs()) * sign_not_zero(dir.x);
        let y = (1.0 - dir.x.abs()) * sign_not_zero(dir.y);

        dir.x = x;
        dir.y = y;
    }

    dir.normalize()
}

/// Direction of texel's center within an `N x N` octahedral tile.
pub fn oct_texel_direction(texel: UVec2, num_texels: u32) -> Vec3 {
    let uv = (texel.as_vec2() + 0.5) / num_texels as f32;

    oct_decode(uv * 2.0 - 1.0)
}

fn rem_euclid(a: IVec3, b: IVec3) -> IVec3 {
    ivec3(
        a.x.rem_euclid(b.x.max(1)),
        a.y.rem_euclid(b.y.max(1)),
        a.z.rem_euclid(b.z.max(1)),
    )
}

fn sign_not_zero(v: f32) -> f32 {
    if v >= 0.0 {
        1.0
    } else {
        -1.0
    }
}

/// Returns `i`-th of `n` points evenly distributed on a unit sphere.
pub fn spherical_fibonacci(i: f32, n: f32) -> Vec3 {
    const PHI: f32 = 1.618034;

    let fraction = (i * (PHI - 1.0)).fract();
    let phi = 2.0 * PI * fraction;
    let cos_theta = 1.0 - (2.0 * i + 1.0) / n;
    let sin_theta = (1.0 - cos_theta.sqr()).saturate().sqrt();

    vec3(phi.cos() * sin_theta, phi.sin() * sin_theta, cos_theta)
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;

    fn desc() -> DdgiVolumeDesc {
        DdgiVolumeDesc {
            rays_per_probe: 144,
            rotation: Quat::IDENTITY.to_array(),
            ray_rotation: Quat::IDENTITY.to_array(),
            spacing: Vec3::splat(10.0),
            counts: ivec3(4, 3, 2),
            ..Default::default()
        }
    }

    #[test]
    fn probe_indexing() {
        let desc = desc();

        assert_eq!(24, desc.probe_count());
        assert_eq!(uvec2(6, 4), desc.probe_grid_2d());
        assert_eq!(uvec2(48, 32), desc.atlas_size(DDGI_IRRADIANCE_TEXELS));

        for index in 0..desc.probe_count() {
            let coords = desc.probe_coords(index);

            assert_eq!(index, desc.probe_index(coords));

            let tile = desc.probe_tile(index);

            assert_eq!(coords.x as u32, tile.y);
            assert_eq!((coords.y + coords.z * 3) as u32, tile.x);
        }
    }

    #[test]
    fn probe_positions_are_centered() {
        let desc = desc();
        let first = desc.probe_grid_position(0);
        let last = desc.probe_grid_position(desc.probe_count() - 1);

        assert_abs_diff_eq!(-15.0, first.x, epsilon = 1e-4);
        assert_abs_diff_eq!(15.0, last.x, epsilon = 1e-4);
        assert_abs_diff_eq!(0.0, (first + last).length(), epsilon = 1e-4);
    }

    #[test]
    fn scrolling_keeps_world_positions_in_place() {
        let mut desc = desc();

        desc.flags = DdgiVolumeDesc::FLAG_SCROLLING;
        desc.scroll_offsets = ivec3(i32::MAX / 2 / 4 * 4, 0, 0);

        let before: Vec<_> = (0..desc.probe_count())
            .map(|i| desc.probe_grid_position(i))
            .collect();

        // Move by one cell along +X
        desc.origin.x += 10.0;
        desc.scroll_offsets.x += 1;

        let mut kept = 0;

        for index in 0..desc.probe_count() {
            let after = desc.probe_grid_position(index);

            if after == before[index as usize] {
                kept += 1;
            } else {
                // The wrapped plane jumps to the other side of the volume
                assert_abs_diff_eq!(40.0, after.x - before[index as usize].x, epsilon = 1e-3);
            }
        }

        assert_eq!(18, kept);
    }

    #[test]
    fn scroll_space_flips_for_wrapped_probes() {
        let mut desc = desc();

        desc.flags = DdgiVolumeDesc::FLAG_SCROLLING;
        desc.scroll_offsets = ivec3(i32::MAX / 2 / 4 * 4, 0, 0);

        let before: Vec<_> = (0..24).map(|i| desc.scroll_space(i)).collect();

        desc.scroll_offsets.x += 1;

        let flipped = (0..24)
            .filter(|&i| desc.scroll_space(i) != before[i as usize])
            .count();

        assert_eq!(6, flipped);
    }

    #[test]
    fn octahedral_mapping() {
        for dir in [
            Vec3::X,
            -Vec3::Y,
            Vec3::Z,
            -Vec3::Z,
            vec3(0.3, -0.4, -0.8).normalize(),
        ] {
            let decoded = oct_decode(oct_encode(dir));

            assert_abs_diff_eq!(dir.x, decoded.x, epsilon = 1e-5);
            assert_abs_diff_eq!(dir.y, decoded.y, epsilon = 1e-5);
            assert_abs_diff_eq!(dir.z, decoded.z, epsilon = 1e-5);
        }
    }

    #[test]
    fn fibonacci_directions_cover_the_sphere() {
        let n = 144;
        let sum: Vec3 = (0..n)
            .map(|i| spherical_fibonacci(i as f32, n as f32))
            .inspect(|dir| assert_abs_diff_eq!(1.0, dir.length(), epsilon = 1e-4))
            .sum();

        assert!(sum.length() / (n as f32) < 0.05);
    }

    #[test]
    fn probe_schedule_wraps() {
        let mut desc = desc();

        desc.probe_index_start = 20;
        desc.probe_index_count = 8;

        let scheduled: Vec<_> = (0..24).filter(|&i| desc.is_probe_scheduled(i)).collect();

        assert_eq!(vec![0, 1, 2, 3, 20, 21, 22, 23], scheduled);
    }
}
