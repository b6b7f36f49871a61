use bytemuck::{Pod, Zeroable};
use glam::{UVec2, Vec3};

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct LightTreeParams {
    pub bound_min: Vec3,
    pub light_count: u32,
    pub bound_max: Vec3,
    pub infinite_count: u32,
    pub quantization_levels: u32,
    pub levels: u32,
    pub lights: u32,
    pub _pad: u32,
}

impl LightTreeParams {
    pub fn finite_count(&self) -> u32 {
        self.light_count.saturating_sub(self.infinite_count)
    }
}

/// One compare-and-swap stage of a bitonic sort: `block` is the size of the
/// sequences being merged, `stride` the distance between compared keys.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct BitonicSortParams {
    pub block: u32,
    pub stride: u32,
}

/// Builds levels `dst_level_start..dst_level_end` straight from the nodes of
/// `src_level`.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct LightTreeLevelsParams {
    pub src_level: u32,
    pub dst_level_start: u32,
    pub dst_level_end: u32,
    pub levels: u32,
}

impl LightTreeLevelsParams {
    /// Number of nodes (and invocations) the destination levels span.
    pub fn dst_nodes(&self) -> u32 {
        (1 << (self.levels - self.dst_level_start))
            - (1 << (self.levels - self.dst_level_end))
    }
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct LightCutParams {
    pub view_size: UVec2,
    pub block_size: u32,
    pub max_cut_nodes: u32,
    pub share_group_size: u32,
    pub interleave_rate: u32,
    pub frame: u32,
    pub approximate_cosine: u32,
    pub error_limit: f32,
    pub min_distance_sqr: f32,
}

impl LightCutParams {
    pub fn tiles(&self) -> UVec2 {
        (self.view_size + self.block_size - 1) / self.block_size.max(1)
    }

    pub fn tile_index(&self, tile: UVec2) -> usize {
        (tile.y * self.tiles().x + tile.x) as usize
    }

    /// Whether the cut of given tile is recomputed this frame; with an
    /// interleave rate of `n`, every tile gets refreshed once per `n` frames.
    pub fn is_tile_scheduled(&self, tile: UVec2) -> bool {
        let rate = self.interleave_rate.max(1);

        (tile.x + tile.y + self.frame) % rate == 0
    }
}

/// How lights get picked when shading secondary hits.
#[repr(u32)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LightSamplerKind {
    Uniform = 0,
    Power = 1,
    #[default]
    LightTree = 2,
    LightCuts = 3,
}

impl LightSamplerKind {
    pub fn from_u32(value: u32) -> Self {
        match value {
            1 => Self::Power,
            2 => Self::LightTree,
            3 => Self::LightCuts,
            _ => Self::Uniform,
        }
    }
}

/// Normalization of resampled reservoirs.
#[repr(u32)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BiasCorrection {
    /// Divide by the total number of candidates (biased near edges).
    None = 0,

    /// Divide by the number of candidates which could have produced the
    /// selected sample.
    #[default]
    Basic = 1,

    /// As [`Self::Basic`], additionally tracing a visibility ray from every
    /// contributing surface.
    RayTraced = 2,
}

impl BiasCorrection {
    pub fn from_u32(value: u32) -> Self {
        match value {
            1 => Self::Basic,
            2 => Self::RayTraced,
            _ => Self::None,
        }
    }
}

/// When shadow rays for the lights sampled at secondary hits are traced.
#[repr(u32)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum VisibilityTest {
    None = 0,
    #[default]
    OnFinalReservoir = 1,
    PerCandidate = 2,
}

impl VisibilityTest {
    pub fn from_u32(value: u32) -> Self {
        match value {
            1 => Self::OnFinalReservoir,
            2 => Self::PerCandidate,
            _ => Self::None,
        }
    }
}

/// Parameters shared by all ReSTIR GI kernels; every pass reads the fields
/// it needs.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct RestirPassParams {
    pub seed: u32,
    pub frame: u32,
    pub view_size: UVec2,
    pub padded_size: UVec2,

    /// Slices of the current reservoir buffer.
    pub slices: u32,

    /// Slices of the history reservoir buffer.
    pub history_slices: u32,

    pub slice_in: u32,
    pub slice_out: u32,
    pub initial_candidates: u32,
    pub spatial_samples: u32,
    pub spatial_samples_boost: u32,
    pub spatial_radius: f32,
    pub max_history: f32,
    pub temporal_normal_threshold: f32,
    pub temporal_depth_threshold: f32,
    pub spatial_normal_threshold: f32,
    pub spatial_depth_threshold: f32,
    pub boiling_multiplier: f32,
    pub ray_bias: f32,
    pub light_sampler: u32,
    pub bias_correction: u32,
    pub visibility_test: u32,
    pub flags: u32,
    pub cut_block_size: u32,
    pub max_cut_nodes: u32,
    pub min_distance_sqr: f32,
    pub camera_position: Vec3,
    pub approximate_cosine: u32,
}

impl RestirPassParams {
    pub const FLAG_TEMPORAL: u32 = 1;
    pub const FLAG_CAMERA_CUT: u32 = 1 << 1;
    pub const FLAG_APPROX_VISIBILITY: u32 = 1 << 2;
    pub const FLAG_DEMODULATE: u32 = 1 << 3;
    pub const FLAG_FEEDBACK_VISIBILITY: u32 = 1 << 4;
    pub const FLAG_TWO_SIDED: u32 = 1 << 5;
    pub const FLAG_TRANSMISSION: u32 = 1 << 6;
    pub const FLAG_HAIR: u32 = 1 << 7;

    pub fn has(&self, flag: u32) -> bool {
        self.flags & flag != 0
    }

    pub fn light_sampler(&self) -> LightSamplerKind {
        LightSamplerKind::from_u32(self.light_sampler)
    }

    pub fn bias_correction(&self) -> BiasCorrection {
        BiasCorrection::from_u32(self.bias_correction)
    }

    pub fn visibility_test(&self) -> VisibilityTest {
        VisibilityTest::from_u32(self.visibility_test)
    }
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct BruteForcePassParams {
    pub seed: u32,
    pub samples_per_pixel: u32,
    pub max_bounces: u32,
    pub flags: u32,
    pub view_size: UVec2,
    pub ray_bias: f32,
    pub min_distance_sqr: f32,
}

impl BruteForcePassParams {
    pub const FLAG_DEMODULATE: u32 = 1;
    pub const FLAG_TWO_SIDED: u32 = 1 << 1;
}

/// Per-frame inputs of the probe update kernels that don't belong to the
/// volume itself.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct DdgiPassParams {
    pub seed: u32,
    pub light_count: u32,
    pub infinite_count: u32,

    /// Whether probe data is being reset instead of updated (relocation
    /// offsets zeroed, all probes marked active).
    pub reset: u32,

    pub irradiance_scalar: f32,
    pub emissive_multiplier: f32,
    pub lighting_multiplier: f32,
    pub ray_bias: f32,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct SurfelPassParams {
    pub seed: u32,
    pub frame: u32,
    pub view_size: UVec2,
    pub cell_size: f32,
    pub surfel_radius: f32,
    pub cells: u32,
    pub max_lifetime: u32,
    pub max_samples: f32,
    pub spawn_coverage: f32,
    pub spawn_chance: f32,
    pub ray_bias: f32,
    pub light_count: u32,
    pub infinite_count: u32,
    pub flags: u32,
    pub _pad: u32,
}

impl SurfelPassParams {
    pub const FLAG_DEMODULATE: u32 = 1;

    pub fn tiles(&self) -> UVec2 {
        (self.view_size + crate::SURFEL_TILE_SIZE - 1) / crate::SURFEL_TILE_SIZE
    }
}
