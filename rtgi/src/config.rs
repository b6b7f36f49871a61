use rtgi_gpu::{BiasCorrection, LightSamplerKind, VisibilityTest};

use crate::GiBackend;

/// Every knob of the GI pipeline.
///
/// The config is immutable for the duration of a frame; change it by
/// building a new one and passing it into the next frame.
#[derive(Clone, Debug)]
pub struct GiConfig {
    pub backend: GiBackend,

    /// Seed mixed into every frame's noise; `None` picks a random one per
    /// frame.
    pub seed: Option<u32>,

    /// Offset applied to secondary rays' origins to avoid self-intersection.
    pub ray_bias: f32,

    pub lighting: LightingConfig,
    pub light_tree: LightTreeConfig,
    pub light_cuts: LightCutConfig,
    pub restir: RestirConfig,
    pub brute_force: BruteForceConfig,
    pub surfel: SurfelConfig,
    pub ddgi: DdgiConfig,
}

impl Default for GiConfig {
    fn default() -> Self {
        Self {
            backend: GiBackend::Restir,
            seed: None,
            ray_bias: 0.001,
            lighting: Default::default(),
            light_tree: Default::default(),
            light_cuts: Default::default(),
            restir: Default::default(),
            brute_force: Default::default(),
            surfel: Default::default(),
            ddgi: Default::default(),
        }
    }
}

impl GiConfig {
    /// Light sampler of the active backend; DDGI and surfels trace from
    /// places no cut got built for, so they stick to the light tree.
    pub fn light_sampler(&self) -> LightSamplerKind {
        match self.backend {
            GiBackend::BruteForce => self.brute_force.light_sampler,
            GiBackend::Restir => self.restir.light_sampler,
            GiBackend::Ddgi => self.ddgi.light_sampler(),
            GiBackend::Surfel => LightSamplerKind::LightTree,
        }
    }
}

/// Which lights get extracted and how they get ranked when there's too many
/// of them.
#[derive(Clone, Debug)]
pub struct LightingConfig {
    pub max_lights: usize,

    /// Lights ranked past this one don't cast shadows.
    pub max_shadow_lights: usize,

    pub directional: bool,
    pub point: bool,
    pub spot: bool,
    pub rect: bool,
    pub sky: bool,

    pub frustum_boost: f32,
    pub ahead_boost: f32,
    pub behind_boost: f32,
    pub distance_power: f32,
    pub luminance_power: f32,
}

impl Default for LightingConfig {
    fn default() -> Self {
        Self {
            max_lights: 256,
            max_shadow_lights: 256,
            directional: true,
            point: true,
            spot: true,
            rect: true,
            sky: true,
            frustum_boost: 0.5,
            ahead_boost: 1.0,
            behind_boost: 1.0,
            distance_power: 2.0,
            luminance_power: 0.5,
        }
    }
}

#[derive(Clone, Debug)]
pub struct LightTreeConfig {
    /// Morton-code resolution per axis.
    pub quantization_levels: u32,

    /// Upper bound on node updates performed by a single level-building
    /// dispatch.
    pub max_work_load: u32,
}

impl LightTreeConfig {
    pub fn quantization_levels(&self) -> u32 {
        self.quantization_levels.clamp(1, 1024)
    }

    pub fn max_work_load(&self) -> u32 {
        self.max_work_load.max(1)
    }
}

impl Default for LightTreeConfig {
    fn default() -> Self {
        Self {
            quantization_levels: 1024,
            max_work_load: 2048,
        }
    }
}

#[derive(Clone, Debug)]
pub struct LightCutConfig {
    pub max_cut_nodes: u32,
    pub block_size: u32,
    pub share_group_size: u32,
    pub error_limit: f32,
    pub approximate_cosine_bound: bool,
    pub interleave_rate: u32,
}

impl LightCutConfig {
    pub fn max_cut_nodes(&self) -> u32 {
        self.max_cut_nodes
            .clamp(1, rtgi_shaders::light_cuts::MAX_CUT_NODES as u32)
    }

    pub fn block_size(&self) -> u32 {
        self.block_size.max(1)
    }

    pub fn share_group_size(&self) -> u32 {
        self.share_group_size.max(1)
    }

    pub fn interleave_rate(&self) -> u32 {
        self.interleave_rate.max(1)
    }

    pub fn error_limit(&self) -> f32 {
        self.error_limit.max(0.0)
    }
}

impl Default for LightCutConfig {
    fn default() -> Self {
        Self {
            max_cut_nodes: 8,
            block_size: 8,
            share_group_size: 1,
            error_limit: 0.001,
            approximate_cosine_bound: true,
            interleave_rate: 1,
        }
    }
}

/// Presets of the ReSTIR knobs that trade quality for speed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RestirQuality {
    Medium,
    High,
    Ultra,
}

#[derive(Clone, Debug)]
pub struct RestirConfig {
    pub initial_samples: u32,

    /// Initial candidates used on a camera cut or when there's no history.
    pub initial_samples_boost: u32,

    pub temporal: bool,
    pub boiling_filter: bool,
    pub boiling_filter_strength: f32,
    pub spatial: bool,
    pub spatial_sampling_radius: f32,
    pub spatial_samples: u32,

    /// Spatial samples used when the history got invalidated.
    pub spatial_samples_boost: u32,

    pub spatial_normal_threshold: f32,
    pub spatial_depth_threshold: f32,
    pub temporal_normal_threshold: f32,
    pub temporal_depth_threshold: f32,
    pub max_temporal_history: u32,
    pub bias_correction: BiasCorrection,
    pub approximate_visibility: bool,
    pub demodulate_materials: bool,
    pub feedback_visibility: bool,
    pub fused_sampling: bool,
    pub test_initial_visibility: VisibilityTest,
    pub light_sampler: LightSamplerKind,

    /// Number of reservoirs per pixel; negative picks it automatically.
    pub num_reservoirs: i32,
    pub min_reservoirs: u32,
    pub max_reservoirs: u32,
}

impl RestirConfig {
    pub fn with_preset(mut self, quality: RestirQuality) -> Self {
        let (correction, spatial, initial, disocclusion) = match quality {
            RestirQuality::Medium => (BiasCorrection::None, 1, 4, 8),
            RestirQuality::High => (BiasCorrection::Basic, 1, 4, 16),
            RestirQuality::Ultra => (BiasCorrection::Basic, 4, 8, 16),
        };

        self.bias_correction = correction;
        self.spatial_samples = spatial;
        self.initial_samples = initial;
        self.spatial_samples_boost = disocclusion;
        self
    }

    pub fn initial_samples(&self) -> u32 {
        self.initial_samples.max(1)
    }

    pub fn initial_samples_boost(&self) -> u32 {
        self.initial_samples_boost.max(1)
    }

    pub fn boiling_filter_strength(&self) -> f32 {
        self.boiling_filter_strength.clamp(0.00001, 1.0)
    }

    pub fn spatial_sampling_radius(&self) -> f32 {
        self.spatial_sampling_radius.max(1.0)
    }

    pub fn spatial_samples(&self) -> u32 {
        self.spatial_samples
            .min(rtgi_gpu::SPATIAL_DISC_SIZE as u32)
    }

    pub fn spatial_samples_boost(&self) -> u32 {
        self.spatial_samples_boost
            .min(rtgi_gpu::SPATIAL_DISC_SIZE as u32)
    }

    pub fn spatial_normal_threshold(&self) -> f32 {
        self.spatial_normal_threshold.clamp(0.0, 1.0)
    }

    pub fn spatial_depth_threshold(&self) -> f32 {
        self.spatial_depth_threshold.max(0.0)
    }

    pub fn temporal_normal_threshold(&self) -> f32 {
        self.temporal_normal_threshold.clamp(0.0, 1.0)
    }

    pub fn temporal_depth_threshold(&self) -> f32 {
        self.temporal_depth_threshold.max(0.0)
    }

    pub fn max_temporal_history(&self) -> u32 {
        self.max_temporal_history.max(1)
    }

    pub fn min_reservoirs(&self) -> u32 {
        self.min_reservoirs.max(1)
    }

    pub fn max_reservoirs(&self) -> u32 {
        self.max_reservoirs.max(self.min_reservoirs())
    }
}

impl Default for RestirConfig {
    fn default() -> Self {
        Self {
            initial_samples: 1,
            initial_samples_boost: 4,
            temporal: true,
            boiling_filter: true,
            boiling_filter_strength: 0.20,
            spatial: true,
            spatial_sampling_radius: 32.0,
            spatial_samples: 1,
            spatial_samples_boost: 8,
            spatial_normal_threshold: 0.5,
            spatial_depth_threshold: 0.1,
            temporal_normal_threshold: 0.5,
            temporal_depth_threshold: 0.1,
            max_temporal_history: 10,
            bias_correction: BiasCorrection::Basic,
            approximate_visibility: false,
            demodulate_materials: true,
            feedback_visibility: true,
            fused_sampling: true,
            test_initial_visibility: VisibilityTest::OnFinalReservoir,
            light_sampler: LightSamplerKind::LightTree,
            num_reservoirs: -1,
            min_reservoirs: 1,
            max_reservoirs: 2,
        }
    }
}

#[derive(Clone, Debug)]
pub struct BruteForceConfig {
    pub samples_per_pixel: u32,
    pub max_bounces: u32,
    pub demodulate_materials: bool,
    pub light_sampler: LightSamplerKind,
}

impl Default for BruteForceConfig {
    fn default() -> Self {
        Self {
            samples_per_pixel: 1,
            max_bounces: 1,
            demodulate_materials: true,
            light_sampler: LightSamplerKind::LightTree,
        }
    }
}

#[derive(Clone, Debug)]
pub struct SurfelConfig {
    /// Edge length of a grid cell, in world units.
    pub cell_size: f32,

    pub surfel_radius: f32,

    /// Number of hash-grid cells.
    pub cells: u32,

    /// Size of the surfel pool.
    pub capacity: u32,

    /// Frames a surfel survives without covering any pixel.
    pub max_lifetime: u32,

    /// Number of samples after which accumulation turns into a moving
    /// average.
    pub max_samples: u32,

    /// Pixels covered less than this spawn new surfels.
    pub spawn_coverage: f32,

    /// Probability of spawning a surfel in an under-covered tile per frame.
    pub spawn_chance: f32,

    pub demodulate_materials: bool,
}

impl SurfelConfig {
    pub fn cells(&self) -> u32 {
        self.cells.clamp(1, rtgi_gpu::MAX_SURFEL_CELLS)
    }

    pub fn capacity(&self) -> u32 {
        self.capacity.clamp(1, rtgi_gpu::MAX_SURFELS)
    }

    pub fn cell_size(&self) -> f32 {
        self.cell_size.max(1e-3)
    }
}

impl Default for SurfelConfig {
    fn default() -> Self {
        Self {
            cell_size: 1.0,
            surfel_radius: 0.5,
            cells: 64 * 1024,
            capacity: rtgi_gpu::MAX_SURFELS,
            max_lifetime: 240,
            max_samples: 32,
            spawn_coverage: 0.5,
            spawn_chance: 0.25,
            demodulate_materials: true,
        }
    }
}

/// Renderer-wide DDGI knobs; per-volume ones live on
/// [`crate::DdgiVolumeSettings`].
#[derive(Clone, Debug)]
pub struct DdgiConfig {
    /// Rays traced by a single probe update; zero updates whole volumes.
    pub probe_update_ray_budget: u32,

    /// Largest 2D texture the probe atlases may occupy; volumes exceeding it
    /// don't get updated.
    pub max_texture_size: u32,

    /// Whether the renderer runs outside of the editor, in which case
    /// runtime-static volumes stay frozen.
    pub runtime: bool,

    /// Sampler used for the probe rays; light cuts need a view, so they fall
    /// back to the light tree.
    pub light_sampler: LightSamplerKind,

    pub demodulate_materials: bool,
}

impl DdgiConfig {
    pub fn light_sampler(&self) -> LightSamplerKind {
        match self.light_sampler {
            LightSamplerKind::LightCuts => LightSamplerKind::LightTree,
            sampler => sampler,
        }
    }
}

impl Default for DdgiConfig {
    fn default() -> Self {
        Self {
            probe_update_ray_budget: 0,
            max_texture_size: 16384,
            runtime: true,
            light_sampler: LightSamplerKind::LightTree,
            demodulate_materials: true,
        }
    }
}
