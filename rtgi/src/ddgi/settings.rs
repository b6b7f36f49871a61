use glam::{ivec3, IVec3, Quat, Vec3};
use rtgi_gpu::{PixelFormat, DDGI_RAYS_PER_PROBE};

/// User-facing knobs of a single probe volume.
#[derive(Clone, Debug, PartialEq)]
pub struct DdgiVolumeSettings {
    /// Whether the volume gets updated and lights the scene.
    pub enabled: bool,

    /// Weight of this volume in the update round robin; volumes with higher
    /// priority get updated more often.
    pub update_priority: f32,

    /// When volumes overlap, the one with the lowest value lights the
    /// surface (ties broken by probe density).
    pub lighting_priority: i32,

    /// Distance over which the volume fades out towards its edges.
    pub blending_distance: f32,

    /// Distance from the volume's edges at which it has zero weight.
    pub blending_cutoff_distance: f32,

    /// Whether the volume keeps its probes frozen outside of the editor.
    pub runtime_static: bool,

    pub rays_per_probe: u32,
    pub probe_counts: IVec3,
    pub probe_max_ray_distance: f32,
    pub probe_history_weight: f32,
    pub probe_change_threshold: f32,
    pub probe_brightness_threshold: f32,
    pub relocation: DdgiProbeRelocation,

    /// Whether the volume follows its owner by scrolling probes instead of
    /// moving them.
    pub scroll_probes_infinitely: bool,

    pub probe_distance_exponent: f32,
    pub probe_irradiance_encoding_gamma: f32,
    pub view_bias: f32,
    pub normal_bias: f32,
    pub irradiance_scalar: f32,
    pub emissive_multiplier: f32,
    pub lighting_multiplier: f32,
    pub irradiance_bits: DdgiIrradianceBits,
    pub distance_bits: DdgiDistanceBits,
}

impl DdgiVolumeSettings {
    pub fn update_priority(&self) -> f32 {
        self.update_priority.clamp(0.0001, 100.0)
    }

    pub fn lighting_priority(&self) -> i32 {
        self.lighting_priority.clamp(0, 10)
    }

    /// Snaps the ray count to the closest supported one (rounding up).
    pub fn rays_per_probe(&self) -> u32 {
        DDGI_RAYS_PER_PROBE
            .iter()
            .copied()
            .find(|&rays| rays >= self.rays_per_probe)
            .unwrap_or(DDGI_RAYS_PER_PROBE[DDGI_RAYS_PER_PROBE.len() - 1])
    }

    pub fn probe_counts(&self) -> IVec3 {
        self.probe_counts.max(IVec3::ONE)
    }
}

impl Default for DdgiVolumeSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            update_priority: 1.0,
            lighting_priority: 0,
            blending_distance: 20.0,
            blending_cutoff_distance: 0.0,
            runtime_static: false,
            rays_per_probe: 288,
            probe_counts: ivec3(8, 8, 8),
            probe_max_ray_distance: 100000.0,
            probe_history_weight: 0.97,
            probe_change_threshold: 0.2,
            probe_brightness_threshold: 2.0,
            relocation: Default::default(),
            scroll_probes_infinitely: false,
            probe_distance_exponent: 50.0,
            probe_irradiance_encoding_gamma: 5.0,
            view_bias: 40.0,
            normal_bias: 10.0,
            irradiance_scalar: 1.0,
            emissive_multiplier: 1.0,
            lighting_multiplier: 1.0,
            irradiance_bits: Default::default(),
            distance_bits: Default::default(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DdgiProbeRelocation {
    pub enabled: bool,

    /// Closest a probe may sit to a front-facing surface.
    pub min_frontface_distance: f32,

    /// Fraction of back-face hits above which a probe counts as being
    /// inside of geometry.
    pub backface_threshold: f32,
}

impl Default for DdgiProbeRelocation {
    fn default() -> Self {
        Self {
            enabled: true,
            min_frontface_distance: 10.0,
            backface_threshold: 0.25,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DdgiIrradianceBits {
    #[default]
    N10,

    /// For bright lighting and extended luminance ranges.
    N32,
}

impl DdgiIrradianceBits {
    pub fn format(self) -> PixelFormat {
        match self {
            Self::N10 => PixelFormat::A2B10G10R10,
            Self::N32 => PixelFormat::A32B32G32R32F,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DdgiDistanceBits {
    #[default]
    N16,

    /// For larger distances.
    N32,
}

impl DdgiDistanceBits {
    pub fn format(self) -> PixelFormat {
        match self {
            Self::N16 => PixelFormat::G16R16F,
            Self::N32 => PixelFormat::G32R32F,
        }
    }
}

pub const DDGI_OFFSETS_FORMAT: PixelFormat = PixelFormat::A16B16G16R16;
pub const DDGI_STATES_FORMAT: PixelFormat = PixelFormat::R8Uint;

/// Transform of the actor owning a volume; a unit scale spans 200 world
/// units along each axis.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DdgiTransform {
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl DdgiTransform {
    pub fn from_translation(translation: Vec3) -> Self {
        Self {
            translation,
            ..Default::default()
        }
    }

    /// Size of the volume, in world units.
    pub fn volume_size(&self) -> Vec3 {
        self.scale * 200.0
    }

    /// Distance between neighboring probes.
    pub fn probe_spacing(&self, counts: IVec3) -> Vec3 {
        self.volume_size() / counts.max(IVec3::ONE).as_vec3()
    }

    /// Radius of the sphere bounding the volume.
    pub fn radius(&self) -> f32 {
        (self.scale * 100.0).length()
    }
}

impl Default for DdgiTransform {
    fn default() -> Self {
        Self {
            translation: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }
}

#[cfg(test)]
mod tests {
    use glam::vec3;

    use super::*;

    #[test]
    fn clamping() {
        let settings = DdgiVolumeSettings {
            update_priority: 1000.0,
            lighting_priority: -3,
            rays_per_probe: 300,
            probe_counts: ivec3(0, 4, 4),
            ..Default::default()
        };

        assert_eq!(100.0, settings.update_priority());
        assert_eq!(0, settings.lighting_priority());
        assert_eq!(432, settings.rays_per_probe());
        assert_eq!(ivec3(1, 4, 4), settings.probe_counts());

        let settings = DdgiVolumeSettings {
            rays_per_probe: 5000,
            ..Default::default()
        };

        assert_eq!(1008, settings.rays_per_probe());
    }

    #[test]
    fn spacing() {
        let transform = DdgiTransform {
            scale: vec3(1.0, 2.0, 4.0),
            ..Default::default()
        };

        assert_eq!(vec3(25.0, 50.0, 100.0), transform.probe_spacing(ivec3(8, 8, 8)));
        assert_eq!(vec3(100.0, 200.0, 400.0).length(), transform.radius());
    }
}
