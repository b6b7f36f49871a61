use glam::{IVec3, Quat, Vec3};
use log::{debug, trace};
use rtgi_gpu::{DdgiVolumeDesc, DDGI_DISTANCE_TEXELS, DDGI_IRRADIANCE_TEXELS};

use super::{
    load_probe_data, ArchiveError, DdgiLoadContext, DdgiTextureFormats,
    DdgiTextureHandles, DdgiTransform, DdgiVolumeSettings, DDGI_OFFSETS_FORMAT,
    DDGI_STATES_FORMAT,
};
use crate::HistoryArena;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DdgiSceneId(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DdgiVolumeId(pub u32);

/// A probe volume, as seen by its owner: settings, placement and the probe
/// data waiting to be loaded.
///
/// Rendering happens through the volume's proxy, which exists between
/// [`super::DdgiManager::create_render_state()`] and
/// [`super::DdgiManager::destroy_render_state()`].
#[derive(Debug)]
pub struct DdgiVolume {
    pub(super) scene: DdgiSceneId,
    pub(super) settings: DdgiVolumeSettings,
    pub(super) transform: DdgiTransform,

    /// Origin the scrolling grid is currently snapped to.
    pub(super) last_origin: Vec3,

    /// Whole grid cells scrolled so far.
    pub(super) scroll_offset: IVec3,

    pub(super) load_context: DdgiLoadContext,
    pub(super) proxy: Option<DdgiProxy>,

    /// Whether the proxy is behind on settings or placement.
    pub(super) dirty: bool,
}

impl DdgiVolume {
    pub(super) fn new(scene: DdgiSceneId, settings: DdgiVolumeSettings, transform: DdgiTransform) -> Self {
        Self {
            scene,
            settings,
            transform,
            last_origin: transform.translation,
            scroll_offset: IVec3::ZERO,
            load_context: Default::default(),
            proxy: None,
            dirty: true,
        }
    }

    pub fn set_settings(&mut self, settings: DdgiVolumeSettings) {
        self.settings = settings;
        self.dirty = true;
    }

    pub fn set_transform(&mut self, transform: DdgiTransform) {
        self.transform = transform;
        self.dirty = true;
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.settings.enabled = enabled;
        self.dirty = true;
    }

    /// Loads probe data saved by [`super::DdgiManager::save()`]; it gets
    /// copied into the probe textures once the proxy catches up.
    pub fn load(&mut self, data: &[u8]) -> Result<(), ArchiveError> {
        if let Some(context) = load_probe_data(data, self.formats())? {
            self.load_context = context;
            self.dirty = true;
        }

        Ok(())
    }

    pub fn scene(&self) -> DdgiSceneId {
        self.scene
    }

    pub fn settings(&self) -> &DdgiVolumeSettings {
        &self.settings
    }

    pub fn transform(&self) -> DdgiTransform {
        self.transform
    }

    pub fn scroll_offset(&self) -> IVec3 {
        self.scroll_offset
    }

    pub fn load_context(&self) -> &DdgiLoadContext {
        &self.load_context
    }

    pub fn has_render_state(&self) -> bool {
        self.proxy.is_some()
    }

    /// Data the proxy renders with, once it got any.
    pub fn render_data(&self) -> Option<&DdgiComponentData> {
        self.proxy.as_ref()?.data.as_ref()
    }

    pub fn formats(&self) -> DdgiTextureFormats {
        DdgiTextureFormats {
            irradiance: self.settings.irradiance_bits.format(),
            distance: self.settings.distance_bits.format(),
            offsets: DDGI_OFFSETS_FORMAT,
            states: DDGI_STATES_FORMAT,
        }
    }

    /// Snaps the scrolling grid to the owner's current position; a no-op
    /// until the owner moves by at least one probe spacing on some axis.
    pub(super) fn scroll(&mut self) {
        let spacing = self.transform.probe_spacing(self.settings.probe_counts());
        let delta = self.transform.translation - self.last_origin;

        if (delta.abs().cmpge(spacing)).any() {
            // truncated towards zero, so that the leftover stays behind
            let translation = (delta / spacing).trunc().as_ivec3();

            self.last_origin += translation.as_vec3() * spacing;
            self.scroll_offset += translation;
        }
    }

    /// Builds what the proxy gets to see.
    pub(super) fn component_data(&mut self) -> DdgiComponentData {
        let counts = self.settings.probe_counts();

        let (origin, rotation, scroll_offsets) = if self.settings.scroll_probes_infinitely {
            self.scroll();

            // offsets must stay positive while still telling apart the
            // laps, so they're centered around `i32::MAX / 2`
            let half = IVec3::splat(i32::MAX / 2) / counts * counts;

            (self.last_origin, Quat::IDENTITY, self.scroll_offset + half)
        } else {
            self.last_origin = self.transform.translation;

            (self.transform.translation, self.transform.rotation, IVec3::ZERO)
        };

        DdgiComponentData {
            settings: self.settings.clone(),
            origin,
            rotation,
            scale: self.transform.scale,
            scroll_offsets,
        }
    }

    /// Pushes the current settings and placement to the proxy.
    pub(super) fn update_render_data(&mut self, max_texture_size: u32) {
        if self.proxy.is_none() {
            return;
        }

        let data = self.component_data();

        if !data.fits(max_texture_size) {
            trace!(
                "Probe textures of {:?} would exceed {}; not updating",
                data.settings.probe_counts(),
                max_texture_size
            );

            return;
        }

        let load_context = self.load_context.ready.then(|| std::mem::take(&mut self.load_context));

        let Some(proxy) = &mut self.proxy else {
            return;
        };

        let needs_reallocate = proxy
            .data
            .as_ref()
            .map_or(true, |prev| prev.needs_reallocate(&data));

        if needs_reallocate {
            debug!(
                "Probe textures need reallocation; counts = {:?}, rays = {}",
                data.settings.probe_counts(),
                data.settings.rays_per_probe()
            );

            proxy.needs_reallocate = true;
        }

        proxy.data = Some(data);

        if let Some(load_context) = load_context {
            proxy.load_context = load_context;
        }
    }
}

/// Render-side state of a volume.
#[derive(Debug, Default)]
pub(super) struct DdgiProxy {
    pub data: Option<DdgiComponentData>,
    pub needs_reallocate: bool,
    pub textures: Option<DdgiTextureHandles>,
    pub load_context: DdgiLoadContext,

    /// Whether the probes have been reset and not updated since.
    pub reset: bool,

    pub probe_index_start: u32,
    pub probe_index_count: u32,
}

impl DdgiProxy {
    /// (Re)allocates textures when needed and copies pending probe data
    /// into them.
    pub fn prepare(&mut self, history: &mut HistoryArena) {
        let Some(data) = &self.data else {
            return;
        };

        let desc = data.desc();

        let textures_lost = self
            .textures
            .map_or(false, |textures| !textures.is_alive(history));

        if self.needs_reallocate || textures_lost {
            if let Some(textures) = self.textures.take() {
                textures.release(history);
            }

            self.textures = Some(DdgiTextureHandles::allocate(
                history,
                &desc,
                data.settings.irradiance_bits.format(),
                data.settings.distance_bits.format(),
            ));

            self.needs_reallocate = false;
            self.reset = true;
            self.probe_index_start = 0;
        }

        if self.load_context.ready {
            if let Some(textures) = &self.textures {
                textures.apply(history, &self.load_context);
                self.reset = false;
            }

            self.load_context = Default::default();
        }
    }

    pub fn release(&mut self, history: &mut HistoryArena) {
        if let Some(textures) = self.textures.take() {
            textures.release(history);
        }
    }
}

/// Snapshot of a volume's settings and placement, as rendered.
#[derive(Clone, Debug, PartialEq)]
pub struct DdgiComponentData {
    pub settings: DdgiVolumeSettings,
    pub origin: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,

    /// Positive scroll offsets; zero for volumes that don't scroll.
    pub scroll_offsets: IVec3,
}

impl DdgiComponentData {
    pub fn transform(&self) -> DdgiTransform {
        DdgiTransform {
            translation: self.origin,
            rotation: self.rotation,
            scale: self.scale,
        }
    }

    pub fn probe_count(&self) -> u32 {
        let counts = self.settings.probe_counts();

        (counts.x * counts.y * counts.z) as u32
    }

    /// Probes per cubic world unit.
    pub fn probe_density(&self) -> f32 {
        let size = self.transform().volume_size();

        self.probe_count() as f32 / (size.x * size.y * size.z).abs().max(f32::EPSILON)
    }

    /// Whether all the probe textures fit within given texture size.
    pub fn fits(&self, max_texture_size: u32) -> bool {
        if self.probe_count() > max_texture_size {
            return false;
        }

        let desc = self.desc();

        [DDGI_IRRADIANCE_TEXELS, DDGI_DISTANCE_TEXELS]
            .into_iter()
            .map(|texels| desc.atlas_size(texels))
            .all(|size| size.x <= max_texture_size && size.y <= max_texture_size)
    }

    /// Whether switching from `self` to `other` requires new textures.
    pub fn needs_reallocate(&self, other: &Self) -> bool {
        self.settings.probe_counts() != other.settings.probe_counts()
            || self.settings.rays_per_probe() != other.settings.rays_per_probe()
            || self.settings.relocation.enabled != other.settings.relocation.enabled
            || self.settings.irradiance_bits != other.settings.irradiance_bits
            || self.settings.distance_bits != other.settings.distance_bits
    }

    /// Descriptor for the probe kernels, without the per-update fields
    /// (ray rotation, budget window).
    pub fn desc(&self) -> DdgiVolumeDesc {
        let settings = &self.settings;
        let counts = settings.probe_counts();

        let flags = [
            (settings.relocation.enabled, DdgiVolumeDesc::FLAG_RELOCATION),
            (settings.scroll_probes_infinitely, DdgiVolumeDesc::FLAG_SCROLLING),
            (true, DdgiVolumeDesc::FLAG_CLASSIFICATION),
        ]
        .into_iter()
        .filter(|(enabled, _)| *enabled)
        .fold(0, |flags, (_, flag)| flags | flag);

        DdgiVolumeDesc {
            origin: self.origin,
            rays_per_probe: settings.rays_per_probe(),
            rotation: self.rotation.to_array(),
            spacing: self.transform().probe_spacing(counts),
            max_ray_distance: settings.probe_max_ray_distance,
            counts,
            distance_exponent: settings.probe_distance_exponent,
            hysteresis: settings.probe_history_weight,
            change_threshold: settings.probe_change_threshold,
            brightness_threshold: settings.probe_brightness_threshold,
            irradiance_gamma: settings.probe_irradiance_encoding_gamma,
            normal_bias: settings.normal_bias,
            view_bias: settings.view_bias,
            blend_distance: settings.blending_distance,
            blend_cutoff: settings.blending_cutoff_distance,
            scroll_offsets: self.scroll_offsets,
            backface_threshold: settings.relocation.backface_threshold,
            min_frontface_distance: settings.relocation.min_frontface_distance,
            flags,
            ray_rotation: Quat::IDENTITY.to_array(),
            probe_index_start: 0,
            probe_index_count: self.probe_count(),
            _pad: [0; 2],
        }
    }
}

#[cfg(test)]
mod tests {
    use glam::{ivec3, vec3};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    use super::*;

    fn scrolling() -> DdgiVolume {
        DdgiVolume::new(
            DdgiSceneId(0),
            DdgiVolumeSettings {
                scroll_probes_infinitely: true,
                ..Default::default()
            },
            DdgiTransform::default(),
        )
    }

    #[test]
    fn scrolling_by_whole_cells() {
        let mut volume = scrolling();

        // spacing is 25 units along every axis
        volume.transform.translation = vec3(24.0, 0.0, 0.0);
        volume.component_data();

        assert_eq!(IVec3::ZERO, volume.scroll_offset);

        volume.transform.translation = vec3(25.0, -50.0, 80.0);

        let data = volume.component_data();

        assert_eq!(ivec3(1, -2, 3), volume.scroll_offset);
        assert_eq!(vec3(25.0, -50.0, 75.0), data.origin);

        // the leftover 5 units keep accumulating
        volume.transform.translation = vec3(25.0, -50.0, 99.0);
        volume.component_data();

        assert_eq!(ivec3(1, -2, 3), volume.scroll_offset);

        volume.transform.translation = vec3(25.0, -50.0, 100.0);
        volume.component_data();

        assert_eq!(ivec3(1, -2, 4), volume.scroll_offset);
    }

    #[test]
    fn scroll_offsets_survive_long_walks() {
        let mut volume = scrolling();
        let mut rng = StdRng::seed_from_u64(42);
        let mut expected = IVec3::ZERO;

        for _ in 0..10_000 {
            let axis = rng.gen_range(0..3);
            let step = if rng.gen() { 1 } else { -1 };

            expected[axis] += step;
            volume.transform.translation[axis] += step as f32 * 25.0;

            let data = volume.component_data();

            assert_eq!(expected, volume.scroll_offset);

            let wrapped = data.scroll_offsets % volume.settings.probe_counts();

            assert!(data.scroll_offsets.cmpge(IVec3::ZERO).all());
            assert!(wrapped.cmpge(IVec3::ZERO).all());
            assert!(wrapped.cmplt(volume.settings.probe_counts()).all());

            assert_eq!(
                ivec3(
                    expected.x.rem_euclid(8),
                    expected.y.rem_euclid(8),
                    expected.z.rem_euclid(8),
                ),
                wrapped
            );
        }
    }

    #[test]
    fn static_volumes_follow_their_owner() {
        let mut volume = DdgiVolume::new(DdgiSceneId(0), Default::default(), Default::default());

        volume.transform.translation = vec3(3.0, 4.0, 5.0);

        let data = volume.component_data();

        assert_eq!(vec3(3.0, 4.0, 5.0), data.origin);
        assert_eq!(IVec3::ZERO, data.scroll_offsets);
        assert_eq!(IVec3::ZERO, volume.scroll_offset);
    }

    #[test]
    fn texture_size_guard() {
        let mut volume = DdgiVolume::new(DdgiSceneId(0), Default::default(), Default::default());
        let data = volume.component_data();

        // 64 x 8 probes; distance atlas is 1024 x 128 texels
        assert!(data.fits(1024));
        assert!(!data.fits(1023));

        volume.settings.probe_counts = ivec3(1, 40, 40);

        assert!(!volume.component_data().fits(1024));
    }

    #[test]
    fn reallocation() {
        let mut volume = DdgiVolume::new(DdgiSceneId(0), Default::default(), Default::default());
        let data = volume.component_data();

        volume.settings.probe_history_weight = 0.5;
        volume.transform.translation = Vec3::ONE;

        assert!(!data.needs_reallocate(&volume.component_data()));

        volume.settings.rays_per_probe = 144;

        assert!(data.needs_reallocate(&volume.component_data()));

        volume.settings.rays_per_probe = 288;
        volume.settings.relocation.enabled = false;

        assert!(data.needs_reallocate(&volume.component_data()));
    }
}
