use std::f32::consts::PI;

use fxhash::FxHashMap;
use glam::Quat;
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rtgi_gpu::{DdgiVolumeDesc, DDGI_MAX_SHADING_VOLUMES};

use super::{
    save_probe_data, DdgiArchiveVersion, DdgiProxy, DdgiSceneId, DdgiTextureHandles,
    DdgiTransform, DdgiVolume, DdgiVolumeId, DdgiVolumeSettings,
};
use crate::{DdgiConfig, GiView, HistoryArena};

/// Golden ratio conjugate; advancing by it spreads the round robin evenly.
const ROUND_ROBIN_STEP: f32 = 0.618_034;

/// Owns every probe volume, schedules their updates and picks the ones that
/// get to light a view.
#[derive(Debug, Default)]
pub struct DdgiManager {
    volumes: FxHashMap<DdgiVolumeId, DdgiVolume>,
    round_robin: FxHashMap<DdgiSceneId, f32>,
    next_id: u32,
}

/// A volume picked for this frame's probe update.
#[derive(Clone, Debug)]
pub struct DdgiUpdate {
    pub id: DdgiVolumeId,

    /// Descriptor with this update's budget window and ray rotation.
    pub desc: DdgiVolumeDesc,

    pub settings: DdgiVolumeSettings,
    pub textures: DdgiTextureHandles,

    /// Whether the probes got (re)allocated and this is their first update.
    pub reset: bool,
}

/// A volume picked for lighting a view.
#[derive(Clone, Debug)]
pub struct DdgiShadingVolume {
    pub id: DdgiVolumeId,
    pub desc: DdgiVolumeDesc,
    pub irradiance_scalar: f32,
    pub textures: DdgiTextureHandles,
}

impl DdgiManager {
    pub fn add_volume(
        &mut self,
        scene: DdgiSceneId,
        settings: DdgiVolumeSettings,
        transform: DdgiTransform,
    ) -> DdgiVolumeId {
        let id = DdgiVolumeId(self.next_id);

        self.next_id += 1;

        info!(
            "Creating DDGI volume: {:?} (scene = {:?}, counts = {:?})",
            id,
            scene,
            settings.probe_counts()
        );

        let mut volume = DdgiVolume::new(scene, settings, transform);

        volume.proxy = Some(DdgiProxy::default());

        self.volumes.insert(id, volume);

        id
    }

    pub fn remove_volume(&mut self, id: DdgiVolumeId, history: &mut HistoryArena) -> Option<DdgiVolume> {
        let mut volume = self.volumes.remove(&id)?;

        info!("Deleting DDGI volume: {:?}", id);

        if let Some(mut proxy) = volume.proxy.take() {
            proxy.release(history);
        }

        Some(volume)
    }

    pub fn volume(&self, id: DdgiVolumeId) -> Option<&DdgiVolume> {
        self.volumes.get(&id)
    }

    pub fn volume_mut(&mut self, id: DdgiVolumeId) -> Option<&mut DdgiVolume> {
        self.volumes.get_mut(&id)
    }

    pub fn volumes(&self) -> impl Iterator<Item = (DdgiVolumeId, &DdgiVolume)> + '_ {
        self.volumes.iter().map(|(id, volume)| (*id, volume))
    }

    pub fn len(&self) -> usize {
        self.volumes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.volumes.is_empty()
    }

    /// Brings back the proxy of a volume after
    /// [`Self::destroy_render_state()`]; probe data kept by the volume gets
    /// restored during the next [`Self::prepare()`].
    pub fn create_render_state(&mut self, id: DdgiVolumeId) {
        let Some(volume) = self.volumes.get_mut(&id) else {
            return;
        };

        if volume.proxy.is_none() {
            debug!("Creating render state of DDGI volume {:?}", id);

            volume.proxy = Some(DdgiProxy::default());
            volume.dirty = true;
        }
    }

    /// Drops the proxy (and its textures) of a volume, keeping its probe
    /// data around on the volume so that a recreated proxy starts from it.
    pub fn destroy_render_state(&mut self, id: DdgiVolumeId, history: &mut HistoryArena) {
        let Some(volume) = self.volumes.get_mut(&id) else {
            return;
        };

        let Some(mut proxy) = volume.proxy.take() else {
            return;
        };

        debug!("Destroying render state of DDGI volume {:?}", id);

        if !volume.load_context.ready {
            if proxy.load_context.ready {
                // never got applied; hand it back
                volume.load_context = std::mem::take(&mut proxy.load_context);
            } else if let Some(textures) = &proxy.textures {
                volume.load_context = textures.read_back(history);
            }
        }

        proxy.release(history);
    }

    /// Serializes probe data of given volume; returns `None` for unknown
    /// volumes.
    pub fn save(
        &self,
        id: DdgiVolumeId,
        history: &HistoryArena,
        version: DdgiArchiveVersion,
    ) -> Option<Vec<u8>> {
        let volume = self.volumes.get(&id)?;

        let context = match &volume.proxy {
            Some(proxy) if proxy.load_context.ready => proxy.load_context.clone(),

            Some(DdgiProxy {
                textures: Some(textures),
                ..
            }) if !volume.load_context.ready && textures.is_alive(history) => {
                textures.read_back(history)
            }

            _ => volume.load_context.clone(),
        };

        Some(save_probe_data(&context, version, context.ready))
    }

    /// Pushes pending volume changes to their proxies and (re)allocates
    /// probe textures; must run before [`Self::schedule()`] and
    /// [`Self::shading_volumes()`].
    pub fn prepare(&mut self, config: &DdgiConfig, history: &mut HistoryArena) {
        for volume in self.volumes.values_mut() {
            if volume.dirty {
                volume.update_render_data(config.max_texture_size);
                volume.dirty = false;
            }

            if let Some(proxy) = &mut volume.proxy {
                proxy.prepare(history);
            }
        }
    }

    /// Picks the volume of given scene that gets its probes updated this
    /// frame.
    ///
    /// Every call advances the scene's round robin value by the golden ratio
    /// conjugate; the volume whose cumulative update priority it lands on
    /// wins, so that over time each volume gets picked proportionally to its
    /// priority.
    pub fn schedule(
        &mut self,
        config: &DdgiConfig,
        scene: DdgiSceneId,
        seed: u32,
    ) -> Option<DdgiUpdate> {
        let mut candidates: Vec<_> = self
            .volumes
            .iter()
            .filter(|(_, volume)| {
                volume.scene == scene
                    && volume.settings.enabled
                    && !(config.runtime && volume.settings.runtime_static)
            })
            .filter(|(_, volume)| {
                volume.proxy.as_ref().map_or(false, |proxy| {
                    proxy.data.is_some() && proxy.textures.is_some()
                })
            })
            .map(|(id, volume)| (*id, volume.settings.update_priority()))
            .collect();

        if candidates.is_empty() {
            return None;
        }

        candidates.sort_by_key(|(id, _)| *id);

        let total: f32 = candidates.iter().map(|(_, priority)| priority).sum();
        let value = self.round_robin.entry(scene).or_default();

        *value += ROUND_ROBIN_STEP;
        *value -= value.floor();

        let mut desired = total * *value;
        let mut picked = candidates[candidates.len() - 1].0;

        for (id, priority) in &candidates {
            desired -= priority;

            if desired <= 0.0 {
                picked = *id;
                break;
            }
        }

        let volume = self.volumes.get_mut(&picked)?;
        let proxy = volume.proxy.as_mut()?;
        let data = proxy.data.as_ref()?;
        let textures = proxy.textures?;
        let mut desc = data.desc();
        let probe_count = desc.probe_count();

        if config.probe_update_ray_budget == 0 || probe_count == 0 {
            proxy.probe_index_start = 0;
            proxy.probe_index_count = probe_count;
        } else {
            let budget = config.probe_update_ray_budget / desc.rays_per_probe;

            proxy.probe_index_start %= probe_count;
            proxy.probe_index_count = budget.clamp(1, probe_count);
        }

        desc.probe_index_start = proxy.probe_index_start;
        desc.probe_index_count = proxy.probe_index_count;
        desc.ray_rotation = random_rotation(seed, picked).to_array();

        if probe_count > 0 {
            proxy.probe_index_start = (proxy.probe_index_start + proxy.probe_index_count) % probe_count;
        }

        let reset = std::mem::take(&mut proxy.reset);

        debug!(
            "Updating DDGI volume {:?}; probes = {}..+{} of {}, reset = {}",
            picked, desc.probe_index_start, desc.probe_index_count, probe_count, reset
        );

        Some(DdgiUpdate {
            id: picked,
            desc,
            settings: data.settings.clone(),
            textures,
            reset,
        })
    }

    /// Volumes lighting given view, most important first.
    pub fn shading_volumes(&self, scene: DdgiSceneId, view: &GiView) -> Vec<DdgiShadingVolume> {
        let mut volumes: Vec<_> = self
            .volumes
            .iter()
            .filter(|(_, volume)| volume.scene == scene && volume.settings.enabled)
            .filter_map(|(id, volume)| {
                let proxy = volume.proxy.as_ref()?;
                let data = proxy.data.as_ref()?;
                let textures = proxy.textures?;

                if !data.settings.enabled {
                    return None;
                }

                let transform = data.transform();

                if !view.contains_sphere(transform.translation, transform.radius()) {
                    return None;
                }

                Some((*id, data, textures))
            })
            .collect();

        volumes.sort_by(|(id_a, a, _), (id_b, b, _)| {
            a.settings
                .lighting_priority()
                .cmp(&b.settings.lighting_priority())
                .then_with(|| b.probe_density().total_cmp(&a.probe_density()))
                .then_with(|| id_a.cmp(id_b))
        });

        if volumes.len() > DDGI_MAX_SHADING_VOLUMES {
            warn!(
                "{} DDGI volumes intersect the view; only {} get shaded",
                volumes.len(),
                DDGI_MAX_SHADING_VOLUMES
            );

            volumes.truncate(DDGI_MAX_SHADING_VOLUMES);
        }

        volumes
            .into_iter()
            .map(|(id, data, textures)| DdgiShadingVolume {
                id,
                desc: data.desc(),
                irradiance_scalar: data.settings.irradiance_scalar,
                textures,
            })
            .collect()
    }
}

/// Uniformly distributed rotation (Shoemake's method), so that consecutive
/// updates shoot their rays in different directions.
fn random_rotation(seed: u32, id: DdgiVolumeId) -> Quat {
    let mut rng = StdRng::seed_from_u64(((seed as u64) << 32) | id.0 as u64);

    let u1: f32 = rng.gen();
    let u2: f32 = rng.gen();
    let u3: f32 = rng.gen();

    let a = (1.0 - u1).sqrt();
    let b = u1.sqrt();

    Quat::from_xyzw(
        a * (2.0 * PI * u2).sin(),
        a * (2.0 * PI * u2).cos(),
        b * (2.0 * PI * u3).sin(),
        b * (2.0 * PI * u3).cos(),
    )
    .normalize()
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use glam::{ivec3, uvec2, vec3, Vec3};

    use super::*;
    use crate::{DdgiLoadContext, ProbeTexture};

    fn config() -> DdgiConfig {
        DdgiConfig::default()
    }

    fn manager_with(priorities: &[f32]) -> (DdgiManager, HistoryArena, Vec<DdgiVolumeId>) {
        let mut manager = DdgiManager::default();
        let mut history = HistoryArena::default();

        let ids = priorities
            .iter()
            .map(|&update_priority| {
                manager.add_volume(
                    DdgiSceneId(0),
                    DdgiVolumeSettings {
                        update_priority,
                        probe_counts: ivec3(2, 2, 2),
                        ..Default::default()
                    },
                    Default::default(),
                )
            })
            .collect();

        manager.prepare(&config(), &mut history);

        (manager, history, ids)
    }

    #[test]
    fn round_robin_follows_update_priorities() {
        let (mut manager, _history, ids) = manager_with(&[1.0, 2.0, 1.0]);
        let mut picks = FxHashMap::default();

        for frame in 0..10_000 {
            let update = manager.schedule(&config(), DdgiSceneId(0), frame).unwrap();

            *picks.entry(update.id).or_insert(0) += 1;
        }

        let share = |id| picks.get(&id).copied().unwrap_or(0) as f32 / 10_000.0;

        assert_relative_eq!(0.25, share(ids[0]), epsilon = 0.01);
        assert_relative_eq!(0.50, share(ids[1]), epsilon = 0.01);
        assert_relative_eq!(0.25, share(ids[2]), epsilon = 0.01);
    }

    #[test]
    fn round_robin_skips_volumes_that_dont_update() {
        let (mut manager, mut history, ids) = manager_with(&[1.0, 1.0, 1.0, 1.0]);

        manager.volume_mut(ids[0]).unwrap().set_enabled(false);

        let mut settings = manager.volume(ids[1]).unwrap().settings().clone();

        settings.runtime_static = true;
        manager.volume_mut(ids[1]).unwrap().set_settings(settings);

        let other_scene = manager.add_volume(DdgiSceneId(1), Default::default(), Default::default());

        manager.prepare(&config(), &mut history);

        for frame in 0..100 {
            let update = manager.schedule(&config(), DdgiSceneId(0), frame).unwrap();

            assert!(update.id == ids[2] || update.id == ids[3], "{:?}", update.id);
        }

        // runtime-static volumes still get updated in the editor
        let editor = DdgiConfig {
            runtime: false,
            ..config()
        };

        let picked_static = (0..100)
            .filter_map(|frame| manager.schedule(&editor, DdgiSceneId(0), frame))
            .any(|update| update.id == ids[1]);

        assert!(picked_static);

        let update = manager.schedule(&config(), DdgiSceneId(1), 0).unwrap();

        assert_eq!(other_scene, update.id);
        assert!(manager.schedule(&config(), DdgiSceneId(2), 0).is_none());
    }

    #[test]
    fn budget_windows_cycle_through_probes() {
        let (mut manager, _history, _) = manager_with(&[1.0]);

        // whole volume when there's no budget
        let update = manager.schedule(&config(), DdgiSceneId(0), 0).unwrap();

        assert_eq!(0, update.desc.probe_index_start);
        assert_eq!(8, update.desc.probe_index_count);
        assert!(update.reset);

        let config = DdgiConfig {
            probe_update_ray_budget: 3 * 288,
            ..config()
        };

        let windows: Vec<_> = (0..4)
            .map(|frame| {
                let update = manager.schedule(&config, DdgiSceneId(0), frame).unwrap();

                assert!(!update.reset);

                (update.desc.probe_index_start, update.desc.probe_index_count)
            })
            .collect();

        assert_eq!(vec![(0, 3), (3, 3), (6, 3), (1, 3)], windows);

        // always at least one probe
        let config = DdgiConfig {
            probe_update_ray_budget: 1,
            ..config
        };

        let update = manager.schedule(&config, DdgiSceneId(0), 0).unwrap();

        assert_eq!(1, update.desc.probe_index_count);
    }

    #[test]
    fn ray_rotation_changes_between_updates() {
        let (mut manager, _history, _) = manager_with(&[1.0]);

        let a = manager.schedule(&config(), DdgiSceneId(0), 1).unwrap();
        let b = manager.schedule(&config(), DdgiSceneId(0), 2).unwrap();

        assert_ne!(a.desc.ray_rotation, b.desc.ray_rotation);
        assert_relative_eq!(1.0, Quat::from_array(a.desc.ray_rotation).length(), epsilon = 1e-5);
    }

    #[test]
    fn structural_changes_reallocate_textures() {
        let (mut manager, mut history, ids) = manager_with(&[1.0]);
        let id = ids[0];

        let textures = manager.schedule(&config(), DdgiSceneId(0), 0).unwrap().textures;

        let mut settings = manager.volume(id).unwrap().settings().clone();

        settings.probe_history_weight = 0.5;
        settings.lighting_multiplier = 2.0;
        manager.volume_mut(id).unwrap().set_settings(settings.clone());
        manager.prepare(&config(), &mut history);

        let update = manager.schedule(&config(), DdgiSceneId(0), 1).unwrap();

        assert_eq!(textures.irradiance, update.textures.irradiance);
        assert_relative_eq!(0.5, update.desc.hysteresis);
        assert!(!update.reset);

        settings.probe_counts = ivec3(4, 2, 2);
        manager.volume_mut(id).unwrap().set_settings(settings);
        manager.prepare(&config(), &mut history);

        let update = manager.schedule(&config(), DdgiSceneId(0), 2).unwrap();

        assert_ne!(textures.irradiance, update.textures.irradiance);
        assert!(!history.contains(textures.irradiance.id()));
        assert!(update.reset);
        assert_eq!(16, update.desc.probe_count());
    }

    #[test]
    fn oversized_volumes_are_skipped() {
        let mut manager = DdgiManager::default();
        let mut history = HistoryArena::default();

        manager.add_volume(
            DdgiSceneId(0),
            DdgiVolumeSettings {
                probe_counts: ivec3(64, 64, 64),
                ..Default::default()
            },
            Default::default(),
        );

        manager.prepare(&config(), &mut history);

        assert!(manager.schedule(&config(), DdgiSceneId(0), 0).is_none());
        assert!(history.is_empty());
    }

    #[test]
    fn shading_volumes_are_ordered() {
        let mut manager = DdgiManager::default();
        let mut history = HistoryArena::default();

        let volume = |manager: &mut DdgiManager, lighting_priority, counts, x| {
            manager.add_volume(
                DdgiSceneId(0),
                DdgiVolumeSettings {
                    lighting_priority,
                    probe_counts: counts,
                    ..Default::default()
                },
                DdgiTransform::from_translation(vec3(x, 0.0, -300.0)),
            )
        };

        let sparse = volume(&mut manager, 0, ivec3(2, 2, 2), 0.0);
        let dense = volume(&mut manager, 0, ivec3(4, 4, 4), 0.0);
        let background = volume(&mut manager, 1, ivec3(8, 8, 8), 0.0);
        let behind = volume(&mut manager, 0, ivec3(2, 2, 2), 0.0);

        manager
            .volume_mut(behind)
            .unwrap()
            .set_transform(DdgiTransform::from_translation(vec3(0.0, 0.0, 5000.0)));

        manager.prepare(&config(), &mut history);

        let view = GiView::new(uvec2(64, 64), Vec3::ZERO, -Vec3::Z);

        let ids: Vec<_> = manager
            .shading_volumes(DdgiSceneId(0), &view)
            .into_iter()
            .map(|volume| volume.id)
            .collect();

        assert_eq!(vec![dense, sparse, background], ids);

        for i in 0..20 {
            volume(&mut manager, 5, ivec3(2, 2, 2), i as f32);
        }

        manager.prepare(&config(), &mut history);

        assert_eq!(
            DDGI_MAX_SHADING_VOLUMES,
            manager.shading_volumes(DdgiSceneId(0), &view).len()
        );
    }

    fn paint(history: &HistoryArena, textures: &DdgiTextureHandles, value: u8) {
        let mut irradiance = history.get_mut(textures.irradiance).unwrap();
        let size = irradiance.size();
        let format = irradiance.format();
        let mut painted = ProbeTexture::new(size, format).read_back();

        painted.pixels.fill(value);
        irradiance.write_pixels(&painted);
    }

    #[test]
    fn probe_data_survives_render_state_recreation() {
        let (mut manager, mut history, ids) = manager_with(&[1.0]);
        let id = ids[0];
        let textures = manager.schedule(&config(), DdgiSceneId(0), 0).unwrap().textures;

        paint(&history, &textures, 7);

        manager.destroy_render_state(id, &mut history);

        assert!(!history.contains(textures.irradiance.id()));
        assert!(manager.volume(id).unwrap().load_context().ready);

        manager.create_render_state(id);
        manager.prepare(&config(), &mut history);

        let update = manager.schedule(&config(), DdgiSceneId(0), 1).unwrap();
        let irradiance = history.get(update.textures.irradiance).unwrap();

        assert!(irradiance.data().iter().all(|&b| b == 7));
        assert!(!update.reset);
        assert!(!manager.volume(id).unwrap().load_context().ready);
    }

    #[test]
    fn save_and_load() {
        let (mut manager, mut history, ids) = manager_with(&[1.0]);
        let id = ids[0];
        let textures = manager.schedule(&config(), DdgiSceneId(0), 0).unwrap().textures;

        paint(&history, &textures, 42);

        let data = manager
            .save(id, &history, DdgiArchiveVersion::LATEST)
            .unwrap();

        let volume = manager.add_volume(
            DdgiSceneId(0),
            manager.volume(id).unwrap().settings().clone(),
            Default::default(),
        );

        manager.volume_mut(volume).unwrap().load(&data).unwrap();
        manager.prepare(&config(), &mut history);

        let textures = manager
            .shading_volumes(DdgiSceneId(0), &GiView::new(uvec2(8, 8), vec3(0.0, 0.0, 500.0), -Vec3::Z))
            .into_iter()
            .find(|shading| shading.id == volume)
            .unwrap()
            .textures;

        assert!(history
            .get(textures.irradiance)
            .unwrap()
            .data()
            .iter()
            .all(|&b| b == 42));

        // a volume that never rendered saves whatever it got loaded with
        let mut idle = DdgiManager::default();
        let idle_id = idle.add_volume(DdgiSceneId(0), Default::default(), Default::default());

        idle.destroy_render_state(idle_id, &mut history);

        let data = idle.save(idle_id, &history, DdgiArchiveVersion::LATEST).unwrap();

        idle.volume_mut(idle_id).unwrap().load(&data).unwrap();

        assert_eq!(&DdgiLoadContext::default(), idle.volume(idle_id).unwrap().load_context());
    }
}
