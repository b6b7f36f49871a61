use std::cmp::Ordering;

use fxhash::FxHashMap;
use glam::Vec3;
use log::debug;
use rtgi_gpu::{LightRecord, LightType, LightsView};

use crate::{GiView, Light, LightingConfig};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LightHandle(pub u32);

/// Lights of the scene, keyed by the host's handles.
#[derive(Clone, Debug, Default)]
pub struct Lights {
    lights: Vec<(LightHandle, Light)>,
    index: FxHashMap<LightHandle, usize>,
}

impl Lights {
    pub fn add(&mut self, handle: LightHandle, light: Light) {
        if let Some(&idx) = self.index.get(&handle) {
            self.lights[idx].1 = light;
        } else {
            self.index.insert(handle, self.lights.len());
            self.lights.push((handle, light));
        }
    }

    pub fn remove(&mut self, handle: LightHandle) -> Option<Light> {
        let idx = self.index.remove(&handle)?;
        let (_, light) = self.lights.swap_remove(idx);

        if let Some((moved, _)) = self.lights.get(idx) {
            self.index.insert(*moved, idx);
        }

        Some(light)
    }

    pub fn get(&self, handle: LightHandle) -> Option<&Light> {
        self.index.get(&handle).map(|&idx| &self.lights[idx].1)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Light> + '_ {
        self.lights.iter().map(|(_, light)| light)
    }

    pub fn len(&self) -> usize {
        self.lights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lights.is_empty()
    }
}

/// Flat, upload-ready array of the lights affecting GI this frame.
///
/// Infinite lights come first, so that [`Self::infinite_count`] describes a
/// prefix of the array.
#[derive(Clone, Debug)]
pub struct ExtractedLights {
    records: Vec<LightRecord>,
    count: u32,
    infinite_count: u32,
    bound_min: Vec3,
    bound_max: Vec3,
    power_cdf: Vec<f32>,
}

impl ExtractedLights {
    /// Records to upload; never empty, even when there are no lights.
    pub fn records(&self) -> &[LightRecord] {
        &self.records
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn infinite_count(&self) -> u32 {
        self.infinite_count
    }

    pub fn finite_count(&self) -> u32 {
        self.count - self.infinite_count
    }

    /// Bounds of all finite lights.
    pub fn bound(&self) -> (Vec3, Vec3) {
        (self.bound_min, self.bound_max)
    }

    pub fn bound_radius(&self) -> f32 {
        ((self.bound_max - self.bound_min) * 0.5).length()
    }

    /// Inclusive prefix sum of light intensities.
    pub fn power_cdf(&self) -> &[f32] {
        &self.power_cdf
    }

    pub fn view(&self) -> LightsView<'_> {
        LightsView::new(&self.records, self.count, self.infinite_count)
    }
}

/// Collects scene lights into [`ExtractedLights`], ranking them when there's
/// more than the pipeline accepts.
pub struct LightExtractor<'a> {
    config: &'a LightingConfig,
    lights: &'a Lights,
}

impl<'a> LightExtractor<'a> {
    pub fn new(config: &'a LightingConfig, lights: &'a Lights) -> Self {
        Self { config, lights }
    }

    pub fn extract(&self, view: &GiView) -> ExtractedLights {
        let mut lights: Vec<Ranked> = self
            .lights
            .iter()
            .filter(|light| self.is_accepted(light))
            .map(|light| Ranked {
                influence: self.influence(light, view),
                record: light.serialize(),
            })
            .collect();

        if lights.len() > self.config.max_lights {
            debug!(
                "Ranking lights; candidates = {}, max = {}",
                lights.len(),
                self.config.max_lights
            );

            lights.sort_by(|a, b| b.influence.total_cmp(&a.influence));
            lights.truncate(self.config.max_lights);
        }

        for light in lights.iter_mut().skip(self.config.max_shadow_lights) {
            light.record.flags &= !LightRecord::FLAG_CASTS_SHADOW;
        }

        lights.sort_by(Ranked::order);

        let mut records: Vec<_> = lights.into_iter().map(|light| light.record).collect();
        let count = records.len() as u32;
        let infinite_count = records.iter().take_while(|r| r.is_infinite()).count() as u32;

        let (bound_min, bound_max) = records
            .iter()
            .filter(|r| !r.is_infinite())
            .fold(None, |bound: Option<(Vec3, Vec3)>, r| {
                Some(match bound {
                    Some((min, max)) => (min.min(r.bound_min), max.max(r.bound_max)),
                    None => (r.bound_min, r.bound_max),
                })
            })
            .unwrap_or_default();

        let power_cdf = records
            .iter()
            .scan(0.0, |acc, r| {
                *acc += r.intensity();
                Some(*acc)
            })
            .collect();

        if records.is_empty() {
            records.push(LightRecord::default());
        }

        ExtractedLights {
            records,
            count,
            infinite_count,
            bound_min,
            bound_max,
            power_cdf,
        }
    }

    fn is_accepted(&self, light: &Light) -> bool {
        if light.has_static_lighting || !light.affects_gi {
            return false;
        }

        match light.light_type() {
            LightType::Sky => self.config.sky,
            LightType::Directional => self.config.directional,
            LightType::Point => self.config.point,
            LightType::Spot => self.config.spot,
            LightType::Rect => self.config.rect,
        }
    }

    /// How much given light is expected to matter for given view; infinite
    /// lights always win.
    fn influence(&self, light: &Light, view: &GiView) -> f32 {
        let Some((position, radius)) = light.sphere() else {
            return f32::INFINITY;
        };

        let config = self.config;
        let luminance = light.luminance().ln_1p().powf(config.luminance_power);

        let to_light = position - view.position;
        let distance = to_light.length();

        let distance_term =
            1.0 / (1.0 + distance.ln_1p().powf(config.distance_power));

        let cos = view.forward.dot(to_light.normalize_or_zero());

        let direction_term = if cos >= 0.0 {
            1.0 + config.ahead_boost * cos.abs()
        } else {
            1.0 + config.behind_boost * cos.abs()
        };

        let frustum_term = if view.contains_sphere(position, radius) {
            1.0 + config.frustum_boost
        } else {
            1.0
        };

        distance_term * luminance * direction_term * frustum_term
    }
}

struct Ranked {
    influence: f32,
    record: LightRecord,
}

impl Ranked {
    /// Sky first, then the other infinite lights, then lights casting
    /// shadows, then by type and influence.
    fn order(a: &Self, b: &Self) -> Ordering {
        let key = |r: &Self| {
            (
                !r.record.is_infinite(),
                r.record.light_type() != LightType::Sky,
                !r.record.casts_shadow(),
                r.record.light_type(),
            )
        };

        key(a)
            .cmp(&key(b))
            .then_with(|| b.influence.total_cmp(&a.influence))
    }
}
