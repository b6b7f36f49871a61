//! Building blocks shared by the ReSTIR GI kernels.

use rtgi_gpu::prelude::*;

use crate::shading::{hit_normal, shade_hit, HitRadiance};

/// Upper limit of neighbors merged by a single resampling step.
pub const MAX_NEIGHBORS: usize = 32;

/// A reservoir coming from another pixel (or frame), along with the surface
/// it was resampled for.
#[derive(Clone, Copy, Debug, Default)]
pub struct Neighbor {
    pub reservoir: GiReservoir,
    pub surface: GBufferEntry,
}

pub fn reservoir_dim(params: &RestirPassParams) -> ReservoirBufferDim {
    ReservoirBufferDim::new(params.padded_size, params.slices)
}

pub fn history_dim(params: &RestirPassParams) -> ReservoirBufferDim {
    ReservoirBufferDim::new(params.padded_size, params.history_slices)
}

pub fn noise(params: &RestirPassParams, pixel: UVec2, pass: u32) -> WhiteNoise {
    let seed = params
        .seed
        .wrapping_add(params.slice_out.wrapping_mul(0x9e37_79b9))
        .wrapping_add(pass.wrapping_mul(0x85eb_ca6b));

    WhiteNoise::new(seed, pixel)
}

/// Index of the light-cut tile given pixel belongs to.
pub fn cut_tile(params: &RestirPassParams, pixel: UVec2) -> usize {
    let block = params.cut_block_size.max(1);
    let tiles_x = (params.view_size.x + block - 1) / block;
    let tile = pixel / block;

    (tile.y * tiles_x + tile.x) as usize
}

/// Cosine between the direction towards given sample and the surface's
/// normal; surfaces with transmission accept light from both sides.
pub fn cosine(params: &RestirPassParams, sample: &GiSample, point: Vec3, normal: Vec3) -> f32 {
    let cos = sample.dir(point).dot(normal);

    if params.has(RestirPassParams::FLAG_TRANSMISSION) {
        cos.abs()
    } else {
        cos.max(0.0)
    }
}

pub fn target_pdf(params: &RestirPassParams, sample: &GiSample, point: Vec3, normal: Vec3) -> f32 {
    if !sample.exists() {
        return 0.0;
    }

    sample.radiance.luma().max(0.0) * cosine(params, sample, point, normal)
}

/// Generates `initial_candidates` bounce samples for given surface and
/// returns the normalized reservoir.
pub fn sample_initial(
    wnoise: &mut WhiteNoise,
    params: &RestirPassParams,
    sampler: &LightSamplerView,
    tracer: &impl RayTracer,
    surface: &GBufferEntry,
    tile: usize,
) -> GiReservoir {
    let visibility = params.visibility_test();
    let two_sided = params.has(RestirPassParams::FLAG_TWO_SIDED);
    let transmission = params.has(RestirPassParams::FLAG_TRANSMISSION);
    let sky = sampler.lights.sky_radiance();

    let mut reservoir = GiReservoir::default();
    let mut selected: Option<HitRadiance> = None;

    for _ in 0..params.initial_candidates.max(1) {
        let (normal, side_pdf) = if transmission && wnoise.sample() < 0.5 {
            (-surface.normal, 0.5)
        } else if transmission {
            (surface.normal, 0.5)
        } else {
            (surface.normal, 1.0)
        };

        let dir = wnoise.sample_hemisphere(normal);
        let source_pdf = dir.dot(normal).max(0.0) / PI * side_pdf;
        let origin = surface.position + normal * params.ray_bias;

        let (sample, radiance) = match tracer.trace(Ray::new(origin, dir)) {
            Some(hit) => {
                let Some(hit_normal) = hit_normal(&hit, two_sided) else {
                    // back side of one-sided geometry: a black candidate
                    reservoir.update(wnoise, GiSample::default(), 0.0);
                    continue;
                };

                let hit = RayHit {
                    normal: hit_normal,
                    ..hit
                };

                let radiance = shade_hit(
                    wnoise,
                    sampler,
                    tracer,
                    &hit,
                    tile,
                    params.ray_bias,
                    visibility == VisibilityTest::PerCandidate,
                );

                let sample = GiSample {
                    creation_point: surface.position,
                    creation_normal: surface.normal,
                    hit_point: hit.point,
                    hit_normal,
                    radiance: radiance.total(),
                    light_id: radiance.light_id,
                };

                (sample, Some(radiance))
            }

            None => {
                let sample = GiSample {
                    creation_point: surface.position,
                    creation_normal: surface.normal,
                    hit_point: surface.position + dir * GiSample::SKY_DISTANCE,
                    hit_normal: -dir,
                    radiance: sky,
                    light_id: GiSample::NO_LIGHT,
                };

                (sample, None)
            }
        };

        let weight = if source_pdf > 0.0 {
            target_pdf(params, &sample, surface.position, surface.normal) / source_pdf
        } else {
            0.0
        };

        if reservoir.update(wnoise, sample, weight) {
            selected = radiance;
        }
    }

    if visibility == VisibilityTest::OnFinalReservoir {
        if let Some(mut radiance) = selected {
            radiance.resolve_visibility(tracer);
            reservoir.sample.radiance = radiance.total();
        }
    }

    let pdf = target_pdf(params, &reservoir.sample, surface.position, surface.normal);

    reservoir.normalize(pdf);
    reservoir
}

/// Merges `current` (resampled for `surface`) with reservoirs of other
/// pixels or frames and returns the normalized result.
///
/// Neighbors whose reconnection jacobian falls outside `<0.1, 10>` are
/// rejected, as are (with approximate visibility enabled) neighbors whose
/// sample is occluded from `surface`.
pub fn combine(
    wnoise: &mut WhiteNoise,
    params: &RestirPassParams,
    tracer: &impl RayTracer,
    surface: &GBufferEntry,
    current: &GiReservoir,
    neighbors: &[Neighbor],
) -> GiReservoir {
    let mut out = GiReservoir::default();
    let mut contributors = [(GBufferEntry::default(), 0.0f32); MAX_NEIGHBORS + 1];
    let mut contributors_len = 0;

    if !current.is_empty() {
        let pdf = target_pdf(params, &current.sample, surface.position, surface.normal);

        out.merge(wnoise, current, pdf);
        contributors[0] = (*surface, current.m);
        contributors_len = 1;
    }

    for neighbor in neighbors.iter().take(MAX_NEIGHBORS) {
        if neighbor.reservoir.is_empty() {
            continue;
        }

        let mut sample = neighbor.reservoir.sample;
        let jacobian = sample.jacobian(surface.position);

        if !jacobian.is_finite() || !(0.1..=10.0).contains(&jacobian) {
            continue;
        }

        if params.has(RestirPassParams::FLAG_APPROX_VISIBILITY)
            && sample.exists()
            && tracer.is_occluded(sample.ray(surface.position, params.ray_bias))
        {
            continue;
        }

        let pdf = target_pdf(params, &sample, surface.position, surface.normal) * jacobian;

        sample.creation_point = surface.position;
        sample.creation_normal = surface.normal;

        let reservoir = GiReservoir {
            sample,
            ..neighbor.reservoir
        };

        out.merge(wnoise, &reservoir, pdf);
        contributors[contributors_len] = (neighbor.surface, neighbor.reservoir.m);
        contributors_len += 1;
    }

    let pdf = target_pdf(params, &out.sample, surface.position, surface.normal);

    match params.bias_correction() {
        BiasCorrection::None => {
            out.normalize(pdf);
        }

        correction => {
            let mut z = 0.0;

            for (contributor, m) in &contributors[..contributors_len] {
                if target_pdf(params, &out.sample, contributor.position, contributor.normal) <= 0.0 {
                    continue;
                }

                if correction == BiasCorrection::RayTraced
                    && contributor.position != surface.position
                    && out.sample.exists()
                    && tracer.is_occluded(out.sample.ray(contributor.position, params.ray_bias))
                {
                    continue;
                }

                z += m;
            }

            out.normalize_ex(pdf, 1.0, z);
        }
    }

    out
}

/// Merges the reservoir of given pixel with its reprojected history.
pub fn temporal_reuse(
    wnoise: &mut WhiteNoise,
    params: &RestirPassParams,
    tracer: &impl RayTracer,
    surface: &GBufferEntry,
    current: &GiReservoir,
    prev_gbuffer: GBufferView,
    history: &[PackedReservoir],
) -> Option<GiReservoir> {
    let prev_pos = surface.prev_screen_pos;

    if prev_pos.x < 0.0 || prev_pos.y < 0.0 {
        return None;
    }

    let prev_pixel = prev_pos.floor().as_ivec2();

    if !prev_gbuffer.contains(prev_pixel) {
        return None;
    }

    let prev_pixel = prev_pixel.as_uvec2();
    let prev_surface = prev_gbuffer.get(prev_pixel);

    if !surface.is_similar(
        &prev_surface,
        normal_threshold(params, params.temporal_normal_threshold),
        params.temporal_depth_threshold,
    ) {
        return None;
    }

    let mut prev = history[history_dim(params).index(prev_pixel, params.slice_in)].unpack();

    prev.clamp_m(params.max_history);

    let neighbor = Neighbor {
        reservoir: prev,
        surface: prev_surface,
    };

    let mut out = combine(wnoise, params, tracer, surface, current, &[neighbor]);

    out.clamp_m(params.max_history);

    Some(out)
}

/// Normal-rejection threshold; hair has no meaningful normal, so it's
/// never rejected because of it.
pub fn normal_threshold(params: &RestirPassParams, threshold: f32) -> f32 {
    if params.has(RestirPassParams::FLAG_HAIR) {
        -1.0
    } else {
        threshold
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Floor at y = 0 and a glowing ceiling at y = 2.
    pub struct Room;

    impl RayTracer for Room {
        fn trace(&self, ray: Ray) -> Option<RayHit> {
            let (target, normal, albedo, emissive) = if ray.dir().y > 0.0 {
                (2.0, -Vec3::Y, Vec3::splat(0.5), Vec3::ONE)
            } else if ray.dir().y < 0.0 {
                (0.0, Vec3::Y, Vec3::splat(0.5), Vec3::ZERO)
            } else {
                return None;
            };

            let t = (target - ray.origin().y) / ray.dir().y;

            (t > 0.0 && t < ray.len()).then(|| RayHit {
                distance: t,
                point: ray.at(t),
                normal,
                albedo,
                emissive,
                front_face: true,
            })
        }
    }

    pub fn params() -> RestirPassParams {
        RestirPassParams {
            seed: 1,
            view_size: uvec2(4, 4),
            padded_size: uvec2(4, 4),
            slices: 2,
            history_slices: 1,
            initial_candidates: 4,
            spatial_samples: 1,
            spatial_samples_boost: 8,
            spatial_radius: 2.0,
            max_history: 10.0,
            temporal_normal_threshold: 0.5,
            temporal_depth_threshold: 0.1,
            spatial_normal_threshold: 0.5,
            spatial_depth_threshold: 0.1,
            ray_bias: 0.001,
            bias_correction: BiasCorrection::Basic as u32,
            visibility_test: VisibilityTest::OnFinalReservoir as u32,
            cut_block_size: 8,
            ..Default::default()
        }
    }

    pub fn floor(x: f32) -> GBufferEntry {
        GBufferEntry {
            position: vec3(x, 0.0, 0.0),
            depth: 5.0,
            normal: Vec3::Y,
            albedo: Vec3::ONE,
            prev_screen_pos: vec2(-1.0, -1.0),
            ..Default::default()
        }
    }

    #[test]
    fn initial_candidates_find_the_ceiling() {
        let params = params();
        let lights = [LightRecord::default()];
        let sampler = LightSamplerView::uniform(LightsView::new(&lights, 0, 0));
        let mut wnoise = WhiteNoise::new(3, uvec2(1, 1));

        let reservoir = sample_initial(&mut wnoise, &params, &sampler, &Room, &floor(0.0), 0);

        assert_eq!(4.0, reservoir.m);
        assert!(reservoir.sample.exists());
        assert_eq!(Vec3::ONE, reservoir.sample.radiance);
        assert!(reservoir.w > 0.0);
    }

    #[test]
    fn combining_adds_confidence() {
        let params = params();
        let mut wnoise = WhiteNoise::new(3, uvec2(1, 1));

        let sample = GiSample {
            creation_point: Vec3::ZERO,
            creation_normal: Vec3::Y,
            hit_point: vec3(0.0, 2.0, 0.0),
            hit_normal: -Vec3::Y,
            radiance: Vec3::ONE,
            light_id: GiSample::NO_LIGHT,
        };

        let current = GiReservoir {
            sample,
            m: 4.0,
            w: 1.0,
        };

        let neighbor = Neighbor {
            reservoir: GiReservoir {
                sample: GiSample {
                    creation_point: vec3(0.1, 0.0, 0.0),
                    ..sample
                },
                m: 6.0,
                w: 1.0,
            },
            surface: floor(0.1),
        };

        let out = combine(&mut wnoise, &params, &Room, &floor(0.0), &current, &[neighbor]);

        assert_eq!(10.0, out.m);
        assert!(out.w > 0.0);
    }

    #[test]
    fn distant_reconnections_are_rejected() {
        let params = params();
        let mut wnoise = WhiteNoise::new(3, uvec2(1, 1));

        let far = Neighbor {
            reservoir: GiReservoir {
                sample: GiSample {
                    creation_point: vec3(0.0, 1.9, 0.0),
                    creation_normal: Vec3::Y,
                    hit_point: vec3(0.0, 2.0, 0.0),
                    hit_normal: -Vec3::Y,
                    radiance: Vec3::ONE,
                    light_id: 0,
                },
                m: 5.0,
                w: 1.0,
            },
            surface: floor(0.0),
        };

        let out = combine(
            &mut wnoise,
            &params,
            &Room,
            &floor(0.0),
            &GiReservoir::default(),
            &[far],
        );

        assert!(out.is_empty());
    }
}
