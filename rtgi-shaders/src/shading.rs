use rtgi_gpu::prelude::*;

/// Radiance leaving a secondary hit back towards the ray's origin, split
/// into the emitted part and the part reflected from a sampled light.
#[derive(Clone, Copy, Debug, Default)]
pub struct HitRadiance {
    pub emitted: Vec3,
    pub reflected: Vec3,
    pub light_id: u32,

    /// Shadow ray of the sampled light, if it casts shadows and visibility
    /// wasn't tested yet.
    pub shadow_ray: Option<Ray>,
}

impl HitRadiance {
    pub fn total(&self) -> Vec3 {
        self.emitted + self.reflected
    }

    /// Traces the pending shadow ray, dropping the reflected part when it's
    /// blocked.
    pub fn resolve_visibility(&mut self, tracer: &impl RayTracer) {
        if let Some(ray) = self.shadow_ray.take() {
            if tracer.is_occluded(ray) {
                self.reflected = Vec3::ZERO;
            }
        }
    }
}

/// Shades a diffuse hit with one light sample (next event estimation).
///
/// When `test_visibility` is false the shadow ray is only returned, so that
/// the caller can trace it later.
pub fn shade_hit(
    wnoise: &mut WhiteNoise,
    sampler: &LightSamplerView,
    tracer: &impl RayTracer,
    hit: &RayHit,
    tile: usize,
    ray_bias: f32,
    test_visibility: bool,
) -> HitRadiance {
    let mut out = HitRadiance {
        emitted: hit.emissive,
        light_id: GiSample::NO_LIGHT,
        ..Default::default()
    };

    let Some(pick) = sampler.sample(wnoise, hit.point, hit.normal, tile) else {
        return out;
    };

    if pick.pdf <= 0.0 {
        return out;
    }

    let light = sampler.lights.get(pick.id);
    let sample = light.sample(wnoise, hit.point, hit.normal);

    if !sample.is_some() {
        return out;
    }

    out.light_id = pick.id;
    out.reflected = hit.albedo / PI * sample.irradiance / pick.pdf;

    if light.casts_shadow() {
        let len = if sample.distance >= FAR_DISTANCE {
            FAR_DISTANCE
        } else {
            (sample.distance - 2.0 * ray_bias).max(0.0)
        };

        out.shadow_ray = Some(
            Ray::new(hit.point + hit.normal * ray_bias, sample.dir).with_len(len),
        );
    }

    if test_visibility {
        out.resolve_visibility(tracer);
    }

    out
}

/// Shading normal of a hit, or `None` when the back side of a one-sided
/// surface was hit.
pub fn hit_normal(hit: &RayHit, two_sided: bool) -> Option<Vec3> {
    if hit.front_face || two_sided {
        Some(hit.normal)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Wall;

    impl RayTracer for Wall {
        fn trace(&self, ray: Ray) -> Option<RayHit> {
            // infinite occluder at y = 5
            if ray.dir().y <= 0.0 {
                return None;
            }

            let t = (5.0 - ray.origin().y) / ray.dir().y;

            (t > 0.0 && t < ray.len()).then(|| RayHit {
                distance: t,
                point: ray.at(t),
                normal: -Vec3::Y,
                front_face: true,
                ..Default::default()
            })
        }
    }

    #[test]
    fn shadowed_light_only_leaves_emission() {
        let light = LightRecord {
            color: Vec3::ONE,
            position: vec3(0.0, 10.0, 0.0),
            attenuation: 0.01,
            flags: LightRecord::FLAG_CASTS_SHADOW,
            ..Default::default()
        }
        .with_type(LightType::Point);

        let records = [light];
        let sampler = LightSamplerView::uniform(LightsView::new(&records, 1, 0));

        let hit = RayHit {
            point: Vec3::ZERO,
            normal: Vec3::Y,
            albedo: Vec3::ONE,
            emissive: Vec3::splat(0.5),
            front_face: true,
            ..Default::default()
        };

        let mut wnoise = WhiteNoise::new(0, uvec2(0, 0));

        let lazy = shade_hit(&mut wnoise, &sampler, &Wall, &hit, 0, 0.01, false);

        assert!(lazy.reflected.x > 0.0);
        assert!(lazy.shadow_ray.is_some());

        let tested = shade_hit(&mut wnoise, &sampler, &Wall, &hit, 0, 0.01, true);

        assert_eq!(Vec3::ZERO, tested.reflected);
        assert_eq!(Vec3::splat(0.5), tested.total());
    }
}
