use rtgi_gpu::prelude::*;

use crate::shading::shade_hit;

/// Traces one ray from surfel `global_id.x` and blends the result into its
/// irradiance; the blend factor falls with the number of gathered samples,
/// down to `1 / max_samples`.
pub fn main(
    global_id: UVec3,
    params: &SurfelPassParams,
    sampler: &LightSamplerView,
    tracer: &impl RayTracer,
    meta: &SurfelMeta,
    surfels: &[Surfel],
    irradiance: &mut [SurfelIrradiance],
) {
    let idx = global_id.x;

    if idx >= meta.high_water {
        return;
    }

    let Some(surfel) = surfels.get(idx as usize).filter(|surfel| surfel.is_alive()) else {
        return;
    };

    let normal = surfel.normal();
    let mut wnoise = WhiteNoise::from_index(params.seed, idx);
    let dir = wnoise.sample_hemisphere(normal);
    let ray = Ray::new(surfel.position + normal * params.ray_bias, dir);

    let radiance = match tracer.trace(ray) {
        Some(hit) if hit.front_face => {
            shade_hit(&mut wnoise, sampler, tracer, &hit, 0, params.ray_bias, true).total()
        }
        Some(_) => Vec3::ZERO,
        None => sampler.lights.sky_radiance(),
    };

    let acc = &mut irradiance[idx as usize];
    let samples = (acc.w + 1.0).min(params.max_samples.max(1.0));

    *acc = lerp(acc.truncate(), radiance, 1.0 / samples).extend(samples);
}
