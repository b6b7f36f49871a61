use rtgi_gpu::prelude::*;

use crate::shading::shade_hit;

/// Traces ray `global_id.x` of the `global_id.y`-th probe of this update's
/// budget window.
///
/// Back-face hits store a shortened negative distance (so that relocation
/// can tell how deep inside of geometry the probe sits) and misses store the
/// sky with [`FAR_DISTANCE`]. Front-face hits are lit by one light sample
/// plus the volume's own irradiance from the previous update.
pub fn main(
    global_id: UVec3,
    desc: &DdgiVolumeDesc,
    params: &DdgiPassParams,
    sampler: &LightSamplerView,
    tracer: &impl RayTracer,
    textures: &DdgiTexturesView,
    rays: &mut [DdgiRayData],
) {
    let ray_index = global_id.x;
    let count = desc.probe_count();

    if ray_index >= desc.rays_per_probe || global_id.y >= desc.probe_index_count || count == 0 {
        return;
    }

    let probe = (desc.probe_index_start + global_id.y) % count;

    if let Some(states) = &textures.states {
        let inactive = ProbeState::from_texel(states.load(desc.probe_tile(probe)).x)
            == ProbeState::Inactive;

        // inactive probes keep tracing the fixed rays, so that they can get
        // woken up by classification
        if inactive && params.reset == 0 && (ray_index >= DDGI_FIXED_RAYS || !desc.has_fixed_rays()) {
            return;
        }
    }

    let origin = desc.probe_position(probe, textures.offsets.as_ref());
    let dir = desc.rotation() * desc.probe_ray_direction(ray_index);
    let ray = Ray::new(origin, dir).with_len(desc.max_ray_distance);
    let out = &mut rays[desc.ray_data_index(probe, ray_index)];

    let Some(hit) = tracer.trace(ray) else {
        *out = DdgiRayData {
            radiance: sampler.lights.sky_radiance() * params.lighting_multiplier,
            distance: FAR_DISTANCE,
        };

        return;
    };

    if !hit.front_face {
        *out = DdgiRayData {
            radiance: Vec3::ZERO,
            distance: -0.2 * hit.distance,
        };

        return;
    }

    let mut wnoise = WhiteNoise::from_index(params.seed, desc.ray_data_index(probe, ray_index) as u32);
    let shaded = shade_hit(&mut wnoise, sampler, tracer, &hit, 0, params.ray_bias, true);

    let mut radiance =
        shaded.emitted * params.emissive_multiplier + shaded.reflected * params.lighting_multiplier;

    if params.reset == 0 {
        let irradiance = desc.sample_irradiance(textures, hit.point, hit.normal, dir);

        radiance += hit.albedo / PI * irradiance * params.irradiance_scalar;
    }

    *out = DdgiRayData {
        radiance,
        distance: hit.distance,
    };
}
