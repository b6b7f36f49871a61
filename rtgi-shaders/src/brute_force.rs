use rtgi_gpu::prelude::*;

use crate::shading::{hit_normal, shade_hit};

/// Path traces the indirect diffuse lighting of a single pixel, without any
/// reuse; the reference the other strategies converge towards.
pub fn main(
    global_id: UVec3,
    params: &BruteForcePassParams,
    sampler: &LightSamplerView,
    tracer: &impl RayTracer,
    gbuffer: GBufferView,
    output: &mut [Vec4],
) {
    let pixel = global_id.xy();

    if pixel.x >= params.view_size.x || pixel.y >= params.view_size.y {
        return;
    }

    let out_idx = gbuffer.screen_to_idx(pixel);
    let surface = gbuffer.get(pixel);

    if surface.is_none() {
        output[out_idx] = Vec4::ZERO;
        return;
    }

    let two_sided = params.flags & BruteForcePassParams::FLAG_TWO_SIDED != 0;
    let sky = sampler.lights.sky_radiance();
    let spp = params.samples_per_pixel.max(1);
    let mut wnoise = WhiteNoise::new(params.seed, pixel);

    let mut radiance = Vec3::ZERO;
    let mut hit_distance = 0.0;
    let mut hits = 0;

    for _ in 0..spp {
        let mut point = surface.position;
        let mut normal = surface.normal;
        let mut throughput = Vec3::ONE;

        for bounce in 0..params.max_bounces.max(1) {
            let dir = wnoise.sample_hemisphere(normal);
            let ray = Ray::new(point + normal * params.ray_bias, dir);

            let Some(hit) = tracer.trace(ray) else {
                radiance += throughput * sky;
                break;
            };

            if bounce == 0 {
                hit_distance += hit.distance;
                hits += 1;
            }

            let Some(hit_normal) = hit_normal(&hit, two_sided) else {
                break;
            };

            let hit = RayHit {
                normal: hit_normal,
                ..hit
            };

            let tile = 0;
            let shaded = shade_hit(&mut wnoise, sampler, tracer, &hit, tile, params.ray_bias, true);

            radiance += throughput * shaded.total();
            throughput *= hit.albedo;
            point = hit.point;
            normal = hit.normal;

            if throughput.max_element() <= 0.0 {
                break;
            }
        }
    }

    let mut diffuse = radiance / spp as f32;

    if params.flags & BruteForcePassParams::FLAG_DEMODULATE == 0 {
        diffuse *= surface.albedo;
    }

    let hit_distance = if hits > 0 {
        hit_distance / hits as f32
    } else {
        0.0
    };

    output[out_idx] = diffuse.extend(hit_distance);
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::restir::tests::{floor, Room};

    #[test]
    fn sees_the_glowing_ceiling() {
        let params = BruteForcePassParams {
            seed: 1,
            samples_per_pixel: 16,
            max_bounces: 1,
            view_size: uvec2(1, 1),
            ray_bias: 0.001,
            ..Default::default()
        };

        let lights = [LightRecord::default()];
        let sampler = LightSamplerView::uniform(LightsView::new(&lights, 0, 0));
        let gbuffer = [GBufferEntry {
            albedo: Vec3::splat(0.5),
            ..floor(0.0)
        }];

        let gbuffer = GBufferView::new(uvec2(1, 1), &gbuffer);
        let mut output = [Vec4::ZERO];

        main(UVec3::ZERO, &params, &sampler, &Room, gbuffer, &mut output);

        // every ray hits the ceiling, whose radiance is one
        assert_relative_eq!(0.5, output[0].x, epsilon = 1e-5);
        assert!(output[0].w >= 1.99);
    }
}
