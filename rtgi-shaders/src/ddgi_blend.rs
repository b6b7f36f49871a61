//! Blends the freshly traced rays into the probes' octahedral maps.

use rtgi_gpu::prelude::*;

/// Fraction of back-face hits above which the probe is considered to be
/// inside of geometry and its irradiance is left alone.
const BACKFACE_CUTOFF: f32 = 0.1;

pub fn irradiance(
    global_id: UVec3,
    desc: &DdgiVolumeDesc,
    rays: &[DdgiRayData],
    states: Option<&TextureView>,
    irradiance: &mut TextureViewMut,
) {
    let Some((probe, texel_dir)) = probe_texel(global_id, desc, states, DDGI_IRRADIANCE_TEXELS)
    else {
        return;
    };

    let first_ray = first_blended_ray(desc);
    let rays_blended = desc.rays_per_probe - first_ray;
    let mut result = Vec3::ZERO;
    let mut weights = 0.0;
    let mut backfaces = 0;

    for ray in first_ray..desc.rays_per_probe {
        let data = rays[desc.ray_data_index(probe, ray)];

        if data.is_backface() {
            backfaces += 1;

            if backfaces as f32 >= rays_blended as f32 * BACKFACE_CUTOFF {
                return;
            }

            continue;
        }

        let weight = texel_dir.dot(desc.probe_ray_direction(ray)).max(0.0);

        result += data.radiance * weight;
        weights += weight;
    }

    if weights <= RTGI_EPSILON {
        return;
    }

    let result = (result / (2.0 * weights))
        .max(Vec3::ZERO)
        .powf(1.0 / desc.irradiance_gamma.max(RTGI_EPSILON));

    let pos = global_id.xy();
    let prev = irradiance.load(pos).truncate();

    let mut hysteresis = desc.hysteresis;

    if prev.max_element() <= 0.0 {
        hysteresis = 0.0;
    }

    if (prev - result).abs().max_element() > desc.change_threshold {
        hysteresis = (hysteresis - 0.75).max(0.0);
    }

    let delta = result - prev;

    let result = if delta.length() > desc.brightness_threshold {
        prev + delta * 0.25
    } else {
        result
    };

    irradiance.store(pos, lerp(result, prev, hysteresis).extend(1.0));
}

pub fn distance(
    global_id: UVec3,
    desc: &DdgiVolumeDesc,
    rays: &[DdgiRayData],
    states: Option<&TextureView>,
    distance: &mut TextureViewMut,
) {
    let Some((probe, texel_dir)) = probe_texel(global_id, desc, states, DDGI_DISTANCE_TEXELS)
    else {
        return;
    };

    let max_distance = desc.spacing.length() * 1.5;
    let mut result = Vec2::ZERO;
    let mut weights = 0.0;

    for ray in first_blended_ray(desc)..desc.rays_per_probe {
        let data = rays[desc.ray_data_index(probe, ray)];
        let weight = texel_dir
            .dot(desc.probe_ray_direction(ray))
            .max(0.0)
            .powf(desc.distance_exponent);

        let d = data.distance.abs().min(max_distance);

        result += vec2(d, d * d) * weight;
        weights += weight;
    }

    if weights <= RTGI_EPSILON {
        return;
    }

    let result = result / weights;
    let pos = global_id.xy();
    let prev = distance.load(pos).xy();

    let hysteresis = if prev == Vec2::ZERO {
        0.0
    } else {
        desc.hysteresis
    };

    distance.store(pos, lerp(result, prev, hysteresis).extend(0.0).extend(1.0));
}

/// Resolves the probe of given interior texel and the direction the texel
/// represents; `None` for border texels and probes that aren't updated.
fn probe_texel(
    global_id: UVec3,
    desc: &DdgiVolumeDesc,
    states: Option<&TextureView>,
    num_texels: u32,
) -> Option<(u32, Vec3)> {
    let (probe, local) = desc.atlas_probe(global_id.xy(), num_texels)?;

    if local.x == 0 || local.y == 0 || local.x > num_texels || local.y > num_texels {
        return None;
    }

    if !desc.is_probe_scheduled(probe) {
        return None;
    }

    if let Some(states) = states {
        if ProbeState::from_texel(states.load(desc.probe_tile(probe)).x) == ProbeState::Inactive {
            return None;
        }
    }

    Some((probe, oct_texel_direction(local - 1, num_texels)))
}

/// Fixed rays only serve relocation and classification.
fn first_blended_ray(desc: &DdgiVolumeDesc) -> u32 {
    if desc.has_fixed_rays() {
        DDGI_FIXED_RAYS
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;

    fn desc() -> DdgiVolumeDesc {
        DdgiVolumeDesc {
            rays_per_probe: 144,
            rotation: Quat::IDENTITY.to_array(),
            ray_rotation: Quat::IDENTITY.to_array(),
            spacing: Vec3::splat(10.0),
            counts: ivec3(1, 1, 1),
            hysteresis: 0.97,
            change_threshold: 0.2,
            brightness_threshold: 2.0,
            irradiance_gamma: 5.0,
            distance_exponent: 50.0,
            probe_index_count: 1,
            ..Default::default()
        }
    }

    fn texture(size: UVec2) -> Vec<u8> {
        vec![0; (size.x * size.y) as usize * PixelFormat::A32B32G32R32F.bytes_per_pixel()]
    }

    #[test]
    fn first_blend_replaces_empty_probes() {
        let desc = desc();
        let rays = vec![
            DdgiRayData {
                radiance: Vec3::ONE,
                distance: 3.0,
            };
            144
        ];

        let size = desc.atlas_size(DDGI_IRRADIANCE_TEXELS);
        let mut data = texture(size);
        let mut atlas = TextureViewMut::new(size, PixelFormat::A32B32G32R32F, &mut data);

        for y in 0..size.y {
            for x in 0..size.x {
                irradiance(uvec3(x, y, 0), &desc, &rays, None, &mut atlas);
            }
        }

        // uniform radiance of one, stored as `0.5^(1/gamma)`
        assert_abs_diff_eq!(0.5f32.powf(0.2), atlas.load(uvec2(3, 3)).x, epsilon = 1e-4);

        // borders are filled by a separate pass
        assert_eq!(Vec4::ZERO, atlas.load(uvec2(0, 0)));

        let size = desc.atlas_size(DDGI_DISTANCE_TEXELS);
        let mut data = texture(size);
        let mut atlas = TextureViewMut::new(size, PixelFormat::A32B32G32R32F, &mut data);

        distance(uvec3(5, 5, 0), &desc, &rays, None, &mut atlas);

        let texel = atlas.load(uvec2(5, 5));

        assert_abs_diff_eq!(3.0, texel.x, epsilon = 1e-4);
        assert_abs_diff_eq!(9.0, texel.y, epsilon = 1e-3);
    }

    #[test]
    fn hysteresis_keeps_most_of_the_history() {
        let desc = desc();
        let size = desc.atlas_size(DDGI_IRRADIANCE_TEXELS);
        let mut data = texture(size);
        let mut atlas = TextureViewMut::new(size, PixelFormat::A32B32G32R32F, &mut data);
        let pos = uvec2(3, 3);

        let prev = 0.5f32.powf(0.2);

        atlas.store(pos, Vec3::splat(prev).extend(1.0));

        // a small change: regular hysteresis applies
        let rays = vec![
            DdgiRayData {
                radiance: Vec3::splat(1.1),
                distance: 3.0,
            };
            144
        ];

        irradiance(pos.extend(0), &desc, &rays, None, &mut atlas);

        let fresh = 0.55f32.powf(0.2);

        assert_abs_diff_eq!(prev + (fresh - prev) * 0.03, atlas.load(pos).x, epsilon = 1e-4);
    }

    #[test]
    fn probes_inside_of_geometry_are_skipped() {
        let desc = desc();

        let mut rays = vec![
            DdgiRayData {
                radiance: Vec3::ONE,
                distance: 3.0,
            };
            144
        ];

        for ray in rays.iter_mut().take(20) {
            ray.distance = -1.0;
        }

        let size = desc.atlas_size(DDGI_IRRADIANCE_TEXELS);
        let mut data = texture(size);
        let mut atlas = TextureViewMut::new(size, PixelFormat::A32B32G32R32F, &mut data);

        irradiance(uvec3(3, 3, 0), &desc, &rays, None, &mut atlas);

        assert_eq!(Vec4::ZERO, atlas.load(uvec2(3, 3)));
    }
}
