use rtgi_gpu::prelude::*;

/// Moves probe `global_id.x` out of (or away from) nearby geometry, based on
/// its fixed rays.
///
/// Offsets are kept in volume-local space, in units of probe spacing, and
/// never leave the probe's cell (`|offset| < 0.45`).
pub fn main(
    global_id: UVec3,
    desc: &DdgiVolumeDesc,
    params: &DdgiPassParams,
    rays: &[DdgiRayData],
    offsets: &mut TextureViewMut,
) {
    let probe = global_id.x;

    if probe >= desc.probe_count() || !desc.is_relocation_enabled() {
        return;
    }

    let tile = desc.probe_tile(probe);

    if params.reset != 0 {
        offsets.store(tile, encode_probe_offset(Vec3::ZERO).extend(0.0));
        return;
    }

    if !desc.is_probe_scheduled(probe) {
        return;
    }

    let offset = decode_probe_offset(offsets.load(tile).truncate()) * desc.spacing;
    let rays_count = fixed_rays(desc);

    let mut backfaces = 0;
    let mut closest_backface = (FAR_DISTANCE, None);
    let mut closest_frontface = (FAR_DISTANCE, None);
    let mut farthest_frontface = (0.0, None);

    for ray in 0..rays_count {
        let data = rays[desc.ray_data_index(probe, ray)];

        if data.is_backface() {
            backfaces += 1;

            // undo the shortening applied while tracing
            let distance = -data.distance * 5.0;

            if distance < closest_backface.0 {
                closest_backface = (distance, Some(ray));
            }
        } else if data.distance < closest_frontface.0 {
            closest_frontface = (data.distance, Some(ray));
        } else if data.distance > farthest_frontface.0 {
            farthest_frontface = (data.distance, Some(ray));
        }
    }

    let min_frontface = desc.min_frontface_distance;
    let mut full_offset = Vec3::splat(FAR_DISTANCE);

    if let (Some(ray), true) = (
        closest_backface.1,
        backfaces as f32 / rays_count as f32 > desc.backface_threshold,
    ) {
        // inside of geometry: jump through the closest back face
        let dir = desc.probe_ray_direction(ray);

        full_offset = offset + dir * (closest_backface.0 + min_frontface * 0.5);
    } else if let (Some(closest), true) = (closest_frontface.1, closest_frontface.0 < min_frontface) {
        // too close to a wall: move away from it, towards open space
        let closest_dir = desc.probe_ray_direction(closest);

        if let Some(farthest) = farthest_frontface.1 {
            let farthest_dir = desc.probe_ray_direction(farthest);

            if closest_dir.dot(farthest_dir) <= 0.0 {
                full_offset = offset + farthest_dir * farthest_frontface.0.min(1.0);
            }
        }
    } else if closest_frontface.0 > min_frontface {
        // enough room around: drift back towards the grid position
        let margin = (closest_frontface.0 - min_frontface).min(offset.length());

        full_offset = offset - offset.normalize_or_zero() * margin;
    }

    let normalized = full_offset / desc.spacing;

    if normalized.length_squared() < 0.45 * 0.45 {
        offsets.store(tile, encode_probe_offset(normalized).extend(0.0));
    }
}

pub fn fixed_rays(desc: &DdgiVolumeDesc) -> u32 {
    if desc.has_fixed_rays() {
        DDGI_FIXED_RAYS
    } else {
        desc.rays_per_probe
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn desc() -> DdgiVolumeDesc {
        DdgiVolumeDesc {
            rays_per_probe: 144,
            rotation: Quat::IDENTITY.to_array(),
            ray_rotation: Quat::IDENTITY.to_array(),
            spacing: Vec3::splat(10.0),
            counts: ivec3(1, 1, 1),
            backface_threshold: 0.25,
            min_frontface_distance: 1.0,
            flags: DdgiVolumeDesc::FLAG_RELOCATION,
            probe_index_count: 1,
            ..Default::default()
        }
    }

    fn offsets() -> Vec<u8> {
        let mut data = vec![0; 8];

        TextureViewMut::new(uvec2(1, 1), PixelFormat::A16B16G16R16, &mut data)
            .store(UVec2::ZERO, encode_probe_offset(Vec3::ZERO).extend(0.0));

        data
    }

    #[test]
    fn probe_too_close_to_a_wall_moves_away() {
        let desc = desc();

        // wall right next to the first fixed ray's direction, open space on
        // the opposite side
        let rays: Vec<_> = (0..144)
            .map(|ray| {
                let dir = desc.probe_ray_direction(ray);
                let first = desc.probe_ray_direction(0);

                DdgiRayData {
                    radiance: Vec3::ZERO,
                    distance: if dir.dot(first) > 0.9 {
                        0.5
                    } else {
                        4.0 - 2.0 * dir.dot(first)
                    },
                }
            })
            .collect();

        let mut data = offsets();
        let mut tex = TextureViewMut::new(uvec2(1, 1), PixelFormat::A16B16G16R16, &mut data);

        main(UVec3::ZERO, &desc, &DdgiPassParams::default(), &rays, &mut tex);

        let offset = decode_probe_offset(tex.load(UVec2::ZERO).truncate());

        assert!(offset.length() > 0.01);
        assert!(offset.dot(desc.probe_ray_direction(0)) < 0.0);
    }

    #[test]
    fn reset_clears_the_offset() {
        let desc = desc();
        let mut data = vec![0; 8];
        let mut tex = TextureViewMut::new(uvec2(1, 1), PixelFormat::A16B16G16R16, &mut data);

        tex.store(UVec2::ZERO, vec4(0.9, 0.1, 0.3, 0.0));

        let params = DdgiPassParams {
            reset: 1,
            ..Default::default()
        };

        main(UVec3::ZERO, &desc, &params, &[], &mut tex);

        let offset = decode_probe_offset(tex.load(UVec2::ZERO).truncate());

        assert!(offset.length() < 0.01);
    }
}
