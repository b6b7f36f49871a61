use rtgi_gpu::prelude::*;

use crate::ddgi_relocate::fixed_rays;

/// Marks probe `global_id.x` inactive when it's stuck inside of geometry or
/// when none of its fixed rays hit anything within its own cell.
pub fn main(
    global_id: UVec3,
    desc: &DdgiVolumeDesc,
    params: &DdgiPassParams,
    rays: &[DdgiRayData],
    states: &mut TextureViewMut,
) {
    let probe = global_id.x;

    if probe >= desc.probe_count() || !desc.is_classification_enabled() {
        return;
    }

    let tile = desc.probe_tile(probe);

    if params.reset != 0 {
        states.store(tile, Vec4::splat(ProbeState::Active as u32 as f32));
        return;
    }

    if !desc.is_probe_scheduled(probe) {
        return;
    }

    let rays_count = fixed_rays(desc);
    let mut backfaces = 0;
    let mut near_hit = false;

    for ray in 0..rays_count {
        let data = rays[desc.ray_data_index(probe, ray)];

        if data.is_backface() {
            backfaces += 1;
            continue;
        }

        if data.is_miss() {
            continue;
        }

        let hit = desc.probe_ray_direction(ray) * data.distance;

        if hit.abs().cmple(desc.spacing).all() {
            near_hit = true;
        }
    }

    let state = if backfaces as f32 / rays_count.max(1) as f32 > desc.backface_threshold || !near_hit {
        ProbeState::Inactive
    } else {
        ProbeState::Active
    };

    states.store(tile, Vec4::splat(state as u32 as f32));
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
            flags: DdgiVolumeDesc::FLAG_CLASSIFICATION,
            probe_index_count: 1,
            ..Default::default()
        }
    }

    fn classify(distance: f32) -> ProbeState {
        let desc = desc();
        let rays = vec![
            DdgiRayData {
                radiance: Vec3::ZERO,
                distance,
            };
            144
        ];

        let mut data = [0];
        let mut states = TextureViewMut::new(uvec2(1, 1), PixelFormat::R8Uint, &mut data);

        main(UVec3::ZERO, &desc, &DdgiPassParams::default(), &rays, &mut states);

        ProbeState::from_texel(states.load(UVec2::ZERO).x)
    }

    #[test]
    fn states() {
        assert_eq!(ProbeState::Active, classify(5.0));
        assert_eq!(ProbeState::Inactive, classify(FAR_DISTANCE));
        assert_eq!(ProbeState::Inactive, classify(-1.0));
    }
}
