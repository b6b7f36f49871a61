use rtgi_gpu::prelude::*;

/// Ages surfel `global_id.x`; surfels unseen for more than `max_lifetime`
/// frames are killed and their slot pushed onto the free list.
pub fn main(
    global_id: UVec3,
    params: &SurfelPassParams,
    meta: &mut SurfelMeta,
    surfels: &mut [Surfel],
    free_list: &mut [u32],
) {
    let idx = global_id.x;

    if idx >= meta.high_water {
        return;
    }

    let Some(surfel) = surfels.get_mut(idx as usize) else {
        return;
    };

    if !surfel.is_alive() {
        return;
    }

    surfel.lifetime += 1;

    if surfel.lifetime <= params.max_lifetime {
        return;
    }

    if let Some(slot) = free_list.get_mut(meta.free_count as usize) {
        *surfel = Surfel::default();
        *slot = idx;
        meta.free_count += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stale_surfels_are_freed() {
        let params = SurfelPassParams {
            max_lifetime: 2,
            ..Default::default()
        };

        let mut meta = SurfelMeta {
            free_count: 0,
            high_water: 2,
        };

        let mut surfels = [
            Surfel::new(Vec3::ZERO, Vec3::Y, 1.0),
            Surfel::new(Vec3::ONE, Vec3::Y, 1.0),
        ];

        let mut free_list = [0; 2];

        for _ in 0..3 {
            // the second surfel keeps being seen
            surfels[1].lifetime = 0;

            for i in 0..2 {
                main(uvec3(i, 0, 0), &params, &mut meta, &mut surfels, &mut free_list);
            }
        }

        assert!(!surfels[0].is_alive());
        assert!(surfels[1].is_alive());
        assert_eq!(1, meta.free_count);
        assert_eq!(0, free_list[0]);
    }
}
