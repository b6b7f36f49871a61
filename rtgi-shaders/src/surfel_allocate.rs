use rtgi_gpu::prelude::*;

use crate::surfel_find_miss::{unpack_pixel, NO_MISS};

/// Spawns a surfel for the pixel requested by tile `global_id.x`, taking a
/// slot from the free list or, when it's empty, from the untouched part of
/// the pool. An exhausted pool leaves the request for the next frame.
pub fn main(
    global_id: UVec3,
    params: &SurfelPassParams,
    gbuffer: GBufferView,
    misses: &[u32],
    meta: &mut SurfelMeta,
    free_list: &[u32],
    surfels: &mut [Surfel],
    irradiance: &mut [SurfelIrradiance],
) {
    let Some(&miss) = misses.get(global_id.x as usize) else {
        return;
    };

    if miss == NO_MISS {
        return;
    }

    let surface = gbuffer.get(unpack_pixel(miss));

    if surface.is_none() {
        return;
    }

    let idx = if meta.free_count > 0 {
        meta.free_count -= 1;
        free_list[meta.free_count as usize]
    } else if (meta.high_water as usize) < surfels.len() {
        meta.high_water += 1;
        meta.high_water - 1
    } else {
        return;
    };

    surfels[idx as usize] = Surfel::new(surface.position, surface.normal, params.surfel_radius);
    irradiance[idx as usize] = SurfelIrradiance::ZERO;
}
