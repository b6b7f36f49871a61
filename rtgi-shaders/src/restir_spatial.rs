use rtgi_gpu::prelude::*;

use crate::restir::{self, Neighbor, MAX_NEIGHBORS};

/// Resamples slice `slice_in` against reservoirs of nearby pixels, writing
/// into slice `slice_out`.
///
/// Neighbors are picked from `disc` (see: [`spatial_disc_point()`]),
/// starting at a random offset; pixels with a fresh history (camera cut or
/// a reservoir that hasn't accumulated anything yet) take the boosted
/// sample count.
pub fn main(
    global_id: UVec3,
    params: &RestirPassParams,
    disc: &[Vec2],
    tracer: &impl RayTracer,
    gbuffer: GBufferView,
    reservoirs: &mut [PackedReservoir],
) {
    let pixel = global_id.xy();

    if pixel.x >= params.view_size.x || pixel.y >= params.view_size.y {
        return;
    }

    let dim = restir::reservoir_dim(params);
    let out_idx = dim.index(pixel, params.slice_out);
    let surface = gbuffer.get(pixel);

    if surface.is_none() {
        reservoirs[out_idx] = PackedReservoir::default();
        return;
    }

    let current = reservoirs[dim.index(pixel, params.slice_in)].unpack();
    let mut wnoise = restir::noise(params, pixel, 2);

    let boost = params.has(RestirPassParams::FLAG_CAMERA_CUT)
        || current.m <= params.initial_candidates as f32;

    let samples = if boost {
        params.spatial_samples_boost
    } else {
        params.spatial_samples
    };

    let samples = (samples as usize).min(MAX_NEIGHBORS);
    let normal_threshold = restir::normal_threshold(params, params.spatial_normal_threshold);
    let mask = disc.len().saturating_sub(1);
    let start = wnoise.sample_int() as usize;

    let mut neighbors = [Neighbor::default(); MAX_NEIGHBORS];
    let mut len = 0;

    for i in 0..samples {
        if disc.is_empty() {
            break;
        }

        let offset = disc[(start + i) & mask] * params.spatial_radius;
        let neighbor_pixel = pixel.as_ivec2() + offset.round().as_ivec2();

        if !gbuffer.contains(neighbor_pixel) {
            continue;
        }

        let neighbor_pixel = neighbor_pixel.as_uvec2();

        if neighbor_pixel == pixel {
            continue;
        }

        let neighbor_surface = gbuffer.get(neighbor_pixel);

        if !surface.is_similar(
            &neighbor_surface,
            normal_threshold,
            params.spatial_depth_threshold,
        ) {
            continue;
        }

        neighbors[len] = Neighbor {
            reservoir: reservoirs[dim.index(neighbor_pixel, params.slice_in)].unpack(),
            surface: neighbor_surface,
        };

        len += 1;
    }

    let combined = restir::combine(
        &mut wnoise,
        params,
        tracer,
        &surface,
        &current,
        &neighbors[..len],
    );

    reservoirs[out_idx] = PackedReservoir::pack(&combined);
}
