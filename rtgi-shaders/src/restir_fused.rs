use rtgi_gpu::prelude::*;

use crate::restir;

/// Initial sampling followed by temporal reuse, in a single pass; the
/// history is only consulted when `FLAG_TEMPORAL` is set.
pub fn main(
    global_id: UVec3,
    params: &RestirPassParams,
    sampler: &LightSamplerView,
    tracer: &impl RayTracer,
    gbuffer: GBufferView,
    prev_gbuffer: GBufferView,
    history: &[PackedReservoir],
    reservoirs: &mut [PackedReservoir],
) {
    let pixel = global_id.xy();

    if pixel.x >= params.view_size.x || pixel.y >= params.view_size.y {
        return;
    }

    let idx = restir::reservoir_dim(params).index(pixel, params.slice_out);
    let surface = gbuffer.get(pixel);

    if surface.is_none() {
        reservoirs[idx] = PackedReservoir::default();
        return;
    }

    let mut wnoise = restir::noise(params, pixel, 0);
    let tile = restir::cut_tile(params, pixel);

    let mut reservoir =
        restir::sample_initial(&mut wnoise, params, sampler, tracer, &surface, tile);

    if params.has(RestirPassParams::FLAG_TEMPORAL) {
        if let Some(merged) = restir::temporal_reuse(
            &mut wnoise,
            params,
            tracer,
            &surface,
            &reservoir,
            prev_gbuffer,
            history,
        ) {
            reservoir = merged;
        }
    }

    reservoirs[idx] = PackedReservoir::pack(&reservoir);
}
