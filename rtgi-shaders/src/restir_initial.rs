use rtgi_gpu::prelude::*;

use crate::restir;

/// Generates the initial candidates of slice `slice_out`.
pub fn main(
    global_id: UVec3,
    params: &RestirPassParams,
    sampler: &LightSamplerView,
    tracer: &impl RayTracer,
    gbuffer: GBufferView,
    reservoirs: &mut [PackedReservoir],
) {
    let pixel = global_id.xy();

    if pixel.x >= params.view_size.x || pixel.y >= params.view_size.y {
        return;
    }

    let idx = restir::reservoir_dim(params).index(pixel, params.slice_out);
    let surface = gbuffer.get(pixel);

    reservoirs[idx] = if surface.is_some() {
        let mut wnoise = restir::noise(params, pixel, 0);
        let tile = restir::cut_tile(params, pixel);

        PackedReservoir::pack(&restir::sample_initial(
            &mut wnoise,
            params,
            sampler,
            tracer,
            &surface,
            tile,
        ))
    } else {
        PackedReservoir::default()
    };
}
