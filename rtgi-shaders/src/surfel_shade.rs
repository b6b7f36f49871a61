use rtgi_gpu::prelude::*;

/// Shades pixel `global_id.xy` with the coverage-weighted irradiance of the
/// surfels binned into its cell, marking those surfels as seen.
pub fn main(
    global_id: UVec3,
    params: &SurfelPassParams,
    gbuffer: GBufferView,
    grid: SurfelGridView,
    surfels: &mut [Surfel],
    irradiance: &[SurfelIrradiance],
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

    let mut radiance = Vec3::ZERO;
    let mut weights = 0.0;

    for idx in grid.surfels_at(surface.position) {
        let Some(surfel) = surfels.get_mut(idx as usize) else {
            continue;
        };

        let weight = surfel.coverage(surface.position, surface.normal);

        if weight <= 0.0 {
            continue;
        }

        surfel.lifetime = 0;

        let acc = irradiance[idx as usize];

        if acc.w > 0.0 {
            radiance += acc.truncate() * weight;
            weights += weight;
        }
    }

    let mut diffuse = if weights > 0.0 {
        radiance / weights
    } else {
        Vec3::ZERO
    };

    if params.flags & SurfelPassParams::FLAG_DEMODULATE == 0 {
        diffuse *= surface.albedo;
    }

    output[out_idx] = diffuse.extend(0.0);
}
