use rtgi_gpu::prelude::*;

use crate::restir;

/// Merges slice `slice_out` of the current reservoirs with slice `slice_in`
/// of the previous frame's, in place.
pub fn main(
    global_id: UVec3,
    params: &RestirPassParams,
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

    let surface = gbuffer.get(pixel);

    if surface.is_none() {
        return;
    }

    let idx = restir::reservoir_dim(params).index(pixel, params.slice_out);
    let current = reservoirs[idx].unpack();
    let mut wnoise = restir::noise(params, pixel, 1);

    if let Some(merged) = restir::temporal_reuse(
        &mut wnoise,
        params,
        tracer,
        &surface,
        &current,
        prev_gbuffer,
        history,
    ) {
        reservoirs[idx] = PackedReservoir::pack(&merged);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::restir::tests::{floor, params, Room};

    #[test]
    fn history_is_merged_and_clamped() {
        let params = params();
        let surface = GBufferEntry {
            prev_screen_pos: vec2(0.5, 0.5),
            ..floor(0.0)
        };

        let gbuffer = vec![surface; 16];
        let gbuffer = GBufferView::new(uvec2(4, 4), &gbuffer);

        let sample = GiSample {
            creation_point: Vec3::ZERO,
            creation_normal: Vec3::Y,
            hit_point: vec3(0.0, 2.0, 0.0),
            hit_normal: -Vec3::Y,
            radiance: Vec3::ONE,
            light_id: GiSample::NO_LIGHT,
        };

        let history = vec![
            PackedReservoir::pack(&GiReservoir {
                sample,
                m: 40.0,
                w: 1.0,
            });
            16
        ];

        let mut reservoirs = vec![
            PackedReservoir::pack(&GiReservoir {
                sample,
                m: 4.0,
                w: 1.0,
            });
            32
        ];

        main(
            uvec3(0, 0, 0),
            &params,
            &Room,
            gbuffer,
            gbuffer,
            &history,
            &mut reservoirs,
        );

        assert_eq!(10.0, reservoirs[0].m());

        // pixels that weren't dispatched stay untouched
        assert_eq!(4.0, reservoirs[1].m());
    }

    #[test]
    fn disoccluded_pixels_keep_their_reservoir() {
        let params = params();
        let gbuffer = vec![floor(0.0); 16];
        let gbuffer = GBufferView::new(uvec2(4, 4), &gbuffer);
        let history = vec![PackedReservoir::default(); 16];

        let reservoir = GiReservoir {
            m: 4.0,
            w: 1.0,
            ..Default::default()
        };

        let mut reservoirs = vec![PackedReservoir::pack(&reservoir); 32];

        main(
            uvec3(1, 1, 0),
            &params,
            &Room,
            gbuffer,
            gbuffer,
            &history,
            &mut reservoirs,
        );

        assert_eq!(4.0, reservoirs[5].m());
    }
}
