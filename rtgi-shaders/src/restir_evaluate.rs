use rtgi_gpu::prelude::*;

use crate::restir;

/// Resolves the final reservoirs (slices `slice_in..slice_in + history_slices`)
/// into the diffuse output and stores them as the next frame's history.
///
/// The output holds the indirect diffuse radiance (demodulated on request)
/// and the average hit distance in `w`.
pub fn main(
    global_id: UVec3,
    params: &RestirPassParams,
    tracer: &impl RayTracer,
    gbuffer: GBufferView,
    reservoirs: &[PackedReservoir],
    history: &mut [PackedReservoir],
    output: &mut [Vec4],
) {
    let pixel = global_id.xy();

    if pixel.x >= params.view_size.x || pixel.y >= params.view_size.y {
        return;
    }

    let dim = restir::reservoir_dim(params);
    let history_dim = restir::history_dim(params);
    let out_idx = gbuffer.screen_to_idx(pixel);
    let surface = gbuffer.get(pixel);

    if surface.is_none() {
        for slice in 0..params.history_slices {
            history[history_dim.index(pixel, slice)] = PackedReservoir::default();
        }

        output[out_idx] = Vec4::ZERO;
        return;
    }

    let feedback = params.has(RestirPassParams::FLAG_FEEDBACK_VISIBILITY);
    let mut radiance = Vec3::ZERO;
    let mut hit_distance = 0.0;
    let mut hits = 0;

    for slice in 0..params.history_slices {
        let mut reservoir = reservoirs[dim.index(pixel, params.slice_in + slice)].unpack();
        let sample = reservoir.sample;

        if feedback
            && sample.exists()
            && reservoir.weight() > 0.0
            && tracer.is_occluded(sample.ray(surface.position, params.ray_bias))
        {
            reservoir.invalidate();
        }

        let contribution = sample.radiance
            * restir::cosine(params, &sample, surface.position, surface.normal)
            * reservoir.weight();

        if contribution.max_element() > 0.0 {
            radiance += contribution;
            hit_distance += sample.hit_point.distance(surface.position);
            hits += 1;
        }

        history[history_dim.index(pixel, slice)] = PackedReservoir::pack(&reservoir);
    }

    let slices = params.history_slices.max(1) as f32;
    let mut diffuse = radiance / slices / PI;

    if !params.has(RestirPassParams::FLAG_DEMODULATE) {
        diffuse *= surface.albedo;
    }

    let hit_distance = if hits > 0 {
        hit_distance / hits as f32
    } else {
        0.0
    };

    output[out_idx] = diffuse.extend(hit_distance);
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::restir::tests::{floor, params};

    /// Nothing in the scene but a blocker hovering at y = 1.
    struct Blocker;

    impl RayTracer for Blocker {
        fn trace(&self, ray: Ray) -> Option<RayHit> {
            let t = (1.0 - ray.origin().y) / ray.dir().y;

            (t > 0.0 && t < ray.len()).then(|| RayHit {
                distance: t,
                point: ray.at(t),
                normal: -Vec3::Y,
                front_face: true,
                ..Default::default()
            })
        }
    }

    fn setup() -> (Vec<GBufferEntry>, Vec<PackedReservoir>) {
        let gbuffer = vec![floor(0.0); 16];

        let reservoir = GiReservoir {
            sample: GiSample {
                creation_point: Vec3::ZERO,
                creation_normal: Vec3::Y,
                hit_point: vec3(0.0, 2.0, 0.0),
                hit_normal: -Vec3::Y,
                radiance: Vec3::splat(PI),
                light_id: GiSample::NO_LIGHT,
            },
            m: 4.0,
            w: 1.0,
        };

        (gbuffer, vec![PackedReservoir::pack(&reservoir); 32])
    }

    #[test]
    fn evaluates_and_stores_history() {
        let params = RestirPassParams {
            slice_in: 1,
            ..params()
        };

        let (gbuffer, reservoirs) = setup();
        let gbuffer = GBufferView::new(uvec2(4, 4), &gbuffer);
        let mut history = vec![PackedReservoir::default(); 16];
        let mut output = vec![Vec4::ZERO; 16];

        main(
            uvec3(0, 0, 0),
            &params,
            &Blocker,
            gbuffer,
            &reservoirs,
            &mut history,
            &mut output,
        );

        assert_relative_eq!(1.0, output[0].x, epsilon = 0.01);
        assert_relative_eq!(2.0, output[0].w, epsilon = 1e-4);
        assert_eq!(4.0, history[0].m());
        assert_eq!(1.0, history[0].w());
    }

    #[test]
    fn feedback_visibility_invalidates_occluded_samples() {
        let params = RestirPassParams {
            slice_in: 1,
            flags: RestirPassParams::FLAG_FEEDBACK_VISIBILITY
                | RestirPassParams::FLAG_DEMODULATE,
            ..params()
        };

        let (gbuffer, reservoirs) = setup();
        let gbuffer = GBufferView::new(uvec2(4, 4), &gbuffer);
        let mut history = vec![PackedReservoir::default(); 16];
        let mut output = vec![Vec4::ONE; 16];

        main(
            uvec3(0, 0, 0),
            &params,
            &Blocker,
            gbuffer,
            &reservoirs,
            &mut history,
            &mut output,
        );

        assert_eq!(Vec4::ZERO, output[0]);
        assert_eq!(4.0, history[0].m());
        assert_eq!(0.0, history[0].w());
    }
}
