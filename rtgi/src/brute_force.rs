use rtgi_gpu::{BruteForcePassParams, GBufferView};
use rtgi_shaders::brute_force;

use crate::{dispatch_2d, GiFrame, GiStrategy};

/// Path tracing without any reuse: everything happens in a single pass
/// during evaluation.
#[derive(Debug, Default)]
pub struct BruteForce;

impl BruteForce {
    fn params(frame: &GiFrame) -> BruteForcePassParams {
        let config = &frame.config.brute_force;

        let flags = [
            (config.demodulate_materials, BruteForcePassParams::FLAG_DEMODULATE),
            (frame.flags.two_sided_geometry, BruteForcePassParams::FLAG_TWO_SIDED),
        ]
        .into_iter()
        .filter(|(enabled, _)| *enabled)
        .fold(0, |flags, (_, flag)| flags | flag);

        BruteForcePassParams {
            seed: frame.seed,
            samples_per_pixel: config.samples_per_pixel,
            max_bounces: config.max_bounces,
            flags,
            view_size: frame.view.size,
            ray_bias: frame.config.ray_bias,
            min_distance_sqr: frame.lights.min_distance_sqr,
        }
    }
}

impl GiStrategy for BruteForce {
    fn generate_candidates(&mut self, _: &mut GiFrame) {
        //
    }

    fn reuse(&mut self, _: &mut GiFrame) {
        //
    }

    fn evaluate(&mut self, frame: &mut GiFrame) {
        let params = Self::params(frame);
        let kind = frame.config.brute_force.light_sampler;
        let tracer = frame.tracer;
        let lights = frame.lights;
        let gbuffer = frame.gbuffer;
        let output = frame.output;

        let pass = frame.graph.add_pass("brute_force").read(gbuffer);

        lights.read(pass).write(output).run(move |res| {
            let gbuffer = res.read(gbuffer);
            let mut output = res.write(output);

            lights.with(res, kind, |sampler| {
                dispatch_2d(params.view_size, |global_id| {
                    brute_force::main(
                        global_id,
                        &params,
                        sampler,
                        &tracer,
                        GBufferView::new(params.view_size, &gbuffer),
                        &mut output,
                    );
                });
            });
        });
    }
}
