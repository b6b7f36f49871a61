use glam::{UVec2, Vec2};
use log::debug;
use rtgi_gpu::{
    spatial_disc_point, GBufferView, PackedReservoir, RestirPassParams,
    SPATIAL_DISC_SIZE,
};
use rtgi_shaders::restir_boiling::{self, BOILING_TILE_SIZE};
use rtgi_shaders::{
    restir_evaluate, restir_fused, restir_initial, restir_spatial,
    restir_temporal,
};

use crate::{
    dispatch_2d, GiFrame, GiStrategy, GiView, Handle, HistoryArena, RestirConfig,
};

/// Granularity the reservoir buffers' extents get rounded up to.
pub const RESERVOIR_PADDING: u32 = 4;

pub fn padded_size(size: UVec2) -> UVec2 {
    (size + RESERVOIR_PADDING - 1) / RESERVOIR_PADDING * RESERVOIR_PADDING
}

/// Number of reservoirs kept per pixel.
pub fn reservoir_count(config: &RestirConfig, view: &GiView) -> u32 {
    if config.num_reservoirs >= 0 {
        (config.num_reservoirs as u32)
            .clamp(config.min_reservoirs(), config.max_reservoirs())
    } else if view.subsampled {
        config.max_reservoirs()
    } else {
        1
    }
}

/// ReSTIR GI state of a single view: the reservoirs it carries between
/// frames and the spatial sampling pattern.
#[derive(Debug, Default)]
pub struct Restir {
    history: Option<RestirHistory>,
    disc: Option<Handle<Vec<Vec2>>>,
    current: Option<RestirFrame>,
}

#[derive(Clone, Copy, Debug)]
struct RestirHistory {
    reservoirs: Handle<Vec<PackedReservoir>>,
    padded_size: UVec2,
    slices: u32,
}

#[derive(Clone, Copy, Debug)]
struct RestirFrame {
    params: RestirPassParams,
    reservoirs: Handle<Vec<PackedReservoir>>,
    history: Handle<Vec<PackedReservoir>>,
    disc: Handle<Vec<Vec2>>,

    /// Slices of history that hold last frame's reservoirs; zero when the
    /// history is missing or got invalidated.
    prev_slices: u32,
}

impl Restir {
    /// Reservoirs persisted for the next frame, if any frame ran yet.
    pub fn history(&self) -> Option<Handle<Vec<PackedReservoir>>> {
        self.history.map(|history| history.reservoirs)
    }

    /// Current frame's reservoirs, `N + 1` slices of the padded extent.
    pub fn reservoirs(&self) -> Option<Handle<Vec<PackedReservoir>>> {
        self.current.map(|current| current.reservoirs)
    }

    /// Frees the reservoir history and the sampling pattern.
    pub fn release(&mut self, history: &mut HistoryArena) {
        if let Some(restir_history) = self.history.take() {
            history.remove(restir_history.reservoirs);
        }

        if let Some(disc) = self.disc.take() {
            history.remove(disc);
        }

        self.current = None;
    }

    /// Parameters of the frame being recorded.
    pub fn params(&self) -> Option<RestirPassParams> {
        self.current.map(|current| current.params)
    }

    fn prepare(&mut self, frame: &mut GiFrame) -> RestirFrame {
        let config = &frame.config.restir;
        let padded_size = padded_size(frame.view.size);
        let slices = reservoir_count(config, frame.view);
        let history_len = (padded_size.x * padded_size.y * slices) as usize;

        let (history, prev_slices) = match self.history {
            Some(history)
                if history.padded_size == padded_size
                    && frame.graph.history().contains(history.reservoirs.id()) =>
            {
                if history.slices != slices {
                    debug!(
                        "Resizing reservoir history; slices = {} -> {}",
                        history.slices, slices
                    );

                    if let Some(mut reservoirs) =
                        frame.graph.history().get_mut(history.reservoirs)
                    {
                        reservoirs.resize(history_len, PackedReservoir::default());
                    }
                }

                (history.reservoirs, history.slices.min(slices))
            }

            history => {
                if let Some(history) = history {
                    frame.graph.history_mut().remove(history.reservoirs);
                }

                debug!(
                    "Allocating reservoir history; padded size = {}, slices = {}",
                    padded_size, slices
                );

                let reservoirs = frame
                    .graph
                    .history_mut()
                    .insert(vec![PackedReservoir::default(); history_len]);

                (reservoirs, 0)
            }
        };

        self.history = Some(RestirHistory {
            reservoirs: history,
            padded_size,
            slices,
        });

        let disc = match self.disc {
            Some(disc) if frame.graph.history().contains(disc.id()) => disc,

            _ => {
                let n = SPATIAL_DISC_SIZE as u32;
                let disc = frame
                    .graph
                    .history_mut()
                    .insert((0..n).map(|i| spatial_disc_point(i, n)).collect::<Vec<_>>());

                self.disc = Some(disc);
                disc
            }
        };

        let camera_cut = frame.camera_cut || prev_slices == 0;

        if camera_cut {
            debug!("Camera cut; view = {}", frame.view.describe());
        }

        let reservoirs = frame.graph.create(vec![
            PackedReservoir::default();
            history_len + (padded_size.x * padded_size.y) as usize
        ]);

        RestirFrame {
            params: Self::build_params(frame, padded_size, slices, camera_cut),
            reservoirs,
            history,
            disc,
            prev_slices: if camera_cut { 0 } else { prev_slices },
        }
    }

    fn build_params(
        frame: &GiFrame,
        padded_size: UVec2,
        slices: u32,
        camera_cut: bool,
    ) -> RestirPassParams {
        let config = &frame.config.restir;

        let flags = [
            (camera_cut, RestirPassParams::FLAG_CAMERA_CUT),
            (config.approximate_visibility, RestirPassParams::FLAG_APPROX_VISIBILITY),
            (config.demodulate_materials, RestirPassParams::FLAG_DEMODULATE),
            (config.feedback_visibility, RestirPassParams::FLAG_FEEDBACK_VISIBILITY),
            (frame.flags.two_sided_geometry, RestirPassParams::FLAG_TWO_SIDED),
            (frame.flags.transmission, RestirPassParams::FLAG_TRANSMISSION),
            (frame.flags.hair, RestirPassParams::FLAG_HAIR),
        ]
        .into_iter()
        .filter(|(enabled, _)| *enabled)
        .fold(0, |flags, (_, flag)| flags | flag);

        let initial_candidates = if camera_cut {
            config.initial_samples_boost()
        } else {
            config.initial_samples()
        };

        RestirPassParams {
            seed: frame.seed,
            frame: frame.frame,
            view_size: frame.view.size,
            padded_size,
            slices: slices + 1,
            history_slices: slices,
            slice_in: 0,
            slice_out: 0,
            initial_candidates,
            spatial_samples: config.spatial_samples(),
            spatial_samples_boost: config.spatial_samples_boost(),
            spatial_radius: config.spatial_sampling_radius(),
            max_history: config.max_temporal_history() as f32,
            temporal_normal_threshold: config.temporal_normal_threshold(),
            temporal_depth_threshold: config.temporal_depth_threshold(),
            spatial_normal_threshold: config.spatial_normal_threshold(),
            spatial_depth_threshold: config.spatial_depth_threshold(),
            boiling_multiplier: restir_boiling::multiplier(
                config.boiling_filter_strength(),
            ),
            ray_bias: frame.config.ray_bias,
            light_sampler: config.light_sampler as u32,
            bias_correction: config.bias_correction as u32,
            visibility_test: config.test_initial_visibility as u32,
            flags,
            cut_block_size: frame.config.light_cuts.block_size(),
            max_cut_nodes: frame.lights.max_cut_nodes,
            min_distance_sqr: frame.lights.min_distance_sqr,
            camera_position: frame.view.position,
            approximate_cosine: frame.lights.approximate_cosine as u32,
        }
    }

    /// Whether slice `slice` gets merged with its history this frame.
    fn is_temporal(config: &RestirConfig, current: &RestirFrame, slice: u32) -> bool {
        config.temporal && slice < current.prev_slices
    }

    fn current(&mut self, frame: &mut GiFrame) -> RestirFrame {
        match self.current {
            Some(current) => current,
            None => {
                let current = self.prepare(frame);

                self.current = Some(current);
                current
            }
        }
    }
}

impl GiStrategy for Restir {
    fn generate_candidates(&mut self, frame: &mut GiFrame) {
        self.current = None;

        let current = self.current(frame);
        let config = &frame.config.restir;
        let tracer = frame.tracer;
        let lights = frame.lights;
        let gbuffer = frame.gbuffer;
        let prev_gbuffer = frame.prev_gbuffer;
        let reservoirs = current.reservoirs;
        let history = current.history;

        for slice in 0..current.params.history_slices {
            let temporal = Self::is_temporal(config, &current, slice);

            let mut params = RestirPassParams {
                slice_in: slice,
                slice_out: slice,
                ..current.params
            };

            if config.fused_sampling {
                if temporal {
                    params.flags |= RestirPassParams::FLAG_TEMPORAL;
                }

                let pass = frame
                    .graph
                    .add_pass(format!("restir_fused({slice})"))
                    .read(gbuffer)
                    .read(prev_gbuffer)
                    .read(history);

                lights.read(pass).write(reservoirs).run(move |res| {
                    let gbuffer = res.read(gbuffer);
                    let prev_gbuffer = res.read(prev_gbuffer);
                    let history = res.read(history);
                    let mut reservoirs = res.write(reservoirs);

                    lights.with(res, params.light_sampler(), |sampler| {
                        dispatch_2d(params.view_size, |global_id| {
                            restir_fused::main(
                                global_id,
                                &params,
                                sampler,
                                &tracer,
                                GBufferView::new(params.view_size, &gbuffer),
                                GBufferView::new(params.view_size, &prev_gbuffer),
                                &history,
                                &mut reservoirs,
                            );
                        });
                    });
                });
            } else {
                let pass = frame
                    .graph
                    .add_pass(format!("restir_initial({slice})"))
                    .read(gbuffer);

                lights.read(pass).write(reservoirs).run(move |res| {
                    let gbuffer = res.read(gbuffer);
                    let mut reservoirs = res.write(reservoirs);

                    lights.with(res, params.light_sampler(), |sampler| {
                        dispatch_2d(params.view_size, |global_id| {
                            restir_initial::main(
                                global_id,
                                &params,
                                sampler,
                                &tracer,
                                GBufferView::new(params.view_size, &gbuffer),
                                &mut reservoirs,
                            );
                        });
                    });
                });
            }
        }
    }

    fn reuse(&mut self, frame: &mut GiFrame) {
        let current = self.current(frame);
        let config = &frame.config.restir;
        let tracer = frame.tracer;
        let gbuffer = frame.gbuffer;
        let prev_gbuffer = frame.prev_gbuffer;
        let reservoirs = current.reservoirs;
        let history = current.history;
        let disc = current.disc;

        for slice in 0..current.params.history_slices {
            if !Self::is_temporal(config, &current, slice) {
                continue;
            }

            let params = RestirPassParams {
                slice_in: slice,
                slice_out: slice,
                flags: current.params.flags | RestirPassParams::FLAG_TEMPORAL,
                ..current.params
            };

            if !config.fused_sampling {
                frame
                    .graph
                    .add_pass(format!("restir_temporal({slice})"))
                    .read(gbuffer)
                    .read(prev_gbuffer)
                    .read(history)
                    .write(reservoirs)
                    .run(move |res| {
                        let gbuffer = res.read(gbuffer);
                        let prev_gbuffer = res.read(prev_gbuffer);
                        let history = res.read(history);
                        let mut reservoirs = res.write(reservoirs);

                        dispatch_2d(params.view_size, |global_id| {
                            restir_temporal::main(
                                global_id,
                                &params,
                                &tracer,
                                GBufferView::new(params.view_size, &gbuffer),
                                GBufferView::new(params.view_size, &prev_gbuffer),
                                &history,
                                &mut reservoirs,
                            );
                        });
                    });
            }

            if config.boiling_filter {
                let tiles = (params.view_size + BOILING_TILE_SIZE - 1) / BOILING_TILE_SIZE;

                frame
                    .graph
                    .add_pass(format!("restir_boiling({slice})"))
                    .write(reservoirs)
                    .run(move |res| {
                        let mut reservoirs = res.write(reservoirs);

                        dispatch_2d(tiles, |global_id| {
                            restir_boiling::main(global_id, &params, &mut reservoirs);
                        });
                    });
            }
        }

        if !config.spatial {
            return;
        }

        // Walking down lets slice `n` consume slice `n - 1` before the
        // latter gets overwritten by its own spatial pass.
        for slice in (1..=current.params.history_slices).rev() {
            let params = RestirPassParams {
                slice_in: slice - 1,
                slice_out: slice,
                ..current.params
            };

            frame
                .graph
                .add_pass(format!("restir_spatial({slice})"))
                .read(disc)
                .read(gbuffer)
                .write(reservoirs)
                .run(move |res| {
                    let disc = res.read(disc);
                    let gbuffer = res.read(gbuffer);
                    let mut reservoirs = res.write(reservoirs);

                    dispatch_2d(params.view_size, |global_id| {
                        restir_spatial::main(
                            global_id,
                            &params,
                            &disc,
                            &tracer,
                            GBufferView::new(params.view_size, &gbuffer),
                            &mut reservoirs,
                        );
                    });
                });
        }
    }

    fn evaluate(&mut self, frame: &mut GiFrame) {
        let current = self.current(frame);
        let tracer = frame.tracer;
        let gbuffer = frame.gbuffer;
        let output = frame.output;
        let reservoirs = current.reservoirs;
        let history = current.history;

        let params = RestirPassParams {
            slice_in: frame.config.restir.spatial as u32,
            ..current.params
        };

        frame
            .graph
            .add_pass("restir_evaluate")
            .read(gbuffer)
            .read(reservoirs)
            .write(history)
            .write(output)
            .run(move |res| {
                let gbuffer = res.read(gbuffer);
                let reservoirs = res.read(reservoirs);
                let mut history = res.write(history);
                let mut output = res.write(output);

                dispatch_2d(params.view_size, |global_id| {
                    restir_evaluate::main(
                        global_id,
                        &params,
                        &tracer,
                        GBufferView::new(params.view_size, &gbuffer),
                        &reservoirs,
                        &mut history,
                        &mut output,
                    );
                });
            });
    }
}
