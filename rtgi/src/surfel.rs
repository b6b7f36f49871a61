use log::debug;
use rtgi_gpu::{
    GBufferView, LightSamplerKind, Surfel, SurfelGridView, SurfelIrradiance,
    SurfelMeta, SurfelPassParams, SEGMENT_SIZE,
};
use rtgi_shaders::surfel_bin::SURFEL_GROUP_SIZE;
use rtgi_shaders::{
    prefix_scan, surfel_accumulate, surfel_allocate, surfel_bin,
    surfel_find_miss, surfel_recycle, surfel_shade,
};

use crate::{
    dispatch_1d, dispatch_2d, FrameGraph, GiFrame, GiStrategy, Handle,
    HistoryArena, SurfelConfig,
};

/// Surfel pool and grid of a single view, kept in the history arena.
#[derive(Clone, Copy, Debug)]
pub struct SurfelCache {
    pub surfels: Handle<Vec<Surfel>>,
    pub irradiance: Handle<Vec<SurfelIrradiance>>,
    pub meta: Handle<SurfelMeta>,
    pub free_list: Handle<Vec<u32>>,

    /// Start of every hashed cell's range in `indices`, plus the total.
    pub offsets: Handle<Vec<u32>>,

    pub indices: Handle<Vec<u32>>,
    layout: SurfelLayout,
}

/// Whatever decides the sizes of the cache's buffers.
#[derive(Clone, Copy, Debug, PartialEq)]
struct SurfelLayout {
    capacity: u32,
    cells: u32,
    cell_size: f32,
    surfel_radius: f32,
}

impl SurfelLayout {
    fn new(config: &SurfelConfig) -> Self {
        Self {
            capacity: config.capacity(),
            cells: config.cells(),
            cell_size: config.cell_size(),
            surfel_radius: config.surfel_radius.max(0.0),
        }
    }

    /// Upper bound on the number of cells a single surfel touches.
    fn cells_per_surfel(&self) -> u32 {
        let span = (2.0 * self.surfel_radius / self.cell_size).ceil() as u32 + 1;

        span * span * span
    }
}

impl SurfelCache {
    fn allocate(history: &mut HistoryArena, layout: SurfelLayout) -> Self {
        debug!(
            "Allocating surfel cache; capacity = {}, cells = {}",
            layout.capacity, layout.cells
        );

        let capacity = layout.capacity as usize;

        Self {
            surfels: history.insert(vec![Surfel::default(); capacity]),
            irradiance: history.insert(vec![SurfelIrradiance::ZERO; capacity]),
            meta: history.insert(SurfelMeta::default()),
            free_list: history.insert(vec![0; capacity]),
            offsets: history.insert(vec![0; layout.cells as usize + 1]),
            indices: history.insert(vec![
                0;
                capacity * layout.cells_per_surfel() as usize
            ]),
            layout,
        }
    }

    fn release(self, history: &mut HistoryArena) {
        history.remove(self.surfels);
        history.remove(self.irradiance);
        history.remove(self.meta);
        history.remove(self.free_list);
        history.remove(self.offsets);
        history.remove(self.indices);
    }

    fn is_alive(&self, history: &HistoryArena) -> bool {
        [
            self.surfels.id(),
            self.irradiance.id(),
            self.meta.id(),
            self.free_list.id(),
            self.offsets.id(),
            self.indices.id(),
        ]
        .into_iter()
        .all(|id| history.contains(id))
    }
}

/// Surfel GI of a single view: surfels get spawned where the screen isn't
/// covered, gather irradiance over a couple of frames and light the pixels
/// around them.
#[derive(Debug, Default)]
pub struct Surfels {
    cache: Option<SurfelCache>,
    current: Option<SurfelFrame>,
}

#[derive(Clone, Copy, Debug)]
struct SurfelFrame {
    params: SurfelPassParams,
    cache: SurfelCache,
}

impl Surfels {
    pub fn cache(&self) -> Option<SurfelCache> {
        self.cache
    }

    /// Frees the surfel pool.
    pub fn release(&mut self, history: &mut HistoryArena) {
        if let Some(cache) = self.cache.take() {
            cache.release(history);
        }

        self.current = None;
    }

    fn prepare(&mut self, frame: &mut GiFrame) -> SurfelFrame {
        let config = &frame.config.surfel;
        let layout = SurfelLayout::new(config);

        let cache = match self.cache {
            Some(cache) if cache.layout == layout && cache.is_alive(frame.graph.history()) => cache,

            cache => {
                if let Some(cache) = cache {
                    cache.release(frame.graph.history_mut());
                }

                let cache = SurfelCache::allocate(frame.graph.history_mut(), layout);

                self.cache = Some(cache);
                cache
            }
        };

        let flags = if config.demodulate_materials {
            SurfelPassParams::FLAG_DEMODULATE
        } else {
            0
        };

        SurfelFrame {
            params: SurfelPassParams {
                seed: frame.seed,
                frame: frame.frame,
                view_size: frame.view.size,
                cell_size: layout.cell_size,
                surfel_radius: layout.surfel_radius,
                cells: layout.cells,
                max_lifetime: config.max_lifetime,
                max_samples: config.max_samples.max(1) as f32,
                spawn_coverage: config.spawn_coverage,
                spawn_chance: config.spawn_chance,
                ray_bias: frame.config.ray_bias,
                light_count: frame.lights.count,
                infinite_count: frame.lights.infinite_count,
                flags,
                _pad: 0,
            },
            cache,
        }
    }

    fn current(&mut self, frame: &mut GiFrame) -> SurfelFrame {
        match self.current {
            Some(current) => current,
            None => {
                let current = self.prepare(frame);

                self.current = Some(current);
                current
            }
        }
    }

    /// Rebuilds the grid from the current pool: counts surfels per cell,
    /// scans the counts into offsets and slots surfel indices into place.
    fn bin(graph: &mut FrameGraph, params: SurfelPassParams, cache: SurfelCache) {
        let args = graph.create([0u32; 3]);
        let sums = graph.create(vec![0u32; SEGMENT_SIZE as usize]);
        let cells = params.cells as usize;
        let segments = prefix_scan::segments(cells);

        graph
            .add_pass("surfel_dispatch_args")
            .read(cache.meta)
            .write(args)
            .run(move |res| {
                let meta = res.read(cache.meta);
                let mut args = res.write(args);

                dispatch_1d(1, |global_id| {
                    surfel_bin::dispatch_args(global_id, &meta, &mut args);
                });
            });

        graph
            .add_pass("surfel_clear")
            .write(cache.offsets)
            .run(move |res| {
                let mut offsets = res.write(cache.offsets);

                dispatch_1d(params.cells + 1, |global_id| {
                    surfel_bin::clear(global_id, &params, &mut offsets);
                });
            });

        graph
            .add_pass("surfel_count")
            .read(args)
            .read(cache.meta)
            .read(cache.surfels)
            .write(cache.offsets)
            .run(move |res| {
                let args = res.read(args);
                let meta = res.read(cache.meta);
                let surfels = res.read(cache.surfels);
                let mut offsets = res.write(cache.offsets);

                dispatch_1d(args[0] * SURFEL_GROUP_SIZE, |global_id| {
                    surfel_bin::count(global_id, &params, &meta, &surfels, &mut offsets);
                });
            });

        graph
            .add_pass("surfel_scan_segments")
            .write(cache.offsets)
            .run(move |res| {
                let mut offsets = res.write(cache.offsets);

                dispatch_1d(segments, |global_id| {
                    prefix_scan::scan_segment(global_id, &mut offsets[..cells]);
                });
            });

        graph
            .add_pass("surfel_scan_sums")
            .read(cache.offsets)
            .write(sums)
            .run(move |res| {
                let offsets = res.read(cache.offsets);
                let mut sums = res.write(sums);

                dispatch_1d(1, |global_id| {
                    prefix_scan::scan_segment_sums(global_id, &offsets[..cells], &mut sums);
                });
            });

        graph
            .add_pass("surfel_scan_merge")
            .read(sums)
            .write(cache.offsets)
            .run(move |res| {
                let sums = res.read(sums);
                let mut offsets = res.write(cache.offsets);

                dispatch_1d(segments, |global_id| {
                    prefix_scan::merge(global_id, &mut offsets[..cells], &sums);
                });
            });

        graph
            .add_pass("surfel_seal")
            .write(cache.offsets)
            .run(move |res| {
                let mut offsets = res.write(cache.offsets);

                dispatch_1d(1, |global_id| {
                    surfel_bin::seal(global_id, &params, &mut offsets);
                });
            });

        graph
            .add_pass("surfel_slot")
            .read(args)
            .read(cache.meta)
            .read(cache.surfels)
            .write(cache.offsets)
            .write(cache.indices)
            .run(move |res| {
                let args = res.read(args);
                let meta = res.read(cache.meta);
                let surfels = res.read(cache.surfels);
                let mut offsets = res.write(cache.offsets);
                let mut indices = res.write(cache.indices);

                dispatch_1d(args[0] * SURFEL_GROUP_SIZE, |global_id| {
                    surfel_bin::slot(global_id, &params, &meta, &surfels, &mut offsets, &mut indices);
                });
            });
    }
}

impl GiStrategy for Surfels {
    /// Spawns surfels where the screen lacks coverage and rebins the pool.
    fn generate_candidates(&mut self, frame: &mut GiFrame) {
        self.current = None;

        let SurfelFrame { params, cache } = self.current(frame);
        let gbuffer = frame.gbuffer;
        let tiles = params.tiles();
        let misses = frame.graph.create(vec![0u32; (tiles.x * tiles.y) as usize]);

        frame
            .graph
            .add_pass("surfel_find_miss")
            .read(gbuffer)
            .read(cache.offsets)
            .read(cache.indices)
            .read(cache.surfels)
            .write(misses)
            .run(move |res| {
                let gbuffer = res.read(gbuffer);
                let offsets = res.read(cache.offsets);
                let indices = res.read(cache.indices);
                let surfels = res.read(cache.surfels);
                let mut misses = res.write(misses);
                let grid = grid(&params, &offsets, &indices);

                dispatch_2d(tiles, |global_id| {
                    surfel_find_miss::main(
                        global_id,
                        &params,
                        GBufferView::new(params.view_size, &gbuffer),
                        grid,
                        &surfels,
                        &mut misses,
                    );
                });
            });

        frame
            .graph
            .add_pass("surfel_allocate")
            .read(gbuffer)
            .read(misses)
            .read(cache.free_list)
            .write(cache.meta)
            .write(cache.surfels)
            .write(cache.irradiance)
            .run(move |res| {
                let gbuffer = res.read(gbuffer);
                let misses = res.read(misses);
                let free_list = res.read(cache.free_list);
                let mut meta = res.write(cache.meta);
                let mut surfels = res.write(cache.surfels);
                let mut irradiance = res.write(cache.irradiance);

                dispatch_1d(tiles.x * tiles.y, |global_id| {
                    surfel_allocate::main(
                        global_id,
                        &params,
                        GBufferView::new(params.view_size, &gbuffer),
                        &misses,
                        &mut meta,
                        &free_list,
                        &mut surfels,
                        &mut irradiance,
                    );
                });
            });

        Self::bin(frame.graph, params, cache);
    }

    /// Gathers one more irradiance sample for every surfel.
    fn reuse(&mut self, frame: &mut GiFrame) {
        let SurfelFrame { params, cache } = self.current(frame);
        let tracer = frame.tracer;
        let lights = frame.lights;

        let pass = frame
            .graph
            .add_pass("surfel_accumulate")
            .read(cache.meta)
            .read(cache.surfels);

        lights
            .read(pass)
            .write(cache.irradiance)
            .run(move |res| {
                let meta = res.read(cache.meta);
                let surfels = res.read(cache.surfels);
                let mut irradiance = res.write(cache.irradiance);

                lights.with(res, LightSamplerKind::LightTree, |sampler| {
                    dispatch_1d(meta.high_water, |global_id| {
                        surfel_accumulate::main(
                            global_id,
                            &params,
                            sampler,
                            &tracer,
                            &meta,
                            &surfels,
                            &mut irradiance,
                        );
                    });
                });
            });
    }

    /// Shades pixels from the surfels covering them, then recycles surfels
    /// nobody looked at for too long.
    fn evaluate(&mut self, frame: &mut GiFrame) {
        let SurfelFrame { params, cache } = self.current(frame);
        let gbuffer = frame.gbuffer;
        let output = frame.output;

        frame
            .graph
            .add_pass("surfel_shade")
            .read(gbuffer)
            .read(cache.offsets)
            .read(cache.indices)
            .read(cache.irradiance)
            .write(cache.surfels)
            .write(output)
            .run(move |res| {
                let gbuffer = res.read(gbuffer);
                let offsets = res.read(cache.offsets);
                let indices = res.read(cache.indices);
                let irradiance = res.read(cache.irradiance);
                let mut surfels = res.write(cache.surfels);
                let mut output = res.write(output);
                let grid = grid(&params, &offsets, &indices);

                dispatch_2d(params.view_size, |global_id| {
                    surfel_shade::main(
                        global_id,
                        &params,
                        GBufferView::new(params.view_size, &gbuffer),
                        grid,
                        &mut surfels,
                        &irradiance,
                        &mut output,
                    );
                });
            });

        frame
            .graph
            .add_pass("surfel_recycle")
            .write(cache.meta)
            .write(cache.surfels)
            .write(cache.free_list)
            .run(move |res| {
                let mut meta = res.write(cache.meta);
                let mut surfels = res.write(cache.surfels);
                let mut free_list = res.write(cache.free_list);
                let high_water = meta.high_water;

                dispatch_1d(high_water, |global_id| {
                    surfel_recycle::main(global_id, &params, &mut meta, &mut surfels, &mut free_list);
                });
            });
    }
}

fn grid<'a>(params: &SurfelPassParams, offsets: &'a [u32], indices: &'a [u32]) -> SurfelGridView<'a> {
    SurfelGridView {
        cell_size: params.cell_size,
        cells: params.cells,
        offsets,
        indices,
    }
}
