use std::collections::hash_map::Entry;

use fxhash::FxHashMap;
use glam::Vec4;
use log::{debug, info, warn};
use rtgi_gpu::{GBufferEntry, LightSamplerKind, PackedReservoir, RayTracer};

use crate::{
    BruteForce, Ddgi, DdgiArchiveVersion, DdgiManager, DdgiSceneId,
    DdgiVolume, DdgiVolumeId, FrameGraph, GiBackend, GiConfig,
    GiFeatureFlags, GiFrame, GiStrategy, GiView, Handle, HistoryArena,
    LightCuts, LightExtractor, LightSamplerHandles, LightTree, Lights, Restir,
    Scene, Surfels,
};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct GiViewId(pub u32);

/// Whatever a view carries from one frame to the next.
#[derive(Debug, Default)]
struct ViewState {
    restir: Restir,
    surfels: Surfels,
    light_cuts: LightCuts,
    prev_gbuffer: Option<Handle<Vec<GBufferEntry>>>,
    prev_view: Option<GiView>,

    /// Backend of the previous frame; history of one backend is of no use
    /// to the others.
    backend: Option<GiBackend>,
}

impl ViewState {
    fn release_backends(&mut self, history: &mut HistoryArena) {
        self.restir.release(history);
        self.surfels.release(history);
    }

    fn release(&mut self, history: &mut HistoryArena) {
        self.release_backends(history);
        self.light_cuts.release(history);

        if let Some(prev_gbuffer) = self.prev_gbuffer.take() {
            history.remove(prev_gbuffer);
        }
    }
}

/// What a frame produced.
#[derive(Clone, Debug)]
pub struct RenderedFrame {
    /// Diffuse indirect lighting (`xyz`) and hit distance (`w`) per pixel.
    pub diffuse: Vec<Vec4>,

    /// This frame's reservoirs, when rendered with ReSTIR.
    pub reservoirs: Option<Vec<PackedReservoir>>,

    /// Labels of the passes that ran, in execution order.
    pub passes: Vec<String>,
}

/// Computes diffuse GI for any number of views, keeping each view's history
/// (and the scene's probes) between frames.
#[derive(Debug)]
pub struct GiRenderer {
    config: GiConfig,
    flags: GiFeatureFlags,
    lights: Lights,
    ddgi: DdgiManager,
    views: FxHashMap<GiViewId, ViewState>,
    history: HistoryArena,
    frame: u32,
}

impl GiRenderer {
    pub fn new(config: GiConfig) -> Self {
        info!("Initializing; backend = {:?}", config.backend);

        Self {
            config,
            flags: Default::default(),
            lights: Default::default(),
            ddgi: Default::default(),
            views: Default::default(),
            history: Default::default(),
            frame: 0,
        }
    }

    pub fn config(&self) -> &GiConfig {
        &self.config
    }

    /// Replaces the config; takes effect starting from the next frame.
    pub fn set_config(&mut self, config: GiConfig) {
        if config.backend != self.config.backend {
            debug!(
                "Switching backend: {:?} -> {:?}",
                self.config.backend, config.backend
            );
        }

        self.config = config;
    }

    pub fn flags(&self) -> GiFeatureFlags {
        self.flags
    }

    pub fn set_flags(&mut self, flags: GiFeatureFlags) {
        self.flags = flags;
    }

    pub fn lights(&self) -> &Lights {
        &self.lights
    }

    pub fn lights_mut(&mut self) -> &mut Lights {
        &mut self.lights
    }

    pub fn ddgi(&self) -> &DdgiManager {
        &self.ddgi
    }

    pub fn ddgi_mut(&mut self) -> &mut DdgiManager {
        &mut self.ddgi
    }

    pub fn remove_ddgi_volume(&mut self, id: DdgiVolumeId) -> Option<DdgiVolume> {
        self.ddgi.remove_volume(id, &mut self.history)
    }

    pub fn destroy_ddgi_render_state(&mut self, id: DdgiVolumeId) {
        self.ddgi.destroy_render_state(id, &mut self.history);
    }

    pub fn save_ddgi_volume(&self, id: DdgiVolumeId, version: DdgiArchiveVersion) -> Option<Vec<u8>> {
        self.ddgi.save(id, &self.history, version)
    }

    /// Forgets given view, releasing its history.
    pub fn remove_view(&mut self, id: GiViewId) {
        let Some(mut state) = self.views.remove(&id) else {
            return;
        };

        info!("Deleting view state: {:?}", id);

        state.release(&mut self.history);
    }

    /// Renders the default view.
    pub fn render(&mut self, view: &GiView, scene: &Scene) -> RenderedFrame {
        self.render_view(GiViewId::default(), view, scene)
    }

    /// Renders given view of an analytic scene.
    pub fn render_view(&mut self, id: GiViewId, view: &GiView, scene: &Scene) -> RenderedFrame {
        let prev_view = self
            .views
            .get(&id)
            .and_then(|state| state.prev_view.as_ref())
            .filter(|prev_view| prev_view.size == view.size);

        let gbuffer = scene.render_gbuffer(view, prev_view);

        self.render_gbuffer(id, view, gbuffer, scene)
    }

    /// Renders given view from an already rasterized g-buffer; `tracer`
    /// answers the secondary rays.
    pub fn render_gbuffer(
        &mut self,
        id: GiViewId,
        view: &GiView,
        gbuffer: Vec<GBufferEntry>,
        tracer: &dyn RayTracer,
    ) -> RenderedFrame {
        let frame = self.frame;

        self.frame = self.frame.wrapping_add(1);

        let seed = match self.config.seed {
            Some(seed) => seed ^ frame.wrapping_mul(0x9e37_79b9),
            None => rand::random(),
        };

        let pixels = (view.size.x * view.size.y) as usize;

        if gbuffer.len() != pixels {
            warn!(
                "G-buffer doesn't match the view ({} entries for {}); resizing",
                gbuffer.len(),
                view.describe()
            );
        }

        let mut gbuffer = gbuffer;

        gbuffer.resize(pixels, GBufferEntry::default());

        self.ddgi.prepare(&self.config.ddgi, &mut self.history);

        let state = match self.views.entry(id) {
            Entry::Occupied(entry) => entry.into_mut(),

            Entry::Vacant(entry) => {
                info!("Creating view state: {:?} ({})", id, view.describe());

                entry.insert(Default::default())
            }
        };

        let backend = self.config.backend;

        if state.backend.is_some_and(|prev| prev != backend) {
            state.release_backends(&mut self.history);
        }

        let camera_cut = view.camera_cut
            || state.backend != Some(backend)
            || state
                .prev_view
                .as_ref()
                .map_or(true, |prev_view| prev_view.size != view.size);

        let prev_gbuffer = match state.prev_gbuffer.take() {
            Some(prev_gbuffer) if camera_cut => {
                self.history.remove(prev_gbuffer);
                None
            }

            prev_gbuffer => prev_gbuffer.filter(|prev_gbuffer| {
                self.history.contains(prev_gbuffer.id())
            }),
        };

        let gbuffer = self.history.insert(gbuffer);

        let lights = LightExtractor::new(&self.config.lighting, &self.lights).extract(view);
        let tree = LightTree::init(lights.finite_count(), &self.config.light_tree);
        let tree_params = tree.params(&lights);
        let min_distance = tree.min_distance(&lights);
        let light_count = lights.count();
        let infinite_count = lights.infinite_count();

        let cut_params = LightCuts::params(
            &self.config.light_cuts,
            view.size,
            frame,
            min_distance,
        );

        let mut graph = FrameGraph::new(&mut self.history);
        let lights = graph.create(lights);
        let nodes = tree.add_passes(&mut graph, tree_params, lights);

        let cuts = if self.config.light_sampler() == LightSamplerKind::LightCuts {
            state.light_cuts.add_passes(
                &mut graph,
                tree.layout(),
                camera_cut,
                cut_params,
                LightCuts::default_bound(&cut_params),
                gbuffer,
                nodes,
            )
        } else {
            graph.create(Vec::new())
        };

        let transient_prev_gbuffer = prev_gbuffer
            .unwrap_or_else(|| graph.create(vec![GBufferEntry::default(); pixels]));

        let output = graph.create(vec![Vec4::ZERO; pixels]);

        graph.export(output);

        let mut gi = GiFrame {
            graph: &mut graph,
            config: &self.config,
            view,
            tracer,
            flags: self.flags,
            seed,
            frame,
            camera_cut,
            gbuffer,
            prev_gbuffer: transient_prev_gbuffer,
            lights: LightSamplerHandles {
                lights,
                nodes,
                cuts,
                max_cut_nodes: cut_params.max_cut_nodes,
                min_distance_sqr: cut_params.min_distance_sqr,
                approximate_cosine: self.config.light_cuts.approximate_cosine_bound,
                count: light_count,
                infinite_count,
            },
            output,
        };

        let reservoirs = match backend {
            GiBackend::BruteForce => {
                BruteForce.record(&mut gi);
                None
            }

            GiBackend::Restir => {
                state.restir.record(&mut gi);
                state.restir.reservoirs()
            }

            GiBackend::Ddgi => {
                Ddgi::new(&mut self.ddgi, DdgiSceneId::default()).record(&mut gi);
                None
            }

            GiBackend::Surfel => {
                state.surfels.record(&mut gi);
                None
            }
        };

        if let Some(reservoirs) = reservoirs {
            graph.export(reservoirs);
        }

        let mut output_res = graph.execute();
        let diffuse = output_res.take(output).unwrap_or_default();
        let reservoirs = reservoirs.and_then(|reservoirs| output_res.take(reservoirs));
        let passes = output_res.executed().to_vec();

        if let Some(prev_gbuffer) = prev_gbuffer {
            self.history.remove(prev_gbuffer);
        }

        state.prev_gbuffer = Some(gbuffer);
        state.prev_view = Some(view.clone());
        state.backend = Some(backend);

        RenderedFrame {
            diffuse,
            reservoirs,
            passes,
        }
    }
}
