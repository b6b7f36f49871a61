use glam::Vec4;
use rtgi_gpu::{GBufferEntry, LightNode, LightSamplerKind, LightSamplerView, RayTracer};

use crate::{
    ExtractedLights, FrameGraph, GiConfig, GiFeatureFlags, GiView, Handle,
    PassBuilder, Resources,
};

/// Everything a [`crate::GiStrategy`] needs to record its passes for a
/// single view and frame.
pub struct GiFrame<'a, 'g> {
    pub graph: &'a mut FrameGraph<'g>,
    pub config: &'g GiConfig,
    pub view: &'g GiView,
    pub tracer: &'g dyn RayTracer,
    pub flags: GiFeatureFlags,
    pub seed: u32,
    pub frame: u32,

    /// Whether the view's history can't be trusted this frame.
    pub camera_cut: bool,

    pub gbuffer: Handle<Vec<GBufferEntry>>,

    /// G-buffer of the previous frame, as seen by this view.
    pub prev_gbuffer: Handle<Vec<GBufferEntry>>,

    pub lights: LightSamplerHandles,

    /// Diffuse indirect lighting (`xyz`) and hit distance (`w`) per pixel.
    pub output: Handle<Vec<Vec4>>,
}

/// Resources the kernels sample lights with.
#[derive(Clone, Copy, Debug)]
pub struct LightSamplerHandles {
    pub lights: Handle<ExtractedLights>,
    pub nodes: Handle<Vec<LightNode>>,
    pub cuts: Handle<Vec<u32>>,
    pub max_cut_nodes: u32,
    pub min_distance_sqr: f32,
    pub approximate_cosine: bool,

    /// Number of lights, known up front so that passes can be skipped on
    /// empty scenes.
    pub count: u32,
    pub infinite_count: u32,
}

impl LightSamplerHandles {
    /// Declares reads of all the sampling resources.
    pub fn read<'a, 'g>(&self, pass: PassBuilder<'a, 'g>) -> PassBuilder<'a, 'g> {
        pass.read(self.lights).read(self.nodes).read(self.cuts)
    }

    pub fn with<R>(
        &self,
        res: &Resources,
        kind: LightSamplerKind,
        f: impl FnOnce(&LightSamplerView) -> R,
    ) -> R {
        let lights = res.read(self.lights);
        let nodes = res.read(self.nodes);
        let cuts = res.read(self.cuts);

        let sampler = LightSamplerView {
            kind,
            lights: lights.view(),
            nodes: &nodes,
            cuts: &cuts,
            max_cut_nodes: self.max_cut_nodes,
            power_cdf: lights.power_cdf(),
            min_distance_sqr: self.min_distance_sqr,
            approximate_cosine: self.approximate_cosine,
        };

        f(&sampler)
    }
}
