use glam::UVec2;
use log::debug;
use rtgi_gpu::{
    CosineDistanceBound, CutErrorBound, GBufferEntry, GBufferView,
    LightCutParams, LightNode, LightTreeLayout,
};
use rtgi_shaders::light_cuts::{self, MAX_CUT_NODES};

use crate::{dispatch_2d, FrameGraph, Handle, HistoryArena, LightCutConfig};

/// Per-view light cuts.
///
/// With an interleave rate above one, every tile keeps its cut for a couple
/// of frames, which is why the cut buffer is kept in the view's history.
#[derive(Debug, Default)]
pub struct LightCuts {
    cuts: Option<CutBuffer>,
}

/// Cut buffer together with the shape of the tree its node indices point
/// into.
#[derive(Clone, Copy, Debug)]
struct CutBuffer {
    handle: Handle<Vec<u32>>,
    len: usize,
    layout: LightTreeLayout,
}

impl LightCuts {
    pub fn release(&mut self, history: &mut HistoryArena) {
        if let Some(cuts) = self.cuts.take() {
            history.remove(cuts.handle);
        }
    }

    pub fn params(
        config: &LightCutConfig,
        view_size: UVec2,
        frame: u32,
        min_distance: f32,
    ) -> LightCutParams {
        LightCutParams {
            view_size,
            block_size: config.block_size(),
            max_cut_nodes: config.max_cut_nodes(),
            share_group_size: config.share_group_size(),
            interleave_rate: config.interleave_rate(),
            frame,
            approximate_cosine: config.approximate_cosine_bound as u32,
            error_limit: config.error_limit(),
            min_distance_sqr: min_distance * min_distance,
        }
    }

    pub fn default_bound(params: &LightCutParams) -> CosineDistanceBound {
        CosineDistanceBound {
            min_distance_sqr: params.min_distance_sqr,
            approximate: params.approximate_cosine != 0,
        }
    }

    /// Number of entries in the cut buffer of given view.
    pub fn buffer_len(params: &LightCutParams) -> usize {
        let tiles = params.tiles();

        MAX_CUT_NODES * (tiles.x * tiles.y) as usize
    }

    /// Finds cuts of all tiles scheduled this frame.
    pub fn find(
        params: &LightCutParams,
        bound: &impl CutErrorBound,
        gbuffer: GBufferView,
        nodes: &[LightNode],
        cuts: &mut [u32],
    ) {
        dispatch_2d(params.tiles(), |global_id| {
            light_cuts::main(global_id, params, bound, gbuffer, nodes, cuts);
        });
    }

    /// Records the `light_cuts` pass and returns the cut buffer.
    ///
    /// Cuts kept from previous frames index into the tree they were found
    /// for, so they are dropped (and every tile gets rescheduled) whenever
    /// the tree's layout changes or the camera cuts.
    pub fn add_passes<'g>(
        &mut self,
        graph: &mut FrameGraph<'g>,
        layout: LightTreeLayout,
        camera_cut: bool,
        mut params: LightCutParams,
        bound: impl CutErrorBound + 'g,
        gbuffer: Handle<Vec<GBufferEntry>>,
        nodes: Handle<Vec<LightNode>>,
    ) -> Handle<Vec<u32>> {
        let len = Self::buffer_len(&params);

        let cuts = match self.cuts {
            Some(cuts)
                if !camera_cut
                    && cuts.len == len
                    && cuts.layout == layout
                    && graph.history().contains(cuts.handle.id()) =>
            {
                cuts.handle
            }

            other => {
                if let Some(cuts) = other {
                    graph.history_mut().remove(cuts.handle);
                }

                debug!(
                    "Allocating light cuts; tiles = {}, lights = {}",
                    params.tiles(),
                    layout.lights
                );

                let handle = graph
                    .history_mut()
                    .insert(vec![LightNode::ID_EMPTY; len]);

                self.cuts = Some(CutBuffer {
                    handle,
                    len,
                    layout,
                });

                params.interleave_rate = 1;
                handle
            }
        };

        graph
            .add_pass("light_cuts")
            .read(gbuffer)
            .read(nodes)
            .write(cuts)
            .run(move |res| {
                let gbuffer = res.read(gbuffer);
                let gbuffer = GBufferView::new(params.view_size, &gbuffer);

                Self::find(&params, &bound, gbuffer, &res.read(nodes), &mut res.write(cuts));
            });

        cuts
    }
}
