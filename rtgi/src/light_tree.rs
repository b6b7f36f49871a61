use log::debug;
use rtgi_gpu::{
    BitonicSortParams, LightNode, LightRecord, LightTreeLayout,
    LightTreeLevelsParams, LightTreeParams,
};
use rtgi_shaders::{
    light_tree_leaves, light_tree_levels, light_tree_morton, light_tree_sort,
};

use crate::{
    dispatch_1d, ExtractedLights, FrameGraph, Handle, LightTreeConfig,
};

/// Binary tree over the finite lights, built on every frame by sorting the
/// lights along a Morton curve and folding the sorted leaves bottom-up.
#[derive(Clone, Debug)]
pub struct LightTree {
    layout: LightTreeLayout,
    params: LightTreeParams,
    batches: Vec<LightTreeLevelsParams>,
}

impl LightTree {
    /// Lays out the tree for given number of finite lights; zero lights
    /// yield a minimal tree with nothing but empty leaves.
    pub fn init(finite_lights: u32, config: &LightTreeConfig) -> Self {
        let layout = LightTreeLayout::new(finite_lights);
        let batches = level_batches(layout.levels, config.max_work_load());

        debug!(
            "Initializing light tree; lights = {}, levels = {}, batches = {}",
            finite_lights,
            layout.levels,
            batches.len()
        );

        Self {
            layout,
            params: LightTreeParams {
                levels: layout.levels,
                lights: layout.lights,
                quantization_levels: config.quantization_levels(),
                ..Default::default()
            },
            batches,
        }
    }

    pub fn layout(&self) -> LightTreeLayout {
        self.layout
    }

    pub fn batches(&self) -> &[LightTreeLevelsParams] {
        &self.batches
    }

    /// Parameters for building the tree over given lights.
    pub fn params(&self, lights: &ExtractedLights) -> LightTreeParams {
        let (bound_min, bound_max) = lights.bound();

        LightTreeParams {
            bound_min,
            bound_max,
            light_count: lights.count(),
            infinite_count: lights.infinite_count(),
            ..self.params
        }
    }

    /// Smallest distance the cosine/distance bounds clamp to, so that points
    /// right next to a light don't blow its importance up.
    pub fn min_distance(&self, lights: &ExtractedLights) -> f32 {
        2.0 * lights.bound_radius() / self.params.quantization_levels as f32
    }

    pub fn build(
        &self,
        params: &LightTreeParams,
        lights: &[LightRecord],
        keys: &mut Vec<u64>,
        nodes: &mut Vec<LightNode>,
    ) {
        keys.clear();
        keys.resize(self.layout.lights as usize, u64::MAX);
        nodes.clear();
        nodes.resize(self.layout.storage_nodes() as usize, LightNode::EMPTY);

        morton(params, lights, keys);
        sort(keys);
        leaves(params, lights, keys, nodes);

        for batch in &self.batches {
            levels(batch, nodes);
        }
    }

    /// Records the passes building this tree and returns the node buffer.
    pub fn add_passes(
        &self,
        graph: &mut FrameGraph,
        params: LightTreeParams,
        lights: Handle<ExtractedLights>,
    ) -> Handle<Vec<LightNode>> {
        let keys = graph.create(vec![u64::MAX; self.layout.lights as usize]);

        let nodes = graph.create(vec![
            LightNode::EMPTY;
            self.layout.storage_nodes() as usize
        ]);

        graph
            .add_pass("light_tree_morton")
            .read(lights)
            .write(keys)
            .run(move |res| {
                morton(&params, res.read(lights).records(), &mut res.write(keys));
            });

        graph
            .add_pass("light_tree_sort")
            .write(keys)
            .run(move |res| sort(&mut res.write(keys)));

        graph
            .add_pass("light_tree_leaves")
            .read(lights)
            .read(keys)
            .write(nodes)
            .run(move |res| {
                leaves(
                    &params,
                    res.read(lights).records(),
                    &res.read(keys),
                    &mut res.write(nodes),
                );
            });

        for batch in self.batches.iter().copied() {
            graph
                .add_pass(format!(
                    "light_tree_levels({}..{})",
                    batch.dst_level_start, batch.dst_level_end
                ))
                .write(nodes)
                .run(move |res| levels(&batch, &mut res.write(nodes)));
        }

        nodes
    }
}

/// Splits the internal levels into dispatches, each building as many
/// consecutive levels from a single source level as fits into
/// `max_work_load` node visits.
pub fn level_batches(levels: u32, max_work_load: u32) -> Vec<LightTreeLevelsParams> {
    let mut batches = Vec::new();
    let mut src = 0;
    let mut start = 1;

    while start < levels {
        let src_nodes = 1u32 << (levels - 1 - src);
        let mut end = start + 1;
        let mut work = src_nodes;

        while end < levels && work + src_nodes <= max_work_load {
            work += src_nodes;
            end += 1;
        }

        batches.push(LightTreeLevelsParams {
            src_level: src,
            dst_level_start: start,
            dst_level_end: end,
            levels,
        });

        src = end - 1;
        start = end;
    }

    batches
}

fn morton(params: &LightTreeParams, lights: &[LightRecord], keys: &mut [u64]) {
    dispatch_1d(params.lights, |global_id| {
        light_tree_morton::main(global_id, params, lights, keys);
    });
}

fn sort(keys: &mut [u64]) {
    let len = keys.len() as u32;
    let mut block = 2;

    while block <= len {
        let mut stride = block / 2;

        while stride > 0 {
            let params = BitonicSortParams { block, stride };

            dispatch_1d(len, |global_id| {
                light_tree_sort::main(global_id, &params, keys);
            });

            stride /= 2;
        }

        block *= 2;
    }
}

fn leaves(
    params: &LightTreeParams,
    lights: &[LightRecord],
    keys: &[u64],
    nodes: &mut [LightNode],
) {
    dispatch_1d(params.lights, |global_id| {
        light_tree_leaves::main(global_id, params, lights, keys, nodes);
    });
}

fn levels(batch: &LightTreeLevelsParams, nodes: &mut [LightNode]) {
    dispatch_1d(batch.dst_nodes(), |global_id| {
        light_tree_levels::main(global_id, batch, nodes);
    });
}

#[cfg(test)]
mod tests {
    use glam::{vec3, Vec3};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use rtgi_gpu::morton_code;

    use super::*;
    use crate::{GiView, Light, LightExtractor, LightHandle, LightingConfig, Lights};

    fn random_lights(rng: &mut StdRng, n: u32) -> ExtractedLights {
        let mut lights = Lights::default();

        lights.add(LightHandle(u32::MAX), Light::directional(-Vec3::Y, Vec3::ONE));

        for i in 0..n {
            let position = vec3(
                rng.gen_range(-50.0..50.0),
                rng.gen_range(0.0..10.0),
                rng.gen_range(-50.0..50.0),
            );

            let color = Vec3::splat(rng.gen_range(0.1..10.0));

            lights.add(LightHandle(i), Light::point(position, color, rng.gen_range(0.5..5.0)));
        }

        let config = LightingConfig {
            max_lights: 4096,
            ..Default::default()
        };

        let view = GiView::new(glam::uvec2(1, 1), Vec3::ZERO, -Vec3::Z);

        LightExtractor::new(&config, &lights).extract(&view)
    }

    #[test]
    fn internal_nodes_bound_their_children() {
        let mut rng = StdRng::seed_from_u64(1234);

        for n in [1, 2, 7, 1024] {
            let lights = random_lights(&mut rng, n);
            let tree = LightTree::init(lights.finite_count(), &Default::default());
            let params = tree.params(&lights);
            let mut keys = Vec::new();
            let mut nodes = Vec::new();

            tree.build(&params, lights.records(), &mut keys, &mut nodes);

            let layout = tree.layout();

            for idx in 1..layout.lights as usize {
                let node = nodes[idx];
                let (lhs, rhs) = (nodes[2 * idx], nodes[2 * idx + 1]);

                if lhs.is_empty() && rhs.is_empty() {
                    assert!(node.is_empty(), "n = {n}, idx = {idx}");
                    continue;
                }

                let expected = LightNode::union(&lhs, &rhs);

                assert_eq!(expected.bound_min, node.bound_min, "n = {n}, idx = {idx}");
                assert_eq!(expected.bound_max, node.bound_max, "n = {n}, idx = {idx}");
                assert!(node.intensity >= lhs.intensity.max(rhs.intensity));
                assert!((node.intensity - lhs.intensity - rhs.intensity).abs() <= 1e-3 * node.intensity);
            }

            // every finite light lands in exactly one leaf, in Morton order
            let mut ids: Vec<u32> = nodes[layout.lights as usize..]
                .iter()
                .filter(|node| !node.is_empty())
                .map(|node| node.id)
                .collect();

            let codes: Vec<u32> = ids
                .iter()
                .map(|&id| {
                    let light = &lights.records()[id as usize];

                    morton_code(
                        light.center(),
                        params.bound_min,
                        params.bound_max,
                        params.quantization_levels,
                    )
                })
                .collect();

            assert!(codes.windows(2).all(|w| w[0] <= w[1]), "n = {n}");

            ids.sort();

            let expected: Vec<u32> = (1..=n).collect();

            assert_eq!(expected, ids, "n = {n}");
        }
    }

    #[test]
    fn no_lights_yield_an_empty_tree() {
        let lights = random_lights(&mut StdRng::seed_from_u64(0), 0);
        let tree = LightTree::init(lights.finite_count(), &Default::default());
        let mut keys = Vec::new();
        let mut nodes = Vec::new();

        tree.build(&tree.params(&lights), lights.records(), &mut keys, &mut nodes);

        assert_eq!(4, nodes.len());
        assert!(nodes[1].is_empty());
    }

    #[test]
    fn batches_cover_every_internal_level_once() {
        for levels in [2, 3, 4, 11, 12, 20] {
            let batches = level_batches(levels, 2048);
            let mut next = 1;

            for batch in &batches {
                assert_eq!(next, batch.dst_level_start);
                assert!(batch.dst_level_end > batch.dst_level_start);
                assert!(batch.src_level < batch.dst_level_start);

                next = batch.dst_level_end;
            }

            assert_eq!(levels, next);
        }

        let batches = level_batches(11, 2048);

        assert_eq!(
            vec![(0, 1, 3), (2, 3, 11)],
            batches
                .iter()
                .map(|b| (b.src_level, b.dst_level_start, b.dst_level_end))
                .collect::<Vec<_>>()
        );
    }

    #[test]
    fn graph_build_matches_direct_build() {
        let lights = random_lights(&mut StdRng::seed_from_u64(7), 33);
        let tree = LightTree::init(lights.finite_count(), &Default::default());
        let params = tree.params(&lights);

        let mut keys = Vec::new();
        let mut expected = Vec::new();

        tree.build(&params, lights.records(), &mut keys, &mut expected);

        let mut history = crate::HistoryArena::default();
        let mut graph = FrameGraph::new(&mut history);
        let lights = graph.create(lights);
        let nodes = tree.add_passes(&mut graph, params, lights);

        graph.export(nodes);

        let actual = graph.execute().take(nodes).unwrap();

        assert_eq!(expected, actual);
    }
}
