use rtgi_gpu::prelude::*;

/// Builds one node of levels `dst_level_start..dst_level_end` by folding all
/// of its descendants on `src_level`, so that several levels can be built by
/// a single dispatch.
pub fn main(
    global_id: UVec3,
    params: &LightTreeLevelsParams,
    nodes: &mut [LightNode],
) {
    if global_id.x >= params.dst_nodes() {
        return;
    }

    let idx = (1 << (params.levels - params.dst_level_end)) + global_id.x;
    let level = params.levels - 1 - (31 - idx.leading_zeros());
    let depth = level - params.src_level;

    let first = idx << depth;
    let last = (idx + 1) << depth;
    let mut node = LightNode::EMPTY;

    for src in first..last {
        node = LightNode::union(&node, &nodes[src as usize]);
    }

    nodes[idx as usize] = node;
}
