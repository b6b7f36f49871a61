use rtgi_gpu::prelude::*;

/// Upper limit of `max_cut_nodes`.
pub const MAX_CUT_NODES: usize = 32;

/// Finds the light cut of a single screen tile.
///
/// Starting from the root, the node with the largest error gets replaced by
/// its children until every node's error falls under `error_limit` (relative
/// to the root's) or the cut is full. Unused entries are
/// [`LightNode::ID_EMPTY`].
pub fn main(
    global_id: UVec3,
    params: &LightCutParams,
    bound: &impl CutErrorBound,
    gbuffer: GBufferView,
    nodes: &[LightNode],
    cuts: &mut [u32],
) {
    let tile = global_id.xy();
    let tiles = params.tiles();

    if tile.x >= tiles.x || tile.y >= tiles.y {
        return;
    }

    if !params.is_tile_scheduled(tile) {
        return;
    }

    let max = (params.max_cut_nodes as usize).clamp(1, MAX_CUT_NODES);
    let offset = params.tile_index(tile) * params.max_cut_nodes as usize;
    let out = &mut cuts[offset..offset + max];

    out.fill(LightNode::ID_EMPTY);

    if nodes.len() < 4 || nodes[1].is_empty() {
        return;
    }

    let group = params.share_group_size.max(1);
    let leader = (tile / group) * group;

    let Some(surface) = representative_surface(params, gbuffer, leader) else {
        return;
    };

    let len = find_cut(bound, nodes, surface.position, surface.normal, params.error_limit, out);

    debug_assert!(len <= max);
}

/// Returns the surface at the center of given tile, or any other surface
/// within it.
fn representative_surface(
    params: &LightCutParams,
    gbuffer: GBufferView,
    tile: UVec2,
) -> Option<GBufferEntry> {
    let origin = tile * params.block_size;
    let center = (origin + params.block_size / 2).min(gbuffer.size() - 1);
    let entry = gbuffer.get(center);

    if entry.is_some() {
        return Some(entry);
    }

    for y in 0..params.block_size {
        for x in 0..params.block_size {
            let pos = origin + uvec2(x, y);

            if pos.x >= gbuffer.size().x || pos.y >= gbuffer.size().y {
                continue;
            }

            let entry = gbuffer.get(pos);

            if entry.is_some() {
                return Some(entry);
            }
        }
    }

    None
}

/// Writes the cut into `out`, returning its length.
pub fn find_cut(
    bound: &impl CutErrorBound,
    nodes: &[LightNode],
    point: Vec3,
    normal: Vec3,
    error_limit: f32,
    out: &mut [u32],
) -> usize {
    let max = out.len().min(MAX_CUT_NODES);
    let mut errors = [0.0f32; MAX_CUT_NODES];
    let limit = error_limit * bound.error(&nodes[1], point, normal);

    out[0] = 1;
    errors[0] = bound.error(&nodes[1], point, normal);

    let mut len = 1;

    loop {
        let mut worst = None;

        for i in 0..len {
            let node = &nodes[out[i] as usize];

            if node.is_leaf() {
                continue;
            }

            if worst.map_or(true, |w: usize| errors[i] > errors[w]) {
                worst = Some(i);
            }
        }

        let Some(worst) = worst else {
            break;
        };

        if errors[worst] <= limit {
            break;
        }

        let idx = out[worst] as usize;
        let lhs = 2 * idx;
        let rhs = 2 * idx + 1;

        let children = [lhs, rhs].map(|child| !nodes[child].is_empty());

        match children {
            [true, true] => {
                if len >= max {
                    break;
                }

                out[worst] = lhs as u32;
                errors[worst] = bound.error(&nodes[lhs], point, normal);
                out[len] = rhs as u32;
                errors[len] = bound.error(&nodes[rhs], point, normal);
                len += 1;
            }

            [true, false] | [false, true] => {
                let child = if children[0] { lhs } else { rhs };

                out[worst] = child as u32;
                errors[worst] = bound.error(&nodes[child], point, normal);
            }

            [false, false] => {
                // nothing below, which only happens for zero-intensity
                // lights; drop the node
                len -= 1;
                out[worst] = out[len];
                errors[worst] = errors[len];
                out[len] = LightNode::ID_EMPTY;

                if len == 0 {
                    break;
                }
            }
        }
    }

    len
}
