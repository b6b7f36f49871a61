use rtgi_gpu::prelude::*;

/// Fills the leaf level from the sorted keys.
pub fn main(
    global_id: UVec3,
    params: &LightTreeParams,
    lights: &[LightRecord],
    keys: &[u64],
    nodes: &mut [LightNode],
) {
    let slot = global_id.x;

    if slot >= params.lights {
        return;
    }

    let key = keys[slot as usize];

    nodes[(params.lights + slot) as usize] = if key == u64::MAX {
        LightNode::EMPTY
    } else {
        let id = key as u32;
        let light = &lights[id as usize];

        LightNode::leaf(id, light.bound_min, light.bound_max, light.intensity())
    };
}
