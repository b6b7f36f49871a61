use rtgi_gpu::prelude::*;

/// Computes the sort key of every leaf slot; slots past the finite lights
/// get `u64::MAX`, so that they sort last and become empty leaves.
pub fn main(
    global_id: UVec3,
    params: &LightTreeParams,
    lights: &[LightRecord],
    keys: &mut [u64],
) {
    let slot = global_id.x;

    if slot >= params.lights {
        return;
    }

    keys[slot as usize] = if slot < params.finite_count() {
        let id = params.infinite_count + slot;
        let light = &lights[id as usize];

        let code = morton_code(
            light.center(),
            params.bound_min,
            params.bound_max,
            params.quantization_levels,
        );

        morton_key(code, id)
    } else {
        u64::MAX
    };
}
