use rtgi_gpu::prelude::*;

/// One compare-and-swap step of an ascending bitonic sort; the host runs it
/// for every `(block, stride)` pair, `keys.len()` being a power of two.
pub fn main(global_id: UVec3, params: &BitonicSortParams, keys: &mut [u64]) {
    let i = global_id.x;
    let j = i ^ params.stride;

    if j <= i || j as usize >= keys.len() {
        return;
    }

    let ascending = i & params.block == 0;
    let (a, b) = (keys[i as usize], keys[j as usize]);

    if (a > b) == ascending {
        keys[i as usize] = b;
        keys[j as usize] = a;
    }
}
