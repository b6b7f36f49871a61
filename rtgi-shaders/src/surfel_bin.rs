//! Rebuilds the surfel grid: every alive surfel gets listed in each hashed
//! cell it touches.
//!
//! Stages, in order: [`dispatch_args()`], [`clear()`], [`count()`], the
//! prefix scan over `offsets[..cells]`, [`seal()`] and [`slot()`].

use rtgi_gpu::prelude::*;

/// Invocations per work-group of the per-surfel stages.
pub const SURFEL_GROUP_SIZE: u32 = 64;

/// Computes the work-group count of the per-surfel stages.
pub fn dispatch_args(global_id: UVec3, meta: &SurfelMeta, args: &mut [u32; 3]) {
    if global_id.x != 0 {
        return;
    }

    *args = [div_round_up(meta.high_water, SURFEL_GROUP_SIZE), 1, 1];
}

/// Zeroes `offsets[global_id.x]`; dispatched over `cells + 1` elements.
pub fn clear(global_id: UVec3, params: &SurfelPassParams, offsets: &mut [u32]) {
    let idx = global_id.x as usize;

    if idx <= params.cells as usize && idx < offsets.len() {
        offsets[idx] = 0;
    }
}

/// Counts surfel `global_id.x` in every cell it touches.
pub fn count(
    global_id: UVec3,
    params: &SurfelPassParams,
    meta: &SurfelMeta,
    surfels: &[Surfel],
    offsets: &mut [u32],
) {
    let Some(surfel) = alive_surfel(global_id, meta, surfels) else {
        return;
    };

    for_each_surfel_cell(surfel.position, surfel.radius, params.cell_size, |cell| {
        offsets[surfel_cell_hash(cell, params.cells) as usize] += 1;
    });
}

/// Makes `offsets[cells]` hold the total, closing the last cell's range.
pub fn seal(global_id: UVec3, params: &SurfelPassParams, offsets: &mut [u32]) {
    if global_id.x != 0 || params.cells == 0 {
        return;
    }

    let cells = params.cells as usize;

    offsets[cells] = offsets[cells - 1];
}

/// Writes surfel `global_id.x` into the index ranges of its cells; each
/// write moves the cell's offset one entry down, so once every surfel got
/// slotted, `offsets[c]` is the start of cell `c`.
pub fn slot(
    global_id: UVec3,
    params: &SurfelPassParams,
    meta: &SurfelMeta,
    surfels: &[Surfel],
    offsets: &mut [u32],
    indices: &mut [u32],
) {
    let Some(surfel) = alive_surfel(global_id, meta, surfels) else {
        return;
    };

    for_each_surfel_cell(surfel.position, surfel.radius, params.cell_size, |cell| {
        let hash = surfel_cell_hash(cell, params.cells) as usize;

        offsets[hash] -= 1;

        if let Some(slot) = indices.get_mut(offsets[hash] as usize) {
            *slot = global_id.x;
        }
    });
}

fn alive_surfel(global_id: UVec3, meta: &SurfelMeta, surfels: &[Surfel]) -> Option<Surfel> {
    if global_id.x >= meta.high_water {
        return None;
    }

    surfels
        .get(global_id.x as usize)
        .filter(|surfel| surfel.is_alive())
        .copied()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prefix_scan;

    #[test]
    fn binned_surfels_can_be_found() {
        let params = SurfelPassParams {
            cell_size: 1.0,
            cells: 64,
            ..Default::default()
        };

        let surfels = [
            Surfel::new(vec3(0.5, 0.5, 0.5), Vec3::Y, 0.25),
            Surfel::default(),
            Surfel::new(vec3(3.5, 0.5, 0.5), Vec3::Y, 0.25),
            Surfel::new(vec3(3.9, 0.5, 0.5), Vec3::Y, 0.25),
        ];

        let meta = SurfelMeta {
            free_count: 0,
            high_water: 4,
        };

        let mut args = [0; 3];
        let mut offsets = vec![7; 65];
        let mut indices = vec![0; 16];
        let mut sums = vec![0; SEGMENT_SIZE as usize];

        dispatch_args(UVec3::ZERO, &meta, &mut args);
        assert_eq!([1, 1, 1], args);

        for i in 0..65 {
            clear(uvec3(i, 0, 0), &params, &mut offsets);
        }

        for i in 0..4 {
            count(uvec3(i, 0, 0), &params, &meta, &surfels, &mut offsets);
        }

        let cells = &mut offsets[..64];

        for s in 0..prefix_scan::segments(cells.len()) {
            prefix_scan::scan_segment(uvec3(s, 0, 0), cells);
        }

        prefix_scan::scan_segment_sums(UVec3::ZERO, cells, &mut sums);

        for s in 0..prefix_scan::segments(cells.len()) {
            prefix_scan::merge(uvec3(s, 0, 0), cells, &sums);
        }

        seal(UVec3::ZERO, &params, &mut offsets);

        for i in 0..4 {
            slot(uvec3(i, 0, 0), &params, &meta, &surfels, &mut offsets, &mut indices);
        }

        let grid = SurfelGridView {
            cell_size: 1.0,
            cells: 64,
            offsets: &offsets,
            indices: &indices,
        };

        assert_eq!(vec![0], grid.surfels_at(vec3(0.1, 0.1, 0.1)).collect::<Vec<_>>());

        // the last surfel pokes into the neighboring cell
        let mut found: Vec<_> = grid.surfels_at(vec3(3.5, 0.5, 0.5)).collect();

        found.sort();
        assert_eq!(vec![2, 3], found);
        assert_eq!(vec![3], grid.surfels_at(vec3(4.1, 0.5, 0.5)).collect::<Vec<_>>());
    }
}
