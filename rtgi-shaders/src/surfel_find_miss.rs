use rtgi_gpu::prelude::*;

/// Marks no spawn request for a tile.
pub const NO_MISS: u32 = u32::MAX;

/// Finds the least covered pixel of tile `global_id.xy`; when its coverage
/// falls under `spawn_coverage`, the pixel is (randomly, with probability
/// `spawn_chance`) requested to get a new surfel.
pub fn main(
    global_id: UVec3,
    params: &SurfelPassParams,
    gbuffer: GBufferView,
    grid: SurfelGridView,
    surfels: &[Surfel],
    misses: &mut [u32],
) {
    let tile = global_id.xy();
    let tiles = params.tiles();

    if tile.x >= tiles.x || tile.y >= tiles.y {
        return;
    }

    let tile_idx = (tile.y * tiles.x + tile.x) as usize;
    let origin = tile * SURFEL_TILE_SIZE;
    let end = (origin + SURFEL_TILE_SIZE).min(params.view_size);
    let mut worst: Option<(UVec2, f32)> = None;

    misses[tile_idx] = NO_MISS;

    for y in origin.y..end.y {
        for x in origin.x..end.x {
            let pixel = uvec2(x, y);
            let surface = gbuffer.get(pixel);

            if surface.is_none() {
                continue;
            }

            let coverage: f32 = grid
                .surfels_at(surface.position)
                .filter_map(|idx| surfels.get(idx as usize))
                .map(|surfel| surfel.coverage(surface.position, surface.normal))
                .sum();

            if worst.map_or(true, |(_, c)| coverage < c) {
                worst = Some((pixel, coverage));
            }
        }
    }

    let Some((pixel, coverage)) = worst else {
        return;
    };

    if coverage >= params.spawn_coverage {
        return;
    }

    let mut wnoise = WhiteNoise::new(params.seed, tile);

    if wnoise.sample() < params.spawn_chance {
        misses[tile_idx] = pack_pixel(pixel);
    }
}

pub fn pack_pixel(pixel: UVec2) -> u32 {
    (pixel.y << 16) | (pixel.x & 0xffff)
}

pub fn unpack_pixel(packed: u32) -> UVec2 {
    uvec2(packed & 0xffff, packed >> 16)
}
