use rtgi_gpu::prelude::*;

use crate::restir;

pub const BOILING_TILE_SIZE: u32 = 16;

/// Resets reservoirs of slice `slice_out` whose weight exceeds
/// `boiling_multiplier` times the average non-zero weight of their tile.
pub fn main(global_id: UVec3, params: &RestirPassParams, reservoirs: &mut [PackedReservoir]) {
    let origin = global_id.xy() * BOILING_TILE_SIZE;

    if origin.x >= params.view_size.x || origin.y >= params.view_size.y {
        return;
    }

    let dim = restir::reservoir_dim(params);
    let end = (origin + BOILING_TILE_SIZE).min(params.view_size);
    let pixels = || {
        (origin.y..end.y).flat_map(move |y| (origin.x..end.x).map(move |x| uvec2(x, y)))
    };

    let mut sum = 0.0;
    let mut count = 0;

    for pixel in pixels() {
        let w = reservoirs[dim.index(pixel, params.slice_out)].w();

        if w > 0.0 {
            sum += w;
            count += 1;
        }
    }

    if count == 0 {
        return;
    }

    let threshold = params.boiling_multiplier * sum / count as f32;

    for pixel in pixels() {
        let idx = dim.index(pixel, params.slice_out);

        if reservoirs[idx].w() > threshold {
            reservoirs[idx] = PackedReservoir::default();
        }
    }
}

/// Turns the configured filter strength into the weight multiplier; one
/// means "reset anything above average", smaller strengths are laxer.
pub fn multiplier(strength: f32) -> f32 {
    10.0 / strength.clamp(0.00001, 1.0) - 9.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::restir::tests::params;

    #[test]
    fn outliers_are_reset() {
        let params = RestirPassParams {
            view_size: uvec2(16, 16),
            padded_size: uvec2(16, 16),
            slices: 1,
            boiling_multiplier: multiplier(0.2),
            ..params()
        };

        let reservoir = |w| {
            PackedReservoir::pack(&GiReservoir {
                m: 1.0,
                w,
                ..Default::default()
            })
        };

        let mut reservoirs = vec![reservoir(1.0); 256];

        reservoirs[5] = reservoir(1000.0);
        reservoirs[6] = reservoir(0.0);

        main(UVec3::ZERO, &params, &mut reservoirs);

        assert_eq!(PackedReservoir::default(), reservoirs[5]);
        assert_eq!(1.0, reservoirs[0].w());
        assert_eq!(41.0, multiplier(0.2).round());
    }
}
