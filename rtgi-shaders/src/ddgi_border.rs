use rtgi_gpu::prelude::*;

/// Copies the top and bottom border rows of probe `global_id.x`'s tile from
/// the mirrored interior texels.
pub fn rows(global_id: UVec3, desc: &DdgiVolumeDesc, num_texels: u32, atlas: &mut TextureViewMut) {
    let probe = global_id.x;

    if probe >= desc.probe_count() || !desc.is_probe_scheduled(probe) {
        return;
    }

    let origin = desc.probe_tile(probe) * (num_texels + 2);
    let n = num_texels;

    for x in 1..=n {
        let mirrored = n + 1 - x;

        copy(atlas, origin + uvec2(mirrored, 1), origin + uvec2(x, 0));
        copy(atlas, origin + uvec2(mirrored, n), origin + uvec2(x, n + 1));
    }
}

/// Copies the left and right border columns (corners included, which is why
/// this has to run after [`rows()`]).
pub fn columns(
    global_id: UVec3,
    desc: &DdgiVolumeDesc,
    num_texels: u32,
    atlas: &mut TextureViewMut,
) {
    let probe = global_id.x;

    if probe >= desc.probe_count() || !desc.is_probe_scheduled(probe) {
        return;
    }

    let origin = desc.probe_tile(probe) * (num_texels + 2);
    let n = num_texels;

    for y in 0..=n + 1 {
        let mirrored = n + 1 - y;

        copy(atlas, origin + uvec2(1, mirrored), origin + uvec2(0, y));
        copy(atlas, origin + uvec2(n, mirrored), origin + uvec2(n + 1, y));
    }
}

fn copy(atlas: &mut TextureViewMut, from: UVec2, to: UVec2) {
    let value = atlas.load(from);

    atlas.store(to, value);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn border_mirrors_the_interior() {
        let desc = DdgiVolumeDesc {
            counts: ivec3(1, 1, 1),
            probe_index_count: 1,
            ..Default::default()
        };

        let n = 4;
        let size = uvec2(n + 2, n + 2);
        let mut data = vec![0; (size.x * size.y) as usize * 16];
        let mut atlas = TextureViewMut::new(size, PixelFormat::A32B32G32R32F, &mut data);

        for y in 1..=n {
            for x in 1..=n {
                atlas.store(uvec2(x, y), vec4((10 * y + x) as f32, 0.0, 0.0, 1.0));
            }
        }

        rows(UVec3::ZERO, &desc, n, &mut atlas);
        columns(UVec3::ZERO, &desc, n, &mut atlas);

        let at = |x, y| atlas.load(uvec2(x, y)).x;

        assert_eq!(at(4, 1), at(1, 0));
        assert_eq!(at(1, 4), at(4, 5));
        assert_eq!(at(1, 4), at(0, 1));
        assert_eq!(at(4, 1), at(5, 4));

        // corners take the diagonally opposite interior texel
        assert_eq!(44.0, at(0, 0));
        assert_eq!(41.0, at(5, 0));
        assert_eq!(14.0, at(0, 5));
        assert_eq!(11.0, at(5, 5));
    }
}
