use rtgi_gpu::prelude::*;

/// Textures of a volume the scroll kernel resets probes in.
pub struct ScrollTargets<'a, 'b> {
    pub irradiance: &'a mut TextureViewMut<'b>,
    pub distance: &'a mut TextureViewMut<'b>,
    pub offsets: Option<&'a mut TextureViewMut<'b>>,
    pub states: Option<&'a mut TextureViewMut<'b>>,
}

/// Clears probe `global_id.x` when it wrapped to the other side of a
/// scrolling volume since the last update, so that it doesn't bring along
/// lighting from where it used to be.
///
/// `spaces` holds the last seen scroll space of every probe.
pub fn main(global_id: UVec3, desc: &DdgiVolumeDesc, spaces: &mut [u32], targets: ScrollTargets) {
    let probe = global_id.x;

    if probe >= desc.probe_count() || !desc.is_scrolling_enabled() {
        return;
    }

    let space = desc.scroll_space(probe);

    if spaces[probe as usize] == space {
        return;
    }

    spaces[probe as usize] = space;

    clear_tile(desc, probe, DDGI_IRRADIANCE_TEXELS, targets.irradiance);
    clear_tile(desc, probe, DDGI_DISTANCE_TEXELS, targets.distance);

    let tile = desc.probe_tile(probe);

    if let Some(offsets) = targets.offsets {
        offsets.store(tile, encode_probe_offset(Vec3::ZERO).extend(0.0));
    }

    if let Some(states) = targets.states {
        states.store(tile, Vec4::splat(ProbeState::Active as u32 as f32));
    }
}

fn clear_tile(desc: &DdgiVolumeDesc, probe: u32, num_texels: u32, atlas: &mut TextureViewMut) {
    let size = num_texels + 2;
    let origin = desc.probe_tile(probe) * size;

    for y in 0..size {
        for x in 0..size {
            atlas.store(origin + uvec2(x, y), Vec4::ZERO);
        }
    }
}
