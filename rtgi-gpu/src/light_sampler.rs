use glam::Vec3;

use crate::{LightNode, LightSamplerKind, LightsView, WhiteNoise};

/// Light chosen by [`LightSamplerView::sample()`], along with the
/// probability of choosing it.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LightPick {
    pub id: u32,
    pub pdf: f32,
}

/// Everything a kernel needs to importance-sample the scene's lights.
#[derive(Clone, Copy, Debug)]
pub struct LightSamplerView<'a> {
    pub kind: LightSamplerKind,
    pub lights: LightsView<'a>,

    /// Heap-ordered light tree (root at 1, leaves at `nodes.len() / 2..`).
    pub nodes: &'a [LightNode],

    /// Per-tile light cuts, `max_cut_nodes` entries per tile.
    pub cuts: &'a [u32],
    pub max_cut_nodes: u32,

    /// Inclusive prefix sum of light intensities.
    pub power_cdf: &'a [f32],

    pub min_distance_sqr: f32,
    pub approximate_cosine: bool,
}

impl<'a> LightSamplerView<'a> {
    pub fn uniform(lights: LightsView<'a>) -> Self {
        Self {
            kind: LightSamplerKind::Uniform,
            lights,
            nodes: &[],
            cuts: &[],
            max_cut_nodes: 0,
            power_cdf: &[],
            min_distance_sqr: 0.0,
            approximate_cosine: true,
        }
    }

    /// Picks a light for given surface point; `tile` selects the light cut
    /// and is ignored by the other samplers.
    pub fn sample(
        &self,
        wnoise: &mut WhiteNoise,
        point: Vec3,
        normal: Vec3,
        tile: usize,
    ) -> Option<LightPick> {
        if self.lights.is_empty() {
            return None;
        }

        match self.kind {
            LightSamplerKind::Uniform => self.sample_uniform(wnoise),
            LightSamplerKind::Power => self.sample_power(wnoise),
            LightSamplerKind::LightTree | LightSamplerKind::LightCuts => {
                self.sample_hierarchy(wnoise, point, normal, tile)
            }
        }
    }

    fn sample_uniform(&self, wnoise: &mut WhiteNoise) -> Option<LightPick> {
        let count = self.lights.len();
        let id = ((wnoise.sample() * count as f32) as u32).min(count - 1);

        Some(LightPick {
            id,
            pdf: 1.0 / count as f32,
        })
    }

    fn sample_power(&self, wnoise: &mut WhiteNoise) -> Option<LightPick> {
        let count = (self.lights.len() as usize).min(self.power_cdf.len());

        if count == 0 {
            return self.sample_uniform(wnoise);
        }

        let cdf = &self.power_cdf[..count];
        let total = cdf[count - 1];

        if total <= 0.0 {
            return self.sample_uniform(wnoise);
        }

        let target = wnoise.sample() * total;
        let id = cdf.partition_point(|&c| c <= target).min(count - 1);
        let prev = if id == 0 { 0.0 } else { cdf[id - 1] };

        Some(LightPick {
            id: id as u32,
            pdf: (cdf[id] - prev) / total,
        })
    }

    /// Splits between infinite lights (picked uniformly) and the tree of
    /// finite ones, proportionally to their counts.
    fn sample_hierarchy(
        &self,
        wnoise: &mut WhiteNoise,
        point: Vec3,
        normal: Vec3,
        tile: usize,
    ) -> Option<LightPick> {
        let count = self.lights.len();
        let infinite = self.lights.infinite_count().min(count);
        let finite = count - infinite;

        if self.nodes.len() < 4 {
            return self.sample_uniform(wnoise);
        }

        let p_infinite = if finite == 0 {
            1.0
        } else {
            infinite as f32 / count as f32
        };

        if wnoise.sample() < p_infinite {
            let id = ((wnoise.sample() * infinite as f32) as u32)
                .min(infinite.saturating_sub(1));

            return Some(LightPick {
                id,
                pdf: p_infinite / infinite.max(1) as f32,
            });
        }

        let (start, start_pdf) = if self.kind == LightSamplerKind::LightCuts {
            self.pick_cut_node(wnoise, point, normal, tile)?
        } else {
            (1, 1.0)
        };

        let (id, pdf) = self.traverse(wnoise, start, point, normal)?;

        Some(LightPick {
            id,
            pdf: (1.0 - p_infinite) * start_pdf * pdf,
        })
    }

    fn pick_cut_node(
        &self,
        wnoise: &mut WhiteNoise,
        point: Vec3,
        normal: Vec3,
        tile: usize,
    ) -> Option<(usize, f32)> {
        let len = self.max_cut_nodes as usize;
        let cut = self.cuts.get(tile * len..(tile + 1) * len)?;
        let nodes = cut
            .iter()
            .take_while(|&&idx| idx != LightNode::ID_EMPTY)
            .filter(|&&idx| (idx as usize) < self.nodes.len());

        let weight = |idx: u32| {
            let Some(node) = self.nodes.get(idx as usize) else {
                return 0.0;
            };

            let importance = self.importance(node, point, normal);

            if importance > 0.0 {
                importance
            } else {
                node.intensity * 1e-6
            }
        };

        let total: f32 = nodes.clone().map(|&idx| weight(idx)).sum();

        if total <= 0.0 {
            return None;
        }

        let target = wnoise.sample() * total;
        let mut acc = 0.0;
        let mut last = None;

        for &idx in nodes {
            let w = weight(idx);

            if w <= 0.0 {
                continue;
            }

            acc += w;
            last = Some((idx as usize, w / total));

            if target < acc {
                break;
            }
        }

        last
    }

    /// Descends from given node, picking children proportionally to their
    /// importance; returns the light and the probability of reaching it.
    fn traverse(
        &self,
        wnoise: &mut WhiteNoise,
        mut idx: usize,
        point: Vec3,
        normal: Vec3,
    ) -> Option<(u32, f32)> {
        let leaves = self.nodes.len() / 2;
        let mut pdf = 1.0;

        while idx < leaves {
            let lhs = &self.nodes[2 * idx];
            let rhs = &self.nodes[2 * idx + 1];

            let mut wl = self.importance(lhs, point, normal);
            let mut wr = self.importance(rhs, point, normal);

            if wl + wr <= 0.0 {
                wl = if lhs.is_empty() { 0.0 } else { lhs.intensity };
                wr = if rhs.is_empty() { 0.0 } else { rhs.intensity };
            }

            let total = wl + wr;

            if total <= 0.0 {
                return None;
            }

            let p = wl / total;

            if wnoise.sample() < p {
                pdf *= p;
                idx *= 2;
            } else {
                pdf *= 1.0 - p;
                idx = 2 * idx + 1;
            }
        }

        let node = self.nodes.get(idx)?;

        if node.is_empty() || !node.is_leaf() {
            return None;
        }

        Some((node.id, pdf))
    }

    fn importance(&self, node: &LightNode, point: Vec3, normal: Vec3) -> f32 {
        node.importance(
            point,
            normal,
            self.min_distance_sqr,
            self.approximate_cosine,
        )
    }
}
