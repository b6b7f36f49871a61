use bytemuck::{Pod, Zeroable};
use glam::{vec3, Vec3};

use crate::{F32Ext, Vec3Ext};

/// Node of the light tree.
///
/// The tree is stored as an implicit binary heap: the root lives at index 1,
/// children of node `i` live at `2 * i` and `2 * i + 1`, and the leaves occupy
/// `[tree_lights, 2 * tree_lights)`. Index 0 is unused.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct LightNode {
    pub bound_min: Vec3,
    pub intensity: f32,
    pub bound_max: Vec3,
    pub id: u32,
}

impl Default for LightNode {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl LightNode {
    /// Marks padding leaves (and internal nodes with no lights below them).
    pub const ID_EMPTY: u32 = u32::MAX;

    /// Marks internal nodes.
    pub const ID_INTERNAL: u32 = u32::MAX - 1;

    pub const EMPTY: Self = Self {
        bound_min: Vec3::splat(f32::MAX),
        intensity: 0.0,
        bound_max: Vec3::splat(f32::MIN),
        id: Self::ID_EMPTY,
    };

    pub fn leaf(light_id: u32, bound_min: Vec3, bound_max: Vec3, intensity: f32) -> Self {
        Self {
            bound_min,
            intensity,
            bound_max,
            id: light_id,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.id == Self::ID_EMPTY || self.intensity <= 0.0
    }

    pub fn is_leaf(&self) -> bool {
        self.id < Self::ID_INTERNAL
    }

    /// Creates an internal node covering both given nodes.
    pub fn union(lhs: &Self, rhs: &Self) -> Self {
        let lhs_empty = lhs.id == Self::ID_EMPTY;
        let rhs_empty = rhs.id == Self::ID_EMPTY;

        if lhs_empty && rhs_empty {
            return Self::EMPTY;
        }

        Self {
            bound_min: lhs.bound_min.min(rhs.bound_min),
            intensity: lhs.intensity + rhs.intensity,
            bound_max: lhs.bound_max.max(rhs.bound_max),
            id: Self::ID_INTERNAL,
        }
    }

    pub fn center(&self) -> Vec3 {
        (self.bound_min + self.bound_max) * 0.5
    }

    /// Squared distance from given point to this node's bounding box; zero
    /// when the point is inside.
    pub fn distance_sqr(&self, point: Vec3) -> f32 {
        let d = (self.bound_min - point)
            .max(point - self.bound_max)
            .max(Vec3::ZERO);

        d.length_squared()
    }

    /// Upper bound of `cos(theta)` between `normal` and the direction from
    /// `point` towards any point of this node's bounding box.
    ///
    /// The approximate variant only checks on which side of the surface the
    /// box lies.
    pub fn cosine_bound(&self, point: Vec3, normal: Vec3, approximate: bool) -> f32 {
        if self.distance_sqr(point) == 0.0 {
            return 1.0;
        }

        let corners = self.corners().map(|corner| corner - point);

        if approximate {
            return if corners.iter().any(|c| c.dot(normal) > 0.0) {
                1.0
            } else {
                0.0
            };
        }

        // Bound the box in a frame whose z axis is the normal, then find the
        // smallest angle any point of that (larger) box makes with z.
        let t = normal.any_orthonormal();
        let b = normal.cross(t);

        let mut min = Vec3::splat(f32::MAX);
        let mut max = Vec3::splat(f32::MIN);

        for corner in corners {
            let local = vec3(corner.dot(t), corner.dot(b), corner.dot(normal));

            min = min.min(local);
            max = max.max(local);
        }

        if max.z <= 0.0 {
            return 0.0;
        }

        let x = if min.x <= 0.0 && max.x >= 0.0 {
            0.0
        } else {
            min.x.abs().min(max.x.abs())
        };

        let y = if min.y <= 0.0 && max.y >= 0.0 {
            0.0
        } else {
            min.y.abs().min(max.y.abs())
        };

        max.z * (x.sqr() + y.sqr() + max.z.sqr()).inverse_sqrt()
    }

    /// Upper bound of the contribution of all lights below this node to
    /// given surface point; monotonically non-increasing down the tree.
    pub fn importance(
        &self,
        point: Vec3,
        normal: Vec3,
        min_distance_sqr: f32,
        approximate: bool,
    ) -> f32 {
        if self.is_empty() {
            return 0.0;
        }

        let cos = self.cosine_bound(point, normal, approximate);

        if cos <= 0.0 {
            return 0.0;
        }

        self.intensity * cos / self.distance_sqr(point).max(min_distance_sqr)
    }

    fn corners(&self) -> [Vec3; 8] {
        let (a, b) = (self.bound_min, self.bound_max);

        [
            vec3(a.x, a.y, a.z),
            vec3(b.x, a.y, a.z),
            vec3(a.x, b.y, a.z),
            vec3(b.x, b.y, a.z),
            vec3(a.x, a.y, b.z),
            vec3(b.x, a.y, b.z),
            vec3(a.x, b.y, b.z),
            vec3(b.x, b.y, b.z),
        ]
    }
}

/// Error a light cut makes by keeping given node instead of splitting it.
///
/// Implementations must not grow when going down the tree, so that splitting
/// a node never increases the cut's total error.
pub trait CutErrorBound {
    fn error(&self, node: &LightNode, point: Vec3, normal: Vec3) -> f32;
}

/// Bounds the contribution of a node by its intensity, its cosine bound and
/// its distance; leaves are exact and have no error.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CosineDistanceBound {
    pub min_distance_sqr: f32,
    pub approximate: bool,
}

impl CutErrorBound for CosineDistanceBound {
    fn error(&self, node: &LightNode, point: Vec3, normal: Vec3) -> f32 {
        if node.is_leaf() {
            return 0.0;
        }

        node.importance(point, normal, self.min_distance_sqr, self.approximate)
    }
}

/// Shape of the light tree built over a given number of finite lights.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LightTreeLayout {
    /// Number of tree levels, leaves included.
    pub levels: u32,

    /// Number of leaf slots (a power of two).
    pub lights: u32,
}

impl LightTreeLayout {
    /// Lays out the tree; zero and one light both get a minimal two-level
    /// tree.
    pub fn new(finite_lights: u32) -> Self {
        let levels = if finite_lights <= 1 {
            2
        } else {
            finite_lights.next_power_of_two().trailing_zeros() + 1
        };

        Self {
            levels,
            lights: 1 << (levels - 1),
        }
    }

    pub fn storage_nodes(&self) -> u32 {
        2 * self.lights
    }

    /// Index of the first node of given level (level 0 being the leaves).
    pub fn level_offset(&self, level: u32) -> u32 {
        1 << (self.levels - 1 - level)
    }

    /// Number of nodes on given level.
    pub fn level_len(&self, level: u32) -> u32 {
        self.level_offset(level)
    }

    pub fn leaf_index(&self, leaf: u32) -> u32 {
        self.lights + leaf
    }
}

/// Morton code of a point, quantized into `levels` steps per axis (at most
/// 1024, i.e. 10 bits).
pub fn morton_code(point: Vec3, bound_min: Vec3, bound_max: Vec3, levels: u32) -> u32 {
    /// Expands a 10-bit number into 30 bits by inserting two zeros between
    /// each bit.
    fn expand_bits(mut x: u32) -> u32 {
        x &= 0x3ff;
        x = (x | x << 16) & 0x030000ff;
        x = (x | x << 8) & 0x0300f00f;
        x = (x | x << 4) & 0x030c30c3;
        x = (x | x << 2) & 0x09249249;
        x
    }

    let levels = levels.clamp(1, 1024);
    let extent = (bound_max - bound_min).max(Vec3::splat(1e-6));
    let p = ((point - bound_min) / extent).clamp(Vec3::ZERO, Vec3::ONE);
    let q = (p * (levels - 1) as f32).as_uvec3();

    (expand_bits(q.x) << 2) | (expand_bits(q.y) << 1) | expand_bits(q.z)
}

/// Sort key of a light: its Morton code, ties broken by light index.
pub fn morton_key(code: u32, light_id: u32) -> u64 {
    ((code as u64) << 32) | light_id as u64
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    fn node(min: Vec3, max: Vec3, intensity: f32) -> LightNode {
        LightNode::leaf(0, min, max, intensity)
    }

    #[test]
    fn layout() {
        assert_eq!(LightTreeLayout { levels: 2, lights: 2 }, LightTreeLayout::new(0));
        assert_eq!(LightTreeLayout { levels: 2, lights: 2 }, LightTreeLayout::new(1));
        assert_eq!(LightTreeLayout { levels: 2, lights: 2 }, LightTreeLayout::new(2));
        assert_eq!(LightTreeLayout { levels: 4, lights: 8 }, LightTreeLayout::new(7));
        assert_eq!(LightTreeLayout { levels: 11, lights: 1024 }, LightTreeLayout::new(1024));
        assert_eq!(LightTreeLayout { levels: 12, lights: 2048 }, LightTreeLayout::new(1025));

        let layout = LightTreeLayout::new(7);

        assert_eq!(8, layout.level_offset(0));
        assert_eq!(1, layout.level_offset(3));
        assert_eq!(16, layout.storage_nodes());
    }

    #[test]
    fn union_ignores_empty_nodes() {
        let a = node(Vec3::ZERO, Vec3::ONE, 2.0);
        let merged = LightNode::union(&a, &LightNode::EMPTY);

        assert_eq!(a.bound_min, merged.bound_min);
        assert_eq!(a.bound_max, merged.bound_max);
        assert_eq!(2.0, merged.intensity);
        assert!(!merged.is_leaf());

        assert_eq!(
            LightNode::EMPTY,
            LightNode::union(&LightNode::EMPTY, &LightNode::EMPTY)
        );
    }

    #[test]
    fn cosine_bound() {
        let n = node(vec3(-1.0, 2.0, -1.0), vec3(1.0, 3.0, 1.0), 1.0);

        assert_eq!(1.0, n.cosine_bound(Vec3::ZERO, Vec3::Y, false));
        assert_eq!(0.0, n.cosine_bound(Vec3::ZERO, -Vec3::Y, false));
        assert_eq!(0.0, n.cosine_bound(Vec3::ZERO, -Vec3::Y, true));

        // Box entirely to the side: bounded by its nearest edge
        let n = node(vec3(2.0, 0.0, -1.0), vec3(3.0, 1.0, 1.0), 1.0);
        let cos = n.cosine_bound(Vec3::ZERO, Vec3::Y, false);

        assert_relative_eq!(1.0 / 5.0f32.sqrt(), cos, epsilon = 1e-5);
    }

    #[test]
    fn importance_shrinks_for_sub_boxes() {
        let parent = node(vec3(-4.0, 1.0, -4.0), vec3(4.0, 5.0, 4.0), 4.0);
        let child = node(vec3(2.0, 3.0, 2.0), vec3(4.0, 5.0, 4.0), 1.0);

        for approximate in [false, true] {
            for normal in [Vec3::Y, Vec3::X, vec3(1.0, 1.0, 0.0).normalize()] {
                let p = parent.importance(Vec3::ZERO, normal, 0.01, approximate);
                let c = child.importance(Vec3::ZERO, normal, 0.01, approximate);

                assert!(c <= p, "{c} > {p}");
            }
        }
    }

    #[test]
    fn morton() {
        let min = Vec3::ZERO;
        let max = Vec3::ONE;

        assert_eq!(0, morton_code(min, min, max, 1024));
        assert_eq!((1 << 30) - 1, morton_code(max, min, max, 1024));
        assert_eq!(0b100, morton_code(vec3(1.5 / 1023.0, 0.0, 0.0), min, max, 1024));

        assert!(morton_key(1, 0) > morton_key(0, u32::MAX));
        assert!(morton_key(5, 1) > morton_key(5, 0));
    }
}
