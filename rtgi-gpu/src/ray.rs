use glam::Vec3;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Ray {
    origin: Vec3,
    dir: Vec3,
    len: f32,
}

impl Ray {
    pub fn new(origin: Vec3, dir: Vec3) -> Self {
        Self {
            origin,
            dir,
            len: f32::MAX,
        }
    }

    /// Creates a ray going from `from` to `to`, shortened on both ends by
    /// `bias` so that it doesn't self-intersect either surface.
    pub fn between(from: Vec3, to: Vec3, bias: f32) -> Self {
        let delta = to - from;
        let len = delta.length();
        let dir = if len > 0.0 { delta / len } else { Vec3::Z };

        Self {
            origin: from + dir * bias,
            dir,
            len: (len - 2.0 * bias).max(0.0),
        }
    }

    pub fn with_len(mut self, len: f32) -> Self {
        self.len = len;
        self
    }

    pub fn origin(&self) -> Vec3 {
        self.origin
    }

    pub fn dir(&self) -> Vec3 {
        self.dir
    }

    pub fn len(&self) -> f32 {
        self.len
    }

    pub fn at(&self, t: f32) -> Vec3 {
        self.origin + self.dir * t
    }
}

/// Closest-hit record returned by a [`RayTracer`].
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RayHit {
    pub distance: f32,
    pub point: Vec3,

    /// Geometric normal, facing the side that was hit.
    pub normal: Vec3,

    pub albedo: Vec3,
    pub emissive: Vec3,

    /// Whether the ray hit the front side of the surface; probe relocation
    /// and classification count back-face hits.
    pub front_face: bool,
}

/// The ray-tracing acceleration structure, as seen by the kernels.
pub trait RayTracer {
    /// Returns the closest hit along the ray, up to `ray.len()`.
    fn trace(&self, ray: Ray) -> Option<RayHit>;

    /// Returns whether anything blocks the ray; implementations may
    /// override this with a cheaper any-hit query.
    fn is_occluded(&self, ray: Ray) -> bool {
        self.trace(ray).is_some()
    }
}

impl<T> RayTracer for &T
where
    T: RayTracer + ?Sized,
{
    fn trace(&self, ray: Ray) -> Option<RayHit> {
        (**self).trace(ray)
    }

    fn is_occluded(&self, ray: Ray) -> bool {
        (**self).is_occluded(ray)
    }
}
