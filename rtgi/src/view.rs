use glam::{vec2, UVec2, Vec2, Vec3};

/// A camera the GI gets computed for.
#[derive(Clone, Debug, PartialEq)]
pub struct GiView {
    pub size: UVec2,
    pub position: Vec3,
    pub forward: Vec3,
    pub up: Vec3,

    /// Vertical field of view, in radians.
    pub fov_y: f32,

    /// Whether the history of this view is no longer valid (teleport,
    /// cut between shots).
    pub camera_cut: bool,

    /// Whether the view renders into a secondary, subsampled rect (e.g.
    /// checkerboard or foveated rendering).
    pub subsampled: bool,
}

impl GiView {
    pub fn new(size: UVec2, position: Vec3, forward: Vec3) -> Self {
        Self {
            size,
            position,
            forward: forward.normalize_or_zero(),
            up: Vec3::Y,
            fov_y: 60.0f32.to_radians(),
            camera_cut: false,
            subsampled: false,
        }
    }

    pub fn describe(&self) -> String {
        format!("{}x{} at {:?}", self.size.x, self.size.y, self.position)
    }

    pub fn aspect(&self) -> f32 {
        self.size.x as f32 / self.size.y.max(1) as f32
    }

    /// Returns the view's orthonormal `(right, up, forward)` basis.
    pub fn basis(&self) -> (Vec3, Vec3, Vec3) {
        let forward = self.forward.normalize_or_zero();
        let right = forward.cross(self.up).normalize_or_zero();
        let up = right.cross(forward);

        (right, up, forward)
    }

    /// Direction of the primary ray going through given point of the
    /// screen (in pixels, `(0, 0)` being the top-left corner).
    pub fn ray_dir(&self, screen_pos: Vec2) -> Vec3 {
        let (right, up, forward) = self.basis();
        let tan_y = (self.fov_y * 0.5).tan();
        let tan_x = tan_y * self.aspect();

        let ndc = screen_pos / self.size.as_vec2() * 2.0 - 1.0;

        (forward + right * (ndc.x * tan_x) - up * (ndc.y * tan_y)).normalize()
    }

    /// Projects a world-space point onto the screen; returns `None` for
    /// points behind the camera or outside of the viewport.
    pub fn project(&self, point: Vec3) -> Option<Vec2> {
        let (right, up, forward) = self.basis();
        let d = point - self.position;
        let z = d.dot(forward);

        if z <= 0.0 {
            return None;
        }

        let tan_y = (self.fov_y * 0.5).tan();
        let tan_x = tan_y * self.aspect();
        let ndc = vec2(d.dot(right) / (z * tan_x), -d.dot(up) / (z * tan_y));
        let pos = (ndc + 1.0) * 0.5 * self.size.as_vec2();

        (pos.x >= 0.0
            && pos.y >= 0.0
            && pos.x < self.size.x as f32
            && pos.y < self.size.y as f32)
            .then_some(pos)
    }

    /// Linear depth of given point, as stored in the g-buffer.
    pub fn depth(&self, point: Vec3) -> f32 {
        (point - self.position).dot(self.forward.normalize_or_zero())
    }

    /// Whether a sphere is (at least partially) within the view's frustum.
    pub fn contains_sphere(&self, center: Vec3, radius: f32) -> bool {
        let (right, up, forward) = self.basis();

        let d = center - self.position;
        let z = d.dot(forward);

        if z < -radius {
            return false;
        }

        let tan_y = (self.fov_y * 0.5).tan();
        let tan_x = tan_y * self.aspect();

        let fits = |offset: f32, tan: f32| {
            offset.abs() - radius * (1.0 + tan * tan).sqrt() <= z * tan
        };

        fits(d.dot(right), tan_x) && fits(d.dot(up), tan_y)
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use glam::{uvec2, vec2, vec3};

    use super::*;

    #[test]
    fn frustum() {
        let view = GiView::new(uvec2(100, 100), Vec3::ZERO, -Vec3::Z);

        assert!(view.contains_sphere(vec3(0.0, 0.0, -10.0), 0.1));
        assert!(!view.contains_sphere(vec3(0.0, 0.0, 10.0), 0.1));
        assert!(!view.contains_sphere(vec3(100.0, 0.0, -10.0), 0.1));
        assert!(view.contains_sphere(vec3(100.0, 0.0, -10.0), 200.0));
    }

    #[test]
    fn projection_inverts_primary_rays() {
        let view = GiView::new(uvec2(64, 32), vec3(1.0, 2.0, 3.0), vec3(0.3, -0.2, -1.0));

        for screen_pos in [vec2(0.5, 0.5), vec2(32.0, 16.0), vec2(63.5, 10.25)] {
            let point = view.position + view.ray_dir(screen_pos) * 7.0;
            let actual = view.project(point).unwrap();

            assert_abs_diff_eq!(screen_pos.x, actual.x, epsilon = 1e-3);
            assert_abs_diff_eq!(screen_pos.y, actual.y, epsilon = 1e-3);
        }

        assert_eq!(None, view.project(view.position - view.forward));
    }
}
