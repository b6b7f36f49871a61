use glam::{vec2, Vec3};
use rtgi_gpu::{GBufferEntry, Ray, RayHit, RayTracer};

use crate::GiView;

/// Analytic geometry traced on the CPU, standing in for the acceleration
/// structure (tests, reference renders).
#[derive(Clone, Debug, Default)]
pub struct Scene {
    objects: Vec<Object>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Object {
    pub shape: Shape,
    pub albedo: Vec3,
    pub emissive: Vec3,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Shape {
    /// Infinite plane, front-facing towards `normal`.
    Plane { point: Vec3, normal: Vec3 },

    Sphere { center: Vec3, radius: f32 },

    /// Triangle, front-facing on the counter-clockwise side.
    Triangle { positions: [Vec3; 3] },
}

impl Scene {
    pub fn add(&mut self, object: Object) {
        self.objects.push(object);
    }

    pub fn add_plane(&mut self, point: Vec3, normal: Vec3, albedo: Vec3) {
        self.add(Object {
            shape: Shape::Plane {
                point,
                normal: normal.normalize(),
            },
            albedo,
            emissive: Vec3::ZERO,
        });
    }

    pub fn add_sphere(&mut self, center: Vec3, radius: f32, albedo: Vec3) {
        self.add(Object {
            shape: Shape::Sphere { center, radius },
            albedo,
            emissive: Vec3::ZERO,
        });
    }

    pub fn objects(&self) -> &[Object] {
        &self.objects
    }

    /// Rasterizes the scene from given view; `prev_view` provides the
    /// reprojection for the entries' `prev_screen_pos`.
    pub fn render_gbuffer(
        &self,
        view: &GiView,
        prev_view: Option<&GiView>,
    ) -> Vec<GBufferEntry> {
        let mut entries = Vec::with_capacity((view.size.x * view.size.y) as usize);

        for y in 0..view.size.y {
            for x in 0..view.size.x {
                let screen_pos = vec2(x as f32, y as f32) + 0.5;
                let ray = Ray::new(view.position, view.ray_dir(screen_pos));

                let Some(hit) = self.trace(ray) else {
                    entries.push(GBufferEntry::default());
                    continue;
                };

                let prev_screen_pos = prev_view
                    .and_then(|prev_view| prev_view.project(hit.point))
                    .unwrap_or(vec2(-1.0, -1.0));

                entries.push(GBufferEntry {
                    position: hit.point,
                    depth: view.depth(hit.point),
                    normal: hit.normal,
                    albedo: hit.albedo,
                    emissive: hit.emissive,
                    prev_screen_pos,
                });
            }
        }

        entries
    }
}

impl RayTracer for Scene {
    fn trace(&self, ray: Ray) -> Option<RayHit> {
        let mut closest: Option<RayHit> = None;

        for object in &self.objects {
            let max = closest.map_or(ray.len(), |hit| hit.distance);

            let Some((distance, normal)) = object.shape.hit(ray, max) else {
                continue;
            };

            let front_face = ray.dir().dot(normal) < 0.0;

            closest = Some(RayHit {
                distance,
                point: ray.at(distance),
                normal: if front_face { normal } else { -normal },
                albedo: object.albedo,
                emissive: object.emissive,
                front_face,
            });
        }

        closest
    }
}

impl Shape {
    /// Returns distance to the closest intersection within `(0, max)` and
    /// the outward normal there.
    fn hit(&self, ray: Ray, max: f32) -> Option<(f32, Vec3)> {
        let (distance, normal) = match *self {
            Shape::Plane { point, normal } => {
                let denom = ray.dir().dot(normal);

                if denom.abs() < f32::EPSILON {
                    return None;
                }

                ((point - ray.origin()).dot(normal) / denom, normal)
            }

            Shape::Sphere { center, radius } => {
                let oc = ray.origin() - center;
                let b = oc.dot(ray.dir());
                let c = oc.length_squared() - radius * radius;
                let disc = b * b - c;

                if disc < 0.0 {
                    return None;
                }

                let sqrt = disc.sqrt();

                let distance = if -b - sqrt > 0.0 {
                    -b - sqrt
                } else {
                    -b + sqrt
                };

                (distance, (ray.at(distance) - center) / radius)
            }

            Shape::Triangle { positions: [p0, p1, p2] } => {
                let v0v1 = p1 - p0;
                let v0v2 = p2 - p0;
                let pvec = ray.dir().cross(v0v2);
                let det = v0v1.dot(pvec);

                if det.abs() < f32::EPSILON {
                    return None;
                }

                let inv_det = 1.0 / det;
                let tvec = ray.origin() - p0;
                let u = tvec.dot(pvec) * inv_det;
                let qvec = tvec.cross(v0v1);
                let v = ray.dir().dot(qvec) * inv_det;

                if u < 0.0 || u > 1.0 || v < 0.0 || u + v > 1.0 {
                    return None;
                }

                (v0v2.dot(qvec) * inv_det, v0v1.cross(v0v2).normalize())
            }
        };

        (distance > 0.0 && distance < max).then_some((distance, normal))
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use glam::{uvec2, vec3};

    use super::*;

    fn scene() -> Scene {
        let mut scene = Scene::default();

        scene.add_plane(Vec3::ZERO, Vec3::Y, Vec3::splat(0.5));
        scene.add_sphere(vec3(0.0, 1.0, 0.0), 0.5, Vec3::X);

        scene.add(Object {
            shape: Shape::Triangle {
                positions: [
                    vec3(-1.0, 3.0, -1.0),
                    vec3(1.0, 3.0, -1.0),
                    vec3(0.0, 3.0, 1.0),
                ],
            },
            albedo: Vec3::ONE,
            emissive: Vec3::ONE,
        });

        scene
    }

    #[test]
    fn closest_hit_wins() {
        let hit = scene()
            .trace(Ray::new(vec3(0.0, 2.0, 0.0), -Vec3::Y))
            .unwrap();

        assert_relative_eq!(0.5, hit.distance);
        assert_eq!(Vec3::Y, hit.normal);
        assert_eq!(Vec3::X, hit.albedo);
        assert!(hit.front_face);
    }

    #[test]
    fn back_faces() {
        let hit = scene()
            .trace(Ray::new(vec3(0.0, 2.0, 0.0), Vec3::Y))
            .unwrap();

        // triangle's winding makes its front face look down
        assert_relative_eq!(1.0, hit.distance);
        assert_eq!(Vec3::ONE, hit.emissive);
        assert!(hit.front_face);

        let hit = scene()
            .trace(Ray::new(vec3(0.0, -1.0, 0.0), Vec3::Y))
            .unwrap();

        assert!(!hit.front_face);
        assert_eq!(-Vec3::Y, hit.normal);
    }

    #[test]
    fn occlusion_respects_ray_length() {
        let scene = scene();

        assert!(!scene.is_occluded(Ray::between(vec3(3.0, 0.5, 0.0), vec3(3.0, 2.5, 0.0), 0.01)));
        assert!(scene.is_occluded(Ray::between(vec3(0.0, 2.0, 0.0), vec3(0.0, -1.0, 0.0), 0.01)));
    }

    #[test]
    fn static_view_reprojects_onto_itself() {
        let mut view = GiView::new(uvec2(8, 8), vec3(0.0, 5.0, 0.0), -Vec3::Y);

        view.up = Vec3::Z;

        let gbuffer = scene().render_gbuffer(&view, Some(&view));

        for (idx, entry) in gbuffer.iter().enumerate() {
            let pixel = vec2((idx % 8) as f32, (idx / 8) as f32) + 0.5;

            assert!(entry.is_some());
            assert_relative_eq!(pixel.x, entry.prev_screen_pos.x, epsilon = 1e-3);
            assert_relative_eq!(pixel.y, entry.prev_screen_pos.y, epsilon = 1e-3);
        }
    }
}
