use glam::{vec3, Vec3};

pub trait Vec3Ext
where
    Self: Sized,
{
    /// Reflects this direction-vector around `other`.
    fn reflect(self, other: Self) -> Self;

    /// Returns luminance of this color-vector.
    fn luma(self) -> f32;

    /// Returns a unit vector orthogonal to this one.
    fn any_orthonormal(self) -> Self;
}

impl Vec3Ext for Vec3 {
    fn reflect(self, other: Self) -> Self {
        self - 2.0 * other.dot(self) * other
    }

    fn luma(self) -> f32 {
        self.dot(vec3(0.2126, 0.7152, 0.0722))
    }

    fn any_orthonormal(self) -> Self {
        let sign = 1.0f32.copysign(self.z);
        let a = -1.0 / (sign + self.z);
        let b = self.x * self.y * a;

        vec3(1.0 + sign * self.x * self.x * a, sign * b, -sign * self.x)
    }
}
