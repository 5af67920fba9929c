use crate::{Float, Point3f, Vec3f};
use cgmath::{InnerSpace, SquareMatrix, Transform};
use std::ops::{Add, Mul};

/// 4x4 object-to-world transform. The public entry points take row-major
/// data (translation in the last column); storage delegates to `cgmath`,
/// which is column-major internally.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Matrix4f(pub cgmath::Matrix4<Float>);

impl Matrix4f {
    pub fn identity() -> Self {
        Matrix4f(cgmath::Matrix4::identity())
    }

    /// Builds from 16 row-major entries `m[row][col]`. Set `transpose` when
    /// the caller's data is column-major instead.
    pub fn from_rows(m: [[Float; 4]; 4], transpose: bool) -> Self {
        let c = if transpose {
            cgmath::Matrix4::new(
                m[0][0], m[0][1], m[0][2], m[0][3],
                m[1][0], m[1][1], m[1][2], m[1][3],
                m[2][0], m[2][1], m[2][2], m[2][3],
                m[3][0], m[3][1], m[3][2], m[3][3],
            )
        } else {
            // cgmath::Matrix4::new takes column-major order
            cgmath::Matrix4::new(
                m[0][0], m[1][0], m[2][0], m[3][0],
                m[0][1], m[1][1], m[2][1], m[3][1],
                m[0][2], m[1][2], m[2][2], m[3][2],
                m[0][3], m[1][3], m[2][3], m[3][3],
            )
        };
        Matrix4f(c)
    }

    pub fn translation(v: Vec3f) -> Self {
        Matrix4f(cgmath::Matrix4::from_translation(v))
    }

    pub fn scale(x: Float, y: Float, z: Float) -> Self {
        Matrix4f(cgmath::Matrix4::from_nonuniform_scale(x, y, z))
    }

    pub fn inverse(&self) -> Option<Matrix4f> {
        self.0.invert().map(Matrix4f)
    }

    pub fn transform_point(&self, p: Point3f) -> Point3f {
        self.0.transform_point(p)
    }

    pub fn transform_vector(&self, v: Vec3f) -> Vec3f {
        self.0.transform_vector(v)
    }

    /// Normals transform by the inverse transpose; falls back to the plain
    /// linear part for singular matrices.
    pub fn transform_normal(&self, n: Vec3f) -> Vec3f {
        match self.0.invert() {
            Some(inv) => {
                let t = Vec3f::new(
                    inv.x.x * n.x + inv.x.y * n.y + inv.x.z * n.z,
                    inv.y.x * n.x + inv.y.y * n.y + inv.y.z * n.z,
                    inv.z.x * n.x + inv.z.y * n.y + inv.z.z * n.z,
                );
                t.normalize()
            }
            None => self.transform_vector(n).normalize(),
        }
    }

    /// Quadratic Bezier blend of three keyframe matrices.
    pub fn bezier_interpolate(steps: &[Matrix4f; 3], factors: [Float; 3]) -> Matrix4f {
        Matrix4f(
            steps[0].0 * factors[0] + steps[1].0 * factors[1] + steps[2].0 * factors[2],
        )
    }
}

impl Mul for Matrix4f {
    type Output = Matrix4f;
    fn mul(self, rhs: Matrix4f) -> Matrix4f {
        Matrix4f(self.0 * rhs.0)
    }
}

impl Add for Matrix4f {
    type Output = Matrix4f;
    fn add(self, rhs: Matrix4f) -> Matrix4f {
        Matrix4f(self.0 + rhs.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_row_major_translation_in_last_column() {
        let m = Matrix4f::from_rows(
            [
                [1.0, 0.0, 0.0, 5.0],
                [0.0, 1.0, 0.0, -2.0],
                [0.0, 0.0, 1.0, 3.0],
                [0.0, 0.0, 0.0, 1.0],
            ],
            false,
        );
        let p = m.transform_point(Point3f::new(1.0, 1.0, 1.0));
        assert_eq!(p, Point3f::new(6.0, -1.0, 4.0));
    }

    #[test]
    fn test_inverse_roundtrip() {
        let m = Matrix4f::from_rows(
            [
                [2.0, 0.0, 0.0, 1.0],
                [0.0, 3.0, 0.0, 0.0],
                [0.0, 0.0, 0.5, -4.0],
                [0.0, 0.0, 0.0, 1.0],
            ],
            false,
        );
        let inv = m.inverse().unwrap();
        let p = Point3f::new(0.7, -1.3, 2.9);
        let back = inv.transform_point(m.transform_point(p));
        assert_relative_eq!(back.x, p.x, max_relative = 1e-4);
        assert_relative_eq!(back.y, p.y, max_relative = 1e-4);
        assert_relative_eq!(back.z, p.z, max_relative = 1e-4);
    }

    #[test]
    fn test_bezier_interpolate_endpoints() {
        let a = Matrix4f::translation(Vec3f::new(0.0, 0.0, 0.0));
        let b = Matrix4f::translation(Vec3f::new(1.0, 0.0, 0.0));
        let c = Matrix4f::translation(Vec3f::new(2.0, 0.0, 0.0));
        let steps = [a, b, c];
        let at_start = Matrix4f::bezier_interpolate(&steps, crate::bezier_factors(0.0));
        let at_end = Matrix4f::bezier_interpolate(&steps, crate::bezier_factors(1.0));
        assert_eq!(at_start, a);
        assert_eq!(at_end, c);
    }
}
