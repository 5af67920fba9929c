use crate::shape::ShapeTriangle;
use crate::{Float, Point3f, Uv, Vec3f, MIN_RAYDIST};
use cgmath::{EuclideanSpace, InnerSpace};

/// A planar quad. Intersection tests the two triangles sharing the
/// diagonal v0-v2; the returned UV is remapped so values are continuous
/// across the diagonal.
#[derive(Debug, Clone, Copy)]
pub struct ShapeQuad {
    vertices: [Point3f; 4],
}

impl ShapeQuad {
    pub fn new(vertices: [Point3f; 4]) -> Self {
        Self { vertices }
    }

    pub fn vertex(&self, i: usize) -> Point3f {
        self.vertices[i]
    }

    pub fn intersect(&self, from: Point3f, dir: Vec3f) -> Option<(Float, Uv)> {
        let edge_1 = self.vertices[1] - self.vertices[0];
        let edge_2 = self.vertices[2] - self.vertices[0];
        let edge_1_len = edge_1.magnitude();
        let edge_2_len = edge_2.magnitude();
        let epsilon_1_2 = 0.1 * MIN_RAYDIST * edge_1_len.max(edge_2_len);
        let pvec_2 = dir.cross(edge_2);
        let det_1_2 = edge_1.dot(pvec_2);
        if det_1_2 <= -epsilon_1_2 || det_1_2 >= epsilon_1_2 {
            let inv_det_1_2 = 1.0 / det_1_2;
            let tvec = from - self.vertices[0];
            let u = tvec.dot(pvec_2) * inv_det_1_2;
            if u >= 0.0 && u <= 1.0 {
                let qvec_1 = tvec.cross(edge_1);
                let v = dir.dot(qvec_1) * inv_det_1_2;
                if v >= 0.0 && (u + v) <= 1.0 {
                    let t = edge_2.dot(qvec_1) * inv_det_1_2;
                    if t >= epsilon_1_2 {
                        return Some((t, Uv::new(u + v, v)));
                    }
                }
            } else {
                // second triangle across the diagonal
                let edge_3 = self.vertices[3] - self.vertices[0];
                let edge_3_len = edge_3.magnitude();
                let epsilon_2_3 = 0.1 * MIN_RAYDIST * edge_2_len.max(edge_3_len);
                let pvec_3 = dir.cross(edge_3);
                let det_2_3 = edge_2.dot(pvec_3);
                if det_2_3 <= -epsilon_2_3 || det_2_3 >= epsilon_2_3 {
                    let inv_det_2_3 = 1.0 / det_2_3;
                    let u = tvec.dot(pvec_3) * inv_det_2_3;
                    if u >= 0.0 && u <= 1.0 {
                        let qvec_2 = tvec.cross(edge_2);
                        let v = dir.dot(qvec_2) * inv_det_2_3;
                        if v >= 0.0 && (u + v) <= 1.0 {
                            let t = edge_3.dot(qvec_2) * inv_det_2_3;
                            if t >= epsilon_2_3 {
                                return Some((t, Uv::new(u, u + v)));
                            }
                        }
                    }
                }
            }
        }
        None
    }

    /// Quads are planar by contract; the face normal comes from the first
    /// two edges.
    pub fn face_normal(&self) -> Vec3f {
        (self.vertices[1] - self.vertices[0])
            .cross(self.vertices[2] - self.vertices[0])
            .normalize()
    }

    pub fn surface_area(&self) -> Float {
        ShapeTriangle::new([self.vertices[0], self.vertices[1], self.vertices[2]]).surface_area()
            + ShapeTriangle::new([self.vertices[0], self.vertices[2], self.vertices[3]])
                .surface_area()
    }

    pub fn sample(&self, uv: Uv) -> Point3f {
        Point3f::from_vec(Self::interpolate(uv, &[
            self.vertices[0].to_vec(),
            self.vertices[1].to_vec(),
            self.vertices[2].to_vec(),
            self.vertices[3].to_vec(),
        ]))
    }

    /// Bilinear interpolation over the quad's corner attributes.
    pub fn interpolate<K>(uv: Uv, t: &[K; 4]) -> K
    where
        K: Copy
            + std::ops::Add<Output = K>
            + std::ops::Mul<Float, Output = K>,
    {
        (t[0] * (1.0 - uv.u) + t[1] * uv.u) * (1.0 - uv.v)
            + (t[3] * (1.0 - uv.u) + t[2] * uv.u) * uv.v
    }

    pub fn dist_to_nearest_edge(uv: Uv, dp_du_abs: Vec3f, dp_dv_abs: Vec3f) -> Float {
        let u_rel = 0.5 - (uv.u - 0.5).abs();
        let v_rel = 0.5 - (uv.v - 0.5).abs();
        (u_rel * dp_du_abs.magnitude()).min(v_rel * dp_dv_abs.magnitude())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn unit_quad() -> ShapeQuad {
        // counter-clockwise in the z=0 plane
        ShapeQuad::new([
            Point3f::new(0.0, 0.0, 0.0),
            Point3f::new(1.0, 0.0, 0.0),
            Point3f::new(1.0, 1.0, 0.0),
            Point3f::new(0.0, 1.0, 0.0),
        ])
    }

    #[test]
    fn test_hits_both_halves() {
        let quad = unit_quad();
        // first triangle (v0 v1 v2)
        let (t, _) = quad
            .intersect(Point3f::new(0.8, 0.3, 1.0), Vec3f::new(0.0, 0.0, -1.0))
            .unwrap();
        assert_relative_eq!(t, 1.0, epsilon = 1e-6);
        // second triangle (v0 v2 v3)
        let (t, _) = quad
            .intersect(Point3f::new(0.2, 0.8, 1.0), Vec3f::new(0.0, 0.0, -1.0))
            .unwrap();
        assert_relative_eq!(t, 1.0, epsilon = 1e-6);
        // off the quad
        assert!(quad
            .intersect(Point3f::new(1.2, 0.5, 1.0), Vec3f::new(0.0, 0.0, -1.0))
            .is_none());
    }

    #[test]
    fn test_uv_continuous_across_diagonal() {
        let quad = unit_quad();
        // points straddling the v0-v2 diagonal should have nearby UVs
        let (_, uv_a) = quad
            .intersect(Point3f::new(0.51, 0.49, 1.0), Vec3f::new(0.0, 0.0, -1.0))
            .unwrap();
        let (_, uv_b) = quad
            .intersect(Point3f::new(0.49, 0.51, 1.0), Vec3f::new(0.0, 0.0, -1.0))
            .unwrap();
        assert!((uv_a.u - uv_b.u).abs() < 0.05);
        assert!((uv_a.v - uv_b.v).abs() < 0.05);
    }

    #[test]
    fn test_interpolate_corners() {
        let corners = [0.0 as Float, 1.0, 2.0, 3.0];
        // interpolate over plain floats via Vec3f stand-in
        let vecs = [
            Vec3f::new(corners[0], 0.0, 0.0),
            Vec3f::new(corners[1], 0.0, 0.0),
            Vec3f::new(corners[2], 0.0, 0.0),
            Vec3f::new(corners[3], 0.0, 0.0),
        ];
        assert_relative_eq!(ShapeQuad::interpolate(Uv::new(0.0, 0.0), &vecs).x, 0.0);
        assert_relative_eq!(ShapeQuad::interpolate(Uv::new(1.0, 0.0), &vecs).x, 1.0);
        assert_relative_eq!(ShapeQuad::interpolate(Uv::new(1.0, 1.0), &vecs).x, 2.0);
        assert_relative_eq!(ShapeQuad::interpolate(Uv::new(0.0, 1.0), &vecs).x, 3.0);
    }

    #[test]
    fn test_surface_area() {
        assert_relative_eq!(unit_quad().surface_area(), 1.0, epsilon = 1e-6);
    }
}
