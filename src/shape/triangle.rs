use crate::{Float, Point3f, Uv, Vec3f, MIN_RAYDIST};
use cgmath::{EuclideanSpace, InnerSpace};

/// A bare triangle in world space; the primitive layer resolves vertices
/// (possibly time-interpolated or instanced) before building one of these.
#[derive(Debug, Clone, Copy)]
pub struct ShapeTriangle {
    vertices: [Point3f; 3],
}

impl ShapeTriangle {
    pub fn new(vertices: [Point3f; 3]) -> Self {
        Self { vertices }
    }

    pub fn vertex(&self, i: usize) -> Point3f {
        self.vertices[i]
    }

    /// Moller-Trumbore intersection. Hits closer than the edge-scaled
    /// tolerance are rejected as self-intersections.
    pub fn intersect(&self, from: Point3f, dir: Vec3f) -> Option<(Float, Uv)> {
        let edge_1 = self.vertices[1] - self.vertices[0];
        let edge_2 = self.vertices[2] - self.vertices[0];
        let epsilon = 0.1 * MIN_RAYDIST * edge_1.magnitude().max(edge_2.magnitude());
        let pvec = dir.cross(edge_2);
        let det = edge_1.dot(pvec);
        if det <= -epsilon || det >= epsilon {
            let inv_det = 1.0 / det;
            let tvec = from - self.vertices[0];
            let u = tvec.dot(pvec) * inv_det;
            if u >= 0.0 && u <= 1.0 {
                let qvec = tvec.cross(edge_1);
                let v = dir.dot(qvec) * inv_det;
                if v >= 0.0 && (u + v) <= 1.0 {
                    let t = edge_2.dot(qvec) * inv_det;
                    if t >= epsilon {
                        return Some((t, Uv::new(u, v)));
                    }
                }
            }
        }
        None
    }

    pub fn face_normal(&self) -> Vec3f {
        (self.vertices[1] - self.vertices[0])
            .cross(self.vertices[2] - self.vertices[0])
            .normalize()
    }

    pub fn surface_area(&self) -> Float {
        0.5 * (self.vertices[1] - self.vertices[0])
            .cross(self.vertices[2] - self.vertices[0])
            .magnitude()
    }

    /// Area-uniform sample; the sqrt warp maps the unit square onto the
    /// triangle without clumping at the edges.
    pub fn sample(&self, uv: Uv) -> Point3f {
        let su = uv.u.sqrt();
        let b0 = 1.0 - su;
        let b1 = uv.v * su;
        let b2 = 1.0 - b0 - b1;
        Point3f::from_vec(
            self.vertices[0].to_vec() * b0
                + self.vertices[1].to_vec() * b1
                + self.vertices[2].to_vec() * b2,
        )
    }

    /// Barycentric weights (w, u, v) for the intrinsic intersection UV.
    pub fn barycentrics(uv: Uv) -> (Float, Float, Float) {
        (1.0 - uv.u - uv.v, uv.u, uv.v)
    }

    /// World-space distance to the nearest triangle edge, scaled by the
    /// magnitudes of the unnormalized surface partials. Used by wireframe
    /// shading.
    pub fn dist_to_nearest_edge(uv: Uv, dp_du_abs: Vec3f, dp_dv_abs: Vec3f) -> Float {
        let (bw, bu, bv) = Self::barycentrics(uv);
        let u_rel = 0.5 - (bw - 0.5).abs();
        let v_rel = 0.5 - (bu - 0.5).abs();
        let w_rel = 0.5 - (bv - 0.5).abs();
        let u_abs = u_rel * dp_du_abs.magnitude();
        let v_abs = v_rel * dp_dv_abs.magnitude();
        let w_abs = w_rel * (dp_dv_abs - dp_du_abs).magnitude();
        u_abs.min(v_abs).min(w_abs)
    }
}
