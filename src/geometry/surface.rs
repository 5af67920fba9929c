use crate::geometry::ray::{Ray, RayDifferentials};
use crate::material::MaterialData;
use crate::scene::{MaterialId, ObjectId};
use crate::{Float, Point3f, Uv, Vec3f, SHADOW_BIAS};
use cgmath::{EuclideanSpace, InnerSpace};

/// Screen-space footprint of a hit, solved from the ray differentials.
#[derive(Debug, Clone, Copy)]
pub struct SurfaceDifferentials {
    pub dp_dx: Vec3f,
    pub dp_dy: Vec3f,
    pub du_dx: Float,
    pub dv_dx: Float,
    pub du_dy: Float,
    pub dv_dy: Float,
}

impl Default for SurfaceDifferentials {
    fn default() -> Self {
        SurfaceDifferentials {
            dp_dx: Vec3f::new(0.0, 0.0, 0.0),
            dp_dy: Vec3f::new(0.0, 0.0, 0.0),
            du_dx: 0.0,
            dv_dx: 0.0,
            du_dy: 0.0,
            dv_dy: 0.0,
        }
    }
}

/// Everything the shading system needs to know about an intersection.
pub struct SurfacePoint {
    pub p: Point3f,
    /// Geometric (face) normal.
    pub ng: Vec3f,
    /// Shading normal; interpolated vertex normals on smoothed meshes.
    pub n: Vec3f,
    /// Object-reference-space position, preserved through instancing so
    /// procedural patterns stay attached to the object.
    pub orco_p: Point3f,
    pub orco_ng: Vec3f,
    pub has_orco: bool,
    pub uv: Uv,
    pub has_uv: bool,
    /// Normalized surface partial derivatives.
    pub dp_du: Vec3f,
    pub dp_dv: Vec3f,
    /// Unnormalized partials, kept for footprint/edge-distance math.
    pub dp_du_abs: Vec3f,
    pub dp_dv_abs: Vec3f,
    /// Tangent frame (u_axis, v_axis, n).
    pub u_axis: Vec3f,
    pub v_axis: Vec3f,
    /// dp_du / dp_dv expressed in the shading frame.
    pub ds_du: Vec3f,
    pub ds_dv: Vec3f,
    pub differentials: Option<SurfaceDifferentials>,
    pub material_id: MaterialId,
    pub object_id: ObjectId,
    /// Index of the primitive this point lies on, for light-hit queries.
    pub prim_num: usize,
    pub time: Float,
    /// Opaque per-hit material state, filled in lazily by the integrator.
    pub mat_data: Option<MaterialData>,
}

impl SurfacePoint {
    /// Spawns a secondary ray away from the surface, nudged along the
    /// geometric normal to dodge self-intersection.
    pub fn spawn_ray(&self, dir: Vec3f) -> Ray {
        let side = if dir.dot(self.ng) >= 0.0 { 1.0 } else { -1.0 };
        Ray::new(self.p + self.ng * (side * SHADOW_BIAS), dir, self.time)
    }

    /// Shadow ray toward a known point; tmax stops just short of the target.
    pub fn spawn_ray_to(&self, target: Point3f) -> Ray {
        let d = target - self.p;
        let dist = d.magnitude();
        let dir = d / dist;
        let side = if dir.dot(self.ng) >= 0.0 { 1.0 } else { -1.0 };
        Ray::with_range(
            self.p + self.ng * (side * SHADOW_BIAS),
            dir,
            self.time,
            0.0,
            dist - SHADOW_BIAS,
        )
    }

    /// Intersects the two auxiliary rays with the tangent plane and solves
    /// the 2x2 system for the UV footprint. Returns `None` when the
    /// differentials are missing or the surface parametrization is
    /// degenerate.
    pub fn calc_surface_differentials(
        &self,
        diff: Option<&RayDifferentials>,
    ) -> Option<SurfaceDifferentials> {
        let diff = diff?;
        let d = self.ng.dot(self.p.to_vec());

        let nx = self.ng.dot(diff.rx_dir);
        let ny = self.ng.dot(diff.ry_dir);
        if nx.abs() < 1e-12 || ny.abs() < 1e-12 {
            return None;
        }
        let tx = -(self.ng.dot(diff.rx_from.to_vec()) - d) / nx;
        let ty = -(self.ng.dot(diff.ry_from.to_vec()) - d) / ny;
        let px = diff.rx_from + diff.rx_dir * tx;
        let py = diff.ry_from + diff.ry_dir * ty;

        let dp_dx = px - self.p;
        let dp_dy = py - self.p;

        // Project onto the two dominant axes of the normal to keep the
        // system well-conditioned.
        let (a0, a1) = if self.ng.x.abs() > self.ng.y.abs() && self.ng.x.abs() > self.ng.z.abs() {
            (1, 2)
        } else if self.ng.y.abs() > self.ng.z.abs() {
            (0, 2)
        } else {
            (0, 1)
        };

        let dpdu = self.dp_du_abs;
        let dpdv = self.dp_dv_abs;
        let det = dpdu[a0] * dpdv[a1] - dpdv[a0] * dpdu[a1];
        if det.abs() < 1e-20 {
            return None;
        }
        let inv_det = 1.0 / det;

        let solve = |b0: Float, b1: Float| -> (Float, Float) {
            (
                (b0 * dpdv[a1] - dpdv[a0] * b1) * inv_det,
                (dpdu[a0] * b1 - b0 * dpdu[a1]) * inv_det,
            )
        };
        let (du_dx, dv_dx) = solve(dp_dx[a0], dp_dx[a1]);
        let (du_dy, dv_dy) = solve(dp_dy[a0], dp_dy[a1]);

        Some(SurfaceDifferentials {
            dp_dx,
            dp_dy,
            du_dx,
            dv_dx,
            du_dy,
            dv_dy,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::{MaterialId, ObjectId};
    use approx::assert_relative_eq;

    fn flat_point() -> SurfacePoint {
        SurfacePoint {
            p: Point3f::new(0.0, 0.0, 0.0),
            ng: Vec3f::new(0.0, 0.0, 1.0),
            n: Vec3f::new(0.0, 0.0, 1.0),
            orco_p: Point3f::new(0.0, 0.0, 0.0),
            orco_ng: Vec3f::new(0.0, 0.0, 1.0),
            has_orco: false,
            uv: Uv::new(0.0, 0.0),
            has_uv: false,
            dp_du: Vec3f::new(1.0, 0.0, 0.0),
            dp_dv: Vec3f::new(0.0, 1.0, 0.0),
            dp_du_abs: Vec3f::new(1.0, 0.0, 0.0),
            dp_dv_abs: Vec3f::new(0.0, 1.0, 0.0),
            u_axis: Vec3f::new(1.0, 0.0, 0.0),
            v_axis: Vec3f::new(0.0, 1.0, 0.0),
            ds_du: Vec3f::new(1.0, 0.0, 0.0),
            ds_dv: Vec3f::new(0.0, 1.0, 0.0),
            differentials: None,
            material_id: MaterialId(0),
            object_id: ObjectId(0),
            prim_num: 0,
            time: 0.0,
            mat_data: None,
        }
    }

    #[test]
    fn test_surface_differentials_unit_plane() {
        let sp = flat_point();
        // camera one unit above the plane; auxiliary rays tilted so they
        // land one unit apart on the surface
        let diff = RayDifferentials {
            rx_from: Point3f::new(1.0, 0.0, 1.0),
            rx_dir: Vec3f::new(0.0, 0.0, -1.0),
            ry_from: Point3f::new(0.0, 1.0, 1.0),
            ry_dir: Vec3f::new(0.0, 0.0, -1.0),
        };
        let sd = sp.calc_surface_differentials(Some(&diff)).unwrap();
        assert_relative_eq!(sd.du_dx, 1.0, epsilon = 1e-5);
        assert_relative_eq!(sd.dv_dx, 0.0, epsilon = 1e-5);
        assert_relative_eq!(sd.du_dy, 0.0, epsilon = 1e-5);
        assert_relative_eq!(sd.dv_dy, 1.0, epsilon = 1e-5);
    }

    #[test]
    fn test_spawn_ray_offsets_origin() {
        let sp = flat_point();
        let ray = sp.spawn_ray(Vec3f::new(0.0, 0.0, 1.0));
        assert!(ray.from.z > 0.0);
        let below = sp.spawn_ray(Vec3f::new(0.0, 0.0, -1.0));
        assert!(below.from.z < 0.0);
    }
}
