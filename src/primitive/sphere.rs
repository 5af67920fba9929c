use crate::geometry::bounds::Bounds3f;
use crate::geometry::ray::RayDifferentials;
use crate::geometry::surface::SurfacePoint;
use crate::scene::{MaterialId, ObjectId};
use crate::{coordinate_system, Float, Point3f, Uv, Vec3f, MIN_RAYDIST, PI, TWO_PI};
use cgmath::InnerSpace;

/// Analytic sphere primitive.
pub struct SpherePrimitive {
    pub center: Point3f,
    pub radius: Float,
    pub material_id: MaterialId,
    pub object_id: ObjectId,
}

impl SpherePrimitive {
    pub fn new(center: Point3f, radius: Float, material_id: MaterialId, object_id: ObjectId) -> Self {
        Self { center, radius, material_id, object_id }
    }

    pub fn intersect(&self, from: Point3f, dir: Vec3f) -> Option<(Float, Uv)> {
        let vf = from - self.center;
        let ea = dir.magnitude2();
        let eb = 2.0 * vf.dot(dir);
        let ec = vf.magnitude2() - self.radius * self.radius;
        let osc = eb * eb - 4.0 * ea * ec;
        if osc < 0.0 {
            return None;
        }
        let osc = osc.sqrt();
        let t0 = (-eb - osc) / (2.0 * ea);
        let t1 = (-eb + osc) / (2.0 * ea);
        let t = if t0 > MIN_RAYDIST {
            t0
        } else if t1 > MIN_RAYDIST {
            t1
        } else {
            return None;
        };
        let hit = from + dir * t;
        let n = (hit - self.center) / self.radius;
        Some((t, Self::uv_of_normal(n)))
    }

    fn uv_of_normal(n: Vec3f) -> Uv {
        let theta = n.z.min(1.0).max(-1.0).acos();
        let mut phi = n.y.atan2(n.x);
        if phi < 0.0 {
            phi += TWO_PI;
        }
        Uv::new(phi / TWO_PI, theta / PI)
    }

    pub fn bound(&self) -> Bounds3f {
        let r = Vec3f::new(self.radius, self.radius, self.radius);
        Bounds3f::with_bounds(self.center - r, self.center + r)
    }

    pub fn geometric_normal(&self, uv: Uv) -> Vec3f {
        let theta = uv.v * PI;
        let phi = uv.u * TWO_PI;
        let sin_theta = theta.sin();
        Vec3f::new(sin_theta * phi.cos(), sin_theta * phi.sin(), theta.cos())
    }

    pub fn surface_area(&self) -> Float {
        4.0 * PI * self.radius * self.radius
    }

    /// Uniform point on the sphere from two unit samples.
    pub fn sample_point(&self, uv: Uv) -> (Point3f, Vec3f) {
        let z = 1.0 - 2.0 * uv.u;
        let r2 = (1.0 - z * z).max(0.0);
        let r = r2.sqrt();
        let a = TWO_PI * uv.v;
        let n = Vec3f::new(a.cos() * r, a.sin() * r, z);
        (self.center + n * self.radius, n)
    }

    pub fn surface(
        &self,
        hit_point: Point3f,
        uv: Uv,
        time: Float,
        diff: Option<&RayDifferentials>,
        prim_num: usize,
    ) -> SurfacePoint {
        let n = (hit_point - self.center).normalize();
        let theta = uv.v * PI;
        let phi = uv.u * TWO_PI;
        let rel = hit_point - self.center;

        // spherical parametrization partials; degenerate at the poles,
        // where an arbitrary tangent frame takes over
        let dp_du_abs = Vec3f::new(-rel.y, rel.x, 0.0) * TWO_PI;
        let dp_dv_abs =
            Vec3f::new(rel.z * phi.cos(), rel.z * phi.sin(), -self.radius * theta.sin()) * PI;
        let (dp_du, dp_dv) = if dp_du_abs.magnitude2() > 1e-12 && dp_dv_abs.magnitude2() > 1e-12 {
            (dp_du_abs.normalize(), dp_dv_abs.normalize())
        } else {
            coordinate_system(n)
        };

        let (u_axis, v_axis) = coordinate_system(n);
        let ds_du = Vec3f::new(u_axis.dot(dp_du), v_axis.dot(dp_du), n.dot(dp_du));
        let ds_dv = Vec3f::new(u_axis.dot(dp_dv), v_axis.dot(dp_dv), n.dot(dp_dv));

        let mut sp = SurfacePoint {
            p: hit_point,
            ng: n,
            n,
            orco_p: hit_point,
            orco_ng: n,
            has_orco: false,
            uv,
            has_uv: true,
            dp_du,
            dp_dv,
            dp_du_abs,
            dp_dv_abs,
            u_axis,
            v_axis,
            ds_du,
            ds_dv,
            differentials: None,
            material_id: self.material_id,
            object_id: self.object_id,
            prim_num,
            time,
            mat_data: None,
        };
        sp.differentials = sp.calc_surface_differentials(diff);
        sp
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_intersect_front_and_inside() {
        let s = SpherePrimitive::new(Point3f::new(0.0, 0.0, 0.0), 1.0, MaterialId(0), ObjectId(0));
        let (t, _) = s
            .intersect(Point3f::new(0.0, 0.0, 3.0), Vec3f::new(0.0, 0.0, -1.0))
            .unwrap();
        assert_relative_eq!(t, 2.0, epsilon = 1e-5);
        // from inside, the far intersection is returned
        let (t, _) = s
            .intersect(Point3f::new(0.0, 0.0, 0.0), Vec3f::new(0.0, 0.0, -1.0))
            .unwrap();
        assert_relative_eq!(t, 1.0, epsilon = 1e-5);
        // clean miss
        assert!(s
            .intersect(Point3f::new(2.0, 0.0, 3.0), Vec3f::new(0.0, 0.0, -1.0))
            .is_none());
    }

    #[test]
    fn test_sample_point_on_surface() {
        let s = SpherePrimitive::new(Point3f::new(1.0, 2.0, 3.0), 2.0, MaterialId(0), ObjectId(0));
        for &(u, v) in &[(0.0, 0.0), (0.3, 0.7), (0.99, 0.01)] {
            let (p, n) = s.sample_point(Uv::new(u, v));
            assert_relative_eq!((p - s.center).magnitude(), 2.0, epsilon = 1e-5);
            assert_relative_eq!(n.magnitude(), 1.0, epsilon = 1e-5);
        }
    }
}
