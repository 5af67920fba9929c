use crate::geometry::bounds::Bounds3f;
use crate::geometry::instance::Instance;
use crate::geometry::matrix::Matrix4f;
use crate::geometry::ray::RayDifferentials;
use crate::geometry::surface::SurfacePoint;
use crate::primitive::Primitive;
use crate::{Float, Point3f, Uv, Vec3f};
use cgmath::InnerSpace;
use smallvec::SmallVec;
use std::sync::Arc;

/// A base primitive viewed through a chain of instance transforms,
/// outermost first. Nested instances flatten into the chain at scene
/// preprocess, so the base is always a concrete (non-instance) primitive.
pub struct InstancePrimitive {
    base: Box<Primitive>,
    chain: SmallVec<[Arc<Instance>; 2]>,
}

impl InstancePrimitive {
    pub fn new(base: Primitive, chain: SmallVec<[Arc<Instance>; 2]>) -> Self {
        debug_assert!(!matches!(base, Primitive::Instance(_)));
        Self { base: Box::new(base), chain }
    }

    pub fn base(&self) -> &Primitive {
        &self.base
    }

    pub fn matrix_at(&self, time: Float) -> Matrix4f {
        self.chain
            .iter()
            .fold(Matrix4f::identity(), |acc, inst| acc * inst.matrix_at_time(time))
    }

    /// All products of control matrices along the chain; the Bezier blend
    /// of positive Bernstein weights stays inside their convex hull, so a
    /// union of bounds over these is conservative.
    fn control_matrices(&self) -> Vec<Matrix4f> {
        let mut acc = vec![Matrix4f::identity()];
        for inst in &self.chain {
            let mut next = Vec::with_capacity(acc.len() * inst.num_keyframes());
            for a in &acc {
                for step in 0..inst.num_keyframes() {
                    next.push(*a * *inst.matrix(step));
                }
            }
            acc = next;
        }
        acc
    }

    pub fn intersect(&self, from: Point3f, dir: Vec3f, time: Float) -> Option<(Float, Uv)> {
        let m = self.matrix_at(time);
        match self.base.as_ref() {
            Primitive::Triangle(p) => p.intersect_with(from, dir, time, Some(&m)),
            Primitive::Quad(p) => p.intersect_with(from, dir, time, Some(&m)),
            Primitive::Sphere(p) => {
                // spheres intersect in object space; the hit distance is
                // re-measured in world space afterwards
                let inv = m.inverse()?;
                let obj_from = inv.transform_point(from);
                let obj_dir = inv.transform_vector(dir);
                let (t_obj, uv) = p.intersect(obj_from, obj_dir)?;
                let world_hit = m.transform_point(obj_from + obj_dir * t_obj);
                let t = (world_hit - from).dot(dir) / dir.magnitude2();
                if t > 0.0 {
                    Some((t, uv))
                } else {
                    None
                }
            }
            Primitive::Instance(_) => None,
        }
    }

    pub fn bound(&self) -> Bounds3f {
        let base_bound = self.base.bound();
        let mut b = Bounds3f::empty();
        for m in self.control_matrices() {
            for i in 0..8 {
                let corner = Point3f::new(
                    if i & 1 == 0 { base_bound.min.x } else { base_bound.max.x },
                    if i & 2 == 0 { base_bound.min.y } else { base_bound.max.y },
                    if i & 4 == 0 { base_bound.min.z } else { base_bound.max.z },
                );
                b = b.join_point(m.transform_point(corner));
            }
        }
        b
    }

    pub fn geometric_normal(&self, uv: Uv, time: Float) -> Vec3f {
        let m = self.matrix_at(time);
        match self.base.as_ref() {
            Primitive::Triangle(p) => p.geometric_normal_with(time, Some(&m)),
            Primitive::Quad(p) => p.geometric_normal_with(time, Some(&m)),
            Primitive::Sphere(p) => m.transform_normal(p.geometric_normal(uv)),
            Primitive::Instance(_) => Vec3f::new(0.0, 0.0, 1.0),
        }
    }

    pub fn sample_point(&self, uv: Uv, time: Float) -> (Point3f, Vec3f) {
        let m = self.matrix_at(time);
        match self.base.as_ref() {
            Primitive::Triangle(p) => p.sample_with(uv, time, Some(&m)),
            Primitive::Quad(p) => p.sample_with(uv, time, Some(&m)),
            Primitive::Sphere(p) => {
                let (op, on) = p.sample_point(uv);
                (m.transform_point(op), m.transform_normal(on))
            }
            Primitive::Instance(_) => (Point3f::new(0.0, 0.0, 0.0), Vec3f::new(0.0, 0.0, 1.0)),
        }
    }

    pub fn surface_area(&self, time: Float) -> Float {
        let m = self.matrix_at(time);
        match self.base.as_ref() {
            Primitive::Triangle(p) => p.area_with(time, Some(&m)),
            Primitive::Quad(p) => p.area_with(time, Some(&m)),
            other => other.surface_area(time),
        }
    }

    pub fn surface(
        &self,
        hit_point: Point3f,
        uv: Uv,
        time: Float,
        diff: Option<&RayDifferentials>,
        prim_num: usize,
    ) -> SurfacePoint {
        let m = self.matrix_at(time);
        match self.base.as_ref() {
            Primitive::Triangle(p) => p.surface_with(hit_point, uv, time, diff, prim_num, Some(&m)),
            Primitive::Quad(p) => p.surface_with(hit_point, uv, time, diff, prim_num, Some(&m)),
            Primitive::Sphere(p) => {
                let obj_hit = m
                    .inverse()
                    .map(|inv| inv.transform_point(hit_point))
                    .unwrap_or(hit_point);
                let mut sp = p.surface(obj_hit, uv, time, diff, prim_num);
                sp.p = hit_point;
                sp.ng = m.transform_normal(sp.ng);
                sp.n = m.transform_normal(sp.n);
                sp.dp_du = m.transform_vector(sp.dp_du).normalize();
                sp.dp_dv = m.transform_vector(sp.dp_dv).normalize();
                sp.dp_du_abs = m.transform_vector(sp.dp_du_abs);
                sp.dp_dv_abs = m.transform_vector(sp.dp_dv_abs);
                let (u_axis, v_axis) = crate::coordinate_system(sp.n);
                sp.u_axis = u_axis;
                sp.v_axis = v_axis;
                sp
            }
            Primitive::Instance(p) => p.surface(hit_point, uv, time, diff, prim_num),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::mesh::MeshObject;
    use crate::primitive::TrianglePrimitive;
    use crate::scene::{MaterialId, ObjectId};
    use approx::assert_relative_eq;
    use smallvec::smallvec;

    fn base_triangle() -> Primitive {
        let mut mesh = MeshObject::new("tri", 1);
        let a = mesh.add_vertex(Point3f::new(0.0, 0.0, 0.0));
        let b = mesh.add_vertex(Point3f::new(1.0, 0.0, 0.0));
        let c = mesh.add_vertex(Point3f::new(0.0, 1.0, 0.0));
        mesh.add_triangle([a, b, c]);
        Primitive::Triangle(TrianglePrimitive::new(Arc::new(mesh), 0, ObjectId(0)))
    }

    #[test]
    fn test_instance_hit_matches_base_with_transformed_ray() {
        let mut inst = Instance::new();
        inst.add_matrix(Matrix4f::translation(Vec3f::new(3.0, -1.0, 0.5)), 0.0);
        let prim = InstancePrimitive::new(base_triangle(), smallvec![Arc::new(inst)]);

        // ray through the instanced triangle
        let hit = prim.intersect(Point3f::new(3.2, -0.8, 2.0), Vec3f::new(0.0, 0.0, -1.0), 0.0);
        assert!(hit.is_some());
        let (t, uv) = hit.unwrap();
        assert_relative_eq!(t, 1.5, epsilon = 1e-5);

        // equivalent ray against the base primitive
        let base = base_triangle();
        let (t_base, uv_base) = base
            .intersect(Point3f::new(0.2, 0.2, 1.5), Vec3f::new(0.0, 0.0, -1.0), 0.0)
            .unwrap();
        assert_relative_eq!(t, t_base, epsilon = 1e-5);
        assert_relative_eq!(uv.u, uv_base.u, epsilon = 1e-5);
        assert_relative_eq!(uv.v, uv_base.v, epsilon = 1e-5);
    }

    #[test]
    fn test_nested_chain_composes() {
        let mut outer = Instance::new();
        outer.add_matrix(Matrix4f::translation(Vec3f::new(1.0, 0.0, 0.0)), 0.0);
        let mut inner = Instance::new();
        inner.add_matrix(Matrix4f::translation(Vec3f::new(0.0, 2.0, 0.0)), 0.0);
        let prim = InstancePrimitive::new(
            base_triangle(),
            smallvec![Arc::new(outer), Arc::new(inner)],
        );
        let m = prim.matrix_at(0.0);
        let p = m.transform_point(Point3f::new(0.0, 0.0, 0.0));
        assert_relative_eq!(p.x, 1.0);
        assert_relative_eq!(p.y, 2.0);
    }

    #[test]
    fn test_bound_covers_all_keyframes() {
        let mut inst = Instance::new();
        inst.add_matrix(Matrix4f::translation(Vec3f::new(0.0, 0.0, 0.0)), 0.0);
        inst.add_matrix(Matrix4f::translation(Vec3f::new(2.0, 0.0, 0.0)), 0.5);
        inst.add_matrix(Matrix4f::translation(Vec3f::new(4.0, 0.0, 0.0)), 1.0);
        let prim = InstancePrimitive::new(base_triangle(), smallvec![Arc::new(inst)]);
        let b = prim.bound();
        assert!(b.min.x <= 0.0);
        assert!(b.max.x >= 5.0); // base extends to x=1, shifted by up to 4
    }
}
