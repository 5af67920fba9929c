use crate::geometry::bounds::Bounds3f;
use crate::geometry::matrix::Matrix4f;
use crate::geometry::mesh::{FaceIndices, MeshObject, NO_INDEX};
use crate::geometry::ray::RayDifferentials;
use crate::geometry::surface::SurfacePoint;
use crate::scene::{LightId, MaterialId, ObjectId};
use crate::shape::{ShapeQuad, ShapeTriangle};
use crate::{coordinate_system, Float, Point3f, Uv, Vec3f};
use cgmath::{EuclideanSpace, InnerSpace};
use std::sync::Arc;

fn transform_point(m: Option<&Matrix4f>, p: Point3f) -> Point3f {
    match m {
        Some(m) => m.transform_point(p),
        None => p,
    }
}

fn transform_normal(m: Option<&Matrix4f>, n: Vec3f) -> Vec3f {
    match m {
        Some(m) => m.transform_normal(n),
        None => n,
    }
}

/// A single triangular face of a mesh; deformation comes from the mesh's
/// vertex time steps, instancing from the optional object-to-world matrix
/// threaded through every query.
#[derive(Clone)]
pub struct TrianglePrimitive {
    mesh: Arc<MeshObject>,
    face_index: u32,
    object_id: ObjectId,
}

/// A planar quad face; shares the mesh machinery with the triangle but
/// interpolates attributes bilinearly and remaps intersection UVs across
/// the diagonal.
#[derive(Clone)]
pub struct QuadPrimitive {
    mesh: Arc<MeshObject>,
    face_index: u32,
    object_id: ObjectId,
}

impl TrianglePrimitive {
    pub fn new(mesh: Arc<MeshObject>, face_index: u32, object_id: ObjectId) -> Self {
        Self { mesh, face_index, object_id }
    }

    fn face(&self) -> &FaceIndices {
        self.mesh.face(self.face_index as usize)
    }

    pub fn has_motion_blur(&self) -> bool {
        self.mesh.has_motion_blur()
    }

    pub fn material_id(&self) -> MaterialId {
        self.mesh.material_id()
    }

    pub fn object_id(&self) -> ObjectId {
        self.object_id
    }

    pub fn light_id(&self) -> Option<LightId> {
        self.mesh.light_id()
    }

    fn vertices_at_time(&self, time: Float, m: Option<&Matrix4f>) -> [Point3f; 3] {
        let f = self.face();
        [
            transform_point(m, self.mesh.vertex_at_time(f.corners[0].vertex, time)),
            transform_point(m, self.mesh.vertex_at_time(f.corners[1].vertex, time)),
            transform_point(m, self.mesh.vertex_at_time(f.corners[2].vertex, time)),
        ]
    }

    fn vertices_step(&self, step: usize, m: Option<&Matrix4f>) -> [Point3f; 3] {
        let f = self.face();
        [
            transform_point(m, self.mesh.vertex(f.corners[0].vertex, step)),
            transform_point(m, self.mesh.vertex(f.corners[1].vertex, step)),
            transform_point(m, self.mesh.vertex(f.corners[2].vertex, step)),
        ]
    }

    fn shape_at(&self, time: Float, m: Option<&Matrix4f>) -> ShapeTriangle {
        ShapeTriangle::new(self.vertices_at_time(time, m))
    }

    pub fn intersect_with(
        &self,
        from: Point3f,
        dir: Vec3f,
        time: Float,
        m: Option<&Matrix4f>,
    ) -> Option<(Float, Uv)> {
        self.shape_at(time, m).intersect(from, dir)
    }

    /// Bezier bounds are the union over the control time steps, which is a
    /// conservative over-estimate.
    pub fn bound_with(&self, m: Option<&Matrix4f>) -> Bounds3f {
        let mut b = Bounds3f::empty();
        for step in 0..self.mesh.num_time_steps() {
            for p in &self.vertices_step(step, m) {
                b = b.join_point(*p);
            }
        }
        b
    }

    pub fn geometric_normal_with(&self, time: Float, m: Option<&Matrix4f>) -> Vec3f {
        let n = self.shape_at(time, None).face_normal();
        transform_normal(m, n)
    }

    pub fn area_with(&self, time: Float, m: Option<&Matrix4f>) -> Float {
        self.shape_at(time, m).surface_area()
    }

    pub fn sample_with(&self, uv: Uv, time: Float, m: Option<&Matrix4f>) -> (Point3f, Vec3f) {
        let shape = self.shape_at(time, m);
        (shape.sample(uv), shape.face_normal())
    }

    /// Step-0 vertices as f64 triples for box clipping.
    pub fn vertices_f64(&self) -> Vec<[f64; 3]> {
        self.vertices_step(0, None)
            .iter()
            .map(|p| [p.x as f64, p.y as f64, p.z as f64])
            .collect()
    }

    pub fn surface_with(
        &self,
        hit_point: Point3f,
        uv: Uv,
        time: Float,
        diff: Option<&RayDifferentials>,
        prim_num: usize,
        m: Option<&Matrix4f>,
    ) -> SurfacePoint {
        let f = self.face().clone();
        let ng = self.geometric_normal_with(time, m);
        let (b0, b1, b2) = ShapeTriangle::barycentrics(uv);

        // shading normal: interpolated vertex normals on smoothed meshes
        let n = if self.mesh.is_smooth() || self.mesh.has_vertex_normals() {
            let vn = |c: &crate::geometry::mesh::VertexIndices| {
                if c.normal != NO_INDEX {
                    transform_normal(m, self.mesh.normal_at_time(c.normal, time))
                } else {
                    ng
                }
            };
            let n = vn(&f.corners[0]) * b0 + vn(&f.corners[1]) * b1 + vn(&f.corners[2]) * b2;
            if n.magnitude2() > 0.0 {
                n.normalize()
            } else {
                ng
            }
        } else {
            ng
        };

        let has_orco = self.mesh.has_orco();
        let (orco_p, orco_ng) = if has_orco {
            let o0 = self.mesh.orco(f.corners[0].vertex);
            let o1 = self.mesh.orco(f.corners[1].vertex);
            let o2 = self.mesh.orco(f.corners[2].vertex);
            let p = Point3f::from_vec(o0.to_vec() * b0 + o1.to_vec() * b1 + o2.to_vec() * b2);
            let n = (o1 - o0).cross(o2 - o0).normalize();
            (p, n)
        } else {
            (hit_point, self.shape_at(time, None).face_normal())
        };

        // UVs and surface partials; fall back to edge-aligned partials when
        // the UV parametrization is degenerate
        let p = self.vertices_step(0, m);
        let has_uv = self.mesh.has_uv() && f.corners.iter().all(|c| c.uv != NO_INDEX);
        let mut implicit_uv = true;
        let mut sp_uv = Uv::new(b1, b2);
        let mut dp_du = p[1] - p[0];
        let mut dp_dv = p[2] - p[0];
        if has_uv {
            let uv0 = self.mesh.uv(f.corners[0].uv);
            let uv1 = self.mesh.uv(f.corners[1].uv);
            let uv2 = self.mesh.uv(f.corners[2].uv);
            sp_uv = uv0 * b0 + uv1 * b1 + uv2 * b2;
            let d1 = uv1 - uv0;
            let d2 = uv2 - uv0;
            let det = d1.u * d2.v - d1.v * d2.u;
            if det.abs() > 1e-30 {
                let inv_det = 1.0 / det;
                let dp1 = p[1] - p[0];
                let dp2 = p[2] - p[0];
                dp_du = (dp1 * d2.v - dp2 * d1.v) * inv_det;
                dp_dv = (dp2 * d1.u - dp1 * d2.u) * inv_det;
                implicit_uv = false;
            }
        }
        if implicit_uv && !has_uv {
            sp_uv = Uv::new(b1, b2);
        }

        finish_surface_point(
            hit_point,
            ng,
            n,
            orco_p,
            orco_ng,
            has_orco,
            sp_uv,
            has_uv,
            dp_du,
            dp_dv,
            self.mesh.material_id(),
            self.object_id,
            prim_num,
            time,
            diff,
        )
    }
}

impl QuadPrimitive {
    pub fn new(mesh: Arc<MeshObject>, face_index: u32, object_id: ObjectId) -> Self {
        Self { mesh, face_index, object_id }
    }

    fn face(&self) -> &FaceIndices {
        self.mesh.face(self.face_index as usize)
    }

    pub fn has_motion_blur(&self) -> bool {
        self.mesh.has_motion_blur()
    }

    pub fn material_id(&self) -> MaterialId {
        self.mesh.material_id()
    }

    pub fn object_id(&self) -> ObjectId {
        self.object_id
    }

    pub fn light_id(&self) -> Option<LightId> {
        self.mesh.light_id()
    }

    fn vertices_at_time(&self, time: Float, m: Option<&Matrix4f>) -> [Point3f; 4] {
        let f = self.face();
        [
            transform_point(m, self.mesh.vertex_at_time(f.corners[0].vertex, time)),
            transform_point(m, self.mesh.vertex_at_time(f.corners[1].vertex, time)),
            transform_point(m, self.mesh.vertex_at_time(f.corners[2].vertex, time)),
            transform_point(m, self.mesh.vertex_at_time(f.corners[3].vertex, time)),
        ]
    }

    fn vertices_step(&self, step: usize, m: Option<&Matrix4f>) -> [Point3f; 4] {
        let f = self.face();
        [
            transform_point(m, self.mesh.vertex(f.corners[0].vertex, step)),
            transform_point(m, self.mesh.vertex(f.corners[1].vertex, step)),
            transform_point(m, self.mesh.vertex(f.corners[2].vertex, step)),
            transform_point(m, self.mesh.vertex(f.corners[3].vertex, step)),
        ]
    }

    fn shape_at(&self, time: Float, m: Option<&Matrix4f>) -> ShapeQuad {
        ShapeQuad::new(self.vertices_at_time(time, m))
    }

    pub fn intersect_with(
        &self,
        from: Point3f,
        dir: Vec3f,
        time: Float,
        m: Option<&Matrix4f>,
    ) -> Option<(Float, Uv)> {
        self.shape_at(time, m).intersect(from, dir)
    }

    pub fn bound_with(&self, m: Option<&Matrix4f>) -> Bounds3f {
        let mut b = Bounds3f::empty();
        for step in 0..self.mesh.num_time_steps() {
            for p in &self.vertices_step(step, m) {
                b = b.join_point(*p);
            }
        }
        b
    }

    pub fn geometric_normal_with(&self, time: Float, m: Option<&Matrix4f>) -> Vec3f {
        let n = self.shape_at(time, None).face_normal();
        transform_normal(m, n)
    }

    pub fn area_with(&self, time: Float, m: Option<&Matrix4f>) -> Float {
        self.shape_at(time, m).surface_area()
    }

    pub fn sample_with(&self, uv: Uv, time: Float, m: Option<&Matrix4f>) -> (Point3f, Vec3f) {
        let shape = self.shape_at(time, m);
        (shape.sample(uv), shape.face_normal())
    }

    pub fn vertices_f64(&self) -> Vec<[f64; 3]> {
        self.vertices_step(0, None)
            .iter()
            .map(|p| [p.x as f64, p.y as f64, p.z as f64])
            .collect()
    }

    pub fn surface_with(
        &self,
        hit_point: Point3f,
        uv: Uv,
        time: Float,
        diff: Option<&RayDifferentials>,
        prim_num: usize,
        m: Option<&Matrix4f>,
    ) -> SurfacePoint {
        let f = self.face().clone();
        let ng = self.geometric_normal_with(time, m);

        let n = if self.mesh.is_smooth() || self.mesh.has_vertex_normals() {
            let vn = |c: &crate::geometry::mesh::VertexIndices| {
                if c.normal != NO_INDEX {
                    transform_normal(m, self.mesh.normal_at_time(c.normal, time))
                } else {
                    ng
                }
            };
            let vns = [vn(&f.corners[0]), vn(&f.corners[1]), vn(&f.corners[2]), vn(&f.corners[3])];
            let n = ShapeQuad::interpolate(uv, &vns);
            if n.magnitude2() > 0.0 {
                n.normalize()
            } else {
                ng
            }
        } else {
            ng
        };

        let has_orco = self.mesh.has_orco();
        let (orco_p, orco_ng) = if has_orco {
            let os = [
                self.mesh.orco(f.corners[0].vertex).to_vec(),
                self.mesh.orco(f.corners[1].vertex).to_vec(),
                self.mesh.orco(f.corners[2].vertex).to_vec(),
                self.mesh.orco(f.corners[3].vertex).to_vec(),
            ];
            let p = Point3f::from_vec(ShapeQuad::interpolate(uv, &os));
            let n = (os[1] - os[0]).cross(os[2] - os[0]).normalize();
            (p, n)
        } else {
            (hit_point, self.shape_at(time, None).face_normal())
        };

        let p = self.vertices_step(0, m);
        let has_uv = self.mesh.has_uv() && f.corners.iter().all(|c| c.uv != NO_INDEX);
        let mut implicit_uv = true;
        let mut sp_uv = uv;
        let mut dp_du = p[1] - p[0];
        let mut dp_dv = p[2] - p[0];
        if has_uv {
            let uvs = [
                self.mesh.uv(f.corners[0].uv),
                self.mesh.uv(f.corners[1].uv),
                self.mesh.uv(f.corners[2].uv),
                self.mesh.uv(f.corners[3].uv),
            ];
            sp_uv = ShapeQuad::interpolate(uv, &uvs);
            let d1 = uvs[1] - uvs[0];
            let d2 = uvs[2] - uvs[0];
            let det = d1.u * d2.v - d1.v * d2.u;
            if det.abs() > 1e-30 {
                let inv_det = 1.0 / det;
                let dp1 = p[1] - p[0];
                let dp2 = p[2] - p[0];
                dp_du = (dp1 * d2.v - dp2 * d1.v) * inv_det;
                dp_dv = (dp2 * d1.u - dp1 * d2.u) * inv_det;
                implicit_uv = false;
            }
        }
        if implicit_uv && !has_uv {
            sp_uv = uv;
        }

        finish_surface_point(
            hit_point,
            ng,
            n,
            orco_p,
            orco_ng,
            has_orco,
            sp_uv,
            has_uv,
            dp_du,
            dp_dv,
            self.mesh.material_id(),
            self.object_id,
            prim_num,
            time,
            diff,
        )
    }
}

/// Common tail of surface-point construction: normalize the partials, set
/// up the tangent frame and solve the screen-space differentials.
#[allow(clippy::too_many_arguments)]
fn finish_surface_point(
    p: Point3f,
    ng: Vec3f,
    n: Vec3f,
    orco_p: Point3f,
    orco_ng: Vec3f,
    has_orco: bool,
    uv: Uv,
    has_uv: bool,
    dp_du_abs: Vec3f,
    dp_dv_abs: Vec3f,
    material_id: MaterialId,
    object_id: ObjectId,
    prim_num: usize,
    time: Float,
    diff: Option<&RayDifferentials>,
) -> SurfacePoint {
    let dp_du = if dp_du_abs.magnitude2() > 0.0 {
        dp_du_abs.normalize()
    } else {
        dp_du_abs
    };
    let dp_dv = if dp_dv_abs.magnitude2() > 0.0 {
        dp_dv_abs.normalize()
    } else {
        dp_dv_abs
    };
    let (u_axis, v_axis) = coordinate_system(n);
    let ds_du = Vec3f::new(u_axis.dot(dp_du), v_axis.dot(dp_du), n.dot(dp_du));
    let ds_dv = Vec3f::new(u_axis.dot(dp_dv), v_axis.dot(dp_dv), n.dot(dp_dv));

    let mut sp = SurfacePoint {
        p,
        ng,
        n,
        orco_p,
        orco_ng,
        has_orco,
        uv,
        has_uv,
        dp_du,
        dp_dv,
        dp_du_abs,
        dp_dv_abs,
        u_axis,
        v_axis,
        ds_du,
        ds_dv,
        differentials: None,
        material_id,
        object_id,
        prim_num,
        time,
        mat_data: None,
    };
    sp.differentials = sp.calc_surface_differentials(diff);
    sp
}
