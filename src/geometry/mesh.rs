use crate::scene::{LightId, MaterialId};
use crate::{bezier_factors, radians, time_mapped, Float, Point3f, Uv, Vec3f};
use anyhow::{bail, Result};
use arrayvec::ArrayVec;
use cgmath::{EuclideanSpace, InnerSpace, Zero};

pub const NO_INDEX: u32 = u32::MAX;

/// Per-corner attribute indices; `NO_INDEX` means the attribute is absent.
#[derive(Debug, Clone, Copy)]
pub struct VertexIndices {
    pub vertex: u32,
    pub normal: u32,
    pub uv: u32,
}

impl VertexIndices {
    pub fn new(vertex: u32) -> Self {
        Self {
            vertex,
            normal: NO_INDEX,
            uv: NO_INDEX,
        }
    }

    pub fn with_uv(vertex: u32, uv: u32) -> Self {
        Self {
            vertex,
            normal: NO_INDEX,
            uv,
        }
    }
}

/// A triangle or quad face of a mesh.
#[derive(Debug, Clone)]
pub struct FaceIndices {
    pub corners: ArrayVec<[VertexIndices; 4]>,
}

impl FaceIndices {
    pub fn num_corners(&self) -> usize {
        self.corners.len()
    }

    pub fn is_quad(&self) -> bool {
        self.corners.len() == 4
    }
}

/// Vertex positions and normals for one moment of the shutter interval.
/// Static meshes have a single step; Bezier motion blur carries three.
#[derive(Debug, Default, Clone)]
pub struct MeshTimeStep {
    pub vertices: Vec<Point3f>,
    pub normals: Vec<Vec3f>,
}

/// An indexed triangle/quad mesh with optional per-vertex normals, UVs and
/// reference-space (orco) positions.
#[derive(Debug)]
pub struct MeshObject {
    pub name: String,
    time_steps: Vec<MeshTimeStep>,
    time_start: Float,
    time_end: Float,
    orco: Vec<Point3f>,
    uvs: Vec<Uv>,
    faces: Vec<FaceIndices>,
    material_id: MaterialId,
    light_id: Option<LightId>,
    smooth: bool,
}

impl MeshObject {
    pub fn new(name: impl Into<String>, num_time_steps: usize) -> Self {
        let steps = num_time_steps.max(1);
        Self {
            name: name.into(),
            time_steps: vec![MeshTimeStep::default(); steps],
            time_start: 0.0,
            time_end: 1.0,
            orco: Vec::new(),
            uvs: Vec::new(),
            faces: Vec::new(),
            material_id: MaterialId(0),
            light_id: None,
            smooth: false,
        }
    }

    pub fn set_time_range(&mut self, start: Float, end: Float) {
        self.time_start = start;
        self.time_end = end;
    }

    pub fn add_vertex(&mut self, p: Point3f) -> u32 {
        self.time_steps[0].vertices.push(p);
        (self.time_steps[0].vertices.len() - 1) as u32
    }

    pub fn add_vertex_with_orco(&mut self, p: Point3f, orco: Point3f) -> u32 {
        let idx = self.add_vertex(p);
        self.orco.push(orco);
        idx
    }

    /// Appends a vertex position for a later time step; call once per step
    /// beyond the first, in the same order as `add_vertex`.
    pub fn add_vertex_time_step(&mut self, p: Point3f, step: usize) -> Result<()> {
        if step == 0 || step >= self.time_steps.len() {
            bail!(
                "mesh '{}': vertex time step {} out of range (have {})",
                self.name,
                step,
                self.time_steps.len()
            );
        }
        self.time_steps[step].vertices.push(p);
        Ok(())
    }

    pub fn add_normal(&mut self, n: Vec3f) -> u32 {
        self.time_steps[0].normals.push(n);
        (self.time_steps[0].normals.len() - 1) as u32
    }

    pub fn add_normal_time_step(&mut self, n: Vec3f, step: usize) -> Result<()> {
        if step == 0 || step >= self.time_steps.len() {
            bail!("mesh '{}': normal time step {} out of range", self.name, step);
        }
        self.time_steps[step].normals.push(n);
        Ok(())
    }

    pub fn add_uv(&mut self, uv: Uv) -> u32 {
        self.uvs.push(uv);
        (self.uvs.len() - 1) as u32
    }

    pub fn add_triangle(&mut self, v: [u32; 3]) {
        let mut corners = ArrayVec::new();
        for &i in &v {
            corners.push(self.corner(i));
        }
        self.faces.push(FaceIndices { corners });
    }

    pub fn add_triangle_uv(&mut self, v: [u32; 3], uv: [u32; 3]) {
        let mut corners = ArrayVec::new();
        for i in 0..3 {
            let mut c = self.corner(v[i]);
            c.uv = uv[i];
            corners.push(c);
        }
        self.faces.push(FaceIndices { corners });
    }

    pub fn add_quad(&mut self, v: [u32; 4]) {
        let mut corners = ArrayVec::new();
        for &i in &v {
            corners.push(self.corner(i));
        }
        self.faces.push(FaceIndices { corners });
    }

    pub fn add_quad_uv(&mut self, v: [u32; 4], uv: [u32; 4]) {
        let mut corners = ArrayVec::new();
        for i in 0..4 {
            let mut c = self.corner(v[i]);
            c.uv = uv[i];
            corners.push(c);
        }
        self.faces.push(FaceIndices { corners });
    }

    fn corner(&self, vertex: u32) -> VertexIndices {
        // meshes loaded with explicit per-vertex normals reference them 1:1
        let normal = if (vertex as usize) < self.time_steps[0].normals.len() {
            vertex
        } else {
            NO_INDEX
        };
        VertexIndices {
            vertex,
            normal,
            uv: NO_INDEX,
        }
    }

    pub fn set_material(&mut self, id: MaterialId) {
        self.material_id = id;
    }

    pub fn material_id(&self) -> MaterialId {
        self.material_id
    }

    pub fn set_light(&mut self, id: LightId) {
        self.light_id = Some(id);
    }

    pub fn light_id(&self) -> Option<LightId> {
        self.light_id
    }

    /// Checks the mesh is complete: motion-blur meshes must carry exactly
    /// three fully-populated time steps, and attribute arrays must line up.
    pub fn finalize(&self) -> Result<()> {
        let n = self.time_steps[0].vertices.len();
        if self.time_steps.len() != 1 && self.time_steps.len() != 3 {
            bail!(
                "mesh '{}': {} time steps; meshes are either static (1) or Bezier-animated (3)",
                self.name,
                self.time_steps.len()
            );
        }
        for (i, step) in self.time_steps.iter().enumerate().skip(1) {
            if step.vertices.len() != n {
                bail!(
                    "mesh '{}': time step {} has {} vertices, expected {}",
                    self.name,
                    i,
                    step.vertices.len(),
                    n
                );
            }
        }
        if !self.orco.is_empty() && self.orco.len() != n {
            bail!("mesh '{}': orco count {} != vertex count {}", self.name, self.orco.len(), n);
        }
        Ok(())
    }

    pub fn num_faces(&self) -> usize {
        self.faces.len()
    }

    pub fn num_vertices(&self) -> usize {
        self.time_steps[0].vertices.len()
    }

    pub fn face(&self, i: usize) -> &FaceIndices {
        &self.faces[i]
    }

    pub fn faces(&self) -> &[FaceIndices] {
        &self.faces
    }

    pub fn has_motion_blur(&self) -> bool {
        self.time_steps.len() > 1
    }

    pub fn time_range(&self) -> (Float, Float) {
        (self.time_start, self.time_end)
    }

    pub fn num_time_steps(&self) -> usize {
        self.time_steps.len()
    }

    pub fn vertex(&self, idx: u32, step: usize) -> Point3f {
        self.time_steps[step].vertices[idx as usize]
    }

    /// Vertex position at shutter `time`, Bezier-blending the three control
    /// positions for animated meshes.
    pub fn vertex_at_time(&self, idx: u32, time: Float) -> Point3f {
        if !self.has_motion_blur() {
            return self.vertex(idx, 0);
        }
        let t = time_mapped(time, self.time_start, self.time_end);
        let [b0, b1, b2] = bezier_factors(t);
        let p0 = self.vertex(idx, 0).to_vec();
        let p1 = self.vertex(idx, 1).to_vec();
        let p2 = self.vertex(idx, 2).to_vec();
        Point3f::from_vec(p0 * b0 + p1 * b1 + p2 * b2)
    }

    pub fn has_vertex_normals(&self) -> bool {
        !self.time_steps[0].normals.is_empty()
    }

    pub fn normal(&self, idx: u32, step: usize) -> Vec3f {
        self.time_steps[step].normals[idx as usize]
    }

    pub fn normal_at_time(&self, idx: u32, time: Float) -> Vec3f {
        if !self.has_motion_blur() || self.time_steps[1].normals.is_empty() {
            return self.normal(idx, 0);
        }
        let t = time_mapped(time, self.time_start, self.time_end);
        let [b0, b1, b2] = bezier_factors(t);
        (self.normal(idx, 0) * b0 + self.normal(idx, 1) * b1 + self.normal(idx, 2) * b2)
            .normalize()
    }

    pub fn has_orco(&self) -> bool {
        !self.orco.is_empty()
    }

    pub fn orco(&self, idx: u32) -> Point3f {
        self.orco[idx as usize]
    }

    pub fn has_uv(&self) -> bool {
        !self.uvs.is_empty()
    }

    pub fn uv(&self, idx: u32) -> Uv {
        self.uvs[idx as usize]
    }

    pub fn is_smooth(&self) -> bool {
        self.smooth
    }

    /// Generates per-corner shading normals. Corners whose incident faces
    /// all deviate less than `angle_deg` share an averaged normal; sharper
    /// corners keep the face normal so creases stay hard.
    pub fn smooth(&mut self, angle_deg: Float) {
        if self.faces.is_empty() {
            return;
        }
        let cos_threshold = radians(angle_deg.min(180.0)).cos();
        let num_steps = self.time_steps.len();
        let num_vertices = self.num_vertices();

        // face normals per step, area-weighted connectivity on step 0
        let mut face_normals: Vec<Vec<Vec3f>> = Vec::with_capacity(num_steps);
        for s in 0..num_steps {
            let normals = self
                .faces
                .iter()
                .map(|f| {
                    let p0 = self.vertex(f.corners[0].vertex, s);
                    let p1 = self.vertex(f.corners[1].vertex, s);
                    let p2 = self.vertex(f.corners[2].vertex, s);
                    let n = (p1 - p0).cross(p2 - p0);
                    if n.magnitude2() > 0.0 {
                        n.normalize()
                    } else {
                        Vec3f::zero()
                    }
                })
                .collect();
            face_normals.push(normals);
        }

        let mut incident: Vec<Vec<usize>> = vec![Vec::new(); num_vertices];
        for (fi, f) in self.faces.iter().enumerate() {
            for c in &f.corners {
                incident[c.vertex as usize].push(fi);
            }
        }

        for step in &mut self.time_steps {
            step.normals.clear();
        }

        let faces = std::mem::replace(&mut self.faces, Vec::new());
        let mut new_faces = Vec::with_capacity(faces.len());
        for (fi, mut face) in faces.into_iter().enumerate() {
            for c in &mut face.corners {
                let v = c.vertex as usize;
                let own = face_normals[0][fi];
                let idx = self.time_steps[0].normals.len() as u32;
                for s in 0..num_steps {
                    let mut sum = Vec3f::zero();
                    for &g in &incident[v] {
                        if face_normals[0][g].dot(own) >= cos_threshold {
                            sum += face_normals[s][g];
                        }
                    }
                    let n = if sum.magnitude2() > 0.0 {
                        sum.normalize()
                    } else {
                        face_normals[s][fi]
                    };
                    self.time_steps[s].normals.push(n);
                }
                c.normal = idx;
            }
            new_faces.push(face);
        }
        self.faces = new_faces;
        self.smooth = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn two_triangle_roof() -> MeshObject {
        // two faces meeting at a ridge along the y axis, 90 degrees apart
        let mut mesh = MeshObject::new("roof", 1);
        let a = mesh.add_vertex(Point3f::new(-1.0, 0.0, 0.0));
        let b = mesh.add_vertex(Point3f::new(0.0, 0.0, 1.0));
        let c = mesh.add_vertex(Point3f::new(0.0, 1.0, 1.0));
        let d = mesh.add_vertex(Point3f::new(1.0, 0.0, 0.0));
        mesh.add_triangle([a, b, c]);
        mesh.add_triangle([b, d, c]);
        mesh
    }

    #[test]
    fn test_smooth_wide_angle_averages() {
        let mut mesh = two_triangle_roof();
        mesh.smooth(180.0);
        assert!(mesh.is_smooth());
        assert!(mesh.has_vertex_normals());
        // ridge vertex b: averaged normal of the two faces, pointing up-ish
        let face = mesh.face(0).clone();
        let n = mesh.normal(face.corners[1].normal, 0);
        assert!(n.z > 0.0);
        assert_relative_eq!(n.x, 0.0, epsilon = 1e-4);
    }

    #[test]
    fn test_smooth_sharp_angle_keeps_crease() {
        let mut mesh = two_triangle_roof();
        mesh.smooth(10.0);
        // the two faces are ~90 degrees apart, so the ridge corners keep
        // their own face normals
        let f0 = mesh.face(0).clone();
        let f1 = mesh.face(1).clone();
        let n0 = mesh.normal(f0.corners[1].normal, 0);
        let n1 = mesh.normal(f1.corners[0].normal, 0);
        assert!(n0.dot(n1) < 0.99);
    }

    #[test]
    fn test_finalize_rejects_bad_time_steps() {
        let mut mesh = MeshObject::new("bad", 2);
        mesh.add_vertex(Point3f::new(0.0, 0.0, 0.0));
        assert!(mesh.finalize().is_err());
    }

    #[test]
    fn test_bezier_vertex_evaluation() {
        let mut mesh = MeshObject::new("anim", 3);
        let v = mesh.add_vertex(Point3f::new(0.0, 0.0, 0.0));
        mesh.add_vertex_time_step(Point3f::new(0.0, 0.0, 0.0), 1).unwrap();
        mesh.add_vertex_time_step(Point3f::new(1.0, 0.0, 0.0), 2).unwrap();
        // quadratic Bernstein: x(t) = t^2 for control points 0, 0, 1
        for &(t, expected) in &[(0.0, 0.0), (0.25, 0.0625), (0.5, 0.25), (0.75, 0.5625), (1.0, 1.0)] {
            let p = mesh.vertex_at_time(v, t);
            assert_relative_eq!(p.x, expected, epsilon = 1e-6);
        }
    }
}
