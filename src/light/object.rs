use crate::color::Rgb;
use crate::geometry::ray::Ray;
use crate::light::{EmitSample, IllumSample, Light, LightBase, LightFlags, PhotonEmit};
use crate::primitive::{Primitive, QuadPrimitive, TrianglePrimitive};
use crate::sampling::{cos_hemisphere, Pdf1D};
use crate::scene::{ObjectId, Scene};
use crate::{coordinate_system, Float, Point3f, Uv, Vec3f, PI};
use anyhow::{bail, Result};
use cgmath::InnerSpace;
use std::sync::Arc;

/// Mesh emitter: distributes samples over an object's faces in
/// proportion to area, optionally emitting from both sides.
pub struct ObjectLight {
    base: LightBase,
    object_id: ObjectId,
    color: Rgb,
    double_sided: bool,
    prims: Vec<Primitive>,
    area_dist: Option<Pdf1D>,
    total_area: Float,
}

impl ObjectLight {
    pub fn new(object_id: ObjectId, color: Rgb, power: Float, samples: usize, double_sided: bool) -> Self {
        let mut base = LightBase::with_flags(LightFlags::NONE);
        base.num_samples = samples.max(1);
        Self {
            base,
            object_id,
            color: color * power,
            double_sided,
            prims: Vec::new(),
            area_dist: None,
            total_area: 0.0,
        }
    }

    /// Picks a face by area, then a point on it.
    fn sample_surface(&self, s_1: Float, s_2: Float, time: Float) -> Option<(Point3f, Vec3f)> {
        let dist = self.area_dist.as_ref()?;
        let mut pdf = 0.0;
        let face = dist.sample_discrete(s_1, &mut pdf);
        // reuse the stratified remainder of s_1 within the chosen cell
        let cell_width = dist.discrete_pdf(face).max(1e-12);
        let s_reused = ((s_1 - face_cdf_start(dist, face)) / cell_width).min(1.0).max(0.0);
        let (p, n) = self.prims[face].sample_point(Uv::new(s_reused, s_2), time);
        Some((p, n))
    }
}

fn face_cdf_start(dist: &Pdf1D, face: usize) -> Float {
    dist.cdf[face]
}

impl Light for ObjectLight {
    fn base(&self) -> &LightBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut LightBase {
        &mut self.base
    }

    fn init(&mut self, scene: &Scene) -> Result<()> {
        let mesh = match scene.object_mesh(self.object_id) {
            Some(m) => m,
            None => bail!("object light references a non-mesh object {:?}", self.object_id),
        };
        self.prims.clear();
        for (fi, face) in mesh.faces().iter().enumerate() {
            let prim = if face.is_quad() {
                Primitive::Quad(QuadPrimitive::new(Arc::clone(mesh), fi as u32, self.object_id))
            } else {
                Primitive::Triangle(TrianglePrimitive::new(
                    Arc::clone(mesh),
                    fi as u32,
                    self.object_id,
                ))
            };
            self.prims.push(prim);
        }
        let areas: Vec<Float> = self.prims.iter().map(|p| p.surface_area(0.0)).collect();
        self.total_area = areas.iter().sum();
        if self.total_area <= 0.0 {
            bail!("object light surface has zero area");
        }
        self.area_dist = Some(Pdf1D::new(&areas));
        Ok(())
    }

    fn total_energy(&self) -> Rgb {
        let sides = if self.double_sided { 2.0 } else { 1.0 };
        self.color * (self.total_area * sides)
    }

    fn illum_sample(
        &self,
        surface_p: Point3f,
        s_1: Float,
        s_2: Float,
        time: Float,
    ) -> Option<IllumSample> {
        if self.photon_only() {
            return None;
        }
        let (p, mut n) = self.sample_surface(s_1, s_2, time)?;
        let mut ldir = p - surface_p;
        let dist_sqr = ldir.magnitude2();
        let dist = dist_sqr.sqrt();
        if dist <= 0.0 {
            return None;
        }
        ldir /= dist;
        let mut cos_angle = ldir.dot(-n);
        if cos_angle <= 0.0 {
            if !self.double_sided {
                return None;
            }
            n = -n;
            cos_angle = -cos_angle;
        }
        let ray = Ray::with_range(surface_p, ldir, time, 0.0, dist);
        Some(IllumSample {
            ray,
            col: self.color,
            pdf: dist_sqr * PI / (self.total_area * cos_angle),
            light_p: p,
            light_ng: n,
        })
    }

    fn illum_pdf(&self, surface_p: Point3f, light_p: Point3f, light_ng: Vec3f) -> Float {
        let wi = light_p - surface_p;
        let r2 = wi.magnitude2();
        if r2 <= 0.0 {
            return 0.0;
        }
        let wi = wi / r2.sqrt();
        let mut cos_n = wi.dot(-light_ng);
        if cos_n <= 0.0 {
            if !self.double_sided {
                return 0.0;
            }
            cos_n = -cos_n;
        }
        r2 * PI / (self.total_area * cos_n)
    }

    fn emit_photon(
        &self,
        s_1: Float,
        s_2: Float,
        s_3: Float,
        s_4: Float,
        time: Float,
    ) -> Option<PhotonEmit> {
        let (from, mut n) = self.sample_surface(s_3, s_4, time)?;
        if self.double_sided && s_2 > 0.5 {
            n = -n;
        }
        let (du, dv) = coordinate_system(n);
        let dir = cos_hemisphere(n, du, dv, s_1, (s_2 * 2.0).fract());
        let sides = if self.double_sided { 2.0 } else { 1.0 };
        Some(PhotonEmit {
            ray: Ray::new(from, dir, time),
            inv_pdf: self.total_area * sides,
            col: self.color,
        })
    }

    fn emit_sample(
        &self,
        s_1: Float,
        s_2: Float,
        s_3: Float,
        s_4: Float,
        time: Float,
    ) -> Option<EmitSample> {
        let (point, normal) = self.sample_surface(s_3, s_4, time)?;
        let (du, dv) = coordinate_system(normal);
        let dir = cos_hemisphere(normal, du, dv, s_1, s_2);
        Some(EmitSample {
            point,
            normal,
            dir,
            col: self.color,
            area_pdf: PI / self.total_area,
            dir_pdf: normal.dot(dir).abs(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::{MaterialId, ParamMap};
    use approx::assert_relative_eq;

    fn scene_with_emitter() -> (Scene, ObjectId) {
        let mut scene = Scene::new();
        let mut params = ParamMap::new();
        params.set_string("type", "mesh");
        let (_, id) = scene.create_object("panel", &params);
        let id = id.unwrap();
        // two unit triangles at y=3 facing down
        let a = scene.add_vertex(id, Point3f::new(0.0, 3.0, 0.0)).unwrap();
        let b = scene.add_vertex(id, Point3f::new(0.0, 3.0, 1.0)).unwrap();
        let c = scene.add_vertex(id, Point3f::new(1.0, 3.0, 0.0)).unwrap();
        let d = scene.add_vertex(id, Point3f::new(1.0, 3.0, 1.0)).unwrap();
        scene.add_triangle(id, [a, c, b]).unwrap();
        scene.add_triangle(id, [c, d, b]).unwrap();
        scene.init_object(id, MaterialId(0)).unwrap();
        scene.preprocess(1).unwrap();
        (scene, id)
    }

    #[test]
    fn test_area_distribution_and_sampling() {
        let (scene, id) = scene_with_emitter();
        let mut light = ObjectLight::new(id, Rgb::WHITE, 1.0, 4, false);
        light.init(&scene).unwrap();
        assert_relative_eq!(light.total_area, 1.0, epsilon = 1e-5);

        let below = Point3f::new(0.5, 0.0, 0.5);
        let s = light.illum_sample(below, 0.3, 0.6, 0.0).unwrap();
        // sampled point must lie on the panel
        assert_relative_eq!(s.light_p.y, 3.0, epsilon = 1e-5);
        assert!(s.pdf > 0.0);
        // pdf agrees with the reverse query
        let pdf = light.illum_pdf(below, s.light_p, s.light_ng);
        assert_relative_eq!(s.pdf, pdf, max_relative = 1e-3);
    }

    #[test]
    fn test_single_sided_rejects_backside() {
        let (scene, id) = scene_with_emitter();
        let mut light = ObjectLight::new(id, Rgb::WHITE, 1.0, 1, false);
        light.init(&scene).unwrap();
        // point above the downward-facing panel
        assert!(light
            .illum_sample(Point3f::new(0.5, 5.0, 0.5), 0.4, 0.4, 0.0)
            .is_none());

        let mut both = ObjectLight::new(id, Rgb::WHITE, 1.0, 1, true);
        both.init(&scene).unwrap();
        assert!(both
            .illum_sample(Point3f::new(0.5, 5.0, 0.5), 0.4, 0.4, 0.0)
            .is_some());
    }
}
