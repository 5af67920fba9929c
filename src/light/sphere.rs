use crate::color::Rgb;
use crate::geometry::ray::Ray;
use crate::light::{EmitSample, IllumSample, Light, LightBase, LightFlags, LightIntersect, PhotonEmit};
use crate::sampling::{cos_hemisphere, uniform_cone, uniform_sphere};
use crate::{coordinate_system, Float, Point3f, Vec3f, PI};
use cgmath::InnerSpace;

/// Spherical area light. Shading points sample the cone of directions
/// subtending the sphere; points inside the sphere receive nothing (the
/// surface emits outward only).
pub struct SphereLight {
    base: LightBase,
    center: Point3f,
    radius: Float,
    radius_sqr: Float,
    area: Float,
    inv_area: Float,
    color: Rgb,
}

impl SphereLight {
    pub fn new(center: Point3f, radius: Float, color: Rgb, power: Float, samples: usize) -> Self {
        let area = 4.0 * PI * radius * radius;
        let mut base = LightBase::with_flags(LightFlags::NONE);
        base.num_samples = samples.max(1);
        Self {
            base,
            center,
            radius,
            radius_sqr: radius * radius,
            area,
            inv_area: 1.0 / area,
            color: color * power,
        }
    }

    fn sphere_intersect(&self, from: Point3f, dir: Vec3f) -> Option<(Float, Float)> {
        let vf = from - self.center;
        let ea = dir.magnitude2();
        let eb = 2.0 * vf.dot(dir);
        let ec = vf.magnitude2() - self.radius_sqr;
        let osc = eb * eb - 4.0 * ea * ec;
        if osc < 0.0 {
            return None;
        }
        let osc = osc.sqrt();
        Some(((-eb - osc) / (2.0 * ea), (-eb + osc) / (2.0 * ea)))
    }

    fn cos_alpha_from(&self, surface_p: Point3f) -> Option<Float> {
        let dist_sqr = (self.center - surface_p).magnitude2();
        if dist_sqr <= self.radius_sqr {
            return None;
        }
        Some((1.0 - self.radius_sqr / dist_sqr).sqrt())
    }
}

impl Light for SphereLight {
    fn base(&self) -> &LightBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut LightBase {
        &mut self.base
    }

    fn total_energy(&self) -> Rgb {
        self.color * self.area
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
        let cos_alpha = self.cos_alpha_from(surface_p)?;
        let cdir = (self.center - surface_p).normalize();
        let (du, dv) = coordinate_system(cdir);
        let dir = uniform_cone(cdir, du, dv, cos_alpha, s_1, s_2);
        let (t0, _t1) = self.sphere_intersect(surface_p, dir)?;
        if t0 <= 0.0 {
            return None;
        }
        let light_p = surface_p + dir * t0;
        let light_ng = (light_p - self.center).normalize();
        let ray = Ray::with_range(surface_p, dir, time, 0.0, t0);
        Some(IllumSample {
            ray,
            col: self.color,
            pdf: 1.0 / (2.0 * PI * (1.0 - cos_alpha)),
            light_p,
            light_ng,
        })
    }

    fn illum_pdf(&self, surface_p: Point3f, _light_p: Point3f, _light_ng: Vec3f) -> Float {
        match self.cos_alpha_from(surface_p) {
            Some(cos_alpha) => 1.0 / (2.0 * PI * (1.0 - cos_alpha)),
            None => 0.0,
        }
    }

    fn intersect(&self, ray: &Ray) -> Option<LightIntersect> {
        let (t0, _) = self.sphere_intersect(ray.from, ray.dir)?;
        if t0 <= 0.0 {
            return None;
        }
        let cos_alpha = self.cos_alpha_from(ray.from)?;
        Some(LightIntersect {
            t: t0,
            inv_pdf: 2.0 * PI * (1.0 - cos_alpha),
            col: self.color,
        })
    }

    fn emit_photon(
        &self,
        s_1: Float,
        s_2: Float,
        s_3: Float,
        s_4: Float,
        time: Float,
    ) -> Option<PhotonEmit> {
        let sdir = uniform_sphere(s_3, s_4);
        let from = self.center + sdir * self.radius;
        let (du, dv) = coordinate_system(sdir);
        let dir = cos_hemisphere(sdir, du, dv, s_1, s_2);
        Some(PhotonEmit {
            ray: Ray::new(from, dir, time),
            inv_pdf: self.area,
            col: self.color,
        })
    }

    fn emit_sample(
        &self,
        s_1: Float,
        s_2: Float,
        s_3: Float,
        s_4: Float,
        _time: Float,
    ) -> Option<EmitSample> {
        let sdir = uniform_sphere(s_3, s_4);
        let point = self.center + sdir * self.radius;
        let (du, dv) = coordinate_system(sdir);
        let dir = cos_hemisphere(sdir, du, dv, s_1, s_2);
        Some(EmitSample {
            point,
            normal: sdir,
            dir,
            col: self.color,
            area_pdf: self.inv_area * PI,
            dir_pdf: sdir.dot(dir).abs(),
        })
    }
}
