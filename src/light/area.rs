use crate::color::Rgb;
use crate::geometry::ray::Ray;
use crate::light::{EmitSample, IllumSample, Light, LightBase, LightFlags, LightIntersect, PhotonEmit};
use crate::sampling::cos_hemisphere;
use crate::shape::ShapeQuad;
use crate::{Float, Point3f, Uv, Vec3f, INV_PI, PI};
use cgmath::InnerSpace;

/// Single-sided rectangular area light spanned by `corner`, `point_1` and
/// `point_2`.
pub struct AreaLight {
    base: LightBase,
    corner: Point3f,
    to_x: Vec3f,
    to_y: Vec3f,
    normal: Vec3f,
    quad: ShapeQuad,
    area: Float,
    inv_area: Float,
    color: Rgb,
}

impl AreaLight {
    pub fn new(corner: Point3f, point_1: Point3f, point_2: Point3f, color: Rgb, power: Float, samples: usize) -> Self {
        let to_x = point_1 - corner;
        let to_y = point_2 - corner;
        let quad = ShapeQuad::new([corner, point_1, point_1 + to_y, point_2]);
        let normal = to_x.cross(to_y).normalize();
        let area = to_x.cross(to_y).magnitude();
        let mut base = LightBase::with_flags(LightFlags::NONE);
        base.num_samples = samples.max(1);
        Self {
            base,
            corner,
            to_x,
            to_y,
            normal,
            quad,
            area,
            inv_area: 1.0 / area,
            color: color * power,
        }
    }

    fn frame(&self) -> (Vec3f, Vec3f) {
        (self.to_x.normalize(), self.normal.cross(self.to_x).normalize())
    }
}

impl Light for AreaLight {
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
        let p = self.corner + self.to_x * s_1 + self.to_y * s_2;
        let mut ldir = p - surface_p;
        let dist_sqr = ldir.magnitude2();
        let dist = dist_sqr.sqrt();
        if dist <= 0.0 {
            return None;
        }
        ldir /= dist;
        let cos_angle = ldir.dot(-self.normal);
        // single sided: nothing arrives from behind the emitter
        if cos_angle <= 0.0 {
            return None;
        }
        let ray = Ray::with_range(surface_p, ldir, time, 0.0, dist);
        Some(IllumSample {
            ray,
            col: self.color,
            pdf: dist_sqr * PI / (self.area * cos_angle),
            light_p: p,
            light_ng: self.normal,
        })
    }

    fn illum_pdf(&self, surface_p: Point3f, light_p: Point3f, _light_ng: Vec3f) -> Float {
        let wi = light_p - surface_p;
        let r2 = wi.magnitude2();
        if r2 <= 0.0 {
            return 0.0;
        }
        let wi = wi / r2.sqrt();
        let cos_n = wi.dot(-self.normal);
        if cos_n > 0.0 {
            r2 * PI / (self.area * cos_n)
        } else {
            0.0
        }
    }

    fn intersect(&self, ray: &Ray) -> Option<LightIntersect> {
        let cos_angle = ray.dir.dot(-self.normal);
        if cos_angle <= 0.0 {
            return None;
        }
        let (t, _uv) = self.quad.intersect(ray.from, ray.dir)?;
        let inv_pdf = self.area * cos_angle * INV_PI / (t * t);
        Some(LightIntersect {
            t,
            inv_pdf,
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
        let from = self.corner + self.to_x * s_3 + self.to_y * s_4;
        let (du, dv) = self.frame();
        let dir = cos_hemisphere(self.normal, du, dv, s_1, s_2);
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
        let point = self.corner + self.to_x * s_3 + self.to_y * s_4;
        let (du, dv) = self.frame();
        let dir = cos_hemisphere(self.normal, du, dv, s_1, s_2);
        Some(EmitSample {
            point,
            normal: self.normal,
            dir,
            col: self.color,
            area_pdf: self.inv_area * PI,
            dir_pdf: self.normal.dot(dir).abs(),
        })
    }
}
