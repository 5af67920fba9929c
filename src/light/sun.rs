use crate::color::Rgb;
use crate::geometry::ray::Ray;
use crate::light::{IllumSample, Light, LightBase, LightFlags, LightIntersect, PhotonEmit};
use crate::sampling::{min_rot, shirley_disk, uniform_cone};
use crate::scene::Scene;
use crate::{coordinate_system, radians, Float, Point3f, Vec3f, PI, TWO_PI};
use anyhow::Result;
use cgmath::{EuclideanSpace, InnerSpace};

/// Distant sun disk: a directional light with a small angular radius, so
/// shadows have soft terminators. With angle = 0 it degenerates to a true
/// directional; the PDF is then clamped to sqrt(f32::MAX) because the
/// integrators square it.
pub struct SunLight {
    base: LightBase,
    direction: Vec3f,
    du: Vec3f,
    dv: Vec3f,
    cos_angle: Float,
    pdf: Float,
    inv_pdf: Float,
    col_pdf: Rgb,
    color: Rgb,
    world_center: Point3f,
    world_radius: Float,
    e_pdf: Float,
}

impl SunLight {
    /// `direction` points from the scene toward the sun. `angle_deg` is
    /// the angular radius of the disk, capped at 80 degrees.
    pub fn new(direction: Vec3f, color: Rgb, power: Float, angle_deg: Float, samples: usize) -> Self {
        let direction = direction.normalize();
        let (du, dv) = coordinate_system(direction);
        let angle = angle_deg.min(80.0);
        let cos_angle = radians(angle).cos();
        let inv_pdf = TWO_PI * (1.0 - cos_angle);
        let pdf = if inv_pdf > 0.0 {
            (1.0 / inv_pdf).min(Float::MAX.sqrt())
        } else {
            Float::MAX.sqrt()
        };
        let color = color * power;
        let mut base = LightBase::with_flags(LightFlags::NONE);
        base.num_samples = samples.max(1);
        Self {
            base,
            direction,
            du,
            dv,
            cos_angle,
            pdf,
            inv_pdf,
            col_pdf: color * pdf,
            color,
            world_center: Point3f::origin(),
            world_radius: 1.0,
            e_pdf: PI,
        }
    }
}

impl Light for SunLight {
    fn base(&self) -> &LightBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut LightBase {
        &mut self.base
    }

    fn init(&mut self, scene: &Scene) -> Result<()> {
        let (center, radius) = scene.bound().bounding_sphere();
        self.world_center = center;
        self.world_radius = radius.max(1e-3);
        self.e_pdf = PI * self.world_radius * self.world_radius;
        Ok(())
    }

    fn total_energy(&self) -> Rgb {
        self.color * self.inv_pdf.max(1e-6)
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
        let dir = uniform_cone(self.direction, self.du, self.dv, self.cos_angle, s_1, s_2);
        let ray = Ray::new(surface_p, dir, time);
        Some(IllumSample {
            ray,
            col: self.col_pdf,
            pdf: self.pdf,
            light_p: surface_p + dir * (2.0 * self.world_radius),
            light_ng: -dir,
        })
    }

    fn intersect(&self, ray: &Ray) -> Option<LightIntersect> {
        let cosine = ray.dir.dot(self.direction);
        if cosine < self.cos_angle {
            return None;
        }
        Some(LightIntersect {
            t: -1.0,
            inv_pdf: self.inv_pdf,
            col: self.col_pdf,
        })
    }

    fn emit_photon(
        &self,
        _s_1: Float,
        _s_2: Float,
        s_3: Float,
        s_4: Float,
        time: Float,
    ) -> Option<PhotonEmit> {
        let ldir = uniform_cone(self.direction, self.du, self.dv, self.cos_angle, s_3, s_4);
        let (du_2, dv_2) = min_rot(self.direction, self.du, ldir);
        let uv = shirley_disk(s_3, s_4);
        let from = self.world_center
            + (du_2 * uv.x + dv_2 * uv.y + ldir) * self.world_radius;
        Some(PhotonEmit {
            ray: Ray::new(from, -ldir, time),
            inv_pdf: self.inv_pdf,
            col: self.col_pdf * self.e_pdf,
        })
    }
}
