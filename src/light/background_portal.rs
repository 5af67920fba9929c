use crate::color::Rgb;
use crate::geometry::ray::Ray;
use crate::light::{IllumSample, Light, LightBase, LightFlags, PhotonEmit};
use crate::primitive::{Primitive, QuadPrimitive, TrianglePrimitive};
use crate::sampling::{cos_hemisphere, Pdf1D};
use crate::scene::{Background, ObjectId, Scene};
use crate::{coordinate_system, Float, Point3f, Uv, Vec3f, PI};
use anyhow::{bail, Result};
use cgmath::InnerSpace;
use std::sync::Arc;

/// Treats a mesh as a window onto the distant environment: illumination
/// samples pick a point on the portal by area and carry the background
/// radiance from that direction.
pub struct BackgroundPortalLight {
    base: LightBase,
    object_id: ObjectId,
    power: Float,
    prims: Vec<Primitive>,
    area_dist: Option<Pdf1D>,
    total_area: Float,
    background: Option<Arc<dyn Background>>,
}

impl BackgroundPortalLight {
    pub fn new(object_id: ObjectId, power: Float, samples: usize) -> Self {
        let mut base = LightBase::with_flags(LightFlags::NONE);
        base.num_samples = samples.max(1);
        base.cast_shadows = false;
        Self {
            base,
            object_id,
            power,
            prims: Vec::new(),
            area_dist: None,
            total_area: 0.0,
            background: None,
        }
    }

    fn sample_surface(&self, s_1: Float, s_2: Float, time: Float) -> Option<(Point3f, Vec3f)> {
        let dist = self.area_dist.as_ref()?;
        let mut pdf = 0.0;
        let face = dist.sample_discrete(s_1, &mut pdf);
        let cell_width = dist.discrete_pdf(face).max(1e-12);
        let s_reused = ((s_1 - dist.cdf[face]) / cell_width).min(1.0).max(0.0);
        Some(self.prims[face].sample_point(Uv::new(s_reused, s_2), time))
    }
}

impl Light for BackgroundPortalLight {
    fn base(&self) -> &LightBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut LightBase {
        &mut self.base
    }

    fn init(&mut self, scene: &Scene) -> Result<()> {
        let background = match scene.background() {
            Some(bg) => Arc::clone(bg),
            None => bail!("portal light requires a scene background"),
        };
        let mesh = match scene.object_mesh(self.object_id) {
            Some(m) => m,
            None => bail!("portal light references a non-mesh object {:?}", self.object_id),
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
            bail!("portal surface has zero area");
        }
        self.area_dist = Some(Pdf1D::new(&areas));
        self.background = Some(background);
        Ok(())
    }

    fn total_energy(&self) -> Rgb {
        let avg = self
            .background
            .as_ref()
            .map(|bg| bg.eval(Vec3f::new(0.0, 0.0, 1.0)))
            .unwrap_or(Rgb::BLACK);
        avg * (self.total_area * self.power)
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
        let background = self.background.as_ref()?;
        let (p, n) = self.sample_surface(s_1, s_2, time)?;
        let mut ldir = p - surface_p;
        let dist_sqr = ldir.magnitude2();
        let dist = dist_sqr.sqrt();
        if dist <= 0.0 {
            return None;
        }
        ldir /= dist;
        let cos_angle = ldir.dot(-n).abs();
        if cos_angle <= 1e-6 {
            return None;
        }
        // the portal passes the environment through unchanged
        let col = background.eval(ldir) * self.power;
        let ray = Ray::with_range(surface_p, ldir, time, 0.0, dist);
        Some(IllumSample {
            ray,
            col,
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
        let cos_n = wi.dot(-light_ng).abs();
        if cos_n > 1e-6 {
            r2 * PI / (self.total_area * cos_n)
        } else {
            0.0
        }
    }

    fn emit_photon(
        &self,
        s_1: Float,
        s_2: Float,
        s_3: Float,
        s_4: Float,
        time: Float,
    ) -> Option<PhotonEmit> {
        let background = self.background.as_ref()?;
        let (from, n) = self.sample_surface(s_3, s_4, time)?;
        let (du, dv) = coordinate_system(n);
        let dir = cos_hemisphere(n, du, dv, s_1, s_2);
        let col = background.eval(-dir) * self.power;
        Some(PhotonEmit {
            ray: Ray::new(from, dir, time),
            inv_pdf: self.total_area,
            col,
        })
    }
}
