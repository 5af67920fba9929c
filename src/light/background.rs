use crate::color::Rgb;
use crate::geometry::ray::Ray;
use crate::light::{IllumSample, Light, LightBase, LightFlags, LightIntersect, PhotonEmit};
use crate::sampling::{shirley_disk, Pdf1D};
use crate::scene::{Background, Scene};
use crate::{
    coordinate_system, inv_sphere_map, sphere_map, Float, Point3f, Uv, Vec3f, PI, TWO_PI,
};
use anyhow::{bail, Result};
use cgmath::{EuclideanSpace, InnerSpace};
use std::sync::Arc;
use tracing::debug;

const MAX_VSAMPLES: usize = 360;
const MAX_USAMPLES: usize = 720;
const MIN_SAMPLES: usize = 16;

/// Smoothing floor keeping PDFs away from zero at the poles.
const SIGMA: Float = 1.0e-6;

/// Importance-samples the environment: a conditional 1-D distribution
/// over `u` per `v` row (row resolution scaled by sin theta), and a
/// marginal distribution over rows.
pub struct BackgroundLight {
    base: LightBase,
    abs_inter: bool,
    background: Option<Arc<dyn Background>>,
    u_dist: Vec<Pdf1D>,
    v_dist: Option<Pdf1D>,
    world_center: Point3f,
    world_radius: Float,
    a_pdf: Float,
}

impl BackgroundLight {
    pub fn new(samples: usize, abs_inter: bool) -> Self {
        let mut base = LightBase::with_flags(LightFlags::NONE);
        base.num_samples = samples.max(1);
        Self {
            base,
            abs_inter,
            background: None,
            u_dist: Vec::new(),
            v_dist: None,
            world_center: Point3f::origin(),
            world_radius: 1.0,
            a_pdf: 1.0,
        }
    }

    fn sin_row(v: Float) -> Float {
        (v * PI).sin().max(0.0)
    }

    /// Draws a direction toward the environment; returns (dir, pdf).
    fn sample_dir(&self, s_1: Float, s_2: Float) -> (Vec3f, Float) {
        let v_dist = match &self.v_dist {
            Some(d) => d,
            None => {
                let dir = inv_sphere_map(Uv::new(s_1, s_2));
                return (dir, 1.0 / (4.0 * PI));
            }
        };
        let mut pdf_v = 0.0;
        let v_pos = v_dist.sample(s_2, &mut pdf_v);
        let iv = (v_pos as usize).min(self.u_dist.len() - 1);
        let mut pdf_u = 0.0;
        let u_pos = self.u_dist[iv].sample(s_1, &mut pdf_u);
        let u = u_pos * self.u_dist[iv].inv_count;
        let v = v_pos * v_dist.inv_count;
        let dir = inv_sphere_map(Uv::new(u, v));
        (dir, Self::solid_angle_pdf(pdf_u, pdf_v, v))
    }

    /// PDF of `sample_dir` producing `dir` (pointing at the environment).
    fn dir_pdf(&self, dir: Vec3f) -> Float {
        let v_dist = match &self.v_dist {
            Some(d) => d,
            None => return 1.0 / (4.0 * PI),
        };
        let uv = sphere_map(dir);
        let iv = ((uv.v * v_dist.count() as Float) as usize).min(v_dist.count() - 1);
        let row = &self.u_dist[iv];
        let iu = ((uv.u * row.count() as Float) as usize).min(row.count() - 1);
        let pdf_u = row.func[iu] * row.inv_integral;
        let pdf_v = v_dist.func[iv] * v_dist.inv_integral;
        Self::solid_angle_pdf(pdf_u, pdf_v, uv.v)
    }

    /// Converts unit-square density to solid-angle density, with the
    /// sin-theta denominator clamped by the smoothing constant.
    fn solid_angle_pdf(pdf_u: Float, pdf_v: Float, v: Float) -> Float {
        let sin_theta = Self::sin_row(v).max(SIGMA);
        ((pdf_u * pdf_v) / (2.0 * PI * PI * sin_theta)).max(SIGMA)
    }
}

impl Light for BackgroundLight {
    fn base(&self) -> &LightBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut LightBase {
        &mut self.base
    }

    fn init(&mut self, scene: &Scene) -> Result<()> {
        let background = match scene.background() {
            Some(bg) => Arc::clone(bg),
            None => bail!("background light requires a scene background"),
        };

        let nv = MAX_VSAMPLES;
        let mut fv = vec![0.0 as Float; nv];
        self.u_dist = Vec::with_capacity(nv);
        for y in 0..nv {
            let fy = (y as Float + 0.5) / nv as Float;
            let sin_theta = Self::sin_row(fy);
            let nu = MIN_SAMPLES + (sin_theta * (MAX_USAMPLES - MIN_SAMPLES) as Float) as usize;
            let mut fu = vec![0.0 as Float; nu];
            for (x, f) in fu.iter_mut().enumerate() {
                let fx = (x as Float + 0.5) / nu as Float;
                let dir = inv_sphere_map(Uv::new(fx, fy));
                *f = background.eval(dir).energy() * sin_theta;
            }
            let row = Pdf1D::new(&fu);
            fv[y] = row.integral;
            self.u_dist.push(row);
        }
        self.v_dist = Some(Pdf1D::new(&fv));

        let (center, radius) = scene.bound().bounding_sphere();
        self.world_center = center;
        self.world_radius = radius.max(1e-3);
        self.a_pdf = self.world_radius * self.world_radius;
        self.background = Some(background);
        debug!(rows = nv, "background importance tables built");
        Ok(())
    }

    fn total_energy(&self) -> Rgb {
        let avg = self
            .v_dist
            .as_ref()
            .map(|d| d.integral)
            .unwrap_or(0.0);
        Rgb::gray(avg) * (TWO_PI * self.a_pdf)
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
        let (dir, pdf) = self.sample_dir(s_1, s_2);
        let col = background.eval(dir);
        let ray = Ray::new(surface_p, dir, time);
        Some(IllumSample {
            ray,
            col,
            pdf,
            light_p: surface_p + dir * (2.0 * self.world_radius),
            light_ng: -dir,
        })
    }

    fn illum_pdf(&self, surface_p: Point3f, light_p: Point3f, _light_ng: Vec3f) -> Float {
        let dir = (light_p - surface_p).normalize();
        self.dir_pdf(dir)
    }

    fn intersect(&self, ray: &Ray) -> Option<LightIntersect> {
        let background = self.background.as_ref()?;
        let dir = if self.abs_inter { -ray.dir } else { ray.dir };
        let pdf = self.dir_pdf(dir);
        Some(LightIntersect {
            t: -1.0,
            inv_pdf: 1.0 / pdf,
            col: background.eval(ray.dir),
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
        let background = self.background.as_ref()?;
        let (env_dir, pdf) = self.sample_dir(s_3, s_4);
        let col = background.eval(env_dir);
        let dir = -env_dir;
        let (u_vec, v_vec) = coordinate_system(dir);
        let offs2 = shirley_disk(s_1, s_2);
        let offs = u_vec * offs2.x + v_vec * offs2.y;
        let from = self.world_center + (offs - dir) * self.world_radius;
        Some(PhotonEmit {
            ray: Ray::new(from, dir, time),
            inv_pdf: 1.0 / pdf,
            col: col * self.a_pdf,
        })
    }
}
