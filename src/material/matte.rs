use crate::color::Rgb;
use crate::geometry::surface::SurfacePoint;
use crate::material::{BsdfFlags, BsdfSample, Material};
use crate::sampling::cos_hemisphere;
use crate::{Float, Vec3f, INV_PI};
use cgmath::InnerSpace;

/// Lambertian diffuse with optional emission and optional transparency
/// filtering; covers the matte walls, emitter panels and cutout surfaces
/// the pipeline tests need.
pub struct MatteMaterial {
    albedo: Rgb,
    emit: Rgb,
    transparency: Rgb,
}

impl MatteMaterial {
    pub fn new(albedo: Rgb) -> Self {
        Self {
            albedo,
            emit: Rgb::BLACK,
            transparency: Rgb::BLACK,
        }
    }

    pub fn emissive(albedo: Rgb, emit: Rgb) -> Self {
        Self {
            albedo,
            emit,
            transparency: Rgb::BLACK,
        }
    }

    pub fn with_transparency(mut self, filter: Rgb) -> Self {
        self.transparency = filter;
        self
    }
}

impl Material for MatteMaterial {
    fn flags(&self) -> BsdfFlags {
        let mut f = BsdfFlags::DIFFUSE | BsdfFlags::REFLECT;
        if !self.emit.is_black() {
            f |= BsdfFlags::EMIT;
        }
        if !self.transparency.is_black() {
            f |= BsdfFlags::FILTER | BsdfFlags::TRANSMIT;
        }
        f
    }

    fn eval(&self, sp: &SurfacePoint, wo: Vec3f, wi: Vec3f, types: BsdfFlags) -> Rgb {
        if !types.contains(BsdfFlags::DIFFUSE) {
            return Rgb::BLACK;
        }
        // both directions on the same side of the surface
        if wi.dot(sp.n) * wo.dot(sp.n) <= 0.0 {
            return Rgb::BLACK;
        }
        self.albedo * INV_PI
    }

    fn sample(
        &self,
        sp: &SurfacePoint,
        wo: Vec3f,
        s_1: Float,
        s_2: Float,
        types: BsdfFlags,
    ) -> Option<BsdfSample> {
        if !types.contains(BsdfFlags::DIFFUSE) {
            return None;
        }
        let n = if wo.dot(sp.n) >= 0.0 { sp.n } else { -sp.n };
        let (u, v) = crate::coordinate_system(n);
        let wi = cos_hemisphere(n, u, v, s_1, s_2);
        let cos_wi = wi.dot(n).max(0.0);
        if cos_wi <= 0.0 {
            return None;
        }
        Some(BsdfSample {
            wi,
            col: self.albedo * INV_PI,
            pdf: cos_wi * INV_PI,
            flags: BsdfFlags::DIFFUSE | BsdfFlags::REFLECT,
        })
    }

    fn pdf(&self, sp: &SurfacePoint, wo: Vec3f, wi: Vec3f, types: BsdfFlags) -> Float {
        if !types.contains(BsdfFlags::DIFFUSE) {
            return 0.0;
        }
        let n_dot_wo = wo.dot(sp.n);
        let n_dot_wi = wi.dot(sp.n);
        if n_dot_wo * n_dot_wi <= 0.0 {
            0.0
        } else {
            n_dot_wi.abs() * INV_PI
        }
    }

    fn emission(&self, sp: &SurfacePoint, wo: Vec3f) -> Rgb {
        // emit only from the front face
        if wo.dot(sp.ng) > 0.0 {
            self.emit
        } else {
            Rgb::BLACK
        }
    }

    fn transparency(&self, _sp: &SurfacePoint, _wo: Vec3f) -> Rgb {
        self.transparency
    }

    fn alpha(&self, _sp: &SurfacePoint, _wo: Vec3f) -> Float {
        1.0 - self.transparency.energy().min(1.0)
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use super::tests_helpers::flat_surface_point as test_sp;
    use approx::assert_relative_eq;

    #[test]
    fn test_eval_reciprocal_hemisphere() {
        let m = MatteMaterial::new(Rgb::gray(0.5));
        let sp = test_sp();
        let wo = Vec3f::new(0.0, 0.3, 1.0).normalize();
        let wi = Vec3f::new(0.4, 0.0, 1.0).normalize();
        let f = m.eval(&sp, wo, wi, BsdfFlags::ALL_SCATTER);
        assert_relative_eq!(f.r, 0.5 * INV_PI, epsilon = 1e-6);
        // below the surface: black
        let below = Vec3f::new(0.0, 0.0, -1.0);
        assert!(m.eval(&sp, wo, below, BsdfFlags::ALL_SCATTER).is_black());
    }

    #[test]
    fn test_sample_pdf_consistency() {
        let m = MatteMaterial::new(Rgb::gray(0.8));
        let sp = test_sp();
        let wo = Vec3f::new(0.0, 0.0, 1.0);
        let s = m.sample(&sp, wo, 0.4, 0.7, BsdfFlags::ALL_SCATTER).unwrap();
        assert!(s.pdf > 0.0);
        assert_relative_eq!(
            s.pdf,
            m.pdf(&sp, wo, s.wi, BsdfFlags::ALL_SCATTER),
            epsilon = 1e-5
        );
    }

    #[test]
    fn test_emission_front_only() {
        let m = MatteMaterial::emissive(Rgb::BLACK, Rgb::new(2.0, 2.0, 2.0));
        let sp = test_sp();
        assert!(!m.emission(&sp, Vec3f::new(0.0, 0.0, 1.0)).is_black());
        assert!(m.emission(&sp, Vec3f::new(0.0, 0.0, -1.0)).is_black());
        assert!(m.flags().contains(BsdfFlags::EMIT));
    }
}
