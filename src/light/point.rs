use crate::color::Rgb;
use crate::geometry::ray::Ray;
use crate::light::{EmitSample, IllumSample, Light, LightBase, LightFlags, PhotonEmit};
use crate::sampling::uniform_sphere;
use crate::{Float, Point3f, PI};
use cgmath::InnerSpace;

/// Isotropic point light. `color` already includes the configured power.
pub struct PointLight {
    base: LightBase,
    from: Point3f,
    color: Rgb,
}

impl PointLight {
    pub fn new(from: Point3f, color: Rgb, power: Float) -> Self {
        Self {
            base: LightBase::with_flags(LightFlags::DELTA_POSITION),
            from,
            color: color * power,
        }
    }

}

impl Light for PointLight {
    fn base(&self) -> &LightBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut LightBase {
        &mut self.base
    }

    fn total_energy(&self) -> Rgb {
        self.color * (4.0 * PI)
    }

    fn illum_sample(
        &self,
        surface_p: Point3f,
        _s_1: Float,
        _s_2: Float,
        time: Float,
    ) -> Option<IllumSample> {
        if self.photon_only() {
            return None;
        }
        let ldir = self.from - surface_p;
        let dist_sqr = ldir.magnitude2();
        let dist = dist_sqr.sqrt();
        if dist == 0.0 {
            return None;
        }
        let ray = Ray::with_range(surface_p, ldir / dist, time, 0.0, dist);
        Some(IllumSample {
            ray,
            col: self.color,
            // delta light: the integrator divides by this squared distance
            pdf: dist_sqr,
            light_p: self.from,
            light_ng: -ldir / dist,
        })
    }

    fn emit_photon(
        &self,
        s_1: Float,
        s_2: Float,
        _s_3: Float,
        _s_4: Float,
        time: Float,
    ) -> Option<PhotonEmit> {
        let dir = uniform_sphere(s_1, s_2);
        Some(PhotonEmit {
            ray: Ray::new(self.from, dir, time),
            inv_pdf: 4.0 * PI,
            col: self.color,
        })
    }

    fn emit_sample(
        &self,
        s_1: Float,
        s_2: Float,
        _s_3: Float,
        _s_4: Float,
        _time: Float,
    ) -> Option<EmitSample> {
        let dir = uniform_sphere(s_1, s_2);
        Some(EmitSample {
            point: self.from,
            normal: dir,
            dir,
            col: self.color,
            area_pdf: 1.0,
            dir_pdf: 0.25,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_inverse_square_falloff() {
        let light = PointLight::new(Point3f::new(0.0, 2.0, 0.0), Rgb::WHITE, 10.0);
        let near = light
            .illum_sample(Point3f::new(0.0, 1.0, 0.0), 0.0, 0.0, 0.0)
            .unwrap();
        let far = light
            .illum_sample(Point3f::new(0.0, 0.0, 0.0), 0.0, 0.0, 0.0)
            .unwrap();
        // radiance/pdf ratio falls off with squared distance
        let near_contrib = near.col.r / near.pdf;
        let far_contrib = far.col.r / far.pdf;
        assert_relative_eq!(near_contrib / far_contrib, 4.0, epsilon = 1e-4);
        // shadow ray stops at the light
        assert_relative_eq!(near.ray.tmax, 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_is_delta() {
        let light = PointLight::new(Point3f::new(0.0, 0.0, 0.0), Rgb::WHITE, 1.0);
        assert!(light.is_delta());
        assert!(light.emit_photon(0.3, 0.6, 0.0, 0.0, 0.0).is_some());
    }
}
