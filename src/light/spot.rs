use crate::color::Rgb;
use crate::geometry::ray::Ray;
use crate::light::{IllumSample, Light, LightBase, LightFlags, PhotonEmit};
use crate::sampling::uniform_cone;
use crate::{coordinate_system, radians, Float, Point3f, Vec3f, TWO_PI};
use cgmath::InnerSpace;

/// Spot light: a point emitter restricted to a cone with a smoothstep
/// falloff region at the rim.
pub struct SpotLight {
    base: LightBase,
    from: Point3f,
    dir: Vec3f,
    du: Vec3f,
    dv: Vec3f,
    color: Rgb,
    cos_start: Float,
    cos_end: Float,
}

impl SpotLight {
    /// `cone_angle` is the full half-angle in degrees; `falloff` in (0,1]
    /// is the fraction of the cone over which intensity blends to zero.
    pub fn new(from: Point3f, to: Point3f, color: Rgb, power: Float, cone_angle: Float, falloff: Float) -> Self {
        let dir = (to - from).normalize();
        let (du, dv) = coordinate_system(dir);
        let angle = radians(cone_angle.max(1e-3).min(89.9));
        let cos_end = angle.cos();
        let cos_start = (angle * (1.0 - falloff.max(0.0).min(1.0))).cos();
        Self {
            base: LightBase::with_flags(LightFlags::DELTA_POSITION),
            from,
            dir,
            du,
            dv,
            color: color * power,
            cos_start,
            cos_end,
        }
    }

    fn falloff_weight(&self, cosa: Float) -> Float {
        if cosa < self.cos_end {
            0.0
        } else if cosa >= self.cos_start {
            1.0
        } else {
            let v = (cosa - self.cos_end) / (self.cos_start - self.cos_end);
            v * v * (3.0 - 2.0 * v)
        }
    }
}

impl Light for SpotLight {
    fn base(&self) -> &LightBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut LightBase {
        &mut self.base
    }

    fn total_energy(&self) -> Rgb {
        // solid angle of the cone, blending region averaged in
        self.color * (TWO_PI * (1.0 - 0.5 * (self.cos_start + self.cos_end)))
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
        let wi = ldir / dist;
        let cosa = self.dir.dot(-wi);
        let weight = self.falloff_weight(cosa);
        if weight <= 0.0 {
            return None;
        }
        let ray = Ray::with_range(surface_p, wi, time, 0.0, dist);
        Some(IllumSample {
            ray,
            col: self.color * weight,
            pdf: dist_sqr,
            light_p: self.from,
            light_ng: self.dir,
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
        let dir = uniform_cone(self.dir, self.du, self.dv, self.cos_end, s_1, s_2);
        let weight = self.falloff_weight(dir.dot(self.dir));
        Some(PhotonEmit {
            ray: Ray::new(self.from, dir, time),
            inv_pdf: TWO_PI * (1.0 - self.cos_end),
            col: self.color * weight,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cone_cutoff() {
        let light = SpotLight::new(
            Point3f::new(0.0, 5.0, 0.0),
            Point3f::new(0.0, 0.0, 0.0),
            Rgb::WHITE,
            100.0,
            20.0,
            0.25,
        );
        // straight below: inside the cone
        assert!(light
            .illum_sample(Point3f::new(0.0, 0.0, 0.0), 0.0, 0.0, 0.0)
            .is_some());
        // far to the side: outside the cone
        assert!(light
            .illum_sample(Point3f::new(10.0, 0.0, 0.0), 0.0, 0.0, 0.0)
            .is_none());
    }

    #[test]
    fn test_falloff_monotonic() {
        let light = SpotLight::new(
            Point3f::new(0.0, 5.0, 0.0),
            Point3f::new(0.0, 0.0, 0.0),
            Rgb::WHITE,
            1.0,
            30.0,
            0.5,
        );
        let center = light
            .illum_sample(Point3f::new(0.0, 0.0, 0.0), 0.0, 0.0, 0.0)
            .unwrap();
        let rim = light
            .illum_sample(Point3f::new(2.4, 0.0, 0.0), 0.0, 0.0, 0.0)
            .unwrap();
        assert!(rim.col.r < center.col.r);
    }
}
