use crate::color::Rgb;
use crate::geometry::surface::SurfacePoint;
use crate::material::{reflect_dir, BsdfFlags, BsdfSample, Material, SpecularComponents};
use crate::{Float, Vec3f};
use cgmath::InnerSpace;

/// Perfect specular reflector.
pub struct MirrorMaterial {
    reflectance: Rgb,
}

impl MirrorMaterial {
    pub fn new(reflectance: Rgb) -> Self {
        Self { reflectance }
    }
}

impl Material for MirrorMaterial {
    fn flags(&self) -> BsdfFlags {
        BsdfFlags::SPECULAR | BsdfFlags::REFLECT
    }

    fn eval(&self, _sp: &SurfacePoint, _wo: Vec3f, _wi: Vec3f, _types: BsdfFlags) -> Rgb {
        // delta distribution: zero for any sampled direction pair
        Rgb::BLACK
    }

    fn sample(
        &self,
        sp: &SurfacePoint,
        wo: Vec3f,
        _s_1: Float,
        _s_2: Float,
        types: BsdfFlags,
    ) -> Option<BsdfSample> {
        if !types.contains(BsdfFlags::SPECULAR) {
            return None;
        }
        let n = if wo.dot(sp.n) >= 0.0 { sp.n } else { -sp.n };
        let wi = reflect_dir(n, wo);
        let cos_wi = wi.dot(n).abs().max(1e-6);
        Some(BsdfSample {
            wi,
            // the 1/cos cancels the projection factor applied by callers
            col: self.reflectance * (1.0 / cos_wi),
            pdf: 1.0,
            flags: BsdfFlags::SPECULAR | BsdfFlags::REFLECT,
        })
    }

    fn pdf(&self, _sp: &SurfacePoint, _wo: Vec3f, _wi: Vec3f, _types: BsdfFlags) -> Float {
        0.0
    }

    fn specular(&self, sp: &SurfacePoint, wo: Vec3f) -> SpecularComponents {
        let n = if wo.dot(sp.n) >= 0.0 { sp.n } else { -sp.n };
        SpecularComponents {
            reflect: Some((reflect_dir(n, wo), self.reflectance)),
            refract: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::material::matte::tests_helpers::flat_surface_point;
    use approx::assert_relative_eq;

    #[test]
    fn test_mirror_reflects() {
        let m = MirrorMaterial::new(Rgb::gray(0.9));
        let sp = flat_surface_point();
        let wo = Vec3f::new(1.0, 0.0, 1.0).normalize();
        let s = m.sample(&sp, wo, 0.0, 0.0, BsdfFlags::ALL_SCATTER).unwrap();
        assert_relative_eq!(s.wi.x, -wo.x, epsilon = 1e-6);
        assert_relative_eq!(s.wi.z, wo.z, epsilon = 1e-6);
        assert_relative_eq!(s.pdf, 1.0);
        assert!(s.flags.contains(BsdfFlags::SPECULAR));
        // light sampling never sees a delta lobe
        assert!(m.eval(&sp, wo, s.wi, BsdfFlags::ALL_SCATTER).is_black());
        assert_eq!(m.pdf(&sp, wo, s.wi, BsdfFlags::ALL_SCATTER), 0.0);
    }
}
