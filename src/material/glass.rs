use crate::color::Rgb;
use crate::geometry::surface::SurfacePoint;
use crate::material::{
    fresnel_dielectric, reflect_dir, refract_dir, BsdfFlags, BsdfSample, Material,
    SpecularComponents,
};
use crate::{Float, Vec3f};
use cgmath::InnerSpace;

/// Dielectric with Fresnel-weighted specular reflection and refraction.
/// The filter color tints transmitted light and shadow rays.
pub struct GlassMaterial {
    ior: Float,
    filter: Rgb,
    mirror_color: Rgb,
}

impl GlassMaterial {
    pub fn new(ior: Float, filter: Rgb) -> Self {
        Self {
            ior,
            filter,
            mirror_color: Rgb::WHITE,
        }
    }

    pub fn with_mirror_color(mut self, col: Rgb) -> Self {
        self.mirror_color = col;
        self
    }
}

impl Material for GlassMaterial {
    fn flags(&self) -> BsdfFlags {
        BsdfFlags::SPECULAR | BsdfFlags::REFLECT | BsdfFlags::TRANSMIT | BsdfFlags::FILTER
    }

    fn eval(&self, _sp: &SurfacePoint, _wo: Vec3f, _wi: Vec3f, _types: BsdfFlags) -> Rgb {
        Rgb::BLACK
    }

    fn sample(
        &self,
        sp: &SurfacePoint,
        wo: Vec3f,
        s_1: Float,
        _s_2: Float,
        types: BsdfFlags,
    ) -> Option<BsdfSample> {
        if !types.contains(BsdfFlags::SPECULAR) {
            return None;
        }
        let n = if wo.dot(sp.n) >= 0.0 { sp.n } else { -sp.n };
        let cos_i = wo.dot(n);
        let kr = fresnel_dielectric(cos_i, self.ior);

        let refracted = refract_dir(sp.n, wo, self.ior);
        let pick_reflect = match refracted {
            None => true,
            Some(_) => s_1 < kr,
        };

        if pick_reflect && types.contains(BsdfFlags::REFLECT) {
            let wi = reflect_dir(n, wo);
            let cos_wi = wi.dot(n).abs().max(1e-6);
            let pdf = if refracted.is_some() { kr } else { 1.0 };
            Some(BsdfSample {
                wi,
                col: self.mirror_color * (kr / cos_wi),
                pdf,
                flags: BsdfFlags::SPECULAR | BsdfFlags::REFLECT,
            })
        } else if let Some(wi) = refracted {
            if !types.contains(BsdfFlags::TRANSMIT) {
                return None;
            }
            let cos_wi = wi.dot(n).abs().max(1e-6);
            let kt = 1.0 - kr;
            Some(BsdfSample {
                wi,
                col: self.filter * (kt / cos_wi),
                pdf: kt,
                flags: BsdfFlags::SPECULAR | BsdfFlags::TRANSMIT | BsdfFlags::DISPERSIVE,
            })
        } else {
            None
        }
    }

    fn pdf(&self, _sp: &SurfacePoint, _wo: Vec3f, _wi: Vec3f, _types: BsdfFlags) -> Float {
        0.0
    }

    fn specular(&self, sp: &SurfacePoint, wo: Vec3f) -> SpecularComponents {
        let n = if wo.dot(sp.n) >= 0.0 { sp.n } else { -sp.n };
        let cos_i = wo.dot(n);
        let kr = fresnel_dielectric(cos_i, self.ior);
        let reflect = Some((reflect_dir(n, wo), self.mirror_color * kr));
        let refract = refract_dir(sp.n, wo, self.ior).map(|wi| (wi, self.filter * (1.0 - kr)));
        SpecularComponents { reflect, refract }
    }

    fn transparency(&self, _sp: &SurfacePoint, _wo: Vec3f) -> Rgb {
        self.filter
    }

    fn alpha(&self, _sp: &SurfacePoint, _wo: Vec3f) -> Float {
        1.0 - self.filter.energy().min(1.0)
    }

    fn additional_depth(&self) -> i32 {
        2
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::material::matte::tests_helpers::flat_surface_point;
    use approx::assert_relative_eq;

    #[test]
    fn test_specular_components_split_energy() {
        let m = GlassMaterial::new(1.5, Rgb::WHITE);
        let sp = flat_surface_point();
        let wo = Vec3f::new(0.0, 0.0, 1.0);
        let spec = m.specular(&sp, wo);
        let (_, kr_col) = spec.reflect.unwrap();
        let (wi, kt_col) = spec.refract.unwrap();
        assert_relative_eq!(kr_col.r + kt_col.r, 1.0, epsilon = 1e-4);
        assert_relative_eq!(wi.z, -1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_sample_picks_both_lobes() {
        let m = GlassMaterial::new(1.5, Rgb::WHITE);
        let sp = flat_surface_point();
        let wo = Vec3f::new(0.3, 0.0, 1.0).normalize();
        let refl = m.sample(&sp, wo, 0.0, 0.0, BsdfFlags::ALL_SCATTER).unwrap();
        assert!(refl.flags.contains(BsdfFlags::REFLECT));
        let refr = m.sample(&sp, wo, 0.99, 0.0, BsdfFlags::ALL_SCATTER).unwrap();
        assert!(refr.flags.contains(BsdfFlags::TRANSMIT));
        assert!(refr.wi.z < 0.0);
    }

    #[test]
    fn test_transparent_for_shadows() {
        let m = GlassMaterial::new(1.5, Rgb::new(0.9, 0.9, 1.0));
        assert!(m.is_transparent());
        let sp = flat_surface_point();
        assert!(!m.transparency(&sp, Vec3f::new(0.0, 0.0, 1.0)).is_black());
    }
}
