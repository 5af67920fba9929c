use crate::color::Rgb;
use crate::geometry::surface::SurfacePoint;
use crate::{Float, Vec3f};
use bitflags::bitflags;
use cgmath::InnerSpace;

pub mod glass;
pub mod matte;
pub mod mirror;

pub use glass::GlassMaterial;
pub use matte::MatteMaterial;
pub use mirror::MirrorMaterial;

bitflags! {
    /// Which scattering components a material carries, and which a
    /// sampling call is allowed to pick from.
    pub struct BsdfFlags: u32 {
        const NONE       = 0;
        const SPECULAR   = 1 << 0;
        const GLOSSY     = 1 << 1;
        const DIFFUSE    = 1 << 2;
        const DISPERSIVE = 1 << 3;
        const REFLECT    = 1 << 4;
        const TRANSMIT   = 1 << 5;
        /// Passes light through with a filter color (transparent shadows).
        const FILTER     = 1 << 6;
        const EMIT       = 1 << 7;
        const ALL_SCATTER = Self::SPECULAR.bits | Self::GLOSSY.bits | Self::DIFFUSE.bits
            | Self::DISPERSIVE.bits | Self::REFLECT.bits | Self::TRANSMIT.bits;
    }
}

/// Opaque per-hit material state, created once per surface point.
pub type MaterialData = Box<dyn std::any::Any + Send + Sync>;

/// Result of importance-sampling the BSDF.
#[derive(Debug, Clone, Copy)]
pub struct BsdfSample {
    pub wi: Vec3f,
    pub col: Rgb,
    pub pdf: Float,
    pub flags: BsdfFlags,
}

/// Perfectly-specular components evaluated deterministically for the
/// integrator's reflect/refract recursion.
#[derive(Debug, Default, Clone, Copy)]
pub struct SpecularComponents {
    pub reflect: Option<(Vec3f, Rgb)>,
    pub refract: Option<(Vec3f, Rgb)>,
}

/// The integrator-facing material contract. Texture evaluation and the
/// full shader-node machinery live behind implementations of this trait.
pub trait Material: Send + Sync {
    fn flags(&self) -> BsdfFlags;

    /// Per-hit state initialized when the surface point is first shaded.
    fn init_data(&self, _sp: &SurfacePoint) -> Option<MaterialData> {
        None
    }

    /// Evaluates the BSDF for a given pair of directions, restricted to
    /// the requested component types.
    fn eval(&self, sp: &SurfacePoint, wo: Vec3f, wi: Vec3f, types: BsdfFlags) -> Rgb;

    /// Importance-samples an incoming direction.
    fn sample(
        &self,
        sp: &SurfacePoint,
        wo: Vec3f,
        s_1: Float,
        s_2: Float,
        types: BsdfFlags,
    ) -> Option<BsdfSample>;

    /// Solid-angle PDF of `sample` picking `wi`.
    fn pdf(&self, sp: &SurfacePoint, wo: Vec3f, wi: Vec3f, types: BsdfFlags) -> Float;

    fn emission(&self, _sp: &SurfacePoint, _wo: Vec3f) -> Rgb {
        Rgb::BLACK
    }

    fn specular(&self, _sp: &SurfacePoint, _wo: Vec3f) -> SpecularComponents {
        SpecularComponents::default()
    }

    /// Filter color for light passing straight through; black = opaque.
    fn transparency(&self, _sp: &SurfacePoint, _wo: Vec3f) -> Rgb {
        Rgb::BLACK
    }

    fn alpha(&self, _sp: &SurfacePoint, _wo: Vec3f) -> Float {
        1.0
    }

    /// Extra recursion depth this material may consume beyond the
    /// integrator's global maximum.
    fn additional_depth(&self) -> i32 {
        0
    }

    fn is_transparent(&self) -> bool {
        self.flags().contains(BsdfFlags::FILTER)
    }
}

pub fn reflect_dir(n: Vec3f, wo: Vec3f) -> Vec3f {
    (n * (2.0 * wo.dot(n)) - wo).normalize()
}

/// Snell refraction; `None` on total internal reflection. `ior` is the
/// ratio inside/outside for a ray arriving on the outside.
pub fn refract_dir(mut n: Vec3f, wo: Vec3f, ior: Float) -> Option<Vec3f> {
    let mut cos_i = wo.dot(n);
    let eta = if cos_i < 0.0 {
        // leaving the object
        n = -n;
        cos_i = -cos_i;
        ior
    } else {
        1.0 / ior
    };
    let sin2_t = eta * eta * (1.0 - cos_i * cos_i);
    if sin2_t >= 1.0 {
        return None;
    }
    let cos_t = (1.0 - sin2_t).sqrt();
    Some((-wo * eta + n * (eta * cos_i - cos_t)).normalize())
}

/// Dielectric Fresnel reflectance for unpolarized light.
pub fn fresnel_dielectric(cos_i: Float, ior: Float) -> Float {
    let cos_i = cos_i.abs().min(1.0);
    let (eta_i, eta_t) = (1.0, ior);
    let sin_t = eta_i / eta_t * (1.0 - cos_i * cos_i).max(0.0).sqrt();
    if sin_t >= 1.0 {
        return 1.0;
    }
    let cos_t = (1.0 - sin_t * sin_t).max(0.0).sqrt();
    let r_par = (eta_t * cos_i - eta_i * cos_t) / (eta_t * cos_i + eta_i * cos_t);
    let r_perp = (eta_i * cos_i - eta_t * cos_t) / (eta_i * cos_i + eta_t * cos_t);
    0.5 * (r_par * r_par + r_perp * r_perp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_reflect_dir() {
        let n = Vec3f::new(0.0, 0.0, 1.0);
        let wo = Vec3f::new(1.0, 0.0, 1.0).normalize();
        let r = reflect_dir(n, wo);
        assert_relative_eq!(r.x, -wo.x, epsilon = 1e-6);
        assert_relative_eq!(r.z, wo.z, epsilon = 1e-6);
    }

    #[test]
    fn test_refract_total_internal_reflection() {
        let n = Vec3f::new(0.0, 0.0, 1.0);
        // grazing exit from inside glass
        let wo = Vec3f::new(0.9, 0.0, -0.2).normalize();
        assert!(refract_dir(n, wo, 1.5).is_none());
        // head-on transmission always succeeds
        let wo = Vec3f::new(0.0, 0.0, 1.0);
        let wi = refract_dir(n, wo, 1.5).unwrap();
        assert_relative_eq!(wi.z, -1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_fresnel_limits() {
        // normal incidence on glass: ~4% reflectance
        let f0 = fresnel_dielectric(1.0, 1.5);
        assert_relative_eq!(f0, 0.04, epsilon = 1e-3);
        // grazing incidence approaches 1
        assert!(fresnel_dielectric(0.01, 1.5) > 0.9);
    }
}
