use crate::color::Rgb;
use crate::geometry::ray::Ray;
use crate::scene::Scene;
use crate::{Float, Point3f, Vec3f};
use anyhow::Result;
use bitflags::bitflags;

pub mod area;
pub mod background;
pub mod background_portal;
pub mod directional;
pub mod ies;
pub mod object;
pub mod point;
pub mod sphere;
pub mod spot;
pub mod sun;

pub use area::AreaLight;
pub use background::BackgroundLight;
pub use background_portal::BackgroundPortalLight;
pub use directional::DirectionalLight;
pub use ies::{IesData, IesLight};
pub use object::ObjectLight;
pub use point::PointLight;
pub use sphere::SphereLight;
pub use spot::SpotLight;
pub use sun::SunLight;

bitflags! {
    pub struct LightFlags: u32 {
        const NONE = 0;
        /// Dirac delta in position (point, spot, IES).
        const DELTA_POSITION = 1 << 0;
        /// Dirac delta in direction (directional).
        const DELTA_DIRECTION = 1 << 1;
    }
}

/// Switches common to every light type.
#[derive(Debug, Clone)]
pub struct LightBase {
    pub flags: LightFlags,
    pub enabled: bool,
    pub cast_shadows: bool,
    pub shoot_caustic: bool,
    pub shoot_diffuse: bool,
    pub photon_only: bool,
    pub num_samples: usize,
}

impl Default for LightBase {
    fn default() -> Self {
        Self {
            flags: LightFlags::NONE,
            enabled: true,
            cast_shadows: true,
            shoot_caustic: true,
            shoot_diffuse: true,
            photon_only: false,
            num_samples: 1,
        }
    }
}

impl LightBase {
    pub fn with_flags(flags: LightFlags) -> Self {
        Self {
            flags,
            ..Self::default()
        }
    }
}

/// Illumination sample toward a light: the shadow ray to trace, arriving
/// radiance, and the solid-angle PDF as seen from the shading point.
pub struct IllumSample {
    pub ray: Ray,
    pub col: Rgb,
    pub pdf: Float,
    /// Sampled point and normal on the light, for PDF reconstruction.
    pub light_p: Point3f,
    pub light_ng: Vec3f,
}

/// A photon leaving the light: ray, inverse emission PDF and carried power.
pub struct PhotonEmit {
    pub ray: Ray,
    pub inv_pdf: Float,
    pub col: Rgb,
}

/// Emission sample with separated area and direction densities, for
/// bidirectional-style estimators.
pub struct EmitSample {
    pub point: Point3f,
    pub normal: Vec3f,
    pub dir: Vec3f,
    pub col: Rgb,
    pub area_pdf: Float,
    pub dir_pdf: Float,
}

/// Result of a BSDF-sampled ray hitting a (non-Dirac) light.
pub struct LightIntersect {
    /// Hit distance; negative means "at infinity" (environment, sun disk).
    pub t: Float,
    pub inv_pdf: Float,
    pub col: Rgb,
}

pub trait Light: Send + Sync {
    fn base(&self) -> &LightBase;

    fn base_mut(&mut self) -> &mut LightBase;

    /// Called once after the accelerator is built; lights that need the
    /// scene bound or object geometry resolve it here.
    fn init(&mut self, _scene: &Scene) -> Result<()> {
        Ok(())
    }

    /// Total emitted power; finite and non-negative. Zero-energy lights
    /// are skipped by the photon pass.
    fn total_energy(&self) -> Rgb;

    /// Samples an illumination direction toward the light from
    /// `surface_p`. `None` when the point cannot be lit (backside,
    /// inside, photon-only light).
    fn illum_sample(
        &self,
        surface_p: Point3f,
        s_1: Float,
        s_2: Float,
        time: Float,
    ) -> Option<IllumSample>;

    /// PDF of `illum_sample` producing the configuration where the light
    /// was hit at `light_p` with surface normal `light_ng`; required for
    /// MIS when a BSDF-sampled ray reaches the light's geometry.
    fn illum_pdf(&self, _surface_p: Point3f, _light_p: Point3f, _light_ng: Vec3f) -> Float {
        0.0
    }

    /// Emits a photon for the caustic/photon passes.
    fn emit_photon(&self, s_1: Float, s_2: Float, s_3: Float, s_4: Float, time: Float)
        -> Option<PhotonEmit>;

    /// Emission sample with separated PDFs.
    fn emit_sample(&self, _s_1: Float, _s_2: Float, _s_3: Float, _s_4: Float, _time: Float)
        -> Option<EmitSample> {
        None
    }

    /// Intersection with the light itself for lights without scene
    /// geometry (sun disk, environment). Mesh-backed lights resolve hits
    /// through the accelerator instead.
    fn intersect(&self, _ray: &Ray) -> Option<LightIntersect> {
        None
    }

    fn is_delta(&self) -> bool {
        self.base()
            .flags
            .intersects(LightFlags::DELTA_POSITION | LightFlags::DELTA_DIRECTION)
    }

    fn num_samples(&self) -> usize {
        self.base().num_samples
    }

    fn enabled(&self) -> bool {
        self.base().enabled
    }

    fn cast_shadows(&self) -> bool {
        self.base().cast_shadows
    }

    fn shoot_caustic(&self) -> bool {
        self.base().shoot_caustic && !self.total_energy().is_black()
    }

    fn shoot_diffuse(&self) -> bool {
        self.base().shoot_diffuse && !self.total_energy().is_black()
    }

    fn photon_only(&self) -> bool {
        self.base().photon_only
    }
}
