use crate::color::Rgb;
use crate::geometry::ray::Ray;
use crate::light::{IllumSample, Light, LightBase, LightFlags, PhotonEmit};
use crate::sampling::shirley_disk;
use crate::scene::Scene;
use crate::{coordinate_system, Float, Point3f, Vec3f, PI};
use anyhow::Result;
use cgmath::{EuclideanSpace, InnerSpace};

/// Ideal parallel light. Photons start from a disk on the scene's
/// bounding sphere facing the light direction.
pub struct DirectionalLight {
    base: LightBase,
    direction: Vec3f,
    du: Vec3f,
    dv: Vec3f,
    color: Rgb,
    world_center: Point3f,
    world_radius: Float,
    area_pdf: Float,
}

impl DirectionalLight {
    /// `direction` points from the light toward the scene.
    pub fn new(direction: Vec3f, color: Rgb, power: Float) -> Self {
        let direction = direction.normalize();
        let (du, dv) = coordinate_system(direction);
        Self {
            base: LightBase::with_flags(LightFlags::DELTA_DIRECTION),
            direction,
            du,
            dv,
            color: color * power,
            world_center: Point3f::origin(),
            world_radius: 1.0,
            area_pdf: PI,
        }
    }
}

impl Light for DirectionalLight {
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
        self.area_pdf = PI * self.world_radius * self.world_radius;
        Ok(())
    }

    fn total_energy(&self) -> Rgb {
        self.color * self.area_pdf
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
        let wi = -self.direction;
        // parallel light: unbounded shadow ray
        let ray = Ray::new(surface_p, wi, time);
        Some(IllumSample {
            ray,
            col: self.color,
            pdf: 1.0,
            light_p: surface_p + wi * (2.0 * self.world_radius),
            light_ng: self.direction,
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
        let uv = shirley_disk(s_3, s_4);
        let offs = self.du * (uv.x * self.world_radius) + self.dv * (uv.y * self.world_radius);
        let from = self.world_center + offs - self.direction * self.world_radius;
        Some(PhotonEmit {
            ray: Ray::new(from, self.direction, time),
            inv_pdf: self.area_pdf,
            col: self.color,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_constant_radiance_any_distance() {
        let light = DirectionalLight::new(Vec3f::new(0.0, -1.0, 0.0), Rgb::WHITE, 3.0);
        let a = light
            .illum_sample(Point3f::new(0.0, 0.0, 0.0), 0.0, 0.0, 0.0)
            .unwrap();
        let b = light
            .illum_sample(Point3f::new(100.0, -50.0, 7.0), 0.0, 0.0, 0.0)
            .unwrap();
        assert_relative_eq!(a.col.r, b.col.r);
        assert_relative_eq!(a.pdf, 1.0);
        assert_relative_eq!(a.ray.dir.y, 1.0, epsilon = 1e-6);
    }
}
