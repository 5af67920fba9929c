use crate::geometry::ray::{DiffRay, Ray, RayDifferentials};
use crate::sampling::shirley_disk;
use crate::scene::params::{ParamMap, ResultFlags};
use crate::{radians, Float, Point2f, Point3f, Vec2f, Vec3f};
use cgmath::InnerSpace;

/// Film-plane position, lens sample and shutter time of one camera ray.
#[derive(Debug, Clone, Copy)]
pub struct CameraSample {
    pub p_film: Point2f,
    pub p_lens: Point2f,
    pub time: Float,
}

pub trait Camera: Send + Sync {
    /// Generates the primary ray; weight 0 marks an invalid sample.
    fn generate_ray(&self, sample: CameraSample) -> (Float, Ray);

    fn resolution(&self) -> (usize, usize);

    /// Primary ray plus one-pixel-offset differentials for footprint
    /// tracking.
    fn generate_ray_differential(&self, sample: CameraSample) -> (Float, DiffRay) {
        let (mut weight, ray) = self.generate_ray(sample);

        let shift_x = CameraSample {
            p_film: sample.p_film + Vec2f::new(1.0, 0.0),
            ..sample
        };
        let (wx, rx) = self.generate_ray(shift_x);

        let shift_y = CameraSample {
            p_film: sample.p_film + Vec2f::new(0.0, 1.0),
            ..sample
        };
        let (wy, ry) = self.generate_ray(shift_y);

        if wx == 0.0 || wy == 0.0 {
            weight = 0.0;
        }
        let dray = DiffRay {
            ray,
            diff: Some(RayDifferentials {
                rx_from: rx.from,
                rx_dir: rx.dir,
                ry_from: ry.from,
                ry_dir: ry.dir,
            }),
        };
        (weight, dray)
    }
}

/// Pinhole/thin-lens perspective camera.
pub struct PerspectiveCamera {
    position: Point3f,
    forward: Vec3f,
    right: Vec3f,
    up: Vec3f,
    tan_half_fov: Float,
    aspect: Float,
    width: usize,
    height: usize,
    lens_radius: Float,
    focal_dist: Float,
}

impl PerspectiveCamera {
    /// `fov_deg` is the horizontal field of view.
    pub fn new(
        position: Point3f,
        look_at: Point3f,
        up_hint: Vec3f,
        fov_deg: Float,
        width: usize,
        height: usize,
    ) -> Self {
        let forward = (look_at - position).normalize();
        let right = forward.cross(up_hint).normalize();
        let up = right.cross(forward);
        Self {
            position,
            forward,
            right,
            up,
            tan_half_fov: (radians(fov_deg) * 0.5).tan(),
            aspect: height as Float / width as Float,
            width,
            height,
            lens_radius: 0.0,
            focal_dist: 1.0,
        }
    }

    pub fn with_aperture(mut self, lens_radius: Float, focal_dist: Float) -> Self {
        self.lens_radius = lens_radius;
        self.focal_dist = focal_dist.max(1e-3);
        self
    }

    pub fn from_params(params: &ParamMap) -> Result<Self, ResultFlags> {
        let type_name = params.require_string("type")?;
        if type_name != "perspective" {
            return Err(ResultFlags::ERROR_TYPE_UNKNOWN);
        }
        let from = params.get_point("from", Point3f::new(0.0, 0.0, 5.0));
        let to = params.get_point("to", Point3f::new(0.0, 0.0, 0.0));
        let up = params.get_vector("up", Vec3f::new(0.0, 1.0, 0.0));
        let fov = params.get_float("fov", 60.0);
        let width = params.get_int("resx", 512).max(1) as usize;
        let height = params.get_int("resy", 512).max(1) as usize;
        let cam = Self::new(from, to, up, fov, width, height);
        let aperture = params.get_float("aperture", 0.0);
        let focal = params.get_float("dof_distance", 1.0);
        Ok(cam.with_aperture(aperture, focal))
    }
}

impl Camera for PerspectiveCamera {
    fn generate_ray(&self, sample: CameraSample) -> (Float, Ray) {
        let sx = (2.0 * sample.p_film.x / self.width as Float - 1.0) * self.tan_half_fov;
        let sy = (1.0 - 2.0 * sample.p_film.y / self.height as Float) * self.tan_half_fov * self.aspect;
        let mut dir = (self.forward + self.right * sx + self.up * sy).normalize();
        let mut origin = self.position;

        if self.lens_radius > 0.0 {
            let disk = shirley_disk(sample.p_lens.x, sample.p_lens.y);
            let focus = self.position + dir * (self.focal_dist / dir.dot(self.forward));
            origin = self.position
                + self.right * (disk.x * self.lens_radius)
                + self.up * (disk.y * self.lens_radius);
            dir = (focus - origin).normalize();
        }

        (1.0, Ray::new(origin, dir, sample.time))
    }

    fn resolution(&self) -> (usize, usize) {
        (self.width, self.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn camera() -> PerspectiveCamera {
        PerspectiveCamera::new(
            Point3f::new(0.0, 0.0, 5.0),
            Point3f::new(0.0, 0.0, 0.0),
            Vec3f::new(0.0, 1.0, 0.0),
            90.0,
            256,
            256,
        )
    }

    #[test]
    fn test_center_ray_points_forward() {
        let cam = camera();
        let (w, ray) = cam.generate_ray(CameraSample {
            p_film: Point2f::new(128.0, 128.0),
            p_lens: Point2f::new(0.5, 0.5),
            time: 0.0,
        });
        assert_relative_eq!(w, 1.0);
        assert_relative_eq!(ray.dir.z, -1.0, epsilon = 1e-5);
        assert_relative_eq!(ray.dir.x, 0.0, epsilon = 1e-5);
    }

    #[test]
    fn test_corner_rays_span_fov() {
        let cam = camera();
        let (_, left) = cam.generate_ray(CameraSample {
            p_film: Point2f::new(0.0, 128.0),
            p_lens: Point2f::new(0.5, 0.5),
            time: 0.0,
        });
        let (_, right) = cam.generate_ray(CameraSample {
            p_film: Point2f::new(256.0, 128.0),
            p_lens: Point2f::new(0.5, 0.5),
            time: 0.0,
        });
        // 90 degree horizontal fov: edge rays at 45 degrees each side
        assert_relative_eq!(left.dir.x, -std::f32::consts::FRAC_1_SQRT_2, epsilon = 1e-4);
        assert_relative_eq!(right.dir.x, std::f32::consts::FRAC_1_SQRT_2, epsilon = 1e-4);
    }

    #[test]
    fn test_differentials_one_pixel_apart() {
        let cam = camera();
        let (_, dray) = cam.generate_ray_differential(CameraSample {
            p_film: Point2f::new(100.0, 90.0),
            p_lens: Point2f::new(0.5, 0.5),
            time: 0.0,
        });
        let diff = dray.diff.unwrap();
        // differentials differ from the main ray but stay close
        assert!((diff.rx_dir - dray.ray.dir).magnitude() > 0.0);
        assert!((diff.rx_dir - dray.ray.dir).magnitude() < 0.02);
    }
}
