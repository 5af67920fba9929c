use crate::{Float, Point3f, Vec3f, INFINITY, MIN_RAYDIST};

/// A ray with a parametric validity range and a shutter time in [0,1].
#[derive(Debug, Clone, Copy)]
pub struct Ray {
    pub from: Point3f,
    pub dir: Vec3f,
    pub tmin: Float,
    pub tmax: Float,
    pub time: Float,
}

impl Ray {
    pub fn new(from: Point3f, dir: Vec3f, time: Float) -> Self {
        Self {
            from,
            dir,
            tmin: MIN_RAYDIST,
            tmax: INFINITY,
            time,
        }
    }

    pub fn with_range(from: Point3f, dir: Vec3f, time: Float, tmin: Float, tmax: Float) -> Self {
        Self { from, dir, tmin, tmax, time }
    }

    pub fn at(&self, t: Float) -> Point3f {
        self.from + self.dir * t
    }
}

/// Auxiliary rays offset one pixel in x and y, used to estimate the
/// screen-space footprint of a hit for filtered texture lookups.
#[derive(Debug, Clone, Copy)]
pub struct RayDifferentials {
    pub rx_from: Point3f,
    pub rx_dir: Vec3f,
    pub ry_from: Point3f,
    pub ry_dir: Vec3f,
}

/// Primary ray plus optional differentials.
#[derive(Debug, Clone, Copy)]
pub struct DiffRay {
    pub ray: Ray,
    pub diff: Option<RayDifferentials>,
}

impl DiffRay {
    pub fn new(ray: Ray) -> Self {
        Self { ray, diff: None }
    }

    /// Shrinks the differential offsets for multi-sample estimates so the
    /// effective footprint matches the per-sample spacing.
    pub fn scale_differentials(&mut self, s: Float) {
        if let Some(d) = &mut self.diff {
            d.rx_from = self.ray.from + (d.rx_from - self.ray.from) * s;
            d.ry_from = self.ray.from + (d.ry_from - self.ray.from) * s;
            d.rx_dir = self.ray.dir + (d.rx_dir - self.ray.dir) * s;
            d.ry_dir = self.ray.dir + (d.ry_dir - self.ray.dir) * s;
        }
    }
}
