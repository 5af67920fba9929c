pub mod accel;
pub mod camera;
pub mod color;
pub mod film;
pub mod geometry;
pub mod integrator;
pub mod light;
pub mod logging;
pub mod material;
pub mod photon;
pub mod primitive;
pub mod render;
pub mod sampler;
pub mod sampling;
pub mod scene;
pub mod shape;

use cgmath::InnerSpace;

pub use crate::color::{Rgb, Rgba};
pub use crate::geometry::bounds::{Bounds2i, Bounds3f};
pub use crate::geometry::matrix::Matrix4f;
pub use crate::geometry::ray::{DiffRay, Ray, RayDifferentials};
pub use crate::geometry::surface::SurfacePoint;

pub type Float = f32;

pub type Point2f = cgmath::Point2<Float>;
pub type Point2i = cgmath::Point2<i32>;
pub type Point3f = cgmath::Point3<Float>;
pub type Vec2f = cgmath::Vector2<Float>;
pub type Vec2i = cgmath::Vector2<i32>;
pub type Vec3f = cgmath::Vector3<Float>;

/// Parametric UV coordinates of an intersection or a surface parametrization.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct Uv {
    pub u: Float,
    pub v: Float,
}

impl Uv {
    pub fn new(u: Float, v: Float) -> Self {
        Self { u, v }
    }
}

impl std::ops::Add for Uv {
    type Output = Uv;
    fn add(self, o: Uv) -> Uv {
        Uv::new(self.u + o.u, self.v + o.v)
    }
}

impl std::ops::Sub for Uv {
    type Output = Uv;
    fn sub(self, o: Uv) -> Uv {
        Uv::new(self.u - o.u, self.v - o.v)
    }
}

impl std::ops::Mul<Float> for Uv {
    type Output = Uv;
    fn mul(self, s: Float) -> Uv {
        Uv::new(self.u * s, self.v * s)
    }
}

pub const INFINITY: Float = std::f32::INFINITY;
pub const PI: Float = std::f32::consts::PI;
pub const TWO_PI: Float = 2.0 * PI;
pub const INV_PI: Float = std::f32::consts::FRAC_1_PI;
pub const INV_TWO_PI: Float = 0.5 * INV_PI;

/// Rays shorter than this are considered self-intersections and dropped.
pub const MIN_RAYDIST: Float = 1.0e-5;

/// Offset applied to shadow ray origins to avoid self-shadowing.
pub const SHADOW_BIAS: Float = 1.0e-4;

pub fn lerp(t: Float, a: Float, b: Float) -> Float {
    (1.0 - t) * a + t * b
}

pub fn abs_dot(a: Vec3f, b: Vec3f) -> Float {
    a.dot(b).abs()
}

pub fn radians(deg: Float) -> Float {
    deg * PI / 180.0
}

/// Builds an orthonormal basis around `n`; returns the two tangent vectors.
pub fn coordinate_system(n: Vec3f) -> (Vec3f, Vec3f) {
    let u = if n.x.abs() > n.y.abs() {
        Vec3f::new(-n.z, 0.0, n.x) / (n.x * n.x + n.z * n.z).sqrt()
    } else {
        Vec3f::new(0.0, n.z, -n.y) / (n.y * n.y + n.z * n.z).sqrt()
    };
    let v = n.cross(u);
    (u, v)
}

pub fn spherical_theta(v: Vec3f) -> Float {
    v.z.min(1.0).max(-1.0).acos()
}

pub fn spherical_phi(v: Vec3f) -> Float {
    let p = v.y.atan2(v.x);
    if p < 0.0 {
        p + TWO_PI
    } else {
        p
    }
}

/// Maps a direction to equirectangular (u, v) in [0,1]².
pub fn sphere_map(dir: Vec3f) -> Uv {
    Uv::new(spherical_phi(dir) * INV_TWO_PI, spherical_theta(dir) * INV_PI)
}

/// Inverse of `sphere_map`: equirectangular (u, v) back to a direction.
pub fn inv_sphere_map(uv: Uv) -> Vec3f {
    let theta = uv.v * PI;
    let phi = uv.u * TWO_PI;
    let sin_theta = theta.sin();
    Vec3f::new(sin_theta * phi.cos(), sin_theta * phi.sin(), theta.cos())
}

pub fn faceforward(n: Vec3f, reference: Vec3f) -> Vec3f {
    if n.dot(reference) < 0.0 {
        -n
    } else {
        n
    }
}

/// Quadratic Bernstein weights for time-interpolated geometry.
pub fn bezier_factors(t: Float) -> [Float; 3] {
    let t = t.min(1.0).max(0.0);
    let u = 1.0 - t;
    [u * u, 2.0 * t * u, t * t]
}

/// Maps `time` into [0,1] over the shutter range before Bezier evaluation.
pub fn time_mapped(time: Float, time_start: Float, time_end: Float) -> Float {
    if time_end <= time_start {
        0.0
    } else {
        ((time - time_start) / (time_end - time_start)).min(1.0).max(0.0)
    }
}

/// Crate version triple parsed from the package metadata.
pub fn version() -> (u32, u32, u32) {
    let mut it = env!("CARGO_PKG_VERSION").split('.').map(|s| s.parse().unwrap_or(0));
    (
        it.next().unwrap_or(0),
        it.next().unwrap_or(0),
        it.next().unwrap_or(0),
    )
}

pub fn version_string() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_coordinate_system_orthonormal() {
        let n = Vec3f::new(0.3, -0.8, 0.52).normalize();
        let (u, v) = coordinate_system(n);
        assert_relative_eq!(u.dot(n), 0.0, epsilon = 1e-6);
        assert_relative_eq!(v.dot(n), 0.0, epsilon = 1e-6);
        assert_relative_eq!(u.dot(v), 0.0, epsilon = 1e-6);
        assert_relative_eq!(u.magnitude(), 1.0, epsilon = 1e-5);
        assert_relative_eq!(v.magnitude(), 1.0, epsilon = 1e-5);
    }

    #[test]
    fn test_sphere_map_roundtrip() {
        let dir = Vec3f::new(0.2, 0.5, -0.7).normalize();
        let uv = sphere_map(dir);
        let back = inv_sphere_map(uv);
        assert_relative_eq!(dir.x, back.x, epsilon = 1e-5);
        assert_relative_eq!(dir.y, back.y, epsilon = 1e-5);
        assert_relative_eq!(dir.z, back.z, epsilon = 1e-5);
    }

    #[test]
    fn test_bezier_factors_partition_of_unity() {
        for &t in &[0.0, 0.25, 0.5, 0.75, 1.0] {
            let [b0, b1, b2] = bezier_factors(t);
            assert_relative_eq!(b0 + b1 + b2, 1.0, epsilon = 1e-6);
        }
        assert_eq!(bezier_factors(0.0), [1.0, 0.0, 0.0]);
        assert_eq!(bezier_factors(1.0), [0.0, 0.0, 1.0]);
    }
}
