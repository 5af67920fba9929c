pub mod clip;
pub mod instance;
pub mod polygon;
pub mod sphere;

pub use self::instance::InstancePrimitive;
pub use self::polygon::{QuadPrimitive, TrianglePrimitive};
pub use self::sphere::SpherePrimitive;

use crate::geometry::bounds::Bounds3f;
use crate::geometry::ray::RayDifferentials;
use crate::geometry::surface::SurfacePoint;
use crate::scene::{LightId, MaterialId, ObjectId};
use crate::{Float, Point3f, Uv, Vec3f};

/// A renderable surface patch. Hot paths (intersection, bounds) dispatch
/// statically over this enum; factories and scene assembly treat it as an
/// opaque value.
pub enum Primitive {
    Triangle(TrianglePrimitive),
    Quad(QuadPrimitive),
    Sphere(SpherePrimitive),
    Instance(InstancePrimitive),
}

impl Primitive {
    /// Intersects with a ray at shutter `time`. Returns the hit distance
    /// and the intrinsic parametric UV, or `None` on a miss (including
    /// hits below the numerical tolerance).
    pub fn intersect(&self, from: Point3f, dir: Vec3f, time: Float) -> Option<(Float, Uv)> {
        match self {
            Primitive::Triangle(p) => p.intersect_with(from, dir, time, None),
            Primitive::Quad(p) => p.intersect_with(from, dir, time, None),
            Primitive::Sphere(p) => p.intersect(from, dir),
            Primitive::Instance(p) => p.intersect(from, dir, time),
        }
    }

    /// Conservative world bound over the whole shutter interval.
    pub fn bound(&self) -> Bounds3f {
        match self {
            Primitive::Triangle(p) => p.bound_with(None),
            Primitive::Quad(p) => p.bound_with(None),
            Primitive::Sphere(p) => p.bound(),
            Primitive::Instance(p) => p.bound(),
        }
    }

    pub fn geometric_normal(&self, uv: Uv, time: Float) -> Vec3f {
        match self {
            Primitive::Triangle(p) => p.geometric_normal_with(time, None),
            Primitive::Quad(p) => p.geometric_normal_with(time, None),
            Primitive::Sphere(p) => p.geometric_normal(uv),
            Primitive::Instance(p) => p.geometric_normal(uv, time),
        }
    }

    /// Builds the full shading-ready surface point for a confirmed hit.
    pub fn surface(
        &self,
        hit_point: Point3f,
        uv: Uv,
        time: Float,
        diff: Option<&RayDifferentials>,
        prim_num: usize,
    ) -> SurfacePoint {
        match self {
            Primitive::Triangle(p) => p.surface_with(hit_point, uv, time, diff, prim_num, None),
            Primitive::Quad(p) => p.surface_with(hit_point, uv, time, diff, prim_num, None),
            Primitive::Sphere(p) => p.surface(hit_point, uv, time, diff, prim_num),
            Primitive::Instance(p) => p.surface(hit_point, uv, time, diff, prim_num),
        }
    }

    /// Uniform area sample; returns a surface point and its normal.
    pub fn sample_point(&self, uv: Uv, time: Float) -> (Point3f, Vec3f) {
        match self {
            Primitive::Triangle(p) => p.sample_with(uv, time, None),
            Primitive::Quad(p) => p.sample_with(uv, time, None),
            Primitive::Sphere(p) => p.sample_point(uv),
            Primitive::Instance(p) => p.sample_point(uv, time),
        }
    }

    pub fn surface_area(&self, time: Float) -> Float {
        match self {
            Primitive::Triangle(p) => p.area_with(time, None),
            Primitive::Quad(p) => p.area_with(time, None),
            Primitive::Sphere(p) => p.surface_area(),
            Primitive::Instance(p) => p.surface_area(time),
        }
    }

    pub fn material_id(&self) -> MaterialId {
        match self {
            Primitive::Triangle(p) => p.material_id(),
            Primitive::Quad(p) => p.material_id(),
            Primitive::Sphere(p) => p.material_id,
            Primitive::Instance(p) => p.base().material_id(),
        }
    }

    pub fn object_id(&self) -> ObjectId {
        match self {
            Primitive::Triangle(p) => p.object_id(),
            Primitive::Quad(p) => p.object_id(),
            Primitive::Sphere(p) => p.object_id,
            Primitive::Instance(p) => p.base().object_id(),
        }
    }

    /// The light associated with this primitive's object, if it acts as an
    /// emitter for light sampling.
    pub fn light_id(&self) -> Option<LightId> {
        match self {
            Primitive::Triangle(p) => p.light_id(),
            Primitive::Quad(p) => p.light_id(),
            Primitive::Sphere(_) => None,
            Primitive::Instance(p) => p.base().light_id(),
        }
    }

    /// Whether the primitive can be clipped against an AABB during
    /// acceleration-structure construction. Deforming and instanced
    /// primitives cannot.
    pub fn clipping_support(&self) -> bool {
        match self {
            Primitive::Triangle(p) => !p.has_motion_blur(),
            Primitive::Quad(p) => !p.has_motion_blur(),
            Primitive::Sphere(_) => false,
            Primitive::Instance(_) => false,
        }
    }

    /// Clips the primitive to `bound` and returns the tightened box, or
    /// `None` if the primitive does not overlap it.
    pub fn clip_to_bound(&self, bound: &Bounds3f) -> Option<Bounds3f> {
        match self {
            Primitive::Triangle(p) => clip::clip_polygon_to_bound(&p.vertices_f64(), bound),
            Primitive::Quad(p) => clip::clip_polygon_to_bound(&p.vertices_f64(), bound),
            _ => None,
        }
    }

    /// Zero-area primitives are kept in the scene but skipped by the
    /// accelerator.
    pub fn is_degenerate(&self) -> bool {
        match self {
            Primitive::Triangle(p) => p.area_with(0.0, None) <= 0.0,
            Primitive::Quad(p) => p.area_with(0.0, None) <= 0.0,
            Primitive::Sphere(p) => p.radius <= 0.0,
            Primitive::Instance(p) => p.base().is_degenerate(),
        }
    }

    /// World-space distance from the hit to the nearest face edge; used by
    /// wireframe shading.
    pub fn dist_to_nearest_edge(&self, uv: Uv, dp_du_abs: Vec3f, dp_dv_abs: Vec3f) -> Float {
        match self {
            Primitive::Triangle(_) => {
                crate::shape::ShapeTriangle::dist_to_nearest_edge(uv, dp_du_abs, dp_dv_abs)
            }
            Primitive::Quad(_) => {
                crate::shape::ShapeQuad::dist_to_nearest_edge(uv, dp_du_abs, dp_dv_abs)
            }
            Primitive::Sphere(_) => Float::MAX,
            Primitive::Instance(p) => p.base().dist_to_nearest_edge(uv, dp_du_abs, dp_dv_abs),
        }
    }
}
