pub mod caustic;
pub mod direct;

pub use direct::DirectLightIntegrator;

use crate::color::Rgb;
use crate::geometry::ray::Ray;
use crate::geometry::surface::SurfacePoint;
use crate::light::Light;
use crate::material::{BsdfFlags, Material};
use crate::photon::PhotonMap;
use crate::sampler::PixelSampler;
use crate::sampling::power_heuristic;
use crate::scene::{LightId, ParamMap, Scene};
use crate::{abs_dot, DiffRay, Float, Point2i, Rgba};
use anyhow::Result;
use cgmath::InnerSpace;

/// Per-sample integration context threaded through the recursion.
pub struct RenderState {
    pub sampler: PixelSampler,
    pub pixel: Point2i,
    pub pass: usize,
    pub raylevel: i32,
    /// Did the previous bounce leave through a delta lobe? Emitted
    /// radiance is only collected on camera rays and specular chains,
    /// everything else is covered by next-event estimation.
    pub specular_bounce: bool,
    pub light_sample_multiplier: Float,
    pub indirect_sample_multiplier: Float,
    /// Auxiliary layer values captured at the primary hit.
    pub aux_depth: Float,
    pub aux_normal: crate::Vec3f,
    pub aux_object: Float,
}

impl RenderState {
    pub fn new(pixel: Point2i, sampler: PixelSampler, pass: usize) -> Self {
        Self {
            sampler,
            pixel,
            pass,
            raylevel: 0,
            specular_bounce: false,
            light_sample_multiplier: 1.0,
            indirect_sample_multiplier: 1.0,
            aux_depth: 0.0,
            aux_normal: crate::Vec3f::new(0.0, 0.0, 0.0),
            aux_object: 0.0,
        }
    }
}

/// A surface integrator turns primary rays into radiance estimates.
pub trait SurfaceIntegrator: Send + Sync {
    fn name(&self) -> &'static str;

    /// Runs before any tile is rendered; photon maps are built here.
    fn preprocess(&mut self, scene: &Scene, num_threads: usize) -> Result<()>;

    /// Called at the start of each pass.
    fn pre_pass(&mut self, _pass: usize, _scene: &Scene) {}

    fn integrate(&self, scene: &Scene, dray: &mut DiffRay, state: &mut RenderState) -> Rgba;
}

/// Builds an integrator from a typed parameter map.
pub fn integrator_from_params(
    params: &ParamMap,
) -> Result<Box<dyn SurfaceIntegrator>, crate::scene::ResultFlags> {
    let type_name = params.require_string("type")?;
    match type_name.as_str() {
        "directlighting" | "direct" => Ok(Box::new(DirectLightIntegrator::from_params(params))),
        _ => Err(crate::scene::ResultFlags::ERROR_TYPE_UNKNOWN),
    }
}

/// Visibility factor toward a light sample: `None` when fully occluded,
/// otherwise the (possibly tinted) transmittance.
fn shadow_transmittance(
    scene: &Scene,
    light: &dyn Light,
    ray: &Ray,
    transparent_shadows: bool,
    shadow_depth: usize,
) -> Option<Rgb> {
    if !light.cast_shadows() {
        return Some(Rgb::WHITE);
    }
    if transparent_shadows {
        scene.transmittance(ray, ray.tmax, shadow_depth)
    } else if scene.is_shadowed(ray, ray.tmax) {
        None
    } else {
        Some(Rgb::WHITE)
    }
}

/// Direct lighting at `sp` summed over every enabled light: Dirac lights
/// take a single shadow ray, area-style lights run MIS between light
/// sampling and BSDF sampling with the power heuristic.
#[allow(clippy::too_many_arguments)]
pub fn estimate_all_direct(
    scene: &Scene,
    sp: &SurfacePoint,
    wo: crate::Vec3f,
    material: &dyn Material,
    state: &mut RenderState,
    transparent_shadows: bool,
    shadow_depth: usize,
) -> Rgb {
    let mut col = Rgb::BLACK;
    let surviving = BsdfFlags::ALL_SCATTER & !BsdfFlags::SPECULAR;
    let time = sp.time;

    for (li, light) in scene.lights().iter().enumerate() {
        if !light.enabled() || light.photon_only() {
            continue;
        }
        let light_id = LightId(li);

        if light.is_delta() {
            let s = match light.illum_sample(sp.p, 0.0, 0.0, time) {
                Some(s) => s,
                None => continue,
            };
            let wi = s.ray.dir;
            let f = material.eval(sp, wo, wi, surviving);
            if f.is_black() {
                continue;
            }
            let shadow_ray = if s.ray.tmax.is_finite() {
                sp.spawn_ray_to(s.ray.at(s.ray.tmax))
            } else {
                sp.spawn_ray(wi)
            };
            let vis = match shadow_transmittance(scene, light.as_ref(), &shadow_ray, transparent_shadows, shadow_depth) {
                Some(v) => v,
                None => continue,
            };
            col += f * s.col * vis * (abs_dot(wi, sp.n) / s.pdf);
        } else {
            let n_samples = ((light.num_samples() as Float * state.light_sample_multiplier).ceil()
                as usize)
                .max(1);
            let mut accum = Rgb::BLACK;
            for _ in 0..n_samples {
                // light-sampling half of the estimator
                let u = state.sampler.get_2d();
                if let Some(s) = light.illum_sample(sp.p, u.x, u.y, time) {
                    if s.pdf > 0.0 && !s.col.is_black() {
                        let wi = s.ray.dir;
                        let f = material.eval(sp, wo, wi, surviving);
                        if !f.is_black() {
                            let shadow_ray = if s.ray.tmax.is_finite() {
                                sp.spawn_ray_to(s.ray.at(s.ray.tmax))
                            } else {
                                sp.spawn_ray(wi)
                            };
                            if let Some(vis) = shadow_transmittance(
                                scene,
                                light.as_ref(),
                                &shadow_ray,
                                transparent_shadows,
                                shadow_depth,
                            ) {
                                let bsdf_pdf = material.pdf(sp, wo, wi, surviving);
                                let weight = power_heuristic(1.0, s.pdf, 1.0, bsdf_pdf);
                                accum += f * s.col * vis * (abs_dot(wi, sp.n) * weight / s.pdf);
                            }
                        }
                    }
                }

                // BSDF-sampling half
                let ub = state.sampler.get_2d();
                if let Some(bs) = material.sample(sp, wo, ub.x, ub.y, surviving) {
                    if bs.pdf > 0.0 && !bs.col.is_black() {
                        if let Some((li_col, light_pdf)) =
                            light_radiance_along(scene, light.as_ref(), light_id, sp, bs.wi)
                        {
                            if light_pdf > 0.0 {
                                let weight = power_heuristic(1.0, bs.pdf, 1.0, light_pdf);
                                accum +=
                                    bs.col * li_col * (abs_dot(bs.wi, sp.n) * weight / bs.pdf);
                            }
                        }
                    }
                }
            }
            col += accum * (1.0 / n_samples as Float);
        }
    }
    col
}

/// Radiance arriving from `light` along `wi` from `sp`, with the light's
/// sampling PDF for that configuration; `None` if the direction misses
/// the light or something occludes it.
fn light_radiance_along(
    scene: &Scene,
    light: &dyn Light,
    light_id: LightId,
    sp: &SurfacePoint,
    wi: crate::Vec3f,
) -> Option<(Rgb, Float)> {
    let ray = sp.spawn_ray(wi);

    // lights with an analytic surface (area quad, sun disk, environment)
    // intersect in direction space; scene geometry may still occlude them
    if let Some(li) = light.intersect(&ray) {
        if li.inv_pdf <= 0.0 {
            return None;
        }
        let t_max = if li.t > 0.0 { li.t } else { crate::INFINITY };
        if scene.is_shadowed(&ray, t_max) {
            return None;
        }
        return Some((li.col, 1.0 / li.inv_pdf));
    }

    // mesh-backed emitters resolve through the accelerator
    let dray = DiffRay::new(ray);
    let (hit_sp, _t) = scene.intersect(&dray)?;
    let prim = scene.prim(hit_sp.prim_num)?;
    if prim.light_id() != Some(light_id) {
        return None;
    }
    let material = scene.material(hit_sp.material_id);
    let emitted = material.emission(&hit_sp, -wi);
    if emitted.is_black() {
        return None;
    }
    let pdf = light.illum_pdf(sp.p, hit_sp.p, hit_sp.ng);
    Some((emitted, pdf))
}

/// Density estimate over the caustic photon map at a diffuse hit.
pub fn estimate_photons(
    map: &PhotonMap,
    sp: &SurfacePoint,
    wo: crate::Vec3f,
    material: &dyn Material,
    n_search: usize,
    radius: Float,
) -> Rgb {
    if map.is_empty() {
        return Rgb::BLACK;
    }
    let (found, radius2) = map.gather(sp.p, n_search, radius);
    if found.is_empty() || radius2 <= 0.0 {
        return Rgb::BLACK;
    }
    let mut sum = Rgb::BLACK;
    for f in &found {
        let photon = map.photon(f.index);
        // photons arriving from behind the surface do not contribute
        if photon.dir.dot(sp.n) >= 0.0 {
            continue;
        }
        let fr = material.eval(sp, wo, -photon.dir, BsdfFlags::DIFFUSE | BsdfFlags::REFLECT);
        if fr.is_black() {
            continue;
        }
        sum += fr * photon.col * PhotonMap::kernel(f.dist_squared, radius2);
    }
    sum
}
