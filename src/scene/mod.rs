pub mod background;
pub mod params;

pub use background::{Background, ConstantBackground, ImageBackground};
pub use params::{ParamMap, ResultFlags};

use crate::accel::KdTree;
use crate::color::Rgb;
use crate::geometry::bounds::Bounds3f;
use crate::geometry::instance::{Instance, InstanceBase};
use crate::geometry::mesh::MeshObject;
use crate::geometry::ray::{DiffRay, Ray};
use crate::geometry::surface::SurfacePoint;
use crate::light::{
    AreaLight, BackgroundLight, BackgroundPortalLight, DirectionalLight, IesData, IesLight, Light,
    ObjectLight, PointLight, SphereLight, SpotLight, SunLight,
};
use crate::material::{GlassMaterial, Material, MatteMaterial, MirrorMaterial};
use crate::primitive::{
    InstancePrimitive, Primitive, QuadPrimitive, SpherePrimitive, TrianglePrimitive,
};
use crate::{Float, Point3f, Vec3f, SHADOW_BIAS};
use anyhow::{anyhow, bail, Result};
use smallvec::SmallVec;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

macro_rules! id_type {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub struct $name(pub usize);
    };
}

id_type!(ObjectId);
id_type!(MaterialId);
id_type!(LightId);
id_type!(InstanceId);

/// A scene-owned geometry entity.
pub enum ObjectData {
    Mesh(Arc<MeshObject>),
    Sphere {
        center: Point3f,
        radius: Float,
        material_id: MaterialId,
    },
}

/// Everything the renderer consumes: geometry, materials, lights, the
/// environment, and (after `preprocess`) the acceleration structure.
/// Cross-entity references are integer ids into the typed collections.
pub struct Scene {
    objects: Vec<ObjectData>,
    object_names: HashMap<String, ObjectId>,
    materials: Vec<Arc<dyn Material>>,
    material_names: HashMap<String, MaterialId>,
    lights: Vec<Box<dyn Light>>,
    light_names: HashMap<String, LightId>,
    instances: Vec<Arc<Instance>>,
    background: Option<Arc<dyn Background>>,
    accel: Option<KdTree>,
    bound: Bounds3f,
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}

impl Scene {
    pub fn new() -> Self {
        let mut scene = Self {
            objects: Vec::new(),
            object_names: HashMap::new(),
            materials: Vec::new(),
            material_names: HashMap::new(),
            lights: Vec::new(),
            light_names: HashMap::new(),
            instances: Vec::new(),
            background: None,
            accel: None,
            bound: Bounds3f::empty(),
        };
        // material id 0 is the fallback gray
        let fallback: Arc<dyn Material> = Arc::new(MatteMaterial::new(Rgb::gray(0.7)));
        scene.materials.push(fallback);
        scene.material_names.insert("__default".to_string(), MaterialId(0));
        scene
    }

    // ---- entity creation --------------------------------------------------

    pub fn create_object(&mut self, name: &str, params: &ParamMap) -> (ResultFlags, Option<ObjectId>) {
        if self.object_names.contains_key(name) {
            return (ResultFlags::ERROR_DUPLICATE_NAME, None);
        }
        let type_name = params.get_string("type", "mesh");
        let id = ObjectId(self.objects.len());
        match type_name.as_str() {
            "mesh" => {
                let steps = params.get_int("num_time_steps", 1).max(1) as usize;
                let mut mesh = MeshObject::new(name, steps);
                let (start, end) = (
                    params.get_float("time_range_start", 0.0),
                    params.get_float("time_range_end", 1.0),
                );
                mesh.set_time_range(start, end);
                self.objects.push(ObjectData::Mesh(Arc::new(mesh)));
            }
            "sphere" => {
                let center = params.get_point("center", Point3f::new(0.0, 0.0, 0.0));
                let radius = params.get_float("radius", 1.0);
                self.objects.push(ObjectData::Sphere {
                    center,
                    radius,
                    material_id: MaterialId(0),
                });
            }
            other => {
                warn!(object = name, type_name = other, "unknown object type");
                return (ResultFlags::ERROR_TYPE_UNKNOWN, None);
            }
        }
        self.object_names.insert(name.to_string(), id);
        (ResultFlags::OK, Some(id))
    }

    pub fn create_material(&mut self, name: &str, params: &ParamMap) -> (ResultFlags, Option<MaterialId>) {
        if self.material_names.contains_key(name) {
            return (ResultFlags::ERROR_DUPLICATE_NAME, None);
        }
        let type_name = match params.require_string("type") {
            Ok(t) => t,
            Err(f) => return (f, None),
        };
        let material: Arc<dyn Material> = match type_name.as_str() {
            "matte" | "diffuse" => {
                let albedo = params.get_color("color", Rgb::gray(0.8));
                let emit = params.get_color("emit", Rgb::BLACK) * params.get_float("emit_power", 1.0);
                let transparency = params.get_color("transparency", Rgb::BLACK);
                Arc::new(MatteMaterial::emissive(albedo, emit).with_transparency(transparency))
            }
            "mirror" => {
                let reflectance = params.get_color("color", Rgb::gray(0.9));
                Arc::new(MirrorMaterial::new(reflectance))
            }
            "glass" => {
                let ior = params.get_float("ior", 1.5);
                let filter = params.get_color("filter_color", Rgb::WHITE);
                let mirror = params.get_color("mirror_color", Rgb::WHITE);
                Arc::new(GlassMaterial::new(ior, filter).with_mirror_color(mirror))
            }
            other => {
                warn!(material = name, type_name = other, "unknown material type");
                return (ResultFlags::ERROR_TYPE_UNKNOWN, None);
            }
        };
        let id = MaterialId(self.materials.len());
        self.materials.push(material);
        self.material_names.insert(name.to_string(), id);
        (ResultFlags::OK, Some(id))
    }

    pub fn create_light(&mut self, name: &str, params: &ParamMap) -> (ResultFlags, Option<LightId>) {
        if self.light_names.contains_key(name) {
            return (ResultFlags::ERROR_DUPLICATE_NAME, None);
        }
        let type_name = match params.require_string("type") {
            Ok(t) => t,
            Err(f) => return (f, None),
        };
        let color = params.get_color("color", Rgb::WHITE);
        let power = params.get_float("power", 1.0);
        let samples = params.get_int("samples", 4).max(1) as usize;

        let mut light: Box<dyn Light> = match type_name.as_str() {
            "point" => {
                let from = match params.require_vector("from") {
                    Ok(v) => Point3f::new(v.x, v.y, v.z),
                    Err(f) => return (f, None),
                };
                Box::new(PointLight::new(from, color, power))
            }
            "spot" => {
                let from = params.get_point("from", Point3f::new(0.0, 1.0, 0.0));
                let to = params.get_point("to", Point3f::new(0.0, 0.0, 0.0));
                let cone = params.get_float("cone_angle", 45.0);
                let falloff = params.get_float("blend", 0.15);
                Box::new(SpotLight::new(from, to, color, power, cone, falloff))
            }
            "directional" => {
                let dir = match params.require_vector("direction") {
                    Ok(v) => v,
                    Err(f) => return (f, None),
                };
                Box::new(DirectionalLight::new(dir, color, power))
            }
            "sun" => {
                let dir = match params.require_vector("direction") {
                    Ok(v) => v,
                    Err(f) => return (f, None),
                };
                let angle = params.get_float("angle", 0.27);
                Box::new(SunLight::new(dir, color, power, angle, samples))
            }
            "area" | "arealight" => {
                let corner = params.get_point("corner", Point3f::new(0.0, 0.0, 0.0));
                let p1 = params.get_point("point1", Point3f::new(1.0, 0.0, 0.0));
                let p2 = params.get_point("point2", Point3f::new(0.0, 0.0, 1.0));
                Box::new(AreaLight::new(corner, p1, p2, color, power, samples))
            }
            "sphere" | "spherelight" => {
                let center = params.get_point("from", Point3f::new(0.0, 0.0, 0.0));
                let radius = params.get_float("radius", 1.0);
                Box::new(SphereLight::new(center, radius, color, power, samples))
            }
            "object" | "objectlight" => {
                let obj_name = match params.require_string("object_name") {
                    Ok(v) => v,
                    Err(f) => return (f, None),
                };
                let object_id = match self.object_names.get(&obj_name) {
                    Some(id) => *id,
                    None => {
                        warn!(light = name, object = obj_name.as_str(), "object light references unknown object");
                        return (ResultFlags::ERROR_WHILE_CREATING, None);
                    }
                };
                let double_sided = params.get_bool("double_sided", false);
                Box::new(ObjectLight::new(object_id, color, power, samples, double_sided))
            }
            "background" | "bglight" => {
                let abs_intersect = params.get_bool("abs_intersect", false);
                Box::new(BackgroundLight::new(samples, abs_intersect))
            }
            "background_portal" | "bgportallight" => {
                let obj_name = match params.require_string("object_name") {
                    Ok(v) => v,
                    Err(f) => return (f, None),
                };
                let object_id = match self.object_names.get(&obj_name) {
                    Some(id) => *id,
                    None => {
                        warn!(light = name, object = obj_name.as_str(), "portal light references unknown object");
                        return (ResultFlags::ERROR_WHILE_CREATING, None);
                    }
                };
                Box::new(BackgroundPortalLight::new(object_id, power, samples))
            }
            "ies" => {
                let from = params.get_point("from", Point3f::new(0.0, 1.0, 0.0));
                let to = params.get_point("to", Point3f::new(0.0, 0.0, 0.0));
                // the photometric table arrives pre-parsed from the host
                Box::new(IesLight::new(from, to, color, power, samples, IesData::isotropic()))
            }
            other => {
                warn!(light = name, type_name = other, "unknown light type");
                return (ResultFlags::ERROR_TYPE_UNKNOWN, None);
            }
        };

        apply_light_overrides(light.as_mut(), params);
        let id = LightId(self.lights.len());
        self.lights.push(light);
        self.light_names.insert(name.to_string(), id);

        // mesh-backed emitters link back so BSDF-sampled hits find them
        if let Ok(obj_name) = params.require_string("object_name") {
            if let Some(&obj_id) = self.object_names.get(&obj_name) {
                if let ObjectData::Mesh(mesh) = &mut self.objects[obj_id.0] {
                    if let Some(m) = Arc::get_mut(mesh) {
                        m.set_light(id);
                    }
                }
            }
        }
        (ResultFlags::OK, Some(id))
    }

    pub fn create_background(&mut self, params: &ParamMap) -> ResultFlags {
        let type_name = match params.require_string("type") {
            Ok(t) => t,
            Err(f) => return f,
        };
        match type_name.as_str() {
            "constant" => {
                self.background = Some(Arc::new(ConstantBackground::from_params(params)));
                ResultFlags::OK
            }
            other => {
                warn!(type_name = other, "unknown background type");
                ResultFlags::ERROR_TYPE_UNKNOWN
            }
        }
    }

    pub fn set_background(&mut self, bg: Arc<dyn Background>) {
        self.background = Some(bg);
    }

    pub fn create_instance(&mut self) -> InstanceId {
        let id = InstanceId(self.instances.len());
        self.instances.push(Arc::new(Instance::new()));
        id
    }

    pub fn add_instance_object(&mut self, instance: InstanceId, object: ObjectId) -> Result<()> {
        self.instance_mut(instance)?.add_object(object);
        Ok(())
    }

    pub fn add_instance_of_instance(&mut self, instance: InstanceId, base: InstanceId) -> Result<()> {
        if instance == base {
            bail!("instance cannot contain itself");
        }
        self.instance_mut(instance)?.add_instance(base);
        Ok(())
    }

    pub fn add_instance_matrix(
        &mut self,
        instance: InstanceId,
        m: [[Float; 4]; 4],
        transpose: bool,
        time: Float,
    ) -> Result<()> {
        self.instance_mut(instance)?
            .add_matrix(crate::Matrix4f::from_rows(m, transpose), time);
        Ok(())
    }

    fn instance_mut(&mut self, id: InstanceId) -> Result<&mut Instance> {
        let arc = self
            .instances
            .get_mut(id.0)
            .ok_or_else(|| anyhow!("unknown instance id {:?}", id))?;
        Arc::get_mut(arc).ok_or_else(|| anyhow!("instance {:?} already finalized", id))
    }

    // ---- mesh assembly ----------------------------------------------------

    pub fn mesh_mut(&mut self, id: ObjectId) -> Result<&mut MeshObject> {
        match self.objects.get_mut(id.0) {
            Some(ObjectData::Mesh(mesh)) => {
                Arc::get_mut(mesh).ok_or_else(|| anyhow!("object {:?} already finalized", id))
            }
            Some(ObjectData::Sphere { .. }) => bail!("object {:?} is not a mesh", id),
            None => bail!("unknown object id {:?}", id),
        }
    }

    pub fn add_vertex(&mut self, id: ObjectId, p: Point3f) -> Result<u32> {
        Ok(self.mesh_mut(id)?.add_vertex(p))
    }

    pub fn add_vertex_with_orco(&mut self, id: ObjectId, p: Point3f, orco: Point3f) -> Result<u32> {
        Ok(self.mesh_mut(id)?.add_vertex_with_orco(p, orco))
    }

    pub fn add_vertex_time_step(&mut self, id: ObjectId, p: Point3f, step: usize) -> Result<()> {
        self.mesh_mut(id)?.add_vertex_time_step(p, step)
    }

    pub fn add_normal(&mut self, id: ObjectId, n: Vec3f) -> Result<u32> {
        Ok(self.mesh_mut(id)?.add_normal(n))
    }

    pub fn add_normal_time_step(&mut self, id: ObjectId, n: Vec3f, step: usize) -> Result<()> {
        self.mesh_mut(id)?.add_normal_time_step(n, step)
    }

    pub fn add_uv(&mut self, id: ObjectId, uv: crate::Uv) -> Result<u32> {
        Ok(self.mesh_mut(id)?.add_uv(uv))
    }

    pub fn add_triangle(&mut self, id: ObjectId, v: [u32; 3]) -> Result<()> {
        self.mesh_mut(id)?.add_triangle(v);
        Ok(())
    }

    pub fn add_triangle_uv(&mut self, id: ObjectId, v: [u32; 3], uv: [u32; 3]) -> Result<()> {
        self.mesh_mut(id)?.add_triangle_uv(v, uv);
        Ok(())
    }

    pub fn add_quad(&mut self, id: ObjectId, v: [u32; 4]) -> Result<()> {
        self.mesh_mut(id)?.add_quad(v);
        Ok(())
    }

    pub fn add_quad_uv(&mut self, id: ObjectId, v: [u32; 4], uv: [u32; 4]) -> Result<()> {
        self.mesh_mut(id)?.add_quad_uv(v, uv);
        Ok(())
    }

    pub fn smooth_object(&mut self, id: ObjectId, angle_deg: Float) -> Result<()> {
        self.mesh_mut(id)?.smooth(angle_deg);
        Ok(())
    }

    /// Assigns the object's material and validates its attribute arrays.
    pub fn init_object(&mut self, id: ObjectId, material: MaterialId) -> Result<()> {
        if material.0 >= self.materials.len() {
            bail!("unknown material id {:?}", material);
        }
        match self.objects.get_mut(id.0) {
            Some(ObjectData::Mesh(mesh)) => {
                let m = Arc::get_mut(mesh)
                    .ok_or_else(|| anyhow!("object {:?} already finalized", id))?;
                m.set_material(material);
                m.finalize()
            }
            Some(ObjectData::Sphere { material_id, .. }) => {
                *material_id = material;
                Ok(())
            }
            None => bail!("unknown object id {:?}", id),
        }
    }

    // ---- lookups ----------------------------------------------------------

    pub fn object_id(&self, name: &str) -> Option<ObjectId> {
        self.object_names.get(name).copied()
    }

    pub fn material_id(&self, name: &str) -> Option<MaterialId> {
        self.material_names.get(name).copied()
    }

    pub fn object(&self, id: ObjectId) -> Option<&ObjectData> {
        self.objects.get(id.0)
    }

    pub fn object_mesh(&self, id: ObjectId) -> Option<&Arc<MeshObject>> {
        match self.objects.get(id.0) {
            Some(ObjectData::Mesh(mesh)) => Some(mesh),
            _ => None,
        }
    }

    pub fn material(&self, id: MaterialId) -> &Arc<dyn Material> {
        self.materials.get(id.0).unwrap_or(&self.materials[0])
    }

    pub fn lights(&self) -> &[Box<dyn Light>] {
        &self.lights
    }

    pub fn light(&self, id: LightId) -> Option<&dyn Light> {
        self.lights.get(id.0).map(|l| l.as_ref())
    }

    pub fn background(&self) -> Option<&Arc<dyn Background>> {
        self.background.as_ref()
    }

    pub fn bound(&self) -> Bounds3f {
        self.bound
    }

    pub fn accel(&self) -> Option<&KdTree> {
        self.accel.as_ref()
    }

    pub fn prim(&self, index: usize) -> Option<&Primitive> {
        self.accel.as_ref().map(|a| a.prim(index))
    }

    // ---- preprocessing ----------------------------------------------------

    /// Builds the primitive soup (meshes, spheres, flattened instances),
    /// the kd-tree and the scene bound, then lets every light resolve its
    /// scene-dependent state.
    pub fn preprocess(&mut self, num_threads: usize) -> Result<()> {
        let mut prims: Vec<Primitive> = Vec::new();
        for (i, obj) in self.objects.iter().enumerate() {
            let object_id = ObjectId(i);
            match obj {
                ObjectData::Mesh(mesh) => {
                    mesh.finalize()?;
                    push_mesh_primitives(mesh, object_id, &mut prims);
                }
                ObjectData::Sphere {
                    center,
                    radius,
                    material_id,
                } => {
                    prims.push(Primitive::Sphere(SpherePrimitive::new(
                        *center,
                        *radius,
                        *material_id,
                        object_id,
                    )));
                }
            }
        }

        for (i, _) in self.instances.iter().enumerate() {
            let mut visiting = Vec::new();
            let mut chain = SmallVec::new();
            self.flatten_instance(InstanceId(i), &mut chain, &mut visiting, &mut prims)?;
        }

        info!(primitives = prims.len(), threads = num_threads, "building scene accelerator");
        let accel = KdTree::build(prims, num_threads);
        self.bound = accel.bound();
        self.accel = Some(accel);

        let mut lights = std::mem::replace(&mut self.lights, Vec::new());
        for light in &mut lights {
            light.init(self)?;
        }
        self.lights = lights;
        Ok(())
    }

    fn flatten_instance(
        &self,
        id: InstanceId,
        chain: &mut SmallVec<[Arc<Instance>; 2]>,
        visiting: &mut Vec<InstanceId>,
        out: &mut Vec<Primitive>,
    ) -> Result<()> {
        if visiting.contains(&id) {
            bail!("instance cycle detected at {:?}", id);
        }
        let instance = self
            .instances
            .get(id.0)
            .ok_or_else(|| anyhow!("unknown instance id {:?}", id))?;
        instance.finalize()?;
        visiting.push(id);
        chain.push(Arc::clone(instance));

        for base in instance.base_ids() {
            match base {
                InstanceBase::Object(obj_id) => {
                    let mut base_prims = Vec::new();
                    match self.objects.get(obj_id.0) {
                        Some(ObjectData::Mesh(mesh)) => {
                            push_mesh_primitives(mesh, *obj_id, &mut base_prims)
                        }
                        Some(ObjectData::Sphere {
                            center,
                            radius,
                            material_id,
                        }) => base_prims.push(Primitive::Sphere(SpherePrimitive::new(
                            *center,
                            *radius,
                            *material_id,
                            *obj_id,
                        ))),
                        None => bail!("instance {:?} references unknown object {:?}", id, obj_id),
                    }
                    for p in base_prims {
                        out.push(Primitive::Instance(InstancePrimitive::new(p, chain.clone())));
                    }
                }
                InstanceBase::Instance(inner) => {
                    self.flatten_instance(*inner, chain, visiting, out)?;
                }
            }
        }

        chain.pop();
        visiting.pop();
        Ok(())
    }

    // ---- ray queries ------------------------------------------------------

    /// Closest intersection along a differential ray, with the
    /// shading-ready surface point.
    pub fn intersect(&self, dray: &DiffRay) -> Option<(SurfacePoint, Float)> {
        let accel = self.accel.as_ref()?;
        let hit = accel.intersect(&dray.ray, dray.ray.tmax)?;
        let prim = accel.prim(hit.prim_index);
        let hit_p = dray.ray.at(hit.t);
        let sp = prim.surface(hit_p, hit.uv, dray.ray.time, dray.diff.as_ref(), hit.prim_index);
        Some((sp, hit.t))
    }

    /// Opaque shadow query.
    pub fn is_shadowed(&self, ray: &Ray, tmax: Float) -> bool {
        match &self.accel {
            Some(accel) => accel.any_hit(ray, tmax),
            None => false,
        }
    }

    /// Transparent shadow query: walks through transparent surfaces
    /// accumulating their filter colors. `None` means fully occluded.
    /// Each crossed layer advances the ray start by a bias that grows
    /// with layer depth.
    pub fn transmittance(&self, ray: &Ray, tmax: Float, max_layers: usize) -> Option<Rgb> {
        let accel = match &self.accel {
            Some(a) => a,
            None => return Some(Rgb::WHITE),
        };
        let mut filter = Rgb::WHITE;
        let mut t_cur = ray.tmin;
        for layer in 0..=max_layers {
            let probe = Ray::with_range(ray.from, ray.dir, ray.time, t_cur, tmax);
            match accel.intersect(&probe, tmax) {
                None => return Some(filter),
                Some(hit) => {
                    let prim = accel.prim(hit.prim_index);
                    let material = self.material(prim.material_id());
                    if !material.is_transparent() {
                        return None;
                    }
                    let sp = prim.surface(probe.at(hit.t), hit.uv, probe.time, None, hit.prim_index);
                    filter *= material.transparency(&sp, -ray.dir);
                    if filter.is_black() {
                        return None;
                    }
                    t_cur = hit.t + SHADOW_BIAS * (1.0 + layer as Float);
                    if t_cur >= tmax {
                        return Some(filter);
                    }
                }
            }
        }
        None
    }

    /// Environment radiance for an escaped ray.
    pub fn background_radiance(&self, dir: Vec3f) -> Rgb {
        match &self.background {
            Some(bg) => bg.eval(dir),
            None => Rgb::BLACK,
        }
    }
}

fn push_mesh_primitives(mesh: &Arc<MeshObject>, object_id: ObjectId, out: &mut Vec<Primitive>) {
    for (fi, face) in mesh.faces().iter().enumerate() {
        if face.is_quad() {
            out.push(Primitive::Quad(QuadPrimitive::new(
                Arc::clone(mesh),
                fi as u32,
                object_id,
            )));
        } else {
            out.push(Primitive::Triangle(TrianglePrimitive::new(
                Arc::clone(mesh),
                fi as u32,
                object_id,
            )));
        }
    }
}

fn apply_light_overrides(light: &mut dyn Light, params: &ParamMap) {
    let base = light.base_mut();
    base.enabled = params.get_bool("light_enabled", base.enabled);
    base.cast_shadows = params.get_bool("cast_shadows", base.cast_shadows);
    base.shoot_caustic = params.get_bool("with_caustic", base.shoot_caustic);
    base.shoot_diffuse = params.get_bool("with_diffuse", base.shoot_diffuse);
    base.photon_only = params.get_bool("photon_only", base.photon_only);
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn unit_quad_scene() -> (Scene, ObjectId) {
        let mut scene = Scene::new();
        let mut params = ParamMap::new();
        params.set_string("type", "mesh");
        let (flags, id) = scene.create_object("floor", &params);
        assert!(flags.is_ok());
        let id = id.unwrap();
        let a = scene.add_vertex(id, Point3f::new(-1.0, 0.0, -1.0)).unwrap();
        let b = scene.add_vertex(id, Point3f::new(1.0, 0.0, -1.0)).unwrap();
        let c = scene.add_vertex(id, Point3f::new(1.0, 0.0, 1.0)).unwrap();
        let d = scene.add_vertex(id, Point3f::new(-1.0, 0.0, 1.0)).unwrap();
        scene.add_quad(id, [a, b, c, d]).unwrap();
        scene.init_object(id, MaterialId(0)).unwrap();
        (scene, id)
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let mut scene = Scene::new();
        let mut params = ParamMap::new();
        params.set_string("type", "mesh");
        let (f1, _) = scene.create_object("thing", &params);
        assert!(f1.is_ok());
        let (f2, id2) = scene.create_object("thing", &params);
        assert!(f2.contains(ResultFlags::ERROR_DUPLICATE_NAME));
        assert!(id2.is_none());
    }

    #[test]
    fn test_unknown_type_rejected() {
        let mut scene = Scene::new();
        let mut params = ParamMap::new();
        params.set_string("type", "nurbs");
        let (flags, _) = scene.create_object("patch", &params);
        assert!(flags.contains(ResultFlags::ERROR_TYPE_UNKNOWN));

        let mut lp = ParamMap::new();
        lp.set_string("type", "plasma");
        let (flags, _) = scene.create_light("l", &lp);
        assert!(flags.contains(ResultFlags::ERROR_TYPE_UNKNOWN));
    }

    #[test]
    fn test_missing_required_param() {
        let mut scene = Scene::new();
        let mut lp = ParamMap::new();
        lp.set_string("type", "point");
        // no "from"
        let (flags, id) = scene.create_light("key", &lp);
        assert!(flags.contains(ResultFlags::ERROR_PARAMS_MISSING));
        assert!(id.is_none());
    }

    #[test]
    fn test_preprocess_and_intersect() {
        let (mut scene, _) = unit_quad_scene();
        scene.preprocess(2).unwrap();
        let ray = Ray::new(Point3f::new(0.2, 1.0, 0.3), Vec3f::new(0.0, -1.0, 0.0), 0.0);
        let (sp, t) = scene.intersect(&DiffRay::new(ray)).unwrap();
        assert_relative_eq!(t, 1.0, epsilon = 1e-5);
        assert_relative_eq!(sp.ng.y.abs(), 1.0, epsilon = 1e-5);
        assert!(scene.is_shadowed(&ray, 2.0));
    }

    #[test]
    fn test_instance_roundtrip_intersection() {
        let (mut scene, obj) = unit_quad_scene();
        let inst = scene.create_instance();
        scene.add_instance_object(inst, obj).unwrap();
        let m = [
            [1.0, 0.0, 0.0, 10.0],
            [0.0, 1.0, 0.0, 0.0],
            [0.0, 0.0, 1.0, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ];
        scene.add_instance_matrix(inst, m, false, 0.0).unwrap();
        scene.preprocess(2).unwrap();

        // the original is still at the origin, the instance at x+10
        let ray_base = Ray::new(Point3f::new(0.0, 1.0, 0.0), Vec3f::new(0.0, -1.0, 0.0), 0.0);
        let ray_inst = Ray::new(Point3f::new(10.0, 1.0, 0.0), Vec3f::new(0.0, -1.0, 0.0), 0.0);
        let (_, t_base) = scene.intersect(&DiffRay::new(ray_base)).unwrap();
        let (sp, t_inst) = scene.intersect(&DiffRay::new(ray_inst)).unwrap();
        assert_relative_eq!(t_base, t_inst, epsilon = 1e-4);
        assert_relative_eq!(sp.p.x, 10.0, epsilon = 1e-4);
    }

    #[test]
    fn test_instance_cycle_detected() {
        let mut scene = Scene::new();
        let a = scene.create_instance();
        let b = scene.create_instance();
        scene.add_instance_of_instance(a, b).unwrap();
        scene.add_instance_of_instance(b, a).unwrap();
        scene
            .add_instance_matrix(a, [[1.0, 0.0, 0.0, 0.0], [0.0, 1.0, 0.0, 0.0], [0.0, 0.0, 1.0, 0.0], [0.0, 0.0, 0.0, 1.0]], false, 0.0)
            .unwrap();
        scene
            .add_instance_matrix(b, [[1.0, 0.0, 0.0, 0.0], [0.0, 1.0, 0.0, 0.0], [0.0, 0.0, 1.0, 0.0], [0.0, 0.0, 0.0, 1.0]], false, 0.0)
            .unwrap();
        assert!(scene.preprocess(1).is_err());
    }

    #[test]
    fn test_transparent_shadow_accumulates_filter() {
        let mut scene = Scene::new();
        let mut mp = ParamMap::new();
        mp.set_string("type", "matte");
        mp.set_color("color", Rgb::gray(0.5));
        mp.set_color("transparency", Rgb::new(0.5, 1.0, 1.0));
        let (_, mat) = scene.create_material("gel", &mp);
        let mat = mat.unwrap();

        let mut op = ParamMap::new();
        op.set_string("type", "mesh");
        let (_, id) = scene.create_object("pane", &op);
        let id = id.unwrap();
        let a = scene.add_vertex(id, Point3f::new(-1.0, 0.0, -1.0)).unwrap();
        let b = scene.add_vertex(id, Point3f::new(1.0, 0.0, -1.0)).unwrap();
        let c = scene.add_vertex(id, Point3f::new(1.0, 0.0, 1.0)).unwrap();
        let d = scene.add_vertex(id, Point3f::new(-1.0, 0.0, 1.0)).unwrap();
        scene.add_quad(id, [a, b, c, d]).unwrap();
        scene.init_object(id, mat).unwrap();
        scene.preprocess(1).unwrap();

        let ray = Ray::new(Point3f::new(0.0, 1.0, 0.0), Vec3f::new(0.0, -1.0, 0.0), 0.0);
        let filter = scene.transmittance(&ray, 2.0, 8).unwrap();
        assert_relative_eq!(filter.r, 0.5, epsilon = 1e-5);
        assert_relative_eq!(filter.g, 1.0, epsilon = 1e-5);
        // but the opaque query still reports a blocker
        assert!(scene.is_shadowed(&ray, 2.0));
    }
}
