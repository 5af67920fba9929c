use crate::color::Rgb;
use crate::material::BsdfFlags;
use crate::photon::{Photon, PhotonMap};
use crate::sampling::{fnv_hash, ri_lp, ri_s, ri_vdc, Pdf1D};
use crate::scene::Scene;
use crate::{abs_dot, DiffRay, Float};
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256Plus;
use tracing::{info, warn};

/// Photon paths give up after this many surface interactions.
const MAX_PHOTON_BOUNCES: usize = 10;

/// Shoots caustic photons from every caustic-enabled light and builds
/// the point kd-tree over their deposits. A photon is stored at the
/// first diffuse surface reached after at least one specular or glossy
/// interaction; paths that start diffuse terminate unstored.
pub fn create_caustic_map(scene: &Scene, n_photons: usize, num_threads: usize) -> PhotonMap {
    let lights: Vec<(usize, &dyn crate::light::Light)> = scene
        .lights()
        .iter()
        .enumerate()
        .filter(|(_, l)| l.enabled() && l.shoot_caustic())
        .map(|(i, l)| (i, l.as_ref()))
        .collect();

    if lights.is_empty() || n_photons == 0 {
        return PhotonMap::build(Vec::new(), 0, "caustic", num_threads);
    }

    let energies: Vec<Float> = lights
        .iter()
        .map(|(_, l)| l.total_energy().luminance())
        .collect();
    let light_pdf = Pdf1D::new(&energies);

    info!(
        photons = n_photons,
        lights = lights.len(),
        "shooting caustic photons"
    );

    let chunk = (n_photons / num_threads.max(1)).max(1);
    let ranges: Vec<(usize, usize)> = (0..n_photons)
        .step_by(chunk)
        .map(|start| (start, (start + chunk).min(n_photons)))
        .collect();

    let photons: Vec<Photon> = {
        use rayon::prelude::*;
        ranges
            .par_iter()
            .flat_map(|&(start, end)| {
                let mut local = Vec::new();
                for i in start..end {
                    trace_photon(scene, &lights, &light_pdf, i as u32, n_photons, &mut local);
                }
                local
            })
            .collect()
    };

    if photons.is_empty() {
        warn!("caustic pass stored no photons; map disabled");
    } else {
        info!(stored = photons.len(), "caustic photons stored");
    }
    PhotonMap::build(photons, n_photons, "caustic", num_threads)
}

fn trace_photon(
    scene: &Scene,
    lights: &[(usize, &dyn crate::light::Light)],
    light_pdf: &Pdf1D,
    index: u32,
    n_total: usize,
    out: &mut Vec<Photon>,
) {
    // four stratified dimensions for emission, scrambled per photon path
    let scramble = fnv_hash(index);
    let s_1 = ri_vdc(index, scramble);
    let s_2 = ri_s(index, fnv_hash(scramble));
    let s_3 = ri_lp(index, scramble ^ 0x7f7f_7f7f);
    let mut rng = Xoshiro256Plus::seed_from_u64(((scramble as u64) << 32) | index as u64);
    let s_4: Float = rng.gen();

    let mut pdf = 0.0;
    let picked = light_pdf.sample_discrete(s_3, &mut pdf);
    if pdf <= 0.0 {
        return;
    }
    let (_, light) = lights[picked];
    let emit = match light.emit_photon(s_1, s_2, s_3, s_4, rng.gen()) {
        Some(e) => e,
        None => return,
    };
    if emit.col.is_black() {
        return;
    }

    let mut power = emit.col * (emit.inv_pdf / (pdf * n_total as Float));
    let mut ray = emit.ray;
    let mut through_specular = false;

    for _bounce in 0..MAX_PHOTON_BOUNCES {
        let dray = DiffRay::new(ray);
        let (mut sp, _t) = match scene.intersect(&dray) {
            Some(hit) => hit,
            None => return,
        };
        let material = scene.material(sp.material_id).clone();
        sp.mat_data = material.init_data(&sp);
        let flags = material.flags();

        if flags.contains(BsdfFlags::DIFFUSE) && through_specular {
            out.push(Photon {
                pos: sp.p,
                dir: ray.dir,
                col: power,
            });
            return;
        }
        if flags.contains(BsdfFlags::DIFFUSE) && !through_specular {
            // a diffuse-first path can never form a caustic
            return;
        }

        let wo = -ray.dir;
        let bs = match material.sample(&sp, wo, rng.gen(), rng.gen(), BsdfFlags::ALL_SCATTER) {
            Some(bs) => bs,
            None => return,
        };
        if bs.pdf <= 0.0 || bs.col.is_black() {
            return;
        }
        power *= bs.col * (abs_dot(bs.wi, sp.n) / bs.pdf);
        if power.luminance() < 1e-6 {
            return;
        }
        if bs
            .flags
            .intersects(BsdfFlags::SPECULAR | BsdfFlags::GLOSSY | BsdfFlags::DISPERSIVE)
        {
            through_specular = true;
        }
        ray = sp.spawn_ray(bs.wi);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::{MaterialId, ParamMap};
    use crate::{Point3f, Vec3f};

    /// Glass panel between a point light and a diffuse floor: photons
    /// must refract through the panel and land on the floor.
    fn caustic_scene() -> Scene {
        let mut scene = Scene::new();

        let mut glass = ParamMap::new();
        glass.set_string("type", "glass");
        glass.set_float("ior", 1.5);
        let (_, glass_id) = scene.create_material("glass", &glass);
        let glass_id = glass_id.unwrap();

        let mut floor_mat = ParamMap::new();
        floor_mat.set_string("type", "matte");
        floor_mat.set_color("color", Rgb::gray(0.7));
        let (_, floor_id) = scene.create_material("floor", &floor_mat);
        let floor_id = floor_id.unwrap();

        // glass panel at y=2
        let mut op = ParamMap::new();
        op.set_string("type", "mesh");
        let (_, pane) = scene.create_object("pane", &op);
        let pane = pane.unwrap();
        let v: Vec<u32> = [
            Point3f::new(-2.0, 2.0, -2.0),
            Point3f::new(2.0, 2.0, -2.0),
            Point3f::new(2.0, 2.0, 2.0),
            Point3f::new(-2.0, 2.0, 2.0),
        ]
        .iter()
        .map(|p| scene.add_vertex(pane, *p).unwrap())
        .collect();
        scene.add_quad(pane, [v[0], v[1], v[2], v[3]]).unwrap();
        scene.init_object(pane, glass_id).unwrap();

        // diffuse floor at y=0
        let (_, floor) = scene.create_object("floor", &op);
        let floor = floor.unwrap();
        let v: Vec<u32> = [
            Point3f::new(-4.0, 0.0, -4.0),
            Point3f::new(4.0, 0.0, -4.0),
            Point3f::new(4.0, 0.0, 4.0),
            Point3f::new(-4.0, 0.0, 4.0),
        ]
        .iter()
        .map(|p| scene.add_vertex(floor, *p).unwrap())
        .collect();
        scene.add_quad(floor, [v[0], v[1], v[2], v[3]]).unwrap();
        scene.init_object(floor, floor_id).unwrap();

        let mut lp = ParamMap::new();
        lp.set_string("type", "point");
        lp.set_vector("from", Vec3f::new(0.0, 4.0, 0.0));
        lp.set_float("power", 50.0);
        scene.create_light("bulb", &lp);

        scene.preprocess(1).unwrap();
        scene
    }

    #[test]
    fn test_caustic_photons_deposited_on_floor() {
        let scene = caustic_scene();
        let map = create_caustic_map(&scene, 2000, 2);
        assert!(!map.is_empty(), "no caustic photons were stored");
        // deposits lie on the floor plane under the panel
        let (found, _) = map.gather(Point3f::new(0.0, 0.0, 0.0), 8, 3.0);
        assert!(!found.is_empty());
        for f in &found {
            let p = map.photon(f.index).pos;
            assert!(p.y.abs() < 1e-3, "photon off the floor at {:?}", p);
        }
    }

    #[test]
    fn test_no_caustic_lights_no_map() {
        let mut scene = Scene::new();
        let mut op = ParamMap::new();
        op.set_string("type", "mesh");
        let (_, id) = scene.create_object("tri", &op);
        let id = id.unwrap();
        let a = scene.add_vertex(id, Point3f::new(0.0, 0.0, 0.0)).unwrap();
        let b = scene.add_vertex(id, Point3f::new(1.0, 0.0, 0.0)).unwrap();
        let c = scene.add_vertex(id, Point3f::new(0.0, 1.0, 0.0)).unwrap();
        scene.add_triangle(id, [a, b, c]).unwrap();
        scene.init_object(id, MaterialId(0)).unwrap();
        scene.preprocess(1).unwrap();
        let map = create_caustic_map(&scene, 100, 1);
        assert!(map.is_empty());
    }
}
