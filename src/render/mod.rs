pub mod control;
pub mod monitor;

pub use control::{RenderControl, RenderPhase};
pub use monitor::ConsoleProgress;

use crate::camera::{Camera, CameraSample};
use crate::film::{ImageFilm, FlushFlags, ProgressMonitor, RenderArea, SampleLayers};
use crate::integrator::{RenderState, SurfaceIntegrator};
use crate::sampler::PixelSampler;
use crate::scene::Scene;
use crate::{Float, Point2f, Point2i, Rgba};
use anyhow::Result;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{info, info_span, warn};

/// Driver configuration.
pub struct RenderSettings {
    /// 0 selects the machine's logical CPU count.
    pub num_threads: usize,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self { num_threads: 0 }
    }
}

/// Orchestrates a full rendering: scene preprocessing, integrator
/// preprocessing, the multi-pass parallel tile loop, and the final
/// flush.
pub struct Renderer {
    integrator: Box<dyn SurfaceIntegrator>,
    settings: RenderSettings,
    control: Arc<RenderControl>,
}

impl Renderer {
    pub fn new(integrator: Box<dyn SurfaceIntegrator>, settings: RenderSettings) -> Self {
        Self {
            integrator,
            settings,
            control: Arc::new(RenderControl::new()),
        }
    }

    /// Shared handle for host-side cancellation.
    pub fn control(&self) -> Arc<RenderControl> {
        Arc::clone(&self.control)
    }

    fn thread_count(&self) -> usize {
        if self.settings.num_threads == 0 {
            num_cpus::get()
        } else {
            self.settings.num_threads
        }
    }

    /// Runs the full pipeline. On cancellation the film still holds a
    /// valid partial image and is flushed before returning.
    pub fn render(
        &mut self,
        scene: &mut Scene,
        film: &mut ImageFilm,
        camera: &dyn Camera,
        monitor: &mut dyn ProgressMonitor,
    ) -> Result<RenderPhase> {
        let span = info_span!("render");
        let _guard = span.enter();
        let num_threads = self.thread_count();
        self.control.reset();

        self.control.set_phase(RenderPhase::Preprocessing);
        scene.preprocess(num_threads)?;
        self.integrator.preprocess(scene, num_threads)?;

        let num_passes = film.aa.passes.max(1);
        film.init(num_passes);
        let total_work = film.num_areas() * num_passes;
        monitor.init(total_work);

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .build()?;

        self.control.set_phase(RenderPhase::Rendering);
        let progress = AtomicUsize::new(0);
        let monitor_shared = Mutex::new(monitor);

        for pass in 1..=num_passes {
            if self.control.is_canceled() {
                break;
            }
            self.integrator.pre_pass(pass, scene);
            let n_samples = film.pass_samples(pass);
            let (light_mult, indirect_mult) = film.sample_multipliers(pass);
            let sample_offset = film.base_sampling_offset() + film.sampling_offset();

            let scene_ref: &Scene = scene;
            let film_ref: &ImageFilm = film;
            let integrator: &dyn SurfaceIntegrator = self.integrator.as_ref();
            let control = &self.control;
            let progress_ref = &progress;
            let monitor_ref = &monitor_shared;

            pool.scope(|s| {
                for _ in 0..num_threads {
                    s.spawn(move |_| {
                        // identical tile-consumer loop on every worker
                        loop {
                            if control.is_canceled() {
                                break;
                            }
                            let area = match film_ref.next_area() {
                                Some(a) => a,
                                None => break,
                            };
                            render_tile(
                                scene_ref,
                                film_ref,
                                camera,
                                integrator,
                                &area,
                                pass,
                                n_samples,
                                sample_offset,
                                light_mult,
                                indirect_mult,
                            );
                            let done = progress_ref.fetch_add(1, Ordering::SeqCst) + 1;
                            monitor_ref.lock().update(done, total_work, "rendering");
                        }
                    });
                }
            });

            if self.control.is_canceled() {
                break;
            }
            if pass < num_passes {
                let adaptive = true;
                film.next_pass(adaptive, self.integrator.name());
            }
        }

        self.control.set_phase(RenderPhase::Flushing);
        film.flush(FlushFlags::ALL);
        monitor_shared.lock().done();

        let final_phase = if self.control.is_canceled() {
            warn!("render canceled; partial image flushed");
            RenderPhase::Canceled
        } else {
            info!("render finished");
            RenderPhase::Done
        };
        self.control.set_phase(final_phase);
        Ok(final_phase)
    }
}

/// Renders every scheduled pixel of one tile: stratified subpixel
/// samples, camera ray generation, integration, and filtered deposit
/// into the tile buffer.
#[allow(clippy::too_many_arguments)]
fn render_tile(
    scene: &Scene,
    film: &ImageFilm,
    camera: &dyn Camera,
    integrator: &dyn SurfaceIntegrator,
    area: &RenderArea,
    pass: usize,
    n_samples: usize,
    sample_offset: usize,
    light_mult: Float,
    indirect_mult: Float,
) {
    let mut tile = film.film_tile(area);
    let inv_sqrt_spp = 1.0 / (n_samples.max(1) as Float).sqrt();

    for (x, y) in area.bounds.iter_points() {
        if pass > 1 && !film.do_more_samples(x as usize, y as usize) {
            continue;
        }
        let pixel = Point2i::new(x, y);
        for i in 0..n_samples {
            let mut sampler = PixelSampler::new(pixel, sample_offset + i);
            let offset = sampler.image_offset();
            let p_film = Point2f::new(x as Float + offset.x, y as Float + offset.y);
            let cs = CameraSample {
                p_film,
                p_lens: sampler.lens_sample(),
                time: sampler.time_sample(),
            };
            let (weight, mut dray) = camera.generate_ray_differential(cs);
            let mut state = RenderState::new(pixel, sampler, pass);
            state.light_sample_multiplier = light_mult;
            state.indirect_sample_multiplier = indirect_mult;

            let value = if weight > 0.0 {
                dray.scale_differentials(inv_sqrt_spp);
                integrator.integrate(scene, &mut dray, &mut state) * weight
            } else {
                Rgba::TRANSPARENT_BLACK
            };

            film.add_sample(
                &mut tile,
                p_film,
                &SampleLayers {
                    combined: value,
                    depth: state.aux_depth,
                    normal: state.aux_normal,
                    object_index: state.aux_object,
                },
            );
        }
    }
    film.finish_area(area, tile);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::PerspectiveCamera;
    use crate::color::Rgb;
    use crate::film::{AaNoiseParams, FilterType, NullProgress, TilesOrder};
    use crate::integrator::DirectLightIntegrator;
    use crate::scene::ParamMap;
    use crate::{Point3f, Vec3f};

    fn cornell_ish_scene() -> Scene {
        let mut scene = Scene::new();
        let mut op = ParamMap::new();
        op.set_string("type", "mesh");
        let (_, floor) = scene.create_object("floor", &op);
        let floor = floor.unwrap();
        let a = scene.add_vertex(floor, Point3f::new(-2.0, 0.0, -2.0)).unwrap();
        let b = scene.add_vertex(floor, Point3f::new(2.0, 0.0, -2.0)).unwrap();
        let c = scene.add_vertex(floor, Point3f::new(2.0, 0.0, 2.0)).unwrap();
        let d = scene.add_vertex(floor, Point3f::new(-2.0, 0.0, 2.0)).unwrap();
        scene.add_quad(floor, [a, b, c, d]).unwrap();
        scene.init_object(floor, crate::scene::MaterialId(0)).unwrap();

        let mut lp = ParamMap::new();
        lp.set_string("type", "area");
        lp.set_vector("corner", Vec3f::new(-0.24, 1.98, -0.22));
        lp.set_vector("point1", Vec3f::new(0.23, 1.98, -0.22));
        lp.set_vector("point2", Vec3f::new(-0.24, 1.98, 0.16));
        lp.set_color("color", Rgb::WHITE);
        lp.set_float("power", 40.0);
        lp.set_int("samples", 4);
        scene.create_light("panel", &lp);
        scene
    }

    fn small_film(passes: usize, samples: usize) -> ImageFilm {
        let mut aa = AaNoiseParams::default();
        aa.samples = samples;
        aa.passes = passes;
        aa.inc_samples = samples.max(1);
        ImageFilm::new(32, 32, FilterType::Box, 1.0, 16, TilesOrder::Linear, aa)
    }

    fn camera() -> PerspectiveCamera {
        PerspectiveCamera::new(
            Point3f::new(0.0, 1.0, 4.0),
            Point3f::new(0.0, 0.5, 0.0),
            Vec3f::new(0.0, 1.0, 0.0),
            60.0,
            32,
            32,
        )
    }

    #[test]
    fn test_render_produces_finite_image() {
        let mut scene = cornell_ish_scene();
        let mut film = small_film(1, 4);
        let cam = camera();
        let mut renderer = Renderer::new(
            Box::new(DirectLightIntegrator::new(3)),
            RenderSettings { num_threads: 2 },
        );
        let mut monitor = NullProgress::default();
        let phase = renderer
            .render(&mut scene, &mut film, &cam, &mut monitor)
            .unwrap();
        assert_eq!(phase, RenderPhase::Done);
        let img = film.resolved_combined();
        assert!(img.iter().all(|p| p.is_finite()));
        // some pixel actually received light
        assert!(img.iter().any(|p| p.col.luminance() > 0.0));
        assert!(monitor.updates > 0);
    }

    #[test]
    fn test_deterministic_across_thread_counts() {
        let cam = camera();
        let render_with = |threads: usize| {
            let mut scene = cornell_ish_scene();
            let mut film = small_film(1, 4);
            let mut renderer = Renderer::new(
                Box::new(DirectLightIntegrator::new(3)),
                RenderSettings { num_threads: threads },
            );
            let mut monitor = NullProgress::default();
            renderer
                .render(&mut scene, &mut film, &cam, &mut monitor)
                .unwrap();
            film.resolved_combined()
        };
        let single = render_with(1);
        let multi = render_with(4);
        for (a, b) in single.iter().zip(multi.iter()) {
            assert_eq!(a.col.r.to_bits(), b.col.r.to_bits());
            assert_eq!(a.col.g.to_bits(), b.col.g.to_bits());
            assert_eq!(a.col.b.to_bits(), b.col.b.to_bits());
        }
    }

    #[test]
    fn test_cancellation_yields_partial_valid_film() {
        let mut scene = cornell_ish_scene();
        let mut film = small_film(16, 8);
        let cam = camera();
        let mut renderer = Renderer::new(
            Box::new(DirectLightIntegrator::new(3)),
            RenderSettings { num_threads: 2 },
        );
        let control = renderer.control();
        control.cancel(); // cancel before the first tile
        let mut monitor = NullProgress::default();
        let phase = renderer
            .render(&mut scene, &mut film, &cam, &mut monitor)
            .unwrap();
        assert_eq!(phase, RenderPhase::Canceled);
        let img = film.resolved_combined();
        assert!(img.iter().all(|p| p.is_finite()));
        assert!(img.iter().all(|p| p.col.r >= 0.0));
    }

    #[test]
    fn test_node_split_additivity() {
        // two nodes each render half the sample-index space; their
        // averaged images must equal the single-node render with the
        // full sample count
        let cam = camera();
        let render_node = |node: usize, samples: usize| {
            let mut scene = cornell_ish_scene();
            let mut aa = AaNoiseParams::default();
            aa.samples = samples;
            aa.passes = 1;
            let mut film =
                ImageFilm::new(32, 32, FilterType::Box, 1.0, 16, TilesOrder::Linear, aa);
            // nodes partition the index space contiguously
            film.set_base_sampling_offset(node * samples);
            let mut renderer = Renderer::new(
                Box::new(DirectLightIntegrator::new(3)),
                RenderSettings { num_threads: 2 },
            );
            let mut monitor = NullProgress::default();
            renderer
                .render(&mut scene, &mut film, &cam, &mut monitor)
                .unwrap();
            film.resolved_combined()
        };

        let full = {
            let mut scene = cornell_ish_scene();
            let mut aa = AaNoiseParams::default();
            aa.samples = 8;
            aa.passes = 1;
            let mut film =
                ImageFilm::new(32, 32, FilterType::Box, 1.0, 16, TilesOrder::Linear, aa);
            let mut renderer = Renderer::new(
                Box::new(DirectLightIntegrator::new(3)),
                RenderSettings { num_threads: 1 },
            );
            let mut monitor = NullProgress::default();
            renderer
                .render(&mut scene, &mut film, &cam, &mut monitor)
                .unwrap();
            film.resolved_combined()
        };
        let node_a = render_node(0, 4);
        let node_b = render_node(1, 4);

        for i in 0..full.len() {
            let merged = (node_a[i].col + node_b[i].col) * 0.5;
            let reference = full[i].col;
            assert!(
                (merged.r - reference.r).abs() < 1e-4
                    && (merged.g - reference.g).abs() < 1e-4
                    && (merged.b - reference.b).abs() < 1e-4,
                "node-split mismatch at pixel {}: {:?} vs {:?}",
                i,
                merged,
                reference
            );
        }
    }
}
