pub mod filter;
pub mod output;
pub mod splitter;

pub use filter::{FilterTable, FilterType};
pub use output::{ColorOutput, LayerType, MemoryOutput, NullProgress, ProgressMonitor};
pub use splitter::{ImageSplitter, RenderArea, TilesOrder};

use crate::color::{ColorSpace, Rgb, Rgba};
use crate::geometry::bounds::Bounds2i;
use crate::{Float, Point2f, Point2i, Vec3f};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, info, warn};

/// How aggressively dark regions get extra attention from the adaptive
/// sampler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DarkDetection {
    None,
    Linear,
    Curve,
}

/// Adaptive anti-aliasing configuration.
#[derive(Debug, Clone)]
pub struct AaNoiseParams {
    pub samples: usize,
    pub passes: usize,
    pub inc_samples: usize,
    pub threshold: Float,
    /// Minimum fraction of resampled pixels below which the threshold
    /// halves for the next pass.
    pub resampled_floor: Float,
    pub sample_multiplier_factor: Float,
    pub light_sample_multiplier_factor: Float,
    pub indirect_sample_multiplier_factor: Float,
    pub detect_color_noise: bool,
    pub dark_detection: DarkDetection,
    pub dark_threshold_factor: Float,
    pub variance_edge_size: usize,
    pub clamp_samples: Float,
    pub clamp_indirect: Float,
}

impl Default for AaNoiseParams {
    fn default() -> Self {
        Self {
            samples: 1,
            passes: 1,
            inc_samples: 1,
            threshold: 0.05,
            resampled_floor: 0.0,
            sample_multiplier_factor: 1.0,
            light_sample_multiplier_factor: 1.0,
            indirect_sample_multiplier_factor: 1.0,
            detect_color_noise: false,
            dark_detection: DarkDetection::None,
            dark_threshold_factor: 0.0,
            variance_edge_size: 10,
            clamp_samples: 0.0,
            clamp_indirect: 0.0,
        }
    }
}

impl AaNoiseParams {
    pub fn from_params(params: &crate::scene::ParamMap) -> Self {
        use crate::scene::params::parse_enum;
        let d = Self::default();
        let dark = parse_enum(
            &params.get_string("aa_dark_detection_type", "none"),
            &["none", "linear", "curve"],
            "none",
        );
        Self {
            samples: params.get_int("aa_samples", d.samples as i64).max(1) as usize,
            passes: params.get_int("aa_passes", d.passes as i64).max(1) as usize,
            inc_samples: params.get_int("aa_inc_samples", d.inc_samples as i64).max(1) as usize,
            threshold: params.get_float("aa_threshold", d.threshold),
            resampled_floor: params.get_float("aa_resampled_floor", d.resampled_floor),
            sample_multiplier_factor: params
                .get_float("aa_sample_multiplier_factor", d.sample_multiplier_factor),
            light_sample_multiplier_factor: params.get_float(
                "aa_light_sample_multiplier_factor",
                d.light_sample_multiplier_factor,
            ),
            indirect_sample_multiplier_factor: params.get_float(
                "aa_indirect_sample_multiplier_factor",
                d.indirect_sample_multiplier_factor,
            ),
            detect_color_noise: params.get_bool("aa_detect_color_noise", d.detect_color_noise),
            dark_detection: match dark {
                "linear" => DarkDetection::Linear,
                "curve" => DarkDetection::Curve,
                _ => DarkDetection::None,
            },
            dark_threshold_factor: params
                .get_float("aa_dark_threshold_factor", d.dark_threshold_factor),
            variance_edge_size: params
                .get_int("aa_variance_edge_size", d.variance_edge_size as i64)
                .max(2) as usize,
            clamp_samples: params.get_float("aa_clamp_samples", d.clamp_samples),
            clamp_indirect: params.get_float("aa_clamp_indirect", d.clamp_indirect),
        }
    }
}

/// Values one image sample contributes across the enabled layers.
#[derive(Debug, Clone, Copy)]
pub struct SampleLayers {
    pub combined: Rgba,
    pub depth: Float,
    pub normal: Vec3f,
    pub object_index: Float,
}

impl SampleLayers {
    pub fn layer_value(&self, layer: LayerType) -> Rgba {
        match layer {
            LayerType::Combined => self.combined,
            LayerType::Depth => Rgba::new(Rgb::gray(self.depth), 1.0),
            LayerType::GeometricNormal => Rgba::new(
                Rgb::new(
                    0.5 * (self.normal.x + 1.0),
                    0.5 * (self.normal.y + 1.0),
                    0.5 * (self.normal.z + 1.0),
                ),
                1.0,
            ),
            LayerType::ObjectIndex => Rgba::new(Rgb::gray(self.object_index), 1.0),
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct WeightedPixel {
    col: Rgba,
    weight: Float,
}

/// Worker-local accumulation buffer for one tile, expanded by the filter
/// radius so splats near edges stay local; overlapping borders merge
/// additively under the film mutex.
pub struct FilmTile {
    bounds: Bounds2i,
    layers: Vec<Vec<WeightedPixel>>,
}

impl FilmTile {
    fn pixel_index(&self, x: i32, y: i32) -> usize {
        let (w, _) = self.bounds.dimensions();
        ((y - self.bounds.min.y) * w + (x - self.bounds.min.x)) as usize
    }
}

bitflags::bitflags! {
    pub struct FlushFlags: u32 {
        const IMAGE = 1 << 0;
        const DENSITY_IMAGE = 1 << 1;
        const ALL = Self::IMAGE.bits | Self::DENSITY_IMAGE.bits;
    }
}

/// Receives all rendered image samples, reconstruction-filtered into
/// per-layer weighted buffers, and drives the adaptive multi-pass
/// schedule.
pub struct ImageFilm {
    width: usize,
    height: usize,
    layers: Vec<LayerType>,
    filter: FilterTable,
    splitter: ImageSplitter,
    next_area: AtomicUsize,
    images: Mutex<Vec<Vec<WeightedPixel>>>,
    density: Mutex<Vec<Rgb>>,
    estimate_density: bool,
    num_density_samples: AtomicUsize,
    flags: RwLock<Vec<bool>>,
    nan_warnings: AtomicUsize,
    outputs: Mutex<Vec<Box<dyn ColorOutput>>>,

    pub aa: AaNoiseParams,
    threshold_current: Float,
    n_pass: usize,
    n_passes: usize,
    background_resampling: bool,

    sampling_offset: usize,
    base_sampling_offset: usize,
    computer_node: usize,

    color_space: ColorSpace,
    gamma: Float,
    premult_alpha: bool,
}

impl ImageFilm {
    pub fn new(
        width: usize,
        height: usize,
        filter_type: FilterType,
        filter_size: Float,
        tile_size: usize,
        tiles_order: TilesOrder,
        aa: AaNoiseParams,
    ) -> Self {
        let filter = FilterTable::new(filter_type, filter_size);
        let splitter = ImageSplitter::new(width, height, tile_size, tiles_order);
        let threshold = aa.threshold;
        Self {
            width,
            height,
            layers: vec![LayerType::Combined],
            filter,
            splitter,
            next_area: AtomicUsize::new(0),
            images: Mutex::new(Vec::new()),
            density: Mutex::new(Vec::new()),
            estimate_density: false,
            num_density_samples: AtomicUsize::new(0),
            flags: RwLock::new(vec![true; width * height]),
            nan_warnings: AtomicUsize::new(0),
            outputs: Mutex::new(Vec::new()),
            aa,
            threshold_current: threshold,
            n_pass: 1,
            n_passes: 1,
            background_resampling: true,
            sampling_offset: 0,
            base_sampling_offset: 0,
            computer_node: 0,
            color_space: ColorSpace::LinearRgb,
            gamma: 1.0,
            premult_alpha: false,
        }
    }

    /// Builds a film from a typed parameter map; unknown enum strings
    /// fall back to their defaults with a logged warning.
    pub fn from_params(params: &crate::scene::ParamMap) -> Self {
        use crate::scene::params::parse_enum;
        let width = params.get_int("width", 512).max(1) as usize;
        let height = params.get_int("height", 512).max(1) as usize;
        let filter = FilterType::from_name(parse_enum(
            &params.get_string("filter_type", "box"),
            &["box", "mitchell", "gauss", "lanczos"],
            "box",
        ))
        .unwrap_or(FilterType::Box);
        let filter_size = params.get_float("filter_size", 1.0);
        let tile_size = params.get_int("tile_size", 32).max(4) as usize;
        let order = TilesOrder::from_name(parse_enum(
            &params.get_string("tiles_order", "linear"),
            &["linear", "random", "centre"],
            "linear",
        ))
        .unwrap_or(TilesOrder::Linear);
        let aa = AaNoiseParams::from_params(params);
        let mut film = Self::new(width, height, filter, filter_size, tile_size, order, aa);
        film.set_background_resampling(params.get_bool("background_resampling", true));
        film.set_premult_alpha(params.get_bool("premult_alpha", false));
        film.set_computer_node(params.get_int("computer_node", 0).max(0) as usize);
        film.set_base_sampling_offset(params.get_int("base_sampling_offset", 0).max(0) as usize);
        film
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn total_pixels(&self) -> usize {
        self.width * self.height
    }

    pub fn add_layer(&mut self, layer: LayerType) {
        if !self.layers.contains(&layer) {
            self.layers.push(layer);
        }
    }

    pub fn layers(&self) -> &[LayerType] {
        &self.layers
    }

    pub fn add_output(&mut self, out: Box<dyn ColorOutput>) {
        self.outputs.lock().push(out);
    }

    pub fn set_color_space(&mut self, space: ColorSpace, gamma: Float) {
        self.color_space = space;
        self.gamma = gamma;
    }

    pub fn set_premult_alpha(&mut self, premult: bool) {
        self.premult_alpha = premult;
    }

    pub fn set_background_resampling(&mut self, enabled: bool) {
        self.background_resampling = enabled;
    }

    pub fn set_density_estimation(&mut self, enabled: bool) {
        self.estimate_density = enabled;
    }

    pub fn set_num_density_samples(&mut self, n: usize) {
        self.num_density_samples.store(n, Ordering::Relaxed);
    }

    pub fn set_computer_node(&mut self, node: usize) {
        self.computer_node = node;
    }

    pub fn set_base_sampling_offset(&mut self, offset: usize) {
        self.base_sampling_offset = offset;
    }

    /// Each computer node gets a reserved block of the sample-index
    /// space so distributed renders never repeat samples.
    pub fn base_sampling_offset(&self) -> usize {
        self.base_sampling_offset + self.computer_node * 100_000
    }

    pub fn sampling_offset(&self) -> usize {
        self.sampling_offset
    }

    pub fn current_pass(&self) -> usize {
        self.n_pass
    }

    pub fn num_passes(&self) -> usize {
        self.n_passes
    }

    pub fn current_threshold(&self) -> Float {
        self.threshold_current
    }

    pub fn nan_warnings(&self) -> usize {
        self.nan_warnings.load(Ordering::Relaxed)
    }

    /// Samples per pixel scheduled for a pass (1-based).
    pub fn pass_samples(&self, pass: usize) -> usize {
        if pass <= 1 {
            self.aa.samples.max(1)
        } else {
            let mult = self.aa.sample_multiplier_factor.powi(pass as i32 - 2);
            ((self.aa.inc_samples as Float * mult).round() as usize).max(1)
        }
    }

    /// Per-pass multipliers applied to the integrator's light/indirect
    /// sample counts.
    pub fn sample_multipliers(&self, pass: usize) -> (Float, Float) {
        let p = (pass.max(1) - 1) as i32;
        (
            self.aa.light_sample_multiplier_factor.powi(p),
            self.aa.indirect_sample_multiplier_factor.powi(p),
        )
    }

    /// Resets all buffers for a new rendering.
    pub fn init(&mut self, num_passes: usize) {
        self.n_passes = num_passes.max(1);
        self.n_pass = 1;
        self.threshold_current = self.aa.threshold;
        self.sampling_offset = 0;
        self.next_area.store(0, Ordering::SeqCst);
        self.nan_warnings.store(0, Ordering::Relaxed);

        let n = self.total_pixels();
        let mut images = self.images.lock();
        images.clear();
        for _ in &self.layers {
            images.push(vec![WeightedPixel::default(); n]);
        }
        let mut density = self.density.lock();
        *density = if self.estimate_density {
            vec![Rgb::BLACK; n]
        } else {
            Vec::new()
        };
        *self.flags.write() = vec![true; n];

        let mut outputs = self.outputs.lock();
        for out in outputs.iter_mut() {
            for layer in &self.layers {
                out.notify_layer(*layer, self.width, self.height);
            }
        }
        info!(
            width = self.width,
            height = self.height,
            passes = self.n_passes,
            "film initialized"
        );
    }

    pub fn num_areas(&self) -> usize {
        self.splitter.num_areas()
    }

    /// Thread-safe tile dequeue; `None` once the pass is exhausted.
    pub fn next_area(&self) -> Option<RenderArea> {
        let idx = self.next_area.fetch_add(1, Ordering::SeqCst);
        let area = self.splitter.area(idx);
        if let Some(a) = &area {
            let mut outputs = self.outputs.lock();
            for out in outputs.iter_mut() {
                out.highlight_area(
                    a.bounds.min.x as usize,
                    a.bounds.min.y as usize,
                    a.bounds.max.x as usize,
                    a.bounds.max.y as usize,
                );
            }
        }
        area
    }

    /// Worker-local accumulation buffer covering the area plus the
    /// filter footprint.
    pub fn film_tile(&self, area: &RenderArea) -> FilmTile {
        let r = self.filter.radius().ceil() as i32;
        let bounds = area.bounds.expand(r).intersection(&Bounds2i::with_bounds(
            Point2i::new(0, 0),
            Point2i::new(self.width as i32, self.height as i32),
        ));
        let n = bounds.area().max(0) as usize;
        FilmTile {
            bounds,
            layers: vec![vec![WeightedPixel::default(); n]; self.layers.len()],
        }
    }

    /// Splats one sample into the tile through the reconstruction
    /// filter. Non-finite samples are dropped and counted.
    pub fn add_sample(&self, tile: &mut FilmTile, p_film: Point2f, values: &SampleLayers) {
        if values.combined.has_nans() || !values.combined.is_finite() {
            self.nan_warnings.fetch_add(1, Ordering::Relaxed);
            return;
        }
        let r = self.filter.radius();
        let dx = p_film.x - 0.5;
        let dy = p_film.y - 0.5;
        let x0 = ((dx - r).ceil() as i32).max(tile.bounds.min.x);
        let x1 = (((dx + r).floor() as i32) + 1).min(tile.bounds.max.x);
        let y0 = ((dy - r).ceil() as i32).max(tile.bounds.min.y);
        let y1 = (((dy + r).floor() as i32) + 1).min(tile.bounds.max.y);

        for y in y0..y1 {
            for x in x0..x1 {
                let w = self.filter.weight(x as Float - dx, y as Float - dy);
                if w <= 0.0 {
                    continue;
                }
                let idx = tile.pixel_index(x, y);
                for (li, layer) in self.layers.iter().enumerate() {
                    let v = values.layer_value(*layer);
                    let px = &mut tile.layers[li][idx];
                    px.col += v * w;
                    px.weight += w;
                }
            }
        }
    }

    /// Light-tracing style estimators deposit unweighted density samples
    /// directly; resolved by dividing by the announced sample count.
    pub fn add_density_sample(&self, x: usize, y: usize, col: Rgb) {
        if !self.estimate_density || x >= self.width || y >= self.height {
            return;
        }
        let mut density = self.density.lock();
        if !density.is_empty() {
            density[y * self.width + x] += col;
        }
    }

    /// Merges a finished tile and streams the area's resolved pixels to
    /// the registered outputs.
    pub fn finish_area(&self, area: &RenderArea, tile: FilmTile) {
        {
            let mut images = self.images.lock();
            for (li, tile_layer) in tile.layers.iter().enumerate() {
                let img = &mut images[li];
                for (x, y) in tile.bounds.iter_points() {
                    let src = &tile_layer[tile.pixel_index(x, y)];
                    let dst = &mut img[y as usize * self.width + x as usize];
                    dst.col += src.col;
                    dst.weight += src.weight;
                }
            }
        }

        let resolved = self.resolve_area(area.bounds);
        let mut outputs = self.outputs.lock();
        for out in outputs.iter_mut() {
            for (li, layer) in self.layers.iter().enumerate() {
                for (i, (x, y)) in area.bounds.iter_points().enumerate() {
                    out.put_pixel(*layer, x as usize, y as usize, resolved[li][i]);
                }
            }
            out.flush_area(
                area.bounds.min.x as usize,
                area.bounds.min.y as usize,
                area.bounds.max.x as usize,
                area.bounds.max.y as usize,
            );
        }
    }

    fn resolve_pixel(px: &WeightedPixel) -> Rgba {
        if px.weight > 0.0 {
            px.col / px.weight
        } else {
            Rgba::TRANSPARENT_BLACK
        }
    }

    fn resolve_area(&self, bounds: Bounds2i) -> Vec<Vec<Rgba>> {
        let images = self.images.lock();
        self.layers
            .iter()
            .enumerate()
            .map(|(li, _)| {
                bounds
                    .iter_points()
                    .map(|(x, y)| Self::resolve_pixel(&images[li][y as usize * self.width + x as usize]))
                    .collect()
            })
            .collect()
    }

    /// Resolved combined image (for analysis and tests).
    pub fn resolved_combined(&self) -> Vec<Rgba> {
        let images = self.images.lock();
        images[0].iter().map(Self::resolve_pixel).collect()
    }

    pub fn do_more_samples(&self, x: usize, y: usize) -> bool {
        self.flags.read()[y * self.width + x]
    }

    /// Advances to the next pass. With `adaptive` set, pixels whose local
    /// variance exceeds the (possibly dark-adjusted) threshold are
    /// flagged for resampling; otherwise every pixel is. Returns the
    /// number of flagged pixels.
    pub fn next_pass(&mut self, adaptive: bool, integrator_name: &str) -> usize {
        self.sampling_offset += self.pass_samples(self.n_pass);
        self.n_pass += 1;
        self.next_area.store(0, Ordering::SeqCst);

        let n = self.total_pixels();
        let resampled = if !adaptive {
            *self.flags.write() = vec![true; n];
            n
        } else {
            let flags = self.compute_resample_flags();
            let count = flags.iter().filter(|&&f| f).count();
            *self.flags.write() = flags;

            if count > 0 && (count as Float) < self.aa.resampled_floor * n as Float {
                self.threshold_current *= 0.5;
                debug!(
                    threshold = self.threshold_current,
                    "few pixels resampled, halving AA threshold"
                );
            }
            count
        };
        info!(
            pass = self.n_pass,
            of = self.n_passes,
            integrator = integrator_name,
            resampled,
            "pass complete"
        );
        resampled
    }

    /// Per-pixel noise metric over the variance window.
    fn compute_resample_flags(&self) -> Vec<bool> {
        let resolved = self.resolved_combined();
        let (w, h) = (self.width as i32, self.height as i32);
        let half = (self.aa.variance_edge_size / 2).max(1) as i32;
        let mut flags = vec![false; resolved.len()];

        for y in 0..h {
            for x in 0..w {
                let i = (y * w + x) as usize;
                let center = resolved[i];
                if center.a == 0.0 {
                    // primary rays missed all geometry here
                    if !self.background_resampling {
                        continue;
                    }
                    // untouched pixels keep sampling until they have data
                    if center.col.is_black() {
                        flags[i] = true;
                        continue;
                    }
                }

                let x0 = (x - half).max(0);
                let x1 = (x + half + 1).min(w);
                let y0 = (y - half).max(0);
                let y1 = (y + half + 1).min(h);
                let mut count = 0.0;
                let mut mean = Rgb::BLACK;
                for wy in y0..y1 {
                    for wx in x0..x1 {
                        mean += resolved[(wy * w + wx) as usize].col;
                        count += 1.0;
                    }
                }
                mean = mean * (1.0 / count);
                let mut var = Rgb::BLACK;
                for wy in y0..y1 {
                    for wx in x0..x1 {
                        let d = resolved[(wy * w + wx) as usize].col - mean;
                        var += d * d;
                    }
                }
                var = var * (1.0 / count);

                let (metric, base) = if self.aa.detect_color_noise {
                    (var.max_component(), mean.max_component())
                } else {
                    (var.luminance(), mean.luminance())
                };
                let normalized = metric / base.max(1e-4).powi(2).max(1e-4);

                let lum = center.col.luminance();
                let thr = self.effective_threshold(lum);
                if normalized > thr {
                    flags[i] = true;
                }
            }
        }
        flags
    }

    /// Dark detection drops the threshold where the eye notices shadow
    /// noise the raw metric misses.
    fn effective_threshold(&self, luminance: Float) -> Float {
        let thr = self.threshold_current;
        match self.aa.dark_detection {
            DarkDetection::None => thr,
            DarkDetection::Linear => {
                let f = self.aa.dark_threshold_factor.max(1e-3).min(1.0);
                thr * luminance.min(1.0).max(f)
            }
            DarkDetection::Curve => {
                let f = self.aa.dark_threshold_factor.max(1e-3).min(1.0);
                thr * (f + (1.0 - f) * luminance.min(1.0).sqrt())
            }
        }
    }

    /// Resolves every layer, applies output conversion and streams the
    /// result to every sink.
    pub fn flush(&self, flags: FlushFlags) {
        let images = self.images.lock();
        let density = self.density.lock();
        let n_density = self.num_density_samples.load(Ordering::Relaxed);
        let mut outputs = self.outputs.lock();

        let nan_count = self.nan_warnings.load(Ordering::Relaxed);
        if nan_count > 0 {
            warn!(discarded = nan_count, "non-finite samples were discarded this render");
        }

        for out in outputs.iter_mut() {
            for (li, layer) in self.layers.iter().enumerate() {
                if !flags.contains(FlushFlags::IMAGE) && *layer == LayerType::Combined {
                    continue;
                }
                out.notify_layer(*layer, self.width, self.height);
                for y in 0..self.height {
                    for x in 0..self.width {
                        let idx = y * self.width + x;
                        let mut px = Self::resolve_pixel(&images[li][idx]);
                        if *layer == LayerType::Combined {
                            if flags.contains(FlushFlags::DENSITY_IMAGE)
                                && !density.is_empty()
                                && n_density > 0
                            {
                                px.col += density[idx] * (1.0 / n_density as Float);
                            }
                            px.col = match self.color_space {
                                ColorSpace::Srgb => px.col.linear_to_srgb(),
                                ColorSpace::RawManualGamma => px.col.apply_gamma(self.gamma),
                                _ => px.col,
                            };
                            if self.premult_alpha {
                                px = px.premultiply();
                            }
                        }
                        out.put_pixel(*layer, x, y, px);
                    }
                }
            }
            out.flush();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn simple_film(w: usize, h: usize) -> ImageFilm {
        ImageFilm::new(
            w,
            h,
            FilterType::Box,
            1.0,
            8,
            TilesOrder::Linear,
            AaNoiseParams::default(),
        )
    }

    fn deposit(film: &ImageFilm, x: Float, y: Float, col: Rgb) {
        let area = RenderArea {
            bounds: Bounds2i::with_bounds(
                Point2i::new(0, 0),
                Point2i::new(film.width() as i32, film.height() as i32),
            ),
            id: 0,
            resampled: 0,
        };
        let mut tile = film.film_tile(&area);
        film.add_sample(
            &mut tile,
            Point2f::new(x, y),
            &SampleLayers {
                combined: Rgba::opaque(col),
                depth: 0.0,
                normal: Vec3f::new(0.0, 0.0, 1.0),
                object_index: 0.0,
            },
        );
        film.finish_area(&area, tile);
    }

    #[test]
    fn test_film_conservation() {
        let mut film = simple_film(8, 8);
        film.init(1);
        deposit(&film, 3.5, 4.5, Rgb::new(2.0, 4.0, 8.0));
        deposit(&film, 3.5, 4.5, Rgb::new(4.0, 8.0, 16.0));
        let img = film.resolved_combined();
        let px = img[4 * 8 + 3];
        // average of the two samples, exactly
        assert_relative_eq!(px.col.r, 3.0, epsilon = 1e-5);
        assert_relative_eq!(px.col.g, 6.0, epsilon = 1e-5);
        assert!(px.is_finite());
        // untouched pixel stays black with zero weight
        assert_eq!(img[0], Rgba::TRANSPARENT_BLACK);
    }

    #[test]
    fn test_nan_samples_discarded() {
        let mut film = simple_film(4, 4);
        film.init(1);
        deposit(&film, 1.5, 1.5, Rgb::new(Float::NAN, 0.0, 0.0));
        assert_eq!(film.nan_warnings(), 1);
        let img = film.resolved_combined();
        assert!(img.iter().all(|p| p.is_finite()));
    }

    #[test]
    fn test_adaptive_flags_near_edge() {
        // black-on-white vertical edge at x = 16
        let mut aa = AaNoiseParams::default();
        aa.threshold = 0.05;
        aa.variance_edge_size = 4;
        let mut film = ImageFilm::new(32, 8, FilterType::Box, 1.0, 8, TilesOrder::Linear, aa);
        film.init(2);
        for y in 0..8 {
            for x in 0..32 {
                let col = if x < 16 { Rgb::BLACK } else { Rgb::WHITE };
                deposit(&film, x as Float + 0.5, y as Float + 0.5, col);
            }
        }
        let resampled = film.next_pass(true, "test");
        assert!(resampled > 0);
        // near the edge: flagged
        assert!(film.do_more_samples(16, 4) || film.do_more_samples(15, 4));
        // far from the edge on the bright side: not flagged
        assert!(!film.do_more_samples(30, 4));
    }

    #[test]
    fn test_pass_sample_schedule() {
        let mut aa = AaNoiseParams::default();
        aa.samples = 16;
        aa.inc_samples = 4;
        aa.sample_multiplier_factor = 2.0;
        let film = ImageFilm::new(4, 4, FilterType::Box, 1.0, 4, TilesOrder::Linear, aa);
        assert_eq!(film.pass_samples(1), 16);
        assert_eq!(film.pass_samples(2), 4);
        assert_eq!(film.pass_samples(3), 8);
        assert_eq!(film.pass_samples(4), 16);
    }

    #[test]
    fn test_from_params_enum_fallback() {
        let mut p = crate::scene::ParamMap::new();
        p.set_int("width", 16);
        p.set_int("height", 8);
        p.set_string("filter_type", "sinc"); // unknown: falls back to box
        p.set_string("tiles_order", "centre");
        p.set_int("aa_samples", 9);
        let film = ImageFilm::from_params(&p);
        assert_eq!(film.width(), 16);
        assert_eq!(film.height(), 8);
        assert_eq!(film.pass_samples(1), 9);
    }

    #[test]
    fn test_node_offset_reservation() {
        let mut film = simple_film(4, 4);
        film.set_computer_node(3);
        film.set_base_sampling_offset(42);
        assert_eq!(film.base_sampling_offset(), 42 + 300_000);
    }

    #[test]
    fn test_flush_reaches_outputs() {
        let mut film = simple_film(4, 4);
        film.add_output(Box::new(MemoryOutput::new(4, 4)));
        film.init(1);
        deposit(&film, 2.5, 2.5, Rgb::WHITE);
        film.flush(FlushFlags::ALL);
        // outputs are boxed inside the film; validated indirectly through
        // the flush not panicking and conservation holding
        let img = film.resolved_combined();
        assert_relative_eq!(img[2 * 4 + 2].col.r, 1.0, epsilon = 1e-5);
    }
}
