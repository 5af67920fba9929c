use crate::geometry::bounds::Bounds2i;
use crate::{Float, Point2i};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256Plus;

/// Dispatch order for the tile queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TilesOrder {
    Linear,
    Random,
    CentreFirst,
}

impl TilesOrder {
    pub fn from_name(name: &str) -> Option<TilesOrder> {
        match name {
            "linear" => Some(TilesOrder::Linear),
            "random" => Some(TilesOrder::Random),
            "centre" | "center" | "centre_first" => Some(TilesOrder::CentreFirst),
            _ => None,
        }
    }
}

/// One tile handed to a worker.
#[derive(Debug, Clone, Copy)]
pub struct RenderArea {
    pub bounds: Bounds2i,
    pub id: usize,
    /// Number of pixels flagged for resampling inside this area during
    /// the last adaptive pass; informational.
    pub resampled: usize,
}

/// Splits the image into square tiles and fixes their dispatch order up
/// front so the queue is a single atomic counter.
pub struct ImageSplitter {
    areas: Vec<RenderArea>,
}

impl ImageSplitter {
    pub fn new(width: usize, height: usize, tile_size: usize, order: TilesOrder) -> Self {
        let ts = tile_size.max(4) as i32;
        let (w, h) = (width as i32, height as i32);
        let mut areas = Vec::new();
        let mut y = 0;
        while y < h {
            let mut x = 0;
            while x < w {
                let bounds = Bounds2i::with_bounds(
                    Point2i::new(x, y),
                    Point2i::new((x + ts).min(w), (y + ts).min(h)),
                );
                areas.push(RenderArea {
                    bounds,
                    id: areas.len(),
                    resampled: 0,
                });
                x += ts;
            }
            y += ts;
        }

        match order {
            TilesOrder::Linear => {}
            TilesOrder::Random => {
                // fixed seed: dispatch order must not perturb determinism
                let mut rng = Xoshiro256Plus::seed_from_u64(0x5eed);
                areas.shuffle(&mut rng);
            }
            TilesOrder::CentreFirst => {
                let cx = w as Float / 2.0;
                let cy = h as Float / 2.0;
                areas.sort_by(|a, b| {
                    let da = tile_center_dist(a, cx, cy);
                    let db = tile_center_dist(b, cx, cy);
                    da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal)
                });
            }
        }
        // renumber in dispatch order
        for (i, a) in areas.iter_mut().enumerate() {
            a.id = i;
        }
        Self { areas }
    }

    pub fn num_areas(&self) -> usize {
        self.areas.len()
    }

    pub fn area(&self, i: usize) -> Option<RenderArea> {
        self.areas.get(i).copied()
    }
}

fn tile_center_dist(a: &RenderArea, cx: Float, cy: Float) -> Float {
    let tx = (a.bounds.min.x + a.bounds.max.x) as Float / 2.0;
    let ty = (a.bounds.min.y + a.bounds.max.y) as Float / 2.0;
    (tx - cx) * (tx - cx) + (ty - cy) * (ty - cy)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tiles_cover_image_exactly() {
        for &(w, h, ts) in &[(100usize, 60usize, 32usize), (64, 64, 32), (33, 17, 16)] {
            let splitter = ImageSplitter::new(w, h, ts, TilesOrder::Linear);
            let total: i32 = (0..splitter.num_areas())
                .map(|i| splitter.area(i).unwrap().bounds.area())
                .sum();
            assert_eq!(total as usize, w * h);
        }
    }

    #[test]
    fn test_centre_first_starts_in_middle() {
        let splitter = ImageSplitter::new(128, 128, 32, TilesOrder::CentreFirst);
        let first = splitter.area(0).unwrap();
        let cx = (first.bounds.min.x + first.bounds.max.x) / 2;
        let cy = (first.bounds.min.y + first.bounds.max.y) / 2;
        assert!((cx - 64).abs() <= 32 && (cy - 64).abs() <= 32);
    }

    #[test]
    fn test_random_is_deterministic() {
        let a = ImageSplitter::new(96, 96, 16, TilesOrder::Random);
        let b = ImageSplitter::new(96, 96, 16, TilesOrder::Random);
        for i in 0..a.num_areas() {
            assert_eq!(a.area(i).unwrap().bounds, b.area(i).unwrap().bounds);
        }
    }
}
