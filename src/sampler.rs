use crate::sampling::{fnv_hash, ri_lp, ri_s, ri_vdc};
use crate::{Float, Point2f, Point2i};
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256Plus;

/// Per-sample random stream. Fully determined by
/// (pixel, global sample index), where the global index already folds in
/// the pass offset and the computer node's reserved block, so renders
/// are reproducible for any thread count and distributable across nodes
/// without overlap.
pub struct PixelSampler {
    pixel_hash: u32,
    sample_index: u32,
    rng: Xoshiro256Plus,
}

impl PixelSampler {
    pub fn new(pixel: Point2i, global_sample_index: usize) -> Self {
        let pixel_hash = fnv_hash(
            (pixel.x as u32).wrapping_mul(0x9e37_79b9) ^ fnv_hash(pixel.y as u32),
        );
        let seed = ((pixel_hash as u64) << 32) | (global_sample_index as u64 & 0xffff_ffff);
        Self {
            pixel_hash,
            sample_index: global_sample_index as u32,
            rng: Xoshiro256Plus::seed_from_u64(seed),
        }
    }

    /// Low-discrepancy subpixel position, stratified over the sample
    /// index and scrambled per pixel.
    pub fn image_offset(&mut self) -> Point2f {
        Point2f::new(
            ri_vdc(self.sample_index, self.pixel_hash),
            ri_s(self.sample_index, fnv_hash(self.pixel_hash)),
        )
    }

    /// Low-discrepancy lens sample for depth of field.
    pub fn lens_sample(&mut self) -> Point2f {
        Point2f::new(
            ri_lp(self.sample_index, self.pixel_hash ^ 0x5c5c_5c5c),
            self.rng.gen(),
        )
    }

    /// Shutter time in [0, 1).
    pub fn time_sample(&mut self) -> Float {
        ri_vdc(self.sample_index, self.pixel_hash ^ 0xa3a3_a3a3)
    }

    pub fn get_1d(&mut self) -> Float {
        self.rng.gen()
    }

    pub fn get_2d(&mut self) -> Point2f {
        Point2f::new(self.rng.gen(), self.rng.gen())
    }

    /// Hands out an independent generator for recursive estimators that
    /// consume a variable number of dimensions.
    pub fn fork_rng(&mut self) -> Xoshiro256Plus {
        Xoshiro256Plus::seed_from_u64(self.rng.gen())
    }
}
