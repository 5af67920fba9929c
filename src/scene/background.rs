use crate::color::Rgb;
use crate::scene::params::ParamMap;
use crate::{sphere_map, Float, Vec3f};

/// Environment radiance queried by escaped rays and the background light.
pub trait Background: Send + Sync {
    /// Radiance arriving from direction `dir` (pointing away from the
    /// scene).
    fn eval(&self, dir: Vec3f) -> Rgb;
}

/// Uniform environment color.
pub struct ConstantBackground {
    color: Rgb,
}

impl ConstantBackground {
    pub fn new(color: Rgb, power: Float) -> Self {
        Self { color: color * power }
    }

    pub fn from_params(params: &ParamMap) -> Self {
        let color = params.get_color("color", Rgb::gray(0.5));
        let power = params.get_float("power", 1.0);
        Self::new(color, power)
    }
}

impl Background for ConstantBackground {
    fn eval(&self, _dir: Vec3f) -> Rgb {
        self.color
    }
}

/// Equirectangular environment image held in memory (file decoding is
/// the caller's concern). Nearest-texel lookup.
pub struct ImageBackground {
    pixels: Vec<Rgb>,
    width: usize,
    height: usize,
    power: Float,
}

impl ImageBackground {
    pub fn new(pixels: Vec<Rgb>, width: usize, height: usize, power: Float) -> Self {
        assert_eq!(pixels.len(), width * height);
        Self {
            pixels,
            width,
            height,
            power,
        }
    }

    pub fn resolution(&self) -> (usize, usize) {
        (self.width, self.height)
    }
}

impl Background for ImageBackground {
    fn eval(&self, dir: Vec3f) -> Rgb {
        let uv = sphere_map(dir);
        let x = ((uv.u * self.width as Float) as usize).min(self.width - 1);
        let y = ((uv.v * self.height as Float) as usize).min(self.height - 1);
        self.pixels[y * self.width + x] * self.power
    }
}
