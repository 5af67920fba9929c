use crate::Float;
use std::ops::{Add, AddAssign, Div, DivAssign, Mul, MulAssign, Sub};

/// Linear RGB radiance triple. All rendering math happens in linear space;
/// conversion to/from sRGB or XYZ only occurs at parameter ingest and film
/// flush.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct Rgb {
    pub r: Float,
    pub g: Float,
    pub b: Float,
}

/// Color space tags accepted on parameter ingest and film output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorSpace {
    LinearRgb,
    Srgb,
    Xyz,
    RawManualGamma,
}

impl ColorSpace {
    pub fn from_name(name: &str) -> Option<ColorSpace> {
        match name {
            "LinearRGB" | "linear" => Some(ColorSpace::LinearRgb),
            "sRGB" | "srgb" => Some(ColorSpace::Srgb),
            "XYZ" | "xyz" => Some(ColorSpace::Xyz),
            "Raw_Manual_Gamma" | "raw" => Some(ColorSpace::RawManualGamma),
            _ => None,
        }
    }
}

impl Rgb {
    pub const BLACK: Rgb = Rgb { r: 0.0, g: 0.0, b: 0.0 };
    pub const WHITE: Rgb = Rgb { r: 1.0, g: 1.0, b: 1.0 };

    pub fn new(r: Float, g: Float, b: Float) -> Self {
        Self { r, g, b }
    }

    pub fn gray(v: Float) -> Self {
        Self { r: v, g: v, b: v }
    }

    pub fn is_black(&self) -> bool {
        self.r == 0.0 && self.g == 0.0 && self.b == 0.0
    }

    pub fn has_nans(&self) -> bool {
        self.r.is_nan() || self.g.is_nan() || self.b.is_nan()
    }

    pub fn is_finite(&self) -> bool {
        self.r.is_finite() && self.g.is_finite() && self.b.is_finite()
    }

    /// Mean of the three channels; used for light-energy weighting.
    pub fn energy(&self) -> Float {
        (self.r + self.g + self.b) / 3.0
    }

    /// Rec. 709 luminance.
    pub fn luminance(&self) -> Float {
        0.2126 * self.r + 0.7152 * self.g + 0.0722 * self.b
    }

    pub fn max_component(&self) -> Float {
        self.r.max(self.g).max(self.b)
    }

    pub fn clamp_min_zero(self) -> Rgb {
        Rgb::new(self.r.max(0.0), self.g.max(0.0), self.b.max(0.0))
    }

    /// Scales the color down so no channel exceeds `max`, preserving hue.
    /// A `max` of zero disables clamping.
    pub fn clamp_proportional(self, max: Float) -> Rgb {
        if max <= 0.0 {
            return self;
        }
        let m = self.max_component();
        if m > max {
            self * (max / m)
        } else {
            self
        }
    }

    pub fn apply_gamma(self, gamma: Float) -> Rgb {
        if gamma == 1.0 {
            return self;
        }
        let e = 1.0 / gamma;
        Rgb::new(
            self.r.max(0.0).powf(e),
            self.g.max(0.0).powf(e),
            self.b.max(0.0).powf(e),
        )
    }

    pub fn linear_to_srgb(self) -> Rgb {
        fn conv(c: Float) -> Float {
            if c <= 0.0031308 {
                12.92 * c
            } else {
                1.055 * c.powf(1.0 / 2.4) - 0.055
            }
        }
        Rgb::new(conv(self.r), conv(self.g), conv(self.b))
    }

    pub fn srgb_to_linear(self) -> Rgb {
        fn conv(c: Float) -> Float {
            if c <= 0.04045 {
                c / 12.92
            } else {
                ((c + 0.055) / 1.055).powf(2.4)
            }
        }
        Rgb::new(conv(self.r), conv(self.g), conv(self.b))
    }

    pub fn xyz_to_linear(self) -> Rgb {
        Rgb::new(
            3.2404542 * self.r - 1.5371385 * self.g - 0.4985314 * self.b,
            -0.9692660 * self.r + 1.8760108 * self.g + 0.0415560 * self.b,
            0.0556434 * self.r - 0.2040259 * self.g + 1.0572252 * self.b,
        )
    }

    /// Converts an ingested parameter color into linear space.
    pub fn ingest(self, space: ColorSpace, gamma: Float) -> Rgb {
        match space {
            ColorSpace::LinearRgb => self,
            ColorSpace::Srgb => self.srgb_to_linear(),
            ColorSpace::Xyz => self.xyz_to_linear(),
            ColorSpace::RawManualGamma => {
                if gamma != 1.0 && gamma > 0.0 {
                    Rgb::new(
                        self.r.max(0.0).powf(gamma),
                        self.g.max(0.0).powf(gamma),
                        self.b.max(0.0).powf(gamma),
                    )
                } else {
                    self
                }
            }
        }
    }
}

impl Add for Rgb {
    type Output = Rgb;
    fn add(self, o: Rgb) -> Rgb {
        Rgb::new(self.r + o.r, self.g + o.g, self.b + o.b)
    }
}

impl AddAssign for Rgb {
    fn add_assign(&mut self, o: Rgb) {
        self.r += o.r;
        self.g += o.g;
        self.b += o.b;
    }
}

impl Sub for Rgb {
    type Output = Rgb;
    fn sub(self, o: Rgb) -> Rgb {
        Rgb::new(self.r - o.r, self.g - o.g, self.b - o.b)
    }
}

impl Mul for Rgb {
    type Output = Rgb;
    fn mul(self, o: Rgb) -> Rgb {
        Rgb::new(self.r * o.r, self.g * o.g, self.b * o.b)
    }
}

impl MulAssign for Rgb {
    fn mul_assign(&mut self, o: Rgb) {
        self.r *= o.r;
        self.g *= o.g;
        self.b *= o.b;
    }
}

impl Mul<Float> for Rgb {
    type Output = Rgb;
    fn mul(self, s: Float) -> Rgb {
        Rgb::new(self.r * s, self.g * s, self.b * s)
    }
}

impl Mul<Rgb> for Float {
    type Output = Rgb;
    fn mul(self, c: Rgb) -> Rgb {
        c * self
    }
}

impl MulAssign<Float> for Rgb {
    fn mul_assign(&mut self, s: Float) {
        self.r *= s;
        self.g *= s;
        self.b *= s;
    }
}

impl Div<Float> for Rgb {
    type Output = Rgb;
    fn div(self, s: Float) -> Rgb {
        let inv = 1.0 / s;
        Rgb::new(self.r * inv, self.g * inv, self.b * inv)
    }
}

impl DivAssign<Float> for Rgb {
    fn div_assign(&mut self, s: Float) {
        let inv = 1.0 / s;
        self.r *= inv;
        self.g *= inv;
        self.b *= inv;
    }
}

/// RGB plus coverage alpha, as accumulated on the film.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct Rgba {
    pub col: Rgb,
    pub a: Float,
}

impl Rgba {
    pub const TRANSPARENT_BLACK: Rgba = Rgba { col: Rgb::BLACK, a: 0.0 };

    pub fn new(col: Rgb, a: Float) -> Self {
        Self { col, a }
    }

    pub fn opaque(col: Rgb) -> Self {
        Self { col, a: 1.0 }
    }

    pub fn has_nans(&self) -> bool {
        self.col.has_nans() || self.a.is_nan()
    }

    pub fn is_finite(&self) -> bool {
        self.col.is_finite() && self.a.is_finite()
    }

    pub fn premultiply(self) -> Rgba {
        Rgba::new(self.col * self.a, self.a)
    }
}

impl Add for Rgba {
    type Output = Rgba;
    fn add(self, o: Rgba) -> Rgba {
        Rgba::new(self.col + o.col, self.a + o.a)
    }
}

impl AddAssign for Rgba {
    fn add_assign(&mut self, o: Rgba) {
        self.col += o.col;
        self.a += o.a;
    }
}

impl Mul<Float> for Rgba {
    type Output = Rgba;
    fn mul(self, s: Float) -> Rgba {
        Rgba::new(self.col * s, self.a * s)
    }
}

impl Div<Float> for Rgba {
    type Output = Rgba;
    fn div(self, s: Float) -> Rgba {
        let inv = 1.0 / s;
        Rgba::new(self.col * inv, self.a * inv)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_srgb_roundtrip() {
        let c = Rgb::new(0.25, 0.5, 0.75);
        let back = c.linear_to_srgb().srgb_to_linear();
        assert_relative_eq!(c.r, back.r, epsilon = 1e-5);
        assert_relative_eq!(c.g, back.g, epsilon = 1e-5);
        assert_relative_eq!(c.b, back.b, epsilon = 1e-5);
    }

    #[test]
    fn test_clamp_proportional_preserves_hue() {
        let c = Rgb::new(8.0, 4.0, 2.0).clamp_proportional(2.0);
        assert_relative_eq!(c.r, 2.0);
        assert_relative_eq!(c.g, 1.0);
        assert_relative_eq!(c.b, 0.5);
        // zero disables clamping
        let unclamped = Rgb::new(8.0, 4.0, 2.0).clamp_proportional(0.0);
        assert_eq!(unclamped, Rgb::new(8.0, 4.0, 2.0));
    }

    #[test]
    fn test_luminance_weights() {
        assert_relative_eq!(Rgb::WHITE.luminance(), 1.0, epsilon = 1e-5);
        assert_relative_eq!(Rgb::new(1.0, 0.0, 0.0).luminance(), 0.2126);
    }
}
