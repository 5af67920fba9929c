use crate::color::Rgb;
use crate::geometry::ray::Ray;
use crate::light::{IllumSample, Light, LightBase, LightFlags, PhotonEmit};
use crate::sampling::uniform_cone;
use crate::{coordinate_system, radians, Float, Point3f, Vec3f, TWO_PI};
use cgmath::InnerSpace;

/// A photometric table indexed by (horizontal, vertical) angle in
/// degrees. Parsing of distribution files happens outside the renderer;
/// this is the in-memory form the light consumes.
#[derive(Debug, Clone)]
pub struct IesData {
    horizontal_angles: Vec<Float>,
    vertical_angles: Vec<Float>,
    /// candela[h][v]
    candela: Vec<Vec<Float>>,
    max_candela: Float,
}

impl IesData {
    pub fn new(
        horizontal_angles: Vec<Float>,
        vertical_angles: Vec<Float>,
        candela: Vec<Vec<Float>>,
    ) -> Self {
        let max_candela = candela
            .iter()
            .flat_map(|row| row.iter())
            .cloned()
            .fold(0.0, Float::max);
        Self {
            horizontal_angles,
            vertical_angles,
            candela,
            max_candela: max_candela.max(1e-6),
        }
    }

    /// A featureless downlight covering 90 degrees, used when no
    /// distribution is supplied.
    pub fn isotropic() -> Self {
        Self::new(vec![0.0, 360.0], vec![0.0, 90.0], vec![vec![1.0, 1.0], vec![1.0, 1.0]])
    }

    pub fn max_vertical_angle(&self) -> Float {
        self.vertical_angles.last().copied().unwrap_or(90.0)
    }

    /// Bilinear interpolation of the table, normalized to [0, 1].
    pub fn eval(&self, horizontal_deg: Float, vertical_deg: Float) -> Float {
        if vertical_deg > self.max_vertical_angle() {
            return 0.0;
        }
        let (h0, h1, ht) = Self::bracket(&self.horizontal_angles, horizontal_deg);
        let (v0, v1, vt) = Self::bracket(&self.vertical_angles, vertical_deg);
        let c00 = self.candela[h0][v0];
        let c01 = self.candela[h0][v1];
        let c10 = self.candela[h1][v0];
        let c11 = self.candela[h1][v1];
        let c0 = c00 + (c01 - c00) * vt;
        let c1 = c10 + (c11 - c10) * vt;
        (c0 + (c1 - c0) * ht) / self.max_candela
    }

    fn bracket(angles: &[Float], a: Float) -> (usize, usize, Float) {
        if angles.len() < 2 || a <= angles[0] {
            return (0, 0, 0.0);
        }
        if a >= *angles.last().unwrap() {
            let last = angles.len() - 1;
            return (last, last, 0.0);
        }
        let mut i = 0;
        while i + 1 < angles.len() && angles[i + 1] < a {
            i += 1;
        }
        let span = angles[i + 1] - angles[i];
        let t = if span > 0.0 { (a - angles[i]) / span } else { 0.0 };
        (i, i + 1, t)
    }
}

/// Point light shaped by a measured photometric distribution.
pub struct IesLight {
    base: LightBase,
    from: Point3f,
    dir: Vec3f,
    du: Vec3f,
    dv: Vec3f,
    color: Rgb,
    data: IesData,
    cos_max: Float,
}

impl IesLight {
    pub fn new(from: Point3f, to: Point3f, color: Rgb, power: Float, samples: usize, data: IesData) -> Self {
        let dir = (to - from).normalize();
        let (du, dv) = coordinate_system(dir);
        let cos_max = radians(data.max_vertical_angle().min(179.0)).cos();
        let mut base = LightBase::with_flags(LightFlags::DELTA_POSITION);
        base.num_samples = samples.max(1);
        Self {
            base,
            from,
            dir,
            du,
            dv,
            color: color * power,
            data,
            cos_max,
        }
    }

    /// Table weight for light leaving toward `out_dir`.
    fn distribution_weight(&self, out_dir: Vec3f) -> Float {
        let cos_v = out_dir.dot(self.dir).min(1.0).max(-1.0);
        let vertical = cos_v.acos().to_degrees();
        let x = out_dir.dot(self.du);
        let y = out_dir.dot(self.dv);
        let mut horizontal = y.atan2(x).to_degrees();
        if horizontal < 0.0 {
            horizontal += 360.0;
        }
        self.data.eval(horizontal, vertical)
    }
}

impl Light for IesLight {
    fn base(&self) -> &LightBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut LightBase {
        &mut self.base
    }

    fn total_energy(&self) -> Rgb {
        self.color * (TWO_PI * (1.0 - self.cos_max).max(1e-3))
    }

    fn illum_sample(
        &self,
        surface_p: Point3f,
        _s_1: Float,
        _s_2: Float,
        time: Float,
    ) -> Option<IllumSample> {
        if self.photon_only() {
            return None;
        }
        let ldir = self.from - surface_p;
        let dist_sqr = ldir.magnitude2();
        let dist = dist_sqr.sqrt();
        if dist == 0.0 {
            return None;
        }
        let wi = ldir / dist;
        let weight = self.distribution_weight(-wi);
        if weight <= 0.0 {
            return None;
        }
        let ray = Ray::with_range(surface_p, wi, time, 0.0, dist);
        Some(IllumSample {
            ray,
            col: self.color * weight,
            pdf: dist_sqr,
            light_p: self.from,
            light_ng: self.dir,
        })
    }

    fn emit_photon(
        &self,
        s_1: Float,
        s_2: Float,
        _s_3: Float,
        _s_4: Float,
        time: Float,
    ) -> Option<PhotonEmit> {
        let dir = uniform_cone(self.dir, self.du, self.dv, self.cos_max, s_1, s_2);
        let weight = self.distribution_weight(dir);
        Some(PhotonEmit {
            ray: Ray::new(self.from, dir, time),
            inv_pdf: TWO_PI * (1.0 - self.cos_max).max(1e-6),
            col: self.color * weight,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn narrow_downlight() -> IesData {
        // bright in the center, falling off to nothing at 40 degrees
        IesData::new(
            vec![0.0, 360.0],
            vec![0.0, 20.0, 40.0],
            vec![vec![1000.0, 400.0, 0.0], vec![1000.0, 400.0, 0.0]],
        )
    }

    #[test]
    fn test_table_interpolation() {
        let data = narrow_downlight();
        assert_relative_eq!(data.eval(0.0, 0.0), 1.0, epsilon = 1e-5);
        assert_relative_eq!(data.eval(180.0, 10.0), 0.7, epsilon = 1e-5);
        assert_relative_eq!(data.eval(90.0, 40.0), 0.0, epsilon = 1e-5);
        assert_eq!(data.eval(0.0, 60.0), 0.0);
    }

    #[test]
    fn test_light_shaped_by_table() {
        let light = IesLight::new(
            Point3f::new(0.0, 4.0, 0.0),
            Point3f::new(0.0, 0.0, 0.0),
            Rgb::WHITE,
            1.0,
            1,
            narrow_downlight(),
        );
        // directly below: full intensity
        let below = light
            .illum_sample(Point3f::new(0.0, 0.0, 0.0), 0.0, 0.0, 0.0)
            .unwrap();
        // at ~45 degrees off axis: outside the distribution
        assert!(light
            .illum_sample(Point3f::new(4.2, 0.0, 0.0), 0.0, 0.0, 0.0)
            .is_none());
        assert_relative_eq!(below.col.r, 1.0, epsilon = 1e-4);
    }
}
