use crate::{Float, Point2i, Point3f, Vec3f};
use std::mem::swap;

/// Integer pixel-space rectangle, half-open on max.
#[derive(Clone, Copy, PartialEq, Debug)]
pub struct Bounds2i {
    pub min: Point2i,
    pub max: Point2i,
}

impl Bounds2i {
    pub fn with_bounds(min: Point2i, max: Point2i) -> Self {
        Self { min, max }
    }

    pub fn dimensions(&self) -> (i32, i32) {
        (self.max.x - self.min.x, self.max.y - self.min.y)
    }

    pub fn area(&self) -> i32 {
        let (w, h) = self.dimensions();
        w * h
    }

    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.min.x && x < self.max.x && y >= self.min.y && y < self.max.y
    }

    pub fn intersection(&self, other: &Bounds2i) -> Bounds2i {
        Bounds2i::with_bounds(
            Point2i::new(self.min.x.max(other.min.x), self.min.y.max(other.min.y)),
            Point2i::new(self.max.x.min(other.max.x), self.max.y.min(other.max.y)),
        )
    }

    pub fn expand(&self, r: i32) -> Bounds2i {
        Bounds2i::with_bounds(
            Point2i::new(self.min.x - r, self.min.y - r),
            Point2i::new(self.max.x + r, self.max.y + r),
        )
    }

    pub fn iter_points(self) -> impl Iterator<Item = (i32, i32)> {
        let (x1, x2, y1, y2) = (self.min.x, self.max.x, self.min.y, self.max.y);
        (y1..y2).flat_map(move |y| (x1..x2).map(move |x| (x, y)))
    }
}

/// Axis-aligned world-space box.
#[derive(Clone, Copy, PartialEq, Debug)]
pub struct Bounds3f {
    pub min: Point3f,
    pub max: Point3f,
}

impl Bounds3f {
    pub fn with_bounds(min: Point3f, max: Point3f) -> Self {
        Self { min, max }
    }

    pub fn empty() -> Self {
        Self {
            min: Point3f::new(Float::MAX, Float::MAX, Float::MAX),
            max: Point3f::new(Float::MIN, Float::MIN, Float::MIN),
        }
    }

    pub fn from_point(p: Point3f) -> Self {
        Self { min: p, max: p }
    }

    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    pub fn join(&self, other: &Self) -> Self {
        Self::with_bounds(
            Point3f::new(
                self.min.x.min(other.min.x),
                self.min.y.min(other.min.y),
                self.min.z.min(other.min.z),
            ),
            Point3f::new(
                self.max.x.max(other.max.x),
                self.max.y.max(other.max.y),
                self.max.z.max(other.max.z),
            ),
        )
    }

    pub fn join_point(&self, p: Point3f) -> Self {
        Self::with_bounds(
            Point3f::new(self.min.x.min(p.x), self.min.y.min(p.y), self.min.z.min(p.z)),
            Point3f::new(self.max.x.max(p.x), self.max.y.max(p.y), self.max.z.max(p.z)),
        )
    }

    pub fn diagonal(&self) -> Vec3f {
        self.max - self.min
    }

    pub fn centroid(&self) -> Point3f {
        self.min + self.diagonal() * 0.5
    }

    pub fn largest_axis(&self) -> usize {
        let d = self.diagonal();
        if d.x > d.y && d.x > d.z {
            0
        } else if d.y > d.z {
            1
        } else {
            2
        }
    }

    pub fn contains(&self, p: Point3f) -> bool {
        p.x >= self.min.x
            && p.x <= self.max.x
            && p.y >= self.min.y
            && p.y <= self.max.y
            && p.z >= self.min.z
            && p.z <= self.max.z
    }

    pub fn intersection(&self, other: &Bounds3f) -> Bounds3f {
        Bounds3f::with_bounds(
            Point3f::new(
                self.min.x.max(other.min.x),
                self.min.y.max(other.min.y),
                self.min.z.max(other.min.z),
            ),
            Point3f::new(
                self.max.x.min(other.max.x),
                self.max.y.min(other.max.y),
                self.max.z.min(other.max.z),
            ),
        )
    }

    /// Center and radius of the enclosing sphere; used by lights that need
    /// to cover the whole scene.
    pub fn bounding_sphere(&self) -> (Point3f, Float) {
        use cgmath::InnerSpace;
        let center = self.centroid();
        let radius = 0.5 * self.diagonal().magnitude();
        (center, radius)
    }

    /// Slab test; returns the entry/exit distances clipped to `[t0, t1]`.
    pub fn intersect_range(
        &self,
        from: Point3f,
        dir: Vec3f,
        mut t0: Float,
        mut t1: Float,
    ) -> Option<(Float, Float)> {
        for i in 0..3 {
            let inv = 1.0 / dir[i];
            let mut t_near = (self.min[i] - from[i]) * inv;
            let mut t_far = (self.max[i] - from[i]) * inv;
            if t_near > t_far {
                swap(&mut t_near, &mut t_far);
            }
            t0 = t0.max(t_near);
            t1 = t1.min(t_far);
            if t0 > t1 {
                return None;
            }
        }
        Some((t0, t1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounds2i_iter() {
        let b = Bounds2i::with_bounds(Point2i::new(-1, -2), Point2i::new(1, 0));
        let points: Vec<_> = b.iter_points().collect();
        assert_eq!(points, vec![(-1, -2), (0, -2), (-1, -1), (0, -1)]);
        assert_eq!(b.area(), 4);
    }

    #[test]
    fn test_bounds3f_join_and_axis() {
        let b = Bounds3f::empty()
            .join_point(Point3f::new(0.0, 0.0, 0.0))
            .join_point(Point3f::new(4.0, 1.0, 2.0));
        assert_eq!(b.largest_axis(), 0);
        assert_eq!(b.centroid(), Point3f::new(2.0, 0.5, 1.0));
    }

    #[test]
    fn test_bounds3f_intersect_range() {
        let b = Bounds3f::with_bounds(Point3f::new(1.0, 1.0, 1.0), Point3f::new(2.0, 2.0, 2.0));
        let hit = b.intersect_range(
            Point3f::new(0.0, 0.0, 0.0),
            Vec3f::new(1.0, 1.0, 1.0),
            0.0,
            Float::MAX,
        );
        assert_eq!(hit, Some((1.0, 2.0)));

        let miss = b.intersect_range(
            Point3f::new(0.0, 0.0, 0.0),
            Vec3f::new(-1.0, 1.0, 1.0),
            0.0,
            Float::MAX,
        );
        assert_eq!(miss, None);
    }
}
