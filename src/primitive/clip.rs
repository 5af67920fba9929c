//! Polygon-to-box clipping used to tighten primitive bounds during
//! kd-tree construction. Runs in f64: repeated clipping of near-degenerate
//! slivers loses too much precision in single floats.

use crate::geometry::bounds::Bounds3f;
use crate::{Float, Point3f};

/// Clips a convex polygon against all six planes of `bound` with
/// Sutherland-Hodgman, returning the AABB of the surviving polygon.
/// `None` means the polygon lies entirely outside the box.
pub fn clip_polygon_to_bound(vertices: &[[f64; 3]], bound: &Bounds3f) -> Option<Bounds3f> {
    if vertices.len() < 3 {
        return None;
    }
    let mut poly: Vec<[f64; 3]> = vertices.to_vec();
    let mut scratch: Vec<[f64; 3]> = Vec::with_capacity(poly.len() + 4);

    for axis in 0..3 {
        let lower = bound.min[axis] as f64;
        let upper = bound.max[axis] as f64;
        clip_plane(&mut poly, &mut scratch, axis, lower, true);
        if poly.len() < 3 {
            return None;
        }
        clip_plane(&mut poly, &mut scratch, axis, upper, false);
        if poly.len() < 3 {
            return None;
        }
    }

    let mut b = Bounds3f::empty();
    for v in &poly {
        b = b.join_point(Point3f::new(v[0] as Float, v[1] as Float, v[2] as Float));
    }
    // guard against slivers collapsing below the box due to rounding
    Some(b.intersection(bound))
}

fn clip_plane(poly: &mut Vec<[f64; 3]>, scratch: &mut Vec<[f64; 3]>, axis: usize, pos: f64, keep_above: bool) {
    scratch.clear();
    let inside = |v: &[f64; 3]| {
        if keep_above {
            v[axis] >= pos
        } else {
            v[axis] <= pos
        }
    };
    let n = poly.len();
    for i in 0..n {
        let cur = poly[i];
        let next = poly[(i + 1) % n];
        let cur_in = inside(&cur);
        let next_in = inside(&next);
        if cur_in {
            scratch.push(cur);
        }
        if cur_in != next_in {
            let denom = next[axis] - cur[axis];
            if denom.abs() > 0.0 {
                let t = (pos - cur[axis]) / denom;
                let mut p = [0.0f64; 3];
                for k in 0..3 {
                    p[k] = cur[k] + t * (next[k] - cur[k]);
                }
                p[axis] = pos;
                scratch.push(p);
            }
        }
    }
    std::mem::swap(poly, scratch);
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_triangle_straddling_box() {
        // triangle spanning x in [-1, 1]; clip to the x >= 0 half
        let tri = [
            [-1.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [0.0, 1.0, 0.0],
        ];
        let bound = Bounds3f::with_bounds(
            Point3f::new(0.0, -1.0, -1.0),
            Point3f::new(2.0, 2.0, 1.0),
        );
        let clipped = clip_polygon_to_bound(&tri, &bound).unwrap();
        assert_relative_eq!(clipped.min.x, 0.0, epsilon = 1e-6);
        assert_relative_eq!(clipped.max.x, 1.0, epsilon = 1e-6);
        assert_relative_eq!(clipped.max.y, 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_fully_outside_returns_none() {
        let tri = [
            [5.0, 5.0, 5.0],
            [6.0, 5.0, 5.0],
            [5.0, 6.0, 5.0],
        ];
        let bound = Bounds3f::with_bounds(
            Point3f::new(0.0, 0.0, 0.0),
            Point3f::new(1.0, 1.0, 1.0),
        );
        assert!(clip_polygon_to_bound(&tri, &bound).is_none());
    }

    #[test]
    fn test_fully_inside_keeps_bounds() {
        let tri = [
            [0.2, 0.2, 0.5],
            [0.8, 0.2, 0.5],
            [0.2, 0.8, 0.5],
        ];
        let bound = Bounds3f::with_bounds(
            Point3f::new(0.0, 0.0, 0.0),
            Point3f::new(1.0, 1.0, 1.0),
        );
        let clipped = clip_polygon_to_bound(&tri, &bound).unwrap();
        assert_relative_eq!(clipped.min.x, 0.2, epsilon = 1e-6);
        assert_relative_eq!(clipped.max.y, 0.8, epsilon = 1e-6);
    }
}
