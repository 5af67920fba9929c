use crate::accel::{HasPosition, PointKdTree};
use crate::color::Rgb;
use crate::{Float, Point3f, Vec3f, INV_PI};
use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// One stored light-transport sample: where it landed, where it came
/// from, and the power it carries.
#[derive(Debug, Clone, Copy)]
pub struct Photon {
    pub pos: Point3f,
    pub dir: Vec3f,
    pub col: Rgb,
}

impl HasPosition for Photon {
    fn pos(&self) -> Point3f {
        self.pos
    }
}

/// A photon found by a k-nearest lookup, with its squared distance.
#[derive(Debug, Clone, Copy)]
pub struct FoundPhoton {
    pub index: usize,
    pub dist_squared: Float,
}

impl PartialEq for FoundPhoton {
    fn eq(&self, other: &Self) -> bool {
        self.dist_squared == other.dist_squared
    }
}

impl Eq for FoundPhoton {}

impl PartialOrd for FoundPhoton {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        self.dist_squared.partial_cmp(&other.dist_squared)
    }
}

impl Ord for FoundPhoton {
    fn cmp(&self, other: &Self) -> Ordering {
        self.partial_cmp(other).unwrap_or(Ordering::Equal)
    }
}

/// Photon storage plus the point kd-tree used for density estimation.
pub struct PhotonMap {
    tree: Option<PointKdTree<Photon>>,
    num_photons: usize,
    num_paths: usize,
}

impl PhotonMap {
    pub fn build(photons: Vec<Photon>, num_paths: usize, name: &str, num_threads: usize) -> Self {
        let num_photons = photons.len();
        let tree = if photons.is_empty() {
            None
        } else {
            Some(PointKdTree::build(photons, name, num_threads))
        };
        Self {
            tree,
            num_photons,
            num_paths,
        }
    }

    pub fn len(&self) -> usize {
        self.num_photons
    }

    pub fn is_empty(&self) -> bool {
        self.num_photons == 0
    }

    /// Number of photon paths emitted to fill this map; the density
    /// estimate divides by it.
    pub fn num_paths(&self) -> usize {
        self.num_paths
    }

    pub fn photon(&self, index: usize) -> &Photon {
        &self.tree.as_ref().expect("photon index into empty map").data()[index]
    }

    /// k-nearest photons within `radius`. The search radius shrinks as
    /// closer photons displace farther ones, pruning the traversal.
    /// Returns the photons sorted by distance and the final squared
    /// gather radius.
    pub fn gather(&self, p: Point3f, k: usize, radius: Float) -> (Vec<FoundPhoton>, Float) {
        let tree = match &self.tree {
            Some(t) => t,
            None => return (Vec::new(), radius * radius),
        };
        let mut heap: BinaryHeap<FoundPhoton> = BinaryHeap::with_capacity(k + 1);
        let mut max_dist2 = radius * radius;

        tree.lookup(p, &mut max_dist2, |index, _ph, d2, max| {
            heap.push(FoundPhoton {
                index,
                dist_squared: d2,
            });
            if heap.len() > k {
                heap.pop();
            }
            if heap.len() == k {
                if let Some(worst) = heap.peek() {
                    *max = worst.dist_squared;
                }
            }
        });
        (heap.into_sorted_vec(), max_dist2)
    }

    /// Epanechnikov-style kernel weight for a photon at squared distance
    /// `r2` inside gather radius squared `radius2`.
    pub fn kernel(r2: Float, radius2: Float) -> Float {
        if radius2 <= 0.0 {
            return 0.0;
        }
        let inv_r2 = 1.0 / radius2;
        let s = 1.0 - r2 * inv_r2;
        3.0 * inv_r2 * INV_PI * s * s
    }
}
