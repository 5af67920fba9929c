use crate::accel::{NodeArray, PackedNode, KD_MAX_STACK};
use crate::geometry::bounds::Bounds3f;
use crate::{Float, Point3f};
use arrayvec::ArrayVec;
use cgmath::InnerSpace;
use tracing::{info, warn};

/// Elements stored in a `PointKdTree` expose their position.
pub trait HasPosition {
    fn pos(&self) -> Point3f;
}

/// Left-balanced kd-tree over points, used for photon maps. Leaves hold
/// exactly one element; interior nodes split at the median element along
/// the largest bound axis.
pub struct PointKdTree<T> {
    data: Vec<T>,
    nodes: NodeArray,
    bound: Bounds3f,
}

impl<T: HasPosition + Send + Sync> PointKdTree<T> {
    pub fn build(data: Vec<T>, map_name: &str, num_threads: usize) -> Self {
        if data.is_empty() {
            warn!(map = map_name, "point kd-tree over an empty set");
            return Self {
                data,
                nodes: NodeArray::default(),
                bound: Bounds3f::empty(),
            };
        }
        let mut bound = Bounds3f::from_point(data[0].pos());
        for d in &data[1..] {
            bound = bound.join_point(d.pos());
        }

        let max_parallel_level = (num_threads.max(1) as f64).log2().ceil() as usize;
        let mut order: Vec<u32> = (0..data.len() as u32).collect();
        let mut nodes = Vec::with_capacity(2 * data.len());
        build_worker(&data, &mut order, bound, 0, max_parallel_level, &mut nodes);
        info!(
            map = map_name,
            elements = data.len(),
            "point kd-tree built"
        );
        Self {
            data,
            nodes: NodeArray::from_nodes(nodes),
            bound,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn data(&self) -> &[T] {
        &self.data
    }

    /// Visits every element within the (shrinking) search radius around
    /// `p`, passing its index, the element and its squared distance. The
    /// callback may lower `max_dist_squared` to prune the traversal,
    /// which is how k-nearest lookups bound their work.
    pub fn lookup<F>(&self, p: Point3f, max_dist_squared: &mut Float, mut proc: F)
    where
        F: FnMut(usize, &T, Float, &mut Float),
    {
        if self.nodes.is_empty() {
            return;
        }
        // stack entries: far child node plus the parent's split plane
        let mut stack: ArrayVec<[(u32, usize, Float); KD_MAX_STACK]> = ArrayVec::new();
        let mut node_idx = 0u32;

        loop {
            let mut node = self.nodes.get(node_idx as usize);
            while !node.is_leaf() {
                let axis = node.split_axis();
                let split = node.split_pos();
                let (near, far) = if p[axis] <= split {
                    (node_idx + 1, node.right_child())
                } else {
                    (node.right_child(), node_idx + 1)
                };
                if stack.try_push((far, axis, split)).is_err() {
                    break;
                }
                node_idx = near;
                node = self.nodes.get(node_idx as usize);
            }

            if node.is_leaf() {
                let index = node.payload_offset() as usize;
                let datum = &self.data[index];
                let d2 = (datum.pos() - p).magnitude2();
                if d2 < *max_dist_squared {
                    proc(index, datum, d2, max_dist_squared);
                }
            }

            // pop, pruning subtrees beyond the (possibly reduced) radius
            loop {
                match stack.pop() {
                    Some((far, axis, split)) => {
                        let plane_d = p[axis] - split;
                        if plane_d * plane_d <= *max_dist_squared {
                            node_idx = far;
                            break;
                        }
                    }
                    None => return,
                }
            }
        }
    }
}

/// Recursive build over an index slice; nodes are emitted in pre-order
/// with the right-child index patched in afterwards. The first levels run
/// the two halves as parallel rayon tasks building local node arrays that
/// merge with index fixups.
fn build_worker<T: HasPosition + Send + Sync>(
    data: &[T],
    order: &mut [u32],
    node_bound: Bounds3f,
    level: usize,
    max_parallel_level: usize,
    nodes: &mut Vec<PackedNode>,
) {
    if order.len() == 1 {
        nodes.push(PackedNode::leaf(order[0], 1));
        return;
    }
    let axis = node_bound.largest_axis();
    let mid = order.len() / 2;
    order.select_nth_unstable_by(mid, |&a, &b| {
        let pa = data[a as usize].pos()[axis];
        let pb = data[b as usize].pos()[axis];
        pa.partial_cmp(&pb)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.cmp(&b))
    });
    let split_pos = data[order[mid] as usize].pos()[axis];

    let cur = nodes.len();
    nodes.push(PackedNode::interior(axis, split_pos));

    let mut bound_l = node_bound;
    bound_l.max[axis] = split_pos;
    let mut bound_r = node_bound;
    bound_r.min[axis] = split_pos;

    let (left, right) = order.split_at_mut(mid);
    if level < max_parallel_level {
        let mut left_nodes = Vec::new();
        let mut right_nodes = Vec::new();
        rayon::join(
            || build_worker(data, left, bound_l, level + 1, max_parallel_level, &mut left_nodes),
            || build_worker(data, right, bound_r, level + 1, max_parallel_level, &mut right_nodes),
        );
        let base = nodes.len() as u32;
        append_sub(nodes, left_nodes, base);
        let right_base = nodes.len() as u32;
        append_sub(nodes, right_nodes, right_base);
        nodes[cur].set_right_child(right_base);
    } else {
        build_worker(data, left, bound_l, level + 1, max_parallel_level, nodes);
        let right_child = nodes.len() as u32;
        nodes[cur].set_right_child(right_child);
        build_worker(data, right, bound_r, level + 1, max_parallel_level, nodes);
    }
}

fn append_sub(nodes: &mut Vec<PackedNode>, sub: Vec<PackedNode>, base: u32) {
    for mut n in sub {
        if !n.is_leaf() {
            let child = n.right_child() + base;
            n.set_right_child(child);
        }
        nodes.push(n);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};
    use rand_xoshiro::Xoshiro256Plus;

    struct Pt(Point3f);

    impl HasPosition for Pt {
        fn pos(&self) -> Point3f {
            self.0
        }
    }

    fn random_points(n: usize, seed: u64) -> Vec<Pt> {
        let mut rng = Xoshiro256Plus::seed_from_u64(seed);
        (0..n)
            .map(|_| {
                Pt(Point3f::new(
                    rng.gen_range(-5.0, 5.0),
                    rng.gen_range(-5.0, 5.0),
                    rng.gen_range(-5.0, 5.0),
                ))
            })
            .collect()
    }

    #[test]
    fn test_lookup_finds_all_in_radius() {
        let pts = random_points(500, 1);
        let reference = random_points(500, 1);
        let tree = PointKdTree::build(pts, "test", 4);

        let query = Point3f::new(0.5, -0.5, 1.0);
        let radius2 = 2.0;

        let mut found = Vec::new();
        let mut max_d2 = radius2;
        tree.lookup(query, &mut max_d2, |_i, _pt, d2, _max| {
            found.push(d2);
        });

        let expected: Vec<Float> = reference
            .iter()
            .map(|p| (p.pos() - query).magnitude2())
            .filter(|&d2| d2 < radius2)
            .collect();

        assert_eq!(found.len(), expected.len());
    }

    #[test]
    fn test_lookup_radius_shrink_prunes() {
        // emulate a k-nearest query: keep the 4 closest, shrinking the
        // radius as better candidates arrive
        let pts = random_points(300, 9);
        let reference = random_points(300, 9);
        let tree = PointKdTree::build(pts, "test", 1);
        let query = Point3f::new(1.0, 1.0, 1.0);

        let k = 4;
        let mut heap: Vec<Float> = Vec::new();
        let mut max_d2 = Float::MAX;
        tree.lookup(query, &mut max_d2, |_i, _pt, d2, max| {
            heap.push(d2);
            heap.sort_by(|a, b| a.partial_cmp(b).unwrap());
            if heap.len() > k {
                heap.truncate(k);
                *max = heap[k - 1];
            }
        });

        let mut dists: Vec<Float> = reference
            .iter()
            .map(|p| (p.pos() - query).magnitude2())
            .collect();
        dists.sort_by(|a, b| a.partial_cmp(b).unwrap());
        for i in 0..k {
            assert!((heap[i] - dists[i]).abs() < 1e-6);
        }
    }

    #[test]
    fn test_empty_tree_lookup() {
        let tree: PointKdTree<Pt> = PointKdTree::build(Vec::new(), "empty", 2);
        let mut max_d2 = 1.0;
        let mut count = 0;
        tree.lookup(Point3f::new(0.0, 0.0, 0.0), &mut max_d2, |_, _, _, _| count += 1);
        assert_eq!(count, 0);
    }
}
