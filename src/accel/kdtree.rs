use crate::accel::{NodeArray, PackedNode, KD_MAX_STACK};
use crate::geometry::bounds::Bounds3f;
use crate::geometry::ray::Ray;
use crate::primitive::Primitive;
use crate::{Float, Uv};
use arrayvec::ArrayVec;
use tracing::{debug, info};

const MAX_DEPTH: usize = 48;
const LEAF_SIZE: usize = 2;

/// Closest-hit result from a tree query.
#[derive(Debug, Clone, Copy)]
pub struct AccelHit {
    pub t: Float,
    pub uv: Uv,
    pub prim_index: usize,
}

/// Spatial kd-tree over the scene's primitives. Interior nodes split at
/// the spatial median of the largest bound axis, falling back to the
/// object median when one side would be empty; primitives straddling a
/// split go to both children with clip-tightened bounds.
pub struct KdTree {
    prims: Vec<Primitive>,
    nodes: NodeArray,
    prim_indices: Vec<u32>,
    bound: Bounds3f,
}

#[derive(Clone)]
struct BuildPrim {
    index: u32,
    bound: Bounds3f,
}

struct Builder<'a> {
    prims: &'a [Primitive],
    max_parallel_level: usize,
}

impl KdTree {
    pub fn build(prims: Vec<Primitive>, num_threads: usize) -> Self {
        let mut bound = Bounds3f::empty();
        let mut build_prims = Vec::with_capacity(prims.len());
        let mut skipped = 0usize;
        for (i, p) in prims.iter().enumerate() {
            if p.is_degenerate() {
                skipped += 1;
                continue;
            }
            let b = p.bound();
            bound = bound.join(&b);
            build_prims.push(BuildPrim { index: i as u32, bound: b });
        }
        if skipped > 0 {
            debug!(skipped, "degenerate primitives excluded from the tree");
        }
        if build_prims.is_empty() {
            return Self {
                prims,
                nodes: NodeArray::default(),
                prim_indices: Vec::new(),
                bound: Bounds3f::empty(),
            };
        }

        let max_parallel_level = (num_threads.max(1) as f64).log2().ceil() as usize;
        let builder = Builder {
            prims: prims.as_slice(),
            max_parallel_level,
        };
        let mut nodes = Vec::new();
        let mut prim_indices = Vec::new();
        builder.build_worker(build_prims, bound, 0, &mut nodes, &mut prim_indices);
        info!(
            prims = prims.len(),
            nodes = nodes.len(),
            "primitive kd-tree built"
        );
        Self {
            prims,
            nodes: NodeArray::from_nodes(nodes),
            prim_indices,
            bound,
        }
    }

    pub fn bound(&self) -> Bounds3f {
        self.bound
    }

    pub fn prims(&self) -> &[Primitive] {
        &self.prims
    }

    pub fn prim(&self, index: usize) -> &Primitive {
        &self.prims[index]
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Closest intersection in `(ray.tmin, tmax]`. The running `t_hit`
    /// narrows the search window monotonically as leaves are visited.
    pub fn intersect(&self, ray: &Ray, tmax: Float) -> Option<AccelHit> {
        if self.nodes.is_empty() {
            return None;
        }
        let (t_enter, t_exit) = self
            .bound
            .intersect_range(ray.from, ray.dir, ray.tmin.max(0.0), tmax)?;

        let inv_dir = [1.0 / ray.dir.x, 1.0 / ray.dir.y, 1.0 / ray.dir.z];
        let mut stack: ArrayVec<[(u32, Float, Float); KD_MAX_STACK]> = ArrayVec::new();
        let mut node_idx = 0u32;
        let mut t_min = t_enter;
        let mut t_max = t_exit;
        let mut best: Option<AccelHit> = None;
        let mut t_best = tmax;

        loop {
            if t_min > t_best {
                break;
            }
            let node = self.nodes.get(node_idx as usize);
            if node.is_leaf() {
                let offset = node.payload_offset() as usize;
                let count = node.payload_count() as usize;
                for &pi in &self.prim_indices[offset..offset + count] {
                    let prim = &self.prims[pi as usize];
                    if let Some((t, uv)) = prim.intersect(ray.from, ray.dir, ray.time) {
                        if t > ray.tmin && t <= t_best {
                            t_best = t;
                            best = Some(AccelHit {
                                t,
                                uv,
                                prim_index: pi as usize,
                            });
                        }
                    }
                }
                match stack.pop() {
                    Some((idx, smin, smax)) => {
                        node_idx = idx;
                        t_min = smin;
                        t_max = smax;
                    }
                    None => break,
                }
            } else {
                let axis = node.split_axis();
                let split = node.split_pos();
                let t_plane = (split - ray.from[axis]) * inv_dir[axis];

                let below_first = ray.from[axis] < split
                    || (ray.from[axis] == split && ray.dir[axis] <= 0.0);
                let (first, second) = if below_first {
                    (node_idx + 1, node.right_child())
                } else {
                    (node.right_child(), node_idx + 1)
                };

                if t_plane > t_max || t_plane <= 0.0 {
                    node_idx = first;
                } else if t_plane < t_min {
                    node_idx = second;
                } else {
                    if stack.try_push((second, t_plane, t_max)).is_err() {
                        // stack exhausted; fall back to visiting the far
                        // child immediately, losing only efficiency
                        node_idx = second;
                        continue;
                    }
                    node_idx = first;
                    t_max = t_plane;
                }
            }
        }
        best
    }

    /// First-hit-wins occlusion query for opaque shadow rays.
    pub fn any_hit(&self, ray: &Ray, tmax: Float) -> bool {
        if self.nodes.is_empty() {
            return false;
        }
        let range = self
            .bound
            .intersect_range(ray.from, ray.dir, ray.tmin.max(0.0), tmax);
        let (t_enter, t_exit) = match range {
            Some(r) => r,
            None => return false,
        };

        let inv_dir = [1.0 / ray.dir.x, 1.0 / ray.dir.y, 1.0 / ray.dir.z];
        let mut stack: ArrayVec<[(u32, Float, Float); KD_MAX_STACK]> = ArrayVec::new();
        let mut node_idx = 0u32;
        let mut t_min = t_enter;
        let mut t_max = t_exit;

        loop {
            let node = self.nodes.get(node_idx as usize);
            if node.is_leaf() {
                let offset = node.payload_offset() as usize;
                let count = node.payload_count() as usize;
                for &pi in &self.prim_indices[offset..offset + count] {
                    let prim = &self.prims[pi as usize];
                    if let Some((t, _)) = prim.intersect(ray.from, ray.dir, ray.time) {
                        if t > ray.tmin && t <= tmax {
                            return true;
                        }
                    }
                }
                match stack.pop() {
                    Some((idx, smin, smax)) => {
                        node_idx = idx;
                        t_min = smin;
                        t_max = smax;
                    }
                    None => return false,
                }
            } else {
                let axis = node.split_axis();
                let split = node.split_pos();
                let t_plane = (split - ray.from[axis]) * inv_dir[axis];

                let below_first = ray.from[axis] < split
                    || (ray.from[axis] == split && ray.dir[axis] <= 0.0);
                let (first, second) = if below_first {
                    (node_idx + 1, node.right_child())
                } else {
                    (node.right_child(), node_idx + 1)
                };

                if t_plane > t_max || t_plane <= 0.0 {
                    node_idx = first;
                } else if t_plane < t_min {
                    node_idx = second;
                } else {
                    if stack.try_push((second, t_plane, t_max)).is_err() {
                        node_idx = second;
                        continue;
                    }
                    node_idx = first;
                    t_max = t_plane;
                }
            }
        }
    }
}

impl<'a> Builder<'a> {
    /// Recursive build emitting nodes in pre-order. The first
    /// `max_parallel_level` levels hand the right subtree to a rayon task
    /// building into local arrays, merged with index fixups afterwards.
    fn build_worker(
        &self,
        mut items: Vec<BuildPrim>,
        node_bound: Bounds3f,
        level: usize,
        nodes: &mut Vec<PackedNode>,
        prim_indices: &mut Vec<u32>,
    ) {
        if items.len() <= LEAF_SIZE || level >= MAX_DEPTH {
            let offset = prim_indices.len() as u32;
            let count = items.len() as u32;
            for it in &items {
                prim_indices.push(it.index);
            }
            nodes.push(PackedNode::leaf(offset, count));
            return;
        }

        let axis = node_bound.largest_axis();
        let mut split = 0.5 * (node_bound.min[axis] + node_bound.max[axis]);

        let mut left: Vec<BuildPrim> = Vec::new();
        let mut right: Vec<BuildPrim> = Vec::new();
        for it in &items {
            if it.bound.min[axis] < split {
                left.push(it.clone());
            }
            if it.bound.max[axis] >= split {
                right.push(it.clone());
            }
        }

        // midpoint failed to separate anything: fall back to the object
        // median over bound centers
        if left.len() == items.len() && right.len() == items.len()
            || left.is_empty()
            || right.is_empty()
        {
            let mid = items.len() / 2;
            items.sort_by(|a, b| {
                a.bound.centroid()[axis]
                    .partial_cmp(&b.bound.centroid()[axis])
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
            split = items[mid].bound.centroid()[axis];
            left = items[..mid].to_vec();
            right = items[mid..].to_vec();
            if left.is_empty() || right.is_empty() {
                let offset = prim_indices.len() as u32;
                let count = items.len() as u32;
                for it in &items {
                    prim_indices.push(it.index);
                }
                nodes.push(PackedNode::leaf(offset, count));
                return;
            }
        }

        // tighten child bounds of straddling primitives where clipping is
        // available
        let mut bound_l = node_bound;
        bound_l.max[axis] = split;
        let mut bound_r = node_bound;
        bound_r.min[axis] = split;
        left.retain(|it| self.clipped_overlaps(it, &bound_l));
        right.retain(|it| self.clipped_overlaps(it, &bound_r));
        if left.is_empty() || right.is_empty() {
            let offset = prim_indices.len() as u32;
            let count = items.len() as u32;
            for it in &items {
                prim_indices.push(it.index);
            }
            nodes.push(PackedNode::leaf(offset, count));
            return;
        }

        let cur = nodes.len();
        nodes.push(PackedNode::interior(axis, split));

        if level < self.max_parallel_level {
            let mut left_nodes = Vec::new();
            let mut left_indices = Vec::new();
            let mut right_nodes = Vec::new();
            let mut right_indices = Vec::new();
            rayon::join(
                || self.build_worker(left, bound_l, level + 1, &mut left_nodes, &mut left_indices),
                || self.build_worker(right, bound_r, level + 1, &mut right_nodes, &mut right_indices),
            );
            let node_base = nodes.len() as u32;
            let index_base = prim_indices.len() as u32;
            Self::merge(nodes, prim_indices, left_nodes, left_indices, node_base, index_base);
            let right_node_base = nodes.len() as u32;
            let right_index_base = prim_indices.len() as u32;
            Self::merge(nodes, prim_indices, right_nodes, right_indices, right_node_base, right_index_base);
            nodes[cur].set_right_child(right_node_base);
        } else {
            self.build_worker(left, bound_l, level + 1, nodes, prim_indices);
            let right_child = nodes.len() as u32;
            nodes[cur].set_right_child(right_child);
            self.build_worker(right, bound_r, level + 1, nodes, prim_indices);
        }
    }

    /// Appends a locally-built subtree, offsetting its child and payload
    /// indices into the global arrays.
    fn merge(
        nodes: &mut Vec<PackedNode>,
        prim_indices: &mut Vec<u32>,
        sub_nodes: Vec<PackedNode>,
        sub_indices: Vec<u32>,
        node_base: u32,
        index_base: u32,
    ) {
        for mut n in sub_nodes {
            if n.is_leaf() {
                let offset = n.payload_offset() + index_base;
                n = PackedNode::leaf(offset, n.payload_count());
            } else {
                let child = n.right_child() + node_base;
                n.set_right_child(child);
            }
            nodes.push(n);
        }
        prim_indices.extend(sub_indices);
    }

    fn clipped_overlaps(&self, it: &BuildPrim, child_bound: &Bounds3f) -> bool {
        let prim = &self.prims[it.index as usize];
        if prim.clipping_support() {
            prim.clip_to_bound(child_bound).is_some()
        } else {
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::mesh::MeshObject;
    use crate::primitive::TrianglePrimitive;
    use crate::scene::ObjectId;
    use crate::{Point3f, Vec3f};
    use cgmath::InnerSpace;
    use rand::{Rng, SeedableRng};
    use rand_xoshiro::Xoshiro256Plus;
    use std::sync::Arc;

    fn random_triangle_soup(n: usize, seed: u64) -> Vec<Primitive> {
        let mut rng = Xoshiro256Plus::seed_from_u64(seed);
        let mut mesh = MeshObject::new("soup", 1);
        for _ in 0..n {
            let base = Point3f::new(
                rng.gen_range(-10.0, 10.0),
                rng.gen_range(-10.0, 10.0),
                rng.gen_range(-10.0, 10.0),
            );
            let a = mesh.add_vertex(base);
            let b = mesh.add_vertex(base + Vec3f::new(rng.gen_range(0.1, 1.0), 0.0, rng.gen_range(-0.5, 0.5)));
            let c = mesh.add_vertex(base + Vec3f::new(0.0, rng.gen_range(0.1, 1.0), rng.gen_range(-0.5, 0.5)));
            mesh.add_triangle([a, b, c]);
        }
        let mesh = Arc::new(mesh);
        (0..n)
            .map(|i| {
                Primitive::Triangle(TrianglePrimitive::new(Arc::clone(&mesh), i as u32, ObjectId(0)))
            })
            .collect()
    }

    #[test]
    fn test_tree_matches_brute_force() {
        let prims = random_triangle_soup(200, 42);
        let brute: Vec<Primitive> = random_triangle_soup(200, 42);
        let tree = KdTree::build(prims, 4);

        let mut rng = Xoshiro256Plus::seed_from_u64(7);
        let mut hits = 0;
        for _ in 0..500 {
            let from = Point3f::new(
                rng.gen_range(-15.0, 15.0),
                rng.gen_range(-15.0, 15.0),
                -20.0,
            );
            let dir = Vec3f::new(
                rng.gen_range(-0.3, 0.3),
                rng.gen_range(-0.3, 0.3),
                1.0,
            )
            .normalize();
            let ray = Ray::new(from, dir, 0.0);

            let tree_hit = tree.intersect(&ray, crate::INFINITY);
            let mut best: Option<(Float, usize)> = None;
            for (i, p) in brute.iter().enumerate() {
                if let Some((t, _)) = p.intersect(from, dir, 0.0) {
                    if best.map_or(true, |(bt, _)| t < bt) {
                        best = Some((t, i));
                    }
                }
            }
            match (tree_hit, best) {
                (Some(th), Some((bt, bi))) => {
                    hits += 1;
                    assert!((th.t - bt).abs() < 1e-4, "t mismatch: {} vs {}", th.t, bt);
                    assert_eq!(th.prim_index, bi);
                }
                (None, None) => {}
                (a, b) => panic!("tree/brute disagreement: {:?} vs {:?}", a.map(|h| h.t), b),
            }
        }
        assert!(hits > 20, "test scene produced too few hits ({})", hits);
    }

    #[test]
    fn test_any_hit_consistent_with_intersect() {
        let prims = random_triangle_soup(100, 3);
        let tree = KdTree::build(prims, 2);
        let mut rng = Xoshiro256Plus::seed_from_u64(11);
        for _ in 0..200 {
            let from = Point3f::new(rng.gen_range(-12.0, 12.0), rng.gen_range(-12.0, 12.0), -15.0);
            let dir = Vec3f::new(rng.gen_range(-0.2, 0.2), rng.gen_range(-0.2, 0.2), 1.0).normalize();
            let ray = Ray::new(from, dir, 0.0);
            let closest = tree.intersect(&ray, crate::INFINITY);
            assert_eq!(tree.any_hit(&ray, crate::INFINITY), closest.is_some());
        }
    }

    #[test]
    fn test_tmax_narrows_results() {
        let prims = random_triangle_soup(50, 9);
        let tree = KdTree::build(prims, 1);
        let ray = Ray::new(Point3f::new(0.0, 0.0, -20.0), Vec3f::new(0.0, 0.0, 1.0), 0.0);
        if let Some(hit) = tree.intersect(&ray, crate::INFINITY) {
            // shrinking tmax below the hit distance must turn it into a miss
            assert!(tree.intersect(&ray, hit.t - 0.01).is_none());
            // and a hit is always within the window
            assert!(hit.t <= crate::INFINITY);
        }
    }

    #[test]
    fn test_empty_tree() {
        let tree = KdTree::build(Vec::new(), 4);
        let ray = Ray::new(Point3f::new(0.0, 0.0, 0.0), Vec3f::new(0.0, 0.0, 1.0), 0.0);
        assert!(tree.intersect(&ray, crate::INFINITY).is_none());
        assert!(!tree.any_hit(&ray, crate::INFINITY));
    }
}
