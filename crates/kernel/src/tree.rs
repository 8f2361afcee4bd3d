//! Barnes–Hut spatial tree bound to one assembled sequence.
//!
//! The tree is a 2^D-ary partition of the bounding cube of the sequence,
//! stored as an arena of nodes. Bucket membership is a permutation of
//! `0..N` owned by the tree: every node covers a contiguous `start..start +
//! count` range of it. Nothing is written back into the particles, so a
//! rebuild never sees state left over from an earlier step.
//!
//! Neighbor queries and the monopole aggregate share one explicit-stack
//! traversal. Once built, the tree is immutable and can be queried from any
//! number of threads.

use rayon::prelude::*;

use crate::assembly::AssembledSequence;
use crate::boundary::{axis_gap, PeriodicDomain};
use crate::error::{KernelError, Result};
use crate::neighbor::{
    check_query, distance_squared, finalize, pair_radius, Hit, NeighborList, NeighborSearch,
    NeighborSearchConfig,
};
use crate::particle::{Particle, DEFAULT_SUPPORT_FACTOR};

/// Subtrees with fewer particles than this are built on the current thread.
const PARALLEL_THRESHOLD: usize = 2048;

/// Tree construction and traversal parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TreeConfig<const D: usize> {
    /// Deepest level a node may be split to.
    pub max_level: u32,
    /// Largest particle count a leaf holds before it is split.
    pub leaf_capacity: usize,
    /// Barnes–Hut opening angle: a node is used as a point mass when
    /// `edge / distance < theta`.
    pub theta: f64,
    /// Coupling constant of the aggregate.
    pub gravitational_constant: f64,
    /// Plummer softening length of the aggregate.
    pub softening: f64,
    /// Kernel support in units of the smoothing length.
    pub support_factor: f64,
    /// `0` uses the current rayon pool, `1` builds sequentially, `n` builds
    /// in a dedicated pool of `n` threads.
    pub workers: usize,
    /// Measure neighbor distances with the minimum-image convention.
    pub periodic: Option<PeriodicDomain<D>>,
}

impl<const D: usize> Default for TreeConfig<D> {
    fn default() -> Self {
        Self {
            max_level: 20,
            leaf_capacity: 8,
            theta: 0.5,
            gravitational_constant: 1.0,
            softening: 0.0,
            support_factor: DEFAULT_SUPPORT_FACTOR,
            workers: 0,
            periodic: None,
        }
    }
}

impl<const D: usize> TreeConfig<D> {
    /// Dedicated build pool for `workers > 1`.
    ///
    /// `None` for `0` and `1`, and when the pool cannot be created, in which
    /// case builds fall back to one thread.
    pub fn worker_pool(&self) -> Option<rayon::ThreadPool> {
        if self.workers <= 1 {
            return None;
        }
        match rayon::ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .build()
        {
            Ok(pool) => Some(pool),
            Err(err) => {
                tracing::warn!(workers = self.workers, %err, "worker pool unavailable, building sequentially");
                None
            }
        }
    }

    /// Check the parameters.
    pub fn validate(&self) -> Result<()> {
        if D == 0 {
            return Err(KernelError::config("tree dimension must be at least 1"));
        }
        if D > 16 {
            return Err(KernelError::config(format!(
                "tree dimension {D} exceeds the supported maximum of 16"
            )));
        }
        if self.max_level > 64 {
            return Err(KernelError::config(format!(
                "max_level must be at most 64, got {}",
                self.max_level
            )));
        }
        if self.leaf_capacity == 0 {
            return Err(KernelError::config("leaf_capacity must be positive"));
        }
        if !(self.theta.is_finite() && self.theta >= 0.0) {
            return Err(KernelError::config(format!(
                "theta must be finite and non-negative, got {}",
                self.theta
            )));
        }
        if !self.gravitational_constant.is_finite() {
            return Err(KernelError::config(format!(
                "gravitational_constant must be finite, got {}",
                self.gravitational_constant
            )));
        }
        if !(self.softening.is_finite() && self.softening >= 0.0) {
            return Err(KernelError::config(format!(
                "softening must be finite and non-negative, got {}",
                self.softening
            )));
        }
        if !(self.support_factor.is_finite() && self.support_factor > 0.0) {
            return Err(KernelError::config(format!(
                "support_factor must be positive, got {}",
                self.support_factor
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Nodes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
struct Node<const D: usize> {
    /// Tight bounding box of the particles below this node.
    lower: [f64; D],
    upper: [f64; D],
    /// Edge length of the cell this node was split from.
    edge: f64,
    mass: f64,
    mass_center: [f64; D],
    /// Largest `support_factor * h` below this node.
    max_support: f64,
    /// Range into the bucket permutation.
    start: u32,
    count: u32,
    level: u32,
    children: Vec<u32>,
}

impl<const D: usize> Node<D> {
    fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    fn range(&self) -> std::ops::Range<usize> {
        self.start as usize..(self.start + self.count) as usize
    }

    fn contains(&self, point: &[f64; D]) -> bool {
        (0..D).all(|d| point[d] >= self.lower[d] && point[d] <= self.upper[d])
    }
}

/// Read-only state shared by every build task.
struct BuildContext<'a, const D: usize> {
    particles: &'a [Particle<D>],
    leaf_capacity: usize,
    max_level: u32,
    support_factor: f64,
    parallel: bool,
}

impl<const D: usize> BuildContext<'_, D> {
    /// Build the subtree over `items`, which sit at `base..` in the bucket.
    /// The returned arena has the subtree root at index 0.
    fn build(
        &self,
        items: &mut [u32],
        base: usize,
        center: [f64; D],
        edge: f64,
        level: u32,
    ) -> Vec<Node<D>> {
        if items.len() <= self.leaf_capacity || level >= self.max_level {
            return vec![self.leaf(items, base, edge, level)];
        }

        // 1. Stable partition into child cells
        let slots = 1usize << D;
        let mut counts = vec![0usize; slots];
        let slot_of = |j: u32| -> usize {
            let p = &self.particles[j as usize].position;
            (0..D).fold(0, |s, d| s | (usize::from(p[d] >= center[d]) << d))
        };
        for &j in items.iter() {
            counts[slot_of(j)] += 1;
        }
        let mut heads = Vec::with_capacity(slots);
        let mut running = 0;
        for &c in &counts {
            heads.push(running);
            running += c;
        }
        let snapshot = items.to_vec();
        for j in snapshot {
            let s = slot_of(j);
            items[heads[s]] = j;
            heads[s] += 1;
        }

        // 2. Split the bucket into disjoint child ranges
        let half = 0.5 * edge;
        let mut tasks = Vec::new();
        let mut rest = items;
        let mut offset = base;
        for (slot, &count) in counts.iter().enumerate() {
            let (chunk, tail) = std::mem::take(&mut rest).split_at_mut(count);
            rest = tail;
            if count > 0 {
                let mut child_center = center;
                for (d, c) in child_center.iter_mut().enumerate() {
                    let sign = if slot & (1 << d) != 0 { 1.0 } else { -1.0 };
                    *c += sign * 0.5 * half;
                }
                tasks.push((chunk, offset, child_center));
            }
            offset += count;
        }

        // 3. Build children, possibly in parallel, in child order
        let subtrees: Vec<Vec<Node<D>>> = if self.parallel && tasks.len() > 1 {
            let total: usize = tasks.iter().map(|t| t.0.len()).sum();
            if total >= PARALLEL_THRESHOLD {
                tasks
                    .into_par_iter()
                    .map(|(chunk, off, c)| self.build(chunk, off, c, half, level + 1))
                    .collect()
            } else {
                tasks
                    .into_iter()
                    .map(|(chunk, off, c)| self.build(chunk, off, c, half, level + 1))
                    .collect()
            }
        } else {
            tasks
                .into_iter()
                .map(|(chunk, off, c)| self.build(chunk, off, c, half, level + 1))
                .collect()
        };

        // 4. Merge with fixed offsets
        let node_total = 1 + subtrees.iter().map(Vec::len).sum::<usize>();
        let mut arena = Vec::with_capacity(node_total);
        arena.push(Node {
            lower: [f64::INFINITY; D],
            upper: [f64::NEG_INFINITY; D],
            edge,
            mass: 0.0,
            mass_center: [0.0; D],
            max_support: 0.0,
            start: base as u32,
            count: 0,
            level,
            children: Vec::with_capacity(subtrees.len()),
        });
        for subtree in subtrees {
            let shift = arena.len() as u32;
            arena[0].children.push(shift);
            for mut node in subtree {
                for child in &mut node.children {
                    *child += shift;
                }
                arena.push(node);
            }
        }
        let root = self.aggregate(&arena);
        arena[0] = root;
        arena
    }

    fn leaf(&self, items: &[u32], base: usize, edge: f64, level: u32) -> Node<D> {
        let mut node = Node {
            lower: [f64::INFINITY; D],
            upper: [f64::NEG_INFINITY; D],
            edge,
            mass: 0.0,
            mass_center: [0.0; D],
            max_support: 0.0,
            start: base as u32,
            count: items.len() as u32,
            level,
            children: Vec::new(),
        };
        let mut weighted = [0.0; D];
        for &j in items {
            let p = &self.particles[j as usize];
            for d in 0..D {
                node.lower[d] = node.lower[d].min(p.position[d]);
                node.upper[d] = node.upper[d].max(p.position[d]);
                weighted[d] += p.mass * p.position[d];
            }
            node.mass += p.mass;
            node.max_support = node.max_support.max(self.support_factor * p.smoothing_length);
        }
        node.mass_center = mass_center(weighted, node.mass, &node.lower, &node.upper);
        node
    }

    /// Fold the children of `arena[0]` into it.
    fn aggregate(&self, arena: &[Node<D>]) -> Node<D> {
        let mut node = arena[0].clone();
        let mut weighted = [0.0; D];
        for &c in &node.children {
            let child = &arena[c as usize];
            for d in 0..D {
                node.lower[d] = node.lower[d].min(child.lower[d]);
                node.upper[d] = node.upper[d].max(child.upper[d]);
                weighted[d] += child.mass * child.mass_center[d];
            }
            node.mass += child.mass;
            node.count += child.count;
            node.max_support = node.max_support.max(child.max_support);
        }
        node.mass_center = mass_center(weighted, node.mass, &node.lower, &node.upper);
        node
    }
}

/// Mass-weighted centre, or the box centre for massless nodes.
fn mass_center<const D: usize>(
    weighted: [f64; D],
    mass: f64,
    lower: &[f64; D],
    upper: &[f64; D],
) -> [f64; D] {
    let mut c = [0.0; D];
    for d in 0..D {
        c[d] = if mass > 0.0 {
            weighted[d] / mass
        } else {
            0.5 * (lower[d] + upper[d])
        };
    }
    c
}

// ---------------------------------------------------------------------------
// SpatialTree
// ---------------------------------------------------------------------------

/// Spatial index over exactly one [`AssembledSequence`].
#[derive(Debug, Clone)]
pub struct SpatialTree<const D: usize> {
    sequence: AssembledSequence<D>,
    config: TreeConfig<D>,
    nodes: Vec<Node<D>>,
    bucket: Vec<u32>,
    depth: u32,
}

impl<const D: usize> SpatialTree<D> {
    /// Build a tree bound to `sequence`.
    ///
    /// With `workers > 1` this creates a pool for the one build; callers
    /// that rebuild every step should hold a pool and use [`Self::build_in`].
    pub fn build(sequence: &AssembledSequence<D>, config: &TreeConfig<D>) -> Result<Self> {
        Self::build_in(sequence, config, config.worker_pool().as_ref())
    }

    /// Build a tree bound to `sequence`, running a multi-worker build in
    /// `pool`. Without a pool, `workers > 1` builds on one thread.
    pub fn build_in(
        sequence: &AssembledSequence<D>,
        config: &TreeConfig<D>,
        pool: Option<&rayon::ThreadPool>,
    ) -> Result<Self> {
        config.validate()?;
        let n = sequence.len();
        if n > u32::MAX as usize {
            return Err(KernelError::capacity(format!(
                "sequence of {n} particles exceeds the tree's 32-bit index space"
            )));
        }
        let particles = sequence.particles();
        if let Some(bad) = particles
            .iter()
            .find(|p| !p.position.iter().all(|x| x.is_finite()))
        {
            return Err(KernelError::config(format!(
                "particle {} has a non-finite position",
                bad.identity()
            )));
        }

        let mut bucket: Vec<u32> = (0..n as u32).collect();
        let nodes = if n == 0 {
            Vec::new()
        } else {
            let (center, edge) = bounding_cube(particles);
            let ctx = BuildContext {
                particles,
                leaf_capacity: config.leaf_capacity,
                max_level: config.max_level,
                support_factor: config.support_factor,
                parallel: config.workers == 0 || (config.workers > 1 && pool.is_some()),
            };
            match pool {
                Some(pool) if config.workers > 1 => {
                    pool.install(|| ctx.build(&mut bucket, 0, center, edge, 0))
                }
                _ => ctx.build(&mut bucket, 0, center, edge, 0),
            }
        };

        let depth = nodes.iter().map(|node| node.level).max().unwrap_or(0);
        let tree = Self {
            sequence: sequence.clone(),
            config: *config,
            nodes,
            bucket,
            depth,
        };
        tracing::info!(
            generation = sequence.generation(),
            particles = n,
            nodes = tree.node_count(),
            leaves = tree.leaf_count(),
            depth,
            "built spatial tree"
        );
        Ok(tree)
    }

    /// The sequence this tree was built from.
    pub fn sequence(&self) -> &AssembledSequence<D> {
        &self.sequence
    }

    /// Generation of the bound sequence.
    pub fn generation(&self) -> u64 {
        self.sequence.generation()
    }

    /// Parameters the tree was built with.
    pub fn config(&self) -> &TreeConfig<D> {
        &self.config
    }

    /// Fail unless `expected` is the very buffer this tree was built from.
    ///
    /// An equal-valued copy is rejected.
    pub fn verify_binding(&self, expected: &AssembledSequence<D>) -> Result<()> {
        if self.sequence.same_buffer(expected) {
            Ok(())
        } else {
            Err(KernelError::consistency(format!(
                "tree built from generation {} is bound to a different sequence (got generation {})",
                self.sequence.generation(),
                expected.generation()
            )))
        }
    }

    /// Number of nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of leaves.
    pub fn leaf_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_leaf()).count()
    }

    /// Deepest level reached (root is level 0).
    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// Bucket permutation, leaf by leaf.
    pub(crate) fn bucket(&self) -> &[u32] {
        &self.bucket
    }

    /// Raw candidates of a query, before finalisation.
    pub(crate) fn collect_hits(
        &self,
        index: usize,
        radius: f64,
        config: &NeighborSearchConfig,
    ) -> Vec<Hit> {
        let particles = self.sequence.particles();
        let periodic = self.config.periodic.as_ref();
        let q = particles[index].position;
        let mut hits = Vec::new();
        let mut stack: Vec<u32> = Vec::with_capacity(64);
        if !self.nodes.is_empty() {
            stack.push(0);
        }

        while let Some(id) = stack.pop() {
            let node = &self.nodes[id as usize];
            let reach = pair_radius(config.mode, radius, node.max_support);
            let gap2 = match periodic {
                Some(domain) => domain.box_gap_squared(&q, &node.lower, &node.upper),
                None => (0..D)
                    .map(|d| axis_gap(q[d], node.lower[d], node.upper[d]).powi(2))
                    .sum(),
            };
            if gap2 > reach * reach {
                continue;
            }
            if !node.is_leaf() {
                stack.extend(node.children.iter().rev());
                continue;
            }
            for &j in &self.bucket[node.range()] {
                let j = j as usize;
                if j == index {
                    continue;
                }
                let p = &particles[j];
                let d2 = distance_squared(&q, &p.position, periodic);
                let r = pair_radius(
                    config.mode,
                    radius,
                    self.config.support_factor * p.smoothing_length,
                );
                if d2 <= r * r {
                    hits.push(Hit {
                        identity: p.identity(),
                        distance: d2.sqrt(),
                    });
                }
            }
        }
        hits
    }

    /// Gravity-like acceleration on particle `index` from every other
    /// particle, using the Barnes–Hut monopole approximation.
    pub fn compute_aggregate(&self, index: usize) -> Result<[f64; D]> {
        let particles = self.sequence.particles();
        check_query(particles.len(), index, 0.0)?;
        let q = particles[index].position;
        let eps2 = self.config.softening * self.config.softening;
        let g = self.config.gravitational_constant;
        let mut acc = [0.0; D];

        let pull = |acc: &mut [f64; D], mass: f64, at: &[f64; D]| {
            let mut r = [0.0; D];
            let mut r2 = eps2;
            for d in 0..D {
                r[d] = at[d] - q[d];
                r2 += r[d] * r[d];
            }
            if r2 > 0.0 {
                let scale = g * mass / (r2 * r2.sqrt());
                for d in 0..D {
                    acc[d] += scale * r[d];
                }
            }
        };

        let mut stack: Vec<u32> = Vec::with_capacity(64);
        if !self.nodes.is_empty() {
            stack.push(0);
        }
        while let Some(id) = stack.pop() {
            let node = &self.nodes[id as usize];
            if node.is_leaf() {
                for &j in &self.bucket[node.range()] {
                    if j as usize != index {
                        let p = &particles[j as usize];
                        pull(&mut acc, p.mass, &p.position);
                    }
                }
                continue;
            }
            let dist = distance_squared(&q, &node.mass_center, None).sqrt();
            if !node.contains(&q) && dist > 0.0 && node.edge / dist < self.config.theta {
                pull(&mut acc, node.mass, &node.mass_center);
            } else {
                stack.extend(node.children.iter().rev());
            }
        }
        Ok(acc)
    }
}

impl<const D: usize> NeighborSearch<D> for SpatialTree<D> {
    fn sequence(&self) -> &AssembledSequence<D> {
        &self.sequence
    }

    fn query_neighbors_with(
        &self,
        index: usize,
        radius: f64,
        config: &NeighborSearchConfig,
    ) -> Result<NeighborList> {
        let len = self.sequence.len();
        check_query(len, index, radius)?;
        let hits = self.collect_hits(index, radius, config);
        Ok(finalize(index, hits, len, config.max_neighbors))
    }
}

/// Centre and edge of the smallest cube holding every particle.
fn bounding_cube<const D: usize>(particles: &[Particle<D>]) -> ([f64; D], f64) {
    let mut lower = [f64::INFINITY; D];
    let mut upper = [f64::NEG_INFINITY; D];
    for p in particles {
        for d in 0..D {
            lower[d] = lower[d].min(p.position[d]);
            upper[d] = upper[d].max(p.position[d]);
        }
    }
    let mut center = [0.0; D];
    let mut edge: f64 = 0.0;
    for d in 0..D {
        center[d] = 0.5 * (lower[d] + upper[d]);
        edge = edge.max(upper[d] - lower[d]);
    }
    (center, edge)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembly::assemble;
    use crate::neighbor::ExhaustiveSearch;
    use crate::particle::RealParticles;
    use crate::test_support::count_warnings;

    fn grid_2d(n: usize, spacing: f64) -> AssembledSequence<2> {
        let mut reals = RealParticles::new();
        for i in 0..n {
            for j in 0..n {
                reals.push(Particle::real(
                    [i as f64 * spacing, j as f64 * spacing],
                    [0.0; 2],
                    1.0,
                    spacing,
                ));
            }
        }
        assemble(&reals, &[], 0).unwrap()
    }

    #[test]
    fn empty_sequence_builds_empty_tree() {
        let seq = assemble::<3>(&RealParticles::new(), &[], 0).unwrap();
        let tree = SpatialTree::build(&seq, &TreeConfig::default()).unwrap();
        assert_eq!(tree.node_count(), 0);
        assert!(tree.query_neighbors(0, 1.0).is_err());
    }

    #[test]
    fn bucket_is_a_permutation() {
        let seq = grid_2d(20, 0.1);
        let tree = SpatialTree::build(&seq, &TreeConfig::default()).unwrap();
        let mut seen = tree.bucket().to_vec();
        seen.sort_unstable();
        let expected: Vec<u32> = (0..400).collect();
        assert_eq!(seen, expected);
        assert_eq!(tree.nodes[0].count, 400);
        assert!(tree.leaf_count() > 1);
    }

    #[test]
    fn leaves_respect_capacity() {
        let seq = grid_2d(16, 0.1);
        let config = TreeConfig {
            leaf_capacity: 4,
            ..TreeConfig::default()
        };
        let tree = SpatialTree::build(&seq, &config).unwrap();
        for node in tree.nodes.iter().filter(|n| n.is_leaf()) {
            assert!(node.count <= 4 || node.level >= config.max_level);
        }
    }

    #[test]
    fn coincident_particles_stop_at_max_level() {
        let mut reals = RealParticles::new();
        for _ in 0..20 {
            reals.push(Particle::real([1.0, 1.0], [0.0; 2], 1.0, 0.1));
        }
        let seq = assemble(&reals, &[], 0).unwrap();
        let config = TreeConfig {
            max_level: 3,
            leaf_capacity: 2,
            ..TreeConfig::default()
        };
        let tree = SpatialTree::build(&seq, &config).unwrap();
        assert!(tree.depth() <= 3);
        let list = tree.query_neighbors(0, 0.0).unwrap();
        assert_eq!(list.count(), 19);
    }

    #[test]
    fn matches_exhaustive_search_on_grid() {
        let seq = grid_2d(15, 0.1);
        let tree = SpatialTree::build(&seq, &TreeConfig::default()).unwrap();
        let brute = ExhaustiveSearch::new(&seq);
        for i in (0..seq.len()).step_by(7) {
            let a = tree.query_neighbors(i, 0.25).unwrap();
            let b = brute.query_neighbors(i, 0.25).unwrap();
            assert_eq!(a, b, "query {i}");
        }
    }

    #[test]
    fn injected_out_of_range_identity_is_dropped_with_one_warning() {
        let seq = grid_2d(4, 0.1);
        let tree = SpatialTree::build(&seq, &TreeConfig::default()).unwrap();
        let config = NeighborSearchConfig::unbounded();
        let (list, warnings) = count_warnings(|| {
            let mut hits = tree.collect_hits(0, 0.15, &config);
            let genuine = hits.len();
            hits.push(Hit {
                identity: seq.len() + 3,
                distance: 0.01,
            });
            (finalize(0, hits, seq.len(), config.max_neighbors), genuine)
        });
        let (list, genuine) = list;
        assert_eq!(warnings, 1);
        assert_eq!(list.dropped, 1);
        assert_eq!(list.count(), genuine);
        assert!(list.identities.iter().all(|&id| id < seq.len()));
    }

    #[test]
    fn verify_binding_rejects_equal_copy() {
        let mut reals = RealParticles::new();
        for i in 0..10 {
            reals.push(Particle::real([i as f64], [0.0], 1.0, 0.5));
        }
        let a = assemble(&reals, &[], 0).unwrap();
        let b = assemble(&reals, &[], 0).unwrap();
        let tree = SpatialTree::build(&a, &TreeConfig::default()).unwrap();
        assert!(tree.verify_binding(&a).is_ok());
        assert!(tree.verify_binding(&a.clone()).is_ok());
        assert!(matches!(
            tree.verify_binding(&b),
            Err(KernelError::ConsistencyViolation(_))
        ));
    }

    #[test]
    fn aggregate_with_zero_theta_is_direct_sum() {
        let seq = grid_2d(6, 0.3);
        let config = TreeConfig {
            theta: 0.0,
            softening: 0.05,
            leaf_capacity: 2,
            ..TreeConfig::default()
        };
        let tree = SpatialTree::build(&seq, &config).unwrap();
        let particles = seq.particles();
        let i = 7;
        let mut direct = [0.0; 2];
        for (j, p) in particles.iter().enumerate() {
            if j == i {
                continue;
            }
            let r = [
                p.position[0] - particles[i].position[0],
                p.position[1] - particles[i].position[1],
            ];
            let r2 = r[0] * r[0] + r[1] * r[1] + 0.05 * 0.05;
            let s = p.mass / (r2 * r2.sqrt());
            direct[0] += s * r[0];
            direct[1] += s * r[1];
        }
        let acc = tree.compute_aggregate(i).unwrap();
        assert!((acc[0] - direct[0]).abs() < 1e-9, "{acc:?} vs {direct:?}");
        assert!((acc[1] - direct[1]).abs() < 1e-9, "{acc:?} vs {direct:?}");
    }

    #[test]
    fn aggregate_approximation_is_close() {
        let seq = grid_2d(20, 0.05);
        let exact = SpatialTree::build(
            &seq,
            &TreeConfig {
                theta: 0.0,
                ..TreeConfig::default()
            },
        )
        .unwrap();
        let approx = SpatialTree::build(&seq, &TreeConfig::default()).unwrap();
        let a = exact.compute_aggregate(0).unwrap();
        let b = approx.compute_aggregate(0).unwrap();
        let norm = (a[0] * a[0] + a[1] * a[1]).sqrt();
        let err = ((a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2)).sqrt();
        assert!(err / norm < 0.05, "relative error {}", err / norm);
    }

    #[test]
    fn rejects_invalid_config() {
        let seq = grid_2d(2, 0.1);
        let bad = TreeConfig {
            leaf_capacity: 0,
            ..TreeConfig::default()
        };
        assert!(matches!(
            SpatialTree::build(&seq, &bad),
            Err(KernelError::Configuration(_))
        ));
        let bad = TreeConfig {
            theta: f64::NAN,
            ..TreeConfig::default()
        };
        assert!(SpatialTree::build(&seq, &bad).is_err());
    }

    #[test]
    fn tree_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<SpatialTree<3>>();
    }
}
