//! Per-step consistency protocol.
//!
//! A step runs, in order:
//!
//! 1. generate ghosts from the current real state
//! 2. assemble reals and ghosts with a fresh generation
//! 3. check `identity == index` (spot check, full scan in debug builds)
//! 4. build the tree bound to the new sequence
//!
//! The result is a [`SearchStep`], the only value that exposes a tree, so a
//! query cannot run before the rebuild. Any failure aborts the step.

use std::sync::Arc;

use crate::assembly::{assemble, AssembledSequence};
use crate::boundary::BoundaryConfig;
use crate::error::{KernelError, Result};
use crate::ghost::GhostGenerator;
use crate::neighbor::{NeighborList, NeighborSearch, NeighborSearchConfig};
use crate::particle::RealParticles;
use crate::tree::{SpatialTree, TreeConfig};

/// Runs the per-step pipeline and tracks the current generation.
#[derive(Debug, Clone)]
pub struct StepCoordinator<const D: usize> {
    boundary: BoundaryConfig<D>,
    /// Boundary used for ghosts; periodic axes are dropped when the tree
    /// resolves them by minimum image.
    ghost_boundary: BoundaryConfig<D>,
    tree: TreeConfig<D>,
    /// Build pool shared by every step, created once for `workers > 1`.
    pool: Option<Arc<rayon::ThreadPool>>,
    generation: u64,
}

impl<const D: usize> StepCoordinator<D> {
    /// Validate every parameter once, before any step runs.
    ///
    /// If `tree.periodic` is set it must describe the same periodic axes as
    /// `boundary`; those axes then produce no ghosts.
    pub fn new(boundary: BoundaryConfig<D>, tree: TreeConfig<D>) -> Result<Self> {
        boundary.validate()?;
        tree.validate()?;
        let ghost_boundary = match tree.periodic {
            None => boundary,
            Some(domain) => {
                if boundary.periodic_domain() != Some(domain) {
                    return Err(KernelError::config(
                        "tree periodic domain does not match the periodic boundary axes",
                    ));
                }
                boundary.without_periodic()
            }
        };
        let pool = tree.worker_pool().map(Arc::new);
        tracing::info!(
            dims = D,
            ghost_sides = ghost_boundary.has_active_sides(),
            periodic_images = tree.periodic.is_some(),
            build_threads = pool.as_ref().map(|p| p.current_num_threads()),
            "step coordinator configured"
        );
        Ok(Self {
            boundary,
            ghost_boundary,
            tree,
            pool,
            generation: 0,
        })
    }

    /// Generation of the most recently prepared step (0 before the first).
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Boundary configuration.
    pub fn boundary(&self) -> &BoundaryConfig<D> {
        &self.boundary
    }

    /// Tree parameters.
    pub fn tree_config(&self) -> &TreeConfig<D> {
        &self.tree
    }

    /// Threads of the dedicated build pool, if one is in use.
    pub fn build_threads(&self) -> Option<usize> {
        self.pool.as_ref().map(|p| p.current_num_threads())
    }

    /// Prepare a step with the radius derived from the smoothing lengths.
    pub fn prepare(&mut self, real: &RealParticles<D>) -> Result<SearchStep<D>> {
        let radius = real.kernel_support_radius(self.tree.support_factor)?;
        self.prepare_with_radius(real, radius)
    }

    /// Prepare a step with a solver-supplied interaction radius.
    pub fn prepare_with_radius(
        &mut self,
        real: &RealParticles<D>,
        interaction_radius: f64,
    ) -> Result<SearchStep<D>> {
        if !(interaction_radius.is_finite() && interaction_radius >= 0.0) {
            return Err(KernelError::config(format!(
                "interaction radius must be finite and non-negative, got {interaction_radius}"
            )));
        }
        if let Some(domain) = &self.tree.periodic {
            for d in (0..D).filter(|&d| domain.is_periodic(d)) {
                if interaction_radius >= 0.5 * domain.extent(d) {
                    return Err(KernelError::config(format!(
                        "interaction radius {interaction_radius} must be below half the period of axis {d}"
                    )));
                }
            }
        }

        // 1. Ghosts
        let ghosts = GhostGenerator::generate(real, &self.ghost_boundary, interaction_radius)?;

        // 2. Assemble
        self.generation += 1;
        let sequence = assemble(real, &ghosts, self.generation)?;

        // 3. Identity check
        sequence.spot_check()?;
        if cfg!(debug_assertions) {
            sequence.validate_identities()?;
        }

        // 4. Rebuild
        let tree = SpatialTree::build_in(&sequence, &self.tree, self.pool.as_deref())?;
        tree.verify_binding(&sequence)?;

        tracing::debug!(
            generation = self.generation,
            reals = sequence.real_count(),
            ghosts = sequence.ghost_count(),
            radius = interaction_radius,
            "search step prepared"
        );
        Ok(SearchStep {
            tree,
            interaction_radius,
        })
    }

    /// Fail if `step` is not the most recently prepared one.
    pub fn ensure_current(&self, step: &SearchStep<D>) -> Result<()> {
        if step.generation() == self.generation {
            Ok(())
        } else {
            Err(KernelError::consistency(format!(
                "stale step: generation {} used after generation {} was prepared",
                step.generation(),
                self.generation
            )))
        }
    }
}

/// Everything a calculator may read during one step.
#[derive(Debug, Clone)]
pub struct SearchStep<const D: usize> {
    tree: SpatialTree<D>,
    interaction_radius: f64,
}

impl<const D: usize> SearchStep<D> {
    /// The assembled sequence of this step.
    pub fn sequence(&self) -> &AssembledSequence<D> {
        self.tree.sequence()
    }

    /// The tree of this step.
    pub fn tree(&self) -> &SpatialTree<D> {
        &self.tree
    }

    /// Generation of this step.
    pub fn generation(&self) -> u64 {
        self.tree.generation()
    }

    /// Radius ghosts were generated for.
    pub fn interaction_radius(&self) -> f64 {
        self.interaction_radius
    }

    /// Number of real particles.
    pub fn real_count(&self) -> usize {
        self.sequence().real_count()
    }

    /// Number of ghosts.
    pub fn ghost_count(&self) -> usize {
        self.sequence().ghost_count()
    }

    /// Gather-mode neighbors of `index` within `radius`.
    pub fn query_neighbors(&self, index: usize, radius: f64) -> Result<NeighborList> {
        self.tree.query_neighbors(index, radius)
    }

    /// Neighbors of `index` under an explicit search configuration.
    pub fn query_neighbors_with(
        &self,
        index: usize,
        radius: f64,
        config: &NeighborSearchConfig,
    ) -> Result<NeighborList> {
        self.tree.query_neighbors_with(index, radius, config)
    }

    /// Barnes–Hut aggregate on `index`.
    pub fn compute_aggregate(&self, index: usize) -> Result<[f64; D]> {
        self.tree.compute_aggregate(index)
    }
}
