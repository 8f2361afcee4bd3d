//! Neighbor query types and the exhaustive reference search.
//!
//! Every search (tree or brute force) collects raw [`Hit`]s and passes them
//! through [`finalize`], so ordering, truncation and the handling of invalid
//! identities are identical everywhere.

use crate::assembly::AssembledSequence;
use crate::boundary::PeriodicDomain;
use crate::error::{KernelError, Result};
use crate::particle::DEFAULT_SUPPORT_FACTOR;

/// Multiplier from the expected neighbor count to the list capacity.
pub const NEIGHBOR_SAFETY_FACTOR: usize = 20;

/// Which radius decides whether a pair is neighbors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchMode {
    /// Only the query radius counts.
    #[default]
    Gather,
    /// A pair also counts when the query lies inside the neighbor's own
    /// kernel support (`support_factor * h_j`).
    Symmetric,
}

/// Capacity and mode of a neighbor query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NeighborSearchConfig {
    /// Longest list a query may return. Nearest neighbors are kept.
    pub max_neighbors: usize,
    /// Pair acceptance rule.
    pub mode: SearchMode,
}

impl NeighborSearchConfig {
    /// Capacity sized from the expected neighbor count.
    ///
    /// `max_neighbors = neighbor_number * NEIGHBOR_SAFETY_FACTOR`.
    pub fn create(neighbor_number: usize, symmetric: bool) -> Result<Self> {
        if neighbor_number == 0 {
            return Err(KernelError::config("neighbor_number must be positive"));
        }
        let max_neighbors = neighbor_number
            .checked_mul(NEIGHBOR_SAFETY_FACTOR)
            .ok_or_else(|| {
                KernelError::config(format!("neighbor_number {neighbor_number} is too large"))
            })?;
        Ok(Self {
            max_neighbors,
            mode: if symmetric {
                SearchMode::Symmetric
            } else {
                SearchMode::Gather
            },
        })
    }

    /// No capacity limit, gather mode.
    pub fn unbounded() -> Self {
        Self {
            max_neighbors: usize::MAX,
            mode: SearchMode::Gather,
        }
    }
}

impl Default for NeighborSearchConfig {
    fn default() -> Self {
        Self::unbounded()
    }
}

/// One raw candidate before finalisation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Hit {
    pub identity: usize,
    pub distance: f64,
}

/// Result of a neighbor query, ordered by ascending distance (ties by
/// ascending identity).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NeighborList {
    /// Neighbor identities.
    pub identities: Vec<usize>,
    /// Distances, parallel to `identities`.
    pub distances: Vec<f64>,
    /// Number of in-range candidates found before truncation.
    pub candidates: usize,
    /// Set when the list was cut to the configured capacity.
    pub truncated: bool,
    /// Candidates discarded because their identity was out of range.
    pub dropped: usize,
}

impl NeighborList {
    /// Number of neighbors returned.
    pub fn count(&self) -> usize {
        self.identities.len()
    }

    /// Return `true` if no neighbor was returned.
    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }

    /// `(identity, distance)` pairs in order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.identities
            .iter()
            .copied()
            .zip(self.distances.iter().copied())
    }
}

/// Drop invalid identities, sort, then cut to capacity.
///
/// At most one warning is emitted per query for dropped identities.
pub(crate) fn finalize(
    query: usize,
    mut hits: Vec<Hit>,
    bound_len: usize,
    max_neighbors: usize,
) -> NeighborList {
    let before = hits.len();
    hits.retain(|h| h.identity < bound_len);
    let dropped = before - hits.len();
    if dropped > 0 {
        tracing::warn!(
            query,
            dropped,
            bound_len,
            "dropping neighbor candidates with out-of-range identity"
        );
    }

    hits.sort_by(|a, b| {
        a.distance
            .total_cmp(&b.distance)
            .then(a.identity.cmp(&b.identity))
    });

    let candidates = hits.len();
    let truncated = candidates > max_neighbors;
    if truncated {
        tracing::warn!(
            query,
            candidates,
            max_neighbors,
            "neighbor list truncated to capacity"
        );
        hits.truncate(max_neighbors);
    }

    NeighborList {
        identities: hits.iter().map(|h| h.identity).collect(),
        distances: hits.iter().map(|h| h.distance).collect(),
        candidates,
        truncated,
        dropped,
    }
}

/// Reject a bad query index or radius before any traversal.
pub(crate) fn check_query(len: usize, index: usize, radius: f64) -> Result<()> {
    if index >= len {
        return Err(KernelError::consistency(format!(
            "query index {index} out of range for sequence of length {len}"
        )));
    }
    if !(radius.is_finite() && radius >= 0.0) {
        return Err(KernelError::config(format!(
            "search radius must be finite and non-negative, got {radius}"
        )));
    }
    Ok(())
}

/// Squared distance between two points, minimum-image when `periodic` is set.
#[inline]
pub(crate) fn distance_squared<const D: usize>(
    a: &[f64; D],
    b: &[f64; D],
    periodic: Option<&PeriodicDomain<D>>,
) -> f64 {
    match periodic {
        Some(domain) => domain.displacement(a, b).iter().map(|d| d * d).sum(),
        None => a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum(),
    }
}

/// Acceptance radius of a pair under `mode`.
#[inline]
pub(crate) fn pair_radius(mode: SearchMode, radius: f64, support_j: f64) -> f64 {
    match mode {
        SearchMode::Gather => radius,
        SearchMode::Symmetric => radius.max(support_j),
    }
}

/// A neighbor search bound to one assembled sequence.
pub trait NeighborSearch<const D: usize> {
    /// The sequence every returned identity refers to.
    fn sequence(&self) -> &AssembledSequence<D>;

    /// Neighbors of `index` within `radius` under `config`.
    fn query_neighbors_with(
        &self,
        index: usize,
        radius: f64,
        config: &NeighborSearchConfig,
    ) -> Result<NeighborList>;

    /// Gather-mode neighbors of `index` within `radius`, no capacity limit.
    fn query_neighbors(&self, index: usize, radius: f64) -> Result<NeighborList> {
        self.query_neighbors_with(index, radius, &NeighborSearchConfig::unbounded())
    }
}

/// Brute-force O(N) per query search, used as a reference for the tree.
#[derive(Debug, Clone)]
pub struct ExhaustiveSearch<const D: usize> {
    sequence: AssembledSequence<D>,
    support_factor: f64,
    periodic: Option<PeriodicDomain<D>>,
}

impl<const D: usize> ExhaustiveSearch<D> {
    /// Bind to `sequence`.
    pub fn new(sequence: &AssembledSequence<D>) -> Self {
        Self {
            sequence: sequence.clone(),
            support_factor: DEFAULT_SUPPORT_FACTOR,
            periodic: None,
        }
    }

    /// Kernel support factor used in symmetric mode.
    pub fn with_support_factor(mut self, support_factor: f64) -> Self {
        self.support_factor = support_factor;
        self
    }

    /// Measure distances with the minimum-image convention.
    pub fn with_periodic(mut self, periodic: Option<PeriodicDomain<D>>) -> Self {
        self.periodic = periodic;
        self
    }
}

impl<const D: usize> NeighborSearch<D> for ExhaustiveSearch<D> {
    fn sequence(&self) -> &AssembledSequence<D> {
        &self.sequence
    }

    fn query_neighbors_with(
        &self,
        index: usize,
        radius: f64,
        config: &NeighborSearchConfig,
    ) -> Result<NeighborList> {
        let particles = self.sequence.particles();
        check_query(particles.len(), index, radius)?;
        let q = particles[index].position;

        let hits = particles
            .iter()
            .enumerate()
            .filter(|(j, _)| *j != index)
            .filter_map(|(_, p)| {
                let d2 = distance_squared(&q, &p.position, self.periodic.as_ref());
                let r = pair_radius(config.mode, radius, self.support_factor * p.smoothing_length);
                (d2 <= r * r).then(|| Hit {
                    identity: p.identity(),
                    distance: d2.sqrt(),
                })
            })
            .collect();

        Ok(finalize(index, hits, particles.len(), config.max_neighbors))
    }
}
