//! Ghost-aware neighbor search kernel
//!
//! This crate finds, for every particle of a simulation, the other particles
//! within its interaction range, accounting for periodic and reflective
//! domain boundaries through ghost particles.
//!
//! # Modules
//! - [`particle`] -- Particle records and the real-particle container.
//! - [`boundary`] -- Per-axis boundary configuration, wall placement and periodic wrap.
//! - [`ghost`] -- Ghost particle generation across periodic and mirror boundaries.
//! - [`assembly`] -- Combining reals and ghosts into one identity-aligned sequence.
//! - [`neighbor`] -- Query configuration, neighbor lists and the exhaustive reference search.
//! - [`tree`] -- Barnes–Hut spatial tree bound to one assembled sequence.
//! - [`protocol`] -- The per-step pipeline tying the pieces together.
//! - [`error`] -- Error classes.
//!
//! # Per-step flow
//!
//! ```
//! use kernel::boundary::{BoundaryBuilder, MirrorKind};
//! use kernel::particle::{Particle, RealParticles};
//! use kernel::protocol::StepCoordinator;
//! use kernel::tree::TreeConfig;
//!
//! let boundary = BoundaryBuilder::<2>::new()
//!     .mirror_all(MirrorKind::FreeSlip)
//!     .range([0.0, 0.0], [1.0, 1.0])
//!     .uniform_spacing(0.1)
//!     .build()?;
//! let mut coordinator = StepCoordinator::new(boundary, TreeConfig::default())?;
//!
//! let mut reals = RealParticles::new();
//! reals.push(Particle::real([0.02, 0.5], [1.0, 0.0], 1.0, 0.1));
//! reals.push(Particle::real([0.20, 0.5], [0.0, 0.0], 1.0, 0.1));
//!
//! let step = coordinator.prepare(&reals)?;
//! let neighbors = step.query_neighbors(0, step.interaction_radius())?;
//! assert!(neighbors.identities.contains(&1));
//! // The mirror image of particle 0 across the left wall is a neighbor too.
//! assert!(neighbors.identities.iter().any(|&id| id >= step.real_count()));
//! # Ok::<(), kernel::KernelError>(())
//! ```

#![warn(missing_docs)]

pub mod assembly;
pub mod boundary;
pub mod error;
pub mod ghost;
pub mod neighbor;
pub mod particle;
pub mod protocol;
pub mod tree;

#[cfg(test)]
mod test_support;

pub use assembly::{assemble, AssembledSequence};
pub use boundary::{
    AxisBoundary, BoundaryBuilder, BoundaryConfig, BoundaryKind, MirrorKind, PeriodicDomain, Side,
};
pub use error::{KernelError, Result};
pub use ghost::{GhostGenerator, GhostParticle};
pub use neighbor::{
    ExhaustiveSearch, NeighborList, NeighborSearch, NeighborSearchConfig, SearchMode,
};
pub use particle::{
    Particle, ParticleKind, RealParticles, DEFAULT_SUPPORT_FACTOR, UNASSIGNED_IDENTITY,
};
pub use protocol::{SearchStep, StepCoordinator};
pub use tree::{SpatialTree, TreeConfig};
