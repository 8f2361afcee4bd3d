//! Combining real particles and ghosts into the one sequence a tree binds to.
//!
//! Layout: reals at `0..R`, ghosts at `R..R+G`, with
//! `sequence[i].identity() == i` for every entry.

use std::sync::Arc;

use crate::error::{KernelError, Result};
use crate::ghost::GhostParticle;
use crate::particle::{Particle, RealParticles};

#[derive(Debug)]
struct Inner<const D: usize> {
    particles: Vec<Particle<D>>,
    real_count: usize,
    generation: u64,
}

/// Shared, immutable handle to an assembled particle buffer.
///
/// Cloning the handle is cheap and keeps pointing at the same buffer.
/// Two handles are the *same* sequence only if they share the buffer; an
/// equal-valued copy built separately is a different sequence.
#[derive(Debug, Clone)]
pub struct AssembledSequence<const D: usize> {
    inner: Arc<Inner<D>>,
}

impl<const D: usize> AssembledSequence<D> {
    /// Total number of entries (reals plus ghosts).
    pub fn len(&self) -> usize {
        self.inner.particles.len()
    }

    /// Return `true` if the sequence holds no particles.
    pub fn is_empty(&self) -> bool {
        self.inner.particles.is_empty()
    }

    /// Number of real particles at the front.
    pub fn real_count(&self) -> usize {
        self.inner.real_count
    }

    /// Number of ghosts at the back.
    pub fn ghost_count(&self) -> usize {
        self.len() - self.real_count()
    }

    /// Step generation this sequence was assembled for.
    pub fn generation(&self) -> u64 {
        self.inner.generation
    }

    /// Particle at `index`, if any.
    pub fn get(&self, index: usize) -> Option<&Particle<D>> {
        self.inner.particles.get(index)
    }

    /// All particles in identity order.
    pub fn particles(&self) -> &[Particle<D>] {
        &self.inner.particles
    }

    /// Whether the entry at `index` is a ghost. `None` past the end.
    pub fn is_ghost(&self, index: usize) -> Option<bool> {
        self.get(index).map(Particle::is_ghost)
    }

    /// Real particle the entry at `index` derives from (itself for reals).
    pub fn source_of(&self, index: usize) -> Option<usize> {
        self.get(index).map(Particle::source)
    }

    /// Return `true` if both handles share one buffer.
    pub fn same_buffer(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Full `identity == index` scan, reporting the first mismatch.
    pub fn validate_identities(&self) -> Result<()> {
        match self
            .inner
            .particles
            .iter()
            .enumerate()
            .find(|(i, p)| p.identity != *i)
        {
            Some((i, p)) => Err(KernelError::consistency(format!(
                "particle at index {i} has identity {}",
                p.identity
            ))),
            None => Ok(()),
        }
    }

    /// Cheap check of the first and last entries and of both sides of the
    /// real/ghost boundary.
    pub fn spot_check(&self) -> Result<()> {
        let n = self.len();
        if n == 0 {
            return Ok(());
        }
        let r = self.real_count();
        let mut checked = [0, n - 1, r.saturating_sub(1), r.min(n - 1)];
        checked.sort_unstable();
        for i in checked {
            let identity = self.inner.particles[i].identity;
            if identity != i {
                return Err(KernelError::consistency(format!(
                    "spot check failed: particle at index {i} has identity {identity}"
                )));
            }
        }
        Ok(())
    }
}

/// Build the search sequence for one step.
///
/// Reals are copied unchanged; ghosts are appended in the given order and
/// renumbered to `R + offset`.
pub fn assemble<const D: usize>(
    real: &RealParticles<D>,
    ghosts: &[GhostParticle<D>],
    generation: u64,
) -> Result<AssembledSequence<D>> {
    let real_count = real.len();
    let total = real_count + ghosts.len();

    let mut particles: Vec<Particle<D>> = Vec::new();
    particles.try_reserve_exact(total).map_err(|e| {
        KernelError::capacity(format!("cannot reserve {total} particles: {e}"))
    })?;
    let reserved = particles.as_ptr();

    particles.extend_from_slice(real.as_slice());
    particles.extend(ghosts.iter().enumerate().map(|(offset, ghost)| {
        let mut p = ghost.into_particle();
        p.identity = real_count + offset;
        p
    }));

    if particles.as_ptr() != reserved {
        return Err(KernelError::capacity(format!(
            "particle buffer moved while assembling {total} entries"
        )));
    }

    let sequence = AssembledSequence {
        inner: Arc::new(Inner {
            particles,
            real_count,
            generation,
        }),
    };
    sequence.spot_check()?;
    tracing::debug!(
        generation,
        reals = real_count,
        ghosts = ghosts.len(),
        "assembled search sequence"
    );
    Ok(sequence)
}
