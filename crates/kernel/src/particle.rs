//! Particle records and the real-particle container.
//!
//! A [`Particle`] is either real (integrated in time by the solver) or a
//! ghost derived from a real particle for boundary handling. The identity of
//! a particle is its index in whichever container currently holds it, so it
//! is never writable from outside this crate.

use crate::boundary::PeriodicDomain;
use crate::error::{KernelError, Result};

/// Identity carried by ghosts before the assembler places them.
pub const UNASSIGNED_IDENTITY: usize = usize::MAX;

/// Cubic-spline kernel support factor (compact support = 2h).
pub const DEFAULT_SUPPORT_FACTOR: f64 = 2.0;

/// Discriminates real particles from ghosts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParticleKind {
    /// Physical particle owned by the solver.
    Real,
    /// Synthetic copy of the real particle `source`.
    Ghost {
        /// Index of the real particle this ghost was derived from.
        source: usize,
    },
}

/// A single particle in `D` dimensions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Particle<const D: usize> {
    /// Position.
    pub position: [f64; D],
    /// Velocity.
    pub velocity: [f64; D],
    /// Mass.
    pub mass: f64,
    /// Smoothing length (interaction radius scale).
    pub smoothing_length: f64,
    pub(crate) identity: usize,
    pub(crate) kind: ParticleKind,
}

impl<const D: usize> Particle<D> {
    /// Create a real particle. Its identity is assigned when it is pushed
    /// into a [`RealParticles`] container.
    pub fn real(position: [f64; D], velocity: [f64; D], mass: f64, smoothing_length: f64) -> Self {
        Self {
            position,
            velocity,
            mass,
            smoothing_length,
            identity: UNASSIGNED_IDENTITY,
            kind: ParticleKind::Real,
        }
    }

    /// Identity of this particle (its index in the owning container).
    pub fn identity(&self) -> usize {
        self.identity
    }

    /// Real or ghost.
    pub fn kind(&self) -> ParticleKind {
        self.kind
    }

    /// Return `true` for ghosts.
    pub fn is_ghost(&self) -> bool {
        matches!(self.kind, ParticleKind::Ghost { .. })
    }

    /// Index of the real particle this one stands for: the provenance of a
    /// ghost, or the particle's own identity for real particles.
    pub fn source(&self) -> usize {
        match self.kind {
            ParticleKind::Real => self.identity,
            ParticleKind::Ghost { source } => source,
        }
    }

    /// Squared Euclidean distance to `other` (no periodic wrap).
    pub fn distance_squared(&self, other: &Self) -> f64 {
        self.position
            .iter()
            .zip(other.position.iter())
            .map(|(a, b)| (a - b) * (a - b))
            .sum()
    }
}

/// Container of real particles that keeps `identity == index`.
///
/// Integrators get mutable access to the particle state through
/// [`RealParticles::iter_mut`]; identities can only change through
/// [`RealParticles::push`], [`RealParticles::resize`] and
/// [`RealParticles::truncate`], all of which realign them.
#[derive(Debug, Clone, Default)]
pub struct RealParticles<const D: usize> {
    particles: Vec<Particle<D>>,
}

impl<const D: usize> RealParticles<D> {
    /// Create an empty container.
    pub fn new() -> Self {
        Self { particles: Vec::new() }
    }

    /// Create an empty container with room for `capacity` particles.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            particles: Vec::with_capacity(capacity),
        }
    }

    /// Number of real particles.
    pub fn len(&self) -> usize {
        self.particles.len()
    }

    /// Return `true` if there are no particles.
    pub fn is_empty(&self) -> bool {
        self.particles.is_empty()
    }

    /// Append a particle and return the identity it was given.
    pub fn push(&mut self, mut particle: Particle<D>) -> usize {
        let identity = self.particles.len();
        particle.identity = identity;
        particle.kind = ParticleKind::Real;
        self.particles.push(particle);
        identity
    }

    /// Resize to `len` particles, filling new slots with copies of
    /// `template`. Identities of the new slots are aligned to their index.
    pub fn resize(&mut self, len: usize, template: Particle<D>) {
        let old = self.particles.len();
        self.particles.resize(len, template);
        for (i, p) in self.particles.iter_mut().enumerate().skip(old) {
            p.identity = i;
            p.kind = ParticleKind::Real;
        }
    }

    /// Drop every particle at index `len` and beyond.
    pub fn truncate(&mut self, len: usize) {
        self.particles.truncate(len);
    }

    /// Particle at `index`, if any.
    pub fn get(&self, index: usize) -> Option<&Particle<D>> {
        self.particles.get(index)
    }

    /// Iterate over the particles in identity order.
    pub fn iter(&self) -> std::slice::Iter<'_, Particle<D>> {
        self.particles.iter()
    }

    /// Mutable iteration for integrators. Identity and kind stay private.
    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, Particle<D>> {
        self.particles.iter_mut()
    }

    /// Borrow the particles as a slice.
    pub fn as_slice(&self) -> &[Particle<D>] {
        &self.particles
    }

    /// Largest smoothing length, or `0.0` when empty.
    pub fn max_smoothing_length(&self) -> f64 {
        self.particles
            .iter()
            .map(|p| p.smoothing_length)
            .fold(0.0, f64::max)
    }

    /// Kernel support radius `support_factor * max(h)`.
    ///
    /// Fails if any smoothing length is non-positive or not finite, naming
    /// the first offending particle.
    pub fn kernel_support_radius(&self, support_factor: f64) -> Result<f64> {
        if !(support_factor.is_finite() && support_factor > 0.0) {
            return Err(KernelError::config(format!(
                "kernel support factor must be positive, got {support_factor}"
            )));
        }
        if let Some(bad) = self
            .particles
            .iter()
            .find(|p| !(p.smoothing_length.is_finite() && p.smoothing_length > 0.0))
        {
            return Err(KernelError::config(format!(
                "particle {} has invalid smoothing length {}",
                bad.identity, bad.smoothing_length
            )));
        }
        Ok(support_factor * self.max_smoothing_length())
    }

    /// Wrap positions that left the domain on periodic axes back inside.
    pub fn apply_periodic_wrapping(&mut self, domain: &PeriodicDomain<D>) {
        for p in &mut self.particles {
            p.position = domain.wrap(p.position);
        }
    }
}
