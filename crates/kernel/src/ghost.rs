//! Ghost particle generation for periodic and mirror boundaries.
//!
//! Ghosts are recomputed from scratch every step from the current real
//! particle state. Axes are processed in ascending order, and the candidates
//! for axis `d` are the real particles followed by every ghost already made
//! for lower axes, so a particle near a corner gets edge and corner images.
//! Every ghost remembers the real particle it was derived from.

use crate::boundary::{BoundaryConfig, BoundaryKind, MirrorKind, Side};
use crate::error::{KernelError, Result};
use crate::particle::{Particle, ParticleKind, RealParticles, UNASSIGNED_IDENTITY};

/// A synthetic particle produced by a boundary.
///
/// Its identity stays [`UNASSIGNED_IDENTITY`] until the assembler places it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GhostParticle<const D: usize> {
    particle: Particle<D>,
    /// Set once the ghost has crossed a no-slip wall.
    no_slip: bool,
}

impl<const D: usize> GhostParticle<D> {
    fn from_real(real: &Particle<D>) -> Self {
        let mut particle = *real;
        particle.identity = UNASSIGNED_IDENTITY;
        particle.kind = ParticleKind::Ghost {
            source: real.identity,
        };
        Self {
            particle,
            no_slip: false,
        }
    }

    /// Index of the real particle this ghost derives from.
    pub fn source(&self) -> usize {
        self.particle.source()
    }

    /// The ghost's particle state.
    pub fn particle(&self) -> &Particle<D> {
        &self.particle
    }

    /// Position of the ghost.
    pub fn position(&self) -> [f64; D] {
        self.particle.position
    }

    /// Velocity of the ghost.
    pub fn velocity(&self) -> [f64; D] {
        self.particle.velocity
    }

    /// Unwrap into a plain particle record.
    pub fn into_particle(self) -> Particle<D> {
        self.particle
    }
}

/// Stateless generator of ghost particles.
#[derive(Debug, Clone, Copy, Default)]
pub struct GhostGenerator;

impl GhostGenerator {
    /// Produce the ghosts for the current real state.
    ///
    /// A candidate is near a side when `|x_d - seam| <= interaction_radius`,
    /// where the seam is the wall of a mirror axis and the domain edge of a
    /// periodic one.
    /// The output order is axis, then side (lower first), then candidate.
    pub fn generate<const D: usize>(
        real: &RealParticles<D>,
        config: &BoundaryConfig<D>,
        interaction_radius: f64,
    ) -> Result<Vec<GhostParticle<D>>> {
        config.validate()?;
        if !(interaction_radius.is_finite() && interaction_radius >= 0.0) {
            return Err(KernelError::config(format!(
                "interaction radius must be finite and non-negative, got {interaction_radius}"
            )));
        }

        let mut ghosts: Vec<GhostParticle<D>> = Vec::new();

        for axis in 0..D {
            let boundary = &config.axes()[axis];
            if !boundary.is_active() {
                continue;
            }
            // Ghosts created for this axis are not candidates for it.
            let prior = ghosts.len();

            for side in Side::BOTH {
                if !boundary.is_enabled(side) {
                    continue;
                }
                let seam = boundary.ghost_seam(side);

                let near = |x: &[f64; D]| (x[axis] - seam).abs() <= interaction_radius;

                let from_reals = real
                    .iter()
                    .filter(|p| near(&p.position))
                    .map(GhostParticle::from_real);
                let from_ghosts = ghosts[..prior]
                    .iter()
                    .filter(|g| near(&g.particle.position))
                    .copied();
                let seeds: Vec<GhostParticle<D>> = from_reals.chain(from_ghosts).collect();

                for mut ghost in seeds {
                    match boundary.kind {
                        BoundaryKind::Periodic => {
                            let shift = match side {
                                Side::Lower => boundary.extent(),
                                Side::Upper => -boundary.extent(),
                            };
                            ghost.particle.position[axis] += shift;
                        }
                        BoundaryKind::Mirror(kind) => {
                            let x = ghost.particle.position[axis];
                            ghost.particle.position[axis] = 2.0 * seam - x;
                            reflect_velocity(&mut ghost, kind, axis, real)?;
                        }
                        // Validation rejects Open; None is skipped above.
                        BoundaryKind::None | BoundaryKind::Open => continue,
                    }
                    ghosts.push(ghost);
                }
            }
        }

        tracing::debug!(
            reals = real.len(),
            ghosts = ghosts.len(),
            radius = interaction_radius,
            "generated ghost particles"
        );
        Ok(ghosts)
    }

    /// Regenerate ghosts for a new step. Nothing from a previous call is
    /// reused.
    pub fn update<const D: usize>(
        real: &RealParticles<D>,
        config: &BoundaryConfig<D>,
        interaction_radius: f64,
    ) -> Result<Vec<GhostParticle<D>>> {
        Self::generate(real, config, interaction_radius)
    }
}

/// Free-slip flips the wall-normal component. No-slip inverts the velocity
/// of the source real particle, and stays that way across later walls.
fn reflect_velocity<const D: usize>(
    ghost: &mut GhostParticle<D>,
    kind: MirrorKind,
    axis: usize,
    real: &RealParticles<D>,
) -> Result<()> {
    if kind == MirrorKind::NoSlip || ghost.no_slip {
        let source = ghost.source();
        let origin = real.get(source).ok_or_else(|| {
            KernelError::consistency(format!(
                "ghost source {source} is not a real particle (have {})",
                real.len()
            ))
        })?;
        ghost.particle.velocity = origin.velocity.map(|v| -v);
        ghost.no_slip = true;
    } else {
        ghost.particle.velocity[axis] = -ghost.particle.velocity[axis];
    }
    Ok(())
}
