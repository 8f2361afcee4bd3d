//! Domain setup: lattice particle placement

use serde::{Deserialize, Serialize};

use kernel::{Particle, RealParticles};

use crate::OrchestratorError;

/// A box filled with a cell-centred lattice at its own spacing
///
/// Adjacent regions with different spacing give the non-uniform densities
/// of shock-tube style initial conditions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatticeRegion {
    /// Minimum corner, one entry per axis
    pub min: Vec<f64>,
    /// Maximum corner, one entry per axis
    pub max: Vec<f64>,
    /// Distance between neighboring lattice points
    pub spacing: f64,
    /// Mass density of the region
    pub density: f64,
    /// Initial velocity, zero when omitted
    #[serde(default)]
    pub velocity: Option<Vec<f64>>,
}

impl LatticeRegion {
    /// Validate the region for a `dims`-dimensional run
    pub fn validate(&self, dims: usize) -> Result<(), String> {
        if self.min.len() != dims || self.max.len() != dims {
            return Err(format!(
                "corners must have {dims} components, got {} and {}",
                self.min.len(),
                self.max.len()
            ));
        }
        if let Some(v) = &self.velocity {
            if v.len() != dims {
                return Err(format!("velocity must have {dims} components, got {}", v.len()));
            }
        }
        for d in 0..dims {
            if !(self.min[d].is_finite() && self.max[d].is_finite()) || self.min[d] >= self.max[d] {
                return Err(format!("axis {d}: min must be less than max"));
            }
        }
        if !(self.spacing.is_finite() && self.spacing > 0.0) {
            return Err("spacing must be positive".to_string());
        }
        if !(self.density.is_finite() && self.density > 0.0) {
            return Err("density must be positive".to_string());
        }
        Ok(())
    }
}

/// Fill every region with particles
///
/// Particle mass is `density * spacing^D` and the smoothing length is
/// `smoothing_factor * spacing`. Identities follow placement order.
pub fn setup_lattice<const D: usize>(
    regions: &[LatticeRegion],
    smoothing_factor: f64,
) -> Result<RealParticles<D>, OrchestratorError> {
    if !(smoothing_factor.is_finite() && smoothing_factor > 0.0) {
        return Err(OrchestratorError::Invalid(
            "smoothing_factor must be positive".to_string(),
        ));
    }

    let mut particles = RealParticles::new();
    for (i, region) in regions.iter().enumerate() {
        region
            .validate(D)
            .map_err(|e| OrchestratorError::Invalid(format!("lattice region {i}: {e}")))?;
        let before = particles.len();
        place_region(&mut particles, region, smoothing_factor);
        tracing::debug!(
            region = i,
            spacing = region.spacing,
            count = particles.len() - before,
            "lattice region placed"
        );
    }

    tracing::info!(
        regions = regions.len(),
        particles = particles.len(),
        "lattice setup complete"
    );
    Ok(particles)
}

/// Place the particles of one validated region
fn place_region<const D: usize>(
    particles: &mut RealParticles<D>,
    region: &LatticeRegion,
    smoothing_factor: f64,
) {
    let spacing = region.spacing;
    let mass = region.density * spacing.powi(D as i32);
    let h = smoothing_factor * spacing;
    let mut velocity = [0.0; D];
    if let Some(v) = &region.velocity {
        velocity.copy_from_slice(v);
    }

    // Grid dimensions
    let mut counts = [0usize; D];
    for d in 0..D {
        counts[d] = ((region.max[d] - region.min[d]) / spacing).ceil() as usize;
    }
    if counts.iter().any(|&c| c == 0) {
        return;
    }

    // Odometer over the D-dimensional index space
    let mut index = [0usize; D];
    'outer: loop {
        let mut position = [0.0; D];
        let mut inside = true;
        for d in 0..D {
            position[d] = region.min[d] + (index[d] as f64 + 0.5) * spacing;
            // Skip points past the upper edge
            if position[d] > region.max[d] {
                inside = false;
            }
        }
        if inside {
            particles.push(Particle::real(position, velocity, mass, h));
        }

        for d in 0..D {
            index[d] += 1;
            if index[d] < counts[d] {
                continue 'outer;
            }
            index[d] = 0;
        }
        break;
    }
}
