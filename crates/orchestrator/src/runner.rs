//! Per-step driver around the consistency protocol
//!
//! Each call to [`StepDriver::advance`] runs the phases of one step with
//! full barriers between them:
//!
//! 1. the external integrator mutates the real particles
//! 2. positions are wrapped on periodic axes
//! 3. ghosts, assembly, identity check and tree rebuild (the coordinator)
//!
//! The resulting [`SearchStep`] is what force calculators read until the
//! next call.

use kernel::{PeriodicDomain, RealParticles, SearchStep, StepCoordinator};

use crate::OrchestratorError;

/// Driver state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverState {
    /// A current search step is available
    Ready,
    /// The last step failed; no search step is available until the next
    /// successful call to `advance`
    Failed,
    /// The configured step limit was reached; the last search step stays
    /// available but no further steps run
    Finished,
}

/// Owns the real particles and the coordinator, and runs steps in order
#[derive(Debug)]
pub struct StepDriver<const D: usize> {
    particles: RealParticles<D>,
    coordinator: StepCoordinator<D>,
    periodic: Option<PeriodicDomain<D>>,
    current: Option<SearchStep<D>>,
    step_count: u64,
    max_steps: Option<u64>,
    state: DriverState,
}

impl<const D: usize> StepDriver<D> {
    /// Create a driver and prepare the initial search step
    pub fn new(
        mut particles: RealParticles<D>,
        mut coordinator: StepCoordinator<D>,
    ) -> Result<Self, OrchestratorError> {
        let periodic = coordinator.boundary().periodic_domain();
        if let Some(domain) = &periodic {
            particles.apply_periodic_wrapping(domain);
        }
        let initial = coordinator.prepare(&particles)?;
        tracing::info!(
            particles = particles.len(),
            ghosts = initial.ghost_count(),
            "step driver initialised"
        );
        Ok(Self {
            particles,
            coordinator,
            periodic,
            current: Some(initial),
            step_count: 0,
            max_steps: None,
            state: DriverState::Ready,
        })
    }

    /// Stop after `max_steps` completed steps (`None` runs without limit)
    pub fn with_max_steps(mut self, max_steps: Option<u64>) -> Self {
        self.max_steps = max_steps;
        if self.limit_reached() {
            self.state = DriverState::Finished;
        }
        self
    }

    fn limit_reached(&self) -> bool {
        self.max_steps.is_some_and(|max| self.step_count >= max)
    }

    /// Run one step: integrate, wrap, rebuild
    ///
    /// `integrate` receives the particles and the previous step's search
    /// results. On failure the previous step is discarded as well, since
    /// the particles have already moved. Fails without touching the
    /// particles once the step limit is reached.
    pub fn advance<F>(&mut self, integrate: F) -> Result<&SearchStep<D>, OrchestratorError>
    where
        F: FnOnce(&mut RealParticles<D>, Option<&SearchStep<D>>),
    {
        if self.state == DriverState::Finished {
            return Err(OrchestratorError::Invalid(format!(
                "run finished after {} steps",
                self.step_count
            )));
        }

        // 1. Mutate
        integrate(&mut self.particles, self.current.as_ref());

        // 2. Wrap
        if let Some(domain) = &self.periodic {
            self.particles.apply_periodic_wrapping(domain);
        }

        // 3. Rebuild
        self.current = None;
        match self.coordinator.prepare(&self.particles) {
            Ok(step) => {
                self.step_count += 1;
                tracing::debug!(
                    step = self.step_count,
                    generation = step.generation(),
                    "step advanced"
                );
                self.state = if self.limit_reached() {
                    tracing::info!(max_steps = self.step_count, "run finished: reached max_steps");
                    DriverState::Finished
                } else {
                    DriverState::Ready
                };
                Ok(self.current.insert(step))
            }
            Err(err) => {
                self.state = DriverState::Failed;
                tracing::warn!(step = self.step_count + 1, %err, "step failed");
                Err(err.into())
            }
        }
    }

    /// Advance up to `steps` times, stopping at the first failure or at the
    /// step limit. Returns the total number of completed steps.
    pub fn run<F>(&mut self, steps: u64, mut integrate: F) -> Result<u64, OrchestratorError>
    where
        F: FnMut(&mut RealParticles<D>, Option<&SearchStep<D>>),
    {
        for _ in 0..steps {
            if self.state == DriverState::Finished {
                break;
            }
            self.advance(&mut integrate)?;
        }
        tracing::info!(steps, total = self.step_count, "run complete");
        Ok(self.step_count)
    }

    /// Advance until the configured step limit is reached
    pub fn run_to_limit<F>(&mut self, integrate: F) -> Result<u64, OrchestratorError>
    where
        F: FnMut(&mut RealParticles<D>, Option<&SearchStep<D>>),
    {
        let Some(max_steps) = self.max_steps else {
            return Err(OrchestratorError::Invalid(
                "run_to_limit needs max_steps to be configured".to_string(),
            ));
        };
        self.run(max_steps.saturating_sub(self.step_count), integrate)
    }

    /// Configured step limit
    pub fn max_steps(&self) -> Option<u64> {
        self.max_steps
    }

    /// Number of successfully completed steps
    pub fn step_count(&self) -> u64 {
        self.step_count
    }

    /// Current driver state
    pub fn state(&self) -> DriverState {
        self.state.clone()
    }

    /// Real particles
    pub fn particles(&self) -> &RealParticles<D> {
        &self.particles
    }

    /// Search step of the most recent successful step
    pub fn current(&self) -> Option<&SearchStep<D>> {
        self.current.as_ref()
    }

    /// The coordinator, for staleness checks
    pub fn coordinator(&self) -> &StepCoordinator<D> {
        &self.coordinator
    }
}

/// Integrator that moves particles along their velocity: `x += v * dt`
pub fn ballistic_drift<const D: usize>(
    dt: f64,
) -> impl FnMut(&mut RealParticles<D>, Option<&SearchStep<D>>) {
    move |particles: &mut RealParticles<D>, _: Option<&SearchStep<D>>| {
        for p in particles.iter_mut() {
            for d in 0..D {
                p.position[d] += p.velocity[d] * dt;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kernel::{BoundaryBuilder, MirrorKind, Particle, TreeConfig};

    fn driver(particles: RealParticles<1>) -> StepDriver<1> {
        let boundary = BoundaryBuilder::<1>::new()
            .periodic_all()
            .range([0.0], [1.0])
            .uniform_spacing(0.1)
            .build()
            .unwrap();
        let coordinator = StepCoordinator::new(boundary, TreeConfig::default()).unwrap();
        StepDriver::new(particles, coordinator).unwrap()
    }

    #[test]
    fn test_drift_wraps_periodic_axis() {
        let mut particles = RealParticles::new();
        particles.push(Particle::real([0.95], [1.0], 1.0, 0.05));
        particles.push(Particle::real([0.5], [0.0], 1.0, 0.05));
        let mut driver = driver(particles);
        assert_eq!(driver.step_count(), 0);

        driver.advance(ballistic_drift(0.1)).unwrap();
        let x = driver.particles().get(0).unwrap().position[0];
        assert!((x - 0.05).abs() < 1e-12, "wrapped position {x}");
        assert_eq!(driver.step_count(), 1);
        assert_eq!(driver.state(), DriverState::Ready);
    }

    #[test]
    fn test_generation_follows_steps() {
        let mut particles = RealParticles::new();
        particles.push(Particle::real([0.5], [0.1], 1.0, 0.05));
        let mut driver = driver(particles);
        let done = driver.run(3, ballistic_drift(0.01)).unwrap();
        assert_eq!(done, 3);
        let step = driver.current().unwrap();
        // One generation for the initial step plus one per advance.
        assert_eq!(step.generation(), 4);
        assert!(driver.coordinator().ensure_current(step).is_ok());
    }

    #[test]
    fn test_run_stops_at_max_steps() {
        let mut particles = RealParticles::new();
        particles.push(Particle::real([0.5], [0.1], 1.0, 0.05));
        let mut driver = driver(particles).with_max_steps(Some(3));

        let done = driver.run(10, ballistic_drift(0.01)).unwrap();
        assert_eq!(done, 3);
        assert_eq!(driver.state(), DriverState::Finished);
        assert!(driver.current().is_some());

        let x = driver.particles().get(0).unwrap().position[0];
        assert!(driver.advance(ballistic_drift(0.01)).is_err());
        assert_eq!(driver.particles().get(0).unwrap().position[0], x);
        assert_eq!(driver.step_count(), 3);
    }

    #[test]
    fn test_run_to_limit() {
        let mut particles = RealParticles::new();
        particles.push(Particle::real([0.5], [0.1], 1.0, 0.05));

        let mut unlimited = driver(particles.clone());
        assert!(unlimited.run_to_limit(ballistic_drift(0.01)).is_err());

        let mut limited = driver(particles).with_max_steps(Some(4));
        limited.run(1, ballistic_drift(0.01)).unwrap();
        assert_eq!(limited.run_to_limit(ballistic_drift(0.01)).unwrap(), 4);
        assert_eq!(limited.state(), DriverState::Finished);
    }

    #[test]
    fn test_failed_step_discards_search_results() {
        let boundary = BoundaryBuilder::<1>::new()
            .mirror_all(MirrorKind::FreeSlip)
            .range([0.0], [1.0])
            .uniform_spacing(0.1)
            .build()
            .unwrap();
        let coordinator = StepCoordinator::new(boundary, TreeConfig::default()).unwrap();
        let mut particles = RealParticles::new();
        particles.push(Particle::real([0.5], [0.0], 1.0, 0.05));
        let mut driver = StepDriver::new(particles, coordinator).unwrap();

        let result = driver.advance(|particles, _| {
            for p in particles.iter_mut() {
                p.smoothing_length = 0.0;
            }
        });
        assert!(result.is_err());
        assert_eq!(driver.state(), DriverState::Failed);
        assert!(driver.current().is_none());
        assert_eq!(driver.step_count(), 0);
    }
}
