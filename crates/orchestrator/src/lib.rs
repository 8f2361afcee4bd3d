//! Orchestration Layer
//!
//! This crate wires the neighbor search kernel into a runnable set-up:
//! - JSON run configuration (boundaries, tree parameters, lattice)
//! - Lattice particle placement with per-region spacing
//! - A per-step driver that owns the particles and the step coordinator

#![warn(missing_docs)]

pub mod config;
pub mod domain;
pub mod runner;

pub use config::{SearchConfig, TreeSettings};
pub use domain::{setup_lattice, LatticeRegion};
pub use runner::{ballistic_drift, DriverState, StepDriver};

use kernel::{KernelError, StepCoordinator};

/// Errors raised while setting up or driving a run
#[derive(thiserror::Error, Debug)]
pub enum OrchestratorError {
    /// The configuration file could not be read
    #[error("failed to read {path}: {source}")]
    Io {
        /// Path that was being read
        path: String,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },
    /// The configuration text is not valid JSON for [`SearchConfig`]
    #[error("invalid configuration JSON: {0}")]
    Json(#[from] serde_json::Error),
    /// A configuration value is out of range
    #[error("invalid configuration: {0}")]
    Invalid(String),
    /// The kernel rejected the configuration or a step
    #[error(transparent)]
    Kernel(#[from] KernelError),
}

/// Create a step driver from a configuration file
///
/// The set-up pipeline:
/// 1. Load and validate the configuration
/// 2. Place the lattice particles
/// 3. Build the boundary and tree configuration for `D` axes
/// 4. Create the step coordinator
/// 5. Prepare the initial search step inside a [`StepDriver`] limited to
///    the configured `max_steps`
///
/// # Example
/// ```no_run
/// use orchestrator::{ballistic_drift, create_driver};
///
/// let mut driver = create_driver::<1>("config/shock_tube.json")?;
/// driver.run(10, ballistic_drift(1e-4))?;
/// # Ok::<(), orchestrator::OrchestratorError>(())
/// ```
pub fn create_driver<const D: usize>(config_path: &str) -> Result<StepDriver<D>, OrchestratorError> {
    tracing::info!(path = config_path, dims = D, "creating step driver");

    // 1. Load and validate configuration
    let config = SearchConfig::load(config_path)?;

    // 2. Lattice
    let particles = setup_lattice::<D>(&config.lattice, config.smoothing_factor)?;
    if particles.is_empty() {
        tracing::warn!(name = %config.name, "configuration places no particles");
    }

    // 3. Boundary and tree
    let boundary = config.boundary_config::<D>()?;
    let tree = config.tree_config::<D>()?;

    // 4. Coordinator
    let coordinator = StepCoordinator::new(boundary, tree)?;

    // 5. Initial step
    let driver = StepDriver::new(particles, coordinator)?.with_max_steps(config.max_steps);
    tracing::info!(name = %config.name, max_steps = ?config.max_steps, "step driver ready");
    Ok(driver)
}
