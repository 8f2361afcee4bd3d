//! Configuration parsing and validation for neighbor search runs

use serde::{Deserialize, Serialize};
use std::fs;

use kernel::{
    AxisBoundary, BoundaryConfig, NeighborSearchConfig, TreeConfig, DEFAULT_SUPPORT_FACTOR,
};

use crate::domain::LatticeRegion;
use crate::OrchestratorError;

/// Main run configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Human-readable run name
    pub name: String,
    /// Boundary settings, one entry per axis
    pub boundaries: Vec<AxisBoundary>,
    /// Spatial tree parameters
    #[serde(default)]
    pub tree: TreeSettings,
    /// Expected neighbors per particle (sizes the neighbor list capacity)
    #[serde(default = "default_neighbor_number")]
    pub neighbor_number: usize,
    /// Accept pairs inside either particle's kernel support
    #[serde(default)]
    pub symmetric_search: bool,
    /// Initial particle lattice, one entry per region
    #[serde(default)]
    pub lattice: Vec<LatticeRegion>,
    /// Smoothing length in units of the lattice spacing
    #[serde(default = "default_smoothing_factor")]
    pub smoothing_factor: f64,
    /// Stop after this many steps
    pub max_steps: Option<u64>,
}

/// Serializable tree parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TreeSettings {
    /// Deepest tree level
    #[serde(default = "default_max_level")]
    pub max_level: u32,
    /// Particles per leaf before splitting
    #[serde(default = "default_leaf_capacity")]
    pub leaf_capacity: usize,
    /// Barnes-Hut opening angle
    #[serde(default = "default_theta")]
    pub theta: f64,
    /// Coupling constant of the aggregate
    #[serde(default = "default_gravitational_constant")]
    pub gravitational_constant: f64,
    /// Plummer softening length
    #[serde(default)]
    pub softening: f64,
    /// Kernel support in units of the smoothing length
    #[serde(default = "default_support_factor")]
    pub support_factor: f64,
    /// Build workers (0 = all, 1 = sequential)
    #[serde(default)]
    pub workers: usize,
    /// Resolve periodic axes by minimum image instead of ghosts
    #[serde(default)]
    pub periodic_images: bool,
}

// Default values
fn default_neighbor_number() -> usize {
    32
}

fn default_smoothing_factor() -> f64 {
    1.3
}

fn default_max_level() -> u32 {
    20
}

fn default_leaf_capacity() -> usize {
    8
}

fn default_theta() -> f64 {
    0.5
}

fn default_gravitational_constant() -> f64 {
    1.0
}

fn default_support_factor() -> f64 {
    DEFAULT_SUPPORT_FACTOR
}

impl Default for TreeSettings {
    fn default() -> Self {
        Self {
            max_level: default_max_level(),
            leaf_capacity: default_leaf_capacity(),
            theta: default_theta(),
            gravitational_constant: default_gravitational_constant(),
            softening: 0.0,
            support_factor: default_support_factor(),
            workers: 0,
            periodic_images: false,
        }
    }
}

impl SearchConfig {
    /// Load configuration from a JSON file
    pub fn load(path: &str) -> Result<Self, OrchestratorError> {
        let contents = fs::read_to_string(path).map_err(|source| OrchestratorError::Io {
            path: path.to_string(),
            source,
        })?;
        let config = Self::from_json_str(&contents)?;
        tracing::info!(name = %config.name, path, "configuration loaded");
        Ok(config)
    }

    /// Parse and validate configuration text
    pub fn from_json_str(contents: &str) -> Result<Self, OrchestratorError> {
        let config: SearchConfig = serde_json::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), OrchestratorError> {
        if self.boundaries.is_empty() {
            return Err(OrchestratorError::Invalid(
                "at least one boundary axis is required".to_string(),
            ));
        }
        for (axis, boundary) in self.boundaries.iter().enumerate() {
            boundary.validate(axis)?;
        }

        if self.neighbor_number == 0 {
            return Err(OrchestratorError::Invalid(
                "neighbor_number must be at least 1".to_string(),
            ));
        }

        if !(self.smoothing_factor.is_finite() && self.smoothing_factor > 0.0) {
            return Err(OrchestratorError::Invalid(
                "smoothing_factor must be positive".to_string(),
            ));
        }

        if let Some(max_steps) = self.max_steps {
            if max_steps == 0 {
                return Err(OrchestratorError::Invalid(
                    "max_steps must be at least 1".to_string(),
                ));
            }
        }

        for (i, region) in self.lattice.iter().enumerate() {
            region.validate(self.boundaries.len()).map_err(|e| {
                OrchestratorError::Invalid(format!("lattice region {i}: {e}"))
            })?;
        }

        self.validate_periodic_images()?;
        Ok(())
    }

    /// Minimum-image search needs at least one periodic axis to act on
    fn validate_periodic_images(&self) -> Result<(), OrchestratorError> {
        if self.tree.periodic_images
            && !self
                .boundaries
                .iter()
                .any(|b| b.kind == kernel::BoundaryKind::Periodic)
        {
            return Err(OrchestratorError::Invalid(
                "periodic_images requires a periodic boundary axis".to_string(),
            ));
        }
        Ok(())
    }

    /// Boundary configuration for a `D`-dimensional run
    pub fn boundary_config<const D: usize>(&self) -> Result<BoundaryConfig<D>, OrchestratorError> {
        let axes: [AxisBoundary; D] = self.boundaries.as_slice().try_into().map_err(|_| {
            OrchestratorError::Invalid(format!(
                "configuration has {} boundary axes, expected {D}",
                self.boundaries.len()
            ))
        })?;
        Ok(BoundaryConfig::new(axes)?)
    }

    /// Tree parameters for a `D`-dimensional run
    pub fn tree_config<const D: usize>(&self) -> Result<TreeConfig<D>, OrchestratorError> {
        let periodic = if self.tree.periodic_images {
            self.boundary_config::<D>()?.periodic_domain()
        } else {
            None
        };
        let config = TreeConfig {
            max_level: self.tree.max_level,
            leaf_capacity: self.tree.leaf_capacity,
            theta: self.tree.theta,
            gravitational_constant: self.tree.gravitational_constant,
            softening: self.tree.softening,
            support_factor: self.tree.support_factor,
            workers: self.tree.workers,
            periodic,
        };
        config.validate()?;
        Ok(config)
    }

    /// Neighbor list capacity and pair rule
    pub fn neighbor_config(&self) -> Result<NeighborSearchConfig, OrchestratorError> {
        Ok(NeighborSearchConfig::create(
            self.neighbor_number,
            self.symmetric_search,
        )?)
    }
}
