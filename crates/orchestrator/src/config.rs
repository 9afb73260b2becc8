//! Configuration parsing and validation for PBF simulations

use std::fs;
use std::path::Path;

use pbf_kernel::{BoundaryPolygon, GridSource, PositionSource, SolverParams};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while loading or validating a configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("failed to read config file {path}: {source}")]
    Io {
        /// Path that failed.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid JSON for [`SimulationConfig`].
    #[error("failed to parse config JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// A field is out of range.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Main simulation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Human-readable simulation name
    pub name: String,
    /// Solver constants
    #[serde(default)]
    pub params: SolverParams,
    /// Number of particles
    #[serde(default = "default_particle_count")]
    pub particle_count: usize,
    /// Average neighbour budget per particle (sizes the pair buffers)
    #[serde(default = "default_max_neighbours")]
    pub max_neighbours: usize,
    /// Where particles start
    #[serde(default)]
    pub initial_positions: InitialPositions,
    /// Boundary polygons; two vertices form a segment, more form a loop
    #[serde(default)]
    pub boundaries: Vec<BoundaryPolygon>,
    /// Fixed time step (seconds); wall clock when absent
    pub fixed_delta_t: Option<f32>,
    /// Stop after this many steps
    pub max_steps: Option<u64>,
    /// Execution backend for the stage kernels
    #[serde(default)]
    pub backend: Backend,
    /// Project the initial block onto the density constraint before stepping
    #[serde(default)]
    pub relax_initial_positions: bool,
}

/// Initial particle placement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum InitialPositions {
    /// Row-major block
    Grid {
        /// Particles per row
        #[serde(default = "default_grid_columns")]
        columns: usize,
        /// Distance between particles
        #[serde(default = "default_grid_spacing")]
        spacing: f32,
        /// Position of the first particle
        #[serde(default = "default_grid_origin")]
        origin: [f32; 2],
    },
    /// Explicit list, one entry per particle
    Explicit(Vec<[f32; 2]>),
}

/// Stage execution backend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Backend {
    /// Single-threaded reference backend
    Serial,
    /// Data-parallel backend on the rayon pool
    #[default]
    Rayon,
}

// Default values
fn default_particle_count() -> usize {
    450
}

fn default_max_neighbours() -> usize {
    64
}

fn default_grid_columns() -> usize {
    GridSource::default().columns
}

fn default_grid_spacing() -> f32 {
    GridSource::default().spacing
}

fn default_grid_origin() -> [f32; 2] {
    GridSource::default().origin
}

impl Default for InitialPositions {
    fn default() -> Self {
        InitialPositions::Grid {
            columns: default_grid_columns(),
            spacing: default_grid_spacing(),
            origin: default_grid_origin(),
        }
    }
}

impl PositionSource for InitialPositions {
    fn positions(&self, count: usize) -> Vec<[f32; 2]> {
        match self {
            InitialPositions::Grid {
                columns,
                spacing,
                origin,
            } => GridSource {
                columns: *columns,
                spacing: *spacing,
                origin: *origin,
            }
            .positions(count),
            InitialPositions::Explicit(list) => list.positions(count),
        }
    }
}

impl SimulationConfig {
    /// Load configuration from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&contents)
    }

    /// Parse and validate configuration from a JSON string
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: SimulationConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.params
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;

        if self.particle_count == 0 {
            return Err(ConfigError::Invalid(
                "particle_count must be at least 1".to_string(),
            ));
        }
        if self.max_neighbours == 0 {
            return Err(ConfigError::Invalid(
                "max_neighbours must be at least 1".to_string(),
            ));
        }

        match &self.initial_positions {
            InitialPositions::Grid {
                columns, spacing, ..
            } => {
                if *columns == 0 {
                    return Err(ConfigError::Invalid(
                        "grid columns must be at least 1".to_string(),
                    ));
                }
                if *spacing <= 0.0 {
                    return Err(ConfigError::Invalid(
                        "grid spacing must be positive".to_string(),
                    ));
                }
            }
            InitialPositions::Explicit(list) => {
                if list.len() != self.particle_count {
                    return Err(ConfigError::Invalid(format!(
                        "explicit positions list has {} entries, particle_count is {}",
                        list.len(),
                        self.particle_count
                    )));
                }
            }
        }

        if let Some(dt) = self.fixed_delta_t {
            if !(dt >= 0.0 && dt.is_finite()) {
                return Err(ConfigError::Invalid(
                    "fixed_delta_t must be finite and non-negative".to_string(),
                ));
            }
        }

        if let Some(max_steps) = self.max_steps {
            if max_steps == 0 {
                return Err(ConfigError::Invalid(
                    "max_steps must be at least 1".to_string(),
                ));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> SimulationConfig {
        SimulationConfig {
            name: "test".to_string(),
            params: SolverParams::default(),
            particle_count: 30,
            max_neighbours: 16,
            initial_positions: InitialPositions::default(),
            boundaries: vec![vec![[-10.0, -1.0], [10.0, -1.0]]],
            fixed_delta_t: Some(1.0 / 60.0),
            max_steps: Some(10),
            backend: Backend::Serial,
            relax_initial_positions: false,
        }
    }

    #[test]
    fn test_minimal_json_uses_defaults() {
        let config = SimulationConfig::from_json(r#"{ "name": "dam" }"#).unwrap();
        assert_eq!(config.particle_count, 450);
        assert_eq!(config.max_neighbours, 64);
        assert_eq!(config.backend, Backend::Rayon);
        assert_eq!(config.initial_positions, InitialPositions::default());
        assert_eq!(config.params, SolverParams::default());
        assert!(config.boundaries.is_empty());
        assert!(config.fixed_delta_t.is_none());
        assert!(!config.relax_initial_positions);
    }

    #[test]
    fn test_grid_defaults_match_reference_block() {
        let config = SimulationConfig::from_json(
            r#"{ "name": "dam", "initial_positions": { "Grid": { "spacing": 0.5 } } }"#,
        )
        .unwrap();
        assert_eq!(
            config.initial_positions,
            InitialPositions::Grid {
                columns: 15,
                spacing: 0.5,
                origin: [-7.5, 0.0]
            }
        );
    }

    #[test]
    fn test_validation_particle_count() {
        let mut config = base_config();
        config.particle_count = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        config.particle_count = 30;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_explicit_positions() {
        let mut config = base_config();
        config.particle_count = 2;
        config.initial_positions = InitialPositions::Explicit(vec![[0.0, 0.0]]);
        assert!(config.validate().is_err());

        config.initial_positions = InitialPositions::Explicit(vec![[0.0, 0.0], [1.0, 0.0]]);
        assert!(config.validate().is_ok());
        assert_eq!(config.initial_positions.positions(2)[1], [1.0, 0.0]);
    }

    #[test]
    fn test_validation_solver_params() {
        let mut config = base_config();
        config.params.rest_density = -1.0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_validation_time_step() {
        let mut config = base_config();
        config.fixed_delta_t = Some(-0.1);
        assert!(config.validate().is_err());
        config.fixed_delta_t = Some(0.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_bad_json_is_reported() {
        let err = SimulationConfig::from_json("{ not json").unwrap_err();
        assert!(matches!(err, ConfigError::Json(_)));
    }
}
