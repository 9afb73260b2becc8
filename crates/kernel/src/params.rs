//! Solver parameters.

use serde::{Deserialize, Serialize};

use crate::error::{Result, SimulationError};

/// Tunable constants of the PBF solver.
///
/// Every field has a serde default so a partial JSON object deserializes
/// into a usable parameter set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolverParams {
    /// Jacobi iterations of {kernel, constraint, correction} per step.
    #[serde(default = "default_solver_iterations")]
    pub solver_iterations: usize,
    /// Edge length of a spatial hash cell.
    #[serde(default = "default_grid_size")]
    pub grid_size: f32,
    /// Distance kept from a boundary segment after a collision.
    #[serde(default = "default_boundary_margin")]
    pub boundary_margin: f32,
    /// Smoothing kernel support radius `h`.
    #[serde(default = "default_kernel_width")]
    pub kernel_width: f32,
    /// Downward acceleration applied every step.
    #[serde(default = "default_gravity")]
    pub gravity: f32,
    /// Rest density `rho_0`.
    #[serde(default = "default_rest_density")]
    pub rest_density: f32,
    /// Constraint relaxation `epsilon` added to the lambda denominator.
    #[serde(default = "default_constraint_relaxation")]
    pub constraint_relaxation: f32,
    /// Artificial pressure scale `k`.
    #[serde(default = "default_artificial_pressure_scale")]
    pub artificial_pressure_scale: f32,
    /// Artificial pressure reference distance `delta_q`.
    ///
    /// When absent it is derived as `0.07 * kernel_width`.
    #[serde(default)]
    pub artificial_pressure_fixed_kernel_distance: Option<f32>,
    /// Artificial pressure exponent `n`.
    #[serde(default = "default_artificial_pressure_power")]
    pub artificial_pressure_power: i32,
    /// Vorticity confinement strength.
    #[serde(default = "default_vorticity_coefficient")]
    pub vorticity_coefficient: f32,
    /// XSPH viscosity strength.
    #[serde(default = "default_viscosity_coefficient")]
    pub viscosity_coefficient: f32,
}

fn default_solver_iterations() -> usize {
    3
}

fn default_grid_size() -> f32 {
    1.0
}

fn default_boundary_margin() -> f32 {
    0.01
}

fn default_kernel_width() -> f32 {
    1.32
}

fn default_gravity() -> f32 {
    100.0
}

fn default_rest_density() -> f32 {
    0.85
}

fn default_constraint_relaxation() -> f32 {
    2.2
}

fn default_artificial_pressure_scale() -> f32 {
    0.045
}

fn default_artificial_pressure_power() -> i32 {
    4
}

fn default_vorticity_coefficient() -> f32 {
    0.3
}

fn default_viscosity_coefficient() -> f32 {
    0.1
}

impl Default for SolverParams {
    fn default() -> Self {
        Self {
            solver_iterations: default_solver_iterations(),
            grid_size: default_grid_size(),
            boundary_margin: default_boundary_margin(),
            kernel_width: default_kernel_width(),
            gravity: default_gravity(),
            rest_density: default_rest_density(),
            constraint_relaxation: default_constraint_relaxation(),
            artificial_pressure_scale: default_artificial_pressure_scale(),
            artificial_pressure_fixed_kernel_distance: None,
            artificial_pressure_power: default_artificial_pressure_power(),
            vorticity_coefficient: default_vorticity_coefficient(),
            viscosity_coefficient: default_viscosity_coefficient(),
        }
    }
}

impl SolverParams {
    /// Reference distance for the artificial pressure term.
    pub fn delta_q(&self) -> f32 {
        self.artificial_pressure_fixed_kernel_distance
            .unwrap_or(0.07 * self.kernel_width)
    }

    /// Validate ranges the solver formulas depend on.
    pub fn validate(&self) -> Result<()> {
        if self.solver_iterations == 0 {
            return Err(SimulationError::InvalidParameter(
                "solver_iterations must be at least 1".to_string(),
            ));
        }
        if !(self.grid_size > 0.0) {
            return Err(SimulationError::InvalidParameter(
                "grid_size must be positive".to_string(),
            ));
        }
        if !(self.kernel_width > 0.0) {
            return Err(SimulationError::InvalidParameter(
                "kernel_width must be positive".to_string(),
            ));
        }
        if !(self.rest_density > 0.0) {
            return Err(SimulationError::InvalidParameter(
                "rest_density must be positive".to_string(),
            ));
        }
        if !(self.constraint_relaxation > 0.0) {
            return Err(SimulationError::InvalidParameter(
                "constraint_relaxation must be positive".to_string(),
            ));
        }
        if !(self.boundary_margin >= 0.0) {
            return Err(SimulationError::InvalidParameter(
                "boundary_margin must be non-negative".to_string(),
            ));
        }
        let dq = self.delta_q();
        if !(dq >= 0.0 && dq < self.kernel_width) {
            return Err(SimulationError::InvalidParameter(format!(
                "artificial pressure distance {dq} must lie in [0, kernel_width)"
            )));
        }
        Ok(())
    }
}
